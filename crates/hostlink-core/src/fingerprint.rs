// ── Host-key fingerprints ─────────────────────────────────────────────────────
//
// Trust decisions compare colon-separated lowercase hex SHA-256 digests of the
// raw host key blob, e.g. `3f:a1:…`. The OpenSSH `SHA256:<base64>` rendering is
// only for display.

use base64::Engine;
use sha2::{Digest, Sha256};

/// Colon-separated lowercase hex of the SHA-256 digest of a raw host key.
pub fn fingerprint_of(raw_key: &[u8]) -> String {
    colon_hex(&Sha256::digest(raw_key))
}

/// OpenSSH-style `SHA256:<unpadded base64>` rendering of a raw host key.
pub fn openssh_fingerprint_of(raw_key: &[u8]) -> String {
    let digest = Sha256::digest(raw_key);
    format!(
        "SHA256:{}",
        base64::engine::general_purpose::STANDARD_NO_PAD.encode(digest)
    )
}

/// Render bytes as `aa:bb:cc`.
pub fn colon_hex(bytes: &[u8]) -> String {
    let hex = hex::encode(bytes);
    let mut out = String::with_capacity(hex.len() + hex.len() / 2);
    for (i, pair) in hex.as_bytes().chunks(2).enumerate() {
        if i > 0 {
            out.push(':');
        }
        out.push(pair[0] as char);
        out.push(pair[1] as char);
    }
    out
}

/// Canonical form used for storage and comparison.
pub fn normalize(fingerprint: &str) -> String {
    fingerprint.trim().to_ascii_lowercase()
}
