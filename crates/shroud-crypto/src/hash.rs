use sha2::{Digest, Sha256};

pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update(data);
    let out = h.finalize();
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&out);
    arr
}

/// Display fingerprint: lowercase hex of sha256(bytes).
pub fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(sha256(bytes))
}

/// Short fingerprint (first 8 bytes) for log lines.
pub fn short_fingerprint(bytes: &[u8]) -> String {
    hex::encode(&sha256(bytes)[..8])
}
