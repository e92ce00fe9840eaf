use anyhow::{Error, Result};
use chrono::Utc;
use sha2::{Digest, Sha256};

/// f32_vec_to_u8 serializes the vector as consecutive little-endian `f32` values.
pub fn f32_vec_to_u8(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|x| x.to_le_bytes()).collect()
}

/// u8_to_f32_vec is the inverse of `f32_vec_to_u8`.
///
/// # Arguments
/// * `v` - &[u8], its length must be a multiple of 4
///
/// # Returns
/// * `Result<Vec<f32>>`
pub fn u8_to_f32_vec(v: &[u8]) -> Result<Vec<f32>> {
    if v.len() % 4 != 0 {
        return Err(Error::msg(format!("byte length {} is not a multiple of 4", v.len())))
    }
    Ok(v.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// identity_digest returns the lowercase hex SHA-256 of `identity`, a fixed
/// 64 character key whatever the length of the name.
pub fn identity_digest(identity: &str) -> String {
    hex::encode(Sha256::digest(identity.as_bytes()))
}

/// now_unix_seconds returns the current wall clock as fractional unix seconds.
pub fn now_unix_seconds() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
