//! bcrypt hashing, run off the async executor.

use crate::error::{AppError, AppResult};

pub async fn hash_password(plaintext: String, cost: u32) -> AppResult<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(plaintext, cost))
        .await
        .map_err(|e| AppError::Internal(format!("hash task failed: {}", e)))?
        .map_err(|e| AppError::Internal(format!("bcrypt: {}", e)))
}

/// Verify a plaintext password against a stored hash. Malformed hashes
/// never verify.
pub async fn verify_password(plaintext: String, hash: String) -> AppResult<bool> {
    tokio::task::spawn_blocking(move || bcrypt::verify(plaintext, &hash).unwrap_or(false))
        .await
        .map_err(|e| AppError::Internal(format!("verify task failed: {}", e)))
}
