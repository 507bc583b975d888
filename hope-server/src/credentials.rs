//! Password and MPIN hashing (Argon2id)

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use once_cell::sync::Lazy;

/// Credential hashing failure
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("failed to hash secret: {0}")]
    Hash(String),

    #[error("stored hash is malformed: {0}")]
    MalformedHash(String),

    #[error("hashing task failed: {0}")]
    Task(String),
}

/// Hash compared against when no account matched, so unknown usernames cost
/// the same as wrong passwords.
static DUMMY_HASH: Lazy<String> = Lazy::new(|| {
    hash_secret("not-a-real-account").expect("argon2 hashing with default params")
});

/// Hash a password or MPIN with a fresh random salt.
pub fn hash_secret(secret: &str) -> Result<String, CredentialError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| CredentialError::Hash(e.to_string()))
}

/// Check a secret against a stored PHC-format hash.
pub fn verify_secret(secret: &str, stored_hash: &str) -> Result<bool, CredentialError> {
    let parsed =
        PasswordHash::new(stored_hash).map_err(|e| CredentialError::MalformedHash(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(secret.as_bytes(), &parsed)
        .is_ok())
}

/// Verify against the stored hash when an account was found, otherwise burn
/// the same work on a dummy hash and fail.
pub fn verify_or_dummy(secret: &str, stored_hash: Option<&str>) -> Result<bool, CredentialError> {
    match stored_hash {
        Some(hash) => verify_secret(secret, hash),
        None => {
            let _ = verify_secret(secret, &DUMMY_HASH)?;
            Ok(false)
        }
    }
}

/// Run Argon2 work on the blocking pool, off the async workers.
async fn off_runtime<T, F>(work: F) -> Result<T, CredentialError>
where
    F: FnOnce() -> Result<T, CredentialError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| CredentialError::Task(e.to_string()))?
}

/// [`hash_secret`] for request handlers.
pub async fn hash_secret_async(secret: String) -> Result<String, CredentialError> {
    off_runtime(move || hash_secret(&secret)).await
}

/// [`verify_secret`] for request handlers.
pub async fn verify_secret_async(
    secret: String,
    stored_hash: String,
) -> Result<bool, CredentialError> {
    off_runtime(move || verify_secret(&secret, &stored_hash)).await
}

/// [`verify_or_dummy`] for request handlers.
pub async fn verify_or_dummy_async(
    secret: String,
    stored_hash: Option<String>,
) -> Result<bool, CredentialError> {
    off_runtime(move || verify_or_dummy(&secret, stored_hash.as_deref())).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hash = hash_secret("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_secret("correct horse", &hash).unwrap());
        assert!(!verify_secret("wrong horse", &hash).unwrap());
    }

    #[test]
    fn salts_differ() {
        let a = hash_secret("1234").unwrap();
        let b = hash_secret("1234").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_hash_is_an_error() {
        assert!(matches!(
            verify_secret("x", "plaintext"),
            Err(CredentialError::MalformedHash(_))
        ));
    }

    #[test]
    fn missing_account_never_verifies() {
        assert!(!verify_or_dummy("anything", None).unwrap());
    }

    #[tokio::test]
    async fn async_wrappers_run_on_blocking_pool() {
        let hash = hash_secret_async("correct horse".into()).await.unwrap();
        assert!(verify_secret_async("correct horse".into(), hash.clone())
            .await
            .unwrap());
        assert!(!verify_or_dummy_async("wrong horse".into(), Some(hash))
            .await
            .unwrap());
        assert!(!verify_or_dummy_async("anything".into(), None).await.unwrap());
    }
}
