use std::time::Duration;

use argon2::password_hash::{
    PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString,
};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use shared::types::server_config::HashingConfig;
use thiserror::Error;
use tokio::time::timeout;

#[derive(Error, Debug)]
pub enum HashError {
    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("password hashing did not finish within {0:?}")]
    Timeout(Duration),

    #[error("hashing task failed: {0}")]
    Task(String),
}

/// Argon2id with fixed cost parameters.
///
/// Digests are PHC strings (`$argon2id$v=19$m=...,t=...,p=...$salt$hash`),
/// so verification reads the salt and cost back out of the digest itself.
/// The async methods run on the blocking pool under a deadline.
#[derive(Clone, Debug)]
pub struct PasswordHasher {
    params: Params,
    deadline: Duration,
}

impl PasswordHasher {
    pub fn new(
        memory_kib: u32,
        iterations: u32,
        parallelism: u32,
        deadline: Duration,
    ) -> Result<Self, HashError> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|e| HashError::Hash(format!("invalid parameters: {}", e)))?;
        Ok(Self { params, deadline })
    }

    pub fn from_config(config: &HashingConfig) -> Result<Self, HashError> {
        Self::new(
            config.memory_kib,
            config.iterations,
            config.parallelism,
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash with a fresh random salt.
    pub fn hash_blocking(&self, password: &str) -> Result<String, HashError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| HashError::Hash(e.to_string()))
    }

    /// `false` for a wrong password and for a digest that does not parse.
    pub fn verify_blocking(digest: &str, password: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(digest) else {
            return false;
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }

    pub async fn hash(&self, password: &str) -> Result<String, HashError> {
        let hasher = self.clone();
        let password = password.to_string();
        self.run(move || hasher.hash_blocking(&password)).await?
    }

    pub async fn verify(&self, digest: &str, password: &str) -> Result<bool, HashError> {
        let digest = digest.to_string();
        let password = password.to_string();
        self.run(move || Self::verify_blocking(&digest, &password))
            .await
    }

    async fn run<T, F>(&self, work: F) -> Result<T, HashError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        match timeout(self.deadline, tokio::task::spawn_blocking(work)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(join)) => Err(HashError::Task(join.to_string())),
            Err(_) => Err(HashError::Timeout(self.deadline)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick() -> PasswordHasher {
        PasswordHasher::new(64, 1, 1, Duration::from_secs(10)).unwrap()
    }

    #[test]
    fn test_password_hashing() {
        let hasher = quick();
        let hash = hasher.hash_blocking("test_password_123").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(PasswordHasher::verify_blocking(&hash, "test_password_123"));
        assert!(!PasswordHasher::verify_blocking(&hash, "wrong_password"));
    }

    #[test]
    fn salts_differ() {
        let hasher = quick();
        let a = hasher.hash_blocking("same").unwrap();
        let b = hasher.hash_blocking("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn corrupt_digest_is_a_mismatch() {
        assert!(!PasswordHasher::verify_blocking("not-a-phc-string", "pw"));
        assert!(!PasswordHasher::verify_blocking("", ""));
        let mut hash = quick().hash_blocking("pw").unwrap();
        hash.truncate(hash.len() - 4);
        assert!(!PasswordHasher::verify_blocking(&hash, "pw"));
    }

    #[test]
    fn cost_is_read_from_digest() {
        let hash = quick().hash_blocking("pw").unwrap();
        assert!(hash.contains("m=64,t=1,p=1"));
        // a hasher with different params still verifies it
        let other = PasswordHasher::new(128, 2, 1, Duration::from_secs(10)).unwrap();
        assert!(PasswordHasher::verify_blocking(&hash, "pw"));
        assert!(other.hash_blocking("pw").unwrap().contains("m=128,t=2,p=1"));
    }

    #[test]
    fn bad_params_rejected() {
        assert!(PasswordHasher::new(1, 1, 1, Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn async_round_trip() {
        let hasher = quick();
        let hash = hasher.hash("hunter2").await.unwrap();
        assert!(hasher.verify(&hash, "hunter2").await.unwrap());
        assert!(!hasher.verify(&hash, "hunter3").await.unwrap());
    }
}
