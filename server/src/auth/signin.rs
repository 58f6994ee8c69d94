use std::sync::Arc;

use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use super::password::{HashError, PasswordHasher};
use crate::database::{StoreError, User, UserStore};

#[derive(Error, Debug)]
pub enum SignInError {
    /// Unknown user or wrong password. The two are never told apart.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("user lookup failed: {0}")]
    Store(StoreError),

    #[error(transparent)]
    Hash(#[from] HashError),
}

/// Checked against when the name is unknown. No account can hold it.
const DECOY_PASSWORD: &str = "decoy password for unknown users";

/// Checks a username/password pair against the store.
///
/// An unknown name is still run through a full verify against a decoy
/// digest with the same cost, so both rejections take as long.
pub struct SignInManager {
    store: Arc<dyn UserStore>,
    hasher: PasswordHasher,
    decoy: OnceCell<String>,
}

impl SignInManager {
    pub fn new(store: Arc<dyn UserStore>, hasher: PasswordHasher) -> Self {
        Self {
            store,
            hasher,
            decoy: OnceCell::new(),
        }
    }

    /// Returns the full record on success. The hash is in there; callers
    /// must not send it anywhere.
    pub async fn log_in(&self, username: &str, password: &str) -> Result<User, SignInError> {
        let user = match self.store.get_by_name(username).await {
            Ok(user) => user,
            Err(StoreError::NotFound) => {
                let decoy = self
                    .decoy
                    .get_or_try_init(|| self.hasher.hash(DECOY_PASSWORD))
                    .await?;
                self.hasher.verify(decoy, password).await?;
                warn!("Sign-in rejected for {}", username);
                return Err(SignInError::InvalidCredentials);
            }
            Err(e) => return Err(SignInError::Store(e)),
        };

        if !self.hasher.verify(&user.password_hash, password).await? {
            warn!("Sign-in rejected for {}", username);
            return Err(SignInError::InvalidCredentials);
        }

        debug!("Credentials accepted for {} (ID: {})", user.name, user.id);
        Ok(user)
    }

    /// Tokens are stateless, so there is nothing to end on the server.
    pub fn log_out(&self, user: &User) {
        debug!("Log-out requested for {}; tokens expire on their own", user.name);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::database::{MemoryUserStore, NewUser};

    async fn manager() -> SignInManager {
        let hasher = PasswordHasher::new(64, 1, 1, Duration::from_secs(10)).unwrap();
        let store = Arc::new(MemoryUserStore::new());
        let digest = hasher.hash("hunter2").await.unwrap();
        store.insert(NewUser::new("alice-99", digest)).await.unwrap();
        SignInManager::new(store, hasher)
    }

    #[tokio::test]
    async fn correct_password() {
        let manager = manager().await;
        let user = manager.log_in("alice-99", "hunter2").await.unwrap();
        assert_eq!(user.name, "alice-99");
        manager.log_out(&user);
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_user_look_the_same() {
        let manager = manager().await;
        let wrong = manager.log_in("alice-99", "hunter3").await.unwrap_err();
        let unknown = manager.log_in("mallory", "hunter2").await.unwrap_err();
        assert!(matches!(wrong, SignInError::InvalidCredentials));
        assert!(matches!(unknown, SignInError::InvalidCredentials));
        assert_eq!(wrong.to_string(), unknown.to_string());
    }

    #[tokio::test]
    async fn unknown_user_pays_for_a_verify() {
        let manager = manager().await;
        assert!(manager.decoy.get().is_none());

        let err = manager.log_in("mallory", "hunter2").await.unwrap_err();
        assert!(matches!(err, SignInError::InvalidCredentials));
        let decoy = manager.decoy.get().cloned().unwrap();
        assert!(decoy.starts_with("$argon2id$v=19$m=64,t=1,p=1$"));

        // made once, reused after
        manager.log_in("trudy", "pw").await.unwrap_err();
        assert_eq!(manager.decoy.get(), Some(&decoy));

        // even the decoy's own password does not sign anyone in
        assert!(matches!(
            manager.log_in("mallory", DECOY_PASSWORD).await,
            Err(SignInError::InvalidCredentials)
        ));
    }
}
