//! Credential checks and bearer tokens.

pub mod gate;
pub mod password;
pub mod signin;
pub mod token;
pub mod validation;

pub use gate::{AuthContext, TokenDenylist, TokenVerifier};
pub use password::{HashError, PasswordHasher};
pub use signin::{SignInError, SignInManager};
pub use token::{IssuedToken, SigningKey, TokenError, TokenIssuer};
