pub mod jwt;
pub mod register;
pub mod server_config;
pub mod token;
pub mod user;

pub use self::jwt::TokenClaims;
pub use self::register::RegistrationData;
pub use self::token::{GrantType, TokenRequest, TokenResponse};
pub use self::user::UserProfile;
