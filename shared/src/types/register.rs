use serde::Deserialize;

/// JSON body accepted by `POST /account/register`.
///
/// `email` is optional on the wire; whether it is required is a server
/// setting (`auth.email_required`).
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationData {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
}
