use serde::{Deserialize, Serialize};

/// Public view of a stored user. The password hash never leaves the server,
/// so it has no field here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
}
