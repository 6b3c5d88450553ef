use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::Role;

/// The authenticated caller, decoded from the bearer token on every
/// protected request. Replaces the old ad-hoc client-side session blob.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Principal {
    pub account_id: Uuid,
    pub email: String,
    pub username: String,
    pub role: Role,
}
