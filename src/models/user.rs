//! User model for storage and API.

use serde::{Deserialize, Serialize};

/// User profile stored in Firestore.
///
/// Created at signup and never mutated afterwards. The password is stored
/// only as a scrypt PHC hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Document ID
    pub id: String,
    /// Display name, unique across the users collection
    pub username: String,
    /// scrypt password hash (PHC string format)
    pub password_hash: String,
    /// When the account was created (ISO 8601)
    pub created_at: String,
}
