//! Database layer (Firestore).

pub mod firestore;

pub use firestore::{new_doc_id, FirestoreDb};

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const CHALLENGES: &str = "challenges";
    pub const NOMINATIONS: &str = "nominations";
    pub const REQUESTS: &str = "requests";
    pub const DEEDS: &str = "deeds";
}
