// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Nomination model: an invitation instance tied to a challenge.

use serde::{Deserialize, Serialize};

/// Display category for a nomination, resolved to an asset by the frontend.
///
/// A closed enum rather than a free-form string so unknown categories are
/// rejected at deserialization time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeIcon {
    Tree,
    Coffee,
}

/// Nomination record stored in Firestore. Immutable after creation.
///
/// A nomination is created by a user who has completed the challenge and
/// is weakly referenced by one [`Request`](crate::models::Request) per
/// nominee; it owns none of them and survives their deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nomination {
    /// Document ID
    pub id: String,
    /// User ID of the nominating user
    pub nominator_id: String,
    /// Challenge this nomination belongs to
    pub challenge_id: String,
    /// Display category
    pub icon: ChallengeIcon,
    /// When the nomination was created (ISO 8601)
    pub started_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_icon_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ChallengeIcon::Tree).unwrap(), "\"tree\"");
        assert_eq!(
            serde_json::to_string(&ChallengeIcon::Coffee).unwrap(),
            "\"coffee\""
        );
    }

    #[test]
    fn test_icon_rejects_unknown_category() {
        let result: Result<ChallengeIcon, _> = serde_json::from_str("\"kitten\"");
        assert!(result.is_err());
    }
}
