// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Deed model: one user's completed instance of a challenge, a chain node.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Geographic point where a deed was completed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
pub struct GeoPoint {
    #[validate(range(min = -90.0, max = 90.0))]
    pub lat: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub lng: f64,
}

/// Deed record stored in Firestore.
///
/// Deeds form a tree per challenge: `prev_deed_id` points at the deed of
/// the user who nominated this deed's author (None for the challenge
/// originator, the chain root), and `next_deed_id` is back-patched on the
/// predecessor when a successor is created. `num_contributions` counts
/// this deed plus every deed whose backward path passes through it, so the
/// root's counter equals the total chain size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deed {
    /// Document ID
    pub id: String,
    /// User who completed the deed
    pub user_id: String,
    /// Challenge the deed belongs to
    pub challenge_id: String,
    /// Evidence image URL
    pub image: String,
    /// Free-text comment
    pub comment: String,
    /// When the deed was completed (ISO 8601)
    pub done_at: String,
    /// Where the deed was completed
    pub location: GeoPoint,
    /// Predecessor deed in the chain (None for a chain root)
    pub prev_deed_id: Option<String>,
    /// Most recently linked successor deed
    pub next_deed_id: Option<String>,
    /// 1 + number of descendants in the chain, including deeds linked later
    pub num_contributions: u32,
}

impl Deed {
    /// Create an unlinked deed with a contribution count of 1.
    ///
    /// Chain pointers are filled in by the completion path; a deed that
    /// never gets linked is a valid chain root.
    #[allow(clippy::too_many_arguments)]
    pub fn unlinked(
        id: String,
        user_id: String,
        challenge_id: String,
        image: String,
        comment: String,
        location: GeoPoint,
        done_at: String,
    ) -> Self {
        Self {
            id,
            user_id,
            challenge_id,
            image,
            comment,
            done_at,
            location,
            prev_deed_id: None,
            next_deed_id: None,
            num_contributions: 1,
        }
    }
}
