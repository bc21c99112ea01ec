// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Challenge model: a named good-deed campaign.

use serde::{Deserialize, Serialize};

/// Challenge record stored in Firestore. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    /// Document ID
    pub id: String,
    /// Campaign title
    pub title: String,
    /// What participants are asked to do
    pub description: String,
    /// Cover image URL
    pub cover_image: String,
    /// User ID of the challenge originator
    pub started_by: String,
    /// Optional associated cause name
    pub cause_name: Option<String>,
    /// Optional associated cause URL
    pub cause_url: Option<String>,
    /// When the challenge was started (ISO 8601)
    pub started_at: String,
}
