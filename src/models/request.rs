// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Request model: the per-nominee pending/active instance of a nomination.

use serde::{Deserialize, Serialize};

/// Request record stored in Firestore.
///
/// Lifecycle: created with `active = false` (pending), flipped to `true`
/// when the nominee acknowledges, and deleted when the nominee either
/// completes the deed (in the same transaction that creates it) or
/// declines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Document ID
    pub id: String,
    /// Nomination this request belongs to
    pub nomination_id: String,
    /// User the request is addressed to
    pub nominee_id: String,
    /// Whether the nominee has acknowledged the request
    pub active: bool,
}
