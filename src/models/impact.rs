//! Per-user impact aggregates for the profile view.
//!
//! Computed on demand from the user's own deeds; a user's total impact is
//! the sum of contribution counters across every deed they completed,
//! since each counter already includes the subtree that deed caused.

use serde::{Deserialize, Serialize};

use crate::models::Deed;

/// Aggregated impact figures for one user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImpactSummary {
    /// Number of deeds this user completed
    pub deeds_completed: u32,
    /// Total deeds generated downstream of this user's completions,
    /// including the completions themselves
    pub contributions_generated: u64,
    /// Number of challenges this user started
    pub challenges_started: u32,
}

impl ImpactSummary {
    /// Build a summary from a user's deeds and their started-challenge count.
    pub fn from_deeds(deeds: &[Deed], challenges_started: u32) -> Self {
        Self {
            deeds_completed: deeds.len() as u32,
            contributions_generated: deeds.iter().map(|d| d.num_contributions as u64).sum(),
            challenges_started,
        }
    }
}
