// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod challenge;
pub mod deed;
pub mod impact;
pub mod nomination;
pub mod request;
pub mod user;

pub use challenge::Challenge;
pub use deed::{Deed, GeoPoint};
pub use impact::ImpactSummary;
pub use nomination::{ChallengeIcon, Nomination};
pub use request::Request;
pub use user::User;
