// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Ripple: chains of nominated good-deed challenges.
//!
//! This crate provides the backend API for starting challenges, nominating
//! other users, and recording completed deeds as a linked chain per
//! challenge. Each completion increments a contribution counter on every
//! deed upstream of it, so a chain root always reflects the total size of
//! the ripple it started.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use db::FirestoreDb;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: FirestoreDb,
}
