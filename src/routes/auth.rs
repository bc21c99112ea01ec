// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Username/password authentication routes.
//!
//! Sessions are JWTs in an HttpOnly cookie; the middleware also accepts
//! the same token as a bearer header for non-browser clients.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use scrypt::password_hash::{
    rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use scrypt::Scrypt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use crate::db::new_doc_id;
use crate::error::{AppError, Result};
use crate::middleware::auth::{create_jwt, SESSION_COOKIE};
use crate::models::User;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/logout", get(logout))
}

#[derive(Deserialize, Validate)]
pub struct CredentialsPayload {
    #[validate(length(min = 3, max = 32))]
    username: String,
    #[validate(length(min = 8, max = 128))]
    password: String,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub user_id: String,
    pub username: String,
}

fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// Create an account and start a session.
async fn signup(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(payload): Json<CredentialsPayload>,
) -> Result<(CookieJar, Json<AuthResponse>)> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    if state
        .db
        .find_user_by_username(&payload.username)
        .await?
        .is_some()
    {
        return Err(AppError::Conflict(format!(
            "Username '{}' is taken",
            payload.username
        )));
    }

    // scrypt is deliberately slow; keep it off the async executor.
    let password = payload.password.clone();
    let password_hash = tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Scrypt
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
    })
    .await
    .map_err(|e| AppError::Internal(anyhow::anyhow!("Hashing task failed: {}", e)))?
    .map_err(|e| AppError::Internal(anyhow::anyhow!("Password hashing failed: {}", e)))?;

    let user = User {
        id: new_doc_id(),
        username: payload.username,
        password_hash,
        created_at: chrono::Utc::now().to_rfc3339(),
    };

    state.db.create_user(&user).await?;
    tracing::info!(user_id = %user.id, username = %user.username, "User signed up");

    let token = create_jwt(&user.id, &state.config.jwt_signing_key)?;

    Ok((
        jar.add(session_cookie(token)),
        Json(AuthResponse {
            user_id: user.id,
            username: user.username,
        }),
    ))
}

/// Verify credentials and start a session.
async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(payload): Json<CredentialsPayload>,
) -> Result<(CookieJar, Json<AuthResponse>)> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    // Unknown username and wrong password get the same response.
    let user = state
        .db
        .find_user_by_username(&payload.username)
        .await?
        .ok_or(AppError::Unauthorized)?;

    let password = payload.password.clone();
    let stored_hash = user.password_hash.clone();
    let verified = tokio::task::spawn_blocking(move || {
        PasswordHash::new(&stored_hash)
            .map(|parsed| {
                Scrypt
                    .verify_password(password.as_bytes(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false)
    })
    .await
    .map_err(|e| AppError::Internal(anyhow::anyhow!("Verify task failed: {}", e)))?;

    if !verified {
        return Err(AppError::Unauthorized);
    }

    tracing::info!(user_id = %user.id, "User logged in");
    let token = create_jwt(&user.id, &state.config.jwt_signing_key)?;

    Ok((
        jar.add(session_cookie(token)),
        Json(AuthResponse {
            user_id: user.id,
            username: user.username,
        }),
    ))
}

/// End the session by clearing the cookie.
async fn logout(jar: CookieJar) -> (CookieJar, Json<serde_json::Value>) {
    let jar = jar.remove(Cookie::build((SESSION_COOKIE, "")).path("/").build());
    (jar, Json(serde_json::json!({ "success": true })))
}
