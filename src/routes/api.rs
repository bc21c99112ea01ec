// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.

use crate::db::new_doc_id;
use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{Challenge, ChallengeIcon, Deed, GeoPoint, ImpactSummary, Nomination, Request};
use crate::services::chain::{self, ChainNode};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me))
        .route("/api/challenges", get(list_challenges).post(create_challenge))
        .route("/api/challenges/{id}", get(get_challenge))
        .route("/api/challenges/{id}/chain", get(get_chain))
        .route("/api/nominations", post(create_nomination))
        .route("/api/requests", get(list_requests))
        .route("/api/requests/{id}/activate", post(activate_request))
        .route("/api/requests/{id}/accept", post(accept_request))
        .route("/api/requests/{id}/decline", post(decline_request))
}

// ─── User Profile ────────────────────────────────────────────

/// Current user response with impact aggregates.
#[derive(Serialize)]
pub struct MeResponse {
    pub user_id: String,
    pub username: String,
    pub created_at: String,
    pub impact: ImpactSummary,
}

/// Get current user profile and impact summary.
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<MeResponse>> {
    let profile = state
        .db
        .get_user(&user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user.user_id)))?;

    let deeds = state.db.deeds_for_user(&user.user_id).await?;
    let started = state.db.challenges_started_by(&user.user_id).await?;
    let impact = ImpactSummary::from_deeds(&deeds, started.len() as u32);

    Ok(Json(MeResponse {
        user_id: profile.id,
        username: profile.username,
        created_at: profile.created_at,
        impact,
    }))
}

// ─── Challenges ──────────────────────────────────────────────

/// Evidence for a completed deed.
#[derive(Deserialize, Validate)]
pub struct DeedInput {
    /// Evidence image URL
    #[validate(length(min = 1, max = 2048))]
    pub image: String,
    /// Free-text comment
    #[validate(length(max = 1000))]
    pub comment: String,
    /// Where the deed was completed
    #[validate(nested)]
    pub location: GeoPoint,
}

#[derive(Deserialize, Validate)]
pub struct CreateChallengePayload {
    #[validate(length(min = 1, max = 120))]
    pub title: String,
    #[validate(length(min = 1, max = 2000))]
    pub description: String,
    #[validate(length(min = 1, max = 2048))]
    pub cover_image: String,
    #[validate(length(max = 120))]
    pub cause_name: Option<String>,
    #[validate(length(max = 2048))]
    pub cause_url: Option<String>,
    /// The originator's own completion, which becomes the chain root
    #[validate(nested)]
    pub deed: DeedInput,
}

#[derive(Serialize)]
pub struct ChallengeCreatedResponse {
    pub challenge: Challenge,
    pub root_deed: Deed,
}

/// Start a challenge: creates the challenge and the originator's root deed
/// in one transaction.
async fn create_challenge(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<CreateChallengePayload>,
) -> Result<Json<ChallengeCreatedResponse>> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let now = chrono::Utc::now().to_rfc3339();
    let challenge = Challenge {
        id: new_doc_id(),
        title: payload.title,
        description: payload.description,
        cover_image: payload.cover_image,
        started_by: user.user_id.clone(),
        cause_name: payload.cause_name,
        cause_url: payload.cause_url,
        started_at: now.clone(),
    };

    let root_deed = Deed::unlinked(
        new_doc_id(),
        user.user_id.clone(),
        challenge.id.clone(),
        payload.deed.image,
        payload.deed.comment,
        payload.deed.location,
        now,
    );

    state
        .db
        .create_challenge_with_root_deed(&challenge, &root_deed)
        .await?;

    Ok(Json(ChallengeCreatedResponse {
        challenge,
        root_deed,
    }))
}

/// List all challenges, newest first.
async fn list_challenges(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Challenge>>> {
    Ok(Json(state.db.list_challenges().await?))
}

/// Get a single challenge.
async fn get_challenge(
    State(state): State<Arc<AppState>>,
    Path(challenge_id): Path<String>,
) -> Result<Json<Challenge>> {
    let challenge = state
        .db
        .get_challenge(&challenge_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Challenge {} not found", challenge_id)))?;

    Ok(Json(challenge))
}

/// Chain tree response for visualization (tree view, map, globe).
#[derive(Serialize)]
pub struct ChainResponse {
    pub challenge_id: String,
    /// Total deeds in the chain, read off the originator's counter
    pub total_deeds: u32,
    /// Normally one tree rooted at the originator's deed; unlinked deeds
    /// show up as extra roots
    pub roots: Vec<ChainNode>,
}

/// Get the full deed chain of a challenge as a tree.
async fn get_chain(
    State(state): State<Arc<AppState>>,
    Path(challenge_id): Path<String>,
) -> Result<Json<ChainResponse>> {
    let challenge = state
        .db
        .get_challenge(&challenge_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Challenge {} not found", challenge_id)))?;

    let deeds = state.db.deeds_for_challenge(&challenge_id).await?;

    let total_deeds = deeds
        .iter()
        .find(|d| d.user_id == challenge.started_by)
        .map(|d| d.num_contributions)
        .unwrap_or(0);

    let roots = chain::build_chain_forest(deeds)
        .map_err(|e| AppError::Internal(anyhow::Error::new(e)))?;

    Ok(Json(ChainResponse {
        challenge_id,
        total_deeds,
        roots,
    }))
}

// ─── Nominations ─────────────────────────────────────────────

#[derive(Deserialize, Validate)]
pub struct CreateNominationPayload {
    pub challenge_id: String,
    pub icon: ChallengeIcon,
    #[validate(length(min = 1, max = 50))]
    pub nominee_ids: Vec<String>,
}

#[derive(Serialize)]
pub struct NominationCreatedResponse {
    pub nomination: Nomination,
    pub requests: Vec<Request>,
}

/// Nominate other users for a challenge the caller has completed.
///
/// Creates one nomination plus one pending request per nominee.
async fn create_nomination(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<CreateNominationPayload>,
) -> Result<Json<NominationCreatedResponse>> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    if state
        .db
        .get_challenge(&payload.challenge_id)
        .await?
        .is_none()
    {
        return Err(AppError::NotFound(format!(
            "Challenge {} not found",
            payload.challenge_id
        )));
    }

    // Only completers can nominate: the nominator's deed is what the
    // nominees' deeds will link behind.
    if state
        .db
        .find_deed_for_user_in_challenge(&user.user_id, &payload.challenge_id)
        .await?
        .is_none()
    {
        return Err(AppError::BadRequest(
            "Complete the challenge before nominating others".to_string(),
        ));
    }

    let nomination = Nomination {
        id: new_doc_id(),
        nominator_id: user.user_id.clone(),
        challenge_id: payload.challenge_id,
        icon: payload.icon,
        started_at: chrono::Utc::now().to_rfc3339(),
    };

    let requests: Vec<Request> = payload
        .nominee_ids
        .iter()
        .map(|nominee_id| Request {
            id: new_doc_id(),
            nomination_id: nomination.id.clone(),
            nominee_id: nominee_id.clone(),
            active: false,
        })
        .collect();

    state.db.create_nomination(&nomination).await?;
    state.db.create_requests(&requests).await?;

    tracing::info!(
        nomination_id = %nomination.id,
        nominees = requests.len(),
        "Nomination created"
    );

    Ok(Json(NominationCreatedResponse {
        nomination,
        requests,
    }))
}

// ─── Requests ────────────────────────────────────────────────

#[derive(Deserialize)]
struct RequestsQuery {
    /// Filter by the active flag; omit for all of the nominee's requests
    active: Option<bool>,
}

/// A request joined with its nomination, challenge, and nominator.
#[derive(Serialize)]
pub struct RequestDetails {
    pub id: String,
    pub nomination_id: String,
    pub challenge_id: String,
    pub title: String,
    pub nominated_by: String,
    pub icon: ChallengeIcon,
    /// Size of the chain so far, read off the originator's counter
    pub people_in_chain: u32,
    pub active: bool,
}

/// List the current user's nomination requests with display details.
///
/// Each item needs its nomination, challenge, and nominator looked up;
/// requests with dangling references are skipped with a warning rather
/// than failing the whole listing.
async fn list_requests(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<RequestsQuery>,
) -> Result<Json<Vec<RequestDetails>>> {
    let requests = state
        .db
        .requests_for_nominee(&user.user_id, params.active)
        .await?;

    let mut details = Vec::with_capacity(requests.len());
    for request in requests {
        let Some(nomination) = state.db.get_nomination(&request.nomination_id).await? else {
            tracing::warn!(request_id = %request.id, "Request references missing nomination");
            continue;
        };
        let Some(challenge) = state.db.get_challenge(&nomination.challenge_id).await? else {
            tracing::warn!(
                nomination_id = %nomination.id,
                "Nomination references missing challenge"
            );
            continue;
        };
        let Some(nominator) = state.db.get_user(&nomination.nominator_id).await? else {
            tracing::warn!(
                nomination_id = %nomination.id,
                "Nomination references missing nominator"
            );
            continue;
        };

        let people_in_chain = state
            .db
            .find_deed_for_user_in_challenge(&challenge.started_by, &challenge.id)
            .await?
            .map(|d| d.num_contributions)
            .unwrap_or(0);

        details.push(RequestDetails {
            id: request.id,
            nomination_id: nomination.id,
            challenge_id: challenge.id,
            title: challenge.title,
            nominated_by: nominator.username,
            icon: nomination.icon,
            people_in_chain,
            active: request.active,
        });
    }

    Ok(Json(details))
}

#[derive(Serialize)]
pub struct ActivateResponse {
    pub updated: bool,
}

/// Acknowledge a nomination request (pending → active).
///
/// Idempotent; `updated` is false when the request does not exist.
async fn activate_request(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(request_id): Path<String>,
) -> Result<Json<ActivateResponse>> {
    if let Some(request) = state.db.get_request(&request_id).await? {
        if request.nominee_id != user.user_id {
            return Err(AppError::Forbidden(
                "Request is addressed to another user".to_string(),
            ));
        }
    }

    let updated = state.db.set_request_active(&request_id).await?;
    Ok(Json(ActivateResponse { updated }))
}

/// Accept a request by completing the deed.
///
/// One transaction creates the deed, back-patches the predecessor's
/// forward pointer, bumps every ancestor's contribution counter, and
/// deletes the request, so the whole resolution is all-or-nothing.
async fn accept_request(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(request_id): Path<String>,
    Json(payload): Json<DeedInput>,
) -> Result<Json<Deed>> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let request = state
        .db
        .get_request(&request_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Request {} not found", request_id)))?;

    if request.nominee_id != user.user_id {
        return Err(AppError::Forbidden(
            "Request is addressed to another user".to_string(),
        ));
    }

    let nomination = state
        .db
        .get_nomination(&request.nomination_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("Nomination {} not found", request.nomination_id))
        })?;

    if state
        .db
        .get_challenge(&nomination.challenge_id)
        .await?
        .is_none()
    {
        return Err(AppError::NotFound(format!(
            "Challenge {} not found",
            nomination.challenge_id
        )));
    }

    // One deed per user per challenge.
    if state
        .db
        .find_deed_for_user_in_challenge(&user.user_id, &nomination.challenge_id)
        .await?
        .is_some()
    {
        return Err(AppError::Conflict(
            "Challenge already completed".to_string(),
        ));
    }

    // Locate the nominator's contribution record to link behind. A
    // transient lookup failure degrades to an unlinked deed instead of
    // failing the accept.
    let predecessor = match state
        .db
        .find_deed_for_user_in_challenge(&nomination.nominator_id, &nomination.challenge_id)
        .await
    {
        Ok(deed) => deed,
        Err(e) => {
            tracing::warn!(
                nomination_id = %nomination.id,
                error = %e,
                "Predecessor lookup failed, creating unlinked deed"
            );
            None
        }
    };

    let new_deed = Deed::unlinked(
        new_doc_id(),
        user.user_id.clone(),
        nomination.challenge_id.clone(),
        payload.image,
        payload.comment,
        payload.location,
        chrono::Utc::now().to_rfc3339(),
    );

    // The transaction re-reads the predecessor and its ancestors before
    // linking, so concurrent completions cannot commit stale counters.
    let deed = state
        .db
        .commit_completion(
            &new_deed,
            predecessor.as_ref().map(|d| d.id.as_str()),
            &request.id,
        )
        .await?;

    Ok(Json(deed))
}

#[derive(Serialize)]
pub struct DeclineResponse {
    pub success: bool,
}

/// Decline a request: the request is deleted, no deed is created, and the
/// nomination (with its other nominees) is untouched.
async fn decline_request(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(request_id): Path<String>,
) -> Result<Json<DeclineResponse>> {
    if let Some(request) = state.db.get_request(&request_id).await? {
        if request.nominee_id != user.user_id {
            return Err(AppError::Forbidden(
                "Request is addressed to another user".to_string(),
            ));
        }
    }

    let deleted = state.db.delete_request(&request_id).await?;
    if !deleted {
        return Err(AppError::NotFound(format!(
            "Request {} not found",
            request_id
        )));
    }

    Ok(Json(DeclineResponse { success: true }))
}
