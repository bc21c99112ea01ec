// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for the five domain collections:
//! - Users (accounts)
//! - Challenges (campaign definitions)
//! - Nominations (invitations created by completers)
//! - Requests (per-nominee pending/active instances)
//! - Deeds (completed challenge instances, linked into chains)

use crate::db::collections;
use crate::error::AppError;
use crate::models::{Challenge, Deed, Nomination, Request, User};
use crate::services::chain::{self, ChainError, MAX_CHAIN_DEPTH};
use futures_util::{stream, StreamExt};
use rand::{distributions::Alphanumeric, Rng};
use std::collections::HashSet;

const MAX_CONCURRENT_DB_OPS: usize = 50;

/// How often a conflicted completion transaction is re-run before the
/// error is surfaced to the caller.
const MAX_TXN_ATTEMPTS: usize = 5;

/// Generate a Firestore-style 20-character alphanumeric document id.
pub fn new_doc_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(20)
        .map(char::from)
        .collect()
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated
        // connection to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        // The emulator accepts any token, so hand it a static dummy JWT.
        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    // ─── User Operations ─────────────────────────────────────────

    /// Get a user by document id.
    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(user_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a user by username (usernames are unique by convention).
    pub async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let username = username.to_string();
        let matches: Vec<User> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::USERS)
            .filter(move |q| q.for_all([q.field("username").eq(username.clone())]))
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(matches.into_iter().next())
    }

    /// Create a user document.
    pub async fn create_user(&self, user: &User) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::USERS)
            .document_id(&user.id)
            .object(user)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Challenge Operations ────────────────────────────────────

    /// Get a challenge by document id.
    pub async fn get_challenge(&self, challenge_id: &str) -> Result<Option<Challenge>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::CHALLENGES)
            .obj()
            .one(challenge_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// List all challenges, newest first.
    pub async fn list_challenges(&self) -> Result<Vec<Challenge>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::CHALLENGES)
            .order_by([(
                "started_at",
                firestore::FirestoreQueryDirection::Descending,
            )])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// List challenges started by a given user.
    pub async fn challenges_started_by(&self, user_id: &str) -> Result<Vec<Challenge>, AppError> {
        let user_id = user_id.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::CHALLENGES)
            .filter(move |q| q.for_all([q.field("started_by").eq(user_id.clone())]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Atomically create a challenge together with its originator's root
    /// deed, so a challenge can never exist without a chain root.
    pub async fn create_challenge_with_root_deed(
        &self,
        challenge: &Challenge,
        root_deed: &Deed,
    ) -> Result<(), AppError> {
        let client = self.get_client()?;

        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        client
            .fluent()
            .update()
            .in_col(collections::CHALLENGES)
            .document_id(&challenge.id)
            .object(challenge)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add challenge to transaction: {}", e))
            })?;

        client
            .fluent()
            .update()
            .in_col(collections::DEEDS)
            .document_id(&root_deed.id)
            .object(root_deed)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add root deed to transaction: {}", e))
            })?;

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Transaction commit failed: {}", e)))?;

        tracing::info!(
            challenge_id = %challenge.id,
            root_deed_id = %root_deed.id,
            "Challenge created with root deed"
        );

        Ok(())
    }

    // ─── Nomination Operations ───────────────────────────────────

    /// Get a nomination by document id.
    pub async fn get_nomination(
        &self,
        nomination_id: &str,
    ) -> Result<Option<Nomination>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::NOMINATIONS)
            .obj()
            .one(nomination_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create a nomination document.
    pub async fn create_nomination(&self, nomination: &Nomination) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::NOMINATIONS)
            .document_id(&nomination.id)
            .object(nomination)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Request Operations ──────────────────────────────────────

    /// Get a request by document id.
    pub async fn get_request(&self, request_id: &str) -> Result<Option<Request>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::REQUESTS)
            .obj()
            .one(request_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Store multiple request documents concurrently (one per nominee of a
    /// nomination), with a bound to avoid overloading Firestore.
    pub async fn create_requests(&self, requests: &[Request]) -> Result<(), AppError> {
        let client = self.get_client()?;

        stream::iter(requests.to_vec())
            .map(|request| async move {
                let _: () = client
                    .fluent()
                    .update()
                    .in_col(collections::REQUESTS)
                    .document_id(&request.id)
                    .object(&request)
                    .execute()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;

                Ok::<_, AppError>(())
            })
            .buffer_unordered(MAX_CONCURRENT_DB_OPS)
            .collect::<Vec<Result<(), AppError>>>()
            .await
            .into_iter()
            .collect::<Result<Vec<()>, AppError>>()?;

        Ok(())
    }

    /// Flip a request's active flag to true.
    ///
    /// Idempotent; returns `false` without error when the request does not
    /// exist.
    pub async fn set_request_active(&self, request_id: &str) -> Result<bool, AppError> {
        let Some(mut request) = self.get_request(request_id).await? else {
            return Ok(false);
        };

        request.active = true;

        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::REQUESTS)
            .document_id(&request.id)
            .object(&request)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(true)
    }

    /// Delete a request. Returns `false` if it did not exist.
    pub async fn delete_request(&self, request_id: &str) -> Result<bool, AppError> {
        if self.get_request(request_id).await?.is_none() {
            return Ok(false);
        }

        self.get_client()?
            .fluent()
            .delete()
            .from(collections::REQUESTS)
            .document_id(request_id)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(true)
    }

    /// Get requests addressed to a nominee, optionally filtered by the
    /// active flag.
    pub async fn requests_for_nominee(
        &self,
        nominee_id: &str,
        active: Option<bool>,
    ) -> Result<Vec<Request>, AppError> {
        let nominee_id = nominee_id.to_string();
        let query = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::REQUESTS);

        let query = if let Some(active) = active {
            query.filter(move |q| {
                q.for_all([
                    q.field("nominee_id").eq(nominee_id.clone()),
                    q.field("active").eq(active),
                ])
            })
        } else {
            query.filter(move |q| q.for_all([q.field("nominee_id").eq(nominee_id.clone())]))
        };

        query
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Deed Operations ─────────────────────────────────────────

    /// Get a deed by document id.
    pub async fn get_deed(&self, deed_id: &str) -> Result<Option<Deed>, AppError> {
        get_deed_with(self.get_client()?, deed_id).await
    }

    /// Write a deed document directly, outside the completion transaction.
    pub async fn create_deed(&self, deed: &Deed) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::DEEDS)
            .document_id(&deed.id)
            .object(deed)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Get all deeds completed by a user.
    pub async fn deeds_for_user(&self, user_id: &str) -> Result<Vec<Deed>, AppError> {
        let user_id = user_id.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::DEEDS)
            .filter(move |q| q.for_all([q.field("user_id").eq(user_id.clone())]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get the full deed set of a challenge (the chain).
    pub async fn deeds_for_challenge(&self, challenge_id: &str) -> Result<Vec<Deed>, AppError> {
        let challenge_id = challenge_id.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::DEEDS)
            .filter(move |q| q.for_all([q.field("challenge_id").eq(challenge_id.clone())]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a user's contribution record in a challenge.
    ///
    /// Users complete a challenge at most once, so this is the deed a new
    /// nominee links behind.
    pub async fn find_deed_for_user_in_challenge(
        &self,
        user_id: &str,
        challenge_id: &str,
    ) -> Result<Option<Deed>, AppError> {
        let user_id = user_id.to_string();
        let challenge_id = challenge_id.to_string();
        let matches: Vec<Deed> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::DEEDS)
            .filter(move |q| {
                q.for_all([
                    q.field("user_id").eq(user_id.clone()),
                    q.field("challenge_id").eq(challenge_id.clone()),
                ])
            })
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(matches.into_iter().next())
    }

    /// Walk backward from a deed id through `prev_deed_id` links, loading
    /// every ancestor.
    ///
    /// Carries a visited-set guard so corrupt pointer data errors out
    /// instead of hanging; a dangling predecessor ends the walk early.
    pub async fn load_ancestors(&self, start: Option<String>) -> Result<Vec<Deed>, AppError> {
        walk_ancestors(self.get_client()?, start).await
    }

    // ─── Atomic Deed Completion ──────────────────────────────────

    /// Atomically resolve an accepted request: create the deed, back-patch
    /// the predecessor's `next_deed_id`, increment every ancestor's
    /// contribution counter, and delete the request.
    ///
    /// The request, the predecessor, and every ancestor are read inside
    /// the transaction, which registers them for conflict detection: a
    /// concurrent completion touching the same chain invalidates this
    /// commit, and the whole read-link-write cycle is re-run with fresh
    /// counters. Reading the request the same way means one request can
    /// never produce two deeds.
    ///
    /// Returns the new deed with its chain pointers filled in.
    pub async fn commit_completion(
        &self,
        new_deed: &Deed,
        predecessor_id: Option<&str>,
        request_id: &str,
    ) -> Result<Deed, AppError> {
        let client = self.get_client()?;

        let mut attempt = 1;
        loop {
            let mut transaction = client
                .begin_transaction()
                .await
                .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

            let txn_client = client.clone_with_consistency_selector(
                firestore::FirestoreConsistencySelector::Transaction(
                    transaction.transaction_id().clone(),
                ),
            );

            // The request must still exist; a concurrent accept or decline
            // that removed it fails this completion instead of letting it
            // mint a second deed.
            let request: Option<Request> = txn_client
                .fluent()
                .select()
                .by_id_in(collections::REQUESTS)
                .obj()
                .one(request_id)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;

            if request.is_none() {
                let _ = transaction.rollback().await;
                return Err(AppError::NotFound(format!(
                    "Request {} not found",
                    request_id
                )));
            }

            // Counters must come from reads inside the transaction; a
            // snapshot taken before it would commit over a concurrent
            // completion unchallenged.
            let predecessor = match predecessor_id {
                Some(id) => get_deed_with(&txn_client, id).await?,
                None => None,
            };
            let ancestors = match &predecessor {
                Some(pred) => walk_ancestors(&txn_client, pred.prev_deed_id.clone()).await?,
                None => Vec::new(),
            };

            let writes = chain::link_completion(new_deed.clone(), predecessor, ancestors);

            for deed in std::iter::once(&writes.new_deed).chain(writes.touched.iter()) {
                client
                    .fluent()
                    .update()
                    .in_col(collections::DEEDS)
                    .document_id(&deed.id)
                    .object(deed)
                    .add_to_transaction(&mut transaction)
                    .map_err(|e| {
                        AppError::Database(format!("Failed to add deed to transaction: {}", e))
                    })?;
            }

            client
                .fluent()
                .delete()
                .from(collections::REQUESTS)
                .document_id(request_id)
                .add_to_transaction(&mut transaction)
                .map_err(|e| {
                    AppError::Database(format!(
                        "Failed to add request deletion to transaction: {}",
                        e
                    ))
                })?;

            match transaction.commit().await {
                Ok(_) => {
                    tracing::info!(
                        deed_id = %writes.new_deed.id,
                        request_id,
                        ancestors_updated = writes.touched.len(),
                        "Deed completion committed atomically"
                    );
                    return Ok(writes.new_deed);
                }
                Err(e) if attempt < MAX_TXN_ATTEMPTS => {
                    tracing::warn!(
                        attempt,
                        request_id,
                        error = %e,
                        "Completion transaction conflicted, retrying"
                    );
                    attempt += 1;
                }
                Err(e) => {
                    return Err(AppError::Database(format!(
                        "Transaction commit failed: {}",
                        e
                    )));
                }
            }
        }
    }
}

async fn get_deed_with(
    client: &firestore::FirestoreDb,
    deed_id: &str,
) -> Result<Option<Deed>, AppError> {
    client
        .fluent()
        .select()
        .by_id_in(collections::DEEDS)
        .obj()
        .one(deed_id)
        .await
        .map_err(|e| AppError::Database(e.to_string()))
}

async fn walk_ancestors(
    client: &firestore::FirestoreDb,
    start: Option<String>,
) -> Result<Vec<Deed>, AppError> {
    let mut ancestors = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut cursor = start;

    while let Some(deed_id) = cursor {
        if !seen.insert(deed_id.clone()) {
            return Err(chain_corruption(ChainError::Cycle(deed_id)));
        }
        if ancestors.len() >= MAX_CHAIN_DEPTH {
            return Err(chain_corruption(ChainError::DepthExceeded));
        }

        match get_deed_with(client, &deed_id).await? {
            Some(deed) => {
                cursor = deed.prev_deed_id.clone();
                ancestors.push(deed);
            }
            None => {
                tracing::warn!(deed_id = %deed_id, "Ancestor walk hit a dangling prev_deed_id");
                break;
            }
        }
    }

    Ok(ancestors)
}

fn chain_corruption(err: ChainError) -> AppError {
    AppError::Database(format!("Deed chain corruption: {}", err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_ids_are_firestore_shaped() {
        let id = new_doc_id();
        assert_eq!(id.len(), 20);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(id, new_doc_id());
    }
}
