// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The persistence API.
//!
//! JSON over HTTP, mapping the [`crate::store::Store`] onto
//! `/api/songs` and `/api/users`. Missing documents map to 404, everything
//! else the store reports maps to 500.

use std::error::Error;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::info;

use crate::store::{Song, Store, StoreError, UserProfile};

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let status = match self {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(serde_json::json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
struct OwnerQuery {
    owner: Option<String>,
}

/// Builds the API router over the given store.
pub fn router(store: Arc<Store>) -> Router {
    Router::new()
        .route(
            "/api/songs",
            get(list_songs).post(create_song).delete(delete_songs),
        )
        .route(
            "/api/songs/:id",
            get(get_song).put(update_song).delete(delete_song),
        )
        .route("/api/users", get(list_users).post(create_user))
        .route(
            "/api/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
        .with_state(store)
}

/// Serves the API on the given address until the process exits.
pub async fn serve(store: Arc<Store>, listen_addr: &str) -> Result<(), Box<dyn Error>> {
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    info!(addr = listen_addr, "Persistence API listening.");
    axum::serve(listener, router(store)).await?;
    Ok(())
}

async fn list_songs(
    State(store): State<Arc<Store>>,
    Query(query): Query<OwnerQuery>,
) -> Json<Vec<Song>> {
    Json(store.list_songs(query.owner.as_deref()))
}

async fn get_song(
    State(store): State<Arc<Store>>,
    Path(id): Path<String>,
) -> Result<Json<Song>, StoreError> {
    Ok(Json(store.get_song(&id)?))
}

async fn create_song(
    State(store): State<Arc<Store>>,
    Json(song): Json<Song>,
) -> (StatusCode, Json<Song>) {
    (StatusCode::CREATED, Json(store.create_song(song)))
}

async fn update_song(
    State(store): State<Arc<Store>>,
    Path(id): Path<String>,
    Json(song): Json<Song>,
) -> Result<Json<Song>, StoreError> {
    Ok(Json(store.update_song(&id, song)?))
}

async fn delete_song(
    State(store): State<Arc<Store>>,
    Path(id): Path<String>,
) -> Result<StatusCode, StoreError> {
    store.delete_song(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Bulk delete, scoped to one owner via the query string.
async fn delete_songs(
    State(store): State<Arc<Store>>,
    Query(query): Query<OwnerQuery>,
) -> Response {
    match query.owner {
        Some(owner) => {
            let deleted = store.delete_songs_by_owner(&owner);
            Json(serde_json::json!({ "deleted": deleted })).into_response()
        }
        None => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "owner query parameter is required" })),
        )
            .into_response(),
    }
}

async fn list_users(State(store): State<Arc<Store>>) -> Json<Vec<UserProfile>> {
    Json(store.list_users())
}

async fn get_user(
    State(store): State<Arc<Store>>,
    Path(id): Path<String>,
) -> Result<Json<UserProfile>, StoreError> {
    Ok(Json(store.get_user(&id)?))
}

async fn create_user(
    State(store): State<Arc<Store>>,
    Json(user): Json<UserProfile>,
) -> (StatusCode, Json<UserProfile>) {
    (StatusCode::CREATED, Json(store.create_user(user)))
}

async fn update_user(
    State(store): State<Arc<Store>>,
    Path(id): Path<String>,
    Json(user): Json<UserProfile>,
) -> Result<Json<UserProfile>, StoreError> {
    Ok(Json(store.update_user(&id, user)?))
}

async fn delete_user(
    State(store): State<Arc<Store>>,
    Path(id): Path<String>,
) -> Result<StatusCode, StoreError> {
    store.delete_user(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod test {
    use super::*;

    fn store_with_song() -> (Arc<Store>, Song) {
        let store = Arc::new(Store::new());
        let song = store.create_song(Song {
            id: String::new(),
            owner: "alice".to_string(),
            title: "Prelude".to_string(),
            chords: vec![vec!["C".to_string(), "E".to_string(), "G".to_string()]],
        });
        (store, song)
    }

    #[test]
    fn test_router_builds() {
        // All routes register without panicking.
        let _router = router(Arc::new(Store::new()));
    }

    #[test]
    fn test_store_error_status_mapping() {
        let not_found = StoreError::NotFound("song 1".to_string()).into_response();
        assert_eq!(StatusCode::NOT_FOUND, not_found.status());

        let internal = StoreError::Internal("broken".to_string()).into_response();
        assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, internal.status());
    }

    #[tokio::test]
    async fn test_song_handlers() {
        let (store, song) = store_with_song();

        let Json(songs) = list_songs(
            State(store.clone()),
            Query(OwnerQuery {
                owner: Some("alice".to_string()),
            }),
        )
        .await;
        assert_eq!(vec![song.clone()], songs);

        let fetched = get_song(State(store.clone()), Path(song.id.clone()))
            .await
            .expect("get failed");
        assert_eq!(song, fetched.0);

        let missing = get_song(State(store.clone()), Path("999".to_string())).await;
        assert_eq!(
            StatusCode::NOT_FOUND,
            missing.err().unwrap().into_response().status()
        );

        let status = delete_song(State(store.clone()), Path(song.id.clone()))
            .await
            .expect("delete failed");
        assert_eq!(StatusCode::NO_CONTENT, status);
    }

    #[tokio::test]
    async fn test_create_assigns_id() {
        let store = Arc::new(Store::new());
        let (status, Json(created)) = create_song(
            State(store.clone()),
            Json(Song {
                id: String::new(),
                owner: "bob".to_string(),
                title: "New".to_string(),
                chords: vec![],
            }),
        )
        .await;
        assert_eq!(StatusCode::CREATED, status);
        assert!(!created.id.is_empty());
        assert_eq!(created, store.get_song(&created.id).unwrap());
    }

    #[tokio::test]
    async fn test_bulk_delete_requires_owner() {
        let (store, _) = store_with_song();

        let response = delete_songs(State(store.clone()), Query(OwnerQuery { owner: None })).await;
        assert_eq!(StatusCode::BAD_REQUEST, response.status());
        assert_eq!(1, store.list_songs(None).len());

        let response = delete_songs(
            State(store.clone()),
            Query(OwnerQuery {
                owner: Some("alice".to_string()),
            }),
        )
        .await;
        assert_eq!(StatusCode::OK, response.status());
        assert!(store.list_songs(None).is_empty());
    }
}
