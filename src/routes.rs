//! HTTP route handlers for the identification service.
//!
//! Thin boundary over the core: accepts multipart audio uploads for the
//! "add song" and "match" operations and returns JSON results.

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::index::Database;
use crate::landmark::{self, Profile};
use crate::matching;

/// Audio uploads are considerably larger than the axum default limit.
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

pub struct AppState {
    pub db: Database,
    pub match_threshold: u32,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/add_song", post(add_song))
        .route("/match", post(match_song))
        .route("/health", get(|| async { "healthy" }))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

#[derive(Serialize)]
pub struct AddSongResponse {
    status: &'static str,
    song_id: i64,
    song_name: String,
    landmarks_count: usize,
}

#[derive(Serialize)]
pub struct MatchResponse {
    song: Option<String>,
    confidence: u32,
    match_found: bool,
}

struct Upload {
    audio_bytes: Vec<u8>,
    file_name: Option<String>,
    song_name: Option<String>,
}

/// Pull the `file` field (and optional `name` field) out of a multipart
/// upload. A missing or empty `file` field is a client error.
async fn read_upload(multipart: &mut Multipart) -> Result<Upload, StatusCode> {
    let mut audio_bytes = Vec::new();
    let mut file_name = None;
    let mut song_name = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?
    {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("file") => {
                file_name = field.file_name().map(str::to_string);
                audio_bytes = field
                    .bytes()
                    .await
                    .map_err(|_| StatusCode::BAD_REQUEST)?
                    .to_vec();
            }
            Some("name") => {
                song_name = Some(field.text().await.map_err(|_| StatusCode::BAD_REQUEST)?);
            }
            _ => {}
        }
    }

    if audio_bytes.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    Ok(Upload { audio_bytes, file_name, song_name })
}

/// Ingest an uploaded song into the fingerprint index.
///
/// Unreadable audio still records the song, with zero landmarks; the
/// response's `landmarks_count` is the only signal of that degradation.
async fn add_song(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<AddSongResponse>, StatusCode> {
    let upload = read_upload(&mut multipart).await?;
    let song_name = upload
        .song_name
        .or_else(|| upload.file_name.clone())
        .unwrap_or_else(|| "unknown".to_string());
    let file_path = upload.file_name.unwrap_or_default();

    let landmarks = tokio::task::spawn_blocking(move || {
        landmark::extract_or_empty(&upload.audio_bytes, Profile::Ingestion)
    })
    .await
    .map_err(internal)?;

    let song_id = state
        .db
        .ingest(&song_name, &file_path, &landmarks)
        .await
        .map_err(internal)?;

    log::info!(
        "added '{}' as song {} with {} landmarks",
        song_name,
        song_id,
        landmarks.len()
    );

    Ok(Json(AddSongResponse {
        status: "success",
        song_id,
        song_name,
        landmarks_count: landmarks.len(),
    }))
}

/// Match an uploaded clip against the index.
async fn match_song(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<MatchResponse>, StatusCode> {
    let upload = read_upload(&mut multipart).await?;

    let landmarks = tokio::task::spawn_blocking(move || {
        landmark::extract_or_empty(&upload.audio_bytes, Profile::Query)
    })
    .await
    .map_err(internal)?;

    let outcome = matching::best_match(&state.db, &landmarks)
        .await
        .map_err(internal)?;

    let match_found = outcome.song_name.is_some() && outcome.score >= state.match_threshold;
    Ok(Json(MatchResponse {
        song: outcome.song_name,
        confidence: outcome.score,
        match_found,
    }))
}

fn internal<E: std::fmt::Display>(e: E) -> StatusCode {
    log::error!("request failed: {e}");
    StatusCode::INTERNAL_SERVER_ERROR
}
