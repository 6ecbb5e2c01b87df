//! HTTP API for the import pipeline.
//!
//! A thin JSON layer over [`Importer`] for the upload → preview → commit
//! flow of a front end. File content travels base64-encoded inside JSON
//! bodies.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/imports/analyze` | Structural preview of one file |
//! | `POST` | `/imports/commit` | Import one file |
//! | `POST` | `/imports/batch` | Import many files |
//! | `GET`  | `/submissions` | List committed submissions |
//! | `DELETE` | `/submissions/{id}` | Delete one submission |
//! | `GET`  | `/stats` | Counts by vendor, action and outlet type |
//! | `GET`  | `/tracks-summary` | Per-track outcome counts, latest first |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "unprocessable", "message": "file is empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `unprocessable`
//! (422, the file itself could not be imported), `internal` (500). A 422
//! from `/imports/commit` also carries `partial` when some rows were
//! already written. `/imports/batch` only rejects the request as a whole
//! when it is malformed; a file with bad content or a bad budget is
//! reported as that file's failure.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::batch::{cancel_after, BatchFile, BatchReport, FileSource};
use crate::config::Config;
use crate::db;
use crate::error::{FileError, ImportFailure};
use crate::importer::{Analysis, CommitRequest, Importer};
use crate::migrate;
use crate::models::{Budget, Campaign, ImportSummary, SubmissionRecord};
use crate::progress::NoProgress;
use crate::stats::{SubmissionStats, TrackSummary};
use crate::store::SubmissionFilter;

#[derive(Clone)]
struct AppState {
    importer: Importer,
}

/// Starts the HTTP server on `[server].bind`. Runs until the process is
/// terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;
    let importer = Importer::sqlite(pool, config.import.clone());

    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "Import server listening");
    println!("Import server listening on http://{}", bind_addr);

    axum::serve(listener, router(importer)).await?;
    Ok(())
}

/// Routes and middleware, separate from binding so tests can drive it.
pub fn router(importer: Importer) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/imports/analyze", post(handle_analyze))
        .route("/imports/commit", post(handle_commit))
        .route("/imports/batch", post(handle_batch))
        .route("/submissions", get(handle_submissions))
        .route("/submissions/{id}", delete(handle_delete_submission))
        .route("/stats", get(handle_stats))
        .route("/tracks-summary", get(handle_tracks_summary))
        .layer(cors)
        .with_state(AppState { importer })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
    #[serde(skip_serializing_if = "Option::is_none")]
    partial: Option<ImportSummary>,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
    partial: Option<ImportSummary>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
            partial: self.partial,
        };
        (self.status, Json(body)).into_response()
    }
}

fn app_error(status: StatusCode, code: &str, message: impl Into<String>) -> AppError {
    AppError {
        status,
        code: code.to_string(),
        message: message.into(),
        partial: None,
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    app_error(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn not_found(message: impl Into<String>) -> AppError {
    app_error(StatusCode::NOT_FOUND, "not_found", message)
}

fn internal(message: impl Into<String>) -> AppError {
    app_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

impl From<FileError> for AppError {
    fn from(err: FileError) -> Self {
        ImportFailure::new(err).into()
    }
}

impl From<ImportFailure> for AppError {
    fn from(failure: ImportFailure) -> Self {
        let message = format!("{}: {}", failure.error.code(), failure.error);
        let mut e = match failure.error {
            FileError::UnknownArtist(_) => not_found(message),
            FileError::CatalogFault(_) | FileError::StoreFault(_)
                if failure.partial.is_none() =>
            {
                internal(message)
            }
            _ => app_error(StatusCode::UNPROCESSABLE_ENTITY, "unprocessable", message),
        };
        e.partial = failure.partial;
        e
    }
}

fn decode_base64(content_base64: &str) -> Result<Vec<u8>, String> {
    base64::engine::general_purpose::STANDARD
        .decode(content_base64.trim())
        .map_err(|e| format!("content_base64 is not valid base64: {}", e))
}

fn decode_content(content_base64: &str) -> Result<Vec<u8>, AppError> {
    decode_base64(content_base64).map_err(bad_request)
}

fn parse_budget(raw: Option<&str>) -> Result<Option<Budget>, String> {
    raw.map(str::parse::<Budget>).transpose()
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /imports/analyze ============

#[derive(Deserialize)]
struct AnalyzeRequest {
    filename: String,
    content_base64: String,
}

async fn handle_analyze(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<Analysis>, AppError> {
    let bytes = decode_content(&req.content_base64)?;
    let analysis = state.importer.analyze(&bytes, &req.filename)?;
    Ok(Json(analysis))
}

// ============ POST /imports/commit ============

#[derive(Deserialize)]
struct FilePayload {
    filename: String,
    content_base64: String,
    #[serde(default)]
    artist_id: Option<String>,
    #[serde(default)]
    campaign_name: Option<String>,
    /// Decimal string, e.g. `"150.00"`.
    #[serde(default)]
    budget: Option<String>,
}

impl FilePayload {
    fn into_request(self) -> Result<CommitRequest, AppError> {
        if self.filename.trim().is_empty() {
            return Err(bad_request("filename must not be empty"));
        }
        let budget = parse_budget(self.budget.as_deref()).map_err(bad_request)?;
        Ok(CommitRequest {
            bytes: decode_content(&self.content_base64)?,
            campaign: Campaign::new(self.campaign_name.as_deref(), budget),
            explicit_artist_id: self.artist_id.filter(|a| !a.trim().is_empty()),
            filename: self.filename,
        })
    }

    /// Batch form: problems with this payload become this file's failure.
    fn into_batch_file(self) -> BatchFile {
        if self.filename.trim().is_empty() {
            return BatchFile::rejected(
                self.filename,
                FileError::Read("filename must not be empty".into()),
            );
        }
        let budget = match parse_budget(self.budget.as_deref()) {
            Ok(budget) => budget,
            Err(e) => return BatchFile::rejected(self.filename, FileError::InvalidCampaign(e)),
        };
        let source = match decode_base64(&self.content_base64) {
            Ok(bytes) => FileSource::Bytes(bytes),
            Err(e) => FileSource::Rejected(FileError::Decode(e)),
        };
        BatchFile {
            source,
            campaign: Campaign::new(self.campaign_name.as_deref(), budget),
            explicit_artist_id: self.artist_id.filter(|a| !a.trim().is_empty()),
            filename: self.filename,
        }
    }
}

#[derive(Deserialize)]
struct CommitBody {
    #[serde(flatten)]
    file: FilePayload,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

async fn handle_commit(
    State(state): State<AppState>,
    Json(body): Json<CommitBody>,
) -> Result<Json<ImportSummary>, AppError> {
    let request = body.file.into_request()?;
    let cancel = CancellationToken::new();
    let timer = body
        .timeout_secs
        .map(|s| cancel_after(cancel.clone(), Duration::from_secs(s)));

    let result = state.importer.commit(&request, &cancel).await;
    if let Some(t) = timer {
        t.abort();
    }
    Ok(Json(result?))
}

// ============ POST /imports/batch ============

#[derive(Deserialize)]
struct BatchBody {
    files: Vec<FilePayload>,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

async fn handle_batch(
    State(state): State<AppState>,
    Json(body): Json<BatchBody>,
) -> Result<Json<BatchReport>, AppError> {
    if body.files.is_empty() {
        return Err(bad_request("files must not be empty"));
    }
    let files: Vec<BatchFile> = body
        .files
        .into_iter()
        .map(FilePayload::into_batch_file)
        .collect();

    let cancel = CancellationToken::new();
    let timer = body
        .timeout_secs
        .map(|s| cancel_after(cancel.clone(), Duration::from_secs(s)));

    let report = state
        .importer
        .commit_batch(files, &cancel, &NoProgress)
        .await;
    if let Some(t) = timer {
        t.abort();
    }
    Ok(Json(report))
}

// ============ GET /submissions ============

#[derive(Deserialize)]
struct SubmissionsQuery {
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Serialize)]
struct SubmissionsResponse {
    submissions: Vec<SubmissionRecord>,
}

async fn handle_submissions(
    State(state): State<AppState>,
    Query(q): Query<SubmissionsQuery>,
) -> Result<Json<SubmissionsResponse>, AppError> {
    let filter = SubmissionFilter {
        idempotency_key: q.key,
        limit: Some(q.limit.unwrap_or(100)),
    };
    let submissions = state
        .importer
        .list_submissions(&filter)
        .await
        .map_err(|e| internal(e.to_string()))?;
    Ok(Json(SubmissionsResponse { submissions }))
}

// ============ DELETE /submissions/{id} ============

#[derive(Serialize)]
struct DeleteResponse {
    success: bool,
    deleted_id: String,
}

async fn handle_delete_submission(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    let deleted = state
        .importer
        .delete_submission(&id)
        .await
        .map_err(|e| internal(e.to_string()))?;
    if !deleted {
        return Err(not_found(format!("submission not found: {}", id)));
    }
    Ok(Json(DeleteResponse {
        success: true,
        deleted_id: id,
    }))
}

// ============ GET /stats, GET /tracks-summary ============

#[derive(Deserialize)]
struct ArtistQuery {
    #[serde(default)]
    artist_id: Option<String>,
}

impl ArtistQuery {
    fn artist_id(&self) -> Option<&str> {
        self.artist_id.as_deref().filter(|a| !a.trim().is_empty())
    }
}

async fn handle_stats(
    State(state): State<AppState>,
    Query(q): Query<ArtistQuery>,
) -> Result<Json<SubmissionStats>, AppError> {
    let stats = state
        .importer
        .submission_stats(q.artist_id())
        .await
        .map_err(|e| internal(e.to_string()))?;
    Ok(Json(stats))
}

#[derive(Serialize)]
struct TracksResponse {
    tracks: Vec<TrackSummary>,
}

async fn handle_tracks_summary(
    State(state): State<AppState>,
    Query(q): Query<ArtistQuery>,
) -> Result<Json<TracksResponse>, AppError> {
    let tracks = state
        .importer
        .track_summaries(q.artist_id())
        .await
        .map_err(|e| internal(e.to_string()))?;
    Ok(Json(TracksResponse { tracks }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::config::ImportConfig;
    use crate::models::{CatalogArtist, CatalogSong};
    use crate::store::InMemoryStore;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> Router {
        let catalog = InMemoryCatalog::new();
        catalog.add_artist(CatalogArtist {
            artist_id: "a1".into(),
            name: "Jonathan Fitas".into(),
        });
        catalog.add_song(CatalogSong {
            song_id: "s1".into(),
            artist_id: "a1".into(),
            canonical_title: "Radiance".into(),
            isrc: Some("PTXX12400001".into()),
            upc: None,
        });
        let store = Arc::new(InMemoryStore::new());
        router(Importer::new(
            Arc::new(catalog),
            store.clone(),
            store,
            ImportConfig::default(),
        ))
    }

    fn b64(s: &str) -> String {
        base64::engine::general_purpose::STANDARD.encode(s)
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn post(app: Router, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let req = Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        send(app, req).await
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        send(app, Request::get(uri).body(Body::empty()).unwrap()).await
    }

    const CSV: &str = "Outlet,Action,Sent\nIndie Blog,Approved,2024-03-01\n";

    #[tokio::test]
    async fn analyze_returns_preview() {
        let (status, json) = post(
            app(),
            "/imports/analyze",
            serde_json::json!({
                "filename": "Jonathan Fitas - Radiance.csv",
                "content_base64": b64(CSV)
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["total_rows"], 1);
        assert_eq!(json["hint"]["artist_name"], "Jonathan Fitas");
        assert_eq!(json["columns_detected"][0], "Outlet");
    }

    #[tokio::test]
    async fn commit_then_recommit() {
        let app = app();
        let body = serde_json::json!({
            "filename": "Jonathan Fitas - Radiance.csv",
            "content_base64": b64(CSV),
            "campaign_name": "Spring",
            "budget": "150.00"
        });
        let (status, json) = post(app.clone(), "/imports/commit", body.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["created_count"], 1);
        assert_eq!(json["matched_songs"][0]["catalog_key"], "PTXX12400001");
        assert_eq!(json["campaign"]["budget"], "150.00");

        let (status, json) = post(app, "/imports/commit", body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["created_count"], 0);
        assert_eq!(json["already_committed_count"], 1);
    }

    #[tokio::test]
    async fn empty_file_is_unprocessable() {
        let (status, json) = post(
            app(),
            "/imports/commit",
            serde_json::json!({ "filename": "x.csv", "content_base64": "" }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["error"]["code"], "unprocessable");
    }

    #[tokio::test]
    async fn bad_inputs_are_rejected() {
        let (status, json) = post(
            app(),
            "/imports/analyze",
            serde_json::json!({ "filename": "x.csv", "content_base64": "%%%" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "bad_request");

        let (status, _) = post(
            app(),
            "/imports/commit",
            serde_json::json!({
                "filename": "x.csv",
                "content_base64": b64(CSV),
                "budget": "-4"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, json) = post(
            app(),
            "/imports/commit",
            serde_json::json!({
                "filename": "x.csv",
                "content_base64": b64(CSV),
                "artist_id": "missing"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"]["code"], "not_found");
    }

    #[tokio::test]
    async fn batch_reports_each_file() {
        let (status, json) = post(
            app(),
            "/imports/batch",
            serde_json::json!({
                "files": [
                    { "filename": "Jonathan Fitas - Radiance.csv", "content_base64": b64(CSV) },
                    { "filename": "broken.csv", "content_base64": b64("") }
                ]
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["succeeded"], 1);
        assert_eq!(json["failed"], 1);
        assert_eq!(json["files"][1]["outcome"], "failed");
        assert_eq!(json["files"][1]["error"]["code"], "empty_input");
    }

    #[tokio::test]
    async fn batch_keeps_going_past_undecodable_payloads() {
        let (status, json) = post(
            app(),
            "/imports/batch",
            serde_json::json!({
                "files": [
                    { "filename": "bad-base64.csv", "content_base64": "%%%" },
                    { "filename": "Jonathan Fitas - Radiance.csv", "content_base64": b64(CSV) },
                    { "filename": "bad-budget.csv", "content_base64": b64(CSV), "budget": "-4" }
                ]
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["succeeded"], 1);
        assert_eq!(json["failed"], 2);
        assert_eq!(json["files"][0]["file_name"], "bad-base64.csv");
        assert_eq!(json["files"][0]["error"]["code"], "decode_error");
        assert_eq!(json["files"][1]["outcome"], "succeeded");
        assert_eq!(json["files"][2]["error"]["code"], "invalid_campaign");
    }

    #[tokio::test]
    async fn stats_tracks_and_delete() {
        let app = app();
        let csv = "Outlet,Outlet type,Action,Sent,Feedback\n\
                   Indie Blog,blog,Approved,2024-03-01,Loved it\n\
                   Chill List,playlist,Declined,2024-03-04,\n";
        let (status, _) = post(
            app.clone(),
            "/imports/commit",
            serde_json::json!({
                "filename": "Jonathan Fitas - Radiance.csv",
                "content_base64": b64(csv),
                "campaign_name": "Spring",
                "budget": "150"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, json) = get(app.clone(), "/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["total_submissions"], 2);
        assert_eq!(json["by_vendor"]["submithub"], 2);
        assert_eq!(json["by_outlet_type"]["playlist"], 1);
        assert_eq!(json["total_approvals"], 1);

        let (_, json) = get(app.clone(), "/stats?artist_id=nobody").await;
        assert_eq!(json["total_submissions"], 0);

        let (status, json) = get(app.clone(), "/tracks-summary").await;
        assert_eq!(status, StatusCode::OK);
        let track = &json["tracks"][0];
        assert_eq!(track["song_title"], "Radiance");
        assert_eq!(track["catalog_key"], "PTXX12400001");
        assert_eq!(track["total_submissions"], 2);
        assert_eq!(track["total_declined"], 1);
        assert_eq!(track["latest_submitted_on"], "2024-03-04");

        let (_, json) = get(app.clone(), "/submissions").await;
        let first = &json["submissions"][0];
        assert_eq!(first["outlet_type"], "blog");
        assert_eq!(first["feedback"], "Loved it");
        assert_eq!(first["campaign"]["budget"], "150.00");
        assert!(first["raw_json"].as_str().unwrap().contains("Indie Blog"));
        let id = first["id"].as_str().unwrap().to_string();

        let uri = format!("/submissions/{}", id);
        let del = || Request::delete(uri.as_str()).body(Body::empty()).unwrap();
        let (status, json) = send(app.clone(), del()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["deleted_id"], id.as_str());

        let (status, json) = send(app.clone(), del()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"]["code"], "not_found");

        let (_, json) = get(app, "/stats").await;
        assert_eq!(json["total_submissions"], 1);
    }
}
