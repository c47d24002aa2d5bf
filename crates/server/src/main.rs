//! snaplist REST API server
//!
//! Accepts uploaded photos or raw camera frames and answers with the list
//! items recognized in them. Requests carrying the same `session` share a
//! coordinator, so within a session an upload that finishes after a newer
//! one started is answered as superseded. Requests without a session never
//! supersede each other.

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use core_pipeline::{
    parse_list, ImportCoordinator, ImportError, ImportOutcome, ImportReport, OcrEngine,
    PipelineConfig, ProgressSink, ProgressUpdate, RawImage, Rotation, TesseractEngine,
};
use llm_bridge::{
    OllamaClient, OllamaConfig, VisionOcrEngine, DEFAULT_NOMINAL_CONFIDENCE, DEFAULT_VISION_MODEL,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Largest accepted upload (phone photos run to several megabytes)
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

struct AppState {
    engine: Arc<dyn OcrEngine>,
    config: PipelineConfig,
    sessions: Mutex<HashMap<String, Arc<ImportCoordinator>>>,
}

impl AppState {
    fn new(engine: Arc<dyn OcrEngine>, config: PipelineConfig) -> Self {
        Self {
            engine,
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Coordinator for a capture session; anonymous requests get their own
    async fn coordinator(&self, session: Option<&str>) -> Arc<ImportCoordinator> {
        let fresh = || Arc::new(ImportCoordinator::new(self.engine.clone(), self.config.clone()));
        match session {
            Some(id) => self
                .sessions
                .lock()
                .await
                .entry(id.to_string())
                .or_insert_with(fresh)
                .clone(),
            None => fresh(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let config = match std::env::var("SNAPLIST_CONFIG") {
        Ok(path) => PipelineConfig::from_json_file(&path)
            .with_context(|| format!("Failed to load config {}", path))?,
        Err(_) => PipelineConfig::default(),
    };
    let engine: Arc<dyn OcrEngine> = match std::env::var("SNAPLIST_ENGINE").as_deref() {
        Ok("ollama") => {
            let model = std::env::var("SNAPLIST_MODEL")
                .unwrap_or_else(|_| DEFAULT_VISION_MODEL.to_string());
            let confidence = match std::env::var("SNAPLIST_NOMINAL_CONFIDENCE") {
                Ok(value) => value
                    .parse()
                    .with_context(|| format!("Bad SNAPLIST_NOMINAL_CONFIDENCE '{}'", value))?,
                Err(_) => DEFAULT_NOMINAL_CONFIDENCE,
            };
            let client = OllamaClient::new(OllamaConfig::from_env())?;
            Arc::new(VisionOcrEngine::new(client, model).with_nominal_confidence(confidence))
        }
        _ => Arc::new(TesseractEngine::new(std::env::var("TESSDATA_PREFIX").ok())),
    };
    tracing::info!("Using {} OCR engine", engine.name());

    let state = Arc::new(AppState::new(engine, config));

    let addr = std::env::var("SNAPLIST_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".to_string());
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app(state)).await?;
    Ok(())
}

fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/parse", post(parse_text))
        .route("/api/import", post(import_image))
        .route("/api/frames", post(import_frame))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

/// Forwards pipeline progress to the log
struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&self, update: ProgressUpdate) {
        tracing::debug!("{} ({}%)", update.stage, update.percent);
    }
}

#[derive(Deserialize)]
struct ParseRequest {
    text: String,
}

#[derive(Serialize)]
struct ParseResponse {
    items: Vec<String>,
}

async fn parse_text(Json(request): Json<ParseRequest>) -> Json<ParseResponse> {
    Json(ParseResponse {
        items: parse_list(&request.text),
    })
}

#[derive(Deserialize)]
struct ImportQuery {
    #[serde(default)]
    rotation: i32,
    session: Option<String>,
}

#[derive(Deserialize)]
struct FrameQuery {
    width: u32,
    height: u32,
    #[serde(default)]
    rotation: i32,
    session: Option<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
}

enum ApiError {
    BadRotation(i32),
    Import(ImportError),
    Superseded(u64),
}

impl From<ImportError> for ApiError {
    fn from(e: ImportError) -> Self {
        ApiError::Import(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            ApiError::BadRotation(degrees) => (
                StatusCode::BAD_REQUEST,
                "bad_rotation",
                format!("{degrees} is not a multiple of 90"),
            ),
            ApiError::Superseded(sequence) => (
                StatusCode::CONFLICT,
                "superseded",
                format!("import {sequence} was replaced by a newer request"),
            ),
            ApiError::Import(e) => {
                tracing::warn!("import failed: {}", e);
                let (status, error) = match &e {
                    ImportError::SourceUnavailable { .. } | ImportError::Decode(_) => {
                        (StatusCode::BAD_REQUEST, "source_unavailable")
                    }
                    ImportError::NoUsableText => (StatusCode::UNPROCESSABLE_ENTITY, "no_usable_text"),
                    ImportError::Encode(_) | ImportError::RecognitionUnavailable(_) => {
                        (StatusCode::BAD_GATEWAY, "recognition_unavailable")
                    }
                };
                (status, error, e.user_message().to_string())
            }
        };
        (status, Json(ErrorResponse { error, message })).into_response()
    }
}

fn parse_rotation(degrees: i32) -> Result<Rotation, ApiError> {
    Rotation::from_degrees(degrees).ok_or(ApiError::BadRotation(degrees))
}

async fn run_import(
    state: &AppState,
    session: Option<&str>,
    source: RawImage,
    rotation: Rotation,
) -> Result<Json<ImportReport>, ApiError> {
    let coordinator = state.coordinator(session).await;
    match coordinator
        .import_image(&source, rotation, &LogProgress)
        .await?
    {
        ImportOutcome::Completed(report) => Ok(Json(report)),
        ImportOutcome::Superseded { sequence } => Err(ApiError::Superseded(sequence)),
    }
}

async fn import_image(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ImportQuery>,
    body: Bytes,
) -> Result<Json<ImportReport>, ApiError> {
    let rotation = parse_rotation(query.rotation)?;
    let source = RawImage::from_bytes(&body)?;
    run_import(&state, query.session.as_deref(), source, rotation).await
}

async fn import_frame(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FrameQuery>,
    body: Bytes,
) -> Result<Json<ImportReport>, ApiError> {
    let rotation = parse_rotation(query.rotation)?;
    let source = RawImage::from_frame(query.width, query.height, body.to_vec())?;
    run_import(&state, query.session.as_deref(), source, rotation).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use core_pipeline::ocr::EngineProgress;
    use core_pipeline::{OcrError, OcrOutput, RecognitionConfig};
    use std::time::Duration;
    use tower::ServiceExt;

    struct FixedEngine(&'static str);

    #[async_trait]
    impl OcrEngine for FixedEngine {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn recognize(
            &self,
            _png: &[u8],
            _config: &RecognitionConfig,
            _progress: EngineProgress<'_>,
        ) -> Result<OcrOutput, OcrError> {
            Ok(OcrOutput {
                text: self.0.to_string(),
                confidence: 90.0,
            })
        }
    }

    fn test_app(text: &'static str) -> Router {
        app(Arc::new(AppState::new(
            Arc::new(FixedEngine(text)),
            PipelineConfig::default(),
        )))
    }

    /// Answers after a delay so requests overlap
    struct SlowEngine;

    #[async_trait]
    impl OcrEngine for SlowEngine {
        fn name(&self) -> &str {
            "slow"
        }

        async fn recognize(
            &self,
            _png: &[u8],
            _config: &RecognitionConfig,
            _progress: EngineProgress<'_>,
        ) -> Result<OcrOutput, OcrError> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(OcrOutput {
                text: "Leche\nPan\nHuevos\nArroz\nAceite".to_string(),
                confidence: 90.0,
            })
        }
    }

    /// Statuses of two uploads, the second sent 10 ms after the first
    async fn overlapping_imports(first: &str, second: &str) -> (StatusCode, StatusCode) {
        let router = app(Arc::new(AppState::new(
            Arc::new(SlowEngine),
            PipelineConfig::default(),
        )));
        let upload = |uri: String| Request::post(uri).body(Body::from(png_bytes())).unwrap();

        let a = router.clone().oneshot(upload(format!("/api/import{first}")));
        let b = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            router.clone().oneshot(upload(format!("/api/import{second}"))).await
        };
        let (a, b) = tokio::join!(a, b);
        (a.unwrap().status(), b.unwrap().status())
    }

    fn png_bytes() -> Vec<u8> {
        let img = image::GrayImage::from_fn(20, 10, |x, _| image::Luma([if x < 10 { 0 } else { 255 }]));
        let mut bytes = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let response = test_app("")
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_parse_endpoint() {
        let response = test_app("")
            .oneshot(
                Request::post("/api/parse")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"text":"1. Leche\n- Pan\n• Huevos"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["items"], serde_json::json!(["Leche", "Pan", "Huevos"]));
    }

    #[tokio::test]
    async fn test_import_endpoint_returns_items() {
        let response = test_app("Leche\nPan")
            .oneshot(
                Request::post("/api/import?rotation=90")
                    .body(Body::from(png_bytes()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["items"], serde_json::json!(["Leche", "Pan"]));
    }

    #[tokio::test]
    async fn test_import_endpoint_no_usable_text() {
        let response = test_app("  \n")
            .oneshot(Request::post("/api/import").body(Body::from(png_bytes())).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json_body(response).await;
        assert_eq!(body["error"], "no_usable_text");
    }

    #[tokio::test]
    async fn test_import_endpoint_rejects_garbage() {
        let response = test_app("Leche")
            .oneshot(Request::post("/api/import").body(Body::from("nope")).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_bad_rotation() {
        let response = test_app("Leche")
            .oneshot(
                Request::post("/api/import?rotation=45")
                    .body(Body::from(png_bytes()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"], "bad_rotation");
    }

    #[tokio::test]
    async fn test_frame_endpoint_rejects_empty_frame() {
        let response = test_app("Leche")
            .oneshot(
                Request::post("/api/frames?width=0&height=0")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"], "source_unavailable");
    }

    #[tokio::test]
    async fn test_frame_endpoint_accepts_rgba() {
        let rgba: Vec<u8> = (0..8 * 4 * 4).map(|i| if i % 8 < 4 { 0 } else { 255 }).collect();
        let response = test_app("Leche\nPan\nHuevos")
            .oneshot(
                Request::post("/api/frames?width=8&height=4&rotation=-90")
                    .body(Body::from(rgba))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["items"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_separate_sessions_do_not_supersede() {
        let (a, b) = overlapping_imports("?session=kitchen", "?session=garage").await;
        assert_eq!((a, b), (StatusCode::OK, StatusCode::OK));
    }

    #[tokio::test]
    async fn test_anonymous_requests_do_not_supersede() {
        let (a, b) = overlapping_imports("", "").await;
        assert_eq!((a, b), (StatusCode::OK, StatusCode::OK));
    }

    #[tokio::test]
    async fn test_newer_import_in_session_supersedes() {
        let (a, b) = overlapping_imports("?session=kitchen", "?session=kitchen").await;
        assert_eq!((a, b), (StatusCode::CONFLICT, StatusCode::OK));
    }
}
