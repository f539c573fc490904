use crate::config::Config;
use crate::db::Db;
use crate::error::{Result, ChatsnipError};
use crate::ingest::{self, IngestOutcome, Submission};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use reqwest::Client;
use std::path::PathBuf;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::{Any, AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// HTTP ingestion server wrapper
pub struct HttpServer {
    state: AppState,
    allowed_origins: Vec<String>,
}

impl HttpServer {
    /// Create a new HTTP server around a database and configuration.
    ///
    /// The outbound client carries the configured timeout; the ingestion core
    /// itself never retries a timed-out fetch.
    pub fn new(db: Db, config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.retrieval.fetch_timeout_secs))
            .build()
            .map_err(ChatsnipError::Http)?;

        Ok(Self {
            state: AppState {
                db,
                client,
                media_dir: config.media_dir().to_path_buf(),
            },
            allowed_origins: config.http_server.allowed_origins.clone(),
        })
    }

    /// Run the HTTP server
    pub async fn run(&self, port: u16) -> Result<()> {
        std::fs::create_dir_all(&self.state.media_dir).map_err(ChatsnipError::Io)?;

        let app = self.create_router();

        let addr = format!("127.0.0.1:{}", port);
        log::info!("Starting Chatsnip HTTP server on http://{}", addr);
        log::info!("Ingestion endpoint: http://{}/api/chats", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| {
                ChatsnipError::Io(std::io::Error::new(
                    std::io::ErrorKind::AddrInUse,
                    format!(
                        "Failed to bind to {}: {}. Another process may be using the port; set http_server.port in config.toml to change it.",
                        addr, e
                    ),
                ))
            })?;

        axum::serve(listener, app)
            .await
            .map_err(|e| ChatsnipError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("HTTP server error: {}", e)
            )))?;

        Ok(())
    }

    /// Create the axum router
    fn create_router(&self) -> Router {
        // Build CORS layer: explicit origins when configured, otherwise allow
        // all for local use
        let cors = if self.allowed_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<axum::http::HeaderValue> = self
                .allowed_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        Router::new()
            .route("/api/chats", post(handle_submit))
            .route("/health", get(handle_health))
            .nest_service("/media", ServeDir::new(&self.state.media_dir))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(cors),
            )
            .with_state(self.state.clone())
    }
}

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    db: Db,
    client: Client,
    media_dir: PathBuf,
}

/// Handle a transcript submission.
///
/// Auth failures map to 400/403 with the exact status strings the capture
/// client displays; an unchanged resubmission answers 208 Already Reported.
async fn handle_submit(
    State(state): State<AppState>,
    body: axum::body::Bytes,
) -> Response {
    let submission: Submission = match serde_json::from_slice(&body) {
        Ok(s) => s,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": format!("Invalid JSON: {}", e)})),
            )
                .into_response();
        }
    };

    let chat_id = submission.chat_id.clone();
    match ingest::ingest_submission(&state.db, &state.client, &state.media_dir, submission).await {
        Ok(IngestOutcome::Duplicate) => (
            StatusCode::ALREADY_REPORTED,
            Json(serde_json::json!({"status": "Duplicate content."})),
        )
            .into_response(),
        Ok(outcome) => (
            StatusCode::OK,
            Json(serde_json::json!({"status": outcome.status_message()})),
        )
            .into_response(),
        Err(ChatsnipError::ApiKeyMissing) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"status": "API key missing."})),
        )
            .into_response(),
        Err(ChatsnipError::InvalidApiKey) => (
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({"status": "Invalid API key."})),
        )
            .into_response(),
        Err(e) => {
            log::error!("Error ingesting submission for chat {}: {}", chat_id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": "Internal server error",
                    "details": e.to_string()
                })),
            )
                .into_response()
        }
    }
}

/// Handle health check endpoint
async fn handle_health() -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "service": "chatsnip",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChatsnipConfig, HttpServerConfig, RetrievalConfig};
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct TestServer {
        base: String,
        api_key: String,
        _tmp: TempDir,
    }

    async fn spawn_server() -> TestServer {
        let tmp = TempDir::new().unwrap();
        let db = Db::new(tmp.path().join("test.db"));
        let migrations_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("migrations");
        db.with_connection(move |conn| crate::db::migrate::run_migrations(conn, &migrations_dir))
            .await
            .unwrap();
        let profile = crate::store::profiles::create(&db, "tester").await.unwrap();

        let media_dir = tmp.path().join("media");
        std::fs::create_dir_all(&media_dir).unwrap();
        let config = Config {
            chatsnip: ChatsnipConfig {
                db_path: tmp.path().join("test.db"),
                media_dir,
                log_level: "info".to_string(),
            },
            http_server: HttpServerConfig::default(),
            retrieval: RetrievalConfig::default(),
        };

        let server = HttpServer::new(db, &config).unwrap();
        let app = server.create_router();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        TestServer {
            base: format!("http://{}", addr),
            api_key: profile.api_key,
            _tmp: tmp,
        }
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let server = spawn_server().await;
        let resp = reqwest::get(format!("{}/health", server.base)).await.unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "chatsnip");
    }

    #[tokio::test]
    async fn test_submit_missing_api_key() {
        let server = spawn_server().await;
        let client = reqwest::Client::new();
        let resp = client
            .post(format!("{}/api/chats", server.base))
            .json(&serde_json::json!({
                "chatId": "c1",
                "content": [{"content": "hello"}]
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 400);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "API key missing.");
    }

    #[tokio::test]
    async fn test_submit_invalid_api_key() {
        let server = spawn_server().await;
        let client = reqwest::Client::new();
        let resp = client
            .post(format!("{}/api/chats", server.base))
            .json(&serde_json::json!({
                "apiKey": "not-a-key",
                "chatId": "c1",
                "content": [{"content": "hello"}]
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 403);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "Invalid API key.");
    }

    #[tokio::test]
    async fn test_submit_then_duplicate() {
        let server = spawn_server().await;
        let client = reqwest::Client::new();
        let payload = serde_json::json!({
            "apiKey": server.api_key,
            "chatId": "c1",
            "chatName": "My Chat",
            "content": [
                {"content": "Here you go:"},
                {"filename": "main.py", "language": "python", "content": "print(1)"}
            ]
        });

        let resp = client
            .post(format!("{}/api/chats", server.base))
            .json(&payload)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "Process done. Saved chat & code.");

        let resp = client
            .post(format!("{}/api/chats", server.base))
            .json(&payload)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 208);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "Duplicate content.");
    }

    #[tokio::test]
    async fn test_submit_malformed_json() {
        let server = spawn_server().await;
        let client = reqwest::Client::new();
        let resp = client
            .post(format!("{}/api/chats", server.base))
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 400);
    }

    #[tokio::test]
    async fn test_media_files_are_served() {
        let server = spawn_server().await;
        let media_dir = server._tmp.path().join("media").join("chat_images").join("1");
        std::fs::create_dir_all(&media_dir).unwrap();
        std::fs::write(media_dir.join("pic.png"), b"\x89PNG\r\n\x1a\ndata").unwrap();

        let resp = reqwest::get(format!("{}/media/chat_images/1/pic.png", server.base))
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        let bytes = resp.bytes().await.unwrap();
        assert!(bytes.starts_with(b"\x89PNG"));
    }
}
