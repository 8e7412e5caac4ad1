//! HTTP surface: CSV upload, single-record classification, and health.

use std::io::Cursor;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Multipart, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use logroute_ai::Router;
use logroute_core::Label;
use logroute_store::{LogTable, StoreError};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::pipeline::classify_table;

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><title>Log Classification</title></head>
<body style="font-family: Arial; margin: 40px;">
    <h1>Log Classification</h1>
    <h3>Upload CSV File</h3>
    <p>CSV must have 'source' and 'log_message' columns</p>
    <form action="/classify/" method="post" enctype="multipart/form-data">
        <input type="file" name="file" accept=".csv" required><br><br>
        <button type="submit">Classify Logs</button>
    </form>
</body>
</html>
"#;

#[derive(Clone)]
pub struct AppState {
    pub router: Router,
    pub concurrency: usize,
    /// Where each labeled upload is also persisted.
    pub output: PathBuf,
    /// Serializes writes to `output` across concurrent uploads.
    write_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(router: Router, concurrency: usize, output: PathBuf) -> Self {
        Self {
            router,
            concurrency,
            output,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Replace the persisted output with `body`, one upload at a time.
    async fn persist(&self, body: &[u8]) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.output, body).await?;
        Ok(())
    }
}

pub fn app(state: AppState) -> axum::Router {
    axum::Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/classify/", post(classify_upload))
        .route("/classify-single/", post(classify_single))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

/// Error body in the `{"detail": ...}` shape.
struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        let status = match &e {
            StoreError::MissingColumns { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            detail: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "detail": self.detail })),
        )
            .into_response()
    }
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}

async fn classify_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?
    {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or_default().to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(e.to_string()))?;
            upload = Some((filename, bytes));
            break;
        }
    }

    let (filename, bytes) = upload.ok_or_else(|| ApiError::bad_request("missing 'file' field"))?;
    if !filename.ends_with(".csv") {
        return Err(ApiError::bad_request("File must be CSV"));
    }

    let table = LogTable::read_csv_from(Cursor::new(bytes))?;
    let labeled = match classify_table(&state.router, &table, state.concurrency).await {
        Ok((labeled, _)) => labeled,
        Err(e) => {
            warn!(file = %filename, error = %e, "rejected upload");
            return Err(e.into());
        }
    };
    let body = labeled.to_csv_bytes()?;
    state.persist(&body).await?;
    info!(
        file = %filename,
        rows = labeled.num_rows(),
        output = %state.output.display(),
        "classified upload"
    );

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"classified_{filename}\""),
            ),
        ],
        body,
    )
        .into_response())
}

#[derive(Deserialize)]
struct SingleQuery {
    source: String,
    log_message: String,
}

#[derive(Serialize)]
struct SingleResponse {
    source: String,
    log_message: String,
    classification: Label,
}

async fn classify_single(
    State(state): State<AppState>,
    Query(q): Query<SingleQuery>,
) -> Json<SingleResponse> {
    let classification = state.router.route(&q.source, &q.log_message).await;
    Json(SingleResponse {
        source: q.source,
        log_message: q.log_message,
        classification,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::pattern_router;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    const BOUNDARY: &str = "logroute-test-boundary";

    fn test_app(output: PathBuf) -> axum::Router {
        app(AppState::new(pattern_router(), 4, output))
    }

    fn upload(filename: &str, content: &str) -> Request<Body> {
        let body = format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
             Content-Type: text/csv\r\n\r\n\
             {content}\r\n\
             --{BOUNDARY}--\r\n"
        );
        Request::builder()
            .method("POST")
            .uri("/classify/")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), 1_000_000)
            .await
            .unwrap();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    #[tokio::test]
    async fn health_reports_healthy() {
        let dir = tempfile::tempdir().unwrap();
        let response = test_app(dir.path().join("out.csv"))
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(json, serde_json::json!({"status": "healthy"}));
    }

    #[tokio::test]
    async fn index_serves_upload_form() {
        let dir = tempfile::tempdir().unwrap();
        let response = test_app(dir.path().join("out.csv"))
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let text = body_text(response).await;
        assert!(text.contains("action=\"/classify/\""));
        assert!(text.contains("name=\"file\""));
    }

    #[tokio::test]
    async fn single_record_is_classified() {
        let dir = tempfile::tempdir().unwrap();
        let response = test_app(dir.path().join("out.csv"))
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/classify-single/?source=ModernCRM&log_message=User%20User123%20logged%20in.")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "source": "ModernCRM",
                "log_message": "User User123 logged in.",
                "classification": "User Action"
            })
        );
    }

    #[tokio::test]
    async fn single_record_requires_both_params() {
        let dir = tempfile::tempdir().unwrap();
        let response = test_app(dir.path().join("out.csv"))
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/classify-single/?source=ModernCRM")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn upload_is_labeled_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("resources").join("output.csv");
        let csv = "source,log_message\n\
                   ModernCRM,User User123 logged in.\n\
                   BillingSystem,Backup completed successfully.";

        let response = test_app(output.clone())
            .oneshot(upload("logs.csv", csv))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"classified_logs.csv\""
        );

        let text = body_text(response).await;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "source,log_message,target_label");
        assert_eq!(lines[1], "ModernCRM,User User123 logged in.,User Action");
        assert_eq!(
            lines[2],
            "BillingSystem,Backup completed successfully.,System Notification"
        );

        assert_eq!(std::fs::read_to_string(&output).unwrap(), text);
    }

    #[tokio::test]
    async fn concurrent_uploads_persist_one_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.csv");
        let app = test_app(output.clone());
        let first = (0..200)
            .map(|i| format!("ModernCRM,User User{i} logged in."))
            .collect::<Vec<_>>()
            .join("\n");
        let second = (0..200)
            .map(|i| format!("BillingSystem,Backup completed successfully. run {i}"))
            .collect::<Vec<_>>()
            .join("\n");

        let (a, b) = tokio::join!(
            app.clone()
                .oneshot(upload("a.csv", &format!("source,log_message\n{first}"))),
            app.oneshot(upload("b.csv", &format!("source,log_message\n{second}"))),
        );
        let a = body_text(a.unwrap()).await;
        let b = body_text(b.unwrap()).await;
        assert_ne!(a, b);

        let persisted = std::fs::read_to_string(&output).unwrap();
        assert!(persisted == a || persisted == b, "persisted file mixes uploads");
    }

    #[tokio::test]
    async fn non_csv_upload_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.csv");
        let response = test_app(output.clone())
            .oneshot(upload("logs.txt", "source,log_message\na,b"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(json["detail"], "File must be CSV");
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn missing_columns_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.csv");
        let response = test_app(output.clone())
            .oneshot(upload("logs.csv", "source,message\nModernCRM,hello"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(
            json["detail"],
            "CSV must have 'source' and 'log_message' columns"
        );
        assert!(!output.exists());
    }
}
