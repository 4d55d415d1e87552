//! HTTP surface: JSON and multipart endpoints over the orchestrator.
//!
//! Session-scoped endpoints read the session token from `x-session-id`.
//! Every failure is rendered by [`ApiError`] as `{success: false, ...}`.

pub mod response;

pub use response::{ApiError, SESSION_HEADER, SessionToken};

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::VerifyError;
use crate::orchestrator::Orchestrator;
use crate::session::{ImageUpload, SessionId, VerificationStep};

/// Request bodies may exceed the 5 MiB image cap so oversize uploads reach
/// validation and get a proper error.
pub const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

type ApiResult = Result<Json<Value>, ApiError>;

/// Build the router with every endpoint.
pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    let state = AppState { orchestrator };

    Router::new()
        .route("/health", get(health))
        .route("/sessions", post(create_session))
        .route("/sessions/{id}", get(get_session))
        .route("/sessions/advance", post(advance_session))
        .route("/verify/liveness", post(verify_liveness))
        .route("/verify/id", post(verify_id))
        .route("/verify/tax-pin", post(verify_tax_pin))
        .route("/verify/phone", post(verify_phone))
        .route("/extract-id", post(extract_id))
        .route("/otp/send", post(send_otp))
        .route("/otp/verify", post(verify_otp))
        .route("/submit", post(submit))
        .route("/notify/email", post(notify_email))
        .route("/invitations", post(send_invitation))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "identity-verify"
    }))
}

// ── Sessions ────────────────────────────────────────────────────────────

async fn create_session(State(state): State<AppState>) -> impl IntoResponse {
    let id = state.orchestrator.start_session().await;
    (
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "sessionId": id,
            "currentStep": VerificationStep::Liveness,
        })),
    )
}

async fn get_session(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let id: SessionId = id
        .parse()
        .map_err(|_| VerifyError::validation("id", "Session token is malformed"))?;
    let status = state.orchestrator.status(id).await?;
    Ok(Json(json!({ "success": true, "session": status })))
}

async fn advance_session(State(state): State<AppState>, SessionToken(id): SessionToken) -> ApiResult {
    let step = state.orchestrator.advance(id).await?;
    Ok(Json(json!({ "success": true, "currentStep": step })))
}

// ── Verification steps ──────────────────────────────────────────────────

async fn verify_liveness(
    State(state): State<AppState>,
    SessionToken(id): SessionToken,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult {
    let mut form = read_form(multipart?, &["image"]).await?;
    let image = form.take_file("image", "No image file provided")?;

    let outcome = state.orchestrator.submit_liveness(id, image).await?;
    let message = if outcome.is_real {
        "Liveness check passed"
    } else {
        "Liveness check failed. Please try again."
    };
    Ok(Json(json!({
        "success": true,
        "is_real": outcome.is_real,
        "confidence": outcome.confidence,
        "processing_time": outcome.processing_time,
        "message": message,
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdRequest {
    #[serde(default)]
    id_number: String,
}

async fn verify_id(
    State(state): State<AppState>,
    SessionToken(id): SessionToken,
    body: Result<Json<IdRequest>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body?;
    let record = state.orchestrator.submit_id_number(id, &body.id_number).await?;
    Ok(Json(json!({
        "success": true,
        "data": record,
        "message": "ID verification successful",
    })))
}

#[derive(Deserialize)]
struct TaxPinRequest {
    #[serde(default, alias = "kraPin")]
    pin: String,
}

async fn verify_tax_pin(
    State(state): State<AppState>,
    SessionToken(id): SessionToken,
    body: Result<Json<TaxPinRequest>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body?;
    let record = state.orchestrator.submit_tax_pin(id, &body.pin).await?;
    Ok(Json(json!({
        "success": true,
        "data": record,
        "message": "KRA PIN verification successful",
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PhoneRequest {
    #[serde(default)]
    phone_number: String,
}

async fn verify_phone(
    State(state): State<AppState>,
    SessionToken(id): SessionToken,
    body: Result<Json<PhoneRequest>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body?;
    let record = state.orchestrator.verify_phone_direct(id, &body.phone_number).await?;
    Ok(Json(json!({
        "success": true,
        "data": record,
        "message": "Phone verification successful",
    })))
}

async fn extract_id(State(state): State<AppState>, multipart: Result<Multipart, MultipartRejection>) -> ApiResult {
    let mut form = read_form(multipart?, &["image"]).await?;
    let image = form.take_file("image", "No image file provided")?;

    let data = state.orchestrator.extract_document(image).await?;
    Ok(Json(json!({
        "success": true,
        "data": data,
        "message": "ID extraction successful",
    })))
}

// ── OTP ─────────────────────────────────────────────────────────────────

async fn send_otp(
    State(state): State<AppState>,
    SessionToken(id): SessionToken,
    body: Result<Json<PhoneRequest>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body?;
    let expires_at = state.orchestrator.request_phone_otp(id, &body.phone_number).await?;
    Ok(Json(json!({
        "success": true,
        "expiresAt": expires_at,
        "message": "OTP sent successfully via WhatsApp",
    })))
}

#[derive(Deserialize)]
struct OtpVerifyRequest {
    #[serde(default, alias = "otp")]
    code: String,
}

async fn verify_otp(
    State(state): State<AppState>,
    SessionToken(id): SessionToken,
    body: Result<Json<OtpVerifyRequest>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body?;
    state.orchestrator.verify_phone_otp(id, &body.code).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Phone number verified successfully",
    })))
}

// ── Submission ──────────────────────────────────────────────────────────

/// Client-supplied `idData`/`taxData` fields are read and discarded; the
/// confirmation only uses server-verified records.
async fn submit(
    State(state): State<AppState>,
    SessionToken(id): SessionToken,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult {
    let mut form = read_form(multipart?, &["cardImage", "atmCard"]).await?;
    let card = form.files.remove("cardImage").or_else(|| form.files.remove("atmCard"));
    let email = form.text.remove("email").unwrap_or_default();

    let submission = state.orchestrator.finalize(id, &email, card).await?;
    Ok(Json(json!({
        "success": true,
        "referenceNumber": submission.reference_number,
        "emailSent": submission.email_sent,
        "message": "Verification submitted successfully",
    })))
}

#[derive(Deserialize)]
struct EmailRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    subject: String,
    #[serde(default)]
    message: String,
}

async fn notify_email(State(state): State<AppState>, body: Result<Json<EmailRequest>, JsonRejection>) -> ApiResult {
    let Json(body) = body?;
    state
        .orchestrator
        .notifier()
        .send_notification(&body.email, &body.subject, &body.message)
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Email sent successfully",
    })))
}

#[derive(Deserialize)]
struct InvitationRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    message: Option<String>,
}

async fn send_invitation(
    State(state): State<AppState>,
    body: Result<Json<InvitationRequest>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body?;
    let invitation = state
        .orchestrator
        .notifier()
        .send_invitation(&body.email, body.message.as_deref())
        .await?;
    Ok(Json(json!({
        "success": true,
        "link": invitation.link,
        "message": "Verification link sent successfully",
    })))
}

// ── Multipart helpers ───────────────────────────────────────────────────

#[derive(Default)]
struct UploadForm {
    files: HashMap<String, ImageUpload>,
    text: HashMap<String, String>,
}

impl UploadForm {
    fn take_file(&mut self, name: &str, missing: &str) -> Result<ImageUpload, ApiError> {
        self.files
            .remove(name)
            .ok_or_else(|| VerifyError::validation(name, missing).into())
    }
}

/// Collect a multipart body. Fields named in `file_fields` are kept as
/// uploads, everything else as text.
async fn read_form(mut multipart: Multipart, file_fields: &[&str]) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();
    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if file_fields.contains(&name.as_str()) {
            let file_name = field.file_name().map(str::to_string);
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = field.bytes().await?;
            form.files
                .insert(name, ImageUpload::new(file_name, content_type, bytes.to_vec()));
        } else {
            let value = field.text().await?;
            form.text.insert(name, value);
        }
    }
    Ok(form)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::config::ServiceConfig;
    use crate::testing::StubGateway;

    fn app() -> Router {
        let orchestrator = Orchestrator::new(Arc::new(StubGateway::new()), &ServiceConfig::default());
        router(Arc::new(orchestrator))
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn missing_session_header_is_rejected() {
        let request = Request::post("/verify/id")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"idNumber":"12345678"}"#))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "validation_error");
    }

    #[tokio::test]
    async fn malformed_json_uses_envelope() {
        let request = Request::post("/notify/email")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["success"], false);
    }

    #[tokio::test]
    async fn non_multipart_upload_uses_envelope() {
        let request = Request::post("/extract-id")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"image":"x"}"#))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "validation_error");
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let request = Request::post("/verify/id")
            .header("content-type", "application/json")
            .header(SESSION_HEADER, SessionId::new().to_string())
            .body(Body::from(r#"{"idNumber":"12345678"}"#))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"], "session_not_found");
    }
}
