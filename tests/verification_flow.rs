//! End-to-end tests for the HTTP surface.
//!
//! Each test spins up an Axum server on a random port backed by the stub
//! provider gateway and drives it with reqwest.

use std::sync::Arc;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use identity_verify::api::{self, SESSION_HEADER};
use identity_verify::config::ServiceConfig;
use identity_verify::flow::PhoneProof;
use identity_verify::orchestrator::Orchestrator;
use identity_verify::testing::StubGateway;

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

struct TestServer {
    base: String,
    client: Client,
    gateway: Arc<StubGateway>,
}

impl TestServer {
    /// Start an Axum server on a random port.
    async fn start(phone_proof: PhoneProof) -> Self {
        let gateway = Arc::new(StubGateway::new());
        let config = ServiceConfig {
            phone_proof,
            ..ServiceConfig::default()
        };
        let orchestrator = Arc::new(Orchestrator::new(gateway.clone(), &config));
        let app = api::router(orchestrator);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base: format!("http://127.0.0.1:{port}"),
            client: Client::new(),
            gateway,
        }
    }

    async fn new_session(&self) -> String {
        let resp = self.client.post(format!("{}/sessions", self.base)).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["currentStep"], "liveness");
        body["sessionId"].as_str().unwrap().to_string()
    }

    async fn post_json(&self, session: &str, route: &str, body: Value) -> (StatusCode, Value) {
        let resp = self
            .client
            .post(format!("{}{route}", self.base))
            .header(SESSION_HEADER, session)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap())
    }

    async fn post_form(&self, session: &str, route: &str, form: Form) -> (StatusCode, Value) {
        let resp = self
            .client
            .post(format!("{}{route}", self.base))
            .header(SESSION_HEADER, session)
            .multipart(form)
            .send()
            .await
            .unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap())
    }

    async fn pass_liveness(&self, session: &str) {
        let form = Form::new().part("image", jpeg("selfie.jpg", 2048));
        let (status, body) = self.post_form(session, "/verify/liveness", form).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["is_real"], true);
    }

    async fn through_tax_pin(&self, session: &str) {
        self.pass_liveness(session).await;
        let (status, _) = self.post_json(session, "/verify/id", json!({ "idNumber": "12345678" })).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = self.post_json(session, "/verify/tax-pin", json!({ "pin": "A123456789Z" })).await;
        assert_eq!(status, StatusCode::OK);
    }
}

fn jpeg(name: &str, size: usize) -> Part {
    Part::bytes(vec![0xAB; size])
        .file_name(name.to_string())
        .mime_str("image/jpeg")
        .unwrap()
}

#[tokio::test]
async fn full_registry_flow_issues_reference() {
    timeout(TEST_TIMEOUT, async {
        let server = TestServer::start(PhoneProof::Registry).await;
        let session = server.new_session().await;

        server.pass_liveness(&session).await;

        let (status, body) = server.post_json(&session, "/verify/id", json!({ "idNumber": "12345678" })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["name"], "JOHN DOE");
        assert_eq!(body["data"]["dob"], "1990-01-01");

        let (status, body) = server
            .post_json(&session, "/verify/tax-pin", json!({ "pin": "A123456789Z" }))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["PINNo"], "A123456789Z");

        let (status, body) = server
            .post_json(&session, "/verify/phone", json!({ "phoneNumber": "+254712345678" }))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["name"], "JOHN DOE");
        assert_eq!(body["data"]["phone_number"], "0712345678");

        let form = Form::new()
            .text("email", "user@example.com")
            .text("idData", r#"{"name":"SOMEONE ELSE"}"#)
            .part("cardImage", jpeg("card.jpg", 4 * 1024 * 1024));
        let (status, body) = server.post_form(&session, "/submit", form).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        let reference = body["referenceNumber"].as_str().unwrap().to_string();
        let pattern = regex::Regex::new(r"^IA-[A-Z0-9]{8}$").unwrap();
        assert!(pattern.is_match(&reference), "bad reference {reference}");

        let emails = server.gateway.sent_emails();
        assert_eq!(emails.len(), 1);
        assert!(emails[0].html.contains("JOHN DOE"));
        assert!(!emails[0].html.contains("SOMEONE ELSE"));

        let resp = server
            .client
            .get(format!("{}/sessions/{session}", server.base))
            .send()
            .await
            .unwrap();
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["session"]["currentStep"], "complete");
        assert_eq!(body["session"]["referenceNumber"], reference.as_str());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn skipping_steps_is_a_conflict() {
    timeout(TEST_TIMEOUT, async {
        let server = TestServer::start(PhoneProof::Registry).await;
        let session = server.new_session().await;

        let (status, body) = server
            .post_json(&session, "/verify/tax-pin", json!({ "pin": "A123456789Z" }))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "out_of_order");

        let form = Form::new().text("email", "user@example.com");
        let (status, body) = server.post_form(&session, "/submit", form).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "incomplete_session");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn oversize_and_non_image_cards_are_rejected() {
    timeout(TEST_TIMEOUT, async {
        let server = TestServer::start(PhoneProof::Registry).await;
        let session = server.new_session().await;
        server.through_tax_pin(&session).await;
        let (status, _) = server
            .post_json(&session, "/verify/phone", json!({ "phoneNumber": "0712345678" }))
            .await;
        assert_eq!(status, StatusCode::OK);

        let form = Form::new()
            .text("email", "user@example.com")
            .part("cardImage", jpeg("card.jpg", 6 * 1024 * 1024));
        let (status, body) = server.post_form(&session, "/submit", form).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");

        let pdf = Part::bytes(vec![1; 128])
            .file_name("card.pdf")
            .mime_str("application/pdf")
            .unwrap();
        let form = Form::new().text("email", "user@example.com").part("cardImage", pdf);
        let (status, body) = server.post_form(&session, "/submit", form).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");
        assert!(server.gateway.sent_emails().is_empty());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn otp_flow_over_http() {
    timeout(TEST_TIMEOUT, async {
        let server = TestServer::start(PhoneProof::Otp).await;
        let session = server.new_session().await;
        server.through_tax_pin(&session).await;

        let (status, body) = server
            .post_json(&session, "/otp/send", json!({ "phoneNumber": "0712345678" }))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.get("code").is_none());
        assert_eq!(server.gateway.sent_messages()[0].recipient, "254712345678");

        let code = server.gateway.last_code().unwrap();
        let wrong = if code == "000000" { "111111" } else { "000000" };

        let (status, body) = server.post_json(&session, "/otp/verify", json!({ "code": wrong })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "mismatch");

        let (status, body) = server.post_json(&session, "/otp/verify", json!({ "code": code })).await;
        assert_eq!(status, StatusCode::OK, "{body}");

        let (status, body) = server.post_json(&session, "/otp/verify", json!({ "code": code })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "already_consumed");

        let (status, body) = server
            .post_json(&session, "/verify/phone", json!({ "phoneNumber": "0712345678" }))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "phone_mode_mismatch");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn notifications_and_invitations() {
    timeout(TEST_TIMEOUT, async {
        let server = TestServer::start(PhoneProof::Registry).await;

        let resp = server
            .client
            .post(format!("{}/notify/email", server.base))
            .json(&json!({ "email": "not-an-email", "subject": "Hi", "message": "Body" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = server
            .client
            .post(format!("{}/notify/email", server.base))
            .json(&json!({ "email": "user@example.com", "subject": "Hi", "message": "Line 1\nLine 2" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = server
            .client
            .post(format!("{}/invitations", server.base))
            .json(&json!({ "email": "client@example.com" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = resp.json().await.unwrap();
        let link = body["link"].as_str().unwrap();
        assert!(link.starts_with("http://localhost:3000?token="));

        let emails = server.gateway.sent_emails();
        assert_eq!(emails.len(), 2);
        assert_eq!(emails[0].html, "Line 1<br>Line 2");
        assert!(emails[1].html.contains(link));
        assert!(emails[1].html.contains("72 hours"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn document_extraction_validates_upload() {
    timeout(TEST_TIMEOUT, async {
        let server = TestServer::start(PhoneProof::Registry).await;

        let form = Form::new().part("image", jpeg("id-front.jpg", 1024));
        let resp = server
            .client
            .post(format!("{}/extract-id", server.base))
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["data"]["id_number"], "12345678");

        let text = Part::bytes(b"hello".to_vec())
            .file_name("notes.txt")
            .mime_str("text/plain")
            .unwrap();
        let resp = server
            .client
            .post(format!("{}/extract-id", server.base))
            .multipart(Form::new().part("image", text))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(server.gateway.call_count(identity_verify::testing::EXTRACT_DOCUMENT), 1);
    })
    .await
    .expect("test timed out");
}
