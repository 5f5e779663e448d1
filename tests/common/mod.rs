//! Shared fixtures for route tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use parking_lot::Mutex;
use serde_json::Value;
use tower::ServiceExt;

use nebula_pdf_server::config::{Config, RazorpayConfig};
use nebula_pdf_server::db::create_pool;
use nebula_pdf_server::gateway::{
    Gateway, GatewayError, GatewayOperation, InputFile, OperationKind, PdfVendor, ProcessedFile,
};
use nebula_pdf_server::state::AppState;
use nebula_pdf_server::storage::S3Client;

pub const RAZORPAY_SECRET: &str = "test_secret";
pub const BOUNDARY: &str = "nebula-test-boundary";

/// Vendor that echoes its input and counts calls, or fails on demand
#[derive(Default)]
pub struct EchoVendor {
    pub calls: AtomicUsize,
    failure: Mutex<Option<String>>,
}

impl EchoVendor {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make every later call fail with `message`
    pub fn fail_with(&self, message: &str) {
        *self.failure.lock() = Some(message.to_string());
    }
}

#[async_trait]
impl PdfVendor for EchoVendor {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn supports(&self, _kind: OperationKind) -> bool {
        true
    }

    async fn process(
        &self,
        op: &GatewayOperation,
        input: InputFile,
    ) -> Result<ProcessedFile, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.failure.lock().clone() {
            return Err(GatewayError::Vendor(message));
        }
        Ok(ProcessedFile {
            file_name: op.output_name(&input.name),
            bytes: input.bytes,
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub vendor: Arc<EchoVendor>,
}

/// App over an in-memory database and an unreachable bucket
pub async fn test_app() -> TestApp {
    test_app_with_storage("http://127.0.0.1:9").await
}

/// App whose bucket lives at `endpoint`
pub async fn test_app_with_storage(endpoint: &str) -> TestApp {
    let mut config = Config::default();
    config.storage.endpoint = endpoint.to_string();
    config.storage.public_url = "https://files.example.com".to_string();
    config.payments.razorpay = Some(RazorpayConfig {
        key_id: "rzp_test_key".to_string(),
        key_secret: RAZORPAY_SECRET.to_string(),
        api_base: "http://127.0.0.1:9".to_string(),
    });

    let vendor = Arc::new(EchoVendor::default());
    let gateway = Gateway::new().with_vendor(vendor.clone());
    let s3 = S3Client::new(&config.storage);
    let db = create_pool("sqlite::memory:").await.unwrap();
    let state = AppState::with_gateway(config, s3, db, gateway, reqwest::Client::new());

    TestApp {
        router: nebula_pdf_server::app(state.clone()),
        state,
        vendor,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }
}

pub fn json_request(method: &str, uri: &str, user: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(uid) = user {
        builder = builder.header("x-user-id", uid);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn get(uri: &str, user: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(uid) = user {
        builder = builder.header("x-user-id", uid);
    }
    builder.body(Body::empty()).unwrap()
}

/// A multipart part: (field, file name and content type for files, bytes)
pub enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a str, Vec<u8>),
}

pub fn multipart_request(uri: &str, user: Option<&str>, parts: Vec<Part<'_>>) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(name, file_name, content_type, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                        name, file_name, content_type
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(&bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    let mut builder = Request::builder().method("POST").uri(uri).header(
        header::CONTENT_TYPE,
        format!("multipart/form-data; boundary={}", BOUNDARY),
    );
    if let Some(uid) = user {
        builder = builder.header("x-user-id", uid);
    }
    builder.body(Body::from(body)).unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub async fn expect_json(response: Response<Body>, status: StatusCode) -> Value {
    assert_eq!(response.status(), status);
    body_json(response).await
}

/// Wait until the mock has seen a `method` request for `path`
pub async fn wait_for_request(server: &wiremock::MockServer, method: &str, path: &str) -> bool {
    for _ in 0..100 {
        let seen = server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .any(|r| r.method.to_string() == method && r.url.path() == path);
        if seen {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    false
}

/// A small PDF with one labelled page per entry in `sizes`
pub fn sample_pdf(sizes: &[(f32, f32)]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids: Vec<Object> = Vec::new();
    for (i, (w, h)) in sizes.iter().enumerate() {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 72.into()]),
                Operation::new("Tj", vec![Object::string_literal(format!("Page {}", i + 1))]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![0.into(), 0.into(), Object::Real(*w), Object::Real(*h)],
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}
