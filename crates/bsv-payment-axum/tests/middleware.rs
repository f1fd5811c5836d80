//! End-to-end tests for the payment middleware against a real axum router.
//!
//! The wallet collaborator is an in-memory mock with single-use nonce
//! semantics, which is enough to exercise every terminal outcome of the gate:
//! zero-price fast path, challenge issuance, malformed submissions, replayed
//! prefixes, settlement failures, and the happy path.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::{Extension, Json, Router};
use http::StatusCode;
use serde_json::{Value, json};
use tower::ServiceExt;

use bsv_payment::pricing::{FixedPrice, RequestPricing};
use bsv_payment::types::{
    DERIVATION_PREFIX_HEADER, IdentityKey, PAYMENT_HEADER, PAYMENT_VERSION_HEADER, PaymentOutcome,
    PaymentSubmission, SATOSHIS_PAID_HEADER, SATOSHIS_REQUIRED_HEADER, WALLET_PAYMENT_PROTOCOL,
};
use bsv_payment::util::b64;
use bsv_payment::wallet::{InternalizeRequest, InternalizeResponse, Wallet, WalletError};
use bsv_payment_axum::PaymentMiddleware;

const IDENTITY_KEY: &str = "02e5a1f4d1f0883f0c8a3b9ff94c5cbb4d1d6c5c8ffb4aa295ab0d1f2b2f9c1d07";

/// In-memory wallet with single-use nonce semantics.
#[derive(Default)]
struct MockWallet {
    nonces: Mutex<HashSet<String>>,
    minted: AtomicU64,
    verify_calls: AtomicU64,
    internalize_calls: AtomicU64,
    fail_create_nonce: bool,
    internalize_error: Option<WalletError>,
    last_internalize: Mutex<Option<InternalizeRequest>>,
}

impl MockWallet {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn failing_internalize(error: WalletError) -> Arc<Self> {
        Arc::new(Self {
            internalize_error: Some(error),
            ..Self::default()
        })
    }

    fn failing_create_nonce() -> Arc<Self> {
        Arc::new(Self {
            fail_create_nonce: true,
            ..Self::default()
        })
    }
}

impl Wallet for MockWallet {
    async fn create_nonce(&self) -> Result<String, WalletError> {
        if self.fail_create_nonce {
            return Err(WalletError::new("nonce store unreachable"));
        }
        let n = self.minted.fetch_add(1, Ordering::SeqCst);
        let nonce = format!("prefix-{n}");
        self.nonces.lock().unwrap().insert(nonce.clone());
        Ok(nonce)
    }

    async fn verify_nonce(&self, nonce: &str) -> Result<bool, WalletError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.nonces.lock().unwrap().remove(nonce))
    }

    async fn internalize(
        &self,
        request: &InternalizeRequest,
    ) -> Result<InternalizeResponse, WalletError> {
        self.internalize_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_internalize.lock().unwrap() = Some(request.clone());
        match &self.internalize_error {
            Some(error) => Err(error.clone()),
            None => Ok(InternalizeResponse { accepted: true }),
        }
    }
}

/// Pricing strategy whose backend is down.
#[derive(Debug, Clone)]
struct FailingPricing;

#[derive(Debug)]
struct PricingUnavailable;

impl std::fmt::Display for PricingUnavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pricing backend unavailable")
    }
}

impl RequestPricing for FailingPricing {
    type Error = PricingUnavailable;

    async fn price(&self, _request: &http::request::Parts) -> Result<u64, PricingUnavailable> {
        Err(PricingUnavailable)
    }
}

async fn paid_handler(Extension(payment): Extension<PaymentOutcome>) -> Json<Value> {
    Json(json!({
        "accepted": payment.accepted,
        "satoshisPaid": payment.satoshis_paid,
        "txLen": payment.tx.len(),
    }))
}

async fn inject_identity(mut req: Request, next: Next) -> Response {
    req.extensions_mut()
        .insert(IdentityKey(IDENTITY_KEY.to_string()));
    next.run(req).await
}

async fn inject_empty_identity(mut req: Request, next: Next) -> Response {
    req.extensions_mut().insert(IdentityKey(String::new()));
    next.run(req).await
}

/// A protected route behind authentication and payment enforcement.
fn app<W, P>(wallet: W, pricing: P) -> Router
where
    W: Wallet + Clone + Send + Sync + 'static,
    P: RequestPricing + Clone + Send + Sync + 'static,
{
    Router::new()
        .route(
            "/paid",
            get(paid_handler).layer(PaymentMiddleware::new(wallet, pricing)),
        )
        .layer(middleware::from_fn(inject_identity))
}

fn bare_request() -> Request {
    Request::builder()
        .uri("/paid")
        .body(Body::empty())
        .unwrap()
}

fn paid_request(submission_header: &str) -> Request {
    Request::builder()
        .uri("/paid")
        .header(PAYMENT_HEADER, submission_header)
        .body(Body::empty())
        .unwrap()
}

fn submission_header(prefix: &str, suffix: &str, tx: &[u8]) -> String {
    serde_json::to_string(&PaymentSubmission {
        transaction: b64::encode(tx),
        derivation_prefix: prefix.to_string(),
        derivation_suffix: suffix.to_string(),
    })
    .unwrap()
}

async fn read_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Runs the challenge round and returns the freshly minted derivation prefix.
async fn obtain_prefix(app: &Router) -> String {
    let response = app.clone().oneshot(bare_request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    response.headers()[DERIVATION_PREFIX_HEADER]
        .to_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_zero_price_proceeds_without_challenge() {
    let wallet = MockWallet::new();
    let app = app(wallet.clone(), FixedPrice(0));

    let response = app.oneshot(bare_request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(PAYMENT_VERSION_HEADER).is_none());
    assert!(response.headers().get(SATOSHIS_REQUIRED_HEADER).is_none());
    assert!(response.headers().get(SATOSHIS_PAID_HEADER).is_none());

    let body = read_json(response).await;
    assert_eq!(body["satoshisPaid"], json!(0));
    assert_eq!(body["txLen"], json!(0));

    assert_eq!(wallet.minted.load(Ordering::SeqCst), 0);
    assert_eq!(wallet.internalize_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_zero_price_ignores_payment_header() {
    let wallet = MockWallet::new();
    let app = app(wallet.clone(), FixedPrice(0));

    let header = submission_header("prefix-unseen", "suffix-1", b"tx");
    let response = app.oneshot(paid_request(&header)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(wallet.verify_calls.load(Ordering::SeqCst), 0);
    assert_eq!(wallet.internalize_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_identity_is_server_misconfigured() {
    let wallet = MockWallet::new();
    // No authentication layer at all.
    let app = Router::new().route(
        "/paid",
        get(paid_handler).layer(PaymentMiddleware::new(wallet.clone(), FixedPrice(100))),
    );

    let response = app.oneshot(bare_request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = read_json(response).await;
    assert_eq!(body["status"], json!("error"));
    assert_eq!(body["code"], json!("ERR_SERVER_MISCONFIGURED"));

    assert_eq!(wallet.minted.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_empty_identity_is_server_misconfigured() {
    let wallet = MockWallet::new();
    let app = Router::new()
        .route(
            "/paid",
            get(paid_handler).layer(PaymentMiddleware::new(wallet, FixedPrice(100))),
        )
        .layer(middleware::from_fn(inject_empty_identity));

    let response = app.oneshot(bare_request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = read_json(response).await;
    assert_eq!(body["code"], json!("ERR_SERVER_MISCONFIGURED"));
}

#[tokio::test]
async fn test_challenge_issued_when_payment_absent() {
    let wallet = MockWallet::new();
    let app = app(wallet, FixedPrice(100));

    let response = app.oneshot(bare_request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);

    let headers = response.headers();
    assert_eq!(headers[PAYMENT_VERSION_HEADER], "1.0");
    assert_eq!(headers[SATOSHIS_REQUIRED_HEADER], "100");
    assert!(!headers[DERIVATION_PREFIX_HEADER].is_empty());

    let body = read_json(response).await;
    assert_eq!(body["status"], json!("error"));
    assert_eq!(body["code"], json!("ERR_PAYMENT_REQUIRED"));
    assert_eq!(body["satoshisRequired"], json!(100));
    assert!(body["description"].as_str().unwrap().contains("100"));
}

#[tokio::test]
async fn test_challenge_prefixes_are_fresh_per_request() {
    let wallet = MockWallet::new();
    let app = app(wallet, FixedPrice(100));

    let first = obtain_prefix(&app).await;
    let second = obtain_prefix(&app).await;
    assert_ne!(first, second);
}

#[tokio::test]
async fn test_nonce_mint_failure_is_internal() {
    let wallet = MockWallet::failing_create_nonce();
    let app = app(wallet, FixedPrice(100));

    let response = app.oneshot(bare_request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = read_json(response).await;
    assert_eq!(body["code"], json!("ERR_PAYMENT_INTERNAL"));
    // The wallet's failure detail stays out of the response.
    assert!(!body["description"].as_str().unwrap().contains("unreachable"));
}

#[tokio::test]
async fn test_pricing_failure_is_internal() {
    let wallet = MockWallet::new();
    let app = app(wallet.clone(), FailingPricing);

    let response = app.oneshot(bare_request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = read_json(response).await;
    assert_eq!(body["code"], json!("ERR_PAYMENT_INTERNAL"));
    assert_eq!(wallet.minted.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_malformed_header_is_rejected() {
    let wallet = MockWallet::new();
    let app = app(wallet.clone(), FixedPrice(100));

    let response = app.oneshot(paid_request("not json")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = read_json(response).await;
    assert_eq!(body["status"], json!("error"));
    assert_eq!(body["code"], json!("ERR_MALFORMED_PAYMENT"));

    // Parsing fails before any wallet call.
    assert_eq!(wallet.verify_calls.load(Ordering::SeqCst), 0);
    assert_eq!(wallet.internalize_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_bad_transaction_encoding_is_malformed() {
    let wallet = MockWallet::new();
    let app = app(wallet.clone(), FixedPrice(100));

    let header = json!({
        "transaction": "%%% not base64 %%%",
        "derivationPrefix": "prefix-0",
        "derivationSuffix": "suffix-1",
    })
    .to_string();
    let response = app.oneshot(paid_request(&header)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = read_json(response).await;
    assert_eq!(body["code"], json!("ERR_MALFORMED_PAYMENT"));
    assert_eq!(wallet.verify_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unknown_prefix_is_rejected() {
    let wallet = MockWallet::new();
    let app = app(wallet.clone(), FixedPrice(100));

    let header = submission_header("prefix-never-minted", "suffix-1", b"tx");
    let response = app.oneshot(paid_request(&header)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = read_json(response).await;
    assert_eq!(body["code"], json!("ERR_INVALID_DERIVATION_PREFIX"));
    assert_eq!(wallet.internalize_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_replayed_prefix_is_rejected() {
    let wallet = MockWallet::new();
    let app = app(wallet.clone(), FixedPrice(100));

    let prefix = obtain_prefix(&app).await;
    let header = submission_header(&prefix, "suffix-1", b"raw tx bytes");

    let first = app.clone().oneshot(paid_request(&header)).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app.oneshot(paid_request(&header)).await.unwrap();
    assert_eq!(second.status(), StatusCode::BAD_REQUEST);

    let body = read_json(second).await;
    assert_eq!(body["code"], json!("ERR_INVALID_DERIVATION_PREFIX"));
    // One settlement happened, not two.
    assert_eq!(wallet.internalize_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_valid_payment_proceeds() {
    let wallet = MockWallet::new();
    let app = app(wallet.clone(), FixedPrice(100));

    let prefix = obtain_prefix(&app).await;
    let tx = b"raw tx bytes";
    let header = submission_header(&prefix, "suffix-1", tx);

    let response = app.oneshot(paid_request(&header)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[SATOSHIS_PAID_HEADER], "100");

    let body = read_json(response).await;
    assert_eq!(body["accepted"], json!(true));
    assert_eq!(body["satoshisPaid"], json!(100));
    assert_eq!(body["txLen"], json!(tx.len()));

    let recorded = wallet.last_internalize.lock().unwrap().clone().unwrap();
    assert_eq!(recorded.tx, tx);
    assert_eq!(recorded.description, "Payment for HTTP request");
    assert_eq!(recorded.outputs.len(), 1);
    let output = &recorded.outputs[0];
    assert_eq!(output.output_index, 0);
    assert_eq!(output.protocol, WALLET_PAYMENT_PROTOCOL);
    assert_eq!(output.payment_remittance.derivation_prefix, prefix);
    assert_eq!(output.payment_remittance.derivation_suffix, "suffix-1");
    assert_eq!(output.payment_remittance.sender_identity_key, IDENTITY_KEY);
}

#[tokio::test]
async fn test_settlement_failure_surfaces_wallet_code() {
    let wallet =
        MockWallet::failing_internalize(WalletError::coded("ERR_DOUBLE_SPEND", "input spent"));
    let app = app(wallet, FixedPrice(100));

    let prefix = obtain_prefix(&app).await;
    let header = submission_header(&prefix, "suffix-1", b"tx");
    let response = app.oneshot(paid_request(&header)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = read_json(response).await;
    assert_eq!(body["status"], json!("error"));
    assert_eq!(body["code"], json!("ERR_DOUBLE_SPEND"));
}

#[tokio::test]
async fn test_settlement_failure_defaults_to_generic_code() {
    let wallet = MockWallet::failing_internalize(WalletError::new("broadcast failed"));
    let app = app(wallet, FixedPrice(100));

    let prefix = obtain_prefix(&app).await;
    let header = submission_header(&prefix, "suffix-1", b"tx");
    let response = app.oneshot(paid_request(&header)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = read_json(response).await;
    assert_eq!(body["code"], json!("ERR_PAYMENT_FAILED"));
    assert!(!body["description"].as_str().unwrap().contains("broadcast"));
}

#[tokio::test]
async fn test_custom_description_reaches_the_wallet() {
    let wallet = MockWallet::new();
    let payment = PaymentMiddleware::new(wallet.clone(), FixedPrice(25))
        .with_description("Report download");
    let app = Router::new()
        .route("/paid", get(paid_handler).layer(payment))
        .layer(middleware::from_fn(inject_identity));

    let prefix = obtain_prefix(&app).await;
    let header = submission_header(&prefix, "suffix-1", b"tx");
    let response = app.oneshot(paid_request(&header)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[SATOSHIS_PAID_HEADER], "25");

    let recorded = wallet.last_internalize.lock().unwrap().clone().unwrap();
    assert_eq!(recorded.description, "Report download");
}
