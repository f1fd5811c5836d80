//! Axum middleware and helpers for enforcing per-request BSV payments.
//!
//! This crate provides a [`PaymentMiddleware`] axum layer that gates request
//! handling behind a micropayment settled in BSV satoshis. It expects an
//! upstream authentication layer to have attached the requester's verified
//! [`IdentityKey`](bsv_payment::types::IdentityKey), and a
//! [`Wallet`](bsv_payment::wallet::Wallet) collaborator that mints single-use
//! derivation nonces and internalizes submitted transactions.
//!
//! ## Request flow
//!
//! 1. The route's pricing strategy resolves a satoshi price; a zero price
//!    waives payment and the request proceeds immediately.
//! 2. A request without an `x-bsv-payment` header receives
//!    `402 Payment Required` with a freshly minted derivation prefix in the
//!    response headers.
//! 3. A submitted payment is parsed, its prefix checked against the wallet's
//!    nonce store (single-use, replay-safe), and its transaction internalized.
//! 4. On success the request proceeds with a
//!    [`PaymentOutcome`](bsv_payment::types::PaymentOutcome) extension, and
//!    the response carries `x-bsv-payment-satoshis-paid`.
//!
//! ## Quickstart
//!
//! ```ignore
//! use axum::{Router, routing::get};
//! use axum::response::IntoResponse;
//! use bsv_payment::pricing::FixedPrice;
//! use bsv_payment_axum::PaymentMiddleware;
//!
//! // `wallet` is your Wallet implementation, e.g. a client for the
//! // operator's wallet service.
//! let payment = PaymentMiddleware::new(wallet, FixedPrice(100))
//!     .with_description("VIP content");
//!
//! let app: Router = Router::new().route(
//!     "/vip",
//!     get(my_handler).layer(payment),
//! );
//!
//! async fn my_handler() -> impl IntoResponse {
//!     "This is VIP content!"
//! }
//! ```
//!
//! See [`PaymentMiddleware`] for configuration options and
//! [`paygate::Paygate`] for the underlying request-handling state machine.

pub mod layer;
pub mod paygate;

pub use layer::{PaymentMiddleware, PaymentMiddlewareService};
pub use paygate::{Paygate, PaygateError};
