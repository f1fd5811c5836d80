//! Axum middleware for enforcing per-request BSV payments on protected routes.
//!
//! [`PaymentMiddleware`] is a [`tower::Layer`] built from a wallet and a
//! pricing strategy. Wrap a protected route with it after an authentication
//! layer has attached the requester's
//! [`IdentityKey`](bsv_payment::types::IdentityKey) extension; the middleware
//! answers unpaid requests with `402 Payment Required` and lets paid requests
//! through with a [`PaymentOutcome`](bsv_payment::types::PaymentOutcome)
//! extension attached.
//!
//! ## Example Usage
//!
//! ```ignore
//! use axum::{Router, routing::get};
//! use bsv_payment::pricing::FixedPrice;
//! use bsv_payment_axum::PaymentMiddleware;
//!
//! let payment = PaymentMiddleware::new(wallet, FixedPrice(100))
//!     .with_description("Premium API access");
//!
//! let app: Router = Router::new().route(
//!     "/protected",
//!     get(my_handler).layer(payment),
//! );
//! ```

use axum_core::extract::Request;
use axum_core::response::Response;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service};

use bsv_payment::pricing::RequestPricing;
use bsv_payment::wallet::Wallet;

use crate::paygate::Paygate;

/// Settlement description recorded when none is configured.
const DEFAULT_DESCRIPTION: &str = "Payment for HTTP request";

/// The payment middleware for protecting axum routes.
///
/// Construction requires both collaborators up front; there is no default
/// wallet and no default price.
#[derive(Clone, Debug)]
pub struct PaymentMiddleware<W, P> {
    wallet: W,
    pricing: P,
    description: Arc<str>,
}

impl<W, P> PaymentMiddleware<W, P> {
    /// Creates a middleware from a wallet and a pricing strategy.
    pub fn new(wallet: W, pricing: P) -> Self {
        Self {
            wallet,
            pricing,
            description: Arc::from(DEFAULT_DESCRIPTION),
        }
    }

    /// Returns the configured wallet.
    pub fn wallet(&self) -> &W {
        &self.wallet
    }

    /// Returns the configured pricing strategy.
    pub fn pricing(&self) -> &P {
        &self.pricing
    }

    /// Returns the settlement description.
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl<W, P> PaymentMiddleware<W, P>
where
    W: Clone,
    P: Clone,
{
    /// Sets the human-readable description recorded with each settlement.
    ///
    /// This is what the wallet's owner later sees against the received funds,
    /// so name the resource being paid for.
    pub fn with_description(&self, description: impl Into<Arc<str>>) -> Self {
        let mut this = self.clone();
        this.description = description.into();
        this
    }
}

impl<S, W, P> Layer<S> for PaymentMiddleware<W, P>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
    W: Wallet + Clone,
    P: RequestPricing + Clone,
{
    type Service = PaymentMiddlewareService<W, P>;

    fn layer(&self, inner: S) -> Self::Service {
        PaymentMiddlewareService {
            wallet: self.wallet.clone(),
            pricing: self.pricing.clone(),
            description: self.description.clone(),
            inner: BoxCloneSyncService::new(inner),
        }
    }
}

/// Axum service that enforces payment on incoming requests.
#[derive(Clone, Debug)]
pub struct PaymentMiddlewareService<W, P> {
    /// Wallet collaborator for nonces and settlement
    wallet: W,
    /// Pricing strategy for the protected route
    pricing: P,
    /// Human-readable settlement description
    description: Arc<str>,
    /// The inner Axum service being wrapped
    inner: BoxCloneSyncService<Request, Response, Infallible>,
}

impl<W, P> Service<Request> for PaymentMiddlewareService<W, P>
where
    W: Wallet + Clone + Send + Sync + 'static,
    P: RequestPricing + Clone + Send + Sync + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    /// Delegates readiness polling to the wrapped inner service.
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    /// Hands the request to a fresh payment gate over the wrapped service.
    fn call(&mut self, req: Request) -> Self::Future {
        let gate = Paygate {
            wallet: self.wallet.clone(),
            pricing: self.pricing.clone(),
            description: self.description.clone(),
        };
        Box::pin(gate.handle_request(self.inner.clone(), req))
    }
}
