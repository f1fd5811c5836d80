//! The pricing collaborator: resolves the satoshi price of an inbound request.

use std::convert::Infallible;
use std::fmt::{Debug, Display};
use std::sync::Arc;

use http::request::Parts;

/// Trait defining the pricing strategy for a payment-gated route.
///
/// The strategy sees the request head (method, URI, headers, extensions) and
/// returns a non-negative price in satoshis. Returning zero waives payment for
/// the request entirely.
///
/// A strategy failure is a server fault: the payment gate reports it as an
/// internal error and never retries.
pub trait RequestPricing {
    /// The error type returned by this pricing strategy.
    type Error: Debug + Display + Send;

    /// Resolves the price in satoshis for the given request.
    fn price(&self, request: &Parts) -> impl Future<Output = Result<u64, Self::Error>> + Send;
}

/// Constant pricing: every request costs the same number of satoshis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedPrice(pub u64);

impl RequestPricing for FixedPrice {
    type Error = Infallible;

    async fn price(&self, _request: &Parts) -> Result<u64, Infallible> {
        Ok(self.0)
    }
}

impl<T: RequestPricing> RequestPricing for Arc<T> {
    type Error = T::Error;

    fn price(&self, request: &Parts) -> impl Future<Output = Result<u64, Self::Error>> + Send {
        self.as_ref().price(request)
    }
}
