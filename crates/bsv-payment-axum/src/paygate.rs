//! The per-request payment gate.
//!
//! The gate runs four stages in strict sequence: price resolution, challenge
//! issuance when no payment accompanied the request, submission validation,
//! and settlement through the wallet. Each stage either passes the request
//! forward or terminates it with exactly one error response; there is no
//! branching back and no retrying.
//!
//! ## Overview
//!
//! - Requires an [`IdentityKey`] extension from the authentication layer
//! - Resolves the request price via the configured [`RequestPricing`]
//! - Issues a `402 Payment Required` challenge with a single-use derivation
//!   prefix when payment is absent
//! - Validates and internalizes a submitted payment before the inner service
//!   runs, attaching a [`PaymentOutcome`] extension on success

use axum_core::body::Body;
use axum_core::response::{IntoResponse, Response};
use http::{HeaderValue, StatusCode};
use std::borrow::Cow;
use std::convert::Infallible;
use std::sync::Arc;
use tower::Service;

use bsv_payment::pricing::RequestPricing;
use bsv_payment::types::{
    DERIVATION_PREFIX_HEADER, ErrorCode, ErrorResponse, ErrorStatus, IdentityKey, PAYMENT_HEADER,
    PAYMENT_VERSION_HEADER, PaymentChallenge, PaymentOutcome, PaymentSubmission,
    SATOSHIS_PAID_HEADER, SATOSHIS_REQUIRED_HEADER, WALLET_PAYMENT_PROTOCOL,
};
use bsv_payment::wallet::{
    InternalizeOutput, InternalizeRequest, PaymentRemittance, Wallet, WalletError,
};

#[cfg(feature = "telemetry")]
use tracing::Instrument;
#[cfg(feature = "telemetry")]
use tracing::instrument;

/// Terminal outcomes of the payment gate, one variant per failure mode.
///
/// Every variant knows its HTTP status and wire code; rendering happens once,
/// in [`PaygateError::into_response`]. Internal causes carried by the 5xx
/// variants are logged there and never leak into the response body.
#[derive(Debug, thiserror::Error)]
pub enum PaygateError {
    /// The authentication layer did not attach an identity key before the
    /// payment gate ran.
    #[error("request context is missing an authenticated identity key")]
    MissingIdentity,
    /// The pricing strategy failed to resolve a price.
    #[error("price resolution failed: {0}")]
    Pricing(String),
    /// The wallet failed to mint a derivation prefix for a challenge.
    #[error("nonce issuance failed: {0}")]
    NonceIssuance(String),
    /// Payment is required and no submission accompanied the request.
    #[error("payment of {} satoshis is required", .challenge.satoshis_required)]
    PaymentRequired {
        /// The challenge to render as the 402 response.
        challenge: PaymentChallenge,
    },
    /// The payment header was present but not a well-formed submission.
    #[error("invalid or malformed payment header")]
    MalformedPayment,
    /// The submitted derivation prefix failed nonce verification.
    #[error("invalid derivation prefix")]
    InvalidDerivationPrefix,
    /// The wallet rejected or failed transaction internalization.
    #[error("payment internalization failed: {0}")]
    Internalization(WalletError),
}

impl PaygateError {
    /// The HTTP status for this outcome.
    pub fn status(&self) -> StatusCode {
        match self {
            PaygateError::MissingIdentity
            | PaygateError::Pricing(_)
            | PaygateError::NonceIssuance(_) => StatusCode::INTERNAL_SERVER_ERROR,
            PaygateError::PaymentRequired { .. } => StatusCode::PAYMENT_REQUIRED,
            PaygateError::MalformedPayment
            | PaygateError::InvalidDerivationPrefix
            | PaygateError::Internalization(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// The wire code for this outcome.
    ///
    /// Settlement failures surface the wallet-supplied code when one exists.
    pub fn code(&self) -> Cow<'static, str> {
        match self {
            PaygateError::MissingIdentity => ErrorCode::ServerMisconfigured.as_str().into(),
            PaygateError::Pricing(_) | PaygateError::NonceIssuance(_) => {
                ErrorCode::PaymentInternal.as_str().into()
            }
            PaygateError::PaymentRequired { .. } => ErrorCode::PaymentRequired.as_str().into(),
            PaygateError::MalformedPayment => ErrorCode::MalformedPayment.as_str().into(),
            PaygateError::InvalidDerivationPrefix => {
                ErrorCode::InvalidDerivationPrefix.as_str().into()
            }
            PaygateError::Internalization(err) => match &err.code {
                Some(code) => Cow::Owned(code.clone()),
                None => ErrorCode::PaymentFailed.as_str().into(),
            },
        }
    }

    /// Human-readable description for the response body.
    fn description(&self) -> String {
        match self {
            PaygateError::MissingIdentity => {
                "The payment gate requires an authenticated identity; \
                 authentication middleware must run before it."
                    .to_string()
            }
            PaygateError::Pricing(_) => {
                "An internal error occurred while resolving the request price.".to_string()
            }
            PaygateError::NonceIssuance(_) => {
                "An internal error occurred while issuing a payment challenge.".to_string()
            }
            PaygateError::PaymentRequired { challenge } => format!(
                "A BSV payment of {} satoshis is required to complete this request.",
                challenge.satoshis_required
            ),
            PaygateError::MalformedPayment => {
                "The x-bsv-payment header is not a well-formed payment submission.".to_string()
            }
            PaygateError::InvalidDerivationPrefix => {
                "The supplied derivation prefix is not valid; \
                 request a fresh payment challenge and resubmit."
                    .to_string()
            }
            PaygateError::Internalization(_) => {
                "The wallet did not accept the submitted payment transaction.".to_string()
            }
        }
    }

    /// Renders this outcome as the terminal HTTP response.
    pub fn into_response(self) -> Response {
        #[cfg(feature = "telemetry")]
        match &self {
            PaygateError::MissingIdentity => tracing::error!(
                "Identity key missing from request context; \
                 is authentication middleware installed before the payment gate?"
            ),
            PaygateError::Pricing(cause) => tracing::error!(%cause, "Price resolution failed"),
            PaygateError::NonceIssuance(cause) => tracing::error!(%cause, "Nonce issuance failed"),
            PaygateError::PaymentRequired { challenge } => tracing::debug!(
                satoshis_required = challenge.satoshis_required,
                "Issued payment challenge"
            ),
            PaygateError::MalformedPayment => {
                tracing::debug!("Rejected malformed payment header")
            }
            PaygateError::InvalidDerivationPrefix => {
                tracing::debug!("Rejected payment with invalid derivation prefix")
            }
            PaygateError::Internalization(err) => {
                tracing::warn!(error = %err, code = ?err.code, "Payment internalization failed")
            }
        }

        let body = ErrorResponse {
            status: ErrorStatus,
            code: self.code().into_owned(),
            description: self.description(),
            satoshis_required: match &self {
                PaygateError::PaymentRequired { challenge } => Some(challenge.satoshis_required),
                _ => None,
            },
        };
        let body_bytes = serde_json::to_vec(&body).expect("serialization failed");

        let mut builder = Response::builder()
            .status(self.status())
            .header("Content-Type", "application/json");
        if let PaygateError::PaymentRequired { challenge } = &self {
            builder = builder
                .header(PAYMENT_VERSION_HEADER, challenge.version)
                .header(SATOSHIS_REQUIRED_HEADER, challenge.satoshis_required)
                .header(DERIVATION_PREFIX_HEADER, challenge.derivation_prefix.as_str());
        }
        builder
            .body(Body::from(body_bytes))
            .expect("Fail to construct response")
    }
}

/// Per-request payment gate.
///
/// The middleware service constructs one gate per request with clones of the
/// configured collaborators; the gate holds no state of its own across
/// requests.
pub struct Paygate<W, P> {
    /// Wallet collaborator for nonces and settlement.
    pub wallet: W,
    /// Pricing strategy for the protected route.
    pub pricing: P,
    /// Human-readable description recorded with each settlement.
    pub description: Arc<str>,
}

impl<W, P> Paygate<W, P> {
    /// Calls the inner service with proper telemetry instrumentation.
    async fn call_inner<ReqBody, ResBody, S>(
        mut inner: S,
        req: http::Request<ReqBody>,
    ) -> Result<http::Response<ResBody>, S::Error>
    where
        S: Service<http::Request<ReqBody>, Response = http::Response<ResBody>>,
        S::Future: Send,
    {
        #[cfg(feature = "telemetry")]
        {
            inner
                .call(req)
                .instrument(tracing::info_span!("inner"))
                .await
        }
        #[cfg(not(feature = "telemetry"))]
        {
            inner.call(req).await
        }
    }
}

impl<W, P> Paygate<W, P>
where
    W: Wallet,
    P: RequestPricing,
{
    /// Handles an incoming request, enforcing payment if required.
    ///
    /// Returns the challenge or error response when enforcement terminates
    /// the request; otherwise returns the inner service's response.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "bsv_payment.handle_request", skip_all)
    )]
    pub async fn handle_request<ReqBody, ResBody, S>(
        self,
        inner: S,
        req: http::Request<ReqBody>,
    ) -> Result<Response, Infallible>
    where
        S: Service<http::Request<ReqBody>, Response = http::Response<ResBody>>,
        S::Response: IntoResponse,
        S::Error: IntoResponse,
        S::Future: Send,
    {
        match self.handle_request_fallible(inner, req).await {
            Ok(response) => Ok(response),
            Err(err) => Ok(err.into_response()),
        }
    }

    /// Handles an incoming request, returning errors as [`PaygateError`].
    ///
    /// This is the fallible version of [`Paygate::handle_request`]; callers
    /// that want to render outcomes differently can match on the error.
    pub async fn handle_request_fallible<ReqBody, ResBody, S>(
        &self,
        inner: S,
        req: http::Request<ReqBody>,
    ) -> Result<Response, PaygateError>
    where
        S: Service<http::Request<ReqBody>, Response = http::Response<ResBody>>,
        S::Response: IntoResponse,
        S::Error: IntoResponse,
        S::Future: Send,
    {
        let (mut parts, body) = req.into_parts();

        // Precondition: the authentication layer ran first.
        let identity = parts
            .extensions
            .get::<IdentityKey>()
            .filter(|key| !key.0.is_empty())
            .cloned()
            .ok_or(PaygateError::MissingIdentity)?;

        let price = self
            .pricing
            .price(&parts)
            .await
            .map_err(|err| PaygateError::Pricing(err.to_string()))?;

        if price == 0 {
            parts.extensions.insert(PaymentOutcome::free());
            let req = http::Request::from_parts(parts, body);
            let response = match Self::call_inner(inner, req).await {
                Ok(response) => response,
                Err(err) => return Ok(err.into_response()),
            };
            return Ok(response.into_response());
        }

        let Some(header) = parts.headers.get(PAYMENT_HEADER) else {
            let prefix = self
                .wallet
                .create_nonce()
                .await
                .map_err(|err| PaygateError::NonceIssuance(err.to_string()))?;
            return Err(PaygateError::PaymentRequired {
                challenge: PaymentChallenge::new(price, prefix),
            });
        };

        // Both parse checks run before any wallet call.
        let submission = PaymentSubmission::from_header(header.as_bytes())
            .map_err(|_| PaygateError::MalformedPayment)?;
        let tx = submission
            .transaction_bytes()
            .map_err(|_| PaygateError::MalformedPayment)?;

        // A failed verification call and a negative verdict are deliberately
        // indistinguishable to the caller.
        let verified = match self.wallet.verify_nonce(&submission.derivation_prefix).await {
            Ok(verified) => verified,
            Err(_err) => {
                #[cfg(feature = "telemetry")]
                tracing::debug!(error = %_err, "Nonce verification call failed");
                false
            }
        };
        if !verified {
            return Err(PaygateError::InvalidDerivationPrefix);
        }

        let settlement = InternalizeRequest {
            tx: tx.clone(),
            outputs: vec![InternalizeOutput {
                output_index: 0,
                protocol: WALLET_PAYMENT_PROTOCOL.to_string(),
                payment_remittance: PaymentRemittance {
                    derivation_prefix: submission.derivation_prefix.clone(),
                    derivation_suffix: submission.derivation_suffix.clone(),
                    sender_identity_key: identity.0.clone(),
                },
            }],
            description: self.description.to_string(),
        };
        let settled = self
            .wallet
            .internalize(&settlement)
            .await
            .map_err(PaygateError::Internalization)?;

        parts.extensions.insert(PaymentOutcome {
            accepted: settled.accepted,
            satoshis_paid: price,
            tx,
        });
        let req = http::Request::from_parts(parts, body);
        let response = match Self::call_inner(inner, req).await {
            Ok(response) => response,
            Err(err) => return Ok(err.into_response()),
        };

        let mut response = response.into_response();
        response
            .headers_mut()
            .insert(SATOSHIS_PAID_HEADER, HeaderValue::from(price));
        Ok(response)
    }
}
