//! Wire format types for the BSV payment protocol.
//!
//! This module defines the shapes exchanged between a paying client and a
//! payment-gated server:
//!
//! - [`PaymentSubmission`] - Payment presented by the client in the
//!   [`PAYMENT_HEADER`] request header
//! - [`PaymentChallenge`] - Challenge returned with a `402 Payment Required`
//!   response when payment is absent
//! - [`PaymentOutcome`] - Result of payment enforcement, attached to the
//!   request for downstream handlers
//! - [`IdentityKey`] - Authenticated requester identity, attached by the
//!   authentication layer that runs before payment enforcement
//! - [`ErrorCode`] / [`ErrorResponse`] - The error JSON envelope carried by
//!   every non-2xx response

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fmt::Display;

use crate::util::b64;

/// Protocol version advertised in challenge responses.
pub const PAYMENT_VERSION: &str = "1.0";

/// Request header carrying a [`PaymentSubmission`] as a JSON object.
pub const PAYMENT_HEADER: &str = "x-bsv-payment";

/// Challenge response header carrying [`PAYMENT_VERSION`].
pub const PAYMENT_VERSION_HEADER: &str = "x-bsv-payment-version";

/// Challenge response header carrying the price in satoshis as a decimal string.
pub const SATOSHIS_REQUIRED_HEADER: &str = "x-bsv-payment-satoshis-required";

/// Challenge response header carrying the freshly minted derivation prefix.
pub const DERIVATION_PREFIX_HEADER: &str = "x-bsv-payment-derivation-prefix";

/// Success response header echoing the satoshis paid as a decimal string.
pub const SATOSHIS_PAID_HEADER: &str = "x-bsv-payment-satoshis-paid";

/// Output protocol label used when internalizing a payment output.
pub const WALLET_PAYMENT_PROTOCOL: &str = "wallet payment";

/// A payment presented by the client, parsed from the [`PAYMENT_HEADER`]
/// request header.
///
/// The `derivation_prefix` must echo a nonce previously minted by the server's
/// wallet; the `derivation_suffix` is chosen by the payer and completes the
/// derivation path of the payment output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSubmission {
    /// Base64-encoded transaction bytes in the atomic transaction envelope format.
    pub transaction: String,
    /// Server-minted single-use nonce echoed back by the payer.
    pub derivation_prefix: String,
    /// Payer-chosen suffix completing the payment's derivation path.
    pub derivation_suffix: String,
}

impl PaymentSubmission {
    /// Parses a submission from the raw [`PAYMENT_HEADER`] value.
    pub fn from_header(value: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(value)
    }

    /// Decodes the `transaction` field into raw transaction bytes.
    pub fn transaction_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        b64::decode(&self.transaction)
    }
}

/// A payment challenge, emitted when payment is required but absent.
///
/// A challenge is never issued for a zero price; the zero-price path proceeds
/// without one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentChallenge {
    /// Protocol version, fixed per deployment.
    pub version: &'static str,
    /// Price for this request in satoshis, always positive.
    pub satoshis_required: u64,
    /// Freshly minted single-use nonce, bound to no other request.
    pub derivation_prefix: String,
}

impl PaymentChallenge {
    /// Creates a challenge for the given price and freshly minted prefix.
    pub fn new(satoshis_required: u64, derivation_prefix: String) -> Self {
        Self {
            version: PAYMENT_VERSION,
            satoshis_required,
            derivation_prefix,
        }
    }
}

/// Result of payment enforcement, attached to the request as an extension
/// exactly once before the inner handler runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentOutcome {
    /// True iff the wallet durably applied the transaction output as payment.
    pub accepted: bool,
    /// The price resolved for this request; zero when no payment was required.
    pub satoshis_paid: u64,
    /// The submitted transaction bytes, carried unmodified for audit by
    /// downstream code. Empty when no payment was required.
    pub tx: Vec<u8>,
}

impl PaymentOutcome {
    /// Outcome for a request whose resolved price was zero.
    pub fn free() -> Self {
        Self {
            accepted: true,
            satoshis_paid: 0,
            tx: Vec::new(),
        }
    }
}

/// The authenticated identity key of the requester.
///
/// The authentication layer that runs before payment enforcement inserts this
/// as a request extension. The payment gate refuses to run without it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityKey(pub String);

/// Machine-readable error codes emitted by the payment gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// The identity precondition was not met; authentication middleware is
    /// missing or misordered.
    #[serde(rename = "ERR_SERVER_MISCONFIGURED")]
    ServerMisconfigured,
    /// A server-side collaborator failed before the payment could be handled.
    #[serde(rename = "ERR_PAYMENT_INTERNAL")]
    PaymentInternal,
    /// Payment is required and no submission accompanied the request.
    #[serde(rename = "ERR_PAYMENT_REQUIRED")]
    PaymentRequired,
    /// The payment header was present but not parseable.
    #[serde(rename = "ERR_MALFORMED_PAYMENT")]
    MalformedPayment,
    /// The submitted derivation prefix was never issued or was already consumed.
    #[serde(rename = "ERR_INVALID_DERIVATION_PREFIX")]
    InvalidDerivationPrefix,
    /// The wallet rejected transaction internalization without a code of its own.
    #[serde(rename = "ERR_PAYMENT_FAILED")]
    PaymentFailed,
}

impl ErrorCode {
    /// The wire string for this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ServerMisconfigured => "ERR_SERVER_MISCONFIGURED",
            ErrorCode::PaymentInternal => "ERR_PAYMENT_INTERNAL",
            ErrorCode::PaymentRequired => "ERR_PAYMENT_REQUIRED",
            ErrorCode::MalformedPayment => "ERR_MALFORMED_PAYMENT",
            ErrorCode::InvalidDerivationPrefix => "ERR_INVALID_DERIVATION_PREFIX",
            ErrorCode::PaymentFailed => "ERR_PAYMENT_FAILED",
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Marker that serializes as the literal string `"error"`.
///
/// Every error envelope carries `status: "error"`; this type pins that value
/// in the type system instead of repeating a string field.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ErrorStatus;

impl ErrorStatus {
    pub const VALUE: &'static str = "error";
}

impl Serialize for ErrorStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(Self::VALUE)
    }
}

impl<'de> Deserialize<'de> for ErrorStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        if value == Self::VALUE {
            Ok(ErrorStatus)
        } else {
            Err(serde::de::Error::custom(format!(
                "expected status {:?}, got {:?}",
                Self::VALUE,
                value
            )))
        }
    }
}

/// JSON envelope carried by every non-2xx response from the payment gate.
///
/// `code` is a string rather than [`ErrorCode`] because settlement failures
/// may surface a wallet-supplied code that is not part of the fixed set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub status: ErrorStatus,
    pub code: String,
    pub description: String,
    /// Present on payment-required responses only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub satoshis_required: Option<u64>,
}
