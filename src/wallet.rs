//! The wallet collaborator interface for nonce management and settlement.
//!
//! Implementors of [`Wallet`] own everything the payment gate does not: key
//! derivation, nonce storage, and the on-chain mechanics of accepting a
//! transaction. The gate only calls three operations: mint a single-use
//! derivation prefix for a challenge [`Wallet::create_nonce`], check a prefix
//! echoed back by a payer [`Wallet::verify_nonce`], and durably apply a
//! submitted transaction as received payment [`Wallet::internalize`].

use std::sync::Arc;

/// Error returned by wallet operations.
///
/// Wallets may attach a machine-readable `code` to internalization failures;
/// when present it is surfaced verbatim in the settlement-failure response in
/// place of the generic payment-failed code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{description}")]
pub struct WalletError {
    /// Machine-readable failure code supplied by the wallet, if any.
    pub code: Option<String>,
    /// Human-readable failure description. Logged by the payment gate, never
    /// included in a response body.
    pub description: String,
}

impl WalletError {
    /// Creates an error without a machine-readable code.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            code: None,
            description: description.into(),
        }
    }

    /// Creates an error carrying a wallet-supplied code.
    pub fn coded(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            description: description.into(),
        }
    }
}

/// Key-derivation data binding a payment output to the challenge it answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRemittance {
    /// The server-minted single-use nonce the payer echoed back.
    pub derivation_prefix: String,
    /// The payer-chosen suffix completing the derivation path.
    pub derivation_suffix: String,
    /// The authenticated identity key of the payer.
    pub sender_identity_key: String,
}

/// A single transaction output to internalize as received payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalizeOutput {
    /// Index of the payment output within the transaction.
    pub output_index: u32,
    /// Output protocol label, fixed to
    /// [`WALLET_PAYMENT_PROTOCOL`](crate::types::WALLET_PAYMENT_PROTOCOL) by
    /// the payment gate.
    pub protocol: String,
    /// Derivation data identifying the output's address.
    pub payment_remittance: PaymentRemittance,
}

/// Settlement request handed to [`Wallet::internalize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalizeRequest {
    /// Raw transaction bytes in the atomic transaction envelope format.
    pub tx: Vec<u8>,
    /// The outputs to apply as received payment.
    pub outputs: Vec<InternalizeOutput>,
    /// Human-readable description recorded with the settlement.
    pub description: String,
}

/// Verdict returned by [`Wallet::internalize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InternalizeResponse {
    /// True iff the wallet durably applied the output as payment.
    pub accepted: bool,
}

/// Trait defining the asynchronous interface to the server's wallet.
///
/// All three operations must be safe for concurrent invocation; the payment
/// gate imposes no locking discipline of its own.
pub trait Wallet {
    /// Mints a fresh single-use derivation prefix for a payment challenge.
    ///
    /// Each call must return a value bound to no other challenge. When
    /// deployed behind a load balancer, a prefix minted by one instance must
    /// be verifiable by any other, so the nonce state cannot live in process
    /// memory alone.
    fn create_nonce(&self) -> impl Future<Output = Result<String, WalletError>> + Send;

    /// Verifies a derivation prefix echoed back by a payer.
    ///
    /// Verification is authoritative and must succeed at most once per
    /// prefix: a second verification of the same prefix, including two
    /// requests racing on it, must see at most one `true`. Retention and
    /// expiry of unverified prefixes are the implementor's policy.
    fn verify_nonce(&self, nonce: &str) -> impl Future<Output = Result<bool, WalletError>> + Send;

    /// Durably applies a transaction output as received payment.
    ///
    /// This is the call that commits funds. The payment gate treats it as a
    /// single authoritative attempt: it never retries, and a payer wanting to
    /// retry must start over with a fresh challenge.
    fn internalize(
        &self,
        request: &InternalizeRequest,
    ) -> impl Future<Output = Result<InternalizeResponse, WalletError>> + Send;
}

impl<T: Wallet> Wallet for Arc<T> {
    fn create_nonce(&self) -> impl Future<Output = Result<String, WalletError>> + Send {
        self.as_ref().create_nonce()
    }

    fn verify_nonce(&self, nonce: &str) -> impl Future<Output = Result<bool, WalletError>> + Send {
        self.as_ref().verify_nonce(nonce)
    }

    fn internalize(
        &self,
        request: &InternalizeRequest,
    ) -> impl Future<Output = Result<InternalizeResponse, WalletError>> + Send {
        self.as_ref().internalize(request)
    }
}
