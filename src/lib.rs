//! Core types and collaborator interfaces for per-request BSV payments.
//!
//! This crate provides the foundational types for gating HTTP request handling
//! behind a micropayment settled in BSV satoshis. A server responds to an
//! unpaid request with `402 Payment Required` and a single-use payment
//! challenge; the client answers with a signed transaction bound to that
//! challenge, which the server's wallet internalizes before the request is
//! allowed to proceed.
//!
//! The crate is transport-agnostic: HTTP middleware lives in the companion
//! `bsv-payment-axum` crate, which consumes the interfaces defined here.
//!
//! # Modules
//!
//! - [`pricing`] - The [`RequestPricing`](pricing::RequestPricing) trait for
//!   resolving the satoshi price of an inbound request
//! - [`types`] - Wire format types: payment submissions, challenges, outcomes,
//!   error codes, and the protocol header names
//! - [`util`] - Helper functions (base64 encoding of transaction bytes)
//! - [`wallet`] - The [`Wallet`](wallet::Wallet) trait for nonce management
//!   and transaction internalization
//!
//! # Roles
//!
//! - **Server / seller**: wraps protected routes in the payment middleware and
//!   supplies a [`Wallet`](wallet::Wallet) plus a pricing strategy.
//! - **Wallet**: the collaborator that mints and verifies single-use
//!   derivation prefixes and durably applies submitted transactions as
//!   received payment. Key management and transaction broadcast live entirely
//!   behind this interface.
//! - **Client / payer**: answers a payment challenge by sending the
//!   `x-bsv-payment` header described in [`types`].

pub mod pricing;
pub mod types;
pub mod util;
pub mod wallet;
