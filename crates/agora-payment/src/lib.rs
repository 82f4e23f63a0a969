//! HTTP 402 payment-challenge protocol client.
//!
//! Implements the x402-style exchange: an unpaid request draws a
//! `PAYMENT-REQUIRED` challenge, a signed authorization proof unlocks
//! the paid retry, and the settlement reference is read back from the
//! response headers when the provider exposes one.

pub mod challenge;
pub mod client;
pub mod proof;
pub mod signer;

pub use challenge::{PaymentChallenge, PAYMENT_REQUIRED_HEADER};
pub use client::{PaidDelivery, PaymentClient, PreparedPayload, ServiceOutcome};
pub use proof::{AuthorizationPayload, PaymentProof, PAYMENT_HEADER};
pub use signer::{LocalSigner, PaymentSigner};
