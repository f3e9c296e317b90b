//! Verity SAS: interactive device verification.
//!
//! Two devices prove to each other that they hold the identity keys they
//! claim: an X25519 agreement bound by a commitment, a short code the
//! users compare by eye, and MACs over the long-term keys keyed by the
//! agreed secret. Cryptographic primitives live in `verity-core`.
//!
//! # Module Map
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`coordinator`] | [`Coordinator`]: transaction map, public operations |
//! | [`transaction`] | Per-transaction state machine |
//! | [`events`] | Wire events (serde) |
//! | [`methods`] | Method identifiers, parameter negotiation |
//! | [`cancel`] | Cancel-code registry |
//! | [`collaborators`] | Transport, trust store, cross-signing, callbacks |
//! | [`memory`] | In-memory collaborators |
//! | [`config`] | [`VerificationConfig`] |
//! | [`errors`] | [`VerificationError`] |

/// Cancel codes carried by `m.key.verification.cancel`.
pub mod cancel;

/// Traits for everything the coordinator talks to.
pub mod collaborators;

/// Verification configuration: timeouts, advertised capabilities.
pub mod config;

/// The coordinator: live transactions and the public operations.
pub mod coordinator;

/// Error types for verity-sas operations.
pub mod errors;

/// Wire events and the to-device envelope.
pub mod events;

/// In-memory collaborators for tests and embedding.
pub mod memory;

/// Method identifiers and parameter negotiation.
pub mod methods;

/// Per-transaction state machine.
pub mod transaction;

pub use cancel::CancelCode;
pub use config::VerificationConfig;
pub use coordinator::Coordinator;
pub use errors::VerificationError;
pub use events::{ToDeviceEvent, VerificationEvent};
pub use transaction::{ShortAuthString, State};
