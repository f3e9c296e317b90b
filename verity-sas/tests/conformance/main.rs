//! Conformance harness: protocol surface both peers depend on.
//!
//! Invariant coverage:
//! - Cancel-code registry and wire names
//! - Error display stability
//! - Wire event shapes

mod cancel_codes;
mod error_display;
mod wire_events;
