//! Conformance harness: core invariants both peers depend on.
//!
//! Invariant coverage:
//! - SAS determinism and encoding bounds
//! - Peer-independence of key agreement and derivation
//! - Error display stability

mod error_code_mapping;
mod sas_determinism;
