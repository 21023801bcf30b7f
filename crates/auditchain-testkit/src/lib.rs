//! # auditchain testkit
//!
//! Testing utilities for the audit ledger and its offline verifier.
//!
//! ## Overview
//!
//! - **Golden vectors**: canonical strings and hashes both implementations
//!   must reproduce
//! - **Generators**: proptest strategies for canonicalizable JSON and event
//!   drafts
//! - **Fixtures**: an in-memory ledger with a deterministic signing key
//!
//! ## Golden Vectors
//!
//! ```rust
//! use auditchain_testkit::vectors::canonical_vectors;
//!
//! for vector in canonical_vectors() {
//!     let value: serde_json::Value = serde_json::from_str(vector.input).unwrap();
//!     let hash = auditchain_core::hash_canonical(&value).unwrap();
//!     assert_eq!(hash, vector.sha256, "{}", vector.name);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use auditchain_testkit::generators::json_value;
//!
//! proptest! {
//!     #[test]
//!     fn canonical_is_deterministic(value in json_value()) {
//!         let a = auditchain_core::canonicalize(&value).unwrap();
//!         let b = auditchain_core::canonicalize(&value).unwrap();
//!         prop_assert_eq!(a, b);
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{keys_from_manifest, sample_draft, LedgerFixture, FIXTURE_SEED};
pub use generators::{event_draft, json_object, json_value};
pub use vectors::{canonical_vectors, event_vectors, rejected_inputs, CanonicalVector};
