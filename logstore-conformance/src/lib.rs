//! The conformance suite (spec §8, component C7): the contract every
//! [`LogStoreDriver`] must satisfy, expressed as backend-agnostic scenario functions
//! and universal-invariant checks.
//!
//! This crate binds the contract; it does not supply a backend. Each backend crate
//! pulls these functions into its own `tests/it_<backend>.rs`, supplying `make_driver`
//! and `flush_writes` bindings per spec §6.

pub mod env;
pub mod fixtures;
pub mod invariants;
pub mod scenarios;

pub use env::{backend_from_env, init_tracing};
pub use fixtures::{entry, sample_attempt, sample_event};
pub use invariants::*;
pub use scenarios::*;
