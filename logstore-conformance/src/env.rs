//! Env-driven harness bootstrap (spec §6): the pattern the teacher's
//! `eventstore-bin::resolve_backend`/`main` used to pick a backend and set up
//! logging for the server binary. The server binary is out of scope here, but
//! every integration test in this workspace still needs the same two things —
//! a subscriber so `#[instrument]` output is visible, and an env var telling it
//! which backend to run the shared scenarios against.

use std::sync::Once;

static INIT: Once = Once::new();

/// Installs a `tracing-subscriber` the way `eventstore-bin::main` does, once per
/// process. Safe to call from every `#[tokio::test]` — idempotent, never panics if
/// a subscriber is already set.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

/// Reads `BACKEND`, defaulting to `default` (mirrors `resolve_backend`'s
/// `std::env::var("BACKEND").unwrap_or_else(|_| "memory".to_string())`). The
/// conformance suite itself is backend-agnostic; this only lets a backend crate's
/// `tests/it_<backend>.rs` skip itself when `BACKEND` names a different one.
pub fn backend_from_env(default: &str) -> String {
    std::env::var("BACKEND").unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn set_env_and_get_prev(key: &str, val: Option<&str>) -> Option<String> {
        let prev = std::env::var(key).ok();
        match val {
            Some(v) => std::env::set_var(key, v),
            None => std::env::remove_var(key),
        }
        prev
    }

    #[test]
    #[serial]
    fn backend_from_env_defaults_when_unset() {
        let prev = set_env_and_get_prev("BACKEND", None);
        assert_eq!(backend_from_env("memory"), "memory");
        match prev {
            Some(v) => std::env::set_var("BACKEND", v),
            None => std::env::remove_var("BACKEND"),
        }
    }

    #[test]
    #[serial]
    fn backend_from_env_reads_override() {
        let prev = set_env_and_get_prev("BACKEND", Some("postgres"));
        assert_eq!(backend_from_env("memory"), "postgres");
        match prev {
            Some(v) => std::env::set_var("BACKEND", v),
            None => std::env::remove_var("BACKEND"),
        }
    }
}
