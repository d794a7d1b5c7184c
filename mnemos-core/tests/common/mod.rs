//! Shared helpers for integration tests

#![allow(dead_code)]

use mnemos_core::session::{Outcome, Session};
use tracing_subscriber::EnvFilter;

/// Install a test subscriber once; `RUST_LOG` overrides the default level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,mnemos_core=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// A session with the given feedback and outcome.
pub fn session(id: &str, feedback: &str, outcome: Outcome) -> Session {
    Session::builder("Can you explain how Rust lifetimes work?", "Lifetimes describe how long references are valid...")
        .id(id)
        .feedback(feedback)
        .outcome(outcome)
        .build()
        .expect("valid session")
}

pub fn too_long(id: &str) -> Session {
    session(id, "That was too long", Outcome::Negative)
}
