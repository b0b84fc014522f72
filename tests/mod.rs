//! Integration tests for xtreamview
//!
//! Tests are organized by component:
//! - xtream_test: Xtream catalog client against a mock panel
//! - session_test: Session controller over an in-memory catalog
//! - cli_test: Argument parsing and JSON output

// Note: Each test file is a separate integration test crate
// Tests are run individually by cargo, not via mod.rs
