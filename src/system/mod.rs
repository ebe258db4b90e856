//! # System Interaction Layer
//!
//! The boundary between runsh and the operating system.
//!
//! - **`executor`**: writes a script to a temporary file, runs it with the
//!   configured shell and forwards its exit status.

/// Runs scripts with the configured shell.
pub mod executor;
