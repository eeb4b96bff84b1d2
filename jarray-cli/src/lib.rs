//! Support library for the jarray CLI binary.
//!
//! Re-exports the CLI and logging modules so unit tests and integration
//! tests can exercise the command pipeline without forking a subprocess.

pub mod cli;
pub mod logging;
