#![forbid(unsafe_code)]

//! `command-conduit` — shell command relay over named pipes.
//!
//! A controlling process drives shell execution inside an isolated sandbox
//! process across a trust boundary. The only channel between the two is a
//! pair of unidirectional FIFOs: the controller writes JSON-line requests to
//! the command pipe, the sandbox-side server executes each command through a
//! shell and writes a sentinel-framed JSON response to the response pipe.

pub mod client;
pub mod config;
pub mod errors;
pub mod protocol;
pub mod server;
pub mod transport;

pub use config::ConduitConfig;
pub use errors::{AppError, Result};
