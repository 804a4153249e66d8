//! # firenet-runner
//!
//! The `firenet` command: packet tools, the two node runtimes, and a
//! one-shot upload for checking a modem and endpoint by hand.

pub mod cli;
mod commands;

pub use commands::{decode, encode, render_report, run, upload_reading, RunnerError};
