//! # Tenderflow
//!
//! HTTP server, CLI and configuration around `tenderflow-core`.

pub mod api;
pub mod cli;
pub mod config;
