//! HTTP backend for the consultation workflow.
//!
//! This crate implements [`consult_flow_core::ConsultationBackend`] against the
//! clinic REST API using `reqwest`. Responses are unwrapped from the server's
//! `{success, data, message}` envelope and mapped onto
//! [`consult_flow_core::GatewayError`].

pub mod client;
pub mod config;
pub mod wire;

pub use client::HttpBackend;
pub use config::{ClientConfig, ClientError, ClientResult};
