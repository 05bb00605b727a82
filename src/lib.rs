//! # Dialer Library
//!
//! Core functionality of the dialer service: client token issuance, call
//! documents, provider webhooks, call monitoring and the status relay.

pub mod call_document;
pub mod config;
pub mod context;
pub mod dialer;
pub mod error;
pub mod handlers;
pub mod models;
pub mod monitor;
pub mod phone;
pub mod relay;
pub mod server;
pub mod telemetry;
pub mod token_issuer;
pub mod twilio;
