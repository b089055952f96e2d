//! Offline cache arbiter for the Fitout web application
//!
//! Sits between the client and the origin and decides per request whether a
//! cache generation is read or written, and which of network freshness or
//! cached availability wins. Also handles the worker lifecycle (install,
//! activate) and push notification events.

pub mod arbiter;
pub mod config;
pub mod error;
pub mod host;
pub mod lifecycle;
pub mod network;
pub mod push;
pub mod request;
pub mod rules;
pub mod server;
