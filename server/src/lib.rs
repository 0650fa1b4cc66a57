//! # Ficket Server
//!
//! Wires the Redis store, the expiry reactor and the HTTP surface into one
//! process. Configuration comes from the environment; see [`Config`].

pub mod config;

pub use config::Config;
