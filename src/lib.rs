//! Courier - Development Reverse Proxy
//!
//! Forwards requests matching configured path prefixes to an upstream
//! origin, with Host/Origin rewriting and optional TLS validation bypass.

pub mod config;
pub mod http;
pub mod proxy;
pub mod server;
