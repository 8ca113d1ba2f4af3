//! Reverse proxy functionality
//!
//! This module implements the forwarding side of the proxy: the immutable
//! rule set matched against request paths, the upstream connector with its
//! streaming relay, and the TLS client configs for https targets.

pub mod rule;
pub mod tls;
pub mod upstream;

pub use rule::{ProxyRule, RuleSet};
pub use upstream::Forwarder;
