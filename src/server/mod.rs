pub mod listener;

use crate::config::Config;
use crate::proxy::{Forwarder, RuleSet};
use std::time::Duration;

/// Upstream connect timeout. There is deliberately no overall request or
/// stream timeout: event-stream connections are held open indefinitely.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Immutable per-process state shared by all connection tasks.
pub struct ServerContext {
    pub rules: RuleSet,
    pub forwarder: Forwarder,
}

impl ServerContext {
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            rules: RuleSet::from_config(&cfg.rules)?,
            forwarder: Forwarder::new(CONNECT_TIMEOUT)?,
        })
    }
}
