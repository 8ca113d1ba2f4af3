//! Forwarding rule set and path matching.
//!
//! The rule set is built once from configuration at startup and shared
//! immutably across connection tasks, so lookup needs no locking.

use crate::config::RuleConfig;
use anyhow::Context;

/// A single validated forwarding rule.
#[derive(Debug, Clone)]
pub struct ProxyRule {
    /// Path prefix matched against the incoming request path
    pub path_prefix: String,

    /// Upstream base URL (scheme + host + port)
    pub target: url::Url,

    /// Rewrite Host/Origin to the target's host when forwarding
    pub change_origin: bool,

    /// Validate the upstream TLS certificate
    pub secure: bool,
}

impl ProxyRule {
    /// The target's host[:port] as it should appear in a rewritten Host
    /// header. The port is omitted when it is the scheme default.
    pub fn target_host(&self) -> String {
        let host = self.target.host_str().unwrap_or_default();
        match self.target.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }
}

/// The immutable set of forwarding rules.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<ProxyRule>,
}

impl RuleSet {
    /// Validate and build the rule set from configuration.
    ///
    /// Each target must be an http or https URL with a host.
    pub fn from_config(configs: &[RuleConfig]) -> anyhow::Result<Self> {
        let mut rules = Vec::with_capacity(configs.len());

        for cfg in configs {
            let target = url::Url::parse(&cfg.target)
                .with_context(|| format!("Invalid target URL: {}", cfg.target))?;

            match target.scheme() {
                "http" | "https" => {}
                other => anyhow::bail!(
                    "Unsupported target scheme '{}' in {}",
                    other,
                    cfg.target
                ),
            }

            if target.host_str().is_none() {
                anyhow::bail!("Target URL missing host: {}", cfg.target);
            }

            rules.push(ProxyRule {
                path_prefix: cfg.path_prefix.clone(),
                target,
                change_origin: cfg.change_origin,
                secure: cfg.secure,
            });
        }

        Ok(Self { rules })
    }

    /// Returns the rule whose prefix matches `path`, if any.
    ///
    /// Longest prefix wins; ties are broken by configuration order. The
    /// scan is linear, which is fine for the handful of rules a dev setup
    /// carries.
    pub fn find(&self, path: &str) -> Option<&ProxyRule> {
        let mut best: Option<&ProxyRule> = None;

        for rule in &self.rules {
            if !path.starts_with(&rule.path_prefix) {
                continue;
            }

            match best {
                Some(b) if b.path_prefix.len() >= rule.path_prefix.len() => {}
                _ => best = Some(rule),
            }
        }

        best
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }
}
