use serde::Deserialize;

/// A single forwarding rule as written in the config file.
///
/// `change_origin` and `secure` are optional in YAML; they default to
/// `false` and `true` respectively, matching common dev-proxy conventions.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfig {
    /// Path prefix to intercept (e.g. "/events")
    pub path_prefix: String,

    /// Upstream base URL (e.g. "http://webhook:5000")
    pub target: String,

    /// Rewrite the Host/Origin header to the target's host
    #[serde(default)]
    pub change_origin: bool,

    /// Validate the upstream TLS certificate (false accepts self-signed)
    #[serde(default = "default_secure")]
    pub secure: bool,
}

fn default_secure() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

fn default_listen_addr() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            rules: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration at startup.
    ///
    /// Reads the YAML file named by the COURIER_CONFIG env var (default
    /// "courier.yaml"). A missing file yields the default config. The
    /// LISTEN env var, if set, overrides the listen address.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("COURIER_CONFIG")
            .unwrap_or_else(|_| "courier.yaml".to_string());

        let mut cfg = match std::fs::read_to_string(&path) {
            Ok(contents) => Self::from_yaml(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path, "Config file not found, using defaults");
                Self::default()
            }
            Err(e) => return Err(anyhow::anyhow!("Failed to read {}: {}", path, e)),
        };

        if let Ok(listen) = std::env::var("LISTEN") {
            cfg.listen_addr = listen;
        }

        Ok(cfg)
    }

    pub fn from_yaml(contents: &str) -> anyhow::Result<Self> {
        let cfg: Config = serde_yaml::from_str(contents)?;
        Ok(cfg)
    }
}
