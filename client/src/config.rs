//! Client configuration
//!
//! Configuration is loaded from environment variables, the same ones the
//! project's deploy tooling exports for the frontend.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Which kind of network the backend is deployed on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkMode {
    /// Local development replica; its root key must be fetched before use
    Local,
    /// Any other network; the root key is configured, never fetched
    Remote,
}

impl NetworkMode {
    /// `local` selects [`NetworkMode::Local`], anything else is remote
    pub fn from_name(name: &str) -> Self {
        if name.trim().eq_ignore_ascii_case("local") {
            Self::Local
        } else {
            Self::Remote
        }
    }

    pub fn is_local(self) -> bool {
        self == Self::Local
    }
}

/// Main client configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Network the backend is deployed on
    pub network: NetworkMode,
    /// Replica base URL
    pub replica_host: String,
    /// Identifier of the greeting backend service
    pub backend_id: String,
    /// Identifier of the identity provider service
    pub identity_provider_id: String,
    /// Explicit identity provider URL, overriding the derived one
    pub identity_provider_url: Option<String>,
    /// Hex-encoded DER root key trusted on remote networks
    pub trusted_root_key: Option<String>,
    /// Where the identity provider client keeps its session
    pub storage_dir: PathBuf,

    /// Session configuration
    pub session: SessionConfig,

    /// Development replica configuration
    pub replica: ReplicaConfig,
}

/// Session-related configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long an interactive login may stay open; `None` waits forever
    pub login_timeout: Option<Duration>,
    /// Lifetime of a granted session
    pub session_ttl: Duration,
}

/// Development replica configuration
#[derive(Debug, Clone)]
pub struct ReplicaConfig {
    /// Bind address
    pub bind: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkMode::Local,
            replica_host: "http://127.0.0.1:4943".to_string(),
            backend_id: "bkyz2-fmaaa-aaaaa-qaaaq-cai".to_string(),
            identity_provider_id: "rdmx6-jaaaa-aaaaa-aaadq-cai".to_string(),
            identity_provider_url: None,
            trusted_root_key: None,
            storage_dir: default_storage_dir(),
            session: SessionConfig::default(),
            replica: ReplicaConfig::default(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            login_timeout: Some(Duration::from_secs(5 * 60)),
            session_ttl: Duration::from_secs(8 * 60 * 60), // 8 hours
        }
    }
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:4943".to_string(),
        }
    }
}

fn default_storage_dir() -> PathBuf {
    match env::var("HOME") {
        Ok(home) if !home.is_empty() => PathBuf::from(home).join(".authapp"),
        _ => PathBuf::from(".authapp"),
    }
}

/// Whole hours as a duration; `None` if unparsable or out of range
fn parse_hours(value: &str) -> Option<Duration> {
    let hours = value.parse::<u64>().ok()?;
    hours.checked_mul(60 * 60).map(Duration::from_secs)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // Network config
        if let Ok(network) = env::var("DFX_NETWORK") {
            config.network = NetworkMode::from_name(&network);
        }
        if let Ok(host) = env::var("REPLICA_HOST")
            && !host.is_empty()
        {
            config.replica_host = host;
        }
        if let Ok(id) = env::var("CANISTER_ID_AUTH_APP_BACKEND")
            && !id.is_empty()
        {
            config.backend_id = id;
        }
        if let Ok(id) = env::var("CANISTER_ID_INTERNET_IDENTITY")
            && !id.is_empty()
        {
            config.identity_provider_id = id;
        }
        if let Ok(url) = env::var("IDENTITY_PROVIDER_URL")
            && !url.is_empty()
        {
            config.identity_provider_url = Some(url);
        }
        if let Ok(key) = env::var("TRUSTED_ROOT_KEY")
            && !key.is_empty()
        {
            config.trusted_root_key = Some(key);
        }
        if let Ok(dir) = env::var("AUTHAPP_STORAGE_DIR")
            && !dir.is_empty()
        {
            config.storage_dir = PathBuf::from(dir);
        }

        // Session config
        if let Ok(val) = env::var("LOGIN_TIMEOUT_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            config.session.login_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Ok(val) = env::var("SESSION_TTL_HOURS")
            && let Some(ttl) = parse_hours(&val)
        {
            config.session.session_ttl = ttl;
        }

        // Replica config
        if let Ok(bind) = env::var("REPLICA_BIND")
            && !bind.is_empty()
        {
            config.replica.bind = bind;
        }

        config
    }

    /// URL the interactive login flow is opened at
    pub fn identity_provider_url(&self) -> String {
        if let Some(ref url) = self.identity_provider_url {
            return url.clone();
        }
        match self.network {
            NetworkMode::Local => format!("http://{}.localhost:8080", self.identity_provider_id),
            NetworkMode::Remote => "https://identity.ic0.app".to_string(),
        }
    }
}
