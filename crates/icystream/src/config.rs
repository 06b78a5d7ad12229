//! Configuration constants and proxy settings for the HTTP input

use serde::Deserialize;

use crate::error::{InputError, Result};

/// Network-related configuration
pub mod network {
    /// User agent for HTTP requests
    pub const USER_AGENT: &str = concat!("icystream/", env!("CARGO_PKG_VERSION"));

    /// Connection timeout in seconds
    pub const CONNECT_TIMEOUT_SECS: u64 = 10;

    /// Maximum number of redirects to follow per transfer
    pub const MAX_REDIRECTS: usize = 5;
}

/// Stream buffer configuration
pub mod buffer {
    /// Do not buffer more than this number of bytes per stream.  A write
    /// that would reach this mark pauses the transfer instead.
    pub const MAX_BUFFERED: usize = 512 * 1024;

    /// Resume a paused transfer once the buffered total has drained below
    /// this level.  The gap to [`MAX_BUFFERED`] prevents pause/resume
    /// flapping.
    pub const RESUME_AT: usize = 384 * 1024;
}

/// Reactor configuration
pub mod reactor {
    /// Depth of the command queue into the I/O thread
    pub const COMMAND_QUEUE_DEPTH: usize = 32;
}

/// HTTP proxy settings, block form.
///
/// The host application's configuration layer deserializes this directly
/// from its `proxy` block; see [`ProxyConfig::resolve`] for the precedence
/// over the legacy flat keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProxyConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
}

/// Legacy flat proxy keys, honoured when the block form is absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LegacyProxySettings {
    pub http_proxy_host: Option<String>,
    pub http_proxy_port: Option<u16>,
    pub http_proxy_user: Option<String>,
    pub http_proxy_password: Option<String>,
}

impl From<LegacyProxySettings> for ProxyConfig {
    fn from(legacy: LegacyProxySettings) -> Self {
        Self {
            host: legacy.http_proxy_host,
            port: legacy.http_proxy_port,
            user: legacy.http_proxy_user,
            password: legacy.http_proxy_password,
        }
    }
}

impl ProxyConfig {
    /// Pick the effective proxy configuration: the block form wins when it
    /// names a host, otherwise the legacy keys apply.  Returns `None` when
    /// neither names a host.
    pub fn resolve(block: Option<Self>, legacy: Option<LegacyProxySettings>) -> Option<Self> {
        match block {
            Some(block) if block.host.is_some() => Some(block),
            _ => legacy
                .map(Self::from)
                .filter(|config| config.host.is_some()),
        }
    }

    /// Build the HTTP client proxy from these settings.
    pub(crate) fn to_proxy(&self) -> Result<reqwest::Proxy> {
        let host = self
            .host
            .as_deref()
            .ok_or_else(|| InputError::Setup("proxy host is not set".to_string()))?;

        let url = match self.port {
            Some(port) => format!("http://{host}:{port}"),
            None => format!("http://{host}"),
        };

        let mut proxy = reqwest::Proxy::all(&url)
            .map_err(|e| InputError::Setup(format!("invalid proxy {url}: {e}")))?;

        if let (Some(user), Some(password)) = (&self.user, &self.password) {
            proxy = proxy.basic_auth(user, password);
        }

        Ok(proxy)
    }
}
