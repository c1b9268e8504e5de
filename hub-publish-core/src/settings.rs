//! Named servers and HTTP proxies supplied by the build host's settings.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::repository::HOST_DEFAULT;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub servers: Vec<Server>,
    #[serde(default)]
    pub proxies: Vec<Proxy>,
}

/// A named credential entry.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Server {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("password_set", &self.password.is_some())
            .finish()
    }
}

fn default_active() -> bool {
    true
}

fn default_protocol() -> String {
    "http".to_string()
}

#[derive(Clone, Serialize, Deserialize)]
pub struct Proxy {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Hosts that bypass the proxy, separated by `,`, `;` or `|`.
    #[serde(default)]
    pub non_proxy_hosts: Option<String>,
}

impl std::fmt::Debug for Proxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Proxy")
            .field("id", &self.id)
            .field("active", &self.active)
            .field("protocol", &self.protocol)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("non_proxy_hosts", &self.non_proxy_hosts)
            .finish()
    }
}

impl Proxy {
    fn is_http(&self) -> bool {
        self.protocol.eq_ignore_ascii_case("http") || self.protocol.eq_ignore_ascii_case("https")
    }

    /// `http://host:port`
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl Settings {
    pub fn find_server(&self, id: &str) -> Option<&Server> {
        self.servers.iter().find(|s| s.id == id)
    }
}

/// True if `hostname` matches one of the proxy's non-proxy host patterns.
///
/// Patterns are literal host names or contain one `*` as `prefix*`,
/// `*suffix` or `prefix*suffix`. A missing host is matched as the public
/// Hub host.
pub fn match_non_proxy(proxy: &Proxy, hostname: Option<&str>) -> bool {
    let host = hostname.unwrap_or(HOST_DEFAULT);
    let Some(non_proxy_hosts) = proxy.non_proxy_hosts.as_deref() else {
        return false;
    };

    non_proxy_hosts
        .split(|c: char| matches!(c, ',' | ';' | '|'))
        .map(str::trim)
        .filter(|pattern| !pattern.is_empty())
        .any(|pattern| match pattern.split_once('*') {
            Some((prefix, suffix)) => match (prefix.is_empty(), suffix.is_empty()) {
                (false, true) => host.starts_with(prefix),
                (true, false) => host.ends_with(suffix),
                (false, false) => {
                    host.len() >= prefix.len() + suffix.len()
                        && host.starts_with(prefix)
                        && host.ends_with(suffix)
                }
                // A bare `*` has neither prefix nor suffix and matches nothing.
                (true, true) => false,
            },
            None => host == pattern,
        })
}

/// Pick the proxy to use for `host`, if any.
///
/// An active HTTP(S) proxy whose id equals the server id wins; otherwise the
/// first active HTTP(S) proxy is considered. Whichever is chosen is dropped
/// again when `host` is one of its non-proxy hosts.
pub fn select_proxy<'a>(
    settings: Option<&'a Settings>,
    server_id: Option<&str>,
    host: Option<&str>,
) -> Option<&'a Proxy> {
    let settings = settings?;
    let candidates = || settings.proxies.iter().filter(|p| p.active && p.is_http());

    let by_id = server_id.filter(|id| !id.is_empty()).and_then(|id| {
        candidates().find(|p| {
            p.id
                .as_deref()
                .is_some_and(|proxy_id| !proxy_id.is_empty() && proxy_id.eq_ignore_ascii_case(id))
        })
    });

    let proxy = by_id.or_else(|| candidates().next())?;
    if match_non_proxy(proxy, host) {
        debug!(proxy = %proxy.url(), host = host.unwrap_or(HOST_DEFAULT), "Host bypasses proxy");
        None
    } else {
        debug!(proxy = %proxy.url(), "Found proxy");
        Some(proxy)
    }
}
