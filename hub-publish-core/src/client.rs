//! Authenticated HTTP client for the Hub's REST API.
//!
//! - Host resolution: the public host talks to `https://api.github.com`,
//!   any other host is an enterprise install served below `/api/v3`.
//! - Mutating verbs (POST, PUT, PATCH) wait on a rate limiter first. The
//!   limiter is created on first use from a probe of `/rate_limit`; GET and
//!   DELETE are never limited.
//! - An optional HTTP proxy is applied to every request.

use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, LINK};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::HubConfig;
use crate::credentials::Credentials;
use crate::error::PublishError;
use crate::rate_limit::{rate_from_headers, RateLimiter, FALLBACK_PERMITS_PER_SECOND};
use crate::repository::{HOST_API, HOST_DEFAULT};
use crate::settings::{select_proxy, Proxy, Settings};
use crate::strings::non_empty;

pub const USER_AGENT: &str = concat!("hub-publish/", env!("CARGO_PKG_VERSION"));
pub const MEDIA_TYPE_JSON: &str = "application/vnd.github+json";
pub const MEDIA_TYPE_BINARY: &str = "application/octet-stream";

const SCHEME_DEFAULT: &str = "https";
const PREFIX_ENTERPRISE: &str = "/api/v3";
const PATH_RATE_LIMIT: &str = "/rate_limit";

/// API root for `host`, without a trailing slash.
///
/// A value containing `://` is parsed as a URL and keeps its scheme and
/// port; a bare value is a host name reached over https.
pub fn api_base_url(host: Option<&str>) -> Result<String, PublishError> {
    let Some(host) = non_empty(host.map(str::trim)) else {
        return Ok(format!("{SCHEME_DEFAULT}://{HOST_API}"));
    };

    let (scheme, hostname, port) = if host.contains("://") {
        let url = url::Url::parse(host)
            .map_err(|e| PublishError::Config(format!("Invalid host URL '{host}': {e}")))?;
        let hostname = url
            .host_str()
            .ok_or_else(|| PublishError::Config(format!("Host URL '{host}' has no host")))?
            .to_string();
        (url.scheme().to_string(), hostname, url.port())
    } else {
        (SCHEME_DEFAULT.to_string(), host.to_string(), None)
    };

    let authority = match port {
        Some(port) => format!("{hostname}:{port}"),
        None => hostname.clone(),
    };
    if hostname == HOST_DEFAULT || hostname == HOST_API {
        Ok(format!("{scheme}://{HOST_API}"))
    } else {
        Ok(format!("{scheme}://{authority}{PREFIX_ENTERPRISE}"))
    }
}

/// Host name used for non-proxy matching, `None` for the public host.
fn proxy_match_host(host: Option<&str>) -> Option<String> {
    let host = non_empty(host.map(str::trim))?;
    if host.contains("://") {
        url::Url::parse(host).ok()?.host_str().map(str::to_string)
    } else {
        Some(host.to_string())
    }
}

/// Target of the `rel="next"` entry of a `Link` header.
fn next_page(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(LINK)?.to_str().ok()?;
    link.split(',').find_map(|entry| {
        let (target, params) = entry.split_once(';')?;
        params
            .split(';')
            .any(|param| param.trim() == r#"rel="next""#)
            .then(|| target.trim().trim_start_matches('<').trim_end_matches('>').to_string())
    })
}

/// Client for one Hub. Cloning is cheap; clones share the rate limiter.
#[derive(Debug, Clone)]
pub struct HubClient {
    http: reqwest::Client,
    base_url: String,
    limiter: Arc<OnceCell<RateLimiter>>,
}

impl HubClient {
    /// Build a client for `host` (public Hub when `None`) using `credentials`,
    /// routed through `proxy` when given.
    pub fn new(host: Option<&str>, credentials: &Credentials, proxy: Option<&Proxy>) -> Result<Self, PublishError> {
        let base_url = api_base_url(host)?;

        let mut headers = HeaderMap::new();
        let mut authorization = HeaderValue::from_str(&credentials.authorization())
            .map_err(|_| PublishError::Config("Credentials contain invalid header characters".to_string()))?;
        authorization.set_sensitive(true);
        headers.insert(AUTHORIZATION, authorization);
        headers.insert(ACCEPT, HeaderValue::from_static(MEDIA_TYPE_JSON));

        let builder = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers);
        let builder = match proxy {
            Some(proxy) => {
                let mut route = reqwest::Proxy::all(proxy.url())
                    .map_err(|e| PublishError::Config(format!("Invalid proxy {}: {e}", proxy.url())))?;
                if let (Some(user), Some(password)) =
                    (non_empty(proxy.username.as_deref()), proxy.password.as_deref())
                {
                    route = route.basic_auth(user, password);
                }
                info!(proxy = %proxy.url(), "Routing Hub requests through proxy");
                builder.proxy(route)
            }
            None => builder.no_proxy(),
        };
        let http = builder.build()?;

        debug!(base_url = %base_url, "Created Hub client");
        Ok(Self {
            http,
            base_url,
            limiter: Arc::new(OnceCell::new()),
        })
    }

    /// Resolve credentials and proxy from configuration, then build the client.
    pub fn from_config(config: &HubConfig, settings: Option<&Settings>) -> Result<Self, PublishError> {
        let credentials = Credentials::resolve(config, settings)?;
        let match_host = proxy_match_host(config.host.as_deref());
        let proxy = select_proxy(settings, config.server.as_deref(), match_host.as_deref());
        Self::new(config.host.as_deref(), &credentials, proxy)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// The limiter, probing the Hub's rate limit on first use. Concurrent
    /// first callers share a single probe.
    async fn limiter(&self) -> &RateLimiter {
        self.limiter
            .get_or_init(|| async { RateLimiter::new(self.probe_rate().await) })
            .await
    }

    async fn probe_rate(&self) -> f64 {
        let now = chrono::Utc::now().timestamp();
        match self.http.get(self.url(PATH_RATE_LIMIT)).send().await {
            Ok(response) if response.status().is_success() => {
                match rate_from_headers(response.headers(), now) {
                    Some(rate) => {
                        info!(permits_per_second = rate, "Rate limit probed");
                        rate
                    }
                    None => {
                        warn!(
                            permits_per_second = FALLBACK_PERMITS_PER_SECOND,
                            "Rate limit headers missing, using fallback rate"
                        );
                        FALLBACK_PERMITS_PER_SECOND
                    }
                }
            }
            Ok(response) => {
                warn!(
                    status = response.status().as_u16(),
                    permits_per_second = FALLBACK_PERMITS_PER_SECOND,
                    "Rate limit probe rejected, using fallback rate"
                );
                FALLBACK_PERMITS_PER_SECOND
            }
            Err(e) => {
                warn!(
                    error = %e,
                    permits_per_second = FALLBACK_PERMITS_PER_SECOND,
                    "Rate limit probe failed, using fallback rate"
                );
                FALLBACK_PERMITS_PER_SECOND
            }
        }
    }

    fn is_limited(method: &Method) -> bool {
        *method == Method::POST || *method == Method::PUT || *method == Method::PATCH
    }

    async fn execute(&self, method: Method, request: RequestBuilder) -> Result<Response, PublishError> {
        if Self::is_limited(&method) {
            self.limiter().await.acquire().await;
        }
        let response = request.send().await?;
        let status = response.status();
        debug!(%method, status = status.as_u16(), url = %response.url(), "Hub response");
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(PublishError::from_response(status.as_u16(), &body))
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, PublishError> {
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| PublishError::Decode(e.to_string()))
    }

    async fn send_json<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T, PublishError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let request = self.http.request(method.clone(), self.url(path)).json(body);
        let response = self.execute(method, request).await?;
        Self::decode(response).await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, PublishError> {
        let request = self.http.get(self.url(path));
        let response = self.execute(Method::GET, request).await?;
        Self::decode(response).await
    }

    /// GET a list resource and every following page named by the `Link`
    /// header.
    pub async fn get_all<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, PublishError> {
        let mut items = Vec::new();
        let mut next = Some(self.url(path));
        while let Some(url) = next.take() {
            let response = self.execute(Method::GET, self.http.get(&url)).await?;
            next = next_page(response.headers());
            let page: Vec<T> = Self::decode(response).await?;
            debug!(url = %url, count = page.len(), more = next.is_some(), "Fetched page");
            items.extend(page);
        }
        Ok(items)
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, PublishError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        self.send_json(Method::POST, path, body).await
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T, PublishError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        self.send_json(Method::PUT, path, body).await
    }

    pub async fn patch<B, T>(&self, path: &str, body: &B) -> Result<T, PublishError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        self.send_json(Method::PATCH, path, body).await
    }

    /// DELETE; any response body is discarded.
    pub async fn delete(&self, path: &str) -> Result<(), PublishError> {
        let request = self.http.delete(self.url(path));
        self.execute(Method::DELETE, request).await?;
        Ok(())
    }

    /// POST raw bytes to an absolute URL handed out by the Hub (upload hosts
    /// differ from the API root).
    pub async fn post_bytes<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        bytes: Vec<u8>,
    ) -> Result<T, PublishError> {
        let request = self
            .http
            .post(url)
            .query(query)
            .header(CONTENT_TYPE, MEDIA_TYPE_BINARY)
            .body(bytes);
        let response = self.execute(Method::POST, request).await?;
        Self::decode(response).await
    }
}
