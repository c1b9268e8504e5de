//! Credential resolution for the Hub client.
//!
//! Resolution is computed once, before the client is built. First match wins:
//! explicit user name and password, then an explicit token, then the named
//! server entry from the settings (user name + password is basic auth, a
//! password alone is a token).

use tracing::debug;

use crate::config::HubConfig;
use crate::error::PublishError;
use crate::settings::Settings;
use crate::strings::{is_empty, non_empty};

#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Basic { user: String, password: String },
    Token(String),
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Basic { user, .. } => f
                .debug_struct("Basic")
                .field("user", user)
                .field("password", &"***")
                .finish(),
            Credentials::Token(_) => f.debug_tuple("Token").field(&"***").finish(),
        }
    }
}

impl Credentials {
    /// Value of the `Authorization` header.
    pub fn authorization(&self) -> String {
        use base64::Engine;
        match self {
            Credentials::Basic { user, password } => {
                let encoded = base64::engine::general_purpose::STANDARD
                    .encode(format!("{user}:{password}"));
                format!("Basic {encoded}")
            }
            Credentials::Token(token) => format!("token {token}"),
        }
    }

    /// Resolve credentials from the connection config and optional settings.
    pub fn resolve(config: &HubConfig, settings: Option<&Settings>) -> Result<Self, PublishError> {
        let (user, password) = (config.user_name.as_deref(), config.password.as_deref());
        if !is_empty(&[user, password]) {
            let user = user.unwrap_or_default();
            debug!(user, "Using basic authentication");
            return Ok(Credentials::Basic {
                user: user.to_string(),
                password: password.unwrap_or_default().to_string(),
            });
        }

        if let Some(token) = non_empty(config.oauth2_token.as_deref()) {
            debug!("Using OAuth2 access token authentication");
            return Ok(Credentials::Token(token.to_string()));
        }

        if let Some(server_id) = non_empty(config.server.as_deref()) {
            if let Some(credentials) = Self::from_server(server_id, settings)? {
                return Ok(credentials);
            }
        }

        Err(PublishError::NoCredentials)
    }

    fn from_server(server_id: &str, settings: Option<&Settings>) -> Result<Option<Self>, PublishError> {
        let server = settings
            .and_then(|s| s.find_server(server_id))
            .ok_or_else(|| {
                PublishError::Config(format!("Server '{server_id}' not found in settings"))
            })?;
        debug!(server = server_id, "Using server credentials");

        let username = non_empty(server.username.as_deref());
        let password = non_empty(server.password.as_deref());
        match (username, password) {
            (Some(user), Some(password)) => {
                debug!(user, "Using basic authentication");
                Ok(Some(Credentials::Basic {
                    user: user.to_string(),
                    password: password.to_string(),
                }))
            }
            // A password without a user name is taken to be a token.
            (None, Some(token)) => {
                debug!("Using OAuth2 access token authentication");
                Ok(Some(Credentials::Token(token.to_string())))
            }
            _ => {
                debug!(server = server_id, "Server is missing username/password credentials");
                Ok(None)
            }
        }
    }
}
