//! GitHub REST API transport

use std::process::Command;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::config::RegistryConfig;
use crate::error::{KeyError, Result};
use crate::keys::{KeyId, KeyKind, RemoteKey};

use super::{is_duplicate, parse_timestamp, NewKey, RemoteKeyRegistry};

const PER_PAGE: usize = 100;
const API_VERSION: &str = "2022-11-28";

/// SSH key entry from `GET /user/keys`
#[derive(Debug, Deserialize)]
struct SshKeyResponse {
    id: u64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
}

/// GPG key entry from `GET /user/gpg_keys`
#[derive(Debug, Deserialize)]
struct GpgKeyResponse {
    id: u64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    key_id: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    expires_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedResponse {
    id: u64,
}

#[derive(Serialize)]
struct CreateSshKey<'a> {
    title: &'a str,
    key: &'a str,
}

#[derive(Serialize)]
struct CreateGpgKey<'a> {
    name: &'a str,
    armored_public_key: &'a str,
}

impl From<SshKeyResponse> for RemoteKey {
    fn from(key: SshKeyResponse) -> Self {
        let title = key.title.unwrap_or_default();
        RemoteKey {
            id: key.id.to_string(),
            created_at: parse_timestamp(key.created_at.as_deref(), &title),
            title,
            fingerprint: None,
            expires_at: None,
        }
    }
}

impl From<GpgKeyResponse> for RemoteKey {
    fn from(key: GpgKeyResponse) -> Self {
        let title = key.name.unwrap_or_default();
        RemoteKey {
            id: key.id.to_string(),
            created_at: parse_timestamp(key.created_at.as_deref(), &title),
            expires_at: parse_timestamp(key.expires_at.as_deref(), &title),
            fingerprint: key.key_id,
            title,
        }
    }
}

/// Registry backed by the GitHub REST API
pub struct GitHubApi {
    client: Client,
    base_url: String,
    token: String,
}

impl GitHubApi {
    /// Create an API client, resolving the token from the environment or `gh`
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        let token = resolve_token(config)?;
        Self::with_token(config, token)
    }

    pub fn with_token(config: &RegistryConfig, token: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("machine-keys/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| KeyError::remote("Failed to build HTTP client", e))?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn collection(kind: KeyKind) -> &'static str {
        match kind {
            KeyKind::Ssh => "user/keys",
            KeyKind::Gpg => "user/gpg_keys",
        }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    fn send(&self, request: RequestBuilder, context: &str) -> Result<Response> {
        self.authorized(request)
            .send()
            .map_err(|e| KeyError::remote(context, e))
    }

    fn list_pages<T>(&self, kind: KeyKind) -> Result<Vec<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        let context = format!("Failed to list {} keys", kind);
        let url = format!("{}/{}", self.base_url, Self::collection(kind));
        let mut all = Vec::new();

        for page in 1.. {
            let request = self
                .client
                .get(&url)
                .query(&[("per_page", PER_PAGE), ("page", page)]);
            let response = self.send(request, &context)?;
            let status = response.status();
            if !status.is_success() {
                return Err(status_error(&context, status, &body_text(response)));
            }

            let batch: Vec<T> = response
                .json()
                .map_err(|e| KeyError::remote(&context, e))?;
            let done = batch.len() < PER_PAGE;
            all.extend(batch);
            if done {
                break;
            }
        }

        tracing::debug!("Listed {} {} key(s) from GitHub", all.len(), kind);
        Ok(all)
    }
}

impl RemoteKeyRegistry for GitHubApi {
    fn list(&self, kind: KeyKind) -> Result<Vec<RemoteKey>> {
        let keys = match kind {
            KeyKind::Ssh => self
                .list_pages::<SshKeyResponse>(kind)?
                .into_iter()
                .map(RemoteKey::from)
                .collect(),
            KeyKind::Gpg => self
                .list_pages::<GpgKeyResponse>(kind)?
                .into_iter()
                .map(RemoteKey::from)
                .collect(),
        };
        Ok(keys)
    }

    fn register(&self, key: &NewKey) -> Result<Option<KeyId>> {
        let context = format!("Failed to add {} key '{}'", key.kind, key.title);
        let url = format!("{}/{}", self.base_url, Self::collection(key.kind));
        let request = match key.kind {
            KeyKind::Ssh => self.client.post(&url).json(&CreateSshKey {
                title: &key.title,
                key: &key.public_key,
            }),
            KeyKind::Gpg => self.client.post(&url).json(&CreateGpgKey {
                name: &key.title,
                armored_public_key: &key.public_key,
            }),
        };

        let response = self.send(request, &context)?;
        let status = response.status();
        if !status.is_success() {
            let body = body_text(response);
            if status == StatusCode::UNPROCESSABLE_ENTITY
                && api_messages(&body).iter().any(|m| is_duplicate(m))
            {
                tracing::debug!("GitHub rejected {} key '{}': {}", key.kind, key.title, body);
                return Err(KeyError::Conflict {
                    kind: key.kind,
                    title: key.title.clone(),
                });
            }
            return Err(status_error(&context, status, &body));
        }

        let created: CreatedResponse = response
            .json()
            .map_err(|e| KeyError::remote(&context, e))?;
        Ok(Some(KeyId::new(key.kind, created.id.to_string())))
    }

    fn delete(&self, id: &KeyId) -> Result<()> {
        let context = format!("Failed to delete {} key {}", id.kind(), id.value());
        let url = format!(
            "{}/{}/{}",
            self.base_url,
            Self::collection(id.kind()),
            id.value()
        );

        let response = self.send(self.client.delete(&url), &context)?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(KeyError::NotFound { id: id.clone() }),
            status => Err(status_error(&context, status, &body_text(response))),
        }
    }
}

fn body_text(response: Response) -> String {
    response.text().unwrap_or_default()
}

/// `message` plus any `errors[].message` from a GitHub error body
fn api_messages(body: &str) -> Vec<String> {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return Vec::new();
    };

    let top = value.get("message").and_then(|m| m.as_str());
    let details = value
        .get("errors")
        .and_then(|e| e.as_array())
        .into_iter()
        .flatten()
        .filter_map(|e| e.get("message").and_then(|m| m.as_str()));
    top.into_iter().chain(details).map(String::from).collect()
}

/// Map an unexpected HTTP status to a remote error
fn status_error(context: &str, status: StatusCode, body: &str) -> KeyError {
    let messages = api_messages(body);
    let message = if messages.is_empty() {
        body.trim().to_string()
    } else {
        messages.join(": ")
    };

    let hint = match status {
        StatusCode::UNAUTHORIZED => " (check GH_TOKEN / `gh auth login`)",
        StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
            " (token may lack the admin:public_key / admin:gpg_key scopes)"
        }
        _ => "",
    };

    KeyError::remote(context, format!("HTTP {}: {}{}", status.as_u16(), message, hint))
}

/// Find an API token: configured environment variables first, then `gh auth token`
fn resolve_token(config: &RegistryConfig) -> Result<String> {
    for var in &config.token_env {
        if let Ok(token) = std::env::var(var) {
            if !token.trim().is_empty() {
                tracing::debug!("Using GitHub token from ${}", var);
                return Ok(token.trim().to_string());
            }
        }
    }

    let output = Command::new(&config.gh_program)
        .args(["auth", "token", "--hostname", "github.com"])
        .output();
    match output {
        Ok(out) if out.status.success() => {
            let token = String::from_utf8_lossy(&out.stdout).trim().to_string();
            if !token.is_empty() {
                tracing::debug!("Using GitHub token from gh auth");
                return Ok(token);
            }
        }
        Ok(out) => {
            tracing::debug!(
                "gh auth token failed: {}",
                String::from_utf8_lossy(&out.stderr).trim()
            );
        }
        Err(e) => tracing::debug!("gh not available: {}", e),
    }

    Err(KeyError::remote(
        "GitHub authentication",
        format!(
            "no token found in {} and `gh auth token` failed",
            config.token_env.join(", ")
        ),
    ))
}
