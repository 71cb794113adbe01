use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{header, Client, Proxy, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::login::LoginContext;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid or expired token; set a fresh VIP_TOKEN and retry")]
    Unauthorized,
    #[error("API returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("GraphQL error: {0}")]
    GraphQl(String),
    #[error("unexpected API response: {0}")]
    Schema(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ProxyMode {
    /// `VIP_PROXY`: route everything through a SOCKS proxy.
    Socks(String),
    /// `VIP_PROXY_OTHER_ENABLED`: honor HTTP(S)_PROXY / NO_PROXY.
    System,
    Disabled,
}

fn proxy_mode(lookup: impl Fn(&str) -> Option<String>) -> ProxyMode {
    let read = |name: &str| {
        lookup(name)
            .or_else(|| lookup(&name.to_lowercase()))
            .filter(|v| !v.trim().is_empty())
    };
    if let Some(url) = read("VIP_PROXY") {
        return ProxyMode::Socks(url);
    }
    if read("VIP_PROXY_OTHER_ENABLED").is_some() {
        return ProxyMode::System;
    }
    ProxyMode::Disabled
}

#[derive(Serialize)]
struct GraphQlRequest<'a, V> {
    query: &'a str,
    variables: V,
}

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlErrorEntry>,
}

#[derive(Deserialize)]
struct GraphQlErrorEntry {
    message: String,
}

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    token: String,
}

impl ApiClient {
    pub fn new(ctx: &LoginContext) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(format!("vip-cli/{}", crate::CLI_VERSION));

        builder = match proxy_mode(|name| std::env::var(name).ok()) {
            ProxyMode::Socks(url) => {
                tracing::debug!(proxy = %url, "using SOCKS proxy");
                builder.proxy(Proxy::all(&url).with_context(|| format!("invalid VIP_PROXY {url}"))?)
            }
            ProxyMode::System => builder,
            ProxyMode::Disabled => builder.no_proxy(),
        };

        Ok(Self {
            http: builder.build().context("failed to build HTTP client")?,
            base_url: ctx.api_url.clone(),
            token: ctx.token.clone(),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Run a GraphQL query. Every call goes to the network; responses are
    /// never served from a cache.
    pub async fn graphql<V, T>(&self, query: &str, variables: V) -> Result<T, TransportError>
    where
        V: Serialize,
        T: DeserializeOwned,
    {
        let url = self.url("/graphql");
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .header(header::CACHE_CONTROL, "no-cache")
            .header(header::PRAGMA, "no-cache")
            .json(&GraphQlRequest { query, variables })
            .send()
            .await
            .map_err(|source| TransportError::Request {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(TransportError::Unauthorized);
        }
        let body = response
            .text()
            .await
            .map_err(|source| TransportError::Request { url, source })?;
        if !status.is_success() {
            return Err(TransportError::Status { status, body });
        }

        decode_graphql(&body)
    }
}

fn decode_graphql<T: DeserializeOwned>(body: &str) -> Result<T, TransportError> {
    let parsed: GraphQlResponse<T> =
        serde_json::from_str(body).map_err(|err| TransportError::Schema(err.to_string()))?;

    if !parsed.errors.is_empty() {
        let messages: Vec<String> = parsed.errors.into_iter().map(|e| e.message).collect();
        return Err(TransportError::GraphQl(messages.join("; ")));
    }

    parsed
        .data
        .ok_or_else(|| TransportError::Schema("response has no data".to_string()))
}
