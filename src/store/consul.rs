use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use reqwest::Url;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;

use super::KvEntry;
use super::KvListing;
use super::KvPair;
use super::KvStore;
use super::QueryMeta;
use super::QueryOptions;
use crate::constants::CONSUL_INDEX_HEADER;
use crate::constants::CONSUL_KV_PATH;
use crate::constants::CONSUL_TOKEN_HEADER;
use crate::constants::CONSUL_WAIT_JITTER_DIVISOR;
use crate::Error;
use crate::Result;
use crate::StartupError;
use crate::StoreConfig;
use crate::StoreError;

/// KV entry as returned by `GET /v1/kv/...`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ConsulKvEntry {
    key: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    create_index: u64,
    #[serde(default)]
    modify_index: u64,
    #[serde(default)]
    flags: u64,
}

impl ConsulKvEntry {
    fn into_pair(self) -> Result<KvPair> {
        let value = match self.value {
            Some(encoded) => STANDARD
                .decode(encoded.as_bytes())
                .map_err(|source| StoreError::InvalidValueEncoding {
                    key: self.key.clone(),
                    source,
                })?,
            None => Vec::new(),
        };

        Ok(KvPair {
            key: self.key,
            value,
            create_index: self.create_index,
            modify_index: self.modify_index,
            flags: self.flags,
        })
    }
}

/// Consul KV client over the HTTP API
///
/// Each call issues exactly one request. Blocking queries are raced against
/// the caller's cancellation token so that shutdown never waits out the
/// full wait time.
#[derive(Debug, Clone)]
pub struct ConsulClient {
    http: reqwest::Client,
    base_url: Url,
    datacenter: Option<String>,
    token: Option<String>,
    request_timeout: Duration,
}

impl ConsulClient {
    /// Creates a client for `address`
    ///
    /// # Errors
    /// - [`StartupError::InvalidAddress`] for empty addresses or unsupported schemes
    /// - [`StartupError::ClientBuild`] if the HTTP client cannot be built
    pub fn new(
        address: &str,
        config: &StoreConfig,
    ) -> Result<Self> {
        let normalized = normalize_address(address)?;
        let base_url = Url::parse(&normalized).map_err(|_| StartupError::InvalidAddress(normalized.clone()))?;
        if base_url.cannot_be_a_base() {
            return Err(StartupError::InvalidAddress(normalized).into());
        }

        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| StartupError::ClientBuild(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            datacenter: config.datacenter().map(str::to_string),
            token: config.token().map(str::to_string),
            request_timeout: config.request_timeout(),
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    /// URL of `key` below the KV endpoint. Every key segment is
    /// percent-encoded, so `#` and `?` stay part of the key.
    pub(crate) fn kv_url(
        &self,
        key: &str,
    ) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StartupError::InvalidAddress(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(CONSUL_KV_PATH.split('/'))
            .extend(key.trim_start_matches('/').split('/'));
        Ok(url)
    }

    pub(crate) fn query_params(
        &self,
        recurse: bool,
        options: &QueryOptions,
    ) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if recurse {
            params.push(("recurse", "true".to_string()));
        }
        if let Some(dc) = &self.datacenter {
            params.push(("dc", dc.clone()));
        }
        if options.is_blocking() {
            params.push(("index", options.wait_index.to_string()));
            params.push(("wait", format!("{}ms", options.wait_time.as_millis())));
        }
        params
    }

    /// Time budget for one request: the store may hold a blocking query for
    /// the wait time plus up to 1/16 of jitter.
    pub(crate) fn timeout_for(
        &self,
        options: &QueryOptions,
    ) -> Duration {
        if options.is_blocking() {
            self.request_timeout + options.wait_time + options.wait_time / CONSUL_WAIT_JITTER_DIVISOR
        } else {
            self.request_timeout
        }
    }

    async fn query(
        &self,
        key: &str,
        recurse: bool,
        options: QueryOptions,
        token: &CancellationToken,
    ) -> Result<(Vec<KvPair>, QueryMeta)> {
        let url = self.kv_url(key)?;
        trace!("GET {} {:?}", url, options);

        let mut request = self
            .http
            .get(url.clone())
            .query(&self.query_params(recurse, &options))
            .timeout(self.timeout_for(&options));
        if let Some(acl_token) = &self.token {
            request = request.header(CONSUL_TOKEN_HEADER, acl_token);
        }

        let response = tokio::select! {
            response = request.send() => response?,
            _ = token.cancelled() => return Err(Error::Cancelled),
        };

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            let meta = parse_query_meta(response.headers())?;
            debug!("{} does not exist (index {})", url, meta.last_index);
            return Ok((Vec::new(), meta));
        }

        let meta = if status.is_success() {
            Some(parse_query_meta(response.headers())?)
        } else {
            None
        };

        let body = tokio::select! {
            body = response.bytes() => body?,
            _ = token.cancelled() => return Err(Error::Cancelled),
        };

        let Some(meta) = meta else {
            return Err(StoreError::UnexpectedStatus {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).trim().to_string(),
            }
            .into());
        };

        let entries: Vec<ConsulKvEntry> = serde_json::from_slice(&body)?;
        let pairs = entries
            .into_iter()
            .map(ConsulKvEntry::into_pair)
            .collect::<Result<Vec<_>>>()?;

        Ok((pairs, meta))
    }
}

#[async_trait]
impl KvStore for ConsulClient {
    async fn list(
        &self,
        prefix: &str,
        options: QueryOptions,
        token: &CancellationToken,
    ) -> Result<KvListing> {
        let (pairs, meta) = self.query(prefix, true, options, token).await?;
        Ok(KvListing { pairs, meta })
    }

    async fn get(
        &self,
        key: &str,
        options: QueryOptions,
        token: &CancellationToken,
    ) -> Result<KvEntry> {
        let (pairs, meta) = self.query(key, false, options, token).await?;
        // A non-recursive read matches on the exact key only
        let pair = pairs.into_iter().find(|p| p.key == key);
        Ok(KvEntry { pair, meta })
    }
}

/// Accepts `host:port` or an `http(s)://` URL and returns a base URL
/// without trailing separator
pub(crate) fn normalize_address(address: &str) -> Result<String> {
    let address = address.trim();

    let (scheme, rest) = match address.split_once("://") {
        Some((scheme @ ("http" | "https"), rest)) => (scheme, rest),
        Some(_) => return Err(StartupError::InvalidAddress(address.to_string()).into()),
        None => ("http", address),
    };

    let rest = rest.trim_end_matches('/');
    if rest.is_empty() {
        return Err(StartupError::InvalidAddress(address.to_string()).into());
    }

    Ok(format!("{scheme}://{rest}"))
}

pub(crate) fn parse_query_meta(headers: &HeaderMap) -> Result<QueryMeta> {
    let raw = headers
        .get(CONSUL_INDEX_HEADER)
        .ok_or(StoreError::MissingIndexHeader)?;
    let raw = raw
        .to_str()
        .map_err(|_| StoreError::InvalidIndexHeader(String::from_utf8_lossy(raw.as_bytes()).into_owned()))?;
    let last_index = raw
        .trim()
        .parse::<u64>()
        .map_err(|_| StoreError::InvalidIndexHeader(raw.to_string()))?;

    Ok(QueryMeta { last_index })
}
