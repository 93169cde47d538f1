//! Thin Bot API client: `sendMessage` and `getUpdates`.

use std::time::Duration;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument};

use relay_core::TransportError;

use crate::types::{GetUpdatesParams, SendMessageParams, TgMessage, TgResponse, Update};

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Added on top of the long-poll timeout so the server answers first.
const POLL_SLACK: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum ClientBuildError {
    #[error("invalid proxy url: {0}")]
    Proxy(String),
    #[error("failed to build HTTP client: {0}")]
    Http(String),
}

/// Connection options. The token is supplied separately.
#[derive(Clone, Debug)]
pub struct ClientOptions {
    pub api_base: String,
    /// `socks5://`, `socks5h://` or `http(s)://` proxy for every request.
    pub proxy: Option<String>,
    pub connect_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.into(),
            proxy: None,
            connect_timeout: CONNECT_TIMEOUT,
        }
    }
}

pub struct TelegramClient {
    http: Client,
    api_base: String,
    token: SecretString,
}

impl TelegramClient {
    pub fn new(token: SecretString, options: ClientOptions) -> Result<Self, ClientBuildError> {
        let mut builder = Client::builder().connect_timeout(options.connect_timeout);
        if let Some(proxy) = options.proxy.as_deref().filter(|p| !p.is_empty()) {
            let proxy =
                reqwest::Proxy::all(proxy).map_err(|e| ClientBuildError::Proxy(e.to_string()))?;
            builder = builder.proxy(proxy);
        }
        let http = builder
            .build()
            .map_err(|e| ClientBuildError::Http(e.to_string()))?;

        Ok(Self {
            http,
            api_base: options.api_base.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token.expose_secret(), method)
    }

    #[instrument(skip(self, text))]
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<TgMessage, TransportError> {
        let params = SendMessageParams { chat_id, text };
        self.call("sendMessage", &params, REQUEST_TIMEOUT).await
    }

    /// Long-poll for updates. `timeout_secs` of zero makes a short poll.
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, TransportError> {
        let params = GetUpdatesParams {
            offset,
            timeout: timeout_secs,
            allowed_updates: &["message"],
        };
        let timeout = Duration::from_secs(timeout_secs) + POLL_SLACK;
        self.call("getUpdates", &params, timeout).await
    }

    async fn call<T, P>(&self, method: &str, params: &P, timeout: Duration) -> Result<T, TransportError>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        let response = self
            .http
            .post(self.method_url(method))
            .timeout(timeout)
            .json(params)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(map_reqwest_error)?;
        debug!(method, status = status.as_u16(), bytes = body.len(), "bot api response");

        // Error answers carry a JSON envelope too, whatever the HTTP status.
        let envelope: TgResponse<T> = match serde_json::from_slice(&body) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(TransportError::from_status(
                    i64::from(status.as_u16()),
                    status.canonical_reason().unwrap_or("unexpected status"),
                ));
            }
            Err(e) => return Err(TransportError::InvalidResponse(e.to_string())),
        };

        if !envelope.ok {
            let retry_after = envelope.parameters.and_then(|p| p.retry_after);
            return Err(TransportError::from_status(
                envelope.error_code.unwrap_or(i64::from(status.as_u16())),
                envelope.description.unwrap_or_else(|| "request failed".into()),
            )
            .with_retry_after(retry_after));
        }
        envelope
            .result
            .ok_or_else(|| TransportError::InvalidResponse(format!("{method}: missing result")))
    }
}

/// The request URL embeds the bot token, so it never reaches the error text.
fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_decode() {
        TransportError::InvalidResponse(e.without_url().to_string())
    } else {
        TransportError::Network(e.without_url().to_string())
    }
}
