//! HTTP backend for the guide server
//!
//! Every request carries the API key in the `X-API-Key` header. The server
//! answers 401 when the key is missing and 403 when it is wrong; both map to
//! [`TravaiError::Unauthorized`].

use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::backend::{Backend, ByteStream, HistoryResponse, TurnRequest};
use crate::config::ServerConfig;
use crate::conversation::{Message, ThreadSummary};
use crate::error::{Result, TravaiError};

/// Header carrying the API key
pub const API_KEY_HEADER: &str = "X-API-Key";

#[derive(Debug, Serialize)]
struct TitleUpdate<'a> {
    title: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    detail: String,
}

/// [`Backend`] speaking to the guide server over HTTP
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use travai::backend::HttpBackend;
///
/// let backend = HttpBackend::new(
///     url::Url::parse("http://localhost:2024").unwrap(),
///     Some("secret".to_string()),
///     Duration::from_secs(30),
/// )
/// .unwrap();
/// assert_eq!(backend.base_url().as_str(), "http://localhost:2024/");
/// ```
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    api_key: Arc<RwLock<Option<String>>>,
    request_timeout: Duration,
}

impl HttpBackend {
    /// Creates a backend for the server at `base_url`
    ///
    /// `request_timeout` applies to CRUD calls only. Streaming turns are
    /// bounded by the transport alone.
    pub fn new(base_url: Url, api_key: Option<String>, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("travai/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url,
            api_key: Arc::new(RwLock::new(api_key)),
            request_timeout,
        })
    }

    /// Creates a backend from the server section of the config
    pub fn from_config(config: &ServerConfig, api_key: Option<String>) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| TravaiError::Config(format!("Invalid server.base_url: {}", e)))?;
        Self::new(
            base_url,
            api_key,
            Duration::from_secs(config.request_timeout_seconds),
        )
    }

    /// Server root URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let joined = format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path);
        Url::parse(&joined)
            .map_err(|e| TravaiError::Config(format!("Invalid endpoint {}: {}", joined, e)).into())
    }

    fn with_key(&self, builder: RequestBuilder) -> RequestBuilder {
        let key = match self.api_key.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        match key {
            Some(key) => builder.header(API_KEY_HEADER, key),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let response = self
            .with_key(builder)
            .send()
            .await
            .map_err(|e| TravaiError::Transport(e.to_string()))?;
        check_status(response).await
    }
}

/// Maps non-success statuses onto [`TravaiError`]
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorDetail>(&body)
        .map(|d| d.detail)
        .unwrap_or_else(|_| {
            status
                .canonical_reason()
                .map(str::to_string)
                .unwrap_or(body)
        });

    tracing::debug!("Backend returned {}: {}", status, message);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(TravaiError::Unauthorized(message).into())
        }
        StatusCode::NOT_FOUND => Err(TravaiError::NotFound(message).into()),
        _ => Err(TravaiError::Http {
            status: status.as_u16(),
            message,
        }
        .into()),
    }
}

#[async_trait::async_trait]
impl Backend for HttpBackend {
    async fn open_stream(&self, request: &TurnRequest) -> Result<ByteStream> {
        let url = self.endpoint("/stream")?;
        tracing::debug!("Opening stream for thread {}", request.thread_id);

        let response = self.send(self.client.post(url).json(request)).await?;
        let stream = response
            .bytes_stream()
            .map(|chunk| {
                chunk.map_err(|e| anyhow::Error::from(TravaiError::Transport(e.to_string())))
            });
        Ok(Box::pin(stream))
    }

    async fn list_threads(&self) -> Result<Vec<ThreadSummary>> {
        let url = self.endpoint("/threads")?;
        let response = self
            .send(self.client.get(url).timeout(self.request_timeout))
            .await?;
        Ok(response.json().await?)
    }

    async fn history(&self, thread_id: &str) -> Result<Vec<Message>> {
        let url = self.endpoint(&format!("/history/{}", thread_id))?;
        let response = self
            .send(self.client.get(url).timeout(self.request_timeout))
            .await?;
        let history: HistoryResponse = response.json().await?;
        Ok(history.messages)
    }

    async fn rename_thread(&self, thread_id: &str, title: &str) -> Result<()> {
        let url = self.endpoint(&format!("/threads/{}", thread_id))?;
        self.send(
            self.client
                .patch(url)
                .timeout(self.request_timeout)
                .json(&TitleUpdate { title }),
        )
        .await?;
        Ok(())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let url = self.endpoint(&format!("/thread/{}", thread_id))?;
        self.send(self.client.delete(url).timeout(self.request_timeout))
            .await?;
        Ok(())
    }

    fn set_api_key(&self, api_key: Option<String>) {
        match self.api_key.write() {
            Ok(mut guard) => *guard = api_key,
            Err(poisoned) => *poisoned.into_inner() = api_key,
        }
    }
}
