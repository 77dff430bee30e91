//! Attachment acquisition
//!
//! The pipeline only knows [`AttachmentFetcher`]. Two transports are provided:
//!
//! - [`SpoolFetcher`]: reads `<inbox>/<message_id>/<filename>` from disk
//! - [`HttpFetcher`]: `GET <base>/messages/<message_id>/attachments/<filename>`

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::models::MessageId;

/// Default HTTP fetch timeout in seconds
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 120;

#[async_trait]
pub trait AttachmentFetcher: Send + Sync {
    /// Raw bytes of one attachment
    async fn fetch(&self, message_id: &MessageId, filename: &str) -> Result<Vec<u8>, FetchError>;
}

/// Reject names that could escape the directory they are joined onto
fn plain_component<'a>(kind: &str, value: &'a str) -> Result<&'a str, FetchError> {
    let bad = value.is_empty()
        || value == "."
        || value == ".."
        || value.contains('/')
        || value.contains('\\');
    if bad {
        Err(FetchError::InvalidTarget(format!("{kind} '{value}'")))
    } else {
        Ok(value)
    }
}

/// Attachments dropped on disk, one directory per message
#[derive(Debug, Clone)]
pub struct SpoolFetcher {
    inbox: PathBuf,
    consume: bool,
}

impl SpoolFetcher {
    pub fn new(inbox: impl Into<PathBuf>) -> Self {
        Self {
            inbox: inbox.into(),
            consume: false,
        }
    }

    /// Remove each inbox file once its bytes are read. The pipeline keeps its
    /// own staged copy, so the inbox only holds attachments not yet fetched.
    pub fn consuming(mut self) -> Self {
        self.consume = true;
        self
    }

    pub fn inbox(&self) -> &Path {
        &self.inbox
    }

    pub fn path_for(
        &self,
        message_id: &MessageId,
        filename: &str,
    ) -> Result<PathBuf, FetchError> {
        let dir = plain_component("message id", message_id.as_str())?;
        let name = plain_component("filename", filename)?;
        Ok(self.inbox.join(dir).join(name))
    }
}

#[async_trait]
impl AttachmentFetcher for SpoolFetcher {
    async fn fetch(&self, message_id: &MessageId, filename: &str) -> Result<Vec<u8>, FetchError> {
        let path = self.path_for(message_id, filename)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                debug!(path = %path.display(), bytes = bytes.len(), "Read spooled attachment");
                if self.consume {
                    if let Err(e) = tokio::fs::remove_file(&path).await {
                        warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to remove spooled attachment"
                        );
                    } else if let Some(dir) = path.parent() {
                        // only succeeds once the message directory is empty
                        let _ = tokio::fs::remove_dir(dir).await;
                    }
                }
                Ok(bytes)
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(FetchError::NotFound(path.display().to_string()))
            },
            Err(e) => Err(FetchError::Io(e)),
        }
    }
}

/// Attachment download from a message store API
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpFetcher {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| FetchError::InvalidTarget(format!("base url '{base_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(FetchError::InvalidTarget(format!("base url '{base_url}'")));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    pub fn attachment_url(
        &self,
        message_id: &MessageId,
        filename: &str,
    ) -> Result<Url, FetchError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::InvalidTarget(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["messages", message_id.as_str(), "attachments", filename]);
        Ok(url)
    }
}

#[async_trait]
impl AttachmentFetcher for HttpFetcher {
    async fn fetch(&self, message_id: &MessageId, filename: &str) -> Result<Vec<u8>, FetchError> {
        let url = self.attachment_url(message_id, filename)?;

        let mut request = self.client.get(url.clone());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        match status {
            s if s.is_success() => {},
            StatusCode::NOT_FOUND => return Err(FetchError::NotFound(url.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(FetchError::Auth {
                    status: status.as_u16(),
                    url: url.to_string(),
                })
            },
            _ => {
                return Err(FetchError::Status {
                    status: status.as_u16(),
                    url: url.to_string(),
                })
            },
        }

        let bytes = response.bytes().await?.to_vec();
        debug!(url = %url, bytes = bytes.len(), "Downloaded attachment");
        Ok(bytes)
    }
}
