//! Server-sent events transport.

use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use tracing::instrument;
use url::Url;

use super::{ChannelError, PushStream, PushTransport};

/// Largest incomplete event kept in memory before the connection is dropped.
const MAX_EVENT_BYTES: usize = 1024 * 1024;

/// [`PushTransport`] reading an `text/event-stream` response.
///
/// Each event's `data:` lines are joined with newlines and yielded as one
/// message. Comments and events without data (keep-alives) are skipped.
#[derive(Clone)]
pub struct SseTransport {
    inner: Arc<SseTransportInner>,
}

struct SseTransportInner {
    client: reqwest::Client,
    token: Option<SecretString>,
}

impl SseTransport {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(token: Option<SecretString>) -> Result<Self, ChannelError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            inner: Arc::new(SseTransportInner { client, token }),
        })
    }
}

#[async_trait]
impl PushTransport for SseTransport {
    #[instrument(skip(self), fields(url = %url))]
    async fn connect(&self, url: &Url) -> Result<PushStream, ChannelError> {
        let mut request = self.inner.client.get(url.clone());
        if let Some(token) = &self.inner.token {
            request = request.bearer_auth(token.expose_secret());
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChannelError::Status(status.as_u16()));
        }

        let messages = stream! {
            let mut buffer: Vec<u8> = Vec::new();
            let mut bytes = std::pin::pin!(response.bytes_stream());

            while let Some(chunk) = bytes.next().await {
                match chunk {
                    Ok(chunk) => match push_chunk(&mut buffer, &chunk) {
                        Ok(messages) => {
                            for data in messages {
                                yield Ok(data);
                            }
                        }
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    },
                    Err(e) => {
                        yield Err(ChannelError::Http(e));
                        return;
                    }
                }
            }
        };
        Ok(messages.boxed())
    }
}

/// Append a chunk and drain every complete event's data.
///
/// Fails once the unterminated remainder exceeds [`MAX_EVENT_BYTES`].
fn push_chunk(buffer: &mut Vec<u8>, chunk: &[u8]) -> Result<Vec<String>, ChannelError> {
    buffer.extend_from_slice(chunk);
    let mut messages = Vec::new();
    while let Some(event) = extract_sse_event(buffer) {
        messages.extend(parse_sse_data(&event));
    }
    if buffer.len() > MAX_EVENT_BYTES {
        buffer.clear();
        return Err(ChannelError::EventTooLarge(MAX_EVENT_BYTES));
    }
    Ok(messages)
}

/// Take one complete event off the front of the buffer.
///
/// Events end with a blank line. Bytes are only decoded once an event is
/// complete, so multi-byte characters split across chunks survive.
fn extract_sse_event(buffer: &mut Vec<u8>) -> Option<String> {
    let (end, separator) = find_event_end(buffer)?;
    let event = String::from_utf8_lossy(buffer.get(..end)?).into_owned();
    buffer.drain(..end + separator);
    Some(event)
}

fn find_event_end(buffer: &[u8]) -> Option<(usize, usize)> {
    (0..buffer.len()).find_map(|i| {
        let rest = buffer.get(i..)?;
        if rest.starts_with(b"\r\n\r\n") {
            Some((i, 4))
        } else if rest.starts_with(b"\n\n") {
            Some((i, 2))
        } else {
            None
        }
    })
}

/// Join the `data:` lines of an event, `None` if it has none.
fn parse_sse_data(event: &str) -> Option<String> {
    let data: Vec<&str> = event
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.strip_prefix(' ').unwrap_or(data))
        .collect();
    if data.is_empty() {
        None
    } else {
        Some(data.join("\n"))
    }
}
