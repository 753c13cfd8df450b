//! Moving requests and frames over the network.
//!
//! A [`Transport`] opens one streaming request and hands back a
//! [`FrameStream`] of complete JSON frames. Decoding stays with the
//! adapters, so tests can script frames without a server.

use crate::adapter::WireRequest;
use crate::framing::FrameSplitter;
use async_trait::async_trait;
use convoy_core::error::ProviderError;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const FRAME_CHANNEL_CAPACITY: usize = 64;

/// Frames of one in-flight response.
///
/// Dropping the stream aborts the task reading the response body, which
/// closes the connection.
pub struct FrameStream {
    rx: mpsc::Receiver<Result<String, ProviderError>>,
    reader: Option<JoinHandle<()>>,
}

impl FrameStream {
    pub fn new(
        rx: mpsc::Receiver<Result<String, ProviderError>>,
        reader: Option<JoinHandle<()>>,
    ) -> Self {
        Self { rx, reader }
    }

    /// A stream fed by the returned sender; it ends when the sender drops.
    pub fn channel() -> (mpsc::Sender<Result<String, ProviderError>>, Self) {
        let (tx, rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        (tx, Self::new(rx, None))
    }

    /// A finished stream holding exactly `frames`.
    pub fn from_frames<I>(frames: I) -> Self
    where
        I: IntoIterator<Item = Result<String, ProviderError>>,
    {
        let frames: Vec<_> = frames.into_iter().collect();
        let (tx, rx) = mpsc::channel(frames.len().max(1));
        for frame in frames {
            // Capacity covers every frame, so this never fails.
            let _ = tx.try_send(frame);
        }
        Self::new(rx, None)
    }

    /// The next frame, or `None` once the body is exhausted.
    pub async fn next(&mut self) -> Option<Result<String, ProviderError>> {
        self.rx.recv().await
    }
}

impl Drop for FrameStream {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Opens streaming requests.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, request: &WireRequest) -> Result<FrameStream, ProviderError>;
}

/// reqwest-backed transport.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, ProviderError> {
        // No overall timeout: streams are bounded by the agent loop's deadlines.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, request: &WireRequest) -> Result<FrameStream, ProviderError> {
        debug!(url = %request.url, "Sending streaming request");

        let mut builder = self.client.post(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.json(&request.body).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(e.to_string())
            } else {
                ProviderError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %error_body, "Provider streaming error");
            return Err(ProviderError::from_status(status.as_u16(), error_body));
        }

        let (tx, rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let mut splitter = FrameSplitter::new(request.framing);

        // Spawn task to read the byte stream and split it into frames
        let reader = tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut pending: Vec<u8> = Vec::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                pending.extend_from_slice(&bytes);
                let text = take_utf8(&mut pending);
                for frame in splitter.push(&text) {
                    if tx.send(Ok(frame)).await.is_err() {
                        return; // receiver dropped
                    }
                }
                if splitter.is_done() {
                    return;
                }
            }

            if !pending.is_empty() {
                let rest = String::from_utf8_lossy(&pending).into_owned();
                for frame in splitter.push(&rest) {
                    let _ = tx.send(Ok(frame)).await;
                }
            }
            if let Some(frame) = splitter.finish() {
                let _ = tx.send(Ok(frame)).await;
            }
        });

        Ok(FrameStream::new(rx, Some(reader)))
    }
}

/// Take the longest valid UTF-8 prefix, leaving a split code point behind.
fn take_utf8(pending: &mut Vec<u8>) -> String {
    match std::str::from_utf8(pending) {
        Ok(text) => {
            let text = text.to_string();
            pending.clear();
            text
        }
        Err(e) if e.error_len().is_none() => {
            let tail = pending.split_off(e.valid_up_to());
            let text = String::from_utf8_lossy(pending).into_owned();
            *pending = tail;
            text
        }
        Err(_) => {
            let text = String::from_utf8_lossy(pending).into_owned();
            pending.clear();
            text
        }
    }
}

/// Retries transient failures to open a stream with a fixed backoff.
///
/// Authentication failures, context overflow and other permanent errors are
/// returned on the first attempt.
pub struct RetryTransport {
    inner: Arc<dyn Transport>,
    max_retries: u32,
    backoff: Duration,
}

impl RetryTransport {
    /// Wrap `inner` with 3 retries one second apart.
    pub fn new(inner: Arc<dyn Transport>) -> Self {
        Self {
            inner,
            max_retries: 3,
            backoff: Duration::from_secs(1),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }
}

#[async_trait]
impl Transport for RetryTransport {
    async fn open(&self, request: &WireRequest) -> Result<FrameStream, ProviderError> {
        let mut attempt = 0;
        loop {
            match self.inner.open(request).await {
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        attempt,
                        max_retries = self.max_retries,
                        error = %e,
                        "Transient provider error, retrying"
                    );
                    tokio::time::sleep(self.backoff).await;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::Framing;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails with the scripted errors, then succeeds.
    struct FlakyTransport {
        failures: Mutex<Vec<ProviderError>>,
        calls: AtomicU32,
    }

    impl FlakyTransport {
        fn new(failures: Vec<ProviderError>) -> Self {
            Self {
                failures: Mutex::new(failures),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        async fn open(&self, _request: &WireRequest) -> Result<FrameStream, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = {
                let mut failures = self.failures.lock().unwrap();
                if failures.is_empty() {
                    None
                } else {
                    Some(failures.remove(0))
                }
            };
            match next {
                Some(e) => Err(e),
                None => Ok(FrameStream::from_frames(vec![Ok("{}".to_string())])),
            }
        }
    }

    fn request() -> WireRequest {
        WireRequest {
            url: "http://localhost/test".into(),
            headers: Vec::new(),
            body: serde_json::json!({}),
            framing: Framing::Sse,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried() {
        let inner = Arc::new(FlakyTransport::new(vec![
            ProviderError::from_status(503, "overloaded"),
            ProviderError::Network("connection reset".into()),
        ]));
        let transport = RetryTransport::new(inner.clone());
        let mut stream = transport.open(&request()).await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), "{}");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_are_bounded() {
        let inner = Arc::new(FlakyTransport::new(vec![
            ProviderError::from_status(500, "a"),
            ProviderError::from_status(500, "b"),
            ProviderError::from_status(500, "c"),
            ProviderError::from_status(500, "d"),
        ]));
        let transport = RetryTransport::new(inner.clone()).with_backoff(Duration::from_millis(10));
        assert!(transport.open(&request()).await.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn auth_errors_are_not_retried() {
        let inner = Arc::new(FlakyTransport::new(vec![ProviderError::from_status(401, "bad key")]));
        let transport = RetryTransport::new(inner.clone());
        let err = transport.open(&request()).await.err().unwrap();
        assert!(matches!(err, ProviderError::AuthenticationFailed(_)));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn channel_stream_ends_when_sender_drops() {
        let (tx, mut stream) = FrameStream::channel();
        tx.send(Ok("a".into())).await.unwrap();
        drop(tx);
        assert_eq!(stream.next().await.unwrap().unwrap(), "a");
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn split_code_points_wait_for_the_next_chunk() {
        let bytes = "é".as_bytes();
        let mut pending = vec![b'a', bytes[0]];
        assert_eq!(take_utf8(&mut pending), "a");
        pending.push(bytes[1]);
        assert_eq!(take_utf8(&mut pending), "é");
        assert!(pending.is_empty());
    }
}
