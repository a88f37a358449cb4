//! Remote URI upload source

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use locker_core::{ByteStream, StorageError, Upload};
use reqwest::{Client, Response};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::FetchError;

/// Upper bound on a whole fetch, body included
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Content fetched over HTTP(S) when read
///
/// Nothing is fetched at construction; every `contents`/`stream` call
/// issues a fresh GET.
#[derive(Debug, Clone)]
pub struct UriUpload {
    url: Url,
    client: Client,
    timeout: Duration,
}

impl UriUpload {
    pub fn new(url: &str) -> Result<Self, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl {
                url: url.to_string(),
                reason: format!("unsupported scheme {}", parsed.scheme()),
            });
        }

        Ok(Self {
            url: parsed,
            client: Client::new(),
            timeout: DEFAULT_FETCH_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Share a client (and its connection pool) across uploads
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn fetch(&self) -> Result<Response, FetchError> {
        debug!("Fetching {}", self.url);

        let response = self
            .client
            .get(self.url.clone())
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: self.url.to_string(),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl Upload for UriUpload {
    async fn contents(&self) -> Result<Bytes, StorageError> {
        let response = self.fetch().await?;
        Ok(response.bytes().await.map_err(FetchError::from)?)
    }

    /// Last non-empty path segment, else the host
    fn name(&self) -> String {
        self.url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
            .or_else(|| self.url.host_str())
            .map(str::to_string)
            .unwrap_or_else(|| self.url.to_string())
    }

    fn path(&self) -> Option<PathBuf> {
        None
    }

    async fn stream(&self) -> Result<ByteStream, StorageError> {
        let response = self.fetch().await?;
        let stream = response
            .bytes_stream()
            .map_err(|e| StorageError::from(FetchError::from(e)));
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP/1.1 response per connection
    async fn serve(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        format!("http://{}", addr)
    }

    /// Accept connections and never answer
    async fn stall() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        format!("http://{}", addr)
    }

    #[test]
    fn test_name() {
        let upload = UriUpload::new("https://example.com/files/report.pdf").unwrap();
        assert_eq!(upload.name(), "report.pdf");

        let upload = UriUpload::new("https://example.com/files/").unwrap();
        assert_eq!(upload.name(), "files");

        let upload = UriUpload::new("https://example.com/").unwrap();
        assert_eq!(upload.name(), "example.com");
        assert!(upload.path().is_none());
    }

    #[test]
    fn test_invalid_url() {
        assert!(matches!(
            UriUpload::new("not a url"),
            Err(FetchError::InvalidUrl { .. })
        ));
        assert!(matches!(
            UriUpload::new("ftp://example.com/file"),
            Err(FetchError::InvalidUrl { .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_contents_and_stream() {
        let base = serve("200 OK", "remote body").await;
        let upload = UriUpload::new(&format!("{}/remote.txt", base)).unwrap();

        assert_eq!(upload.contents().await.unwrap(), Bytes::from("remote body"));

        let mut stream = upload.stream().await.unwrap();
        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(collected, b"remote body");
    }

    #[tokio::test]
    async fn test_fetch_times_out() {
        let base = stall().await;
        let upload = UriUpload::new(&format!("{}/slow.bin", base))
            .unwrap()
            .with_timeout(Duration::from_millis(100));

        let result = tokio::time::timeout(Duration::from_secs(5), upload.contents())
            .await
            .expect("fetch should give up on its own");
        assert!(matches!(result, Err(StorageError::Upload(_))));

        let result = tokio::time::timeout(Duration::from_secs(5), upload.stream())
            .await
            .expect("fetch should give up on its own");
        assert!(matches!(result.err(), Some(StorageError::Upload(_))));
    }

    #[test]
    fn test_default_timeout() {
        let upload = UriUpload::new("https://example.com/a").unwrap();
        assert_eq!(upload.timeout, DEFAULT_FETCH_TIMEOUT);
        assert_eq!(DEFAULT_FETCH_TIMEOUT, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_error_status() {
        let base = serve("404 Not Found", "missing").await;
        let upload = UriUpload::new(&format!("{}/gone.txt", base)).unwrap();

        let err = upload.contents().await.unwrap_err();
        match err {
            StorageError::Upload(message) => assert!(message.contains("404")),
            other => panic!("expected upload error, got {:?}", other),
        }
    }
}
