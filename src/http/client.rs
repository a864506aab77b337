//! HTTP client that follows redirects itself (bounded) and retries transient
//! failures.

use anyhow::Result;
use log::{debug, warn};
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use reqwest::{Client, ClientBuilder, Url};
use std::io::Write;
use std::time::Duration;

use super::retry::{MAX_REDIRECTS, MAX_RETRIES, RETRY_DELAY_MS, is_retryable};
use crate::error::InstallError;

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("cmsi/", env!("CMSI_VERSION"));

/// A reqwest builder configured the way [`HttpClient`] expects: our user
/// agent, and automatic redirects disabled so they can be counted here.
pub fn client_builder() -> ClientBuilder {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(Policy::none())
}

/// HTTP client with bounded redirect following and retry logic.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    max_retries: usize,
    retry_delay: Duration,
    max_redirects: usize,
}

enum Hop {
    Done(u64),
    Redirect(String),
}

impl HttpClient {
    /// Wraps a reqwest client. The client should come from [`client_builder`];
    /// one that follows redirects on its own bypasses the redirect limit.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            max_retries: MAX_RETRIES,
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
            max_redirects: MAX_REDIRECTS,
        }
    }

    pub fn with_retry_policy(mut self, max_retries: usize, retry_delay: Duration) -> Self {
        self.max_retries = max_retries.max(1);
        self.retry_delay = retry_delay;
        self
    }

    /// Downloads `url` into the writer produced by `create_writer`, following
    /// redirects. The writer is created only once a 2xx response arrives, and
    /// again for every retry. Returns the number of bytes written.
    #[tracing::instrument(skip(self, create_writer))]
    pub async fn download_file<W, F>(&self, url: &str, create_writer: F) -> Result<u64>
    where
        W: Write,
        F: Fn() -> Result<W>,
    {
        let mut attempt = 1;
        loop {
            match self.download_following_redirects(url, &create_writer).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if attempt < self.max_retries && is_retryable(&e) => {
                    warn!(
                        "Download attempt {}/{} failed ({}), retrying in {}ms...",
                        attempt,
                        self.max_retries,
                        e,
                        self.retry_delay.as_millis()
                    );
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn download_following_redirects<W, F>(&self, url: &str, create_writer: &F) -> Result<u64>
    where
        W: Write,
        F: Fn() -> Result<W>,
    {
        let mut current = url.to_string();
        for _ in 0..=self.max_redirects {
            match self.download_once(&current, create_writer).await? {
                Hop::Done(bytes) => return Ok(bytes),
                Hop::Redirect(next) => {
                    debug!("Redirected from {} to {}", current, next);
                    current = next;
                }
            }
        }
        Err(InstallError::TooManyRedirects {
            url: url.to_string(),
            limit: self.max_redirects,
        }
        .into())
    }

    /// One request, no retry and no redirect following.
    async fn download_once<W, F>(&self, url: &str, create_writer: &F) -> Result<Hop>
    where
        W: Write,
        F: Fn() -> Result<W>,
    {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(url, &e))?;

        let status = response.status();
        if status.is_redirection() {
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| InstallError::Transport {
                    url: url.to_string(),
                    status: Some(status.as_u16()),
                    message: "redirect without a Location header".to_string(),
                })?;
            return Ok(Hop::Redirect(resolve_location(url, location)?));
        }
        if status.is_client_error() || status.is_server_error() {
            return Err(InstallError::Transport {
                url: url.to_string(),
                status: Some(status.as_u16()),
                message: status.canonical_reason().unwrap_or("Error").to_string(),
            }
            .into());
        }

        let mut writer = create_writer()?;
        let mut downloaded_bytes: u64 = 0;

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| transport_error(url, &e))?
        {
            writer.write_all(&chunk)?;
            downloaded_bytes += chunk.len() as u64;
        }
        writer.flush()?;

        debug!(
            "Downloaded {:.2} MB from {}",
            downloaded_bytes as f64 / (1024.0 * 1024.0),
            url
        );

        Ok(Hop::Done(downloaded_bytes))
    }
}

/// Resolves a `Location` header against the URL that produced it.
fn resolve_location(base: &str, location: &str) -> Result<String> {
    let base = Url::parse(base).map_err(|e| InstallError::Transport {
        url: base.to_string(),
        status: None,
        message: format!("invalid URL: {}", e),
    })?;
    let next = base.join(location).map_err(|e| InstallError::Transport {
        url: base.to_string(),
        status: None,
        message: format!("invalid redirect target {:?}: {}", location, e),
    })?;
    Ok(next.to_string())
}

fn transport_error(url: &str, error: &reqwest::Error) -> anyhow::Error {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    InstallError::Transport {
        url: url.to_string(),
        status: error.status().map(|s| s.as_u16()),
        message,
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn test_client() -> HttpClient {
        HttpClient::new(client_builder().build().unwrap())
            .with_retry_policy(MAX_RETRIES, Duration::from_millis(10))
    }

    /// Writer that appends into a shared buffer so tests can inspect it.
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_download_file_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/file.zip")
            .match_header("user-agent", USER_AGENT)
            .with_status(200)
            .with_body("test content")
            .create_async()
            .await;

        let bytes = test_client()
            .download_file(&format!("{}/file.zip", server.url()), || {
                Ok(std::io::sink())
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(bytes, 12);
    }

    #[tokio::test]
    async fn test_download_follows_redirect() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let redirect = server
            .mock("GET", "/old.zip")
            .with_status(301)
            .with_header("location", &format!("{}/real.zip", url))
            .create_async()
            .await;
        let real = server
            .mock("GET", "/real.zip")
            .with_status(200)
            .with_body("real archive")
            .create_async()
            .await;

        let buf = SharedBuf::default();
        let sink = buf.clone();
        test_client()
            .download_file(&format!("{}/old.zip", url), || Ok(sink.clone()))
            .await
            .unwrap();

        redirect.assert_async().await;
        real.assert_async().await;
        assert_eq!(buf.0.lock().unwrap().as_slice(), b"real archive");
    }

    #[tokio::test]
    async fn test_download_follows_relative_redirect() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        server
            .mock("GET", "/a/start")
            .with_status(302)
            .with_header("location", "../files/pkg.zip")
            .create_async()
            .await;
        let target = server
            .mock("GET", "/files/pkg.zip")
            .with_status(200)
            .with_body("pkg")
            .create_async()
            .await;

        let bytes = test_client()
            .download_file(&format!("{}/a/start", url), || Ok(std::io::sink()))
            .await
            .unwrap();

        target.assert_async().await;
        assert_eq!(bytes, 3);
    }

    #[tokio::test]
    async fn test_redirect_loop_is_bounded() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let looping = server
            .mock("GET", "/loop")
            .with_status(302)
            .with_header("location", "/loop")
            .expect(MAX_REDIRECTS + 1)
            .create_async()
            .await;

        let err = test_client()
            .download_file(&format!("{}/loop", url), || Ok(std::io::sink()))
            .await
            .unwrap_err();

        looping.assert_async().await;
        assert!(matches!(
            err.downcast_ref::<InstallError>(),
            Some(InstallError::TooManyRedirects { limit: MAX_REDIRECTS, .. })
        ));
    }

    #[tokio::test]
    async fn test_download_not_found_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/missing.zip")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let err = test_client()
            .download_file(&format!("{}/missing.zip", server.url()), || {
                Ok(std::io::sink())
            })
            .await
            .unwrap_err();

        mock.assert_async().await;
        match err.downcast_ref::<InstallError>() {
            Some(InstallError::Transport {
                status, message, ..
            }) => {
                assert_eq!(*status, Some(404));
                assert_eq!(message, "Not Found");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/flaky.zip")
            .with_status(503)
            .expect(MAX_RETRIES)
            .create_async()
            .await;

        let result = test_client()
            .download_file(&format!("{}/flaky.zip", server.url()), || {
                Ok(std::io::sink())
            })
            .await;

        mock.assert_async().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_writer_not_created_on_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/gone.zip")
            .with_status(410)
            .create_async()
            .await;

        let result = test_client()
            .download_file(&format!("{}/gone.zip", server.url()), || -> Result<std::io::Sink> {
                panic!("writer must not be created for an error response")
            })
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        // Bind and drop a listener to get a port nobody is listening on
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let err = HttpClient::new(client_builder().build().unwrap())
            .with_retry_policy(1, Duration::from_millis(0))
            .download_file(&format!("http://127.0.0.1:{}/x.zip", port), || {
                Ok(std::io::sink())
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<InstallError>(),
            Some(InstallError::Transport { .. })
        ));
    }

    #[test]
    fn test_resolve_location() {
        assert_eq!(
            resolve_location("https://a.test/x/y.zip", "https://b.test/z.zip").unwrap(),
            "https://b.test/z.zip"
        );
        assert_eq!(
            resolve_location("https://a.test/x/y.zip", "/z.zip").unwrap(),
            "https://a.test/z.zip"
        );
    }
}
