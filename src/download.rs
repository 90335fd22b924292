use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use log::{info, warn};
use reqwest::blocking::Client;
use tempfile::NamedTempFile;

use crate::error::{LoaderError, Result};

/// Known dataset names and where to fetch them from.
const DATASET_URLS: &[(&str, &str)] = &[
    ("MNIST", "http://yann.lecun.com/exdb/mnist/"),
    (
        "CIFAR-10",
        "https://www.cs.toronto.edu/~kriz/cifar-10-python.tar.gz",
    ),
    (
        "CIFAR-100",
        "https://www.cs.toronto.edu/~kriz/cifar-100-python.tar.gz",
    ),
];

const CHUNK_SIZE: usize = 8192;

/// Download URL for `dataset_name`, or `""` when the name is not known.
pub fn dataset_url(dataset_name: &str) -> &'static str {
    DATASET_URLS
        .iter()
        .find(|(name, _)| *name == dataset_name)
        .map(|(_, url)| *url)
        .unwrap_or("")
}

/// Streams remote files to disk.
pub struct Downloader {
    client: Client,
    retries: u32,
    backoff: Duration,
}

impl Downloader {
    /// `timeout = None` waits indefinitely.
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("batch-loader/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(LoaderError::HttpClient)?;
        Ok(Self {
            client,
            retries: 0,
            backoff: Duration::from_millis(500),
        })
    }

    /// Retry transport failures and 5xx responses up to `retries` extra times,
    /// doubling the wait after each attempt.
    pub fn with_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.retries = retries;
        self.backoff = backoff;
        self
    }

    /// Download `url` into `dest`, creating parent directories. Returns the
    /// number of bytes written. The body is streamed into a temporary file
    /// beside `dest` and renamed on success, so a failed transfer never
    /// leaves a truncated `dest` behind.
    pub fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        let started = Instant::now();
        let mut attempt = 0;
        let mut wait = self.backoff;
        let bytes = loop {
            match self.fetch(url, dest) {
                Ok(bytes) => break bytes,
                Err(e) if attempt < self.retries && is_transient(&e) => {
                    attempt += 1;
                    warn!(
                        "download of {url} failed ({e}), retry {attempt}/{} in {wait:?}",
                        self.retries
                    );
                    std::thread::sleep(wait);
                    wait *= 2;
                }
                Err(e) => return Err(e),
            }
        };
        info!(
            "downloaded {bytes} bytes from {url} to {} in {:.2}s",
            dest.display(),
            started.elapsed().as_secs_f64()
        );
        Ok(bytes)
    }

    fn fetch(&self, url: &str, dest: &Path) -> Result<u64> {
        let download_err = |source| LoaderError::Download {
            url: url.to_string(),
            source,
        };
        let io_err = |source| LoaderError::Io {
            path: dest.to_path_buf(),
            source,
        };

        let mut response = self.client.get(url).send().map_err(download_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(LoaderError::HttpStatus {
                url: url.to_string(),
                status,
            });
        }

        let parent = match dest.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent).map_err(io_err)?;
        let mut file = BufWriter::new(NamedTempFile::new_in(parent).map_err(io_err)?);

        let mut buffer = [0u8; CHUNK_SIZE];
        let mut written = 0u64;
        loop {
            let n = response
                .read(&mut buffer)
                .map_err(|source| LoaderError::DownloadBody {
                    url: url.to_string(),
                    source,
                })?;
            if n == 0 {
                break;
            }
            file.write_all(&buffer[..n]).map_err(io_err)?;
            written += n as u64;
        }

        let tmp = file.into_inner().map_err(|e| io_err(e.into_error()))?;
        tmp.persist(dest).map_err(|e| io_err(e.error))?;
        Ok(written)
    }
}

fn is_transient(err: &LoaderError) -> bool {
    match err {
        LoaderError::Download { .. } | LoaderError::DownloadBody { .. } => true,
        LoaderError::HttpStatus { status, .. } => status.is_server_error(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;
    use std::thread;

    /// Serve `responses` to successive connections on a loopback port.
    fn serve(responses: Vec<String>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            for response in responses {
                let (mut stream, _) = listener.accept().unwrap();
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut line = String::new();
                while reader.read_line(&mut line).unwrap() > 0 {
                    if line == "\r\n" {
                        break;
                    }
                    line.clear();
                }
                stream.write_all(response.as_bytes()).unwrap();
            }
        });
        format!("http://{addr}/data.bin")
    }

    fn ok(body: &str) -> String {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    fn status(code: u16, reason: &str) -> String {
        format!("HTTP/1.1 {code} {reason}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
    }

    #[test]
    fn url_table() {
        assert_eq!(dataset_url("MNIST"), "http://yann.lecun.com/exdb/mnist/");
        assert!(dataset_url("CIFAR-10").ends_with("cifar-10-python.tar.gz"));
        assert_eq!(dataset_url("reviews"), "");
    }

    #[test]
    fn download_streams_into_new_directories() {
        let url = serve(vec![ok("hello world")]);
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("nested/deeper/data.bin");

        let bytes = Downloader::new(Some(Duration::from_secs(5)))
            .unwrap()
            .download(&url, &dest)
            .unwrap();

        assert_eq!(bytes, 11);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "hello world");
    }

    #[test]
    fn truncated_body_leaves_no_file() {
        let url = serve(vec![
            "HTTP/1.1 200 OK\r\nContent-Length: 100000\r\nConnection: close\r\n\r\npartial"
                .to_string(),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("MNIST");

        let err = Downloader::new(Some(Duration::from_secs(5)))
            .unwrap()
            .download(&url, &dest)
            .unwrap_err();

        assert!(
            matches!(err, LoaderError::DownloadBody { .. }),
            "expected DownloadBody, got {err:?}"
        );
        assert!(!dest.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn client_errors_are_not_retried() {
        let url = serve(vec![status(404, "Not Found")]);
        let dir = tempfile::tempdir().unwrap();

        let err = Downloader::new(Some(Duration::from_secs(5)))
            .unwrap()
            .with_retries(3, Duration::from_millis(1))
            .download(&url, &dir.path().join("x"))
            .unwrap_err();

        match err {
            LoaderError::HttpStatus { status, .. } => assert_eq!(status.as_u16(), 404),
            other => panic!("expected HttpStatus, got {other:?}"),
        }
    }

    #[test]
    fn server_errors_are_retried() {
        let url = serve(vec![status(503, "Service Unavailable"), ok("late")]);
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("late.bin");

        let bytes = Downloader::new(Some(Duration::from_secs(5)))
            .unwrap()
            .with_retries(1, Duration::from_millis(1))
            .download(&url, &dest)
            .unwrap();

        assert_eq!(bytes, 4);
    }
}
