// src/pac/downloader.rs
use crate::error::FetchError;
use reqwest::blocking::Client;
use std::time::Duration;
use tracing::{debug, error, info};
use url::Url;

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Source of PAC document text.
pub trait ContentLoader: Send + Sync {
    fn load(&self, url: &Url) -> Result<String, FetchError>;
}

/// Loads PAC documents over `http`, `https` or from `file` URLs.
///
/// The HTTP client never goes through a proxy: asking for a proxy while
/// fetching the document that defines proxies would loop.
#[derive(Debug, Clone)]
pub struct HttpContentLoader {
    client: Client,
}

impl HttpContentLoader {
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(DEFAULT_FETCH_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().no_proxy().timeout(timeout).build()?;
        Ok(Self { client })
    }

    fn download(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        info!("Downloading PAC script from: {}", url);

        let response = self.client.get(url.clone()).send()?;

        if !response.status().is_success() {
            error!("PAC download failed: HTTP {}", response.status());
            return Err(FetchError::Status {
                status: response.status().as_u16(),
            });
        }

        Ok(response.bytes()?.to_vec())
    }

    fn read_file(url: &Url) -> Result<Vec<u8>, FetchError> {
        let path = url
            .to_file_path()
            .map_err(|()| FetchError::UnsupportedScheme(url.to_string()))?;
        debug!("Reading PAC script from {}", path.display());
        Ok(std::fs::read(path)?)
    }
}

impl ContentLoader for HttpContentLoader {
    fn load(&self, url: &Url) -> Result<String, FetchError> {
        let bytes = match url.scheme() {
            "http" | "https" => self.download(url)?,
            "file" => Self::read_file(url)?,
            other => return Err(FetchError::UnsupportedScheme(other.to_string())),
        };

        // PAC files are ASCII, newer ones UTF-8.
        let text = String::from_utf8(bytes)?;
        info!("PAC script downloaded successfully ({} bytes)", text.len());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_file_url_is_read() {
        let path = std::env::temp_dir().join(format!("pacresolver-{}.pac", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"function FindProxyForURL(u, h) { return \"DIRECT\"; }")
            .unwrap();
        drop(file);

        let loader = HttpContentLoader::new().unwrap();
        let text = loader.load(&Url::from_file_path(&path).unwrap()).unwrap();
        assert!(text.contains("FindProxyForURL"));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let loader = HttpContentLoader::new().unwrap();
        let url = Url::parse("file:///nonexistent/pacresolver/proxy.pac").unwrap();
        assert!(matches!(loader.load(&url), Err(FetchError::Io(_))));
    }

    #[test]
    fn test_invalid_utf8_is_decode_error() {
        let path =
            std::env::temp_dir().join(format!("pacresolver-bad-{}.pac", std::process::id()));
        std::fs::write(&path, [0x66, 0x6f, 0xff, 0xfe]).unwrap();

        let loader = HttpContentLoader::new().unwrap();
        let result = loader.load(&Url::from_file_path(&path).unwrap());
        assert!(matches!(result, Err(FetchError::Decode(_))));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_unsupported_scheme() {
        let loader = HttpContentLoader::new().unwrap();
        let url = Url::parse("ftp://example.com/proxy.pac").unwrap();
        match loader.load(&url) {
            Err(FetchError::UnsupportedScheme(scheme)) => assert_eq!(scheme, "ftp"),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
