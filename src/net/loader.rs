use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Synchronous loader for locators that need no network round trip.
#[derive(Debug, Default)]
pub struct Loader;

impl Loader {
    pub fn new() -> Self {
        Self
    }

    /// Whether `url` can be fetched without the network.
    pub fn is_local(url: &Url) -> bool {
        matches!(url.scheme(), "file" | "data")
    }

    pub fn fetch(&self, url: &Url) -> Result<String, LoadError> {
        let bytes = self.fetch_bytes(url)?;
        Ok(String::from_utf8(bytes)
            .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned()))
    }

    pub fn fetch_bytes(&self, url: &Url) -> Result<Vec<u8>, LoadError> {
        match url.scheme() {
            "file" => {
                let path = url.to_file_path().map_err(|_| {
                    LoadError::InvalidUrl("Cannot convert to file path".to_string())
                })?;
                Ok(std::fs::read(path)?)
            }
            "data" => fetch_data(url),
            scheme => Err(LoadError::UnsupportedScheme(scheme.to_string())),
        }
    }
}

// Format: data:[<mediatype>][;base64],<data>
fn fetch_data(url: &Url) -> Result<Vec<u8>, LoadError> {
    let data = url.path();
    let (header, content) = data
        .split_once(',')
        .ok_or_else(|| LoadError::InvalidUrl("Invalid data URL format".to_string()))?;

    if header.ends_with(";base64") {
        STANDARD
            .decode(content)
            .map_err(|e| LoadError::InvalidUrl(format!("Invalid base64: {}", e)))
    } else {
        Ok(urlencoding::decode_binary(content.as_bytes()).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_plain_data_url() {
        let url = Url::parse("data:text/html,Hello%20World").unwrap();
        assert_eq!(Loader::new().fetch(&url).unwrap(), "Hello World");
    }

    #[test]
    fn test_fetch_base64_data_url() {
        let url = Url::parse("data:text/plain;base64,SGVsbG8=").unwrap();
        assert_eq!(Loader::new().fetch(&url).unwrap(), "Hello");
    }

    #[test]
    fn test_fetch_file_url() {
        let path = std::env::temp_dir().join("konq_view_loader_test.html");
        std::fs::write(&path, "<p>file</p>").unwrap();
        let url = Url::from_file_path(&path).unwrap();

        assert!(Loader::is_local(&url));
        assert_eq!(Loader::new().fetch(&url).unwrap(), "<p>file</p>");

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_http_is_not_local() {
        let url = Url::parse("https://example.com/").unwrap();
        assert!(!Loader::is_local(&url));
        assert!(matches!(
            Loader::new().fetch(&url),
            Err(LoadError::UnsupportedScheme(s)) if s == "https"
        ));
    }
}
