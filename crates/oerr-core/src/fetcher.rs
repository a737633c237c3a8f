use crate::config::HarvestConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use encoding_rs::{Encoding, UTF_8};
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::{debug, info};

/// How far into a body a `<meta>` charset declaration is looked for.
const META_PRESCAN_LEN: usize = 1024;

/// Anything that can turn a URL into page text.
///
/// The harvester only talks to this trait, so tests can count or delay
/// fetches without a network.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch `url` and return its body decoded to UTF-8.
    async fn fetch_page(&self, url: &str) -> Result<String>;
}

/// HTTP client for documentation pages
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    /// Creates a fetcher with default settings
    pub fn new() -> Result<Self> {
        Self::from_config(&HarvestConfig::default())
    }

    /// Creates a fetcher using the timeout and user agent from `config`
    pub fn from_config(config: &HarvestConfig) -> Result<Self> {
        Self::build(config.request_timeout(), &config.user_agent)
    }

    /// Creates a fetcher with a custom request timeout (primarily for tests)
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        Self::build(timeout, &HarvestConfig::default().user_agent)
    }

    fn build(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(Error::Network)?;
        Ok(Self { client })
    }

    /// Fetches a page and decodes it to UTF-8.
    ///
    /// The encoding is taken from a byte-order mark, then the `charset` of
    /// the `Content-Type` header, then a `<meta>` declaration near the top
    /// of the body, and is UTF-8 otherwise. Undecodable bytes become U+FFFD.
    pub async fn fetch(&self, url: &str) -> Result<String> {
        debug!("Fetching {}", url);
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(Error::Fetch {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let declared = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(header_charset);
        let bytes = response.bytes().await?;
        let content = decode_page(&bytes, declared);
        info!("Fetched {} bytes from {}", content.len(), url);
        Ok(content)
    }
}

fn header_charset(content_type: &str) -> Option<&'static Encoding> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        Encoding::for_label(value.trim().trim_matches(['"', '\'']).as_bytes())
    })
}

fn meta_charset(bytes: &[u8]) -> Option<&'static Encoding> {
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(META_PRESCAN_LEN)])
        .to_ascii_lowercase();
    head.match_indices("<meta")
        .find_map(|(start, _)| {
            let tag = &head[start..];
            let tag = &tag[..tag.find('>').unwrap_or(tag.len())];
            let (_, value) = tag.split_once("charset=")?;
            let label = value
                .trim_start_matches(['"', '\'', ' '])
                .split(['"', '\'', ';', ' ', '/'])
                .next()?;
            Encoding::for_label(label.as_bytes())
        })
        // a document that names UTF-16 in ASCII bytes is not UTF-16
        .map(Encoding::output_encoding)
}

fn decode_page(bytes: &[u8], declared: Option<&'static Encoding>) -> String {
    let (encoding, bom_len) = Encoding::for_bom(bytes).unwrap_or_else(|| {
        let encoding = declared.or_else(|| meta_charset(bytes)).unwrap_or(UTF_8);
        (encoding, 0)
    });
    let (text, had_errors) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
    if had_errors {
        debug!(encoding = encoding.name(), "Replaced undecodable bytes");
    }
    text.into_owned()
}

#[async_trait]
impl PageSource for Fetcher {
    async fn fetch_page(&self, url: &str) -> Result<String> {
        self.fetch(url).await
    }
}

// Note: Default is not implemented as Fetcher::new() can fail.
