//! HTTP downloads for release catalogs and plugin binaries.

use std::thread;
use std::time::Duration;

use kiln_plugins::{Fetcher, PluginError};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use tracing::{debug, warn};

const FETCH_TARGET: &str = "kiln_cli::fetch";

/// Attempts per URL before giving up on transport errors.
const MAX_ATTEMPTS: u32 = 3;

const RETRY_DELAY: Duration = Duration::from_millis(500);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Blocking HTTP fetcher with a bounded retry for transport failures.
///
/// HTTP error statuses are not retried: a 404 stays a 404.
#[derive(Debug, Clone)]
pub(crate) struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub(crate) fn new() -> Result<Self, PluginError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json, application/octet-stream"),
        );
        let client = Client::builder()
            .user_agent(concat!("kiln/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| PluginError::Fetch {
                url: String::from("(client)"),
                message: error.to_string(),
            })?;
        Ok(Self { client })
    }

    fn attempt(&self, url: &str) -> Result<Vec<u8>, reqwest::Error> {
        let response = self.client.get(url).send()?.error_for_status()?;
        Ok(response.bytes()?.to_vec())
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, PluginError> {
        let mut attempt = 1;
        loop {
            debug!(target: FETCH_TARGET, url, attempt, "fetching");
            match self.attempt(url) {
                Ok(bytes) => return Ok(bytes),
                Err(error) if error.status().is_none() && attempt < MAX_ATTEMPTS => {
                    warn!(target: FETCH_TARGET, url, attempt, %error, "fetch failed, retrying");
                    thread::sleep(RETRY_DELAY * attempt);
                    attempt += 1;
                }
                Err(error) => {
                    return Err(PluginError::Fetch {
                        url: url.to_owned(),
                        message: error.to_string(),
                    });
                }
            }
        }
    }
}
