use std::time::Duration;

use reqwest::blocking::Client;
use tracing::debug;

use super::{zip_row, RowSource};
use crate::errors::SourceError;
use crate::model::RawRow;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebSourceOptions {
    pub sample_separator: String,
    pub field_separator: String,
    pub timeout: Duration,
    /// The endpoint returns the most recent sample first.
    pub newest_first: bool,
}

impl Default for WebSourceOptions {
    fn default() -> Self {
        Self {
            sample_separator: ";".to_string(),
            field_separator: ",".to_string(),
            timeout: Duration::from_secs(30),
            newest_first: true,
        }
    }
}

/// Fetches delimited sample payloads over HTTP relative to a base URL.
#[derive(Debug, Clone)]
pub struct WebSource {
    base_url: String,
    client: Client,
    options: WebSourceOptions,
}

impl WebSource {
    const NAME: &'static str = "web";

    pub fn new(base_url: impl Into<String>, options: WebSourceOptions) -> Result<Self, SourceError> {
        let base_url = base_url.into();
        let client = Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|err| SourceError::Fetch {
                location: base_url.clone(),
                message: format!("failed to build HTTP client: {err}"),
            })?;
        Ok(Self {
            base_url,
            client,
            options,
        })
    }

    pub fn url_for(&self, location: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            location.trim_start_matches('/')
        )
    }
}

impl RowSource for WebSource {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn rows(&self, location: &str, field_names: &[String]) -> Result<Vec<RawRow>, SourceError> {
        let url = self.url_for(location);
        debug!(%url, "fetching web rows");

        let fetch_error = |err: reqwest::Error| SourceError::Fetch {
            location: location.to_string(),
            message: format!("failed to connect to {url}: {err}"),
        };
        let payload = self
            .client
            .get(&url)
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.bytes())
            .map_err(fetch_error)?;

        let mut rows = split_payload(location, &payload, field_names, &self.options)?;
        if self.options.newest_first {
            rows.reverse();
        }
        Ok(rows)
    }
}

/// Splits a raw payload into rows: samples on the sample separator, then
/// fields on the field separator. Empty samples (such as the one after a
/// trailing separator) are skipped. The first sample's field count must
/// match `field_names`. Rows come back in payload order.
pub fn split_payload(
    location: &str,
    payload: &[u8],
    field_names: &[String],
    options: &WebSourceOptions,
) -> Result<Vec<RawRow>, SourceError> {
    let text = std::str::from_utf8(payload).map_err(|err| SourceError::Content {
        location: location.to_string(),
        message: format!("response is not valid UTF-8: {err}"),
    })?;

    let samples: Vec<Vec<&str>> = text
        .split(options.sample_separator.as_str())
        .map(str::trim)
        .filter(|sample| !sample.is_empty())
        .map(|sample| sample.split(options.field_separator.as_str()).collect())
        .collect();

    if let Some(first) = samples.first() {
        if first.len() != field_names.len() {
            return Err(SourceError::FieldCountMismatch {
                location: location.to_string(),
                expected: field_names.len(),
                found: first.len(),
            });
        }
    }

    Ok(samples
        .into_iter()
        .map(|values| zip_row(field_names, values))
        .collect())
}
