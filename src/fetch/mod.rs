//! Upstream HTTP fetch.
//!
//! Any transport failure or non-success status becomes
//! [`PipelineError::SourceUnavailable`]; callers report that as "no data
//! available" and write nothing.

mod basic;
mod client;

pub use basic::BasicClient;
pub use client::HttpClient;

use reqwest::StatusCode;
use std::fmt::Display;
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};
use crate::parser::parse_table;
use crate::records::RawTable;

/// Maps a response status onto the source-availability contract.
pub fn ensure_success(url: &str, status: StatusCode) -> Result<()> {
    if status.is_success() {
        Ok(())
    } else {
        warn!(url, %status, "Upstream returned non-success status");
        Err(PipelineError::SourceUnavailable {
            reason: format!("GET {url} returned {status}"),
        })
    }
}

fn unavailable(url: &str, err: impl Display) -> PipelineError {
    PipelineError::SourceUnavailable {
        reason: format!("GET {url}: {err}"),
    }
}

pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Vec<u8>> {
    let parsed: reqwest::Url = url.parse().map_err(|e| unavailable(url, e))?;
    let req = reqwest::Request::new(reqwest::Method::GET, parsed);

    let resp = client.execute(req).await.map_err(|e| unavailable(url, e))?;
    ensure_success(url, resp.status())?;

    let bytes = resp.bytes().await.map_err(|e| unavailable(url, e))?;
    debug!(url, bytes = bytes.len(), "Fetched source payload");
    Ok(bytes.to_vec())
}

/// Fetches and parses the source table.
#[tracing::instrument(skip(client))]
pub async fn fetch_table<C: HttpClient>(client: &C, url: &str) -> Result<RawTable> {
    let bytes = fetch_bytes(client, url).await?;
    parse_table(&bytes)
}
