use crate::error::FetchError;
use crate::market_data::Listing;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Where the symbol universe of a market comes from. `{market}` in the path
/// or URL is replaced by the market name.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UniverseSource {
    /// JSON file; relative paths resolve against the storage directory.
    File { path: String },
    Url { url: String },
}

impl Default for UniverseSource {
    fn default() -> Self {
        UniverseSource::File {
            path: "universe_{market}.json".to_string(),
        }
    }
}

/// Loads `[{"symbol": "...", "name": "..."}, ...]` for `market`.
pub async fn fetch_universe(
    client: &Client,
    source: &UniverseSource,
    market: &str,
    base_dir: &Path,
) -> Result<Vec<Listing>, FetchError> {
    let bytes = match source {
        UniverseSource::File { path } => {
            let path = base_dir.join(path.replace("{market}", market));
            match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(FetchError::DataUnavailable(format!(
                        "universe file {} not found",
                        path.display()
                    )));
                }
                Err(e) => return Err(e.into()),
            }
        }
        UniverseSource::Url { url } => {
            let response = client
                .get(url.replace("{market}", market))
                .send()
                .await?
                .error_for_status()?;
            response.bytes().await?.to_vec()
        }
    };

    parse_universe(&bytes)
}

fn parse_universe(bytes: &[u8]) -> Result<Vec<Listing>, FetchError> {
    let listings: Vec<Listing> =
        serde_json::from_slice(bytes).map_err(|e| FetchError::Malformed(e.to_string()))?;
    Ok(listings
        .into_iter()
        .map(|l| Listing {
            symbol: l.symbol.trim().to_string(),
            name: l.name.trim().to_string(),
        })
        .filter(|l| !l.symbol.is_empty())
        .collect())
}
