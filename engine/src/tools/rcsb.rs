//! Structure registry client
//!
//! Downloads coordinate files from an RCSB-style mirror where each entry is
//! served at `<base_url>/<ID>.pdb`.

use crate::config::RegistryConfig;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info};

/// Errors from structure downloads
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Invalid PDB ID '{0}'. Must be 4 chars: digit + 3 alphanumeric.")]
    InvalidId(String),

    #[error("PDB ID '{0}' not found on RCSB.")]
    NotFound(String),

    #[error("RCSB returned HTTP {status} for '{id}'.")]
    Http { id: String, status: u16 },

    #[error("Failed to fetch PDB {id} from RCSB: {reason}")]
    Network { id: String, reason: String },
}

/// A downloaded structure
#[derive(Debug, Clone)]
pub struct FetchedStructure {
    pub pdb_id: String,
    pub contents: Vec<u8>,
    pub sha256: String,
}

fn id_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[0-9][A-Za-z0-9]{3}$").ok())
        .as_ref()
}

/// Trim and upper-case an id, rejecting anything that is not a PDB code
pub fn normalize_id(raw: &str) -> Result<String, FetchError> {
    let id = raw.trim().to_uppercase();
    match id_pattern() {
        Some(pattern) if pattern.is_match(&id) => Ok(id),
        _ => Err(FetchError::InvalidId(id)),
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

pub struct RcsbClient {
    base_url: String,
    client: reqwest::Client,
}

impl RcsbClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: base_url.into(),
            client,
        }
    }

    pub fn from_config(config: &RegistryConfig) -> Self {
        Self::new(
            config.base_url.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Download one entry by id
    pub async fn fetch(&self, raw_id: &str) -> Result<FetchedStructure, FetchError> {
        let pdb_id = normalize_id(raw_id)?;
        let url = format!("{}/{}.pdb", self.base_url.trim_end_matches('/'), pdb_id);
        debug!("Fetching {}", url);

        let network = |e: reqwest::Error| FetchError::Network {
            id: pdb_id.clone(),
            reason: e.to_string(),
        };

        let response = self.client.get(&url).send().await.map_err(network)?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(pdb_id));
        }
        if !status.is_success() {
            return Err(FetchError::Http {
                id: pdb_id,
                status: status.as_u16(),
            });
        }

        let contents = response.bytes().await.map_err(network)?.to_vec();
        let sha256 = sha256_hex(&contents);
        info!("Fetched {} ({} bytes)", pdb_id, contents.len());

        Ok(FetchedStructure {
            pdb_id,
            contents,
            sha256,
        })
    }
}
