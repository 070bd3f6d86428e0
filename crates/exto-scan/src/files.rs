//! Collision-avoiding upload paths.
//!
//! Candidates look like `<dir>/<org_id>/<id>_<filename>`. The id starts at
//! the configured length; after `retries` further collisions at one length
//! the allocator moves to the next length, and gives up past the maximum.
//! The existence check and the later write are not atomic.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::Rng;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ScanConfig;
use crate::error::ScanResult;

const ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Source of path-prefix ids.
pub trait IdSource: Send + Sync {
    /// Returns an id of exactly `len` characters.
    fn next_id(&self, len: usize) -> String;
}

/// Random lowercase alphanumeric ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIdSource;

impl IdSource for RandomIdSource {
    fn next_id(&self, len: usize) -> String {
        let mut rng = rand::rng();
        (0..len)
            .map(|_| ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())] as char)
            .collect()
    }
}

/// Final component of a client-supplied filename, lowercased. Directory
/// parts of either separator style are dropped; nothing usable yields
/// `upload`.
pub fn file_component(filename: &str) -> String {
    let last = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    match last {
        "" | "." | ".." => "upload".to_string(),
        name => name.to_lowercase(),
    }
}

#[derive(Clone)]
pub struct UniquePathAllocator {
    ids: Arc<dyn IdSource>,
    initial_len: usize,
    max_len: usize,
    retries: u32,
}

impl UniquePathAllocator {
    pub fn new(ids: Arc<dyn IdSource>, initial_len: usize, max_len: usize, retries: u32) -> Self {
        Self {
            ids,
            initial_len,
            max_len: max_len.max(initial_len),
            retries,
        }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(
            Arc::new(RandomIdSource),
            config.initial_id_len,
            config.max_id_len,
            config.path_retries,
        )
    }

    /// Returns a path under `<dir>/<org_id>` that did not exist when
    /// checked, or `None` once every length up to the maximum has been
    /// exhausted. The organization directory is created first.
    pub async fn allocate(
        &self,
        dir: &Path,
        org_id: Uuid,
        filename: &str,
    ) -> ScanResult<Option<PathBuf>> {
        let org_dir = dir.join(org_id.to_string());
        tokio::fs::create_dir_all(&org_dir).await?;

        let filename = file_component(filename);
        for len in self.initial_len..=self.max_len {
            for attempt in 0..=self.retries {
                let id = self.ids.next_id(len);
                let candidate = org_dir.join(format!("{id}_{filename}"));
                if !tokio::fs::try_exists(&candidate).await? {
                    return Ok(Some(candidate));
                }
                debug!(len, attempt, path = %candidate.display(), "Upload path taken");
            }
        }

        warn!(org_id = %org_id, filename = %filename, "Upload path space exhausted");
        Ok(None)
    }
}
