use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::Result;
use crate::remote::BanLookup;
use crate::store;
use crate::types::{PersistedRecord, VerifySummary};

/// Re-checks stored records against the lookup channel and prunes the ones
/// that already carry an active punishment. Lookup failures keep the record.
pub struct Verifier<L> {
    lookup: L,
    pause: Duration,
}

impl<L: BanLookup> Verifier<L> {
    pub fn new(lookup: L) -> Self {
        Self {
            lookup,
            pause: Duration::from_millis(500),
        }
    }

    /// Pause between lookups.
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// Steamids with a currently active punishment, one lookup per distinct id.
    pub async fn flag_active(
        &self,
        records: &[PersistedRecord],
        cancel: &CancellationToken,
    ) -> (HashSet<String>, VerifySummary) {
        let mut seen: HashMap<&str, bool> = HashMap::new();
        let mut summary = VerifySummary::default();

        for record in records {
            if cancel.is_cancelled() {
                warn!(checked = summary.checked, "verification interrupted");
                break;
            }
            let steamid = record.steamid.as_str();
            if seen.contains_key(steamid) {
                continue;
            }
            let active = match self.lookup.has_active_ban(steamid).await {
                Ok(active) => active,
                Err(e) => {
                    warn!(steamid, "lookup failed, keeping record: {e}");
                    summary.lookup_failures += 1;
                    false
                }
            };
            if active {
                info!(steamid, player = %record.name, "active punishment found, removing");
            } else {
                info!(steamid, player = %record.name, "no active punishment");
            }
            seen.insert(steamid, active);
            summary.checked += 1;
            if !self.pause.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.pause) => {}
                }
            }
        }

        let flagged: HashSet<String> = seen
            .into_iter()
            .filter(|&(_, active)| active)
            .map(|(id, _)| id.to_string())
            .collect();
        summary.removed = records
            .iter()
            .filter(|r| flagged.contains(&r.steamid))
            .count();
        (flagged, summary)
    }

    /// Records to keep, in their original order.
    pub async fn verify(
        &self,
        records: Vec<PersistedRecord>,
        cancel: &CancellationToken,
    ) -> (Vec<PersistedRecord>, VerifySummary) {
        let (flagged, summary) = self.flag_active(&records, cancel).await;
        let kept = records
            .into_iter()
            .filter(|r| !flagged.contains(&r.steamid))
            .collect();
        (kept, summary)
    }

    /// Verify the store at `path` and rewrite it without the flagged records.
    /// Kept blocks are written back byte for byte.
    pub async fn verify_store(
        &self,
        path: impl AsRef<Path>,
        cancel: &CancellationToken,
    ) -> Result<VerifySummary> {
        let path = path.as_ref();
        let text = store::read_text(path)?;
        let records = store::deserialize(&text);
        info!(count = records.len(), path = %path.display(), "verifying stored records");

        let (flagged, summary) = self.flag_active(&records, cancel).await;
        if !flagged.is_empty() {
            store::write_text(path, &rewrite_without(&text, &flagged))?;
            info!(removed = summary.removed, "store updated");
        }
        Ok(summary)
    }
}

/// Drop every block whose steamid is in `remove`, keeping all other bytes.
pub fn rewrite_without(text: &str, remove: &HashSet<String>) -> String {
    store::split_blocks(text)
        .into_iter()
        .filter(|block| !store::block_steamid(block).is_some_and(|id| remove.contains(id)))
        .collect()
}
