use std::path::PathBuf;
use std::time::Duration;

use ::time::UtcOffset;
use tokio::sync::watch;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock;
use crate::config::ScanConfig;
use crate::error::{Error, Result};
use crate::remote::PageSource;
use crate::store;
use crate::types::{PersistedRecord, PunishmentEntry};

/// Which punishments the scanner keeps.
#[derive(Debug, Clone)]
pub struct DiscoveryFilter {
    keywords: Vec<String>,
    age_threshold_secs: i64,
}

impl DiscoveryFilter {
    pub fn new(keywords: &[String], age_threshold: Duration) -> Self {
        Self {
            keywords: keywords
                .iter()
                .map(|k| k.to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
            age_threshold_secs: age_threshold.as_secs() as i64,
        }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(&config.reason_keywords, config.age_threshold)
    }

    pub fn is_target_reason(&self, entry: &PunishmentEntry) -> bool {
        let reason = entry.reason.to_lowercase();
        self.keywords.iter().any(|k| reason.contains(k.as_str()))
    }

    pub fn is_old_enough(&self, entry: &PunishmentEntry, scan_time: i64) -> bool {
        scan_time - entry.created > self.age_threshold_secs
    }

    pub fn is_unresolved(&self, entry: &PunishmentEntry) -> bool {
        entry.is_unresolved()
    }

    pub fn matches(&self, entry: &PunishmentEntry, scan_time: i64) -> bool {
        self.is_target_reason(entry)
            && self.is_old_enough(entry, scan_time)
            && self.is_unresolved(entry)
    }
}

/// Mutable state of one scan. Owned by the scanner for the duration of a
/// call to [`Scanner::scan`].
#[derive(Debug, Clone, Default)]
pub struct ScanState {
    pub current_page: u32,
    pub collected: Vec<PersistedRecord>,
    pub consecutive_empty_pages: u32,
    pub retry_count: u32,
}

impl ScanState {
    fn new(start_page: u32) -> Self {
        Self {
            current_page: start_page,
            ..Self::default()
        }
    }

    fn advance(&mut self) {
        self.current_page = self.current_page.saturating_add(1);
        self.retry_count = 0;
    }
}

/// Read-only snapshot published for progress rendering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanProgress {
    pub collected: usize,
    pub target: usize,
    pub page: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    TargetReached,
    Cancelled,
    /// The configured run of empty or skipped pages was reached.
    SourceExhausted { empty_pages: u32 },
    /// A non-timeout transport error aborted the scan.
    TransportFailure { page: u32, message: String },
}

/// Outcome of a scan.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub records: Vec<PersistedRecord>,
    /// Page the next scan would continue from.
    pub end_page: u32,
    pub pages_skipped: u32,
    pub stop: StopReason,
    /// Where the records were written, if they were.
    pub persisted_to: Option<PathBuf>,
}

/// Paginated discovery of punishments matching a [`DiscoveryFilter`].
///
/// - One page request in flight at a time, bounded by `page_timeout`.
/// - Timed out pages are retried up to `max_retries_per_page` times, then skipped.
/// - Any other transport error ends the scan with a partial result.
/// - Cancellation is checked between requests and during pauses, never mid-request.
/// - Whatever was collected is written to the store before returning. A failed
///   write is logged and the records are still returned.
pub struct Scanner<S> {
    source: S,
    config: ScanConfig,
    filter: DiscoveryFilter,
    offset: UtcOffset,
    store_path: Option<PathBuf>,
    progress: Option<watch::Sender<ScanProgress>>,
}

impl<S: PageSource> Scanner<S> {
    pub fn new(source: S, config: ScanConfig) -> Self {
        let filter = DiscoveryFilter::from_config(&config);
        Self {
            source,
            config,
            filter,
            offset: clock::local_offset(),
            store_path: None,
            progress: None,
        }
    }

    /// Persist results to `path` when the scan ends.
    pub fn with_store(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = Some(path.into());
        self
    }

    /// Offset used to turn entry timestamps into store date-times.
    pub fn with_offset(mut self, offset: UtcOffset) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_progress(mut self, tx: watch::Sender<ScanProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn filter(&self) -> &DiscoveryFilter {
        &self.filter
    }

    /// Scan from `start_page` until `target` matching entries are found.
    pub async fn scan(
        &self,
        start_page: u32,
        target: usize,
        cancel: CancellationToken,
    ) -> Result<ScanReport> {
        self.scan_at(start_page, target, clock::unix_now(), cancel).await
    }

    /// Like [`Scanner::scan`], with an explicit reference time for the age check.
    pub async fn scan_at(
        &self,
        start_page: u32,
        target: usize,
        scan_time: i64,
        cancel: CancellationToken,
    ) -> Result<ScanReport> {
        if start_page < 1 {
            return Err(Error::InvalidArgument("start page must be at least 1".into()));
        }
        if target == 0 {
            return Err(Error::InvalidArgument("target count must be greater than 0".into()));
        }

        let mut state = ScanState::new(start_page);
        let mut pages_skipped = 0u32;
        self.publish(&state, target);
        info!(start_page, wanted = target, "scan started");

        let stop = loop {
            if state.collected.len() >= target {
                break StopReason::TargetReached;
            }
            if cancel.is_cancelled() {
                break StopReason::Cancelled;
            }
            if let Some(limit) = self.config.max_consecutive_empty_pages {
                if state.consecutive_empty_pages >= limit {
                    break StopReason::SourceExhausted {
                        empty_pages: state.consecutive_empty_pages,
                    };
                }
            }

            let page = state.current_page;
            let fetched = time::timeout(
                self.config.page_timeout,
                self.source.fetch_page(page, self.config.category),
            )
            .await;

            match fetched {
                Err(_elapsed) => {
                    state.retry_count += 1;
                    if state.retry_count >= self.config.max_retries_per_page {
                        let err = Error::TransportTimeout {
                            page,
                            attempts: state.retry_count,
                        };
                        warn!("{err}; skipping page");
                        state.consecutive_empty_pages += 1;
                        pages_skipped += 1;
                        state.advance();
                        self.publish(&state, target);
                        self.pause(self.config.skip_cooldown, &cancel).await;
                    } else {
                        warn!(
                            page,
                            attempt = state.retry_count,
                            max = self.config.max_retries_per_page,
                            "page timed out after {:?}, retrying",
                            self.config.page_timeout
                        );
                        self.pause(self.config.retry_pause, &cancel).await;
                    }
                }
                Ok(Err(e)) => {
                    warn!(page, "aborting scan: {e}");
                    break StopReason::TransportFailure {
                        page,
                        message: e.to_string(),
                    };
                }
                Ok(Ok(entries)) if entries.is_empty() => {
                    debug!(page, "empty page");
                    state.consecutive_empty_pages += 1;
                    state.advance();
                    self.publish(&state, target);
                }
                Ok(Ok(entries)) => {
                    state.consecutive_empty_pages = 0;
                    state.retry_count = 0;
                    let found = self.collect_matches(&mut state, &entries, target, scan_time);
                    debug!(page, entries = entries.len(), found, "page processed");
                    if self.config.progress_log_every > 0
                        && page % self.config.progress_log_every == 0
                    {
                        info!(
                            page,
                            collected = state.collected.len(),
                            wanted = target,
                            "scan progress"
                        );
                    }
                    state.advance();
                    self.publish(&state, target);
                    if state.collected.len() < target {
                        self.pause(self.config.page_pause, &cancel).await;
                    }
                }
            }
        };

        let persisted_to = match self.persist(&state.collected) {
            Ok(path) => path,
            Err(e) => {
                warn!(collected = state.collected.len(), "scan results not saved: {e}");
                None
            }
        };
        info!(
            collected = state.collected.len(),
            end_page = state.current_page,
            ?stop,
            "scan finished"
        );
        Ok(ScanReport {
            records: state.collected,
            end_page: state.current_page,
            pages_skipped,
            stop,
            persisted_to,
        })
    }

    fn collect_matches(
        &self,
        state: &mut ScanState,
        entries: &[PunishmentEntry],
        target: usize,
        scan_time: i64,
    ) -> usize {
        let mut found = 0;
        for entry in entries {
            if state.collected.len() >= target {
                break;
            }
            if !self.filter.matches(entry, scan_time) {
                continue;
            }
            match self.to_record(entry, state.collected.len() + 1) {
                Some(record) => {
                    state.collected.push(record);
                    found += 1;
                }
                None => warn!(
                    steamid = %entry.steamid,
                    created = entry.created,
                    "entry timestamp out of range, skipped"
                ),
            }
        }
        found
    }

    fn to_record(&self, entry: &PunishmentEntry, index: usize) -> Option<PersistedRecord> {
        let created = clock::from_unix(entry.created, self.offset)?;
        let expires = match entry.expires_at() {
            Some(ts) => Some(clock::from_unix(ts, self.offset)?),
            None => None,
        };
        Some(PersistedRecord {
            index,
            name: if entry.name.is_empty() {
                "N/A".to_string()
            } else {
                entry.name.clone()
            },
            steamid: entry.steamid.clone(),
            created,
            expires,
            reason: entry.reason.clone(),
        })
    }

    fn persist(&self, records: &[PersistedRecord]) -> Result<Option<PathBuf>> {
        // An empty result never replaces an existing store.
        let Some(path) = &self.store_path else {
            return Ok(None);
        };
        if records.is_empty() {
            return Ok(None);
        }
        store::save(path, records)?;
        info!(count = records.len(), path = %path.display(), "scan results saved");
        Ok(Some(path.clone()))
    }

    fn publish(&self, state: &ScanState, target: usize) {
        if let Some(tx) = &self.progress {
            tx.send_replace(ScanProgress {
                collected: state.collected.len(),
                target,
                page: state.current_page,
            });
        }
    }

    async fn pause(&self, d: Duration, cancel: &CancellationToken) {
        if d.is_zero() {
            return;
        }
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = time::sleep(d) => {}
        }
    }
}
