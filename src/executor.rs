use time::PrimitiveDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::ban_window;
use crate::clock;
use crate::config::ExecutorConfig;
use crate::error::Error;
use crate::remote::ActionSink;
use crate::store;
use crate::types::{BanRequest, ExecutionSummary, PersistedRecord};

/// Every valid steamid starts with this prefix.
pub const STEAMID_PREFIX: &str = "7656119";
pub const STEAMID_LEN: usize = 17;

/// Category sent with every follow-up ban.
pub const BAN_CATEGORY: u8 = 0;

/// What happened to one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Executed,
    /// The calendar ban window has already closed.
    Ineligible,
    InvalidSteamId,
    /// 409: the player is already banned.
    AlreadyActioned,
    /// 400 from the action channel.
    Rejected(String),
    /// 5xx from the action channel.
    ServerFault(u16),
    Unexpected { status: u16, body: String },
    /// The request never produced a response.
    Failed(String),
}

impl RecordOutcome {
    pub fn is_executed(&self) -> bool {
        matches!(self, RecordOutcome::Executed)
    }
}

pub fn is_valid_steamid(steamid: &str) -> bool {
    steamid.len() == STEAMID_LEN
        && steamid.bytes().all(|b| b.is_ascii_digit())
        && steamid.starts_with(STEAMID_PREFIX)
}

/// Issues follow-up bans for stored records, one request at a time.
pub struct Executor<A> {
    sink: A,
    config: ExecutorConfig,
    fixed_now: Option<PrimitiveDateTime>,
}

impl<A: ActionSink> Executor<A> {
    pub fn new(sink: A, config: ExecutorConfig) -> Self {
        Self {
            sink,
            config,
            fixed_now: None,
        }
    }

    /// Evaluate windows against `now` instead of the wall clock.
    pub fn with_fixed_now(mut self, now: PrimitiveDateTime) -> Self {
        self.fixed_now = Some(now);
        self
    }

    fn now(&self) -> PrimitiveDateTime {
        self.fixed_now.unwrap_or_else(clock::now_local)
    }

    pub async fn execute(
        &self,
        records: &[PersistedRecord],
        cancel: &CancellationToken,
    ) -> ExecutionSummary {
        let mut summary = ExecutionSummary::default();
        info!(count = records.len(), "executing follow-up bans");

        for record in records {
            if cancel.is_cancelled() {
                warn!(
                    executed = summary.executed,
                    skipped = summary.skipped,
                    "execution interrupted"
                );
                break;
            }
            let (outcome, eligible) = self.execute_one(record).await;
            if outcome.is_executed() {
                summary.executed += 1;
            } else {
                summary.skipped += 1;
            }
            if eligible && !self.config.pause.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.config.pause) => {}
                }
            }
        }

        info!(
            executed = summary.executed,
            skipped = summary.skipped,
            "execution finished"
        );
        summary
    }

    /// Handle one record. The flag tells whether the record was inside its
    /// ban window; every such record is followed by the pacing pause.
    pub async fn execute_one(&self, record: &PersistedRecord) -> (RecordOutcome, bool) {
        let now = self.now();
        let window = match ban_window::bannable_window(record.created, now) {
            Ok(window) => window,
            Err(e) => {
                warn!(steamid = %record.steamid, "cannot compute ban window: {e}");
                return (RecordOutcome::Ineligible, false);
            }
        };
        if !window.eligible_now {
            info!(
                player = %record.name,
                ends = %store::format_timestamp(window.ends),
                "skipped, calculated ban already ended"
            );
            return (RecordOutcome::Ineligible, false);
        }

        let steamid = record.steamid.trim();
        if !is_valid_steamid(steamid) {
            warn!(player = %record.name, steamid, "invalid steamid format");
            return (RecordOutcome::InvalidSteamId, true);
        }

        let duration = match ban_window::remaining_duration(record.created, record.expires, now) {
            Ok(secs) => secs,
            Err(e) => {
                warn!(steamid, "cannot compute ban duration: {e}");
                return (RecordOutcome::Ineligible, true);
            }
        };
        let request = BanRequest {
            steamid: steamid.to_string(),
            reason: self.config.reason.clone(),
            duration,
            punish_type: BAN_CATEGORY,
        };
        let until = now + time::Duration::seconds(duration);
        info!(
            player = %record.name,
            steamid,
            days = duration / 86_400,
            until = %store::format_timestamp(until),
            "banning"
        );

        let response = match self.sink.submit(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(steamid, "ban request failed: {e}");
                return (RecordOutcome::Failed(e.to_string()), true);
            }
        };

        let outcome = match response.status {
            201 => {
                info!(player = %record.name, "banned");
                RecordOutcome::Executed
            }
            409 => {
                info!(player = %record.name, "already banned");
                RecordOutcome::AlreadyActioned
            }
            400 => {
                let err = Error::ValidationRejected {
                    steamid: steamid.to_string(),
                    detail: response.body.clone(),
                };
                warn!("{err}");
                RecordOutcome::Rejected(response.body)
            }
            status @ 500..=599 => {
                let err = Error::ServerFault {
                    steamid: steamid.to_string(),
                    status,
                };
                warn!("{err}; player may already be banned, not retrying");
                RecordOutcome::ServerFault(status)
            }
            status => {
                warn!(steamid, status, body = %response.body, "unexpected ban response");
                RecordOutcome::Unexpected {
                    status,
                    body: response.body,
                }
            }
        };
        (outcome, true)
    }
}
