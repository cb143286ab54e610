#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use ban_sweep_rs::remote::{ActionSink, BanLookup, PageSource};
use ban_sweep_rs::types::{ActionResponse, BanRequest, PersistedRecord, PunishmentEntry};
use ban_sweep_rs::{Error, Result};
use time::PrimitiveDateTime;
use tokio_util::sync::CancellationToken;

pub const NOW: i64 = 1_750_000_000;
pub const DAY: i64 = 86_400;

fn display_name(steamid: &str) -> String {
    format!("player-{}", &steamid[steamid.len().saturating_sub(3)..])
}

pub fn entry(steamid: &str, reason: &str, age_days: i64) -> PunishmentEntry {
    PunishmentEntry {
        name: display_name(steamid),
        steamid: steamid.to_string(),
        ip: Some("10.0.0.1".into()),
        reason: reason.to_string(),
        admin_name: Some("admin".into()),
        created: NOW - age_days * DAY,
        expires: None,
        unpunish_admin_id: None,
    }
}

pub fn record(steamid: &str, created: PrimitiveDateTime) -> PersistedRecord {
    PersistedRecord {
        index: 0,
        name: display_name(steamid),
        steamid: steamid.to_string(),
        created,
        expires: None,
        reason: "читы".to_string(),
    }
}

pub enum Page {
    Entries(Vec<PunishmentEntry>),
    Hang,
    Fail,
}

/// Scripted paging channel. Unknown pages come back empty.
#[derive(Default)]
pub struct FakePages {
    pages: HashMap<u32, Page>,
    cancel_on: Option<(u32, CancellationToken)>,
    calls: Mutex<Vec<u32>>,
}

impl FakePages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: u32, behaviour: Page) -> Self {
        self.pages.insert(page, behaviour);
        self
    }

    /// Cancel `token` while serving `page`, as an operator interrupt would.
    pub fn cancel_on(mut self, page: u32, token: CancellationToken) -> Self {
        self.cancel_on = Some((page, token));
        self
    }

    pub fn calls(&self) -> Vec<u32> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl<'a> PageSource for &'a FakePages {
    async fn fetch_page(&self, page: u32, _category: u8) -> Result<Vec<PunishmentEntry>> {
        self.calls.lock().unwrap().push(page);
        if let Some((p, token)) = &self.cancel_on {
            if *p == page {
                token.cancel();
            }
        }
        match self.pages.get(&page) {
            Some(Page::Entries(entries)) => Ok(entries.clone()),
            Some(Page::Hang) => std::future::pending().await,
            Some(Page::Fail) => Err(Error::TransportFailure("connection reset".into())),
            None => Ok(Vec::new()),
        }
    }
}

/// Lookup channel answering from fixed lists; ids in `failing` error out.
#[derive(Default)]
pub struct FakeLookup {
    pub active: Vec<String>,
    pub failing: Vec<String>,
    pub calls: Mutex<Vec<String>>,
}

#[async_trait]
impl<'a> BanLookup for &'a FakeLookup {
    async fn has_active_ban(&self, steamid: &str) -> Result<bool> {
        self.calls.lock().unwrap().push(steamid.to_string());
        if self.failing.iter().any(|id| id == steamid) {
            return Err(Error::TransportFailure("lookup timed out".into()));
        }
        Ok(self.active.iter().any(|id| id == steamid))
    }
}

/// Action channel replying with a fixed status per steamid (201 otherwise).
#[derive(Default)]
pub struct FakeActions {
    pub statuses: HashMap<String, u16>,
    pub unreachable: Vec<String>,
    pub requests: Mutex<Vec<BanRequest>>,
}

impl FakeActions {
    pub fn requests(&self) -> Vec<BanRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl<'a> ActionSink for &'a FakeActions {
    async fn submit(&self, request: &BanRequest) -> Result<ActionResponse> {
        self.requests.lock().unwrap().push(request.clone());
        if self.unreachable.contains(&request.steamid) {
            return Err(Error::TransportFailure("connection refused".into()));
        }
        let status = self.statuses.get(&request.steamid).copied().unwrap_or(201);
        Ok(ActionResponse {
            status,
            body: format!("status {status}"),
        })
    }
}
