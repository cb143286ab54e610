//! Remote channels used by the sweep stages.
//!
//! Each stage talks to the service through a narrow trait so the stages can
//! be driven by in-memory fakes. The production implementations are a
//! WebSocket paging client and two HTTP clients sharing one `reqwest` setup.
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::Client;
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header as ws_header, HeaderValue as WsHeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::config::{Settings, DEFAULT_WS_ORIGIN};
use crate::error::{Error, Result};
use crate::types::{ActionResponse, BanRequest, PunishmentEntry};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/141.0.0.0 Safari/537.36";

/// Status code the lookup endpoint uses for a punishment still in force.
pub const ACTIVE_STATUS: i64 = 1;

/// One page of punishments at a time.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, page: u32, category: u8) -> Result<Vec<PunishmentEntry>>;
}

/// Authoritative check for a currently active punishment.
#[async_trait]
pub trait BanLookup: Send + Sync {
    async fn has_active_ban(&self, steamid: &str) -> Result<bool>;
}

/// Submits follow-up bans. Any HTTP status is a successful round-trip here;
/// interpreting it is the executor's job.
#[async_trait]
pub trait ActionSink: Send + Sync {
    async fn submit(&self, request: &BanRequest) -> Result<ActionResponse>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Paging client speaking the service's JSON-over-WebSocket protocol.
/// A fresh connection is opened for every request.
#[derive(Debug, Clone)]
pub struct WsPageSource {
    url: String,
    origin: String,
    access_token: Option<String>,
    search: String,
}

impl WsPageSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            origin: DEFAULT_WS_ORIGIN.to_string(),
            access_token: None,
            search: String::new(),
        }
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.access_token = (!token.trim().is_empty()).then_some(token);
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = search.into();
        self
    }

    /// Ask the service how many pages a category holds. The answer is passed
    /// through untouched.
    pub async fn page_info(&self, category: u8) -> Result<serde_json::Value> {
        let mut ws = self.connect().await?;
        send_json(
            &mut ws,
            serde_json::json!({
                "type": "get_punishments_pages",
                "punish_type": category,
                "search": self.search,
            }),
        )
        .await?;
        let answer = next_json(&mut ws).await?;
        let _ = ws.close(None).await;
        answer.ok_or_else(|| Error::TransportFailure("connection closed before page info".into()))
    }

    async fn connect(&self) -> Result<WsStream> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(Error::transport)?;
        let headers = request.headers_mut();
        headers.insert(
            ws_header::ORIGIN,
            WsHeaderValue::from_str(&self.origin).map_err(Error::transport)?,
        );
        headers.insert(ws_header::USER_AGENT, WsHeaderValue::from_static(USER_AGENT));
        if let Some(token) = &self.access_token {
            headers.insert(
                ws_header::COOKIE,
                WsHeaderValue::from_str(&format!("access_token={token}"))
                    .map_err(Error::transport)?,
            );
        }
        let (ws, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(Error::transport)?;
        Ok(ws)
    }
}

#[async_trait]
impl PageSource for WsPageSource {
    async fn fetch_page(&self, page: u32, category: u8) -> Result<Vec<PunishmentEntry>> {
        let mut ws = self.connect().await?;

        // The service expects a type query before it answers page requests.
        send_json(&mut ws, serde_json::json!({ "type": "get_type" })).await?;
        let _ = next_json(&mut ws).await?;

        send_json(
            &mut ws,
            serde_json::json!({
                "type": "get_punishments",
                "page": page,
                "punish_type": category,
                "search": self.search,
            }),
        )
        .await?;
        let answer = next_json(&mut ws).await?;
        let _ = ws.close(None).await;

        match answer {
            Some(value) => parse_page_response(&value),
            None => {
                debug!(page, "connection closed without a page answer");
                Ok(Vec::new())
            }
        }
    }
}

/// Extract entries from a page answer.
///
/// A `punishments` array yields its entries (unparseable ones are skipped),
/// an `error` field is a transport failure, anything else is an empty page.
pub fn parse_page_response(value: &serde_json::Value) -> Result<Vec<PunishmentEntry>> {
    if let Some(list) = value.get("punishments").and_then(|v| v.as_array()) {
        let mut entries = Vec::with_capacity(list.len());
        for item in list {
            match serde_json::from_value::<PunishmentEntry>(item.clone()) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!("skipping unparseable punishment entry: {e}"),
            }
        }
        return Ok(entries);
    }
    if let Some(err) = value.get("error") {
        return Err(Error::TransportFailure(format!("service error: {err}")));
    }
    Ok(Vec::new())
}

async fn send_json(ws: &mut WsStream, value: serde_json::Value) -> Result<()> {
    ws.send(Message::Text(value.to_string()))
        .await
        .map_err(Error::transport)
}

async fn next_json(ws: &mut WsStream) -> Result<Option<serde_json::Value>> {
    while let Some(msg) = ws.next().await {
        match msg.map_err(Error::transport)? {
            Message::Text(text) => {
                let value = serde_json::from_str(&text).map_err(Error::transport)?;
                return Ok(Some(value));
            }
            Message::Close(_) => return Ok(None),
            _ => {}
        }
    }
    Ok(None)
}

fn http_client(access_token: &str) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(header::ORIGIN, HeaderValue::from_static("https://fearproject.ru"));
    headers.insert(header::REFERER, HeaderValue::from_static("https://fearproject.ru/"));
    headers.insert(
        header::COOKIE,
        HeaderValue::from_str(&format!("access_token={access_token}"))
            .map_err(|e| Error::Config(format!("access_token is not a valid header value: {e}")))?,
    );
    Client::builder()
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .build()
        .map_err(Error::transport)
}

#[derive(Debug, Default, Deserialize)]
pub struct LookupResponse {
    #[serde(default)]
    pub punishments: Vec<PunishmentSummary>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PunishmentSummary {
    #[serde(default)]
    pub status: Option<i64>,
}

impl LookupResponse {
    pub fn has_active(&self) -> bool {
        self.punishments
            .iter()
            .any(|p| p.status == Some(ACTIVE_STATUS))
    }
}

/// Lookup channel backed by the punishment search endpoint.
#[derive(Debug, Clone)]
pub struct HttpLookup {
    client: Client,
    url: String,
}

impl HttpLookup {
    pub fn new(url: impl Into<String>, access_token: &str) -> Result<Self> {
        Ok(Self {
            client: http_client(access_token)?,
            url: url.into(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(settings.lookup_url.clone(), settings.require_token()?)
    }
}

#[async_trait]
impl BanLookup for HttpLookup {
    async fn has_active_ban(&self, steamid: &str) -> Result<bool> {
        let resp = self
            .client
            .get(&self.url)
            .query(&[("q", steamid), ("page", "1"), ("limit", "10"), ("type", "1")])
            .send()
            .await
            .map_err(Error::transport)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::TransportFailure(format!(
                "lookup for {steamid} returned {status}"
            )));
        }
        let body: LookupResponse = resp.json().await.map_err(Error::transport)?;
        Ok(body.has_active())
    }
}

/// Action channel posting ban requests as JSON.
#[derive(Debug, Clone)]
pub struct HttpActionSink {
    client: Client,
    url: String,
}

impl HttpActionSink {
    pub fn new(url: impl Into<String>, access_token: &str) -> Result<Self> {
        Ok(Self {
            client: http_client(access_token)?,
            url: url.into(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(settings.ban_url.clone(), settings.require_token()?)
    }
}

#[async_trait]
impl ActionSink for HttpActionSink {
    async fn submit(&self, request: &BanRequest) -> Result<ActionResponse> {
        let resp = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(Error::transport)?;
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Ok(ActionResponse { status, body })
    }
}
