use serde::{Deserialize, Serialize};
use time::PrimitiveDateTime;

/// One punishment entry as returned by the paging channel.
///
/// `created` and `expires` are unix timestamps in seconds. An `expires` of
/// `0` (or a missing field) means the punishment is permanent.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PunishmentEntry {
    #[serde(default)]
    pub name: String,
    #[serde(deserialize_with = "string_or_number")]
    pub steamid: String,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub admin_name: Option<String>,
    pub created: i64,
    #[serde(default)]
    pub expires: Option<i64>,
    /// Id of the admin who lifted the punishment. The service sends either
    /// JSON `null` or the string `"null"` for punishments still in force.
    #[serde(default)]
    pub unpunish_admin_id: Option<serde_json::Value>,
}

impl PunishmentEntry {
    /// Explicit expiry, with `0` folded into "permanent".
    pub fn expires_at(&self) -> Option<i64> {
        self.expires.filter(|&ts| ts != 0)
    }

    /// True while no admin has lifted the punishment.
    pub fn is_unresolved(&self) -> bool {
        match &self.unpunish_admin_id {
            None | Some(serde_json::Value::Null) => true,
            Some(serde_json::Value::String(s)) => s == "null",
            Some(_) => false,
        }
    }
}

fn string_or_number<'de, D>(de: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_json::Value::deserialize(de)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected steamid string or number, got {other}"
        ))),
    }
}

/// The filtered subset of an entry kept in the flat store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedRecord {
    /// 1-based position, display only.
    pub index: usize,
    pub name: String,
    pub steamid: String,
    pub created: PrimitiveDateTime,
    /// `None` is a permanent punishment.
    pub expires: Option<PrimitiveDateTime>,
    pub reason: String,
}

/// Body of the follow-up ban request.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BanRequest {
    pub steamid: String,
    pub reason: String,
    pub duration: i64,
    pub punish_type: u8,
}

/// Raw answer of the action channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResponse {
    pub status: u16,
    pub body: String,
}

/// Counters returned by the action executor.
#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub executed: usize,
    pub skipped: usize,
}

/// Counters returned by the verifier.
#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifySummary {
    pub checked: usize,
    pub removed: usize,
    pub lookup_failures: usize,
}
