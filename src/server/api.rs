//! Request/response DTOs and endpoint handlers. Handlers return JSON
//! payload strings; `routes` maps them onto HTTP status lines.

use std::fmt;

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

use crate::battle;
use crate::battle::rng::Rng;
use crate::config::Settings;
use crate::data::rows::BattleHistoryRecord;
use crate::error::Error;
use crate::store::{Database, Deadline, RequestTag};

const DELETE_HISTORY_TAG: RequestTag =
    RequestTag::new("delete", "delete_battle_histories", "battle_history");

/// Everything a request handler needs, constructed once at startup and
/// shared by reference. Replaces any process-wide client/pool state.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub db: Database,
    pub settings: Settings,
}

impl AppContext {
    pub fn new(db: Database, settings: Settings) -> Self {
        Self { db, settings }
    }

    fn request_deadline(&self) -> Deadline {
        Deadline::after(self.settings.request_timeout)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BattleRequest {
    pub character_id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BattleResponse {
    pub won: bool,
}

/// Ids are serialized as strings: they are sparse 63-bit values and would
/// lose precision in consumers that read JSON numbers as doubles.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryItem {
    pub user_id: String,
    pub character_id: String,
    pub opponent_id: String,
    pub result: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl HistoryItem {
    pub fn from_record(record: &BattleHistoryRecord) -> Self {
        Self {
            user_id: record.user_id.to_string(),
            character_id: record.character_id.to_string(),
            opponent_id: record.opponent_id.to_string(),
            result: record.result,
            created_at: record
                .created_at
                .to_rfc3339_opts(SecondsFormat::Micros, true),
            updated_at: record
                .updated_at
                .to_rfc3339_opts(SecondsFormat::Micros, true),
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    Parse(serde_json::Error),
    BadQuery(String),
    Service(Error),
    Encode(serde_json::Error),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "invalid request body: {err}"),
            Self::BadQuery(msg) => write!(f, "invalid query: {msg}"),
            Self::Service(err) => write!(f, "{err}"),
            Self::Encode(err) => write!(f, "failed to encode response: {err}"),
        }
    }
}

impl std::error::Error for ApiError {}

pub fn health_payload() -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&serde_json::json!({
        "status": "ok",
        "service": "arena-api",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// `POST /api/v1/battles`
pub fn battle_payload(ctx: &AppContext, body: &str) -> Result<String, ApiError> {
    let request: BattleRequest = serde_json::from_str(body).map_err(ApiError::Parse)?;
    let deadline = ctx.request_deadline();
    let mut rng = Rng::from_entropy();
    let report = battle::execute_battle(
        &ctx.db,
        &ctx.settings.tuning,
        request.character_id,
        &deadline,
        &mut rng,
    )
    .map_err(ApiError::Service)?;
    serde_json::to_string_pretty(&BattleResponse { won: report.won }).map_err(ApiError::Encode)
}

#[derive(Debug, Clone, Copy)]
struct HistoryParams {
    user_id: i64,
    since: i64,
    until: i64,
}

fn parse_history_query(query: &str) -> Result<HistoryParams, ApiError> {
    let mut user_id = None;
    let mut since = None;
    let mut until = None;
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| ApiError::BadQuery(format!("malformed parameter '{pair}'")))?;
        let parsed: i64 = value
            .parse()
            .map_err(|_| ApiError::BadQuery(format!("{key} must be an integer")))?;
        match key {
            "user_id" => user_id = Some(parsed),
            "since" => since = Some(parsed),
            "until" => until = Some(parsed),
            _ => {}
        }
    }
    Ok(HistoryParams {
        user_id: user_id.ok_or_else(|| ApiError::BadQuery("user_id is required".to_string()))?,
        since: since.ok_or_else(|| ApiError::BadQuery("since is required".to_string()))?,
        until: until.ok_or_else(|| ApiError::BadQuery("until is required".to_string()))?,
    })
}

/// `GET /api/v1/battles/history?user_id=&since=&until=`
pub fn history_payload(ctx: &AppContext, query: &str) -> Result<String, ApiError> {
    let params = parse_history_query(query)?;
    let deadline = ctx.request_deadline();
    let records = battle::list_history(
        &ctx.db,
        ctx.settings.history_staleness,
        params.user_id,
        params.since,
        params.until,
        &deadline,
    )
    .map_err(ApiError::Service)?;
    let items: Vec<HistoryItem> = records.iter().map(HistoryItem::from_record).collect();
    serde_json::to_string_pretty(&items).map_err(ApiError::Encode)
}

/// `DELETE /api/v1/battles/history`: administrative bulk wipe.
pub fn delete_history_payload(ctx: &AppContext) -> Result<String, ApiError> {
    let deadline = ctx.request_deadline();
    ctx.db
        .partitioned_delete_history(&deadline, Some(&DELETE_HISTORY_TAG))
        .map_err(ApiError::Service)?;
    serde_json::to_string_pretty(&serde_json::json!({})).map_err(ApiError::Encode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_query_requires_all_parameters() {
        assert!(parse_history_query("user_id=1&since=2&until=3").is_ok());
        for query in ["", "user_id=1", "user_id=1&since=2", "since=2&until=3"] {
            assert!(matches!(
                parse_history_query(query),
                Err(ApiError::BadQuery(_))
            ));
        }
    }

    #[test]
    fn history_query_rejects_non_integers() {
        assert!(matches!(
            parse_history_query("user_id=abc&since=2&until=3"),
            Err(ApiError::BadQuery(_))
        ));
    }

    #[test]
    fn unknown_query_parameters_are_ignored() {
        let params = parse_history_query("user_id=1&since=2&until=3&page=9").expect("parse");
        assert_eq!(params.user_id, 1);
    }
}
