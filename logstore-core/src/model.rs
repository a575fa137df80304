//! The shared data model (spec §3): `Event`, `Attempt`, `AttemptRecord`, and the
//! request/response shapes the driver contract (§4.1) passes across the boundary.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// An open JSON value for `data`, `metadata`, and `response_data` (spec §9).
/// Relational backends may store this as a native JSON column; columnar backends
/// may serialize it to a string column and deserialize on read — either way it
/// never crosses the driver boundary in its serialized form.
pub type JsonValue = serde_json::Value;

/// An immutable record of something published into the system (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub tenant_id: String,
    pub event_id: String,
    /// Publish-time destination hint, not the routing result (see `ListEvent`'s
    /// `destination_ids` caveat, spec §4.1).
    pub destination_id: String,
    pub topic: String,
    pub eligible_for_retry: bool,
    /// Millisecond-precision epoch timestamp.
    pub time: i64,
    pub metadata: HashMap<String, String>,
    pub data: HashMap<String, JsonValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Success,
    Failed,
    Pending,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Success => "success",
            AttemptStatus::Failed => "failed",
            AttemptStatus::Pending => "pending",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(AttemptStatus::Success),
            "failed" => Some(AttemptStatus::Failed),
            "pending" => Some(AttemptStatus::Pending),
            _ => None,
        }
    }
}

/// One delivery attempt for one (event, destination) pair (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub attempt_id: String,
    pub event_id: String,
    pub tenant_id: String,
    /// The destination that actually received the attempt (contrast with
    /// `Event::destination_id`, which is only the publish-time hint).
    pub destination_id: String,
    pub attempt_number: u64,
    pub manual: bool,
    pub status: AttemptStatus,
    pub time: i64,
    pub code: String,
    pub response_data: HashMap<String, JsonValue>,
}

/// The join view returned by list/retrieve operations — the unit of display in the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: Attempt,
    pub event: Event,
}

/// One `(Event, Attempt)` pair as passed to `InsertMany` (spec §4.1/§4.4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertEntry {
    pub event: Event,
    pub attempt: Attempt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl Default for SortOrder {
    fn default() -> Self {
        SortOrder::Desc
    }
}

/// Four independent bounds on a timestamp field (spec §4.1). All are inclusive/
/// exclusive exactly as named; `None` means "no bound".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeFilter {
    pub gte: Option<i64>,
    pub lte: Option<i64>,
    pub gt: Option<i64>,
    pub lt: Option<i64>,
}

impl TimeFilter {
    pub fn is_empty(&self) -> bool {
        self.gte.is_none() && self.lte.is_none() && self.gt.is_none() && self.lt.is_none()
    }

    pub fn matches(&self, time: i64) -> bool {
        self.gte.map(|b| time >= b).unwrap_or(true)
            && self.lte.map(|b| time <= b).unwrap_or(true)
            && self.gt.map(|b| time > b).unwrap_or(true)
            && self.lt.map(|b| time < b).unwrap_or(true)
    }
}

pub const DEFAULT_LIMIT: usize = 100;
pub const MAX_LIMIT: usize = 1000;

pub fn clamp_limit(limit: usize) -> usize {
    if limit == 0 {
        DEFAULT_LIMIT
    } else {
        limit.min(MAX_LIMIT)
    }
}

/// At most one of `next`/`prev` may be set; this is the in-process equivalent of the
/// spec's "xor" requirement on the wire request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Page {
    #[default]
    First,
    Next(String),
    Prev(String),
}

#[derive(Debug, Clone, Default)]
pub struct ListEventRequest {
    pub tenant_id: String,
    pub destination_ids: HashSet<String>,
    pub topics: HashSet<String>,
    pub time_filter: TimeFilter,
    pub sort_order: SortOrder,
    pub limit: usize,
    pub page: Page,
}

#[derive(Debug, Clone, Default)]
pub struct ListAttemptRequest {
    pub tenant_id: String,
    pub event_id: Option<String>,
    pub destination_ids: HashSet<String>,
    pub status: Option<AttemptStatus>,
    pub topics: HashSet<String>,
    pub time_filter: TimeFilter,
    pub sort_order: SortOrder,
    pub limit: usize,
    pub page: Page,
}

/// A page of results plus the tokens to fetch its neighbors (spec §4.2).
#[derive(Debug, Clone, PartialEq)]
pub struct ListResult<T> {
    pub items: Vec<T>,
    pub next: Option<String>,
    pub prev: Option<String>,
}

impl<T> ListResult<T> {
    pub fn empty() -> Self {
        ListResult {
            items: Vec::new(),
            next: None,
            prev: None,
        }
    }
}
