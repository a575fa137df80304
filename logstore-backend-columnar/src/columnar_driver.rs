//! The columnar driver (spec §4.3.3, component C6): two denormalized ClickHouse
//! tables, `events` and `attempts`, each row a full tuple of the fields needed to
//! answer a list/retrieve query with no join. The engine is a replacing/merging
//! store — identical ordering keys collapse asynchronously under background
//! compaction, so queries never force a synchronous merge and callers that need
//! exact post-write counts must go through [`ColumnarDriver::flush_writes`].

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use clickhouse::{Client, Row};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use logstore_core::cursor::{self, ATTEMPT_TAG, EVENT_TAG};
use logstore_core::model::{
    AttemptRecord, AttemptStatus, Event, InsertEntry, JsonValue, ListAttemptRequest,
    ListEventRequest, ListResult, SortOrder,
};
use logstore_core::pagination::{paginate, CompareOp};
use logstore_core::{LogStoreDriver, StoreError};

/// Maximum number of retry attempts for a failed batch insert.
const MAX_RETRIES: u32 = 3;
/// Base delay in milliseconds for exponential back-off (500ms, 1s, 2s).
const BASE_DELAY_MS: u64 = 500;

pub struct ColumnarDriver {
    client: Client,
}

impl ColumnarDriver {
    /// Connects to ClickHouse at `url`/`database` with the given credentials. Table
    /// creation is external (spec §4.3.4); this constructor only binds the client.
    pub fn connect(url: &str, database: &str, user: &str, password: &str) -> Self {
        let client = Client::default()
            .with_url(url)
            .with_database(database)
            .with_user(user)
            .with_password(password);
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Forces synchronous merge of both tables (spec §4.3.3: "Conformance tests that
    /// assert exact row counts after duplicate inserts MUST call the flush-writes hook
    /// between inserts and reads"). Never called on the hot insert/query path.
    pub async fn flush_writes(&self) {
        for table in ["events", "attempts"] {
            let sql = format!("OPTIMIZE TABLE {table} FINAL");
            if let Err(e) = self.client.query(&sql).execute().await {
                warn!(table, error = %e, "OPTIMIZE TABLE FINAL failed");
            }
        }
    }
}

/// Event-level dedup row (spec §4.3.3): one per unique `(tenant_id, event_id)` per batch.
#[derive(Debug, Clone, Serialize, Deserialize, Row)]
struct EventRow {
    tenant_id: String,
    destination_id: String,
    event_id: String,
    topic: String,
    eligible_for_retry: bool,
    event_time: i64,
    metadata: String,
    data: String,
}

/// One row per `(event, attempt)`, all fields denormalized (spec §4.3.3) so
/// `ListAttempt`/`RetrieveAttempt` never join.
#[derive(Debug, Clone, Serialize, Deserialize, Row)]
struct AttemptRow {
    tenant_id: String,
    destination_id: String,
    attempt_time: i64,
    event_id: String,
    attempt_id: String,
    attempt_number: u64,
    manual: bool,
    status: String,
    code: String,
    response_data: String,
    event_destination_id: String,
    event_topic: String,
    event_eligible_for_retry: bool,
    event_time: i64,
    event_metadata: String,
    event_data: String,
}

fn to_json_string<T: Serialize>(m: &HashMap<String, T>) -> String {
    serde_json::to_string(m).unwrap_or_else(|_| "{}".to_string())
}

fn from_json_string<T: serde::de::DeserializeOwned>(s: &str) -> HashMap<String, T> {
    serde_json::from_str(s).unwrap_or_default()
}

fn event_row(ev: &Event) -> EventRow {
    EventRow {
        tenant_id: ev.tenant_id.clone(),
        destination_id: ev.destination_id.clone(),
        event_id: ev.event_id.clone(),
        topic: ev.topic.clone(),
        eligible_for_retry: ev.eligible_for_retry,
        event_time: ev.time,
        metadata: to_json_string(&ev.metadata),
        data: to_json_string(&ev.data),
    }
}

fn attempt_row(entry: &InsertEntry) -> AttemptRow {
    AttemptRow {
        tenant_id: entry.attempt.tenant_id.clone(),
        destination_id: entry.attempt.destination_id.clone(),
        attempt_time: entry.attempt.time,
        event_id: entry.attempt.event_id.clone(),
        attempt_id: entry.attempt.attempt_id.clone(),
        attempt_number: entry.attempt.attempt_number,
        manual: entry.attempt.manual,
        status: entry.attempt.status.as_str().to_string(),
        code: entry.attempt.code.clone(),
        response_data: to_json_string(&entry.attempt.response_data),
        event_destination_id: entry.event.destination_id.clone(),
        event_topic: entry.event.topic.clone(),
        event_eligible_for_retry: entry.event.eligible_for_retry,
        event_time: entry.event.time,
        event_metadata: to_json_string(&entry.event.metadata),
        event_data: to_json_string(&entry.event.data),
    }
}

fn row_to_event(r: &EventRow) -> Event {
    Event {
        tenant_id: r.tenant_id.clone(),
        event_id: r.event_id.clone(),
        destination_id: r.destination_id.clone(),
        topic: r.topic.clone(),
        eligible_for_retry: r.eligible_for_retry,
        time: r.event_time,
        metadata: from_json_string(&r.metadata),
        data: from_json_string::<JsonValue>(&r.data),
    }
}

fn row_to_record(r: &AttemptRow) -> Result<AttemptRecord, StoreError> {
    let status = AttemptStatus::parse(&r.status)
        .ok_or_else(|| StoreError::Fatal(anyhow::anyhow!("unknown attempt status '{}'", r.status)))?;
    Ok(AttemptRecord {
        attempt: logstore_core::model::Attempt {
            attempt_id: r.attempt_id.clone(),
            event_id: r.event_id.clone(),
            tenant_id: r.tenant_id.clone(),
            destination_id: r.destination_id.clone(),
            attempt_number: r.attempt_number,
            manual: r.manual,
            status,
            time: r.attempt_time,
            code: r.code.clone(),
            response_data: from_json_string(&r.response_data),
        },
        event: Event {
            tenant_id: r.tenant_id.clone(),
            event_id: r.event_id.clone(),
            destination_id: r.event_destination_id.clone(),
            topic: r.event_topic.clone(),
            eligible_for_retry: r.event_eligible_for_retry,
            time: r.event_time,
            metadata: from_json_string(&r.event_metadata),
            data: from_json_string::<JsonValue>(&r.event_data),
        },
    })
}

/// Escapes a value for inline use inside a ClickHouse string literal. The driver
/// builds WHERE clauses by string assembly rather than positional binds, since the
/// predicate count and shape varies per request; every value that reaches SQL text
/// goes through here or through `i64`/`u64` formatting (never through raw user bytes).
fn escape_str(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

fn quoted(s: &str) -> String {
    format!("'{}'", escape_str(s))
}

fn in_list(values: &std::collections::HashSet<String>) -> String {
    let parts: Vec<String> = values.iter().map(|v| quoted(v)).collect();
    format!("({})", parts.join(", "))
}

async fn with_cancel<T, Fut>(cancel: &CancellationToken, fut: Fut) -> Result<T, StoreError>
where
    Fut: Future<Output = Result<T, StoreError>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(StoreError::Cancelled),
        res = fut => res,
    }
}

fn is_transient(msg: &str) -> bool {
    let msg = msg.to_ascii_lowercase();
    msg.contains("timed out")
        || msg.contains("timeout")
        || msg.contains("connection")
        || msg.contains("broken pipe")
        || msg.contains("too many simultaneous queries")
}

fn map_ch_error(e: clickhouse::error::Error) -> StoreError {
    let msg = e.to_string();
    if is_transient(&msg) {
        StoreError::Transient(e.into())
    } else {
        StoreError::Fatal(e.into())
    }
}

/// Batch-writes `rows` via the client's typed insert API, retrying the whole batch
/// up to [`MAX_RETRIES`] times with exponential back-off on failure (grounded on the
/// same retry shape as a raw-JSONEachRow inserter, adapted to the typed writer).
async fn insert_batch<T>(client: &Client, table: &str, rows: &[T]) -> Result<(), StoreError>
where
    T: Row + Serialize,
{
    if rows.is_empty() {
        return Ok(());
    }

    let mut last_err = None;
    for attempt in 0..MAX_RETRIES {
        let outcome: Result<(), clickhouse::error::Error> = async {
            let mut insert = client.insert(table)?;
            for row in rows {
                insert.write(row).await?;
            }
            insert.end().await
        }
        .await;

        match outcome {
            Ok(()) => return Ok(()),
            Err(e) => {
                let delay_ms = BASE_DELAY_MS * 2u64.pow(attempt);
                warn!(table, attempt, delay_ms, error = %e, "batch insert failed, retrying");
                last_err = Some(e);
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }

    Err(map_ch_error(
        last_err.expect("loop runs MAX_RETRIES >= 1 times"),
    ))
}

fn cursor_tuple_condition(time_col: &str, id_col: &str, cond: &Option<(CompareOp, String)>) -> Option<String> {
    cond.as_ref().map(|(op, pos)| {
        let (time_ms, id) = cursor::decode_position(pos).unwrap_or((0, String::new()));
        let op_str = match op {
            CompareOp::Lt => "<",
            CompareOp::Gt => ">",
        };
        format!("({time_col}, {id_col}) {op_str} ({time_ms}, {id})", id = quoted(&id))
    })
}

#[async_trait]
impl LogStoreDriver for ColumnarDriver {
    #[instrument(name = "ch.insert_many", skip(self, entries, cancel), fields(n = entries.len()))]
    async fn insert_many(
        &self,
        entries: Vec<InsertEntry>,
        cancel: CancellationToken,
    ) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }

        // Dedupe events within the batch (spec §4.4): the same event may appear in
        // many (event, attempt) pairs under multi-destination routing.
        let mut seen: HashMap<(String, String), ()> = HashMap::new();
        let mut event_rows = Vec::new();
        for entry in &entries {
            let key = (entry.event.tenant_id.clone(), entry.event.event_id.clone());
            if seen.insert(key, ()).is_none() {
                event_rows.push(event_row(&entry.event));
            }
        }
        let attempt_rows: Vec<AttemptRow> = entries.iter().map(attempt_row).collect();

        with_cancel(&cancel, async {
            insert_batch(&self.client, "events", &event_rows).await?;
            insert_batch(&self.client, "attempts", &attempt_rows).await
        })
        .await
    }

    #[instrument(name = "ch.list_event", skip(self, request, cancel), fields(tenant_id = %request.tenant_id))]
    async fn list_event(
        &self,
        request: ListEventRequest,
        cancel: CancellationToken,
    ) -> Result<ListResult<Event>, StoreError> {
        if !request.destination_ids.is_empty() {
            return Err(StoreError::UnsupportedFilter(
                "ListEvent does not support destination_ids; Event.destination_id is only \
                 the publish-time hint — use ListAttempt to filter by actual destination"
                    .into(),
            ));
        }

        let client = &self.client;
        let page = request.page.clone();
        let sort_order = request.sort_order;
        let limit = request.limit;

        let tenant_id = request.tenant_id.clone();
        let topics = request.topics.clone();
        let time_filter = request.time_filter;

        paginate(
            EVENT_TAG,
            sort_order,
            &page,
            limit,
            |ev: &Event| cursor::encode_position(ev.time, &ev.event_id),
            move |dir, cond, limit| {
                with_cancel(&cancel, async move {
                    fetch_events(client, &tenant_id, &topics, &time_filter, dir, cond, limit).await
                })
            },
        )
        .await
    }

    #[instrument(name = "ch.list_attempt", skip(self, request, cancel), fields(tenant_id = %request.tenant_id))]
    async fn list_attempt(
        &self,
        request: ListAttemptRequest,
        cancel: CancellationToken,
    ) -> Result<ListResult<AttemptRecord>, StoreError> {
        let client = &self.client;
        let page = request.page.clone();
        let sort_order = request.sort_order;
        let limit = request.limit;

        let tenant_id = request.tenant_id.clone();
        let event_id = request.event_id.clone();
        let destination_ids = request.destination_ids.clone();
        let status = request.status;
        let topics = request.topics.clone();
        let time_filter = request.time_filter;

        paginate(
            ATTEMPT_TAG,
            sort_order,
            &page,
            limit,
            |rec: &AttemptRecord| cursor::encode_position(rec.attempt.time, &rec.attempt.attempt_id),
            move |dir, cond, limit| {
                with_cancel(&cancel, async move {
                    fetch_attempts(
                        client,
                        &tenant_id,
                        &event_id,
                        &destination_ids,
                        status,
                        &topics,
                        &time_filter,
                        dir,
                        cond,
                        limit,
                    )
                    .await
                })
            },
        )
        .await
    }

    #[instrument(name = "ch.retrieve_event", skip(self, cancel), fields(tenant_id, event_id))]
    async fn retrieve_event(
        &self,
        tenant_id: &str,
        event_id: &str,
        destination_id: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<Option<Event>, StoreError> {
        with_cancel(&cancel, async {
            let mut sql = "SELECT tenant_id, destination_id, event_id, topic, eligible_for_retry, \
                event_time, metadata, data FROM events WHERE 1 = 1"
                .to_string();
            if !tenant_id.is_empty() {
                sql.push_str(&format!(" AND tenant_id = {}", quoted(tenant_id)));
            }
            sql.push_str(&format!(" AND event_id = {}", quoted(event_id)));
            sql.push_str(" ORDER BY event_time DESC LIMIT 1");

            let rows: Vec<EventRow> = self
                .client
                .query(&sql)
                .fetch_all()
                .await
                .map_err(map_ch_error)?;
            let Some(row) = rows.into_iter().next() else {
                return Ok(None);
            };
            let mut event = row_to_event(&row);

            if let Some(destination_id) = destination_id {
                let mut exists_sql = "SELECT count() FROM attempts WHERE event_id = "
                    .to_string()
                    + &quoted(event_id)
                    + " AND destination_id = "
                    + &quoted(destination_id);
                if !tenant_id.is_empty() {
                    exists_sql.push_str(&format!(" AND tenant_id = {}", quoted(tenant_id)));
                }
                let count: u64 = self
                    .client
                    .query(&exists_sql)
                    .fetch_one()
                    .await
                    .map_err(map_ch_error)?;
                if count == 0 {
                    return Ok(None);
                }
                event.destination_id = destination_id.to_string();
            }

            Ok(Some(event))
        })
        .await
    }

    #[instrument(name = "ch.retrieve_attempt", skip(self, cancel), fields(tenant_id, attempt_id))]
    async fn retrieve_attempt(
        &self,
        tenant_id: &str,
        attempt_id: &str,
        cancel: CancellationToken,
    ) -> Result<Option<AttemptRecord>, StoreError> {
        with_cancel(&cancel, async {
            let mut sql = attempt_select_columns() + " FROM attempts WHERE attempt_id = " + &quoted(attempt_id);
            if !tenant_id.is_empty() {
                sql.push_str(&format!(" AND tenant_id = {}", quoted(tenant_id)));
            }
            sql.push_str(" ORDER BY attempt_time DESC LIMIT 1");

            let rows: Vec<AttemptRow> = self
                .client
                .query(&sql)
                .fetch_all()
                .await
                .map_err(map_ch_error)?;
            match rows.into_iter().next() {
                Some(row) => row_to_record(&row).map(Some),
                None => Ok(None),
            }
        })
        .await
    }
}

fn attempt_select_columns() -> String {
    "SELECT tenant_id, destination_id, attempt_time, event_id, attempt_id, attempt_number, \
     manual, status, code, response_data, event_destination_id, event_topic, \
     event_eligible_for_retry, event_time, event_metadata, event_data"
        .to_string()
}

#[allow(clippy::too_many_arguments)]
async fn fetch_events(
    client: &Client,
    tenant_id: &str,
    topics: &std::collections::HashSet<String>,
    time_filter: &logstore_core::model::TimeFilter,
    dir: SortOrder,
    cond: Option<(CompareOp, String)>,
    limit: usize,
) -> Result<Vec<Event>, StoreError> {
    let mut sql = "SELECT tenant_id, destination_id, event_id, topic, eligible_for_retry, \
        event_time, metadata, data FROM events WHERE 1 = 1"
        .to_string();

    if !tenant_id.is_empty() {
        sql.push_str(&format!(" AND tenant_id = {}", quoted(tenant_id)));
    }
    if !topics.is_empty() {
        sql.push_str(&format!(" AND topic IN {}", in_list(topics)));
    }
    if let Some(gte) = time_filter.gte {
        sql.push_str(&format!(" AND event_time >= {gte}"));
    }
    if let Some(lte) = time_filter.lte {
        sql.push_str(&format!(" AND event_time <= {lte}"));
    }
    if let Some(gt) = time_filter.gt {
        sql.push_str(&format!(" AND event_time > {gt}"));
    }
    if let Some(lt) = time_filter.lt {
        sql.push_str(&format!(" AND event_time < {lt}"));
    }
    if let Some(c) = cursor_tuple_condition("event_time", "event_id", &cond) {
        sql.push_str(&format!(" AND {c}"));
    }

    let dir_str = match dir {
        SortOrder::Asc => "ASC",
        SortOrder::Desc => "DESC",
    };
    sql.push_str(&format!(" ORDER BY event_time {dir_str}, event_id {dir_str} LIMIT {limit}"));

    let rows: Vec<EventRow> = client.query(&sql).fetch_all().await.map_err(map_ch_error)?;
    Ok(rows.iter().map(row_to_event).collect())
}

#[allow(clippy::too_many_arguments)]
async fn fetch_attempts(
    client: &Client,
    tenant_id: &str,
    event_id: &Option<String>,
    destination_ids: &std::collections::HashSet<String>,
    status: Option<AttemptStatus>,
    topics: &std::collections::HashSet<String>,
    time_filter: &logstore_core::model::TimeFilter,
    dir: SortOrder,
    cond: Option<(CompareOp, String)>,
    limit: usize,
) -> Result<Vec<AttemptRecord>, StoreError> {
    let mut sql = attempt_select_columns() + " FROM attempts WHERE 1 = 1";

    if !tenant_id.is_empty() {
        sql.push_str(&format!(" AND tenant_id = {}", quoted(tenant_id)));
    }
    if let Some(event_id) = event_id {
        sql.push_str(&format!(" AND event_id = {}", quoted(event_id)));
    }
    if !destination_ids.is_empty() {
        sql.push_str(&format!(" AND destination_id IN {}", in_list(destination_ids)));
    }
    if let Some(status) = status {
        sql.push_str(&format!(" AND status = {}", quoted(status.as_str())));
    }
    if !topics.is_empty() {
        sql.push_str(&format!(" AND event_topic IN {}", in_list(topics)));
    }
    if let Some(gte) = time_filter.gte {
        sql.push_str(&format!(" AND attempt_time >= {gte}"));
    }
    if let Some(lte) = time_filter.lte {
        sql.push_str(&format!(" AND attempt_time <= {lte}"));
    }
    if let Some(gt) = time_filter.gt {
        sql.push_str(&format!(" AND attempt_time > {gt}"));
    }
    if let Some(lt) = time_filter.lt {
        sql.push_str(&format!(" AND attempt_time < {lt}"));
    }
    if let Some(c) = cursor_tuple_condition("attempt_time", "attempt_id", &cond) {
        sql.push_str(&format!(" AND {c}"));
    }

    let dir_str = match dir {
        SortOrder::Asc => "ASC",
        SortOrder::Desc => "DESC",
    };
    sql.push_str(&format!(
        " ORDER BY attempt_time {dir_str}, attempt_id {dir_str} LIMIT {limit}"
    ));

    let rows: Vec<AttemptRow> = client.query(&sql).fetch_all().await.map_err(map_ch_error)?;
    rows.iter().map(row_to_record).collect()
}
