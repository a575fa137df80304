//! The in-memory reference driver (spec §4.3.1, component C4): ground truth for the
//! conformance suite. All queries are linear scans with filter predicates, then sort,
//! then cursor-slice; all returned records are deep-copied so callers cannot mutate
//! stored state (spec §8 invariant 8).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use logstore_core::cursor::{self, ATTEMPT_TAG, EVENT_TAG};
use logstore_core::model::{
    AttemptRecord, Event, InsertEntry, ListAttemptRequest, ListEventRequest, ListResult, SortOrder,
};
use logstore_core::pagination::{paginate, CompareOp};
use logstore_core::{LogStoreDriver, StoreError};

/// Keyed by `(tenant_id, event_id)` — spec §3: "Identity: `(tenant_id, event_id)`
/// globally unique".
type EventKey = (String, String);

/// Both maps behind one lock (spec §5 "Shared resources": "a single reader-writer
/// lock around both maps") so a reader can never observe an `insert_many` batch's
/// event half written and its attempt half not yet.
#[derive(Default)]
struct State {
    events: HashMap<EventKey, Event>,
    /// Keyed by `attempt_id` alone: `RetrieveAttempt` takes no `event_id`, so
    /// `attempt_id` must be resolvable on its own (spec §4.1).
    attempts: HashMap<String, logstore_core::model::Attempt>,
}

pub struct InMemoryDriver {
    state: RwLock<State>,
}

impl InMemoryDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(State::default()),
        })
    }

    /// No-op: the in-memory driver has no write buffering to flush (spec §6).
    pub async fn flush_writes(&self) {}

    fn find_event(&self, tenant_id: &str, event_id: &str) -> Option<Event> {
        let state = self.state.read();
        if !tenant_id.is_empty() {
            return state
                .events
                .get(&(tenant_id.to_string(), event_id.to_string()))
                .cloned();
        }
        state
            .events
            .iter()
            .find(|((_, eid), _)| eid == event_id)
            .map(|(_, ev)| ev.clone())
    }
}

fn event_pos(ev: &Event) -> String {
    cursor::encode_position(ev.time, &ev.event_id)
}

fn attempt_pos(rec: &AttemptRecord) -> String {
    cursor::encode_position(rec.attempt.time, &rec.attempt.attempt_id)
}

fn sort_key_event(ev: &Event) -> String {
    cursor::encode_position(ev.time, &ev.event_id)
}

fn sort_key_attempt(rec: &AttemptRecord) -> String {
    cursor::encode_position(rec.attempt.time, &rec.attempt.attempt_id)
}

fn apply_cursor<T>(
    rows: Vec<T>,
    cond: Option<(CompareOp, String)>,
    limit: usize,
    position_of: impl Fn(&T) -> String,
) -> Vec<T> {
    rows.into_iter()
        .filter(|row| match &cond {
            None => true,
            Some((op, pos)) => {
                let row_pos = position_of(row);
                match op {
                    CompareOp::Lt => row_pos.as_str() < pos.as_str(),
                    CompareOp::Gt => row_pos.as_str() > pos.as_str(),
                }
            }
        })
        .take(limit)
        .collect()
}

fn scan_events(mut rows: Vec<Event>, dir: SortOrder, cond: Option<(CompareOp, String)>, limit: usize) -> Vec<Event> {
    rows.sort_by(|a, b| {
        let (ka, kb) = (sort_key_event(a), sort_key_event(b));
        match dir {
            SortOrder::Asc => ka.cmp(&kb),
            SortOrder::Desc => kb.cmp(&ka),
        }
    });
    apply_cursor(rows, cond, limit, sort_key_event)
}

fn scan_attempts(
    mut rows: Vec<AttemptRecord>,
    dir: SortOrder,
    cond: Option<(CompareOp, String)>,
    limit: usize,
) -> Vec<AttemptRecord> {
    rows.sort_by(|a, b| {
        let (ka, kb) = (sort_key_attempt(a), sort_key_attempt(b));
        match dir {
            SortOrder::Asc => ka.cmp(&kb),
            SortOrder::Desc => kb.cmp(&ka),
        }
    });
    apply_cursor(rows, cond, limit, sort_key_attempt)
}

#[async_trait]
impl LogStoreDriver for InMemoryDriver {
    #[instrument(name = "mem.insert_many", skip(self, entries, _cancel), fields(n = entries.len()))]
    async fn insert_many(
        &self,
        entries: Vec<InsertEntry>,
        _cancel: CancellationToken,
    ) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }

        // Dedupe events within the batch (spec §4.4): the same event_id may appear in
        // many pairs (multi-destination routing). The caller guarantees equal bodies.
        let mut events_to_write: HashMap<EventKey, Event> = HashMap::new();
        for entry in &entries {
            events_to_write
                .entry((entry.event.tenant_id.clone(), entry.event.event_id.clone()))
                .or_insert_with(|| entry.event.clone());
        }

        {
            let mut state = self.state.write();
            for (key, event) in events_to_write {
                // Write-once body: inserting the same event_id twice is a no-op.
                state.events.entry(key).or_insert(event);
            }
            for entry in entries {
                match state.attempts.get_mut(&entry.attempt.attempt_id) {
                    Some(existing) => {
                        existing.status = entry.attempt.status;
                        existing.code = entry.attempt.code;
                        existing.response_data = entry.attempt.response_data;
                    }
                    None => {
                        state.attempts.insert(entry.attempt.attempt_id.clone(), entry.attempt);
                    }
                }
            }
        }

        Ok(())
    }

    #[instrument(name = "mem.list_event", skip(self, request, _cancel), fields(tenant_id = %request.tenant_id))]
    async fn list_event(
        &self,
        request: ListEventRequest,
        _cancel: CancellationToken,
    ) -> Result<ListResult<Event>, StoreError> {
        if !request.destination_ids.is_empty() {
            return Err(StoreError::UnsupportedFilter(
                "ListEvent does not support destination_ids; Event.destination_id is only \
                 the publish-time hint — use ListAttempt to filter by actual destination"
                    .into(),
            ));
        }

        let snapshot: Vec<Event> = {
            let state = self.state.read();
            state
                .events
                .values()
                .filter(|ev| request.tenant_id.is_empty() || ev.tenant_id == request.tenant_id)
                .filter(|ev| request.topics.is_empty() || request.topics.contains(&ev.topic))
                .filter(|ev| request.time_filter.matches(ev.time))
                .cloned()
                .collect()
        };

        paginate(
            EVENT_TAG,
            request.sort_order,
            &request.page,
            request.limit,
            event_pos,
            |dir, cond, limit| async move { Ok(scan_events(snapshot, dir, cond, limit)) },
        )
        .await
    }

    #[instrument(name = "mem.list_attempt", skip(self, request, _cancel), fields(tenant_id = %request.tenant_id))]
    async fn list_attempt(
        &self,
        request: ListAttemptRequest,
        _cancel: CancellationToken,
    ) -> Result<ListResult<AttemptRecord>, StoreError> {
        let snapshot: Vec<AttemptRecord> = {
            let state = self.state.read();
            let events = &state.events;
            state
                .attempts
                .values()
                .filter_map(|a| {
                    let event = events
                        .get(&(a.tenant_id.clone(), a.event_id.clone()))
                        .cloned()?;
                    Some(AttemptRecord {
                        attempt: a.clone(),
                        event,
                    })
                })
                .filter(|rec| {
                    request.tenant_id.is_empty() || rec.attempt.tenant_id == request.tenant_id
                })
                .filter(|rec| {
                    request
                        .event_id
                        .as_ref()
                        .map(|eid| &rec.attempt.event_id == eid)
                        .unwrap_or(true)
                })
                .filter(|rec| {
                    request.destination_ids.is_empty()
                        || request.destination_ids.contains(&rec.attempt.destination_id)
                })
                .filter(|rec| {
                    request
                        .status
                        .map(|s| rec.attempt.status == s)
                        .unwrap_or(true)
                })
                .filter(|rec| request.topics.is_empty() || request.topics.contains(&rec.event.topic))
                .filter(|rec| request.time_filter.matches(rec.attempt.time))
                .collect()
        };

        paginate(
            ATTEMPT_TAG,
            request.sort_order,
            &request.page,
            request.limit,
            attempt_pos,
            |dir, cond, limit| async move { Ok(scan_attempts(snapshot, dir, cond, limit)) },
        )
        .await
    }

    #[instrument(name = "mem.retrieve_event", skip(self, _cancel), fields(tenant_id, event_id))]
    async fn retrieve_event(
        &self,
        tenant_id: &str,
        event_id: &str,
        destination_id: Option<&str>,
        _cancel: CancellationToken,
    ) -> Result<Option<Event>, StoreError> {
        let Some(mut event) = self.find_event(tenant_id, event_id) else {
            return Ok(None);
        };

        if let Some(destination_id) = destination_id {
            let has_attempt = self
                .state
                .read()
                .attempts
                .values()
                .any(|a| a.event_id == event_id && a.destination_id == destination_id);
            if !has_attempt {
                return Ok(None);
            }
            event.destination_id = destination_id.to_string();
        }

        Ok(Some(event))
    }

    #[instrument(name = "mem.retrieve_attempt", skip(self, _cancel), fields(tenant_id, attempt_id))]
    async fn retrieve_attempt(
        &self,
        tenant_id: &str,
        attempt_id: &str,
        _cancel: CancellationToken,
    ) -> Result<Option<AttemptRecord>, StoreError> {
        let Some(attempt) = self.state.read().attempts.get(attempt_id).cloned() else {
            return Ok(None);
        };
        if !tenant_id.is_empty() && attempt.tenant_id != tenant_id {
            return Ok(None);
        }
        let Some(event) = self.find_event(&attempt.tenant_id, &attempt.event_id) else {
            return Ok(None);
        };
        Ok(Some(AttemptRecord { attempt, event }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logstore_core::model::{AttemptStatus, Page};
    use std::collections::HashMap as Map;

    fn event(tenant: &str, id: &str, time: i64) -> Event {
        Event {
            tenant_id: tenant.into(),
            event_id: id.into(),
            destination_id: "dest-1".into(),
            topic: "order.created".into(),
            eligible_for_retry: true,
            time,
            metadata: Map::new(),
            data: Map::new(),
        }
    }

    fn attempt(tenant: &str, event_id: &str, id: &str, time: i64) -> logstore_core::model::Attempt {
        logstore_core::model::Attempt {
            attempt_id: id.into(),
            event_id: event_id.into(),
            tenant_id: tenant.into(),
            destination_id: "dest-1".into(),
            attempt_number: 1,
            manual: false,
            status: AttemptStatus::Success,
            time,
            code: "200".into(),
            response_data: Map::new(),
        }
    }

    #[tokio::test]
    async fn tenant_isolation_on_retrieve() {
        let driver = InMemoryDriver::new();
        driver
            .insert_many(
                vec![InsertEntry {
                    event: event("tenant-a", "evt-x", 1000),
                    attempt: attempt("tenant-a", "evt-x", "att-1", 1000),
                }],
                CancellationToken::new(),
            )
            .await
            .unwrap();

        let cross_tenant = driver
            .retrieve_event("tenant-b", "evt-x", None, CancellationToken::new())
            .await
            .unwrap();
        assert!(cross_tenant.is_none());

        let admin_read = driver
            .retrieve_event("", "evt-x", None, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(admin_read.unwrap().tenant_id, "tenant-a");
    }

    #[tokio::test]
    async fn idempotent_concurrent_insert_converges_to_one_record() {
        let driver = InMemoryDriver::new();
        let entry = InsertEntry {
            event: event("tenant-a", "evt-x", 1000),
            attempt: attempt("tenant-a", "evt-x", "att-1", 1000),
        };

        let mut handles = Vec::new();
        for _ in 0..10 {
            let driver = driver.clone();
            let entry = entry.clone();
            handles.push(tokio::spawn(async move {
                driver
                    .insert_many(vec![entry], CancellationToken::new())
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let result = driver
            .list_attempt(
                ListAttemptRequest {
                    tenant_id: "tenant-a".into(),
                    ..Default::default()
                },
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].attempt.attempt_id, "att-1");
    }

    #[tokio::test]
    async fn basic_pagination_scenario_s1() {
        let driver = InMemoryDriver::new();
        let base_time = 10_000_000i64;
        let mut entries = Vec::new();
        for i in 0..5 {
            let t = base_time - i * 3_600_000;
            entries.push(InsertEntry {
                event: event("tenant-a", &format!("evt-{i}"), t),
                attempt: attempt("tenant-a", &format!("evt-{i}"), &format!("att-{i}"), t),
            });
        }
        driver
            .insert_many(entries, CancellationToken::new())
            .await
            .unwrap();

        let mut page = Page::First;
        let mut pages = Vec::new();
        loop {
            let res = driver
                .list_attempt(
                    ListAttemptRequest {
                        tenant_id: "tenant-a".into(),
                        sort_order: SortOrder::Desc,
                        limit: 2,
                        page: page.clone(),
                        ..Default::default()
                    },
                    CancellationToken::new(),
                )
                .await
                .unwrap();
            let ids: Vec<String> = res
                .items
                .iter()
                .map(|r| r.attempt.attempt_id.clone())
                .collect();
            let has_next = res.next.is_some();
            pages.push(ids);
            match res.next {
                Some(tok) => page = Page::Next(tok),
                None => break,
            }
            if !has_next {
                break;
            }
        }
        assert_eq!(
            pages,
            vec![
                vec!["att-0".to_string(), "att-1".to_string()],
                vec!["att-2".to_string(), "att-3".to_string()],
                vec!["att-4".to_string()],
            ]
        );
    }

    #[tokio::test]
    async fn list_event_rejects_destination_ids_filter() {
        let driver = InMemoryDriver::new();
        let mut destination_ids = std::collections::HashSet::new();
        destination_ids.insert("dest-1".to_string());
        let err = driver
            .list_event(
                ListEventRequest {
                    destination_ids,
                    ..Default::default()
                },
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), logstore_core::ErrorKind::UnsupportedFilter);
    }
}
