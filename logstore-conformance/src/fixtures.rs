//! Minimal, deliberately uninteresting `Event`/`Attempt` builders so scenarios read as
//! "insert these specific rows" rather than fighting struct literals.

use std::collections::HashMap;

use logstore_core::model::{Attempt, AttemptStatus, Event, InsertEntry};

pub fn sample_event(tenant_id: &str, event_id: &str, time: i64, topic: &str) -> Event {
    Event {
        tenant_id: tenant_id.to_string(),
        event_id: event_id.to_string(),
        destination_id: "dest-default".to_string(),
        topic: topic.to_string(),
        eligible_for_retry: true,
        time,
        metadata: HashMap::new(),
        data: HashMap::new(),
    }
}

pub fn sample_attempt(
    event_id: &str,
    tenant_id: &str,
    attempt_id: &str,
    time: i64,
    status: AttemptStatus,
) -> Attempt {
    Attempt {
        attempt_id: attempt_id.to_string(),
        event_id: event_id.to_string(),
        tenant_id: tenant_id.to_string(),
        destination_id: "dest-default".to_string(),
        attempt_number: 1,
        manual: false,
        status,
        time,
        code: String::new(),
        response_data: HashMap::new(),
    }
}

pub fn entry(event: Event, attempt: Attempt) -> InsertEntry {
    InsertEntry { event, attempt }
}
