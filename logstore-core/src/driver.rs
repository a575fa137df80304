//! The driver contract (spec §4.1, component C3): the polymorphic surface every
//! backend implements. Inputs are plain data; results are plain data; errors are
//! tagged (spec §7). This is the only stable interface in the system (spec §6) —
//! the in-memory, relational, and columnar backends, and the conformance suite,
//! all speak to this trait and nothing else.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::errors::StoreError;
use crate::model::{
    AttemptRecord, Event, InsertEntry, ListAttemptRequest, ListEventRequest, ListResult,
};

/// All driver operations accept a cancellation token in place of their own timeout
/// (spec §5 "Timeouts": "Drivers MUST NOT impose their own shorter timeout"). Callers
/// that want a deadline race `token.cancelled()` against their own `tokio::time::sleep`
/// and cancel the token; drivers are required to notice promptly and abort the
/// underlying query with no partial commit side effects.
#[async_trait]
pub trait LogStoreDriver: Send + Sync + 'static {
    /// Idempotent batched ingestion (spec §4.1, §4.4). Empty input is a successful
    /// no-op. Re-inserting an existing `event_id` is a no-op for the event body;
    /// re-inserting an existing `(event_id, attempt_id)` merges the mutable attempt
    /// fields (`status`, `code`, `response_data`), last-write-wins.
    async fn insert_many(
        &self,
        entries: Vec<InsertEntry>,
        cancel: CancellationToken,
    ) -> Result<(), StoreError>;

    /// List Events (spec §4.1). Ordered by `(event.time, event.id)` in `sort_order`.
    async fn list_event(
        &self,
        request: ListEventRequest,
        cancel: CancellationToken,
    ) -> Result<ListResult<Event>, StoreError>;

    /// List Attempts, joined with their Event (spec §4.1). Ordered by
    /// `(attempt.time, attempt.id)` in `sort_order`.
    async fn list_attempt(
        &self,
        request: ListAttemptRequest,
        cancel: CancellationToken,
    ) -> Result<ListResult<AttemptRecord>, StoreError>;

    /// Point lookup of an Event. With `destination_id` set, only returns the Event if
    /// at least one Attempt exists for that (event, destination) pair, and the
    /// returned record's `destination_id` is the supplied value rather than the
    /// publish-time field (spec §4.1).
    async fn retrieve_event(
        &self,
        tenant_id: &str,
        event_id: &str,
        destination_id: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<Option<Event>, StoreError>;

    /// Point lookup of an Attempt paired with its Event (spec §4.1).
    async fn retrieve_attempt(
        &self,
        tenant_id: &str,
        attempt_id: &str,
        cancel: CancellationToken,
    ) -> Result<Option<AttemptRecord>, StoreError>;
}
