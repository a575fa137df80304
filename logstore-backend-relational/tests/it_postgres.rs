mod common;

use logstore_backend_relational::PostgresDriver;
use logstore_conformance::{
    assert_attempt_round_trip_and_determinism, assert_cross_tenant_read_contains_both,
    assert_event_back_and_forth_stable, assert_returned_event_is_a_detached_copy,
    assert_tenant_isolated, entry, s1_basic_pagination, s2_idempotent_concurrent_insert,
    s3_time_boundary, s4_tenant_isolation_on_retrieve, s5_cursor_version_mismatch,
    s6_cross_endpoint_rejection, sample_attempt, sample_event,
};
use logstore_core::model::{AttemptStatus, ListAttemptRequest, ListEventRequest};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn postgres_s1_basic_pagination() {
    logstore_conformance::init_tracing();
    let url = common::get_test_database_url().await;
    let driver = PostgresDriver::connect(&url).await.expect("connect+migrate");
    s1_basic_pagination(&driver, "pg-tenant-s1", 1_700_000_000_000)
        .await
        .expect("s1");
}

#[tokio::test]
async fn postgres_s2_idempotent_concurrent_insert() {
    logstore_conformance::init_tracing();
    let url = common::get_test_database_url().await;
    let driver = Arc::new(PostgresDriver::connect(&url).await.expect("connect+migrate"));
    let flush_driver = driver.clone();
    s2_idempotent_concurrent_insert(driver, "pg-tenant-s2", || async move {
        flush_driver.flush_writes().await
    })
    .await
    .expect("s2");
}

#[tokio::test]
async fn postgres_s3_time_boundary() {
    logstore_conformance::init_tracing();
    let url = common::get_test_database_url().await;
    let driver = PostgresDriver::connect(&url).await.expect("connect+migrate");
    s3_time_boundary(&driver, "pg-tenant-s3", 1_700_000_000_000)
        .await
        .expect("s3");
}

#[tokio::test]
async fn postgres_s4_tenant_isolation_on_retrieve() {
    logstore_conformance::init_tracing();
    let url = common::get_test_database_url().await;
    let driver = PostgresDriver::connect(&url).await.expect("connect+migrate");
    s4_tenant_isolation_on_retrieve(&driver, "pg-tenant-s4-a", "pg-tenant-s4-b")
        .await
        .expect("s4");
}

#[tokio::test]
async fn postgres_s5_cursor_version_mismatch() {
    logstore_conformance::init_tracing();
    let url = common::get_test_database_url().await;
    let driver = PostgresDriver::connect(&url).await.expect("connect+migrate");
    s5_cursor_version_mismatch(&driver, "pg-tenant-s5").await.expect("s5");
}

#[tokio::test]
async fn postgres_s6_cross_endpoint_rejection() {
    logstore_conformance::init_tracing();
    let url = common::get_test_database_url().await;
    let driver = PostgresDriver::connect(&url).await.expect("connect+migrate");
    s6_cross_endpoint_rejection(&driver, "pg-tenant-s6").await.expect("s6");
}

#[tokio::test]
async fn postgres_invariants_tenant_isolation_and_cursor_properties() {
    logstore_conformance::init_tracing();
    let url = common::get_test_database_url().await;
    let driver = PostgresDriver::connect(&url).await.expect("connect+migrate");

    let tenant_a = "pg-tenant-inv-a";
    let tenant_b = "pg-tenant-inv-b";
    let base = 1_700_100_000_000i64;

    let mut entries = Vec::new();
    for i in 0..4i64 {
        let event = sample_event(tenant_a, &format!("evt-inv-a-{i}"), base + i * 1_000, "orders");
        let attempt = sample_attempt(
            &format!("evt-inv-a-{i}"),
            tenant_a,
            &format!("att-inv-a-{i}"),
            base + i * 1_000,
            AttemptStatus::Success,
        );
        entries.push(entry(event, attempt));
    }
    let event_b = sample_event(tenant_b, "evt-inv-b-0", base, "orders");
    let attempt_b = sample_attempt("evt-inv-b-0", tenant_b, "att-inv-b-0", base, AttemptStatus::Success);
    entries.push(entry(event_b, attempt_b));
    driver.insert_many(entries, CancellationToken::new()).await.expect("insert");

    let tenant_a_only = driver
        .list_event(
            ListEventRequest { tenant_id: tenant_a.to_string(), ..Default::default() },
            CancellationToken::new(),
        )
        .await
        .expect("list tenant a");
    assert_tenant_isolated(&tenant_a_only.items, tenant_a).expect("tenant isolation");

    let cross_tenant = driver
        .list_event(
            ListEventRequest { tenant_id: String::new(), ..Default::default() },
            CancellationToken::new(),
        )
        .await
        .expect("cross-tenant list");
    assert_cross_tenant_read_contains_both(&cross_tenant.items, tenant_a, tenant_b)
        .expect("cross-tenant read");

    let paged_request = ListEventRequest {
        tenant_id: tenant_a.to_string(),
        limit: 2,
        ..Default::default()
    };
    assert_event_back_and_forth_stable(&driver, paged_request.clone())
        .await
        .expect("back and forth");
    assert_returned_event_is_a_detached_copy(&driver, paged_request)
        .await
        .expect("detached copy");

    let attempt_request = ListAttemptRequest {
        tenant_id: tenant_a.to_string(),
        limit: 2,
        ..Default::default()
    };
    assert_attempt_round_trip_and_determinism(&driver, attempt_request)
        .await
        .expect("attempt round trip");
}
