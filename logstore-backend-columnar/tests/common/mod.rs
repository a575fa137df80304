/// Common test utilities for ClickHouse backend tests, mirroring the relational
/// driver's `tests/common/mod.rs::get_test_database_url` fast-path/testcontainers split.
use logstore_backend_columnar::ColumnarDriver;

/// Returns a connected, schema-initialized driver. Table creation is external to the
/// driver itself (spec §4.3.4), so this test harness owns the `CREATE TABLE` calls a
/// real deployment's migration tooling would.
pub async fn connected_driver() -> ColumnarDriver {
    let (url, database) = get_test_clickhouse_url().await;
    let driver = ColumnarDriver::connect(&url, &database, "default", "");
    create_schema(driver.client()).await;
    driver
}

async fn get_test_clickhouse_url() -> (String, String) {
    if let Ok(url) = std::env::var("TEST_CLICKHOUSE_URL") {
        println!("🚀 Using TEST_CLICKHOUSE_URL: {url}");
        return (url, "default".to_string());
    }
    if let Ok(url) = std::env::var("CLICKHOUSE_URL") {
        println!("🚀 Using CLICKHOUSE_URL: {url}");
        return (url, "default".to_string());
    }

    println!("🐳 No fast dev infrastructure found, using testcontainers");
    use testcontainers::runners::AsyncRunner;
    use testcontainers_modules::clickhouse::ClickHouse as ChImage;

    println!("🐳 Starting ClickHouse testcontainer...");
    let container = ChImage::default().start().await.expect("start clickhouse");
    let port = container.get_host_port_ipv4(8123).await.expect("port");
    let url = format!("http://127.0.0.1:{port}");
    println!("🐳 ClickHouse testcontainer ready at: {url}");

    (url, "default".to_string())
}

async fn create_schema(client: &clickhouse::Client) {
    client
        .query(
            "CREATE TABLE IF NOT EXISTS events (
                tenant_id String,
                destination_id String,
                event_id String,
                topic String,
                eligible_for_retry Bool,
                event_time Int64,
                metadata String,
                data String
            ) ENGINE = ReplacingMergeTree
            ORDER BY (tenant_id, destination_id, event_time, event_id)",
        )
        .execute()
        .await
        .expect("create events table");

    client
        .query(
            "CREATE TABLE IF NOT EXISTS attempts (
                tenant_id String,
                destination_id String,
                attempt_time Int64,
                event_id String,
                attempt_id String,
                attempt_number UInt64,
                manual Bool,
                status String,
                code String,
                response_data String,
                event_destination_id String,
                event_topic String,
                event_eligible_for_retry Bool,
                event_time Int64,
                event_metadata String,
                event_data String
            ) ENGINE = ReplacingMergeTree
            ORDER BY (tenant_id, destination_id, attempt_time, event_id, attempt_id)",
        )
        .execute()
        .await
        .expect("create attempts table");
}
