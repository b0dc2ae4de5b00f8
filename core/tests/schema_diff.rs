//! End-to-end coverage over two disposable Postgres containers: seeds a
//! baseline schema into each, diverges the target, and runs the full
//! `Engine::compare` pipeline against it. Requires Docker, so these are
//! gated behind the `integration-tests` feature and ignored by default.

#![cfg(feature = "integration-tests")]

use std::path::PathBuf;
use std::time::Duration;

use pgschema_diff_core::{Engine, NullProgressReporter};
use pgschema_diff_types::{
    AppConfig, ComparisonConfig, DatabaseConfig, OutputConfig, PostgresRequirementsConfig, SslMode, SystemConfig,
};
use secrecy::SecretString;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;

async fn seed(port: u16, statements: &str) {
    let (client, connection) = tokio_postgres::Config::new()
        .host("127.0.0.1")
        .port(port)
        .user("postgres")
        .password("postgres")
        .dbname("postgres")
        .connect(tokio_postgres::NoTls)
        .await
        .expect("connecting to seed the container");
    tokio::spawn(async move {
        let _ = connection.await;
    });
    client.batch_execute(statements).await.expect("seeding schema");
}

async fn database_config(port: u16) -> DatabaseConfig {
    DatabaseConfig {
        host: "127.0.0.1".to_string(),
        port,
        database: "postgres".to_string(),
        username: "postgres".to_string(),
        password: SecretString::from("postgres".to_string()),
        schema: "public".to_string(),
        connect_timeout: Duration::from_secs(10),
        ssl_mode: SslMode::Disable,
        ssl_cert_path: None,
        ssl_key_path: None,
        ssl_ca_path: None,
    }
}

fn app_config(source: DatabaseConfig, target: DatabaseConfig, output_dir: PathBuf) -> AppConfig {
    AppConfig {
        source,
        target,
        output: OutputConfig {
            directory: output_dir,
            ..OutputConfig::default()
        },
        comparison: ComparisonConfig::default(),
        system: SystemConfig::default(),
        postgres: PostgresRequirementsConfig::default(),
    }
}

async fn start_container() -> (ContainerAsync<Postgres>, u16) {
    let container = Postgres::default().start().await.expect("starting postgres container");
    let port = container.get_host_port_ipv4(5432).await.expect("mapped port");
    (container, port)
}

const BASELINE_DDL: &str = "
    CREATE TABLE accounts (
        id serial PRIMARY KEY,
        email text NOT NULL,
        balance numeric(10, 2) NOT NULL DEFAULT 0
    );
    CREATE INDEX accounts_email_idx ON accounts (email);
";

#[tokio::test]
#[ignore = "requires docker"]
async fn identical_schemas_produce_no_changes() {
    let (_source_container, source_port) = start_container().await;
    let (_target_container, target_port) = start_container().await;
    seed(source_port, BASELINE_DDL).await;
    seed(target_port, BASELINE_DDL).await;

    let dir = tempfile_dir("no-changes");
    let config = app_config(database_config(source_port).await, database_config(target_port).await, dir);
    let engine = Engine::new(&config);
    let outcome = engine.compare(&config, &NullProgressReporter).await.expect("comparison succeeds");

    assert_eq!(outcome.diff.total_changes(), 0);
    assert!(outcome.reports.iter().all(|r| r.result.is_ok()));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn widened_column_and_added_column_are_reported() {
    let (_source_container, source_port) = start_container().await;
    let (_target_container, target_port) = start_container().await;
    seed(source_port, BASELINE_DDL).await;
    seed(
        target_port,
        "
        CREATE TABLE accounts (
            id serial PRIMARY KEY,
            email text NOT NULL,
            balance numeric(12, 2) NOT NULL DEFAULT 0,
            nickname text
        );
        CREATE INDEX accounts_email_idx ON accounts (email);
        ",
    )
    .await;

    let dir = tempfile_dir("widen-and-add");
    let config = app_config(database_config(source_port).await, database_config(target_port).await, dir);
    let engine = Engine::new(&config);
    let outcome = engine.compare(&config, &NullProgressReporter).await.expect("comparison succeeds");

    assert_eq!(outcome.diff.columns.added.len(), 1);
    assert_eq!(outcome.diff.columns.added[0].name, "nickname");
    let widened = outcome
        .diff
        .columns
        .modified
        .iter()
        .find(|m| m.item.name == "balance")
        .expect("balance column reported as modified");
    assert!(widened.changes.contains_key("numeric_precision"));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn an_added_tables_columns_appear_in_both_the_table_and_the_flat_column_bucket() {
    let (_source_container, source_port) = start_container().await;
    let (_target_container, target_port) = start_container().await;
    seed(source_port, BASELINE_DDL).await;
    seed(
        target_port,
        &format!(
            "{BASELINE_DDL}
            CREATE TABLE sessions (
                id uuid PRIMARY KEY,
                account_id integer NOT NULL REFERENCES accounts (id)
            );"
        ),
    )
    .await;

    let dir = tempfile_dir("table-added");
    let config = app_config(database_config(source_port).await, database_config(target_port).await, dir);
    let engine = Engine::new(&config);
    let outcome = engine.compare(&config, &NullProgressReporter).await.expect("comparison succeeds");

    assert_eq!(outcome.diff.tables.added.len(), 1);
    assert_eq!(outcome.diff.tables.added[0].name, "sessions");
    let sessions_columns: Vec<_> = outcome.diff.columns.added.iter().filter(|c| c.table_name == "sessions").collect();
    assert_eq!(sessions_columns.len(), 2);
    assert!(outcome.diff.tables.modified.is_empty());
    assert!(outcome.diff.table_diffs.iter().all(|d| d.table_name != "sessions"));
}

fn tempfile_dir(label: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push(format!("pgschema-diff-it-{label}"));
    dir
}
