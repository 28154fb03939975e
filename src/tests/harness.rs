//! Shared pgvector container and per-test schema isolation.

use std::sync::OnceLock;

use testcontainers_modules::testcontainers::{
    ContainerAsync, GenericImage, ImageExt,
    core::{ContainerPort, WaitFor},
    runners::AsyncRunner,
};
use tokio::sync::OnceCell;

use crate::config::{PostgresConfig, PostgresSslMode};

/// Shared container state - initialized once per test run
struct SharedPgvectorContainer {
    #[allow(dead_code)] // Test infrastructure: keeps container alive
    container: ContainerAsync<GenericImage>,
    host: String,
    port: u16,
}

static SHARED_CONTAINER: OnceLock<OnceCell<SharedPgvectorContainer>> = OnceLock::new();

async fn get_shared_container() -> &'static SharedPgvectorContainer {
    let cell = SHARED_CONTAINER.get_or_init(OnceCell::new);
    cell.get_or_init(|| async {
        let container = GenericImage::new("pgvector/pgvector", "pg17")
            .with_exposed_port(ContainerPort::Tcp(5432))
            .with_wait_for(WaitFor::message_on_stderr(
                "database system is ready to accept connections",
            ))
            .with_env_var("POSTGRES_USER", "postgres")
            .with_env_var("POSTGRES_PASSWORD", "postgres")
            .with_env_var("POSTGRES_DB", "postgres")
            .start()
            .await
            .expect("Failed to start pgvector container");

        let host = container
            .get_host()
            .await
            .expect("Failed to get host")
            .to_string();
        let port = container
            .get_host_port_ipv4(5432)
            .await
            .expect("Failed to get port");

        // Created once here; concurrent CREATE EXTENSION can race
        let admin = sqlx::postgres::PgPoolOptions::new()
            .max_connections(1)
            .connect(&format!("postgres://postgres:postgres@{host}:{port}/postgres"))
            .await
            .expect("Failed to connect to PostgreSQL for extension setup");
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&admin)
            .await
            .expect("Failed to create vector extension");
        admin.close().await;

        SharedPgvectorContainer {
            container,
            host,
            port,
        }
    })
    .await
}

/// A fresh schema in the shared container.
pub struct TestDatabase {
    pub config: PostgresConfig,
    pub schema: String,
    pub admin: sqlx::PgPool,
}

impl TestDatabase {
    /// Schema-qualified name for a relation in this test's schema.
    pub fn qualified(&self, name: &str) -> String {
        format!("{}.{}", self.schema, name)
    }
}

/// Start the shared container if needed and create an isolated schema.
///
/// Tables are addressed as `<schema>.<name>` so the facade needs no
/// search-path configuration.
pub async fn isolated_database() -> TestDatabase {
    let shared = get_shared_container().await;

    let config = PostgresConfig {
        host: shared.host.clone(),
        port: shared.port,
        database: "postgres".into(),
        user: "postgres".into(),
        password: Some("postgres".into()),
        ssl_mode: PostgresSslMode::Disable,
        max_connections: 5,
        ..Default::default()
    };

    let admin = sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect_with(config.connect_options())
        .await
        .expect("Failed to connect to PostgreSQL");

    let schema = format!("test_{}", uuid::Uuid::new_v4().simple());
    sqlx::query(&format!("CREATE SCHEMA \"{schema}\""))
        .execute(&admin)
        .await
        .expect("Failed to create test schema");

    TestDatabase {
        config,
        schema,
        admin,
    }
}
