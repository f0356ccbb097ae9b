//! Integration tests against real PostgreSQL.
//!
//! These tests verify that:
//! 1. Catalog queries decode against a live catalog
//! 2. Deletion order follows real foreign keys
//! 3. Generated repair scripts run cleanly and leave the data consistent
//!
//! Run with: cargo test -p pgrecon --features test-postgres --test postgres
//!
//! Note: Requires Docker to be running.

#![cfg(feature = "test-postgres")]

use camino::Utf8Path;
use pgrecon::{
    ConsolidationPolicy, Consolidator, ConstraintKind, ConstraintKinds, Context, DumpOptions,
    Executor, PgExecutor, RelationKind, RowExt, ScriptWriter, UniquenessSpec,
};
use std::time::Duration;
use testcontainers::ContainerAsync;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::postgres::Postgres;

/// Set up a PostgreSQL container and return a connected executor.
async fn setup_postgres() -> (ContainerAsync<Postgres>, PgExecutor) {
    let container = Postgres::default()
        .start()
        .await
        .expect("failed to start postgres container");
    let host = container.get_host().await.expect("container host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("postgres port not available");
    let url = format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

    // Postgres may not accept connections even after the port is open
    let mut attempts = 0;
    let max_attempts = 10;
    let exec = loop {
        attempts += 1;
        match PgExecutor::connect(&url, 4).await {
            Ok(exec) => break exec,
            Err(e) if attempts < max_attempts => {
                tracing::debug!("Connection attempt {} failed: {}, retrying...", attempts, e);
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            Err(e) => panic!(
                "failed to connect to postgres after {} attempts: {}",
                attempts, e
            ),
        }
    };

    (container, exec)
}

async fn create_test_tables(exec: &PgExecutor) {
    let conn = exec.pool().get().await.unwrap();
    conn.batch_execute(
        r#"
        CREATE TABLE "user" (
            id BIGSERIAL PRIMARY KEY,
            email TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        CREATE INDEX user_email_idx ON "user" (email);
        CREATE TABLE post (
            id BIGSERIAL PRIMARY KEY,
            user_id BIGINT NOT NULL REFERENCES "user" (id),
            title TEXT NOT NULL
        );
        CREATE TABLE comment (
            id SERIAL PRIMARY KEY,
            post_id BIGINT NOT NULL REFERENCES post (id),
            user_id BIGINT REFERENCES "user" (id),
            body TEXT,
            CHECK (length(body) < 1000)
        );
        CREATE VIEW active_user AS SELECT id, email FROM "user";
        CREATE TYPE mood AS ENUM ('calm', 'busy');
        CREATE TABLE device (
            id UUID PRIMARY KEY,
            addr INET,
            state mood NOT NULL,
            label TEXT
        );

        INSERT INTO "user" (email) VALUES ('a@x.org'), ('a@x.org'), ('b@x.org'), ('a@x.org');
        INSERT INTO post (user_id, title) VALUES (1, 'first'), (2, 'second'), (4, 'kept');
        INSERT INTO comment (post_id, user_id, body) VALUES (1, 1, 'hi'), (3, 3, 'ok');
        INSERT INTO device (id, addr, state, label) VALUES
            ('a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11', '10.0.0.1', 'calm', 'router'),
            ('b1ffcd88-8d1a-4de7-aa5c-5aa8ac270b22', NULL, 'busy', NULL);
        "#,
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn test_catalog_listings() {
    let (_container, exec) = setup_postgres().await;
    create_test_tables(&exec).await;
    let ctx = Context::new();
    let catalog = ctx.catalog(&exec);

    let tables = catalog.list_tables("public", None).await.unwrap();
    let names: Vec<_> = tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["comment", "device", "post", "user"]);
    assert!(tables.iter().all(|t| t.kind == RelationKind::OrdinaryTable));

    let with_user_id = catalog.list_tables("public", Some("user_id")).await.unwrap();
    let names: Vec<_> = with_user_id.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["comment", "post"]);

    let fks = catalog
        .list_constraints("public", Some("comment"), &ConstraintKind::Foreign.into())
        .await
        .unwrap();
    assert_eq!(fks.len(), 2);
    for fk in &fks {
        assert_eq!(fk.columns.len(), fk.foreign_columns.as_ref().unwrap().len());
        assert_eq!(fk.foreign_columns, Some(vec!["id".to_string()]));
    }

    let all = catalog
        .list_constraints("public", None, &ConstraintKinds::All)
        .await
        .unwrap();
    assert!(all.iter().any(|c| c.kind == ConstraintKind::Check));
    assert!(all.iter().any(|c| c.kind == ConstraintKind::PrimaryKey));

    let indexes = catalog.list_indexes("public").await.unwrap();
    let email = indexes
        .iter()
        .find(|i| i.index_name == "user_email_idx")
        .unwrap();
    assert_eq!(email.column_names, vec!["email".to_string()]);
    assert!(!email.is_unique);

    assert_eq!(
        catalog.primary_key("public", "user").await.unwrap(),
        vec!["id".to_string()]
    );
}

#[tokio::test]
async fn test_deletion_order_and_snapshot() {
    let (_container, exec) = setup_postgres().await;
    create_test_tables(&exec).await;
    let ctx = Context::new();
    let catalog = ctx.catalog(&exec);

    let order = catalog.deletion_order("public").await.unwrap();
    assert_eq!(order.tables, vec!["comment", "device", "post", "user"]);
    assert!(order.is_complete());

    let snapshot = catalog.snapshot("public").await.unwrap();
    assert!(snapshot.classes.contains_key("table"));
    assert!(snapshot.classes.contains_key("view"));
    assert!(snapshot.diff_indexes(&snapshot).is_empty());

    let dir = tempfile::tempdir().unwrap();
    let path = Utf8Path::from_path(dir.path()).unwrap().join("snapshot.json");
    snapshot.save(&path, false).unwrap();
    assert_eq!(pgrecon::SchemaSnapshot::load(&path).unwrap(), snapshot);
}

#[tokio::test]
async fn test_dump_streams_in_batches() {
    let (_container, exec) = setup_postgres().await;
    create_test_tables(&exec).await;
    let ctx = Context::new();
    let catalog = ctx.catalog(&exec);

    let options = DumpOptions {
        order_by: vec!["-id".to_string()],
        batch_size: 1,
        ..Default::default()
    };
    let mut ids = Vec::new();
    let count = catalog
        .dump_table("public", "user", &options, |row| {
            ids.push(row.int("id")?);
            Ok(())
        })
        .await
        .unwrap();
    assert_eq!(count, 4);
    assert_eq!(ids, vec![4, 3, 2, 1]);
}

#[tokio::test]
async fn test_dump_reads_types_without_a_decoder_as_text() {
    let (_container, exec) = setup_postgres().await;
    create_test_tables(&exec).await;
    let ctx = Context::new();
    let catalog = ctx.catalog(&exec);

    let options = DumpOptions {
        order_by: vec!["label".to_string()],
        ..Default::default()
    };
    let mut rows = Vec::new();
    catalog
        .dump_table("public", "device", &options, |row| {
            rows.push(row);
            Ok(())
        })
        .await
        .unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(
        rows[0].text("id").unwrap(),
        "a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11"
    );
    assert_eq!(rows[0].text("addr").unwrap(), "10.0.0.1");
    assert_eq!(rows[0].text("state").unwrap(), "calm");
    assert_eq!(rows[1].opt_text("addr").unwrap(), None);
    assert_eq!(rows[1].text("state").unwrap(), "busy");
}

#[tokio::test]
async fn test_delete_policy_script_applies_cleanly() {
    let (_container, exec) = setup_postgres().await;
    create_test_tables(&exec).await;
    let ctx = Context::new();

    let dir = tempfile::tempdir().unwrap();
    let out = Utf8Path::from_path(dir.path()).unwrap().join("repair");
    let writer = ScriptWriter::create(&out).unwrap();
    let consolidator = Consolidator::new(ctx.catalog(&exec), "public", ConsolidationPolicy::default());

    let rule = UniquenessSpec::new("user", ["email"]).referenced_by("user_id");
    let reports = consolidator.run(&[rule], &writer).await.unwrap();
    assert_eq!(reports[0].rows_removed, 2);

    // Dependents are listed alphabetically, so user 1's comment goes before
    // the post it hangs off.
    let script = std::fs::read_to_string(out.join("user.sql")).unwrap();
    assert!(script.contains("delete from \"public\".\"comment\" where \"user_id\" = 1;"));
    exec.pool()
        .get()
        .await
        .unwrap()
        .batch_execute(&script)
        .await
        .unwrap();

    let users = exec
        .select_many("select id from \"user\" order by id", &[])
        .await
        .unwrap();
    let ids: Vec<i64> = users.iter().map(|r| r.int("id").unwrap()).collect();
    assert_eq!(ids, vec![3, 4]);

    let posts = exec
        .select_many("select user_id from post order by id", &[])
        .await
        .unwrap();
    let owners: Vec<i64> = posts.iter().map(|r| r.int("user_id").unwrap()).collect();
    assert_eq!(owners, vec![4]);
}

#[tokio::test]
async fn test_repair_script_applies_cleanly() {
    let (_container, exec) = setup_postgres().await;
    create_test_tables(&exec).await;
    let ctx = Context::new();

    let dir = tempfile::tempdir().unwrap();
    let out = Utf8Path::from_path(dir.path()).unwrap().join("repair");
    let writer = ScriptWriter::create(&out).unwrap();
    let consolidator = Consolidator::new(
        ctx.catalog(&exec),
        "public",
        ConsolidationPolicy {
            dependents: pgrecon::DependentPolicy::Repoint,
            ..Default::default()
        },
    );

    let rule = UniquenessSpec::new("user", ["email"]).referenced_by("user_id");
    let reports = consolidator.run(&[rule], &writer).await.unwrap();
    assert_eq!(reports[0].groups, 1);
    assert_eq!(reports[0].rows_removed, 2);

    let script = std::fs::read_to_string(out.join("user.sql")).unwrap();
    exec.pool()
        .get()
        .await
        .unwrap()
        .batch_execute(&script)
        .await
        .unwrap();

    let users = exec
        .select_many("select id from \"user\" order by id", &[])
        .await
        .unwrap();
    let ids: Vec<i64> = users.iter().map(|r| r.int("id").unwrap()).collect();
    assert_eq!(ids, vec![3, 4]);

    let posts = exec
        .select_many("select user_id from post order by id", &[])
        .await
        .unwrap();
    let owners: Vec<i64> = posts.iter().map(|r| r.int("user_id").unwrap()).collect();
    assert_eq!(owners, vec![4, 4, 4]);
}
