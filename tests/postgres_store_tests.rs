//! PostgreSQL store tests
//!
//! These tests need a reachable database and are ignored by default. Point
//! TEST_DATABASE_URL at a scratch database to run them; the schema is
//! created on connect.

use chrono::Utc;
use uuid::Uuid;

use leadflow_engine::error::StoreError;
use leadflow_engine::lead::{ImportRow, Lead};
use leadflow_engine::store::{ConnectionStore, LeadStore, Stores};
use leadflow_engine::whatsapp::Connection;

/// Helper to connect the stores to the test database
async fn setup_test_stores() -> Stores {
    let database_url = std::env::var("TEST_DATABASE_URL")
        .unwrap_or_else(|_| "postgresql://localhost/leadflow_test".to_string());

    Stores::postgres(&database_url, 1)
        .await
        .expect("Failed to connect to test database")
}

/// Helper for a unique cpf per test run
fn fresh_cpf() -> String {
    Uuid::new_v4().simple().to_string()[..11].to_string()
}

fn fresh_lead() -> Lead {
    let row = ImportRow {
        name: "Postgres Lead".to_string(),
        cpf: fresh_cpf(),
        phones: vec!["+5511955550000".to_string()],
        email: String::new(),
        list: None,
    };
    Lead::from_import(&row, Some("pg-test"))
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_lead_round_trip_bumps_the_version() {
    let stores = setup_test_stores().await;

    let lead = fresh_lead();
    stores.leads.insert(&lead).await.unwrap();

    let mut stored = stores.leads.get(lead.id).await.unwrap().unwrap();
    assert_eq!(stored.version, 0);
    assert_eq!(stored.cpf, lead.cpf);

    stored.observations.push("first touch".to_string());
    let updated = stores.leads.update(&stored).await.unwrap();
    assert_eq!(updated.version, 1);
    assert_eq!(updated.observations, vec!["first touch"]);
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_duplicate_cpf_is_rejected() {
    let stores = setup_test_stores().await;

    let lead = fresh_lead();
    stores.leads.insert(&lead).await.unwrap();

    let mut twin = fresh_lead();
    twin.cpf = lead.cpf.clone();
    let err = stores.leads.insert(&twin).await.unwrap_err();
    assert!(matches!(err, StoreError::Duplicate(_)));
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_stale_write_surfaces_a_version_conflict() {
    let stores = setup_test_stores().await;

    let lead = fresh_lead();
    stores.leads.insert(&lead).await.unwrap();

    let first = stores.leads.get(lead.id).await.unwrap().unwrap();
    let second = first.clone();

    stores.leads.update(&first).await.unwrap();
    let err = stores.leads.update(&second).await.unwrap_err();
    assert!(matches!(err, StoreError::VersionConflict { .. }));
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_record_send_stops_at_the_daily_limit() {
    let stores = setup_test_stores().await;

    let connection = Connection::new(900, 2);
    stores.connections.insert(&connection).await.unwrap();

    let now = Utc::now();
    assert!(stores
        .connections
        .record_send(connection.id, now)
        .await
        .unwrap()
        .is_some());
    assert!(stores
        .connections
        .record_send(connection.id, now)
        .await
        .unwrap()
        .is_some());

    let refused = stores
        .connections
        .record_send(connection.id, now)
        .await
        .unwrap();
    assert!(refused.is_none(), "the quota gate must hold under load");

    let stored = stores.connections.get(connection.id).await.unwrap().unwrap();
    assert_eq!(stored.daily_messages_sent, 2);
    assert_eq!(stored.total_messages_sent, 2);
}
