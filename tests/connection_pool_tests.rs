//! WhatsApp connection pool tests
//!
//! These tests exercise pool provisioning, lead retention on a number,
//! failover when a number saturates, the daily quota and its midnight
//! reset, and tracking link rotation.

use chrono::{Duration, Utc};

use leadflow_engine::lead::{ImportRow, InteractionKind, Lead, LeadColor};
use leadflow_engine::store::{ConnectionStore, LeadStore, Stores};
use leadflow_engine::whatsapp::WhatsAppService;

/// Helper to build the service over in-memory stores with a small pool
fn pool_service(stores: &Stores, pool_size: u32, daily_limit: u32) -> WhatsAppService {
    WhatsAppService::new(
        stores.leads.clone(),
        stores.connections.clone(),
        stores.templates.clone(),
        pool_size,
        daily_limit,
    )
}

/// Helper to insert a fresh lead with one phone
async fn seed_lead(stores: &Stores, cpf: &str) -> Lead {
    let row = ImportRow {
        name: "Pool Target".to_string(),
        cpf: cpf.to_string(),
        phones: vec!["+5511988880000".to_string()],
        email: String::new(),
        list: None,
    };
    let lead = Lead::from_import(&row, Some("test"));
    stores.leads.insert(&lead).await.unwrap();
    lead
}

// ============================================================================
// Pool Provisioning Tests
// ============================================================================

#[tokio::test]
async fn test_pool_provisions_to_configured_size() {
    let stores = Stores::memory();
    let service = pool_service(&stores, 20, 25);

    let provisioned = service.initialize_pool().await.unwrap();
    assert_eq!(provisioned, 20);
    assert_eq!(stores.connections.count().await.unwrap(), 20);

    // Re-running never shrinks or duplicates
    let again = service.initialize_pool().await.unwrap();
    assert_eq!(again, 0);
    assert_eq!(stores.connections.count().await.unwrap(), 20);
}

#[tokio::test]
async fn test_pool_phones_follow_the_numbering() {
    let stores = Stores::memory();
    let service = pool_service(&stores, 3, 25);
    service.initialize_pool().await.unwrap();

    // A quiet pool picks the lowest number first
    let first = stores
        .connections
        .pick_least_loaded()
        .await
        .unwrap()
        .expect("pool has capacity");
    assert_eq!(first.connection_number, 1);
    assert_eq!(first.phone, "+5511900000001");
}

// ============================================================================
// Retention and Failover Tests
// ============================================================================

#[tokio::test]
async fn test_lead_sticks_to_its_connection() {
    let stores = Stores::memory();
    let service = pool_service(&stores, 3, 10);
    service.initialize_pool().await.unwrap();
    let lead = seed_lead(&stores, "10101010101").await;

    let first = service.send_message(lead.id).await.unwrap();
    let bound = first.lead.unwrap().whatsapp_connection_id.unwrap();

    let second = service.send_message(lead.id).await.unwrap();
    let still = second.lead.unwrap().whatsapp_connection_id.unwrap();
    assert_eq!(bound, still, "retention keeps the lead on its number");

    let connection = stores.connections.get(bound).await.unwrap().unwrap();
    assert_eq!(connection.daily_messages_sent, 2);
    assert!(
        connection.assigned_leads.contains(&lead.id),
        "assignment is recorded on the connection"
    );
}

#[tokio::test]
async fn test_failover_when_the_bound_number_saturates() {
    let stores = Stores::memory();
    let service = pool_service(&stores, 2, 2);
    service.initialize_pool().await.unwrap();
    let lead = seed_lead(&stores, "20202020202").await;

    service.send_message(lead.id).await.unwrap();
    let second = service.send_message(lead.id).await.unwrap();
    let bound = second.lead.unwrap().whatsapp_connection_id.unwrap();

    let third = service.send_message(lead.id).await.unwrap();
    assert!(third.success);
    let moved = third.lead.unwrap().whatsapp_connection_id.unwrap();
    assert_ne!(bound, moved, "a saturated number hands the lead over");

    let old = stores.connections.get(bound).await.unwrap().unwrap();
    let new = stores.connections.get(moved).await.unwrap().unwrap();
    assert_eq!(old.daily_messages_sent, 2);
    assert_eq!(new.daily_messages_sent, 1);
}

#[tokio::test]
async fn test_exhausted_pool_refuses_the_send() {
    let stores = Stores::memory();
    let service = pool_service(&stores, 1, 2);
    service.initialize_pool().await.unwrap();
    let lead = seed_lead(&stores, "30303030303").await;

    assert!(service.send_message(lead.id).await.unwrap().success);
    assert!(service.send_message(lead.id).await.unwrap().success);

    let refused = service.send_message(lead.id).await.unwrap();
    assert!(!refused.success);
    assert_eq!(refused.reason(), Some("no_available_connection"));
    assert!(refused.lead.is_none(), "refusals mutate nothing");

    let unchanged = stores.leads.get(lead.id).await.unwrap().unwrap();
    let sends = unchanged
        .interactions
        .iter()
        .filter(|i| i.kind == InteractionKind::Whatsapp)
        .count();
    assert_eq!(sends, 2);
}

// ============================================================================
// Daily Reset Tests
// ============================================================================

#[tokio::test]
async fn test_daily_reset_reopens_quota_and_keeps_lifetime_counter() {
    let stores = Stores::memory();
    let service = pool_service(&stores, 1, 2);
    service.initialize_pool().await.unwrap();
    let lead = seed_lead(&stores, "40404040404").await;

    service.send_message(lead.id).await.unwrap();
    service.send_message(lead.id).await.unwrap();
    assert!(!service.send_message(lead.id).await.unwrap().success);

    let touched = service.reset_daily_counters().await.unwrap();
    assert_eq!(touched, 1);

    let after = service.send_message(lead.id).await.unwrap();
    assert!(after.success, "a reset quota takes messages again");

    let bound = after.lead.unwrap().whatsapp_connection_id.unwrap();
    let connection = stores.connections.get(bound).await.unwrap().unwrap();
    assert_eq!(connection.daily_messages_sent, 1);
    assert_eq!(
        connection.total_messages_sent, 3,
        "the lifetime counter survives the reset"
    );
    assert!(connection.last_reset_at.is_some());
}

// ============================================================================
// Tracking Link Tests
// ============================================================================

#[tokio::test]
async fn test_link_minted_on_first_send_and_rotated_when_stale() {
    let stores = Stores::memory();
    let service = pool_service(&stores, 2, 10);
    service.initialize_pool().await.unwrap();
    let lead = seed_lead(&stores, "50505050505").await;

    // First send mints a link and charges send plus link generation
    let first = service.send_message(lead.id).await.unwrap();
    let stored = first.lead.unwrap();
    let minted = stored.whatsapp_link_id.clone().expect("link minted");
    let entry = stored
        .interactions
        .iter()
        .rfind(|i| i.kind == InteractionKind::Whatsapp)
        .unwrap();
    assert!((entry.cost - 0.09).abs() < 1e-9, "0.08 send + 0.01 link");

    // A fresh link is reused
    let second = service.send_message(lead.id).await.unwrap();
    let stored = second.lead.unwrap();
    assert_eq!(stored.whatsapp_link_id.as_deref(), Some(minted.as_str()));
    let entry = stored
        .interactions
        .iter()
        .rfind(|i| i.kind == InteractionKind::Whatsapp)
        .unwrap();
    assert!((entry.cost - 0.08).abs() < 1e-9, "no link charge on reuse");

    // Age the link past three days and send again
    let mut aged = stores.leads.get(lead.id).await.unwrap().unwrap();
    aged.whatsapp_link_generated_at = Some(Utc::now() - Duration::days(4));
    stores.leads.update(&aged).await.unwrap();

    let third = service.send_message(lead.id).await.unwrap();
    let stored = third.lead.unwrap();
    assert_ne!(
        stored.whatsapp_link_id.as_deref(),
        Some(minted.as_str()),
        "a stale link is replaced"
    );
    let entry = stored
        .interactions
        .iter()
        .rfind(|i| i.kind == InteractionKind::Whatsapp)
        .unwrap();
    assert!((entry.cost - 0.09).abs() < 1e-9);
}

// ============================================================================
// Complaint Gate Tests
// ============================================================================

#[tokio::test]
async fn test_complaint_color_blocks_whatsapp() {
    let stores = Stores::memory();
    let service = pool_service(&stores, 2, 10);
    service.initialize_pool().await.unwrap();

    let row = ImportRow {
        name: "Complainer".to_string(),
        cpf: "60606060606".to_string(),
        phones: vec!["+5511988880001".to_string()],
        email: String::new(),
        list: None,
    };
    let mut lead = Lead::from_import(&row, None);
    lead.color = LeadColor::Complaint;
    lead.blocked = true;
    stores.leads.insert(&lead).await.unwrap();

    let refused = service.send_message(lead.id).await.unwrap();
    assert!(!refused.success);
    assert_eq!(refused.reason(), Some("lead_blocked_complaint"));
}

#[tokio::test]
async fn test_missing_phone_refuses_before_touching_the_pool() {
    let stores = Stores::memory();
    let service = pool_service(&stores, 1, 1);
    service.initialize_pool().await.unwrap();

    let row = ImportRow {
        name: "No Phone".to_string(),
        cpf: "70707070707".to_string(),
        phones: vec![],
        email: String::new(),
        list: None,
    };
    let lead = Lead::from_import(&row, None);
    stores.leads.insert(&lead).await.unwrap();

    let refused = service.send_message(lead.id).await.unwrap();
    assert_eq!(refused.reason(), Some("no_phone"));

    // The single quota slot must still be free
    let pick = stores.connections.pick_least_loaded().await.unwrap();
    assert!(pick.unwrap().can_send());
}
