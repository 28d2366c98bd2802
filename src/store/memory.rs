//! In-memory store adapter.
//!
//! Backs the test suite and the standalone host. All three ports live on one
//! struct so a single `Arc<MemoryStore>` can serve every service.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::lead::{InteractionKind, Lead, LeadColor, MAX_CALL_ATTEMPTS};
use crate::store::{ConnectionStore, LeadStore, TemplateStore};
use crate::templates::{MessageTemplate, TemplateChannel};
use crate::whatsapp::Connection;

#[derive(Default)]
struct LeadTable {
    docs: HashMap<Uuid, Lead>,
    by_cpf: HashMap<String, Uuid>,
}

/// In-memory implementation of every store port
#[derive(Default)]
pub struct MemoryStore {
    leads: RwLock<LeadTable>,
    connections: RwLock<HashMap<Uuid, Connection>>,
    templates: RwLock<Vec<MessageTemplate>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LeadStore for MemoryStore {
    async fn insert(&self, lead: &Lead) -> StoreResult<()> {
        let mut table = self.leads.write().await;
        if table.by_cpf.contains_key(&lead.cpf) {
            return Err(StoreError::Duplicate(lead.cpf.clone()));
        }
        table.by_cpf.insert(lead.cpf.clone(), lead.id);
        table.docs.insert(lead.id, lead.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Lead>> {
        let table = self.leads.read().await;
        Ok(table.docs.get(&id).cloned())
    }

    async fn find_by_cpf(&self, cpf: &str) -> StoreResult<Option<Lead>> {
        let table = self.leads.read().await;
        Ok(table
            .by_cpf
            .get(cpf)
            .and_then(|id| table.docs.get(id))
            .cloned())
    }

    async fn update(&self, lead: &Lead) -> StoreResult<Lead> {
        let mut table = self.leads.write().await;
        let stored = table
            .docs
            .get_mut(&lead.id)
            .ok_or(StoreError::NotFound(lead.id))?;
        if stored.version != lead.version {
            return Err(StoreError::VersionConflict {
                id: lead.id,
                expected: lead.version,
            });
        }
        let mut next = lead.clone();
        next.version += 1;
        next.updated_at = Utc::now();
        *stored = next.clone();
        Ok(next)
    }

    async fn find_due_for_call(&self, now: DateTime<Utc>, limit: usize) -> StoreResult<Vec<Lead>> {
        let table = self.leads.read().await;
        let mut due: Vec<Lead> = table
            .docs
            .values()
            .filter(|l| {
                !l.blocked
                    && !matches!(
                        l.color,
                        LeadColor::Paid | LeadColor::Complaint | LeadColor::Expired
                    )
                    && l.total_call_attempts < MAX_CALL_ATTEMPTS
                    && match l.next_call_at {
                        Some(at) => at <= now,
                        None => l.total_call_attempts == 0,
                    }
            })
            .cloned()
            .collect();

        // Option<DateTime> orders None first, which is the contract: leads
        // never scheduled go ahead of every queued recall.
        due.sort_by_key(|l| (l.list, l.next_call_at, l.created_at));
        due.truncate(limit);
        Ok(due)
    }

    async fn find_expired_proposals(&self, now: DateTime<Utc>) -> StoreResult<Vec<Lead>> {
        let table = self.leads.read().await;
        Ok(table
            .docs
            .values()
            .filter(|l| {
                l.proposal_status == Some(crate::lead::ProposalStatus::Pending)
                    && l.proposal_expires_at.map_or(false, |at| at < now)
                    && l.color != LeadColor::Expired
            })
            .cloned()
            .collect())
    }

    async fn count_by_color(&self) -> StoreResult<HashMap<LeadColor, i64>> {
        let table = self.leads.read().await;
        let mut counts = HashMap::new();
        for lead in table.docs.values() {
            *counts.entry(lead.color).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn cost_by_kind(&self) -> StoreResult<HashMap<InteractionKind, f64>> {
        let table = self.leads.read().await;
        let mut totals = HashMap::new();
        for lead in table.docs.values() {
            for entry in &lead.interactions {
                if entry.cost > 0.0 {
                    *totals.entry(entry.kind).or_insert(0.0) += entry.cost;
                }
            }
        }
        Ok(totals)
    }

    async fn count(&self) -> StoreResult<i64> {
        let table = self.leads.read().await;
        Ok(table.docs.len() as i64)
    }
}

#[async_trait]
impl ConnectionStore for MemoryStore {
    async fn insert(&self, connection: &Connection) -> StoreResult<()> {
        let mut table = self.connections.write().await;
        table.insert(connection.id, connection.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Connection>> {
        let table = self.connections.read().await;
        Ok(table.get(&id).cloned())
    }

    async fn count(&self) -> StoreResult<i64> {
        let table = self.connections.read().await;
        Ok(table.len() as i64)
    }

    async fn pick_least_loaded(&self) -> StoreResult<Option<Connection>> {
        let table = self.connections.read().await;
        Ok(table
            .values()
            .filter(|c| c.can_send())
            .min_by_key(|c| (c.daily_messages_sent, c.connection_number))
            .cloned())
    }

    async fn record_send(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<Option<Connection>> {
        let mut table = self.connections.write().await;
        let Some(conn) = table.get_mut(&id) else {
            return Ok(None);
        };
        if !conn.can_send() {
            return Ok(None);
        }
        conn.daily_messages_sent += 1;
        conn.total_messages_sent += 1;
        conn.last_message_at = Some(now);
        conn.updated_at = now;
        conn.version += 1;
        Ok(Some(conn.clone()))
    }

    async fn assign_lead(&self, id: Uuid, lead_id: Uuid) -> StoreResult<()> {
        let mut table = self.connections.write().await;
        let conn = table.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if !conn.assigned_leads.contains(&lead_id) {
            conn.assigned_leads.push(lead_id);
            conn.updated_at = Utc::now();
            conn.version += 1;
        }
        Ok(())
    }

    async fn reset_daily_counters(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut table = self.connections.write().await;
        let mut touched = 0u64;
        for conn in table.values_mut() {
            conn.daily_messages_sent = 0;
            conn.last_reset_at = Some(now);
            conn.updated_at = now;
            conn.version += 1;
            touched += 1;
        }
        Ok(touched)
    }
}

#[async_trait]
impl TemplateStore for MemoryStore {
    async fn insert(&self, template: &MessageTemplate) -> StoreResult<()> {
        let mut table = self.templates.write().await;
        table.push(template.clone());
        Ok(())
    }

    async fn active_for_channel(
        &self,
        channel: TemplateChannel,
    ) -> StoreResult<Vec<MessageTemplate>> {
        let table = self.templates.read().await;
        Ok(table
            .iter()
            .filter(|t| t.channel == channel && t.active)
            .cloned()
            .collect())
    }

    async fn count(&self) -> StoreResult<i64> {
        let table = self.templates.read().await;
        Ok(table.len() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lead::ImportRow;
    use chrono::Duration;

    fn make_lead(cpf: &str) -> Lead {
        Lead::from_import(
            &ImportRow {
                name: format!("Lead {}", cpf),
                cpf: cpf.to_string(),
                phones: vec!["+5511999990000".to_string()],
                email: String::new(),
                list: None,
            },
            None,
        )
    }

    #[tokio::test]
    async fn test_insert_and_lookup_by_cpf() {
        let store = MemoryStore::new();
        let lead = make_lead("11122233344");
        LeadStore::insert(&store, &lead).await.unwrap();

        let found = store.find_by_cpf("11122233344").await.unwrap();
        assert_eq!(found.map(|l| l.id), Some(lead.id));
        assert!(store.find_by_cpf("00000000000").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_cpf_rejected() {
        let store = MemoryStore::new();
        LeadStore::insert(&store, &make_lead("11122233344"))
            .await
            .unwrap();

        let err = LeadStore::insert(&store, &make_lead("11122233344"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_stale_update_hits_version_conflict() {
        let store = MemoryStore::new();
        let lead = make_lead("11122233344");
        LeadStore::insert(&store, &lead).await.unwrap();

        let mut copy_a = LeadStore::get(&store, lead.id).await.unwrap().unwrap();
        let mut copy_b = copy_a.clone();

        copy_a.observations.push("first writer".to_string());
        let stored = store.update(&copy_a).await.unwrap();
        assert_eq!(stored.version, lead.version + 1);

        copy_b.observations.push("second writer".to_string());
        let err = store.update(&copy_b).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { .. }));
    }

    #[tokio::test]
    async fn test_due_call_ordering() {
        let store = MemoryStore::new();
        let now = Utc::now();

        let mut early_recall = make_lead("10000000001");
        early_recall.next_call_at = Some(now - Duration::minutes(10));
        early_recall.total_call_attempts = 1;

        let mut late_recall = make_lead("10000000002");
        late_recall.next_call_at = Some(now - Duration::minutes(2));
        late_recall.total_call_attempts = 1;

        let never_called = make_lead("10000000003");

        let mut list_a = make_lead("10000000004");
        list_a.list = crate::lead::LeadList::A;

        for lead in [&early_recall, &late_recall, &never_called, &list_a] {
            LeadStore::insert(&store, lead).await.unwrap();
        }

        let due = store.find_due_for_call(now, 10).await.unwrap();
        let order: Vec<Uuid> = due.iter().map(|l| l.id).collect();
        assert_eq!(
            order,
            vec![list_a.id, never_called.id, early_recall.id, late_recall.id],
            "list A first, then unscheduled, then recalls by due time"
        );
    }

    #[tokio::test]
    async fn test_due_call_filter_excludes_terminal_and_capped() {
        let store = MemoryStore::new();
        let now = Utc::now();

        let mut paid = make_lead("20000000001");
        paid.color = LeadColor::Paid;

        let mut blocked = make_lead("20000000002");
        blocked.blocked = true;

        let mut capped = make_lead("20000000003");
        capped.total_call_attempts = MAX_CALL_ATTEMPTS;
        capped.next_call_at = Some(now - Duration::minutes(1));

        let mut future = make_lead("20000000004");
        future.next_call_at = Some(now + Duration::minutes(30));
        future.total_call_attempts = 2;

        let eligible = make_lead("20000000005");

        for lead in [&paid, &blocked, &capped, &future, &eligible] {
            LeadStore::insert(&store, lead).await.unwrap();
        }

        let due = store.find_due_for_call(now, 10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, eligible.id);
    }

    #[tokio::test]
    async fn test_record_send_saturates_and_reset_restores() {
        let store = MemoryStore::new();
        let conn = Connection::new(1, 2);
        ConnectionStore::insert(&store, &conn).await.unwrap();
        let now = Utc::now();

        assert!(store.record_send(conn.id, now).await.unwrap().is_some());
        assert!(store.record_send(conn.id, now).await.unwrap().is_some());
        assert!(
            store.record_send(conn.id, now).await.unwrap().is_none(),
            "third send must be refused at a limit of 2"
        );

        let reset = store.reset_daily_counters(now).await.unwrap();
        assert_eq!(reset, 1);
        let refreshed = ConnectionStore::get(&store, conn.id).await.unwrap().unwrap();
        assert_eq!(refreshed.daily_messages_sent, 0);
        assert_eq!(refreshed.total_messages_sent, 2, "lifetime counter survives");
        assert!(store.record_send(conn.id, now).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_assign_lead_is_idempotent() {
        let store = MemoryStore::new();
        let conn = Connection::new(1, 25);
        ConnectionStore::insert(&store, &conn).await.unwrap();
        let lead_id = Uuid::new_v4();

        store.assign_lead(conn.id, lead_id).await.unwrap();
        store.assign_lead(conn.id, lead_id).await.unwrap();

        let stored = ConnectionStore::get(&store, conn.id).await.unwrap().unwrap();
        assert_eq!(stored.assigned_leads, vec![lead_id]);
    }

    #[tokio::test]
    async fn test_pick_least_loaded_prefers_quiet_numbers() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let busy = Connection::new(1, 25);
        let quiet = Connection::new(2, 25);
        ConnectionStore::insert(&store, &busy).await.unwrap();
        ConnectionStore::insert(&store, &quiet).await.unwrap();

        for _ in 0..3 {
            store.record_send(busy.id, now).await.unwrap();
        }

        let picked = store.pick_least_loaded().await.unwrap().unwrap();
        assert_eq!(picked.id, quiet.id);
    }
}
