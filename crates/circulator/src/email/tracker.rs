//! In-memory delivery status per dispatch.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::db::Recipient;
use crate::sanitize::mask_email;

/// Dispatches kept before the oldest is evicted.
pub const DEFAULT_RETAINED_DISPATCHES: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum DeliveryStatus {
    Queued,
    Sent,
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipientDelivery {
    pub name: String,
    /// Masked address.
    pub email: String,
    pub status: DeliveryStatus,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryCounts {
    pub queued: usize,
    pub sent: usize,
    pub failed: usize,
}

/// One circular sent to a set of recipients.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchRecord {
    pub id: Uuid,
    pub departments: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub counts: DeliveryCounts,
    pub recipients: Vec<RecipientDelivery>,
}

impl DispatchRecord {
    fn recount(&mut self) {
        let mut counts = DeliveryCounts::default();
        for delivery in &self.recipients {
            match delivery.status {
                DeliveryStatus::Queued => counts.queued += 1,
                DeliveryStatus::Sent => counts.sent += 1,
                DeliveryStatus::Failed { .. } => counts.failed += 1,
            }
        }
        self.counts = counts;
    }

    /// True once no recipient is still queued.
    pub fn is_complete(&self) -> bool {
        self.counts.queued == 0
    }
}

struct TrackerState {
    records: HashMap<Uuid, DispatchRecord>,
    order: VecDeque<Uuid>,
}

/// Thread-safe registry that delivery workers report into.
pub struct DeliveryTracker {
    state: RwLock<TrackerState>,
    capacity: usize,
}

impl DeliveryTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: RwLock::new(TrackerState {
                records: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity: capacity.max(1),
        }
    }

    /// Registers a dispatch with every recipient queued.
    pub fn create(&self, departments: Vec<String>, recipients: &[Recipient]) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let mut record = DispatchRecord {
            id,
            departments,
            created_at: now,
            counts: DeliveryCounts::default(),
            recipients: recipients
                .iter()
                .map(|r| RecipientDelivery {
                    name: r.name.clone(),
                    email: mask_email(&r.email),
                    status: DeliveryStatus::Queued,
                    updated_at: now,
                })
                .collect(),
        };
        record.recount();

        let mut state = self.write_state();
        state.records.insert(id, record);
        state.order.push_back(id);
        while state.order.len() > self.capacity {
            if let Some(evicted) = state.order.pop_front() {
                state.records.remove(&evicted);
            }
        }
        id
    }

    /// Records the outcome for the recipient at `index`. Unknown ids (for
    /// example evicted dispatches) are ignored.
    pub fn update(&self, id: Uuid, index: usize, status: DeliveryStatus) {
        let mut state = self.write_state();
        if let Some(record) = state.records.get_mut(&id) {
            if let Some(delivery) = record.recipients.get_mut(index) {
                delivery.status = status;
                delivery.updated_at = Utc::now();
                record.recount();
            }
        }
    }

    pub fn get(&self, id: Uuid) -> Option<DispatchRecord> {
        self.read_state().records.get(&id).cloned()
    }

    /// Up to `limit` records, newest first.
    pub fn recent(&self, limit: usize) -> Vec<DispatchRecord> {
        let state = self.read_state();
        state
            .order
            .iter()
            .rev()
            .take(limit)
            .filter_map(|id| state.records.get(id).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read_state().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // A panic while holding the lock cannot leave a record half-written in
    // a way later readers care about, so poisoning is ignored.
    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, TrackerState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, TrackerState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for DeliveryTracker {
    fn default() -> Self {
        Self::new(DEFAULT_RETAINED_DISPATCHES)
    }
}
