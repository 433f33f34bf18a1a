use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::types::{AggregateStats, EntityPatch, EntityStatus, ManagedEntity, StaleFieldPolicy};

/// Immutable view of the fleet handed to readers
#[derive(Debug, Clone, Serialize)]
pub struct FleetSnapshot {
    pub revision: u64,
    pub entities: Vec<ManagedEntity>,
    pub stats: AggregateStats,
    /// Set when a (re)connection happened and no full snapshot has arrived yet
    pub resync_pending: bool,
    pub updated_at: DateTime<Utc>,
}

impl Default for FleetSnapshot {
    fn default() -> Self {
        Self {
            revision: 0,
            entities: Vec::new(),
            stats: AggregateStats::default(),
            resync_pending: false,
            updated_at: Utc::now(),
        }
    }
}

impl FleetSnapshot {
    pub fn get(&self, id: &str) -> Option<&ManagedEntity> {
        self.entities.iter().find(|e| e.id == id)
    }

    pub fn sorted_by_id(&self) -> Vec<&ManagedEntity> {
        let mut sorted: Vec<&ManagedEntity> = self.entities.iter().collect();
        sorted.sort_by(|a, b| a.id.cmp(&b.id));
        sorted
    }

    /// Logged-in PCs with a known login time, newest first
    pub fn recent_logins(&self, limit: usize) -> Vec<LoginActivity> {
        let mut activity: Vec<LoginActivity> = self
            .entities
            .iter()
            .filter(|e| e.status == EntityStatus::OnlineLoggedIn)
            .filter_map(|e| {
                let session = e.session.as_ref()?;
                let login_time = session.login_time?;
                Some(LoginActivity {
                    pc_id: e.id.clone(),
                    username: session.username.clone(),
                    organization: session.organization.clone(),
                    login_time,
                })
            })
            .collect();

        activity.sort_by(|a, b| b.login_time.cmp(&a.login_time));
        activity.truncate(limit);
        activity
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoginActivity {
    pub pc_id: String,
    pub username: String,
    pub organization: Option<String>,
    pub login_time: DateTime<Utc>,
}

/// Canonical entity set. Owned by exactly one writer (the event dispatcher).
#[derive(Debug, Default)]
pub struct FleetStore {
    entities: Vec<ManagedEntity>,
    policy: StaleFieldPolicy,
    revision: u64,
    resync_pending: bool,
}

impl FleetStore {
    pub fn new(policy: StaleFieldPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn stats(&self) -> AggregateStats {
        AggregateStats::compute(&self.entities)
    }

    pub fn get(&self, id: &str) -> Option<&ManagedEntity> {
        self.entities.iter().find(|e| e.id == id)
    }

    /// Replace the whole fleet. Duplicate ids keep the last occurrence.
    pub fn apply_snapshot(&mut self, entities: Vec<ManagedEntity>) {
        self.entities.clear();
        for entity in entities {
            self.insert_last(entity);
        }
        self.resync_pending = false;
        self.bump();
        debug!(count = self.entities.len(), "📋 Fleet snapshot applied");
    }

    /// Insert or replace by id; the record moves to the end
    pub fn upsert(&mut self, entity: ManagedEntity) {
        self.insert_last(entity);
        self.bump();
    }

    /// Returns false when the id is unknown
    pub fn mark_offline(&mut self, id: &str) -> bool {
        let policy = self.policy;
        match self.entities.iter_mut().find(|e| e.id == id) {
            Some(entity) => {
                entity.status = EntityStatus::Offline;
                policy.normalize(entity);
                self.bump();
                true
            }
            None => false,
        }
    }

    /// Shallow merge into an existing record; returns false when the id is unknown
    pub fn merge(&mut self, id: &str, patch: EntityPatch) -> bool {
        let policy = self.policy;
        match self.entities.iter_mut().find(|e| e.id == id) {
            Some(entity) => {
                patch.apply_to(entity);
                policy.normalize(entity);
                self.bump();
                true
            }
            None => false,
        }
    }

    pub fn request_resync(&mut self) {
        if !self.resync_pending {
            self.resync_pending = true;
            self.bump();
        }
    }

    pub fn snapshot(&self) -> FleetSnapshot {
        FleetSnapshot {
            revision: self.revision,
            entities: self.entities.clone(),
            stats: self.stats(),
            resync_pending: self.resync_pending,
            updated_at: Utc::now(),
        }
    }

    fn insert_last(&mut self, mut entity: ManagedEntity) {
        self.policy.normalize(&mut entity);
        self.entities.retain(|e| e.id != entity.id);
        self.entities.push(entity);
    }

    fn bump(&mut self) {
        self.revision += 1;
    }
}
