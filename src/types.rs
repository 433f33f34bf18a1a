use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a managed PC as reported by the control server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityStatus {
    #[serde(rename = "logged_in")]
    OnlineLoggedIn,
    #[serde(rename = "locked")]
    OnlineLocked,
    #[serde(rename = "offline")]
    Offline,
}

impl EntityStatus {
    pub fn is_online(&self) -> bool {
        !matches!(self, EntityStatus::Offline)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityStatus::OnlineLoggedIn => "logged_in",
            EntityStatus::OnlineLocked => "locked",
            EntityStatus::Offline => "offline",
        }
    }
}

impl std::fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is logged in on a PC
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub username: String,
    pub organization: Option<String>,
    pub login_time: Option<DateTime<Utc>>,
}

/// Display-only network details, never used for state decisions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub ip_address: Option<String>,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

/// One member of the fleet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedEntity {
    pub id: String,
    pub status: EntityStatus,
    pub session: Option<SessionInfo>,
    pub network: Option<NetworkInfo>,
}

impl ManagedEntity {
    pub fn new(id: impl Into<String>, status: EntityStatus) -> Self {
        Self {
            id: id.into(),
            status,
            session: None,
            network: None,
        }
    }

    pub fn with_session(mut self, session: SessionInfo) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_network(mut self, network: NetworkInfo) -> Self {
        self.network = Some(network);
        self
    }

    pub fn username(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.username.as_str())
    }
}

/// Partial update for an existing entity.
///
/// Nullable fields are three-way: `None` means "not provided" and leaves the
/// record alone, `Some(None)` means the server sent `null` and clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityPatch {
    pub status: Option<EntityStatus>,
    pub username: Option<Option<String>>,
    pub organization: Option<Option<String>>,
    pub login_time: Option<Option<DateTime<Utc>>>,
    pub ip_address: Option<Option<String>>,
    pub last_heartbeat: Option<Option<DateTime<Utc>>>,
}

impl EntityPatch {
    pub fn status(status: EntityStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Shallow merge: only provided fields change.
    pub fn apply_to(self, entity: &mut ManagedEntity) {
        if let Some(status) = self.status {
            entity.status = status;
        }

        match self.username {
            // No user means no session to hang the other session fields on
            Some(None) => entity.session = None,
            Some(Some(username)) => match entity.session.as_mut() {
                Some(session) => session.username = username,
                None => {
                    entity.session = Some(SessionInfo {
                        username,
                        organization: None,
                        login_time: None,
                    })
                }
            },
            None => {}
        }
        if let Some(session) = entity.session.as_mut() {
            if let Some(organization) = self.organization {
                session.organization = organization;
            }
            if let Some(login_time) = self.login_time {
                session.login_time = login_time;
            }
        }

        if self.ip_address.is_some() || self.last_heartbeat.is_some() {
            let network = entity.network.get_or_insert_with(NetworkInfo::default);
            if let Some(ip_address) = self.ip_address {
                network.ip_address = ip_address;
            }
            if let Some(last_heartbeat) = self.last_heartbeat {
                network.last_heartbeat = last_heartbeat;
            }
            if network.ip_address.is_none() && network.last_heartbeat.is_none() {
                entity.network = None;
            }
        }
    }
}

/// What happens to session fields the server stops mentioning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleFieldPolicy {
    /// Absent or null fields never clear data; the last known user stays visible.
    #[default]
    KeepLastKnown,
    /// Session info is dropped whenever the entity is not logged in.
    ClearOnTransition,
}

impl StaleFieldPolicy {
    pub fn normalize(&self, entity: &mut ManagedEntity) {
        if *self == StaleFieldPolicy::ClearOnTransition
            && entity.status != EntityStatus::OnlineLoggedIn
        {
            entity.session = None;
        }
    }
}

/// Counts derived from the entity set; recomputed, never set directly
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub total_count: usize,
    pub online_count: usize,
    pub logged_in_count: usize,
    pub locked_count: usize,
    pub offline_count: usize,
}

impl AggregateStats {
    pub fn compute<'a, I>(entities: I) -> Self
    where
        I: IntoIterator<Item = &'a ManagedEntity>,
    {
        let mut stats = AggregateStats::default();
        for entity in entities {
            stats.total_count += 1;
            match entity.status {
                EntityStatus::OnlineLoggedIn => {
                    stats.online_count += 1;
                    stats.logged_in_count += 1;
                }
                EntityStatus::OnlineLocked => {
                    stats.online_count += 1;
                    stats.locked_count += 1;
                }
                EntityStatus::Offline => stats.offline_count += 1,
            }
        }
        stats
    }

    /// Rounded percentage of `count` in the fleet, 0 for an empty fleet
    pub fn share(&self, count: usize) -> u8 {
        if self.total_count == 0 {
            return 0;
        }
        let pct = (count as f64 / self.total_count as f64 * 100.0).round();
        pct.clamp(0.0, 100.0) as u8
    }
}

/// Lifecycle of the admin connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kim() -> SessionInfo {
        SessionInfo {
            username: "kim".to_string(),
            organization: Some("ops".to_string()),
            login_time: None,
        }
    }

    #[test]
    fn stats_partition_the_fleet() {
        let entities = vec![
            ManagedEntity::new("1", EntityStatus::OnlineLoggedIn),
            ManagedEntity::new("2", EntityStatus::OnlineLocked),
            ManagedEntity::new("3", EntityStatus::OnlineLocked),
            ManagedEntity::new("4", EntityStatus::Offline),
        ];
        let stats = AggregateStats::compute(&entities);

        assert_eq!(stats.total_count, 4);
        assert_eq!(stats.online_count, 3);
        assert_eq!(stats.logged_in_count, 1);
        assert_eq!(stats.locked_count, 2);
        assert_eq!(stats.offline_count, 1);
        assert_eq!(stats.total_count, stats.online_count + stats.offline_count);
        assert_eq!(stats.online_count, stats.logged_in_count + stats.locked_count);
    }

    #[test]
    fn share_handles_empty_fleet() {
        let empty = AggregateStats::default();
        assert_eq!(empty.share(0), 0);

        let stats = AggregateStats {
            total_count: 3,
            online_count: 2,
            logged_in_count: 1,
            locked_count: 1,
            offline_count: 1,
        };
        assert_eq!(stats.share(stats.online_count), 67);
        assert_eq!(stats.share(stats.total_count), 100);
    }

    #[test]
    fn patch_only_touches_provided_fields() {
        let mut entity = ManagedEntity::new("A", EntityStatus::OnlineLoggedIn).with_session(kim());
        EntityPatch::status(EntityStatus::Offline).apply_to(&mut entity);

        assert_eq!(entity.status, EntityStatus::Offline);
        assert_eq!(entity.username(), Some("kim"));
        assert_eq!(entity.session.as_ref().and_then(|s| s.organization.as_deref()), Some("ops"));
    }

    #[test]
    fn patch_creates_session_for_new_user() {
        let mut entity = ManagedEntity::new("A", EntityStatus::OnlineLocked);
        let patch = EntityPatch {
            status: Some(EntityStatus::OnlineLoggedIn),
            username: Some(Some("lee".to_string())),
            organization: Some(Some("lab".to_string())),
            ip_address: Some(Some("10.0.0.7".to_string())),
            ..EntityPatch::default()
        };
        patch.apply_to(&mut entity);

        assert_eq!(entity.username(), Some("lee"));
        assert_eq!(entity.session.as_ref().and_then(|s| s.organization.as_deref()), Some("lab"));
        assert_eq!(
            entity.network.and_then(|n| n.ip_address),
            Some("10.0.0.7".to_string())
        );
    }

    #[test]
    fn null_fields_clear_what_they_name() {
        let mut entity = ManagedEntity::new("A", EntityStatus::OnlineLoggedIn)
            .with_session(kim())
            .with_network(NetworkInfo {
                ip_address: Some("10.0.0.7".to_string()),
                last_heartbeat: None,
            });
        let patch = EntityPatch {
            status: Some(EntityStatus::OnlineLocked),
            username: Some(None),
            organization: Some(None),
            login_time: Some(None),
            ip_address: Some(None),
            ..EntityPatch::default()
        };
        patch.apply_to(&mut entity);

        assert_eq!(entity.status, EntityStatus::OnlineLocked);
        assert!(entity.session.is_none());
        assert!(entity.network.is_none());
    }

    #[test]
    fn null_organization_keeps_user() {
        let mut entity = ManagedEntity::new("A", EntityStatus::OnlineLoggedIn).with_session(kim());
        let patch = EntityPatch {
            organization: Some(None),
            ..EntityPatch::default()
        };
        patch.apply_to(&mut entity);

        assert_eq!(entity.username(), Some("kim"));
        assert!(entity.session.as_ref().unwrap().organization.is_none());
    }

    #[test]
    fn clear_on_transition_drops_session_when_not_logged_in() {
        let mut entity = ManagedEntity::new("A", EntityStatus::OnlineLocked).with_session(kim());
        StaleFieldPolicy::KeepLastKnown.normalize(&mut entity);
        assert!(entity.session.is_some());

        StaleFieldPolicy::ClearOnTransition.normalize(&mut entity);
        assert!(entity.session.is_none());
    }
}
