use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{EntityPatch, EntityStatus, ManagedEntity, NetworkInfo, SessionInfo};

// Frame envelope

/// Every frame on the admin channel, in both directions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

// Server -> admin payloads

/// PC record as the control server serializes it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PcInfo {
    pub pc_id: String,
    pub status: EntityStatus,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default, with = "lenient_timestamp")]
    pub login_time: Option<DateTime<Utc>>,
    #[serde(default, with = "lenient_timestamp")]
    pub last_heartbeat: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ip_address: Option<String>,
}

/// Partial PC record carried by `pc_status_update`.
/// Outer `None`: field absent. `Some(None)`: field sent as `null`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PcStatusUpdate {
    pub pc_id: String,
    #[serde(default)]
    pub status: Option<EntityStatus>,
    #[serde(default, with = "double_option", skip_serializing_if = "Option::is_none")]
    pub username: Option<Option<String>>,
    #[serde(default, with = "double_option", skip_serializing_if = "Option::is_none")]
    pub organization: Option<Option<String>>,
    #[serde(default, with = "lenient_timestamp::patch", skip_serializing_if = "Option::is_none")]
    pub login_time: Option<Option<DateTime<Utc>>>,
    #[serde(default, with = "lenient_timestamp::patch", skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<Option<DateTime<Utc>>>,
    #[serde(default, with = "double_option", skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<Option<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PcRef {
    pub pc_id: String,
}

// Admin -> server payloads

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForceLogout {
    pub pc_id: String,
}

// Conversions into the domain model

impl From<PcInfo> for ManagedEntity {
    fn from(pc: PcInfo) -> Self {
        let session = pc.username.map(|username| SessionInfo {
            username,
            organization: pc.organization,
            login_time: pc.login_time,
        });
        let network = if pc.ip_address.is_some() || pc.last_heartbeat.is_some() {
            Some(NetworkInfo {
                ip_address: pc.ip_address,
                last_heartbeat: pc.last_heartbeat,
            })
        } else {
            None
        };

        ManagedEntity {
            id: pc.pc_id,
            status: pc.status,
            session,
            network,
        }
    }
}

impl From<&ManagedEntity> for PcInfo {
    fn from(entity: &ManagedEntity) -> Self {
        let session = entity.session.as_ref();
        let network = entity.network.as_ref();
        Self {
            pc_id: entity.id.clone(),
            status: entity.status,
            username: session.map(|s| s.username.clone()),
            organization: session.and_then(|s| s.organization.clone()),
            login_time: session.and_then(|s| s.login_time),
            last_heartbeat: network.and_then(|n| n.last_heartbeat),
            ip_address: network.and_then(|n| n.ip_address.clone()),
        }
    }
}

impl PcStatusUpdate {
    pub fn into_parts(self) -> (String, EntityPatch) {
        let patch = EntityPatch {
            status: self.status,
            username: self.username,
            organization: self.organization,
            login_time: self.login_time,
            ip_address: self.ip_address,
            last_heartbeat: self.last_heartbeat,
        };
        (self.pc_id, patch)
    }
}

/// Keeps `null` apart from a missing field; pair with `#[serde(default)]`.
mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T, S>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

/// The control server emits both RFC 3339 stamps and naive local ISO stamps
/// (`2024-03-01T09:15:00.123456`); naive values are taken as UTC.
mod lenient_timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_str(&ts.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        let Some(raw) = raw else {
            return Ok(None);
        };

        if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(Some(ts.with_timezone(&Utc)));
        }
        NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| Some(naive.and_utc()))
            .map_err(|e| de::Error::custom(format!("invalid timestamp {raw:?}: {e}")))
    }

    /// Three-way variant for partial updates
    pub mod patch {
        use chrono::{DateTime, Utc};
        use serde::{Deserializer, Serializer};

        pub fn serialize<S>(
            value: &Option<Option<DateTime<Utc>>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match value {
                Some(inner) => super::serialize(inner, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Option<DateTime<Utc>>>, D::Error>
        where
            D: Deserializer<'de>,
        {
            super::deserialize(deserializer).map(Some)
        }
    }
}
