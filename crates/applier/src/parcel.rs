use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::naming::{GlobalAddress, LocalityId};
use crate::threads::ThreadPriority;

/// A serialized remote invocation.
///
/// The payload is the MessagePack encoding of an [`Action`](crate::Action);
/// `action` names the type so the receiving side can decode it through its
/// [`ActionRegistry`](crate::ActionRegistry).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parcel {
    /// Unique per parcel; the delivery ticket carries the same id.
    pub id: Uuid,

    pub action: String,

    pub destination: GlobalAddress,

    /// Locality the parcel was sent from.
    pub source: LocalityId,

    pub priority: ThreadPriority,

    #[serde(default)]
    pub description: String,

    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,

    pub created_at: DateTime<Utc>,
}

impl Parcel {
    pub fn new(
        action: impl Into<String>,
        destination: GlobalAddress,
        source: LocalityId,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            action: action.into(),
            destination,
            source,
            priority: ThreadPriority::Default,
            description: String::new(),
            payload,
            created_at: Utc::now(),
        }
    }

    pub fn with_priority(mut self, priority: ThreadPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Serialize the whole envelope to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}

/// Helper module for serde to handle `Vec<u8>` as raw bytes in MessagePack.
mod serde_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let bytes: &[u8] = Deserialize::deserialize(d)?;
        Ok(bytes.to_vec())
    }
}
