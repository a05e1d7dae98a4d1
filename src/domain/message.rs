//! Messages exchanged between agents.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::agents::Role;

/// A message sent by one agent to another role (or to everyone)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier for this message
    pub id: Uuid,

    /// Role of the sending agent
    pub sender: Role,

    /// Addressee
    pub recipient: Recipient,

    /// Human-readable body
    pub content: String,

    /// Structured payload
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,

    /// When the message was created
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a message addressed to a single role
    pub fn to(sender: Role, recipient: Role, content: impl Into<String>) -> Self {
        Self::new(sender, Recipient::Role(recipient), content)
    }

    /// Create a message addressed to every role
    pub fn broadcast(sender: Role, content: impl Into<String>) -> Self {
        Self::new(sender, Recipient::Broadcast, content)
    }

    fn new(sender: Role, recipient: Recipient, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            recipient,
            content: content.into(),
            metadata: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Whether `role` should receive this message. Senders never receive
    /// their own broadcasts.
    pub fn is_addressed_to(&self, role: Role) -> bool {
        match self.recipient {
            Recipient::Role(r) => r == role,
            Recipient::Broadcast => self.sender != role,
        }
    }
}

/// Message addressee
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recipient {
    Role(Role),
    Broadcast,
}
