//! Transition requests, outcomes and audit records.

use crate::block::BlockEvent;
use crate::slab::SlabEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of entity a transition applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Block,
    Slab,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Block => "block",
            EntityType::Slab => "slab",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit record emitted for every successful transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub id: Uuid,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub from_state: String,
    pub to_state: String,
    pub event: String,
    /// Entity version after the transition.
    pub version: u64,
    pub at: DateTime<Utc>,
}

impl TransitionRecord {
    pub fn new(
        entity_type: EntityType,
        entity_id: impl Into<String>,
        from_state: impl Into<String>,
        to_state: impl Into<String>,
        event: impl Into<String>,
        version: u64,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_type,
            entity_id: entity_id.into(),
            from_state: from_state.into(),
            to_state: to_state.into(),
            event: event.into(),
            version,
            at,
        }
    }
}

/// An updated entity together with the record describing the change.
#[derive(Debug, Clone)]
pub struct Transitioned<T> {
    pub entity: T,
    pub record: TransitionRecord,
}

/// A transition request as supplied by the calling layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity", rename_all = "snake_case")]
pub enum TransitionRequest {
    Block {
        id: String,
        expected_version: u64,
        event: BlockEvent,
    },
    Slab {
        id: String,
        expected_version: u64,
        event: SlabEvent,
    },
}

impl TransitionRequest {
    pub fn entity_type(&self) -> EntityType {
        match self {
            TransitionRequest::Block { .. } => EntityType::Block,
            TransitionRequest::Slab { .. } => EntityType::Slab,
        }
    }

    pub fn entity_id(&self) -> &str {
        match self {
            TransitionRequest::Block { id, .. } | TransitionRequest::Slab { id, .. } => id,
        }
    }

    pub fn expected_version(&self) -> u64 {
        match self {
            TransitionRequest::Block {
                expected_version, ..
            }
            | TransitionRequest::Slab {
                expected_version, ..
            } => *expected_version,
        }
    }
}

/// Result of applying a transition request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub new_state: String,
    pub in_stock: bool,
    pub version: u64,
    pub record: TransitionRecord,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::FaceSize;

    #[test]
    fn test_request_accessors() {
        let request = TransitionRequest::Slab {
            id: "s-1".to_string(),
            expected_version: 3,
            event: SlabEvent::Sell,
        };
        assert_eq!(request.entity_type(), EntityType::Slab);
        assert_eq!(request.entity_id(), "s-1");
        assert_eq!(request.expected_version(), 3);
    }

    #[test]
    fn test_request_from_json() {
        let request: TransitionRequest = serde_json::from_value(serde_json::json!({
            "entity": "slab",
            "id": "s-9",
            "expected_version": 1,
            "event": {"finish_polish": {"trim": {"length": 6.0, "height": 2.0}}}
        }))
        .unwrap();

        assert_eq!(
            request,
            TransitionRequest::Slab {
                id: "s-9".to_string(),
                expected_version: 1,
                event: SlabEvent::FinishPolish {
                    trim: FaceSize::new(6.0, 2.0),
                    polished_values: None,
                },
            }
        );

        let request: TransitionRequest = serde_json::from_value(serde_json::json!({
            "entity": "block",
            "id": "b-1",
            "expected_version": 0,
            "event": "assign_to_cutting"
        }))
        .unwrap();
        assert_eq!(request.entity_type(), EntityType::Block);
    }

    #[test]
    fn test_record_ids_are_unique() {
        let at = Utc::now();
        let a = TransitionRecord::new(EntityType::Block, "b-1", "in_stock", "in_cutting", "assign_to_cutting", 1, at);
        let b = TransitionRecord::new(EntityType::Block, "b-1", "in_stock", "in_cutting", "assign_to_cutting", 1, at);
        assert_ne!(a.id, b.id);
    }
}
