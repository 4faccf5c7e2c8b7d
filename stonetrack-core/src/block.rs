//! Block lifecycle.
//!
//! ```text
//! in_stock --assign_to_cutting--> in_cutting --all_slabs_cut--> cut
//! ```
//!
//! `cut` is terminal for the block itself; its slabs continue their own
//! lifecycle.

use crate::dimension::Dimension;
use crate::error::CoreError;
use crate::measure;
use crate::transition::{EntityType, TransitionRecord, Transitioned};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Block status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockStatus {
    #[default]
    InStock,
    InCutting,
    Cut,
}

impl BlockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockStatus::InStock => "in_stock",
            BlockStatus::InCutting => "in_cutting",
            BlockStatus::Cut => "cut",
        }
    }

    /// Transition table. `None` means the event is not defined in this state.
    pub fn on(self, event: BlockEvent) -> Option<BlockStatus> {
        match (self, event) {
            (BlockStatus::InStock, BlockEvent::AssignToCutting) => Some(BlockStatus::InCutting),
            (BlockStatus::InCutting, BlockEvent::AllSlabsCut) => Some(BlockStatus::Cut),
            (BlockStatus::InStock, BlockEvent::AllSlabsCut)
            | (BlockStatus::InCutting, BlockEvent::AssignToCutting)
            | (BlockStatus::Cut, _) => None,
        }
    }

    /// Whether slabs may be registered under a block in this state.
    pub fn accepts_slabs(&self) -> bool {
        matches!(self, BlockStatus::InCutting | BlockStatus::Cut)
    }
}

impl std::fmt::Display for BlockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Block lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockEvent {
    AssignToCutting,
    AllSlabsCut,
}

impl BlockEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockEvent::AssignToCutting => "assign_to_cutting",
            BlockEvent::AllSlabsCut => "all_slabs_cut",
        }
    }
}

/// Length, breadth and height as submitted; weight is always derived.
#[derive(Debug, Clone, Copy, Deserialize)]
struct RawBlockDimensions {
    length: Dimension,
    breadth: Dimension,
    height: Dimension,
}

/// Block dimensions. Weight is recomputed whenever a side changes and
/// cannot be set directly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBlockDimensions")]
pub struct BlockDimensions {
    pub length: Dimension,
    pub breadth: Dimension,
    pub height: Dimension,
    weight: Dimension,
}

impl TryFrom<RawBlockDimensions> for BlockDimensions {
    type Error = CoreError;

    fn try_from(raw: RawBlockDimensions) -> Result<Self, Self::Error> {
        Self::new(raw.length, raw.breadth, raw.height)
    }
}

impl BlockDimensions {
    pub fn new(length: Dimension, breadth: Dimension, height: Dimension) -> Result<Self, CoreError> {
        let weight = measure::estimated_weight_tons(
            length.to_inches("length")?,
            breadth.to_inches("breadth")?,
            height.to_inches("height")?,
        )?;
        Ok(Self {
            length,
            breadth,
            height,
            weight: Dimension::tons(weight),
        })
    }

    /// Derived weight in tons.
    pub fn weight(&self) -> Dimension {
        self.weight
    }

    /// Footprint (length x breadth) in square feet.
    pub fn footprint_square_feet(&self) -> Result<f64, CoreError> {
        measure::footprint_square_feet(self.length.to_cm("length")?, self.breadth.to_cm("breadth")?)
    }

    /// Volume in cubic inches, `None` while any side is unmeasured.
    pub fn volume_cubic_inches(&self) -> Result<Option<f64>, CoreError> {
        let side = |d: &Dimension, field: &'static str| -> Result<Option<f64>, CoreError> {
            if d.is_measured() {
                d.to_inches(field).map(Some)
            } else {
                Ok(None)
            }
        };
        measure::volume_cubic_inches(
            side(&self.length, "length")?,
            side(&self.breadth, "breadth")?,
            side(&self.height, "height")?,
        )
    }
}

/// A raw stone block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    pub factory_id: String,
    pub block_number: String,
    pub material: String,
    pub dimensions: BlockDimensions,
    pub status: BlockStatus,
    pub in_stock: bool,
    pub slab_ids: Vec<String>,
    /// Bumped on every successful mutation; used for optimistic concurrency.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Block {
    /// Creates a block on purchase intake.
    pub fn intake(
        id: impl Into<String>,
        factory_id: impl Into<String>,
        block_number: impl Into<String>,
        material: impl Into<String>,
        dimensions: BlockDimensions,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            factory_id: factory_id.into(),
            block_number: block_number.into(),
            material: material.into(),
            dimensions,
            status: BlockStatus::InStock,
            in_stock: true,
            slab_ids: Vec::new(),
            version: 0,
            created_at: at,
            updated_at: at,
        }
    }

    /// Replaces the measured sides and recomputes weight.
    pub fn set_dimensions(
        &mut self,
        length: Dimension,
        breadth: Dimension,
        height: Dimension,
        at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        self.dimensions = BlockDimensions::new(length, breadth, height)?;
        self.touch(at);
        Ok(())
    }

    /// Applies a lifecycle event, returning the updated block.
    pub fn apply_transition(
        &self,
        event: BlockEvent,
        at: DateTime<Utc>,
    ) -> Result<Transitioned<Block>, CoreError> {
        let to = self
            .status
            .on(event)
            .ok_or_else(|| CoreError::InvalidTransition {
                entity: EntityType::Block.as_str(),
                state: self.status.to_string(),
                event: event.as_str().to_string(),
            })?;

        let mut entity = self.clone();
        entity.status = to;
        entity.touch(at);

        let record = TransitionRecord::new(
            EntityType::Block,
            &self.id,
            self.status.as_str(),
            to.as_str(),
            event.as_str(),
            entity.version,
            at,
        );
        Ok(Transitioned { entity, record })
    }

    /// Records a slab cut from this block.
    pub(crate) fn attach_slab(
        &mut self,
        slab_id: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        if !self.status.accepts_slabs() {
            return Err(CoreError::InvalidTransition {
                entity: EntityType::Block.as_str(),
                state: self.status.to_string(),
                event: "add_slab".to_string(),
            });
        }
        self.slab_ids.push(slab_id.into());
        self.touch(at);
        Ok(())
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.version += 1;
        self.updated_at = at;
    }
}
