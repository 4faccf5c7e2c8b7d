//! Machines, wearable components and replacement logs.
//!
//! A machine either cuts blocks or polishes slabs, never both. The two
//! association kinds measure area differently:
//!
//! - block association: footprint, `length_cm * breadth_cm / 929.0304`
//! - slab association: face, `length_in * height_in / 144`

use crate::block::Block;
use crate::error::CoreError;
use crate::measure;
use crate::slab::Slab;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A block processed by a cutting machine, with the component that did the
/// work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockAssociation {
    pub block_id: String,
    pub component_id: String,
    pub length_cm: f64,
    pub breadth_cm: f64,
}

impl BlockAssociation {
    pub fn area_sqft(&self) -> Result<f64, CoreError> {
        measure::footprint_square_feet(self.length_cm, self.breadth_cm)
    }
}

/// A slab processed by a polishing machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlabAssociation {
    pub slab_id: String,
    pub component_id: String,
    pub length_in: f64,
    pub height_in: f64,
}

impl SlabAssociation {
    pub fn area_sqft(&self) -> Result<f64, CoreError> {
        measure::square_feet(Some(self.length_in), Some(self.height_in))
    }
}

/// What a machine does, with the associations it has accumulated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Capability {
    Cutting {
        #[serde(default)]
        blocks: Vec<BlockAssociation>,
    },
    Polishing {
        #[serde(default)]
        slabs: Vec<SlabAssociation>,
    },
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Cutting { .. } => "cutting",
            Capability::Polishing { .. } => "polishing",
        }
    }
}

/// A cutting or polishing machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    pub id: String,
    pub name: String,
    pub capability: Capability,
}

impl Machine {
    pub fn cutting(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            capability: Capability::Cutting { blocks: Vec::new() },
        }
    }

    pub fn polishing(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            capability: Capability::Polishing { slabs: Vec::new() },
        }
    }

    pub fn is_cutting(&self) -> bool {
        matches!(self.capability, Capability::Cutting { .. })
    }

    pub fn is_polishing(&self) -> bool {
        matches!(self.capability, Capability::Polishing { .. })
    }

    /// Associates a block with a cutting machine and returns its footprint
    /// area.
    pub fn associate_block(
        &mut self,
        block: &Block,
        component_id: impl Into<String>,
    ) -> Result<f64, CoreError> {
        let Capability::Cutting { blocks } = &mut self.capability else {
            return Err(CoreError::CapabilityMismatch {
                machine_id: self.id.clone(),
                required: "cutting",
            });
        };

        let association = BlockAssociation {
            block_id: block.id.clone(),
            component_id: component_id.into(),
            length_cm: block.dimensions.length.to_cm("length")?,
            breadth_cm: block.dimensions.breadth.to_cm("breadth")?,
        };
        let area = association.area_sqft()?;
        blocks.push(association);
        Ok(area)
    }

    /// Associates a slab with a polishing machine and returns its face area.
    pub fn associate_slab(
        &mut self,
        slab: &Slab,
        component_id: impl Into<String>,
    ) -> Result<f64, CoreError> {
        let Capability::Polishing { slabs } = &mut self.capability else {
            return Err(CoreError::CapabilityMismatch {
                machine_id: self.id.clone(),
                required: "polishing",
            });
        };

        let association = SlabAssociation {
            slab_id: slab.id.clone(),
            component_id: component_id.into(),
            length_in: slab.dimensions.length,
            height_in: slab.dimensions.height,
        };
        let area = association.area_sqft()?;
        slabs.push(association);
        Ok(area)
    }

    pub fn association_count(&self) -> usize {
        match &self.capability {
            Capability::Cutting { blocks } => blocks.len(),
            Capability::Polishing { slabs } => slabs.len(),
        }
    }

    /// Sums association areas. Recomputed from the associations on every
    /// call; nothing is cached.
    pub fn total_processed_by_machine(&self) -> Result<f64, CoreError> {
        match &self.capability {
            Capability::Cutting { blocks } => blocks.iter().map(|a| a.area_sqft()).sum(),
            Capability::Polishing { slabs } => slabs.iter().map(|a| a.area_sqft()).sum(),
        }
    }

    /// Sums association areas attributed to one component.
    pub fn total_processed_by_component(&self, component_id: &str) -> Result<f64, CoreError> {
        match &self.capability {
            Capability::Cutting { blocks } => blocks
                .iter()
                .filter(|a| a.component_id == component_id)
                .map(|a| a.area_sqft())
                .sum(),
            Capability::Polishing { slabs } => slabs
                .iter()
                .filter(|a| a.component_id == component_id)
                .map(|a| a.area_sqft())
                .sum(),
        }
    }
}

/// A wearable machine part with a rated lifetime in square feet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub id: String,
    pub machine_id: String,
    pub name: String,
    #[serde(default)]
    pub expired: bool,
    /// Rated lifetime capacity in square feet.
    pub sqf_processed: f64,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaced_at: Option<DateTime<Utc>>,
}

impl Component {
    pub fn new(
        id: impl Into<String>,
        machine_id: impl Into<String>,
        name: impl Into<String>,
        sqf_processed: f64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            machine_id: machine_id.into(),
            name: name.into(),
            expired: false,
            sqf_processed,
            created_at,
            replaced_at: None,
        }
    }
}

/// A non-component cost booked with a replacement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub description: String,
    pub amount: f64,
}

/// Record written when a component is replaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineLog {
    pub id: Uuid,
    pub machine_id: String,
    pub component_id: String,
    /// The retired component's rated capacity.
    pub sqf_processed: f64,
    /// Area the retired component actually processed.
    pub actual_processed: f64,
    pub component_cost: f64,
    pub other_expenses: Vec<Expense>,
    pub replaced_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl MachineLog {
    pub fn total_cost(&self) -> f64 {
        self.component_cost + self.other_expenses.iter().map(|e| e.amount).sum::<f64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockDimensions, BlockEvent};
    use crate::dimension::Dimension;
    use crate::slab::SlabDimensions;

    fn sample_block() -> Block {
        let dims = BlockDimensions::new(
            Dimension::cm(304.8),
            Dimension::cm(152.4),
            Dimension::cm(100.0),
        )
        .unwrap();
        Block::intake("b-1", "f-1", "B-101", "granite", dims, Utc::now())
    }

    fn sample_slab() -> Slab {
        let block = sample_block()
            .apply_transition(BlockEvent::AssignToCutting, Utc::now())
            .unwrap()
            .entity;
        let dims = SlabDimensions {
            length: 144.0,
            height: 72.0,
            thickness: 0.75,
            breadth: 60.0,
        };
        Slab::cut_from(&block, "s-1", 1, dims, Utc::now()).unwrap()
    }

    #[test]
    fn test_block_footprint_area() {
        let mut machine = Machine::cutting("m-1", "gang saw");
        let area = machine.associate_block(&sample_block(), "c-1").unwrap();
        // 10ft x 5ft
        assert!((area - 50.0).abs() < 1e-9);
        assert_eq!(machine.association_count(), 1);
    }

    #[test]
    fn test_slab_face_area() {
        let mut machine = Machine::polishing("m-2", "line polisher");
        let area = machine.associate_slab(&sample_slab(), "c-2").unwrap();
        assert_eq!(area, 72.0);
    }

    #[test]
    fn test_capability_mismatch() {
        let mut cutter = Machine::cutting("m-1", "gang saw");
        let result = cutter.associate_slab(&sample_slab(), "c-1");
        assert!(matches!(
            result,
            Err(CoreError::CapabilityMismatch { required: "polishing", .. })
        ));
        assert_eq!(cutter.association_count(), 0);

        let mut polisher = Machine::polishing("m-2", "line polisher");
        assert!(polisher.associate_block(&sample_block(), "c-2").is_err());
    }

    #[test]
    fn test_totals_follow_associations() {
        let mut machine = Machine::polishing("m-2", "line polisher");
        let slab = sample_slab();
        machine.associate_slab(&slab, "c-1").unwrap();
        machine.associate_slab(&slab, "c-2").unwrap();
        assert_eq!(machine.total_processed_by_machine().unwrap(), 144.0);
        assert_eq!(machine.total_processed_by_component("c-1").unwrap(), 72.0);

        if let Capability::Polishing { slabs } = &mut machine.capability {
            slabs.pop();
        }
        assert_eq!(machine.total_processed_by_machine().unwrap(), 72.0);
    }

    #[test]
    fn test_capability_serde_tag() {
        let machine: Machine = serde_json::from_value(serde_json::json!({
            "id": "m-1",
            "name": "gang saw",
            "capability": {"type": "cutting"}
        }))
        .unwrap();
        assert!(machine.is_cutting());
        assert_eq!(machine.capability.as_str(), "cutting");
    }

    #[test]
    fn test_log_total_cost() {
        let now = Utc::now();
        let log = MachineLog {
            id: Uuid::new_v4(),
            machine_id: "m-1".to_string(),
            component_id: "c-1".to_string(),
            sqf_processed: 1000.0,
            actual_processed: 1020.5,
            component_cost: 500.0,
            other_expenses: vec![
                Expense {
                    description: "labour".to_string(),
                    amount: 40.0,
                },
                Expense {
                    description: "transport".to_string(),
                    amount: 10.0,
                },
            ],
            replaced_at: now,
            created_at: now,
        };
        assert_eq!(log.total_cost(), 550.0);
    }
}
