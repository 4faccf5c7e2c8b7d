//! Slab lifecycle.
//!
//! ```text
//! in_cutting --send_to_polish--> in_polishing --finish_polish--> polished
//! polished   --sell-->           polished (in_stock: true -> false)
//! ```
//!
//! Selling is a flag flip gated on `polished`, not a status change. Payment
//! status is a separate axis and no lifecycle event touches it.

use crate::block::Block;
use crate::dimension::check;
use crate::error::CoreError;
use crate::measure::{self, Allowance, FaceSize, StageFigures};
use crate::transition::{EntityType, TransitionRecord, Transitioned};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Slab status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlabStatus {
    #[default]
    InCutting,
    InPolishing,
    Polished,
}

impl SlabStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlabStatus::InCutting => "in_cutting",
            SlabStatus::InPolishing => "in_polishing",
            SlabStatus::Polished => "polished",
        }
    }

    /// Transition table. `None` means the event is not defined in this state.
    pub fn on(self, event: &SlabEvent) -> Option<SlabStatus> {
        match (self, event) {
            (SlabStatus::InCutting, SlabEvent::SendToPolish) => Some(SlabStatus::InPolishing),
            (SlabStatus::InPolishing, SlabEvent::FinishPolish { .. }) => Some(SlabStatus::Polished),
            (SlabStatus::Polished, SlabEvent::Sell) => Some(SlabStatus::Polished),
            _ => None,
        }
    }
}

impl std::fmt::Display for SlabStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Slab lifecycle events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlabEvent {
    SendToPolish,
    FinishPolish {
        /// Material removed during polishing.
        trim: FaceSize,
        /// Measured size after polishing, if taken.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        polished_values: Option<FaceSize>,
    },
    Sell,
}

impl SlabEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlabEvent::SendToPolish => "send_to_polish",
            SlabEvent::FinishPolish { .. } => "finish_polish",
            SlabEvent::Sell => "sell",
        }
    }
}

/// Worker payment state for one processing stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
}

/// Stage a worker payment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStage {
    Cutting,
    Polishing,
}

/// Raw slab size in inches.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SlabDimensions {
    pub length: f64,
    pub height: f64,
    pub thickness: f64,
    pub breadth: f64,
}

impl SlabDimensions {
    pub fn validate(&self) -> Result<(), CoreError> {
        check("length", self.length)?;
        check("height", self.height)?;
        check("thickness", self.thickness)?;
        check("breadth", self.breadth)?;
        Ok(())
    }

    pub fn face(&self) -> FaceSize {
        FaceSize::new(self.length, self.height)
    }
}

/// A slab cut from a block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slab {
    pub id: String,
    pub block_id: String,
    pub block_number: String,
    pub slab_number: u32,
    pub dimensions: SlabDimensions,
    pub trim: FaceSize,
    pub polished_values: FaceSize,
    pub status: SlabStatus,
    pub in_stock: bool,
    pub workers_cutting_pay: f64,
    pub workers_polishing_pay: f64,
    pub cutting_payment_status: PaymentStatus,
    pub polishing_payment_status: PaymentStatus,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Slab {
    /// Creates a slab under a block that has entered cutting.
    pub fn cut_from(
        block: &Block,
        id: impl Into<String>,
        slab_number: u32,
        dimensions: SlabDimensions,
        at: DateTime<Utc>,
    ) -> Result<Self, CoreError> {
        if !block.status.accepts_slabs() {
            return Err(CoreError::InvalidTransition {
                entity: EntityType::Block.as_str(),
                state: block.status.to_string(),
                event: "add_slab".to_string(),
            });
        }
        dimensions.validate()?;

        Ok(Self {
            id: id.into(),
            block_id: block.id.clone(),
            block_number: block.block_number.clone(),
            slab_number,
            dimensions,
            trim: FaceSize::default(),
            polished_values: FaceSize::default(),
            status: SlabStatus::InCutting,
            in_stock: true,
            workers_cutting_pay: 0.0,
            workers_polishing_pay: 0.0,
            cutting_payment_status: PaymentStatus::Pending,
            polishing_payment_status: PaymentStatus::Pending,
            version: 0,
            created_at: at,
            updated_at: at,
        })
    }

    pub fn is_sold(&self) -> bool {
        !self.in_stock
    }

    /// Raw face area in square feet.
    pub fn square_feet(&self) -> Result<f64, CoreError> {
        measure::square_feet(Some(self.dimensions.length), Some(self.dimensions.height))
    }

    pub fn cutting_figures(&self, rate: f64, allowance: &Allowance) -> Result<StageFigures, CoreError> {
        measure::cutting_figures(self.dimensions.length, self.dimensions.height, rate, allowance)
    }

    /// Polishing figures from the measured polished size. Fails until the
    /// slab is polished and both polished sides are recorded.
    pub fn polishing_figures(&self, rate: f64, allowance: &Allowance) -> Result<StageFigures, CoreError> {
        self.check_polished_stage()?;
        if !(self.polished_values.length > 0.0 && self.polished_values.height > 0.0) {
            return Err(CoreError::Unmeasured {
                field: "polished_values",
            });
        }
        measure::polishing_figures(self.dimensions.face(), self.polished_values, rate, allowance)
    }

    /// Polishing figures sized from the recorded trim instead of the
    /// polished size.
    pub fn trim_figures(&self, rate: f64, allowance: &Allowance) -> Result<StageFigures, CoreError> {
        self.check_polished_stage()?;
        measure::trim_figures(self.dimensions.face(), self.trim, rate, allowance)
    }

    fn check_polished_stage(&self) -> Result<(), CoreError> {
        if self.status != SlabStatus::Polished {
            return Err(CoreError::NotPolished {
                state: self.status.to_string(),
            });
        }
        Ok(())
    }

    /// Applies a lifecycle event, returning the updated slab.
    pub fn apply_transition(
        &self,
        event: &SlabEvent,
        at: DateTime<Utc>,
    ) -> Result<Transitioned<Slab>, CoreError> {
        if let SlabEvent::Sell = event {
            if self.status != SlabStatus::Polished {
                return Err(CoreError::NotPolished {
                    state: self.status.to_string(),
                });
            }
            if !self.in_stock {
                return Err(CoreError::AlreadySold {
                    slab_id: self.id.clone(),
                });
            }
        }

        let to = self
            .status
            .on(event)
            .ok_or_else(|| CoreError::InvalidTransition {
                entity: EntityType::Slab.as_str(),
                state: self.status.to_string(),
                event: event.as_str().to_string(),
            })?;

        let mut entity = self.clone();
        match event {
            SlabEvent::SendToPolish => {}
            SlabEvent::FinishPolish {
                trim,
                polished_values,
            } => {
                self.check_trim(trim)?;
                if let Some(polished) = polished_values {
                    self.check_polished(polished)?;
                    entity.polished_values = *polished;
                }
                entity.trim = *trim;
            }
            SlabEvent::Sell => entity.in_stock = false,
        }
        entity.status = to;
        entity.touch(at);

        let record = TransitionRecord::new(
            EntityType::Slab,
            &self.id,
            self.status.as_str(),
            to.as_str(),
            event.as_str(),
            entity.version,
            at,
        );
        Ok(Transitioned { entity, record })
    }

    /// Replaces the raw size. Recorded trim and polished values must still fit.
    pub fn set_dimensions(
        &mut self,
        dimensions: SlabDimensions,
        at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        dimensions.validate()?;
        let face = dimensions.face();
        for (field, value, limit) in [
            ("trim_length", self.trim.length, face.length),
            ("trim_height", self.trim.height, face.height),
            ("polished_length", self.polished_values.length, face.length),
            ("polished_height", self.polished_values.height, face.height),
        ] {
            if value > limit {
                return Err(CoreError::InvalidDimension { field, value });
            }
        }
        self.dimensions = dimensions;
        self.touch(at);
        Ok(())
    }

    /// Updates worker payment for a stage without touching the lifecycle.
    pub fn set_payment(
        &mut self,
        stage: PaymentStage,
        status: PaymentStatus,
        pay: Option<f64>,
        at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let pay = pay.map(|p| check("workers_pay", p)).transpose()?;
        match stage {
            PaymentStage::Cutting => {
                self.cutting_payment_status = status;
                if let Some(p) = pay {
                    self.workers_cutting_pay = p;
                }
            }
            PaymentStage::Polishing => {
                self.polishing_payment_status = status;
                if let Some(p) = pay {
                    self.workers_polishing_pay = p;
                }
            }
        }
        self.touch(at);
        Ok(())
    }

    fn check_trim(&self, trim: &FaceSize) -> Result<(), CoreError> {
        // NaN fails both comparisons and is treated as missing.
        if !(trim.length > 0.0) || !(trim.height > 0.0) {
            return Err(CoreError::MissingTrimData);
        }
        if trim.length > self.dimensions.length {
            return Err(CoreError::InvalidDimension {
                field: "trim_length",
                value: trim.length,
            });
        }
        if trim.height > self.dimensions.height {
            return Err(CoreError::InvalidDimension {
                field: "trim_height",
                value: trim.height,
            });
        }
        Ok(())
    }

    fn check_polished(&self, polished: &FaceSize) -> Result<(), CoreError> {
        let length = check("polished_length", polished.length)?;
        let height = check("polished_height", polished.height)?;
        if length > self.dimensions.length {
            return Err(CoreError::InvalidDimension {
                field: "polished_length",
                value: length,
            });
        }
        if height > self.dimensions.height {
            return Err(CoreError::InvalidDimension {
                field: "polished_height",
                value: height,
            });
        }
        Ok(())
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.version += 1;
        self.updated_at = at;
    }
}
