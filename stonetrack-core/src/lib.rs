//! # stonetrack-core
//!
//! Material lifecycle and measurement engine for stonetrack.
//!
//! This crate provides:
//! - Measurement derivations (allowances, area, volume, weight, cost)
//! - Block and slab lifecycle state machines with optimistic concurrency
//! - Machine/component associations and component wear accounting

pub mod block;
pub mod dimension;
pub mod engine;
pub mod error;
pub mod machine;
pub mod measure;
pub mod slab;
pub mod transition;
pub mod usage;

pub use block::{Block, BlockDimensions, BlockEvent, BlockStatus};
pub use dimension::{Dimension, Units};
pub use engine::StageTransitionEngine;
pub use error::CoreError;
pub use machine::{Capability, Component, Expense, Machine, MachineLog};
pub use measure::{AdjustedDimensions, Allowance, FaceSize, StageFigures};
pub use slab::{PaymentStage, PaymentStatus, Slab, SlabDimensions, SlabEvent, SlabStatus};
pub use transition::{EntityType, TransitionOutcome, TransitionRecord, TransitionRequest};
pub use usage::{ExpiryStatus, MachineUsageAccumulator, Replacement, UsageReading};
