//! Stage transition engine - holds blocks and slabs and applies lifecycle
//! events to them under optimistic concurrency.
//!
//! Each entity carries a version. Callers pass the version they last read;
//! a mismatch fails with [`CoreError::StaleState`] instead of overwriting.
//! Checks and writes happen under the entity's write lock, so two requests
//! holding the same version cannot both succeed.

use crate::block::{Block, BlockEvent};
use crate::dimension::Dimension;
use crate::error::CoreError;
use crate::slab::{PaymentStage, PaymentStatus, Slab, SlabDimensions, SlabEvent};
use crate::transition::{TransitionOutcome, TransitionRequest};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;

/// The stage transition engine.
#[derive(Default)]
pub struct StageTransitionEngine {
    /// Blocks indexed by ID.
    blocks: DashMap<String, RwLock<Block>>,

    /// Slabs indexed by ID.
    slabs: DashMap<String, RwLock<Slab>>,
}

fn check_version(expected: u64, actual: u64) -> Result<(), CoreError> {
    if expected != actual {
        return Err(CoreError::StaleState { expected, actual });
    }
    Ok(())
}

impl StageTransitionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Blocks
    // =========================================================================

    /// Registers a block at purchase intake.
    pub fn intake_block(&self, block: Block) -> Result<Block, CoreError> {
        match self.blocks.entry(block.id.clone()) {
            Entry::Occupied(_) => Err(CoreError::EntityExists {
                entity: "block",
                id: block.id,
            }),
            Entry::Vacant(slot) => {
                tracing::debug!(block_id = %block.id, "block intake");
                slot.insert(RwLock::new(block.clone()));
                Ok(block)
            }
        }
    }

    pub fn get_block(&self, block_id: &str) -> Result<Block, CoreError> {
        self.blocks
            .get(block_id)
            .map(|r| r.read().clone())
            .ok_or_else(|| CoreError::BlockNotFound {
                block_id: block_id.to_string(),
            })
    }

    /// Replaces a block's measured sides; weight follows.
    pub fn update_block_dimensions(
        &self,
        block_id: &str,
        expected_version: u64,
        length: Dimension,
        breadth: Dimension,
        height: Dimension,
    ) -> Result<Block, CoreError> {
        let block_lock = self
            .blocks
            .get(block_id)
            .ok_or_else(|| CoreError::BlockNotFound {
                block_id: block_id.to_string(),
            })?;

        let mut block = block_lock.write();
        check_version(expected_version, block.version)?;
        block.set_dimensions(length, breadth, height, Utc::now())?;
        Ok(block.clone())
    }

    // =========================================================================
    // Slabs
    // =========================================================================

    /// Creates a slab under a block that is in cutting (or already cut).
    ///
    /// The block's version is bumped. When `expected_block_version` is given
    /// it must match.
    pub fn register_slab(
        &self,
        block_id: &str,
        expected_block_version: Option<u64>,
        slab_id: &str,
        slab_number: u32,
        dimensions: SlabDimensions,
    ) -> Result<Slab, CoreError> {
        let block_lock = self
            .blocks
            .get(block_id)
            .ok_or_else(|| CoreError::BlockNotFound {
                block_id: block_id.to_string(),
            })?;

        let mut block = block_lock.write();
        if let Some(expected) = expected_block_version {
            check_version(expected, block.version)?;
        }

        let now = Utc::now();
        let slab = Slab::cut_from(&block, slab_id, slab_number, dimensions, now)?;

        match self.slabs.entry(slab_id.to_string()) {
            Entry::Occupied(_) => Err(CoreError::EntityExists {
                entity: "slab",
                id: slab_id.to_string(),
            }),
            Entry::Vacant(slot) => {
                block.attach_slab(slab_id, now)?;
                slot.insert(RwLock::new(slab.clone()));
                tracing::debug!(block_id, slab_id, slab_number, "slab registered");
                Ok(slab)
            }
        }
    }

    pub fn get_slab(&self, slab_id: &str) -> Result<Slab, CoreError> {
        self.slabs
            .get(slab_id)
            .map(|r| r.read().clone())
            .ok_or_else(|| CoreError::SlabNotFound {
                slab_id: slab_id.to_string(),
            })
    }

    /// Returns the slabs registered under a block, in registration order.
    pub fn slabs_of(&self, block_id: &str) -> Result<Vec<Slab>, CoreError> {
        let slab_ids = self.get_block(block_id)?.slab_ids;
        slab_ids.iter().map(|id| self.get_slab(id)).collect()
    }

    /// Replaces a slab's raw size.
    pub fn update_slab_dimensions(
        &self,
        slab_id: &str,
        expected_version: u64,
        dimensions: SlabDimensions,
    ) -> Result<Slab, CoreError> {
        let slab_lock = self
            .slabs
            .get(slab_id)
            .ok_or_else(|| CoreError::SlabNotFound {
                slab_id: slab_id.to_string(),
            })?;

        let mut slab = slab_lock.write();
        check_version(expected_version, slab.version)?;
        slab.set_dimensions(dimensions, Utc::now())?;
        Ok(slab.clone())
    }

    /// Updates a slab's worker payment for one stage.
    pub fn set_payment(
        &self,
        slab_id: &str,
        expected_version: u64,
        stage: PaymentStage,
        status: PaymentStatus,
        pay: Option<f64>,
    ) -> Result<Slab, CoreError> {
        let slab_lock = self
            .slabs
            .get(slab_id)
            .ok_or_else(|| CoreError::SlabNotFound {
                slab_id: slab_id.to_string(),
            })?;

        let mut slab = slab_lock.write();
        check_version(expected_version, slab.version)?;
        slab.set_payment(stage, status, pay, Utc::now())?;
        Ok(slab.clone())
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Applies a transition request at the current time.
    pub fn apply(&self, request: &TransitionRequest) -> Result<TransitionOutcome, CoreError> {
        self.apply_at(request, Utc::now())
    }

    /// Applies a transition request with an explicit timestamp.
    pub fn apply_at(
        &self,
        request: &TransitionRequest,
        at: DateTime<Utc>,
    ) -> Result<TransitionOutcome, CoreError> {
        let result = match request {
            TransitionRequest::Block {
                id,
                expected_version,
                event,
            } => self.apply_block(id, *expected_version, *event, at),
            TransitionRequest::Slab {
                id,
                expected_version,
                event,
            } => self.apply_slab(id, *expected_version, event, at),
        };

        match &result {
            Ok(outcome) => tracing::debug!(
                entity = %outcome.record.entity_type,
                id = %outcome.record.entity_id,
                from = %outcome.record.from_state,
                to = %outcome.record.to_state,
                event = %outcome.record.event,
                version = outcome.version,
                "transition applied"
            ),
            Err(e) => tracing::debug!(
                entity = %request.entity_type(),
                id = request.entity_id(),
                code = e.error_code(),
                "transition rejected"
            ),
        }
        result
    }

    fn apply_block(
        &self,
        block_id: &str,
        expected_version: u64,
        event: BlockEvent,
        at: DateTime<Utc>,
    ) -> Result<TransitionOutcome, CoreError> {
        let block_lock = self
            .blocks
            .get(block_id)
            .ok_or_else(|| CoreError::BlockNotFound {
                block_id: block_id.to_string(),
            })?;

        let mut block = block_lock.write();
        check_version(expected_version, block.version)?;

        let transitioned = block.apply_transition(event, at)?;
        *block = transitioned.entity;

        Ok(TransitionOutcome {
            new_state: block.status.to_string(),
            in_stock: block.in_stock,
            version: block.version,
            record: transitioned.record,
        })
    }

    fn apply_slab(
        &self,
        slab_id: &str,
        expected_version: u64,
        event: &SlabEvent,
        at: DateTime<Utc>,
    ) -> Result<TransitionOutcome, CoreError> {
        let slab_lock = self
            .slabs
            .get(slab_id)
            .ok_or_else(|| CoreError::SlabNotFound {
                slab_id: slab_id.to_string(),
            })?;

        let mut slab = slab_lock.write();
        check_version(expected_version, slab.version)?;

        let transitioned = slab.apply_transition(event, at)?;
        *slab = transitioned.entity;

        Ok(TransitionOutcome {
            new_state: slab.status.to_string(),
            in_stock: slab.in_stock,
            version: slab.version,
            record: transitioned.record,
        })
    }

    // =========================================================================
    // Enumeration
    // =========================================================================

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn slab_count(&self) -> usize {
        self.slabs.len()
    }

    /// Returns clones of all slabs still in stock.
    pub fn slabs_in_stock(&self) -> Vec<Slab> {
        self.slabs
            .iter()
            .map(|r| r.value().read().clone())
            .filter(|s| s.in_stock)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockDimensions, BlockStatus};
    use crate::measure::FaceSize;
    use crate::slab::SlabStatus;

    fn test_engine() -> StageTransitionEngine {
        let engine = StageTransitionEngine::new();
        let dims = BlockDimensions::new(
            Dimension::inches(120.0),
            Dimension::inches(60.0),
            Dimension::inches(70.0),
        )
        .unwrap();
        engine
            .intake_block(Block::intake("b-1", "f-1", "B-101", "granite", dims, Utc::now()))
            .unwrap();
        engine
    }

    fn slab_dims() -> SlabDimensions {
        SlabDimensions {
            length: 100.0,
            height: 50.0,
            thickness: 0.75,
            breadth: 60.0,
        }
    }

    fn block_event(version: u64, event: BlockEvent) -> TransitionRequest {
        TransitionRequest::Block {
            id: "b-1".to_string(),
            expected_version: version,
            event,
        }
    }

    fn slab_event(version: u64, event: SlabEvent) -> TransitionRequest {
        TransitionRequest::Slab {
            id: "s-1".to_string(),
            expected_version: version,
            event,
        }
    }

    /// Engine with slab s-1 polished and in stock; returns its version.
    fn polished_engine() -> (StageTransitionEngine, u64) {
        let engine = test_engine();
        engine
            .apply(&block_event(0, BlockEvent::AssignToCutting))
            .unwrap();
        engine
            .register_slab("b-1", Some(1), "s-1", 1, slab_dims())
            .unwrap();
        engine.apply(&slab_event(0, SlabEvent::SendToPolish)).unwrap();
        let outcome = engine
            .apply(&slab_event(
                1,
                SlabEvent::FinishPolish {
                    trim: FaceSize::new(6.0, 2.0),
                    polished_values: None,
                },
            ))
            .unwrap();
        (engine, outcome.version)
    }

    #[test]
    fn test_intake_duplicate() {
        let engine = test_engine();
        let block = engine.get_block("b-1").unwrap();
        let result = engine.intake_block(block);
        assert!(matches!(result, Err(CoreError::EntityExists { entity: "block", .. })));
    }

    #[test]
    fn test_block_lifecycle() {
        let engine = test_engine();
        let outcome = engine
            .apply(&block_event(0, BlockEvent::AssignToCutting))
            .unwrap();
        assert_eq!(outcome.new_state, "in_cutting");
        assert_eq!(outcome.version, 1);
        assert_eq!(outcome.record.entity_id, "b-1");

        let outcome = engine
            .apply(&block_event(1, BlockEvent::AllSlabsCut))
            .unwrap();
        assert_eq!(outcome.new_state, "cut");
        assert_eq!(engine.get_block("b-1").unwrap().status, BlockStatus::Cut);
    }

    #[test]
    fn test_invalid_transition_leaves_state() {
        let engine = test_engine();
        let result = engine.apply(&block_event(0, BlockEvent::AllSlabsCut));
        assert!(matches!(result, Err(CoreError::InvalidTransition { .. })));
        let block = engine.get_block("b-1").unwrap();
        assert_eq!(block.status, BlockStatus::InStock);
        assert_eq!(block.version, 0);
    }

    #[test]
    fn test_stale_version() {
        let engine = test_engine();
        engine
            .apply(&block_event(0, BlockEvent::AssignToCutting))
            .unwrap();
        let result = engine.apply(&block_event(0, BlockEvent::AllSlabsCut));
        assert_eq!(
            result.unwrap_err(),
            CoreError::StaleState {
                expected: 0,
                actual: 1
            }
        );
    }

    #[test]
    fn test_register_slab_requires_cutting() {
        let engine = test_engine();
        let result = engine.register_slab("b-1", None, "s-1", 1, slab_dims());
        assert!(matches!(result, Err(CoreError::InvalidTransition { .. })));
        assert_eq!(engine.slab_count(), 0);

        engine
            .apply(&block_event(0, BlockEvent::AssignToCutting))
            .unwrap();
        let slab = engine
            .register_slab("b-1", Some(1), "s-1", 1, slab_dims())
            .unwrap();
        assert_eq!(slab.status, SlabStatus::InCutting);
        assert_eq!(slab.block_id, "b-1");

        let block = engine.get_block("b-1").unwrap();
        assert_eq!(block.slab_ids, vec!["s-1".to_string()]);
        assert_eq!(block.version, 2);

        let dup = engine.register_slab("b-1", None, "s-1", 2, slab_dims());
        assert!(matches!(dup, Err(CoreError::EntityExists { entity: "slab", .. })));
        assert_eq!(engine.get_block("b-1").unwrap().slab_ids.len(), 1);
    }

    #[test]
    fn test_slabs_of_block() {
        let engine = test_engine();
        engine
            .apply(&block_event(0, BlockEvent::AssignToCutting))
            .unwrap();
        engine.register_slab("b-1", None, "s-1", 1, slab_dims()).unwrap();
        engine.register_slab("b-1", None, "s-2", 2, slab_dims()).unwrap();

        let slabs = engine.slabs_of("b-1").unwrap();
        let numbers: Vec<u32> = slabs.iter().map(|s| s.slab_number).collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[test]
    fn test_update_dimensions_recomputes_weight() {
        let engine = test_engine();
        let block = engine
            .update_block_dimensions(
                "b-1",
                0,
                Dimension::inches(40.0),
                Dimension::inches(30.0),
                Dimension::inches(20.0),
            )
            .unwrap();
        assert!((block.dimensions.weight().value - 0.084).abs() < 1e-12);
        assert_eq!(block.version, 1);
    }

    #[test]
    fn test_update_slab_dimensions() {
        let (engine, version) = polished_engine();
        let dims = SlabDimensions {
            length: 120.0,
            ..slab_dims()
        };
        let slab = engine.update_slab_dimensions("s-1", version, dims).unwrap();
        assert_eq!(slab.dimensions.length, 120.0);
        assert_eq!(slab.status, SlabStatus::Polished);

        let stale = engine.update_slab_dimensions("s-1", version, dims);
        assert!(matches!(stale, Err(CoreError::StaleState { .. })));
    }

    #[test]
    fn test_sell_flow() {
        let (engine, version) = polished_engine();
        let outcome = engine.apply(&slab_event(version, SlabEvent::Sell)).unwrap();
        assert!(!outcome.in_stock);
        assert_eq!(outcome.new_state, "polished");
        assert!(engine.slabs_in_stock().is_empty());

        let again = engine.apply(&slab_event(outcome.version, SlabEvent::Sell));
        assert!(matches!(again, Err(CoreError::AlreadySold { .. })));
    }

    #[test]
    fn test_payment_versioned() {
        let (engine, version) = polished_engine();
        let slab = engine
            .set_payment("s-1", version, PaymentStage::Polishing, PaymentStatus::Paid, Some(40.0))
            .unwrap();
        assert_eq!(slab.polishing_payment_status, PaymentStatus::Paid);
        assert_eq!(slab.status, SlabStatus::Polished);

        let stale = engine.set_payment("s-1", version, PaymentStage::Cutting, PaymentStatus::Paid, None);
        assert!(matches!(stale, Err(CoreError::StaleState { .. })));
    }

    #[test]
    fn test_concurrent_sell_exactly_one_wins() {
        let (engine, version) = polished_engine();
        let request = slab_event(version, SlabEvent::Sell);
        let engine = &engine;
        let request = &request;

        let results: Vec<Result<TransitionOutcome, CoreError>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..2)
                .map(|_| s.spawn(move || engine.apply(request)))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let successes = results.iter().filter(|r| r.is_ok()).count();
        let stale = results
            .iter()
            .filter(|r| matches!(r, Err(CoreError::StaleState { .. })))
            .count();
        assert_eq!(successes, 1);
        assert_eq!(stale, 1);
        assert!(!engine.get_slab("s-1").unwrap().in_stock);
    }

    #[test]
    fn test_missing_entities() {
        let engine = StageTransitionEngine::new();
        assert!(matches!(
            engine.apply(&block_event(0, BlockEvent::AssignToCutting)),
            Err(CoreError::BlockNotFound { .. })
        ));
        assert!(matches!(
            engine.apply(&slab_event(0, SlabEvent::Sell)),
            Err(CoreError::SlabNotFound { .. })
        ));
    }
}
