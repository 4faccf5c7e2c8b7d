//! Component wear accounting.
//!
//! Each component has one running total of area actually processed, stored
//! as `f64` bits in an `AtomicU64` and advanced with a compare-and-swap
//! loop. Increments hold the map shard's read lock, replacements its write
//! lock, so no increment can straddle a reset.
//!
//! Expiry latches: once the total reaches the rated capacity the component
//! stays expired until [`MachineUsageAccumulator::replace_component`].

use crate::block::Block;
use crate::dimension::check;
use crate::error::CoreError;
use crate::machine::{Component, Expense, Machine, MachineLog};
use crate::slab::Slab;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use uuid::Uuid;

/// Result of recording usage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UsageReading {
    pub running_total: f64,
    pub expired: bool,
}

/// Result of an expiry evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpiryStatus {
    pub expired: bool,
    /// Capacity left before expiry, never negative.
    pub remaining: f64,
    pub running_total: f64,
    pub capacity: f64,
}

/// Replacement details for a worn component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Replacement {
    /// Rated capacity of the new part.
    pub new_capacity: f64,
    pub component_cost: f64,
    #[serde(default)]
    pub other_expenses: Vec<Expense>,
    pub replaced_at: DateTime<Utc>,
}

struct ComponentUsage {
    component: Component,
    total_bits: AtomicU64,
    expired: AtomicBool,
}

impl ComponentUsage {
    fn new(component: Component) -> Self {
        let expired = AtomicBool::new(component.expired);
        Self {
            component,
            total_bits: AtomicU64::new(0f64.to_bits()),
            expired,
        }
    }

    fn total(&self) -> f64 {
        f64::from_bits(self.total_bits.load(Ordering::Acquire))
    }

    fn add(&self, area: f64) -> f64 {
        let mut current = self.total_bits.load(Ordering::Acquire);
        loop {
            let next = f64::from_bits(current) + area;
            match self.total_bits.compare_exchange_weak(
                current,
                next.to_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }

    /// Latches `expired` when `total` has reached capacity. Returns the
    /// current flag and whether this call set it.
    fn latch(&self, total: f64) -> (bool, bool) {
        if total >= self.component.sqf_processed {
            let was = self.expired.swap(true, Ordering::AcqRel);
            (true, !was)
        } else {
            (self.expired.load(Ordering::Acquire), false)
        }
    }

    fn snapshot(&self) -> Component {
        Component {
            expired: self.expired.load(Ordering::Acquire),
            ..self.component.clone()
        }
    }
}

fn check_area(area: f64) -> Result<f64, CoreError> {
    if area.is_finite() && area >= 0.0 {
        Ok(area)
    } else {
        Err(CoreError::InvalidArea { area })
    }
}

fn check_capacity(capacity: f64) -> Result<f64, CoreError> {
    if capacity.is_finite() && capacity > 0.0 {
        Ok(capacity)
    } else {
        Err(CoreError::InvalidArea { area: capacity })
    }
}

/// Per-component usage totals.
#[derive(Default)]
pub struct MachineUsageAccumulator {
    components: DashMap<String, ComponentUsage>,
}

impl MachineUsageAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking a component with a zero running total.
    pub fn register_component(&self, component: Component) -> Result<(), CoreError> {
        check_capacity(component.sqf_processed)?;
        match self.components.entry(component.id.clone()) {
            Entry::Occupied(_) => Err(CoreError::ComponentExists {
                component_id: component.id,
            }),
            Entry::Vacant(slot) => {
                tracing::debug!(
                    component_id = %component.id,
                    machine_id = %component.machine_id,
                    capacity = component.sqf_processed,
                    "component registered"
                );
                slot.insert(ComponentUsage::new(component));
                Ok(())
            }
        }
    }

    /// Returns the component with its current expiry flag.
    pub fn component(&self, component_id: &str) -> Result<Component, CoreError> {
        self.components
            .get(component_id)
            .map(|r| r.snapshot())
            .ok_or_else(|| CoreError::ComponentNotFound {
                component_id: component_id.to_string(),
            })
    }

    /// Atomically adds `area_sqft` to the component's running total.
    pub fn record_usage(&self, component_id: &str, area_sqft: f64) -> Result<UsageReading, CoreError> {
        let area = check_area(area_sqft)?;
        let usage = self
            .components
            .get(component_id)
            .ok_or_else(|| CoreError::ComponentNotFound {
                component_id: component_id.to_string(),
            })?;

        let running_total = usage.add(area);
        let (expired, newly) = usage.latch(running_total);
        tracing::debug!(component_id, area, running_total, "usage recorded");
        if newly {
            tracing::info!(
                component_id,
                running_total,
                capacity = usage.component.sqf_processed,
                "component expired"
            );
        }

        Ok(UsageReading {
            running_total,
            expired,
        })
    }

    /// Compares the running total with the rated capacity.
    pub fn evaluate_expiry(&self, component_id: &str) -> Result<ExpiryStatus, CoreError> {
        let usage = self
            .components
            .get(component_id)
            .ok_or_else(|| CoreError::ComponentNotFound {
                component_id: component_id.to_string(),
            })?;

        let running_total = usage.total();
        let capacity = usage.component.sqf_processed;
        let (expired, newly) = usage.latch(running_total);
        if newly {
            tracing::info!(component_id, running_total, capacity, "component expired");
        }

        Ok(ExpiryStatus {
            expired,
            remaining: (capacity - running_total).max(0.0),
            running_total,
            capacity,
        })
    }

    /// Records the block's footprint against a cutting machine's component.
    pub fn record_block_association(
        &self,
        machine: &mut Machine,
        block: &Block,
        component_id: &str,
    ) -> Result<UsageReading, CoreError> {
        self.check_owner(machine, component_id)?;
        let area = machine.associate_block(block, component_id)?;
        self.record_usage(component_id, area)
    }

    /// Records the slab's face area against a polishing machine's component.
    pub fn record_slab_association(
        &self,
        machine: &mut Machine,
        slab: &Slab,
        component_id: &str,
    ) -> Result<UsageReading, CoreError> {
        self.check_owner(machine, component_id)?;
        let area = machine.associate_slab(slab, component_id)?;
        self.record_usage(component_id, area)
    }

    fn check_owner(&self, machine: &Machine, component_id: &str) -> Result<(), CoreError> {
        let usage = self
            .components
            .get(component_id)
            .ok_or_else(|| CoreError::ComponentNotFound {
                component_id: component_id.to_string(),
            })?;
        if usage.component.machine_id != machine.id {
            return Err(CoreError::ComponentMachineMismatch {
                component_id: component_id.to_string(),
                machine_id: machine.id.clone(),
            });
        }
        Ok(())
    }

    /// Retires the current part: logs what it actually processed, then resets
    /// the running total to zero against the new capacity and clears expiry.
    pub fn replace_component(
        &self,
        component_id: &str,
        replacement: Replacement,
    ) -> Result<MachineLog, CoreError> {
        let new_capacity = check_capacity(replacement.new_capacity)?;
        check("component_cost", replacement.component_cost)?;
        for expense in &replacement.other_expenses {
            check("expense_amount", expense.amount)?;
        }
        let mut usage = self
            .components
            .get_mut(component_id)
            .ok_or_else(|| CoreError::ComponentNotFound {
                component_id: component_id.to_string(),
            })?;

        let retired = usage.snapshot();
        let actual_processed = usage.total();

        let log = MachineLog {
            id: Uuid::new_v4(),
            machine_id: retired.machine_id.clone(),
            component_id: retired.id.clone(),
            sqf_processed: retired.sqf_processed,
            actual_processed,
            component_cost: replacement.component_cost,
            other_expenses: replacement.other_expenses,
            replaced_at: replacement.replaced_at,
            created_at: Utc::now(),
        };

        let fresh = Component {
            expired: false,
            sqf_processed: new_capacity,
            created_at: replacement.replaced_at,
            replaced_at: Some(replacement.replaced_at),
            ..retired
        };
        *usage = ComponentUsage::new(fresh);

        tracing::info!(
            component_id,
            actual_processed,
            new_capacity,
            "component replaced"
        );
        Ok(log)
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockDimensions;
    use crate::dimension::Dimension;

    fn accumulator_with(capacity: f64) -> MachineUsageAccumulator {
        let acc = MachineUsageAccumulator::new();
        acc.register_component(Component::new("c-1", "m-1", "blade", capacity, Utc::now()))
            .unwrap();
        acc
    }

    fn replacement(capacity: f64) -> Replacement {
        Replacement {
            new_capacity: capacity,
            component_cost: 300.0,
            other_expenses: vec![],
            replaced_at: Utc::now(),
        }
    }

    #[test]
    fn test_record_usage_accumulates() {
        let acc = accumulator_with(100.0);
        assert_eq!(acc.record_usage("c-1", 10.0).unwrap().running_total, 10.0);
        let reading = acc.record_usage("c-1", 2.5).unwrap();
        assert_eq!(reading.running_total, 12.5);
        assert!(!reading.expired);
    }

    #[test]
    fn test_invalid_area() {
        let acc = accumulator_with(100.0);
        assert!(matches!(
            acc.record_usage("c-1", -1.0),
            Err(CoreError::InvalidArea { .. })
        ));
        assert!(acc.record_usage("c-1", f64::NAN).is_err());
        assert_eq!(acc.evaluate_expiry("c-1").unwrap().running_total, 0.0);
    }

    #[test]
    fn test_register_rejects_zero_capacity_and_duplicates() {
        let acc = MachineUsageAccumulator::new();
        let result = acc.register_component(Component::new("c-1", "m-1", "blade", 0.0, Utc::now()));
        assert!(matches!(result, Err(CoreError::InvalidArea { .. })));

        let acc = accumulator_with(10.0);
        let result = acc.register_component(Component::new("c-1", "m-1", "blade", 10.0, Utc::now()));
        assert!(matches!(result, Err(CoreError::ComponentExists { .. })));
    }

    #[test]
    fn test_unknown_component() {
        let acc = MachineUsageAccumulator::new();
        assert!(matches!(
            acc.record_usage("nope", 1.0),
            Err(CoreError::ComponentNotFound { .. })
        ));
        assert!(acc.evaluate_expiry("nope").is_err());
    }

    #[test]
    fn test_expiry_latches_at_capacity() {
        let acc = accumulator_with(100.0);
        acc.record_usage("c-1", 60.0).unwrap();
        let status = acc.evaluate_expiry("c-1").unwrap();
        assert!(!status.expired);
        assert_eq!(status.remaining, 40.0);

        let reading = acc.record_usage("c-1", 40.0).unwrap();
        assert!(reading.expired);
        let status = acc.evaluate_expiry("c-1").unwrap();
        assert!(status.expired);
        assert_eq!(status.remaining, 0.0);

        // keeps counting, stays expired
        acc.record_usage("c-1", 5.0).unwrap();
        let status = acc.evaluate_expiry("c-1").unwrap();
        assert!(status.expired);
        assert_eq!(status.running_total, 105.0);
        assert!(acc.component("c-1").unwrap().expired);
    }

    #[test]
    fn test_replacement_resets() {
        let acc = accumulator_with(100.0);
        acc.record_usage("c-1", 120.0).unwrap();
        assert!(acc.evaluate_expiry("c-1").unwrap().expired);

        let mut repl = replacement(500.0);
        repl.other_expenses.push(Expense {
            description: "fitting".to_string(),
            amount: 25.0,
        });
        let log = acc.replace_component("c-1", repl).unwrap();
        assert_eq!(log.sqf_processed, 100.0);
        assert_eq!(log.actual_processed, 120.0);
        assert_eq!(log.total_cost(), 325.0);

        let status = acc.evaluate_expiry("c-1").unwrap();
        assert!(!status.expired);
        assert_eq!(status.running_total, 0.0);
        assert_eq!(status.capacity, 500.0);

        let component = acc.component("c-1").unwrap();
        assert!(!component.expired);
        assert!(component.replaced_at.is_some());
        assert_eq!(component.machine_id, "m-1");
    }

    #[test]
    fn test_replacement_rejects_bad_capacity() {
        let acc = accumulator_with(100.0);
        acc.record_usage("c-1", 10.0).unwrap();
        assert!(acc.replace_component("c-1", replacement(-5.0)).is_err());
        assert_eq!(acc.evaluate_expiry("c-1").unwrap().running_total, 10.0);
    }

    #[test]
    fn test_replacement_rejects_bad_costs() {
        let acc = accumulator_with(100.0);
        acc.record_usage("c-1", 10.0).unwrap();

        let mut repl = replacement(500.0);
        repl.component_cost = -500.0;
        assert!(matches!(
            acc.replace_component("c-1", repl),
            Err(CoreError::InvalidDimension { field: "component_cost", .. })
        ));

        let mut repl = replacement(500.0);
        repl.other_expenses.push(Expense {
            description: "fitting".to_string(),
            amount: f64::NAN,
        });
        assert!(matches!(
            acc.replace_component("c-1", repl),
            Err(CoreError::InvalidDimension { field: "expense_amount", .. })
        ));

        let status = acc.evaluate_expiry("c-1").unwrap();
        assert_eq!(status.running_total, 10.0);
        assert_eq!(status.capacity, 100.0);
    }

    #[test]
    fn test_concurrent_increments_not_lost() {
        let acc = accumulator_with(10_000.0);
        let acc_ref = &acc;
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(move || {
                    for _ in 0..125 {
                        acc_ref.record_usage("c-1", 1.0).unwrap();
                    }
                });
            }
        });
        assert_eq!(acc.evaluate_expiry("c-1").unwrap().running_total, 1000.0);
    }

    #[test]
    fn test_association_records_area() {
        let acc = accumulator_with(1000.0);
        let mut machine = Machine::cutting("m-1", "gang saw");
        let dims = BlockDimensions::new(
            Dimension::cm(304.8),
            Dimension::cm(152.4),
            Dimension::cm(100.0),
        )
        .unwrap();
        let block = Block::intake("b-1", "f-1", "B-101", "granite", dims, Utc::now());

        let reading = acc.record_block_association(&mut machine, &block, "c-1").unwrap();
        assert!((reading.running_total - 50.0).abs() < 1e-9);
        assert!((machine.total_processed_by_machine().unwrap() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_association_checks_component_owner() {
        let acc = accumulator_with(1000.0);
        let mut other = Machine::cutting("m-9", "bridge saw");
        let dims = BlockDimensions::new(
            Dimension::cm(10.0),
            Dimension::cm(10.0),
            Dimension::cm(10.0),
        )
        .unwrap();
        let block = Block::intake("b-1", "f-1", "B-101", "granite", dims, Utc::now());

        let result = acc.record_block_association(&mut other, &block, "c-1");
        assert!(matches!(result, Err(CoreError::ComponentMachineMismatch { .. })));
        assert_eq!(other.association_count(), 0);
    }
}
