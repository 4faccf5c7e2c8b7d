//! Scenario replay.
//!
//! A scenario is a YAML document that seeds blocks, machines and components
//! and then lists steps to run against the engine:
//!
//! ```yaml
//! blocks:
//!   - id: b-1
//!     factory_id: f-1
//!     block_number: B-101
//!     material: granite
//!     dimensions:
//!       length: { value: 120, units: inch }
//!       breadth: { value: 60, units: inch }
//!       height: { value: 70, units: inch }
//! machines:
//!   - id: m-1
//!     name: gang saw
//!     capability: { type: cutting }
//! components:
//!   - { id: c-1, machine_id: m-1, name: blade, sqf_processed: 5000 }
//! steps:
//!   - { op: transition, entity: block, id: b-1, expected_version: 0, event: assign_to_cutting }
//!   - { op: associate_block, machine_id: m-1, block_id: b-1, component_id: c-1 }
//! ```
//!
//! A failing step is reported with its error code; later steps still run.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use stonetrack_core::{
    Allowance, Block, BlockDimensions, Component, CoreError, Dimension, Expense, Machine,
    MachineUsageAccumulator, PaymentStage, PaymentStatus, Replacement, SlabDimensions,
    StageTransitionEngine, TransitionRecord, TransitionRequest,
};
use thiserror::Error;

/// Errors that stop a scenario before any step runs.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("setup failed: {0}")]
    Setup(#[from] CoreError),

    #[error("duplicate machine: {0}")]
    DuplicateMachine(String),
}

/// Block seeded at intake.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockSeed {
    pub id: String,
    pub factory_id: String,
    pub block_number: String,
    pub material: String,
    pub dimensions: BlockDimensions,
}

/// Component seeded with a fresh running total.
#[derive(Debug, Clone, Deserialize)]
pub struct ComponentSeed {
    pub id: String,
    pub machine_id: String,
    pub name: String,
    pub sqf_processed: f64,
}

/// Which stage's figures to derive for a slab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FigureStage {
    Cutting,
    Polishing,
    /// Polishing sized from the recorded trim.
    Trim,
}

/// One scenario step.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Transition(TransitionRequest),
    RegisterSlab {
        block_id: String,
        #[serde(default)]
        expected_block_version: Option<u64>,
        slab_id: String,
        slab_number: u32,
        dimensions: SlabDimensions,
    },
    UpdateBlockDimensions {
        block_id: String,
        expected_version: u64,
        length: Dimension,
        breadth: Dimension,
        height: Dimension,
    },
    UpdateSlabDimensions {
        slab_id: String,
        expected_version: u64,
        dimensions: SlabDimensions,
    },
    AssociateBlock {
        machine_id: String,
        block_id: String,
        component_id: String,
    },
    AssociateSlab {
        machine_id: String,
        slab_id: String,
        component_id: String,
    },
    RecordUsage {
        component_id: String,
        area_sqft: f64,
    },
    EvaluateExpiry {
        component_id: String,
    },
    ReplaceComponent {
        component_id: String,
        new_capacity: f64,
        #[serde(default)]
        component_cost: f64,
        #[serde(default)]
        other_expenses: Vec<Expense>,
    },
    SetPayment {
        slab_id: String,
        expected_version: u64,
        stage: PaymentStage,
        status: PaymentStatus,
        #[serde(default)]
        pay: Option<f64>,
    },
    MachineTotal {
        machine_id: String,
    },
    SlabFigures {
        slab_id: String,
        stage: FigureStage,
        rate: f64,
    },
}

impl Step {
    pub fn op(&self) -> &'static str {
        match self {
            Step::Transition(_) => "transition",
            Step::RegisterSlab { .. } => "register_slab",
            Step::UpdateBlockDimensions { .. } => "update_block_dimensions",
            Step::UpdateSlabDimensions { .. } => "update_slab_dimensions",
            Step::AssociateBlock { .. } => "associate_block",
            Step::AssociateSlab { .. } => "associate_slab",
            Step::RecordUsage { .. } => "record_usage",
            Step::EvaluateExpiry { .. } => "evaluate_expiry",
            Step::ReplaceComponent { .. } => "replace_component",
            Step::SetPayment { .. } => "set_payment",
            Step::MachineTotal { .. } => "machine_total",
            Step::SlabFigures { .. } => "slab_figures",
        }
    }
}

/// A scenario document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub blocks: Vec<BlockSeed>,
    pub machines: Vec<Machine>,
    pub components: Vec<ComponentSeed>,
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ScenarioError> {
        Ok(serde_yaml::from_str(content)?)
    }
}

/// Outcome of one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub op: &'static str,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
    /// Set when the step failed on a stale version and may succeed after a
    /// re-read.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Area totals for one machine at the end of a run.
#[derive(Debug, Clone, Serialize)]
pub struct MachineSummary {
    pub id: String,
    pub capability: &'static str,
    pub associations: usize,
    pub total_processed_sqft: f64,
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub steps: Vec<StepReport>,
    pub records: Vec<TransitionRecord>,
    pub machines: Vec<MachineSummary>,
    pub components: Vec<Component>,
}

impl RunReport {
    pub fn failed_steps(&self) -> usize {
        self.steps.iter().filter(|s| !s.ok).count()
    }
}

/// Holds the engine state a scenario runs against.
pub struct ScenarioRunner {
    engine: StageTransitionEngine,
    usage: MachineUsageAccumulator,
    machines: BTreeMap<String, Machine>,
    component_ids: Vec<String>,
    allowance: Allowance,
}

impl ScenarioRunner {
    /// Seeds blocks, machines and components.
    pub fn new(scenario: &Scenario, allowance: Allowance) -> Result<Self, ScenarioError> {
        let engine = StageTransitionEngine::new();
        let now = Utc::now();
        for seed in &scenario.blocks {
            engine.intake_block(Block::intake(
                &seed.id,
                &seed.factory_id,
                &seed.block_number,
                &seed.material,
                seed.dimensions,
                now,
            ))?;
        }

        let mut machines = BTreeMap::new();
        for machine in &scenario.machines {
            if machines.insert(machine.id.clone(), machine.clone()).is_some() {
                return Err(ScenarioError::DuplicateMachine(machine.id.clone()));
            }
        }

        let usage = MachineUsageAccumulator::new();
        let mut component_ids = Vec::new();
        for seed in &scenario.components {
            usage.register_component(Component::new(
                &seed.id,
                &seed.machine_id,
                &seed.name,
                seed.sqf_processed,
                now,
            ))?;
            component_ids.push(seed.id.clone());
        }

        tracing::info!(
            blocks = engine.block_count(),
            machines = machines.len(),
            components = usage.component_count(),
            "scenario seeded"
        );

        Ok(Self {
            engine,
            usage,
            machines,
            component_ids,
            allowance,
        })
    }

    /// Runs every step in order.
    pub fn run(&mut self, steps: &[Step]) -> Result<RunReport, ScenarioError> {
        let mut reports = Vec::with_capacity(steps.len());
        let mut records = Vec::new();

        for (index, step) in steps.iter().enumerate() {
            let report = match self.run_step(step, &mut records) {
                Ok(result) => StepReport {
                    index,
                    op: step.op(),
                    ok: true,
                    result: Some(result),
                    error_code: None,
                    retryable: false,
                    error: None,
                },
                Err(e) => {
                    tracing::warn!(index, op = step.op(), code = e.error_code(), "step rejected");
                    StepReport {
                        index,
                        op: step.op(),
                        ok: false,
                        result: None,
                        error_code: Some(e.error_code()),
                        retryable: e.is_conflict(),
                        error: Some(e.to_string()),
                    }
                }
            };
            reports.push(report);
        }

        let machines = self
            .machines
            .values()
            .map(|m| {
                Ok(MachineSummary {
                    id: m.id.clone(),
                    capability: m.capability.as_str(),
                    associations: m.association_count(),
                    total_processed_sqft: m.total_processed_by_machine()?,
                })
            })
            .collect::<Result<Vec<_>, CoreError>>()?;

        let components = self
            .component_ids
            .iter()
            .map(|id| self.usage.component(id))
            .collect::<Result<Vec<_>, CoreError>>()?;

        Ok(RunReport {
            steps: reports,
            records,
            machines,
            components,
        })
    }

    fn run_step(
        &mut self,
        step: &Step,
        records: &mut Vec<TransitionRecord>,
    ) -> Result<Value, CoreError> {
        let value = match step {
            Step::Transition(request) => {
                let outcome = self.engine.apply(request)?;
                records.push(outcome.record.clone());
                to_value(&outcome)
            }
            Step::RegisterSlab {
                block_id,
                expected_block_version,
                slab_id,
                slab_number,
                dimensions,
            } => to_value(&self.engine.register_slab(
                block_id,
                *expected_block_version,
                slab_id,
                *slab_number,
                *dimensions,
            )?),
            Step::UpdateBlockDimensions {
                block_id,
                expected_version,
                length,
                breadth,
                height,
            } => to_value(&self.engine.update_block_dimensions(
                block_id,
                *expected_version,
                *length,
                *breadth,
                *height,
            )?),
            Step::UpdateSlabDimensions {
                slab_id,
                expected_version,
                dimensions,
            } => to_value(&self.engine.update_slab_dimensions(
                slab_id,
                *expected_version,
                *dimensions,
            )?),
            Step::AssociateBlock {
                machine_id,
                block_id,
                component_id,
            } => {
                let block = self.engine.get_block(block_id)?;
                let machine = machine_mut(&mut self.machines, machine_id)?;
                to_value(&self.usage.record_block_association(machine, &block, component_id)?)
            }
            Step::AssociateSlab {
                machine_id,
                slab_id,
                component_id,
            } => {
                let slab = self.engine.get_slab(slab_id)?;
                let machine = machine_mut(&mut self.machines, machine_id)?;
                to_value(&self.usage.record_slab_association(machine, &slab, component_id)?)
            }
            Step::RecordUsage {
                component_id,
                area_sqft,
            } => to_value(&self.usage.record_usage(component_id, *area_sqft)?),
            Step::EvaluateExpiry { component_id } => {
                to_value(&self.usage.evaluate_expiry(component_id)?)
            }
            Step::ReplaceComponent {
                component_id,
                new_capacity,
                component_cost,
                other_expenses,
            } => to_value(&self.usage.replace_component(
                component_id,
                Replacement {
                    new_capacity: *new_capacity,
                    component_cost: *component_cost,
                    other_expenses: other_expenses.clone(),
                    replaced_at: Utc::now(),
                },
            )?),
            Step::SetPayment {
                slab_id,
                expected_version,
                stage,
                status,
                pay,
            } => to_value(&self.engine.set_payment(
                slab_id,
                *expected_version,
                *stage,
                *status,
                *pay,
            )?),
            Step::MachineTotal { machine_id } => {
                let machine = machine_ref(&self.machines, machine_id)?;
                serde_json::json!({
                    "machine_id": machine.id,
                    "total_processed_sqft": machine.total_processed_by_machine()?,
                })
            }
            Step::SlabFigures {
                slab_id,
                stage,
                rate,
            } => {
                let slab = self.engine.get_slab(slab_id)?;
                let figures = match stage {
                    FigureStage::Cutting => slab.cutting_figures(*rate, &self.allowance)?,
                    FigureStage::Polishing => slab.polishing_figures(*rate, &self.allowance)?,
                    FigureStage::Trim => slab.trim_figures(*rate, &self.allowance)?,
                };
                to_value(&figures)
            }
        };
        Ok(value)
    }

    pub fn engine(&self) -> &StageTransitionEngine {
        &self.engine
    }

    pub fn usage(&self) -> &MachineUsageAccumulator {
        &self.usage
    }
}

fn machine_ref<'a>(
    machines: &'a BTreeMap<String, Machine>,
    machine_id: &str,
) -> Result<&'a Machine, CoreError> {
    machines
        .get(machine_id)
        .ok_or_else(|| CoreError::MachineNotFound {
            machine_id: machine_id.to_string(),
        })
}

fn machine_mut<'a>(
    machines: &'a mut BTreeMap<String, Machine>,
    machine_id: &str,
) -> Result<&'a mut Machine, CoreError> {
    machines
        .get_mut(machine_id)
        .ok_or_else(|| CoreError::MachineNotFound {
            machine_id: machine_id.to_string(),
        })
}

fn to_value<T: Serialize>(value: &T) -> Value {
    // Every type passed here derives Serialize over plain data.
    serde_json::to_value(value).unwrap_or(Value::Null)
}
