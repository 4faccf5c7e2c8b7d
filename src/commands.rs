//! Command execution.

use crate::config::Config;
use crate::journal::{self, Journal};
use crate::scenario::{Scenario, ScenarioRunner};
use crate::{Commands, Stage};
use colored::Colorize;
use serde::Serialize;
use serde_json::{json, Value};
use stonetrack_core::measure;
use stonetrack_core::FaceSize;

/// Executes a command and returns the formatted output.
pub fn execute(cmd: Commands, config: &Config) -> Result<String, Box<dyn std::error::Error>> {
    let decimals = config.measurement.display_decimals;

    match cmd {
        Commands::Sqft { length, height } => {
            let square_feet = measure::square_feet(length, height)?;
            Ok(format_json(json!({ "square_feet": square_feet }), decimals))
        }

        Commands::Volume {
            length,
            breadth,
            height,
        } => {
            let cubic_inches = measure::volume_cubic_inches(length, breadth, height)?;
            Ok(format_json(
                json!({
                    "cubic_inches": cubic_inches,
                    "cubic_cm": cubic_inches.map(measure::cubic_inches_to_cubic_cm),
                }),
                decimals,
            ))
        }

        Commands::Weight {
            length,
            breadth,
            height,
        } => {
            let tons = measure::estimated_weight_tons(length, breadth, height)?;
            Ok(format_json(json!({ "weight_tons": tons }), decimals))
        }

        Commands::Allowance {
            length,
            height,
            stage,
            polished_length,
            polished_height,
            rate,
        } => {
            let allowance = config.measurement.allowance()?;
            let value = match stage {
                Stage::Cutting => match rate {
                    Some(rate) => to_json(&measure::cutting_figures(
                        length, height, rate, &allowance,
                    )?)?,
                    None => to_json(&measure::adjust_dimensions_with_allowance(
                        length, height, &allowance,
                    )?)?,
                },
                Stage::Polishing => {
                    let polished = FaceSize::new(
                        polished_length.ok_or("--polished-length is required for polishing")?,
                        polished_height.ok_or("--polished-height is required for polishing")?,
                    );
                    let raw = FaceSize::new(length, height);
                    match rate {
                        Some(rate) => to_json(&measure::polishing_figures(
                            raw, polished, rate, &allowance,
                        )?)?,
                        None => to_json(&measure::polish_removal_with_allowance(
                            raw, polished, &allowance,
                        )?)?,
                    }
                }
            };
            Ok(format_json(value, decimals))
        }

        Commands::Amount { sqft, rate } => {
            let amount = measure::amount(sqft, rate)?;
            Ok(format_json(json!({ "amount": amount }), decimals))
        }

        Commands::Replay { file, journal } => {
            let scenario = Scenario::from_file(&file)?;
            let mut runner = ScenarioRunner::new(&scenario, config.measurement.allowance()?)?;
            let report = runner.run(&scenario.steps)?;

            tracing::info!(
                steps = report.steps.len(),
                failed = report.failed_steps(),
                blocks = runner.engine().block_count(),
                slabs = runner.engine().slab_count(),
                components = runner.usage().component_count(),
                "replay finished"
            );

            let mut output = json!({ "report": to_json(&report)? });
            if let Some(path) = journal.or_else(|| config.journal.path.clone()) {
                let mut journal = Journal::open(&path)?;
                for record in &report.records {
                    journal.append(record)?;
                }
                journal.sync()?;
                output["journal"] = json!({
                    "path": journal.path().display().to_string(),
                    "appended": journal.appended(),
                });
            }
            Ok(format_json(output, decimals))
        }

        Commands::VerifyJournal { path } => {
            let records = journal::read_all(&path)?;
            Ok(format!(
                "{} {} records verified in {}",
                "OK".green(),
                records.len(),
                path.display()
            ))
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, serde_json::Error> {
    serde_json::to_value(value)
}

/// Rounds fractional numbers for display only.
fn round_json(value: Value, decimals: u32) -> Value {
    match value {
        Value::Number(n) if n.is_f64() => n
            .as_f64()
            .and_then(|f| serde_json::Number::from_f64(measure::round_to(f, decimals)))
            .map(Value::Number)
            .unwrap_or(Value::Number(n)),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| round_json(v, decimals))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, round_json(v, decimals)))
                .collect(),
        ),
        other => other,
    }
}

fn format_json(value: Value, decimals: u32) -> String {
    let value = round_json(value, decimals);
    serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
}
