//! Measurement derivations.
//!
//! Every function here is pure: plain numbers in, plain numbers out. Values
//! keep full `f64` precision; rounding happens only when a figure is
//! presented (see [`round_to`]).
//!
//! Lengths are in inches unless a name says otherwise.
//!
//! Two allowance paths exist and are kept apart on purpose:
//!
//! ```text
//! cutting:    raw length/height            + allowance
//! polishing:  (raw - polished) length/height + allowance
//! ```

use crate::dimension::{check, check_opt, CM_PER_INCH};
use crate::error::CoreError;
use serde::{Deserialize, Serialize};

/// Square inches per square foot.
pub const SQ_INCHES_PER_SQ_FOOT: f64 = 144.0;

/// Square centimetres per square foot.
pub const SQ_CM_PER_SQ_FOOT: f64 = 929.0304;

/// Cubic centimetres per cubic inch.
pub const CUBIC_CM_PER_CUBIC_INCH: f64 = 16.387064;

/// Default length allowance added during cutting planning (inches).
pub const DEFAULT_LENGTH_ALLOWANCE_IN: f64 = 6.0;

/// Default height allowance added during cutting planning (inches).
pub const DEFAULT_HEIGHT_ALLOWANCE_IN: f64 = 2.0;

/// Stone density factor used by [`estimated_weight_tons`].
const WEIGHT_DENSITY: f64 = 350.0;

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
struct RawAllowance {
    length_in: f64,
    height_in: f64,
}

impl Default for RawAllowance {
    fn default() -> Self {
        Self {
            length_in: DEFAULT_LENGTH_ALLOWANCE_IN,
            height_in: DEFAULT_HEIGHT_ALLOWANCE_IN,
        }
    }
}

/// Manufacturing margin added to a raw length and height. Always finite
/// and non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAllowance")]
pub struct Allowance {
    length_in: f64,
    height_in: f64,
}

impl Default for Allowance {
    fn default() -> Self {
        Self {
            length_in: DEFAULT_LENGTH_ALLOWANCE_IN,
            height_in: DEFAULT_HEIGHT_ALLOWANCE_IN,
        }
    }
}

impl TryFrom<RawAllowance> for Allowance {
    type Error = CoreError;

    fn try_from(raw: RawAllowance) -> Result<Self, Self::Error> {
        Self::new(raw.length_in, raw.height_in)
    }
}

impl Allowance {
    /// Creates a validated allowance.
    pub fn new(length_in: f64, height_in: f64) -> Result<Self, CoreError> {
        Ok(Self {
            length_in: check("length_allowance", length_in)?,
            height_in: check("height_allowance", height_in)?,
        })
    }

    pub fn length_in(&self) -> f64 {
        self.length_in
    }

    pub fn height_in(&self) -> f64 {
        self.height_in
    }
}

/// A length/height pair, used for slab faces, trim and polished sizes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FaceSize {
    pub length: f64,
    pub height: f64,
}

impl FaceSize {
    pub fn new(length: f64, height: f64) -> Self {
        Self { length, height }
    }
}

/// Allowance-adjusted dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdjustedDimensions {
    pub adjusted_length: f64,
    pub adjusted_height: f64,
    pub length_cm: f64,
    pub height_cm: f64,
}

/// Figures derived for one processing stage of a slab.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageFigures {
    pub adjusted: AdjustedDimensions,
    pub square_feet: f64,
    pub amount: f64,
}

/// Face area in square feet. A missing side means "not yet measured" and
/// yields zero.
pub fn square_feet(length: Option<f64>, height: Option<f64>) -> Result<f64, CoreError> {
    let length = check_opt("length", length)?;
    let height = check_opt("height", height)?;
    match (length, height) {
        (Some(l), Some(h)) => Ok(l * h / SQ_INCHES_PER_SQ_FOOT),
        _ => Ok(0.0),
    }
}

/// Volume in cubic inches, or `None` when any factor is unknown.
pub fn volume_cubic_inches(
    length: Option<f64>,
    breadth: Option<f64>,
    height: Option<f64>,
) -> Result<Option<f64>, CoreError> {
    let length = check_opt("length", length)?;
    let breadth = check_opt("breadth", breadth)?;
    let height = check_opt("height", height)?;
    Ok(match (length, breadth, height) {
        (Some(l), Some(b), Some(h)) => Some(l * b * h),
        _ => None,
    })
}

pub fn cubic_inches_to_cubic_cm(volume: f64) -> f64 {
    volume * CUBIC_CM_PER_CUBIC_INCH
}

pub fn inches_to_cm(value: f64) -> f64 {
    value * CM_PER_INCH
}

/// Estimated block weight in tons. Derived only; never accepted as input.
pub fn estimated_weight_tons(length: f64, breadth: f64, height: f64) -> Result<f64, CoreError> {
    let length = check("length", length)?;
    let breadth = check("breadth", breadth)?;
    let height = check("height", height)?;
    Ok(((length * breadth * height) / 1_000_000.0) * WEIGHT_DENSITY * 10.0 / 1000.0)
}

/// Adds the allowance to a raw length and height (cutting stage).
pub fn adjust_dimensions_with_allowance(
    length: f64,
    height: f64,
    allowance: &Allowance,
) -> Result<AdjustedDimensions, CoreError> {
    let length = check("length", length)?;
    let height = check("height", height)?;
    let adjusted_length = length + allowance.length_in;
    let adjusted_height = height + allowance.height_in;
    Ok(AdjustedDimensions {
        adjusted_length,
        adjusted_height,
        length_cm: inches_to_cm(adjusted_length),
        height_cm: inches_to_cm(adjusted_height),
    })
}

/// Allowance applied to the material removed by polishing, measured as
/// `dimensions - polished`.
pub fn polish_removal_with_allowance(
    dimensions: FaceSize,
    polished: FaceSize,
    allowance: &Allowance,
) -> Result<AdjustedDimensions, CoreError> {
    let length = removed("polished_length", dimensions.length, polished.length)?;
    let height = removed("polished_height", dimensions.height, polished.height)?;
    adjust_dimensions_with_allowance(length, height, allowance)
}

/// Allowance applied to `dimensions - trim`.
///
/// Some call sites size polishing from the recorded trim instead of the
/// measured polished size. Until both are reconciled against real data the
/// two stay separate operations.
pub fn trim_removal_with_allowance(
    dimensions: FaceSize,
    trim: FaceSize,
    allowance: &Allowance,
) -> Result<AdjustedDimensions, CoreError> {
    let length = removed("trim_length", dimensions.length, trim.length)?;
    let height = removed("trim_height", dimensions.height, trim.height)?;
    adjust_dimensions_with_allowance(length, height, allowance)
}

fn removed(field: &'static str, raw: f64, remaining: f64) -> Result<f64, CoreError> {
    let raw = check(field, raw)?;
    let remaining = check(field, remaining)?;
    check(field, raw - remaining)
}

pub fn amount(square_feet: f64, rate_per_sqft: f64) -> Result<f64, CoreError> {
    let square_feet = check("square_feet", square_feet)?;
    let rate = check("rate", rate_per_sqft)?;
    Ok(square_feet * rate)
}

/// Block footprint (length x breadth, both in cm) in square feet.
pub fn footprint_square_feet(length_cm: f64, breadth_cm: f64) -> Result<f64, CoreError> {
    let length = check("length", length_cm)?;
    let breadth = check("breadth", breadth_cm)?;
    Ok(length * breadth / SQ_CM_PER_SQ_FOOT)
}

/// Cutting-stage figures: raw size plus allowance, then area and cost.
pub fn cutting_figures(
    length: f64,
    height: f64,
    rate_per_sqft: f64,
    allowance: &Allowance,
) -> Result<StageFigures, CoreError> {
    let adjusted = adjust_dimensions_with_allowance(length, height, allowance)?;
    stage_figures(adjusted, rate_per_sqft)
}

/// Polishing-stage figures: removed material plus allowance, then area and
/// cost.
pub fn polishing_figures(
    dimensions: FaceSize,
    polished: FaceSize,
    rate_per_sqft: f64,
    allowance: &Allowance,
) -> Result<StageFigures, CoreError> {
    let adjusted = polish_removal_with_allowance(dimensions, polished, allowance)?;
    stage_figures(adjusted, rate_per_sqft)
}

/// Polishing-stage figures sized from the recorded trim: `(raw - trim)`
/// plus allowance.
pub fn trim_figures(
    dimensions: FaceSize,
    trim: FaceSize,
    rate_per_sqft: f64,
    allowance: &Allowance,
) -> Result<StageFigures, CoreError> {
    let adjusted = trim_removal_with_allowance(dimensions, trim, allowance)?;
    stage_figures(adjusted, rate_per_sqft)
}

fn stage_figures(adjusted: AdjustedDimensions, rate: f64) -> Result<StageFigures, CoreError> {
    let square_feet = square_feet(Some(adjusted.adjusted_length), Some(adjusted.adjusted_height))?;
    Ok(StageFigures {
        adjusted,
        square_feet,
        amount: amount(square_feet, rate)?,
    })
}

/// Rounds for display. Never feed the result back into a calculation.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}
