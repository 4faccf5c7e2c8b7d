//! Core error types.

use thiserror::Error;

/// Errors from the lifecycle, measurement and usage components.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    #[error("invalid transition: cannot apply '{event}' to {entity} in state '{state}'")]
    InvalidTransition {
        entity: &'static str,
        state: String,
        event: String,
    },

    #[error("missing trim data: trim length and height must both be positive")]
    MissingTrimData,

    #[error("slab is not polished (state '{state}')")]
    NotPolished { state: String },

    #[error("slab already sold: {slab_id}")]
    AlreadySold { slab_id: String },

    #[error("stale state: expected version {expected}, actual {actual}")]
    StaleState { expected: u64, actual: u64 },

    #[error("invalid area: {area}")]
    InvalidArea { area: f64 },

    #[error("invalid dimension '{field}': {value}")]
    InvalidDimension { field: &'static str, value: f64 },

    #[error("'{field}' has not been measured")]
    Unmeasured { field: &'static str },

    #[error("block not found: {block_id}")]
    BlockNotFound { block_id: String },

    #[error("slab not found: {slab_id}")]
    SlabNotFound { slab_id: String },

    #[error("{entity} already exists: {id}")]
    EntityExists { entity: &'static str, id: String },

    #[error("machine not found: {machine_id}")]
    MachineNotFound { machine_id: String },

    #[error("component not found: {component_id}")]
    ComponentNotFound { component_id: String },

    #[error("component already exists: {component_id}")]
    ComponentExists { component_id: String },

    #[error("machine {machine_id} cannot process a {required} association")]
    CapabilityMismatch {
        machine_id: String,
        required: &'static str,
    },

    #[error("component {component_id} does not belong to machine {machine_id}")]
    ComponentMachineMismatch {
        component_id: String,
        machine_id: String,
    },
}

impl CoreError {
    /// Returns whether the caller should re-read the entity and retry.
    pub fn is_conflict(&self) -> bool {
        matches!(self, CoreError::StaleState { .. })
    }

    /// Returns a stable error code for outer layers to translate.
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::InvalidTransition { .. } => "INVALID_TRANSITION",
            CoreError::MissingTrimData => "MISSING_TRIM_DATA",
            CoreError::NotPolished { .. } => "NOT_POLISHED",
            CoreError::AlreadySold { .. } => "ALREADY_SOLD",
            CoreError::StaleState { .. } => "STALE_STATE",
            CoreError::InvalidArea { .. } => "INVALID_AREA",
            CoreError::InvalidDimension { .. } => "INVALID_DIMENSION",
            CoreError::Unmeasured { .. } => "UNMEASURED",
            CoreError::BlockNotFound { .. } => "BLOCK_NOT_FOUND",
            CoreError::SlabNotFound { .. } => "SLAB_NOT_FOUND",
            CoreError::EntityExists { .. } => "ENTITY_EXISTS",
            CoreError::MachineNotFound { .. } => "MACHINE_NOT_FOUND",
            CoreError::ComponentNotFound { .. } => "COMPONENT_NOT_FOUND",
            CoreError::ComponentExists { .. } => "COMPONENT_EXISTS",
            CoreError::CapabilityMismatch { .. } => "CAPABILITY_MISMATCH",
            CoreError::ComponentMachineMismatch { .. } => "COMPONENT_MACHINE_MISMATCH",
        }
    }
}
