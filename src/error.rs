use crate::physical::plan::PlanState;
use thiserror::Error;

/// Error taxonomy shared by the runtime and the physical planner.
///
/// Classification guidance:
/// - [`EngineError::InvalidConfig`]: contract violations detected while a plan or stage is
///   being constructed (non-positive arity, asymmetric map without a right input, a selector
///   name reused with a different key type). Never retried.
/// - [`EngineError::PlanReused`]: a single-use plan was subscribed after it left `Unbuilt`.
/// - [`EngineError::LaneOutOfRange`]: a lane index outside of a fan-out node's arity.
/// - [`EngineError::Upstream`]: failures raised by sources or operators. These travel through
///   the dataflow graph unmodified and surface at the subscriber.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Invalid or inconsistent configuration discovered at construction time.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A plan was subscribed twice, or after disposal.
    #[error("plan cannot be subscribed in state {state:?}")]
    PlanReused {
        /// The state the plan was in when the subscription was attempted.
        state: PlanState,
    },

    /// A lane index that does not exist on the fan-out node.
    #[error("lane {lane} out of range for arity {arity}")]
    LaneOutOfRange {
        /// Requested lane.
        lane: usize,
        /// Number of lanes on the node.
        arity: usize,
    },

    /// An error raised upstream (source or operator) and propagated to the subscriber.
    #[error("upstream failure: {0}")]
    Upstream(String),
}

impl EngineError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

/// Standard result alias for the engine.
pub type Result<T> = std::result::Result<T, EngineError>;
