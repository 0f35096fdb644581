use thiserror::Error;

use dsflow_operators::OpError;

use crate::tree::NodeId;

/// Errors raised while a pass walks or rewrites the execution tree.
///
/// These are contract violations, never user mistakes.
#[derive(Debug, Error)]
pub enum PassError {
    #[error("internal pass error: {0}")]
    Internal(String),

    #[error("cycle detected: node {0} reached twice")]
    Cycle(NodeId),

    #[error("node {0} is not in the tree")]
    MissingNode(NodeId),
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("lowering error: {0}")]
    Lowering(String),

    #[error("pass '{pass}' failed: {source}")]
    Pass {
        pass: &'static str,
        #[source]
        source: PassError,
    },

    #[error("pipeline DSL error: {0}")]
    Dsl(String),
}

impl From<OpError> for PlanError {
    fn from(e: OpError) -> Self {
        PlanError::InvalidArgument(e.to_string())
    }
}

impl From<dsflow_core::Error> for PlanError {
    fn from(e: dsflow_core::Error) -> Self {
        PlanError::InvalidArgument(e.to_string())
    }
}

impl From<serde_yaml::Error> for PlanError {
    fn from(e: serde_yaml::Error) -> Self {
        PlanError::Dsl(e.to_string())
    }
}
