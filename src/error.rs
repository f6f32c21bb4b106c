use crate::backend::memory::MemoryError;
use crate::graph::NodeId;
use crate::shape::ShapeError;
use crate::tensor::TensorDesc;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("shape error: {0}")]
    Shape(#[from] ShapeError),

    #[error("node {0} does not belong to this graph")]
    UnknownNode(NodeId),

    #[error("node {0} is not a parameter")]
    NotAParameter(NodeId),

    #[error("parameter {0} is listed more than once")]
    DuplicateParameter(NodeId),

    #[error("parameter {0} is reachable from the results but not declared")]
    UngroundedInput(NodeId),

    #[error("graph contains a cycle through node {0}")]
    CyclicGraph(NodeId),

    #[error("byte range {offset}..{offset}+{length} exceeds buffer of {size} bytes")]
    OutOfBounds {
        offset: usize,
        length: usize,
        size: usize,
    },

    #[error("{role} #{index} expected {expected:?} but got {found:?}")]
    SignatureMismatch {
        role: &'static str,
        index: usize,
        expected: TensorDesc,
        found: TensorDesc,
    },

    #[error("expected {expected} {role} tensors but got {found}")]
    ArityMismatch {
        role: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("unknown backend '{0}'")]
    UnknownBackend(String),

    #[error("backend {0} is not available in this build")]
    BackendUnavailable(String),

    #[error("{role} #{index} was allocated by another backend")]
    ForeignTensorView { role: &'static str, index: usize },

    #[error("integer division by zero")]
    DivisionByZero,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("evaluation failed: {0}")]
    Evaluation(String),

    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),
}
