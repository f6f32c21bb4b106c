pub mod backend;
pub mod compiler;
pub mod error;
pub mod graph;
pub mod ops;
pub mod runtime;
pub mod shape;
pub mod tensor;

pub use backend::{Backend, BackendKind, CallFrame, TensorView};
pub use compiler::{compile, CompiledPlan};
pub use error::Error;
pub use graph::{Function, Graph, NodeId};
pub use runtime::{Manager, RuntimeConfig};
pub use tensor::data::{ElementType, HostData};
pub use tensor::TensorDesc;
