use crate::error::Error;
use crate::graph::Function;
use crate::shape::{Array, Shape};
use crate::tensor::data::{ElementType, HostData};
use crate::tensor::TensorDesc;
use std::sync::Arc;

pub mod conv;
pub mod core;
pub mod gemm;
pub mod map;
pub mod reduce;

pub use self::map::{BinaryOp, CompareOp, UnaryOp};
pub use self::reduce::Reduction;

/// A node's evaluation routine, bound once per compiled plan. Receives the values of the
/// node's inputs in order and returns a freshly allocated output.
pub type Kernel = Box<dyn Fn(&[&HostData]) -> Result<HostData, Error> + Send + Sync>;

// Used in plan summaries
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Category {
    Data,
    Map,
    Reduce,
    Contract,
    Layout,
    Window,
}

#[derive(Clone, Debug)]
pub enum Op {
    Parameter,
    Constant(HostData),

    Unary(UnaryOp),
    Binary(BinaryOp),
    Compare(CompareOp),
    Not,
    Select,
    Convert(ElementType),

    Dot,

    Reduction {
        reduction: Reduction,
        axes: Array,
    },
    Reduce {
        function: Arc<Function>,
        axes: Array,
    },

    Reshape {
        input_order: Array,
        output_shape: Shape,
    },
    Broadcast {
        shape: Shape,
        axes: Array,
    },
    OneHot {
        shape: Shape,
        axis: usize,
    },
    Concat {
        axis: usize,
    },
    Slice {
        lower: Array,
        upper: Array,
        strides: Array,
    },
    ReplaceSlice {
        lower: Array,
        upper: Array,
        strides: Array,
    },
    Reverse {
        axes: Array,
    },
    Pad {
        below: Array,
        above: Array,
        interior: Array,
    },

    MaxPool {
        window: Array,
        strides: Array,
    },
    Convolution {
        strides: Array,
        dilation: Array,
    },
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::Parameter => "Parameter",
            Op::Constant(_) => "Constant",
            Op::Unary(op) => op.name(),
            Op::Binary(op) => op.name(),
            Op::Compare(op) => op.name(),
            Op::Not => "Not",
            Op::Select => "Select",
            Op::Convert(_) => "Convert",
            Op::Dot => "Dot",
            Op::Reduction { reduction, .. } => reduction.name(),
            Op::Reduce { .. } => "Reduce",
            Op::Reshape { .. } => "Reshape",
            Op::Broadcast { .. } => "Broadcast",
            Op::OneHot { .. } => "OneHot",
            Op::Concat { .. } => "Concat",
            Op::Slice { .. } => "Slice",
            Op::ReplaceSlice { .. } => "ReplaceSlice",
            Op::Reverse { .. } => "Reverse",
            Op::Pad { .. } => "Pad",
            Op::MaxPool { .. } => "MaxPool",
            Op::Convolution { .. } => "Convolution",
        }
    }

    pub fn category(&self) -> Category {
        match self {
            Op::Parameter | Op::Constant(_) => Category::Data,
            Op::Unary(_)
            | Op::Binary(_)
            | Op::Compare(_)
            | Op::Not
            | Op::Select
            | Op::Convert(_) => Category::Map,
            Op::Dot => Category::Contract,
            Op::Reduction { .. } | Op::Reduce { .. } => Category::Reduce,
            Op::Reshape { .. }
            | Op::Broadcast { .. }
            | Op::OneHot { .. }
            | Op::Concat { .. }
            | Op::Slice { .. }
            | Op::ReplaceSlice { .. }
            | Op::Reverse { .. }
            | Op::Pad { .. } => Category::Layout,
            Op::MaxPool { .. } | Op::Convolution { .. } => Category::Window,
        }
    }

    /// Resolves the evaluation routine for this operator at the given input and output
    /// types. Parameters have no kernel; the plan feeds them from the call arguments.
    pub(crate) fn bind(&self, inputs: &[TensorDesc], output: &TensorDesc) -> Result<Kernel, Error> {
        match self {
            Op::Parameter => Err(Error::Evaluation(
                "parameters are bound by the calling convention".to_string(),
            )),
            Op::Constant(data) => {
                let data = data.clone();
                Ok(Box::new(move |_: &[&HostData]| Ok(data.clone())))
            }
            Op::Unary(op) => map::bind_unary(*op, output),
            Op::Binary(op) => map::bind_binary(*op, output),
            Op::Compare(op) => map::bind_compare(*op, &inputs[0]),
            Op::Not => map::bind_not(),
            Op::Select => map::bind_select(output),
            Op::Convert(to) => map::bind_convert(inputs[0].element_type(), *to),
            Op::Dot => gemm::bind_dot(&inputs[0], &inputs[1], output),
            Op::Reduction { reduction, axes } => {
                reduce::bind_reduction(*reduction, &inputs[0], axes)
            }
            Op::Reduce { function, axes } => reduce::bind_reduce(function, &inputs[0], axes),
            Op::Reshape { input_order, .. } => self::core::bind_reshape(&inputs[0], input_order),
            Op::Broadcast { shape, axes } => self::core::bind_broadcast(&inputs[0], shape, axes),
            Op::OneHot { shape, axis } => self::core::bind_one_hot(&inputs[0], shape, *axis),
            Op::Concat { axis } => self::core::bind_concat(inputs, *axis),
            Op::Slice {
                lower,
                upper,
                strides,
            } => self::core::bind_slice(&inputs[0], lower, upper, strides),
            Op::ReplaceSlice {
                lower,
                upper,
                strides,
            } => self::core::bind_replace_slice(&inputs[0], lower, upper, strides),
            Op::Reverse { axes } => self::core::bind_reverse(&inputs[0], axes),
            Op::Pad {
                below,
                above: _,
                interior,
            } => self::core::bind_pad(&inputs[0], output, below, interior),
            Op::MaxPool { window, strides } => conv::bind_max_pool(&inputs[0], output, window, strides),
            Op::Convolution { strides, dilation } => {
                conv::bind_convolution(&inputs[0], &inputs[1], output, strides, dilation)
            }
        }
    }
}

/// Fetches argument `i` of a kernel call.
pub(crate) fn arg<'a>(args: &[&'a HostData], i: usize) -> Result<&'a HostData, Error> {
    args.get(i).copied().ok_or_else(|| {
        Error::Evaluation(format!("kernel expected argument #{} of {}", i, args.len()))
    })
}
