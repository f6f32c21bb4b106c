use crate::compiler;
use crate::error::Error;
use crate::graph::{Function, Graph, NodeId};
use crate::ops::{arg, Kernel, Op};
use crate::shape::{normalize_axes, Array, Layout};
use crate::tensor::data::{with_numeric_type, with_scalar_type, ElementType, HostData, Numeric, Scalar};
use crate::tensor::TensorDesc;
use std::sync::Arc;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Reduction {
    Sum,
    Product,
    Max,
    Min,
}

impl Reduction {
    pub fn name(&self) -> &'static str {
        match self {
            Reduction::Sum => "Sum",
            Reduction::Product => "Product",
            Reduction::Max => "Max",
            Reduction::Min => "Min",
        }
    }
}

pub fn infer_reduction(
    reduction: Reduction,
    x: &TensorDesc,
    axes: &[usize],
) -> Result<(TensorDesc, Array), Error> {
    if !x.element_type().is_numeric() {
        return Err(Error::TypeMismatch(format!(
            "{} is not defined on {:?}",
            reduction.name(),
            x
        )));
    }
    let axes = normalize_axes(axes, x.rank())?;
    let desc = TensorDesc::from_shape(x.element_type(), x.shape().remove_axes(&axes));
    Ok((desc, axes))
}

fn check_scalar(role: &str, desc: &TensorDesc, element_type: ElementType) -> Result<(), Error> {
    if desc.element_type() != element_type {
        return Err(Error::TypeMismatch(format!(
            "{} should be {} but is {:?}",
            role, element_type, desc
        )));
    }
    if desc.rank() != 0 {
        return Err(Error::ShapeMismatch(format!(
            "{} should be a scalar but is {:?}",
            role, desc
        )));
    }
    Ok(())
}

/// Checks that `function` folds two scalars of `element_type` into one.
pub fn check_reduction_function(function: &Function, element_type: ElementType) -> Result<(), Error> {
    let params = function.parameter_descs();
    if params.len() != 2 {
        return Err(Error::ArityMismatch {
            role: "reduction function parameter",
            expected: 2,
            found: params.len(),
        });
    }
    let results = function.result_descs();
    if results.len() != 1 {
        return Err(Error::ArityMismatch {
            role: "reduction function result",
            expected: 1,
            found: results.len(),
        });
    }
    for desc in &params {
        check_scalar("reduction function parameter", desc, element_type)?;
    }
    check_scalar("reduction function result", &results[0], element_type)
}

impl Graph {
    pub fn reduction(
        &mut self,
        reduction: Reduction,
        x: NodeId,
        axes: &[usize],
    ) -> Result<NodeId, Error> {
        let (desc, axes) = infer_reduction(reduction, self.desc(x)?, axes)?;
        Ok(self.push(Op::Reduction { reduction, axes }, &[x], desc))
    }

    pub fn sum(&mut self, x: NodeId, axes: &[usize]) -> Result<NodeId, Error> {
        self.reduction(Reduction::Sum, x, axes)
    }

    pub fn product(&mut self, x: NodeId, axes: &[usize]) -> Result<NodeId, Error> {
        self.reduction(Reduction::Product, x, axes)
    }

    pub fn max(&mut self, x: NodeId, axes: &[usize]) -> Result<NodeId, Error> {
        self.reduction(Reduction::Max, x, axes)
    }

    pub fn min(&mut self, x: NodeId, axes: &[usize]) -> Result<NodeId, Error> {
        self.reduction(Reduction::Min, x, axes)
    }

    /// Folds `x` along `axes` with a user-supplied scalar function, starting from the scalar
    /// `init` for every output element.
    pub fn reduce<F>(
        &mut self,
        x: NodeId,
        init: NodeId,
        function: F,
        axes: &[usize],
    ) -> Result<NodeId, Error>
    where
        F: Into<Arc<Function>>,
    {
        let function = function.into();
        let arg = self.desc(x)?.clone();
        check_scalar("reduction initial value", self.desc(init)?, arg.element_type())?;
        check_reduction_function(&function, arg.element_type())?;

        let axes = normalize_axes(axes, arg.rank())?;
        let desc = TensorDesc::from_shape(arg.element_type(), arg.shape().remove_axes(&axes));
        Ok(self.push(Op::Reduce { function, axes }, &[x, init], desc))
    }
}

/// Gather order for a reduction: each output element owns `inner` consecutive entries of
/// `indices`.
struct ReduceIndex {
    outer: usize,
    inner: usize,
    indices: Vec<usize>,
}

impl ReduceIndex {
    fn new(x: &TensorDesc, axes: &[usize]) -> Self {
        let kept = (0..x.rank()).filter(|a| !axes.contains(a));
        let order: Array = kept.clone().chain(axes.iter().copied()).collect();

        let outer = kept.map(|a| x.extents()[a]).product();
        let inner = axes.iter().map(|&a| x.extents()[a]).product();
        let indices = if inner == 0 {
            Vec::new()
        } else {
            Layout::new(x.extents()).permute(&order).indices()
        };

        ReduceIndex {
            outer,
            inner,
            indices,
        }
    }

    fn fold<T, F>(&self, x: &[T], init: T, f: F) -> Result<Vec<T>, Error>
    where
        T: Copy,
        F: Fn(T, T) -> Result<T, Error>,
    {
        if self.inner == 0 {
            return Ok(vec![init; self.outer]);
        }
        self.indices
            .chunks(self.inner)
            .map(|chunk| chunk.iter().try_fold(init, |acc, &i| f(acc, x[i])))
            .collect()
    }
}

fn identity<T: Numeric>(reduction: Reduction) -> (T, fn(T, T) -> T) {
    match reduction {
        Reduction::Sum => (T::zero(), T::plus as fn(T, T) -> T),
        Reduction::Product => (T::one(), T::times as fn(T, T) -> T),
        Reduction::Max => (T::lowest(), T::max_nan as fn(T, T) -> T),
        Reduction::Min => (T::highest(), T::min_nan as fn(T, T) -> T),
    }
}

pub(crate) fn bind_reduction(
    reduction: Reduction,
    x: &TensorDesc,
    axes: &[usize],
) -> Result<Kernel, Error> {
    let index = ReduceIndex::new(x, axes);
    with_numeric_type!(
        x.element_type(),
        T,
        {
            let (init, f) = identity::<T>(reduction);
            let kernel: Kernel = Box::new(move |args: &[&HostData]| {
                let x = T::data_to_vec(arg(args, 0)?)?;
                Ok(T::vec_to_data(index.fold(x, init, |a, b| Ok(f(a, b)))?))
            });
            Ok(kernel)
        },
        Err(Error::TypeMismatch(format!(
            "no {} kernel for {}",
            reduction.name(),
            x.element_type()
        )))
    )
}

pub(crate) fn bind_reduce(
    function: &Function,
    x: &TensorDesc,
    axes: &[usize],
) -> Result<Kernel, Error> {
    let plan = compiler::compile(function)?;
    let index = ReduceIndex::new(x, axes);
    with_scalar_type!(x.element_type(), T, {
        let kernel: Kernel = Box::new(move |args: &[&HostData]| {
            let x = T::data_to_vec(arg(args, 0)?)?;
            let init = first::<T>(arg(args, 1)?)?;
            let out = index.fold(x, init, |acc, v| {
                let out = plan.evaluate(&[T::vec_to_data(vec![acc]), T::vec_to_data(vec![v])])?;
                match out.first() {
                    Some(data) => first::<T>(data),
                    None => Err(Error::Evaluation(
                        "reduction function produced no result".to_string(),
                    )),
                }
            })?;
            Ok(T::vec_to_data(out))
        });
        Ok(kernel)
    })
}

fn first<T: Scalar>(data: &HostData) -> Result<T, Error> {
    T::data_to_vec(data)?
        .first()
        .copied()
        .ok_or_else(|| Error::Evaluation("expected a scalar value".to_string()))
}
