use crate::error::Error;
use crate::graph::{Graph, NodeId};
use crate::ops::{arg, Kernel, Op};
use crate::shape::{check_permutation, display_comma, normalize_axes, Array, Layout, Shape, ShapeError};
use crate::tensor::data::{with_numeric_type, with_scalar_type, HostData, Scalar};
use crate::tensor::TensorDesc;
use itertools::Itertools;
use num_traits::{One, Zero};

// ******************************** Inference ******************************** //

pub fn infer_reshape(
    x: &TensorDesc,
    input_order: &[usize],
    output_shape: &[usize],
) -> Result<TensorDesc, Error> {
    check_permutation(input_order, x.rank())?;
    let output = Shape::new(output_shape);
    if output.size() != x.size() {
        return Err(Error::ShapeMismatch(format!(
            "cannot reshape {:?} ({} elements) into {} ({} elements)",
            x,
            x.size(),
            output,
            output.size()
        )));
    }
    Ok(TensorDesc::from_shape(x.element_type(), output))
}

pub fn infer_broadcast(x: &TensorDesc, shape: &[usize], axes: &[usize]) -> Result<(TensorDesc, Array), Error> {
    let shape = Shape::new(shape);
    let axes = normalize_axes(axes, shape.rank())?;
    if &shape.remove_axes(&axes) != x.shape() {
        return Err(Error::ShapeMismatch(format!(
            "cannot broadcast {:?} to {} along axes ({})",
            x,
            shape,
            display_comma(&axes)
        )));
    }
    Ok((TensorDesc::from_shape(x.element_type(), shape), axes))
}

pub fn infer_one_hot(x: &TensorDesc, shape: &[usize], axis: usize) -> Result<TensorDesc, Error> {
    if !x.element_type().is_numeric() {
        return Err(Error::TypeMismatch(format!(
            "OneHot expects numeric indices, got {:?}",
            x
        )));
    }
    let shape = Shape::new(shape);
    let axes = normalize_axes(&[axis], shape.rank())?;
    if &shape.remove_axes(&axes) != x.shape() {
        return Err(Error::ShapeMismatch(format!(
            "one-hot axis {} of {} does not extend {:?}",
            axis, shape, x
        )));
    }
    Ok(TensorDesc::from_shape(x.element_type(), shape))
}

pub fn infer_concat(inputs: &[TensorDesc], axis: usize) -> Result<TensorDesc, Error> {
    let first = inputs
        .first()
        .ok_or_else(|| Error::ShapeMismatch("Concat needs at least one input".to_string()))?;
    if axis >= first.rank() {
        return Err(ShapeError::InvalidAxis {
            axis,
            rank: first.rank(),
        }
        .into());
    }

    let mut extents: Array = first.extents().iter().copied().collect();
    for x in &inputs[1..] {
        if x.element_type() != first.element_type() {
            return Err(Error::TypeMismatch(format!(
                "cannot concatenate {:?} with {:?}",
                first, x
            )));
        }
        let compatible = x.rank() == first.rank()
            && (0..x.rank()).all(|a| a == axis || x.extents()[a] == first.extents()[a]);
        if !compatible {
            return Err(Error::ShapeMismatch(format!(
                "cannot concatenate {:?} with {:?} along axis {}",
                first, x, axis
            )));
        }
        extents[axis] += x.extents()[axis];
    }
    Ok(TensorDesc::from_shape(first.element_type(), extents.into()))
}

fn check_bounds(x: &TensorDesc, lower: &[usize], upper: &[usize], strides: &[usize]) -> Result<(), ShapeError> {
    for len in [lower.len(), upper.len(), strides.len()] {
        if len != x.rank() {
            return Err(ShapeError::RankMismatch(x.rank(), len));
        }
    }
    for axis in 0..x.rank() {
        let extent = x.extents()[axis];
        if lower[axis] > upper[axis] || upper[axis] > extent {
            return Err(ShapeError::InvalidBound {
                axis,
                lower: lower[axis],
                upper: upper[axis],
                extent,
            });
        }
        if strides[axis] == 0 {
            return Err(ShapeError::InvalidStride(axis));
        }
    }
    Ok(())
}

fn slice_layout(x: &TensorDesc, lower: &[usize], upper: &[usize], strides: &[usize]) -> Layout {
    (0..x.rank()).fold(Layout::new(x.extents()), |layout, a| {
        layout.select_range(a, lower[a], upper[a], strides[a])
    })
}

pub fn infer_slice(
    x: &TensorDesc,
    lower: &[usize],
    upper: &[usize],
    strides: &[usize],
) -> Result<TensorDesc, Error> {
    check_bounds(x, lower, upper, strides)?;
    let layout = slice_layout(x, lower, upper, strides);
    Ok(TensorDesc::new(x.element_type(), layout.extents()))
}

pub fn infer_pad(
    x: &TensorDesc,
    value: &TensorDesc,
    below: &[usize],
    above: &[usize],
    interior: &[usize],
) -> Result<TensorDesc, Error> {
    if value.element_type() != x.element_type() {
        return Err(Error::TypeMismatch(format!(
            "pad value {:?} does not match {:?}",
            value, x
        )));
    }
    if value.rank() != 0 {
        return Err(Error::ShapeMismatch(format!(
            "pad value should be a scalar but is {:?}",
            value
        )));
    }
    for len in [below.len(), above.len(), interior.len()] {
        if len != x.rank() {
            return Err(ShapeError::RankMismatch(x.rank(), len).into());
        }
    }
    let extents = (0..x.rank())
        .map(|a| {
            let n = x.extents()[a];
            let body = if n == 0 { 0 } else { n + (n - 1) * interior[a] };
            below[a] + body + above[a]
        })
        .collect_vec();
    Ok(TensorDesc::new(x.element_type(), &extents))
}

// ******************************** Builders ******************************** //

impl Graph {
    /// Reads the input in `input_order` axis order and lays the elements out row-major in
    /// `output_shape`.
    pub fn reshape(
        &mut self,
        x: NodeId,
        input_order: &[usize],
        output_shape: &[usize],
    ) -> Result<NodeId, Error> {
        let desc = infer_reshape(self.desc(x)?, input_order, output_shape)?;
        let op = Op::Reshape {
            input_order: input_order.iter().copied().collect(),
            output_shape: desc.shape().clone(),
        };
        Ok(self.push(op, &[x], desc))
    }

    /// Repeats the input along `axes`, the positions in `shape` that the input lacks.
    pub fn broadcast(&mut self, x: NodeId, shape: &[usize], axes: &[usize]) -> Result<NodeId, Error> {
        let (desc, axes) = infer_broadcast(self.desc(x)?, shape, axes)?;
        let op = Op::Broadcast {
            shape: desc.shape().clone(),
            axes,
        };
        Ok(self.push(op, &[x], desc))
    }

    pub fn one_hot(&mut self, x: NodeId, shape: &[usize], axis: usize) -> Result<NodeId, Error> {
        let desc = infer_one_hot(self.desc(x)?, shape, axis)?;
        let op = Op::OneHot {
            shape: desc.shape().clone(),
            axis,
        };
        Ok(self.push(op, &[x], desc))
    }

    pub fn concat(&mut self, inputs: &[NodeId], axis: usize) -> Result<NodeId, Error> {
        let desc = infer_concat(&self.descs(inputs)?, axis)?;
        Ok(self.push(Op::Concat { axis }, inputs, desc))
    }

    pub fn slice(&mut self, x: NodeId, lower: &[usize], upper: &[usize]) -> Result<NodeId, Error> {
        let strides = vec![1; lower.len()];
        self.strided_slice(x, lower, upper, &strides)
    }

    pub fn strided_slice(
        &mut self,
        x: NodeId,
        lower: &[usize],
        upper: &[usize],
        strides: &[usize],
    ) -> Result<NodeId, Error> {
        let desc = infer_slice(self.desc(x)?, lower, upper, strides)?;
        let op = Op::Slice {
            lower: lower.iter().copied().collect(),
            upper: upper.iter().copied().collect(),
            strides: strides.iter().copied().collect(),
        };
        Ok(self.push(op, &[x], desc))
    }

    /// Copy of `x` with the strided region `lower..upper` overwritten by `source`.
    pub fn replace_slice(
        &mut self,
        x: NodeId,
        source: NodeId,
        lower: &[usize],
        upper: &[usize],
        strides: &[usize],
    ) -> Result<NodeId, Error> {
        let desc = self.desc(x)?.clone();
        let region = infer_slice(&desc, lower, upper, strides)?;
        let source_desc = self.desc(source)?;
        if source_desc.element_type() != region.element_type() {
            return Err(Error::TypeMismatch(format!(
                "replacement {:?} does not match slice {:?}",
                source_desc, region
            )));
        }
        if source_desc.shape() != region.shape() {
            return Err(Error::ShapeMismatch(format!(
                "replacement {:?} does not match slice {:?}",
                source_desc, region
            )));
        }
        let op = Op::ReplaceSlice {
            lower: lower.iter().copied().collect(),
            upper: upper.iter().copied().collect(),
            strides: strides.iter().copied().collect(),
        };
        Ok(self.push(op, &[x, source], desc))
    }

    pub fn reverse(&mut self, x: NodeId, axes: &[usize]) -> Result<NodeId, Error> {
        let desc = self.desc(x)?.clone();
        let axes = normalize_axes(axes, desc.rank())?;
        Ok(self.push(Op::Reverse { axes }, &[x], desc))
    }

    pub fn pad(
        &mut self,
        x: NodeId,
        value: NodeId,
        below: &[usize],
        above: &[usize],
        interior: &[usize],
    ) -> Result<NodeId, Error> {
        let desc = infer_pad(self.desc(x)?, self.desc(value)?, below, above, interior)?;
        let op = Op::Pad {
            below: below.iter().copied().collect(),
            above: above.iter().copied().collect(),
            interior: interior.iter().copied().collect(),
        };
        Ok(self.push(op, &[x, value], desc))
    }
}

// ******************************** Kernels ******************************** //

fn gather_kernel(indices: Vec<usize>) -> Kernel {
    Box::new(move |args: &[&HostData]| arg(args, 0)?.gather(&indices))
}

pub(crate) fn bind_reshape(x: &TensorDesc, input_order: &[usize]) -> Result<Kernel, Error> {
    if input_order.iter().enumerate().all(|(i, &a)| i == a) {
        return Ok(Box::new(|args: &[&HostData]| Ok(arg(args, 0)?.clone())));
    }
    Ok(gather_kernel(Layout::new(x.extents()).permute(input_order).indices()))
}

pub(crate) fn bind_broadcast(x: &TensorDesc, shape: &Shape, axes: &[usize]) -> Result<Kernel, Error> {
    let layout = axes.iter().fold(Layout::new(x.extents()), |layout, &a| {
        layout.expand(a, shape.extents()[a])
    });
    Ok(gather_kernel(layout.indices()))
}

pub(crate) fn bind_slice(
    x: &TensorDesc,
    lower: &[usize],
    upper: &[usize],
    strides: &[usize],
) -> Result<Kernel, Error> {
    Ok(gather_kernel(slice_layout(x, lower, upper, strides).indices()))
}

pub(crate) fn bind_reverse(x: &TensorDesc, axes: &[usize]) -> Result<Kernel, Error> {
    Ok(gather_kernel(Layout::new(x.extents()).reverse(axes).indices()))
}

pub(crate) fn bind_replace_slice(
    x: &TensorDesc,
    lower: &[usize],
    upper: &[usize],
    strides: &[usize],
) -> Result<Kernel, Error> {
    let targets = slice_layout(x, lower, upper, strides).indices();
    Ok(Box::new(move |args: &[&HostData]| {
        let mut out = arg(args, 0)?.clone();
        out.scatter(arg(args, 1)?, &targets)?;
        Ok(out)
    }))
}

pub(crate) fn bind_pad(
    x: &TensorDesc,
    output: &TensorDesc,
    below: &[usize],
    interior: &[usize],
) -> Result<Kernel, Error> {
    let out_strides = Shape::default_strides(output.extents());
    let strides = (0..x.rank())
        .map(|a| (out_strides[a] * (interior[a] + 1)) as isize)
        .collect_vec();
    let offset = (0..x.rank()).map(|a| below[a] * out_strides[a]).sum::<usize>();
    let targets = Layout::with_strides(x.extents(), &strides, offset as isize).indices();

    let size = output.size();
    Ok(Box::new(move |args: &[&HostData]| {
        let mut out = arg(args, 1)?.splat(size)?;
        out.scatter(arg(args, 0)?, &targets)?;
        Ok(out)
    }))
}

/// Each input value `k` sets position `k` along `axis`. Values that are negative,
/// fractional or not below the axis extent leave their row all zero.
pub(crate) fn bind_one_hot(x: &TensorDesc, shape: &Shape, axis: usize) -> Result<Kernel, Error> {
    let out_strides = Shape::default_strides(shape.extents());
    let strides = (0..shape.rank())
        .filter(|&a| a != axis)
        .map(|a| out_strides[a] as isize)
        .collect_vec();
    let bases = Layout::with_strides(x.extents(), &strides, 0).indices();
    let (depth, step, size) = (shape.extents()[axis], out_strides[axis], shape.size());

    with_numeric_type!(
        x.element_type(),
        T,
        {
            let kernel: Kernel = Box::new(move |args: &[&HostData]| {
                let x = T::data_to_vec(arg(args, 0)?)?;
                let mut out = vec![T::zero(); size];
                for (&v, &base) in x.iter().zip(&bases) {
                    let k = v.to_f64();
                    if k >= 0.0 && k.fract() == 0.0 && k < depth as f64 {
                        out[base + k as usize * step] = T::one();
                    }
                }
                Ok(T::vec_to_data(out))
            });
            Ok(kernel)
        },
        Err(Error::TypeMismatch(format!(
            "OneHot expects numeric indices, got {:?}",
            x
        )))
    )
}

pub(crate) fn bind_concat(inputs: &[TensorDesc], axis: usize) -> Result<Kernel, Error> {
    let first = inputs
        .first()
        .ok_or_else(|| Error::ShapeMismatch("Concat needs at least one input".to_string()))?;
    let outer: usize = first.extents()[..axis].iter().product();
    let inner: usize = first.extents()[axis + 1..].iter().product();

    // (input, start, length) runs in output order
    let runs = (0..outer)
        .flat_map(|o| {
            inputs.iter().enumerate().map(move |(k, x)| {
                let len = x.extents()[axis] * inner;
                (k, o * len, len)
            })
        })
        .filter(|&(_, _, len)| len > 0)
        .collect_vec();

    with_scalar_type!(first.element_type(), T, {
        let kernel: Kernel = Box::new(move |args: &[&HostData]| {
            let parts = args
                .iter()
                .map(|a| T::data_to_vec(a))
                .collect::<Result<Vec<&[T]>, Error>>()?;
            let mut out = Vec::new();
            for &(k, start, len) in &runs {
                let part = parts
                    .get(k)
                    .and_then(|p| p.get(start..start + len))
                    .ok_or_else(|| Error::Evaluation(format!("concat input #{} is too short", k)))?;
                out.extend_from_slice(part);
            }
            Ok(T::vec_to_data(out))
        });
        Ok(kernel)
    })
}
