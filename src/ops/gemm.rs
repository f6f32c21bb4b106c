use crate::error::Error;
use crate::graph::{Graph, NodeId};
use crate::ops::{arg, Kernel, Op};
use crate::shape::Shape;
use crate::tensor::data::{with_numeric_type, HostData, Numeric, Scalar};
use crate::tensor::TensorDesc;
use itertools::Itertools;
use num_traits::Zero;

/// Contracts the last axis of `a` with the first axis of `b`. A scalar on either side
/// scales the other operand instead.
pub fn infer_dot(a: &TensorDesc, b: &TensorDesc) -> Result<TensorDesc, Error> {
    if a.element_type() != b.element_type() || !a.element_type().is_numeric() {
        return Err(Error::TypeMismatch(format!(
            "Dot is not defined on {:?} and {:?}",
            a, b
        )));
    }
    if a.rank() == 0 {
        return Ok(b.clone());
    }
    if b.rank() == 0 {
        return Ok(a.clone());
    }

    let (k_a, k_b) = (a.extents()[a.rank() - 1], b.extents()[0]);
    if k_a != k_b {
        return Err(Error::ShapeMismatch(format!(
            "Dot contracts axis of extent {} in {:?} with extent {} in {:?}",
            k_a, a, k_b, b
        )));
    }
    let extents = a.extents()[..a.rank() - 1]
        .iter()
        .chain(&b.extents()[1..])
        .copied()
        .collect_vec();
    Ok(TensorDesc::from_shape(a.element_type(), Shape::from(extents)))
}

impl Graph {
    pub fn dot(&mut self, a: NodeId, b: NodeId) -> Result<NodeId, Error> {
        let desc = infer_dot(self.desc(a)?, self.desc(b)?)?;
        Ok(self.push(Op::Dot, &[a, b], desc))
    }
}

// out[m, n] = sum_k a[m, k] * b[k, n], accumulated in index order
fn matmul<T: Numeric>(a: &[T], b: &[T], m: usize, k: usize, n: usize) -> Vec<T> {
    let mut out = vec![T::zero(); m * n];
    for i in 0..m {
        for p in 0..k {
            let lhs = a[i * k + p];
            let row = &b[p * n..(p + 1) * n];
            for (o, &rhs) in out[i * n..(i + 1) * n].iter_mut().zip(row) {
                *o = o.plus(lhs.times(rhs));
            }
        }
    }
    out
}

pub(crate) fn bind_dot(a: &TensorDesc, b: &TensorDesc, output: &TensorDesc) -> Result<Kernel, Error> {
    let scalar_lhs = a.rank() == 0;
    let scale = scalar_lhs || b.rank() == 0;
    let k = if scale { 1 } else { b.extents()[0] };
    let m = if scale { 0 } else { a.size() / k.max(1) };
    let n = if scale { 0 } else { b.size() / k.max(1) };
    let size = output.size();

    with_numeric_type!(
        output.element_type(),
        T,
        {
            let kernel: Kernel = Box::new(move |args: &[&HostData]| {
                let x = T::data_to_vec(arg(args, 0)?)?;
                let y = T::data_to_vec(arg(args, 1)?)?;
                if scale {
                    let (s, v) = if scalar_lhs { (x, y) } else { (y, x) };
                    let s = s.first().copied().unwrap_or_else(T::zero);
                    return Ok(T::vec_to_data(v.iter().map(|&e| s.times(e)).collect()));
                }
                if k == 0 {
                    return Ok(T::vec_to_data(vec![T::zero(); size]));
                }
                Ok(T::vec_to_data(matmul(x, y, m, k, n)))
            });
            Ok(kernel)
        },
        Err(Error::TypeMismatch(format!(
            "no Dot kernel for {}",
            output.element_type()
        )))
    )
}
