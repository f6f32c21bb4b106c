use crate::error::Error;
use crate::graph::{Graph, NodeId};
use crate::ops::{arg, Kernel, Op};
use crate::shape::{Array, Layout, Shape, ShapeError};
use crate::tensor::data::{with_numeric_type, HostData, Numeric, Scalar};
use crate::tensor::TensorDesc;
use itertools::Itertools;
use num_traits::Zero;

// Both windowed ops use the NC{d...} layout: batch, channel, then spatial axes.

fn check_spatial(x: &TensorDesc, params: &[&[usize]]) -> Result<usize, Error> {
    if x.rank() < 3 {
        return Err(Error::ShapeMismatch(format!(
            "windowed ops need a batch, a channel and at least one spatial axis, got {:?}",
            x
        )));
    }
    let spatial = x.rank() - 2;
    for p in params {
        if p.len() != spatial {
            return Err(ShapeError::RankMismatch(spatial, p.len()).into());
        }
    }
    Ok(spatial)
}

fn check_steps(steps: &[usize]) -> Result<(), ShapeError> {
    match steps.iter().position(|&s| s == 0) {
        Some(axis) => Err(ShapeError::InvalidStride(axis)),
        None => Ok(()),
    }
}

/// Output extent of a window of effective size `window` sliding over `extent`.
fn slide(axis: usize, extent: usize, window: usize, stride: usize) -> Result<usize, ShapeError> {
    if window == 0 || window > extent {
        return Err(ShapeError::InvalidWindow {
            axis,
            window,
            extent,
        });
    }
    Ok((extent - window) / stride + 1)
}

pub fn infer_max_pool(x: &TensorDesc, window: &[usize], strides: &[usize]) -> Result<TensorDesc, Error> {
    if !x.element_type().is_numeric() {
        return Err(Error::TypeMismatch(format!("MaxPool is not defined on {:?}", x)));
    }
    let spatial = check_spatial(x, &[window, strides])?;
    check_steps(strides)?;

    let mut extents: Array = x.extents()[..2].iter().copied().collect();
    for i in 0..spatial {
        extents.push(slide(i + 2, x.extents()[i + 2], window[i], strides[i])?);
    }
    Ok(TensorDesc::from_shape(x.element_type(), Shape::from(extents)))
}

pub fn infer_convolution(
    data: &TensorDesc,
    filters: &TensorDesc,
    strides: &[usize],
    dilation: &[usize],
) -> Result<TensorDesc, Error> {
    if data.element_type() != filters.element_type() || !data.element_type().is_numeric() {
        return Err(Error::TypeMismatch(format!(
            "Convolution is not defined on {:?} and {:?}",
            data, filters
        )));
    }
    let spatial = check_spatial(data, &[strides, dilation])?;
    check_steps(strides)?;
    check_steps(dilation)?;
    if filters.rank() != data.rank() || filters.extents()[1] != data.extents()[1] {
        return Err(Error::ShapeMismatch(format!(
            "filters {:?} do not match data {:?}",
            filters, data
        )));
    }

    let mut extents: Array = [data.extents()[0], filters.extents()[0]].into_iter().collect();
    for i in 0..spatial {
        let k = filters.extents()[i + 2];
        let effective = if k == 0 {
            0
        } else {
            (k - 1).saturating_mul(dilation[i]).saturating_add(1)
        };
        extents.push(slide(i + 2, data.extents()[i + 2], effective, strides[i])?);
    }
    Ok(TensorDesc::from_shape(data.element_type(), Shape::from(extents)))
}

impl Graph {
    pub fn max_pool(&mut self, x: NodeId, window: &[usize], strides: &[usize]) -> Result<NodeId, Error> {
        let desc = infer_max_pool(self.desc(x)?, window, strides)?;
        let op = Op::MaxPool {
            window: window.iter().copied().collect(),
            strides: strides.iter().copied().collect(),
        };
        Ok(self.push(op, &[x], desc))
    }

    pub fn convolution(
        &mut self,
        data: NodeId,
        filters: NodeId,
        strides: &[usize],
        dilation: &[usize],
    ) -> Result<NodeId, Error> {
        let desc = infer_convolution(self.desc(data)?, self.desc(filters)?, strides, dilation)?;
        let op = Op::Convolution {
            strides: strides.iter().copied().collect(),
            dilation: dilation.iter().copied().collect(),
        };
        Ok(self.push(op, &[data, filters], desc))
    }
}

/// Step along a spatial axis of extent `extent`. Steps past the end only ever reach the
/// first position, so they are clamped to keep offsets in range.
fn step(n: usize, extent: usize) -> isize {
    n.min(extent.max(1)) as isize
}

fn strides_of(x: &TensorDesc) -> Vec<isize> {
    Shape::default_strides(x.extents())
        .iter()
        .map(|&s| s as isize)
        .collect()
}

pub(crate) fn bind_max_pool(
    x: &TensorDesc,
    output: &TensorDesc,
    window: &[usize],
    strides: &[usize],
) -> Result<Kernel, Error> {
    let xs = strides_of(x);
    let base_strides = (0..output.rank())
        .map(|a| if a < 2 { xs[a] } else { xs[a] * step(strides[a - 2], x.extents()[a]) })
        .collect_vec();
    let bases = Layout::with_strides(output.extents(), &base_strides, 0).indices();
    let offsets = Layout::with_strides(window, &xs[2..], 0).indices();

    with_numeric_type!(
        x.element_type(),
        T,
        {
            let kernel: Kernel = Box::new(move |args: &[&HostData]| {
                let x = T::data_to_vec(arg(args, 0)?)?;
                let out = bases
                    .iter()
                    .map(|&b| {
                        offsets
                            .iter()
                            .fold(T::lowest(), |acc, &o| acc.max_nan(x[b + o]))
                    })
                    .collect();
                Ok(T::vec_to_data(out))
            });
            Ok(kernel)
        },
        Err(Error::TypeMismatch(format!("MaxPool is not defined on {:?}", x)))
    )
}

pub(crate) fn bind_convolution(
    data: &TensorDesc,
    filters: &TensorDesc,
    output: &TensorDesc,
    strides: &[usize],
    dilation: &[usize],
) -> Result<Kernel, Error> {
    let (ds, fs) = (strides_of(data), strides_of(filters));
    let rank = output.rank();

    let data_base = (0..rank)
        .map(|a| match a {
            0 => ds[0],
            1 => 0,
            _ => ds[a] * step(strides[a - 2], data.extents()[a]),
        })
        .collect_vec();
    let filter_base = (0..rank).map(|a| if a == 1 { fs[0] } else { 0 }).collect_vec();

    // window over (input channel, kernel positions...)
    let window = filters.extents()[1..].to_vec();
    let data_window = (1..rank)
        .map(|a| if a == 1 { ds[1] } else { ds[a] * step(dilation[a - 2], data.extents()[a]) })
        .collect_vec();

    let data_bases = Layout::with_strides(output.extents(), &data_base, 0).indices();
    let filter_bases = Layout::with_strides(output.extents(), &filter_base, 0).indices();
    let data_offsets = Layout::with_strides(&window, &data_window, 0).indices();
    let filter_offsets = Layout::with_strides(&window, &fs[1..], 0).indices();

    with_numeric_type!(
        output.element_type(),
        T,
        {
            let kernel: Kernel = Box::new(move |args: &[&HostData]| {
                let x = T::data_to_vec(arg(args, 0)?)?;
                let w = T::data_to_vec(arg(args, 1)?)?;
                let out = data_bases
                    .iter()
                    .zip(&filter_bases)
                    .map(|(&db, &fb)| {
                        data_offsets
                            .iter()
                            .zip(&filter_offsets)
                            .fold(T::zero(), |acc, (&d, &f)| acc.plus(x[db + d].times(w[fb + f])))
                    })
                    .collect();
                Ok(T::vec_to_data(out))
            });
            Ok(kernel)
        },
        Err(Error::TypeMismatch(format!(
            "Convolution is not defined on {:?}",
            data
        )))
    )
}
