use itertools::Itertools;
use smallvec::SmallVec;
use std::fmt;
use std::fmt::{Display, Formatter};
use thiserror::Error;

pub type Array = SmallVec<[usize; 5]>;

pub type Strides = SmallVec<[isize; 5]>;

pub fn display_comma(arr: &[usize]) -> String {
    arr.iter().map(|s| s.to_string()).join(", ")
}

#[derive(Error, Clone, Debug, Eq, PartialEq)]
pub enum ShapeError {
    #[error("size mismatch! expected {} but got {}.", .0, .1)]
    SizeMismatch(usize, usize),

    #[error("rank mismatch! expected {} but got {}.", .0, .1)]
    RankMismatch(usize, usize),

    #[error("axis {} is out of range for a tensor of rank {}", .axis, .rank)]
    InvalidAxis { axis: usize, rank: usize },

    #[error("axis {} is listed more than once", .0)]
    DuplicateAxis(usize),

    #[error("({}) is not a permutation of the input axes", display_comma(.0))]
    InvalidPermutation(Vec<usize>),

    #[error("invalid bound {}..{} on axis {} with extent {}", .lower, .upper, .axis, .extent)]
    InvalidBound {
        axis: usize,
        lower: usize,
        upper: usize,
        extent: usize,
    },

    #[error("stride on axis {} should be larger than 0", .0)]
    InvalidStride(usize),

    #[error("window of extent {} does not fit axis {} with extent {}", .window, .axis, .extent)]
    InvalidWindow {
        axis: usize,
        window: usize,
        extent: usize,
    },
}

/// Validates an axis set against `rank` and returns it in ascending order.
pub fn normalize_axes(axes: &[usize], rank: usize) -> Result<Array, ShapeError> {
    let mut sorted: Array = axes.iter().copied().collect();
    sorted.sort_unstable();

    for (i, &axis) in sorted.iter().enumerate() {
        if axis >= rank {
            return Err(ShapeError::InvalidAxis { axis, rank });
        }
        if i > 0 && sorted[i - 1] == axis {
            return Err(ShapeError::DuplicateAxis(axis));
        }
    }
    Ok(sorted)
}

/// Checks that `order` is a permutation of `0..rank`.
pub fn check_permutation(order: &[usize], rank: usize) -> Result<(), ShapeError> {
    if order.len() != rank {
        return Err(ShapeError::RankMismatch(rank, order.len()));
    }
    let mut seen = vec![false; rank];
    for &axis in order {
        match seen.get_mut(axis) {
            Some(s) if !*s => *s = true,
            _ => return Err(ShapeError::InvalidPermutation(order.to_vec())),
        }
    }
    Ok(())
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Shape {
    extents: Array,
}

impl Shape {
    pub fn new(extents: &[usize]) -> Shape {
        Shape {
            extents: extents.iter().copied().collect(),
        }
    }

    pub fn scalar() -> Shape {
        Shape::default()
    }

    pub fn default_strides(extents: &[usize]) -> Array {
        let mut strides: Array = SmallVec::from_elem(1, extents.len());
        for i in (0..extents.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * extents[i + 1];
        }
        strides
    }

    pub fn rank(&self) -> usize {
        self.extents.len()
    }

    pub fn extents(&self) -> &[usize] {
        &self.extents
    }

    pub fn extent(&self, axis: usize) -> Result<usize, ShapeError> {
        self.extents.get(axis).copied().ok_or(ShapeError::InvalidAxis {
            axis,
            rank: self.rank(),
        })
    }

    /// Number of elements. A rank-0 shape holds one element.
    pub fn size(&self) -> usize {
        self.extents.iter().product()
    }

    pub fn is_scalar(&self) -> bool {
        self.extents.is_empty()
    }

    /// Drops the given (already validated) axes.
    pub fn remove_axes(&self, axes: &[usize]) -> Shape {
        Shape {
            extents: self
                .extents
                .iter()
                .enumerate()
                .filter(|(i, _)| !axes.contains(i))
                .map(|(_, &e)| e)
                .collect(),
        }
    }
}

impl From<Array> for Shape {
    fn from(extents: Array) -> Self {
        Shape { extents }
    }
}

impl From<Vec<usize>> for Shape {
    fn from(extents: Vec<usize>) -> Self {
        Shape {
            extents: extents.into(),
        }
    }
}

impl Display for Shape {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "({})", display_comma(&self.extents))
    }
}

/// A strided view over a row-major buffer. Strides may be zero (broadcast) or negative
/// (reversed), so layout kernels can precompute gather and scatter maps from it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Layout {
    extents: Array,
    strides: Strides,
    offset: isize,
}

impl Layout {
    pub fn new(extents: &[usize]) -> Layout {
        Layout {
            extents: extents.iter().copied().collect(),
            strides: Shape::default_strides(extents)
                .iter()
                .map(|&s| s as isize)
                .collect(),
            offset: 0,
        }
    }

    pub fn with_strides(extents: &[usize], strides: &[isize], offset: isize) -> Layout {
        Layout {
            extents: extents.iter().copied().collect(),
            strides: strides.iter().copied().collect(),
            offset,
        }
    }

    pub fn extents(&self) -> &[usize] {
        &self.extents
    }

    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    pub fn size(&self) -> usize {
        self.extents.iter().product()
    }

    /// Reorders the axes; `order[i]` names the source axis placed at position `i`.
    pub fn permute(&self, order: &[usize]) -> Layout {
        Layout {
            extents: order.iter().map(|&a| self.extents[a]).collect(),
            strides: order.iter().map(|&a| self.strides[a]).collect(),
            offset: self.offset,
        }
    }

    /// Inserts a stride-0 axis, repeating the existing data `extent` times.
    pub fn expand(&self, axis: usize, extent: usize) -> Layout {
        let mut layout = self.clone();
        layout.extents.insert(axis, extent);
        layout.strides.insert(axis, 0);
        layout
    }

    pub fn reverse(&self, axes: &[usize]) -> Layout {
        let mut layout = self.clone();
        for &axis in axes {
            let extent = layout.extents[axis];
            if extent > 0 {
                layout.offset += (extent as isize - 1) * layout.strides[axis];
            }
            layout.strides[axis] = -layout.strides[axis];
        }
        layout
    }

    /// Restricts `axis` to `lower..upper` stepping by `stride`. A stride past the end of the
    /// range selects only `lower`.
    pub fn select_range(&self, axis: usize, lower: usize, upper: usize, stride: usize) -> Layout {
        let len = upper.saturating_sub(lower);
        let stride = stride.clamp(1, len.max(1));
        let mut layout = self.clone();
        layout.offset += lower as isize * layout.strides[axis];
        layout.strides[axis] *= stride as isize;
        layout.extents[axis] = if len == 0 { 0 } else { (len - 1) / stride + 1 };
        layout
    }

    pub fn iter(&self) -> IndexIter {
        IndexIter::new(self)
    }

    pub fn indices(&self) -> Vec<usize> {
        self.iter().collect()
    }
}

/// Visits the buffer indices of a layout in row-major order of its extents.
pub struct IndexIter {
    layout: Layout,
    coord: Array,
    index: isize,
    remaining: usize,
}

impl IndexIter {
    pub fn new(layout: &Layout) -> Self {
        IndexIter {
            layout: layout.clone(),
            coord: SmallVec::from_elem(0, layout.extents.len()),
            index: layout.offset,
            remaining: layout.size(),
        }
    }
}

impl Iterator for IndexIter {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let current = self.index as usize;
        self.remaining -= 1;

        // odometer increment, innermost axis first
        for axis in (0..self.coord.len()).rev() {
            self.coord[axis] += 1;
            self.index += self.layout.strides[axis];
            if self.coord[axis] < self.layout.extents[axis] {
                break;
            }
            self.index -= self.layout.strides[axis] * self.coord[axis] as isize;
            self.coord[axis] = 0;
        }
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for IndexIter {}
