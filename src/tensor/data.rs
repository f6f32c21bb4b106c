use crate::error::Error;
use num_traits::{Bounded, Float, One, Zero};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Debug, Display, Formatter};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Boolean,

    // Integers
    I8,
    I32,
    I64,

    // Unsigned Integers
    U8,
    U32,

    // Floats
    F32,
    F64,
}

impl ElementType {
    pub const ALL: [ElementType; 8] = [
        ElementType::Boolean,
        ElementType::I8,
        ElementType::I32,
        ElementType::I64,
        ElementType::U8,
        ElementType::U32,
        ElementType::F32,
        ElementType::F64,
    ];

    pub fn bytes(&self) -> usize {
        match self {
            ElementType::Boolean => 1,
            ElementType::I8 => 1,
            ElementType::I32 => 4,
            ElementType::I64 => 8,
            ElementType::U8 => 1,
            ElementType::U32 => 4,
            ElementType::F32 => 4,
            ElementType::F64 => 8,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, ElementType::F32 | ElementType::F64)
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, ElementType::Boolean)
    }
}

impl Display for ElementType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match *self {
            ElementType::Boolean => write!(f, "boolean"),
            ElementType::I8 => write!(f, "i8"),
            ElementType::I32 => write!(f, "i32"),
            ElementType::I64 => write!(f, "i64"),
            ElementType::U8 => write!(f, "u8"),
            ElementType::U32 => write!(f, "u32"),
            ElementType::F32 => write!(f, "f32"),
            ElementType::F64 => write!(f, "f64"),
        }
    }
}

/// Runs `$body` with `$T` aliased to the Rust type of the given element type.
macro_rules! with_scalar_type {
    ($ty:expr, $T:ident, $body:block) => {
        match $ty {
            $crate::tensor::data::ElementType::Boolean => {
                type $T = bool;
                $body
            }
            $crate::tensor::data::ElementType::I8 => {
                type $T = i8;
                $body
            }
            $crate::tensor::data::ElementType::I32 => {
                type $T = i32;
                $body
            }
            $crate::tensor::data::ElementType::I64 => {
                type $T = i64;
                $body
            }
            $crate::tensor::data::ElementType::U8 => {
                type $T = u8;
                $body
            }
            $crate::tensor::data::ElementType::U32 => {
                type $T = u32;
                $body
            }
            $crate::tensor::data::ElementType::F32 => {
                type $T = f32;
                $body
            }
            $crate::tensor::data::ElementType::F64 => {
                type $T = f64;
                $body
            }
        }
    };
}

/// Like `with_scalar_type!`, but evaluates `$otherwise` for boolean.
macro_rules! with_numeric_type {
    ($ty:expr, $T:ident, $body:block, $otherwise:expr) => {
        match $ty {
            $crate::tensor::data::ElementType::Boolean => $otherwise,
            $crate::tensor::data::ElementType::I8 => {
                type $T = i8;
                $body
            }
            $crate::tensor::data::ElementType::I32 => {
                type $T = i32;
                $body
            }
            $crate::tensor::data::ElementType::I64 => {
                type $T = i64;
                $body
            }
            $crate::tensor::data::ElementType::U8 => {
                type $T = u8;
                $body
            }
            $crate::tensor::data::ElementType::U32 => {
                type $T = u32;
                $body
            }
            $crate::tensor::data::ElementType::F32 => {
                type $T = f32;
                $body
            }
            $crate::tensor::data::ElementType::F64 => {
                type $T = f64;
                $body
            }
        }
    };
}

macro_rules! with_float_type {
    ($ty:expr, $T:ident, $body:block, $otherwise:expr) => {
        match $ty {
            $crate::tensor::data::ElementType::F32 => {
                type $T = f32;
                $body
            }
            $crate::tensor::data::ElementType::F64 => {
                type $T = f64;
                $body
            }
            _ => $otherwise,
        }
    };
}

pub(crate) use with_float_type;
pub(crate) use with_numeric_type;
pub(crate) use with_scalar_type;

#[derive(Clone, Debug, PartialEq)]
pub enum HostData {
    Boolean(Vec<bool>),

    // Integers
    I8(Vec<i8>),
    I32(Vec<i32>),
    I64(Vec<i64>),

    // Unsigned Integers
    U8(Vec<u8>),
    U32(Vec<u32>),

    // Floats
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl HostData {
    pub fn zeros(element_type: ElementType, len: usize) -> Self {
        with_scalar_type!(element_type, T, { T::vec_to_data(vec![T::from_i64(0); len]) })
    }

    /// Decodes native-endian bytes. Trailing bytes that do not form a whole element are ignored.
    pub fn from_bytes(element_type: ElementType, bytes: &[u8]) -> Self {
        with_scalar_type!(element_type, T, {
            T::vec_to_data(
                bytes
                    .chunks_exact(element_type.bytes())
                    .map(T::read_ne)
                    .collect(),
            )
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        with_scalar_type!(self.element_type(), T, {
            let mut out = Vec::with_capacity(self.len() * self.element_type().bytes());
            for v in T::data_to_vec(self).unwrap_or_default() {
                v.write_ne(&mut out);
            }
            out
        })
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            HostData::Boolean(_) => ElementType::Boolean,
            HostData::I8(_) => ElementType::I8,
            HostData::I32(_) => ElementType::I32,
            HostData::I64(_) => ElementType::I64,
            HostData::U8(_) => ElementType::U8,
            HostData::U32(_) => ElementType::U32,
            HostData::F32(_) => ElementType::F32,
            HostData::F64(_) => ElementType::F64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            HostData::Boolean(arr) => arr.len(),
            HostData::I8(arr) => arr.len(),
            HostData::I32(arr) => arr.len(),
            HostData::I64(arr) => arr.len(),
            HostData::U8(arr) => arr.len(),
            HostData::U32(arr) => arr.len(),
            HostData::F32(arr) => arr.len(),
            HostData::F64(arr) => arr.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Picks `self[i]` for every `i` in `indices`.
    pub fn gather(&self, indices: &[usize]) -> Result<HostData, Error> {
        with_scalar_type!(self.element_type(), T, {
            let src = T::data_to_vec(self)?;
            let out = indices
                .iter()
                .map(|&i| src.get(i).copied().ok_or_else(|| index_error(i, src.len())))
                .collect::<Result<Vec<T>, Error>>()?;
            Ok(T::vec_to_data(out))
        })
    }

    /// Writes `src[k]` into `self[targets[k]]`.
    pub fn scatter(&mut self, src: &HostData, targets: &[usize]) -> Result<(), Error> {
        with_scalar_type!(self.element_type(), T, {
            let src = T::data_to_vec(src)?;
            let dst = T::data_to_vec_mut(self)?;
            let len = dst.len();
            for (&v, &t) in src.iter().zip(targets) {
                *dst.get_mut(t).ok_or_else(|| index_error(t, len))? = v;
            }
            Ok(())
        })
    }

    /// A buffer of `len` copies of the first element of `self`.
    pub fn splat(&self, len: usize) -> Result<HostData, Error> {
        with_scalar_type!(self.element_type(), T, {
            let src = T::data_to_vec(self)?;
            let v = src.first().copied().ok_or_else(|| index_error(0, 0))?;
            Ok(T::vec_to_data(vec![v; len]))
        })
    }
}

fn index_error(index: usize, len: usize) -> Error {
    Error::Evaluation(format!("index {} out of range for buffer of {} elements", index, len))
}

pub trait Scalar:
    Sized + Copy + Send + Sync + Debug + Display + PartialEq + PartialOrd + 'static
{
    fn element_type() -> ElementType;
    fn vec_to_data(v: Vec<Self>) -> HostData;
    fn data_to_vec(a: &HostData) -> Result<&[Self], Error>;
    fn data_to_vec_mut(a: &mut HostData) -> Result<&mut Vec<Self>, Error>;

    fn read_ne(bytes: &[u8]) -> Self;
    fn write_ne(self, out: &mut Vec<u8>);

    fn to_f64(self) -> f64;
    fn to_i64(self) -> i64;
    fn from_f64(v: f64) -> Self;
    fn from_i64(v: i64) -> Self;

    /// Numeric cast: floats truncate toward zero (saturating) into integers, anything
    /// cast to boolean is a nonzero test.
    fn cast<U: Scalar>(self) -> U {
        if Self::element_type().is_float() || U::element_type().is_float() {
            U::from_f64(self.to_f64())
        } else {
            U::from_i64(self.to_i64())
        }
    }
}

fn type_error(expected: ElementType, found: ElementType) -> Error {
    Error::TypeMismatch(format!("expected {} data but got {}", expected, found))
}

impl Scalar for bool {
    fn element_type() -> ElementType {
        ElementType::Boolean
    }

    fn vec_to_data(v: Vec<bool>) -> HostData {
        HostData::Boolean(v)
    }

    fn data_to_vec(a: &HostData) -> Result<&[Self], Error> {
        if let HostData::Boolean(v) = a {
            Ok(v)
        } else {
            Err(type_error(ElementType::Boolean, a.element_type()))
        }
    }

    fn data_to_vec_mut(a: &mut HostData) -> Result<&mut Vec<Self>, Error> {
        match a {
            HostData::Boolean(v) => Ok(v),
            other => Err(type_error(ElementType::Boolean, other.element_type())),
        }
    }

    fn read_ne(bytes: &[u8]) -> Self {
        bytes.first().map_or(false, |b| *b != 0)
    }

    fn write_ne(self, out: &mut Vec<u8>) {
        out.push(self as u8);
    }

    fn to_f64(self) -> f64 {
        if self {
            1.0
        } else {
            0.0
        }
    }

    fn to_i64(self) -> i64 {
        self as i64
    }

    fn from_f64(v: f64) -> Self {
        v != 0.0
    }

    fn from_i64(v: i64) -> Self {
        v != 0
    }
}

macro_rules! impl_scalar {
    ($t:ty, $variant:ident) => {
        impl Scalar for $t {
            fn element_type() -> ElementType {
                ElementType::$variant
            }

            fn vec_to_data(v: Vec<$t>) -> HostData {
                HostData::$variant(v)
            }

            fn data_to_vec(a: &HostData) -> Result<&[Self], Error> {
                if let HostData::$variant(v) = a {
                    Ok(v)
                } else {
                    Err(type_error(ElementType::$variant, a.element_type()))
                }
            }

            fn data_to_vec_mut(a: &mut HostData) -> Result<&mut Vec<Self>, Error> {
                match a {
                    HostData::$variant(v) => Ok(v),
                    other => Err(type_error(ElementType::$variant, other.element_type())),
                }
            }

            fn read_ne(bytes: &[u8]) -> Self {
                let mut buf = [0u8; std::mem::size_of::<$t>()];
                let n = buf.len().min(bytes.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                <$t>::from_ne_bytes(buf)
            }

            fn write_ne(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_ne_bytes());
            }

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn to_i64(self) -> i64 {
                self as i64
            }

            fn from_f64(v: f64) -> Self {
                v as $t
            }

            fn from_i64(v: i64) -> Self {
                v as $t
            }
        }
    };
}

impl_scalar!(i8, I8);
impl_scalar!(i32, I32);
impl_scalar!(i64, I64);
impl_scalar!(u8, U8);
impl_scalar!(u32, U32);
impl_scalar!(f32, F32);
impl_scalar!(f64, F64);

/// Arithmetic shared by every non-boolean element type. Integers wrap on overflow.
pub trait Numeric: Scalar + Zero + One + Bounded {
    fn plus(self, other: Self) -> Self;
    fn minus(self, other: Self) -> Self;
    fn times(self, other: Self) -> Self;
    fn divide(self, other: Self) -> Result<Self, Error>;
    fn power(self, other: Self) -> Self;
    fn max_nan(self, other: Self) -> Self;
    fn min_nan(self, other: Self) -> Self;

    /// Identity of `max_nan`.
    fn lowest() -> Self;

    /// Identity of `min_nan`.
    fn highest() -> Self;
}

fn wrapping_pow<T: Numeric>(base: T, mut exp: u64, mul: fn(T, T) -> T) -> T {
    let mut acc = T::one();
    let mut base = base;
    while exp > 0 {
        if exp & 1 == 1 {
            acc = mul(acc, base);
        }
        exp >>= 1;
        if exp > 0 {
            base = mul(base, base);
        }
    }
    acc
}

macro_rules! impl_numeric_int {
    ($t:ty, signed) => {
        impl Numeric for $t {
            impl_numeric_int!(@ops $t);

            fn power(self, other: Self) -> Self {
                if other >= 0 {
                    wrapping_pow(self, other as u64, <$t>::wrapping_mul)
                } else {
                    match self {
                        1 => 1,
                        -1 if other % 2 == 0 => 1,
                        -1 => -1,
                        _ => 0,
                    }
                }
            }
        }
    };
    ($t:ty, unsigned) => {
        impl Numeric for $t {
            impl_numeric_int!(@ops $t);

            fn power(self, other: Self) -> Self {
                wrapping_pow(self, other as u64, <$t>::wrapping_mul)
            }
        }
    };
    (@ops $t:ty) => {
        fn plus(self, other: Self) -> Self {
            self.wrapping_add(other)
        }

        fn minus(self, other: Self) -> Self {
            self.wrapping_sub(other)
        }

        fn times(self, other: Self) -> Self {
            self.wrapping_mul(other)
        }

        fn divide(self, other: Self) -> Result<Self, Error> {
            if other == 0 {
                Err(Error::DivisionByZero)
            } else {
                Ok(self.wrapping_div(other))
            }
        }

        fn max_nan(self, other: Self) -> Self {
            std::cmp::max(self, other)
        }

        fn min_nan(self, other: Self) -> Self {
            std::cmp::min(self, other)
        }

        fn lowest() -> Self {
            <$t>::MIN
        }

        fn highest() -> Self {
            <$t>::MAX
        }
    };
}

impl_numeric_int!(i8, signed);
impl_numeric_int!(i32, signed);
impl_numeric_int!(i64, signed);
impl_numeric_int!(u8, unsigned);
impl_numeric_int!(u32, unsigned);

macro_rules! impl_numeric_float {
    ($t:ty) => {
        impl Numeric for $t {
            fn plus(self, other: Self) -> Self {
                self + other
            }

            fn minus(self, other: Self) -> Self {
                self - other
            }

            fn times(self, other: Self) -> Self {
                self * other
            }

            fn divide(self, other: Self) -> Result<Self, Error> {
                Ok(self / other)
            }

            fn power(self, other: Self) -> Self {
                Float::powf(self, other)
            }

            // NaN propagates, unlike f32::max
            fn max_nan(self, other: Self) -> Self {
                if self.is_nan() || other.is_nan() {
                    <$t>::NAN
                } else {
                    Float::max(self, other)
                }
            }

            fn min_nan(self, other: Self) -> Self {
                if self.is_nan() || other.is_nan() {
                    <$t>::NAN
                } else {
                    Float::min(self, other)
                }
            }

            fn lowest() -> Self {
                <$t>::NEG_INFINITY
            }

            fn highest() -> Self {
                <$t>::INFINITY
            }
        }
    };
}

impl_numeric_float!(f32);
impl_numeric_float!(f64);

pub trait DataLiteral<T>
where
    T: Scalar,
{
    fn flat_iter<'a>(&'a self) -> Box<dyn Iterator<Item = T> + 'a>;

    fn extents(&self) -> Vec<usize>;

    fn to_vec(&self) -> Vec<T> {
        self.flat_iter().collect()
    }

    fn to_buf(&self) -> HostData {
        T::vec_to_data(self.to_vec())
    }
}

impl<T> DataLiteral<T> for Vec<T>
where
    T: Scalar,
{
    fn flat_iter<'a>(&'a self) -> Box<dyn Iterator<Item = T> + 'a> {
        Box::new(self.iter().cloned())
    }

    fn extents(&self) -> Vec<usize> {
        vec![self.len()]
    }
}

impl<T, E, const C: usize> DataLiteral<T> for [E; C]
where
    E: DataLiteral<T>,
    T: Scalar,
{
    fn flat_iter<'a>(&'a self) -> Box<dyn Iterator<Item = T> + 'a> {
        Box::new(self.iter().flat_map(|a| a.flat_iter()))
    }

    fn extents(&self) -> Vec<usize> {
        let mut s = self.first().map(|e| e.extents()).unwrap_or_default();
        s.insert(0, C);
        s
    }
}

impl<T> DataLiteral<T> for T
where
    T: Scalar,
{
    fn flat_iter<'a>(&'a self) -> Box<dyn Iterator<Item = T> + 'a> {
        Box::new(core::iter::once(*self))
    }

    fn extents(&self) -> Vec<usize> {
        Vec::new()
    }
}
