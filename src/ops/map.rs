use crate::error::Error;
use crate::graph::{Graph, NodeId};
use crate::ops::{arg, Kernel, Op};
use crate::tensor::data::{
    with_float_type, with_numeric_type, with_scalar_type, ElementType, HostData, Numeric, Scalar,
};
use crate::tensor::TensorDesc;
use num_traits::Float;
use std::iter::zip;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum UnaryOp {
    Abs,
    Acos,
    Asin,
    Atan,
    Ceiling,
    Cos,
    Cosh,
    Exp,
    Floor,
    Log,
    Negative,
    Sign,
    Sin,
    Sinh,
    Sqrt,
    Tan,
    Tanh,
}

impl UnaryOp {
    pub const ALL: [UnaryOp; 17] = [
        UnaryOp::Abs,
        UnaryOp::Acos,
        UnaryOp::Asin,
        UnaryOp::Atan,
        UnaryOp::Ceiling,
        UnaryOp::Cos,
        UnaryOp::Cosh,
        UnaryOp::Exp,
        UnaryOp::Floor,
        UnaryOp::Log,
        UnaryOp::Negative,
        UnaryOp::Sign,
        UnaryOp::Sin,
        UnaryOp::Sinh,
        UnaryOp::Sqrt,
        UnaryOp::Tan,
        UnaryOp::Tanh,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            UnaryOp::Abs => "Abs",
            UnaryOp::Acos => "Acos",
            UnaryOp::Asin => "Asin",
            UnaryOp::Atan => "Atan",
            UnaryOp::Ceiling => "Ceiling",
            UnaryOp::Cos => "Cos",
            UnaryOp::Cosh => "Cosh",
            UnaryOp::Exp => "Exp",
            UnaryOp::Floor => "Floor",
            UnaryOp::Log => "Log",
            UnaryOp::Negative => "Negative",
            UnaryOp::Sign => "Sign",
            UnaryOp::Sin => "Sin",
            UnaryOp::Sinh => "Sinh",
            UnaryOp::Sqrt => "Sqrt",
            UnaryOp::Tan => "Tan",
            UnaryOp::Tanh => "Tanh",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Maximum,
    Minimum,
    Power,
}

impl BinaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            BinaryOp::Add => "Add",
            BinaryOp::Subtract => "Subtract",
            BinaryOp::Multiply => "Multiply",
            BinaryOp::Divide => "Divide",
            BinaryOp::Maximum => "Maximum",
            BinaryOp::Minimum => "Minimum",
            BinaryOp::Power => "Power",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum CompareOp {
    Equal,
    NotEqual,
    Greater,
    GreaterEq,
    Less,
    LessEq,
}

impl CompareOp {
    pub fn name(&self) -> &'static str {
        match self {
            CompareOp::Equal => "Equal",
            CompareOp::NotEqual => "NotEqual",
            CompareOp::Greater => "Greater",
            CompareOp::GreaterEq => "GreaterEq",
            CompareOp::Less => "Less",
            CompareOp::LessEq => "LessEq",
        }
    }
}

// ******************************** Inference ******************************** //

pub fn infer_unary(op: UnaryOp, x: &TensorDesc) -> Result<TensorDesc, Error> {
    if !x.element_type().is_float() {
        return Err(Error::TypeMismatch(format!(
            "{} is defined on float tensors, got {:?}",
            op.name(),
            x
        )));
    }
    Ok(x.clone())
}

fn check_same(name: &str, a: &TensorDesc, b: &TensorDesc) -> Result<(), Error> {
    if a.shape() != b.shape() {
        return Err(Error::ShapeMismatch(format!(
            "{} operands {:?} and {:?} differ in shape",
            name, a, b
        )));
    }
    if a.element_type() != b.element_type() {
        return Err(Error::TypeMismatch(format!(
            "{} operands {:?} and {:?} differ in element type",
            name, a, b
        )));
    }
    Ok(())
}

pub fn infer_binary(op: BinaryOp, a: &TensorDesc, b: &TensorDesc) -> Result<TensorDesc, Error> {
    check_same(op.name(), a, b)?;
    if !a.element_type().is_numeric() {
        return Err(Error::TypeMismatch(format!(
            "{} is not defined on {:?}",
            op.name(),
            a
        )));
    }
    Ok(a.clone())
}

pub fn infer_compare(op: CompareOp, a: &TensorDesc, b: &TensorDesc) -> Result<TensorDesc, Error> {
    check_same(op.name(), a, b)?;
    Ok(TensorDesc::from_shape(ElementType::Boolean, a.shape().clone()))
}

fn expect_boolean(name: &str, x: &TensorDesc) -> Result<(), Error> {
    if x.element_type() != ElementType::Boolean {
        return Err(Error::TypeMismatch(format!(
            "{} expects a boolean tensor, got {:?}",
            name, x
        )));
    }
    Ok(())
}

pub fn infer_select(
    cond: &TensorDesc,
    then: &TensorDesc,
    otherwise: &TensorDesc,
) -> Result<TensorDesc, Error> {
    expect_boolean("Select condition", cond)?;
    check_same("Select", then, otherwise)?;
    if cond.shape() != then.shape() {
        return Err(Error::ShapeMismatch(format!(
            "Select condition {:?} does not match {:?}",
            cond, then
        )));
    }
    Ok(then.clone())
}

// ******************************** Builders ******************************** //

macro_rules! unary_builders {
    ($($name:ident => $op:ident),* $(,)?) => {
        impl Graph {
            $(
                pub fn $name(&mut self, x: NodeId) -> Result<NodeId, Error> {
                    self.unary(UnaryOp::$op, x)
                }
            )*
        }
    };
}

macro_rules! binary_builders {
    ($($name:ident => $op:ident),* $(,)?) => {
        impl Graph {
            $(
                pub fn $name(&mut self, a: NodeId, b: NodeId) -> Result<NodeId, Error> {
                    self.binary(BinaryOp::$op, a, b)
                }
            )*
        }
    };
}

macro_rules! compare_builders {
    ($($name:ident => $op:ident),* $(,)?) => {
        impl Graph {
            $(
                pub fn $name(&mut self, a: NodeId, b: NodeId) -> Result<NodeId, Error> {
                    self.compare(CompareOp::$op, a, b)
                }
            )*
        }
    };
}

unary_builders! {
    abs => Abs, acos => Acos, asin => Asin, atan => Atan, ceiling => Ceiling,
    cos => Cos, cosh => Cosh, exp => Exp, floor => Floor, log => Log,
    negative => Negative, sign => Sign, sin => Sin, sinh => Sinh, sqrt => Sqrt,
    tan => Tan, tanh => Tanh,
}

binary_builders! {
    add => Add, subtract => Subtract, multiply => Multiply, divide => Divide,
    maximum => Maximum, minimum => Minimum, power => Power,
}

compare_builders! {
    equal => Equal, not_equal => NotEqual, greater => Greater,
    greater_eq => GreaterEq, less => Less, less_eq => LessEq,
}

impl Graph {
    pub fn unary(&mut self, op: UnaryOp, x: NodeId) -> Result<NodeId, Error> {
        let desc = infer_unary(op, self.desc(x)?)?;
        Ok(self.push(Op::Unary(op), &[x], desc))
    }

    pub fn binary(&mut self, op: BinaryOp, a: NodeId, b: NodeId) -> Result<NodeId, Error> {
        let desc = infer_binary(op, self.desc(a)?, self.desc(b)?)?;
        Ok(self.push(Op::Binary(op), &[a, b], desc))
    }

    pub fn compare(&mut self, op: CompareOp, a: NodeId, b: NodeId) -> Result<NodeId, Error> {
        let desc = infer_compare(op, self.desc(a)?, self.desc(b)?)?;
        Ok(self.push(Op::Compare(op), &[a, b], desc))
    }

    pub fn not(&mut self, x: NodeId) -> Result<NodeId, Error> {
        let desc = self.desc(x)?.clone();
        expect_boolean("Not", &desc)?;
        Ok(self.push(Op::Not, &[x], desc))
    }

    pub fn select(&mut self, cond: NodeId, then: NodeId, otherwise: NodeId) -> Result<NodeId, Error> {
        let desc = infer_select(self.desc(cond)?, self.desc(then)?, self.desc(otherwise)?)?;
        Ok(self.push(Op::Select, &[cond, then, otherwise], desc))
    }

    pub fn convert(&mut self, x: NodeId, element_type: ElementType) -> Result<NodeId, Error> {
        let desc = TensorDesc::from_shape(element_type, self.desc(x)?.shape().clone());
        Ok(self.push(Op::Convert(element_type), &[x], desc))
    }
}

// ******************************** Kernels ******************************** //

fn unary_fn<T: Float>(op: UnaryOp) -> fn(T) -> T {
    match op {
        UnaryOp::Abs => |x: T| x.abs(),
        UnaryOp::Acos => |x: T| x.acos(),
        UnaryOp::Asin => |x: T| x.asin(),
        UnaryOp::Atan => |x: T| x.atan(),
        UnaryOp::Ceiling => |x: T| x.ceil(),
        UnaryOp::Cos => |x: T| x.cos(),
        UnaryOp::Cosh => |x: T| x.cosh(),
        UnaryOp::Exp => |x: T| x.exp(),
        UnaryOp::Floor => |x: T| x.floor(),
        UnaryOp::Log => |x: T| x.ln(),
        UnaryOp::Negative => |x: T| -x,
        // zero (of either sign) and NaN map to themselves
        UnaryOp::Sign => |x: T| {
            if x > T::zero() {
                T::one()
            } else if x < T::zero() {
                -T::one()
            } else {
                x
            }
        },
        UnaryOp::Sin => |x: T| x.sin(),
        UnaryOp::Sinh => |x: T| x.sinh(),
        UnaryOp::Sqrt => |x: T| x.sqrt(),
        UnaryOp::Tan => |x: T| x.tan(),
        UnaryOp::Tanh => |x: T| x.tanh(),
    }
}

fn binary_fn<T: Numeric>(op: BinaryOp) -> fn(T, T) -> Result<T, Error> {
    match op {
        BinaryOp::Add => |a: T, b: T| Ok(a.plus(b)),
        BinaryOp::Subtract => |a: T, b: T| Ok(a.minus(b)),
        BinaryOp::Multiply => |a: T, b: T| Ok(a.times(b)),
        BinaryOp::Divide => |a: T, b: T| a.divide(b),
        BinaryOp::Maximum => |a: T, b: T| Ok(a.max_nan(b)),
        BinaryOp::Minimum => |a: T, b: T| Ok(a.min_nan(b)),
        BinaryOp::Power => |a: T, b: T| Ok(a.power(b)),
    }
}

fn compare_fn<T: Scalar>(op: CompareOp) -> fn(&T, &T) -> bool {
    match op {
        CompareOp::Equal => |a: &T, b: &T| a == b,
        CompareOp::NotEqual => |a: &T, b: &T| a != b,
        CompareOp::Greater => |a: &T, b: &T| a > b,
        CompareOp::GreaterEq => |a: &T, b: &T| a >= b,
        CompareOp::Less => |a: &T, b: &T| a < b,
        CompareOp::LessEq => |a: &T, b: &T| a <= b,
    }
}

pub(crate) fn bind_unary(op: UnaryOp, output: &TensorDesc) -> Result<Kernel, Error> {
    with_float_type!(
        output.element_type(),
        T,
        {
            let f = unary_fn::<T>(op);
            let kernel: Kernel = Box::new(move |args: &[&HostData]| {
                let x = T::data_to_vec(arg(args, 0)?)?;
                Ok(T::vec_to_data(x.iter().map(|&v| f(v)).collect()))
            });
            Ok(kernel)
        },
        Err(Error::TypeMismatch(format!(
            "no {} kernel for {}",
            op.name(),
            output.element_type()
        )))
    )
}

pub(crate) fn bind_binary(op: BinaryOp, output: &TensorDesc) -> Result<Kernel, Error> {
    with_numeric_type!(
        output.element_type(),
        T,
        {
            let f = binary_fn::<T>(op);
            let kernel: Kernel = Box::new(move |args: &[&HostData]| {
                let a = T::data_to_vec(arg(args, 0)?)?;
                let b = T::data_to_vec(arg(args, 1)?)?;
                let out = zip(a, b)
                    .map(|(&x, &y)| f(x, y))
                    .collect::<Result<Vec<T>, Error>>()?;
                Ok(T::vec_to_data(out))
            });
            Ok(kernel)
        },
        Err(Error::TypeMismatch(format!(
            "no {} kernel for {}",
            op.name(),
            output.element_type()
        )))
    )
}

pub(crate) fn bind_compare(op: CompareOp, input: &TensorDesc) -> Result<Kernel, Error> {
    with_scalar_type!(input.element_type(), T, {
        let f = compare_fn::<T>(op);
        let kernel: Kernel = Box::new(move |args: &[&HostData]| {
            let a = T::data_to_vec(arg(args, 0)?)?;
            let b = T::data_to_vec(arg(args, 1)?)?;
            Ok(bool::vec_to_data(zip(a, b).map(|(x, y)| f(x, y)).collect()))
        });
        Ok(kernel)
    })
}

pub(crate) fn bind_not() -> Result<Kernel, Error> {
    Ok(Box::new(|args: &[&HostData]| {
        let x = bool::data_to_vec(arg(args, 0)?)?;
        Ok(bool::vec_to_data(x.iter().map(|v| !v).collect()))
    }))
}

pub(crate) fn bind_select(output: &TensorDesc) -> Result<Kernel, Error> {
    with_scalar_type!(output.element_type(), T, {
        let kernel: Kernel = Box::new(|args: &[&HostData]| {
            let cond = bool::data_to_vec(arg(args, 0)?)?;
            let then = T::data_to_vec(arg(args, 1)?)?;
            let otherwise = T::data_to_vec(arg(args, 2)?)?;
            let out = cond
                .iter()
                .zip(zip(then, otherwise))
                .map(|(&c, (&t, &e))| if c { t } else { e })
                .collect();
            Ok(T::vec_to_data(out))
        });
        Ok(kernel)
    })
}

pub(crate) fn bind_convert(from: ElementType, to: ElementType) -> Result<Kernel, Error> {
    with_scalar_type!(from, S, {
        with_scalar_type!(to, D, {
            let kernel: Kernel = Box::new(|args: &[&HostData]| {
                let x = S::data_to_vec(arg(args, 0)?)?;
                Ok(D::vec_to_data(x.iter().map(|&v| v.cast::<D>()).collect()))
            });
            Ok(kernel)
        })
    })
}
