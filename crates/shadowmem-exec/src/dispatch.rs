//! The dispatch boundary: what an operation is, and who gets to watch it.

use shadowmem_core::dtype::DType;
use shadowmem_core::shape::Shape;
use shadowmem_core::value::Value;

/// How a factory initializes its buffer. Shadow buffers hold no data, so
/// this only matters for bookkeeping and logs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fill {
    Uninit,
    Zeros,
    Ones,
    Randn,
    Value(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Relu,
    Neg,
    Exp,
    Sqrt,
    Sigmoid,
    Tanh,
}

impl UnaryOp {
    pub fn name(self) -> &'static str {
        match self {
            UnaryOp::Relu => "relu",
            UnaryOp::Neg => "neg",
            UnaryOp::Exp => "exp",
            UnaryOp::Sqrt => "sqrt",
            UnaryOp::Sigmoid => "sigmoid",
            UnaryOp::Tanh => "tanh",
        }
    }

    /// Ops that only make sense on floating point inputs.
    pub fn needs_float(self) -> bool {
        !matches!(self, UnaryOp::Relu | UnaryOp::Neg)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
        }
    }
}

/// One operation as seen at the dispatch boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Allocate a new tensor. No inputs.
    Factory { shape: Shape, dtype: DType, fill: Fill },
    Unary(UnaryOp),
    Binary(BinaryOp),
    /// `a op= b`; returns an alias of `a`.
    BinaryInplace(BinaryOp),
    Scalar { op: BinaryOp, value: f64 },
    /// `a op= value`; returns an alias of `a`.
    ScalarInplace { op: BinaryOp, value: f64 },
    /// Overwrite every element of `a`; returns an alias of `a`.
    FillInplace { value: f64 },
    MatMul,
    View { shape: Shape },
    Reshape { shape: Shape },
    Transpose { dim0: usize, dim1: usize },
    Split { size: usize, dim: usize },
    Sum { dim: Option<usize>, keepdim: bool },
    MaxDim { dim: usize, keepdim: bool },
    Cat { dim: usize },
    Clone,
    Contiguous,
    ToDType(DType),
    Numel,
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::Factory { fill, .. } => match fill {
                Fill::Uninit => "empty",
                Fill::Zeros => "zeros",
                Fill::Ones => "ones",
                Fill::Randn => "randn",
                Fill::Value(_) => "full",
            },
            Op::Unary(u) => u.name(),
            Op::Binary(b) => b.name(),
            Op::BinaryInplace(b) => match b {
                BinaryOp::Add => "add_",
                BinaryOp::Sub => "sub_",
                BinaryOp::Mul => "mul_",
                BinaryOp::Div => "div_",
            },
            Op::Scalar { op, .. } => match op {
                BinaryOp::Add => "add_scalar",
                BinaryOp::Sub => "sub_scalar",
                BinaryOp::Mul => "mul_scalar",
                BinaryOp::Div => "div_scalar",
            },
            Op::ScalarInplace { op, .. } => match op {
                BinaryOp::Add => "add_scalar_",
                BinaryOp::Sub => "sub_scalar_",
                BinaryOp::Mul => "mul_scalar_",
                BinaryOp::Div => "div_scalar_",
            },
            Op::FillInplace { .. } => "fill_",
            Op::MatMul => "matmul",
            Op::View { .. } => "view",
            Op::Reshape { .. } => "reshape",
            Op::Transpose { .. } => "transpose",
            Op::Split { .. } => "split",
            Op::Sum { .. } => "sum",
            Op::MaxDim { .. } => "max_dim",
            Op::Cat { .. } => "cat",
            Op::Clone => "clone",
            Op::Contiguous => "contiguous",
            Op::ToDType(_) => "to",
            Op::Numel => "numel",
        }
    }
}

/// A hook that sees every operation result dispatched while it is active.
///
/// `after_dispatch` runs after the operation has produced `result` and
/// before the result is handed back to the caller. It gets no way to alter
/// the result or to fail the operation: whatever goes wrong inside a mode
/// stays inside the mode.
pub trait DispatchMode: Send + Sync {
    /// Stable name, used in logs.
    fn name(&self) -> &'static str;

    fn after_dispatch(&self, op: &Op, result: &Value);
}
