//! Typed operation surface for workloads.
//!
//! Each method builds an `Op`, sends it through `dispatch`, and unpacks the
//! result. Nothing here bypasses the hook point.

use std::collections::BTreeMap;

use shadowmem_core::dtype::DType;
use shadowmem_core::shape::Shape;
use shadowmem_core::tensor::Tensor;
use shadowmem_core::value::Value;

use crate::context::{ExecError, ShadowContext};
use crate::dispatch::{BinaryOp, Fill, Op, UnaryOp};

type OpResult<T> = Result<T, ExecError>;

impl ShadowContext {
    fn tensor_op(&self, op: Op, inputs: &[&Tensor]) -> OpResult<Tensor> {
        Ok(self.dispatch(op, inputs)?.into_tensor()?)
    }

    fn factory(&self, shape: impl Into<Shape>, dtype: DType, fill: Fill) -> OpResult<Tensor> {
        self.tensor_op(
            Op::Factory {
                shape: shape.into(),
                dtype,
                fill,
            },
            &[],
        )
    }

    // ----- factories -----

    pub fn empty(&self, shape: impl Into<Shape>, dtype: DType) -> OpResult<Tensor> {
        self.factory(shape, dtype, Fill::Uninit)
    }

    pub fn zeros(&self, shape: impl Into<Shape>, dtype: DType) -> OpResult<Tensor> {
        self.factory(shape, dtype, Fill::Zeros)
    }

    pub fn ones(&self, shape: impl Into<Shape>, dtype: DType) -> OpResult<Tensor> {
        self.factory(shape, dtype, Fill::Ones)
    }

    pub fn full(&self, shape: impl Into<Shape>, value: f64, dtype: DType) -> OpResult<Tensor> {
        self.factory(shape, dtype, Fill::Value(value))
    }

    /// Normal samples in the context's default dtype.
    pub fn randn(&self, shape: impl Into<Shape>) -> OpResult<Tensor> {
        self.factory(shape, self.default_dtype(), Fill::Randn)
    }

    pub fn zeros_like(&self, a: &Tensor) -> OpResult<Tensor> {
        self.factory(a.shape().clone(), a.dtype(), Fill::Zeros)
    }

    // ----- elementwise -----

    pub fn unary(&self, op: UnaryOp, a: &Tensor) -> OpResult<Tensor> {
        self.tensor_op(Op::Unary(op), &[a])
    }

    pub fn relu(&self, a: &Tensor) -> OpResult<Tensor> {
        self.unary(UnaryOp::Relu, a)
    }

    pub fn neg(&self, a: &Tensor) -> OpResult<Tensor> {
        self.unary(UnaryOp::Neg, a)
    }

    pub fn exp(&self, a: &Tensor) -> OpResult<Tensor> {
        self.unary(UnaryOp::Exp, a)
    }

    pub fn sqrt(&self, a: &Tensor) -> OpResult<Tensor> {
        self.unary(UnaryOp::Sqrt, a)
    }

    pub fn sigmoid(&self, a: &Tensor) -> OpResult<Tensor> {
        self.unary(UnaryOp::Sigmoid, a)
    }

    pub fn tanh(&self, a: &Tensor) -> OpResult<Tensor> {
        self.unary(UnaryOp::Tanh, a)
    }

    pub fn add(&self, a: &Tensor, b: &Tensor) -> OpResult<Tensor> {
        self.tensor_op(Op::Binary(BinaryOp::Add), &[a, b])
    }

    pub fn sub(&self, a: &Tensor, b: &Tensor) -> OpResult<Tensor> {
        self.tensor_op(Op::Binary(BinaryOp::Sub), &[a, b])
    }

    pub fn mul(&self, a: &Tensor, b: &Tensor) -> OpResult<Tensor> {
        self.tensor_op(Op::Binary(BinaryOp::Mul), &[a, b])
    }

    pub fn div(&self, a: &Tensor, b: &Tensor) -> OpResult<Tensor> {
        self.tensor_op(Op::Binary(BinaryOp::Div), &[a, b])
    }

    pub fn add_scalar(&self, a: &Tensor, value: f64) -> OpResult<Tensor> {
        self.tensor_op(
            Op::Scalar {
                op: BinaryOp::Add,
                value,
            },
            &[a],
        )
    }

    pub fn mul_scalar(&self, a: &Tensor, value: f64) -> OpResult<Tensor> {
        self.tensor_op(
            Op::Scalar {
                op: BinaryOp::Mul,
                value,
            },
            &[a],
        )
    }

    // ----- in-place (results alias the destination) -----

    pub fn add_(&self, a: &Tensor, b: &Tensor) -> OpResult<Tensor> {
        self.tensor_op(Op::BinaryInplace(BinaryOp::Add), &[a, b])
    }

    pub fn mul_(&self, a: &Tensor, b: &Tensor) -> OpResult<Tensor> {
        self.tensor_op(Op::BinaryInplace(BinaryOp::Mul), &[a, b])
    }

    pub fn mul_scalar_(&self, a: &Tensor, value: f64) -> OpResult<Tensor> {
        self.tensor_op(
            Op::ScalarInplace {
                op: BinaryOp::Mul,
                value,
            },
            &[a],
        )
    }

    pub fn zero_(&self, a: &Tensor) -> OpResult<Tensor> {
        self.tensor_op(Op::FillInplace { value: 0.0 }, &[a])
    }

    // ----- linear algebra -----

    pub fn matmul(&self, a: &Tensor, b: &Tensor) -> OpResult<Tensor> {
        self.tensor_op(Op::MatMul, &[a, b])
    }

    // ----- layout -----

    pub fn view(&self, a: &Tensor, shape: impl Into<Shape>) -> OpResult<Tensor> {
        self.tensor_op(
            Op::View {
                shape: shape.into(),
            },
            &[a],
        )
    }

    pub fn reshape(&self, a: &Tensor, shape: impl Into<Shape>) -> OpResult<Tensor> {
        self.tensor_op(
            Op::Reshape {
                shape: shape.into(),
            },
            &[a],
        )
    }

    pub fn transpose(&self, a: &Tensor, dim0: usize, dim1: usize) -> OpResult<Tensor> {
        self.tensor_op(Op::Transpose { dim0, dim1 }, &[a])
    }

    /// Transpose of a 2-D tensor.
    pub fn t(&self, a: &Tensor) -> OpResult<Tensor> {
        self.transpose(a, 0, 1)
    }

    pub fn split(&self, a: &Tensor, size: usize, dim: usize) -> OpResult<Vec<Tensor>> {
        self.dispatch(Op::Split { size, dim }, &[a])?
            .into_seq()?
            .into_iter()
            .map(|v| v.into_tensor().map_err(ExecError::from))
            .collect()
    }

    pub fn cat(&self, inputs: &[&Tensor], dim: usize) -> OpResult<Tensor> {
        self.tensor_op(Op::Cat { dim }, inputs)
    }

    pub fn clone_tensor(&self, a: &Tensor) -> OpResult<Tensor> {
        self.tensor_op(Op::Clone, &[a])
    }

    pub fn contiguous(&self, a: &Tensor) -> OpResult<Tensor> {
        self.tensor_op(Op::Contiguous, &[a])
    }

    pub fn to_dtype(&self, a: &Tensor, dtype: DType) -> OpResult<Tensor> {
        self.tensor_op(Op::ToDType(dtype), &[a])
    }

    // ----- reductions -----

    pub fn sum(&self, a: &Tensor) -> OpResult<Tensor> {
        self.tensor_op(
            Op::Sum {
                dim: None,
                keepdim: false,
            },
            &[a],
        )
    }

    pub fn sum_dim(&self, a: &Tensor, dim: usize, keepdim: bool) -> OpResult<Tensor> {
        self.tensor_op(
            Op::Sum {
                dim: Some(dim),
                keepdim,
            },
            &[a],
        )
    }

    /// Max along `dim`; returns `(values, indices)`.
    pub fn max_dim(&self, a: &Tensor, dim: usize, keepdim: bool) -> OpResult<(Tensor, Tensor)> {
        let mut out: BTreeMap<String, Value> =
            self.dispatch(Op::MaxDim { dim, keepdim }, &[a])?.into_map()?;
        let values = out.remove("values").unwrap_or_default().into_tensor()?;
        let indices = out.remove("indices").unwrap_or_default().into_tensor()?;
        Ok((values, indices))
    }

    /// Element count. Still dispatched so modes see the call, but the exact
    /// count comes from the shape rather than the scalar result.
    pub fn numel(&self, a: &Tensor) -> OpResult<usize> {
        self.dispatch(Op::Numel, &[a])?;
        Ok(a.numel()?)
    }
}
