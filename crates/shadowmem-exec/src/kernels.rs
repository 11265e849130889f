//! Shadow kernels: shape and dtype inference, buffer allocation, aliasing.
//!
//! Nothing here touches data. A kernel decides exactly one thing that
//! matters for accounting: whether its output gets a fresh `Storage` or
//! reuses the storage of an input.

use std::collections::BTreeMap;

use shadowmem_core::dtype::DType;
use shadowmem_core::error::{Error, Result};
use shadowmem_core::shape::Shape;
use shadowmem_core::tensor::Tensor;
use shadowmem_core::value::Value;

use crate::dispatch::{Op, UnaryOp};

/// Run `op` on `inputs` and produce its (data-less) result.
pub fn execute(op: &Op, inputs: &[&Tensor]) -> Result<Value> {
    match op {
        Op::Factory { shape, dtype, .. } => {
            expect_arity(op, inputs, 0)?;
            Ok(Tensor::empty(shape.clone(), *dtype)?.into())
        }
        Op::Unary(u) => {
            let [a] = unary(op, inputs)?;
            if u.needs_float() && !a.dtype().is_floating() {
                return Err(Error::DType(format!(
                    "{} is not defined for {}",
                    u.name(),
                    a.dtype()
                )));
            }
            like(a)
        }
        Op::Binary(_) => {
            let [a, b] = binary(op, inputs)?;
            same_dtype(op, a, b)?;
            let shape = a.shape().broadcast(b.shape())?;
            Ok(Tensor::empty(shape, a.dtype())?.into())
        }
        Op::BinaryInplace(_) => {
            let [a, b] = binary(op, inputs)?;
            same_dtype(op, a, b)?;
            let shape = a.shape().broadcast(b.shape())?;
            if &shape != a.shape() {
                return Err(Error::Shape(format!(
                    "{}: {} cannot be broadcast into {}",
                    op.name(),
                    b.shape(),
                    a.shape()
                )));
            }
            Ok(a.clone().into())
        }
        Op::Scalar { .. } => {
            let [a] = unary(op, inputs)?;
            like(a)
        }
        Op::ScalarInplace { .. } | Op::FillInplace { .. } => {
            let [a] = unary(op, inputs)?;
            Ok(a.clone().into())
        }
        Op::MatMul => {
            let [a, b] = binary(op, inputs)?;
            same_dtype(op, a, b)?;
            Ok(Tensor::empty(matmul_shape(a.shape(), b.shape())?, a.dtype())?.into())
        }
        Op::View { shape } => {
            let [a] = unary(op, inputs)?;
            same_numel(a, shape)?;
            if !a.is_contiguous() {
                return Err(Error::Shape(format!(
                    "view of non-contiguous tensor {}; use reshape",
                    a.shape()
                )));
            }
            Ok(a
                .alias(shape.clone(), shape.contiguous_strides(), a.offset())
                .into())
        }
        Op::Reshape { shape } => {
            let [a] = unary(op, inputs)?;
            same_numel(a, shape)?;
            if a.is_contiguous() {
                Ok(a
                    .alias(shape.clone(), shape.contiguous_strides(), a.offset())
                    .into())
            } else {
                Ok(Tensor::empty(shape.clone(), a.dtype())?.into())
            }
        }
        Op::Transpose { dim0, dim1 } => {
            let [a] = unary(op, inputs)?;
            check_dim(a, *dim0)?;
            check_dim(a, *dim1)?;
            let mut dims = a.dims().to_vec();
            let mut strides = a.strides().to_vec();
            dims.swap(*dim0, *dim1);
            strides.swap(*dim0, *dim1);
            Ok(a.alias(Shape::new(dims), strides, a.offset()).into())
        }
        Op::Split { size, dim } => {
            let [a] = unary(op, inputs)?;
            split(a, *size, *dim)
        }
        Op::Sum { dim, keepdim } => {
            let [a] = unary(op, inputs)?;
            let shape = match dim {
                None if *keepdim => Shape::new(vec![1; a.rank()]),
                None => Shape::scalar(),
                Some(d) => reduce_shape(a, *d, *keepdim)?,
            };
            Ok(Tensor::empty(shape, a.dtype())?.into())
        }
        Op::MaxDim { dim, keepdim } => {
            let [a] = unary(op, inputs)?;
            let shape = reduce_shape(a, *dim, *keepdim)?;
            let mut out = BTreeMap::new();
            out.insert(
                "values".to_string(),
                Value::Tensor(Tensor::empty(shape.clone(), a.dtype())?),
            );
            out.insert(
                "indices".to_string(),
                Value::Tensor(Tensor::empty(shape, DType::I64)?),
            );
            Ok(Value::Map(out))
        }
        Op::Cat { dim } => cat(inputs, *dim),
        Op::Clone => {
            let [a] = unary(op, inputs)?;
            like(a)
        }
        Op::Contiguous => {
            let [a] = unary(op, inputs)?;
            if a.is_contiguous() {
                Ok(a.clone().into())
            } else {
                like(a)
            }
        }
        Op::ToDType(dtype) => {
            let [a] = unary(op, inputs)?;
            if a.dtype() == *dtype {
                Ok(a.clone().into())
            } else {
                Ok(Tensor::empty(a.shape().clone(), *dtype)?.into())
            }
        }
        Op::Numel => {
            let [a] = unary(op, inputs)?;
            Ok(Value::Scalar(a.numel()? as f64))
        }
    }
}

fn expect_arity(op: &Op, inputs: &[&Tensor], expected: usize) -> Result<()> {
    if inputs.len() != expected {
        return Err(Error::Arity {
            op: op.name(),
            expected,
            got: inputs.len(),
        });
    }
    Ok(())
}

fn unary<'a>(op: &Op, inputs: &[&'a Tensor]) -> Result<[&'a Tensor; 1]> {
    expect_arity(op, inputs, 1)?;
    Ok([inputs[0]])
}

fn binary<'a>(op: &Op, inputs: &[&'a Tensor]) -> Result<[&'a Tensor; 2]> {
    expect_arity(op, inputs, 2)?;
    Ok([inputs[0], inputs[1]])
}

/// Fresh contiguous tensor with the shape and dtype of `a`.
fn like(a: &Tensor) -> Result<Value> {
    Ok(Tensor::empty(a.shape().clone(), a.dtype())?.into())
}

fn same_dtype(op: &Op, a: &Tensor, b: &Tensor) -> Result<()> {
    if a.dtype() != b.dtype() {
        return Err(Error::DType(format!(
            "{}: mismatched dtypes {} and {}",
            op.name(),
            a.dtype(),
            b.dtype()
        )));
    }
    Ok(())
}

fn same_numel(a: &Tensor, shape: &Shape) -> Result<()> {
    if a.numel()? != shape.numel()? {
        return Err(Error::Shape(format!(
            "cannot view {} as {}",
            a.shape(),
            shape
        )));
    }
    Ok(())
}

fn check_dim(a: &Tensor, dim: usize) -> Result<()> {
    a.shape().dim(dim).map(|_| ())
}

fn reduce_shape(a: &Tensor, dim: usize, keepdim: bool) -> Result<Shape> {
    check_dim(a, dim)?;
    let mut dims = a.dims().to_vec();
    if keepdim {
        dims[dim] = 1;
    } else {
        dims.remove(dim);
    }
    Ok(Shape::new(dims))
}

fn matmul_shape(a: &Shape, b: &Shape) -> Result<Shape> {
    let mismatch = || Error::Shape(format!("matmul: incompatible shapes {a} and {b}"));
    let (ad, bd) = (a.dims(), b.dims());
    match (ad.len(), bd.len()) {
        (2, 2) if ad[1] == bd[0] => Ok(Shape::new(vec![ad[0], bd[1]])),
        (3, 2) if ad[2] == bd[0] => Ok(Shape::new(vec![ad[0], ad[1], bd[1]])),
        (3, 3) if ad[0] == bd[0] && ad[2] == bd[1] => Ok(Shape::new(vec![ad[0], ad[1], bd[2]])),
        _ => Err(mismatch()),
    }
}

fn split(a: &Tensor, size: usize, dim: usize) -> Result<Value> {
    check_dim(a, dim)?;
    if size == 0 {
        return Err(Error::Shape("split size must be > 0".into()));
    }
    let len = a.dims()[dim];
    let stride = a.strides()[dim];
    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let chunk = size.min(len - start);
        let mut dims = a.dims().to_vec();
        dims[dim] = chunk;
        chunks.push(Value::Tensor(a.alias(
            Shape::new(dims),
            a.strides().to_vec(),
            a.offset() + start * stride,
        )));
        start += chunk;
        if start >= len {
            break;
        }
    }
    Ok(Value::Seq(chunks))
}

fn cat(inputs: &[&Tensor], dim: usize) -> Result<Value> {
    let Some(first) = inputs.first() else {
        return Err(Error::Arity {
            op: "cat",
            expected: 1,
            got: 0,
        });
    };
    check_dim(first, dim)?;
    let mut dims = first.dims().to_vec();
    dims[dim] = 0;
    for t in inputs {
        if t.dtype() != first.dtype() {
            return Err(Error::DType(format!(
                "cat: mismatched dtypes {} and {}",
                first.dtype(),
                t.dtype()
            )));
        }
        let compatible = t.rank() == first.rank()
            && t
                .dims()
                .iter()
                .zip(first.dims())
                .enumerate()
                .all(|(i, (x, y))| i == dim || x == y);
        if !compatible {
            return Err(Error::Shape(format!(
                "cat: {} does not match {} outside dim {dim}",
                t.shape(),
                first.shape()
            )));
        }
        dims[dim] = dims[dim].checked_add(t.dims()[dim]).ok_or_else(|| {
            Error::Shape(format!("cat: extent along dim {dim} overflows usize"))
        })?;
    }
    Ok(Tensor::empty(Shape::new(dims), first.dtype())?.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{BinaryOp, Fill};

    fn t(dims: &[usize]) -> Tensor {
        Tensor::empty(Shape::from(dims), DType::F32).unwrap()
    }

    fn tensor(v: Value) -> Tensor {
        v.into_tensor().unwrap()
    }

    #[test]
    fn factory_allocates() {
        let out = tensor(
            execute(
                &Op::Factory {
                    shape: Shape::from([1000]),
                    dtype: DType::F32,
                    fill: Fill::Randn,
                },
                &[],
            )
            .unwrap(),
        );
        assert_eq!(out.storage().nbytes(), 4000);
    }

    #[test]
    fn binary_broadcasts_into_new_buffer() {
        let a = t(&[4, 3]);
        let b = t(&[3]);
        let out = tensor(execute(&Op::Binary(BinaryOp::Add), &[&a, &b]).unwrap());
        assert_eq!(out.dims(), &[4, 3]);
        assert!(!out.shares_storage(&a));
    }

    #[test]
    fn inplace_aliases_destination() {
        let a = t(&[4, 3]);
        let b = t(&[3]);
        let out = tensor(execute(&Op::BinaryInplace(BinaryOp::Mul), &[&a, &b]).unwrap());
        assert!(out.shares_storage(&a));
        assert!(execute(&Op::BinaryInplace(BinaryOp::Mul), &[&b, &a]).is_err());
    }

    #[test]
    fn views_alias_and_copies_do_not() {
        let a = t(&[2, 6]);
        let v = tensor(execute(&Op::View { shape: Shape::from([3, 4]) }, &[&a]).unwrap());
        assert!(v.shares_storage(&a));

        let tr = tensor(execute(&Op::Transpose { dim0: 0, dim1: 1 }, &[&a]).unwrap());
        assert!(tr.shares_storage(&a));
        assert_eq!(tr.dims(), &[6, 2]);
        assert!(execute(&Op::View { shape: Shape::from([12]) }, &[&tr]).is_err());

        let r = tensor(execute(&Op::Reshape { shape: Shape::from([12]) }, &[&tr]).unwrap());
        assert!(!r.shares_storage(&a));

        let c = tensor(execute(&Op::Contiguous, &[&a]).unwrap());
        assert!(c.shares_storage(&a));
        let c = tensor(execute(&Op::Contiguous, &[&tr]).unwrap());
        assert!(!c.shares_storage(&a));
    }

    #[test]
    fn split_returns_aliased_chunks() {
        let a = t(&[10, 4]);
        let parts = execute(&Op::Split { size: 4, dim: 0 }, &[&a])
            .unwrap()
            .into_seq()
            .unwrap();
        let dims: Vec<_> = parts
            .iter()
            .map(|p| p.as_tensor().unwrap().dims()[0])
            .collect();
        assert_eq!(dims, vec![4, 4, 2]);
        assert!(parts.iter().all(|p| p.as_tensor().unwrap().shares_storage(&a)));
        assert_eq!(parts[2].as_tensor().unwrap().offset(), 32);
    }

    #[test]
    fn matmul_shapes() {
        let out = tensor(execute(&Op::MatMul, &[&t(&[8, 3]), &t(&[3, 5])]).unwrap());
        assert_eq!(out.dims(), &[8, 5]);
        let out = tensor(execute(&Op::MatMul, &[&t(&[2, 8, 3]), &t(&[2, 3, 5])]).unwrap());
        assert_eq!(out.dims(), &[2, 8, 5]);
        assert!(execute(&Op::MatMul, &[&t(&[8, 3]), &t(&[4, 5])]).is_err());
    }

    #[test]
    fn reductions() {
        let a = t(&[4, 5]);
        let s = tensor(execute(&Op::Sum { dim: None, keepdim: false }, &[&a]).unwrap());
        assert_eq!(s.rank(), 0);
        assert_eq!(s.storage().elements(), 1);

        let m = execute(&Op::MaxDim { dim: 1, keepdim: true }, &[&a])
            .unwrap()
            .into_map()
            .unwrap();
        assert_eq!(m["values"].as_tensor().unwrap().dims(), &[4, 1]);
        assert_eq!(m["indices"].as_tensor().unwrap().dtype(), DType::I64);
    }

    #[test]
    fn cat_sums_along_dim() {
        let out = tensor(execute(&Op::Cat { dim: 1 }, &[&t(&[2, 3]), &t(&[2, 5])]).unwrap());
        assert_eq!(out.dims(), &[2, 8]);
        assert!(execute(&Op::Cat { dim: 1 }, &[&t(&[2, 3]), &t(&[3, 5])]).is_err());
        assert!(execute(&Op::Cat { dim: 0 }, &[]).is_err());
    }

    #[test]
    fn out_of_range_dim_is_rejected() {
        let err = execute(&Op::MaxDim { dim: 2, keepdim: false }, &[&t(&[4, 3])]).unwrap_err();
        assert!(matches!(err, Error::InvalidDim { dim: 2, rank: 2 }));
    }

    #[test]
    fn cat_extent_overflow_fails_fast() {
        let big = t(&[usize::MAX / 2 + 1, 0]);
        let err = execute(&Op::Cat { dim: 0 }, &[&big, &big]).unwrap_err();
        assert!(matches!(err, Error::Shape(_)));
    }

    #[test]
    fn arity_and_dtype_errors() {
        let a = t(&[2]);
        assert!(matches!(
            execute(&Op::MatMul, &[&a]),
            Err(Error::Arity { expected: 2, got: 1, .. })
        ));
        let i = Tensor::empty([2], DType::I64).unwrap();
        assert!(matches!(
            execute(&Op::Binary(BinaryOp::Add), &[&a, &i]),
            Err(Error::DType(_))
        ));
        assert!(execute(&Op::Unary(UnaryOp::Sqrt), &[&i]).is_err());
        assert!(execute(&Op::Unary(UnaryOp::Relu), &[&i]).is_ok());
    }

    #[test]
    fn numel_is_not_a_tensor() {
        let v = execute(&Op::Numel, &[&t(&[3, 7])]).unwrap();
        assert_eq!(v.as_scalar(), Some(21.0));
    }
}
