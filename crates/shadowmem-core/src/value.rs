//! Operation results.
//!
//! A result is a small closed set of shapes: nothing, a tensor, a scalar, or
//! an ordered sequence / string-keyed mapping of further results. Observers
//! walk this with `visit_tensors` and never mutate it.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::tensor::Tensor;

#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    None,
    Tensor(Tensor),
    Scalar(f64),
    Seq(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Depth-first, in-order visit of every tensor in the structure.
    pub fn visit_tensors<'a, F>(&'a self, f: &mut F)
    where
        F: FnMut(&'a Tensor),
    {
        match self {
            Value::Tensor(t) => f(t),
            Value::Seq(items) => {
                for item in items {
                    item.visit_tensors(f);
                }
            }
            Value::Map(entries) => {
                for item in entries.values() {
                    item.visit_tensors(f);
                }
            }
            Value::None | Value::Scalar(_) => {}
        }
    }

    /// All tensors in visit order.
    pub fn tensors(&self) -> Vec<&Tensor> {
        let mut out = Vec::new();
        self.visit_tensors(&mut |t| out.push(t));
        out
    }

    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            Value::Tensor(t) => Some(t),
            _ => None,
        }
    }

    pub fn into_tensor(self) -> Result<Tensor> {
        match self {
            Value::Tensor(t) => Ok(t),
            other => Err(Error::Internal(format!(
                "expected a tensor result, got {}",
                other.kind()
            ))),
        }
    }

    pub fn into_seq(self) -> Result<Vec<Value>> {
        match self {
            Value::Seq(items) => Ok(items),
            other => Err(Error::Internal(format!(
                "expected a sequence result, got {}",
                other.kind()
            ))),
        }
    }

    pub fn into_map(self) -> Result<BTreeMap<String, Value>> {
        match self {
            Value::Map(entries) => Ok(entries),
            other => Err(Error::Internal(format!(
                "expected a mapping result, got {}",
                other.kind()
            ))),
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Value::Scalar(x) => Some(*x),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Tensor(_) => "tensor",
            Value::Scalar(_) => "scalar",
            Value::Seq(_) => "seq",
            Value::Map(_) => "map",
        }
    }
}

impl From<Tensor> for Value {
    fn from(t: Tensor) -> Self {
        Value::Tensor(t)
    }
}

impl From<Vec<Tensor>> for Value {
    fn from(ts: Vec<Tensor>) -> Self {
        Value::Seq(ts.into_iter().map(Value::Tensor).collect())
    }
}
