//! Demo workload: one or more training steps of an MLP regressor.
//!
//! The backward pass is written out by hand so that every intermediate is an
//! ordinary dispatched op; activations are released as soon as backward no
//! longer needs them, the way an autograd tape would.

use shadowmem_core::dtype::DType;
use shadowmem_core::tensor::Tensor;
use shadowmem_exec::{ExecError, ShadowContext};

type Result<T> = std::result::Result<T, ExecError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OptimizerKind {
    Sgd,
    Adam,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MlpSpec {
    pub batch: usize,
    pub input: usize,
    pub hidden: Vec<usize>,
    pub classes: usize,
    pub dtype: DType,
    pub optimizer: OptimizerKind,
    pub steps: usize,
}

impl MlpSpec {
    fn widths(&self) -> Vec<usize> {
        let mut w = Vec::with_capacity(self.hidden.len() + 2);
        w.push(self.input);
        w.extend_from_slice(&self.hidden);
        w.push(self.classes);
        w
    }
}

struct Linear {
    weight: Tensor,
    bias: Tensor,
}

struct Grad {
    weight: Tensor,
    bias: Tensor,
}

pub struct Mlp {
    layers: Vec<Linear>,
}

/// What backward needs from forward, per layer.
struct Tape {
    inputs: Vec<Tensor>,
    pre_activations: Vec<Tensor>,
}

impl Mlp {
    pub fn new(ctx: &ShadowContext, spec: &MlpSpec) -> Result<Self> {
        let widths = spec.widths();
        let layers = widths
            .windows(2)
            .map(|w| {
                Ok(Linear {
                    weight: ctx.to_dtype(&ctx.randn([w[0], w[1]])?, spec.dtype)?,
                    bias: ctx.zeros([w[1]], spec.dtype)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { layers })
    }

    pub fn parameter_count(&self) -> usize {
        self.layers
            .iter()
            .map(|l| l.weight.storage().elements() + l.bias.storage().elements())
            .sum()
    }

    fn forward(&self, ctx: &ShadowContext, x: &Tensor) -> Result<(Tensor, Tape)> {
        let mut tape = Tape {
            inputs: Vec::with_capacity(self.layers.len()),
            pre_activations: Vec::with_capacity(self.layers.len()),
        };
        let mut h = x.clone();
        let last = self.layers.len().saturating_sub(1);
        for (i, layer) in self.layers.iter().enumerate() {
            let z = ctx.add(&ctx.matmul(&h, &layer.weight)?, &layer.bias)?;
            tape.inputs.push(h);
            h = if i == last {
                z.clone()
            } else {
                ctx.relu(&z)?
            };
            tape.pre_activations.push(z);
        }
        Ok((h, tape))
    }

    /// Gradients for every layer, in layer order. Consumes the tape.
    fn backward(&self, ctx: &ShadowContext, mut tape: Tape, grad_out: Tensor) -> Result<Vec<Grad>> {
        let mut grads = Vec::with_capacity(self.layers.len());
        let mut g = grad_out;
        for (i, layer) in self.layers.iter().enumerate().rev() {
            let input = tape.inputs.pop().ok_or_else(missing_tape)?;
            tape.pre_activations.pop();

            let weight = ctx.matmul(&ctx.t(&input)?, &g)?;
            let bias = ctx.sum_dim(&g, 0, false)?;
            grads.push(Grad { weight, bias });
            drop(input);

            if i > 0 {
                let gh = ctx.matmul(&g, &ctx.t(&layer.weight)?)?;
                let pre = tape.pre_activations.last().ok_or_else(missing_tape)?;
                let mask = ctx.relu(pre)?;
                g = ctx.mul(&gh, &mask)?;
            }
        }
        grads.reverse();
        Ok(grads)
    }
}

fn missing_tape() -> ExecError {
    shadowmem_core::Error::Internal("backward ran past the recorded tape".into()).into()
}

struct AdamState {
    exp_avg: Tensor,
    exp_avg_sq: Tensor,
}

/// Optimizer state lives across steps, like the real thing.
pub struct Optimizer {
    kind: OptimizerKind,
    lr: f64,
    state: Vec<Option<AdamState>>,
}

impl Optimizer {
    const BETA1: f64 = 0.9;
    const BETA2: f64 = 0.999;
    const EPS: f64 = 1e-8;

    pub fn new(kind: OptimizerKind, params: usize) -> Self {
        Self {
            kind,
            lr: 1e-3,
            state: (0..params).map(|_| None).collect(),
        }
    }

    fn step(&mut self, ctx: &ShadowContext, model: &Mlp, grads: &[Grad]) -> Result<()> {
        let pairs = model
            .layers
            .iter()
            .zip(grads)
            .flat_map(|(l, g)| [(&l.weight, &g.weight), (&l.bias, &g.bias)]);
        for (slot, (param, grad)) in pairs.enumerate() {
            match self.kind {
                OptimizerKind::Sgd => {
                    ctx.add_(param, &ctx.mul_scalar(grad, -self.lr)?)?;
                }
                OptimizerKind::Adam => {
                    let st = match self.state[slot].take() {
                        Some(st) => st,
                        None => AdamState {
                            exp_avg: ctx.zeros_like(param)?,
                            exp_avg_sq: ctx.zeros_like(param)?,
                        },
                    };
                    ctx.mul_scalar_(&st.exp_avg, Self::BETA1)?;
                    ctx.add_(&st.exp_avg, &ctx.mul_scalar(grad, 1.0 - Self::BETA1)?)?;
                    ctx.mul_scalar_(&st.exp_avg_sq, Self::BETA2)?;
                    let sq = ctx.mul(grad, grad)?;
                    ctx.add_(&st.exp_avg_sq, &ctx.mul_scalar(&sq, 1.0 - Self::BETA2)?)?;
                    let denom = ctx.add_scalar(&ctx.sqrt(&st.exp_avg_sq)?, Self::EPS)?;
                    let update = ctx.div(&st.exp_avg, &denom)?;
                    ctx.add_(param, &ctx.mul_scalar(&update, -self.lr)?)?;
                    self.state[slot] = Some(st);
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkloadSummary {
    pub parameters: usize,
    pub steps: usize,
}

/// Build the model and run `spec.steps` training steps on `ctx`.
pub fn run_training(ctx: &ShadowContext, spec: &MlpSpec) -> Result<WorkloadSummary> {
    let model = Mlp::new(ctx, spec)?;
    let mut optim = Optimizer::new(spec.optimizer, model.layers.len() * 2);
    let x = ctx.to_dtype(&ctx.randn([spec.batch, spec.input])?, spec.dtype)?;
    let target = ctx.to_dtype(&ctx.randn([spec.batch, spec.classes])?, spec.dtype)?;

    for _ in 0..spec.steps {
        let (out, tape) = model.forward(ctx, &x)?;
        let diff = ctx.sub(&out, &target)?;
        drop(out);
        let _loss = ctx.sum(&ctx.mul(&diff, &diff)?)?;
        let scale = 2.0 / (spec.batch.max(1) * spec.classes.max(1)) as f64;
        let grad_out = ctx.mul_scalar(&diff, scale)?;
        drop(diff);

        let grads = model.backward(ctx, tape, grad_out)?;
        optim.step(ctx, &model, &grads)?;
        // zero_grad(set_to_none=True)
        drop(grads);
    }

    Ok(WorkloadSummary {
        parameters: model.parameter_count(),
        steps: spec.steps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shadowmem_core::config::TrackerConfig;
    use shadowmem_exec::TrackingSession;

    fn spec(batch: usize, optimizer: OptimizerKind) -> MlpSpec {
        MlpSpec {
            batch,
            input: 32,
            hidden: vec![64],
            classes: 10,
            dtype: DType::F32,
            optimizer,
            steps: 1,
        }
    }

    fn peak(spec: &MlpSpec) -> usize {
        let session = TrackingSession::new(TrackerConfig::default()).unwrap();
        let ctx = ShadowContext::new();
        session.run(&ctx, |ctx| run_training(ctx, spec)).unwrap();
        assert!(!ctx.is_intercepting());
        assert_eq!(session.live_bytes(), 0);
        session.peak_bytes()
    }

    #[test]
    fn parameter_count() {
        let ctx = ShadowContext::new();
        let model = Mlp::new(&ctx, &spec(4, OptimizerKind::Sgd)).unwrap();
        assert_eq!(model.parameter_count(), 32 * 64 + 64 + 64 * 10 + 10);
    }

    #[test]
    fn peak_covers_the_parameters() {
        let p = peak(&spec(8, OptimizerKind::Sgd));
        assert!(p >= (32 * 64 + 64 * 10) * 4);
    }

    #[test]
    fn adam_state_costs_more_than_sgd() {
        assert!(peak(&spec(8, OptimizerKind::Adam)) > peak(&spec(8, OptimizerKind::Sgd)));
    }

    #[test]
    fn peak_grows_with_batch() {
        let small = peak(&spec(8, OptimizerKind::Adam));
        let large = peak(&spec(4096, OptimizerKind::Adam));
        assert!(large > small);
    }
}
