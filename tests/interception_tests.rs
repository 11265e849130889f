//! Interception layer and result observation through the dispatch path

use std::panic::{catch_unwind, AssertUnwindSafe};

use shadowmem_core::config::TrackerConfig;
use shadowmem_core::dtype::DType;
use shadowmem_core::value::Value;
use shadowmem_exec::{ExecError, Op, ShadowContext, TrackingSession};

fn session() -> TrackingSession {
    TrackingSession::new(TrackerConfig::default()).unwrap()
}

#[test]
fn test_inactive_context_passes_through() {
    let s = session();
    let ctx = ShadowContext::new();
    let _t = ctx.zeros([1000], DType::F32).unwrap();
    assert!(!ctx.is_intercepting());
    assert_eq!(s.ops_observed(), 0);
    assert_eq!(s.peak_bytes(), 0);
}

#[test]
fn test_results_are_returned_unmodified() {
    let s = session();
    let ctx = ShadowContext::new();
    let active = s.activate(&ctx);
    let a = ctx.randn([4, 6]).unwrap();
    let b = ctx.transpose(&a, 0, 1).unwrap();
    assert_eq!(b.dims(), &[6, 4]);
    assert!(b.shares_storage(&a));
    active.deactivate();
    assert!(!ctx.is_intercepting());
    assert_eq!(s.ops_observed(), 2);
    assert_eq!(s.registry().len(), 1);
}

#[test]
fn test_deactivates_when_workload_fails() {
    let s = session();
    let ctx = ShadowContext::new();
    let res: Result<(), ExecError> = s.run(&ctx, |ctx| {
        let a = ctx.zeros([2, 3], DType::F32)?;
        ctx.view(&a, [7])?;
        Ok(())
    });
    assert!(res.is_err());
    assert!(!ctx.is_intercepting());
}

#[test]
fn test_deactivates_when_workload_panics() {
    let s = session();
    let ctx = ShadowContext::new();
    let res = catch_unwind(AssertUnwindSafe(|| {
        let _: Result<(), ExecError> = s.run(&ctx, |ctx| {
            let _a = ctx.zeros([10], DType::F32)?;
            panic!("workload failure");
        });
    }));
    assert!(res.is_err());
    assert!(!ctx.is_intercepting());
    assert_eq!(s.peak_bytes(), 512);
    assert_eq!(s.live_bytes(), 0);
}

#[test]
fn test_nested_sessions_each_observe_while_active() {
    let outer = session();
    let inner = session();
    let ctx = ShadowContext::new();

    let _o = outer.activate(&ctx);
    let a = ctx.zeros([1000], DType::F32).unwrap();
    {
        let _i = inner.activate(&ctx);
        let _b = ctx.zeros([100], DType::F32).unwrap();
        assert_eq!(ctx.active_mode_names().len(), 2);
    }
    drop(a);

    assert_eq!(outer.ops_observed(), 2);
    assert_eq!(inner.ops_observed(), 1);
    assert_eq!(outer.peak_bytes(), 4608);
    assert_eq!(inner.peak_bytes(), 512);
}

#[test]
fn test_nested_results_are_traversed() {
    let s = session();
    let ctx = ShadowContext::new();
    let _active = s.activate(&ctx);

    let x = ctx.zeros([10, 200], DType::F32).unwrap();
    // split: a sequence of views sharing x's buffer
    let parts = ctx.split(&x, 3, 0).unwrap();
    assert_eq!(parts.len(), 4);
    assert_eq!(s.registry().len(), 1);

    // max_dim: a mapping holding two fresh buffers
    let (values, indices) = ctx.max_dim(&x, 1, false).unwrap();
    assert_eq!(s.registry().len(), 3);
    assert_eq!(s.live_bytes(), 8192 + 512 + 512);
    drop((values, indices));
    assert_eq!(s.registry().len(), 1);
}

#[test]
fn test_non_tensor_results_leave_registry_unchanged() {
    let s = session();
    let ctx = ShadowContext::new();
    let _active = s.activate(&ctx);

    let x = ctx.zeros([64], DType::F32).unwrap();
    let before = s.live_bytes();
    let n = ctx.dispatch(Op::Numel, &[&x]).unwrap();
    assert_eq!(n.as_scalar(), Some(64.0));
    assert_eq!(s.live_bytes(), before);
    assert_eq!(s.ops_observed(), 2);
}

#[test]
fn test_repeated_observation_does_not_double_count() {
    let s = session();
    let ctx = ShadowContext::new();
    let x = ctx.zeros([1000], DType::F32).unwrap();
    let y = ctx.zeros([100], DType::F32).unwrap();
    let result = Value::from(vec![x.clone(), y.clone(), x.clone()]);

    let first = s.observe(&result);
    assert_eq!(first.tensors_seen, 3);
    assert_eq!(first.buffers_registered, 2);
    let total = s.live_bytes();
    assert_eq!(total, 4608);

    let second = s.observe(&result);
    assert_eq!(second.buffers_registered, 0);
    assert_eq!(s.live_bytes(), total);
}

#[test]
fn test_inplace_ops_do_not_allocate() {
    let s = session();
    let ctx = ShadowContext::new();
    let _active = s.activate(&ctx);
    let p = ctx.zeros([1000], DType::F32).unwrap();
    let g = ctx.ones([1000], DType::F32).unwrap();
    let live = s.live_bytes();
    ctx.add_(&p, &g).unwrap();
    ctx.mul_scalar_(&p, 0.9).unwrap();
    assert_eq!(s.live_bytes(), live);
}

#[test]
fn test_report_is_exposed_as_json() {
    let s = session();
    let ctx = ShadowContext::new();
    let kept = s.run(&ctx, |ctx| ctx.zeros([100], DType::F32)).unwrap();
    let report: serde_json::Value = serde_json::from_str(&s.report().to_json().unwrap()).unwrap();
    assert_eq!(report["peak_bytes"], 512);
    assert_eq!(report["live_buffers"], 1);
    assert_eq!(report["ops_observed"], 1);
    drop(kept);
}
