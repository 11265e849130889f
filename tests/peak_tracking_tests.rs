//! Peak accounting: monotonicity and the end-to-end scenario

use shadowmem_core::config::TrackerConfig;
use shadowmem_core::dtype::DType;
use shadowmem_core::tensor::Tensor;
use shadowmem_exec::{ExecError, ShadowContext, TrackingSession};
use shadowmem_mem::{AlignmentPolicy, LiveRegistry};

#[test]
fn test_end_to_end_scenario() {
    let session = TrackingSession::new(TrackerConfig::default()).unwrap();
    let ctx = ShadowContext::new();

    let res: Result<(), ExecError> = session.run(&ctx, |ctx| {
        // A: 1000 x 4 bytes -> 4096 resident
        let a = ctx.zeros([1000], DType::F32)?;
        // B: 100 x 4 bytes -> 512 resident, A still live
        let b = ctx.zeros([100], DType::F32)?;
        assert_eq!(session.peak_bytes(), 4608);

        drop(a);
        assert_eq!(session.live_bytes(), 512);

        // C: 2000 x 4 bytes -> 8192 resident, B still live
        let c = ctx.zeros([2000], DType::F32)?;
        assert_eq!(session.peak_bytes(), 8704);

        drop((b, c));
        Ok(())
    });
    res.unwrap();

    assert_eq!(session.peak_bytes(), 8704);
    assert_eq!(session.live_bytes(), 0);
}

#[test]
fn test_peak_is_monotonic_and_bounds_live_total() {
    let reg = LiveRegistry::new(AlignmentPolicy::default());
    let mut live: Vec<Tensor> = Vec::new();
    let mut last_peak = 0;
    let mut seed: u64 = 0x2545_f491_4f6c_dd1d;

    for _ in 0..500 {
        seed = seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let r = (seed >> 33) as usize;

        if r % 3 == 0 && !live.is_empty() {
            live.swap_remove(r % live.len());
        } else {
            let t = Tensor::empty([r % 5000], DType::F32).unwrap();
            reg.register(t.storage()).unwrap();
            live.push(t);
        }

        let total = reg.recompute();
        let peak = reg.peak();
        assert!(peak >= last_peak, "peak decreased: {last_peak} -> {peak}");
        assert!(peak >= total, "peak {peak} below live total {total}");
        last_peak = peak;
    }

    live.clear();
    assert_eq!(reg.total_resident_bytes(), 0);
    assert_eq!(reg.peak(), last_peak);
}

#[test]
fn test_new_session_starts_from_zero() {
    let ctx = ShadowContext::new();
    let first = TrackingSession::new(TrackerConfig::default()).unwrap();
    first
        .run(&ctx, |ctx| ctx.zeros([10_000], DType::F32).map(drop))
        .unwrap();
    assert_eq!(first.peak_bytes(), 40_448);

    let second = TrackingSession::new(TrackerConfig::default()).unwrap();
    assert_eq!(second.peak_bytes(), 0);
}

#[test]
fn test_custom_alignment_changes_rounding() {
    let cfg = TrackerConfig {
        align_bytes: 4096,
        ..Default::default()
    };
    let session = TrackingSession::new(cfg).unwrap();
    let ctx = ShadowContext::new();
    let _t = session.run(&ctx, |ctx| ctx.zeros([100], DType::F32)).unwrap();
    assert_eq!(session.peak_bytes(), 4096);
}
