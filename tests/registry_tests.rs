//! Live allocation registry tests: dedup, release, non-owning observation

use shadowmem_core::dtype::DType;
use shadowmem_core::tensor::Tensor;
use shadowmem_mem::{AlignmentPolicy, LiveRegistry};

fn registry() -> LiveRegistry {
    LiveRegistry::new(AlignmentPolicy::default())
}

#[test]
fn test_aliasing_values_count_once() {
    let reg = registry();
    let base = Tensor::empty([1000], DType::F32).unwrap();
    let view = base.alias([10, 100].into(), vec![100, 1], 0);

    assert!(reg.register(base.storage()).unwrap());
    let len_after_first = reg.len();
    assert!(!reg.register(view.storage()).unwrap());

    assert_eq!(reg.len(), len_after_first);
    assert_eq!(reg.len(), 1);
    assert_eq!(reg.total_resident_bytes(), 4096);
}

#[test]
fn test_release_of_only_buffer_keeps_peak() {
    let reg = registry();
    let t = Tensor::empty([1000], DType::F32).unwrap();
    reg.register(t.storage()).unwrap();
    assert_eq!(reg.total_resident_bytes(), 4096);
    assert_eq!(reg.peak(), 4096);

    drop(t);
    assert_eq!(reg.total_resident_bytes(), 0);
    assert_eq!(reg.peak(), 4096);
}

#[test]
fn test_release_waits_for_last_view() {
    let reg = registry();
    let base = Tensor::empty([256], DType::F32).unwrap();
    let view = base.alias([16, 16].into(), vec![16, 1], 0);
    reg.register(base.storage()).unwrap();

    drop(base);
    assert_eq!(reg.len(), 1, "view still holds the buffer");
    drop(view);
    assert!(reg.is_empty());
}

#[test]
fn test_registry_never_extends_lifetime() {
    let reg = registry();
    let t = Tensor::empty([10], DType::F64).unwrap();
    let weak = t.storage().downgrade();
    let strong_before = t.storage().strong_count();

    reg.register(t.storage()).unwrap();
    assert_eq!(t.storage().strong_count(), strong_before);

    drop(t);
    assert!(!weak.is_alive());
    assert!(reg.is_empty());
}

#[test]
fn test_recompute_reports_live_total() {
    let reg = registry();
    let a = Tensor::empty([3], DType::F32).unwrap();
    let b = Tensor::empty([129], DType::F32).unwrap();
    reg.register(a.storage()).unwrap();
    reg.register(b.storage()).unwrap();
    assert_eq!(reg.recompute(), 512 + 1024);
    assert_eq!(reg.live_buffers().len(), 2);
}

#[test]
fn test_clones_share_entries() {
    let reg = registry();
    let other = reg.clone();
    let t = Tensor::empty([10], DType::F32).unwrap();
    reg.register(t.storage()).unwrap();
    assert!(other.contains(t.buffer_id()));
    assert!(!other.register(t.storage()).unwrap());
}
