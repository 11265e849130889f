//! Alignment/sizing policy tests

use shadowmem_core::buffer::Storage;
use shadowmem_core::dtype::DType;
use shadowmem_mem::{AlignmentPolicy, Error};

#[test]
fn test_documented_rounding_examples() {
    let policy = AlignmentPolicy::default();
    assert_eq!(policy.align(), 512);

    // 12 bytes -> one block
    assert_eq!(policy.resident_bytes(3, 4).unwrap(), 512);
    // exactly one block
    assert_eq!(policy.resident_bytes(128, 4).unwrap(), 512);
    // one byte over -> two blocks
    assert_eq!(policy.resident_bytes(129, 4).unwrap(), 1024);
}

#[test]
fn test_size_is_independent_of_logical_shape() {
    let policy = AlignmentPolicy::default();
    let flat = Storage::new(400, DType::F16).unwrap();
    assert_eq!(policy.size_bytes(flat.elements(), flat.element_width()).unwrap(), 800);
    assert_eq!(policy.resident_bytes_for(&flat).unwrap(), 1024);
}

#[test]
fn test_every_dtype_width_rounds_up() {
    let policy = AlignmentPolicy::default();
    for dtype in [
        DType::Bool,
        DType::U8,
        DType::I32,
        DType::I64,
        DType::F16,
        DType::BF16,
        DType::F32,
        DType::F64,
    ] {
        for n in [0usize, 1, 100, 511, 512, 513, 10_000] {
            let w = dtype.size_in_bytes();
            let resident = policy.resident_bytes(n, w).unwrap();
            assert_eq!(resident % 512, 0);
            assert!(resident >= n * w);
            assert!(resident < n * w + 512);
        }
    }
}

#[test]
fn test_zero_width_fails_fast() {
    let policy = AlignmentPolicy::default();
    assert_eq!(
        policy.resident_bytes(10, 0),
        Err(Error::InvalidElementWidth(0))
    );
}
