use std::sync::Arc;
use std::thread;

use dicp_rs::kernel::{parse_kernel, KernelCache};
use dicp_rs::{CompileError, HostTensor, Value};

const NEG: &str = "\
target topsgraph
kernel neg_kernel(x: f32[3]) {
    y: f32[3] = tops.Neg(x)
    return (y)
}
";

const RELU: &str = "\
target topsgraph
kernel relu_kernel(x: f32[3]) {
    y: f32[3] = tops.Relu(x)
    return (y)
}
";

fn input() -> Value {
    Value::Tensor(HostTensor::from_f32(&[3], vec![-1.0, 0.5, 2.0]).expect("tensor"))
}

#[test]
fn same_source_yields_the_same_kernel() {
    let cache = KernelCache::new();
    let first = cache.load(NEG).expect("first load");
    let second = cache.load(NEG).expect("second load");
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(cache.len(), 1);
    assert!(cache.contains(NEG));
}

#[test]
fn different_sources_do_not_collide() {
    let cache = KernelCache::new();
    let neg = cache.load(NEG).expect("neg");
    let relu = cache.load(RELU).expect("relu");
    assert!(!Arc::ptr_eq(&neg, &relu));
    assert_ne!(neg.digest(), relu.digest());
    assert_eq!(cache.len(), 2);

    let negated = neg.call(vec![input()]).expect("neg runs");
    let rectified = relu.call(vec![input()]).expect("relu runs");
    let values = |outputs: &[Value]| {
        outputs[0]
            .as_tensor()
            .and_then(HostTensor::as_f32)
            .map(<[f32]>::to_vec)
            .expect("f32 output")
    };
    assert_eq!(values(&negated), vec![1.0, -0.5, -2.0]);
    assert_eq!(values(&rectified), vec![0.0, 0.5, 2.0]);
}

#[test]
fn whitespace_changes_are_distinct_entries() {
    let cache = KernelCache::new();
    let spaced = format!("{NEG}\n");
    let a = cache.load(NEG).expect("a");
    let b = cache.load(&spaced).expect("b");
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(a.name(), b.name());
}

#[test]
fn concurrent_loads_share_one_entry() {
    let cache = Arc::new(KernelCache::new());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || cache.load(NEG).expect("load"))
        })
        .collect();
    let kernels: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("thread"))
        .collect();
    for kernel in &kernels[1..] {
        assert!(Arc::ptr_eq(&kernels[0], kernel));
    }
    assert_eq!(cache.len(), 1);
}

#[test]
fn invalid_sources_are_codegen_errors() {
    let cache = KernelCache::new();
    let err = cache
        .load("kernel k(x: f32[3]) {\n    y: f32[3] = tops.Bogus(x)\n    return (y)\n}\n")
        .expect_err("unknown op");
    assert!(matches!(err, CompileError::Codegen(ref message) if message.contains("line 2")));
    assert!(cache.is_empty());
}

#[test]
fn declared_output_shapes_are_checked() {
    let source = "\
kernel k(x: f32[3]) -> (y: [3]) {
    y: f32[3] = ascend.Abs(x)
    return (y)
}
";
    let module = parse_kernel(source).expect("parses");
    assert_eq!(module.outputs.as_ref().map(Vec::len), Some(1));
    let kernel = KernelCache::new().load(source).expect("loads");
    assert!(kernel.call(vec![input()]).is_ok());
}
