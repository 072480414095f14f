#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tensorjit::array::Array;
use tensorjit::dtype::DType;
use tensorjit::graph::{Node, Op, TensorType};
use tensorjit_backend_loop::JitConfig;

pub const ATOL: f64 = 1e-9;
pub const RTOL: f64 = 1e-9;

pub fn config() -> JitConfig {
    JitConfig::default()
}

pub fn f64_type(shape: &[usize]) -> TensorType {
    TensorType::fixed(DType::F64, shape)
}

pub fn unary_node(op: Op, input: TensorType, output: TensorType) -> Node {
    Node::new(op, vec![input], vec![output])
}

pub fn random_f64(rng: &mut StdRng, shape: &[usize]) -> Array {
    let len = shape.iter().product();
    let values = (0..len).map(|_| rng.gen_range(-3.0..3.0)).collect();
    Array::from_f64(shape.to_vec(), values).expect("length matches shape")
}

pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

pub fn assert_close(expected: &[f64], actual: &[f64]) {
    assert_eq!(
        expected.len(),
        actual.len(),
        "length mismatch: expected {expected:?}, got {actual:?}"
    );
    for (idx, (e, a)) in expected.iter().zip(actual).enumerate() {
        let tol = ATOL + RTOL * e.abs().max(a.abs());
        assert!(
            (e - a).abs() <= tol,
            "element {idx}: expected {e}, got {a} (tolerance {tol})"
        );
    }
}
