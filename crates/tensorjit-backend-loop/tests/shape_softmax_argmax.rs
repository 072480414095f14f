mod common;

use common::{assert_close, config, f64_type, random_f64, rng, unary_node};
use tensorjit::array::{Array, Value};
use tensorjit::dtype::DType;
use tensorjit::graph::{DimEntry, DimShuffle, Node, Op, TensorType};
use tensorjit::scalar::Scalar;
use tensorjit_backend_loop::{argmax_lane, funcify, KernelError};

fn dimshuffle_node(
    input: TensorType,
    order: Vec<DimEntry>,
    output: TensorType,
) -> anyhow::Result<Node> {
    let op = DimShuffle::new(input.ndim(), order, false)?;
    Ok(unary_node(Op::DimShuffle(op), input, output))
}

#[test]
fn dimshuffle_transpose_round_trips() -> anyhow::Result<()> {
    let forward = dimshuffle_node(
        f64_type(&[2, 3]),
        vec![DimEntry::Axis(1), DimEntry::Axis(0)],
        f64_type(&[3, 2]),
    )?;
    let backward = dimshuffle_node(
        f64_type(&[3, 2]),
        vec![DimEntry::Axis(1), DimEntry::Axis(0)],
        f64_type(&[2, 3]),
    )?;
    let x = Array::from_f64(vec![2, 3], (0..6).map(f64::from).collect())?;

    let t = funcify(&forward, &config())?.call_array(&[x.clone()])?;
    assert_eq!(t.shape(), &[3, 2]);
    assert_eq!(t.to_f64_vec(), vec![0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
    let back = funcify(&backward, &config())?.call_array(&[t])?;
    assert_eq!(back, x);
    Ok(())
}

#[test]
fn dimshuffle_inserts_unit_axes() -> anyhow::Result<()> {
    let order = vec![DimEntry::Axis(1), DimEntry::Augment, DimEntry::Axis(0)];
    let x = Array::from_f64(vec![2, 3], (0..6).map(f64::from).collect())?;

    let known = dimshuffle_node(f64_type(&[2, 3]), order.clone(), f64_type(&[3, 1, 2]))?;
    let kernel = funcify(&known, &config())?;
    assert!(kernel.source().contains("return reshape(ascontiguousarray(x), (3, 1, 2));"));
    assert!(kernel.options().inline);
    let out = kernel.call_array(&[x.clone()])?;
    assert_eq!(out.shape(), &[3, 1, 2]);

    let dynamic = dimshuffle_node(
        TensorType::dynamic(DType::F64, 2),
        order,
        TensorType::dynamic(DType::F64, 3),
    )?;
    let kernel = funcify(&dynamic, &config())?;
    assert!(kernel.source().contains("(x.shape[0], 1, x.shape[1])"));
    assert_eq!(kernel.call_array(&[x])?, out);
    Ok(())
}

#[test]
fn dimshuffle_drops_unit_axes() -> anyhow::Result<()> {
    let drop_one = dimshuffle_node(
        f64_type(&[2, 1]),
        vec![DimEntry::Axis(0)],
        f64_type(&[2]),
    )?;
    let x = Array::from_f64(vec![2, 1], vec![7.0, 8.0])?;
    let out = funcify(&drop_one, &config())?.call_array(&[x])?;
    assert_eq!(out.shape(), &[2]);
    assert_eq!(out.to_f64_vec(), vec![7.0, 8.0]);

    let drop_all = dimshuffle_node(f64_type(&[1, 1]), vec![], f64_type(&[]))?;
    let kernel = funcify(&drop_all, &config())?;
    assert!(kernel.source().contains("return reshape(ascontiguousarray(x), ());"));
    let out = kernel.call_array(&[Array::from_f64(vec![1, 1], vec![4.5])?])?;
    assert_eq!(out.ndim(), 0);
    assert_eq!(out.item()?, Scalar::Float(4.5));
    Ok(())
}

#[test]
fn dimshuffle_checks_declared_ranks() -> anyhow::Result<()> {
    let node = dimshuffle_node(
        f64_type(&[2, 3]),
        vec![DimEntry::Axis(1), DimEntry::Axis(0)],
        f64_type(&[3, 2, 1]),
    )?;
    let err = funcify(&node, &config()).expect_err("output rank 3 for a 2-d shuffle");
    assert!(matches!(err, KernelError::ShapeMismatch(_)));
    Ok(())
}

fn softmax_rows(values: &[f64], rows: usize, cols: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    for r in 0..rows {
        let row = &values[r * cols..(r + 1) * cols];
        let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let total: f64 = row.iter().map(|v| (v - max).exp()).sum();
        out.extend(row.iter().map(|v| (v - max).exp() / total));
    }
    out
}

#[test]
fn softmax_normalizes_each_row() -> anyhow::Result<()> {
    let mut rng = rng(5);
    let x = random_f64(&mut rng, &[3, 4]);
    let node = unary_node(
        Op::Softmax { axis: Some(-1) },
        f64_type(&[3, 4]),
        f64_type(&[3, 4]),
    );
    let kernel = funcify(&node, &config())?;
    assert!(kernel.source().contains("careduce_maximum_axis1"));
    assert!(kernel.signature().is_some());

    let sm = kernel.call_array(&[x.clone()])?;
    let values = sm.to_f64_vec();
    assert_close(&softmax_rows(&x.to_f64_vec(), 3, 4), &values);
    for row in values.chunks(4) {
        assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }
    Ok(())
}

#[test]
fn log_softmax_is_log_of_softmax() -> anyhow::Result<()> {
    let mut rng = rng(8);
    let x = random_f64(&mut rng, &[2, 5]);
    let softmax = unary_node(
        Op::Softmax { axis: Some(1) },
        f64_type(&[2, 5]),
        f64_type(&[2, 5]),
    );
    let log_softmax = unary_node(
        Op::LogSoftmax { axis: Some(1) },
        f64_type(&[2, 5]),
        f64_type(&[2, 5]),
    );
    let sm = funcify(&softmax, &config())?.call_array(&[x.clone()])?;
    let lsm = funcify(&log_softmax, &config())?.call_array(&[x])?;
    let exp_lsm: Vec<f64> = lsm.to_f64_vec().iter().map(|v| v.exp()).collect();
    assert_close(&sm.to_f64_vec(), &exp_lsm);
    Ok(())
}

#[test]
fn softmax_without_axis_spans_the_whole_array() -> anyhow::Result<()> {
    let node = unary_node(
        Op::Softmax { axis: None },
        f64_type(&[2, 2]),
        f64_type(&[2, 2]),
    );
    let kernel = funcify(&node, &config())?;
    assert!(kernel.source().contains("z = max(x);"));
    let out = kernel.call_array(&[Array::from_f64(vec![2, 2], vec![0.0, 1.0, 2.0, 3.0])?])?;
    let values = out.to_f64_vec();
    assert!((values.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    assert_close(&softmax_rows(&[0.0, 1.0, 2.0, 3.0], 1, 4), &values);
    Ok(())
}

#[test]
fn softmax_grad_matches_manual_formula() -> anyhow::Result<()> {
    let node = Node::new(
        Op::SoftmaxGrad { axis: Some(1) },
        vec![f64_type(&[2, 3]), f64_type(&[2, 3])],
        vec![f64_type(&[2, 3])],
    );
    let kernel = funcify(&node, &config())?;
    assert!(kernel.signature().is_none());

    let dy = [1.0, 0.0, -1.0, 0.5, 0.5, 2.0];
    let sm = [0.2, 0.3, 0.5, 0.1, 0.6, 0.3];
    let out = kernel.call_array(&[
        Array::from_f64(vec![2, 3], dy.to_vec())?,
        Array::from_f64(vec![2, 3], sm.to_vec())?,
    ])?;

    let mut expected = Vec::new();
    for r in 0..2 {
        let row = r * 3..(r + 1) * 3;
        let total: f64 = row.clone().map(|i| dy[i] * sm[i]).sum();
        expected.extend(row.map(|i| dy[i] * sm[i] - total * sm[i]));
    }
    assert_close(&expected, &out.to_f64_vec());
    Ok(())
}

#[test]
fn softmax_grad_needs_two_inputs() {
    let node = unary_node(
        Op::SoftmaxGrad { axis: Some(0) },
        f64_type(&[3]),
        f64_type(&[3]),
    );
    let err = funcify(&node, &config()).expect_err("sm input missing");
    assert!(matches!(err, KernelError::Unimplemented { op: "SoftmaxGrad", .. }));
}

fn argmax_node(shape: &[usize], axis: Option<Vec<usize>>, out_shape: &[usize]) -> Node {
    unary_node(
        Op::Argmax { axis },
        f64_type(shape),
        TensorType::fixed(DType::I64, out_shape),
    )
}

#[test]
fn argmax_along_one_axis_takes_first_maximum() -> anyhow::Result<()> {
    let x = Array::from_f64(vec![2, 3], vec![1.0, 5.0, 2.0, 7.0, 0.0, 7.0])?;
    let rows = funcify(&argmax_node(&[2, 3], Some(vec![1]), &[2]), &config())?;
    let out = rows.call_array(&[x.clone()])?;
    assert_eq!(out.dtype(), DType::I64);
    assert_eq!(out.to_i64_vec(), vec![1, 0]);

    let cols = funcify(&argmax_node(&[2, 3], Some(vec![0]), &[3]), &config())?;
    assert_eq!(cols.call_array(&[x])?.to_i64_vec(), vec![1, 0, 1]);
    Ok(())
}

#[test]
fn argmax_over_every_axis_flattens() -> anyhow::Result<()> {
    let x = Array::from_f64(vec![2, 3], vec![1.0, 5.0, 2.0, 7.0, 0.0, 7.0])?;
    let kernel = funcify(&argmax_node(&[2, 3], None, &[]), &config())?;
    assert!(kernel.source().contains("axis_apply_argmax"));
    let out = kernel.call_array(&[x])?;
    assert_eq!(out.ndim(), 0);
    assert_eq!(out.item()?, Scalar::Int(3));
    Ok(())
}

#[test]
fn argmax_reduces_several_axes_jointly() -> anyhow::Result<()> {
    // Reduced axes (0, 2) are flattened row-major per kept index along axis 1.
    let values: Vec<f64> = (0..12).map(|n| f64::from((n * 7) % 12)).collect();
    let x = Array::from_f64(vec![2, 3, 2], values.clone())?;
    let kernel = funcify(&argmax_node(&[2, 3, 2], Some(vec![2, 0]), &[3]), &config())?;
    let out = kernel.call_array(&[x])?;

    let mut expected = Vec::new();
    for j in 0..3 {
        let mut best = (0, f64::NEG_INFINITY);
        for (pos, (i, k)) in [(0, 0), (0, 1), (1, 0), (1, 1)].into_iter().enumerate() {
            let v = values[i * 6 + j * 2 + k];
            if v > best.1 {
                best = (pos as i64, v);
            }
        }
        expected.push(best.0);
    }
    assert_eq!(out.to_i64_vec(), expected);
    Ok(())
}

#[test]
fn argmax_reports_first_nan() -> anyhow::Result<()> {
    let lane = Array::from_f64(vec![4], vec![1.0, f64::NAN, 9.0, f64::NAN])?;
    assert_eq!(argmax_lane(&lane)?, Scalar::Int(1));

    let empty = Array::from_f64(vec![0], vec![])?;
    assert!(matches!(argmax_lane(&empty), Err(KernelError::Execution(_))));
    Ok(())
}

#[test]
fn argmax_of_rank_zero_input_is_zero() -> anyhow::Result<()> {
    let kernel = funcify(&argmax_node(&[], None, &[]), &config())?;
    let out = kernel.call_arrays(&[Array::scalar(Scalar::Float(3.0), DType::F64)])?;
    assert_eq!(
        out,
        Value::Scalar {
            value: Scalar::Int(0),
            dtype: DType::I64
        }
    );
    Ok(())
}

#[test]
fn argmax_rejects_out_of_range_axes() {
    let err = funcify(&argmax_node(&[2, 3], Some(vec![2]), &[2]), &config())
        .expect_err("axis 2 on a matrix");
    assert!(matches!(err, KernelError::InvalidAxis(_)));
}
