mod common;

use common::{assert_close, config, f64_type, random_f64, rng, unary_node};
use tensorjit::array::{Array, Value};
use tensorjit::dtype::DType;
use tensorjit::graph::{CAReduce, Op, Sum, TensorType};
use tensorjit::scalar::Scalar;
use tensorjit::scalar_op::ScalarOp;
use tensorjit_backend_loop::{
    create_axis_reducer, create_multiaxis_reducer, funcify, scalar_in_place_fn, KernelDef,
    KernelError, Reducer, LOOP_COUNTER,
};

fn sum_node(axis: Option<Vec<isize>>, input: &[usize], output: &[usize]) -> tensorjit::Node {
    unary_node(
        Op::Sum(Sum {
            axis,
            acc_dtype: None,
        }),
        f64_type(input),
        f64_type(output),
    )
}

fn careduce_node(
    scalar_op: ScalarOp,
    axis: Option<Vec<isize>>,
    input: TensorType,
    output: TensorType,
) -> tensorjit::Node {
    unary_node(
        Op::CaReduce(CAReduce {
            scalar_op,
            axis,
            acc_dtype: None,
        }),
        input,
        output,
    )
}

fn matrix() -> Array {
    Array::from_f64(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).expect("2x3")
}

#[test]
fn sum_over_each_axis_and_all_axes() -> anyhow::Result<()> {
    let cfg = config();

    let rows = funcify(&sum_node(Some(vec![1]), &[2, 3], &[2]), &cfg)?;
    assert_eq!(rows.call_array(&[matrix()])?.to_f64_vec(), vec![6.0, 15.0]);

    let cols = funcify(&sum_node(Some(vec![0]), &[2, 3], &[3]), &cfg)?;
    assert_eq!(
        cols.call_array(&[matrix()])?.to_f64_vec(),
        vec![5.0, 7.0, 9.0]
    );

    let total = funcify(&sum_node(None, &[2, 3], &[]), &cfg)?;
    let value = total.call(vec![matrix()])?;
    assert_eq!(value.shape(), &[] as &[usize]);
    assert_eq!(value.into_array().item()?, Scalar::Float(21.0));
    Ok(())
}

#[test]
fn sum_shortcuts_force_fast_math() -> anyhow::Result<()> {
    let cfg = config().with_fastmath(false);
    let total = funcify(&sum_node(None, &[2, 3], &[]), &cfg)?;
    assert!(total.options().fastmath);
    assert!(total.source().contains("impl_sum_all(array)"));

    let copy = funcify(&sum_node(Some(vec![]), &[2, 3], &[2, 3]), &cfg)?;
    assert!(copy.options().fastmath);
    assert_eq!(copy.call_array(&[matrix()])?, matrix());

    let partial = funcify(&sum_node(Some(vec![1]), &[2, 3], &[2]), &cfg)?;
    assert!(!partial.options().fastmath);
    Ok(())
}

#[test]
fn sum_all_accumulates_in_acc_dtype() -> anyhow::Result<()> {
    let node = unary_node(
        Op::Sum(Sum {
            axis: None,
            acc_dtype: Some(DType::I64),
        }),
        TensorType::fixed(DType::I8, &[3]),
        TensorType::fixed(DType::I8, &[]),
    );
    let kernel = funcify(&node, &config())?;
    let x = Array::from_scalars(
        DType::I8,
        vec![3],
        vec![Scalar::Int(100), Scalar::Int(100), Scalar::Int(-90)],
    )?;
    let out = kernel.call_array(&[x])?;
    assert_eq!(out.dtype(), DType::I8);
    assert_eq!(out.item()?, Scalar::Int(110));
    Ok(())
}

#[test]
fn empty_reductions_yield_the_identity() -> anyhow::Result<()> {
    let cfg = config();
    let max = careduce_node(
        ScalarOp::Maximum,
        Some(vec![1]),
        TensorType::fixed(DType::I16, &[2, 0]),
        TensorType::fixed(DType::I16, &[2]),
    );
    let x = Array::zeros(vec![2, 0], DType::I16);
    let out = funcify(&max, &cfg)?.call_array(&[x])?;
    assert_eq!(out.to_i64_vec(), vec![i64::from(i16::MIN); 2]);

    let min = careduce_node(
        ScalarOp::Minimum,
        Some(vec![0]),
        TensorType::fixed(DType::U8, &[0]),
        TensorType::fixed(DType::U8, &[]),
    );
    let x = Array::zeros(vec![0], DType::U8);
    let out = funcify(&min, &cfg)?.call_array(&[x])?;
    assert_eq!(out.item()?, Scalar::UInt(255));

    let prod = careduce_node(
        ScalarOp::Mul,
        Some(vec![0]),
        f64_type(&[0, 3]),
        f64_type(&[3]),
    );
    let out = funcify(&prod, &cfg)?.call_array(&[Array::zeros(vec![0, 3], DType::F64)])?;
    assert_eq!(out.to_f64_vec(), vec![1.0; 3]);
    Ok(())
}

#[test]
fn rank_one_mean_returns_zero_dimensional_array() -> anyhow::Result<()> {
    let node = careduce_node(ScalarOp::Mean, None, f64_type(&[3]), f64_type(&[]));
    let kernel = funcify(&node, &config())?;
    let x = Array::from_f64(vec![3], vec![2.0, 4.0, 9.0])?;
    match kernel.call(vec![x])? {
        Value::Array(out) => {
            assert_eq!(out.ndim(), 0);
            assert_eq!(out.item()?, Scalar::Float(5.0));
        }
        other => panic!("expected a zero-dimensional array, got {other:?}"),
    }
    Ok(())
}

#[test]
fn multi_axis_matches_sequential_descending_reduction() -> anyhow::Result<()> {
    let mut rng = rng(7);
    let x = random_f64(&mut rng, &[3, 4, 5]);
    let node = careduce_node(
        ScalarOp::Maximum,
        Some(vec![0, -1]),
        f64_type(&[3, 4, 5]),
        f64_type(&[4]),
    );
    let kernel = funcify(&node, &config())?;
    let out = kernel.call_array(&[x.clone()])?;

    let mut expected = vec![f64::NEG_INFINITY; 4];
    for (j, slot) in expected.iter_mut().enumerate() {
        for i in 0..3 {
            for k in 0..5 {
                *slot = slot.max(x.get(&[i, j, k])?.as_f64());
            }
        }
    }
    assert_close(&expected, &out.to_f64_vec());

    assert!(kernel.source().contains("careduce_axes_fn_0"));
    assert!(kernel.source().contains("careduce_axes_fn_1"));
    Ok(())
}

#[test]
fn multi_axis_reducer_orders_steps_from_highest_axis() -> anyhow::Result<()> {
    let reducer = create_multiaxis_reducer(
        &ScalarOp::Add,
        Scalar::Float(0.0),
        &[0, 2, -2],
        3,
        DType::F64,
        "x",
        true,
        &config(),
    )?;
    let Reducer::Axes(reducer) = reducer else {
        panic!("three axes build a chained reducer");
    };
    assert_eq!(reducer.axes(), &[2, 1, 0]);
    assert_eq!(reducer.steps().len(), 3);
    assert!(reducer.steps().iter().all(|step| !step.options().boundscheck));

    let x = Array::from_f64(vec![2, 2, 2], (1..=8).map(f64::from).collect())?;
    match reducer.reduce(x)? {
        Value::Scalar { value, .. } => assert_eq!(value, Scalar::Float(36.0)),
        other => panic!("return_scalar yields a plain scalar, got {other:?}"),
    }
    Ok(())
}

#[test]
fn single_axis_request_builds_plain_reducer() -> anyhow::Result<()> {
    let reducer = create_multiaxis_reducer(
        &ScalarOp::Add,
        Scalar::Float(0.0),
        &[1],
        2,
        DType::F64,
        "x",
        true,
        &config(),
    )?;
    assert!(matches!(reducer, Reducer::Axis(_)));
    assert_eq!(reducer.name(), "careduce_add_axis1");
    Ok(())
}

#[test]
fn axis_reducer_keepdims_and_scalar_returns() -> anyhow::Result<()> {
    let x = Array::from_f64(vec![3], vec![1.0, 2.0, 3.0])?;
    let keep = create_axis_reducer(
        &ScalarOp::Add,
        Scalar::Float(0.0),
        0,
        1,
        DType::F64,
        true,
        false,
    )?;
    assert_eq!(keep.reduce(&x, true)?.shape(), &[1]);

    let scalar = create_axis_reducer(
        &ScalarOp::Add,
        Scalar::Float(0.0),
        0,
        1,
        DType::F64,
        false,
        true,
    )?;
    assert!(scalar.reduce(&x, true)?.is_scalar());
    assert!(scalar.source().contains("return res.item();"));

    let m = matrix();
    let keep_rows = create_axis_reducer(
        &ScalarOp::Add,
        Scalar::Float(0.0),
        -1,
        2,
        DType::F64,
        true,
        false,
    )?;
    let out = keep_rows.reduce(&m, false)?.into_array();
    assert_eq!(out.shape(), &[2, 1]);
    assert_eq!(out.to_f64_vec(), vec![6.0, 15.0]);
    assert!(keep_rows.source().contains("return expand_dims(res, 1);"));
    Ok(())
}

#[test]
fn out_of_range_axis_is_rejected() {
    let err = create_axis_reducer(
        &ScalarOp::Add,
        Scalar::Float(0.0),
        2,
        2,
        DType::F64,
        false,
        false,
    )
    .expect_err("axis 2 of a matrix");
    assert!(matches!(err, KernelError::InvalidAxis(_)));
}

#[test]
fn in_place_statements_render_per_operator() -> anyhow::Result<()> {
    assert_eq!(
        scalar_in_place_fn(&ScalarOp::Add, DType::F64, "idx", "res", "arr")?,
        "res[idx] += arr;"
    );
    assert_eq!(
        scalar_in_place_fn(&ScalarOp::Mean, DType::F64, "idx", "res", "arr")?,
        format!("res[idx] += (arr - res[idx]) / ({LOOP_COUNTER} + 1);")
    );
    assert_eq!(
        scalar_in_place_fn(&ScalarOp::Maximum, DType::F64, "idx", "res", "arr")?,
        "if (res[idx] < arr) {\n  res[idx] = arr;\n}"
    );
    assert_eq!(
        scalar_in_place_fn(&ScalarOp::Xor, DType::I32, "idx", "res", "arr")?,
        "res[idx] ^= arr;"
    );
    Ok(())
}

#[test]
fn operators_without_updates_fail_fast() {
    let err = scalar_in_place_fn(&ScalarOp::Exp, DType::F64, "idx", "res", "arr")
        .expect_err("exp has no in-place update");
    assert!(matches!(err, KernelError::Unimplemented { op: "exp", .. }));

    let err = scalar_in_place_fn(&ScalarOp::And, DType::F32, "idx", "res", "arr")
        .expect_err("bitwise and on floats");
    assert!(matches!(err, KernelError::Unimplemented { op: "and", .. }));

    let node = careduce_node(ScalarOp::Sub, None, f64_type(&[3]), f64_type(&[]));
    let err = funcify(&node, &config()).expect_err("sub has no identity");
    assert!(matches!(err, KernelError::Unimplemented { .. }));
}

#[test]
fn bitwise_reductions_on_integers() -> anyhow::Result<()> {
    let node = careduce_node(
        ScalarOp::And,
        Some(vec![0]),
        TensorType::fixed(DType::U8, &[3]),
        TensorType::fixed(DType::U8, &[]),
    );
    let x = Array::from_scalars(
        DType::U8,
        vec![3],
        vec![Scalar::UInt(0b1110), Scalar::UInt(0b0111), Scalar::UInt(0b1111)],
    )?;
    let out = funcify(&node, &config())?.call_array(&[x])?;
    assert_eq!(out.item()?, Scalar::UInt(0b0110));
    Ok(())
}

#[test]
fn reduction_kernels_reject_wrong_rank_arguments() -> anyhow::Result<()> {
    let kernel = funcify(&sum_node(Some(vec![1]), &[2, 3], &[2]), &config())?;
    let err = kernel
        .call(vec![Array::from_f64(vec![6], vec![0.0; 6])?])
        .expect_err("rank-1 argument for a rank-2 signature");
    assert!(matches!(
        err,
        KernelError::Signature(_) | KernelError::SignatureFormat(_)
    ));
    Ok(())
}

#[test]
fn identity_filled_inputs_reduce_to_the_identity() -> anyhow::Result<()> {
    let cases = [
        (ScalarOp::Add, DType::F64),
        (ScalarOp::Mean, DType::F64),
        (ScalarOp::Mul, DType::F32),
        (ScalarOp::MulWithoutZeros, DType::I64),
        (ScalarOp::Maximum, DType::F64),
        (ScalarOp::Maximum, DType::I8),
        (ScalarOp::Minimum, DType::I32),
        (ScalarOp::And, DType::U8),
        (ScalarOp::Or, DType::I64),
        (ScalarOp::Xor, DType::I16),
    ];
    for (op, dtype) in cases {
        let identity = op.identity().expect("reduction kinds have an identity");
        let fill = Scalar::clamped_identity(identity, dtype);
        let x = Array::full(vec![2, 3], fill, dtype);

        let rows = careduce_node(
            op.clone(),
            Some(vec![1]),
            TensorType::fixed(dtype, &[2, 3]),
            TensorType::fixed(dtype, &[2]),
        );
        let out = funcify(&rows, &config())?.call_array(&[x.clone()])?;
        assert_eq!(out.iter().collect::<Vec<_>>(), vec![fill; 2], "{op:?} on {dtype:?}");

        let total = careduce_node(
            op.clone(),
            None,
            TensorType::fixed(dtype, &[2, 3]),
            TensorType::fixed(dtype, &[]),
        );
        let out = funcify(&total, &config())?.call_array(&[x])?;
        assert_eq!(out.item()?, fill, "{op:?} on {dtype:?} over every axis");
    }
    Ok(())
}

#[test]
fn integer_mean_folds_highest_axis_first() -> anyhow::Result<()> {
    // Row means truncate to [3, 6] before the column step; folding axis 0 first would give 5.
    let node = careduce_node(
        ScalarOp::Mean,
        Some(vec![0, 1]),
        TensorType::fixed(DType::I64, &[2, 3]),
        TensorType::fixed(DType::I64, &[]),
    );
    let x = Array::from_i64(vec![2, 3], vec![1, 8, 3, 10, 2, 7])?;
    let out = funcify(&node, &config())?.call_array(&[x])?;
    assert_eq!(out.item()?, Scalar::Int(4));
    Ok(())
}

#[test]
fn division_updates_fold_with_explicit_identity() -> anyhow::Result<()> {
    let floor = create_axis_reducer(
        &ScalarOp::IntDiv,
        Scalar::Int(100),
        0,
        1,
        DType::I64,
        false,
        true,
    )?;
    let x = Array::from_i64(vec![2], vec![3, 2])?;
    assert_eq!(
        floor.reduce(&x, true)?,
        Value::Scalar {
            value: Scalar::Int(16),
            dtype: DType::I64
        }
    );
    let negative = Array::from_i64(vec![2], vec![-3, 2])?;
    match floor.reduce(&negative, true)? {
        Value::Scalar { value, .. } => assert_eq!(value, Scalar::Int(-17)),
        other => panic!("expected a plain scalar, got {other:?}"),
    }

    let quotient = create_axis_reducer(
        &ScalarOp::TrueDiv,
        Scalar::Float(100.0),
        -1,
        2,
        DType::F64,
        false,
        false,
    )?;
    let m = Array::from_f64(vec![2, 2], vec![4.0, 5.0, 2.0, 10.0])?;
    let out = quotient.reduce(&m, true)?.into_array();
    assert_eq!(out.to_f64_vec(), vec![5.0, 5.0]);
    Ok(())
}

#[test]
fn full_sum_totals_in_the_input_dtype_before_widening() -> anyhow::Result<()> {
    let node = unary_node(
        Op::Sum(Sum {
            axis: None,
            acc_dtype: Some(DType::F64),
        }),
        TensorType::fixed(DType::F32, &[6]),
        f64_type(&[]),
    );
    let kernel = funcify(&node, &config())?;
    assert!(kernel.source().contains("sum(array, float32)"));
    let x = Array::from_f32(vec![6], vec![1e8, 1.0, 1.0, 1.0, 1.0, -1e8])?;
    let out = kernel.call_array(&[x])?;
    assert_eq!(out.dtype(), DType::F64);
    assert_eq!(out.item()?, Scalar::Float(0.0));
    Ok(())
}
