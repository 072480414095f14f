use tensorjit::array::{broadcast_shapes, unravel_index, Array, ArrayError, NdIndex, Value};
use tensorjit::dtype::DType;
use tensorjit::scalar::Scalar;

#[test]
fn transpose_copies_in_permuted_order() -> anyhow::Result<()> {
    let x = Array::from_i64(vec![2, 3], vec![1, 2, 3, 4, 5, 6])?;
    let t = x.transpose(&[1, 0])?;
    assert_eq!(t.shape(), &[3, 2]);
    assert_eq!(t.to_i64_vec(), vec![1, 4, 2, 5, 3, 6]);
    assert_eq!(t.transpose(&[1, 0])?, x);
    Ok(())
}

#[test]
fn transpose_rejects_non_permutations() -> anyhow::Result<()> {
    let x = Array::from_i64(vec![2, 3], vec![0; 6])?;
    let err = x.transpose(&[0, 0]).expect_err("duplicate axis");
    assert!(matches!(err, ArrayError::Permutation { .. }));
    Ok(())
}

#[test]
fn reshape_checks_element_count() -> anyhow::Result<()> {
    let x = Array::from_f64(vec![2, 3], vec![0.0; 6])?;
    assert_eq!(x.clone().reshape(vec![3, 2])?.shape(), &[3, 2]);
    let err = x.reshape(vec![4]).expect_err("six elements do not fit four");
    assert!(matches!(err, ArrayError::Reshape { .. }));
    Ok(())
}

#[test]
fn broadcast_to_repeats_unit_axes() -> anyhow::Result<()> {
    let col = Array::from_f64(vec![2, 1], vec![1.0, 2.0])?;
    let wide = col.broadcast_to(&[2, 3])?;
    assert_eq!(wide.to_f64_vec(), vec![1.0, 1.0, 1.0, 2.0, 2.0, 2.0]);
    assert!(col.broadcast_to(&[3, 3]).is_err());
    Ok(())
}

#[test]
fn broadcast_shapes_aligns_to_the_right() -> anyhow::Result<()> {
    let column: &[usize] = &[3, 1];
    let row: &[usize] = &[4];
    let scalar: &[usize] = &[];
    let square: &[usize] = &[2, 2];
    assert_eq!(broadcast_shapes(&[column, row])?, vec![3, 4]);
    assert_eq!(broadcast_shapes(&[scalar, square])?, vec![2, 2]);
    let short: &[usize] = &[3];
    assert!(broadcast_shapes(&[short, row]).is_err());
    Ok(())
}

#[test]
fn nd_index_walks_c_order() {
    let coords: Vec<Vec<usize>> = NdIndex::new(&[2, 2]).map(|c| c.to_vec()).collect();
    assert_eq!(coords, vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]]);
    assert_eq!(NdIndex::new(&[]).count(), 1);
    assert_eq!(NdIndex::new(&[3, 0]).count(), 0);
    assert_eq!(unravel_index(5, &[2, 3]).to_vec(), vec![1, 2]);
}

#[test]
fn zip_with_broadcasts_operands() -> anyhow::Result<()> {
    let x = Array::from_f64(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0])?;
    let row = Array::from_f64(vec![2], vec![10.0, 20.0])?;
    let sum = x.zip_with(&row, DType::F64, |a, b| {
        Scalar::Float(a.as_f64() + b.as_f64())
    })?;
    assert_eq!(sum.to_f64_vec(), vec![11.0, 22.0, 13.0, 24.0]);
    Ok(())
}

#[test]
fn astype_casts_each_element() -> anyhow::Result<()> {
    let x = Array::from_f64(vec![3], vec![-1.5, 0.0, 2.7])?;
    let ints = x.astype(DType::I32);
    assert_eq!(ints.dtype(), DType::I32);
    assert_eq!(ints.to_i64_vec(), vec![-1, 0, 2]);
    Ok(())
}

#[test]
fn item_requires_a_single_element() -> anyhow::Result<()> {
    let zero_d = Array::scalar(Scalar::Float(4.0), DType::F64);
    assert_eq!(zero_d.ndim(), 0);
    assert_eq!(zero_d.item()?, Scalar::Float(4.0));
    let pair = Array::from_f64(vec![2], vec![1.0, 2.0])?;
    assert!(matches!(pair.item(), Err(ArrayError::NotScalar { .. })));
    Ok(())
}

#[test]
fn values_cast_and_convert_to_arrays() {
    let value = Value::Scalar {
        value: Scalar::Float(3.0),
        dtype: DType::F64,
    };
    assert!(value.is_scalar());
    let cast = value.cast(DType::I64);
    assert_eq!(cast.dtype(), DType::I64);
    let array = cast.into_array();
    assert_eq!(array.shape(), &[] as &[usize]);
    assert_eq!(array.to_i64_vec(), vec![3]);
}
