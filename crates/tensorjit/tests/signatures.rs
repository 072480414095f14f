use tensorjit::utils::{
    broadcast_static_dim_lengths, normalize_axis_index, normalize_axis_tuple,
    parse_gufunc_signature, safe_signature, AxisError, CoreSignature, SignatureError,
};

#[test]
fn safe_signature_names_every_core_dim() -> anyhow::Result<()> {
    let signature = safe_signature(&[2, 0], &[1]);
    assert_eq!(signature, "(i00,i01),()->(o00)");
    let parsed = parse_gufunc_signature(&signature)?;
    assert_eq!(parsed.inputs, vec![vec!["i00", "i01"], vec![]]);
    assert_eq!(parsed.outputs, vec![vec!["o00"]]);
    assert_eq!(parsed.render(), signature);
    Ok(())
}

#[test]
fn parser_ignores_whitespace_and_rejects_garbage() -> anyhow::Result<()> {
    let parsed = CoreSignature::parse("(m, n), (n, p) -> (m, p)")?;
    assert_eq!(parsed.inputs.len(), 2);
    assert!(matches!(
        parse_gufunc_signature("(m,n)->"),
        Err(SignatureError::Format(_))
    ));
    assert!(matches!(
        parse_gufunc_signature("m->(n)"),
        Err(SignatureError::Format(_))
    ));
    Ok(())
}

#[test]
fn bind_checks_shared_dimension_names() -> anyhow::Result<()> {
    let signature = CoreSignature::parse("(m,n),(n,p)->(m,p)")?;
    let lhs: &[usize] = &[2, 3];
    let rhs: &[usize] = &[3, 4];
    let mismatched: &[usize] = &[5, 4];
    let sizes = signature.bind(&[lhs, rhs])?;
    assert_eq!(sizes["m"], 2);
    assert_eq!(sizes["p"], 4);

    let err = signature
        .bind(&[lhs, mismatched])
        .expect_err("n bound to 3 then 5");
    assert!(matches!(err, SignatureError::InconsistentDim { .. }));

    let err = signature.bind(&[lhs]).expect_err("one operand missing");
    assert!(matches!(err, SignatureError::OperandCount { .. }));
    Ok(())
}

#[test]
fn axes_normalize_against_rank() -> anyhow::Result<()> {
    assert_eq!(normalize_axis_index(-1, 3)?, 2);
    assert_eq!(
        normalize_axis_index(3, 3),
        Err(AxisError::OutOfBounds { axis: 3, ndim: 3 })
    );
    assert_eq!(normalize_axis_tuple(&[-1, 0, 2], 3)?, vec![2, 0]);
    Ok(())
}

#[test]
fn static_broadcast_resolves_known_lengths() -> anyhow::Result<()> {
    assert_eq!(broadcast_static_dim_lengths(&[Some(1), Some(4)])?, Some(4));
    assert_eq!(broadcast_static_dim_lengths(&[Some(1), None])?, None);
    assert_eq!(broadcast_static_dim_lengths(&[None, Some(5)])?, Some(5));
    assert!(broadcast_static_dim_lengths(&[Some(3), Some(4)]).is_err());
    Ok(())
}
