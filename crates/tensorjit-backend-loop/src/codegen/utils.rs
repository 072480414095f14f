use tensorjit::dtype::DType;
use tensorjit::scalar::Scalar;

/// Name of the zero-based counter every reduction loop binds for its per-element statement.
pub const LOOP_COUNTER: &str = "i";

pub(crate) fn format_literal(value: Scalar, dtype: DType) -> String {
    let value = value.cast(dtype);
    match (value, dtype) {
        (Scalar::Float(v), DType::F32) if v.is_finite() => format!("{value}f"),
        _ => value.to_string(),
    }
}

pub(crate) fn index_expr(array: &str, indices: &[String]) -> String {
    if indices.is_empty() {
        return format!("{array}[0]");
    }
    format!("{array}[{}]", indices.join(", "))
}

pub(crate) fn shape_tuple(dims: &[String]) -> String {
    match dims.len() {
        0 => "()".to_string(),
        1 => format!("({},)", dims[0]),
        _ => format!("({})", dims.join(", ")),
    }
}

pub(crate) fn emit_loops_with_indices<F>(
    module: &mut String,
    bounds: &[String],
    indent: usize,
    prefix: &str,
    body: F,
) where
    F: FnOnce(&mut String, &[String], usize),
{
    let indices: Vec<String> = (0..bounds.len()).map(|i| format!("{prefix}{i}")).collect();
    emit_named_loops(module, bounds, &indices, indent, body);
}

pub(crate) fn emit_named_loops<F>(
    module: &mut String,
    bounds: &[String],
    indices: &[String],
    indent: usize,
    body: F,
) where
    F: FnOnce(&mut String, &[String], usize),
{
    for (depth, (idx, bound)) in indices.iter().zip(bounds).enumerate() {
        push_line(
            module,
            indent + depth,
            &format!("for (size_t {idx} = 0; {idx} < {bound}; ++{idx}) {{"),
        );
    }
    body(module, indices, indent + bounds.len());
    for depth in (0..bounds.len()).rev() {
        push_line(module, indent + depth, "}");
    }
}

pub(crate) fn push_line(module: &mut String, indent: usize, line: &str) {
    push_block(module, indent, line);
}

pub(crate) fn push_block(module: &mut String, indent: usize, block: &str) {
    if block.is_empty() {
        return;
    }
    let pad = "  ".repeat(indent);
    let mut lines: Vec<&str> = block.split('\n').collect();
    if matches!(lines.first(), Some(line) if line.trim().is_empty()) {
        lines.remove(0);
    }
    if matches!(lines.last(), Some(line) if line.trim().is_empty()) {
        lines.pop();
    }

    let min_indent = lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.chars().take_while(|c| *c == ' ' || *c == '\t').count())
        .min()
        .unwrap_or(0);

    for line in lines {
        let trimmed = line.get(min_indent..).unwrap_or("");
        if trimmed.trim().is_empty() {
            module.push('\n');
            continue;
        }
        module.push_str(&pad);
        module.push_str(trimmed);
        module.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_block_strips_common_indent() {
        let mut module = String::new();
        push_block(
            &mut module,
            1,
            r#"
                if (a < b) {
                  a = b;
                }
            "#,
        );
        assert_eq!(module, "  if (a < b) {\n    a = b;\n  }\n");
    }

    #[test]
    fn loops_nest_in_order() {
        let mut module = String::new();
        let bounds = vec!["n0".to_string(), "n1".to_string()];
        emit_loops_with_indices(&mut module, &bounds, 0, "o", |module, idx, indent| {
            push_line(module, indent, &format!("{};", index_expr("res", idx)));
        });
        let expected = "for (size_t o0 = 0; o0 < n0; ++o0) {\n  \
                        for (size_t o1 = 0; o1 < n1; ++o1) {\n    \
                        res[o0, o1];\n  \
                        }\n\
                        }\n";
        assert_eq!(module, expected);
    }

    #[test]
    fn literals_follow_dtype() {
        assert_eq!(format_literal(Scalar::Float(2.0), DType::F32), "2.0f");
        assert_eq!(format_literal(Scalar::Float(2.0), DType::F64), "2.0");
        assert_eq!(format_literal(Scalar::Float(3.0), DType::I32), "3");
        assert_eq!(
            format_literal(Scalar::Float(f64::NEG_INFINITY), DType::F32),
            "-INFINITY"
        );
    }
}
