//! `DimShuffle` kernels.

use tensorjit::array::{Array, Value};
use tensorjit::graph::{DimShuffle, Node};

use super::super::utils::push_line;
use super::{single_input, single_output};
use crate::compiler::{compile, CompileOptions};
use crate::config::JitConfig;
use crate::error::{KernelError, KernelResult};
use crate::kernel::{take_inputs, Kernel, KernelDef};
use crate::labels::LABEL_LOOP_DIMSHUFFLE;

#[derive(Debug, Clone, PartialEq)]
struct DimShuffleDef {
    transposition: Vec<usize>,
    /// Number of kept input axes; they lead the transposed input.
    kept: usize,
    augment: Vec<usize>,
    new_ndim: usize,
    /// Output shape when every output length is known when the node is built.
    static_shape: Option<Vec<usize>>,
    inplace: bool,
}

impl DimShuffleDef {
    fn from_op(op: &DimShuffle, static_shape: Option<Vec<usize>>) -> KernelResult<Self> {
        op.validate()?;
        let shuffle = op.shuffle();
        let augment = op.augment();
        Ok(Self {
            transposition: op.transposition(),
            kept: shuffle.len(),
            new_ndim: shuffle.len() + augment.len(),
            augment,
            static_shape,
            inplace: op.inplace,
        })
    }

    fn is_identity_permutation(&self) -> bool {
        self.transposition.iter().enumerate().all(|(i, &j)| i == j)
    }

    /// Interleaves the kept lengths with a 1 at every inserted position.
    fn new_shape(&self, transposed: &[usize]) -> Vec<usize> {
        if let Some(shape) = &self.static_shape {
            return shape.clone();
        }
        let mut kept = transposed[..self.kept].iter();
        (0..self.new_ndim)
            .map(|i| {
                if self.augment.contains(&i) {
                    1
                } else {
                    kept.next().copied().unwrap_or(1)
                }
            })
            .collect()
    }

    fn shuffle(&self, x: Array) -> KernelResult<Array> {
        if x.ndim() != self.transposition.len() {
            return Err(KernelError::shape(format!(
                "dimshuffle expects a rank-{} input, got shape {:?}",
                self.transposition.len(),
                x.shape()
            )));
        }
        let x = if self.is_identity_permutation() {
            x
        } else {
            x.transpose(&self.transposition)?
        };
        if self.new_ndim == 0 {
            return Ok(x.reshape(Vec::new())?);
        }
        let new_shape = self.new_shape(x.shape());
        Ok(x.reshape(new_shape)?)
    }
}

impl KernelDef for DimShuffleDef {
    fn name(&self) -> &str {
        "dimshuffle"
    }

    fn label(&self) -> &'static str {
        LABEL_LOOP_DIMSHUFFLE
    }

    fn source(&self) -> String {
        let mut module = String::new();
        push_line(&mut module, 0, "dimshuffle(x) {");
        if !self.is_identity_permutation() {
            let perm: Vec<String> = self.transposition.iter().map(usize::to_string).collect();
            push_line(
                &mut module,
                1,
                &format!("x = transpose(x, ({}));", perm.join(", ")),
            );
        }
        let shape = match &self.static_shape {
            _ if self.new_ndim == 0 => "()".to_string(),
            Some(shape) => {
                let dims: Vec<String> = shape.iter().map(usize::to_string).collect();
                format!("({})", dims.join(", "))
            }
            None => {
                let mut j = 0;
                let dims: Vec<String> = (0..self.new_ndim)
                    .map(|i| {
                        if self.augment.contains(&i) {
                            "1".to_string()
                        } else {
                            j += 1;
                            format!("x.shape[{}]", j - 1)
                        }
                    })
                    .collect();
                format!("({})", dims.join(", "))
            }
        };
        let copy = if self.inplace { "x" } else { "ascontiguousarray(x)" };
        push_line(&mut module, 1, &format!("return reshape({copy}, {shape});"));
        push_line(&mut module, 0, "}");
        module
    }

    fn invoke(&self, inputs: Vec<Array>, _options: &CompileOptions) -> KernelResult<Value> {
        let [x] = take_inputs::<1>(inputs, "dimshuffle")?;
        Ok(Value::Array(self.shuffle(x)?))
    }
}

/// Compiles a `DimShuffle` node into a transpose followed by a reshape.
pub fn funcify_dimshuffle(
    node: &Node,
    op: &DimShuffle,
    config: &JitConfig,
) -> KernelResult<Kernel> {
    let input = single_input(node, "DimShuffle")?;
    let output = single_output(node, "DimShuffle")?;
    if input.ndim() != op.input_ndim {
        return Err(KernelError::shape(format!(
            "dimshuffle declared for rank {}, node input has rank {}",
            op.input_ndim,
            input.ndim()
        )));
    }
    let def = DimShuffleDef::from_op(op, output.static_shape())?;
    if def.new_ndim != output.ndim() {
        return Err(KernelError::shape(format!(
            "dimshuffle produces rank {}, node output has rank {}",
            def.new_ndim,
            output.ndim()
        )));
    }
    let options = CompileOptions::from_config(config).with_inline(true);
    compile(def, None, options)
}
