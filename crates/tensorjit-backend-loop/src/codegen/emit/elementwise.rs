//! Elementwise kernels: a batched fast path and a reference path for validation.

use tensorjit::array::{Array, Value};
use tensorjit::graph::{Elemwise, Node};
use tensorjit::utils::broadcast_static_dim_lengths;

use super::super::utils::push_block;
use super::super::vectorize::{
    elemwise_reference, encode_literals, store_core_outputs, vectorized, CoreOutputStore,
    ScalarKernel, VectorizeConstants,
};
use crate::compiler::{compile, CompileOptions};
use crate::config::{JitConfig, VectorizeTarget};
use crate::error::{KernelError, KernelResult};
use crate::kernel::{Kernel, KernelDef};
use crate::labels::{LABEL_LOOP_ELEMWISE, LABEL_LOOP_ELEMWISE_REFERENCE};

/// Both executable forms of one elementwise node.
#[derive(Debug, Clone)]
pub struct ElemwiseKernel {
    pub vectorized: Kernel,
    pub reference: Kernel,
}

#[derive(Debug, Clone)]
struct VectorizedElemwise {
    name: String,
    core: CoreOutputStore,
    constants: VectorizeConstants,
    target: VectorizeTarget,
    encoded: [String; 4],
}

#[derive(Debug, Clone)]
struct ReferenceElemwise {
    name: String,
    kernel: ScalarKernel,
    input_bc_patterns: Vec<Vec<bool>>,
    output_bc_pattern: Vec<bool>,
}

pub fn funcify_elemwise(
    node: &Node,
    op: &Elemwise,
    config: &JitConfig,
) -> KernelResult<ElemwiseKernel> {
    let nin = node.nin();
    let nout = node.nout();
    if nout != 1 {
        return Err(KernelError::unsupported(format!(
            "multi-output elemwise ops are not supported by the loop backend \
             (node has {nout} outputs)"
        )));
    }
    for (&output, &input) in &op.inplace_pattern {
        if output >= nout || input >= nin {
            return Err(KernelError::unsupported(format!(
                "in-place pattern maps output {output} to input {input} on a node with {nin} \
                 input(s) and {nout} output(s)"
            )));
        }
    }
    check_static_broadcast(node)?;

    let input_dtypes = node.inputs.iter().map(|ty| ty.dtype).collect();
    let output = &node.outputs[0];
    let scalar_kernel = ScalarKernel::new(op.scalar_op.clone(), input_dtypes, output.dtype)?;
    let core = store_core_outputs(scalar_kernel.clone(), nin, nout)?;

    let constants = VectorizeConstants {
        input_bc_patterns: node
            .inputs
            .iter()
            .map(|ty| ty.broadcastable.clone())
            .collect(),
        output_bc_patterns: node
            .outputs
            .iter()
            .map(|ty| ty.broadcastable.clone())
            .collect(),
        output_dtypes: node.outputs.iter().map(|ty| ty.dtype).collect(),
        inplace_pattern: op.inplace_pattern.iter().map(|(&o, &i)| (o, i)).collect(),
    };
    let encoded = [
        encode_literals(&constants.input_bc_patterns)?,
        encode_literals(&constants.output_bc_patterns)?,
        encode_literals(&constants.output_dtypes)?,
        encode_literals(&constants.inplace_pattern)?,
    ];

    let name = format!("elemwise_{}", op.scalar_op.name());
    let options = CompileOptions::from_config(config);
    let reference = ReferenceElemwise {
        name: format!("{name}_reference"),
        kernel: scalar_kernel,
        input_bc_patterns: constants.input_bc_patterns.clone(),
        output_bc_pattern: output.broadcastable.clone(),
    };
    let fast = VectorizedElemwise {
        name,
        core,
        constants,
        target: config.vectorize_target,
        encoded,
    };
    tracing::debug!(
        kernel = %fast.name,
        nin,
        target = %fast.target,
        "building elemwise kernel"
    );
    Ok(ElemwiseKernel {
        vectorized: compile(fast, None, options)?,
        reference: compile(reference, None, options)?,
    })
}

/// Rejects nodes whose statically known input lengths cannot broadcast together.
fn check_static_broadcast(node: &Node) -> KernelResult<()> {
    let ndim = node.inputs.iter().map(|ty| ty.ndim()).max().unwrap_or(0);
    for axis in 0..ndim {
        let lengths: Vec<Option<usize>> = node
            .inputs
            .iter()
            .filter_map(|ty| {
                let lead = ndim - ty.ndim();
                axis.checked_sub(lead).map(|own| ty.shape[own])
            })
            .collect();
        broadcast_static_dim_lengths(&lengths)?;
    }
    Ok(())
}

fn operand_names(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("i{i}")).collect()
}

impl KernelDef for VectorizedElemwise {
    fn name(&self) -> &str {
        &self.name
    }

    fn label(&self) -> &'static str {
        LABEL_LOOP_ELEMWISE
    }

    fn source(&self) -> String {
        let [input_bc, output_bc, output_dtypes, inplace] = &self.encoded;
        let mut module = self.core.render();
        let block = format!(
            r#"
                {name}({params}) {{
                  return vectorized(
                    store_core_outputs,
                    input_bc_patterns = "{input_bc}",
                    output_bc_patterns = "{output_bc}",
                    output_dtypes = "{output_dtypes}",
                    inplace_pattern = "{inplace}",
                    target = "{target}",
                    inputs = ({params}));
                }}
            "#,
            name = self.name,
            params = operand_names(self.core.kernel().nin()).join(", "),
            input_bc = input_bc.replace('"', "'"),
            output_bc = output_bc.replace('"', "'"),
            output_dtypes = output_dtypes.replace('"', "'"),
            inplace = inplace.replace('"', "'"),
            target = self.target,
        );
        push_block(&mut module, 0, &block);
        module
    }

    fn invoke(&self, inputs: Vec<Array>, _options: &CompileOptions) -> KernelResult<Value> {
        let out = vectorized(&self.core, &self.constants, inputs, self.target)?;
        Ok(Value::Array(out))
    }
}

impl KernelDef for ReferenceElemwise {
    fn name(&self) -> &str {
        &self.name
    }

    fn label(&self) -> &'static str {
        LABEL_LOOP_ELEMWISE_REFERENCE
    }

    fn source(&self) -> String {
        let params = operand_names(self.kernel.nin());
        let args: Vec<String> = (0..params.len())
            .map(|i| format!("inputs_bc[{i}][idx]"))
            .collect();
        let summed: Vec<String> = self
            .output_bc_pattern
            .iter()
            .enumerate()
            .filter(|&(_, &bc)| bc)
            .map(|(axis, _)| axis.to_string())
            .collect();
        let mut module = String::new();
        let block = format!(
            r#"
                {name}({params}) {{
                  inputs_bc = broadcast_arrays({params});
                  shape = inputs_bc[0].shape;
                  check_broadcastable(({params}), shape);
                  out = empty(shape, {dtype});
                  for (idx : ndindex(shape)) {{
                    out[idx] = {expr};
                  }}
                  return sum(out, axes = ({summed}), keepdims = true);
                }}
            "#,
            name = self.name,
            params = params.join(", "),
            dtype = self.kernel.output_dtype().name(),
            expr = self.kernel.render(&args),
            summed = summed.join(", "),
        );
        push_block(&mut module, 0, &block);
        module
    }

    fn invoke(&self, inputs: Vec<Array>, _options: &CompileOptions) -> KernelResult<Value> {
        let out = elemwise_reference(
            &self.kernel,
            &self.input_bc_patterns,
            &self.output_bc_pattern,
            &inputs,
        )?;
        Ok(Value::Array(out))
    }
}
