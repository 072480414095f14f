//! Turning kernel definitions into callable kernels.
//!
//! Optimization settings are carried by [`CompileOptions`] and passed to [`compile`] explicitly;
//! nothing here reads or mutates process-wide state.

use std::fmt;
use std::sync::Arc;

use tensorjit::array::{Array, Value};
use tensorjit::dtype::DType;
use tensorjit::graph::Node;
use tensorjit::utils::{parse_gufunc_signature, safe_signature, CoreSignature};

use crate::config::JitConfig;
use crate::error::{KernelError, KernelResult};
use crate::kernel::{Kernel, KernelDef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OptLevel {
    #[default]
    Default,
    /// Extra loop optimization passes for nested reduction loops.
    Aggressive,
}

impl fmt::Display for OptLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptLevel::Default => f.write_str("default"),
            OptLevel::Aggressive => f.write_str("aggressive"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CompileOptions {
    pub boundscheck: bool,
    pub fastmath: bool,
    pub opt_level: OptLevel,
    /// Inline the kernel body into callers.
    pub inline: bool,
}

impl CompileOptions {
    pub fn from_config(config: &JitConfig) -> Self {
        Self {
            boundscheck: config.boundscheck,
            fastmath: config.fastmath,
            opt_level: OptLevel::Default,
            inline: false,
        }
    }

    /// Settings for reduction loops: unchecked access, configured fast-math, aggressive passes.
    pub fn reduction(config: &JitConfig) -> Self {
        Self {
            boundscheck: false,
            fastmath: config.fastmath,
            opt_level: OptLevel::Aggressive,
            inline: false,
        }
    }

    pub fn with_boundscheck(mut self, boundscheck: bool) -> Self {
        self.boundscheck = boundscheck;
        self
    }

    pub fn with_fastmath(mut self, fastmath: bool) -> Self {
        self.fastmath = fastmath;
        self
    }

    pub fn with_opt_level(mut self, opt_level: OptLevel) -> Self {
        self.opt_level = opt_level;
        self
    }

    pub fn with_inline(mut self, inline: bool) -> Self {
        self.inline = inline;
        self
    }
}

impl fmt::Display for CompileOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = |on: bool| if on { "on" } else { "off" };
        write!(
            f,
            "opt_level={} fastmath={} boundscheck={} inline={}",
            self.opt_level,
            flag(self.fastmath),
            flag(self.boundscheck),
            if self.inline { "always" } else { "never" }
        )
    }
}

/// Rank and dtype of one kernel argument or result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArgType {
    pub dtype: DType,
    pub ndim: usize,
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[ndim={}]", self.dtype, self.ndim)
    }
}

/// Typed signature inferred from a graph node.
///
/// A kernel compiled with a signature casts its arguments to the declared dtypes, rejects
/// arguments of the wrong count or rank and coerces its result to the declared output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub inputs: Vec<ArgType>,
    pub output: ArgType,
    /// Rank-0 results are returned as plain scalars instead of zero-dimensional arrays.
    pub output_scalar: bool,
}

impl Signature {
    pub fn from_node(node: &Node, reduce_to_scalar: bool) -> KernelResult<Self> {
        let [output] = node.outputs.as_slice() else {
            return Err(KernelError::unsupported(format!(
                "signature inference needs exactly one output, node has {}",
                node.nout()
            )));
        };
        let inputs = node
            .inputs
            .iter()
            .map(|ty| ArgType {
                dtype: ty.dtype,
                ndim: ty.ndim(),
            })
            .collect();
        Ok(Self {
            inputs,
            output: ArgType {
                dtype: output.dtype,
                ndim: output.ndim(),
            },
            output_scalar: reduce_to_scalar && output.ndim() == 0,
        })
    }

    /// Core-dimension form, e.g. `(i00,i01)->(o00)`.
    pub fn gufunc(&self) -> String {
        let inputs: Vec<usize> = self.inputs.iter().map(|arg| arg.ndim).collect();
        safe_signature(&inputs, &[self.output.ndim])
    }

    pub fn core(&self) -> KernelResult<CoreSignature> {
        Ok(parse_gufunc_signature(&self.gufunc())?)
    }

    pub fn coerce_inputs(&self, inputs: Vec<Array>) -> KernelResult<Vec<Array>> {
        let shapes: Vec<&[usize]> = inputs.iter().map(Array::shape).collect();
        self.core()?.bind(&shapes)?;
        inputs
            .into_iter()
            .zip(&self.inputs)
            .enumerate()
            .map(|(position, (array, expected))| {
                if array.ndim() != expected.ndim {
                    return Err(KernelError::Signature(format!(
                        "argument {position} has rank {}, signature {self} expects {}",
                        array.ndim(),
                        expected.ndim
                    )));
                }
                Ok(if array.dtype() == expected.dtype {
                    array
                } else {
                    array.astype(expected.dtype)
                })
            })
            .collect()
    }

    pub fn coerce_output(&self, value: Value) -> KernelResult<Value> {
        let value = match value {
            Value::Array(array) if self.output_scalar && array.ndim() == 0 => Value::Scalar {
                value: array.item()?,
                dtype: array.dtype(),
            },
            Value::Scalar { value, dtype } if !self.output_scalar => {
                Value::Array(Array::scalar(value, dtype))
            }
            other => other,
        };
        if value.shape().len() != self.output.ndim {
            return Err(KernelError::Signature(format!(
                "kernel produced rank {}, signature {self} declares {}",
                value.shape().len(),
                self.output.ndim
            )));
        }
        Ok(value.cast(self.output.dtype))
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inputs: Vec<String> = self.inputs.iter().map(ToString::to_string).collect();
        write!(f, "({}) -> {}", inputs.join(", "), self.output)?;
        if self.output_scalar {
            f.write_str(" as scalar")?;
        }
        Ok(())
    }
}

/// Compiles a definition with explicit options.
pub fn compile<D>(
    def: D,
    signature: Option<Signature>,
    options: CompileOptions,
) -> KernelResult<Kernel>
where
    D: KernelDef + 'static,
{
    compile_shared(Arc::new(def), signature, options)
}

pub fn compile_shared(
    def: Arc<dyn KernelDef>,
    signature: Option<Signature>,
    options: CompileOptions,
) -> KernelResult<Kernel> {
    if let Some(signature) = &signature {
        signature.core()?;
    }
    let kernel = Kernel::new(def, signature, options);
    let fingerprint = format!("{:016x}", kernel.fingerprint());
    tracing::debug!(
        kernel = kernel.name(),
        label = kernel.label(),
        opt_level = %options.opt_level,
        fastmath = options.fastmath,
        boundscheck = options.boundscheck,
        fingerprint = %fingerprint,
        "compiled kernel"
    );
    tracing::trace!(kernel = kernel.name(), source = %kernel.source(), "kernel listing");
    Ok(kernel)
}

/// Compiles a reduction definition for `node` with unchecked access, the configured fast-math
/// mode and aggressive loop optimization.
pub fn jit_compile_reducer<D>(
    node: &Node,
    def: D,
    reduce_to_scalar: bool,
    infer_signature: bool,
    config: &JitConfig,
) -> KernelResult<Kernel>
where
    D: KernelDef + 'static,
{
    let signature = if infer_signature {
        Some(Signature::from_node(node, reduce_to_scalar)?)
    } else {
        None
    };
    compile(def, signature, CompileOptions::reduction(config))
}
