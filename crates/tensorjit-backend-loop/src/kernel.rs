//! Compiled kernels: a shared definition plus its listing and compile options.

use std::fmt;
use std::sync::Arc;

use tensorjit::array::{Array, Value};

use crate::compiler::{CompileOptions, Signature};
use crate::error::{KernelError, KernelResult};

const FNV1A_OFFSET: u64 = 0xcbf29ce484222325;
const FNV1A_PRIME: u64 = 0x100000001b3;

/// Un-compiled kernel definition.
///
/// `source` renders the listing of exactly the loops `invoke` executes.
pub trait KernelDef: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    fn label(&self) -> &'static str;

    fn source(&self) -> String;

    fn invoke(&self, inputs: Vec<Array>, options: &CompileOptions) -> KernelResult<Value>;
}

/// Executable kernel. Cheap to clone and safe to call from several threads at once.
#[derive(Clone)]
pub struct Kernel {
    name: String,
    label: &'static str,
    source: Arc<str>,
    signature: Option<Signature>,
    options: CompileOptions,
    fingerprint: u64,
    def: Arc<dyn KernelDef>,
}

impl Kernel {
    pub(crate) fn new(
        def: Arc<dyn KernelDef>,
        signature: Option<Signature>,
        options: CompileOptions,
    ) -> Self {
        let mut source = String::new();
        source.push_str(&format!("// kernel: {} ({})\n", def.name(), def.label()));
        if let Some(signature) = &signature {
            source.push_str(&format!("// signature: {signature}\n"));
        }
        source.push_str(&format!("// options: {options}\n"));
        source.push_str(&def.source());
        let fingerprint = fnv1a_hash(source.as_bytes());
        Self {
            name: def.name().to_string(),
            label: def.label(),
            source: Arc::from(source),
            signature,
            options,
            fingerprint,
            def,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Runs the kernel, taking ownership of the arguments so aliased outputs can reuse them.
    pub fn call(&self, inputs: Vec<Array>) -> KernelResult<Value> {
        match &self.signature {
            Some(signature) => {
                let inputs = signature.coerce_inputs(inputs)?;
                let value = self.def.invoke(inputs, &self.options)?;
                signature.coerce_output(value)
            }
            None => self.def.invoke(inputs, &self.options),
        }
    }

    pub fn call_arrays(&self, inputs: &[Array]) -> KernelResult<Value> {
        self.call(inputs.to_vec())
    }

    /// Runs the kernel and coerces a plain scalar result into a zero-dimensional array.
    pub fn call_array(&self, inputs: &[Array]) -> KernelResult<Array> {
        Ok(self.call_arrays(inputs)?.into_array())
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("name", &self.name)
            .field("label", &self.label)
            .field("signature", &self.signature)
            .field("options", &self.options)
            .field("fingerprint", &format_args!("{:016x}", self.fingerprint))
            .finish()
    }
}

/// Moves exactly `N` arguments out of `inputs`.
pub(crate) fn take_inputs<const N: usize>(
    inputs: Vec<Array>,
    kernel: &str,
) -> KernelResult<[Array; N]> {
    let got = inputs.len();
    <[Array; N]>::try_from(inputs).map_err(|_| {
        KernelError::execution(format!("{kernel} expects {N} argument(s), got {got}"))
    })
}

pub(crate) fn fnv1a_hash(bytes: &[u8]) -> u64 {
    let mut hash = FNV1A_OFFSET;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV1A_PRIME);
    }
    hash
}
