//! Backend configuration read from the environment.

use std::env;
use std::fmt;

use once_cell::sync::Lazy;

pub const ENV_FASTMATH: &str = "TENSORJIT_FASTMATH";
pub const ENV_BOUNDSCHECK: &str = "TENSORJIT_BOUNDSCHECK";
pub const ENV_VECTORIZE_TARGET: &str = "TENSORJIT_VECTORIZE_TARGET";

static GLOBAL_CONFIG: Lazy<JitConfig> = Lazy::new(JitConfig::from_env);

/// Where the batched elementwise primitive runs its per-element loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VectorizeTarget {
    /// Serial loop on the calling thread.
    #[default]
    Cpu,
    /// Data-parallel loop on the rayon pool.
    Parallel,
}

impl VectorizeTarget {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cpu" => Some(VectorizeTarget::Cpu),
            "parallel" => Some(VectorizeTarget::Parallel),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VectorizeTarget::Cpu => "cpu",
            VectorizeTarget::Parallel => "parallel",
        }
    }
}

impl fmt::Display for VectorizeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compilation settings shared by every kernel builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JitConfig {
    /// Permit floating-point relaxation (reassociation, no NaN/inf guarantees).
    pub fastmath: bool,
    /// Checked element access in kernels that do not force it off.
    pub boundscheck: bool,
    pub vectorize_target: VectorizeTarget,
}

impl Default for JitConfig {
    fn default() -> Self {
        Self {
            fastmath: true,
            boundscheck: false,
            vectorize_target: VectorizeTarget::Cpu,
        }
    }
}

impl JitConfig {
    /// Defaults overridden by `TENSORJIT_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let vectorize_target = match env::var(ENV_VECTORIZE_TARGET) {
            Ok(value) if !value.trim().is_empty() => VectorizeTarget::parse(&value)
                .unwrap_or_else(|| {
                    tracing::warn!(
                        value = %value,
                        "unknown {}, falling back to {}",
                        ENV_VECTORIZE_TARGET,
                        defaults.vectorize_target
                    );
                    defaults.vectorize_target
                }),
            _ => defaults.vectorize_target,
        };
        Self {
            fastmath: env_flag(ENV_FASTMATH, defaults.fastmath),
            boundscheck: env_flag(ENV_BOUNDSCHECK, defaults.boundscheck),
            vectorize_target,
        }
    }

    /// Process-wide configuration, read from the environment on first use.
    pub fn global() -> &'static JitConfig {
        &GLOBAL_CONFIG
    }

    pub fn with_fastmath(mut self, fastmath: bool) -> Self {
        self.fastmath = fastmath;
        self
    }

    pub fn with_boundscheck(mut self, boundscheck: bool) -> Self {
        self.boundscheck = boundscheck;
        self
    }

    pub fn with_vectorize_target(mut self, target: VectorizeTarget) -> Self {
        self.vectorize_target = target;
        self
    }
}

fn parse_bool(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
}

fn env_flag(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => parse_bool(&value),
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_accepts_common_spellings() {
        for value in ["1", "true", "YES", " on "] {
            assert!(parse_bool(value), "{value}");
        }
        for value in ["0", "false", "off", "nope"] {
            assert!(!parse_bool(value), "{value}");
        }
    }

    #[test]
    fn vectorize_target_parses_known_names() {
        assert_eq!(VectorizeTarget::parse("cpu"), Some(VectorizeTarget::Cpu));
        assert_eq!(
            VectorizeTarget::parse(" Parallel "),
            Some(VectorizeTarget::Parallel)
        );
        assert_eq!(VectorizeTarget::parse("cuda"), None);
    }
}
