//! Central place for all configuration constants.
//!
//! Default values and environment variable key names used by the config builder.

/// Environment variable prefix (e.g. `MUTORCH_FLATTEN_ORDER`).
pub(crate) const ENV_PREFIX: &str = "MUTORCH_";

// --- Env key suffixes (full key = ENV_PREFIX + suffix) ---

pub(crate) const ENV_SEED: &str = "SEED";
pub(crate) const ENV_DEFAULT_REQUIRES_GRAD: &str = "DEFAULT_REQUIRES_GRAD";
pub(crate) const ENV_FLATTEN_ORDER: &str = "FLATTEN_ORDER";
pub(crate) const ENV_ARENA_CAPACITY: &str = "ARENA_CAPACITY";

// --- Default values ---

pub(crate) const DEFAULT_SEED: u64 = 42;
pub(crate) const DEFAULT_REQUIRES_GRAD: bool = true;
pub(crate) const DEFAULT_ARENA_CAPACITY: usize = 1024;

/// Upper bound on the number of nodes reserved up front.
pub const MAX_ARENA_CAPACITY: usize = 1 << 20;
