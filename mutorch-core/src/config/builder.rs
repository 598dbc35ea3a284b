//! Build [`Config`] from environment variables.
//!
//! Uses [`env_string`] and [`env_parsed`] to read env vars with a single place for key names
//! (see the `constants` submodule) and typed errors ([`ConfigError`]).

use tracing::debug;

use super::constants::{
    ENV_ARENA_CAPACITY, ENV_DEFAULT_REQUIRES_GRAD, ENV_FLATTEN_ORDER, ENV_PREFIX, ENV_SEED,
};
use super::Config;
use super::ConfigError;
use crate::autograd::FlattenOrder;

/// Returns the full environment variable key for a given suffix (e.g. `SEED` → `MUTORCH_SEED`).
#[must_use]
pub fn env_key(suffix: &str) -> String {
    format!("{ENV_PREFIX}{suffix}")
}

/// Reads an environment variable as a string.
///
/// Returns `Some(value)` if the variable is set and valid UTF-8, `None` if unset.
/// Returns `Err(ConfigError::EnvVar)` if the variable is set but invalid (e.g. not Unicode).
pub fn env_string(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(s) => Ok(Some(s)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(ConfigError::EnvVar {
            key: key.to_string(),
            message: e.to_string(),
        }),
    }
}

/// Reads an environment variable and parses it into type `T`.
///
/// Returns `Ok(Some(value))` if set and parse succeeds, `Ok(None)` if unset, and
/// `Err(ConfigError::Parse)` if set but parsing fails (e.g. `MUTORCH_SEED=abc`).
pub fn env_parsed<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let Some(s) = env_string(key)? else {
        return Ok(None);
    };
    match s.parse() {
        Ok(t) => Ok(Some(t)),
        Err(e) => Err(ConfigError::Parse {
            key: key.to_string(),
            value: s,
            message: e.to_string(),
        }),
    }
}

/// Builds [`Config`] from environment variables, falling back to [`Config::default`] for unset
/// values.
///
/// Returns [`ConfigError`] if any *set* variable fails to parse.
pub fn from_env() -> Result<Config, ConfigError> {
    let default = Config::default();

    let seed = env_parsed::<u64>(&env_key(ENV_SEED))?.unwrap_or(default.seed);
    let default_requires_grad = env_parsed::<bool>(&env_key(ENV_DEFAULT_REQUIRES_GRAD))?
        .unwrap_or(default.default_requires_grad);
    let flatten_order = env_parsed::<FlattenOrder>(&env_key(ENV_FLATTEN_ORDER))?
        .unwrap_or(default.flatten_order);
    let arena_capacity =
        env_parsed::<usize>(&env_key(ENV_ARENA_CAPACITY))?.unwrap_or(default.arena_capacity);

    let config = Config {
        seed,
        default_requires_grad,
        flatten_order,
        arena_capacity,
    };
    debug!(?config, "loaded config from env");
    Ok(config)
}
