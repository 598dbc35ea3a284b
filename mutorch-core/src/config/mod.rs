//! Engine configuration.
//!
//! Load from environment via [`from_env`] and validate with [`Config::validate`].
//! Default values and env key names are centralized in the `constants` submodule.

mod builder;
mod constants;
mod error;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::autograd::FlattenOrder;
use constants::{DEFAULT_ARENA_CAPACITY, DEFAULT_REQUIRES_GRAD, DEFAULT_SEED};

pub use builder::{env_key, env_parsed, env_string, from_env};
pub use constants::MAX_ARENA_CAPACITY;
pub use error::ConfigError;

/// Settings applied to a [`Graph`](crate::Graph) created with
/// [`Graph::with_config`](crate::Graph::with_config).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Seed for [`Config::rng`] (reproducible initialisation).
    pub seed: u64,
    /// `requires_grad` of tensors built with [`Tensor::new`](crate::Tensor::new).
    pub default_requires_grad: bool,
    /// Order used by `flatten()` and `items()`.
    pub flatten_order: FlattenOrder,
    /// Nodes reserved in the arena up front.
    pub arena_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            default_requires_grad: DEFAULT_REQUIRES_GRAD,
            flatten_order: FlattenOrder::default(),
            arena_capacity: DEFAULT_ARENA_CAPACITY,
        }
    }
}

impl Config {
    /// Validates configuration. Returns `Ok(())` if valid, or a [`ConfigError`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.arena_capacity > MAX_ARENA_CAPACITY {
            return Err(ConfigError::Validation(format!(
                "arena_capacity ({}) must not exceed {MAX_ARENA_CAPACITY}",
                self.arena_capacity
            )));
        }
        Ok(())
    }

    /// A random number generator seeded from [`Config::seed`].
    #[must_use]
    pub fn rng(&self) -> StdRng {
        StdRng::seed_from_u64(self.seed)
    }
}

#[cfg(test)]
mod tests {
    use super::constants::{ENV_ARENA_CAPACITY, ENV_FLATTEN_ORDER, ENV_SEED};
    use super::*;
    use rand::Rng;

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.flatten_order, FlattenOrder::RowMajor);
        assert!(cfg.default_requires_grad);
    }

    #[test]
    fn validate_rejects_oversized_arena() {
        let cfg = Config {
            arena_capacity: MAX_ARENA_CAPACITY + 1,
            ..Config::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn rng_is_reproducible() {
        let cfg = Config::default();
        let a: f64 = cfg.rng().random();
        let b: f64 = cfg.rng().random();
        assert_eq!(a, b);
    }

    /// Lock so env tests don't run in parallel and pollute each other.
    static CONFIG_ENV_LOCK: std::sync::OnceLock<std::sync::Mutex<()>> = std::sync::OnceLock::new();

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        CONFIG_ENV_LOCK
            .get_or_init(|| std::sync::Mutex::new(()))
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    #[test]
    fn from_env_falls_back_to_defaults() {
        let _g = env_lock();
        std::env::remove_var(env_key(ENV_FLATTEN_ORDER));
        std::env::remove_var(env_key(ENV_SEED));
        std::env::remove_var(env_key(ENV_ARENA_CAPACITY));
        let cfg = from_env().unwrap();
        assert_eq!(cfg.flatten_order, FlattenOrder::RowMajor);
        assert_eq!(cfg.seed, Config::default().seed);
    }

    #[test]
    fn from_env_overrides_with_env_vars() {
        let _g = env_lock();
        let key_order = env_key(ENV_FLATTEN_ORDER);
        let key_capacity = env_key(ENV_ARENA_CAPACITY);
        std::env::set_var(&key_order, "axis-reversed");
        std::env::set_var(&key_capacity, "64");
        let cfg = from_env().unwrap();
        std::env::remove_var(key_order);
        std::env::remove_var(key_capacity);
        assert_eq!(cfg.flatten_order, FlattenOrder::AxisReversed);
        assert_eq!(cfg.arena_capacity, 64);
    }

    #[test]
    fn from_env_returns_error_on_invalid_parse() {
        let _g = env_lock();
        let key = env_key(ENV_FLATTEN_ORDER);
        std::env::set_var(&key, "diagonal");
        let res = from_env();
        std::env::remove_var(key);
        assert!(matches!(res, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn config_error_parse_display() {
        let e = ConfigError::Parse {
            key: "MUTORCH_SEED".to_string(),
            value: "abc".to_string(),
            message: "invalid digit".to_string(),
        };
        assert!(e.to_string().contains("MUTORCH_SEED"));
        assert!(e.to_string().contains("abc"));
        assert_eq!(e.message(), "invalid digit");
    }

    #[test]
    fn config_error_validation_display() {
        let e = ConfigError::Validation("arena_capacity too large".to_string());
        assert!(e.to_string().contains("config validation"));
        assert_eq!(e.message(), "arena_capacity too large");
    }

    #[test]
    fn env_parsed_unset_returns_none() {
        let key = "MUTORCH_UNLIKELY_KEY_67890";
        assert_eq!(env_parsed::<u64>(key).unwrap(), None);
        assert_eq!(env_string(key).unwrap(), None);
    }
}
