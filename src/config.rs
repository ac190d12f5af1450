//! Training configuration.
//!
//! All window-shape and optimization hyperparameters live here, validated
//! once at construction. A training engine is never built from an invalid
//! configuration.

use std::fmt;

use crate::env::ObsTransform;

/// Configuration validation error.
///
/// Returned when configuration parameters are invalid or inconsistent.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A count parameter (n_envs, rollout_steps, etc.) must be positive.
    InvalidCount {
        field: &'static str,
        value: usize,
    },
    /// A parameter is outside its valid range.
    OutOfRange {
        field: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidCount { field, value } => {
                write!(f, "{} must be > 0, got {}", field, value)
            }
            ConfigError::OutOfRange { field, value, min, max } => {
                write!(f, "{} must be in [{}, {}], got {}", field, min, max, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Configuration for masked on-policy training.
///
/// The window shape is `rollout_steps` orchestrator steps across `n_envs`
/// parallel environment slots; one update consumes the whole window for
/// `k_epochs` full-batch epochs.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    /// Number of parallel environment slots (E)
    pub n_envs: usize,
    /// Orchestrator steps per rollout window (C)
    pub rollout_steps: usize,
    /// Full-batch optimization epochs per window (K)
    pub k_epochs: usize,
    /// Observation vector length after the configured transform (D)
    pub obs_dim: usize,
    /// Discrete action count (A)
    pub n_actions: usize,
    /// Hidden width of the shared trunk
    pub hidden_size: usize,
    /// Discount factor
    pub gamma: f32,
    /// Clipping epsilon for the surrogate objective
    pub clip_eps: f32,
    /// Learning rate for the actor parameter group (trunk + policy head)
    pub lr_actor: f64,
    /// Learning rate for the critic head
    pub lr_critic: f64,
    /// Value loss coefficient
    pub vf_coef: f32,
    /// Entropy bonus coefficient
    pub entropy_coef: f32,
    /// Total environment steps before the training loop stops
    pub max_env_steps: usize,
    /// Observation reshaping applied by the orchestrator
    pub obs_transform: ObsTransform,
}

impl TrainConfig {
    /// Create a configuration for the given problem shape with defaults for
    /// everything else.
    pub fn new(n_envs: usize, obs_dim: usize, n_actions: usize) -> Self {
        Self {
            n_envs,
            rollout_steps: 128,
            k_epochs: 4,
            obs_dim,
            n_actions,
            hidden_size: 128,
            gamma: 0.99,
            clip_eps: 0.2,
            lr_actor: 3e-4,
            lr_critic: 1e-3,
            vf_coef: 0.5,
            entropy_coef: 0.01,
            max_env_steps: 1_000_000,
            obs_transform: ObsTransform::Identity,
        }
    }

    /// Transitions per rollout window (C x E).
    pub fn transitions_per_window(&self) -> usize {
        self.rollout_steps * self.n_envs
    }

    /// Validate all configuration parameters.
    ///
    /// # Validation Rules
    /// - Count parameters (n_envs, rollout_steps, k_epochs, obs_dim,
    ///   n_actions, hidden_size) must be > 0
    /// - gamma must be in [0.0, 1.0]
    /// - clip_eps must be in (0.0, 1.0]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_envs == 0 {
            return Err(ConfigError::InvalidCount { field: "n_envs", value: 0 });
        }
        if self.rollout_steps == 0 {
            return Err(ConfigError::InvalidCount { field: "rollout_steps", value: 0 });
        }
        if self.k_epochs == 0 {
            return Err(ConfigError::InvalidCount { field: "k_epochs", value: 0 });
        }
        if self.obs_dim == 0 {
            return Err(ConfigError::InvalidCount { field: "obs_dim", value: 0 });
        }
        if self.n_actions == 0 {
            return Err(ConfigError::InvalidCount { field: "n_actions", value: 0 });
        }
        if self.hidden_size == 0 {
            return Err(ConfigError::InvalidCount { field: "hidden_size", value: 0 });
        }

        if self.gamma < 0.0 || self.gamma > 1.0 {
            return Err(ConfigError::OutOfRange {
                field: "gamma",
                value: self.gamma,
                min: 0.0,
                max: 1.0,
            });
        }
        if self.clip_eps <= 0.0 || self.clip_eps > 1.0 {
            return Err(ConfigError::OutOfRange {
                field: "clip_eps",
                value: self.clip_eps,
                min: 0.0,
                max: 1.0,
            });
        }

        Ok(())
    }

    /// Build and validate the configuration.
    ///
    /// This is the recommended way to finalize a configuration after using
    /// builder methods. Returns `Err` if validation fails.
    pub fn build(self) -> Result<Self, ConfigError> {
        self.validate()?;
        Ok(self)
    }

    /// Set orchestrator steps per rollout window.
    pub fn with_rollout_steps(mut self, steps: usize) -> Self {
        self.rollout_steps = steps;
        self
    }

    /// Set optimization epochs per window.
    pub fn with_k_epochs(mut self, epochs: usize) -> Self {
        self.k_epochs = epochs;
        self
    }

    /// Set the shared trunk width.
    pub fn with_hidden_size(mut self, size: usize) -> Self {
        self.hidden_size = size;
        self
    }

    /// Set the discount factor.
    pub fn with_gamma(mut self, gamma: f32) -> Self {
        self.gamma = gamma;
        self
    }

    /// Set the surrogate clipping epsilon.
    pub fn with_clip_eps(mut self, eps: f32) -> Self {
        self.clip_eps = eps;
        self
    }

    /// Set the actor-group learning rate.
    pub fn with_lr_actor(mut self, lr: f64) -> Self {
        self.lr_actor = lr;
        self
    }

    /// Set the critic-head learning rate.
    pub fn with_lr_critic(mut self, lr: f64) -> Self {
        self.lr_critic = lr;
        self
    }

    /// Set the value loss coefficient.
    pub fn with_vf_coef(mut self, coef: f32) -> Self {
        self.vf_coef = coef;
        self
    }

    /// Set the entropy bonus coefficient.
    pub fn with_entropy_coef(mut self, coef: f32) -> Self {
        self.entropy_coef = coef;
        self
    }

    /// Set the total environment step budget.
    pub fn with_max_env_steps(mut self, steps: usize) -> Self {
        self.max_env_steps = steps;
        self
    }

    /// Set the observation transform.
    pub fn with_obs_transform(mut self, transform: ObsTransform) -> Self {
        self.obs_transform = transform;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TrainConfig::new(8, 16, 5);
        assert!(config.validate().is_ok());
        assert_eq!(config.transitions_per_window(), 8 * 128);
    }

    #[test]
    fn test_builder_pattern() {
        let config = TrainConfig::new(4, 10, 3)
            .with_rollout_steps(32)
            .with_k_epochs(8)
            .with_gamma(0.95)
            .with_lr_actor(1e-4)
            .with_lr_critic(5e-4);

        assert_eq!(config.rollout_steps, 32);
        assert_eq!(config.k_epochs, 8);
        assert_eq!(config.gamma, 0.95);
        assert_eq!(config.lr_actor, 1e-4);
        assert_eq!(config.lr_critic, 5e-4);
        assert_eq!(config.transitions_per_window(), 128);
    }

    #[test]
    fn test_validation_n_envs_zero() {
        let config = TrainConfig::new(0, 16, 5);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidCount { field: "n_envs", .. })
        ));
    }

    #[test]
    fn test_validation_rollout_steps_zero() {
        let config = TrainConfig::new(8, 16, 5).with_rollout_steps(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidCount { field: "rollout_steps", .. })
        ));
    }

    #[test]
    fn test_validation_k_epochs_zero() {
        let config = TrainConfig::new(8, 16, 5).with_k_epochs(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidCount { field: "k_epochs", .. })
        ));
    }

    #[test]
    fn test_validation_gamma_out_of_range() {
        let config = TrainConfig::new(8, 16, 5).with_gamma(1.5);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { field: "gamma", .. })
        ));
    }

    #[test]
    fn test_validation_clip_eps_zero() {
        let config = TrainConfig::new(8, 16, 5).with_clip_eps(0.0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { field: "clip_eps", .. })
        ));
    }

    #[test]
    fn test_validation_edge_values_valid() {
        let config = TrainConfig::new(1, 1, 1)
            .with_rollout_steps(1)
            .with_k_epochs(1)
            .with_gamma(0.0);
        assert!(config.validate().is_ok());

        let config = TrainConfig::new(1, 1, 1).with_gamma(1.0).with_clip_eps(1.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidCount { field: "n_envs", value: 0 };
        assert_eq!(err.to_string(), "n_envs must be > 0, got 0");

        let err = ConfigError::OutOfRange {
            field: "gamma",
            value: 1.5,
            min: 0.0,
            max: 1.0,
        };
        assert_eq!(err.to_string(), "gamma must be in [0, 1], got 1.5");
    }
}
