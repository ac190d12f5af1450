//! # tabletop_rl: On-Policy Training for Turn-Based Games
//!
//! Training engine for discrete-action, turn-based decision processes in
//! which only a subset of actions is legal at each decision point. The
//! legality mask is supplied by the environment and folded into the policy
//! distribution itself, so illegal actions receive (near) zero probability
//! without breaking differentiability.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Training loop                         │
//! ├──────────────────────────────────────────────────────────────┤
//! │   ┌─────────┐  obs, mask   ┌───────────────────┐             │
//! │   │ VecEnv  │─────────────►│ policy snapshot   │             │
//! │   │ E slots │◄─────────────│ (frozen, no grad) │             │
//! │   └────┬────┘   actions    └───────────────────┘             │
//! │        │ reward, done                                        │
//! │        ▼                                                     │
//! │   ┌──────────────┐   full    ┌────────────────────────┐      │
//! │   │ RolloutBuffer│──────────►│ clipped-objective      │      │
//! │   │ [C, E] grid  │  window   │ update (K epochs)      │      │
//! │   └──────────────┘           └───────────┬────────────┘      │
//! │        ▲                                 │ snapshot sync,    │
//! │        └─────────────────────────────────┘ buffer reset      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Collection and optimization never interleave: the buffer fills for
//! exactly `rollout_steps` orchestrator steps, one update consumes the whole
//! window, the acting snapshot is replaced wholesale, and the buffer is
//! zeroed before collection resumes.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tabletop_rl::{PpoAgent, TrainConfig, Trainer, VecEnv, ObsTransform, ConsoleSink};
//! use burn::optim::AdamConfig;
//!
//! let mut env = VecEnv::new(adapters, ObsTransform::Identity);
//! let config = TrainConfig::new(env.n_envs(), env.obs_dim(), env.n_actions())
//!     .with_rollout_steps(128)
//!     .with_k_epochs(4)
//!     .build()?;
//!
//! let mut agent: PpoAgent<B> = PpoAgent::new(config.clone(), device)?;
//! let mut actor_optim = AdamConfig::new().init();
//! let mut critic_optim = AdamConfig::new().init();
//! let mut sink = ConsoleSink::new(1);
//!
//! Trainer::new(config)?.run(
//!     &mut agent, &mut env, &mut actor_optim, &mut critic_optim, &mut sink, None,
//! )?;
//! ```

pub mod actor_critic;
pub mod buffer;
pub mod checkpoint;
pub mod config;
pub mod env;
pub mod loss;
pub mod metrics;
pub mod ppo;
pub mod runner;
pub mod stats;

// Re-export commonly used types
pub use actor_critic::{ActorCriticConfig, MaskedActorCritic, MaskedPolicyOutput};
pub use buffer::{RolloutBuffer, RolloutWindow, StepBatch};
pub use checkpoint::{CheckpointError, Checkpointer, CheckpointerConfig, Hyperparameters};
pub use config::{ConfigError, TrainConfig};
pub use env::{AdapterStep, FinalReport, ObsTransform, StepDiagnostics, TurnBasedEnv, VecEnv, VecStep};
pub use metrics::{ConsoleSink, CsvSink, MetricsSink, MultiSink, NullSink, TrainingSnapshot};
pub use ppo::{ActOutput, LearnError, PpoAgent};
pub use runner::{TrainError, TrainReport, Trainer};
pub use stats::{EpisodeProgress, EpisodeSummary, EpisodeTracker};
