//! Synchronous training loop.
//!
//! Drives the orchestrator and the agent step by step: sample from the
//! acting snapshot, step all slots, record the transition, and once the
//! window is full run one update. Collection and optimization never
//! interleave; the caller bounds the run with the configured step budget.

use std::fmt;

use burn::optim::Optimizer;
use burn::tensor::backend::AutodiffBackend;

use crate::actor_critic::MaskedActorCritic;
use crate::checkpoint::{Checkpointer, CheckpointError, Hyperparameters};
use crate::config::{ConfigError, TrainConfig};
use crate::env::{TurnBasedEnv, VecEnv};
use crate::metrics::MetricsSink;
use crate::ppo::{LearnError, PpoAgent};
use crate::stats::EpisodeTracker;

/// Error raised by the training loop.
#[derive(Debug)]
pub enum TrainError {
    /// An update failed.
    Learn(LearnError),
    /// A checkpoint save failed.
    Checkpoint(CheckpointError),
}

impl fmt::Display for TrainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainError::Learn(err) => write!(f, "update failed: {}", err),
            TrainError::Checkpoint(err) => write!(f, "checkpoint failed: {}", err),
        }
    }
}

impl std::error::Error for TrainError {}

impl From<LearnError> for TrainError {
    fn from(err: LearnError) -> Self {
        TrainError::Learn(err)
    }
}

impl From<CheckpointError> for TrainError {
    fn from(err: CheckpointError) -> Self {
        TrainError::Checkpoint(err)
    }
}

/// Summary of a finished training run.
#[derive(Debug, Clone, Copy)]
pub struct TrainReport {
    /// Environment steps collected.
    pub env_steps: usize,
    /// Updates performed.
    pub updates: usize,
    /// Episodes completed.
    pub episodes: usize,
}

/// Step-driven training loop.
pub struct Trainer {
    config: TrainConfig,
}

impl Trainer {
    /// Create a trainer from a validated configuration.
    pub fn new(config: TrainConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Get the configuration.
    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Run collection and updates until the step budget is exhausted.
    ///
    /// One iteration is one orchestrator step across all slots. Whenever
    /// the rollout window fills, one update runs before the next step is
    /// collected.
    pub fn run<B, E, OA, OC>(
        &self,
        agent: &mut PpoAgent<B>,
        env: &mut VecEnv<E>,
        actor_optim: &mut OA,
        critic_optim: &mut OC,
        sink: &mut dyn MetricsSink,
        mut checkpointer: Option<&mut Checkpointer>,
    ) -> Result<TrainReport, TrainError>
    where
        B: AutodiffBackend,
        E: TurnBasedEnv,
        OA: Optimizer<MaskedActorCritic<B>, B>,
        OC: Optimizer<MaskedActorCritic<B>, B>,
    {
        let config = &self.config;
        assert_eq!(env.n_envs(), config.n_envs, "orchestrator slot count mismatch");
        assert_eq!(env.obs_dim(), config.obs_dim, "orchestrator observation dim mismatch");
        assert_eq!(env.n_actions(), config.n_actions, "orchestrator action count mismatch");

        let hyperparameters = Hyperparameters::from(config);
        let mut tracker = EpisodeTracker::new(config.n_envs);
        let (mut obs, mut masks) = env.reset_all();
        let mut env_steps = 0usize;

        log::info!(
            "training: n_envs={} rollout_steps={} k_epochs={} obs_dim={} n_actions={} budget={}",
            config.n_envs,
            config.rollout_steps,
            config.k_epochs,
            config.obs_dim,
            config.n_actions,
            config.max_env_steps,
        );

        while env_steps < config.max_env_steps {
            let act = agent.act(&obs, &masks);
            let step = env.step(&act.actions);

            agent.observe(&obs, &masks, &act, &step.rewards, &step.dones);
            let finished = tracker.observe_step(&step.rewards, &step.dones, &step.wins);
            for summary in &finished {
                log::debug!(
                    "episode finished: slot={} return={:.2} length={} won={}",
                    summary.slot,
                    summary.episode_return,
                    summary.length,
                    summary.won,
                );
            }

            obs = step.obs;
            masks = step.masks;
            env_steps += config.n_envs;

            if agent.ready_to_learn() {
                let snapshot =
                    agent.learn(actor_optim, critic_optim, tracker.progress(), sink)?;
                log::info!(
                    "update {}: env_steps={} avg_return={:.2} win_rate={:.2} total_loss={:.4}",
                    snapshot.update,
                    snapshot.env_steps,
                    snapshot.avg_return,
                    snapshot.win_rate,
                    snapshot.total_loss,
                );

                if let Some(cp) = checkpointer.as_deref_mut() {
                    if cp.should_save(env_steps) {
                        let metric = tracker.progress().avg_return;
                        cp.save(agent.policy(), &hyperparameters, env_steps, Some(metric))?;
                    }
                }
            }
        }

        sink.flush();

        Ok(TrainReport {
            env_steps,
            updates: agent.updates(),
            episodes: tracker.episodes(),
        })
    }
}
