//! Clipped-objective policy optimization over masked action spaces.
//!
//! [`PpoAgent`] owns the trainable policy, the frozen acting snapshot, and
//! the rollout buffer. Collection always samples from the snapshot; one
//! `learn` call consumes the full window for K full-batch epochs, then
//! replaces the snapshot wholesale and zeroes the buffer. No intermediate
//! epoch's weights are ever visible to collection.

use std::fmt;

use burn::module::AutodiffModule;
use burn::nn::Linear;
use burn::optim::{GradientsParams, Optimizer};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{Tensor, TensorData};

use crate::actor_critic::{mask_tensor_from, ActorCriticConfig, ActorNet, MaskedActorCritic};
use crate::buffer::{BufferError, RolloutBuffer, StepBatch};
use crate::config::{ConfigError, TrainConfig};
use crate::loss::combined_loss;
use crate::metrics::{MetricsSink, TrainingSnapshot};
use crate::stats::EpisodeProgress;

/// Error raised by an update.
///
/// Numerical faults are never auto-recovered: the update stops before any
/// optimizer step of the failing epoch, leaving the acting snapshot at its
/// last known-good state.
#[derive(Debug, Clone, PartialEq)]
pub enum LearnError {
    /// The combined loss became non-finite.
    NonFiniteLoss { epoch: usize, value: f32 },
    /// The rollout window was rejected by the buffer.
    Window(BufferError),
}

impl fmt::Display for LearnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LearnError::NonFiniteLoss { epoch, value } => {
                write!(f, "total loss became non-finite ({}) at epoch {}", value, epoch)
            }
            LearnError::Window(err) => write!(f, "rollout window rejected: {}", err),
        }
    }
}

impl std::error::Error for LearnError {}

impl From<BufferError> for LearnError {
    fn from(err: BufferError) -> Self {
        LearnError::Window(err)
    }
}

/// Actions sampled for one orchestrator step.
#[derive(Debug, Clone)]
pub struct ActOutput {
    /// One action index per environment slot.
    pub actions: Vec<u32>,
    /// Log probability of each action under the acting snapshot.
    pub log_probs: Vec<f32>,
}

/// Masked actor-critic agent with a clipped-objective update.
pub struct PpoAgent<B: AutodiffBackend> {
    policy: MaskedActorCritic<B>,
    /// Frozen acting policy. Read-only during collection, replaced
    /// wholesale at the end of each update.
    snapshot: MaskedActorCritic<B::InnerBackend>,
    buffer: RolloutBuffer,
    config: TrainConfig,
    device: B::Device,
    updates: usize,
}

impl<B: AutodiffBackend> PpoAgent<B> {
    /// Build an agent from a validated configuration.
    ///
    /// Fails fast on an invalid configuration; no partially-initialized
    /// agent is ever returned.
    pub fn new(config: TrainConfig, device: B::Device) -> Result<Self, ConfigError> {
        config.validate()?;

        let policy = ActorCriticConfig::new(config.obs_dim, config.n_actions)
            .with_hidden_size(config.hidden_size)
            .init::<B>(&device);
        let snapshot = policy.valid();
        let buffer = RolloutBuffer::new(
            config.rollout_steps,
            config.n_envs,
            config.obs_dim,
            config.n_actions,
            config.gamma,
        );

        Ok(Self {
            policy,
            snapshot,
            buffer,
            config,
            device,
            updates: 0,
        })
    }

    /// Agent configuration.
    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Trainable policy (for checkpointing).
    pub fn policy(&self) -> &MaskedActorCritic<B> {
        &self.policy
    }

    /// Frozen acting snapshot.
    pub fn snapshot(&self) -> &MaskedActorCritic<B::InnerBackend> {
        &self.snapshot
    }

    /// Rollout buffer.
    pub fn buffer(&self) -> &RolloutBuffer {
        &self.buffer
    }

    /// Completed updates.
    pub fn updates(&self) -> usize {
        self.updates
    }

    /// Replace the trainable policy (e.g. with checkpointed weights) and
    /// re-sync the acting snapshot.
    ///
    /// # Panics
    ///
    /// Panics if the replacement's architecture does not match the
    /// configuration.
    pub fn load_policy(&mut self, policy: MaskedActorCritic<B>) {
        assert_eq!(policy.obs_dim(), self.config.obs_dim, "loaded policy obs_dim mismatch");
        assert_eq!(policy.n_actions(), self.config.n_actions, "loaded policy n_actions mismatch");
        self.policy = policy;
        self.snapshot = self.policy.valid();
    }

    /// Sample one action per slot from the acting snapshot.
    ///
    /// `obs` is `[n_envs * obs_dim]`, `masks` is `[n_envs * n_actions]`
    /// with true = legal.
    pub fn act(&self, obs: &[f32], masks: &[bool]) -> ActOutput {
        let (output, _values) = self.snapshot_forward(obs, masks);
        let (actions, log_probs) = output.sample();
        ActOutput { actions, log_probs }
    }

    /// Deterministic (highest-probability legal) action per slot, for
    /// inference-only use.
    pub fn act_greedy(&self, obs: &[f32], masks: &[bool]) -> Vec<u32> {
        let (output, _values) = self.snapshot_forward(obs, masks);
        output.greedy()
    }

    fn snapshot_forward(
        &self,
        obs: &[f32],
        masks: &[bool],
    ) -> (
        crate::actor_critic::MaskedPolicyOutput<B::InnerBackend>,
        Tensor<B::InnerBackend, 2>,
    ) {
        let n = self.config.n_envs;
        debug_assert_eq!(obs.len(), n * self.config.obs_dim);
        debug_assert_eq!(masks.len(), n * self.config.n_actions);

        let obs_t: Tensor<B::InnerBackend, 2> = Tensor::from_data(
            TensorData::new(obs.to_vec(), [n, self.config.obs_dim]),
            &self.device,
        );
        let mask_t = mask_tensor_from::<B::InnerBackend>(
            masks,
            n,
            self.config.n_actions,
            &self.device,
        );
        self.snapshot.forward_masked(obs_t, mask_t)
    }

    /// Record one orchestrator step into the rollout buffer.
    ///
    /// `obs` and `masks` are the values the actions were sampled from, not
    /// the post-step ones.
    pub fn observe(
        &mut self,
        obs: &[f32],
        masks: &[bool],
        act: &ActOutput,
        rewards: &[f32],
        dones: &[bool],
    ) {
        self.buffer.append(StepBatch {
            obs,
            actions: &act.actions,
            masks,
            log_probs: &act.log_probs,
            rewards,
            dones,
        });
    }

    /// Whether a full window has been collected.
    pub fn ready_to_learn(&self) -> bool {
        self.buffer.is_full()
    }

    /// Run K full-batch epochs over the collected window, then sync the
    /// acting snapshot and reset the buffer.
    ///
    /// The whole window is consumed each epoch; there is no shuffling or
    /// sub-batching. `progress` fills the episode columns of the emitted
    /// snapshot; `sink` receives exactly one record per successful update.
    pub fn learn<OA, OC>(
        &mut self,
        actor_optim: &mut OA,
        critic_optim: &mut OC,
        progress: EpisodeProgress,
        sink: &mut dyn MetricsSink,
    ) -> Result<TrainingSnapshot, LearnError>
    where
        OA: Optimizer<MaskedActorCritic<B>, B>,
        OC: Optimizer<MaskedActorCritic<B>, B>,
    {
        let window = self.buffer.take_window()?;
        let device = &self.device;

        let obs = window.obs_tensor::<B>(device);
        let masks = window.mask_tensor::<B>(device);
        let old_log_probs = window.log_probs_tensor::<B>(device);
        let returns = window.returns_tensor::<B>(device);

        let mut total_sum = 0.0f32;
        let mut policy_sum = 0.0f32;
        let mut value_sum = 0.0f32;
        let mut entropy_sum = 0.0f32;
        let mut first_ratio = 1.0f32;

        for epoch in 0..self.config.k_epochs {
            let (output, values) = self.policy.forward_masked(obs.clone(), masks.clone());
            let log_probs = output.log_prob(&window.actions, device);
            let entropy = output.entropy();
            let values: Tensor<B, 1> = values.flatten(0, 1);

            let (total, parts) = combined_loss(
                log_probs,
                old_log_probs.clone(),
                values,
                returns.clone(),
                entropy,
                self.config.clip_eps,
                self.config.vf_coef,
                self.config.entropy_coef,
            );

            if !parts.total.is_finite() {
                return Err(LearnError::NonFiniteLoss {
                    epoch,
                    value: parts.total,
                });
            }
            if epoch == 0 {
                first_ratio = parts.mean_ratio;
            }
            total_sum += parts.total;
            policy_sum += parts.policy;
            value_sum += parts.value;
            entropy_sum += parts.entropy;

            // One full-batch gradient step, split into the actor group
            // (trunk + policy head) and the critic head so each group gets
            // its own learning rate.
            let mut grads = total.backward();
            let actor_grads =
                GradientsParams::from_module::<B, ActorNet<B>>(&mut grads, &self.policy.actor);
            let critic_grads =
                GradientsParams::from_module::<B, Linear<B>>(&mut grads, &self.policy.critic);

            self.policy = actor_optim.step(self.config.lr_actor, self.policy.clone(), actor_grads);
            self.policy =
                critic_optim.step(self.config.lr_critic, self.policy.clone(), critic_grads);
        }

        // Single synchronization point: the acting snapshot is replaced
        // wholesale, then the window is discarded.
        self.snapshot = self.policy.valid();
        self.buffer.reset();
        self.updates += 1;

        let k = self.config.k_epochs as f32;
        let snapshot = TrainingSnapshot {
            update: self.updates,
            env_steps: self.updates * self.config.transitions_per_window(),
            episodes: progress.episodes,
            avg_return: progress.avg_return,
            avg_length: progress.avg_length,
            win_rate: progress.win_rate,
            total_loss: total_sum / k,
            policy_loss: policy_sum / k,
            value_loss: value_sum / k,
            entropy: entropy_sum / k,
            mean_ratio: first_ratio,
        };
        log::debug!(
            "update {}: total={:.4} policy={:.4} value={:.4} entropy={:.4} ratio={:.4}",
            snapshot.update,
            snapshot.total_loss,
            snapshot.policy_loss,
            snapshot.value_loss,
            snapshot.entropy,
            snapshot.mean_ratio,
        );
        sink.record(&snapshot);

        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::NullSink;
    use burn::backend::{Autodiff, NdArray};
    use burn::optim::AdamConfig;

    type B = Autodiff<NdArray<f32>>;

    fn small_config() -> TrainConfig {
        TrainConfig::new(2, 3, 4)
            .with_rollout_steps(4)
            .with_k_epochs(2)
            .with_hidden_size(8)
    }

    fn fill_window(agent: &mut PpoAgent<B>) {
        let steps = agent.config().rollout_steps;
        let obs = vec![0.25f32; 2 * 3];
        let masks = vec![true, true, false, true, true, true, true, false];
        for step in 0..steps {
            let act = agent.act(&obs, &masks);
            let done = step == steps - 1;
            agent.observe(&obs, &masks, &act, &[1.0, -1.0], &[done, done]);
        }
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = TrainConfig::new(0, 3, 4);
        let device = Default::default();
        assert!(matches!(
            PpoAgent::<B>::new(config, device),
            Err(ConfigError::InvalidCount { field: "n_envs", .. })
        ));
    }

    #[test]
    fn test_act_respects_mask() {
        let agent = PpoAgent::<B>::new(small_config(), Default::default()).unwrap();
        let obs = vec![0.0f32; 2 * 3];
        // Slot 0 forbids action 2, slot 1 forbids action 3.
        let masks = vec![true, true, false, true, true, true, true, false];

        for _ in 0..64 {
            let out = agent.act(&obs, &masks);
            assert_ne!(out.actions[0], 2);
            assert_ne!(out.actions[1], 3);
        }
    }

    #[test]
    fn test_greedy_respects_mask() {
        let agent = PpoAgent::<B>::new(small_config(), Default::default()).unwrap();
        let obs = vec![0.5f32; 2 * 3];
        let masks = vec![false, false, true, false, false, false, false, true];

        let actions = agent.act_greedy(&obs, &masks);
        assert_eq!(actions, vec![2, 3]);
    }

    #[test]
    fn test_first_epoch_ratio_is_one() {
        let mut agent = PpoAgent::<B>::new(small_config(), Default::default()).unwrap();
        let mut actor_optim = AdamConfig::new().init::<B, MaskedActorCritic<B>>();
        let mut critic_optim = AdamConfig::new().init::<B, MaskedActorCritic<B>>();
        let mut sink = NullSink;

        fill_window(&mut agent);
        assert!(agent.ready_to_learn());

        let progress = EpisodeProgress {
            episodes: 2,
            avg_return: 0.0,
            avg_length: 4.0,
            win_rate: 0.0,
        };
        let snapshot = agent
            .learn(&mut actor_optim, &mut critic_optim, progress, &mut sink)
            .unwrap();
        assert!(
            (snapshot.mean_ratio - 1.0).abs() < 1e-3,
            "expected ratio 1.0 right after sync, got {}",
            snapshot.mean_ratio
        );
        assert_eq!(snapshot.update, 1);
        assert_eq!(snapshot.env_steps, 8);
    }

    #[test]
    fn test_learn_resets_buffer_and_resyncs_snapshot() {
        let mut agent = PpoAgent::<B>::new(small_config(), Default::default()).unwrap();
        let mut actor_optim = AdamConfig::new().init::<B, MaskedActorCritic<B>>();
        let mut critic_optim = AdamConfig::new().init::<B, MaskedActorCritic<B>>();
        let mut sink = NullSink;
        let progress = EpisodeProgress {
            episodes: 0,
            avg_return: 0.0,
            avg_length: 0.0,
            win_rate: 0.0,
        };

        fill_window(&mut agent);
        assert_eq!(agent.buffer().len(), 8);
        agent
            .learn(&mut actor_optim, &mut critic_optim, progress, &mut sink)
            .unwrap();

        assert_eq!(agent.buffer().pos(), 0);
        assert_eq!(agent.buffer().len(), 0);
        assert_eq!(agent.updates(), 1);

        // The second window is collected under the synced snapshot, so the
        // second update also starts at ratio 1.
        fill_window(&mut agent);
        let snapshot = agent
            .learn(&mut actor_optim, &mut critic_optim, progress, &mut sink)
            .unwrap();
        assert!((snapshot.mean_ratio - 1.0).abs() < 1e-3);
    }
}
