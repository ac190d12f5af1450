//! Fixed-window rollout storage.
//!
//! One buffer holds `capacity` orchestrator steps across `n_envs` slots, as
//! flat zero-initialized arrays in `[step, env, field]` order. The write
//! cursor advances once per orchestrator step regardless of any individual
//! slot's episode boundaries: capacity is a step count, not an episode
//! count. No transition is ever reused across update windows; `reset()`
//! zeroes everything.

use std::fmt;

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};

use crate::actor_critic::mask_tensor_from;

/// Epsilon added to the standard deviation when standardizing returns.
const RETURN_EPS: f32 = 1e-7;

/// Rollout storage error.
#[derive(Debug, Clone, PartialEq)]
pub enum BufferError {
    /// A standardized return came out non-finite. Continuing would silently
    /// corrupt the update, so this halts training.
    NonFiniteReturn { index: usize },
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferError::NonFiniteReturn { index } => {
                write!(f, "standardized return at flat index {} is not finite", index)
            }
        }
    }
}

impl std::error::Error for BufferError {}

/// One orchestrator step worth of transitions, written across all slots.
#[derive(Debug, Clone, Copy)]
pub struct StepBatch<'a> {
    /// Observations at decision time, flattened `[n_envs * obs_dim]`.
    pub obs: &'a [f32],
    /// Chosen action indices `[n_envs]`.
    pub actions: &'a [u32],
    /// Legality masks at decision time, flattened `[n_envs * n_actions]`.
    pub masks: &'a [bool],
    /// Log probabilities under the acting policy `[n_envs]`.
    pub log_probs: &'a [f32],
    /// Rewards `[n_envs]`.
    pub rewards: &'a [f32],
    /// Done flags `[n_envs]`.
    pub dones: &'a [bool],
}

/// Flattened rollout window handed to the update rule.
///
/// Entries are ordered with the environment index as the fast axis and time
/// as the slow axis, so index `t * n_envs + e` is slot `e` at step `t`.
#[derive(Debug, Clone)]
pub struct RolloutWindow {
    /// Observations `[len * obs_dim]`.
    pub obs: Vec<f32>,
    /// Action indices `[len]`.
    pub actions: Vec<u32>,
    /// Legality masks `[len * n_actions]`.
    pub masks: Vec<bool>,
    /// Collection-time log probabilities `[len]`.
    pub log_probs: Vec<f32>,
    /// Standardized discounted returns `[len]`.
    pub returns: Vec<f32>,
    /// Done flags `[len]`.
    pub dones: Vec<bool>,
    /// Number of transitions in the window.
    pub len: usize,
    /// Observation length.
    pub obs_dim: usize,
    /// Action count.
    pub n_actions: usize,
}

impl RolloutWindow {
    /// Observations as a tensor `[len, obs_dim]`.
    pub fn obs_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        Tensor::from_data(
            TensorData::new(self.obs.clone(), [self.len, self.obs_dim]),
            device,
        )
    }

    /// Legality masks as a float tensor `[len, n_actions]`.
    pub fn mask_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        mask_tensor_from(&self.masks, self.len, self.n_actions, device)
    }

    /// Collection-time log probabilities as a tensor `[len]`.
    pub fn log_probs_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 1> {
        Tensor::from_data(TensorData::new(self.log_probs.clone(), [self.len]), device)
    }

    /// Standardized returns as a tensor `[len]`.
    pub fn returns_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 1> {
        Tensor::from_data(TensorData::new(self.returns.clone(), [self.len]), device)
    }
}

/// Fixed-capacity transition store for one rollout window.
pub struct RolloutBuffer {
    obs: Vec<f32>,
    actions: Vec<u32>,
    masks: Vec<bool>,
    log_probs: Vec<f32>,
    rewards: Vec<f32>,
    dones: Vec<bool>,

    capacity: usize,
    n_envs: usize,
    obs_dim: usize,
    n_actions: usize,
    gamma: f32,
    pos: usize,
}

impl RolloutBuffer {
    /// Allocate zeroed storage for `capacity` steps across `n_envs` slots.
    pub fn new(
        capacity: usize,
        n_envs: usize,
        obs_dim: usize,
        n_actions: usize,
        gamma: f32,
    ) -> Self {
        debug_assert!(capacity > 0 && n_envs > 0 && obs_dim > 0 && n_actions > 0);
        let entries = capacity * n_envs;
        Self {
            obs: vec![0.0; entries * obs_dim],
            actions: vec![0; entries],
            masks: vec![false; entries * n_actions],
            log_probs: vec![0.0; entries],
            rewards: vec![0.0; entries],
            dones: vec![false; entries],
            capacity,
            n_envs,
            obs_dim,
            n_actions,
            gamma,
            pos: 0,
        }
    }

    /// Steps appended since the last reset (monotonic, not wrapped).
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Step capacity of the window.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Transitions currently held.
    pub fn len(&self) -> usize {
        self.pos.min(self.capacity) * self.n_envs
    }

    /// Whether no step has been appended since the last reset.
    pub fn is_empty(&self) -> bool {
        self.pos == 0
    }

    /// Whether a full window has been collected.
    pub fn is_full(&self) -> bool {
        self.pos >= self.capacity
    }

    /// Append one orchestrator step across all slots.
    ///
    /// Writes land at step row `pos % capacity`; the cursor advances once
    /// per call.
    pub fn append(&mut self, batch: StepBatch<'_>) {
        debug_assert_eq!(batch.obs.len(), self.n_envs * self.obs_dim);
        debug_assert_eq!(batch.actions.len(), self.n_envs);
        debug_assert_eq!(batch.masks.len(), self.n_envs * self.n_actions);
        debug_assert_eq!(batch.log_probs.len(), self.n_envs);
        debug_assert_eq!(batch.rewards.len(), self.n_envs);
        debug_assert_eq!(batch.dones.len(), self.n_envs);

        let row = self.pos % self.capacity;
        let entry = row * self.n_envs;

        let obs_start = entry * self.obs_dim;
        self.obs[obs_start..obs_start + batch.obs.len()].copy_from_slice(batch.obs);

        let mask_start = entry * self.n_actions;
        self.masks[mask_start..mask_start + batch.masks.len()].copy_from_slice(batch.masks);

        self.actions[entry..entry + self.n_envs].copy_from_slice(batch.actions);
        self.log_probs[entry..entry + self.n_envs].copy_from_slice(batch.log_probs);
        self.rewards[entry..entry + self.n_envs].copy_from_slice(batch.rewards);
        self.dones[entry..entry + self.n_envs].copy_from_slice(batch.dones);

        self.pos += 1;
    }

    /// Discounted Monte-Carlo returns before standardization.
    ///
    /// Scans reward/done in reverse flattened order, zeroing the running
    /// accumulator whenever a done flag is hit, then folds
    /// `reward + gamma * accumulator`. Episode boundaries inside the window
    /// are respected; nothing is bootstrapped.
    pub fn discounted_returns(&self) -> Vec<f32> {
        let n = self.len();
        let mut returns = vec![0.0f32; n];
        let mut acc = 0.0f32;
        for i in (0..n).rev() {
            if self.dones[i] {
                acc = 0.0;
            }
            acc = self.rewards[i] + self.gamma * acc;
            returns[i] = acc;
        }
        returns
    }

    /// Flatten the collected window and compute standardized returns.
    ///
    /// Returns are standardized over the entire window (subtract mean,
    /// divide by standard deviation plus a small stabilizing constant). A
    /// window whose standardized returns are not finite is rejected.
    pub fn take_window(&self) -> Result<RolloutWindow, BufferError> {
        let n = self.len();
        let mut returns = self.discounted_returns();

        let mean = returns.iter().sum::<f32>() / n as f32;
        let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f32>() / n as f32;
        let std = var.sqrt();
        for r in returns.iter_mut() {
            *r = (*r - mean) / (std + RETURN_EPS);
        }
        if let Some(index) = returns.iter().position(|r| !r.is_finite()) {
            return Err(BufferError::NonFiniteReturn { index });
        }

        Ok(RolloutWindow {
            obs: self.obs[..n * self.obs_dim].to_vec(),
            actions: self.actions[..n].to_vec(),
            masks: self.masks[..n * self.n_actions].to_vec(),
            log_probs: self.log_probs[..n].to_vec(),
            returns,
            dones: self.dones[..n].to_vec(),
            len: n,
            obs_dim: self.obs_dim,
            n_actions: self.n_actions,
        })
    }

    /// Zero all storage and rewind the cursor.
    pub fn reset(&mut self) {
        self.obs.fill(0.0);
        self.actions.fill(0);
        self.masks.fill(false);
        self.log_probs.fill(0.0);
        self.rewards.fill(0.0);
        self.dones.fill(false);
        self.pos = 0;
    }

    #[cfg(test)]
    fn storage_is_zeroed(&self) -> bool {
        self.obs.iter().all(|&v| v == 0.0)
            && self.actions.iter().all(|&a| a == 0)
            && self.masks.iter().all(|&m| !m)
            && self.log_probs.iter().all(|&v| v == 0.0)
            && self.rewards.iter().all(|&v| v == 0.0)
            && self.dones.iter().all(|&d| !d)
    }
}
