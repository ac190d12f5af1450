//! Environment abstraction for masked turn-based training.
//!
//! Provides the adapter trait implemented by the hosting simulation, and the
//! vectorized orchestrator that drives E adapter instances in lockstep with
//! auto-reset semantics.

use serde::{Deserialize, Serialize};

/// Per-decision diagnostics reported by an adapter alongside an observation.
///
/// The mask always describes the legality of actions for the observation it
/// was returned with, i.e. the *next* decision.
#[derive(Debug, Clone)]
pub struct StepDiagnostics {
    /// Legality mask over the discrete action space (true = legal).
    pub action_mask: Vec<bool>,
    /// Whether the controlled player has won, as of this state.
    pub has_won: bool,
}

/// Result of stepping a single adapter instance.
#[derive(Debug, Clone)]
pub struct AdapterStep {
    /// Observation after the step.
    pub obs: Vec<f32>,
    /// Reward for the step.
    pub reward: f32,
    /// Episode ended in an absorbing state (win/loss/draw).
    pub terminated: bool,
    /// Episode ended due to an external limit.
    pub truncated: bool,
    /// Mask and win diagnostics for the returned observation.
    pub info: StepDiagnostics,
}

/// Adapter over one turn-based simulation instance.
///
/// The simulation engine itself is an external collaborator; implementations
/// normalize its faults (including formally illegal action requests) into
/// the reward/done/mask contract. Whether an illegal action is penalized or
/// substituted is the adapter's choice, never the orchestrator's.
pub trait TurnBasedEnv {
    /// Length of the raw observation vector.
    fn obs_dim(&self) -> usize;

    /// Size of the discrete action space, fixed after construction.
    fn n_actions(&self) -> usize;

    /// Start a fresh episode.
    fn reset(&mut self) -> (Vec<f32>, StepDiagnostics);

    /// Advance one decision with the given action index.
    fn step(&mut self, action: u32) -> AdapterStep;
}

/// Observation reshaping applied by the orchestrator.
///
/// Selected by configuration rather than implemented per environment, so
/// adapters always hand over their raw encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObsTransform {
    /// Pass the raw vector through unchanged.
    Identity,
    /// Treat every raw entry as a category index and expand it into a
    /// one-hot block of `classes` entries.
    OneHot { classes: usize },
}

impl ObsTransform {
    /// Output length for a raw observation of length `raw_dim`.
    pub fn output_dim(&self, raw_dim: usize) -> usize {
        match self {
            ObsTransform::Identity => raw_dim,
            ObsTransform::OneHot { classes } => raw_dim * classes,
        }
    }

    /// Write the transformed observation into `out`.
    ///
    /// `out` must have length `output_dim(raw.len())`.
    pub fn apply_into(&self, raw: &[f32], out: &mut [f32]) {
        match self {
            ObsTransform::Identity => {
                out.copy_from_slice(raw);
            }
            ObsTransform::OneHot { classes } => {
                out.fill(0.0);
                for (i, &value) in raw.iter().enumerate() {
                    let idx = (value.max(0.0) as usize).min(classes - 1);
                    out[i * classes + idx] = 1.0;
                }
            }
        }
    }
}

/// Pre-reset diagnostics for a slot that terminated this step.
#[derive(Debug, Clone)]
pub struct FinalReport {
    /// Last observation of the finished episode (transformed).
    pub obs: Vec<f32>,
    /// Win flag of the finished episode.
    pub has_won: bool,
}

/// Result of one lockstep orchestrator step across all E slots.
///
/// For a slot that terminated this step, `obs`/`masks` already describe the
/// fresh episode after auto-reset, while `rewards`/`dones` describe the
/// episode that just finished and `finals` carries its pre-reset state.
#[derive(Debug, Clone)]
pub struct VecStep {
    /// Observations, flattened `[n_envs * obs_dim]` (transformed).
    pub obs: Vec<f32>,
    /// Legality masks, flattened `[n_envs * n_actions]`, matching `obs`.
    pub masks: Vec<bool>,
    /// Rewards per slot.
    pub rewards: Vec<f32>,
    /// Done flags per slot (terminated or truncated).
    pub dones: Vec<bool>,
    /// Truncation flags per slot.
    pub truncations: Vec<bool>,
    /// Win flags per slot; for terminal slots this is the pre-reset value.
    pub wins: Vec<bool>,
    /// Pre-reset diagnostics, populated only for slots that finished.
    pub finals: Vec<Option<FinalReport>>,
}

/// Vectorized environment orchestrator.
///
/// Drives E adapter instances in lockstep. A slot that terminates inside a
/// `step` call is reset before the call returns, so every returned
/// observation is actionable and every returned mask matches the returned
/// observation of the same slot.
pub struct VecEnv<E: TurnBasedEnv> {
    envs: Vec<E>,
    transform: ObsTransform,
    raw_obs_dim: usize,
    obs_dim: usize,
    n_actions: usize,
}

impl<E: TurnBasedEnv> VecEnv<E> {
    /// Wrap a set of adapter instances.
    ///
    /// # Panics
    ///
    /// Panics if `envs` is empty or the instances disagree on their
    /// observation or action dimensions.
    pub fn new(envs: Vec<E>, transform: ObsTransform) -> Self {
        assert!(!envs.is_empty(), "VecEnv requires at least one environment");
        let raw_obs_dim = envs[0].obs_dim();
        let n_actions = envs[0].n_actions();
        for (i, env) in envs.iter().enumerate() {
            assert_eq!(env.obs_dim(), raw_obs_dim, "slot {} observation dim mismatch", i);
            assert_eq!(env.n_actions(), n_actions, "slot {} action count mismatch", i);
        }
        let obs_dim = transform.output_dim(raw_obs_dim);
        Self {
            envs,
            transform,
            raw_obs_dim,
            obs_dim,
            n_actions,
        }
    }

    /// Number of parallel environment slots.
    pub fn n_envs(&self) -> usize {
        self.envs.len()
    }

    /// Observation length after the configured transform.
    pub fn obs_dim(&self) -> usize {
        self.obs_dim
    }

    /// Raw observation length reported by the adapters.
    pub fn raw_obs_dim(&self) -> usize {
        self.raw_obs_dim
    }

    /// Discrete action count.
    pub fn n_actions(&self) -> usize {
        self.n_actions
    }

    /// Reset every slot and return the stacked observations and masks.
    pub fn reset_all(&mut self) -> (Vec<f32>, Vec<bool>) {
        let n = self.envs.len();
        let mut obs = vec![0.0f32; n * self.obs_dim];
        let mut masks = vec![false; n * self.n_actions];
        for i in 0..n {
            let (raw, info) = self.envs[i].reset();
            self.write_slot(&mut obs, &mut masks, i, &raw, &info.action_mask);
        }
        (obs, masks)
    }

    /// Step every slot with its action, auto-resetting terminal slots.
    ///
    /// Action legality is not validated here; the adapter owns that
    /// contract.
    pub fn step(&mut self, actions: &[u32]) -> VecStep {
        let n = self.envs.len();
        assert_eq!(actions.len(), n, "expected one action per environment slot");

        let mut obs = vec![0.0f32; n * self.obs_dim];
        let mut masks = vec![false; n * self.n_actions];
        let mut rewards = vec![0.0f32; n];
        let mut dones = vec![false; n];
        let mut truncations = vec![false; n];
        let mut wins = vec![false; n];
        let mut finals: Vec<Option<FinalReport>> = vec![None; n];

        for i in 0..n {
            let out = self.envs[i].step(actions[i]);
            rewards[i] = out.reward;
            truncations[i] = out.truncated;
            wins[i] = out.info.has_won;
            let done = out.terminated || out.truncated;
            dones[i] = done;

            if done {
                let mut final_obs = vec![0.0f32; self.obs_dim];
                self.transform.apply_into(&out.obs, &mut final_obs);
                finals[i] = Some(FinalReport {
                    obs: final_obs,
                    has_won: out.info.has_won,
                });
                let (raw, info) = self.envs[i].reset();
                self.write_slot(&mut obs, &mut masks, i, &raw, &info.action_mask);
            } else {
                self.write_slot(&mut obs, &mut masks, i, &out.obs, &out.info.action_mask);
            }
        }

        VecStep {
            obs,
            masks,
            rewards,
            dones,
            truncations,
            wins,
            finals,
        }
    }

    fn write_slot(
        &self,
        obs: &mut [f32],
        masks: &mut [bool],
        slot: usize,
        raw: &[f32],
        mask: &[bool],
    ) {
        debug_assert_eq!(raw.len(), self.raw_obs_dim);
        debug_assert_eq!(mask.len(), self.n_actions);
        let start = slot * self.obs_dim;
        self.transform.apply_into(raw, &mut obs[start..start + self.obs_dim]);
        let mstart = slot * self.n_actions;
        masks[mstart..mstart + self.n_actions].copy_from_slice(mask);
    }
}
