//! Masked actor-critic network.
//!
//! A shared two-layer ReLU trunk feeds a linear policy head (action logits)
//! and a linear value head (scalar state value). Legality masking overwrites
//! illegal logits with a large negative sentinel *before* softmax, so
//! illegal actions receive near-zero probability without a variable-size
//! renormalization, and log-probability/entropy stay differentiable with
//! respect to the trunk parameters.

use burn::module::Module;
use burn::nn::{Linear, LinearConfig, Relu};
use burn::tensor::activation::softmax;
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor, TensorData};

/// Sentinel written over illegal logits before softmax.
///
/// Finite on purpose: `exp` underflows it to exactly zero probability while
/// the masked sum stays NaN-free.
pub const MASK_SENTINEL: f32 = -1.0e8;

/// Probability floor used inside log computations.
const PROB_EPS: f32 = 1e-8;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for [`MaskedActorCritic`].
#[derive(Debug, Clone)]
pub struct ActorCriticConfig {
    /// Observation vector length.
    pub obs_dim: usize,
    /// Discrete action count.
    pub n_actions: usize,
    /// Hidden width of the shared trunk.
    pub hidden_size: usize,
}

impl ActorCriticConfig {
    /// Create a configuration with the default trunk width.
    pub fn new(obs_dim: usize, n_actions: usize) -> Self {
        Self {
            obs_dim,
            n_actions,
            hidden_size: 128,
        }
    }

    /// Set the trunk width.
    pub fn with_hidden_size(mut self, size: usize) -> Self {
        self.hidden_size = size;
        self
    }

    /// Initialize the network on the given device.
    pub fn init<B: Backend>(&self, device: &B::Device) -> MaskedActorCritic<B> {
        MaskedActorCritic {
            actor: ActorNet {
                fc1: LinearConfig::new(self.obs_dim, self.hidden_size).init(device),
                fc2: LinearConfig::new(self.hidden_size, self.hidden_size).init(device),
                head: LinearConfig::new(self.hidden_size, self.n_actions).init(device),
                activation: Relu::new(),
            },
            critic: LinearConfig::new(self.hidden_size, 1).init(device),
        }
    }
}

// ============================================================================
// Network
// ============================================================================

/// Trunk plus policy head.
///
/// Kept as one submodule so the actor parameter group (optimized at the
/// actor learning rate) is addressable as a unit.
#[derive(Module, Debug)]
pub struct ActorNet<B: Backend> {
    pub fc1: Linear<B>,
    pub fc2: Linear<B>,
    pub head: Linear<B>,
    activation: Relu,
}

impl<B: Backend> ActorNet<B> {
    /// Shared trunk features for a batch of observations `[batch, obs_dim]`.
    pub fn features(&self, obs: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.activation.forward(self.fc1.forward(obs));
        self.activation.forward(self.fc2.forward(x))
    }
}

/// Actor-critic network with shared trunk.
#[derive(Module, Debug)]
pub struct MaskedActorCritic<B: Backend> {
    /// Trunk and policy head (the actor parameter group).
    pub actor: ActorNet<B>,
    /// Value head over the shared trunk features (the critic group).
    pub critic: Linear<B>,
}

impl<B: Backend> MaskedActorCritic<B> {
    /// Forward pass: raw action logits `[batch, n_actions]` and value
    /// estimates `[batch, 1]`.
    pub fn forward(&self, obs: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let features = self.actor.features(obs);
        let logits = self.actor.head.forward(features.clone());
        let values = self.critic.forward(features);
        (logits, values)
    }

    /// Forward pass with legality masking already applied to the logits.
    ///
    /// `mask` is a float tensor `[batch, n_actions]` with 1.0 = legal.
    pub fn forward_masked(
        &self,
        obs: Tensor<B, 2>,
        mask: Tensor<B, 2>,
    ) -> (MaskedPolicyOutput<B>, Tensor<B, 2>) {
        let (logits, values) = self.forward(obs);
        (MaskedPolicyOutput::new(mask_logits(logits, mask)), values)
    }

    /// Observation length expected by the trunk.
    pub fn obs_dim(&self) -> usize {
        self.actor.fc1.weight.val().dims()[0]
    }

    /// Size of the action space produced by the policy head.
    pub fn n_actions(&self) -> usize {
        self.actor.head.weight.val().dims()[1]
    }

    /// Trunk width.
    pub fn hidden_size(&self) -> usize {
        self.actor.fc1.weight.val().dims()[1]
    }
}

// ============================================================================
// Masking
// ============================================================================

/// Overwrite illegal logits with [`MASK_SENTINEL`].
///
/// `mask` holds 1.0 for legal and 0.0 for illegal positions. The arithmetic
/// form keeps the operation differentiable through the legal logits.
pub fn mask_logits<B: Backend>(logits: Tensor<B, 2>, mask: Tensor<B, 2>) -> Tensor<B, 2> {
    let sentinel = (Tensor::ones_like(&mask) - mask.clone()).mul_scalar(MASK_SENTINEL);
    mask * logits + sentinel
}

/// Build a float mask tensor `[rows, n_actions]` from stacked booleans.
///
/// # Panics
///
/// Panics if any row has no legal action. A decision with an empty legal set
/// violates the adapter contract and is not recoverable here.
pub fn mask_tensor_from<B: Backend>(
    mask: &[bool],
    rows: usize,
    n_actions: usize,
    device: &B::Device,
) -> Tensor<B, 2> {
    debug_assert_eq!(mask.len(), rows * n_actions);
    for row in 0..rows {
        let start = row * n_actions;
        assert!(
            mask[start..start + n_actions].iter().any(|&m| m),
            "decision row {} has no legal action; adapter mask contract violated",
            row
        );
    }
    let floats: Vec<f32> = mask.iter().map(|&m| if m { 1.0 } else { 0.0 }).collect();
    Tensor::from_data(TensorData::new(floats, [rows, n_actions]), device)
}

// ============================================================================
// Policy output
// ============================================================================

/// Categorical policy output over masked logits.
///
/// Provides sampling for collection (detached, CPU-side) and
/// log-probability/entropy with gradient flow for optimization.
#[derive(Clone)]
pub struct MaskedPolicyOutput<B: Backend> {
    /// Masked, unnormalized log probabilities: `[batch, n_actions]`.
    pub logits: Tensor<B, 2>,
}

impl<B: Backend> MaskedPolicyOutput<B> {
    /// Wrap masked logits.
    pub fn new(logits: Tensor<B, 2>) -> Self {
        Self { logits }
    }

    /// Probabilities (softmax of the masked logits).
    pub fn probs(&self) -> Tensor<B, 2> {
        softmax(self.logits.clone(), 1)
    }

    /// Number of actions.
    pub fn n_actions(&self) -> usize {
        self.logits.dims()[1]
    }

    /// Batch size.
    pub fn batch_size(&self) -> usize {
        self.logits.dims()[0]
    }

    /// Sample one action per row and return the actions with their log
    /// probabilities.
    ///
    /// Illegal positions carry exactly zero probability after the sentinel
    /// and are never selected; the rounding fallback lands on the last
    /// positive-probability index of the row.
    pub fn sample(&self) -> (Vec<u32>, Vec<f32>) {
        let probs = self.probs();
        let probs_data = probs.to_data();
        let probs_slice: &[f32] = probs_data.as_slice().expect("probs to host slice");

        let batch_size = self.batch_size();
        let n_actions = self.n_actions();

        let mut actions = Vec::with_capacity(batch_size);
        let mut log_probs = Vec::with_capacity(batch_size);

        for i in 0..batch_size {
            let row = &probs_slice[i * n_actions..(i + 1) * n_actions];
            let rand_val = fastrand::f32();
            let mut cumsum = 0.0f32;
            let mut selected = None;
            let mut last_positive = 0usize;

            for (a, &p) in row.iter().enumerate() {
                if p <= 0.0 {
                    continue;
                }
                last_positive = a;
                cumsum += p;
                if rand_val < cumsum {
                    selected = Some(a);
                    break;
                }
            }
            // Probabilities can sum to slightly below 1.0; fall back to the
            // last index that carries mass.
            let selected = selected.unwrap_or(last_positive);

            actions.push(selected as u32);
            log_probs.push((row[selected] + PROB_EPS).ln());
        }

        (actions, log_probs)
    }

    /// Deterministic action per row: the highest-probability legal index.
    pub fn greedy(&self) -> Vec<u32> {
        let probs = self.probs();
        let probs_data = probs.to_data();
        let probs_slice: &[f32] = probs_data.as_slice().expect("probs to host slice");

        let n_actions = self.n_actions();
        (0..self.batch_size())
            .map(|i| {
                let row = &probs_slice[i * n_actions..(i + 1) * n_actions];
                let mut best = 0usize;
                for (a, &p) in row.iter().enumerate() {
                    if p > row[best] {
                        best = a;
                    }
                }
                best as u32
            })
            .collect()
    }

    /// Log probabilities for the given actions, with gradient flow.
    pub fn log_prob(&self, actions: &[u32], device: &B::Device) -> Tensor<B, 1> {
        let batch_size = actions.len();
        let probs = self.probs();

        let action_indices: Vec<i32> = actions.iter().map(|&a| a as i32).collect();
        let actions_tensor: Tensor<B, 1, Int> =
            Tensor::from_ints(action_indices.as_slice(), device);
        let actions_2d: Tensor<B, 2, Int> = actions_tensor.reshape([batch_size, 1]);

        let selected: Tensor<B, 1> = probs.gather(1, actions_2d).flatten(0, 1);
        (selected + PROB_EPS).log()
    }

    /// Per-row distribution entropy, with gradient flow.
    ///
    /// Zero-probability (illegal) entries contribute nothing to the sum.
    pub fn entropy(&self) -> Tensor<B, 1> {
        let probs = self.probs();
        let log_probs = (probs.clone() + PROB_EPS).log();
        let neg_entropy: Tensor<B, 2> = (probs * log_probs).sum_dim(1);
        -neg_entropy.flatten(0, 1)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    fn output_from(logits: Vec<f32>, mask: Vec<bool>, rows: usize, n_actions: usize) -> MaskedPolicyOutput<B> {
        let device = Default::default();
        let logits: Tensor<B, 2> =
            Tensor::from_data(TensorData::new(logits, [rows, n_actions]), &device);
        let mask = mask_tensor_from::<B>(&mask, rows, n_actions, &device);
        MaskedPolicyOutput::new(mask_logits(logits, mask))
    }

    #[test]
    fn test_forward_shapes() {
        let device = Default::default();
        let model = ActorCriticConfig::new(6, 4).with_hidden_size(16).init::<B>(&device);

        let obs = Tensor::<B, 2>::zeros([3, 6], &device);
        let (logits, values) = model.forward(obs);

        assert_eq!(logits.dims(), [3, 4]);
        assert_eq!(values.dims(), [3, 1]);
        assert_eq!(model.obs_dim(), 6);
        assert_eq!(model.n_actions(), 4);
        assert_eq!(model.hidden_size(), 16);
    }

    #[test]
    fn test_sampling_never_selects_illegal_action() {
        // Bias the raw logits hard toward the illegal actions.
        let output = output_from(
            vec![50.0, -1.0, 50.0, -1.0],
            vec![false, true, false, true],
            1,
            4,
        );

        for _ in 0..256 {
            let (actions, log_probs) = output.sample();
            assert!(actions[0] == 1 || actions[0] == 3, "sampled illegal action {}", actions[0]);
            assert!(log_probs[0].is_finite());
        }
    }

    #[test]
    fn test_masked_probabilities_are_zero_for_illegal() {
        let output = output_from(vec![1.0, 2.0, 3.0], vec![true, false, true], 1, 3);
        let probs = output.probs().into_data();
        let probs = probs.as_slice::<f32>().unwrap();

        assert_eq!(probs[1], 0.0);
        assert!((probs[0] + probs[2] - 1.0).abs() < 1e-5);
    }

    #[test]
    #[should_panic(expected = "no legal action")]
    fn test_all_illegal_row_panics() {
        let device = Default::default();
        mask_tensor_from::<B>(&[true, true, false, false], 2, 2, &device);
    }

    #[test]
    fn test_entropy_ordering() {
        let uniform = output_from(vec![1.0, 1.0, 1.0], vec![true, true, true], 1, 3);
        let peaked = output_from(vec![10.0, 0.0, 0.0], vec![true, true, true], 1, 3);

        let h_uniform = uniform.entropy().into_data().as_slice::<f32>().unwrap()[0];
        let h_peaked = peaked.entropy().into_data().as_slice::<f32>().unwrap()[0];
        assert!(h_uniform > h_peaked);
    }

    #[test]
    fn test_entropy_of_single_legal_action_is_zero() {
        let output = output_from(vec![0.3, 0.9, -0.2], vec![false, true, false], 1, 3);
        let h = output.entropy().into_data().as_slice::<f32>().unwrap()[0];
        assert!(h.abs() < 1e-4, "expected ~0 entropy, got {}", h);
    }

    #[test]
    fn test_log_prob_matches_sampled_log_prob() {
        let device = Default::default();
        let output = output_from(vec![0.5, 1.5, -0.5], vec![true, true, true], 1, 3);

        let (actions, sampled_lp) = output.sample();
        let evaluated = output.log_prob(&actions, &device).into_data();
        let evaluated = evaluated.as_slice::<f32>().unwrap();
        assert!((sampled_lp[0] - evaluated[0]).abs() < 1e-5);
    }

    #[test]
    fn test_greedy_is_highest_probability_legal_index() {
        let output = output_from(
            vec![9.0, 1.0, 2.0, 0.0],
            vec![false, true, true, true],
            1,
            4,
        );
        assert_eq!(output.greedy(), vec![2]);
    }
}
