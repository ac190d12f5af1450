//! Loss functions for the clipped-objective update.
//!
//! Tensor-valued losses for backpropagation plus a scalar breakdown for
//! reporting. The probability ratio is the plain `exp(new - old)`; if it
//! explodes, the resulting non-finite total loss is surfaced to the caller
//! instead of being clamped away.

use burn::tensor::backend::AutodiffBackend;
use burn::tensor::Tensor;

/// Clipped surrogate objective.
///
/// `L = -mean(min(r * A, clip(r, 1-eps, 1+eps) * A))`
/// with `r = exp(log_probs - old_log_probs)`.
pub fn clipped_surrogate_loss<B: AutodiffBackend>(
    log_probs: Tensor<B, 1>,
    old_log_probs: Tensor<B, 1>,
    advantages: Tensor<B, 1>,
    clip_eps: f32,
) -> Tensor<B, 1> {
    let ratio = (log_probs - old_log_probs).exp();
    let clipped = ratio.clone().clamp(1.0 - clip_eps, 1.0 + clip_eps);

    let surrogate_a = ratio * advantages.clone();
    let surrogate_b = clipped * advantages;

    -surrogate_a.min_pair(surrogate_b).mean()
}

/// Mean squared error between value estimates and return targets.
pub fn value_loss<B: AutodiffBackend>(
    values: Tensor<B, 1>,
    returns: Tensor<B, 1>,
) -> Tensor<B, 1> {
    (values - returns).powf_scalar(2.0).mean()
}

/// Scalar view of one epoch's loss components.
#[derive(Debug, Clone, Copy)]
pub struct LossBreakdown {
    pub total: f32,
    pub policy: f32,
    pub value: f32,
    pub entropy: f32,
    /// Mean probability ratio of the epoch; 1.0 when the policy still
    /// matches the acting snapshot.
    pub mean_ratio: f32,
}

/// Combined objective:
/// `policy_loss + vf_coef * value_loss - entropy_coef * mean(entropy)`.
///
/// The advantage is the standardized return minus the *detached* value
/// estimate; the critic learns through the value loss term only.
pub fn combined_loss<B: AutodiffBackend>(
    log_probs: Tensor<B, 1>,
    old_log_probs: Tensor<B, 1>,
    values: Tensor<B, 1>,
    returns: Tensor<B, 1>,
    entropy: Tensor<B, 1>,
    clip_eps: f32,
    vf_coef: f32,
    entropy_coef: f32,
) -> (Tensor<B, 1>, LossBreakdown) {
    let advantages = returns.clone() - values.clone().detach();

    let policy_loss = clipped_surrogate_loss(
        log_probs.clone(),
        old_log_probs.clone(),
        advantages,
        clip_eps,
    );
    let vf_loss = value_loss(values, returns);
    let mean_entropy = entropy.mean();

    let total = policy_loss.clone() + vf_loss.clone().mul_scalar(vf_coef)
        - mean_entropy.clone().mul_scalar(entropy_coef);

    let mean_ratio = scalar(&(log_probs.detach() - old_log_probs).exp().mean());
    let breakdown = LossBreakdown {
        total: scalar(&total),
        policy: scalar(&policy_loss),
        value: scalar(&vf_loss),
        entropy: scalar(&mean_entropy),
        mean_ratio,
    };

    (total, breakdown)
}

/// Extract the single element of a one-element tensor.
pub(crate) fn scalar<B: AutodiffBackend>(tensor: &Tensor<B, 1>) -> f32 {
    let data = tensor.clone().into_data();
    data.as_slice::<f32>().expect("scalar tensor to host")[0]
}
