//! Checkpointing for training and inference.
//!
//! A checkpoint is a model weight record (Burn binary recorder), the
//! optimizer records, and a JSON hyperparameter sidecar holding everything
//! needed to rebuild the agent for resumed training or inference-only use.
//! Exact byte layout is the recorder's concern.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings, Record, Recorder};
use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};

use crate::actor_critic::MaskedActorCritic;
use crate::config::TrainConfig;
use crate::env::ObsTransform;

/// Configuration for the checkpointer.
#[derive(Debug, Clone)]
pub struct CheckpointerConfig {
    /// Directory to store checkpoints.
    pub checkpoint_dir: PathBuf,
    /// Environment steps between checkpoint saves.
    pub save_interval: usize,
    /// Number of recent checkpoints to keep (0 = keep all).
    pub keep_last_n: usize,
    /// Whether to track and save the best model.
    pub save_best: bool,
}

impl Default for CheckpointerConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: PathBuf::from("./checkpoints"),
            save_interval: 10_000,
            keep_last_n: 5,
            save_best: true,
        }
    }
}

impl CheckpointerConfig {
    /// Create a new config with the given checkpoint directory.
    pub fn new(checkpoint_dir: impl Into<PathBuf>) -> Self {
        Self {
            checkpoint_dir: checkpoint_dir.into(),
            ..Default::default()
        }
    }

    /// Set the save interval in environment steps.
    pub fn with_save_interval(mut self, interval: usize) -> Self {
        self.save_interval = interval;
        self
    }

    /// Set the number of checkpoints to keep.
    pub fn with_keep_last_n(mut self, n: usize) -> Self {
        self.keep_last_n = n;
        self
    }

    /// Enable or disable best-model tracking.
    pub fn with_save_best(mut self, save_best: bool) -> Self {
        self.save_best = save_best;
        self
    }
}

/// Error type for checkpointing operations.
#[derive(Debug)]
pub enum CheckpointError {
    /// IO error during save/load.
    Io(io::Error),
    /// Burn recorder error.
    Recorder(String),
    /// Hyperparameter sidecar could not be read or written.
    Hyperparameters(String),
    /// No checkpoints found.
    NoCheckpoints,
    /// Stored weights do not fit the requested architecture.
    ArchitectureMismatch {
        expected: Hyperparameters,
        found: Hyperparameters,
    },
}

impl std::fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckpointError::Io(e) => write!(f, "IO error: {}", e),
            CheckpointError::Recorder(e) => write!(f, "Recorder error: {}", e),
            CheckpointError::Hyperparameters(e) => write!(f, "Hyperparameter error: {}", e),
            CheckpointError::NoCheckpoints => write!(f, "No checkpoints found"),
            CheckpointError::ArchitectureMismatch { expected, found } => write!(
                f,
                "architecture mismatch: expected obs_dim={} n_actions={} hidden={}, \
                 checkpoint has obs_dim={} n_actions={} hidden={}",
                expected.obs_dim,
                expected.n_actions,
                expected.hidden_size,
                found.obs_dim,
                found.n_actions,
                found.hidden_size
            ),
        }
    }
}

impl std::error::Error for CheckpointError {}

impl From<io::Error> for CheckpointError {
    fn from(e: io::Error) -> Self {
        CheckpointError::Io(e)
    }
}

/// Hyperparameters persisted alongside the weights.
///
/// Enough to rebuild the network and the training window for resume, or
/// just the network for inference-only use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    pub obs_dim: usize,
    pub n_actions: usize,
    pub hidden_size: usize,
    pub n_envs: usize,
    pub rollout_steps: usize,
    pub k_epochs: usize,
    pub gamma: f32,
    pub clip_eps: f32,
    pub lr_actor: f64,
    pub lr_critic: f64,
    pub vf_coef: f32,
    pub entropy_coef: f32,
    pub obs_transform: ObsTransform,
}

impl From<&TrainConfig> for Hyperparameters {
    fn from(config: &TrainConfig) -> Self {
        Self {
            obs_dim: config.obs_dim,
            n_actions: config.n_actions,
            hidden_size: config.hidden_size,
            n_envs: config.n_envs,
            rollout_steps: config.rollout_steps,
            k_epochs: config.k_epochs,
            gamma: config.gamma,
            clip_eps: config.clip_eps,
            lr_actor: config.lr_actor,
            lr_critic: config.lr_critic,
            vf_coef: config.vf_coef,
            entropy_coef: config.entropy_coef,
            obs_transform: config.obs_transform,
        }
    }
}

impl Hyperparameters {
    /// Rebuild a training configuration with the given step budget.
    pub fn to_config(&self, max_env_steps: usize) -> TrainConfig {
        TrainConfig {
            n_envs: self.n_envs,
            rollout_steps: self.rollout_steps,
            k_epochs: self.k_epochs,
            obs_dim: self.obs_dim,
            n_actions: self.n_actions,
            hidden_size: self.hidden_size,
            gamma: self.gamma,
            clip_eps: self.clip_eps,
            lr_actor: self.lr_actor,
            lr_critic: self.lr_critic,
            vf_coef: self.vf_coef,
            entropy_coef: self.entropy_coef,
            max_env_steps,
            obs_transform: self.obs_transform,
        }
    }

    fn architecture(&self) -> (usize, usize, usize) {
        (self.obs_dim, self.n_actions, self.hidden_size)
    }
}

/// Checkpoint metadata.
#[derive(Debug, Clone)]
pub struct CheckpointInfo {
    /// Path to the checkpoint weight file.
    pub path: PathBuf,
    /// Environment step at which the checkpoint was saved.
    pub step: usize,
    /// Optional metric value (e.g. average return).
    pub metric: Option<f32>,
}

/// Model checkpointer.
///
/// Handles saving at regular intervals, tracking the best model, and
/// cleaning up old checkpoints.
pub struct Checkpointer {
    config: CheckpointerConfig,
    best_metric: f32,
    checkpoint_history: Vec<CheckpointInfo>,
}

impl Checkpointer {
    /// Create a new checkpointer, creating the directory if needed.
    ///
    /// An uncreatable checkpoint directory is fatal here, before any
    /// training starts.
    pub fn new(config: CheckpointerConfig) -> Result<Self, CheckpointError> {
        fs::create_dir_all(&config.checkpoint_dir)?;

        Ok(Self {
            config,
            best_metric: f32::NEG_INFINITY,
            checkpoint_history: Vec::new(),
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &CheckpointerConfig {
        &self.config
    }

    /// Whether a save is due at this environment step.
    pub fn should_save(&self, step: usize) -> bool {
        step > 0 && step % self.config.save_interval == 0
    }

    /// Save model weights and the hyperparameter sidecar.
    pub fn save<B: Backend>(
        &mut self,
        model: &MaskedActorCritic<B>,
        hyperparameters: &Hyperparameters,
        step: usize,
        metric: Option<f32>,
    ) -> Result<PathBuf, CheckpointError> {
        let filename = format!("checkpoint_{:08}.bin", step);
        let path = self.config.checkpoint_dir.join(&filename);

        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        model
            .clone()
            .save_file(&path, &recorder)
            .map_err(|e| CheckpointError::Recorder(e.to_string()))?;
        self.write_hyperparameters(&path, hyperparameters)?;

        let info = CheckpointInfo {
            path: path.clone(),
            step,
            metric,
        };
        self.checkpoint_history.push(info);

        if self.config.save_best {
            if let Some(m) = metric {
                if m > self.best_metric {
                    self.best_metric = m;
                    let best_path = self.config.checkpoint_dir.join("best.bin");
                    model
                        .clone()
                        .save_file(&best_path, &recorder)
                        .map_err(|e| CheckpointError::Recorder(e.to_string()))?;
                    self.write_hyperparameters(&best_path, hyperparameters)?;
                }
            }
        }

        self.cleanup_old_checkpoints();

        Ok(path)
    }

    /// Save an optimizer state record next to the weights.
    ///
    /// `tag` distinguishes the records of the two parameter groups.
    pub fn save_optimizer<B: Backend, R: Record<B>>(
        &self,
        record: R,
        step: usize,
        tag: &str,
    ) -> Result<PathBuf, CheckpointError> {
        let filename = format!("optimizer_{}_{:08}.bin", tag, step);
        let path = self.config.checkpoint_dir.join(&filename);
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        recorder
            .record(record, path.clone())
            .map_err(|e| CheckpointError::Recorder(e.to_string()))?;
        Ok(path)
    }

    /// Load an optimizer state record.
    pub fn load_optimizer<B: Backend, R: Record<B>>(
        &self,
        path: &Path,
        device: &B::Device,
    ) -> Result<R, CheckpointError> {
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        recorder
            .load(path.to_path_buf(), device)
            .map_err(|e| CheckpointError::Recorder(e.to_string()))
    }

    /// Load model weights into a template of the expected architecture.
    ///
    /// The sidecar (when present) is checked against the template first;
    /// mismatched architectures fail before the recorder runs.
    pub fn load<B: Backend>(
        &self,
        model_template: MaskedActorCritic<B>,
        path: &Path,
        device: &B::Device,
    ) -> Result<MaskedActorCritic<B>, CheckpointError> {
        let sidecar = Self::hyperparameters_path(path);
        if sidecar.exists() {
            let found = self.load_hyperparameters(path)?;
            let expected = (
                model_template.obs_dim(),
                model_template.n_actions(),
                model_template.hidden_size(),
            );
            if found.architecture() != expected {
                let mut expected_params = found.clone();
                expected_params.obs_dim = expected.0;
                expected_params.n_actions = expected.1;
                expected_params.hidden_size = expected.2;
                return Err(CheckpointError::ArchitectureMismatch {
                    expected: expected_params,
                    found,
                });
            }
        }

        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        model_template
            .load_file(path, &recorder, device)
            .map_err(|e| CheckpointError::Recorder(e.to_string()))
    }

    /// Load the hyperparameter sidecar of a checkpoint.
    pub fn load_hyperparameters(&self, path: &Path) -> Result<Hyperparameters, CheckpointError> {
        let sidecar = Self::hyperparameters_path(path);
        let contents = fs::read_to_string(sidecar)?;
        serde_json::from_str(&contents)
            .map_err(|e| CheckpointError::Hyperparameters(e.to_string()))
    }

    /// Load the best model.
    pub fn load_best<B: Backend>(
        &self,
        model_template: MaskedActorCritic<B>,
        device: &B::Device,
    ) -> Result<MaskedActorCritic<B>, CheckpointError> {
        let best_path = self.config.checkpoint_dir.join("best.bin");
        if !best_path.exists() {
            return Err(CheckpointError::NoCheckpoints);
        }
        self.load(model_template, &best_path, device)
    }

    /// Load the latest checkpoint, returning the model and its step.
    pub fn load_latest<B: Backend>(
        &self,
        model_template: MaskedActorCritic<B>,
        device: &B::Device,
    ) -> Result<(MaskedActorCritic<B>, usize), CheckpointError> {
        let latest = self.find_latest_checkpoint()?;
        let model = self.load(model_template, &latest.path, device)?;
        Ok((model, latest.step))
    }

    /// Find the most recent checkpoint in the directory.
    pub fn find_latest_checkpoint(&self) -> Result<CheckpointInfo, CheckpointError> {
        let mut checkpoints = self.list_checkpoints()?;
        checkpoints.pop().ok_or(CheckpointError::NoCheckpoints)
    }

    /// List all checkpoints in the directory, oldest first.
    pub fn list_checkpoints(&self) -> Result<Vec<CheckpointInfo>, CheckpointError> {
        let mut checkpoints: Vec<CheckpointInfo> = fs::read_dir(&self.config.checkpoint_dir)?
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let path = e.path();
                let filename = path.file_name()?.to_str()?;
                if filename.starts_with("checkpoint_") && filename.ends_with(".bin") {
                    let step = filename
                        .strip_prefix("checkpoint_")?
                        .strip_suffix(".bin")?
                        .parse()
                        .ok()?;
                    Some(CheckpointInfo {
                        path,
                        step,
                        metric: None,
                    })
                } else {
                    None
                }
            })
            .collect();

        checkpoints.sort_by_key(|c| c.step);
        Ok(checkpoints)
    }

    /// Get the current best metric value.
    pub fn best_metric(&self) -> f32 {
        self.best_metric
    }

    fn hyperparameters_path(model_path: &Path) -> PathBuf {
        model_path.with_extension("json")
    }

    fn write_hyperparameters(
        &self,
        model_path: &Path,
        hyperparameters: &Hyperparameters,
    ) -> Result<(), CheckpointError> {
        let contents = serde_json::to_string_pretty(hyperparameters)
            .map_err(|e| CheckpointError::Hyperparameters(e.to_string()))?;
        fs::write(Self::hyperparameters_path(model_path), contents)?;
        Ok(())
    }

    fn cleanup_old_checkpoints(&mut self) {
        if self.config.keep_last_n == 0 {
            return;
        }

        while self.checkpoint_history.len() > self.config.keep_last_n {
            let old = self.checkpoint_history.remove(0);
            let _ = fs::remove_file(&old.path);
            let _ = fs::remove_file(Self::hyperparameters_path(&old.path));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor_critic::ActorCriticConfig;
    use burn::backend::NdArray;
    use burn::tensor::{Tensor, TensorData};
    use tempfile::tempdir;

    type B = NdArray<f32>;

    fn hyperparameters() -> Hyperparameters {
        Hyperparameters::from(&TrainConfig::new(2, 4, 3).with_hidden_size(8))
    }

    #[test]
    fn test_checkpointer_config() {
        let config = CheckpointerConfig::new("./test_ckpts")
            .with_save_interval(5000)
            .with_keep_last_n(3)
            .with_save_best(false);

        assert_eq!(config.checkpoint_dir, PathBuf::from("./test_ckpts"));
        assert_eq!(config.save_interval, 5000);
        assert_eq!(config.keep_last_n, 3);
        assert!(!config.save_best);
    }

    #[test]
    fn test_should_save() {
        let dir = tempdir().unwrap();
        let config = CheckpointerConfig::new(dir.path()).with_save_interval(100);
        let checkpointer = Checkpointer::new(config).unwrap();

        assert!(!checkpointer.should_save(0));
        assert!(!checkpointer.should_save(50));
        assert!(checkpointer.should_save(100));
        assert!(!checkpointer.should_save(150));
        assert!(checkpointer.should_save(200));
    }

    #[test]
    fn test_checkpoint_dir_creation() {
        let dir = tempdir().unwrap();
        let subdir = dir.path().join("nested/checkpoints");

        let config = CheckpointerConfig::new(&subdir);
        let _checkpointer = Checkpointer::new(config).unwrap();

        assert!(subdir.exists());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempdir().unwrap();
        let mut checkpointer =
            Checkpointer::new(CheckpointerConfig::new(dir.path())).unwrap();
        let device = Default::default();

        let model = ActorCriticConfig::new(4, 3).with_hidden_size(8).init::<B>(&device);
        let path = checkpointer
            .save(&model, &hyperparameters(), 100, Some(1.0))
            .unwrap();

        let template = ActorCriticConfig::new(4, 3).with_hidden_size(8).init::<B>(&device);
        let loaded = checkpointer.load(template, &path, &device).unwrap();

        // Same weights produce the same outputs.
        let obs: Tensor<B, 2> =
            Tensor::from_data(TensorData::new(vec![0.1f32; 8], [2, 4]), &device);
        let (logits_a, values_a) = model.forward(obs.clone());
        let (logits_b, values_b) = loaded.forward(obs);

        let a = logits_a.into_data();
        let b = logits_b.into_data();
        assert_eq!(a.as_slice::<f32>().unwrap(), b.as_slice::<f32>().unwrap());
        let va = values_a.into_data();
        let vb = values_b.into_data();
        assert_eq!(va.as_slice::<f32>().unwrap(), vb.as_slice::<f32>().unwrap());
    }

    #[test]
    fn test_hyperparameters_roundtrip() {
        let dir = tempdir().unwrap();
        let mut checkpointer =
            Checkpointer::new(CheckpointerConfig::new(dir.path())).unwrap();
        let device = Default::default();

        let model = ActorCriticConfig::new(4, 3).with_hidden_size(8).init::<B>(&device);
        let params = hyperparameters();
        let path = checkpointer.save(&model, &params, 50, None).unwrap();

        let loaded = checkpointer.load_hyperparameters(&path).unwrap();
        assert_eq!(loaded, params);

        let config = loaded.to_config(500);
        assert_eq!(config.obs_dim, 4);
        assert_eq!(config.max_env_steps, 500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_architecture_mismatch_is_fatal() {
        let dir = tempdir().unwrap();
        let mut checkpointer =
            Checkpointer::new(CheckpointerConfig::new(dir.path())).unwrap();
        let device = Default::default();

        let model = ActorCriticConfig::new(4, 3).with_hidden_size(8).init::<B>(&device);
        let path = checkpointer
            .save(&model, &hyperparameters(), 10, None)
            .unwrap();

        // Template with a different observation width.
        let template = ActorCriticConfig::new(6, 3).with_hidden_size(8).init::<B>(&device);
        let result = checkpointer.load(template, &path, &device);
        assert!(matches!(
            result,
            Err(CheckpointError::ArchitectureMismatch { .. })
        ));
    }

    #[test]
    fn test_latest_and_cleanup() {
        let dir = tempdir().unwrap();
        let config = CheckpointerConfig::new(dir.path()).with_keep_last_n(2);
        let mut checkpointer = Checkpointer::new(config).unwrap();
        let device = Default::default();
        let model = ActorCriticConfig::new(4, 3).with_hidden_size(8).init::<B>(&device);

        for step in [10usize, 20, 30] {
            checkpointer
                .save(&model, &hyperparameters(), step, None)
                .unwrap();
        }

        let listed = checkpointer.list_checkpoints().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].step, 20);
        assert_eq!(checkpointer.find_latest_checkpoint().unwrap().step, 30);
    }

    #[test]
    fn test_optimizer_record_roundtrip() {
        use burn::backend::Autodiff;
        use burn::optim::{AdamConfig, Optimizer};

        type AB = Autodiff<NdArray<f32>>;

        let dir = tempdir().unwrap();
        let checkpointer = Checkpointer::new(CheckpointerConfig::new(dir.path())).unwrap();
        let device = Default::default();

        let optim = AdamConfig::new().init::<AB, MaskedActorCritic<AB>>();
        let path = checkpointer
            .save_optimizer::<AB, _>(optim.to_record(), 10, "actor")
            .unwrap();
        assert!(path.exists());

        let record = checkpointer.load_optimizer::<AB, _>(&path, &device).unwrap();
        let _optim = optim.load_record(record);
    }

    #[test]
    fn test_load_best_without_best_errors() {
        let dir = tempdir().unwrap();
        let checkpointer = Checkpointer::new(CheckpointerConfig::new(dir.path())).unwrap();
        let device = Default::default();
        let template = ActorCriticConfig::new(4, 3).with_hidden_size(8).init::<B>(&device);

        assert!(matches!(
            checkpointer.load_best(template, &device),
            Err(CheckpointError::NoCheckpoints)
        ));
    }
}
