//! Metrics sinks for training.
//!
//! The update rule and training loop never log to a global tracker; they
//! write to a `MetricsSink` handed in explicitly. Sinks receive one snapshot
//! per update.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

/// One row of training telemetry, emitted once per update.
#[derive(Debug, Clone)]
pub struct TrainingSnapshot {
    /// Update index (1-based).
    pub update: usize,
    /// Total environment steps collected so far.
    pub env_steps: usize,
    /// Completed episodes so far.
    pub episodes: usize,
    /// Mean return over the recent episode window.
    pub avg_return: f32,
    /// Mean episode length over the recent window.
    pub avg_length: f32,
    /// Win fraction over the recent window.
    pub win_rate: f32,
    /// Combined loss, averaged over the update's epochs.
    pub total_loss: f32,
    /// Policy (surrogate) loss, averaged over epochs.
    pub policy_loss: f32,
    /// Value loss, averaged over epochs.
    pub value_loss: f32,
    /// Mean distribution entropy, averaged over epochs.
    pub entropy: f32,
    /// Mean probability ratio of the first epoch.
    pub mean_ratio: f32,
}

/// Sink for training snapshots.
pub trait MetricsSink: Send {
    /// Record one update's snapshot.
    fn record(&mut self, snapshot: &TrainingSnapshot);

    /// Flush any buffered output.
    fn flush(&mut self);
}

/// Sink that discards everything.
pub struct NullSink;

impl MetricsSink for NullSink {
    fn record(&mut self, _snapshot: &TrainingSnapshot) {}

    fn flush(&mut self) {}
}

/// Console sink with column formatting.
pub struct ConsoleSink {
    log_interval: usize,
    last_logged: usize,
    start_time: Instant,
    show_header: bool,
}

impl ConsoleSink {
    /// Create a console sink that prints every `log_interval` updates.
    pub fn new(log_interval: usize) -> Self {
        Self {
            log_interval: log_interval.max(1),
            last_logged: 0,
            start_time: Instant::now(),
            show_header: true,
        }
    }

    fn print_header(&self) {
        println!(
            "{:>7} {:>10} {:>8} {:>9} {:>7} {:>10} {:>10} {:>9} {:>8}",
            "Update", "EnvSteps", "Episodes", "Return", "Win%", "Policy", "Value", "Entropy", "SPS"
        );
        println!("{}", "-".repeat(88));
    }
}

impl MetricsSink for ConsoleSink {
    fn record(&mut self, snapshot: &TrainingSnapshot) {
        if snapshot.update < self.last_logged + self.log_interval {
            return;
        }

        if self.show_header {
            self.print_header();
            self.show_header = false;
        }

        let elapsed = self.start_time.elapsed().as_secs_f32();
        let sps = if elapsed > 0.0 {
            snapshot.env_steps as f32 / elapsed
        } else {
            0.0
        };

        println!(
            "{:>7} {:>10} {:>8} {:>9.2} {:>7.1} {:>10.4} {:>10.4} {:>9.4} {:>8.0}",
            snapshot.update,
            snapshot.env_steps,
            snapshot.episodes,
            snapshot.avg_return,
            snapshot.win_rate * 100.0,
            snapshot.policy_loss,
            snapshot.value_loss,
            snapshot.entropy,
            sps
        );

        self.last_logged = snapshot.update;
    }

    fn flush(&mut self) {
        // stdout is line-buffered
    }
}

/// CSV file sink for offline analysis.
pub struct CsvSink {
    writer: BufWriter<File>,
    start_time: Instant,
}

impl CsvSink {
    /// Create a CSV sink writing to `path`, with a header row.
    pub fn new(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writeln!(
            writer,
            "update,env_steps,episodes,avg_return,avg_length,win_rate,\
             total_loss,policy_loss,value_loss,entropy,mean_ratio,elapsed_secs"
        )?;
        Ok(Self {
            writer,
            start_time: Instant::now(),
        })
    }
}

impl MetricsSink for CsvSink {
    fn record(&mut self, snapshot: &TrainingSnapshot) {
        let elapsed = self.start_time.elapsed().as_secs_f32();
        let _ = writeln!(
            self.writer,
            "{},{},{},{},{},{},{},{},{},{},{},{}",
            snapshot.update,
            snapshot.env_steps,
            snapshot.episodes,
            snapshot.avg_return,
            snapshot.avg_length,
            snapshot.win_rate,
            snapshot.total_loss,
            snapshot.policy_loss,
            snapshot.value_loss,
            snapshot.entropy,
            snapshot.mean_ratio,
            elapsed
        );
    }

    fn flush(&mut self) {
        let _ = self.writer.flush();
    }
}

/// Fan-out sink.
pub struct MultiSink {
    sinks: Vec<Box<dyn MetricsSink>>,
}

impl MultiSink {
    /// Combine several sinks into one.
    pub fn new(sinks: Vec<Box<dyn MetricsSink>>) -> Self {
        Self { sinks }
    }
}

impl MetricsSink for MultiSink {
    fn record(&mut self, snapshot: &TrainingSnapshot) {
        for sink in self.sinks.iter_mut() {
            sink.record(snapshot);
        }
    }

    fn flush(&mut self) {
        for sink in self.sinks.iter_mut() {
            sink.flush();
        }
    }
}
