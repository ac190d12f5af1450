//! Per-slot episode bookkeeping.
//!
//! Each environment slot carries its own running return, length and win
//! accumulators. A slot's accumulators are read out and zeroed exactly when
//! that slot reports done; other slots are unaffected, so slots finishing on
//! different steps are the normal case.

use std::collections::VecDeque;

/// Completed-episode summary for one slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeSummary {
    /// Which environment slot finished.
    pub slot: usize,
    /// Sum of rewards over the episode.
    pub episode_return: f32,
    /// Number of steps in the episode.
    pub length: usize,
    /// Whether the controlled player won.
    pub won: bool,
}

/// Aggregate view over recently completed episodes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeProgress {
    /// Total completed episodes since construction.
    pub episodes: usize,
    /// Mean return over the recent window.
    pub avg_return: f32,
    /// Mean length over the recent window.
    pub avg_length: f32,
    /// Win fraction over the recent window.
    pub win_rate: f32,
}

/// Tracks per-slot episode accumulators across a vectorized rollout.
pub struct EpisodeTracker {
    returns: Vec<f32>,
    lengths: Vec<usize>,
    wins: Vec<bool>,
    completed: usize,
    recent: VecDeque<EpisodeSummary>,
    window: usize,
}

impl EpisodeTracker {
    /// Default size of the recent-episode window.
    pub const RECENT_WINDOW: usize = 100;

    /// Create a tracker for `n_envs` slots.
    pub fn new(n_envs: usize) -> Self {
        Self {
            returns: vec![0.0; n_envs],
            lengths: vec![0; n_envs],
            wins: vec![false; n_envs],
            completed: 0,
            recent: VecDeque::with_capacity(Self::RECENT_WINDOW),
            window: Self::RECENT_WINDOW,
        }
    }

    /// Number of tracked slots.
    pub fn n_envs(&self) -> usize {
        self.returns.len()
    }

    /// Accumulate one step for one slot.
    pub fn observe(&mut self, slot: usize, reward: f32, won: bool) {
        self.returns[slot] += reward;
        self.lengths[slot] += 1;
        self.wins[slot] |= won;
    }

    /// Read out and zero one slot's accumulators.
    pub fn finish(&mut self, slot: usize) -> EpisodeSummary {
        let summary = EpisodeSummary {
            slot,
            episode_return: self.returns[slot],
            length: self.lengths[slot],
            won: self.wins[slot],
        };
        self.returns[slot] = 0.0;
        self.lengths[slot] = 0;
        self.wins[slot] = false;

        self.completed += 1;
        if self.recent.len() == self.window {
            self.recent.pop_front();
        }
        self.recent.push_back(summary);

        summary
    }

    /// Accumulate one vectorized step and emit summaries for slots that
    /// finished on it.
    pub fn observe_step(
        &mut self,
        rewards: &[f32],
        dones: &[bool],
        wins: &[bool],
    ) -> Vec<EpisodeSummary> {
        debug_assert_eq!(rewards.len(), self.returns.len());
        debug_assert_eq!(dones.len(), self.returns.len());
        debug_assert_eq!(wins.len(), self.returns.len());

        let mut finished = Vec::new();
        for slot in 0..self.returns.len() {
            self.observe(slot, rewards[slot], wins[slot]);
            if dones[slot] {
                finished.push(self.finish(slot));
            }
        }
        finished
    }

    /// Total completed episodes.
    pub fn episodes(&self) -> usize {
        self.completed
    }

    /// Aggregate view over the recent window.
    pub fn progress(&self) -> EpisodeProgress {
        if self.recent.is_empty() {
            return EpisodeProgress {
                episodes: self.completed,
                avg_return: 0.0,
                avg_length: 0.0,
                win_rate: 0.0,
            };
        }
        let n = self.recent.len() as f32;
        EpisodeProgress {
            episodes: self.completed,
            avg_return: self.recent.iter().map(|s| s.episode_return).sum::<f32>() / n,
            avg_length: self.recent.iter().map(|s| s.length as f32).sum::<f32>() / n,
            win_rate: self.recent.iter().filter(|s| s.won).count() as f32 / n,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_independent_slot_termination() {
        let mut tracker = EpisodeTracker::new(2);

        // Slot 0 finishes at step 5, slot 1 keeps going through step 8.
        for step in 1..=8 {
            let dones = [step == 5, false];
            let finished = tracker.observe_step(&[1.0, 2.0], &dones, &[step == 5, false]);

            if step == 5 {
                assert_eq!(finished.len(), 1);
                let summary = finished[0];
                assert_eq!(summary.slot, 0);
                assert_eq!(summary.episode_return, 5.0);
                assert_eq!(summary.length, 5);
                assert!(summary.won);
            } else {
                assert!(finished.is_empty());
            }
        }

        // Slot 1 was never reset and slot 0 restarted cleanly after step 5.
        let finished = tracker.observe_step(&[1.0, 2.0], &[false, true], &[false, false]);
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].slot, 1);
        assert_eq!(finished[0].episode_return, 2.0 * 9.0);
        assert_eq!(finished[0].length, 9);
        assert!(!finished[0].won);
    }

    #[test]
    fn test_finish_resets_only_that_slot() {
        let mut tracker = EpisodeTracker::new(3);
        tracker.observe(0, 1.0, false);
        tracker.observe(1, 2.0, true);
        tracker.observe(2, 3.0, false);

        let summary = tracker.finish(1);
        assert_eq!(summary.episode_return, 2.0);
        assert!(summary.won);

        // Slots 0 and 2 keep accumulating.
        tracker.observe(0, 1.0, false);
        let s0 = tracker.finish(0);
        assert_eq!(s0.episode_return, 2.0);
        assert_eq!(s0.length, 2);
        let s2 = tracker.finish(2);
        assert_eq!(s2.episode_return, 3.0);
    }

    #[test]
    fn test_win_flag_is_sticky_within_episode() {
        let mut tracker = EpisodeTracker::new(1);
        tracker.observe(0, 0.0, true);
        tracker.observe(0, 0.0, false);
        assert!(tracker.finish(0).won);
        // Fresh episode starts clean.
        tracker.observe(0, 0.0, false);
        assert!(!tracker.finish(0).won);
    }

    #[test]
    fn test_progress_over_recent_window() {
        let mut tracker = EpisodeTracker::new(1);
        for i in 0..4 {
            tracker.observe(0, i as f32, i % 2 == 0);
            tracker.finish(0);
        }
        let progress = tracker.progress();
        assert_eq!(progress.episodes, 4);
        assert_eq!(progress.avg_return, (0.0 + 1.0 + 2.0 + 3.0) / 4.0);
        assert_eq!(progress.avg_length, 1.0);
        assert_eq!(progress.win_rate, 0.5);
    }

    #[test]
    fn test_empty_progress() {
        let tracker = EpisodeTracker::new(2);
        let progress = tracker.progress();
        assert_eq!(progress.episodes, 0);
        assert_eq!(progress.avg_return, 0.0);
        assert_eq!(progress.win_rate, 0.0);
    }
}
