//! Majority-vote stabilization over a short window of class indices.

use std::collections::VecDeque;

use crate::types::{PredictionResult, StabilizedResult};

/// Class indices kept per session.
pub const HIST_SIZE: usize = 7;
/// Minimum confidence of the current frame for a stable label.
pub const CONF_THR: f32 = 0.60;
/// Minimum history length for a stable label.
pub const MIN_HIST_LENGTH: usize = 3;

/// Fixed-capacity FIFO window of recent class indices.
#[derive(Debug, Clone, Default)]
pub struct ClassHistory {
    window: VecDeque<usize>,
}

impl ClassHistory {
    pub fn new() -> Self {
        Self {
            window: VecDeque::with_capacity(HIST_SIZE),
        }
    }

    pub fn push(&mut self, class_index: usize) {
        self.window.push_back(class_index);
        while self.window.len() > HIST_SIZE {
            self.window.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn contains(&self, class_index: usize) -> bool {
        self.window.contains(&class_index)
    }

    /// Most frequent class; ties go to the class seen first in the window.
    pub fn most_common(&self) -> Option<usize> {
        let mut counts: Vec<(usize, usize)> = Vec::with_capacity(self.window.len());
        for &idx in &self.window {
            match counts.iter_mut().find(|(c, _)| *c == idx) {
                Some((_, n)) => *n += 1,
                None => counts.push((idx, 1)),
            }
        }

        let mut best: Option<(usize, usize)> = None;
        for (idx, n) in counts {
            if best.map_or(true, |(_, max)| n > max) {
                best = Some((idx, n));
            }
        }
        best.map(|(idx, _)| idx)
    }
}

/// Applies the stabilization rule to a prediction whose class index has
/// already been pushed onto `history`. Labels are uppercased for display.
pub fn stabilize(history: &ClassHistory, prediction: PredictionResult) -> StabilizedResult {
    let label = prediction.label.to_uppercase();
    let is_stable = prediction.confidence >= CONF_THR
        && history.len() >= MIN_HIST_LENGTH
        && history.most_common() == Some(prediction.class_index);

    StabilizedResult {
        final_label: is_stable.then(|| label.clone()),
        label,
        confidence: prediction.confidence,
        class_index: prediction.class_index,
        raw_probabilities: prediction.raw_probabilities,
        is_stable,
        history_length: history.len(),
    }
}
