use super::synthesis::{FailureKind, SynthesisOutcome};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedSegment {
    pub index: usize,
    pub kind: FailureKind,
    pub message: String,
}

/// Outcomes split by result, each side ascending by segment index
#[derive(Debug, Default)]
pub struct Collected {
    pub succeeded: Vec<(usize, Vec<u8>)>,
    pub failed: Vec<FailedSegment>,
    pub total_bytes: usize,
}

impl Collected {
    pub fn failed_indices(&self) -> Vec<usize> {
        self.failed.iter().map(|f| f.index).collect()
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_partial(&self) -> bool {
        !self.succeeded.is_empty() && !self.failed.is_empty()
    }

    /// Audio buffers in track order, ready for assembly
    pub fn buffers(&self) -> Vec<Vec<u8>> {
        self.succeeded.iter().map(|(_, audio)| audio.clone()).collect()
    }
}

/// Reorder outcomes by index regardless of the order they arrived in
pub fn collect(outcomes: Vec<SynthesisOutcome>) -> Collected {
    let mut collected = Collected::default();

    for outcome in outcomes {
        match outcome {
            SynthesisOutcome::Success { index, audio, byte_count } => {
                collected.total_bytes += byte_count;
                collected.succeeded.push((index, audio));
            }
            SynthesisOutcome::Failure { index, kind, message } => {
                collected.failed.push(FailedSegment { index, kind, message });
            }
        }
    }

    collected.succeeded.sort_by_key(|(index, _)| *index);
    collected.failed.sort_by_key(|f| f.index);
    collected
}
