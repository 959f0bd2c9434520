// packages/ingest/src/ingest/ack.rs
//! Sequence tracking for one event stream

use crate::utils::errors::{IngestError, Result};
use tracing::warn;

/// Sequence numbers observed during one stream
///
/// Acknowledgment is all or nothing: the set converts into an ack sequence
/// only when it is exactly `1..=N`.
#[derive(Debug, Default)]
pub struct AckSet {
    seen: Vec<i64>,
}

impl AckSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, sequence_number: i64) {
        self.seen.push(sequence_number);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Consume the set into ascending sequence numbers
    ///
    /// Fails on the first gap, duplicate or out-of-range number.
    pub fn into_ordered(mut self) -> Result<Vec<i64>> {
        self.seen.sort_unstable();

        for (i, &saw) in self.seen.iter().enumerate() {
            let wanted = i as i64 + 1;
            if saw != wanted {
                warn!("Missing ack: saw {} and wanted {}. Bailing!", saw, wanted);
                return Err(IngestError::IncompleteStream { saw, wanted });
            }
        }

        Ok(self.seen)
    }
}
