use crate::data::Sample;

/// Hard cap on buffered samples once live updates are flowing.
pub const LIVE_WINDOW: usize = 100;

/// Rows shown by the recency (table) view.
pub const TABLE_ROWS: usize = 20;

/// Bounded rolling window of recent samples, owned by a single data screen.
///
/// The initial snapshot is installed wholesale and may exceed the cap; every
/// live append trims the window back down. Arrival order is preserved in
/// storage; display ordering is always recomputed by `chronological`, never
/// assumed from arrival order.
#[derive(Debug)]
pub struct SampleBuffer {
    samples: Vec<Sample>,
    cap: usize,
}

impl Default for SampleBuffer {
    fn default() -> SampleBuffer {
        SampleBuffer::new()
    }
}

impl SampleBuffer {
    pub fn new() -> SampleBuffer {
        SampleBuffer::with_capacity(LIVE_WINDOW)
    }

    pub fn with_capacity(cap: usize) -> SampleBuffer {
        SampleBuffer {
            samples: Vec::new(),
            cap: cap.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples in arrival order.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Install a fresh snapshot, discarding whatever was buffered. Snapshots
    /// are not truncated to the cap.
    pub fn replace(&mut self, rows: Vec<Sample>) {
        self.samples = rows;
    }

    /// Append one live row. The existing contents are first trimmed to the
    /// newest `cap - 1`, so the length after appending never exceeds the cap.
    pub fn push_live(&mut self, sample: Sample) {
        if self.samples.len() >= self.cap {
            let excess = self.samples.len() - (self.cap - 1);
            self.samples.drain(..excess);
        }
        self.samples.push(sample);
    }

    /// Full contents sorted ascending by timestamp. The sort is stable, so
    /// colliding timestamps keep their arrival order.
    pub fn chronological(&self) -> Vec<Sample> {
        let mut rows = self.samples.clone();
        rows.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        rows
    }

    /// The newest `n` samples, newest first.
    pub fn recent(&self, n: usize) -> Vec<Sample> {
        let mut rows = self.chronological();
        let start = rows.len().saturating_sub(n);
        let mut tail = rows.split_off(start);
        tail.reverse();
        tail
    }
}
