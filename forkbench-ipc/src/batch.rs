//! Sample batching
//!
//! Forks stream samples in bounded batches instead of one frame per sample.

use crate::messages::{Sample, SampleBatch};
use crate::MAX_BATCH_SIZE;

/// Accumulates samples and hands out full batches.
#[derive(Debug)]
pub struct SampleBatcher {
    bench_id_hash: u64,
    next_sequence: u32,
    capacity: usize,
    pending: Vec<Sample>,
}

impl SampleBatcher {
    /// Batcher for the named benchmark with the default batch size
    pub fn new(bench_name: &str) -> Self {
        Self::with_capacity(bench_name, MAX_BATCH_SIZE)
    }

    /// Batcher with an explicit batch size (clamped to `1..=MAX_BATCH_SIZE`)
    pub fn with_capacity(bench_name: &str, capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_BATCH_SIZE);
        Self {
            bench_id_hash: Self::hash_name(bench_name),
            next_sequence: 0,
            capacity,
            pending: Vec::with_capacity(capacity),
        }
    }

    /// Hash used to tag batches of a benchmark
    pub fn hash_name(bench_name: &str) -> u64 {
        fxhash::hash64(bench_name)
    }

    /// Add a sample, returning a batch once `capacity` samples are pending
    pub fn push(&mut self, sample: Sample) -> Option<SampleBatch> {
        self.pending.push(sample);
        if self.pending.len() >= self.capacity {
            Some(self.take_batch())
        } else {
            None
        }
    }

    /// Flush whatever is pending
    pub fn finish(&mut self) -> Option<SampleBatch> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.take_batch())
        }
    }

    fn take_batch(&mut self) -> SampleBatch {
        let samples = std::mem::replace(&mut self.pending, Vec::with_capacity(self.capacity));
        let batch = SampleBatch {
            bench_id_hash: self.bench_id_hash,
            batch_sequence: self.next_sequence,
            samples,
        };
        self.next_sequence = self.next_sequence.wrapping_add(1);
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Phase;

    #[test]
    fn test_batches_split_at_capacity() {
        let mut batcher = SampleBatcher::with_capacity("bench", 3);
        let mut batches = Vec::new();
        for i in 0..7 {
            if let Some(batch) = batcher.push(Sample::new(i, Phase::Measurement)) {
                batches.push(batch);
            }
        }
        batches.extend(batcher.finish());

        let sizes: Vec<usize> = batches.iter().map(|b| b.samples.len()).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        let sequences: Vec<u32> = batches.iter().map(|b| b.batch_sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
        assert!(batcher.finish().is_none());
    }

    #[test]
    fn test_batches_carry_name_hash() {
        let mut batcher = SampleBatcher::with_capacity("bench", 1);
        let batch = batcher.push(Sample::new(1, Phase::Warmup)).unwrap();
        assert_eq!(batch.bench_id_hash, SampleBatcher::hash_name("bench"));
        assert_ne!(batch.bench_id_hash, SampleBatcher::hash_name("other"));
    }
}
