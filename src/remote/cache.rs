//! Bounded FIFO cache for remote analysis results, keyed by a cheap
//! buffer fingerprint so near-identical retries within a session skip the
//! network entirely.

use std::collections::VecDeque;

use crate::util;

use super::RemoteAnalysis;

/// Deterministic digest of a sample buffer: a few probe samples plus the
/// length and a short-window RMS. Cheap to compute, and collisions across
/// genuinely different vocal takes are effectively impossible while exact
/// resubmissions always hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferFingerprint {
    len: usize,
    first_bits: u32,
    middle_bits: u32,
    last_bits: u32,
    rms_bits: u32,
}

impl BufferFingerprint {
    pub fn of(samples: &[f32]) -> Self {
        if samples.is_empty() {
            return Self {
                len: 0,
                first_bits: 0,
                middle_bits: 0,
                last_bits: 0,
                rms_bits: 0,
            };
        }

        let head = &samples[..samples.len().min(256)];
        Self {
            len: samples.len(),
            first_bits: samples[0].to_bits(),
            middle_bits: samples[samples.len() / 2].to_bits(),
            last_bits: samples[samples.len() - 1].to_bits(),
            rms_bits: util::rms(head).to_bits(),
        }
    }
}

/// Bounded FIFO cache — deliberately not an LRU. Entries age out in
/// insertion order regardless of hits; at the default capacity of 10 the
/// bookkeeping of recency isn't worth anything.
pub struct ResultCache {
    capacity: usize,
    entries: VecDeque<(BufferFingerprint, RemoteAnalysis)>,
}

impl ResultCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::new(),
        }
    }

    pub fn get(&self, fingerprint: &BufferFingerprint) -> Option<RemoteAnalysis> {
        self.entries
            .iter()
            .find(|(fp, _)| fp == fingerprint)
            .map(|(_, result)| result.clone())
    }

    pub fn insert(&mut self, fingerprint: BufferFingerprint, result: RemoteAnalysis) {
        // Replace an existing entry in place rather than duplicating it.
        if let Some(entry) = self.entries.iter_mut().find(|(fp, _)| *fp == fingerprint) {
            entry.1 = result;
            return;
        }

        if self.entries.len() >= self.capacity {
            if let Some((evicted, _)) = self.entries.pop_front() {
                log::debug!("Evicting cached remote result for buffer of {} samples", evicted.len);
            }
        }
        self.entries.push_back((fingerprint, result));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contour::PitchMethod;

    fn analysis(freq: f64) -> RemoteAnalysis {
        RemoteAnalysis {
            frequencies: vec![freq],
            confidences: vec![0.9],
            method: PitchMethod::Fused,
            non_monophonic: false,
        }
    }

    #[test]
    fn identical_buffers_share_a_fingerprint() {
        let buffer = vec![0.1f32, 0.2, 0.3, 0.4];
        assert_eq!(BufferFingerprint::of(&buffer), BufferFingerprint::of(&buffer));
    }

    #[test]
    fn different_buffers_differ() {
        let a = vec![0.1f32, 0.2, 0.3, 0.4];
        let b = vec![0.1f32, 0.2, 0.3, 0.5];
        assert_ne!(BufferFingerprint::of(&a), BufferFingerprint::of(&b));
    }

    #[test]
    fn different_lengths_differ() {
        let a = vec![0.0f32; 100];
        let b = vec![0.0f32; 101];
        assert_ne!(BufferFingerprint::of(&a), BufferFingerprint::of(&b));
    }

    #[test]
    fn hit_and_miss() {
        let mut cache = ResultCache::new(10);
        let buffer = vec![0.1f32; 64];
        let fp = BufferFingerprint::of(&buffer);

        assert!(cache.get(&fp).is_none());
        cache.insert(fp, analysis(220.0));
        let hit = cache.get(&fp).expect("Inserted entry should be found");
        assert_eq!(hit.frequencies, vec![220.0]);
    }

    #[test]
    fn fifo_eviction_drops_oldest() {
        let mut cache = ResultCache::new(3);
        let buffers: Vec<Vec<f32>> = (0..4).map(|i| vec![i as f32 * 0.1 + 0.1; 32]).collect();
        let fps: Vec<BufferFingerprint> =
            buffers.iter().map(|b| BufferFingerprint::of(b)).collect();

        for (i, fp) in fps.iter().take(3).enumerate() {
            cache.insert(*fp, analysis(100.0 + i as f64));
        }
        assert_eq!(cache.len(), 3);

        // Inserting a 4th evicts the 1st (FIFO), not the least recently
        // used.
        cache.insert(fps[3], analysis(400.0));
        assert_eq!(cache.len(), 3);
        assert!(cache.get(&fps[0]).is_none(), "Oldest entry should be gone");
        assert!(cache.get(&fps[1]).is_some());
        assert!(cache.get(&fps[3]).is_some());
    }

    #[test]
    fn reinsert_updates_in_place() {
        let mut cache = ResultCache::new(2);
        let fp = BufferFingerprint::of(&[0.5f32; 16]);
        cache.insert(fp, analysis(220.0));
        cache.insert(fp, analysis(221.0));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&fp).unwrap().frequencies, vec![221.0]);
    }

    #[test]
    fn empty_buffer_fingerprint_is_stable() {
        assert_eq!(BufferFingerprint::of(&[]), BufferFingerprint::of(&[]));
    }
}
