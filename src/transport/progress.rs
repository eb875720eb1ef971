//! Progress accounting for uploads
//!
//! A [`ProgressTracker`] turns raw transmission ticks (bytes handed to the
//! connection) into [`ProgressEvent`]s carrying both the running total and the
//! delta since the previous event. [`GroupedProgressTracker`] folds per-file
//! progress into one overall event for a batch of files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Completion ratio for `loaded` out of `total`.
///
/// An empty transfer is complete as soon as it starts.
pub fn ratio(loaded: u64, total: u64) -> f64 {
    if total == 0 {
        1.0
    } else {
        (loaded as f64 / total as f64).min(1.0)
    }
}

/// One progress observation for a single logical stream
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    /// `loaded / total`, in `0.0..=1.0`
    pub ratio: f64,
    /// Bytes transmitted so far
    pub loaded: u64,
    /// Total bytes expected
    pub total: u64,
    /// Bytes transmitted since the previous event
    pub d_loaded: u64,
}

impl ProgressEvent {
    pub fn new(d_loaded: u64, loaded: u64, total: u64) -> Self {
        Self {
            ratio: ratio(loaded, total),
            loaded,
            total,
            d_loaded,
        }
    }
}

/// Running byte counter for one transport call.
///
/// `loaded` never decreases and `total` is fixed at construction, so the sum
/// of every emitted `d_loaded` always equals the last emitted `loaded`.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    loaded: u64,
    total: u64,
}

impl ProgressTracker {
    pub fn new(total: u64) -> Self {
        Self { loaded: 0, total }
    }

    /// The opening tick: nothing sent yet, zero delta.
    pub fn start(&self) -> ProgressEvent {
        ProgressEvent::new(0, self.loaded, self.total)
    }

    /// Record `bytes` more transmitted and return the resulting event.
    pub fn advance(&mut self, bytes: u64) -> ProgressEvent {
        let previous = self.loaded;
        self.loaded = self.loaded.saturating_add(bytes);
        ProgressEvent::new(self.loaded - previous, self.loaded, self.total)
    }

    pub fn loaded(&self) -> u64 {
        self.loaded
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}

/// Progress of a batch: one overall event plus one event per file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupedProgressEvent {
    pub overall: ProgressEvent,
    pub individual: BTreeMap<String, ProgressEvent>,
}

/// Folds per-file progress into a [`GroupedProgressEvent`].
///
/// `overall.total` is the sum of all file sizes and never changes;
/// `overall.loaded` is recomputed as the sum of every file's `loaded`.
#[derive(Debug, Clone)]
pub struct GroupedProgressTracker {
    overall_total: u64,
    overall_loaded: u64,
    individual: BTreeMap<String, ProgressEvent>,
}

impl GroupedProgressTracker {
    /// Create a tracker seeded with every file at zero progress.
    pub fn new<'a, I>(files: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, u64)>,
    {
        let mut individual = BTreeMap::new();
        let mut overall_total = 0u64;
        for (name, size) in files {
            overall_total += size;
            individual.insert(name.to_string(), ProgressEvent::new(0, 0, size));
        }
        Self {
            overall_total,
            overall_loaded: 0,
            individual,
        }
    }

    /// Apply a file-level event and return the grouped snapshot.
    ///
    /// Unknown names are ignored so the overall sum keeps matching the
    /// individual entries.
    pub fn update(&mut self, name: &str, event: ProgressEvent) -> GroupedProgressEvent {
        let mut d_overall = 0;
        if let Some(entry) = self.individual.get_mut(name) {
            let loaded = event.loaded.max(entry.loaded);
            d_overall = loaded - entry.loaded;
            *entry = ProgressEvent::new(d_overall, loaded, entry.total);
        }
        self.overall_loaded += d_overall;
        self.snapshot(d_overall)
    }

    fn snapshot(&self, d_loaded: u64) -> GroupedProgressEvent {
        GroupedProgressEvent {
            overall: ProgressEvent::new(d_loaded, self.overall_loaded, self.overall_total),
            individual: self.individual.clone(),
        }
    }

    /// Current grouped state without applying an update
    pub fn current(&self) -> GroupedProgressEvent {
        self.snapshot(0)
    }

    pub fn total(&self) -> u64 {
        self.overall_total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio() {
        assert_eq!(ratio(0, 100), 0.0);
        assert_eq!(ratio(50, 100), 0.5);
        assert_eq!(ratio(100, 100), 1.0);
        assert_eq!(ratio(0, 0), 1.0);
    }

    #[test]
    fn test_deltas_sum_to_loaded() {
        let mut tracker = ProgressTracker::new(1000);
        let mut events = vec![tracker.start()];
        for step in [100, 250, 0, 650] {
            events.push(tracker.advance(step));
        }

        assert_eq!(events[0].d_loaded, 0);
        let summed: u64 = events.iter().map(|e| e.d_loaded).sum();
        assert_eq!(summed, events.last().unwrap().loaded);
        assert_eq!(events.last().unwrap().ratio, 1.0);

        // loaded is monotonically non-decreasing, total never moves
        for pair in events.windows(2) {
            assert!(pair[1].loaded >= pair[0].loaded);
            assert_eq!(pair[1].total, 1000);
        }
    }

    #[test]
    fn test_event_serializes_camel_case() {
        let json = serde_json::to_value(ProgressEvent::new(5, 10, 20)).unwrap();
        assert_eq!(json["dLoaded"], 5);
        assert_eq!(json["loaded"], 10);
        assert_eq!(json["ratio"], 0.5);
    }

    #[test]
    fn test_grouped_overall_matches_individual_sum() {
        let mut grouped = GroupedProgressTracker::new([("a.bin", 100), ("b.bin", 300)]);
        assert_eq!(grouped.total(), 400);

        let updates = [
            ("a.bin", 40),
            ("b.bin", 100),
            ("a.bin", 100),
            ("b.bin", 250),
            ("b.bin", 300),
        ];
        for (name, loaded) in updates {
            let total = if name == "a.bin" { 100 } else { 300 };
            let event = grouped.update(name, ProgressEvent::new(0, loaded, total));
            let sum: u64 = event.individual.values().map(|e| e.loaded).sum();
            assert_eq!(event.overall.loaded, sum);
            assert_eq!(event.overall.total, 400);
        }

        let done = grouped.current();
        assert_eq!(done.overall.loaded, 400);
        assert_eq!(done.overall.ratio, 1.0);
    }

    #[test]
    fn test_grouped_ignores_unknown_file() {
        let mut grouped = GroupedProgressTracker::new([("a.bin", 10)]);
        let event = grouped.update("other.bin", ProgressEvent::new(5, 5, 10));
        assert_eq!(event.overall.loaded, 0);
        assert_eq!(event.individual.len(), 1);
    }
}
