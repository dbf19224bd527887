//! Running per-sample and per-locus filter statistics
//!
//! Both tables are created once before the first record, updated once per
//! record and read after the last one to produce the log files. Updates are
//! plain additions, so accumulators from independent shards can be combined
//! with `merge`.

use crate::{StrqcError, StrqcResult};

pub const NUM_CALLS: &str = "numcalls";
pub const PASS: &str = "PASS";
pub const NO_CALLS_REMAINING: &str = "NO_CALLS_REMAINING";

/// Per-sample counters: passing calls, their total depth and one trigger
/// count per call-level filter in registration order
#[derive(Debug, Clone, PartialEq)]
pub struct SampleStats {
    samples: Vec<String>,
    num_calls: Vec<u64>,
    total_depth: Vec<f64>,
    filter_counts: Vec<(String, Vec<u64>)>,
}

impl SampleStats {
    pub fn new<I, S>(samples: Vec<String>, filter_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let n = samples.len();
        Self {
            num_calls: vec![0; n],
            total_depth: vec![0.0; n],
            filter_counts: filter_names
                .into_iter()
                .map(|name| (name.into(), vec![0; n]))
                .collect(),
            samples,
        }
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn num_calls(&self) -> &[u64] {
        &self.num_calls
    }

    pub fn total_depth(&self) -> &[f64] {
        &self.total_depth
    }

    /// Filter trigger counts in registration order
    pub fn filter_counts(&self) -> &[(String, Vec<u64>)] {
        &self.filter_counts
    }

    pub fn filter_count(&self, name: &str) -> Option<&[u64]> {
        self.filter_counts
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, counts)| counts.as_slice())
    }

    pub(crate) fn record_filter_trigger(&mut self, filter_index: usize, sample: usize) {
        if let Some(count) = self
            .filter_counts
            .get_mut(filter_index)
            .and_then(|(_, counts)| counts.get_mut(sample))
        {
            *count += 1;
        }
    }

    pub(crate) fn record_passing_call(&mut self, sample: usize) {
        self.num_calls[sample] += 1;
    }

    pub(crate) fn add_depth(&mut self, sample: usize, depth: f64) {
        self.total_depth[sample] += depth;
    }

    /// Mark the sample's depth total undefined
    pub(crate) fn poison_depth(&mut self, sample: usize) {
        self.total_depth[sample] = f64::NAN;
    }

    /// Mean depth over passing calls, 0 when the sample has none
    pub fn mean_depth(&self, sample: usize) -> f64 {
        match self.num_calls[sample] {
            0 => 0.0,
            n => self.total_depth[sample] / n as f64,
        }
    }

    pub fn total_num_calls(&self) -> u64 {
        self.num_calls.iter().sum()
    }

    /// Mean depth over every passing call of every sample
    pub fn overall_mean_depth(&self) -> f64 {
        match self.total_num_calls() {
            0 => 0.0,
            n => self.total_depth.iter().sum::<f64>() / n as f64,
        }
    }

    pub fn merge(&mut self, other: &SampleStats) -> StrqcResult<()> {
        let same_filters = self.filter_counts.len() == other.filter_counts.len()
            && self
                .filter_counts
                .iter()
                .zip(&other.filter_counts)
                .all(|((a, _), (b, _))| a == b);
        if self.samples != other.samples || !same_filters {
            return Err(StrqcError::InvalidConfig(
                "Cannot merge sample statistics with different samples or filters".to_string(),
            ));
        }
        for (mine, theirs) in self.num_calls.iter_mut().zip(&other.num_calls) {
            *mine += theirs;
        }
        for (mine, theirs) in self.total_depth.iter_mut().zip(&other.total_depth) {
            *mine += theirs;
        }
        for ((_, mine), (_, theirs)) in self.filter_counts.iter_mut().zip(&other.filter_counts) {
            for (a, b) in mine.iter_mut().zip(theirs) {
                *a += b;
            }
        }
        Ok(())
    }
}

/// Per-locus counters: total passing calls, passing loci, one count per
/// locus-level filter in registration order and the loci left without calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocusStats {
    total_calls: u64,
    passed: u64,
    filter_counts: Vec<(String, u64)>,
    no_calls_remaining: u64,
}

impl LocusStats {
    pub fn new<I, S>(filter_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            total_calls: 0,
            passed: 0,
            filter_counts: filter_names.into_iter().map(|n| (n.into(), 0)).collect(),
            no_calls_remaining: 0,
        }
    }

    pub fn total_calls(&self) -> u64 {
        self.total_calls
    }

    pub fn passed(&self) -> u64 {
        self.passed
    }

    pub fn no_calls_remaining(&self) -> u64 {
        self.no_calls_remaining
    }

    pub fn filter_count(&self, name: &str) -> Option<u64> {
        self.filter_counts
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, count)| *count)
    }

    pub(crate) fn record_filter(&mut self, filter_index: usize) {
        if let Some((_, count)) = self.filter_counts.get_mut(filter_index) {
            *count += 1;
        }
    }

    pub(crate) fn record_no_calls_remaining(&mut self) {
        self.no_calls_remaining += 1;
    }

    pub(crate) fn record_pass(&mut self, called_samples: usize) {
        self.passed += 1;
        self.total_calls += called_samples as u64;
    }

    /// Mean number of called samples per passing locus, 0 if none passed
    pub fn mean_samples_per_passing_locus(&self) -> f64 {
        match self.passed {
            0 => 0.0,
            n => self.total_calls as f64 / n as f64,
        }
    }

    /// Every counter except the running total of calls, in table order
    pub fn counters(&self) -> Vec<(&str, u64)> {
        let mut counters = vec![(PASS, self.passed)];
        counters.extend(self.filter_counts.iter().map(|(n, c)| (n.as_str(), *c)));
        counters.push((NO_CALLS_REMAINING, self.no_calls_remaining));
        counters
    }

    pub fn merge(&mut self, other: &LocusStats) -> StrqcResult<()> {
        let same_filters = self.filter_counts.len() == other.filter_counts.len()
            && self
                .filter_counts
                .iter()
                .zip(&other.filter_counts)
                .all(|((a, _), (b, _))| a == b);
        if !same_filters {
            return Err(StrqcError::InvalidConfig(
                "Cannot merge locus statistics with different filters".to_string(),
            ));
        }
        self.total_calls += other.total_calls;
        self.passed += other.passed;
        self.no_calls_remaining += other.no_calls_remaining;
        for ((_, mine), (_, theirs)) in self.filter_counts.iter_mut().zip(&other.filter_counts) {
            *mine += theirs;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples() -> Vec<String> {
        vec!["S1".to_string(), "S2".to_string()]
    }

    #[test]
    fn test_sample_stats_layout() {
        let stats = SampleStats::new(samples(), ["MinDepth", "MaxDepth"]);
        assert_eq!(stats.num_samples(), 2);
        let names: Vec<&str> = stats.filter_counts().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["MinDepth", "MaxDepth"]);
        assert_eq!(stats.filter_count("MaxDepth"), Some(&[0, 0][..]));
        assert_eq!(stats.mean_depth(0), 0.0);
    }

    #[test]
    fn test_mean_depth_and_poison() {
        let mut stats = SampleStats::new(samples(), Vec::<String>::new());
        stats.record_passing_call(0);
        stats.record_passing_call(0);
        stats.add_depth(0, 10.0);
        stats.add_depth(0, 20.0);
        assert_eq!(stats.mean_depth(0), 15.0);

        stats.record_passing_call(1);
        stats.poison_depth(1);
        stats.add_depth(1, 30.0);
        assert!(stats.mean_depth(1).is_nan());
        assert!(stats.overall_mean_depth().is_nan());
    }

    #[test]
    fn test_sample_stats_merge() {
        let mut a = SampleStats::new(samples(), ["F"]);
        let mut b = SampleStats::new(samples(), ["F"]);
        a.record_filter_trigger(0, 1);
        b.record_filter_trigger(0, 1);
        b.record_passing_call(0);
        b.add_depth(0, 12.0);
        a.merge(&b).unwrap();
        assert_eq!(a.filter_count("F"), Some(&[0, 2][..]));
        assert_eq!(a.num_calls(), &[1, 0]);
        assert_eq!(a.total_depth()[0], 12.0);

        let other = SampleStats::new(samples(), ["G"]);
        assert!(a.merge(&other).is_err());
    }

    #[test]
    fn test_locus_stats_counters_order() {
        let mut stats = LocusStats::new(["HWE0.05", "CALLRATE0.8"]);
        stats.record_filter(1);
        stats.record_no_calls_remaining();
        stats.record_pass(3);
        stats.record_pass(5);
        assert_eq!(
            stats.counters(),
            vec![
                (PASS, 2),
                ("HWE0.05", 0),
                ("CALLRATE0.8", 1),
                (NO_CALLS_REMAINING, 1),
            ]
        );
        assert_eq!(stats.total_calls(), 8);
        assert_eq!(stats.mean_samples_per_passing_locus(), 4.0);
    }

    #[test]
    fn test_locus_stats_merge_is_additive() {
        let mut a = LocusStats::new(["HRUN"]);
        let mut b = LocusStats::new(["HRUN"]);
        a.record_pass(2);
        b.record_filter(0);
        b.record_pass(4);
        a.merge(&b).unwrap();
        assert_eq!(a.passed(), 2);
        assert_eq!(a.total_calls(), 6);
        assert_eq!(a.filter_count("HRUN"), Some(1));
        assert_eq!(LocusStats::new(Vec::<String>::new()).mean_samples_per_passing_locus(), 0.0);
    }
}
