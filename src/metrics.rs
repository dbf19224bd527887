//! Population metrics computed from the called samples of a locus

use crate::record::TrRecord;
use statrs::distribution::{Binomial, Discrete};
use std::collections::BTreeMap;

/// Returned by [`hwe_binomial_test`] when no genotypes are called
pub const NO_CALLS_METRIC: f64 = -1.0;

/// Key used to group alleles when counting
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AlleleKey {
    Sequence(String),
    Length(usize),
}

impl AlleleKey {
    /// Key for allele `index` of `record`, or `None` for an out-of-range index
    pub fn for_allele(record: &TrRecord, index: usize, use_length: bool) -> Option<Self> {
        let allele = record.allele(index)?;
        match allele.sequence() {
            Some(seq) if !use_length => Some(AlleleKey::Sequence(seq.to_string())),
            _ => Some(AlleleKey::Length(allele.length())),
        }
    }
}

/// Allele observation counts over called samples
pub fn allele_counts(record: &TrRecord, use_length: bool) -> BTreeMap<AlleleKey, usize> {
    let mut counts = BTreeMap::new();
    for gt in record.genotypes.iter().filter(|gt| gt.is_called()) {
        for index in gt.called_alleles() {
            if let Some(key) = AlleleKey::for_allele(record, index, use_length) {
                *counts.entry(key).or_insert(0) += 1;
            }
        }
    }
    counts
}

/// Allele observation counts by genotype index (0 = reference) over called samples
pub fn allele_index_counts(record: &TrRecord) -> Vec<usize> {
    let mut counts = vec![0; record.num_alleles()];
    for gt in record.genotypes.iter().filter(|gt| gt.is_called()) {
        for index in gt.called_alleles() {
            if let Some(count) = counts.get_mut(index) {
                *count += 1;
            }
        }
    }
    counts
}

/// Allele frequencies over called samples
pub fn allele_freqs(record: &TrRecord, use_length: bool) -> BTreeMap<AlleleKey, f64> {
    let counts = allele_counts(record, use_length);
    let total: usize = counts.values().sum();
    if total == 0 {
        return BTreeMap::new();
    }
    counts
        .into_iter()
        .map(|(key, count)| (key, count as f64 / total as f64))
        .collect()
}

/// Counts of unordered genotypes (sorted allele tuples) over called samples
pub fn genotype_counts(record: &TrRecord, use_length: bool) -> BTreeMap<Vec<AlleleKey>, usize> {
    let mut counts = BTreeMap::new();
    for gt in record.genotypes.iter().filter(|gt| gt.is_called()) {
        let mut keys: Vec<AlleleKey> = gt
            .called_alleles()
            .filter_map(|index| AlleleKey::for_allele(record, index, use_length))
            .collect();
        keys.sort();
        *counts.entry(keys).or_insert(0) += 1;
    }
    counts
}

/// Expected heterozygosity `1 - sum(freq^2)`
pub fn heterozygosity(allele_freqs: &BTreeMap<AlleleKey, f64>) -> f64 {
    if allele_freqs.is_empty() {
        return NO_CALLS_METRIC;
    }
    1.0 - allele_freqs.values().map(|f| f * f).sum::<f64>()
}

/// Binomial test of the observed homozygote count against Hardy-Weinberg expectation
///
/// A genotype counts as homozygous when all of its alleles share one key.
pub fn hwe_binomial_test(
    allele_freqs: &BTreeMap<AlleleKey, f64>,
    genotype_counts: &BTreeMap<Vec<AlleleKey>, usize>,
) -> f64 {
    if genotype_counts.is_empty() {
        return NO_CALLS_METRIC;
    }
    let total: usize = genotype_counts.values().sum();
    let homozygous: usize = genotype_counts
        .iter()
        .filter(|(alleles, _)| alleles.windows(2).all(|pair| pair[0] == pair[1]))
        .map(|(_, count)| count)
        .sum();
    let expected_hom_frac: f64 = allele_freqs.values().map(|f| f * f).sum();
    binomial_test(homozygous as u64, total as u64, expected_hom_frac)
}

/// Two-sided exact binomial test
///
/// Sums the probability of every outcome no more likely than the observed one.
pub fn binomial_test(successes: u64, trials: u64, p: f64) -> f64 {
    if trials == 0 {
        return 1.0;
    }
    let Ok(dist) = Binomial::new(p.clamp(0.0, 1.0), trials) else {
        return 1.0;
    };
    let threshold = dist.pmf(successes) * (1.0 + 1e-7);
    let pvalue: f64 = (0..=trials)
        .map(|k| dist.pmf(k))
        .filter(|&prob| prob <= threshold)
        .sum();
    pvalue.min(1.0)
}

/// Length of the longest run of a single repeated character
pub fn homopolymer_run(seq: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    let mut previous = None;
    for c in seq.chars() {
        if Some(c) == previous {
            current += 1;
        } else {
            current = 1;
            previous = Some(c);
        }
        longest = longest.max(current);
    }
    longest
}

/// Repeat unit of `period` bp that tiles `seq` most often, as its
/// lexicographically smallest rotation
///
/// Sequences shorter than one unit give a unit of `N`s.
pub fn infer_repeat_unit(seq: &str, period: usize) -> String {
    if period == 0 || period > seq.len() || !seq.is_ascii() {
        return "N".repeat(period);
    }
    let mut best = ("", 0);
    for offset in 0..period {
        let Some(unit) = seq.get(offset..offset + period) else {
            break;
        };
        let copies = (offset..=seq.len() - period)
            .step_by(period)
            .filter(|&start| seq.get(start..start + period) == Some(unit))
            .count();
        if copies > best.1 {
            best = (unit, copies);
        }
    }
    let unit = best.0;
    (0..unit.len())
        .map(|i| format!("{}{}", &unit[i..], &unit[..i]))
        .min()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Allele, Genotype};

    fn record_with(genotypes: Vec<Genotype>) -> TrRecord {
        TrRecord::new(
            "chr1",
            1000,
            "AC",
            Allele::Sequence("ACACAC".to_string()),
            vec![
                Allele::Sequence("ACACACAC".to_string()),
                Allele::Sequence("ACAGACAC".to_string()),
            ],
            genotypes,
        )
    }

    #[test]
    fn test_allele_freqs_by_sequence_and_length() {
        let record = record_with(vec![
            Genotype::called(&[0, 1]),
            Genotype::called(&[1, 2]),
            Genotype::missing(2),
        ]);
        let freqs = allele_freqs(&record, false);
        assert_eq!(freqs.len(), 3);
        assert_eq!(freqs[&AlleleKey::Sequence("ACACACAC".to_string())], 0.5);

        let freqs = allele_freqs(&record, true);
        assert_eq!(freqs.len(), 2);
        assert_eq!(freqs[&AlleleKey::Length(8)], 0.75);
        assert_eq!(freqs[&AlleleKey::Length(6)], 0.25);
    }

    #[test]
    fn test_allele_index_counts_skip_uncalled() {
        let record = record_with(vec![
            Genotype::called(&[0, 2]),
            Genotype::new(vec![Some(1), None], false),
            Genotype::called(&[2, 2]),
        ]);
        assert_eq!(allele_index_counts(&record), vec![1, 0, 3]);
    }

    #[test]
    fn test_heterozygosity() {
        let record = record_with(vec![Genotype::called(&[0, 1]), Genotype::called(&[0, 1])]);
        let het = heterozygosity(&allele_freqs(&record, false));
        assert!((het - 0.5).abs() < 1e-12);

        let record = record_with(vec![Genotype::called(&[0, 0])]);
        assert_eq!(heterozygosity(&allele_freqs(&record, false)), 0.0);

        assert_eq!(heterozygosity(&BTreeMap::new()), NO_CALLS_METRIC);
    }

    #[test]
    fn test_genotype_counts_are_unordered() {
        let record = record_with(vec![Genotype::called(&[1, 0]), Genotype::called(&[0, 1])]);
        let counts = genotype_counts(&record, false);
        assert_eq!(counts.len(), 1);
        assert_eq!(counts.values().copied().sum::<usize>(), 2);
    }

    #[test]
    fn test_hwe_no_calls() {
        let record = record_with(vec![Genotype::missing(2)]);
        let pvalue = hwe_binomial_test(
            &allele_freqs(&record, false),
            &genotype_counts(&record, false),
        );
        assert_eq!(pvalue, NO_CALLS_METRIC);
    }

    #[test]
    fn test_hwe_excess_homozygotes_is_significant() {
        // 10 samples, half ref/ref and half alt/alt: expected hom frac 0.5, observed 10/10
        let mut genotypes = vec![Genotype::called(&[0, 0]); 5];
        genotypes.extend(vec![Genotype::called(&[1, 1]); 5]);
        let record = record_with(genotypes);
        let pvalue = hwe_binomial_test(
            &allele_freqs(&record, false),
            &genotype_counts(&record, false),
        );
        // two-sided: P(X=0) + P(X=10) = 2 / 1024
        assert!((pvalue - 2.0 / 1024.0).abs() < 1e-9);
    }

    #[test]
    fn test_hwe_monomorphic_locus() {
        let record = record_with(vec![Genotype::called(&[0, 0]); 4]);
        let pvalue = hwe_binomial_test(
            &allele_freqs(&record, false),
            &genotype_counts(&record, false),
        );
        assert!((pvalue - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_binomial_test_bounds() {
        assert_eq!(binomial_test(0, 0, 0.5), 1.0);
        let p = binomial_test(3, 10, 0.5);
        assert!(p > 0.0 && p <= 1.0);
        // symmetric distribution: P(X<=3) + P(X>=7) = 2 * 176/1024
        assert!((p - 352.0 / 1024.0).abs() < 1e-9);
    }

    #[test]
    fn test_homopolymer_run() {
        assert_eq!(homopolymer_run(""), 0);
        assert_eq!(homopolymer_run("A"), 1);
        assert_eq!(homopolymer_run("ACGT"), 1);
        assert_eq!(homopolymer_run("AAACCCCCGT"), 5);
        assert_eq!(homopolymer_run("TTTTTT"), 6);
    }

    #[test]
    fn test_infer_repeat_unit() {
        assert_eq!(infer_repeat_unit("ACACAC", 2), "AC");
        assert_eq!(infer_repeat_unit("TGTGTG", 2), "GT");
        assert_eq!(infer_repeat_unit("CAGCAGCAG", 3), "AGC");
        assert_eq!(infer_repeat_unit("GCAGCAGCA", 3), "AGC");
        // one interrupted copy still leaves AC as the dominant unit
        assert_eq!(infer_repeat_unit("ACACTCAC", 2), "AC");
        assert_eq!(infer_repeat_unit("AC", 3), "NNN");
        assert_eq!(infer_repeat_unit("AAAA", 1), "A");
    }
}
