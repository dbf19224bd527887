//! Call-level (per-sample) filters
//!
//! A call filter maps a record to one optional metric per sample: `None`
//! means the sample passed, `Some(value)` means the filter fired and `value`
//! is reported as the evidence.

use crate::record::TrRecord;
use std::collections::HashMap;

pub trait CallFilter {
    /// Name used in the per-sample FILTER text and the sample log
    fn name(&self) -> &str;

    /// FORMAT fields that must be declared by the input for this filter
    fn required_fields(&self) -> Vec<&str>;

    fn evaluate(&self, record: &TrRecord) -> Vec<Option<f64>>;
}

fn per_sample<F>(record: &TrRecord, mut f: F) -> Vec<Option<f64>>
where
    F: FnMut(usize) -> Option<f64>,
{
    (0..record.num_samples()).map(&mut f).collect()
}

fn first_number(record: &TrRecord, field: &str, sample: usize) -> Option<f64> {
    record.field(field).and_then(|values| values.number(sample))
}

/// Fires when a FORMAT value is below a threshold
#[derive(Debug, Clone)]
pub struct MinValue {
    name: String,
    field: String,
    threshold: f64,
}

impl MinValue {
    pub fn new(name: &str, field: &str, threshold: f64) -> Self {
        Self {
            name: name.to_string(),
            field: field.to_string(),
            threshold,
        }
    }
}

impl CallFilter for MinValue {
    fn name(&self) -> &str {
        &self.name
    }

    fn required_fields(&self) -> Vec<&str> {
        vec![self.field.as_str()]
    }

    fn evaluate(&self, record: &TrRecord) -> Vec<Option<f64>> {
        per_sample(record, |s| {
            first_number(record, &self.field, s).filter(|&v| v < self.threshold)
        })
    }
}

/// Fires when a FORMAT value is above a threshold
#[derive(Debug, Clone)]
pub struct MaxValue {
    name: String,
    field: String,
    threshold: f64,
}

impl MaxValue {
    pub fn new(name: &str, field: &str, threshold: f64) -> Self {
        Self {
            name: name.to_string(),
            field: field.to_string(),
            threshold,
        }
    }
}

impl CallFilter for MaxValue {
    fn name(&self) -> &str {
        &self.name
    }

    fn required_fields(&self) -> Vec<&str> {
        vec![self.field.as_str()]
    }

    fn evaluate(&self, record: &TrRecord) -> Vec<Option<f64>> {
        per_sample(record, |s| {
            first_number(record, &self.field, s).filter(|&v| v > self.threshold)
        })
    }
}

/// Fires when the fraction of reads in `numerator` over DP exceeds a threshold
#[derive(Debug, Clone)]
pub struct MaxReadFraction {
    name: &'static str,
    numerator: &'static str,
    threshold: f64,
}

impl MaxReadFraction {
    /// HipSTR: fraction of reads with an indel in the flanks (DFLANKINDEL / DP)
    pub fn hipstr_flank_indels(threshold: f64) -> Self {
        Self {
            name: "HipSTRCallFlankIndels",
            numerator: "DFLANKINDEL",
            threshold,
        }
    }

    /// HipSTR: fraction of reads with a stutter artifact (DSTUTTER / DP)
    pub fn hipstr_stutter(threshold: f64) -> Self {
        Self {
            name: "HipSTRCallStutter",
            numerator: "DSTUTTER",
            threshold,
        }
    }
}

impl CallFilter for MaxReadFraction {
    fn name(&self) -> &str {
        self.name
    }

    fn required_fields(&self) -> Vec<&str> {
        vec!["DP", self.numerator]
    }

    fn evaluate(&self, record: &TrRecord) -> Vec<Option<f64>> {
        per_sample(record, |s| {
            let depth = first_number(record, "DP", s).filter(|&dp| dp > 0.0)?;
            let reads = first_number(record, self.numerator, s)?;
            Some(reads / depth).filter(|&frac| frac > self.threshold)
        })
    }
}

/// HipSTR: fires when some called allele is supported by too few reads
///
/// GB holds each allele's bp difference from the reference (`a|b`) and
/// ALLREADS the read count per bp difference (`diff|count;diff|count`).
#[derive(Debug, Clone)]
pub struct MinSupportingReads {
    threshold: f64,
}

impl MinSupportingReads {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

fn parse_allreads(text: Option<&str>) -> HashMap<i64, f64> {
    let mut support = HashMap::new();
    let Some(text) = text else {
        return support;
    };
    for entry in text.split(';') {
        if let Some((diff, count)) = entry.split_once('|') {
            if let (Ok(diff), Ok(count)) = (diff.trim().parse::<i64>(), count.trim().parse::<f64>())
            {
                *support.entry(diff).or_insert(0.0) += count;
            }
        }
    }
    support
}

impl CallFilter for MinSupportingReads {
    fn name(&self) -> &str {
        "HipSTRCallMinSuppReads"
    }

    fn required_fields(&self) -> Vec<&str> {
        vec!["ALLREADS", "GB"]
    }

    fn evaluate(&self, record: &TrRecord) -> Vec<Option<f64>> {
        let gb = record.field("GB");
        let allreads = record.field("ALLREADS");
        per_sample(record, |s| {
            if !record.genotypes[s].is_called() {
                return None;
            }
            let diffs: Vec<i64> = gb?
                .text(s)?
                .split(['|', '/'])
                .map(|d| d.trim().parse::<i64>())
                .collect::<Result<_, _>>()
                .ok()?;
            let support = parse_allreads(allreads.and_then(|a| a.text(s)));
            diffs
                .iter()
                .map(|d| support.get(d).copied().unwrap_or(0.0))
                .reduce(f64::min)
                .filter(|&min| min < self.threshold)
        })
    }
}

/// Which GangSTR expansion probability a [`ExpansionProb`] filter checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpansionKind {
    Het,
    Hom,
    Total,
}

/// GangSTR: fires when the QEXP probability of an expansion is below a threshold
///
/// QEXP holds the probabilities of no expansion, a heterozygous expansion and
/// a homozygous expansion.
#[derive(Debug, Clone)]
pub struct ExpansionProb {
    kind: ExpansionKind,
    threshold: f64,
}

impl ExpansionProb {
    pub fn new(kind: ExpansionKind, threshold: f64) -> Self {
        Self { kind, threshold }
    }
}

impl CallFilter for ExpansionProb {
    fn name(&self) -> &str {
        match self.kind {
            ExpansionKind::Het => "GangSTRCallExpansionProbHet",
            ExpansionKind::Hom => "GangSTRCallExpansionProbHom",
            ExpansionKind::Total => "GangSTRCallExpansionProbTotal",
        }
    }

    fn required_fields(&self) -> Vec<&str> {
        vec!["QEXP"]
    }

    fn evaluate(&self, record: &TrRecord) -> Vec<Option<f64>> {
        let Some(qexp) = record.field("QEXP") else {
            return vec![None; record.num_samples()];
        };
        per_sample(record, |s| {
            let probs = qexp.numbers(s);
            let het = probs.get(1).copied().flatten();
            let hom = probs.get(2).copied().flatten();
            let prob = match self.kind {
                ExpansionKind::Het => het?,
                ExpansionKind::Hom => hom?,
                ExpansionKind::Total => het? + hom?,
            };
            Some(prob).filter(|&p| p < self.threshold)
        })
    }
}

/// GangSTR read class counts from RC: enclosing, spanning, FRR, bounding
fn read_classes(record: &TrRecord, sample: usize) -> Option<[f64; 4]> {
    let text = record.field("RC")?.text(sample)?;
    let counts: Vec<f64> = text
        .split(',')
        .map(|c| c.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .ok()?;
    counts.try_into().ok()
}

/// GangSTR: fires for calls supported by a restricted set of read classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadClassFilter {
    /// Only spanning reads
    SpanOnly,
    /// Only spanning and bounding reads
    SpanBoundOnly,
}

impl CallFilter for ReadClassFilter {
    fn name(&self) -> &str {
        match self {
            ReadClassFilter::SpanOnly => "GangSTRCallSpanOnly",
            ReadClassFilter::SpanBoundOnly => "GangSTRCallSpanBoundOnly",
        }
    }

    fn required_fields(&self) -> Vec<&str> {
        vec!["RC"]
    }

    fn evaluate(&self, record: &TrRecord) -> Vec<Option<f64>> {
        per_sample(record, |s| {
            let [enclosing, spanning, frr, bounding] = read_classes(record, s)?;
            match self {
                ReadClassFilter::SpanOnly if enclosing == 0.0 && frr == 0.0 && bounding == 0.0 => {
                    Some(spanning)
                }
                ReadClassFilter::SpanBoundOnly if enclosing == 0.0 && frr == 0.0 => {
                    Some(spanning + bounding)
                }
                _ => None,
            }
        })
    }
}

/// GangSTR: fires when a maximum likelihood copy number (REPCN) lies outside
/// its confidence interval (REPCI, `lo-hi,lo-hi`); reports that copy number
#[derive(Debug, Clone, Default)]
pub struct BadConfidenceInterval;

impl CallFilter for BadConfidenceInterval {
    fn name(&self) -> &str {
        "GangSTRCallBadCI"
    }

    fn required_fields(&self) -> Vec<&str> {
        vec!["REPCN", "REPCI"]
    }

    fn evaluate(&self, record: &TrRecord) -> Vec<Option<f64>> {
        let (Some(repcn), Some(repci)) = (record.field("REPCN"), record.field("REPCI")) else {
            return vec![None; record.num_samples()];
        };
        per_sample(record, |s| {
            let intervals = repci.text(s)?;
            repcn
                .numbers(s)
                .into_iter()
                .zip(intervals.split(','))
                .find_map(|(copies, interval)| {
                    let copies = copies?;
                    let (lo, hi) = interval.split_once('-')?;
                    let lo = lo.trim().parse::<f64>().ok()?;
                    let hi = hi.trim().parse::<f64>().ok()?;
                    (copies < lo || copies > hi).then_some(copies)
                })
        })
    }
}

/// popSTR: fires when some called allele has fewer than `threshold` reads in AD
#[derive(Debug, Clone)]
pub struct RequireSupport {
    threshold: f64,
}

impl RequireSupport {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl CallFilter for RequireSupport {
    fn name(&self) -> &str {
        "PopSTRCallRequireSupport"
    }

    fn required_fields(&self) -> Vec<&str> {
        vec!["AD"]
    }

    fn evaluate(&self, record: &TrRecord) -> Vec<Option<f64>> {
        let Some(ad) = record.field("AD") else {
            return vec![None; record.num_samples()];
        };
        per_sample(record, |s| {
            let gt = &record.genotypes[s];
            if !gt.is_called() {
                return None;
            }
            let depths = ad.numbers(s);
            gt.called_alleles()
                .map(|allele| depths.get(allele).copied().flatten().unwrap_or(0.0))
                .reduce(f64::min)
                .filter(|&min| min < self.threshold)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Allele, FieldValues, Genotype};

    fn record(genotypes: Vec<Genotype>) -> TrRecord {
        TrRecord::new(
            "chr1",
            500,
            "AAT",
            Allele::Sequence("AATAATAAT".to_string()),
            vec![Allele::Sequence("AATAATAATAAT".to_string())],
            genotypes,
        )
    }

    fn ints(values: &[Option<i32>]) -> FieldValues {
        FieldValues::Integer(values.iter().map(|v| vec![*v]).collect())
    }

    fn texts(values: &[Option<&str>]) -> FieldValues {
        FieldValues::Text(values.iter().map(|v| v.map(str::to_string)).collect())
    }

    #[test]
    fn test_min_value() {
        let rec = record(vec![Genotype::called(&[0, 1]); 4])
            .with_field("DP", ints(&[Some(5), Some(15), Some(10), None]))
            .unwrap();
        let filter = MinValue::new("MinDepth", "DP", 10.0);
        assert_eq!(filter.evaluate(&rec), vec![Some(5.0), None, None, None]);
        assert_eq!(filter.required_fields(), vec!["DP"]);
    }

    #[test]
    fn test_max_value_and_missing_field() {
        let rec = record(vec![Genotype::called(&[0, 1]); 2])
            .with_field("DP", ints(&[Some(50), Some(150)]))
            .unwrap();
        assert_eq!(
            MaxValue::new("MaxDepth", "DP", 100.0).evaluate(&rec),
            vec![None, Some(150.0)]
        );
        assert_eq!(
            MaxValue::new("MaxQ", "Q", 0.5).evaluate(&rec),
            vec![None, None]
        );
    }

    #[test]
    fn test_read_fraction() {
        let rec = record(vec![Genotype::called(&[0, 0]); 3])
            .with_field("DP", ints(&[Some(10), Some(10), Some(0)]))
            .unwrap()
            .with_field("DSTUTTER", ints(&[Some(1), Some(5), Some(3)]))
            .unwrap();
        let filter = MaxReadFraction::hipstr_stutter(0.2);
        assert_eq!(filter.evaluate(&rec), vec![None, Some(0.5), None]);
        assert_eq!(filter.required_fields(), vec!["DP", "DSTUTTER"]);
    }

    #[test]
    fn test_min_supporting_reads() {
        let rec = record(vec![
            Genotype::called(&[0, 1]),
            Genotype::called(&[0, 1]),
            Genotype::missing(2),
            Genotype::called(&[1, 1]),
        ])
        .with_field("GB", texts(&[Some("0|3"), Some("0|3"), None, Some("3|3")]))
        .unwrap()
        .with_field(
            "ALLREADS",
            texts(&[Some("0|10;3|2"), Some("0|10;3|8"), None, None]),
        )
        .unwrap();
        let filter = MinSupportingReads::new(5.0);
        assert_eq!(filter.evaluate(&rec), vec![Some(2.0), None, None, Some(0.0)]);
    }

    #[test]
    fn test_expansion_probabilities() {
        let rec = record(vec![Genotype::called(&[0, 1]); 2])
            .with_field(
                "QEXP",
                FieldValues::Float(vec![
                    vec![Some(0.8), Some(0.15), Some(0.05)],
                    vec![Some(0.1), Some(0.6), Some(0.3)],
                ]),
            )
            .unwrap();
        let het = ExpansionProb::new(ExpansionKind::Het, 0.5).evaluate(&rec);
        assert!((het[0].unwrap() - 0.15).abs() < 1e-6);
        assert_eq!(het[1], None);

        let hom = ExpansionProb::new(ExpansionKind::Hom, 0.1).evaluate(&rec);
        assert!(hom[0].is_some());
        assert!(hom[1].is_none());

        let total = ExpansionProb::new(ExpansionKind::Total, 0.5).evaluate(&rec);
        assert!((total[0].unwrap() - 0.2).abs() < 1e-6);
        assert_eq!(total[1], None);
    }

    #[test]
    fn test_read_class_filters() {
        let rec = record(vec![Genotype::called(&[0, 1]); 3])
            .with_field("RC", texts(&[Some("0,12,0,0"), Some("0,5,0,3"), Some("4,5,0,3")]))
            .unwrap();
        assert_eq!(
            ReadClassFilter::SpanOnly.evaluate(&rec),
            vec![Some(12.0), None, None]
        );
        assert_eq!(
            ReadClassFilter::SpanBoundOnly.evaluate(&rec),
            vec![Some(12.0), Some(8.0), None]
        );
    }

    #[test]
    fn test_bad_confidence_interval() {
        let rec = record(vec![Genotype::called(&[0, 1]); 2])
            .with_field(
                "REPCN",
                FieldValues::Integer(vec![vec![Some(3), Some(12)], vec![Some(3), Some(5)]]),
            )
            .unwrap()
            .with_field("REPCI", texts(&[Some("3-3,10-11"), Some("2-4,4-6")]))
            .unwrap();
        assert_eq!(BadConfidenceInterval.evaluate(&rec), vec![Some(12.0), None]);
    }

    #[test]
    fn test_require_support() {
        let rec = record(vec![
            Genotype::called(&[0, 1]),
            Genotype::called(&[0, 0]),
            Genotype::missing(2),
        ])
        .with_field(
            "AD",
            FieldValues::Integer(vec![
                vec![Some(10), Some(1)],
                vec![Some(7), Some(0)],
                vec![None, None],
            ]),
        )
        .unwrap();
        assert_eq!(
            RequireSupport::new(2.0).evaluate(&rec),
            vec![Some(1.0), None, None]
        );
    }
}
