//! Per-locus filtering pipeline
//!
//! A record goes through the call-level filters, has its filtered calls
//! masked, is checked against the locus-level filters and, if it is kept,
//! gets its locus annotations recomputed from the surviving calls.

use crate::filters::{CallFilter, LocusFilter};
use crate::mask::mask_samples;
use crate::metrics;
use crate::record::{FieldValues, TrRecord, FILTER_FIELD};
use crate::stats::{LocusStats, SampleStats, NO_CALLS_REMAINING, PASS};
use crate::utils::format_g;
use crate::{StrqcError, StrqcResult};

/// Per-sample FILTER text of samples that were uncalled before filtering
pub const NOCALL: &str = "NOCALL";

/// FORMAT fields read as call depth, in order of preference
pub const DEPTH_FIELDS: [&str; 2] = ["DP", "LC"];

/// Record after call-level filtering
#[derive(Debug, Clone, PartialEq)]
pub struct CallFilterOutcome {
    pub record: TrRecord,
    /// Samples masked by a call-level filter
    pub masked: Vec<bool>,
}

/// Run every call filter over `record`, write the per-sample FILTER text,
/// mask filtered calls and update `stats`
///
/// Filters are evaluated in order and their trigger text is joined with
/// commas. Samples that were already uncalled get `NOCALL` and never count
/// towards a filter. Passing calls add their depth to the sample's total;
/// a negative depth on a passing call is an error.
pub fn apply_call_filters(
    mut record: TrRecord,
    filters: &[Box<dyn CallFilter>],
    stats: &mut SampleStats,
) -> StrqcResult<CallFilterOutcome> {
    let num_samples = record.num_samples();
    let nocall: Vec<bool> = record.called_samples().iter().map(|c| !c).collect();
    let mut texts = vec![String::new(); num_samples];

    for (filter_index, filter) in filters.iter().enumerate() {
        let values = filter.evaluate(&record);
        if values.iter().all(Option::is_none) {
            continue;
        }
        for (sample, value) in values.iter().enumerate().take(num_samples) {
            let Some(value) = value else {
                continue;
            };
            if !nocall[sample] {
                stats.record_filter_trigger(filter_index, sample);
            }
            let text = &mut texts[sample];
            if !text.is_empty() {
                text.push(',');
            }
            text.push_str(&format!("{}_{}", filter.name(), format_g(*value)));
        }
    }

    for (text, &uncalled) in texts.iter_mut().zip(&nocall) {
        if uncalled {
            *text = NOCALL.to_string();
        } else if text.is_empty() {
            *text = PASS.to_string();
        }
    }

    let passing: Vec<bool> = texts.iter().map(|t| t == PASS).collect();
    let masked: Vec<bool> = texts.iter().map(|t| t != PASS && t != NOCALL).collect();

    record.set_field(
        FILTER_FIELD,
        FieldValues::Text(texts.into_iter().map(Some).collect()),
    )?;

    accumulate_depth(&record, &passing, stats)?;

    let record = if masked.iter().any(|&m| m) {
        mask_samples(record, &masked)
    } else {
        record
    };
    Ok(CallFilterOutcome { record, masked })
}

fn accumulate_depth(
    record: &TrRecord,
    passing: &[bool],
    stats: &mut SampleStats,
) -> StrqcResult<()> {
    let depth = DEPTH_FIELDS.iter().find_map(|name| record.field(name));

    // without a depth field every sample's depth total becomes undefined
    let Some(depth) = depth else {
        for (sample, &p) in passing.iter().enumerate() {
            if p {
                stats.record_passing_call(sample);
            }
            stats.poison_depth(sample);
        }
        return Ok(());
    };

    let negative: Vec<String> = passing
        .iter()
        .enumerate()
        .filter(|&(sample, &p)| p && depth.number(sample).is_some_and(|dp| dp < 0.0))
        .map(|(sample, _)| {
            stats
                .samples()
                .get(sample)
                .cloned()
                .unwrap_or_else(|| sample.to_string())
        })
        .collect();
    if !negative.is_empty() {
        return Err(StrqcError::NegativeDepth {
            chrom: record.chrom.clone(),
            pos: record.pos,
            samples: negative,
        });
    }

    for (sample, _) in passing.iter().enumerate().filter(|&(_, &p)| p) {
        stats.record_passing_call(sample);
        match depth.number(sample) {
            Some(dp) if dp > 0.0 => stats.add_depth(sample, dp),
            Some(_) => {}
            None => stats.poison_depth(sample),
        }
    }
    Ok(())
}

/// Run the locus filters over `record` and update `stats`
///
/// Every firing filter is counted. Unless `drop_filtered` is set, reason
/// codes are joined with `;` into the record's FILTER status, which becomes
/// `PASS` when nothing fired. A locus without any called sample is always
/// filtered with `NO_CALLS_REMAINING`. Returns whether the locus was
/// filtered.
pub fn apply_locus_filters(
    record: &mut TrRecord,
    filters: &[Box<dyn LocusFilter>],
    stats: &mut LocusStats,
    drop_filtered: bool,
) -> bool {
    let mut reasons: Vec<&str> = Vec::new();
    for (filter_index, filter) in filters.iter().enumerate() {
        if filter.evaluate(record).is_none() {
            continue;
        }
        stats.record_filter(filter_index);
        reasons.push(filter.name());
    }

    let called = record.num_called();
    if called == 0 {
        stats.record_no_calls_remaining();
        reasons.push(NO_CALLS_REMAINING);
    }

    let filtered = !reasons.is_empty();
    if !filtered {
        stats.record_pass(called);
    }
    if !drop_filtered {
        record.filter = Some(if filtered {
            reasons.join(";")
        } else {
            PASS.to_string()
        });
    }
    filtered
}

/// Locus annotations recomputed after filtering
#[derive(Debug, Clone, PartialEq)]
pub struct LocusInfo {
    /// Longest homopolymer run of the reference, 0 when only its length is known
    pub homopolymer_run: usize,
    pub heterozygosity: f64,
    pub hwe_pvalue: f64,
    /// One count per alternate allele, a single 0 when there is none
    pub alt_counts: Vec<usize>,
    pub ref_count: usize,
}

pub fn compute_locus_info(record: &TrRecord, use_length: bool) -> LocusInfo {
    let homopolymer_run = record
        .homopolymer_sequence()
        .map(metrics::homopolymer_run)
        .unwrap_or(0);

    if record.num_called() == 0 {
        return LocusInfo {
            homopolymer_run,
            heterozygosity: metrics::NO_CALLS_METRIC,
            hwe_pvalue: metrics::NO_CALLS_METRIC,
            alt_counts: vec![0; record.alt_alleles.len().max(1)],
            ref_count: 0,
        };
    }

    let freqs = metrics::allele_freqs(record, use_length);
    let genotypes = metrics::genotype_counts(record, use_length);
    let counts = metrics::allele_index_counts(record);
    let alt_counts = if counts.len() > 1 {
        counts[1..].to_vec()
    } else {
        vec![0]
    };

    LocusInfo {
        homopolymer_run,
        heterozygosity: metrics::heterozygosity(&freqs),
        hwe_pvalue: metrics::hwe_binomial_test(&freqs, &genotypes),
        alt_counts,
        ref_count: counts.first().copied().unwrap_or(0),
    }
}

/// What happened to a record
#[derive(Debug, Clone, PartialEq)]
pub enum LocusOutcome {
    /// Filtered with dropping enabled; nothing is written
    Dropped,
    Emitted {
        record: TrRecord,
        info: LocusInfo,
        masked: Vec<bool>,
    },
}

/// Ordered call and locus filter sets plus output options
pub struct FilterEngine {
    call_filters: Vec<Box<dyn CallFilter>>,
    locus_filters: Vec<Box<dyn LocusFilter>>,
    drop_filtered: bool,
    use_length: bool,
}

impl FilterEngine {
    pub fn new(
        call_filters: Vec<Box<dyn CallFilter>>,
        locus_filters: Vec<Box<dyn LocusFilter>>,
    ) -> Self {
        Self {
            call_filters,
            locus_filters,
            drop_filtered: false,
            use_length: false,
        }
    }

    pub fn with_drop_filtered(mut self, drop_filtered: bool) -> Self {
        self.drop_filtered = drop_filtered;
        self
    }

    pub fn with_use_length(mut self, use_length: bool) -> Self {
        self.use_length = use_length;
        self
    }

    pub fn call_filters(&self) -> &[Box<dyn CallFilter>] {
        &self.call_filters
    }

    pub fn locus_filters(&self) -> &[Box<dyn LocusFilter>] {
        &self.locus_filters
    }

    /// Empty per-sample statistics with one counter per call filter
    pub fn new_sample_stats(&self, samples: Vec<String>) -> SampleStats {
        SampleStats::new(samples, self.call_filters.iter().map(|f| f.name()))
    }

    /// Empty per-locus statistics with one counter per locus filter
    pub fn new_locus_stats(&self) -> LocusStats {
        LocusStats::new(self.locus_filters.iter().map(|f| f.name()))
    }

    pub fn process_record(
        &self,
        record: TrRecord,
        sample_stats: &mut SampleStats,
        locus_stats: &mut LocusStats,
    ) -> StrqcResult<LocusOutcome> {
        log::debug!("Processing {}:{}", record.chrom, record.pos);

        let CallFilterOutcome { mut record, masked } =
            apply_call_filters(record, &self.call_filters, sample_stats)?;

        let filtered = apply_locus_filters(
            &mut record,
            &self.locus_filters,
            locus_stats,
            self.drop_filtered,
        );
        if filtered && self.drop_filtered {
            return Ok(LocusOutcome::Dropped);
        }

        let info = compute_locus_info(&record, self.use_length);
        Ok(LocusOutcome::Emitted {
            record,
            info,
            masked,
        })
    }
}
