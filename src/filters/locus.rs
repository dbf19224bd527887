//! Locus-level filters
//!
//! A locus filter looks at the whole (already call-filtered) record and
//! returns the metric that made it fire, or `None` when the locus passes.
//! Its `name` is the reason code written to the FILTER column.

use crate::metrics;
use crate::record::TrRecord;
use crate::regions::RegionSet;
use crate::utils::format_float;

pub trait LocusFilter {
    fn name(&self) -> &str;

    /// Text for the `##FILTER` header line
    fn description(&self) -> String;

    fn evaluate(&self, record: &TrRecord) -> Option<f64>;
}

/// Fires when the fraction of called samples is below a threshold
#[derive(Debug, Clone)]
pub struct MinCallRate {
    name: String,
    threshold: f64,
}

impl MinCallRate {
    pub fn new(threshold: f64) -> Self {
        Self {
            name: format!("CALLRATE{}", format_float(threshold)),
            threshold,
        }
    }
}

impl LocusFilter for MinCallRate {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        format!("Locus call rate below {}", format_float(self.threshold))
    }

    fn evaluate(&self, record: &TrRecord) -> Option<f64> {
        if record.num_samples() == 0 {
            return None;
        }
        let callrate = record.num_called() as f64 / record.num_samples() as f64;
        (callrate < self.threshold).then_some(callrate)
    }
}

/// Fires when the Hardy-Weinberg p-value is below a threshold
#[derive(Debug, Clone)]
pub struct MinHwePvalue {
    name: String,
    threshold: f64,
    use_length: bool,
}

impl MinHwePvalue {
    pub fn new(threshold: f64, use_length: bool) -> Self {
        Self {
            name: format!("HWE{}", format_float(threshold)),
            threshold,
            use_length,
        }
    }
}

impl LocusFilter for MinHwePvalue {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        format!("Locus HWE p-value below {}", format_float(self.threshold))
    }

    fn evaluate(&self, record: &TrRecord) -> Option<f64> {
        if record.num_called() == 0 {
            return None;
        }
        let freqs = metrics::allele_freqs(record, self.use_length);
        let genotypes = metrics::genotype_counts(record, self.use_length);
        let pvalue = metrics::hwe_binomial_test(&freqs, &genotypes);
        (pvalue < self.threshold).then_some(pvalue)
    }
}

/// Which side of a heterozygosity bound a [`HetBound`] enforces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Min,
    Max,
}

/// Fires when heterozygosity falls below (`Min`) or above (`Max`) a threshold
#[derive(Debug, Clone)]
pub struct HetBound {
    name: String,
    bound: Bound,
    threshold: f64,
    use_length: bool,
}

impl HetBound {
    pub fn new(bound: Bound, threshold: f64, use_length: bool) -> Self {
        let prefix = match bound {
            Bound::Min => "HETLOW",
            Bound::Max => "HETHIGH",
        };
        Self {
            name: format!("{}{}", prefix, format_float(threshold)),
            bound,
            threshold,
            use_length,
        }
    }
}

impl LocusFilter for HetBound {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        match self.bound {
            Bound::Min => format!("Locus heterozygosity below {}", format_float(self.threshold)),
            Bound::Max => format!("Locus heterozygosity above {}", format_float(self.threshold)),
        }
    }

    fn evaluate(&self, record: &TrRecord) -> Option<f64> {
        if record.num_called() == 0 {
            return None;
        }
        let het = metrics::heterozygosity(&metrics::allele_freqs(record, self.use_length));
        let fired = match self.bound {
            Bound::Min => het < self.threshold,
            Bound::Max => het > self.threshold,
        };
        fired.then_some(het)
    }
}

/// Fires for penta- and hexanucleotide repeats whose reference contains a
/// homopolymer run at least as long as the motif
#[derive(Debug, Clone, Default)]
pub struct HomopolymerRun;

impl LocusFilter for HomopolymerRun {
    fn name(&self) -> &str {
        "HRUN"
    }

    fn description(&self) -> String {
        "Repeats with long homopolymer runs (>=5bp for pentamers, >=6bp for hexamers)"
            .to_string()
    }

    fn evaluate(&self, record: &TrRecord) -> Option<f64> {
        let motif_len = record.motif.len();
        if !(5..=6).contains(&motif_len) {
            return None;
        }
        let hrun = metrics::homopolymer_run(record.homopolymer_sequence()?);
        (hrun >= motif_len).then_some(hrun as f64)
    }
}

/// Fires when the reference span overlaps a region of a BED file
#[derive(Debug, Clone)]
pub struct RegionFilter {
    name: String,
    regions: RegionSet,
}

impl RegionFilter {
    pub fn new(name: &str, regions: RegionSet) -> Self {
        Self {
            name: name.to_string(),
            regions,
        }
    }
}

impl LocusFilter for RegionFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        format!("Filter loci overlapping {} regions", self.name)
    }

    fn evaluate(&self, record: &TrRecord) -> Option<f64> {
        let (start, end) = record.ref_span();
        self.regions
            .overlaps(&record.chrom, start, end)
            .then_some(1.0)
    }
}
