//! Harmonized tandem repeat record model
//!
//! Every calling tool's VCF record is converted into a [`TrRecord`] before
//! filtering. Missing per-sample data is represented as `None`; the legacy
//! VCF sentinels only exist in the [`crate::vcf`] bridge.

use crate::{StrqcError, StrqcResult};

/// Per-sample FORMAT field holding the call-level filter text
pub const FILTER_FIELD: &str = "FILTER";
/// Genotype FORMAT key, never stored among the typed fields
pub const GT_FIELD: &str = "GT";

/// One allele, either with an explicit sequence or only a length in bp
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Allele {
    Sequence(String),
    Length(usize),
}

impl Allele {
    /// Allele length in base pairs
    pub fn length(&self) -> usize {
        match self {
            Allele::Sequence(seq) => seq.len(),
            Allele::Length(len) => *len,
        }
    }

    pub fn sequence(&self) -> Option<&str> {
        match self {
            Allele::Sequence(seq) => Some(seq),
            Allele::Length(_) => None,
        }
    }

    pub fn is_length_only(&self) -> bool {
        matches!(self, Allele::Length(_))
    }
}

/// A single sample's genotype as allele indices (0 = reference)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Genotype {
    pub alleles: Vec<Option<usize>>,
    pub phased: bool,
}

impl Genotype {
    pub fn new(alleles: Vec<Option<usize>>, phased: bool) -> Self {
        Self { alleles, phased }
    }

    /// Shorthand for a fully called, unphased genotype
    pub fn called(alleles: &[usize]) -> Self {
        Self::new(alleles.iter().map(|&a| Some(a)).collect(), false)
    }

    pub fn missing(ploidy: usize) -> Self {
        Self::new(vec![None; ploidy], false)
    }

    pub fn ploidy(&self) -> usize {
        self.alleles.len()
    }

    /// A sample is called only if every allele of its genotype is present
    pub fn is_called(&self) -> bool {
        !self.alleles.is_empty() && self.alleles.iter().all(Option::is_some)
    }

    pub fn called_alleles(&self) -> impl Iterator<Item = usize> + '_ {
        self.alleles.iter().flatten().copied()
    }
}

/// Typed per-sample values of one FORMAT field
///
/// Numeric fields keep every value of a sample (e.g. QEXP has three),
/// string fields hold one string per sample.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValues {
    Integer(Vec<Vec<Option<i32>>>),
    Float(Vec<Vec<Option<f32>>>),
    Text(Vec<Option<String>>),
}

impl FieldValues {
    pub fn num_samples(&self) -> usize {
        match self {
            FieldValues::Integer(values) => values.len(),
            FieldValues::Float(values) => values.len(),
            FieldValues::Text(values) => values.len(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValues::Integer(_) => "Integer",
            FieldValues::Float(_) => "Float",
            FieldValues::Text(_) => "String",
        }
    }

    /// All values of a numeric field for one sample, widened to f64
    pub fn numbers(&self, sample: usize) -> Vec<Option<f64>> {
        match self {
            FieldValues::Integer(values) => values
                .get(sample)
                .map(|v| v.iter().map(|x| x.map(f64::from)).collect())
                .unwrap_or_default(),
            FieldValues::Float(values) => values
                .get(sample)
                .map(|v| {
                    v.iter()
                        .map(|x| x.map(f64::from).filter(|f| !f.is_nan()))
                        .collect()
                })
                .unwrap_or_default(),
            FieldValues::Text(_) => Vec::new(),
        }
    }

    /// First value of a numeric field for one sample
    pub fn number(&self, sample: usize) -> Option<f64> {
        self.numbers(sample).into_iter().next().flatten()
    }

    pub fn text(&self, sample: usize) -> Option<&str> {
        match self {
            FieldValues::Text(values) => values.get(sample).and_then(|v| v.as_deref()),
            _ => None,
        }
    }

    /// Copy of these values with every flagged sample set to missing
    ///
    /// Numeric samples keep their arity so the writer can emit the same
    /// number of values.
    pub fn masked(&self, flagged: &[bool]) -> FieldValues {
        let is_flagged = |idx: usize| flagged.get(idx).copied().unwrap_or(false);
        match self {
            FieldValues::Integer(values) => FieldValues::Integer(
                values
                    .iter()
                    .enumerate()
                    .map(|(idx, v)| {
                        if is_flagged(idx) {
                            vec![None; v.len().max(1)]
                        } else {
                            v.clone()
                        }
                    })
                    .collect(),
            ),
            FieldValues::Float(values) => FieldValues::Float(
                values
                    .iter()
                    .enumerate()
                    .map(|(idx, v)| {
                        if is_flagged(idx) {
                            vec![None; v.len().max(1)]
                        } else {
                            v.clone()
                        }
                    })
                    .collect(),
            ),
            FieldValues::Text(values) => FieldValues::Text(
                values
                    .iter()
                    .enumerate()
                    .map(|(idx, v)| if is_flagged(idx) { None } else { v.clone() })
                    .collect(),
            ),
        }
    }
}

/// One tandem repeat locus with its per-sample calls
#[derive(Debug, Clone, PartialEq)]
pub struct TrRecord {
    pub chrom: String,
    /// 1-based position of the first reference base
    pub pos: u64,
    pub record_id: Option<String>,
    pub motif: String,
    pub ref_allele: Allele,
    pub alt_alleles: Vec<Allele>,
    /// Untrimmed allele sequences (reference first) when the caller reports flanks
    pub full_alleles: Option<Vec<String>>,
    pub genotypes: Vec<Genotype>,
    pub format: Vec<(String, FieldValues)>,
    /// Locus-level FILTER status
    pub filter: Option<String>,
}

impl TrRecord {
    pub fn new(
        chrom: impl Into<String>,
        pos: u64,
        motif: impl Into<String>,
        ref_allele: Allele,
        alt_alleles: Vec<Allele>,
        genotypes: Vec<Genotype>,
    ) -> Self {
        Self {
            chrom: chrom.into(),
            pos,
            record_id: None,
            motif: motif.into(),
            ref_allele,
            alt_alleles,
            full_alleles: None,
            genotypes,
            format: Vec::new(),
            filter: None,
        }
    }

    /// Attach or replace a FORMAT field, checking it has one entry per sample
    pub fn with_field(mut self, name: &str, values: FieldValues) -> StrqcResult<Self> {
        self.set_field(name, values)?;
        Ok(self)
    }

    pub fn set_field(&mut self, name: &str, values: FieldValues) -> StrqcResult<()> {
        if name == GT_FIELD {
            return Err(StrqcError::InvalidRecord(format!(
                "{}:{} genotypes cannot be stored as a typed field",
                self.chrom, self.pos
            )));
        }
        if values.num_samples() != self.num_samples() {
            return Err(StrqcError::InvalidRecord(format!(
                "{}:{} field {} has {} entries but the record has {} samples",
                self.chrom,
                self.pos,
                name,
                values.num_samples(),
                self.num_samples()
            )));
        }
        match self.format.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = values,
            None => self.format.push((name.to_string(), values)),
        }
        Ok(())
    }

    pub fn with_full_alleles(mut self, full_alleles: Vec<String>) -> Self {
        self.full_alleles = Some(full_alleles);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldValues> {
        self.format
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, values)| values)
    }

    pub fn num_samples(&self) -> usize {
        self.genotypes.len()
    }

    /// Number of alleles including the reference
    pub fn num_alleles(&self) -> usize {
        self.alt_alleles.len() + 1
    }

    /// Allele by genotype index, 0 being the reference
    pub fn allele(&self, index: usize) -> Option<&Allele> {
        if index == 0 {
            Some(&self.ref_allele)
        } else {
            self.alt_alleles.get(index - 1)
        }
    }

    pub fn called_samples(&self) -> Vec<bool> {
        self.genotypes.iter().map(Genotype::is_called).collect()
    }

    pub fn num_called(&self) -> usize {
        self.genotypes.iter().filter(|gt| gt.is_called()).count()
    }

    pub fn max_ploidy(&self) -> usize {
        self.genotypes.iter().map(Genotype::ploidy).max().unwrap_or(0)
    }

    pub fn has_length_only_ref(&self) -> bool {
        self.ref_allele.is_length_only()
    }

    pub fn has_length_only_alts(&self) -> bool {
        self.alt_alleles.iter().any(Allele::is_length_only)
    }

    /// 0-based half-open span covered by the reference allele
    pub fn ref_span(&self) -> (u64, u64) {
        let start = self.pos.saturating_sub(1);
        (start, start + self.ref_allele.length().max(1) as u64)
    }

    /// Sequence to scan for homopolymer runs: the full reference if known
    pub fn homopolymer_sequence(&self) -> Option<&str> {
        match &self.full_alleles {
            Some(full) => full.first().map(String::as_str),
            None => self.ref_allele.sequence(),
        }
    }
}
