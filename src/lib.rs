//! # strqc - Tandem Repeat Call Quality Control
//!
//! Call-level and locus-level filtering of tandem repeat genotype calls from
//! HipSTR, GangSTR, adVNTR, ExpansionHunter and popSTR VCFs, with per-sample
//! and per-locus filter statistics.

pub mod config;
pub mod engine;
pub mod filters;
pub mod logs;
pub mod mask;
pub mod metrics;
pub mod record;
pub mod regions;
pub mod schema;
pub mod stats;
pub mod utils;
pub mod vcf;

use std::fmt;
use std::str::FromStr;

/// Genotyping tool that produced a VCF
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VcfType {
    HipStr,
    GangStr,
    AdVntr,
    ExpansionHunter,
    PopStr,
}

impl VcfType {
    pub const ALL: [VcfType; 5] = [
        VcfType::HipStr,
        VcfType::GangStr,
        VcfType::AdVntr,
        VcfType::ExpansionHunter,
        VcfType::PopStr,
    ];

    /// INFO keys that may carry the repeat motif, in lookup order
    ///
    /// HipSTR only writes `INFO/PERIOD`; its motif is inferred from the
    /// trimmed reference allele.
    pub fn motif_keys(&self) -> &'static [&'static str] {
        match self {
            VcfType::HipStr => &[],
            VcfType::GangStr | VcfType::AdVntr | VcfType::ExpansionHunter => &["RU"],
            VcfType::PopStr => &["Motif", "RU"],
        }
    }
}

impl fmt::Display for VcfType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VcfType::HipStr => "hipstr",
            VcfType::GangStr => "gangstr",
            VcfType::AdVntr => "advntr",
            VcfType::ExpansionHunter => "eh",
            VcfType::PopStr => "popstr",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for VcfType {
    type Err = StrqcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hipstr" => Ok(VcfType::HipStr),
            "gangstr" => Ok(VcfType::GangStr),
            "advntr" => Ok(VcfType::AdVntr),
            "eh" | "expansionhunter" => Ok(VcfType::ExpansionHunter),
            "popstr" => Ok(VcfType::PopStr),
            other => Err(StrqcError::InvalidConfig(format!(
                "Unknown VCF type '{}'. Options: hipstr, gangstr, advntr, eh, popstr, auto",
                other
            ))),
        }
    }
}

/// Error types for the strqc library
#[derive(Debug, thiserror::Error)]
pub enum StrqcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTSlib error: {0}")]
    Htslib(#[from] rust_htslib::errors::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Could not parse VCF record: {0}")]
    InvalidRecord(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(
        "The {kind} field '{id}' is present in the input VCF and doesn't have the expected \
         Type and Number. Rename or remove the field and rerun"
    )]
    SchemaConflict { kind: String, id: String },

    #[error("The following samples have calls but negative DP values at chromosome {chrom} pos {pos}: {samples:?}")]
    NegativeDepth {
        chrom: String,
        pos: u64,
        samples: Vec<String>,
    },

    #[error("Found an unexpected format type '{kind}' for format field {field}")]
    UnsupportedFieldType { field: String, kind: String },
}

pub type StrqcResult<T> = Result<T, StrqcError>;
