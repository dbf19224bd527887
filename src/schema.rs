//! Header declarations of the annotations written by the filter engine
//!
//! The input header may already declare some of these IDs. A declaration
//! with the same Type and Number is reused (its values get overwritten);
//! anything else is a [`StrqcError::SchemaConflict`].

use crate::filters::LocusFilter;
use crate::stats::NO_CALLS_REMAINING;
use crate::{StrqcError, StrqcResult};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderKind {
    Info,
    Format,
}

impl fmt::Display for HeaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderKind::Info => write!(f, "INFO"),
            HeaderKind::Format => write!(f, "FORMAT"),
        }
    }
}

/// One `##INFO` or `##FORMAT` declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDeclaration {
    pub kind: HeaderKind,
    pub id: String,
    pub number: String,
    pub value_type: String,
    pub description: String,
}

impl FieldDeclaration {
    pub fn new(kind: HeaderKind, id: &str, number: &str, value_type: &str, description: &str) -> Self {
        Self {
            kind,
            id: id.to_string(),
            number: number.to_string(),
            value_type: value_type.to_string(),
            description: description.to_string(),
        }
    }

    pub fn header_line(&self) -> String {
        format!(
            "##{}=<ID={},Number={},Type={},Description=\"{}\">",
            self.kind, self.id, self.number, self.value_type, self.description
        )
    }

    fn same_shape(&self, other: &FieldDeclaration) -> bool {
        self.number == other.number && self.value_type == other.value_type
    }
}

/// Annotations the engine writes on every emitted record
pub fn derived_annotations() -> Vec<FieldDeclaration> {
    vec![
        FieldDeclaration::new(
            HeaderKind::Format,
            "FILTER",
            "1",
            "String",
            "call-level filters that have been applied",
        ),
        FieldDeclaration::new(HeaderKind::Info, "AC", "A", "Integer", "Alternate allele counts"),
        FieldDeclaration::new(HeaderKind::Info, "REFAC", "1", "Integer", "Reference allele count"),
        FieldDeclaration::new(HeaderKind::Info, "HET", "1", "Float", "Heterozygosity"),
        FieldDeclaration::new(
            HeaderKind::Info,
            "HWEP",
            "1",
            "Float",
            "HWE p-value for obs. vs. exp het rate",
        ),
        FieldDeclaration::new(
            HeaderKind::Info,
            "HRUN",
            "1",
            "Integer",
            "Length of longest homopolymer run",
        ),
    ]
}

/// How a derived annotation relates to the input header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Not declared yet; the declaration must be added
    Add,
    /// Declared identically
    Keep,
    /// Declared with the same shape but another description
    Overwrite,
}

pub fn resolve_declaration(
    wanted: &FieldDeclaration,
    existing: Option<&FieldDeclaration>,
) -> StrqcResult<Resolution> {
    let Some(existing) = existing else {
        return Ok(Resolution::Add);
    };
    if !wanted.same_shape(existing) {
        return Err(StrqcError::SchemaConflict {
            kind: wanted.kind.to_string().to_lowercase(),
            id: wanted.id.clone(),
        });
    }
    if wanted.description != existing.description {
        log::warn!("Overwriting the preexisting {} {} field", wanted.kind, wanted.id);
        return Ok(Resolution::Overwrite);
    }
    Ok(Resolution::Keep)
}

pub fn filter_header_line(id: &str, description: &str) -> String {
    format!("##FILTER=<ID={},Description=\"{}\">", id, description)
}

/// Description of the locus FILTER reason for loci left without calls
pub const NO_CALLS_REMAINING_DESCRIPTION: &str = "All calls at this locus were already nocalls or \
    were individually filtered before the locus level filters were applied.";

/// Header lines to append to the input header
///
/// `fields` are the input's INFO and FORMAT declarations, `filters` maps its
/// FILTER IDs to their descriptions.
pub fn plan_header(
    fields: &[FieldDeclaration],
    filters: &HashMap<String, String>,
    locus_filters: &[Box<dyn LocusFilter>],
    command: &str,
) -> StrqcResult<Vec<String>> {
    let mut lines = Vec::new();

    for wanted in derived_annotations() {
        let existing = fields
            .iter()
            .find(|f| f.kind == wanted.kind && f.id == wanted.id);
        if resolve_declaration(&wanted, existing)? == Resolution::Add {
            lines.push(wanted.header_line());
        }
    }

    let mut wanted_filters = vec![(
        NO_CALLS_REMAINING.to_string(),
        NO_CALLS_REMAINING_DESCRIPTION.to_string(),
    )];
    wanted_filters.extend(
        locus_filters
            .iter()
            .map(|f| (f.name().to_string(), f.description())),
    );
    for (id, description) in wanted_filters {
        match filters.get(&id) {
            None => lines.push(filter_header_line(&id, &description)),
            Some(existing) if *existing != description => log::warn!(
                "Using locus level filter {} which has the same name as a FILTER field that \
                 already exists in the input VCF. Its meaning in the output may differ",
                id
            ),
            Some(_) => {}
        }
    }

    lines.push(format!("##command-strqc={}", command));
    Ok(lines)
}
