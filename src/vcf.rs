//! Bridge between htslib VCF records and [`TrRecord`]
//!
//! This is the only place that knows about the VCF missing and vector-end
//! sentinels and about how each calling tool encodes its alleles.

use crate::engine::LocusInfo;
use crate::metrics::infer_repeat_unit;
use crate::record::{Allele, FieldValues, Genotype, TrRecord, FILTER_FIELD, GT_FIELD};
use crate::schema::{FieldDeclaration, HeaderKind};
use crate::{StrqcError, StrqcResult, VcfType};
use rust_htslib::bcf::header::HeaderRecord;
use rust_htslib::bcf::record::GenotypeAllele;
use rust_htslib::bcf::{self, Read};
use rust_htslib::errors::Error as HtslibError;
use std::collections::{HashMap, HashSet};
use std::path::Path;

pub const MISSING_INTEGER: i32 = i32::MIN;
pub const VECTOR_END_INTEGER: i32 = i32::MIN + 1;
const MISSING_FLOAT_BITS: u32 = 0x7F80_0001;
const VECTOR_END_FLOAT_BITS: u32 = 0x7F80_0002;
const MISSING_STRING: &[u8] = b".";

fn missing_float() -> f32 {
    f32::from_bits(MISSING_FLOAT_BITS)
}

fn vector_end_float() -> f32 {
    f32::from_bits(VECTOR_END_FLOAT_BITS)
}

/// Storage type of a FORMAT field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Float,
    Text,
}

impl FieldKind {
    fn from_header(field: &str, value_type: &str) -> StrqcResult<Self> {
        match value_type {
            "Integer" => Ok(FieldKind::Integer),
            "Float" => Ok(FieldKind::Float),
            "String" | "Character" => Ok(FieldKind::Text),
            other => Err(StrqcError::UnsupportedFieldType {
                field: field.to_string(),
                kind: other.to_string(),
            }),
        }
    }
}

fn header_value(values: &HashMap<String, String>, key: &str) -> String {
    values
        .get(key)
        .map(|v| v.trim_matches('"').to_string())
        .unwrap_or_default()
}

/// Guess the calling tool from the `##source` and `##command` header lines
pub fn detect_vcf_type(header: &bcf::header::HeaderView) -> StrqcResult<VcfType> {
    let mut found = HashSet::new();
    for record in header.header_records() {
        let HeaderRecord::Generic { key, value } = record else {
            continue;
        };
        if key != "source" && key != "command" {
            continue;
        }
        let value = value.to_ascii_lowercase();
        let candidates = [
            ("hipstr", VcfType::HipStr),
            ("gangstr", VcfType::GangStr),
            ("advntr", VcfType::AdVntr),
            ("expansionhunter", VcfType::ExpansionHunter),
            ("popstr", VcfType::PopStr),
        ];
        for (needle, vcf_type) in candidates {
            if value.contains(needle) {
                found.insert(vcf_type);
            }
        }
    }
    match found.len() {
        1 => found.into_iter().next().ok_or_else(|| {
            StrqcError::InvalidConfig("Could not identify the VCF type".to_string())
        }),
        0 => Err(StrqcError::InvalidConfig(
            "Could not identify the tool that produced this VCF. Please set --vcftype".to_string(),
        )),
        _ => Err(StrqcError::InvalidConfig(
            "VCF header matches more than one tool. Please set --vcftype".to_string(),
        )),
    }
}

/// Streaming reader yielding harmonized records
pub struct TrVcfReader {
    reader: bcf::Reader,
    vcf_type: VcfType,
    samples: Vec<String>,
    format_fields: Vec<(String, FieldKind)>,
    info_fields: HashSet<String>,
    declarations: Vec<FieldDeclaration>,
    filter_descriptions: HashMap<String, String>,
}

impl TrVcfReader {
    /// Open a VCF, detecting the calling tool unless `vcf_type` is given
    pub fn from_path<P: AsRef<Path>>(path: P, vcf_type: Option<VcfType>) -> StrqcResult<Self> {
        let reader = bcf::Reader::from_path(&path).map_err(|e| {
            StrqcError::InvalidConfig(format!(
                "Could not open VCF {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let header = reader.header();

        let vcf_type = match vcf_type {
            Some(t) => t,
            None => detect_vcf_type(header)?,
        };
        log::info!("Using VCF type {}", vcf_type);

        let samples = header
            .samples()
            .iter()
            .map(|s| String::from_utf8_lossy(s).to_string())
            .collect();

        let mut format_fields = Vec::new();
        let mut info_fields = HashSet::new();
        let mut declarations = Vec::new();
        let mut filter_descriptions = HashMap::new();
        for record in header.header_records() {
            match record {
                HeaderRecord::Format { values, .. } => {
                    let values: HashMap<String, String> = values.into_iter().collect();
                    let declaration = FieldDeclaration::new(
                        HeaderKind::Format,
                        &header_value(&values, "ID"),
                        &header_value(&values, "Number"),
                        &header_value(&values, "Type"),
                        &header_value(&values, "Description"),
                    );
                    if declaration.id != GT_FIELD {
                        let kind = FieldKind::from_header(&declaration.id, &declaration.value_type)?;
                        format_fields.push((declaration.id.clone(), kind));
                    }
                    declarations.push(declaration);
                }
                HeaderRecord::Info { values, .. } => {
                    let values: HashMap<String, String> = values.into_iter().collect();
                    let declaration = FieldDeclaration::new(
                        HeaderKind::Info,
                        &header_value(&values, "ID"),
                        &header_value(&values, "Number"),
                        &header_value(&values, "Type"),
                        &header_value(&values, "Description"),
                    );
                    info_fields.insert(declaration.id.clone());
                    declarations.push(declaration);
                }
                HeaderRecord::Filter { values, .. } => {
                    let values: HashMap<String, String> = values.into_iter().collect();
                    filter_descriptions.insert(
                        header_value(&values, "ID"),
                        header_value(&values, "Description"),
                    );
                }
                _ => {}
            }
        }

        Ok(Self {
            reader,
            vcf_type,
            samples,
            format_fields,
            info_fields,
            declarations,
            filter_descriptions,
        })
    }

    pub fn vcf_type(&self) -> VcfType {
        self.vcf_type
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    pub fn header(&self) -> &bcf::header::HeaderView {
        self.reader.header()
    }

    /// Names of the declared FORMAT fields, GT included
    pub fn format_field_names(&self) -> HashSet<String> {
        self.declarations
            .iter()
            .filter(|d| d.kind == HeaderKind::Format)
            .map(|d| d.id.clone())
            .collect()
    }

    /// INFO and FORMAT declarations of the input header
    pub fn declarations(&self) -> &[FieldDeclaration] {
        &self.declarations
    }

    pub fn filter_descriptions(&self) -> &HashMap<String, String> {
        &self.filter_descriptions
    }

    /// Read the next record, returning the raw htslib record alongside its
    /// harmonized form
    pub fn read_next(&mut self) -> Option<StrqcResult<(bcf::Record, TrRecord)>> {
        let mut raw = self.reader.empty_record();
        match self.reader.read(&mut raw) {
            None => None,
            Some(Err(e)) => Some(Err(StrqcError::InvalidRecord(e.to_string()))),
            Some(Ok(())) => Some(
                record_from_bcf(&raw, self.vcf_type, &self.format_fields, &self.info_fields)
                    .map(|record| (raw, record)),
            ),
        }
    }
}

fn info_string(raw: &bcf::Record, info_fields: &HashSet<String>, key: &str) -> Option<String> {
    if !info_fields.contains(key) {
        return None;
    }
    let values = raw.info(key.as_bytes()).string().ok().flatten()?;
    values
        .first()
        .map(|v| String::from_utf8_lossy(v).to_string())
}

fn info_integer(raw: &bcf::Record, info_fields: &HashSet<String>, key: &str) -> Option<i32> {
    if !info_fields.contains(key) {
        return None;
    }
    let values = raw.info(key.as_bytes()).integer().ok().flatten()?;
    values.first().copied().filter(|&v| v != MISSING_INTEGER)
}

/// Allele length in bp encoded as `<STRn>` (n repeat copies)
fn symbolic_length(allele: &str, motif: &str) -> Option<usize> {
    let copies = allele.strip_prefix("<STR")?.strip_suffix('>')?;
    copies.parse::<usize>().ok().map(|n| n * motif.len())
}

/// Remove the flanks outside `[start, end]` (1-based, inclusive) from every allele
fn trim_flanks(alleles: &[String], pos: u64, start: i32, end: i32) -> Option<Vec<String>> {
    let ref_len = alleles.first()?.len() as i64;
    let left = start as i64 - pos as i64;
    let right = pos as i64 + ref_len - 1 - end as i64;
    if left < 0 || right < 0 || (left == 0 && right == 0) {
        return None;
    }
    let (left, right) = (left as usize, right as usize);
    alleles
        .iter()
        .map(|allele| {
            let stop = allele.len().checked_sub(right)?;
            allele.get(left..stop).map(str::to_string)
        })
        .collect()
}

/// Allele strings of a record, `None` if any allele is not ASCII
fn decode_alleles(raw_alleles: &[&[u8]]) -> Option<Vec<String>> {
    raw_alleles
        .iter()
        .map(|allele| {
            allele
                .is_ascii()
                .then(|| String::from_utf8_lossy(allele).to_string())
        })
        .collect()
}

fn read_genotypes(raw: &bcf::Record, num_samples: usize) -> StrqcResult<Vec<Genotype>> {
    let genotypes = raw.genotypes().map_err(|e| {
        StrqcError::InvalidRecord(format!("Could not read genotypes: {}", e))
    })?;
    Ok((0..num_samples)
        .map(|sample| {
            let gt = genotypes.get(sample);
            let alleles = gt
                .iter()
                .map(|allele| match allele {
                    GenotypeAllele::Unphased(idx) | GenotypeAllele::Phased(idx) if *idx >= 0 => {
                        Some(*idx as usize)
                    }
                    _ => None,
                })
                .collect();
            let phased = gt.iter().skip(1).any(|allele| {
                matches!(
                    allele,
                    GenotypeAllele::Phased(_) | GenotypeAllele::PhasedMissing
                )
            });
            Genotype::new(alleles, phased)
        })
        .collect())
}

fn read_format_field(
    raw: &bcf::Record,
    name: &str,
    kind: FieldKind,
) -> StrqcResult<Option<FieldValues>> {
    let tag = name.as_bytes();
    let result = match kind {
        FieldKind::Integer => raw.format(tag).integer().map(|values| {
            FieldValues::Integer(
                values
                    .iter()
                    .map(|sample| {
                        sample
                            .iter()
                            .take_while(|&&v| v != VECTOR_END_INTEGER)
                            .map(|&v| (v != MISSING_INTEGER).then_some(v))
                            .collect()
                    })
                    .collect(),
            )
        }),
        FieldKind::Float => raw.format(tag).float().map(|values| {
            FieldValues::Float(
                values
                    .iter()
                    .map(|sample| {
                        sample
                            .iter()
                            .take_while(|v| v.to_bits() != VECTOR_END_FLOAT_BITS)
                            .map(|&v| (!v.is_nan()).then_some(v))
                            .collect()
                    })
                    .collect(),
            )
        }),
        FieldKind::Text => raw.format(tag).string().map(|values| {
            FieldValues::Text(
                values
                    .iter()
                    .map(|sample| {
                        let end = sample.iter().position(|&b| b == 0).unwrap_or(sample.len());
                        let text = &sample[..end];
                        (!text.is_empty() && text != MISSING_STRING)
                            .then(|| String::from_utf8_lossy(text).to_string())
                    })
                    .collect(),
            )
        }),
    };
    match result {
        Ok(values) => Ok(Some(values)),
        Err(HtslibError::BcfMissingTag { .. }) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Convert an htslib record into the harmonized model
pub fn record_from_bcf(
    raw: &bcf::Record,
    vcf_type: VcfType,
    format_fields: &[(String, FieldKind)],
    info_fields: &HashSet<String>,
) -> StrqcResult<TrRecord> {
    let header = raw.header();
    let rid = raw
        .rid()
        .ok_or_else(|| StrqcError::InvalidRecord("Record without chromosome".to_string()))?;
    let chrom = String::from_utf8_lossy(header.rid2name(rid)?).to_string();
    let pos = raw.pos() as u64 + 1;

    let motif = vcf_type
        .motif_keys()
        .iter()
        .find_map(|key| info_string(raw, info_fields, key))
        .map(|m| m.to_ascii_uppercase());
    let motif = match motif {
        Some(motif) => motif,
        // filled in from INFO/PERIOD after flank trimming
        None if vcf_type == VcfType::HipStr => String::new(),
        None => {
            return Err(StrqcError::InvalidRecord(format!(
                "{}:{} is not a {} record: no repeat motif in INFO",
                chrom, pos, vcf_type
            )))
        }
    };

    let alleles = decode_alleles(&raw.alleles()).ok_or_else(|| {
        StrqcError::InvalidRecord(format!("{}:{} has a non-ASCII allele", chrom, pos))
    })?;
    let Some((ref_seq, alt_seqs)) = alleles.split_first() else {
        return Err(StrqcError::InvalidRecord(format!("{}:{} has no alleles", chrom, pos)));
    };
    let alt_seqs: Vec<&String> = alt_seqs.iter().filter(|a| a.as_str() != ".").collect();

    let ref_allele = if vcf_type == VcfType::ExpansionHunter {
        let copies = info_integer(raw, info_fields, "REF").ok_or_else(|| {
            StrqcError::InvalidRecord(format!(
                "{}:{} is not an ExpansionHunter record: no REF in INFO",
                chrom, pos
            ))
        })?;
        Allele::Length(copies.max(0) as usize * motif.len())
    } else {
        Allele::Sequence(ref_seq.to_ascii_uppercase())
    };

    let alt_alleles = alt_seqs
        .iter()
        .map(|alt| {
            if alt.starts_with('<') {
                symbolic_length(alt, &motif).map(Allele::Length).ok_or_else(|| {
                    StrqcError::InvalidRecord(format!(
                        "{}:{} has an unsupported symbolic allele {}",
                        chrom, pos, alt
                    ))
                })
            } else {
                Ok(Allele::Sequence(alt.to_ascii_uppercase()))
            }
        })
        .collect::<StrqcResult<Vec<_>>>()?;

    let num_samples = raw.sample_count() as usize;
    let genotypes = read_genotypes(raw, num_samples)?;
    let mut record = TrRecord::new(chrom, pos, motif, ref_allele, alt_alleles, genotypes);

    let id = raw.id();
    if id.as_slice() != MISSING_STRING {
        record.record_id = Some(String::from_utf8_lossy(&id).to_string());
    }

    if vcf_type == VcfType::HipStr && !record.has_length_only_alts() {
        let start = info_integer(raw, info_fields, "START");
        let end = info_integer(raw, info_fields, "END");
        if let (Some(start), Some(end)) = (start, end) {
            let full: Vec<String> = std::iter::once(ref_seq.to_ascii_uppercase())
                .chain(alt_seqs.iter().map(|a| a.to_ascii_uppercase()))
                .collect();
            if let Some(trimmed) = trim_flanks(&full, pos, start, end) {
                let mut trimmed = trimmed.into_iter().map(Allele::Sequence);
                if let Some(reference) = trimmed.next() {
                    record.ref_allele = reference;
                }
                record.alt_alleles = trimmed.collect();
                record.pos = start as u64;
                record.full_alleles = Some(full);
            }
        }
    }

    if vcf_type == VcfType::HipStr && record.motif.is_empty() {
        let period = info_integer(raw, info_fields, "PERIOD")
            .filter(|&period| period > 0)
            .ok_or_else(|| {
                StrqcError::InvalidRecord(format!(
                    "{}:{} is not a HipSTR record: no PERIOD in INFO",
                    record.chrom, pos
                ))
            })?;
        let reference = record.ref_allele.sequence().unwrap_or("");
        record.motif = infer_repeat_unit(reference, period as usize);
    }

    for (name, kind) in format_fields {
        if let Some(values) = read_format_field(raw, name, *kind)? {
            if values.num_samples() == num_samples {
                record.set_field(name, values)?;
            }
        }
    }

    Ok(record)
}

/// Writer for filtered records, sharing the input's header
pub struct TrVcfWriter {
    writer: bcf::Writer,
}

impl TrVcfWriter {
    /// Create the output VCF with `extra_header_lines` appended to the input
    /// header; bgzip compressed when `compressed` is set
    pub fn create<P: AsRef<Path>>(
        path: P,
        input: &TrVcfReader,
        extra_header_lines: &[String],
        compressed: bool,
    ) -> StrqcResult<Self> {
        let mut header = bcf::Header::from_template(input.header());
        for line in extra_header_lines {
            header.push_record(line.as_bytes());
        }
        let writer = bcf::Writer::from_path(path, &header, !compressed, bcf::Format::Vcf)?;
        Ok(Self { writer })
    }

    /// Write `record`'s filtering results onto its raw htslib record
    ///
    /// Genotypes and typed FORMAT values are rewritten only when some sample
    /// was masked; the per-sample FILTER text and the locus annotations are
    /// always written.
    pub fn write(
        &mut self,
        mut raw: bcf::Record,
        record: &TrRecord,
        info: &LocusInfo,
        masked: &[bool],
    ) -> StrqcResult<()> {
        self.writer.translate(&mut raw);

        if masked.iter().any(|&m| m) {
            raw.push_format_integer(GT_FIELD.as_bytes(), &encode_genotypes(&record.genotypes))?;
            for (name, values) in record.format.iter().filter(|(n, _)| n != FILTER_FIELD) {
                push_format_values(&mut raw, name, values)?;
            }
        }
        if let Some(values) = record.field(FILTER_FIELD) {
            push_format_values(&mut raw, FILTER_FIELD, values)?;
        }

        let alt_counts: Vec<i32> = info.alt_counts.iter().map(|&c| c as i32).collect();
        raw.push_info_integer(b"AC", &alt_counts)?;
        raw.push_info_integer(b"REFAC", &[info.ref_count as i32])?;
        raw.push_info_float(b"HET", &[info.heterozygosity as f32])?;
        raw.push_info_float(b"HWEP", &[info.hwe_pvalue as f32])?;
        raw.push_info_integer(b"HRUN", &[info.homopolymer_run as i32])?;

        if let Some(filter) = &record.filter {
            let ids: Vec<&[u8]> = filter.split(';').map(str::as_bytes).collect();
            raw.set_filters(&ids)?;
        }

        self.writer.write(&raw)?;
        Ok(())
    }
}

/// Flatten genotypes into htslib's GT encoding, padding to the maximum ploidy
pub fn encode_genotypes(genotypes: &[Genotype]) -> Vec<i32> {
    let ploidy = genotypes.iter().map(Genotype::ploidy).max().unwrap_or(0).max(1);
    let mut encoded = Vec::with_capacity(ploidy * genotypes.len());
    for gt in genotypes {
        for (i, allele) in gt.alleles.iter().enumerate() {
            let phased = gt.phased && i > 0;
            let value = match (allele, phased) {
                (Some(idx), true) => GenotypeAllele::Phased(*idx as i32),
                (Some(idx), false) => GenotypeAllele::Unphased(*idx as i32),
                (None, true) => GenotypeAllele::PhasedMissing,
                (None, false) => GenotypeAllele::UnphasedMissing,
            };
            encoded.push(i32::from(value));
        }
        if gt.alleles.is_empty() {
            encoded.push(i32::from(GenotypeAllele::UnphasedMissing));
        }
        let written = gt.ploidy().max(1);
        encoded.extend(std::iter::repeat(VECTOR_END_INTEGER).take(ploidy - written));
    }
    encoded
}

fn push_format_values(raw: &mut bcf::Record, name: &str, values: &FieldValues) -> StrqcResult<()> {
    let tag = name.as_bytes();
    match values {
        FieldValues::Integer(samples) => {
            let width = samples.iter().map(Vec::len).max().unwrap_or(0).max(1);
            let mut flat = Vec::with_capacity(width * samples.len());
            for sample in samples {
                flat.extend(sample.iter().map(|v| v.unwrap_or(MISSING_INTEGER)));
                if sample.is_empty() {
                    flat.push(MISSING_INTEGER);
                }
                flat.extend(std::iter::repeat(VECTOR_END_INTEGER).take(width - sample.len().max(1)));
            }
            raw.push_format_integer(tag, &flat)?;
        }
        FieldValues::Float(samples) => {
            let width = samples.iter().map(Vec::len).max().unwrap_or(0).max(1);
            let mut flat = Vec::with_capacity(width * samples.len());
            for sample in samples {
                flat.extend(sample.iter().map(|v| v.unwrap_or_else(missing_float)));
                if sample.is_empty() {
                    flat.push(missing_float());
                }
                flat.extend(std::iter::repeat(vector_end_float()).take(width - sample.len().max(1)));
            }
            raw.push_format_float(tag, &flat)?;
        }
        FieldValues::Text(samples) => {
            let texts: Vec<&[u8]> = samples
                .iter()
                .map(|v| v.as_deref().map(str::as_bytes).unwrap_or(MISSING_STRING))
                .collect();
            raw.push_format_string(tag, &texts)?;
        }
    }
    Ok(())
}
