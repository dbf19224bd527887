//! Filter thresholds, their validation and construction of the filter sets

use crate::filters::call::{
    BadConfidenceInterval, ExpansionKind, ExpansionProb, MaxReadFraction, MaxValue, MinValue,
    MinSupportingReads, ReadClassFilter, RequireSupport,
};
use crate::filters::locus::{Bound, HetBound, HomopolymerRun, MinCallRate, MinHwePvalue, RegionFilter};
use crate::filters::{CallFilter, LocusFilter};
use crate::regions::RegionSet;
use crate::{StrqcError, StrqcResult, VcfType};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// Locus-level options, valid for every VCF type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocusOptions {
    pub min_locus_callrate: Option<f64>,
    pub min_locus_hwep: Option<f64>,
    pub min_locus_het: Option<f64>,
    pub max_locus_het: Option<f64>,
    /// Group alleles by length when computing heterozygosity and HWE
    pub use_length: bool,
    pub filter_hrun: bool,
    pub filter_regions: Vec<PathBuf>,
    /// One name per region file; generated when empty
    pub filter_region_names: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HipstrOptions {
    pub max_call_flank_indel: Option<f64>,
    pub max_call_stutter: Option<f64>,
    pub min_supp_reads: Option<f64>,
    pub min_call_dp: Option<f64>,
    pub max_call_dp: Option<f64>,
    pub min_call_q: Option<f64>,
    pub min_call_allele_bias: Option<f64>,
    pub min_call_strand_bias: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GangstrOptions {
    pub min_call_dp: Option<f64>,
    pub max_call_dp: Option<f64>,
    pub min_call_q: Option<f64>,
    pub expansion_prob_het: Option<f64>,
    pub expansion_prob_hom: Option<f64>,
    pub expansion_prob_total: Option<f64>,
    pub filter_span_only: bool,
    pub filter_spanbound_only: bool,
    pub filter_bad_ci: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdvntrOptions {
    pub min_call_dp: Option<f64>,
    pub max_call_dp: Option<f64>,
    pub min_spanning: Option<f64>,
    pub min_flanking: Option<f64>,
    pub min_ml: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EhOptions {
    pub min_call_lc: Option<f64>,
    pub max_call_lc: Option<f64>,
    pub min_adfl: Option<f64>,
    pub min_adir: Option<f64>,
    pub min_adsp: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PopstrOptions {
    pub min_call_dp: Option<f64>,
    pub max_call_dp: Option<f64>,
    pub require_support: Option<f64>,
}

/// Every filter option of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub locus: LocusOptions,
    pub hipstr: HipstrOptions,
    pub gangstr: GangstrOptions,
    pub advntr: AdvntrOptions,
    pub eh: EhOptions,
    pub popstr: PopstrOptions,
    /// Leave filtered loci out of the output instead of annotating them
    pub drop_filtered: bool,
}

impl HipstrOptions {
    fn is_set(&self) -> bool {
        *self != Self::default()
    }

    fn check(&self) -> StrqcResult<()> {
        check_probability("--hipstr-max-call-flank-indel", self.max_call_flank_indel)?;
        check_probability("--hipstr-max-call-stutter", self.max_call_stutter)?;
        check_non_negative("--hipstr-min-supp-reads", self.min_supp_reads)?;
        check_depth_range("--hipstr-min-call-DP", self.min_call_dp, "--hipstr-max-call-DP", self.max_call_dp)?;
        check_probability("--hipstr-min-call-Q", self.min_call_q)?;
        // log10 p-values
        check_finite("--hipstr-min-call-allele-bias", self.min_call_allele_bias)?;
        check_finite("--hipstr-min-call-strand-bias", self.min_call_strand_bias)
    }

    fn call_filters(&self, filters: &mut Vec<Box<dyn CallFilter>>) {
        if let Some(t) = self.max_call_flank_indel {
            filters.push(Box::new(MaxReadFraction::hipstr_flank_indels(t)));
        }
        if let Some(t) = self.max_call_stutter {
            filters.push(Box::new(MaxReadFraction::hipstr_stutter(t)));
        }
        if let Some(t) = self.min_supp_reads {
            filters.push(Box::new(MinSupportingReads::new(t)));
        }
        push_min(filters, "HipSTRCallMinDepth", "DP", self.min_call_dp);
        push_max(filters, "HipSTRCallMaxDepth", "DP", self.max_call_dp);
        push_min(filters, "HipSTRCallMinQ", "Q", self.min_call_q);
        push_min(filters, "HipSTRCallMinAlleleBias", "AB", self.min_call_allele_bias);
        push_min(filters, "HipSTRCallMinStrandBias", "FS", self.min_call_strand_bias);
    }
}

impl GangstrOptions {
    fn is_set(&self) -> bool {
        *self != Self::default()
    }

    fn check(&self) -> StrqcResult<()> {
        check_depth_range("--gangstr-min-call-DP", self.min_call_dp, "--gangstr-max-call-DP", self.max_call_dp)?;
        check_probability("--gangstr-min-call-Q", self.min_call_q)?;
        check_probability("--gangstr-expansion-prob-het", self.expansion_prob_het)?;
        check_probability("--gangstr-expansion-prob-hom", self.expansion_prob_hom)?;
        check_probability("--gangstr-expansion-prob-total", self.expansion_prob_total)
    }

    fn call_filters(&self, filters: &mut Vec<Box<dyn CallFilter>>) {
        push_min(filters, "GangSTRCallMinDepth", "DP", self.min_call_dp);
        push_max(filters, "GangSTRCallMaxDepth", "DP", self.max_call_dp);
        push_min(filters, "GangSTRCallMinQ", "Q", self.min_call_q);
        let expansions = [
            (ExpansionKind::Het, self.expansion_prob_het),
            (ExpansionKind::Hom, self.expansion_prob_hom),
            (ExpansionKind::Total, self.expansion_prob_total),
        ];
        for (kind, threshold) in expansions {
            if let Some(t) = threshold {
                filters.push(Box::new(ExpansionProb::new(kind, t)));
            }
        }
        if self.filter_span_only {
            filters.push(Box::new(ReadClassFilter::SpanOnly));
        }
        if self.filter_spanbound_only {
            filters.push(Box::new(ReadClassFilter::SpanBoundOnly));
        }
        if self.filter_bad_ci {
            filters.push(Box::new(BadConfidenceInterval));
        }
    }
}

impl AdvntrOptions {
    fn is_set(&self) -> bool {
        *self != Self::default()
    }

    fn check(&self) -> StrqcResult<()> {
        check_depth_range("--advntr-min-call-DP", self.min_call_dp, "--advntr-max-call-DP", self.max_call_dp)?;
        check_non_negative("--advntr-min-spanning", self.min_spanning)?;
        check_non_negative("--advntr-min-flanking", self.min_flanking)?;
        check_non_negative("--advntr-min-ML", self.min_ml)
    }

    fn call_filters(&self, filters: &mut Vec<Box<dyn CallFilter>>) {
        push_min(filters, "AdVNTRCallMinDepth", "DP", self.min_call_dp);
        push_max(filters, "AdVNTRCallMaxDepth", "DP", self.max_call_dp);
        push_min(filters, "AdVNTRCallMinSpanning", "SR", self.min_spanning);
        push_min(filters, "AdVNTRCallMinFlanking", "FR", self.min_flanking);
        push_min(filters, "AdVNTRCallMinML", "ML", self.min_ml);
    }
}

impl EhOptions {
    fn is_set(&self) -> bool {
        *self != Self::default()
    }

    fn check(&self) -> StrqcResult<()> {
        check_depth_range("--eh-min-call-LC", self.min_call_lc, "--eh-max-call-LC", self.max_call_lc)?;
        check_non_negative("--eh-min-ADFL", self.min_adfl)?;
        check_non_negative("--eh-min-ADIR", self.min_adir)?;
        check_non_negative("--eh-min-ADSP", self.min_adsp)
    }

    fn call_filters(&self, filters: &mut Vec<Box<dyn CallFilter>>) {
        push_min(filters, "EHCallMinDepth", "LC", self.min_call_lc);
        push_max(filters, "EHCallMaxDepth", "LC", self.max_call_lc);
        push_min(filters, "EHCallMinADFL", "ADFL", self.min_adfl);
        push_min(filters, "EHCallMinADIR", "ADIR", self.min_adir);
        push_min(filters, "EHCallMinADSP", "ADSP", self.min_adsp);
    }
}

impl PopstrOptions {
    fn is_set(&self) -> bool {
        *self != Self::default()
    }

    fn check(&self) -> StrqcResult<()> {
        check_depth_range("--popstr-min-call-DP", self.min_call_dp, "--popstr-max-call-DP", self.max_call_dp)?;
        check_non_negative("--popstr-require-support", self.require_support)
    }

    fn call_filters(&self, filters: &mut Vec<Box<dyn CallFilter>>) {
        push_min(filters, "PopSTRMinCallDepth", "DP", self.min_call_dp);
        push_max(filters, "PopSTRMaxCallDepth", "DP", self.max_call_dp);
        if let Some(t) = self.require_support {
            filters.push(Box::new(RequireSupport::new(t)));
        }
    }
}

fn push_min(filters: &mut Vec<Box<dyn CallFilter>>, name: &str, field: &str, threshold: Option<f64>) {
    if let Some(t) = threshold {
        filters.push(Box::new(MinValue::new(name, field, t)));
    }
}

fn push_max(filters: &mut Vec<Box<dyn CallFilter>>, name: &str, field: &str, threshold: Option<f64>) {
    if let Some(t) = threshold {
        filters.push(Box::new(MaxValue::new(name, field, t)));
    }
}

fn check_probability(option: &str, value: Option<f64>) -> StrqcResult<()> {
    match value {
        Some(v) if !(0.0..=1.0).contains(&v) => Err(StrqcError::InvalidConfig(format!(
            "{} must be between 0 and 1",
            option
        ))),
        _ => Ok(()),
    }
}

fn check_finite(option: &str, value: Option<f64>) -> StrqcResult<()> {
    match value {
        Some(v) if !v.is_finite() => Err(StrqcError::InvalidConfig(format!(
            "{} must be a finite number",
            option
        ))),
        _ => Ok(()),
    }
}

fn check_non_negative(option: &str, value: Option<f64>) -> StrqcResult<()> {
    match value {
        Some(v) if v < 0.0 => Err(StrqcError::InvalidConfig(format!("{} must be >= 0", option))),
        _ => Ok(()),
    }
}

fn check_depth_range(
    min_option: &str,
    min: Option<f64>,
    max_option: &str,
    max: Option<f64>,
) -> StrqcResult<()> {
    check_non_negative(min_option, min)?;
    check_non_negative(max_option, max)?;
    match (min, max) {
        (Some(lo), Some(hi)) if hi < lo => Err(StrqcError::InvalidConfig(format!(
            "{} must be >= {}",
            max_option, min_option
        ))),
        _ => Ok(()),
    }
}

impl LocusOptions {
    fn check(&self, vcf_type: VcfType) -> StrqcResult<()> {
        check_probability("--min-locus-callrate", self.min_locus_callrate)?;
        check_probability("--min-locus-hwep", self.min_locus_hwep)?;
        check_probability("--min-locus-het", self.min_locus_het)?;
        check_probability("--max-locus-het", self.max_locus_het)?;
        if let (Some(lo), Some(hi)) = (self.min_locus_het, self.max_locus_het) {
            if hi < lo {
                return Err(StrqcError::InvalidConfig(
                    "Cannot have --max-locus-het less than --min-locus-het".to_string(),
                ));
            }
        }
        if self.use_length && vcf_type != VcfType::HipStr {
            log::warn!(
                "--use-length is only meaningful for HipSTR, which reports sequence level differences"
            );
        }
        if self.filter_hrun && vcf_type != VcfType::HipStr {
            log::warn!("--filter-hrun only relevant to HipSTR files. This filter will have no effect");
        }
        if !self.filter_region_names.is_empty()
            && self.filter_region_names.len() != self.filter_regions.len()
        {
            return Err(StrqcError::InvalidConfig(
                "Length of --filter-regions-names must match --filter-regions".to_string(),
            ));
        }
        Ok(())
    }

    /// Region filter names, generated as `FILTER<i>` when none were given
    pub fn region_names(&self) -> Vec<String> {
        if self.filter_region_names.is_empty() {
            (0..self.filter_regions.len())
                .map(|i| format!("FILTER{}", i))
                .collect()
        } else {
            self.filter_region_names.clone()
        }
    }
}

/// Check thresholds, tool-specific options and required FORMAT fields
///
/// Must pass before any record is processed.
pub fn validate_filter_config(
    config: &FilterConfig,
    vcf_type: VcfType,
    format_fields: &HashSet<String>,
) -> StrqcResult<()> {
    config.locus.check(vcf_type)?;

    let tool_sections = [
        (VcfType::HipStr, "HipSTR", config.hipstr.is_set()),
        (VcfType::GangStr, "GangSTR", config.gangstr.is_set()),
        (VcfType::AdVntr, "adVNTR", config.advntr.is_set()),
        (VcfType::ExpansionHunter, "ExpansionHunter", config.eh.is_set()),
        (VcfType::PopStr, "PopSTR", config.popstr.is_set()),
    ];
    for (tool, label, is_set) in tool_sections {
        if is_set && tool != vcf_type {
            return Err(StrqcError::InvalidConfig(format!(
                "{} options can only be applied to {} VCFs",
                label, label
            )));
        }
    }

    match vcf_type {
        VcfType::HipStr => config.hipstr.check()?,
        VcfType::GangStr => config.gangstr.check()?,
        VcfType::AdVntr => config.advntr.check()?,
        VcfType::ExpansionHunter => config.eh.check()?,
        VcfType::PopStr => config.popstr.check()?,
    }

    for filter in build_call_filters(config) {
        if let Some(missing) = filter
            .required_fields()
            .into_iter()
            .find(|field| !format_fields.contains(*field))
        {
            return Err(StrqcError::InvalidConfig(format!(
                "Filter {} requires FORMAT field {} which is not declared in the VCF",
                filter.name(),
                missing
            )));
        }
    }
    Ok(())
}

/// Call-level filters in registration order
pub fn build_call_filters(config: &FilterConfig) -> Vec<Box<dyn CallFilter>> {
    let mut filters: Vec<Box<dyn CallFilter>> = Vec::new();
    config.hipstr.call_filters(&mut filters);
    config.gangstr.call_filters(&mut filters);
    config.advntr.call_filters(&mut filters);
    config.eh.call_filters(&mut filters);
    config.popstr.call_filters(&mut filters);
    filters
}

/// Locus-level filters in registration order, loading region files
pub fn build_locus_filters(config: &FilterConfig) -> StrqcResult<Vec<Box<dyn LocusFilter>>> {
    let locus = &config.locus;
    let mut filters: Vec<Box<dyn LocusFilter>> = Vec::new();
    if let Some(t) = locus.min_locus_callrate {
        filters.push(Box::new(MinCallRate::new(t)));
    }
    if let Some(t) = locus.min_locus_hwep {
        filters.push(Box::new(MinHwePvalue::new(t, locus.use_length)));
    }
    if let Some(t) = locus.min_locus_het {
        filters.push(Box::new(HetBound::new(Bound::Min, t, locus.use_length)));
    }
    if let Some(t) = locus.max_locus_het {
        filters.push(Box::new(HetBound::new(Bound::Max, t, locus.use_length)));
    }
    if locus.filter_hrun {
        filters.push(Box::new(HomopolymerRun));
    }
    for (name, path) in locus.region_names().iter().zip(&locus.filter_regions) {
        let regions = RegionSet::from_bed(path).map_err(|e| {
            StrqcError::InvalidConfig(format!(
                "Could not load regions file {}: {}",
                path.display(),
                e
            ))
        })?;
        if regions.is_empty() {
            log::warn!("Region file {} contains no regions", path.display());
        }
        filters.push(Box::new(RegionFilter::new(name, regions)));
    }
    Ok(filters)
}
