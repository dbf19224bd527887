//! strqc - filter tandem repeat genotype calls and write per-sample and per-locus statistics

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use std::path::PathBuf;
use strqc_rs::{
    config::{
        build_call_filters, build_locus_filters, validate_filter_config, AdvntrOptions, EhOptions,
        FilterConfig, GangstrOptions, HipstrOptions, LocusOptions, PopstrOptions,
    },
    engine::{FilterEngine, LocusOutcome},
    logs::{write_locus_log, write_sample_log},
    schema::plan_header,
    utils::{validate_file_readable, validate_output_prefix, Timer},
    vcf::{TrVcfReader, TrVcfWriter},
    StrqcError, VcfType,
};

/// Records between two progress messages
const PROGRESS_INTERVAL: u64 = 10_000;

#[derive(Parser)]
#[command(name = "strqc")]
#[command(about = "Call-level and locus-level QC filtering of tandem repeat genotypes")]
#[command(long_about = "
strqc filters tandem repeat genotype calls produced by HipSTR, GangSTR, adVNTR,
ExpansionHunter or popSTR.

Call-level filters mask individual genotypes and record the reasons in a new
FORMAT FILTER field. Locus-level filters are then applied to the remaining calls
and set the FILTER column. Every emitted record gets recomputed AC, REFAC, HET,
HWEP and HRUN annotations.

Three files are written: <out>.vcf (or <out>.vcf.gz with --zip),
<out>.samplog.tab with per-sample statistics and <out>.loclog.tab with per-locus
statistics.
")]
struct Args {
    /// Input VCF file
    #[arg(long, value_name = "FILE")]
    vcf: PathBuf,

    /// Prefix of the output files
    #[arg(long, value_name = "PREFIX")]
    out: String,

    /// Write bgzip compressed VCF output
    #[arg(long)]
    zip: bool,

    /// Tool that produced the VCF: hipstr, gangstr, advntr, eh, popstr or auto
    #[arg(long, default_value = "auto")]
    vcftype: String,

    /// Only process this many records
    #[arg(long, value_name = "N")]
    num_records: Option<u64>,

    /// Drop filtered loci instead of annotating them
    #[arg(long)]
    drop_filtered: bool,

    #[arg(long)]
    min_locus_callrate: Option<f64>,

    #[arg(long)]
    min_locus_hwep: Option<f64>,

    #[arg(long)]
    min_locus_het: Option<f64>,

    #[arg(long)]
    max_locus_het: Option<f64>,

    /// Group alleles by length for heterozygosity and HWE (HipSTR)
    #[arg(long)]
    use_length: bool,

    /// Filter penta- and hexanucleotide repeats with long homopolymer runs (HipSTR)
    #[arg(long)]
    filter_hrun: bool,

    /// Comma separated BED files of regions to filter
    #[arg(long, value_delimiter = ',', value_name = "FILES")]
    filter_regions: Vec<PathBuf>,

    /// Comma separated filter names, one per regions file
    #[arg(long, value_delimiter = ',', value_name = "NAMES")]
    filter_regions_names: Vec<String>,

    #[arg(long = "hipstr-max-call-flank-indel")]
    hipstr_max_call_flank_indel: Option<f64>,

    #[arg(long = "hipstr-max-call-stutter")]
    hipstr_max_call_stutter: Option<f64>,

    #[arg(long = "hipstr-min-supp-reads")]
    hipstr_min_supp_reads: Option<f64>,

    #[arg(long = "hipstr-min-call-DP")]
    hipstr_min_call_dp: Option<f64>,

    #[arg(long = "hipstr-max-call-DP")]
    hipstr_max_call_dp: Option<f64>,

    #[arg(long = "hipstr-min-call-Q")]
    hipstr_min_call_q: Option<f64>,

    /// log10 p-value threshold
    #[arg(long = "hipstr-min-call-allele-bias", allow_negative_numbers = true)]
    hipstr_min_call_allele_bias: Option<f64>,

    /// log10 p-value threshold
    #[arg(long = "hipstr-min-call-strand-bias", allow_negative_numbers = true)]
    hipstr_min_call_strand_bias: Option<f64>,

    #[arg(long = "gangstr-min-call-DP")]
    gangstr_min_call_dp: Option<f64>,

    #[arg(long = "gangstr-max-call-DP")]
    gangstr_max_call_dp: Option<f64>,

    #[arg(long = "gangstr-min-call-Q")]
    gangstr_min_call_q: Option<f64>,

    #[arg(long = "gangstr-expansion-prob-het")]
    gangstr_expansion_prob_het: Option<f64>,

    #[arg(long = "gangstr-expansion-prob-hom")]
    gangstr_expansion_prob_hom: Option<f64>,

    #[arg(long = "gangstr-expansion-prob-total")]
    gangstr_expansion_prob_total: Option<f64>,

    #[arg(long = "gangstr-filter-span-only")]
    gangstr_filter_span_only: bool,

    #[arg(long = "gangstr-filter-spanbound-only")]
    gangstr_filter_spanbound_only: bool,

    #[arg(long = "gangstr-filter-badCI")]
    gangstr_filter_bad_ci: bool,

    #[arg(long = "advntr-min-call-DP")]
    advntr_min_call_dp: Option<f64>,

    #[arg(long = "advntr-max-call-DP")]
    advntr_max_call_dp: Option<f64>,

    #[arg(long = "advntr-min-spanning")]
    advntr_min_spanning: Option<f64>,

    #[arg(long = "advntr-min-flanking")]
    advntr_min_flanking: Option<f64>,

    #[arg(long = "advntr-min-ML")]
    advntr_min_ml: Option<f64>,

    #[arg(long = "eh-min-call-LC")]
    eh_min_call_lc: Option<f64>,

    #[arg(long = "eh-max-call-LC")]
    eh_max_call_lc: Option<f64>,

    #[arg(long = "eh-min-ADFL")]
    eh_min_adfl: Option<f64>,

    #[arg(long = "eh-min-ADIR")]
    eh_min_adir: Option<f64>,

    #[arg(long = "eh-min-ADSP")]
    eh_min_adsp: Option<f64>,

    #[arg(long = "popstr-min-call-DP")]
    popstr_min_call_dp: Option<f64>,

    #[arg(long = "popstr-max-call-DP")]
    popstr_max_call_dp: Option<f64>,

    #[arg(long = "popstr-require-support")]
    popstr_require_support: Option<f64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

impl Args {
    fn vcf_type(&self) -> Result<Option<VcfType>, StrqcError> {
        if self.vcftype.eq_ignore_ascii_case("auto") {
            Ok(None)
        } else {
            self.vcftype.parse().map(Some)
        }
    }

    fn filter_config(&self) -> FilterConfig {
        FilterConfig {
            locus: LocusOptions {
                min_locus_callrate: self.min_locus_callrate,
                min_locus_hwep: self.min_locus_hwep,
                min_locus_het: self.min_locus_het,
                max_locus_het: self.max_locus_het,
                use_length: self.use_length,
                filter_hrun: self.filter_hrun,
                filter_regions: self.filter_regions.clone(),
                filter_region_names: self.filter_regions_names.clone(),
            },
            hipstr: HipstrOptions {
                max_call_flank_indel: self.hipstr_max_call_flank_indel,
                max_call_stutter: self.hipstr_max_call_stutter,
                min_supp_reads: self.hipstr_min_supp_reads,
                min_call_dp: self.hipstr_min_call_dp,
                max_call_dp: self.hipstr_max_call_dp,
                min_call_q: self.hipstr_min_call_q,
                min_call_allele_bias: self.hipstr_min_call_allele_bias,
                min_call_strand_bias: self.hipstr_min_call_strand_bias,
            },
            gangstr: GangstrOptions {
                min_call_dp: self.gangstr_min_call_dp,
                max_call_dp: self.gangstr_max_call_dp,
                min_call_q: self.gangstr_min_call_q,
                expansion_prob_het: self.gangstr_expansion_prob_het,
                expansion_prob_hom: self.gangstr_expansion_prob_hom,
                expansion_prob_total: self.gangstr_expansion_prob_total,
                filter_span_only: self.gangstr_filter_span_only,
                filter_spanbound_only: self.gangstr_filter_spanbound_only,
                filter_bad_ci: self.gangstr_filter_bad_ci,
            },
            advntr: AdvntrOptions {
                min_call_dp: self.advntr_min_call_dp,
                max_call_dp: self.advntr_max_call_dp,
                min_spanning: self.advntr_min_spanning,
                min_flanking: self.advntr_min_flanking,
                min_ml: self.advntr_min_ml,
            },
            eh: EhOptions {
                min_call_lc: self.eh_min_call_lc,
                max_call_lc: self.eh_max_call_lc,
                min_adfl: self.eh_min_adfl,
                min_adir: self.eh_min_adir,
                min_adsp: self.eh_min_adsp,
            },
            popstr: PopstrOptions {
                min_call_dp: self.popstr_min_call_dp,
                max_call_dp: self.popstr_max_call_dp,
                require_support: self.popstr_require_support,
            },
            drop_filtered: self.drop_filtered,
        }
    }
}

fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else {
        "warn"
    };

    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_secs()
        .init();

    let command = std::env::args().collect::<Vec<_>>().join(" ");
    log::info!("Starting strqc");
    log::info!("Input VCF: {:?}", args.vcf);
    log::info!("Output prefix: {}", args.out);

    validate_file_readable(&args.vcf)?;
    validate_output_prefix(&args.out)?;

    let mut reader = TrVcfReader::from_path(&args.vcf, args.vcf_type()?)?;

    let config = args.filter_config();
    log::debug!("Filter configuration: {:?}", config);
    validate_filter_config(&config, reader.vcf_type(), &reader.format_field_names())?;

    let engine = FilterEngine::new(build_call_filters(&config), build_locus_filters(&config)?)
        .with_drop_filtered(config.drop_filtered)
        .with_use_length(config.locus.use_length);
    log::info!(
        "Applying {} call-level and {} locus-level filters",
        engine.call_filters().len(),
        engine.locus_filters().len()
    );

    let header_lines = plan_header(
        reader.declarations(),
        reader.filter_descriptions(),
        engine.locus_filters(),
        &command,
    )?;

    let vcf_out = if args.zip {
        format!("{}.vcf.gz", args.out)
    } else {
        format!("{}.vcf", args.out)
    };
    let mut writer = TrVcfWriter::create(&vcf_out, &reader, &header_lines, args.zip)
        .with_context(|| format!("Could not create output VCF {}", vcf_out))?;

    let mut sample_stats = engine.new_sample_stats(reader.samples().to_vec());
    let mut locus_stats = engine.new_locus_stats();

    let timer = Timer::new("Filtering records");
    let mut num_processed: u64 = 0;
    let mut num_written: u64 = 0;
    while args.num_records.map_or(true, |n| num_processed < n) {
        let Some(next) = reader.read_next() else {
            break;
        };
        let (raw, record) = next.map_err(|e| {
            log::warn!("Skipping the rest of the VCF after an invalid record: {}", e);
            e
        })?;

        match engine.process_record(record, &mut sample_stats, &mut locus_stats)? {
            LocusOutcome::Dropped => {}
            LocusOutcome::Emitted {
                record,
                info,
                masked,
            } => {
                writer.write(raw, &record, &info, &masked)?;
                num_written += 1;
            }
        }

        num_processed += 1;
        if num_processed % PROGRESS_INTERVAL == 0 {
            log::info!("Processed {} records", num_processed);
        }
    }
    drop(writer);
    drop(timer);

    log::info!(
        "Processed {} records, wrote {} to {}",
        num_processed,
        num_written,
        vcf_out
    );
    log::info!(
        "{} loci passed, {} had no calls remaining",
        locus_stats.passed(),
        locus_stats.no_calls_remaining()
    );

    let sample_log = format!("{}.samplog.tab", args.out);
    write_sample_log(&sample_stats, &sample_log)
        .with_context(|| format!("Could not write sample log {}", sample_log))?;
    let locus_log = format!("{}.loclog.tab", args.out);
    write_locus_log(&locus_stats, &locus_log)
        .with_context(|| format!("Could not write locus log {}", locus_log))?;

    log::info!("Done");
    Ok(())
}

/// Print a user-facing message for the error and exit
fn handle_error(error: anyhow::Error) -> ! {
    match error.downcast_ref::<StrqcError>() {
        Some(StrqcError::FileNotFound(path)) => {
            eprintln!("Error: File not found: {}", path);
            eprintln!("Please check that the file exists and is readable.");
        }
        Some(StrqcError::InvalidConfig(msg)) => {
            eprintln!("Error: Invalid configuration: {}", msg);
            eprintln!("Please check the filter options against the input VCF.");
        }
        Some(StrqcError::InvalidRecord(msg)) => {
            eprintln!("Error: Invalid VCF record: {}", msg);
            eprintln!("Please check that the VCF type matches the tool that produced the file.");
        }
        Some(e @ StrqcError::SchemaConflict { .. }) => {
            eprintln!("Error: {}", e);
        }
        Some(e @ StrqcError::NegativeDepth { .. }) => {
            eprintln!("Error: {}", e);
            eprintln!("Please check the input VCF for corrupted depth values.");
        }
        Some(e @ StrqcError::UnsupportedFieldType { .. }) => {
            eprintln!("Error: {}", e);
        }
        Some(StrqcError::Htslib(e)) => {
            eprintln!("Error: VCF processing error: {}", e);
            eprintln!("Please check that your VCF file is properly formatted.");
        }
        Some(StrqcError::Io(e)) => {
            eprintln!("Error: I/O error: {}", e);
            eprintln!("Please check file permissions and disk space.");
        }
        Some(StrqcError::Csv(e)) => {
            eprintln!("Error: Could not write a log table: {}", e);
        }
        None => {
            eprintln!("Error: {:#}", error);
        }
    }
    std::process::exit(1);
}

fn main() {
    if let Err(e) = run() {
        handle_error(e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_flags_map_into_config() {
        let args = Args::try_parse_from([
            "strqc",
            "--vcf",
            "in.vcf",
            "--out",
            "out/run",
            "--gangstr-min-call-DP",
            "10",
            "--gangstr-filter-badCI",
            "--filter-regions",
            "a.bed,b.bed.gz",
            "--filter-regions-names",
            "SEGDUP,LCR",
        ])
        .unwrap();
        let config = args.filter_config();
        assert_eq!(config.gangstr.min_call_dp, Some(10.0));
        assert!(config.gangstr.filter_bad_ci);
        assert_eq!(config.locus.filter_regions.len(), 2);
        assert_eq!(config.locus.filter_region_names, vec!["SEGDUP", "LCR"]);
        assert_eq!(config.hipstr, HipstrOptions::default());
        assert_eq!(args.vcf_type().unwrap(), None);
    }

    #[test]
    fn test_negative_hipstr_bias_thresholds() {
        let args = Args::try_parse_from([
            "strqc",
            "--vcf",
            "in.vcf",
            "--out",
            "run",
            "--hipstr-min-call-allele-bias",
            "-2",
            "--hipstr-min-call-strand-bias",
            "-2.5",
        ])
        .unwrap();
        let config = args.filter_config();
        assert_eq!(config.hipstr.min_call_allele_bias, Some(-2.0));
        assert_eq!(config.hipstr.min_call_strand_bias, Some(-2.5));
    }

    #[test]
    fn test_explicit_vcf_type() {
        let args = Args::try_parse_from([
            "strqc", "--vcf", "in.vcf", "--out", "run", "--vcftype", "eh",
        ])
        .unwrap();
        assert_eq!(args.vcf_type().unwrap(), Some(VcfType::ExpansionHunter));

        let args = Args::try_parse_from([
            "strqc", "--vcf", "in.vcf", "--out", "run", "--vcftype", "lobstr",
        ])
        .unwrap();
        assert!(args.vcf_type().is_err());
    }
}
