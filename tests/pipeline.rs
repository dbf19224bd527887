use std::path::{Path, PathBuf};
use strqc_rs::config::{
    build_call_filters, build_locus_filters, validate_filter_config, FilterConfig,
};
use strqc_rs::engine::{FilterEngine, LocusOutcome};
use strqc_rs::logs::{write_locus_log, write_sample_log};
use strqc_rs::schema::plan_header;
use strqc_rs::vcf::{TrVcfReader, TrVcfWriter};
use strqc_rs::{StrqcError, VcfType};
use tempfile::TempDir;

const HEADER: &str = "##fileformat=VCFv4.2
##source=GangSTR-2.5
##contig=<ID=chr1,length=100000>
##INFO=<ID=RU,Number=1,Type=String,Description=\"Repeat motif\">
##INFO=<ID=END,Number=1,Type=Integer,Description=\"End position\">
##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">
##FORMAT=<ID=DP,Number=1,Type=Integer,Description=\"Read depth\">
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\tS2\tS3
";

const RECORDS: [&str; 2] = [
    "chr1\t100\t.\tCAGCAGCAG\tCAGCAGCAGCAG\t.\t.\tRU=CAG;END=108\tGT:DP\t0/1:5\t1/1:15\t0/0:10",
    "chr1\t500\t.\tTTATTATTA\t.\t.\t.\tRU=TTA;END=508\tGT:DP\t./.:.\t./.:.\t./.:.",
];

fn write_input(dir: &Path) -> PathBuf {
    let path = dir.join("calls.vcf");
    let mut content = HEADER.to_string();
    for record in RECORDS {
        content.push_str(record);
        content.push('\n');
    }
    std::fs::write(&path, content).unwrap();
    path
}

fn gangstr_config() -> FilterConfig {
    let mut config = FilterConfig::default();
    config.gangstr.min_call_dp = Some(10.0);
    config.locus.min_locus_callrate = Some(0.5);
    config
}

/// Run the whole filter over `input`, writing `<prefix>.vcf` and both logs
fn run_filter(input: &Path, prefix: &Path, config: &FilterConfig) -> Result<(), StrqcError> {
    let mut reader = TrVcfReader::from_path(input, None)?;
    validate_filter_config(config, reader.vcf_type(), &reader.format_field_names())?;

    let engine = FilterEngine::new(build_call_filters(config), build_locus_filters(config)?)
        .with_drop_filtered(config.drop_filtered)
        .with_use_length(config.locus.use_length);
    let lines = plan_header(
        reader.declarations(),
        reader.filter_descriptions(),
        engine.locus_filters(),
        "strqc --vcf calls.vcf",
    )?;

    let vcf_path = format!("{}.vcf", prefix.display());
    let mut writer = TrVcfWriter::create(&vcf_path, &reader, &lines, false)?;
    let mut sample_stats = engine.new_sample_stats(reader.samples().to_vec());
    let mut locus_stats = engine.new_locus_stats();

    while let Some(next) = reader.read_next() {
        let (raw, record) = next?;
        if let LocusOutcome::Emitted {
            record,
            info,
            masked,
        } = engine.process_record(record, &mut sample_stats, &mut locus_stats)?
        {
            writer.write(raw, &record, &info, &masked)?;
        }
    }
    drop(writer);

    write_sample_log(&sample_stats, format!("{}.samplog.tab", prefix.display()))?;
    write_locus_log(&locus_stats, format!("{}.loclog.tab", prefix.display()))?;
    Ok(())
}

fn data_lines(vcf: &str) -> Vec<String> {
    vcf.lines()
        .filter(|l| !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}

#[test]
fn test_gangstr_pipeline_writes_vcf_and_logs() {
    let dir = TempDir::new().unwrap();
    let input = write_input(dir.path());
    let prefix = dir.path().join("filtered");

    run_filter(&input, &prefix, &gangstr_config()).unwrap();

    let vcf = std::fs::read_to_string(dir.path().join("filtered.vcf")).unwrap();
    assert!(vcf.contains("##FORMAT=<ID=FILTER,Number=1,Type=String"));
    assert!(vcf.contains("##INFO=<ID=HWEP,Number=1,Type=Float"));
    assert!(vcf.contains("##FILTER=<ID=NO_CALLS_REMAINING"));
    assert!(vcf.contains("##FILTER=<ID=CALLRATE0.5"));
    assert!(vcf.contains("##command-strqc=strqc --vcf calls.vcf"));

    let records = data_lines(&vcf);
    assert_eq!(records.len(), 2);

    let first: Vec<&str> = records[0].split('\t').collect();
    assert_eq!(first[6], "PASS");
    assert!(first[7].contains("AC=2"));
    assert!(first[7].contains("REFAC=2"));
    assert!(first[7].contains("HET=0.5"));
    assert!(first[7].contains("HRUN=1"));
    assert_eq!(first[8], "GT:DP:FILTER");
    assert_eq!(first[9], "./.:.:GangSTRCallMinDepth_5");
    assert_eq!(first[10], "1/1:15:PASS");
    assert_eq!(first[11], "0/0:10:PASS");

    let second: Vec<&str> = records[1].split('\t').collect();
    assert_eq!(second[6], "CALLRATE0.5;NO_CALLS_REMAINING");
    assert!(second[7].contains("HET=-1"));
    assert!(second[7].contains("REFAC=0"));
    assert!(second[9].ends_with("NOCALL"));

    let sample_log = std::fs::read_to_string(dir.path().join("filtered.samplog.tab")).unwrap();
    let sample_lines: Vec<&str> = sample_log.lines().collect();
    assert_eq!(
        sample_lines,
        vec![
            "sample\tnumcalls\tmeanDP\tGangSTRCallMinDepth",
            "Total\t2\t12.5\t1",
            "S1\t0\t0\t1",
            "S2\t1\t15\t0",
            "S3\t1\t10\t0",
        ]
    );

    let locus_log = std::fs::read_to_string(dir.path().join("filtered.loclog.tab")).unwrap();
    let locus_lines: Vec<&str> = locus_log.lines().collect();
    assert_eq!(
        locus_lines,
        vec![
            "MeanSamplesPerPassingSTR\t2",
            "FILTER:PASS\t1",
            "FILTER:CALLRATE0.5\t1",
            "FILTER:NO_CALLS_REMAINING\t1",
        ]
    );
}

#[test]
fn test_drop_filtered_leaves_out_failed_loci() {
    let dir = TempDir::new().unwrap();
    let input = write_input(dir.path());
    let prefix = dir.path().join("dropped");

    let mut config = gangstr_config();
    config.drop_filtered = true;
    run_filter(&input, &prefix, &config).unwrap();

    let vcf = std::fs::read_to_string(dir.path().join("dropped.vcf")).unwrap();
    let records = data_lines(&vcf);
    assert_eq!(records.len(), 1);
    assert!(records[0].starts_with("chr1\t100\t"));
}

#[test]
fn test_options_for_another_tool_are_rejected() {
    let dir = TempDir::new().unwrap();
    let input = write_input(dir.path());
    let prefix = dir.path().join("rejected");

    let mut config = FilterConfig::default();
    config.hipstr.min_call_dp = Some(10.0);
    let err = run_filter(&input, &prefix, &config).unwrap_err();
    assert!(matches!(err, StrqcError::InvalidConfig(_)));
    assert!(!dir.path().join("rejected.vcf").exists());
}

#[test]
fn test_missing_required_field_is_rejected() {
    let dir = TempDir::new().unwrap();
    let input = write_input(dir.path());

    let mut config = FilterConfig::default();
    config.gangstr.min_call_q = Some(0.9);
    let reader = TrVcfReader::from_path(&input, Some(VcfType::GangStr)).unwrap();
    let result = validate_filter_config(&config, reader.vcf_type(), &reader.format_field_names());
    assert!(matches!(result, Err(StrqcError::InvalidConfig(_))));
}
