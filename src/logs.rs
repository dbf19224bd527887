//! Sample and locus log tables written after the last record

use crate::stats::{LocusStats, SampleStats, NUM_CALLS};
use crate::StrqcResult;
use std::path::Path;

/// Mean value as written to the logs
fn format_mean(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else {
        value.to_string()
    }
}

fn tab_writer<P: AsRef<Path>>(path: P) -> StrqcResult<csv::Writer<std::fs::File>> {
    Ok(csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_path(path)?)
}

/// Write the per-sample table: a `Total` row followed by one row per sample
///
/// Columns are the sample name, passing calls, mean depth of passing calls
/// and one trigger count per call filter in registration order.
pub fn write_sample_log<P: AsRef<Path>>(stats: &SampleStats, path: P) -> StrqcResult<()> {
    let mut writer = tab_writer(path)?;

    let mut header = vec!["sample", NUM_CALLS, "meanDP"];
    header.extend(stats.filter_counts().iter().map(|(name, _)| name.as_str()));
    writer.write_record(&header)?;

    let mut total = vec![
        "Total".to_string(),
        stats.total_num_calls().to_string(),
        format_mean(stats.overall_mean_depth()),
    ];
    total.extend(
        stats
            .filter_counts()
            .iter()
            .map(|(_, counts)| counts.iter().sum::<u64>().to_string()),
    );
    writer.write_record(&total)?;

    for (idx, sample) in stats.samples().iter().enumerate() {
        let mut row = vec![
            sample.clone(),
            stats.num_calls()[idx].to_string(),
            format_mean(stats.mean_depth(idx)),
        ];
        row.extend(
            stats
                .filter_counts()
                .iter()
                .map(|(_, counts)| counts[idx].to_string()),
        );
        writer.write_record(&row)?;
    }

    writer.flush()?;
    Ok(())
}

/// Write the per-locus table: mean called samples per passing locus, then
/// one `FILTER:<name>` count per locus outcome
pub fn write_locus_log<P: AsRef<Path>>(stats: &LocusStats, path: P) -> StrqcResult<()> {
    let mut writer = tab_writer(path)?;
    writer.serialize((
        "MeanSamplesPerPassingSTR",
        format_mean(stats.mean_samples_per_passing_locus()),
    ))?;
    for (name, count) in stats.counters() {
        writer.serialize((format!("FILTER:{}", name), count))?;
    }
    writer.flush()?;
    Ok(())
}
