//! BED region sets used by region locus filters

use crate::utils::open_text;
use crate::{StrqcError, StrqcResult};
use std::collections::HashMap;
use std::path::Path;

/// Sorted, merged 0-based half-open intervals per chromosome
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionSet {
    intervals: HashMap<String, Vec<(u64, u64)>>,
}

impl RegionSet {
    pub fn from_intervals<I>(intervals: I) -> Self
    where
        I: IntoIterator<Item = (String, u64, u64)>,
    {
        let mut by_chrom: HashMap<String, Vec<(u64, u64)>> = HashMap::new();
        for (chrom, start, end) in intervals {
            if end > start {
                by_chrom.entry(chrom).or_default().push((start, end));
            }
        }
        for list in by_chrom.values_mut() {
            list.sort_unstable();
            let mut merged: Vec<(u64, u64)> = Vec::with_capacity(list.len());
            for &(start, end) in list.iter() {
                match merged.last_mut() {
                    Some(last) if start <= last.1 => last.1 = last.1.max(end),
                    _ => merged.push((start, end)),
                }
            }
            *list = merged;
        }
        Self { intervals: by_chrom }
    }

    /// Load a plain or gzipped BED file
    pub fn from_bed<P: AsRef<Path>>(path: P) -> StrqcResult<Self> {
        let reader = open_text(&path)?;
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .comment(Some(b'#'))
            .from_reader(reader);

        let mut intervals = Vec::new();
        for result in csv_reader.records() {
            let record = result?;
            if record.len() < 3 {
                continue;
            }
            let chrom = &record[0];
            if chrom == "track" || chrom == "browser" || chrom.starts_with("track ") {
                continue;
            }
            let parse = |idx: usize| {
                record[idx].trim().parse::<u64>().map_err(|_| {
                    StrqcError::InvalidConfig(format!(
                        "Invalid BED coordinate '{}' in {}",
                        &record[idx],
                        path.as_ref().display()
                    ))
                })
            };
            intervals.push((chrom.to_string(), parse(1)?, parse(2)?));
        }
        log::debug!(
            "Loaded {} regions from {}",
            intervals.len(),
            path.as_ref().display()
        );
        Ok(Self::from_intervals(intervals))
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Whether `[start, end)` overlaps any region on `chrom`
    ///
    /// Chromosome names match with or without a `chr` prefix.
    pub fn overlaps(&self, chrom: &str, start: u64, end: u64) -> bool {
        let alias = match chrom.strip_prefix("chr") {
            Some(stripped) => stripped.to_string(),
            None => format!("chr{}", chrom),
        };
        let Some(list) = self
            .intervals
            .get(chrom)
            .or_else(|| self.intervals.get(&alias))
        else {
            return false;
        };
        // first interval ending after `start`
        let idx = list.partition_point(|&(_, region_end)| region_end <= start);
        list.get(idx)
            .map(|&(region_start, _)| region_start < end)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_overlaps() {
        let regions = RegionSet::from_intervals(vec![
            ("chr1".to_string(), 100, 200),
            ("chr1".to_string(), 150, 250),
            ("chr1".to_string(), 400, 500),
        ]);
        assert!(regions.overlaps("chr1", 99, 101));
        assert!(regions.overlaps("chr1", 240, 260));
        assert!(!regions.overlaps("chr1", 250, 400));
        assert!(regions.overlaps("chr1", 499, 600));
        assert!(!regions.overlaps("chr1", 500, 600));
        assert!(!regions.overlaps("chr2", 100, 200));
    }

    #[test]
    fn test_chr_prefix_alias() {
        let regions = RegionSet::from_intervals(vec![("1".to_string(), 10, 20)]);
        assert!(regions.overlaps("chr1", 15, 16));
        let regions = RegionSet::from_intervals(vec![("chrX".to_string(), 10, 20)]);
        assert!(regions.overlaps("X", 15, 16));
    }

    #[test]
    fn test_from_bed() {
        let mut bed = NamedTempFile::new().unwrap();
        writeln!(bed, "# comment").unwrap();
        writeln!(bed, "chr1\t100\t200\tname\t0").unwrap();
        writeln!(bed, "chr2\t5\t6").unwrap();
        let regions = RegionSet::from_bed(bed.path()).unwrap();
        assert!(regions.overlaps("chr1", 150, 151));
        assert!(regions.overlaps("chr2", 5, 6));
        assert!(!regions.is_empty());
    }

    #[test]
    fn test_from_bed_rejects_bad_coordinates() {
        let mut bed = NamedTempFile::new().unwrap();
        writeln!(bed, "chr1\tabc\t200").unwrap();
        assert!(RegionSet::from_bed(bed.path()).is_err());
    }

    #[test]
    fn test_missing_bed_file() {
        let result = RegionSet::from_bed("/nonexistent/regions.bed");
        assert!(matches!(result, Err(StrqcError::FileNotFound(_))));
    }
}
