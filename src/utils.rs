//! Utility functions for file handling and number formatting

use crate::{StrqcError, StrqcResult};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// Check if a file is gzip compressed
pub fn is_gzipped<P: AsRef<Path>>(path: P) -> StrqcResult<bool> {
    let mut file = File::open(path)?;
    let mut buffer = [0; 2];

    match file.read_exact(&mut buffer) {
        Ok(()) => Ok(buffer == [0x1f, 0x8b]),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(StrqcError::Io(e)),
    }
}

/// Open a plain or gzipped text file for buffered reading
pub fn open_text<P: AsRef<Path>>(path: P) -> StrqcResult<Box<dyn BufRead>> {
    let file = File::open(&path)
        .map_err(|_| StrqcError::FileNotFound(path.as_ref().to_string_lossy().to_string()))?;

    let reader: Box<dyn BufRead> = if is_gzipped(&path)? {
        Box::new(BufReader::new(MultiGzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };
    Ok(reader)
}

/// Validate file paths and check if they exist
pub fn validate_file_exists<P: AsRef<Path>>(path: P) -> StrqcResult<()> {
    if !path.as_ref().exists() {
        return Err(StrqcError::FileNotFound(
            path.as_ref().to_string_lossy().to_string(),
        ));
    }
    Ok(())
}

/// Validate that a file is readable
pub fn validate_file_readable<P: AsRef<Path>>(path: P) -> StrqcResult<()> {
    validate_file_exists(&path)?;

    File::open(&path)
        .map_err(|_| StrqcError::FileNotFound(path.as_ref().to_string_lossy().to_string()))?;

    Ok(())
}

/// Check that an output prefix can be used to name the VCF and log files
pub fn validate_output_prefix(prefix: &str) -> StrqcResult<()> {
    if prefix.is_empty() || prefix.ends_with('/') || prefix.ends_with('.') {
        return Err(StrqcError::InvalidConfig(
            "Output prefix must not be empty or end in '/' or '.'".to_string(),
        ));
    }
    let vcf_path = format!("{}.vcf", prefix);
    if Path::new(&vcf_path).is_dir() {
        return Err(StrqcError::InvalidConfig(format!(
            "The output location {} is a directory",
            vcf_path
        )));
    }
    let parent = Path::new(prefix)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    if !parent.is_dir() {
        return Err(StrqcError::InvalidConfig(format!(
            "The directory which contains the output location {} does not exist",
            prefix
        )));
    }
    Ok(())
}

/// Format a number like C's `%g`: six significant digits, trailing zeros
/// removed, exponent notation for very small or large magnitudes
pub fn format_g(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }

    let scientific = format!("{:.5e}", value);
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return value.to_string();
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return value.to_string();
    };

    if !(-4..6).contains(&exponent) {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_fraction(mantissa), sign, exponent.abs())
    } else {
        let decimals = (5 - exponent).max(0) as usize;
        trim_fraction(&format!("{:.*}", decimals, value)).to_string()
    }
}

/// Format a threshold the way Python's `str(float)` does: shortest
/// round-trip digits, always a fractional part, exponent notation below
/// 1e-4 or from 1e16 up
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let magnitude = value.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let scientific = format!("{:e}", value);
        if let Some((mantissa, exponent)) = scientific.split_once('e') {
            if let Ok(exponent) = exponent.parse::<i32>() {
                let sign = if exponent < 0 { '-' } else { '+' };
                return format!("{}e{}{:02}", mantissa, sign, exponent.abs());
            }
        }
    }
    let plain = value.to_string();
    if plain.contains('.') {
        plain
    } else {
        format!("{}.0", plain)
    }
}

fn trim_fraction(number: &str) -> &str {
    if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    }
}

/// Timer utility for measuring execution time
pub struct Timer {
    start: std::time::Instant,
    name: String,
}

impl Timer {
    pub fn new(name: &str) -> Self {
        log::info!("Starting timer: {}", name);
        Timer {
            start: std::time::Instant::now(),
            name: name.to_string(),
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }

    pub fn log_elapsed(&self) {
        let duration = self.elapsed();
        log::info!("Timer '{}' elapsed: {:.2?}", self.name, duration);
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.log_elapsed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_is_gzipped() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "test content").unwrap();
        assert!(!is_gzipped(temp_file.path()).unwrap());

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(&[0x1f, 0x8b]).unwrap();
        assert!(is_gzipped(temp_file.path()).unwrap());
    }

    #[test]
    fn test_open_text_reads_gzip() {
        let temp_file = NamedTempFile::new().unwrap();
        let mut encoder = GzEncoder::new(temp_file.as_file(), Compression::default());
        writeln!(encoder, "chr1\t10\t20").unwrap();
        encoder.finish().unwrap();

        let lines: Vec<String> = open_text(temp_file.path())
            .unwrap()
            .lines()
            .map(|l| l.unwrap())
            .collect();
        assert_eq!(lines, vec!["chr1\t10\t20"]);
    }

    #[test]
    fn test_validate_file_exists() {
        let temp_file = NamedTempFile::new().unwrap();
        assert!(validate_file_exists(temp_file.path()).is_ok());
        assert!(validate_file_readable(temp_file.path()).is_ok());
        assert!(validate_file_exists("/nonexistent/file").is_err());
    }

    #[test]
    fn test_validate_output_prefix() {
        let dir = TempDir::new().unwrap();
        let prefix = dir.path().join("run1");
        assert!(validate_output_prefix(prefix.to_str().unwrap()).is_ok());
        assert!(validate_output_prefix("out.").is_err());
        assert!(validate_output_prefix("out/").is_err());
        assert!(validate_output_prefix("/nonexistent/dir/out").is_err());

        std::fs::create_dir(dir.path().join("taken.vcf")).unwrap();
        let taken = dir.path().join("taken");
        assert!(validate_output_prefix(taken.to_str().unwrap()).is_err());
    }

    #[test]
    fn test_format_g() {
        assert_eq!(format_g(5.0), "5");
        assert_eq!(format_g(0.25), "0.25");
        assert_eq!(format_g(1.0 / 3.0), "0.333333");
        assert_eq!(format_g(123456.0), "123456");
        assert_eq!(format_g(1234567.0), "1.23457e+06");
        assert_eq!(format_g(0.0001), "0.0001");
        assert_eq!(format_g(0.00001234), "1.234e-05");
        assert_eq!(format_g(-12.5), "-12.5");
        assert_eq!(format_g(0.0), "0");
    }

    #[test]
    fn test_format_float() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(0.0), "0.0");
        assert_eq!(format_float(0.8), "0.8");
        assert_eq!(format_float(0.05), "0.05");
        assert_eq!(format_float(20.0), "20.0");
        assert_eq!(format_float(-2.5), "-2.5");
        assert_eq!(format_float(0.00001), "1e-05");
        assert_eq!(format_float(1.5e-7), "1.5e-07");
        assert_eq!(format_float(1e16), "1e+16");
    }

    #[test]
    fn test_timer() {
        let timer = Timer::new("test");
        std::thread::sleep(std::time::Duration::from_millis(1));
        assert!(timer.elapsed().as_millis() >= 1);
    }
}
