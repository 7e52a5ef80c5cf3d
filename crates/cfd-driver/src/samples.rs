//! Sample files
//!
//! One sample per line: eight numbers separated by commas and/or whitespace.
//! Blank lines and lines starting with `#` are skipped.
//!
//! ```text
//! # x0     x1     x2     x3     x4     x5     x6     x7
//! 0.125, -1.5,  3.0,   0.0,   0.75,  2.25, -0.5,   1.0
//! ```

use crate::device::InputSample;
use crate::error::{CfdError, Result};
use cfd_chip::regs::FEATURE_COUNT;
use std::path::Path;

/// Parse sample text
///
/// # Errors
///
/// Returns [`CfdError::InvalidSample`] for a line that does not hold exactly
/// eight finite numbers.
pub fn parse_samples(text: &str) -> Result<Vec<InputSample>> {
    let mut samples = Vec::new();
    for (n, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        samples.push(parse_line(line).map_err(|reason| CfdError::InvalidSample {
            line: n + 1,
            reason,
        })?);
    }
    tracing::debug!("Parsed {} samples", samples.len());
    Ok(samples)
}

/// Read and parse a sample file
///
/// # Errors
///
/// Returns error if the file cannot be read or a line is malformed.
pub fn load_samples(path: &Path) -> Result<Vec<InputSample>> {
    parse_samples(&std::fs::read_to_string(path)?)
}

fn parse_line(line: &str) -> std::result::Result<InputSample, String> {
    let mut features = [0.0; FEATURE_COUNT];
    let mut count = 0;
    for field in line
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|f| !f.is_empty())
    {
        if count == FEATURE_COUNT {
            return Err(format!("more than {FEATURE_COUNT} values"));
        }
        let value: f64 = field
            .parse()
            .map_err(|_| format!("'{field}' is not a number"))?;
        if !value.is_finite() {
            return Err(format!("'{field}' is not finite"));
        }
        features[count] = value;
        count += 1;
    }
    if count < FEATURE_COUNT {
        return Err(format!("{count} values, expected {FEATURE_COUNT}"));
    }
    Ok(InputSample::new(features))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_separators_and_comments() {
        let text = "# header\n\n1,2,3,4,5,6,7,8\n  0.5 -0.5\t0 0 0 0 0 1e-3\n";
        let samples = parse_samples(text).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].features[7], 8.0);
        assert_eq!(samples[1].features[1], -0.5);
        assert_eq!(samples[1].features[7], 1e-3);
    }

    #[test]
    fn reports_line_numbers() {
        let err = parse_samples("1 2 3 4 5 6 7 8\n1 2 3\n").unwrap_err();
        assert!(matches!(err, CfdError::InvalidSample { line: 2, .. }), "{err}");
        assert!(parse_samples("1 2 3 4 5 6 7 8 9").is_err());
        assert!(parse_samples("1 2 3 4 5 6 7 x").is_err());
        assert!(parse_samples("1 2 3 4 5 6 7 NaN").is_err());
    }

    #[test]
    fn loads_from_file() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "0 0 0 0 0 0 0 1").unwrap();
        let samples = load_samples(file.path()).unwrap();
        assert_eq!(samples, vec![InputSample::new([0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0])]);
    }
}
