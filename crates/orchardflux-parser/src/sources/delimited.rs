use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use tracing::debug;

use super::{zip_row, RowSource};
use crate::errors::SourceError;
use crate::model::RawRow;

const SNIFF_BYTES: usize = 1024;
const CANDIDATE_DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];

/// Reads delimited text files from a data directory.
#[derive(Debug, Clone)]
pub struct DelimitedFileSource {
    data_dir: PathBuf,
}

impl DelimitedFileSource {
    const NAME: &'static str = "delimited";

    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }
}

impl RowSource for DelimitedFileSource {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn rows(&self, location: &str, field_names: &[String]) -> Result<Vec<RawRow>, SourceError> {
        let path = self.data_dir.join(location);
        debug!(path = %path.display(), "reading delimited file");
        let bytes = fs::read(&path).map_err(|err| SourceError::Fetch {
            location: location.to_string(),
            message: match err.kind() {
                ErrorKind::NotFound => format!("file {} does not exist", path.display()),
                _ => err.to_string(),
            },
        })?;
        let content = String::from_utf8(bytes).map_err(|err| SourceError::Content {
            location: location.to_string(),
            message: format!("file is not valid UTF-8: {err}"),
        })?;
        parse_delimited(location, &content, field_names)
    }
}

/// Parses delimited `content` into rows keyed by `field_names`.
///
/// The delimiter is sniffed from the start of the content and the first
/// record is treated as a header and dropped, since the caller already
/// supplies the field names.
pub fn parse_delimited(
    location: &str,
    content: &str,
    field_names: &[String],
) -> Result<Vec<RawRow>, SourceError> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    let delimiter = sniff_delimiter(content).ok_or_else(|| SourceError::Content {
        location: location.to_string(),
        message: "could not determine delimiter".to_string(),
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(content.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records().skip(1) {
        let record = record.map_err(|err| SourceError::Csv {
            location: location.to_string(),
            source: err,
        })?;
        rows.push(zip_row(field_names, record.iter()));
    }

    Ok(rows)
}

/// Guesses the delimiter from the first kilobyte of `content`.
///
/// A candidate qualifies when it occurs (outside quotes) on every complete
/// sampled line. Candidates with the same count on every line beat ragged
/// ones; ties go to the higher minimum count.
pub fn sniff_delimiter(content: &str) -> Option<u8> {
    let mut end = content.len().min(SNIFF_BYTES);
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    let sample = &content[..end];

    let mut lines: Vec<&str> = sample.lines().collect();
    if end < content.len() && lines.len() > 1 {
        // last line was cut by the sample window
        lines.pop();
    }
    lines.retain(|line| !line.trim().is_empty());
    if lines.is_empty() {
        return None;
    }

    let mut best: Option<(u8, (bool, usize))> = None;
    for candidate in CANDIDATE_DELIMITERS {
        let counts: Vec<usize> = lines
            .iter()
            .map(|line| count_unquoted(line, candidate))
            .collect();
        let min = counts.iter().copied().min().unwrap_or(0);
        if min == 0 {
            continue;
        }
        let score = (counts.iter().all(|count| *count == counts[0]), min);
        if best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((candidate, score));
        }
    }

    best.map(|(delimiter, _)| delimiter)
}

fn count_unquoted(line: &str, delimiter: u8) -> usize {
    let mut in_quotes = false;
    let mut count = 0;
    for byte in line.bytes() {
        if byte == b'"' {
            in_quotes = !in_quotes;
        } else if byte == delimiter && !in_quotes {
            count += 1;
        }
    }
    count
}
