//! CSV export of target histories.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::store::{Snapshot, TargetHistory};

pub const CSV_HEADER: [&str; 5] = [
    "Request Number",
    "Response Time (s)",
    "Status Code",
    "Status Name",
    "Elapsed Time (s)",
];

/// Export error types.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
}

/// One parsed CSV row.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRow {
    pub request_number: u64,
    pub response_time_secs: f64,
    pub status_code: Option<u16>,
    pub status_name: String,
    pub elapsed_secs: f64,
}

/// Render a history as CSV. A missing status code is an empty field.
pub fn to_csv(history: &TargetHistory) -> String {
    let mut out = String::new();
    push_record(&mut out, CSV_HEADER.iter().map(|h| h.to_string()));

    for sample in &history.samples {
        push_record(
            &mut out,
            [
                sample.sequence.to_string(),
                sample.latency_secs.to_string(),
                sample.status_code.map(|c| c.to_string()).unwrap_or_default(),
                sample.status_name.to_string(),
                sample.elapsed_secs.to_string(),
            ],
        );
    }
    out
}

fn push_record(out: &mut String, fields: impl IntoIterator<Item = String>) {
    for (i, field) in fields.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        if field.contains([',', '"', '\n', '\r']) {
            out.push('"');
            out.push_str(&field.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(&field);
        }
    }
    out.push('\n');
}

/// Parse CSV produced by [`to_csv`].
pub fn parse_csv(input: &str) -> Result<Vec<ExportRow>, ExportError> {
    let mut lines = input.lines().enumerate().filter(|(_, l)| !l.is_empty());

    let (_, header) = lines.next().ok_or(ExportError::Parse {
        line: 1,
        message: "missing header".to_string(),
    })?;
    if split_record(header, 1)? != CSV_HEADER {
        return Err(ExportError::Parse {
            line: 1,
            message: format!("unexpected header {:?}", header),
        });
    }

    lines
        .map(|(idx, line)| parse_row(line, idx + 1))
        .collect()
}

fn parse_row(line: &str, line_no: usize) -> Result<ExportRow, ExportError> {
    let fields = split_record(line, line_no)?;
    let [number, time, code, name, elapsed] = <[String; 5]>::try_from(fields).map_err(|f| {
        ExportError::Parse {
            line: line_no,
            message: format!("expected 5 fields, got {}", f.len()),
        }
    })?;

    let bad = |what: &str, value: &str| ExportError::Parse {
        line: line_no,
        message: format!("bad {}: {:?}", what, value),
    };

    Ok(ExportRow {
        request_number: number.parse().map_err(|_| bad("request number", &number))?,
        response_time_secs: time.parse().map_err(|_| bad("response time", &time))?,
        status_code: if code.is_empty() {
            None
        } else {
            Some(code.parse().map_err(|_| bad("status code", &code))?)
        },
        status_name: name,
        elapsed_secs: elapsed.parse().map_err(|_| bad("elapsed time", &elapsed))?,
    })
}

fn split_record(line: &str, line_no: usize) -> Result<Vec<String>, ExportError> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut chars = line.chars().peekable();
    let mut quoted = false;

    while let Some(c) = chars.next() {
        match (quoted, c) {
            (true, '"') if chars.peek() == Some(&'"') => {
                chars.next();
                field.push('"');
            }
            (true, '"') => quoted = false,
            (true, c) => field.push(c),
            (false, '"') if field.is_empty() => quoted = true,
            (false, ',') => fields.push(std::mem::take(&mut field)),
            (false, c) => field.push(c),
        }
    }

    if quoted {
        return Err(ExportError::Parse {
            line: line_no,
            message: "unterminated quote".to_string(),
        });
    }
    fields.push(field);
    Ok(fields)
}

/// Download file name for a URL, e.g. `example.com_health_data.csv`.
pub fn file_name(url: &str) -> String {
    let stem = url
        .replace("http://", "")
        .replace("https://", "")
        .replace('/', "_");
    format!("{}_data.csv", stem)
}

/// Download file name for a target: its URL when known, else its identifier.
pub fn history_file_name(id: &str, history: &TargetHistory) -> String {
    file_name(history.url.as_deref().unwrap_or(id))
}

/// Write one CSV per target with at least one sample into `dir`.
pub fn write_snapshot(dir: &Path, snapshot: &Snapshot) -> Result<Vec<PathBuf>, ExportError> {
    fs::create_dir_all(dir)?;

    let mut written = Vec::new();
    for (id, history) in &snapshot.targets {
        if history.is_empty() {
            continue;
        }
        let path = dir.join(history_file_name(id, history));
        fs::write(&path, to_csv(history))?;
        tracing::info!("Exported {} samples for {} to {}", history.len(), id, path.display());
        written.push(path);
    }
    Ok(written)
}
