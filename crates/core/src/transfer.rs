//! Import and export of redirect rules.
//!
//! Exports are a JSON array of rules without ids. Imports accept the same
//! JSON shape or the legacy CSV layout
//! (`source,destination,type,regex,title,rules`, header row optional).

use serde::Serialize;

use crate::chain::validate_for_save;
use crate::error::CoreError;
use crate::geo::GeoRule;
use crate::redirect::{
    Destination, Redirect, RedirectInput, RedirectOption, RedirectSettings, RedirectType,
};

/// Default upload limit (1 MiB).
pub const MAX_IMPORT_BYTES: usize = 1024 * 1024;

pub const CSV_MIME_TYPES: &[&str] = &[
    "text/csv",
    "application/csv",
    "text/comma-separated-values",
    "application/vnd.ms-excel",
];
pub const JSON_MIME_TYPES: &[&str] = &["application/json"];

/// Legacy CSV column order when the file has no header row.
const CSV_COLUMNS: &[&str] = &["source", "destination", "type", "regex", "title", "rules"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFormat {
    Json,
    Csv,
}

/// Pick the parser from the upload's content type and file name.
///
/// `text/plain` is accepted as CSV only when the file name ends in `.csv`.
pub fn detect_format(
    content_type: Option<&str>,
    file_name: Option<&str>,
) -> Result<ImportFormat, CoreError> {
    let mime = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .unwrap_or_default();
    let csv_name = file_name.is_some_and(|name| name.to_ascii_lowercase().ends_with(".csv"));

    if JSON_MIME_TYPES.contains(&mime.as_str()) {
        Ok(ImportFormat::Json)
    } else if CSV_MIME_TYPES.contains(&mime.as_str()) || (mime == "text/plain" && csv_name) {
        Ok(ImportFormat::Csv)
    } else {
        Err(CoreError::Validation(format!(
            "Unsupported import type '{mime}'. Must be CSV or JSON"
        )))
    }
}

pub fn check_size(len: usize, max_bytes: usize) -> Result<(), CoreError> {
    if len > max_bytes {
        return Err(CoreError::Validation(format!(
            "Import file is too large ({len} bytes, limit {max_bytes})"
        )));
    }
    Ok(())
}

/// Parse an uploaded file into raw rule inputs.
pub fn parse_import(format: ImportFormat, data: &[u8]) -> Result<Vec<RedirectInput>, CoreError> {
    let inputs = match format {
        ImportFormat::Json => serde_json::from_slice::<Vec<RedirectInput>>(data)
            .map_err(|e| CoreError::Validation(format!("Invalid JSON import: {e}")))?,
        ImportFormat::Csv => parse_csv(data)?,
    };
    if inputs.is_empty() {
        return Err(CoreError::Validation(
            "Import file contains no redirects".into(),
        ));
    }
    Ok(inputs)
}

/// Build and validate every imported rule against the stored set and the
/// rows before it. The first bad row rejects the whole file.
pub fn plan_import(
    inputs: Vec<RedirectInput>,
    existing: &[Redirect],
    settings: &RedirectSettings,
) -> Result<Vec<Redirect>, CoreError> {
    let mut known: Vec<Redirect> = existing.to_vec();
    let mut planned = Vec::with_capacity(inputs.len());

    for (index, mut input) in inputs.into_iter().enumerate() {
        input.id = 0;
        let candidate = Redirect::build(input, settings);
        validate_for_save(&candidate, &known, &settings.home_url).map_err(|e| match e {
            CoreError::Validation(msg) => CoreError::Validation(format!("Row {}: {msg}", index + 1)),
            CoreError::Conflict(msg) => CoreError::Conflict(format!("Row {}: {msg}", index + 1)),
            other => other,
        })?;
        known.push(candidate.clone());
        planned.push(candidate);
    }
    Ok(planned)
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

fn parse_csv(data: &[u8]) -> Result<Vec<RedirectInput>, CoreError> {
    let text = std::str::from_utf8(data)
        .map_err(|e| CoreError::Validation(format!("Invalid UTF-8 in CSV import: {e}")))?;
    let text = text.trim_start_matches('\u{feff}');

    let mut lines = text.lines().filter(|l| !l.trim().is_empty()).peekable();
    let mut columns: Vec<String> = CSV_COLUMNS.iter().map(|c| c.to_string()).collect();

    if let Some(first) = lines.peek() {
        let cells = parse_csv_line(first);
        if cells
            .first()
            .is_some_and(|c| c.trim().eq_ignore_ascii_case("source"))
        {
            columns = cells.iter().map(|c| c.trim().to_ascii_lowercase()).collect();
            lines.next();
        }
    }

    lines
        .enumerate()
        .map(|(index, line)| {
            csv_row(&columns, &parse_csv_line(line))
                .map_err(|msg| CoreError::Validation(format!("CSV row {}: {msg}", index + 1)))
        })
        .collect()
}

fn csv_row(columns: &[String], cells: &[String]) -> Result<RedirectInput, String> {
    let mut input = RedirectInput::default();
    for (column, value) in columns.iter().zip(cells) {
        let value = value.trim();
        match column.as_str() {
            "source" => input.source = value.to_string(),
            "destination" => input.destination = Destination::from_column(value),
            "type" if !value.is_empty() => {
                let code = value
                    .parse::<u16>()
                    .map_err(|_| format!("invalid type '{value}'"))?;
                input.redirect_type =
                    Some(RedirectType::from_code(code).map_err(|e| e.to_string())?);
            }
            "regex" if is_truthy(value) => input.options = vec![RedirectOption::Regex],
            "title" if !value.is_empty() => input.title = Some(value.to_string()),
            "rules" if !value.is_empty() => {
                input.rules = serde_json::from_str::<Vec<GeoRule>>(value)
                    .map_err(|e| format!("invalid geo rules: {e}"))?;
            }
            _ => {}
        }
    }
    Ok(input)
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "regex"
    )
}

/// Parse a single CSV line, handling quoted fields.
fn parse_csv_line(line: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match (in_quotes, ch) {
            (true, '"') if chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            (true, '"') => in_quotes = false,
            (false, '"') => in_quotes = true,
            (false, ',') => result.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    result.push(current);
    result
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

/// One exported rule. Ids are omitted so the file imports cleanly elsewhere.
#[derive(Debug, Serialize)]
pub struct ExportRecord<'a> {
    pub title: Option<&'a str>,
    pub source: &'a str,
    pub path: &'a str,
    pub destination: &'a Destination,
    #[serde(rename = "type")]
    pub redirect_type: RedirectType,
    pub options: &'a [RedirectOption],
    pub rules: &'a [GeoRule],
}

pub fn export_records(redirects: &[Redirect]) -> Vec<ExportRecord<'_>> {
    redirects
        .iter()
        .map(|r| ExportRecord {
            title: r.title.as_deref(),
            source: &r.source,
            path: &r.path,
            destination: &r.destination,
            redirect_type: r.redirect_type,
            options: &r.options,
            rules: &r.rules,
        })
        .collect()
}
