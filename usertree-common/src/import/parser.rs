//! Record parsing for bulk import
//!
//! Normalizes delimited text and JSON arrays into an ordered sequence of
//! records keyed by lower-cased field name. Pure transform: no I/O, the whole
//! upload is already in memory.

use crate::{Error, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

/// UTF-8 BOM bytes
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Declared upload format, taken from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// `.csv` and `.txt`
    Csv,
    /// `.tsv`
    Tsv,
    /// `.json`
    Json,
}

impl FileFormat {
    /// Map an extension (without the dot, any case) to a format
    pub fn from_extension(extension: &str) -> Result<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "csv" | "txt" => Ok(Self::Csv),
            "tsv" => Ok(Self::Tsv),
            "json" => Ok(Self::Json),
            other => Err(Error::UnsupportedFormat(other.to_string())),
        }
    }

    /// Format of an uploaded file name; no extension is unsupported
    pub fn from_file_name(file_name: &str) -> Result<Self> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("");
        Self::from_extension(extension)
    }
}

/// One parsed row/object before field validation
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// 1-based source position: CSV line number, or JSON array index + 1
    pub line: usize,
    pub fields: HashMap<String, String>,
}

/// Validated import row; `password` is plaintext and consumed once
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRecord {
    pub line: usize,
    pub name: String,
    pub username: String,
    pub password: String,
    pub parent_name: Option<String>,
}

/// Detect the format, parse, and validate an uploaded file
///
/// The extension is checked before the content is looked at.
pub fn parse_import_file(file_name: &str, data: &[u8]) -> Result<Vec<ImportRecord>> {
    let format = FileFormat::from_file_name(file_name)?;
    let raw = parse_records(data, format)?;
    to_import_records(raw)
}

/// Parse bytes in the given format; an empty payload is `NoDataFound`
pub fn parse_records(data: &[u8], format: FileFormat) -> Result<Vec<RawRecord>> {
    let records = match format {
        FileFormat::Csv => parse_delimited(data, b',')?,
        FileFormat::Tsv => parse_delimited(data, b'\t')?,
        FileFormat::Json => parse_json(data)?,
    };

    if records.is_empty() {
        return Err(Error::NoDataFound);
    }
    Ok(records)
}

/// Strip UTF-8 BOM from the beginning of data if present
fn strip_utf8_bom(data: &[u8]) -> &[u8] {
    data.strip_prefix(UTF8_BOM).unwrap_or(data)
}

/// Header row + data rows; every data row must have the header's width
fn parse_delimited(data: &[u8], delimiter: u8) -> Result<Vec<RawRecord>> {
    let data = strip_utf8_bom(data);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(data);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| Error::Parse(format!("Invalid header row: {}", e)))?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();

    if headers.iter().all(|h| h.is_empty()) {
        return Ok(Vec::new());
    }

    let mut records = Vec::new();
    for (index, result) in reader.records().enumerate() {
        let row = result.map_err(|e| Error::Parse(e.to_string()))?;
        let line = row
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(index + 2);

        if row.len() != headers.len() {
            return Err(Error::MalformedRow {
                line,
                reason: format!(
                    "expected {} fields to match the header, found {}",
                    headers.len(),
                    row.len()
                ),
            });
        }

        let fields = headers
            .iter()
            .cloned()
            .zip(row.iter().map(str::to_string))
            .collect();
        records.push(RawRecord { line, fields });
    }

    Ok(records)
}

/// Top-level array of flat objects
fn parse_json(data: &[u8]) -> Result<Vec<RawRecord>> {
    let data = strip_utf8_bom(data);
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    let document: Value =
        serde_json::from_slice(data).map_err(|e| Error::Parse(format!("Invalid JSON: {}", e)))?;

    let items = match document {
        Value::Array(items) => items,
        // Decodes to nothing, same as an empty file
        Value::Null => return Ok(Vec::new()),
        _ => return Err(Error::Parse("Expected a JSON array of objects".to_string())),
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let line = index + 1;
            let Value::Object(object) = item else {
                return Err(Error::Parse(format!("Element {} is not an object", line)));
            };

            let mut fields = HashMap::with_capacity(object.len());
            for (key, value) in object {
                let text = match value {
                    Value::Null => continue,
                    Value::String(s) => s,
                    Value::Bool(b) => b.to_string(),
                    Value::Number(n) => n.to_string(),
                    Value::Array(_) | Value::Object(_) => {
                        return Err(Error::Parse(format!(
                            "Element {} field '{}' must be a scalar",
                            line, key
                        )));
                    }
                };
                fields.insert(key.to_lowercase(), text);
            }
            Ok(RawRecord { line, fields })
        })
        .collect()
}

/// Validate required fields of every record
pub fn to_import_records(raw: Vec<RawRecord>) -> Result<Vec<ImportRecord>> {
    raw.into_iter().map(to_import_record).collect()
}

fn to_import_record(mut raw: RawRecord) -> Result<ImportRecord> {
    let line = raw.line;
    let mut required = |field: &str, trimmed: bool| -> Result<String> {
        match raw.fields.remove(field) {
            Some(value) if !value.trim().is_empty() => {
                Ok(if trimmed { value.trim().to_string() } else { value })
            }
            _ => Err(Error::MalformedRow {
                line,
                reason: format!("missing required field '{}'", field),
            }),
        }
    };

    let username = required("username", true)?;
    let name = required("name", true)?;
    let password = required("password", false)?;

    let parent_name = raw
        .fields
        .remove("parent_name")
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty());

    Ok(ImportRecord {
        line,
        name,
        username,
        password,
        parent_name,
    })
}
