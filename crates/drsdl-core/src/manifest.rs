//! Manifest reading: UTF-8 TSV in, an ordered list of unique `drs://` URIs out.
//!
//! Built on the `csv` crate configured for tab-delimited input rather than a
//! hand-split-lines reader, so header detection and malformed-row handling
//! follow that crate's semantics; the DRS-specific column matching and
//! prefix/duplicate validation are layered on top here.

use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("reading manifest: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing manifest: {0}")]
    Csv(#[from] csv::Error),
    #[error("no column named {requested:?} found in manifest header")]
    NoUriColumn { requested: Option<String> },
    #[error("row {row}: {value:?} does not start with drs:// (case-insensitive)")]
    BadUriPrefix { row: usize, value: String },
    #[error("duplicate URI in manifest: {value:?}")]
    DuplicateUri { value: String },
    #[error("manifest contains no URI rows")]
    Empty,
}

fn starts_with_drs_scheme(value: &str) -> bool {
    value.len() >= 6 && value[..6].eq_ignore_ascii_case("drs://")
}

/// Reads `path` as a UTF-8 TSV manifest and returns the ordered, deduplicated
/// list of `drs://` URIs found in the URI column.
///
/// `column_override`, when given, must exactly match a header name
/// (case-insensitive); otherwise the first header containing the substring
/// `uri` (case-insensitive) is used. Blank values in the URI column are
/// skipped. A value that does not start with `drs://`/`DRS://`, or a
/// duplicate URI, is a fatal `ManifestError` raised before any network call.
pub fn read_manifest(
    path: &Path,
    column_override: Option<&str>,
) -> Result<Vec<String>, ManifestError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    let uri_col = match column_override {
        Some(name) => headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
            .ok_or_else(|| ManifestError::NoUriColumn {
                requested: Some(name.to_string()),
            })?,
        None => headers
            .iter()
            .position(|h| h.to_ascii_lowercase().contains("uri"))
            .ok_or(ManifestError::NoUriColumn { requested: None })?,
    };

    let mut seen: HashSet<String> = HashSet::new();
    let mut uris = Vec::new();

    for (row_idx, record) in reader.records().enumerate() {
        let record = record?;
        let Some(raw) = record.get(uri_col) else {
            continue;
        };
        let value = raw.trim();
        if value.is_empty() {
            continue;
        }
        if !starts_with_drs_scheme(value) {
            return Err(ManifestError::BadUriPrefix {
                row: row_idx + 2, // +1 for header, +1 for 1-indexing
                value: value.to_string(),
            });
        }
        if !seen.insert(value.to_string()) {
            return Err(ManifestError::DuplicateUri {
                value: value.to_string(),
            });
        }
        uris.push(value.to_string());
    }

    if uris.is_empty() {
        return Err(ManifestError::Empty);
    }

    Ok(uris)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_manifest(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn header_with_uri_substring_is_detected() {
        let f = write_manifest("file_name\tdrs_uri\nfoo.bam\tdrs://host/abc\n");
        let uris = read_manifest(f.path(), None).unwrap();
        assert_eq!(uris, vec!["drs://host/abc"]);
    }

    #[test]
    fn case_insensitive_scheme_accepted() {
        let f = write_manifest("uri\nDRS://host/abc\n");
        let uris = read_manifest(f.path(), None).unwrap();
        assert_eq!(uris, vec!["DRS://host/abc"]);
    }

    #[test]
    fn blank_rows_are_skipped() {
        let f = write_manifest("uri\ndrs://host/a\n\ndrs://host/b\n");
        let uris = read_manifest(f.path(), None).unwrap();
        assert_eq!(uris, vec!["drs://host/a", "drs://host/b"]);
    }

    #[test]
    fn duplicate_uri_is_fatal() {
        let f = write_manifest("uri\ndrs://host/a\ndrs://host/a\n");
        let err = read_manifest(f.path(), None).unwrap_err();
        assert!(matches!(err, ManifestError::DuplicateUri { .. }));
    }

    #[test]
    fn non_drs_value_is_fatal() {
        let f = write_manifest("uri\nhttps://host/a\n");
        let err = read_manifest(f.path(), None).unwrap_err();
        assert!(matches!(err, ManifestError::BadUriPrefix { .. }));
    }

    #[test]
    fn column_override_is_case_insensitive() {
        let f = write_manifest("Identifier\tDestination\ndrs://host/a\tfoo.bam\n");
        let uris = read_manifest(f.path(), Some("identifier")).unwrap();
        assert_eq!(uris, vec!["drs://host/a"]);
    }

    #[test]
    fn no_matching_column_is_fatal() {
        let f = write_manifest("foo\tbar\nbaz\tqux\n");
        let err = read_manifest(f.path(), None).unwrap_err();
        assert!(matches!(err, ManifestError::NoUriColumn { requested: None }));
    }

    #[test]
    fn empty_manifest_is_fatal() {
        let f = write_manifest("uri\n");
        let err = read_manifest(f.path(), None).unwrap_err();
        assert!(matches!(err, ManifestError::Empty));
    }
}
