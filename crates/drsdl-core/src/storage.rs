//! Destination-file naming and part-file bookkeeping (§4.2, §4.5).
//!
//! Resumption has no sidecar database: the set of `<name>.<start>.<end>.part`
//! files already on disk *is* the record of what has been fetched. This
//! module is the only place that builds those filenames or decides the final
//! destination name.

use crate::planner::PartRange;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// Path for one part file of `object_name` inside `dest_dir`.
pub fn part_path(dest_dir: &Path, object_name: &str, range: &PartRange) -> PathBuf {
    dest_dir.join(format!("{}.{}", object_name, range.part_suffix()))
}

/// True if `part_path` exists and is exactly `range.len()` bytes — the only
/// condition under which a part is treated as already fetched (§4.5: a
/// short or oversized leftover part is refetched, never trusted).
pub fn part_is_complete(path: &Path, range: &PartRange) -> bool {
    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.len() == range.len(),
        Err(_) => false,
    }
}

/// Picks the destination path for a finished object, appending ` (n)` before
/// the extension when `preferred_name` already exists and `allow_replace` is
/// false (mirrors common download-manager collision handling).
///
/// This is the non-atomic, existence-check-only variant used by tests and
/// callers that only need the *name*; concurrent callers racing on the same
/// `preferred_name` should use [`claim_final_file`] instead, which closes the
/// check-then-create gap with `O_EXCL`.
pub fn resolve_destination_name(dest_dir: &Path, preferred_name: &str, allow_replace: bool) -> PathBuf {
    let candidate = dest_dir.join(preferred_name);
    if allow_replace || !candidate.exists() {
        return candidate;
    }

    let path = Path::new(preferred_name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| preferred_name.to_string());
    let extension = path.extension().map(|e| e.to_string_lossy().into_owned());

    for n in 1.. {
        let name = match &extension {
            Some(ext) => format!("{} ({}).{}", stem, n, ext),
            None => format!("{} ({})", stem, n),
        };
        let candidate = dest_dir.join(&name);
        if !candidate.exists() {
            return candidate;
        }
    }
    unreachable!("dest_dir cannot hold infinitely many same-named files")
}

/// Atomically claims a destination path for a finished object and returns it
/// already open for writing. When `allow_replace` is set this truncates
/// `preferred_name` unconditionally; otherwise it tries `preferred_name`,
/// then ` (1)`, ` (2)`, … using `O_EXCL` so two object downloaders racing on
/// the same reported name (§4.3 edge case, §8 property 6) cannot both win
/// the same path — one always lands on the next free suffix instead of
/// silently overwriting the other.
pub fn claim_final_file(dest_dir: &Path, preferred_name: &str, allow_replace: bool) -> io::Result<(PathBuf, std::fs::File)> {
    if allow_replace {
        let path = dest_dir.join(preferred_name);
        let file = std::fs::File::create(&path)?;
        return Ok((path, file));
    }

    let path = Path::new(preferred_name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| preferred_name.to_string());
    let extension = path.extension().map(|e| e.to_string_lossy().into_owned());

    let mut candidate = dest_dir.join(preferred_name);
    let mut n = 0u32;
    loop {
        match std::fs::OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(file) => return Ok((candidate, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                n += 1;
                let name = match &extension {
                    Some(ext) => format!("{} ({}).{}", stem, n, ext),
                    None => format!("{} ({})", stem, n),
                };
                candidate = dest_dir.join(&name);
            }
            Err(e) => return Err(e),
        }
    }
}

/// Concatenates `part_paths` (already sorted ascending by start offset) into
/// the already-open `final_file` (see [`claim_final_file`]), feeding every
/// chunk through `on_chunk` as it is written (used by the object downloader
/// to update a streaming checksum digest without a second read pass).
/// Deletes no input files; the caller removes them only after verification
/// succeeds.
pub fn reassemble<F: FnMut(&[u8])>(
    part_paths: &[PathBuf],
    final_file: std::fs::File,
    mut on_chunk: F,
) -> io::Result<u64> {
    let mut out = io::BufWriter::new(final_file);
    let mut total = 0u64;
    let mut buf = vec![0u8; 1024 * 1024];
    for part in part_paths {
        let mut f = std::fs::File::open(part)?;
        loop {
            let n = f.read(&mut buf)?;
            if n == 0 {
                break;
            }
            out.write_all(&buf[..n])?;
            on_chunk(&buf[..n]);
            total += n as u64;
        }
    }
    out.flush()?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_path_matches_planner_suffix() {
        let dir = Path::new("/tmp/dest");
        let range = PartRange { start: 0, end: 99 };
        assert_eq!(part_path(dir, "file.bam", &range), Path::new("/tmp/dest/file.bam.0.99.part"));
    }

    #[test]
    fn part_is_complete_checks_exact_length() {
        let dir = tempfile::tempdir().unwrap();
        let range = PartRange { start: 0, end: 9 };
        let path = part_path(dir.path(), "f", &range);
        assert!(!part_is_complete(&path, &range));
        std::fs::write(&path, vec![0u8; 10]).unwrap();
        assert!(part_is_complete(&path, &range));
        std::fs::write(&path, vec![0u8; 5]).unwrap();
        assert!(!part_is_complete(&path, &range));
    }

    #[test]
    fn resolve_destination_name_appends_suffix_on_collision() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.bam"), b"x").unwrap();
        let resolved = resolve_destination_name(dir.path(), "f.bam", false);
        assert_eq!(resolved, dir.path().join("f (1).bam"));
    }

    #[test]
    fn resolve_destination_name_reuses_when_replace_allowed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.bam"), b"x").unwrap();
        let resolved = resolve_destination_name(dir.path(), "f.bam", true);
        assert_eq!(resolved, dir.path().join("f.bam"));
    }

    #[test]
    fn reassemble_concatenates_in_order_and_feeds_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let p0 = dir.path().join("a");
        let p1 = dir.path().join("b");
        std::fs::write(&p0, b"hello ").unwrap();
        std::fs::write(&p1, b"world").unwrap();
        let final_path = dir.path().join("out");
        let final_file = std::fs::File::create(&final_path).unwrap();
        let mut seen = Vec::new();
        let total = reassemble(&[p0, p1], final_file, |chunk| seen.extend_from_slice(chunk)).unwrap();
        assert_eq!(total, 11);
        assert_eq!(std::fs::read(&final_path).unwrap(), b"hello world");
        assert_eq!(seen, b"hello world");
    }

    #[test]
    fn claim_final_file_appends_suffix_on_collision() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.bam"), b"x").unwrap();
        let (path, _file) = claim_final_file(dir.path(), "f.bam", false).unwrap();
        assert_eq!(path, dir.path().join("f (1).bam"));
    }

    #[test]
    fn claim_final_file_truncates_when_replace_allowed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.bam"), b"old contents").unwrap();
        let (path, file) = claim_final_file(dir.path(), "f.bam", true).unwrap();
        drop(file);
        assert_eq!(path, dir.path().join("f.bam"));
        assert_eq!(std::fs::read(&path).unwrap(), b"");
    }

    #[test]
    fn claim_final_file_never_hands_the_same_path_to_two_racing_callers() {
        let dir = tempfile::tempdir().unwrap();
        let claims: Vec<PathBuf> = (0..8)
            .map(|_| claim_final_file(dir.path(), "same.bin", false).unwrap().0)
            .collect();
        let unique: std::collections::HashSet<&PathBuf> = claims.iter().collect();
        assert_eq!(unique.len(), claims.len(), "every claim must be a distinct path");
    }
}
