//! Per-object pipeline: plan parts, fetch the missing ones with bounded
//! concurrency and retry, reassemble, and verify (§4.2, §4.3, §4.5).

use crate::cancel::CancelToken;
use crate::checksum::StreamingDigest;
use crate::object::Object;
use crate::openfd::OpenFdWatermark;
use crate::planner::{plan_parts, PartRange};
use crate::provider::{ProviderClient, ProviderErrorKind};
use crate::retry::{run_with_retry, RetryPolicy};
use crate::scheduler::run_bounded;
use crate::storage;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug)]
pub enum DownloadOutcome {
    /// Every part fetched, reassembled, and (if advertised) checksum-verified.
    Completed(PathBuf),
    /// A part's signed URL expired mid-object; the batch orchestrator must
    /// re-sign and retry this object (§4.4 Phase D). Already-fetched parts
    /// are left on disk for the retry to pick up.
    SignatureExpired,
    /// A part could not be fetched after retries, or reassembly/verification
    /// failed. `object.errors` carries the reason(s); part files are always
    /// left on disk so a later invocation (or a human) can resume or inspect.
    Failed,
}

/// Downloads and verifies one object. Assumes the caller has already decided
/// this object needs downloading (Phase C's already-complete check happens
/// one level up, in the batch orchestrator).
pub fn download_object(
    provider: &Arc<dyn ProviderClient>,
    object: &mut Object,
    dest_dir: &std::path::Path,
    part_size: u64,
    max_part_handlers: usize,
    retry_policy: &RetryPolicy,
    fd_watermark: &Arc<OpenFdWatermark>,
    allow_replace: bool,
    cancel: Option<&CancelToken>,
) -> DownloadOutcome {
    // An unrecognized checksum algorithm is fatal before any bytes move (§4.3
    // edge cases): check it ahead of the part fetch, not just before reassembly.
    if let Some(c) = &object.checksum {
        if let Err(e) = StreamingDigest::for_algorithm(&c.algorithm) {
            object.push_error(e.to_string());
            return DownloadOutcome::Failed;
        }
    }

    if cancel.is_some_and(CancelToken::is_cancelled) {
        object.push_error("cancelled before download started");
        return DownloadOutcome::Failed;
    }

    let plan = plan_parts(object.size, part_size);
    if plan.len() > 1000 {
        tracing::warn!(
            name = %object.name,
            num_parts = plan.len(),
            "object plans more than 1000 parts; this is a diagnostic, not a limit"
        );
    }

    let pending: Vec<PartRange> = plan
        .iter()
        .copied()
        .filter(|range| !storage::part_is_complete(&storage::part_path(dest_dir, &object.name, range), range))
        .collect();

    if !pending.is_empty() {
        let provider = Arc::clone(provider);
        let object_snapshot = object.clone();
        let dest_dir_owned = dest_dir.to_path_buf();
        let retry_policy = *retry_policy;
        let fd_watermark = Arc::clone(fd_watermark);

        let results = run_bounded(pending.clone(), max_part_handlers.max(1), cancel, move |range: PartRange| {
            run_with_retry(
                &retry_policy,
                |e: &crate::provider::ProviderError| {
                    e.is_recoverable() && e.kind != ProviderErrorKind::SignatureExpired
                },
                || provider.download_part(&object_snapshot, range.start, range.end, &dest_dir_owned, &fd_watermark),
            )
        });

        let mut signature_expired = false;
        for (range, result) in pending.iter().zip(results.into_iter()) {
            match result {
                Some(Ok(_path)) => {}
                Some(Err(e)) if e.kind == ProviderErrorKind::SignatureExpired => {
                    signature_expired = true;
                }
                Some(Err(e)) => {
                    object.push_error(format!("part {}-{} failed: {}", range.start, range.end, e));
                }
                None if cancel.is_some_and(CancelToken::is_cancelled) => {
                    object.push_error(format!("part {}-{} not fetched: cancelled", range.start, range.end));
                }
                None => {
                    object.push_error(format!("part {}-{} panicked", range.start, range.end));
                }
            }
        }

        if signature_expired {
            return DownloadOutcome::SignatureExpired;
        }
        if object.has_errors() {
            return DownloadOutcome::Failed;
        }
    }

    let part_paths: Vec<PathBuf> = plan
        .iter()
        .map(|range| storage::part_path(dest_dir, &object.name, range))
        .collect();
    object.part_paths = part_paths.clone();

    let (final_path, final_file) = match storage::claim_final_file(dest_dir, &object.name, allow_replace) {
        Ok(claimed) => claimed,
        Err(e) => {
            object.push_error(format!("claiming destination file: {}", e));
            return DownloadOutcome::Failed;
        }
    };

    let mut digest = match &object.checksum {
        Some(c) => match StreamingDigest::for_algorithm(&c.algorithm) {
            Ok(d) => Some(d),
            Err(e) => {
                object.push_error(e.to_string());
                return DownloadOutcome::Failed;
            }
        },
        None => None,
    };

    let total = match storage::reassemble(&part_paths, final_file, |chunk| {
        if let Some(d) = digest.as_mut() {
            d.update(chunk);
        }
    }) {
        Ok(n) => n,
        Err(e) => {
            object.push_error(format!("reassembly failed: {}", e));
            return DownloadOutcome::Failed;
        }
    };

    if total != object.size {
        object.push_error(format!(
            "reassembled size {} does not match advertised size {}",
            total, object.size
        ));
        // Integrity failure (§4.3 step 4, §7): retain both the parts and the
        // mismatched output so a later invocation, or a human, can inspect
        // or resume from them.
        return DownloadOutcome::Failed;
    }

    if let (Some(digest), Some(checksum)) = (digest, &object.checksum) {
        let actual = digest.finalize_hex();
        if !actual.eq_ignore_ascii_case(&checksum.hex_digest) {
            object.push_error(format!(
                "checksum mismatch: expected {} got {}",
                checksum.hex_digest, actual
            ));
            return DownloadOutcome::Failed;
        }
    }

    for part in &part_paths {
        let _ = std::fs::remove_file(part);
    }
    DownloadOutcome::Completed(final_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::AccessType;
    use crate::provider::{MockFailure, MockObjectSpec, MockProvider, ProviderClient};

    fn make_object(mock: &MockProvider, id: &str, spec: MockObjectSpec) -> Object {
        let watermark = OpenFdWatermark::new();
        mock.register(id, spec);
        let mut object = mock.resolve(id, &watermark).unwrap();
        mock.sign(&mut object, None, &watermark).unwrap();
        object
    }

    #[test]
    fn downloads_small_object_and_verifies_checksum() {
        let mock = MockProvider::new();
        let mut object = make_object(&mock, "a", MockObjectSpec::new("file.bin", 100));
        let provider: Arc<dyn ProviderClient> = Arc::new(mock);
        let dir = tempfile::tempdir().unwrap();
        let watermark = Arc::new(OpenFdWatermark::new());
        let outcome = download_object(&provider, &mut object, dir.path(), 30, 4, &RetryPolicy::new(3), &watermark, false, None);
        match outcome {
            DownloadOutcome::Completed(path) => {
                let bytes = std::fs::read(path).unwrap();
                assert_eq!(bytes.len(), 100);
            }
            other => panic!("expected Completed, got {:?}", other),
        }
        assert!(!object.has_errors());
    }

    #[test]
    fn signature_expiry_is_reported_without_marking_object_failed() {
        let mock = MockProvider::new();
        mock.register("b", MockObjectSpec::new("f", 50).with_failure(MockFailure::SignatureExpiresOnce));
        let resolve_watermark = OpenFdWatermark::new();
        let mut unsigned = mock.resolve("b", &resolve_watermark).unwrap();
        unsigned.access_url = None;
        unsigned.access_type = AccessType::None;

        let provider: Arc<dyn ProviderClient> = Arc::new(mock);
        let dir = tempfile::tempdir().unwrap();
        let watermark = Arc::new(OpenFdWatermark::new());
        let outcome = download_object(&provider, &mut unsigned, dir.path(), 20, 2, &RetryPolicy::new(3), &watermark, false, None);
        assert!(matches!(outcome, DownloadOutcome::SignatureExpired));
    }

    #[test]
    fn unrecognized_algorithm_is_fatal_before_any_part_is_fetched() {
        let mock = MockProvider::new();
        mock.register("e", MockObjectSpec::new("f", 40).with_failure(MockFailure::UnknownChecksumAlgorithm));
        let resolve_watermark = OpenFdWatermark::new();
        let mut object = mock.resolve("e", &resolve_watermark).unwrap();
        mock.sign(&mut object, None, &resolve_watermark).unwrap();

        let provider: Arc<dyn ProviderClient> = Arc::new(mock);
        let dir = tempfile::tempdir().unwrap();
        let watermark = Arc::new(OpenFdWatermark::new());
        let outcome = download_object(&provider, &mut object, dir.path(), 16, 2, &RetryPolicy::new(3), &watermark, false, None);
        assert!(matches!(outcome, DownloadOutcome::Failed));
        assert!(object.has_errors());
        assert_eq!(
            std::fs::read_dir(dir.path()).unwrap().count(),
            0,
            "no part file should be written when the algorithm is unrecognized"
        );
    }

    #[test]
    fn wrong_checksum_fails_and_retains_parts_for_manual_recovery() {
        let mock = MockProvider::new();
        mock.register("c", MockObjectSpec::new("f", 40).with_failure(MockFailure::WrongChecksum));
        let resolve_watermark = OpenFdWatermark::new();
        let mut object = mock.resolve("c", &resolve_watermark).unwrap();
        mock.sign(&mut object, None, &resolve_watermark).unwrap();

        let provider: Arc<dyn ProviderClient> = Arc::new(mock);
        let dir = tempfile::tempdir().unwrap();
        let watermark = Arc::new(OpenFdWatermark::new());
        let outcome = download_object(&provider, &mut object, dir.path(), 16, 2, &RetryPolicy::new(3), &watermark, false, None);
        assert!(matches!(outcome, DownloadOutcome::Failed));
        assert!(object.has_errors());
        for part in &object.part_paths {
            assert!(part.exists(), "part files must survive a checksum mismatch so the next invocation can resume");
        }
    }

    #[test]
    fn resumes_from_existing_correctly_sized_parts() {
        let mock = MockProvider::new();
        mock.register("d", MockObjectSpec::new("f", 40));
        let resolve_watermark = OpenFdWatermark::new();
        let mut object = mock.resolve("d", &resolve_watermark).unwrap();
        mock.sign(&mut object, None, &resolve_watermark).unwrap();
        assert_eq!(mock.resolve_call_count(), 1, "resolve happens once, before this pipeline runs at all");

        let dir = tempfile::tempdir().unwrap();
        let part0 = storage::part_path(dir.path(), "f", &PartRange { start: 0, end: 19 });
        std::fs::write(&part0, (0u8..20).collect::<Vec<u8>>()).unwrap();

        let provider: Arc<dyn ProviderClient> = Arc::new(mock);
        let watermark = Arc::new(OpenFdWatermark::new());
        let outcome = download_object(&provider, &mut object, dir.path(), 20, 2, &RetryPolicy::new(3), &watermark, false, None);
        assert!(matches!(outcome, DownloadOutcome::Completed(_)));
    }
}
