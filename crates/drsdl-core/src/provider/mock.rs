//! In-memory provider used by the test suite and the CLI's `mock` subcommand
//! (no network, deterministic synthetic bytes, per-object scripted failures).

use super::{ProviderClient, ProviderError, ProviderErrorKind};
use crate::checksum::StreamingDigest;
use crate::object::{AccessType, Checksum, Object};
use crate::openfd::OpenFdWatermark;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

/// A scripted failure mode for one mock object, driving the manifest-level
/// test scenarios without a real DRS-hosting service.
#[derive(Debug, Clone)]
pub enum MockFailure {
    /// `resolve` returns a 404-equivalent.
    NotFound,
    /// `resolve` reports a checksum algorithm this crate does not recognize.
    UnknownChecksumAlgorithm,
    /// Reassembled bytes hash to something other than the advertised digest.
    WrongChecksum,
    /// `sign` fails unless a billing project is supplied.
    RequiresBillingProject,
    /// The first `n` calls to `download_part` for this object fail with a
    /// transport error; the rest succeed.
    TransientThenOk(u32),
    /// Every `download_part` call fails with `SignatureExpired` until `sign`
    /// has been called twice — once for the initial signing the batch always
    /// does before its first download attempt, and once more for the
    /// orchestrator's one re-sign retry (§4.4 Phase D). This models a signed
    /// URL that is already stale by the time the download phase starts,
    /// independent of how many parts the object has.
    SignatureExpiresOnce,
}

/// A registered mock object: deterministic synthetic content, no real bytes
/// ever leave the process.
#[derive(Debug, Clone)]
pub struct MockObjectSpec {
    pub name: String,
    pub size: u64,
    pub algorithm: String,
    pub failure: Option<MockFailure>,
}

impl MockObjectSpec {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            algorithm: "sha256".to_string(),
            failure: None,
        }
    }

    pub fn with_algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.algorithm = algorithm.into();
        self
    }

    pub fn with_failure(mut self, failure: MockFailure) -> Self {
        self.failure = Some(failure);
        self
    }
}

/// Deterministic synthetic byte for absolute offset `i`: content is a
/// repeating `0..=255` ramp, so any two mock objects of the same size hash
/// identically and any byte range is reproducible without storing the object.
fn synthetic_byte(i: u64) -> u8 {
    (i % 256) as u8
}

struct ObjectState {
    spec: MockObjectSpec,
    signs_count: u32,
    download_attempts: u32,
}

#[derive(Default)]
pub struct MockProvider {
    objects: Mutex<HashMap<String, ObjectState>>,
    next_resolve_call: AtomicU32,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a synthetic object under DRS id `id`.
    pub fn register(&self, id: impl Into<String>, spec: MockObjectSpec) -> &Self {
        self.objects.lock().unwrap().insert(
            id.into(),
            ObjectState {
                spec,
                signs_count: 0,
                download_attempts: 0,
            },
        );
        self
    }

    pub fn resolve_call_count(&self) -> u32 {
        self.next_resolve_call.load(Ordering::SeqCst)
    }
}

impl ProviderClient for MockProvider {
    fn resolve(&self, id: &str, _fd_watermark: &OpenFdWatermark) -> Result<Object, ProviderError> {
        self.next_resolve_call.fetch_add(1, Ordering::SeqCst);
        let objects = self.objects.lock().unwrap();
        let state = objects.get(id).ok_or_else(|| {
            ProviderError::new(ProviderErrorKind::NotFound, format!("no such mock object: {}", id))
        })?;

        if matches!(state.spec.failure, Some(MockFailure::NotFound)) {
            return Err(ProviderError::new(
                ProviderErrorKind::NotFound,
                format!("mock object {} does not exist", id),
            ));
        }

        let mut object = Object::from_uri(&format!("drs://mock/{}", id));
        object.name = state.spec.name.clone();
        object.size = state.spec.size;
        object.requires_billing_project =
            matches!(state.spec.failure, Some(MockFailure::RequiresBillingProject));

        if matches!(state.spec.failure, Some(MockFailure::UnknownChecksumAlgorithm)) {
            object.checksum = Some(Checksum::new("crc32", "deadbeef"));
        } else {
            let mut digest = StreamingDigest::for_algorithm(&state.spec.algorithm)
                .expect("mock spec must use a recognized algorithm unless testing UnknownChecksumAlgorithm");
            let mut buf = vec![0u8; 64 * 1024];
            let mut offset = 0u64;
            while offset < state.spec.size {
                let n = buf.len().min((state.spec.size - offset) as usize);
                for (i, b) in buf[..n].iter_mut().enumerate() {
                    *b = synthetic_byte(offset + i as u64);
                }
                digest.update(&buf[..n]);
                offset += n as u64;
            }
            let mut hex_digest = digest.finalize_hex();
            if matches!(state.spec.failure, Some(MockFailure::WrongChecksum)) {
                hex_digest = "0".repeat(hex_digest.len());
            }
            object.checksum = Some(Checksum::new(state.spec.algorithm.clone(), hex_digest));
        }

        Ok(object)
    }

    fn sign(
        &self,
        object: &mut Object,
        user_project: Option<&str>,
        _fd_watermark: &OpenFdWatermark,
    ) -> Result<(), ProviderError> {
        let mut objects = self.objects.lock().unwrap();
        let state = objects.get_mut(&object.id).ok_or_else(|| {
            ProviderError::new(ProviderErrorKind::NotFound, format!("no such mock object: {}", object.id))
        })?;

        if state.spec.failure.as_ref().map(|f| matches!(f, MockFailure::RequiresBillingProject)) == Some(true)
            && user_project.is_none()
        {
            return Err(ProviderError::new(
                ProviderErrorKind::BillingProjectInvalid,
                format!("{} is requester-pays but no billing project was supplied", object.id),
            ));
        }

        state.signs_count += 1;
        object.access_type = AccessType::Https;
        object.access_url = Some(format!("mock://{}/signed", object.id));
        Ok(())
    }

    fn download_part(
        &self,
        object: &Object,
        start: u64,
        end: u64,
        dest_dir: &Path,
        fd_watermark: &OpenFdWatermark,
    ) -> Result<PathBuf, ProviderError> {
        let attempt = {
            let mut objects = self.objects.lock().unwrap();
            let state = objects.get_mut(&object.id).ok_or_else(|| {
                ProviderError::new(ProviderErrorKind::NotFound, format!("no such mock object: {}", object.id))
            })?;
            state.download_attempts += 1;
            let attempt = state.download_attempts;

            match &state.spec.failure {
                Some(MockFailure::TransientThenOk(n)) if attempt <= *n => {
                    return Err(ProviderError::new(
                        ProviderErrorKind::Transport,
                        format!("mock transient failure on attempt {}", attempt),
                    ));
                }
                Some(MockFailure::SignatureExpiresOnce) if state.signs_count < 2 => {
                    return Err(ProviderError::new(
                        ProviderErrorKind::SignatureExpired,
                        "mock signed URL has expired",
                    ));
                }
                _ => {}
            }
            attempt
        };
        let _ = attempt;

        let _guard = fd_watermark.track_open();
        let part_filename = format!(
            "{}.{}.{}.part",
            object.name,
            start,
            end
        );
        let dest_path = dest_dir.join(&part_filename);
        let mut file = std::fs::File::create(&dest_path).map_err(|e| {
            ProviderError::new(ProviderErrorKind::Other, format!("create {}: {}", dest_path.display(), e))
        })?;
        let mut buf = Vec::with_capacity((end + 1 - start) as usize);
        for i in start..=end {
            buf.push(synthetic_byte(i));
        }
        file.write_all(&buf)
            .map_err(|e| ProviderError::new(ProviderErrorKind::Other, format!("write {}: {}", dest_path.display(), e)))?;
        Ok(dest_path)
    }
}
