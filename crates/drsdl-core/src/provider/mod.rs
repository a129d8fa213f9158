//! The provider client capability (§4.1): the only thing the orchestrator
//! depends on. Concrete back-ends (mock, and two DRS-hosting dialects) share
//! no code by inheritance — only these free functions and the trait.

mod drs_service_a;
mod drs_service_b;
mod http;
mod mock;

pub use drs_service_a::DrsServiceAClient;
pub use drs_service_b::DrsServiceBClient;
pub use mock::{MockFailure, MockObjectSpec, MockProvider};

use crate::object::Object;
use crate::openfd::OpenFdWatermark;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Why a provider operation failed, at the granularity the orchestrator and
/// object downloader need to react differently (§4.1, §7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Transport-level failure: connect/read/DNS.
    Transport,
    /// 5xx response.
    Http5xx(u16),
    /// 429 / 503 "slow down".
    Throttled,
    /// A part fetch's response body mentioned an expired token/signature.
    /// Distinguished from `TokenExpired` because it is handled at the batch
    /// level (re-sign the chunk, §4.4 Phase D) rather than retried in place.
    SignatureExpired,
    /// The provider's own auth token expired before the call was made.
    TokenExpired,
    /// 404 from resolve or sign.
    NotFound,
    /// 403 from resolve or sign.
    Forbidden,
    /// Requester-pays object without a caller-supplied billing project, or a
    /// project the provider rejected.
    BillingProjectInvalid,
    /// `checksum.algorithm` was not in the recognized set.
    UnknownChecksumAlgorithm,
    /// Anything else; never retried.
    Other,
}

impl ProviderErrorKind {
    /// Recoverable per §7: transport error, 5xx, throttled, or an expired
    /// token/signature. Everything else is a policy/data error the
    /// orchestrator must not retry.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ProviderErrorKind::Transport
                | ProviderErrorKind::Http5xx(_)
                | ProviderErrorKind::Throttled
                | ProviderErrorKind::SignatureExpired
                | ProviderErrorKind::TokenExpired
        )
    }
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.kind.is_recoverable()
    }
}

/// The narrow capability the orchestrator depends on (§4.1).
pub trait ProviderClient: Send + Sync {
    /// Resolve a DRS id to size/name/checksum. Errors here are recorded on
    /// the `Object`, not fatal to the batch. `fd_watermark` observes every
    /// file/socket the call opens (§4.5).
    fn resolve(&self, id: &str, fd_watermark: &OpenFdWatermark) -> Result<Object, ProviderError>;

    /// Populate `object.access_url`. `user_project` is the caller-supplied
    /// requester-pays billing project, if any. `fd_watermark` observes every
    /// file/socket the call opens (§4.5).
    fn sign(
        &self,
        object: &mut Object,
        user_project: Option<&str>,
        fd_watermark: &OpenFdWatermark,
    ) -> Result<(), ProviderError>;

    /// GET `Range: bytes=start-end` against `object.access_url`, streaming
    /// into `<dest_dir>/<name>.<start>.<end>.part`, returning that path.
    fn download_part(
        &self,
        object: &Object,
        start: u64,
        end: u64,
        dest_dir: &Path,
        fd_watermark: &OpenFdWatermark,
    ) -> Result<PathBuf, ProviderError>;
}

/// Known requester-pays compact-identifier prefix used by the reference
/// AnVIL DRS deployment (§3). A plain free function, not per-dialect
/// duplicated logic, per §9.
pub fn is_requester_pays_prefix(id: &str) -> bool {
    id.starts_with("drs.anv0:") || id.starts_with("dg.anv0:")
}
