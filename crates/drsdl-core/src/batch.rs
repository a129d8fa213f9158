//! Batch orchestrator: drives resolve → pre-flight → skip-existing →
//! sign-and-download → report across a whole manifest (§4.4).

use crate::cancel::CancelToken;
use crate::object::Object;
use crate::object_downloader::{download_object, DownloadOutcome};
use crate::openfd::OpenFdWatermark;
use crate::provider::ProviderClient;
use crate::retry::RetryPolicy;
use crate::scheduler::run_bounded;
use std::path::PathBuf;
use std::sync::Arc;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

/// Part size / per-object part-fetch concurrency / per-batch download
/// concurrency, chosen once from manifest-wide statistics (§4.4 table).
#[derive(Debug, Clone, Copy)]
pub struct WorkloadShape {
    pub part_size: u64,
    pub max_part_handlers: usize,
    pub max_downloaders: usize,
}

/// Picks the workload shape for a resolved, error-free object set. Evaluated
/// once after Phase A; never revisited mid-run (§9).
pub fn choose_workload_shape(objects: &[Object]) -> WorkloadShape {
    let sizes: Vec<u64> = objects.iter().map(|o| o.size).collect();
    if sizes.len() == 1 {
        return WorkloadShape {
            part_size: 64 * MIB,
            max_part_handlers: 50,
            max_downloaders: 10,
        };
    }
    if sizes.iter().any(|&s| s > GIB) {
        return WorkloadShape {
            part_size: 128 * MIB,
            max_part_handlers: 3,
            max_downloaders: 10,
        };
    }
    if sizes.iter().all(|&s| s < 5 * MIB) {
        return WorkloadShape {
            part_size: MIB,
            max_part_handlers: 2,
            max_downloaders: 10,
        };
    }
    WorkloadShape {
        part_size: 128 * MIB,
        max_part_handlers: 10,
        max_downloaders: 10,
    }
}

#[derive(Debug, Clone)]
pub struct ObjectSummary {
    pub name: String,
    pub ok: bool,
    pub size: u64,
    pub num_parts: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    pub objects: Vec<ObjectSummary>,
    pub succeeded: usize,
    pub total: usize,
    pub peak_open_fds: usize,
    /// Set when the batch aborted before any download attempt (every
    /// resolve failed, or total resolvable bytes was zero).
    pub fatal: Option<String>,
}

impl BatchReport {
    pub fn has_failures(&self) -> bool {
        self.fatal.is_some() || self.succeeded != self.total
    }
}

pub struct BatchOptions {
    pub dest_dir: PathBuf,
    pub replace: bool,
    pub billing_project: Option<String>,
    pub max_retrievers: usize,
    pub max_signers: usize,
    pub max_downloaders_override: Option<usize>,
    pub part_size_override: Option<u64>,
    pub max_part_handlers_override: Option<usize>,
    pub retry_policy: RetryPolicy,
    /// Tripped by the CLI's interrupt handler to stop the batch between
    /// units of work (§5 "Cancellation & timeouts"). Defaults to a token
    /// that is never cancelled.
    pub cancel: CancelToken,
}

/// Runs the full batch pipeline over `uris` and returns a report. Never
/// panics on a single object's failure; only the two fatal conditions in
/// §4.4 Phase A/B short-circuit before any bytes move.
pub fn run_batch(provider: Arc<dyn ProviderClient>, uris: Vec<String>, options: &BatchOptions) -> BatchReport {
    let fd_watermark = Arc::new(OpenFdWatermark::new());

    // Phase A — Resolve.
    let resolve_provider = Arc::clone(&provider);
    let resolve_fd_watermark = Arc::clone(&fd_watermark);
    let resolved = run_bounded(uris, options.max_retrievers.max(1), Some(&options.cancel), move |uri: String| {
        let mut object = Object::from_uri(&uri);
        match resolve_provider.resolve(&object.id, &resolve_fd_watermark) {
            Ok(mut resolved) => {
                resolved.self_uri = uri;
                resolved
            }
            Err(e) => {
                tracing::warn!(uri = %object.self_uri, error = %e, "resolve failed");
                object.push_error(format!("resolve failed: {}", e));
                object
            }
        }
    });
    let mut objects: Vec<Object> = resolved.into_iter().flatten().collect();

    for object in objects.iter_mut() {
        if object.size == 0 && !object.has_errors() {
            object.push_error("resolved size is zero");
        }
    }

    if objects.iter().all(|o| o.has_errors()) {
        return fatal_report(objects, "every object failed to resolve");
    }

    // Phase B — Pre-flight.
    let total_bytes: u64 = objects.iter().filter(|o| !o.has_errors()).map(|o| o.size).sum();
    if total_bytes == 0 {
        return fatal_report(objects, "no downloadable bytes across the manifest");
    }
    tracing::info!(
        total_bytes,
        cost_estimate = format_cost_estimate(total_bytes),
        "pre-flight total"
    );

    objects.sort_by_key(|o| o.size);

    let healthy: Vec<&Object> = objects.iter().filter(|o| !o.has_errors()).collect();
    let shape = choose_workload_shape(&healthy.into_iter().cloned().collect::<Vec<_>>());
    let part_size = options.part_size_override.unwrap_or(shape.part_size);
    let max_part_handlers = options.max_part_handlers_override.unwrap_or(shape.max_part_handlers);
    let max_downloaders = options.max_downloaders_override.unwrap_or(shape.max_downloaders);

    // Phase C — Skip existing.
    for object in objects.iter_mut() {
        if object.has_errors() {
            continue;
        }
        if !options.replace && options.dest_dir.join(&object.name).exists() {
            object.already_complete = true;
        }
    }

    // Phase D — Sign-and-download, in maxSigners-sized chunks.
    for chunk in objects.chunks_mut(options.max_signers.max(1)) {
        if options.cancel.is_cancelled() {
            break;
        }
        sign_and_download_chunk(&provider, chunk, options, part_size, max_part_handlers, max_downloaders, &fd_watermark);
    }

    // Phase E — Report.
    let mut summaries = Vec::with_capacity(objects.len());
    let mut succeeded = 0usize;
    for object in &objects {
        let ok = !object.has_errors();
        if ok {
            succeeded += 1;
        }
        tracing::info!(
            name = %object.name,
            status = if ok { "OK" } else { "ERROR" },
            size = object.size,
            num_parts = object.part_paths.len(),
            "object summary"
        );
        summaries.push(ObjectSummary {
            name: object.name.clone(),
            ok,
            size: object.size,
            num_parts: object.part_paths.len(),
            errors: object.errors.clone(),
        });
    }
    let total = objects.len();
    tracing::info!(succeeded, total, "batch finished");

    BatchReport {
        objects: summaries,
        succeeded,
        total,
        peak_open_fds: fd_watermark.high_water(),
        fatal: None,
    }
}

fn sign_and_download_chunk(
    provider: &Arc<dyn ProviderClient>,
    chunk: &mut [Object],
    options: &BatchOptions,
    part_size: u64,
    max_part_handlers: usize,
    max_downloaders: usize,
    fd_watermark: &Arc<OpenFdWatermark>,
) {
    let indices: Vec<usize> = (0..chunk.len())
        .filter(|&i| !chunk[i].has_errors() && !chunk[i].already_complete)
        .collect();
    if indices.is_empty() {
        return;
    }

    sign_indices(
        provider,
        chunk,
        &indices,
        options.billing_project.as_deref(),
        fd_watermark,
        options.max_signers,
        &options.cancel,
    );
    let needs_resign = download_indices(
        provider,
        chunk,
        &indices,
        options,
        part_size,
        max_part_handlers,
        max_downloaders,
        fd_watermark,
    );

    if !needs_resign.is_empty() {
        for &i in &needs_resign {
            chunk[i].clear_errors();
            // Force a fresh signed URL: a provider client that short-circuits
            // `sign` when `access_url` is already set (e.g. one that embeds
            // the signed URL in `resolve`, §9) must not reuse the expired one.
            chunk[i].access_url = None;
        }
        sign_indices(
            provider,
            chunk,
            &needs_resign,
            options.billing_project.as_deref(),
            fd_watermark,
            options.max_signers,
            &options.cancel,
        );
        download_indices(
            provider,
            chunk,
            &needs_resign,
            options,
            part_size,
            max_part_handlers,
            max_downloaders,
            fd_watermark,
        );
    }
}

/// Signs every object at `indices` with at most `maxSigners` calls in flight
/// at once (§4.4 Phase D, §5).
fn sign_indices(
    provider: &Arc<dyn ProviderClient>,
    chunk: &mut [Object],
    indices: &[usize],
    billing_project: Option<&str>,
    fd_watermark: &Arc<OpenFdWatermark>,
    max_signers: usize,
    cancel: &CancelToken,
) {
    let billing_project = billing_project.map(str::to_string);
    let work: Vec<(usize, Object)> = indices.iter().map(|&i| (i, chunk[i].clone())).collect();
    let provider = Arc::clone(provider);
    let fd_watermark = Arc::clone(fd_watermark);

    let results = run_bounded(work, max_signers.max(1), Some(cancel), move |(i, mut object): (usize, Object)| {
        if object.requires_billing_project && billing_project.is_none() {
            object.push_error(format!("{} is requester-pays but no billing project was supplied", object.self_uri));
            return (i, object);
        }
        if let Err(e) = provider.sign(&mut object, billing_project.as_deref(), &fd_watermark) {
            object.push_error(format!("sign failed: {}", e));
        }
        (i, object)
    });

    for (i, object) in results.into_iter().flatten() {
        chunk[i] = object;
    }
}

/// Downloads every object at `indices` bounded by `maxDownloaders`, returning
/// the subset (by index) that needs a re-sign retry (§4.4 Phase D).
fn download_indices(
    provider: &Arc<dyn ProviderClient>,
    chunk: &mut [Object],
    indices: &[usize],
    options: &BatchOptions,
    part_size: u64,
    max_part_handlers: usize,
    max_downloaders: usize,
    fd_watermark: &Arc<OpenFdWatermark>,
) -> Vec<usize> {
    let signed: Vec<usize> = indices.iter().copied().filter(|&i| !chunk[i].has_errors()).collect();
    if signed.is_empty() {
        return Vec::new();
    }

    let dest_dir = options.dest_dir.clone();
    let retry_policy = options.retry_policy;
    let replace = options.replace;
    let cancel = options.cancel.clone();
    let work: Vec<(usize, Object)> = signed.iter().map(|&i| (i, chunk[i].clone())).collect();
    let provider = Arc::clone(provider);
    let fd_watermark = Arc::clone(fd_watermark);

    let results = run_bounded(work, max_downloaders.max(1), Some(&options.cancel), move |(i, mut object): (usize, Object)| {
        let outcome = download_object(
            &provider,
            &mut object,
            &dest_dir,
            part_size,
            max_part_handlers,
            &retry_policy,
            &fd_watermark,
            replace,
            Some(&cancel),
        );
        (i, object, outcome)
    });

    let mut needs_resign = Vec::new();
    for result in results.into_iter().flatten() {
        let (i, object, outcome) = result;
        chunk[i] = object;
        match outcome {
            DownloadOutcome::Completed(_) => {}
            DownloadOutcome::SignatureExpired => needs_resign.push(i),
            DownloadOutcome::Failed => {}
        }
    }
    needs_resign
}

fn fatal_report(objects: Vec<Object>, reason: &str) -> BatchReport {
    tracing::error!(reason, "batch aborted");
    let total = objects.len();
    BatchReport {
        objects: objects
            .iter()
            .map(|o| ObjectSummary {
                name: o.name.clone(),
                ok: false,
                size: o.size,
                num_parts: 0,
                errors: o.errors.clone(),
            })
            .collect(),
        succeeded: 0,
        total,
        peak_open_fds: 0,
        fatal: Some(reason.to_string()),
    }
}

fn format_cost_estimate(total_bytes: u64) -> String {
    let gb = total_bytes as f64 / (1024.0 * 1024.0 * 1024.0);
    let cost = gb * crate::config::COST_PER_GB_PLACEHOLDER;
    format!("${:.2} (placeholder rate)", cost)
}
