//! Shared scenario-test fixtures (§8 Test tooling): manifest construction and
//! mock-object registration helpers, so each scenario test stays short.

use drsdl_core::provider::{MockObjectSpec, MockProvider};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Writes a minimal one-column TSV manifest (`uri` header) containing `uris`.
pub fn write_manifest(dir: &Path, uris: &[String]) -> PathBuf {
    let path = dir.join("manifest.tsv");
    let mut f = std::fs::File::create(&path).unwrap();
    writeln!(f, "uri").unwrap();
    for uri in uris {
        writeln!(f, "{}", uri).unwrap();
    }
    path
}

/// Registers `count` uniformly-sized synthetic objects on `mock` and returns
/// their manifest URIs in registration order.
pub fn register_uniform_objects(mock: &MockProvider, count: usize, size: u64) -> Vec<String> {
    (0..count)
        .map(|i| {
            let id = format!("obj{}", i);
            mock.register(id.clone(), MockObjectSpec::new(format!("file{}.bin", i), size));
            format!("drs://host/{}", id)
        })
        .collect()
}
