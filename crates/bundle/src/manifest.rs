//! bundle_manifest.json - 产物哈希清单

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use crate::artifacts::SCHEMA_VERSION;
use crate::atomic::write_json_atomic;
use crate::error::{BundleError, Result};
use crate::registry::{relative_name, BundleRegistry};

pub const MANIFEST_FILE: &str = "bundle_manifest.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub path: String,
    pub size: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundleManifest {
    pub schema_version: String,
    pub files: Vec<ManifestEntry>,
}

/// Size and lowercase hex SHA-256 of one file
pub fn hash_file(path: &Path) -> io::Result<(u64, String)> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    let mut size = 0u64;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((size, hex::encode(hasher.finalize())))
}

/// Hash `inputs` in the given order
pub fn build_manifest(bundle_dir: &Path, inputs: &[PathBuf]) -> Result<BundleManifest> {
    let mut files = Vec::with_capacity(inputs.len());
    for input in inputs {
        let path = relative_name(bundle_dir, input)?;
        if !input.is_file() {
            return Err(BundleError::MissingArtifact { path });
        }
        let (size, sha256) = hash_file(input)?;
        files.push(ManifestEntry { path, size, sha256 });
    }
    Ok(BundleManifest {
        schema_version: SCHEMA_VERSION.to_string(),
        files,
    })
}

/// Hash the registry's artifacts and publish `bundle_manifest.json`
#[instrument(name = "bundle_manifest", skip(registry), fields(bundle = %registry.bundle_dir().display()))]
pub fn write_manifest(registry: &BundleRegistry) -> Result<BundleManifest> {
    let manifest = build_manifest(registry.bundle_dir(), &registry.build_manifest_input())?;
    write_json_atomic(&registry.bundle_dir().join(MANIFEST_FILE), &manifest)?;
    debug!(files = manifest.files.len(), "manifest written");
    Ok(manifest)
}
