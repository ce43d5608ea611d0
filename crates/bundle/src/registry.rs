//! Bundle artifact registry

use std::path::{Component, Path, PathBuf};

use crate::artifacts::{
    CONFIG_REPORT_FILE, CONFIG_VERIFY_FILE, HOST_SNAPSHOT_FILE, METRICS_CSV_FILE, METRICS_JSON_FILE,
    RUN_FILE, SCENARIO_FILE, SUMMARY_FILE,
};
use crate::error::{BundleError, Result};
use crate::events::EVENTS_FILE;

/// 产物登记表
///
/// Required artifacts are always handed to the manifest so a missing one
/// surfaces as an error; optional artifacts are only listed when present.
#[derive(Debug, Clone)]
pub struct BundleRegistry {
    bundle_dir: PathBuf,
    required: Vec<PathBuf>,
    optional: Vec<PathBuf>,
}

impl BundleRegistry {
    pub fn new(bundle_dir: impl Into<PathBuf>) -> Self {
        Self {
            bundle_dir: bundle_dir.into(),
            required: Vec::new(),
            optional: Vec::new(),
        }
    }

    /// Registry for a run bundle
    ///
    /// Metrics and config artifacts are optional: a run that fails before
    /// streaming never produces them.
    pub fn for_run(bundle_dir: impl Into<PathBuf>) -> Self {
        let mut registry = Self::new(bundle_dir);
        for name in [SCENARIO_FILE, HOST_SNAPSHOT_FILE, RUN_FILE, EVENTS_FILE] {
            let path = registry.bundle_dir.join(name);
            registry.register_required(path);
        }
        for name in [
            METRICS_CSV_FILE,
            METRICS_JSON_FILE,
            CONFIG_VERIFY_FILE,
            CONFIG_REPORT_FILE,
            SUMMARY_FILE,
        ] {
            let path = registry.bundle_dir.join(name);
            registry.register_optional(path);
        }
        registry
    }

    pub fn bundle_dir(&self) -> &Path {
        &self.bundle_dir
    }

    pub fn register_required(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.required.contains(&path) {
            self.optional.retain(|p| *p != path);
            self.required.push(path);
        }
    }

    pub fn register_optional(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.required.contains(&path) && !self.optional.contains(&path) {
            self.optional.push(path);
        }
    }

    pub fn required(&self) -> &[PathBuf] {
        &self.required
    }

    pub fn optional(&self) -> &[PathBuf] {
        &self.optional
    }

    /// Required first, then optional, both in registration order
    pub fn build_manifest_input(&self) -> Vec<PathBuf> {
        self.required
            .iter()
            .cloned()
            .chain(
                self.optional
                    .iter()
                    .filter(|p| !p.as_os_str().is_empty() && p.exists())
                    .cloned(),
            )
            .collect()
    }
}

/// Path of `path` inside `base`, joined with `/`
pub fn relative_name(base: &Path, path: &Path) -> Result<String> {
    let escape = || BundleError::PathEscape {
        path: path.to_path_buf(),
    };
    let relative = path.strip_prefix(base).map_err(|_| escape())?;

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => return Err(escape()),
        }
    }
    if parts.is_empty() {
        return Err(escape());
    }
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_manifest_input_order_and_filtering() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::write(root.join("b.txt"), "b").unwrap();

        let mut registry = BundleRegistry::new(root);
        registry.register_required(root.join("missing.json"));
        registry.register_required(root.join("run.json"));
        registry.register_optional(root.join("b.txt"));
        registry.register_optional(PathBuf::new());
        registry.register_optional(root.join("not_there.csv"));

        assert_eq!(
            registry.build_manifest_input(),
            vec![root.join("missing.json"), root.join("run.json"), root.join("b.txt")]
        );
    }

    #[test]
    fn test_required_wins_over_optional() {
        let mut registry = BundleRegistry::new("/b");
        registry.register_optional("/b/x");
        registry.register_required("/b/x");
        registry.register_optional("/b/x");
        assert_eq!(registry.required().len(), 1);
        assert!(registry.optional().is_empty());
    }

    #[test]
    fn test_run_registry_lists_core_artifacts() {
        let registry = BundleRegistry::for_run("/out/run-1");
        assert_eq!(registry.required()[0], Path::new("/out/run-1/scenario.json"));
        assert!(registry.required().contains(&PathBuf::from("/out/run-1/events.jsonl")));
        assert!(registry.optional().contains(&PathBuf::from("/out/run-1/metrics.json")));
    }

    #[test]
    fn test_relative_name() {
        let base = Path::new("/out/run-1");
        assert_eq!(relative_name(base, Path::new("/out/run-1/sub/a.txt")).unwrap(), "sub/a.txt");
        assert!(matches!(
            relative_name(base, Path::new("/out/run-1/../x")),
            Err(BundleError::PathEscape { .. })
        ));
        assert!(matches!(
            relative_name(base, Path::new("/elsewhere/a.txt")),
            Err(BundleError::PathEscape { .. })
        ));
    }
}
