//! Trust gate for kernelspec origins.
//!
//! # Security Model
//!
//! A kernelspec's `argv[0]` or `metadata.interpreter.path` can point at any
//! executable. Resolving an unknown interpreter means probing it, which runs
//! it. A kernelspec dropped into an arbitrary folder must not be able to get
//! the host to execute a binary of its choosing just by being listed.
//!
//! On-demand probing is therefore only allowed for kernelspecs whose file
//! lives under a trusted root:
//! - the Jupyter root kernelspec directories (user data dir, `JUPYTER_PATH`)
//! - `share/jupyter/kernels` inside environments the host already resolved
//! - extra roots the user configured in settings
//!
//! Kernelspecs without an origin file are synthetic and never reach this
//! predicate.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::env::EnvironmentCatalog;
use crate::paths::{is_within, kernel_search_path, PathProvider};
use crate::settings::FinderSettings;

/// Predicate deciding whether a kernelspec origin may trigger probing.
pub trait TrustedKernelPaths: Send + Sync {
    fn is_trusted(&self, path: &Path) -> bool;
}

/// Trusted roots snapshot. Pure: no I/O in [`TrustedKernelPaths::is_trusted`].
#[derive(Debug, Clone, Default)]
pub struct TrustedKernelPathRegistry {
    roots: Vec<PathBuf>,
}

impl TrustedKernelPathRegistry {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        let mut registry = Self::default();
        for root in roots {
            registry.add_root(root);
        }
        registry
    }

    /// Build the registry from the Jupyter root paths and the configured
    /// extra roots.
    pub fn from_settings(settings: &FinderSettings, paths: &dyn PathProvider) -> Self {
        let mut registry = Self::new(paths.kernel_spec_root_paths());
        for root in &settings.trusted_kernel_paths {
            registry.add_root(root.clone());
        }
        registry
    }

    /// Add a trusted root. Empty paths are ignored; they would trust nothing
    /// useful and make relative-path matching ambiguous.
    pub fn add_root(&mut self, root: PathBuf) {
        if root.as_os_str().is_empty() || self.roots.contains(&root) {
            return;
        }
        self.roots.push(root);
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

impl TrustedKernelPaths for TrustedKernelPathRegistry {
    fn is_trusted(&self, path: &Path) -> bool {
        self.roots.iter().any(|root| is_within(path, root))
    }
}

/// Extends a base predicate with the kernel directories of every environment
/// the host has resolved at the time of the check.
///
/// Reads only the catalog's cached environments.
pub struct ResolvedEnvironmentTrust<T> {
    base: T,
    catalog: Arc<dyn EnvironmentCatalog>,
}

impl<T: TrustedKernelPaths> ResolvedEnvironmentTrust<T> {
    pub fn new(base: T, catalog: Arc<dyn EnvironmentCatalog>) -> Self {
        Self { base, catalog }
    }
}

impl<T: TrustedKernelPaths> TrustedKernelPaths for ResolvedEnvironmentTrust<T> {
    fn is_trusted(&self, path: &Path) -> bool {
        self.base.is_trusted(path)
            || self
                .catalog
                .resolved_environments()
                .iter()
                .filter(|env| !env.sys_prefix.as_os_str().is_empty())
                .any(|env| is_within(path, &kernel_search_path(&env.sys_prefix)))
    }
}
