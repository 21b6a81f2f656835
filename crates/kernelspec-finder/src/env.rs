//! Python environments as seen by the kernelspec finder.
//!
//! Environments are owned by the host. The finder only reads them through two
//! seams:
//!
//! - [`EnvironmentCatalog`]: environments the host has already resolved and
//!   cached. Cheap, synchronous, always available.
//! - [`EnvironmentProvider`]: the optional Python integration that can list
//!   globally registered environments and probe a path or id on demand. It is
//!   wrapped in [`PythonIntegration`] so "not installed" is a normal branch.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A resolved Python environment.
///
/// Immutable once resolved. Re-resolution produces a new value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Environment {
    /// Opaque id, stable for the lifetime of the host process.
    pub id: String,
    /// Installation prefix (`sys.prefix`).
    pub sys_prefix: PathBuf,
    /// Path to the interpreter executable.
    pub executable: PathBuf,
}

impl Environment {
    pub fn new(
        id: impl Into<String>,
        sys_prefix: impl Into<PathBuf>,
        executable: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: id.into(),
            sys_prefix: sys_prefix.into(),
            executable: executable.into(),
        }
    }
}

/// Result of probing an environment through the Python integration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentDetails {
    /// Id reported by the integration, if it assigned one.
    pub id: Option<String>,
    pub sys_prefix: PathBuf,
    pub executable: PathBuf,
}

impl EnvironmentDetails {
    /// Build an [`Environment`] from probe output.
    ///
    /// Falls back to `fallback_id` when the integration did not report an id.
    pub fn into_environment(self, fallback_id: &str) -> Environment {
        Environment {
            id: self.id.unwrap_or_else(|| fallback_id.to_string()),
            sys_prefix: self.sys_prefix,
            executable: self.executable,
        }
    }
}

/// Environments the host has already resolved.
pub trait EnvironmentCatalog: Send + Sync {
    fn resolved_environments(&self) -> Vec<Environment>;
}

/// The Python integration: global environment listing and on-demand probing.
///
/// Implementations must be safe to call repeatedly.
#[async_trait]
pub trait EnvironmentProvider: Send + Sync {
    /// Environments registered globally, resolved or not.
    async fn known_environments(&self) -> Vec<Environment>;

    /// Resolve an environment id or interpreter path into concrete details.
    ///
    /// Returns `None` when nothing matches. Probing may spawn the interpreter.
    async fn resolve_environment(&self, id_or_path: &str) -> Option<EnvironmentDetails>;
}

/// Whether the Python integration is available.
#[derive(Clone, Default)]
pub enum PythonIntegration {
    Installed(Arc<dyn EnvironmentProvider>),
    #[default]
    NotInstalled,
}

impl PythonIntegration {
    pub fn installed(provider: Arc<dyn EnvironmentProvider>) -> Self {
        Self::Installed(provider)
    }

    pub fn provider(&self) -> Option<&Arc<dyn EnvironmentProvider>> {
        match self {
            Self::Installed(provider) => Some(provider),
            Self::NotInstalled => None,
        }
    }

    pub fn is_installed(&self) -> bool {
        matches!(self, Self::Installed(_))
    }

    /// Globally registered environments, or none if the integration is absent.
    pub async fn known_environments(&self) -> Vec<Environment> {
        match self {
            Self::Installed(provider) => provider.known_environments().await,
            Self::NotInstalled => Vec::new(),
        }
    }
}

impl std::fmt::Debug for PythonIntegration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Installed(_) => write!(f, "PythonIntegration::Installed"),
            Self::NotInstalled => write!(f, "PythonIntegration::NotInstalled"),
        }
    }
}

/// Catalog over a fixed list, for hosts that resolve environments up front.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    environments: Vec<Environment>,
}

impl StaticCatalog {
    pub fn new(environments: Vec<Environment>) -> Self {
        Self { environments }
    }
}

impl EnvironmentCatalog for StaticCatalog {
    fn resolved_environments(&self) -> Vec<Environment> {
        self.environments.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_details_fallback_id() {
        let details = EnvironmentDetails {
            id: None,
            sys_prefix: PathBuf::from("/opt/venv"),
            executable: PathBuf::from("/opt/venv/bin/python"),
        };
        let env = details.into_environment("/opt/venv/bin/python");
        assert_eq!(env.id, "/opt/venv/bin/python");
        assert_eq!(env.sys_prefix, PathBuf::from("/opt/venv"));
    }

    #[tokio::test]
    async fn test_not_installed_lists_nothing() {
        let integration = PythonIntegration::NotInstalled;
        assert!(!integration.is_installed());
        assert!(integration.provider().is_none());
        assert!(integration.known_environments().await.is_empty());
    }
}
