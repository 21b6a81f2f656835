//! Resolve a kernelspec back to the interpreter it was written for.
//!
//! The candidate interpreter path comes from `argv[0]` when that is an
//! absolute path, otherwise from `metadata.interpreter.path`. The candidate is
//! first compared against environments the host already resolved (no I/O).
//! Only if that fails, the Python integration is installed and the
//! kernelspec's origin is trusted, the integration is asked to probe the path.
//!
//! Not-found and trust denial both surface as `None`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::env::{Environment, EnvironmentCatalog, PythonIntegration};
use crate::paths::is_interpreter_of;
use crate::spec::KernelSpecDocument;
use crate::trust::TrustedKernelPaths;

/// Interpreter path a kernelspec points at, if it names one.
///
/// A bare command such as `python` is an alias resolved through `PATH`, not a
/// specific interpreter, so it is not a candidate.
pub fn candidate_interpreter_path(spec: &KernelSpecDocument) -> Option<PathBuf> {
    if let Some(arg0) = spec.argv.first() {
        let arg0 = Path::new(arg0);
        if arg0.is_absolute() {
            return Some(arg0.to_path_buf());
        }
    }
    spec.interpreter_hint().map(PathBuf::from)
}

#[derive(Clone)]
pub struct InterpreterMatcher {
    catalog: Arc<dyn EnvironmentCatalog>,
    integration: PythonIntegration,
    trust: Arc<dyn TrustedKernelPaths>,
}

impl InterpreterMatcher {
    pub fn new(
        catalog: Arc<dyn EnvironmentCatalog>,
        integration: PythonIntegration,
        trust: Arc<dyn TrustedKernelPaths>,
    ) -> Self {
        Self {
            catalog,
            integration,
            trust,
        }
    }

    /// Find the environment `spec` belongs to.
    ///
    /// `context` labels the caller in logs.
    pub async fn find_matching_interpreter(
        &self,
        spec: &KernelSpecDocument,
        context: &str,
    ) -> Option<Environment> {
        let Some(candidate) = candidate_interpreter_path(spec) else {
            debug!(
                "[kernelspec] {context}: {} does not name an interpreter",
                spec.name
            );
            return None;
        };

        if let Some(env) = self
            .catalog
            .resolved_environments()
            .into_iter()
            .find(|env| is_interpreter_of(&candidate, env))
        {
            debug!(
                "[kernelspec] {context}: {} matched resolved environment {}",
                spec.name, env.id
            );
            return Some(env);
        }

        let Some(provider) = self.integration.provider() else {
            debug!(
                "[kernelspec] {context}: no Python integration, cannot resolve {:?}",
                candidate
            );
            return None;
        };

        if let Some(spec_file) = &spec.spec_file {
            if !self.trust.is_trusted(spec_file) {
                warn!(
                    "[kernelspec] {context}: not probing {:?} for untrusted kernelspec {:?}",
                    candidate, spec_file
                );
                return None;
            }
        }

        let candidate = candidate.to_string_lossy().to_string();
        match provider.resolve_environment(&candidate).await {
            Some(details) => {
                let env = details.into_environment(&candidate);
                info!(
                    "[kernelspec] {context}: resolved {} to environment {} at {:?}",
                    spec.name, env.id, env.sys_prefix
                );
                Some(env)
            }
            None => {
                debug!("[kernelspec] {context}: {candidate} is not a known interpreter");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{EnvironmentDetails, StaticCatalog};
    use crate::search::tests::{doc, venv, FakeProvider};
    use crate::trust::TrustedKernelPathRegistry;
    use std::collections::HashMap;
    use std::sync::atomic::Ordering;

    const CONTEXT: &str = "startUsingPythonInterpreter";

    fn conda() -> Environment {
        Environment::new("conda", "/home/conda", "/home/conda/bin/python")
    }

    fn global() -> Environment {
        Environment::new("globalInterpreter", "/home/global", "/globalSys/bin/python")
    }

    fn with_argv0(arg0: &str) -> KernelSpecDocument {
        let mut spec = doc("venvKernelSpec");
        spec.argv = vec![arg0.to_string(), "-m".into(), "venvKernelSpec".into()];
        spec
    }

    fn with_hint(mut spec: KernelSpecDocument, path: &str) -> KernelSpecDocument {
        spec.metadata = Some(HashMap::from([(
            "interpreter".to_string(),
            serde_json::json!({ "path": path }),
        )]));
        spec
    }

    fn venv_exe() -> String {
        venv().executable.to_string_lossy().to_string()
    }

    /// Provider that can resolve the venv's executable.
    fn venv_provider() -> Arc<FakeProvider> {
        let mut provider = FakeProvider::default();
        provider.details.insert(
            venv_exe(),
            EnvironmentDetails {
                id: Some("venvPython".into()),
                sys_prefix: venv().sys_prefix,
                executable: venv().executable,
            },
        );
        Arc::new(provider)
    }

    fn matcher(
        resolved: Vec<Environment>,
        integration: PythonIntegration,
        trusted: Vec<PathBuf>,
    ) -> InterpreterMatcher {
        InterpreterMatcher::new(
            Arc::new(StaticCatalog::new(resolved)),
            integration,
            Arc::new(TrustedKernelPathRegistry::new(trusted)),
        )
    }

    #[test]
    fn test_candidate_from_argv_or_hint() {
        assert_eq!(
            candidate_interpreter_path(&with_argv0(&venv_exe())),
            Some(venv().executable)
        );
        assert_eq!(candidate_interpreter_path(&with_argv0("python")), None);
        assert_eq!(
            candidate_interpreter_path(&with_hint(with_argv0("python"), &venv_exe())),
            Some(venv().executable)
        );
    }

    #[tokio::test]
    async fn test_match_from_argv() {
        let matcher = matcher(
            vec![venv(), conda(), global()],
            PythonIntegration::installed(venv_provider()),
            vec![],
        );
        let env = matcher
            .find_matching_interpreter(&with_argv0(&venv_exe()), CONTEXT)
            .await;
        assert_eq!(env, Some(venv()));
    }

    #[tokio::test]
    async fn test_match_from_metadata() {
        let matcher = matcher(
            vec![venv(), conda(), global()],
            PythonIntegration::installed(venv_provider()),
            vec![],
        );
        let spec = with_hint(with_argv0("python"), &venv_exe());
        let env = matcher.find_matching_interpreter(&spec, CONTEXT).await;
        assert_eq!(env, Some(venv()));
    }

    #[tokio::test]
    async fn test_resolved_match_does_not_probe() {
        let provider = venv_provider();
        let matcher = matcher(
            vec![venv()],
            PythonIntegration::installed(provider.clone()),
            vec![],
        );
        matcher
            .find_matching_interpreter(&with_argv0(&venv_exe()), CONTEXT)
            .await;
        assert_eq!(provider.resolve_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_probes_undiscovered_environment_without_origin() {
        let matcher = matcher(
            vec![conda(), global()],
            PythonIntegration::installed(venv_provider()),
            vec![],
        );
        let spec = with_hint(with_argv0(&venv_exe()), &venv_exe());
        let env = matcher.find_matching_interpreter(&spec, CONTEXT).await;
        assert_eq!(env, Some(venv()));
    }

    #[tokio::test]
    async fn test_probes_undiscovered_environment_for_trusted_origin() {
        let matcher = matcher(
            vec![conda(), global()],
            PythonIntegration::installed(venv_provider()),
            vec![PathBuf::from("/trusted/kernels")],
        );
        let mut spec = with_argv0(&venv_exe());
        spec.spec_file = Some(PathBuf::from("/trusted/kernels/venv/kernel.json"));
        let env = matcher.find_matching_interpreter(&spec, CONTEXT).await;
        assert_eq!(env, Some(venv()));
    }

    #[tokio::test]
    async fn test_untrusted_origin_is_not_probed() {
        let provider = venv_provider();
        let matcher = matcher(
            vec![conda(), global()],
            PythonIntegration::installed(provider.clone()),
            vec![PathBuf::from("/trusted/kernels")],
        );
        let mut spec = with_hint(with_argv0(&venv_exe()), &venv_exe());
        spec.spec_file = Some(PathBuf::from("/downloads/somefile.json"));

        let env = matcher.find_matching_interpreter(&spec, CONTEXT).await;
        assert_eq!(env, None);
        assert_eq!(provider.resolve_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unresolvable_interpreter_is_not_found() {
        let matcher = matcher(
            vec![conda(), global()],
            PythonIntegration::installed(Arc::new(FakeProvider::default())),
            vec![PathBuf::from("/trusted/kernels")],
        );
        let mut spec = with_hint(with_argv0(&venv_exe()), &venv_exe());
        spec.spec_file = Some(PathBuf::from("/trusted/kernels/venv/kernel.json"));

        let env = matcher.find_matching_interpreter(&spec, CONTEXT).await;
        assert_eq!(env, None);
    }

    #[tokio::test]
    async fn test_without_integration_is_not_found() {
        let matcher = matcher(vec![conda()], PythonIntegration::NotInstalled, vec![]);
        let env = matcher
            .find_matching_interpreter(&with_argv0(&venv_exe()), CONTEXT)
            .await;
        assert_eq!(env, None);
    }

    #[tokio::test]
    async fn test_bare_command_is_not_found() {
        let matcher = matcher(
            vec![venv()],
            PythonIntegration::installed(venv_provider()),
            vec![],
        );
        let env = matcher
            .find_matching_interpreter(&with_argv0("python"), CONTEXT)
            .await;
        assert_eq!(env, None);
    }
}
