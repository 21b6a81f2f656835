//! Kernelspec discovery across Python environments.
//!
//! This crate finds the Jupyter kernelspecs installed into the Python
//! environments a notebook host knows about, and maps a kernelspec back to
//! the interpreter it was written for. It includes:
//!
//! - Per-environment search of `<sys.prefix>/share/jupyter/kernels`
//! - Coalescing of concurrent searches for the same environment
//! - A merged, de-duplicated, cancellable stream across all environments
//! - Interpreter matching with a trust gate on on-demand probing
//!
//! # Collaborators
//!
//! The host supplies the environments ([`EnvironmentCatalog`], and optionally
//! an [`EnvironmentProvider`] wrapped in [`PythonIntegration`]). Kernelspec
//! files are found and parsed by a [`SpecLocator`] / [`SpecLoader`] pair; the
//! filesystem implementations are the defaults.
//!
//! ```ignore
//! use kernelspec_finder::{KernelSpecFinder, StaticCatalog};
//! use futures::StreamExt;
//!
//! let finder = KernelSpecFinder::builder(Arc::new(StaticCatalog::new(envs))).build();
//! let mut specs = finder.search_all(CancellationToken::new()).await;
//! while let Some(spec) = specs.next().await {
//!     println!("{} ({:?})", spec.display_name, spec.environment_id);
//! }
//! ```

pub mod env;
pub mod error;
pub mod events;
pub mod global;
pub mod locator;
pub mod matcher;
pub mod paths;
pub mod search;
pub mod settings;
pub mod spec;
pub mod trust;

use std::sync::Arc;

use futures::stream::{BoxStream, StreamExt};
use tokio_util::sync::CancellationToken;

// Re-export key types
pub use env::{
    Environment, EnvironmentCatalog, EnvironmentDetails, EnvironmentProvider, PythonIntegration,
    StaticCatalog,
};
pub use error::FinderError;
pub use events::{LogObserver, SearchEvent, SearchObserver};
pub use global::GlobalKernelSpecSearch;
pub use locator::{FsSpecLoader, FsSpecLocator, SpecLoader, SpecLocator};
pub use matcher::InterpreterMatcher;
pub use paths::{kernel_search_path, PathProvider, UserJupyterPaths};
pub use search::{find_kernel_specs_in_environment, SearchCoalescer, SearchContext};
pub use settings::FinderSettings;
pub use spec::{KernelSpecDocument, KernelSpecReference, SpecKey};
pub use trust::{ResolvedEnvironmentTrust, TrustedKernelPathRegistry, TrustedKernelPaths};

/// Entry point wiring the search, coalescing and matching components.
#[derive(Clone)]
pub struct KernelSpecFinder {
    coalescer: SearchCoalescer,
    global: GlobalKernelSpecSearch,
    matcher: InterpreterMatcher,
}

impl KernelSpecFinder {
    pub fn builder(catalog: Arc<dyn EnvironmentCatalog>) -> KernelSpecFinderBuilder {
        KernelSpecFinderBuilder::new(catalog)
    }

    /// Stream the kernelspecs of one environment (coalesced).
    pub fn search(
        &self,
        env: &Environment,
        cancel: CancellationToken,
    ) -> BoxStream<'static, KernelSpecDocument> {
        self.coalescer.search(env, cancel)
    }

    /// Stream the kernelspecs of every known environment.
    pub async fn search_all(
        &self,
        cancel: CancellationToken,
    ) -> BoxStream<'static, KernelSpecDocument> {
        self.global.search_all(cancel).await
    }

    /// Collect [`Self::search_all`] for callers that do not need streaming.
    pub async fn list_kernel_specs(&self, cancel: CancellationToken) -> Vec<KernelSpecDocument> {
        self.search_all(cancel).await.collect().await
    }

    pub async fn find_matching_interpreter(
        &self,
        spec: &KernelSpecDocument,
        context: &str,
    ) -> Option<Environment> {
        self.matcher.find_matching_interpreter(spec, context).await
    }
}

/// Builder for [`KernelSpecFinder`].
///
/// Defaults: no Python integration, filesystem locator/loader, log-only
/// observer, default settings, and the Jupyter data dirs. Call
/// [`Self::user_settings`] to pick up the saved settings file.
pub struct KernelSpecFinderBuilder {
    catalog: Arc<dyn EnvironmentCatalog>,
    integration: PythonIntegration,
    locator: Arc<dyn SpecLocator>,
    loader: Arc<dyn SpecLoader>,
    observer: Arc<dyn SearchObserver>,
    paths: Arc<dyn PathProvider>,
    trust: Option<Arc<dyn TrustedKernelPaths>>,
    settings: FinderSettings,
}

impl KernelSpecFinderBuilder {
    pub fn new(catalog: Arc<dyn EnvironmentCatalog>) -> Self {
        Self {
            catalog,
            integration: PythonIntegration::NotInstalled,
            locator: Arc::new(FsSpecLocator),
            loader: Arc::new(FsSpecLoader),
            observer: Arc::new(LogObserver),
            paths: Arc::new(UserJupyterPaths),
            trust: None,
            settings: FinderSettings::default(),
        }
    }

    pub fn integration(mut self, integration: PythonIntegration) -> Self {
        self.integration = integration;
        self
    }

    pub fn locator(mut self, locator: Arc<dyn SpecLocator>) -> Self {
        self.locator = locator;
        self
    }

    pub fn loader(mut self, loader: Arc<dyn SpecLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn SearchObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn paths(mut self, paths: Arc<dyn PathProvider>) -> Self {
        self.paths = paths;
        self
    }

    /// Use a custom trust predicate instead of one built from settings.
    pub fn trust(mut self, trust: Arc<dyn TrustedKernelPaths>) -> Self {
        self.trust = Some(trust);
        self
    }

    pub fn settings(mut self, settings: FinderSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Use the settings saved in the user's config directory.
    pub fn user_settings(self) -> Self {
        self.settings(settings::load_settings())
    }

    pub fn build(self) -> KernelSpecFinder {
        let trust: Arc<dyn TrustedKernelPaths> = match self.trust {
            Some(trust) => trust,
            None => {
                let registry =
                    TrustedKernelPathRegistry::from_settings(&self.settings, self.paths.as_ref());
                if self.settings.trust_environment_kernel_dirs {
                    Arc::new(ResolvedEnvironmentTrust::new(registry, self.catalog.clone()))
                } else {
                    Arc::new(registry)
                }
            }
        };

        let coalescer = SearchCoalescer::new(SearchContext {
            integration: self.integration.clone(),
            locator: self.locator,
            loader: self.loader,
            observer: self.observer,
        });
        let global = GlobalKernelSpecSearch::new(self.catalog.clone(), coalescer.clone())
            .with_global_environments(self.settings.include_global_environments);
        let matcher = InterpreterMatcher::new(self.catalog, self.integration, trust);

        KernelSpecFinder {
            coalescer,
            global,
            matcher,
        }
    }
}
