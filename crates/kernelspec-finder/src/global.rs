//! Kernelspec search across every environment the host knows about.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use log::debug;
use tokio_util::sync::CancellationToken;

use crate::env::{Environment, EnvironmentCatalog};
use crate::search::SearchCoalescer;
use crate::spec::{KernelSpecDocument, SpecKey};

/// Fans the per-environment search out over resolved and known environments.
#[derive(Clone)]
pub struct GlobalKernelSpecSearch {
    catalog: Arc<dyn EnvironmentCatalog>,
    coalescer: SearchCoalescer,
    include_global_environments: bool,
}

impl GlobalKernelSpecSearch {
    pub fn new(catalog: Arc<dyn EnvironmentCatalog>, coalescer: SearchCoalescer) -> Self {
        Self {
            catalog,
            coalescer,
            include_global_environments: true,
        }
    }

    /// Skip environments that are registered with the integration but not
    /// yet resolved by the host.
    pub fn with_global_environments(mut self, include: bool) -> Self {
        self.include_global_environments = include;
        self
    }

    /// Unique environments to scan: resolved ones first, then known ones.
    pub async fn environments(&self) -> Vec<Environment> {
        let mut environments = self.catalog.resolved_environments();
        if self.include_global_environments {
            environments.extend(
                self.coalescer
                    .context()
                    .integration
                    .known_environments()
                    .await,
            );
        }

        let mut seen = HashSet::new();
        environments.retain(|env| seen.insert(env.id.clone()));
        environments
    }

    /// Stream kernelspecs from every environment as they are found.
    ///
    /// All environments are scanned concurrently. Order within one
    /// environment follows its locator; order across environments is
    /// unspecified. A document is emitted at most once per
    /// (name, environment) pair.
    pub async fn search_all(
        &self,
        cancel: CancellationToken,
    ) -> BoxStream<'static, KernelSpecDocument> {
        if cancel.is_cancelled() {
            return stream::empty().boxed();
        }
        let environments = self.environments().await;
        if cancel.is_cancelled() {
            return stream::empty().boxed();
        }
        debug!(
            "[kernelspec] Searching {} environments for kernelspecs",
            environments.len()
        );

        let streams: Vec<_> = environments
            .iter()
            .map(|env| self.coalescer.search(env, cancel.clone()))
            .collect();

        let mut seen: HashSet<SpecKey> = HashSet::new();
        stream::select_all(streams)
            .filter(move |doc| futures::future::ready(seen.insert(doc.key())))
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{PythonIntegration, StaticCatalog};
    use crate::paths::kernel_search_path;
    use crate::search::tests::{context, install, venv, FakeLoader, FakeLocator, FakeProvider};
    use std::path::PathBuf;

    fn conda() -> Environment {
        Environment::new("conda", "/home/conda", "/home/conda/bin/python")
    }

    fn global() -> Environment {
        Environment::new("globalInterpreter", "/home/global", "/globalSys/bin/python")
    }

    fn names(docs: &[KernelSpecDocument]) -> Vec<(String, String)> {
        let mut names: Vec<_> = docs
            .iter()
            .map(|d| (d.environment_id.clone().unwrap_or_default(), d.name.clone()))
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_merges_resolved_and_known_environments() {
        let locator = Arc::new(FakeLocator::default());
        let loader = Arc::new(FakeLoader::default());
        install(&locator, &loader, &venv(), &["python3", "venv-extra"]);
        install(&locator, &loader, &conda(), &["python3"]);
        install(&locator, &loader, &global(), &["global-kernel"]);

        let provider = FakeProvider {
            known: vec![conda(), global()],
            ..Default::default()
        };
        let coalescer = SearchCoalescer::new(context(
            locator.clone(),
            loader,
            PythonIntegration::installed(Arc::new(provider)),
        ));
        let catalog = Arc::new(StaticCatalog::new(vec![venv(), conda()]));
        let search = GlobalKernelSpecSearch::new(catalog, coalescer);

        let found: Vec<_> = search
            .search_all(CancellationToken::new())
            .await
            .collect()
            .await;

        // Same name in different environments is two results
        assert_eq!(
            names(&found),
            vec![
                ("conda".to_string(), "python3".to_string()),
                ("globalInterpreter".to_string(), "global-kernel".to_string()),
                ("venvPython".to_string(), "python3".to_string()),
                ("venvPython".to_string(), "venv-extra".to_string()),
            ]
        );
        // conda is listed twice but scanned once
        assert_eq!(locator.calls(), 3);
    }

    #[tokio::test]
    async fn test_same_name_in_one_environment_is_collapsed() {
        let locator = Arc::new(FakeLocator::default());
        let loader = Arc::new(FakeLoader::default());
        let env = venv();
        install(&locator, &loader, &env, &["python3"]);
        let search_path = kernel_search_path(&env.sys_prefix);
        let duplicate: PathBuf = search_path.join("python3-copy").join("kernel.json");
        loader.set(duplicate.clone(), crate::search::tests::doc("python3"));
        locator.set(
            search_path.clone(),
            vec![search_path.join("python3").join("kernel.json"), duplicate],
        );

        let coalescer = SearchCoalescer::new(context(
            locator,
            loader,
            PythonIntegration::NotInstalled,
        ));
        let search =
            GlobalKernelSpecSearch::new(Arc::new(StaticCatalog::new(vec![env])), coalescer);

        let found: Vec<_> = search
            .search_all(CancellationToken::new())
            .await
            .collect()
            .await;
        // Second declaration of the same name is dropped silently
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "python3");
    }

    #[tokio::test]
    async fn test_without_global_environments() {
        let locator = Arc::new(FakeLocator::default());
        let loader = Arc::new(FakeLoader::default());
        install(&locator, &loader, &venv(), &["python3"]);
        install(&locator, &loader, &global(), &["global-kernel"]);
        let provider = FakeProvider {
            known: vec![global()],
            ..Default::default()
        };
        let coalescer = SearchCoalescer::new(context(
            locator,
            loader,
            PythonIntegration::installed(Arc::new(provider)),
        ));
        let search = GlobalKernelSpecSearch::new(
            Arc::new(StaticCatalog::new(vec![venv()])),
            coalescer,
        )
        .with_global_environments(false);

        let found: Vec<_> = search
            .search_all(CancellationToken::new())
            .await
            .collect()
            .await;
        assert_eq!(
            names(&found),
            vec![("venvPython".to_string(), "python3".to_string())]
        );
    }

    #[tokio::test]
    async fn test_cancelled_global_search_is_empty() {
        let locator = Arc::new(FakeLocator::default());
        let loader = Arc::new(FakeLoader::default());
        install(&locator, &loader, &venv(), &["python3"]);
        let coalescer = SearchCoalescer::new(context(
            locator.clone(),
            loader,
            PythonIntegration::NotInstalled,
        ));
        let search = GlobalKernelSpecSearch::new(
            Arc::new(StaticCatalog::new(vec![venv()])),
            coalescer,
        );

        let cancel = CancellationToken::new();
        cancel.cancel();
        let found: Vec<_> = search.search_all(cancel).await.collect().await;
        assert!(found.is_empty());
        assert_eq!(locator.calls(), 0);
    }

    #[tokio::test]
    async fn test_no_environments() {
        let coalescer = SearchCoalescer::new(context(
            Arc::new(FakeLocator::default()),
            Arc::new(FakeLoader::default()),
            PythonIntegration::NotInstalled,
        ));
        let search = GlobalKernelSpecSearch::new(Arc::new(StaticCatalog::default()), coalescer);
        let found: Vec<_> = search
            .search_all(CancellationToken::new())
            .await
            .collect()
            .await;
        assert!(found.is_empty());
    }
}
