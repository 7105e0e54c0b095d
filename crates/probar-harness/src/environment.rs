//! The harness query engine.
//!
//! [`HarnessEnvironment`] resolves mixed selector and harness queries beneath
//! one root element of a concrete [`EnvironmentBackend`]. Every sub-loader and
//! every harness it creates is itself an environment of the same backend,
//! rooted further down the tree.
//!
//! # Resolution
//!
//! ```text
//! queries ──parse──► element selectors + harness predicates
//!            │
//!            ▼
//!   one combined selector ──► candidate elements (document order)
//!            │
//!            ▼  per candidate, concurrently
//!   each query in order: element?  harness? (fresh instance, predicate)
//!            │
//!            ▼
//!   dedup per candidate, flatten: document order outer, query order inner
//! ```

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use async_trait::async_trait;
use tracing::debug;

use crate::change_detection::try_run_parallel;
use crate::element::TestElement;
use crate::harness::{ComponentHarness, HarnessLoader};
use crate::locator::{HarnessMatch, Located, LocatorFactory};
use crate::query::{HarnessQuery, ParsedQueries, ParsedQuery};
use crate::result::{HarnessError, HarnessResult};

/// Hooks a concrete test environment supplies to the query engine.
#[async_trait(?Send)]
pub trait EnvironmentBackend: fmt::Debug + 'static {
    /// Native element handle
    type Element: Clone + fmt::Debug + 'static;

    /// Root of the whole document
    fn document_root(&self) -> Self::Element;

    /// Wrap a native element as a [`TestElement`]
    fn create_test_element(&self, element: Self::Element) -> Rc<dyn TestElement>;

    /// Every descendant of `root` matching `selector`, in document order and
    /// without duplicates
    async fn get_all_raw_elements(
        &self,
        root: &Self::Element,
        selector: &str,
    ) -> HarnessResult<Vec<Self::Element>>;

    /// Flush change detection and wait for the tree to settle
    async fn force_stabilize(&self) -> HarnessResult<()>;

    /// Wait for work outside the change-detection zone
    async fn wait_for_tasks_outside_angular(&self) -> HarnessResult<()>;
}

/// Query engine rooted at one element of backend `B`.
pub struct HarnessEnvironment<B: EnvironmentBackend> {
    backend: Rc<B>,
    raw_root: B::Element,
}

impl<B: EnvironmentBackend> HarnessEnvironment<B> {
    /// Environment rooted at `raw_root`
    pub fn new(backend: Rc<B>, raw_root: B::Element) -> Self {
        Self { backend, raw_root }
    }

    /// Loader rooted at the document root
    pub fn loader(backend: Rc<B>) -> Rc<dyn HarnessLoader> {
        let root = backend.document_root();
        Self::loader_at(backend, root)
    }

    /// Loader rooted at `root`
    pub fn loader_at(backend: Rc<B>, root: B::Element) -> Rc<dyn HarnessLoader> {
        Rc::new(Self::new(backend, root))
    }

    /// Harness of type `H` whose host is `root`.
    ///
    /// The environment is stabilized before the harness is handed out.
    pub async fn harness_for<H: ComponentHarness>(
        backend: Rc<B>,
        root: B::Element,
    ) -> HarnessResult<Rc<H>> {
        let environment = Self::new(backend, root);
        environment.backend.force_stabilize().await?;
        Ok(Rc::new(H::new(Rc::new(environment))))
    }

    /// Environment of the same backend rooted at `element`
    #[must_use]
    pub fn create_environment(&self, element: B::Element) -> Self {
        Self::new(Rc::clone(&self.backend), element)
    }

    /// Backend this environment queries
    #[must_use]
    pub const fn backend(&self) -> &Rc<B> {
        &self.backend
    }

    /// Element this environment is rooted at
    #[must_use]
    pub const fn raw_root(&self) -> &B::Element {
        &self.raw_root
    }

    async fn raw_elements(&self, selector: &str) -> HarnessResult<Vec<B::Element>> {
        self.backend
            .get_all_raw_elements(&self.raw_root, selector)
            .await
    }

    async fn first_loader(&self, selector: &str) -> HarnessResult<Option<Rc<dyn HarnessLoader>>> {
        let first = self.raw_elements(selector).await?.into_iter().next();
        debug!(selector, found = first.is_some(), "child loader lookup");
        Ok(first.map(|element| Rc::new(self.create_environment(element)) as Rc<dyn HarnessLoader>))
    }

    async fn required_loader(&self, selector: &str) -> HarnessResult<Rc<dyn HarnessLoader>> {
        self.first_loader(selector)
            .await?
            .ok_or_else(|| HarnessError::LoaderNotFound {
                selector: selector.to_string(),
            })
    }

    async fn all_loaders(&self, selector: &str) -> HarnessResult<Vec<Rc<dyn HarnessLoader>>> {
        let elements = self.raw_elements(selector).await?;
        debug!(selector, count = elements.len(), "child loaders lookup");
        Ok(elements
            .into_iter()
            .map(|element| Rc::new(self.create_environment(element)) as Rc<dyn HarnessLoader>)
            .collect())
    }

    async fn resolve_harnesses_and_elements(
        &self,
        queries: &[HarnessQuery],
    ) -> HarnessResult<Vec<Located>> {
        let parsed = ParsedQueries::parse(queries);
        let selector = parsed.combined_selector();
        if selector.is_empty() {
            return Ok(Vec::new());
        }

        let candidates = self.raw_elements(&selector).await?;
        let skip_selector_check = parsed.skip_selector_check();
        debug!(
            queries = queries.len(),
            candidates = candidates.len(),
            skip_selector_check,
            "resolving queries"
        );

        let per_element = try_run_parallel(|| {
            candidates
                .into_iter()
                .map(|raw| self.matches_for_element(raw, &parsed, skip_selector_check))
        })
        .await?;
        Ok(per_element.into_iter().flatten().collect())
    }

    /// Matches of every query against one candidate, in query order, with at
    /// most one element result and one harness per type.
    async fn matches_for_element(
        &self,
        raw: B::Element,
        parsed: &ParsedQueries,
        skip_selector_check: bool,
    ) -> HarnessResult<Vec<Located>> {
        let element = self.backend.create_test_element(raw.clone());
        let results = try_run_parallel(|| {
            parsed
                .all_queries
                .iter()
                .map(|query| self.match_query(&raw, &element, query, skip_selector_check))
        })
        .await?;

        let mut element_seen = false;
        let mut harness_types = HashSet::new();
        Ok(results
            .into_iter()
            .flatten()
            .filter(|located| match located {
                Located::Element(_) => !std::mem::replace(&mut element_seen, true),
                Located::Harness(matched) => harness_types.insert(matched.harness_type()),
            })
            .collect())
    }

    async fn match_query(
        &self,
        raw: &B::Element,
        element: &Rc<dyn TestElement>,
        query: &ParsedQuery,
        skip_selector_check: bool,
    ) -> HarnessResult<Option<Located>> {
        match query {
            ParsedQuery::Element(selector) => {
                let matched = skip_selector_check || element.matches_selector(selector).await?;
                Ok(matched.then(|| Located::Element(Rc::clone(element))))
            }
            ParsedQuery::Harness(predicate) => {
                if !skip_selector_check && !element.matches_selector(predicate.selector()).await? {
                    return Ok(None);
                }
                let harness_type = predicate.harness_type();
                let instance = harness_type.construct(Rc::new(self.create_environment(raw.clone())));
                if predicate.evaluate(Rc::clone(&instance)).await? {
                    Ok(Some(Located::Harness(HarnessMatch::new(harness_type, instance))))
                } else {
                    Ok(None)
                }
            }
        }
    }
}

impl<B: EnvironmentBackend> Clone for HarnessEnvironment<B> {
    fn clone(&self) -> Self {
        self.create_environment(self.raw_root.clone())
    }
}

impl<B: EnvironmentBackend> fmt::Debug for HarnessEnvironment<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HarnessEnvironment")
            .field("raw_root", &self.raw_root)
            .finish_non_exhaustive()
    }
}

#[async_trait(?Send)]
impl<B: EnvironmentBackend> HarnessLoader for HarnessEnvironment<B> {
    async fn get_child_loader(&self, selector: &str) -> HarnessResult<Rc<dyn HarnessLoader>> {
        self.required_loader(selector).await
    }

    async fn get_all_child_loaders(&self, selector: &str) -> HarnessResult<Vec<Rc<dyn HarnessLoader>>> {
        self.all_loaders(selector).await
    }

    async fn query_all(&self, queries: &[HarnessQuery]) -> HarnessResult<Vec<Located>> {
        self.resolve_harnesses_and_elements(queries).await
    }
}

#[async_trait(?Send)]
impl<B: EnvironmentBackend> LocatorFactory for HarnessEnvironment<B> {
    fn root_element(&self) -> Rc<dyn TestElement> {
        self.backend.create_test_element(self.raw_root.clone())
    }

    fn document_root_locator_factory(&self) -> Rc<dyn LocatorFactory> {
        Rc::new(self.create_environment(self.backend.document_root()))
    }

    fn root_harness_loader(&self) -> Rc<dyn HarnessLoader> {
        Rc::new(self.clone())
    }

    async fn resolve_all(&self, queries: &[HarnessQuery]) -> HarnessResult<Vec<Located>> {
        self.resolve_harnesses_and_elements(queries).await
    }

    async fn harness_loader_for(&self, selector: &str) -> HarnessResult<Rc<dyn HarnessLoader>> {
        self.required_loader(selector).await
    }

    async fn harness_loader_for_optional(
        &self,
        selector: &str,
    ) -> HarnessResult<Option<Rc<dyn HarnessLoader>>> {
        self.first_loader(selector).await
    }

    async fn harness_loader_for_all(
        &self,
        selector: &str,
    ) -> HarnessResult<Vec<Rc<dyn HarnessLoader>>> {
        self.all_loaders(selector).await
    }

    async fn force_stabilize(&self) -> HarnessResult<()> {
        self.backend.force_stabilize().await
    }

    async fn wait_for_tasks_outside_angular(&self) -> HarnessResult<()> {
        self.backend.wait_for_tasks_outside_angular().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::BaseHarnessFilters;
    use crate::testing::fixtures::{ButtonHarness, DivHarness};
    use crate::testing::{MockBackend, MockDocument};

    fn sample_document() -> MockDocument {
        let document = MockDocument::new();
        let body = document.root();
        let outer = document.append(body, "div").id("outer").class("panel").build();
        document.append(outer, "button").id("b1").text("One").build();
        document.append(outer, "div").id("inner").build();
        document.append(body, "button").id("b2").text("Two").build();
        document
    }

    async fn ids(located: &[Located]) -> Vec<String> {
        let mut out = Vec::new();
        for item in located {
            let label = match item {
                Located::Element(element) => {
                    format!("el:{}", element.get_attribute("id").await.unwrap().unwrap_or_default())
                }
                Located::Harness(matched) => {
                    let host = match matched.downcast::<DivHarness>() {
                        Some(div) => div.host().await,
                        None => matched.downcast::<ButtonHarness>().unwrap().host().await,
                    };
                    format!(
                        "{}:{}",
                        matched.harness_type().name(),
                        host.get_attribute("id").await.unwrap().unwrap_or_default()
                    )
                }
            };
            out.push(label);
        }
        out
    }

    mod resolve_tests {
        use super::*;

        #[tokio::test]
        async fn test_document_order_outer_query_order_inner() {
            let backend = MockBackend::new(sample_document());
            let loader = HarnessEnvironment::loader(backend);
            let located = loader
                .query_all(&[
                    HarnessQuery::harness::<ButtonHarness>(),
                    HarnessQuery::from("div"),
                    HarnessQuery::harness::<DivHarness>(),
                ])
                .await
                .unwrap();
            assert_eq!(
                ids(&located).await,
                vec![
                    "el:outer",
                    "DivHarness:outer",
                    "ButtonHarness:b1",
                    "el:inner",
                    "DivHarness:inner",
                    "ButtonHarness:b2",
                ]
            );
        }

        #[tokio::test]
        async fn test_element_deduplicated_across_selectors() {
            let backend = MockBackend::new(sample_document());
            let loader = HarnessEnvironment::loader(backend);
            let located = loader
                .query_all(&["#outer".into(), ".panel".into(), "div".into()])
                .await
                .unwrap();
            assert_eq!(ids(&located).await, vec!["el:outer", "el:inner"]);
        }

        #[tokio::test]
        async fn test_harness_deduplicated_by_type() {
            let backend = MockBackend::new(sample_document());
            let loader = HarnessEnvironment::loader(backend);
            let located = loader
                .query_all(&[
                    HarnessQuery::harness::<DivHarness>(),
                    DivHarness::with(BaseHarnessFilters::new().with_selector("#outer")).into(),
                ])
                .await
                .unwrap();
            assert_eq!(ids(&located).await, vec!["DivHarness:outer", "DivHarness:inner"]);
        }

        #[tokio::test]
        async fn test_empty_query_list() {
            let backend = MockBackend::new(sample_document());
            let loader = HarnessEnvironment::loader(backend);
            assert!(loader.query_all(&[]).await.unwrap().is_empty());
        }

        #[tokio::test]
        async fn test_resolution_is_scoped_to_root() {
            let backend = MockBackend::new(sample_document());
            let loader = HarnessEnvironment::loader(backend);
            let outer = loader.get_child_loader("#outer").await.unwrap();
            let buttons = outer
                .get_all_harnesses(ButtonHarness::query())
                .await
                .unwrap();
            assert_eq!(buttons.len(), 1);
        }
    }

    mod loader_tests {
        use super::*;

        #[tokio::test]
        async fn test_child_loader_not_found() {
            let backend = MockBackend::new(sample_document());
            let loader = HarnessEnvironment::loader(backend);
            let err = loader.get_child_loader(".missing").await.unwrap_err();
            assert_eq!(
                err.to_string(),
                "Expected to find element matching selector: \".missing\", but none was found"
            );
            assert!(loader.get_all_child_loaders(".missing").await.unwrap().is_empty());
        }

        #[tokio::test]
        async fn test_optional_loader() {
            let backend = MockBackend::new(sample_document());
            let environment = HarnessEnvironment::new(Rc::clone(&backend), backend.document_root());
            assert!(environment
                .harness_loader_for_optional(".missing")
                .await
                .unwrap()
                .is_none());
            assert!(environment
                .harness_loader_for_optional("button")
                .await
                .unwrap()
                .is_some());
            assert_eq!(environment.harness_loader_for_all("button").await.unwrap().len(), 2);
        }

        #[tokio::test]
        async fn test_harness_for_stabilizes_first() {
            let backend = MockBackend::new(sample_document());
            let before = backend.detector().passes();
            let root = backend.document_root();
            let harness = HarnessEnvironment::harness_for::<DivHarness>(Rc::clone(&backend), root)
                .await
                .unwrap();
            assert!(backend.detector().passes() > before);
            assert_eq!(harness.host().await.text().await.unwrap(), "OneTwo");
        }
    }
}
