//! Component harnesses and harness loaders.
//!
//! A harness wraps one component instance and exposes a test-facing API for
//! it. Harness authors implement [`ComponentHarness`] (usually through
//! `#[derive(ComponentHarness)]`) and build their methods on top of the
//! `locator_for*` helpers:
//!
//! ```ignore
//! #[derive(Debug, ComponentHarness)]
//! #[harness(host = "app-counter")]
//! struct CounterHarness {
//!     locator_factory: Rc<dyn LocatorFactory>,
//! }
//!
//! impl CounterHarness {
//!     async fn increment(&self) -> HarnessResult<()> {
//!         let button = self.locator_for::<Rc<dyn TestElement>, _>(["button.inc"]);
//!         button().await?.click().await
//!     }
//! }
//! ```

use std::fmt;
use std::rc::Rc;

use async_trait::async_trait;

use crate::element::TestElement;
use crate::locator::{self, AsyncFactory, FromLocated, Located, LocatorFactory};
use crate::predicate::{BaseHarnessFilters, HarnessPredicate};
use crate::query::{not_found_message, HarnessQuery, HarnessType, HarnessTypeQuery, TypedHarnessQuery};
use crate::result::{HarnessError, HarnessResult};

/// Last path segment of a type name, without generic arguments.
pub(crate) fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

fn collect_queries<Q: Into<HarnessQuery>>(queries: impl IntoIterator<Item = Q>) -> Vec<HarnessQuery> {
    queries.into_iter().map(Into::into).collect()
}

/// Test-facing wrapper around one component instance.
#[async_trait(?Send)]
pub trait ComponentHarness: Sized + fmt::Debug + 'static {
    /// CSS selector of the component's host element
    const HOST_SELECTOR: &'static str;

    /// Build the harness around a factory rooted at its host element
    fn new(locator_factory: Rc<dyn LocatorFactory>) -> Self;

    /// Factory rooted at the host element
    fn locator_factory(&self) -> &Rc<dyn LocatorFactory>;

    /// Name used in query descriptions
    fn harness_name() -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }

    /// Type token for this harness
    fn harness_type() -> HarnessType {
        HarnessType::of::<Self>()
    }

    /// Query matching every instance of this harness
    fn query() -> HarnessTypeQuery<Self> {
        HarnessTypeQuery::new()
    }

    /// Predicate over instances of this harness
    fn with(filters: BaseHarnessFilters) -> HarnessPredicate<Self> {
        HarnessPredicate::new(filters)
    }

    /// The host element
    async fn host(&self) -> Rc<dyn TestElement> {
        self.locator_factory().root_element()
    }

    /// Factory rooted at the document root, for content rendered outside the
    /// host (overlays, portals)
    fn document_root_locator_factory(&self) -> Rc<dyn LocatorFactory> {
        self.locator_factory().document_root_locator_factory()
    }

    /// Async factory for the first match beneath the host; fails when nothing
    /// matches.
    fn locator_for<T, Q>(&self, queries: impl IntoIterator<Item = Q>) -> AsyncFactory<T>
    where
        T: FromLocated + 'static,
        Q: Into<HarnessQuery>,
    {
        locator::locator_for(Rc::clone(self.locator_factory()), collect_queries(queries))
    }

    /// Async factory for the first match beneath the host, or `None`
    fn locator_for_optional<T, Q>(&self, queries: impl IntoIterator<Item = Q>) -> AsyncFactory<Option<T>>
    where
        T: FromLocated + 'static,
        Q: Into<HarnessQuery>,
    {
        locator::locator_for_optional(Rc::clone(self.locator_factory()), collect_queries(queries))
    }

    /// Async factory for every match beneath the host
    fn locator_for_all<T, Q>(&self, queries: impl IntoIterator<Item = Q>) -> AsyncFactory<Vec<T>>
    where
        T: FromLocated + 'static,
        Q: Into<HarnessQuery>,
    {
        locator::locator_for_all(Rc::clone(self.locator_factory()), collect_queries(queries))
    }

    /// Flush change detection and wait for the tree to settle
    async fn force_stabilize(&self) -> HarnessResult<()> {
        self.locator_factory().force_stabilize().await
    }

    /// Wait for work outside the change-detection zone
    async fn wait_for_tasks_outside_angular(&self) -> HarnessResult<()> {
        self.locator_factory().wait_for_tasks_outside_angular().await
    }
}

/// Loads harnesses and child loaders beneath one root element.
#[async_trait(?Send)]
pub trait HarnessLoader: fmt::Debug {
    /// Loader rooted at the first element matching `selector`
    async fn get_child_loader(&self, selector: &str) -> HarnessResult<Rc<dyn HarnessLoader>>;

    /// Loaders rooted at every element matching `selector`
    async fn get_all_child_loaders(&self, selector: &str) -> HarnessResult<Vec<Rc<dyn HarnessLoader>>>;

    /// Resolve a query list beneath the root
    async fn query_all(&self, queries: &[HarnessQuery]) -> HarnessResult<Vec<Located>>;
}

async fn all_of<Q: TypedHarnessQuery>(
    loader: &dyn HarnessLoader,
    query: Q,
) -> HarnessResult<(Vec<Rc<Q::Harness>>, HarnessQuery)> {
    let query: HarnessQuery = query.into();
    let located = loader.query_all(std::slice::from_ref(&query)).await?;
    let harnesses = located
        .into_iter()
        .map(Rc::<Q::Harness>::from_located)
        .collect::<HarnessResult<Vec<_>>>()?;
    Ok((harnesses, query))
}

impl dyn HarnessLoader {
    /// First harness matching `query`; fails when there is none.
    pub async fn get_harness<Q: TypedHarnessQuery>(&self, query: Q) -> HarnessResult<Rc<Q::Harness>> {
        let (harnesses, query) = all_of(self, query).await?;
        harnesses
            .into_iter()
            .next()
            .ok_or_else(|| HarnessError::NotFound {
                message: not_found_message(std::slice::from_ref(&query)),
            })
    }

    /// First harness matching `query`, or `None`
    pub async fn get_harness_or_null<Q: TypedHarnessQuery>(
        &self,
        query: Q,
    ) -> HarnessResult<Option<Rc<Q::Harness>>> {
        let (harnesses, _) = all_of(self, query).await?;
        Ok(harnesses.into_iter().next())
    }

    /// Whether any harness matches `query`
    pub async fn has_harness<Q: TypedHarnessQuery>(&self, query: Q) -> HarnessResult<bool> {
        Ok(self.get_harness_or_null(query).await?.is_some())
    }

    /// Every harness matching `query`, in document order
    pub async fn get_all_harnesses<Q: TypedHarnessQuery>(
        &self,
        query: Q,
    ) -> HarnessResult<Vec<Rc<Q::Harness>>> {
        Ok(all_of(self, query).await?.0)
    }

    /// The harness at `index` among the matches of `query`
    pub async fn get_harness_at_index<Q: TypedHarnessQuery>(
        &self,
        query: Q,
        index: usize,
    ) -> HarnessResult<Rc<Q::Harness>> {
        let (harnesses, query) = all_of(self, query).await?;
        let count = harnesses.len();
        harnesses
            .into_iter()
            .nth(index)
            .ok_or_else(|| HarnessError::IndexOutOfRange {
                description: query.description(),
                index,
                count,
            })
    }

    /// Number of harnesses matching `query`
    pub async fn count_harnesses<Q: TypedHarnessQuery>(&self, query: Q) -> HarnessResult<usize> {
        let count = all_of(self, query).await?.0.len();
        tracing::debug!(count, "counted harnesses");
        Ok(count)
    }
}

/// Harness for a component that projects arbitrary content, which may
/// itself contain harnesses.
#[async_trait(?Send)]
pub trait ContentContainerComponentHarness: ComponentHarness {
    /// Loader for the content region. Defaults to the host element; override
    /// when content is rendered elsewhere.
    async fn root_harness_loader(&self) -> HarnessResult<Rc<dyn HarnessLoader>> {
        Ok(self.locator_factory().root_harness_loader())
    }

    /// Loader rooted at the first content element matching `selector`
    async fn get_child_loader(&self, selector: &str) -> HarnessResult<Rc<dyn HarnessLoader>> {
        self.root_harness_loader().await?.get_child_loader(selector).await
    }

    /// Loaders rooted at every content element matching `selector`
    async fn get_all_child_loaders(&self, selector: &str) -> HarnessResult<Vec<Rc<dyn HarnessLoader>>> {
        self.root_harness_loader()
            .await?
            .get_all_child_loaders(selector)
            .await
    }

    /// First harness in the content matching `query`
    async fn get_harness<Q: TypedHarnessQuery + 'static>(&self, query: Q) -> HarnessResult<Rc<Q::Harness>> {
        self.root_harness_loader().await?.get_harness(query).await
    }

    /// First harness in the content matching `query`, or `None`
    async fn get_harness_or_null<Q: TypedHarnessQuery + 'static>(
        &self,
        query: Q,
    ) -> HarnessResult<Option<Rc<Q::Harness>>> {
        self.root_harness_loader()
            .await?
            .get_harness_or_null(query)
            .await
    }

    /// Whether the content holds a harness matching `query`
    async fn has_harness<Q: TypedHarnessQuery + 'static>(&self, query: Q) -> HarnessResult<bool> {
        self.root_harness_loader().await?.has_harness(query).await
    }

    /// Every harness in the content matching `query`
    async fn get_all_harnesses<Q: TypedHarnessQuery + 'static>(
        &self,
        query: Q,
    ) -> HarnessResult<Vec<Rc<Q::Harness>>> {
        self.root_harness_loader()
            .await?
            .get_all_harnesses(query)
            .await
    }
}
