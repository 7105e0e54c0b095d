//! Locator factories.
//!
//! A [`LocatorFactory`] is rooted at one element and answers queries beneath
//! it. The `locator_for*` functions turn a query list into an async factory
//! that re-runs the query every time it is called, so a locator captured once
//! in a harness always sees the current state of the tree.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use async_trait::async_trait;
use futures::future::LocalBoxFuture;

use crate::element::TestElement;
use crate::harness::{ComponentHarness, HarnessLoader};
use crate::query::{not_found_message, HarnessQuery, HarnessType};
use crate::result::{HarnessError, HarnessResult};

/// A harness instance produced by the query engine.
#[derive(Clone)]
pub struct HarnessMatch {
    harness_type: HarnessType,
    instance: Rc<dyn Any>,
}

impl HarnessMatch {
    pub(crate) fn new(harness_type: HarnessType, instance: Rc<dyn Any>) -> Self {
        Self {
            harness_type,
            instance,
        }
    }

    /// Type of the matched harness
    #[must_use]
    pub const fn harness_type(&self) -> HarnessType {
        self.harness_type
    }

    /// The harness as `H`, if it is one
    #[must_use]
    pub fn downcast<H: ComponentHarness>(&self) -> Option<Rc<H>> {
        Rc::clone(&self.instance).downcast::<H>().ok()
    }
}

impl fmt::Debug for HarnessMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HarnessMatch")
            .field("harness_type", &self.harness_type)
            .finish_non_exhaustive()
    }
}

/// One result of a query.
#[derive(Debug, Clone)]
pub enum Located {
    /// An element matched a selector query
    Element(Rc<dyn TestElement>),
    /// A harness matched a type or predicate query
    Harness(HarnessMatch),
}

impl Located {
    /// The element, if this is an element result
    #[must_use]
    pub const fn as_element(&self) -> Option<&Rc<dyn TestElement>> {
        match self {
            Self::Element(element) => Some(element),
            Self::Harness(_) => None,
        }
    }

    /// The harness as `H`, if this is a harness result of that type
    #[must_use]
    pub fn harness<H: ComponentHarness>(&self) -> Option<Rc<H>> {
        match self {
            Self::Element(_) => None,
            Self::Harness(matched) => matched.downcast::<H>(),
        }
    }

    fn kind(&self) -> String {
        match self {
            Self::Element(_) => "TestElement".to_string(),
            Self::Harness(matched) => matched.harness_type.name().to_string(),
        }
    }
}

/// Conversion from a query result into the type a caller asked for.
pub trait FromLocated: Sized {
    /// Convert, failing with [`HarnessError::UnexpectedResult`] on a mismatch
    fn from_located(located: Located) -> HarnessResult<Self>;
}

impl FromLocated for Located {
    fn from_located(located: Located) -> HarnessResult<Self> {
        Ok(located)
    }
}

impl FromLocated for Rc<dyn TestElement> {
    fn from_located(located: Located) -> HarnessResult<Self> {
        match located {
            Located::Element(element) => Ok(element),
            other => Err(HarnessError::UnexpectedResult {
                expected: "TestElement".to_string(),
                found: other.kind(),
            }),
        }
    }
}

impl<H: ComponentHarness> FromLocated for Rc<H> {
    fn from_located(located: Located) -> HarnessResult<Self> {
        located
            .harness::<H>()
            .ok_or_else(|| HarnessError::UnexpectedResult {
                expected: H::harness_name().to_string(),
                found: located.kind(),
            })
    }
}

/// Re-runnable async query.
pub type AsyncFactory<T> = Box<dyn Fn() -> LocalBoxFuture<'static, HarnessResult<T>>>;

/// Capability object rooted at one element.
#[async_trait(?Send)]
pub trait LocatorFactory: fmt::Debug {
    /// Test element for the root this factory is scoped to
    fn root_element(&self) -> Rc<dyn TestElement>;

    /// Factory rooted at the document root
    fn document_root_locator_factory(&self) -> Rc<dyn LocatorFactory>;

    /// Loader rooted at the same element as this factory
    fn root_harness_loader(&self) -> Rc<dyn HarnessLoader>;

    /// Resolve every query beneath the root, in document order then query
    /// order, with duplicates removed.
    async fn resolve_all(&self, queries: &[HarnessQuery]) -> HarnessResult<Vec<Located>>;

    /// Loader rooted at the first element matching `selector`
    async fn harness_loader_for(&self, selector: &str) -> HarnessResult<Rc<dyn HarnessLoader>>;

    /// Loader rooted at the first element matching `selector`, if any
    async fn harness_loader_for_optional(
        &self,
        selector: &str,
    ) -> HarnessResult<Option<Rc<dyn HarnessLoader>>>;

    /// Loaders rooted at every element matching `selector`
    async fn harness_loader_for_all(
        &self,
        selector: &str,
    ) -> HarnessResult<Vec<Rc<dyn HarnessLoader>>>;

    /// Flush pending change detection and wait for the tree to settle
    async fn force_stabilize(&self) -> HarnessResult<()>;

    /// Wait for asynchronous work the change-detection zone does not track
    async fn wait_for_tasks_outside_angular(&self) -> HarnessResult<()>;
}

fn resolving<T, F>(
    factory: Rc<dyn LocatorFactory>,
    queries: Vec<HarnessQuery>,
    finish: F,
) -> AsyncFactory<T>
where
    T: 'static,
    F: Fn(Vec<Located>, &[HarnessQuery]) -> HarnessResult<T> + Clone + 'static,
{
    let queries: Rc<[HarnessQuery]> = queries.into();
    Box::new(move || {
        let factory = Rc::clone(&factory);
        let queries = Rc::clone(&queries);
        let finish = finish.clone();
        Box::pin(async move {
            let located = factory.resolve_all(&queries).await?;
            finish(located, &queries)
        })
    })
}

/// Factory resolving to the first match, failing when nothing matches.
pub fn locator_for<T: FromLocated + 'static>(
    factory: Rc<dyn LocatorFactory>,
    queries: Vec<HarnessQuery>,
) -> AsyncFactory<T> {
    resolving(factory, queries, |located, queries| {
        match located.into_iter().next() {
            Some(first) => T::from_located(first),
            None => Err(HarnessError::NotFound {
                message: not_found_message(queries),
            }),
        }
    })
}

/// Factory resolving to the first match, or `None`.
pub fn locator_for_optional<T: FromLocated + 'static>(
    factory: Rc<dyn LocatorFactory>,
    queries: Vec<HarnessQuery>,
) -> AsyncFactory<Option<T>> {
    resolving(factory, queries, |located, _| {
        located.into_iter().next().map(T::from_located).transpose()
    })
}

/// Factory resolving to every match.
pub fn locator_for_all<T: FromLocated + 'static>(
    factory: Rc<dyn LocatorFactory>,
    queries: Vec<HarnessQuery>,
) -> AsyncFactory<Vec<T>> {
    resolving(factory, queries, |located, _| {
        located.into_iter().map(T::from_located).collect()
    })
}
