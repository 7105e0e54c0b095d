//! Harness queries.
//!
//! A query is a CSS selector (matching [`TestElement`](crate::TestElement)s),
//! a harness type (matching every harness of that type), or a
//! [`HarnessPredicate`] (matching harnesses of its type that satisfy its
//! predicates). Harness types are normalized into constraint-free predicates
//! as soon as a query list is parsed, so the query engine only ever branches
//! on two shapes.

use std::any::{Any, TypeId};
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::rc::Rc;

use futures::future::LocalBoxFuture;

use crate::harness::ComponentHarness;
use crate::locator::LocatorFactory;
use crate::predicate::HarnessPredicate;
use crate::result::HarnessResult;

type ConstructFn = fn(Rc<dyn LocatorFactory>) -> Rc<dyn Any>;

/// Reified harness type: identity, display name, host selector and constructor.
///
/// Two tokens are equal when they describe the same Rust type.
#[derive(Clone, Copy)]
pub struct HarnessType {
    type_id: TypeId,
    name: &'static str,
    host_selector: &'static str,
    construct: ConstructFn,
}

fn construct_harness<H: ComponentHarness>(locator_factory: Rc<dyn LocatorFactory>) -> Rc<dyn Any> {
    Rc::new(H::new(locator_factory))
}

impl HarnessType {
    /// Token for harness type `H`
    #[must_use]
    pub fn of<H: ComponentHarness>() -> Self {
        Self {
            type_id: TypeId::of::<H>(),
            name: H::harness_name(),
            host_selector: H::HOST_SELECTOR,
            construct: construct_harness::<H>,
        }
    }

    /// Display name used in error messages
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// CSS selector of the harness host element
    #[must_use]
    pub const fn host_selector(&self) -> &'static str {
        self.host_selector
    }

    /// Whether this token describes `H`
    #[must_use]
    pub fn is<H: ComponentHarness>(&self) -> bool {
        self.type_id == TypeId::of::<H>()
    }

    pub(crate) fn construct(&self, locator_factory: Rc<dyn LocatorFactory>) -> Rc<dyn Any> {
        (self.construct)(locator_factory)
    }
}

impl PartialEq for HarnessType {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for HarnessType {}

impl Hash for HarnessType {
    fn hash<S: Hasher>(&self, state: &mut S) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for HarnessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HarnessType")
            .field("name", &self.name)
            .field("host_selector", &self.host_selector)
            .finish()
    }
}

pub(crate) type ErasedEvaluate = Rc<dyn Fn(Rc<dyn Any>) -> LocalBoxFuture<'static, HarnessResult<bool>>>;

/// A [`HarnessPredicate`] with its harness type erased, ready to be mixed with
/// other queries.
#[derive(Clone)]
pub struct AnyHarnessPredicate {
    pub(crate) harness_type: HarnessType,
    pub(crate) selector: String,
    pub(crate) description: String,
    pub(crate) evaluate: ErasedEvaluate,
}

impl AnyHarnessPredicate {
    /// Predicate accepting every harness of `harness_type`
    #[must_use]
    pub fn for_type(harness_type: HarnessType) -> Self {
        Self {
            harness_type,
            selector: harness_type.host_selector.trim().to_string(),
            description: String::new(),
            evaluate: Rc::new(|_| Box::pin(async { Ok(true) })),
        }
    }

    /// Harness type the predicate filters
    #[must_use]
    pub const fn harness_type(&self) -> HarnessType {
        self.harness_type
    }

    /// Selector candidate host elements must match
    #[must_use]
    pub fn selector(&self) -> &str {
        &self.selector
    }

    /// Comma-joined description of the predicate's constraints
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Evaluate the predicate against a harness instance of its type
    pub async fn evaluate(&self, harness: Rc<dyn Any>) -> HarnessResult<bool> {
        (self.evaluate)(harness).await
    }

    /// Human-readable description used in "not found" errors
    #[must_use]
    pub fn query_description(&self) -> String {
        let base = format!(
            "{} with host element matching selector: \"{}\"",
            self.harness_type.name, self.harness_type.host_selector
        );
        if self.description.is_empty() {
            base
        } else {
            format!(
                "{base} satisfying the constraints: {}",
                self.description
            )
        }
    }
}

impl fmt::Debug for AnyHarnessPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyHarnessPredicate")
            .field("harness_type", &self.harness_type)
            .field("selector", &self.selector)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// A single query in a locator or loader call.
#[derive(Debug, Clone)]
pub enum HarnessQuery {
    /// Match test elements by CSS selector
    Selector(String),
    /// Match every harness of a type
    Type(HarnessType),
    /// Match harnesses satisfying a predicate
    Predicate(AnyHarnessPredicate),
}

impl HarnessQuery {
    /// Query for test elements matching `selector`
    #[must_use]
    pub fn selector(selector: impl Into<String>) -> Self {
        Self::Selector(selector.into())
    }

    /// Query for every harness of type `H`
    #[must_use]
    pub fn harness<H: ComponentHarness>() -> Self {
        Self::Type(HarnessType::of::<H>())
    }

    /// Human-readable description used in "not found" errors
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::Selector(selector) => element_query_description(selector),
            Self::Type(harness_type) => {
                AnyHarnessPredicate::for_type(*harness_type).query_description()
            }
            Self::Predicate(predicate) => predicate.query_description(),
        }
    }
}

impl From<&str> for HarnessQuery {
    fn from(selector: &str) -> Self {
        Self::Selector(selector.to_string())
    }
}

impl From<String> for HarnessQuery {
    fn from(selector: String) -> Self {
        Self::Selector(selector)
    }
}

impl From<&String> for HarnessQuery {
    fn from(selector: &String) -> Self {
        Self::Selector(selector.clone())
    }
}

impl From<HarnessType> for HarnessQuery {
    fn from(harness_type: HarnessType) -> Self {
        Self::Type(harness_type)
    }
}

impl From<AnyHarnessPredicate> for HarnessQuery {
    fn from(predicate: AnyHarnessPredicate) -> Self {
        Self::Predicate(predicate)
    }
}

impl<H: ComponentHarness> From<HarnessPredicate<H>> for HarnessQuery {
    fn from(predicate: HarnessPredicate<H>) -> Self {
        Self::Predicate(predicate.into_any())
    }
}

/// A harness query whose matches all share one harness type.
///
/// Loader operations take typed queries so they can hand back `Rc<H>`
/// directly.
pub trait TypedHarnessQuery: Into<HarnessQuery> {
    /// Harness type every match is an instance of
    type Harness: ComponentHarness;
}

impl<H: ComponentHarness> TypedHarnessQuery for HarnessPredicate<H> {
    type Harness = H;
}

/// Query for every harness of type `H`, built by
/// [`ComponentHarness::query`](crate::ComponentHarness::query).
pub struct HarnessTypeQuery<H>(PhantomData<fn() -> H>);

impl<H> HarnessTypeQuery<H> {
    pub(crate) const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<H> Clone for HarnessTypeQuery<H> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<H> Copy for HarnessTypeQuery<H> {}

impl<H: ComponentHarness> fmt::Debug for HarnessTypeQuery<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HarnessTypeQuery").field(&H::harness_name()).finish()
    }
}

impl<H: ComponentHarness> From<HarnessTypeQuery<H>> for HarnessQuery {
    fn from(_: HarnessTypeQuery<H>) -> Self {
        Self::harness::<H>()
    }
}

impl<H: ComponentHarness> TypedHarnessQuery for HarnessTypeQuery<H> {
    type Harness = H;
}

fn element_query_description(selector: &str) -> String {
    format!("TestElement for element matching selector: \"{selector}\"")
}

/// Message of the error raised when a required query matches nothing.
pub(crate) fn not_found_message(queries: &[HarnessQuery]) -> String {
    let descriptions: Vec<String> = queries
        .iter()
        .map(|query| format!("({})", query.description()))
        .collect();
    format!(
        "Failed to find element matching one of the following queries:\n{}",
        descriptions.join(",\n")
    )
}

/// One normalized query.
#[derive(Debug, Clone)]
pub(crate) enum ParsedQuery {
    Element(String),
    Harness(AnyHarnessPredicate),
}

/// A query list split into the views the query engine needs.
#[derive(Debug)]
pub(crate) struct ParsedQueries {
    pub(crate) all_queries: Vec<ParsedQuery>,
    pub(crate) element_queries: Vec<String>,
    pub(crate) harness_queries: Vec<AnyHarnessPredicate>,
    pub(crate) harness_types: Vec<HarnessType>,
}

impl ParsedQueries {
    pub(crate) fn parse(queries: &[HarnessQuery]) -> Self {
        let mut all_queries = Vec::with_capacity(queries.len());
        let mut element_queries = Vec::new();
        let mut harness_queries = Vec::new();
        let mut seen = HashSet::new();
        let mut harness_types = Vec::new();

        for query in queries {
            let parsed = match query {
                HarnessQuery::Selector(selector) => {
                    element_queries.push(selector.clone());
                    ParsedQuery::Element(selector.clone())
                }
                HarnessQuery::Type(harness_type) => {
                    ParsedQuery::Harness(AnyHarnessPredicate::for_type(*harness_type))
                }
                HarnessQuery::Predicate(predicate) => ParsedQuery::Harness(predicate.clone()),
            };
            if let ParsedQuery::Harness(predicate) = &parsed {
                if seen.insert(predicate.harness_type) {
                    harness_types.push(predicate.harness_type);
                }
                harness_queries.push(predicate.clone());
            }
            all_queries.push(parsed);
        }

        Self {
            all_queries,
            element_queries,
            harness_queries,
            harness_types,
        }
    }

    /// One selector matching every element any query could match.
    pub(crate) fn combined_selector(&self) -> String {
        self.element_queries
            .iter()
            .map(String::as_str)
            .chain(self.harness_queries.iter().map(AnyHarnessPredicate::selector))
            .filter(|selector| !selector.trim().is_empty())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Whether every candidate is guaranteed to match without re-checking
    /// selectors: either there are only element queries, or there are no
    /// element queries and exactly one harness type.
    pub(crate) fn skip_selector_check(&self) -> bool {
        (self.element_queries.is_empty() && self.harness_types.len() == 1)
            || self.harness_queries.is_empty()
    }
}
