//! Harness predicates.
//!
//! A [`HarnessPredicate`] narrows the harnesses of one type down to those
//! satisfying a list of async checks, and describes those checks for error
//! messages:
//!
//! ```ignore
//! let query = HarnessPredicate::<ButtonHarness>::new(
//!     BaseHarnessFilters::new().with_ancestor(".toolbar"),
//! )
//! .add_option("text", Some(TextPattern::from("Save")), |button, text| async move {
//!     string_matches_async(button.text(), Some(&text)).await
//! });
//!
//! let save = loader.get_harness::<Rc<ButtonHarness>>(query).await?;
//! ```

use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use regex::Regex;
use serde::{Serialize, Serializer};

use crate::change_detection::try_run_parallel;
use crate::harness::ComponentHarness;
use crate::query::{AnyHarnessPredicate, HarnessType};
use crate::result::{HarnessError, HarnessResult};
use crate::selector::scope_under_ancestor;

/// Filters every harness supports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BaseHarnessFilters {
    /// Only match harnesses whose host element also matches this selector
    pub selector: Option<String>,
    /// Only match harnesses nested inside an element matching this selector
    pub ancestor: Option<String>,
}

impl BaseHarnessFilters {
    /// Create empty filters
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require the host element to match `selector`
    #[must_use]
    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    /// Require an ancestor matching `ancestor`
    #[must_use]
    pub fn with_ancestor(mut self, ancestor: impl Into<String>) -> Self {
        self.ancestor = Some(ancestor.into());
        self
    }
}

type PredicateFn<H> = Rc<dyn Fn(Rc<H>) -> LocalBoxFuture<'static, HarnessResult<bool>>>;

/// Composable async filter over harnesses of type `H`.
pub struct HarnessPredicate<H: ComponentHarness> {
    harness_type: HarnessType,
    descriptions: Vec<String>,
    predicates: Vec<PredicateFn<H>>,
    ancestor: String,
}

impl<H: ComponentHarness> HarnessPredicate<H> {
    /// Create a predicate applying the base filters
    #[must_use]
    pub fn new(filters: BaseHarnessFilters) -> Self {
        let mut predicate = Self {
            harness_type: HarnessType::of::<H>(),
            descriptions: Vec::new(),
            predicates: Vec::new(),
            ancestor: filters.ancestor.unwrap_or_default(),
        };
        if !predicate.ancestor.is_empty() {
            predicate.descriptions.push(format!(
                "has ancestor matching selector \"{}\"",
                predicate.ancestor
            ));
        }
        match filters.selector {
            Some(selector) => predicate.add(
                format!("host matches selector \"{selector}\""),
                move |harness: Rc<H>| {
                    let selector = selector.clone();
                    async move { harness.host().await.matches_selector(&selector).await }
                },
            ),
            None => predicate,
        }
    }

    /// Append a described predicate.
    #[must_use]
    pub fn add<F, Fut>(mut self, description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(Rc<H>) -> Fut + 'static,
        Fut: Future<Output = HarnessResult<bool>> + 'static,
    {
        self.descriptions.push(description.into());
        self.predicates
            .push(Rc::new(move |harness| Box::pin(predicate(harness))));
        self
    }

    /// Append a predicate for a named option, if the option is present.
    ///
    /// The description reads `name = value`, with the value rendered as JSON.
    #[must_use]
    pub fn add_option<O, F, Fut>(self, name: &str, option: Option<O>, predicate: F) -> Self
    where
        O: Serialize + Clone + 'static,
        F: Fn(Rc<H>, O) -> Fut + 'static,
        Fut: Future<Output = HarnessResult<bool>> + 'static,
    {
        match option {
            Some(option) => {
                let description = format!("{name} = {}", value_as_string(&option));
                self.add(description, move |harness| predicate(harness, option.clone()))
            }
            None => self,
        }
    }

    /// Keep the harnesses satisfying every predicate, in their original order.
    pub async fn filter(&self, harnesses: Vec<Rc<H>>) -> HarnessResult<Vec<Rc<H>>> {
        if harnesses.is_empty() {
            return Ok(Vec::new());
        }
        let results =
            try_run_parallel(|| harnesses.iter().map(|harness| self.evaluate(Rc::clone(harness))))
                .await?;
        Ok(harnesses
            .into_iter()
            .zip(results)
            .filter_map(|(harness, keep)| keep.then_some(harness))
            .collect())
    }

    /// Whether `harness` satisfies every predicate. Predicates run concurrently.
    pub async fn evaluate(&self, harness: Rc<H>) -> HarnessResult<bool> {
        let results = try_run_parallel(|| {
            self.predicates
                .iter()
                .map(|predicate| predicate(Rc::clone(&harness)))
        })
        .await?;
        Ok(results.into_iter().all(|passed| passed))
    }

    /// Comma-joined description of every constraint
    #[must_use]
    pub fn get_description(&self) -> String {
        self.descriptions.join(", ")
    }

    /// Selector candidate host elements must match.
    #[must_use]
    pub fn get_selector(&self) -> String {
        let host = self.harness_type.host_selector();
        if self.ancestor.is_empty() {
            host.trim().to_string()
        } else {
            scope_under_ancestor(&self.ancestor, host)
        }
    }

    /// Harness type this predicate filters
    #[must_use]
    pub const fn harness_type(&self) -> HarnessType {
        self.harness_type
    }

    pub(crate) fn into_any(self) -> AnyHarnessPredicate {
        let harness_type = self.harness_type;
        let selector = self.get_selector();
        let description = self.get_description();
        let predicate = Rc::new(self);
        AnyHarnessPredicate {
            harness_type,
            selector,
            description,
            evaluate: Rc::new(move |instance| {
                let predicate = Rc::clone(&predicate);
                Box::pin(async move {
                    let harness = instance.downcast::<H>().map_err(|_| {
                        HarnessError::UnexpectedResult {
                            expected: harness_type.name().to_string(),
                            found: "a harness of another type".to_string(),
                        }
                    })?;
                    predicate.evaluate(harness).await
                })
            }),
        }
    }
}

impl<H: ComponentHarness> Clone for HarnessPredicate<H> {
    fn clone(&self) -> Self {
        Self {
            harness_type: self.harness_type,
            descriptions: self.descriptions.clone(),
            predicates: self.predicates.clone(),
            ancestor: self.ancestor.clone(),
        }
    }
}

impl<H: ComponentHarness> fmt::Debug for HarnessPredicate<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HarnessPredicate")
            .field("harness_type", &self.harness_type)
            .field("descriptions", &self.descriptions)
            .field("ancestor", &self.ancestor)
            .finish_non_exhaustive()
    }
}

/// Expected text: an exact string or a regular expression.
#[derive(Debug, Clone)]
pub enum TextPattern {
    /// Exact equality
    Exact(String),
    /// Unanchored regular expression match
    Regex(Regex),
}

impl TextPattern {
    /// Whether `value` satisfies the pattern
    #[must_use]
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Self::Exact(expected) => expected == value,
            Self::Regex(regex) => regex.is_match(value),
        }
    }
}

impl From<&str> for TextPattern {
    fn from(value: &str) -> Self {
        Self::Exact(value.to_string())
    }
}

impl From<String> for TextPattern {
    fn from(value: String) -> Self {
        Self::Exact(value)
    }
}

impl From<Regex> for TextPattern {
    fn from(regex: Regex) -> Self {
        Self::Regex(regex)
    }
}

/// Brackets a regex inside the JSON rendering so its quotes can be stripped.
const REGEX_MARKER: &str = "\u{25ec}RE\u{25ec}";

impl Serialize for TextPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Exact(text) => serializer.serialize_str(text),
            Self::Regex(regex) => serializer.serialize_str(&format!(
                "{REGEX_MARKER}/{}/{REGEX_MARKER}",
                regex.as_str().replace('"', REGEX_MARKER)
            )),
        }
    }
}

/// Render an option value for a predicate description.
///
/// Values render as JSON, regex patterns as `/pattern/`. A value that fails
/// to serialize renders as `{...}`.
#[must_use]
pub fn value_as_string<T: Serialize + ?Sized>(value: &T) -> String {
    match serde_json::to_string(value) {
        Ok(json) => json
            .replace(&format!("\"{REGEX_MARKER}"), "")
            .replace(&format!("{REGEX_MARKER}\""), "")
            .replace(REGEX_MARKER, "\""),
        Err(_) => "{...}".to_string(),
    }
}

/// Match a possibly absent value against a possibly absent pattern.
///
/// An absent pattern only matches an absent value; an absent value never
/// matches a present pattern.
#[must_use]
pub fn string_matches(value: Option<&str>, pattern: Option<&TextPattern>) -> bool {
    match (value, pattern) {
        (value, None) => value.is_none(),
        (None, Some(_)) => false,
        (Some(value), Some(pattern)) => pattern.matches(value),
    }
}

/// [`string_matches`] for a value that still has to be read.
pub async fn string_matches_async<V, S>(value: V, pattern: Option<&TextPattern>) -> HarnessResult<bool>
where
    V: Future<Output = HarnessResult<S>>,
    S: Into<Option<String>>,
{
    let value: Option<String> = value.await?.into();
    Ok(string_matches(value.as_deref(), pattern))
}
