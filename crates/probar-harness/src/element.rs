//! Test element capability.
//!
//! A [`TestElement`] wraps one element of the rendered tree. The query engine
//! only ever calls [`TestElement::matches_selector`]; the remaining methods are
//! the interaction primitives harness authors build their APIs on.

use std::fmt;

use async_trait::async_trait;

use crate::result::HarnessResult;

/// One element of the component tree under test.
#[async_trait(?Send)]
pub trait TestElement: fmt::Debug {
    /// Whether the element matches the given CSS selector
    async fn matches_selector(&self, selector: &str) -> HarnessResult<bool>;

    /// Trimmed text content of the element and its descendants
    async fn text(&self) -> HarnessResult<String>;

    /// Value of an attribute, if present
    async fn get_attribute(&self, name: &str) -> HarnessResult<Option<String>>;

    /// Value of a DOM property, if the element exposes it
    async fn get_property(&self, name: &str) -> HarnessResult<Option<String>>;

    /// Whether the element carries the given class
    async fn has_class(&self, name: &str) -> HarnessResult<bool>;

    /// Click the element
    async fn click(&self) -> HarnessResult<()>;

    /// Focus the element
    async fn focus(&self) -> HarnessResult<()>;

    /// Remove focus from the element
    async fn blur(&self) -> HarnessResult<()>;

    /// Whether the element currently has focus
    async fn is_focused(&self) -> HarnessResult<bool>;

    /// Type text into the element
    async fn send_keys(&self, keys: &str) -> HarnessResult<()>;

    /// Clear the element's value
    async fn clear(&self) -> HarnessResult<()>;
}
