//! Environment integration for the in-memory document.
//!
//! [`MockBackend`] plays the role a real framework integration would: it
//! answers element queries against a [`MockDocument`], and subscribes to the
//! change-detection batcher so that batched harness operations switch its
//! [`MockChangeDetector`] to manual mode and request detection passes.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::document::{MockDocument, NodeId};
use super::element::MockElement;
use crate::change_detection::handle_status_change;
use crate::element::TestElement;
use crate::environment::{EnvironmentBackend, HarnessEnvironment};
use crate::harness::{ComponentHarness, HarnessLoader};
use crate::result::HarnessResult;

/// Custom element query: `(document, root, selector) -> matches`.
pub type QueryFn = Rc<dyn Fn(&MockDocument, NodeId, &str) -> HarnessResult<Vec<NodeId>>>;

/// Options for [`MockBackend`].
#[derive(Clone, Serialize, Deserialize)]
pub struct MockEnvironmentOptions {
    /// Whether change detection is automatic outside batches
    pub auto_detect_changes: bool,
    /// Run a stabilization pass after every element interaction
    pub stabilize_after_interaction: bool,
    /// Override how raw elements are found
    #[serde(skip)]
    pub query_fn: Option<QueryFn>,
}

impl Default for MockEnvironmentOptions {
    fn default() -> Self {
        Self {
            auto_detect_changes: true,
            stabilize_after_interaction: true,
            query_fn: None,
        }
    }
}

impl MockEnvironmentOptions {
    /// Create options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether change detection is automatic outside batches
    #[must_use]
    pub const fn auto_detect_changes(mut self, enabled: bool) -> Self {
        self.auto_detect_changes = enabled;
        self
    }

    /// Set whether interactions stabilize afterwards
    #[must_use]
    pub const fn stabilize_after_interaction(mut self, enabled: bool) -> Self {
        self.stabilize_after_interaction = enabled;
        self
    }

    /// Replace the element query function
    #[must_use]
    pub fn with_query_fn(
        mut self,
        query_fn: impl Fn(&MockDocument, NodeId, &str) -> HarnessResult<Vec<NodeId>> + 'static,
    ) -> Self {
        self.query_fn = Some(Rc::new(query_fn));
        self
    }
}

impl fmt::Debug for MockEnvironmentOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockEnvironmentOptions")
            .field("auto_detect_changes", &self.auto_detect_changes)
            .field("stabilize_after_interaction", &self.stabilize_after_interaction)
            .field("custom_query_fn", &self.query_fn.is_some())
            .finish()
    }
}

/// Stand-in for a framework's change detector.
#[derive(Debug)]
pub struct MockChangeDetector {
    auto_detect: Cell<bool>,
    passes: Cell<usize>,
}

impl MockChangeDetector {
    /// Detector with the given automatic mode
    #[must_use]
    pub const fn new(auto_detect: bool) -> Self {
        Self {
            auto_detect: Cell::new(auto_detect),
            passes: Cell::new(0),
        }
    }

    /// Run one detection pass
    pub fn detect_changes(&self) {
        self.passes.set(self.passes.get() + 1);
    }

    /// Run a detection pass unless a batch holds detection off
    pub fn stabilize(&self) {
        if self.auto_detect.get() {
            self.detect_changes();
        }
    }

    /// Number of detection passes so far
    #[must_use]
    pub fn passes(&self) -> usize {
        self.passes.get()
    }

    /// Whether detection is currently automatic
    #[must_use]
    pub fn is_auto_detecting(&self) -> bool {
        self.auto_detect.get()
    }

    /// Switch automatic detection on or off
    pub fn set_auto_detect(&self, enabled: bool) {
        self.auto_detect.set(enabled);
    }
}

/// [`EnvironmentBackend`] over a [`MockDocument`].
pub struct MockBackend {
    document: MockDocument,
    detector: Rc<MockChangeDetector>,
    options: MockEnvironmentOptions,
}

impl MockBackend {
    /// Backend with default options
    #[must_use]
    pub fn new(document: MockDocument) -> Rc<Self> {
        Self::with_options(document, MockEnvironmentOptions::default())
    }

    /// Backend with the given options.
    ///
    /// Installs the change-detection handler for this thread, replacing any
    /// previous one.
    #[must_use]
    pub fn with_options(document: MockDocument, options: MockEnvironmentOptions) -> Rc<Self> {
        let detector = Rc::new(MockChangeDetector::new(options.auto_detect_changes));
        let subscribed = Rc::clone(&detector);
        let configured = options.auto_detect_changes;
        handle_status_change(move |status| {
            subscribed.set_auto_detect(configured && !status.is_disabled);
            if let Some(detect) = status.on_detect_changes_now {
                subscribed.detect_changes();
                detect.notify();
            }
        });
        tracing::debug!(?options, "mock environment ready");
        Rc::new(Self {
            document,
            detector,
            options,
        })
    }

    /// Loader rooted at the document's `<body>`
    pub fn loader(self: &Rc<Self>) -> Rc<dyn HarnessLoader> {
        HarnessEnvironment::loader(Rc::clone(self))
    }

    /// Harness of type `H` hosted by `node`
    pub async fn harness_for<H: ComponentHarness>(self: &Rc<Self>, node: NodeId) -> HarnessResult<Rc<H>> {
        HarnessEnvironment::harness_for::<H>(Rc::clone(self), node).await
    }

    /// Document this backend queries
    #[must_use]
    pub const fn document(&self) -> &MockDocument {
        &self.document
    }

    /// Change detector driven by the batcher
    #[must_use]
    pub const fn detector(&self) -> &Rc<MockChangeDetector> {
        &self.detector
    }
}

impl fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockBackend")
            .field("document", &self.document)
            .field("detector", &self.detector)
            .field("options", &self.options)
            .finish()
    }
}

#[async_trait(?Send)]
impl EnvironmentBackend for MockBackend {
    type Element = NodeId;

    fn document_root(&self) -> NodeId {
        self.document.root()
    }

    fn create_test_element(&self, element: NodeId) -> Rc<dyn TestElement> {
        Rc::new(MockElement::new(
            self.document.clone(),
            element,
            Rc::clone(&self.detector),
            self.options.stabilize_after_interaction,
        ))
    }

    async fn get_all_raw_elements(&self, root: &NodeId, selector: &str) -> HarnessResult<Vec<NodeId>> {
        match &self.options.query_fn {
            Some(query) => query(&self.document, *root, selector),
            None => self.document.query_selector_all(*root, selector),
        }
    }

    async fn force_stabilize(&self) -> HarnessResult<()> {
        self.detector.stabilize();
        Ok(())
    }

    async fn wait_for_tasks_outside_angular(&self) -> HarnessResult<()> {
        // Nothing runs outside the document here.
        Ok(())
    }
}
