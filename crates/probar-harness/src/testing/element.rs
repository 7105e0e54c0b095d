//! Test elements backed by nodes of the in-memory document.

use std::rc::Rc;

use async_trait::async_trait;

use super::backend::MockChangeDetector;
use super::document::{MockDocument, NodeId};
use crate::element::TestElement;
use crate::result::HarnessResult;

/// [`TestElement`] over one node of a [`MockDocument`].
///
/// Interactions run a stabilization pass afterwards when the environment was
/// configured with `stabilize_after_interaction`.
#[derive(Debug, Clone)]
pub struct MockElement {
    document: MockDocument,
    node: NodeId,
    detector: Rc<MockChangeDetector>,
    stabilize_after_interaction: bool,
}

impl MockElement {
    pub(crate) fn new(
        document: MockDocument,
        node: NodeId,
        detector: Rc<MockChangeDetector>,
        stabilize_after_interaction: bool,
    ) -> Self {
        Self {
            document,
            node,
            detector,
            stabilize_after_interaction,
        }
    }

    /// Node this element wraps
    #[must_use]
    pub const fn node(&self) -> NodeId {
        self.node
    }

    fn after_interaction(&self) {
        if self.stabilize_after_interaction {
            self.detector.stabilize();
        }
    }
}

#[async_trait(?Send)]
impl TestElement for MockElement {
    async fn matches_selector(&self, selector: &str) -> HarnessResult<bool> {
        self.document.matches(self.node, selector)
    }

    async fn text(&self) -> HarnessResult<String> {
        Ok(self.document.text_content(self.node).trim().to_string())
    }

    async fn get_attribute(&self, name: &str) -> HarnessResult<Option<String>> {
        Ok(self.document.attribute(self.node, name))
    }

    async fn get_property(&self, name: &str) -> HarnessResult<Option<String>> {
        Ok(self.document.property(self.node, name))
    }

    async fn has_class(&self, name: &str) -> HarnessResult<bool> {
        Ok(self
            .document
            .attribute(self.node, "class")
            .is_some_and(|classes| classes.split_whitespace().any(|class| class == name)))
    }

    async fn click(&self) -> HarnessResult<()> {
        self.document.click(self.node);
        self.after_interaction();
        Ok(())
    }

    async fn focus(&self) -> HarnessResult<()> {
        self.document.focus(self.node);
        self.after_interaction();
        Ok(())
    }

    async fn blur(&self) -> HarnessResult<()> {
        self.document.blur(self.node);
        self.after_interaction();
        Ok(())
    }

    async fn is_focused(&self) -> HarnessResult<bool> {
        Ok(self.document.focused() == Some(self.node))
    }

    async fn send_keys(&self, keys: &str) -> HarnessResult<()> {
        self.document.focus(self.node);
        self.document.type_text(self.node, keys);
        self.after_interaction();
        Ok(())
    }

    async fn clear(&self) -> HarnessResult<()> {
        self.document.clear_value(self.node);
        self.after_interaction();
        Ok(())
    }
}
