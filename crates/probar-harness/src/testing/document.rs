//! In-memory element tree.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use super::css::{NodeView, SelectorList};
use crate::result::HarnessResult;

/// Handle to one element of a [`MockDocument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Default)]
struct Node {
    tag: String,
    attrs: BTreeMap<String, String>,
    text: String,
    value: String,
    clicks: usize,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Default)]
struct Tree {
    nodes: Vec<Node>,
    focused: Option<NodeId>,
}

impl Tree {
    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    fn descendants(&self, root: NodeId, out: &mut Vec<NodeId>) {
        for &child in &self.node(root).children {
            out.push(child);
            self.descendants(child, out);
        }
    }

    fn text_content(&self, id: NodeId, out: &mut String) {
        let node = self.node(id);
        out.push_str(&node.text);
        for &child in &node.children {
            self.text_content(child, out);
        }
    }
}

impl NodeView for Tree {
    type Id = NodeId;

    fn tag_name(&self, node: NodeId) -> &str {
        &self.node(node).tag
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.node(node).attrs.get(name).map(String::as_str)
    }

    fn parent_element(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).parent
    }
}

/// Shared, mutable element tree rooted at a `<body>` element.
///
/// Clones share the same tree.
#[derive(Clone)]
pub struct MockDocument {
    tree: Rc<RefCell<Tree>>,
}

impl MockDocument {
    /// Empty document
    #[must_use]
    pub fn new() -> Self {
        let tree = Tree {
            nodes: vec![Node {
                tag: "body".to_string(),
                ..Node::default()
            }],
            focused: None,
        };
        Self {
            tree: Rc::new(RefCell::new(tree)),
        }
    }

    /// The `<body>` element
    #[must_use]
    pub const fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Start building a child element of `parent`
    pub fn append(&self, parent: NodeId, tag: &str) -> ElementBuilder<'_> {
        ElementBuilder {
            document: self,
            parent,
            node: Node {
                tag: tag.to_ascii_lowercase(),
                ..Node::default()
            },
        }
    }

    /// Detach `node` (and its subtree) from its parent
    pub fn remove(&self, node: NodeId) {
        let mut tree = self.tree.borrow_mut();
        if let Some(parent) = tree.node_mut(node).parent.take() {
            tree.node_mut(parent).children.retain(|&child| child != node);
        }
    }

    /// Set or replace an attribute
    pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) {
        self.tree
            .borrow_mut()
            .node_mut(node)
            .attrs
            .insert(name.to_string(), value.to_string());
    }

    /// Attribute value, if present
    #[must_use]
    pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.tree.borrow().attribute(node, name).map(str::to_string)
    }

    /// Lower-case tag name
    #[must_use]
    pub fn tag_name(&self, node: NodeId) -> String {
        self.tree.borrow().node(node).tag.clone()
    }

    /// Concatenated text of the element and its descendants
    #[must_use]
    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.tree.borrow().text_content(node, &mut out);
        out
    }

    /// DOM-style property lookup
    #[must_use]
    pub fn property(&self, node: NodeId, name: &str) -> Option<String> {
        let tree = self.tree.borrow();
        let element = tree.node(node);
        match name {
            "value" => Some(element.value.clone()),
            "tagName" => Some(element.tag.to_ascii_uppercase()),
            "id" => Some(element.attrs.get("id").cloned().unwrap_or_default()),
            "className" => Some(element.attrs.get("class").cloned().unwrap_or_default()),
            "textContent" => {
                let mut out = String::new();
                tree.text_content(node, &mut out);
                Some(out)
            }
            _ => None,
        }
    }

    /// Whether `node` matches `selector`
    pub fn matches(&self, node: NodeId, selector: &str) -> HarnessResult<bool> {
        let selector = SelectorList::parse(selector)?;
        Ok(selector.matches(&*self.tree.borrow(), node))
    }

    /// Descendants of `root` matching `selector`, in document order
    pub fn query_selector_all(&self, root: NodeId, selector: &str) -> HarnessResult<Vec<NodeId>> {
        let selector = SelectorList::parse(selector)?;
        let tree = self.tree.borrow();
        let mut descendants = Vec::new();
        tree.descendants(root, &mut descendants);
        Ok(descendants
            .into_iter()
            .filter(|&node| selector.matches(&*tree, node))
            .collect())
    }

    /// Record a click
    pub fn click(&self, node: NodeId) {
        self.tree.borrow_mut().node_mut(node).clicks += 1;
    }

    /// Number of clicks recorded on `node`
    #[must_use]
    pub fn clicks(&self, node: NodeId) -> usize {
        self.tree.borrow().node(node).clicks
    }

    /// Move focus to `node`
    pub fn focus(&self, node: NodeId) {
        self.tree.borrow_mut().focused = Some(node);
    }

    /// Drop focus from `node` if it has it
    pub fn blur(&self, node: NodeId) {
        let mut tree = self.tree.borrow_mut();
        if tree.focused == Some(node) {
            tree.focused = None;
        }
    }

    /// Currently focused element
    #[must_use]
    pub fn focused(&self) -> Option<NodeId> {
        self.tree.borrow().focused
    }

    /// Current input value
    #[must_use]
    pub fn value(&self, node: NodeId) -> String {
        self.tree.borrow().node(node).value.clone()
    }

    /// Append typed text to the input value
    pub fn type_text(&self, node: NodeId, text: &str) {
        self.tree.borrow_mut().node_mut(node).value.push_str(text);
    }

    /// Clear the input value
    pub fn clear_value(&self, node: NodeId) {
        self.tree.borrow_mut().node_mut(node).value.clear();
    }

    fn insert(&self, parent: NodeId, mut node: Node) -> NodeId {
        let mut tree = self.tree.borrow_mut();
        let id = NodeId(tree.nodes.len());
        node.parent = Some(parent);
        tree.node_mut(parent).children.push(id);
        tree.nodes.push(node);
        id
    }
}

impl Default for MockDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MockDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockDocument")
            .field("nodes", &self.tree.borrow().nodes.len())
            .finish()
    }
}

/// Builder for an element appended to a [`MockDocument`].
#[derive(Debug)]
pub struct ElementBuilder<'a> {
    document: &'a MockDocument,
    parent: NodeId,
    node: Node,
}

impl ElementBuilder<'_> {
    /// Set the `id` attribute
    #[must_use]
    pub fn id(self, id: &str) -> Self {
        self.attr("id", id)
    }

    /// Add a class
    #[must_use]
    pub fn class(mut self, class: &str) -> Self {
        let classes = self.node.attrs.entry("class".to_string()).or_default();
        if !classes.is_empty() {
            classes.push(' ');
        }
        classes.push_str(class);
        self
    }

    /// Set an attribute
    #[must_use]
    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.node.attrs.insert(name.to_string(), value.to_string());
        self
    }

    /// Set the element's own text
    #[must_use]
    pub fn text(mut self, text: &str) -> Self {
        self.node.text = text.to_string();
        self
    }

    /// Set the initial input value
    #[must_use]
    pub fn value(mut self, value: &str) -> Self {
        self.node.value = value.to_string();
        self
    }

    /// Insert the element
    pub fn build(self) -> NodeId {
        self.document.insert(self.parent, self.node)
    }
}
