//! Output tree construction.
//!
//! The VM never builds nodes itself. It drives a host-supplied
//! [`TreeConstruction`] and keeps just enough bookkeeping on top of it to
//! report the bounds of every block it renders.

use serde::{Deserialize, Serialize};

use crate::error::{Result, RuntimeError};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributeId(pub u32);

/// First and last top-level nodes a block produced under `parent`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub parent: NodeId,
    pub first: Option<NodeId>,
    pub last: Option<NodeId>,
}

impl Bounds {
    pub fn is_empty(&self) -> bool {
        self.first.is_none()
    }
}

/// Host tree the VM renders into
pub trait TreeConstruction {
    /// Node new content is currently appended to
    fn current_parent(&self) -> NodeId;
    /// Start an element; attributes follow until `flush_element`
    fn open_element(&mut self, tag: &str) -> NodeId;
    fn set_static_attribute(&mut self, element: NodeId, name: &str, value: &str, namespace: Option<&str>);
    fn set_dynamic_attribute(
        &mut self,
        element: NodeId,
        name: &str,
        value: &Value,
        trusting: bool,
        namespace: Option<&str>,
    ) -> AttributeId;
    fn update_attribute(&mut self, attribute: AttributeId, value: &Value);
    /// Attributes are done; children are appended to `element` from now on
    fn flush_element(&mut self, element: NodeId);
    fn close_element(&mut self);
    fn append_text(&mut self, text: &str) -> NodeId;
    fn update_text(&mut self, node: NodeId, text: &str);
    /// Marker node; keeps the position of a block that rendered nothing
    fn append_comment(&mut self, data: &str) -> NodeId;
    /// Detach everything between `bounds.first` and `bounds.last`
    fn remove(&mut self, bounds: &Bounds);
    fn next_sibling(&self, node: NodeId) -> Option<NodeId>;
    /// Insert new top-level content under `parent` before `next_sibling`
    /// (or at the end) until the matching `pop_insertion_point`.
    fn push_insertion_point(&mut self, parent: NodeId, next_sibling: Option<NodeId>);
    fn pop_insertion_point(&mut self);
}

struct BlockTracker {
    parent: NodeId,
    depth: usize,
    first: Option<NodeId>,
    last: Option<NodeId>,
}

/// Block and element bookkeeping over a host tree
pub struct ElementBuilder<'t> {
    tree: &'t mut dyn TreeConstruction,
    blocks: Vec<BlockTracker>,
    open_elements: Vec<NodeId>,
    constructing: Option<NodeId>,
}

impl<'t> ElementBuilder<'t> {
    pub fn new(tree: &'t mut dyn TreeConstruction) -> Self {
        Self {
            tree,
            blocks: Vec::new(),
            open_elements: Vec::new(),
            constructing: None,
        }
    }

    /// Element whose attributes are being set, if any
    pub fn constructing(&self) -> Option<NodeId> {
        self.constructing
    }

    pub fn require_constructing(&self) -> Result<NodeId> {
        self.constructing
            .ok_or_else(|| RuntimeError::invariant("no element is under construction"))
    }

    pub fn push_block(&mut self) {
        let parent = self.tree.current_parent();
        self.blocks.push(BlockTracker {
            parent,
            depth: self.open_elements.len(),
            first: None,
            last: None,
        });
    }

    /// Close the innermost block and fold its bounds into the enclosing one.
    pub fn pop_block(&mut self) -> Result<Bounds> {
        let block = self
            .blocks
            .pop()
            .ok_or_else(|| RuntimeError::invariant("pop_block without an open block"))?;
        if let Some(parent) = self.blocks.last_mut() {
            if parent.depth == block.depth {
                if let Some(first) = block.first {
                    parent.first.get_or_insert(first);
                    parent.last = block.last;
                }
            }
        }
        Ok(Bounds {
            parent: block.parent,
            first: block.first,
            last: block.last,
        })
    }

    fn did_append_node(&mut self, node: NodeId) {
        let depth = self.open_elements.len();
        if let Some(block) = self.blocks.last_mut() {
            if block.depth == depth {
                block.first.get_or_insert(node);
                block.last = Some(node);
            }
        }
    }

    pub fn open_element(&mut self, tag: &str) -> Result<NodeId> {
        if self.constructing.is_some() {
            return Err(RuntimeError::invariant(format!(
                "cannot open <{tag}> while another element is still being constructed"
            )));
        }
        let node = self.tree.open_element(tag);
        self.did_append_node(node);
        self.constructing = Some(node);
        Ok(node)
    }

    pub fn set_static_attribute(&mut self, name: &str, value: &str, namespace: Option<&str>) -> Result<()> {
        let element = self.require_constructing()?;
        self.tree.set_static_attribute(element, name, value, namespace);
        Ok(())
    }

    pub fn set_dynamic_attribute(
        &mut self,
        name: &str,
        value: &Value,
        trusting: bool,
        namespace: Option<&str>,
    ) -> Result<AttributeId> {
        let element = self.require_constructing()?;
        Ok(self.tree.set_dynamic_attribute(element, name, value, trusting, namespace))
    }

    pub fn flush_element(&mut self) -> Result<NodeId> {
        let element = self.require_constructing()?;
        self.tree.flush_element(element);
        self.constructing = None;
        self.open_elements.push(element);
        Ok(element)
    }

    pub fn close_element(&mut self) -> Result<()> {
        if self.open_elements.pop().is_none() {
            return Err(RuntimeError::invariant("close_element without an open element"));
        }
        self.tree.close_element();
        Ok(())
    }

    pub fn append_text(&mut self, text: &str) -> Result<NodeId> {
        if self.constructing.is_some() {
            return Err(RuntimeError::invariant("cannot append text before flushing the open element"));
        }
        let node = self.tree.append_text(text);
        self.did_append_node(node);
        Ok(node)
    }

    pub fn append_comment(&mut self, data: &str) -> Result<NodeId> {
        if self.constructing.is_some() {
            return Err(RuntimeError::invariant("cannot append a comment before flushing the open element"));
        }
        let node = self.tree.append_comment(data);
        self.did_append_node(node);
        Ok(node)
    }

    /// Whether the innermost block has produced a top-level node yet
    pub fn is_block_empty(&self) -> bool {
        self.blocks.last().is_none_or(|block| block.first.is_none())
    }

    pub fn block_depth(&self) -> usize {
        self.blocks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryTree;

    #[test]
    fn bounds_cover_top_level_nodes_only() {
        let mut tree = MemoryTree::new();
        let mut builder = ElementBuilder::new(&mut tree);

        builder.push_block();
        let div = builder.open_element("div").unwrap();
        builder.flush_element().unwrap();
        builder.append_text("inside").unwrap();
        builder.close_element().unwrap();
        let tail = builder.append_text("after").unwrap();
        let bounds = builder.pop_block().unwrap();

        assert_eq!(bounds.first, Some(div));
        assert_eq!(bounds.last, Some(tail));
        assert_eq!(tree.to_html(), "<div>inside</div>after");
    }

    #[test]
    fn nested_block_bounds_extend_the_parent() {
        let mut tree = MemoryTree::new();
        let mut builder = ElementBuilder::new(&mut tree);

        builder.push_block();
        builder.push_block();
        let text = builder.append_text("x").unwrap();
        let inner = builder.pop_block().unwrap();
        let outer = builder.pop_block().unwrap();

        assert_eq!(inner.first, Some(text));
        assert_eq!(outer.first, Some(text));
        assert_eq!(outer.last, Some(text));
    }

    #[test]
    fn empty_block_has_no_nodes() {
        let mut tree = MemoryTree::new();
        let mut builder = ElementBuilder::new(&mut tree);
        builder.push_block();
        assert!(builder.pop_block().unwrap().is_empty());
        assert!(builder.pop_block().is_err());
    }

    #[test]
    fn attributes_require_an_element_under_construction() {
        let mut tree = MemoryTree::new();
        let mut builder = ElementBuilder::new(&mut tree);
        assert!(builder.set_static_attribute("id", "x", None).is_err());

        builder.open_element("span").unwrap();
        builder.set_static_attribute("id", "x", None).unwrap();
        builder.flush_element().unwrap();
        builder.close_element().unwrap();
        assert_eq!(tree.to_html(), r#"<span id="x"></span>"#);
    }
}
