//! Debug render tree.
//!
//! When an environment carries a [`DebugRenderTree`], every component
//! invocation reports its creation, updates, rendered bounds and teardown,
//! keyed by a [`Bucket`] that stays stable for the life of the instance.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::arguments::CapturedArguments;
use crate::tree::Bounds;
use crate::value::Value;

/// Identity of one node in the debug render tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Bucket(Ulid);

impl Bucket {
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for Bucket {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenderNodeType {
    Component,
    Outlet,
    Engine,
    RouteTemplate,
    Keyword,
    Modifier,
}

#[derive(Debug, Clone)]
pub struct RenderNode {
    pub kind: RenderNodeType,
    pub name: String,
    pub args: CapturedArguments,
    /// Handle of the layout the node renders, when known
    pub template: Option<u32>,
    pub instance: Value,
}

/// Node a manager reports in place of the default component node
#[derive(Debug, Clone)]
pub struct CustomRenderNode {
    pub bucket: Bucket,
    pub node: RenderNode,
}

pub trait DebugRenderTree {
    fn create(&self, bucket: Bucket, node: RenderNode);
    fn update(&self, bucket: Bucket);
    fn did_render(&self, bucket: Bucket, bounds: &Bounds);
    fn will_destroy(&self, bucket: Bucket);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "bucket", rename_all = "kebab-case")]
pub enum RenderTreeEvent {
    Create(Bucket),
    Update(Bucket),
    DidRender(Bucket),
    WillDestroy(Bucket),
}

/// Serializable view of a live render-tree node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderNodeSnapshot {
    pub kind: RenderNodeType,
    pub name: String,
    pub args: Vec<(String, String)>,
    pub template: Option<u32>,
    pub bounds: Option<Bounds>,
    pub updates: u32,
}

struct RecordedNode {
    node: RenderNode,
    bounds: Option<Bounds>,
    updates: u32,
}

/// Render tree that records every notification, for tests and tooling
#[derive(Default)]
pub struct RecordingRenderTree {
    events: RefCell<Vec<RenderTreeEvent>>,
    nodes: RefCell<IndexMap<Bucket, RecordedNode>>,
}

impl RecordingRenderTree {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn events(&self) -> Vec<RenderTreeEvent> {
        self.events.borrow().clone()
    }

    pub fn live_nodes(&self) -> usize {
        self.nodes.borrow().len()
    }

    /// Live nodes in creation order, with argument values rendered as text
    pub fn snapshot(&self) -> Vec<RenderNodeSnapshot> {
        self.nodes
            .borrow()
            .values()
            .map(|recorded| RenderNodeSnapshot {
                kind: recorded.node.kind,
                name: recorded.node.name.clone(),
                args: recorded
                    .node
                    .args
                    .named_values()
                    .into_iter()
                    .map(|(name, value)| (name.to_string(), value.to_display_string()))
                    .collect(),
                template: recorded.node.template,
                bounds: recorded.bounds,
                updates: recorded.updates,
            })
            .collect()
    }
}

impl DebugRenderTree for RecordingRenderTree {
    fn create(&self, bucket: Bucket, node: RenderNode) {
        log::trace!("render tree: create {} ({:?})", node.name, bucket);
        self.events.borrow_mut().push(RenderTreeEvent::Create(bucket));
        self.nodes.borrow_mut().insert(
            bucket,
            RecordedNode {
                node,
                bounds: None,
                updates: 0,
            },
        );
    }

    fn update(&self, bucket: Bucket) {
        self.events.borrow_mut().push(RenderTreeEvent::Update(bucket));
        if let Some(recorded) = self.nodes.borrow_mut().get_mut(&bucket) {
            recorded.updates += 1;
        }
    }

    fn did_render(&self, bucket: Bucket, bounds: &Bounds) {
        self.events.borrow_mut().push(RenderTreeEvent::DidRender(bucket));
        if let Some(recorded) = self.nodes.borrow_mut().get_mut(&bucket) {
            recorded.bounds = Some(*bounds);
        }
    }

    fn will_destroy(&self, bucket: Bucket) {
        self.events.borrow_mut().push(RenderTreeEvent::WillDestroy(bucket));
        self.nodes.borrow_mut().shift_remove(&bucket);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::references::primitive_ref;
    use crate::tree::NodeId;

    #[test]
    fn records_lifecycle_and_snapshots_live_nodes() {
        let tree = RecordingRenderTree::new();
        let bucket = Bucket::new();
        tree.create(
            bucket,
            RenderNode {
                kind: RenderNodeType::Component,
                name: "Greeting".into(),
                args: CapturedArguments::new().with_named("name", primitive_ref("Ada")),
                template: Some(4),
                instance: Value::Undefined,
            },
        );
        let bounds = Bounds {
            parent: NodeId(0),
            first: Some(NodeId(1)),
            last: Some(NodeId(1)),
        };
        tree.did_render(bucket, &bounds);
        tree.update(bucket);

        let snapshot = tree.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].args, vec![("name".to_string(), "Ada".to_string())]);
        assert_eq!(snapshot[0].updates, 1);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json[0]["kind"], "component");
        assert_eq!(json[0]["bounds"]["first"], 1);

        tree.will_destroy(bucket);
        assert_eq!(tree.live_nodes(), 0);
        assert_eq!(
            tree.events(),
            vec![
                RenderTreeEvent::Create(bucket),
                RenderTreeEvent::DidRender(bucket),
                RenderTreeEvent::Update(bucket),
                RenderTreeEvent::WillDestroy(bucket),
            ]
        );
    }
}
