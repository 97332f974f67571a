//! In-memory host implementations for tests and benchmarks.
//!
//! [`MemoryTree`] is a minimal [`TreeConstruction`] that keeps nodes in a
//! vector and can serialize itself to markup for assertions.
//! [`ScriptedManager`] and [`RecordingModifier`] append every hook they
//! receive to a shared [`CallLog`].

use std::cell::RefCell;
use std::rc::Rc;

use stencil_reactive::{Reference, value_for_ref};

use crate::arguments::{CapturedArguments, PreparedArguments, VmArguments};
use crate::capabilities::{CapabilityFlags, ComponentCapabilities};
use crate::element_operations::ComponentElementOperations;
use crate::helper::ModifierManager;
use crate::layout::{CompiledLayout, Template};
use crate::manager::{ComponentManager, CreateRequest, Destroyable};
use crate::references::undefined_ref;
use crate::resolver::RuntimeResolver;
use crate::scope::DynamicScope;
use crate::tree::{AttributeId, Bounds, NodeId, TreeConstruction};
use crate::value::{ObjectValue, Value};

#[derive(Debug, Clone)]
enum NodeKind {
    Root,
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
    },
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct MemoryNode {
    kind: NodeKind,
    parent: NodeId,
    children: Vec<NodeId>,
}

/// Where new nodes go: appended to `parent`, or inserted before `before`
#[derive(Debug, Clone, Copy)]
struct Cursor {
    parent: NodeId,
    before: Option<NodeId>,
}

/// Vector-backed output tree
#[derive(Debug, Clone)]
pub struct MemoryTree {
    nodes: Vec<MemoryNode>,
    stack: Vec<Cursor>,
    attributes: Vec<(NodeId, String)>,
    text_updates: usize,
    attribute_updates: usize,
}

impl Default for MemoryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTree {
    pub const ROOT: NodeId = NodeId(0);

    pub fn new() -> Self {
        Self {
            nodes: vec![MemoryNode {
                kind: NodeKind::Root,
                parent: Self::ROOT,
                children: Vec::new(),
            }],
            stack: Vec::new(),
            attributes: Vec::new(),
            text_updates: 0,
            attribute_updates: 0,
        }
    }

    fn cursor(&self) -> Cursor {
        self.stack.last().copied().unwrap_or(Cursor {
            parent: Self::ROOT,
            before: None,
        })
    }

    fn push_node(&mut self, kind: NodeKind) -> NodeId {
        let Cursor { parent, before } = self.cursor();
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(MemoryNode {
            kind,
            parent,
            children: Vec::new(),
        });
        let children = &mut self.nodes[parent.0 as usize].children;
        match before.and_then(|before| children.iter().position(|child| *child == before)) {
            Some(index) => children.insert(index, id),
            None => children.push(id),
        }
        id
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut MemoryNode> {
        self.nodes.get_mut(id.0 as usize)
    }

    fn write_attribute(&mut self, element: NodeId, name: &str, value: Option<String>) {
        if let Some(MemoryNode {
            kind: NodeKind::Element { attributes, .. },
            ..
        }) = self.node_mut(element)
        {
            let existing = attributes.iter().position(|(key, _)| key == name);
            match (existing, value) {
                (Some(index), Some(value)) => attributes[index].1 = value,
                (Some(index), None) => {
                    attributes.remove(index);
                }
                (None, Some(value)) => attributes.push((name.to_string(), value)),
                (None, None) => {}
            }
        }
    }

    fn attribute_text(value: &Value) -> Option<String> {
        match value {
            Value::Undefined | Value::Null | Value::Bool(false) => None,
            Value::Bool(true) => Some(String::new()),
            other => Some(other.to_display_string()),
        }
    }

    /// Serialize everything under the root to markup
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for child in &self.nodes[0].children {
            self.write_html(*child, &mut out);
        }
        out
    }

    fn write_html(&self, id: NodeId, out: &mut String) {
        let node = &self.nodes[id.0 as usize];
        match &node.kind {
            NodeKind::Root => {}
            NodeKind::Text(text) => out.push_str(text),
            NodeKind::Comment(data) => out.push_str(&format!("<!--{data}-->")),
            NodeKind::Element { tag, attributes } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attributes {
                    out.push_str(&format!(" {name}=\"{value}\""));
                }
                out.push('>');
                for child in &node.children {
                    self.write_html(*child, out);
                }
                out.push_str(&format!("</{tag}>"));
            }
        }
    }

    pub fn attribute(&self, element: NodeId, name: &str) -> Option<&str> {
        match &self.nodes.get(element.0 as usize)?.kind {
            NodeKind::Element { attributes, .. } => attributes
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str()),
            _ => None,
        }
    }

    /// Number of in-place text updates the tree received
    pub fn text_updates(&self) -> usize {
        self.text_updates
    }

    pub fn attribute_updates(&self) -> usize {
        self.attribute_updates
    }
}

impl TreeConstruction for MemoryTree {
    fn current_parent(&self) -> NodeId {
        self.cursor().parent
    }

    fn open_element(&mut self, tag: &str) -> NodeId {
        self.push_node(NodeKind::Element {
            tag: tag.to_string(),
            attributes: Vec::new(),
        })
    }

    fn set_static_attribute(&mut self, element: NodeId, name: &str, value: &str, _namespace: Option<&str>) {
        self.write_attribute(element, name, Some(value.to_string()));
    }

    fn set_dynamic_attribute(
        &mut self,
        element: NodeId,
        name: &str,
        value: &Value,
        _trusting: bool,
        _namespace: Option<&str>,
    ) -> AttributeId {
        self.write_attribute(element, name, Self::attribute_text(value));
        self.attributes.push((element, name.to_string()));
        AttributeId(self.attributes.len() as u32 - 1)
    }

    fn update_attribute(&mut self, attribute: AttributeId, value: &Value) {
        if let Some((element, name)) = self.attributes.get(attribute.0 as usize).cloned() {
            self.attribute_updates += 1;
            self.write_attribute(element, &name, Self::attribute_text(value));
        }
    }

    fn flush_element(&mut self, element: NodeId) {
        self.stack.push(Cursor {
            parent: element,
            before: None,
        });
    }

    fn close_element(&mut self) {
        self.stack.pop();
    }

    fn append_text(&mut self, text: &str) -> NodeId {
        self.push_node(NodeKind::Text(text.to_string()))
    }

    fn update_text(&mut self, node: NodeId, text: &str) {
        if let Some(MemoryNode {
            kind: NodeKind::Text(current),
            ..
        }) = self.nodes.get_mut(node.0 as usize)
        {
            *current = text.to_string();
        } else {
            return;
        }
        self.text_updates += 1;
    }

    fn append_comment(&mut self, data: &str) -> NodeId {
        self.push_node(NodeKind::Comment(data.to_string()))
    }

    fn remove(&mut self, bounds: &Bounds) {
        let (Some(first), Some(last)) = (bounds.first, bounds.last) else {
            return;
        };
        let Some(parent) = self.node_mut(bounds.parent) else {
            return;
        };
        let start = parent.children.iter().position(|child| *child == first);
        let end = parent.children.iter().position(|child| *child == last);
        if let (Some(start), Some(end)) = (start, end) {
            parent.children.drain(start..=end);
        }
    }

    fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.nodes.get(node.0 as usize)?.parent;
        let siblings = &self.nodes.get(parent.0 as usize)?.children;
        let index = siblings.iter().position(|child| *child == node)?;
        siblings.get(index + 1).copied()
    }

    fn push_insertion_point(&mut self, parent: NodeId, next_sibling: Option<NodeId>) {
        self.stack.push(Cursor {
            parent,
            before: next_sibling,
        });
    }

    fn pop_insertion_point(&mut self) {
        self.stack.pop();
    }
}

/// Hook calls in the order they happened
pub type CallLog = Rc<RefCell<Vec<String>>>;

fn record(log: &CallLog, entry: String) {
    log::trace!("{entry}");
    log.borrow_mut().push(entry);
}

/// `name=value` pairs sorted by name, or `-` when there are none
fn describe_args(args: &CapturedArguments) -> String {
    let mut named = args.named_values();
    if named.is_empty() {
        return "-".to_string();
    }
    named.sort_by(|(a, _), (b, _)| a.cmp(b));
    named
        .iter()
        .map(|(name, value)| format!("{name}={}", value.to_display_string()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Rewrites invocation arguments before the instance is created
pub type PrepareArgs = Box<dyn Fn(&VmArguments) -> Option<PreparedArguments>>;

pub struct ScriptedDefinition {
    pub name: String,
    pub layout: Template,
    pub tag_name: Option<String>,
    pub destructor: bool,
    pub will_destroy: bool,
    pub prepare_args: Option<PrepareArgs>,
}

impl ScriptedDefinition {
    pub fn new(name: &str, layout: CompiledLayout) -> Self {
        Self {
            name: name.to_string(),
            layout: Template::new(layout),
            tag_name: None,
            destructor: false,
            will_destroy: false,
            prepare_args: None,
        }
    }

    pub fn with_prepare_args(
        mut self,
        prepare: impl Fn(&VmArguments) -> Option<PreparedArguments> + 'static,
    ) -> Self {
        self.prepare_args = Some(Box::new(prepare));
        self
    }

    pub fn with_tag_name(mut self, tag_name: &str) -> Self {
        self.tag_name = Some(tag_name.to_string());
        self
    }

    pub fn with_destructor(mut self) -> Self {
        self.destructor = true;
        self
    }

    pub fn with_will_destroy(mut self) -> Self {
        self.destructor = true;
        self.will_destroy = true;
        self
    }
}

pub struct ScriptedInstance {
    name: String,
    layout: Template,
    tag_name: Option<String>,
    destructor: bool,
    will_destroy: bool,
    this: Rc<ObjectValue>,
}

/// Component manager that logs every hook it receives.
///
/// `CAPS` is a raw [`CapabilityFlags`] bit set. Named arguments received at
/// creation become fields of the instance's `this`.
pub struct ScriptedManager<const CAPS: u32> {
    log: CallLog,
}

impl<const CAPS: u32> ScriptedManager<CAPS> {
    pub fn new(log: &CallLog) -> Rc<Self> {
        Rc::new(Self { log: Rc::clone(log) })
    }

    fn record_scope(&self, name: &str, dynamic_scope: Option<&DynamicScope>) {
        if dynamic_scope.is_some() {
            record(&self.log, format!("dynamic_scope {name}"));
        }
    }
}

impl<const CAPS: u32> ComponentManager for ScriptedManager<CAPS> {
    type Definition = ScriptedDefinition;
    type Instance = ScriptedInstance;

    const CAPABILITIES: ComponentCapabilities =
        ComponentCapabilities::from_flags(CapabilityFlags::from_bits_retain(CAPS));

    fn debug_name(&self, definition: &ScriptedDefinition) -> String {
        definition.name.clone()
    }

    fn prepare_args(&self, definition: &ScriptedDefinition, args: &VmArguments) -> Option<PreparedArguments> {
        let prepare = definition.prepare_args.as_ref()?;
        let prepared = prepare(args);
        let outcome = if prepared.is_some() { "rewrite" } else { "keep" };
        record(&self.log, format!("prepare_args {} {outcome}", definition.name));
        prepared
    }

    fn create(&self, definition: &ScriptedDefinition, request: CreateRequest<'_>) -> ScriptedInstance {
        let this = Rc::new(ObjectValue::new());
        let args = match request.args {
            Some(args) => {
                let captured = args.capture();
                for (name, value) in captured.named_values() {
                    this.set(&name, value);
                }
                describe_args(&captured)
            }
            None => "-".to_string(),
        };
        record(&self.log, format!("create {} {args}", definition.name));
        self.record_scope(&definition.name, request.dynamic_scope);
        if let Some(caller) = request.caller {
            let caller = value_for_ref(caller);
            record(&self.log, format!("caller {} {}", definition.name, caller.type_name()));
        }
        ScriptedInstance {
            name: definition.name.clone(),
            layout: definition.layout.clone(),
            tag_name: definition.tag_name.clone(),
            destructor: definition.destructor,
            will_destroy: definition.will_destroy,
            this,
        }
    }

    fn update(&self, instance: &mut ScriptedInstance, dynamic_scope: Option<&DynamicScope>) {
        record(&self.log, format!("update {}", instance.name));
        self.record_scope(&instance.name, dynamic_scope);
    }

    fn did_create(&self, instance: &mut ScriptedInstance) {
        record(&self.log, format!("did_create {}", instance.name));
    }

    fn did_update(&self, instance: &mut ScriptedInstance) {
        record(&self.log, format!("did_update {}", instance.name));
    }

    fn did_render_layout(&self, instance: &mut ScriptedInstance, _bounds: &Bounds) {
        record(&self.log, format!("did_render_layout {}", instance.name));
    }

    fn did_update_layout(&self, instance: &mut ScriptedInstance, _bounds: &Bounds) {
        record(&self.log, format!("did_update_layout {}", instance.name));
    }

    fn did_create_element(
        &self,
        instance: &mut ScriptedInstance,
        _element: NodeId,
        operations: &mut ComponentElementOperations,
    ) {
        record(&self.log, format!("did_create_element {}", instance.name));
        operations.set_static_attribute("data-component", &instance.name, None);
    }

    fn get_self(&self, instance: Option<&ScriptedInstance>) -> Reference<Value> {
        match instance {
            Some(instance) => Reference::constant(Value::Object(Rc::clone(&instance.this))),
            None => undefined_ref(),
        }
    }

    fn get_tag_name(&self, instance: Option<&ScriptedInstance>) -> Option<String> {
        instance.and_then(|instance| instance.tag_name.clone())
    }

    fn get_static_layout(&self, definition: &ScriptedDefinition) -> Option<Template> {
        Some(definition.layout.clone())
    }

    fn get_dynamic_layout(
        &self,
        instance: Option<&ScriptedInstance>,
        _resolver: &dyn RuntimeResolver,
    ) -> Option<Template> {
        instance.map(|instance| instance.layout.clone())
    }

    fn get_destroyable(&self, instance: &ScriptedInstance) -> Option<Destroyable> {
        if !instance.destructor {
            return None;
        }
        let (log, name) = (Rc::clone(&self.log), instance.name.clone());
        let mut destroyable = Destroyable::new(move || record(&log, format!("destroy {name}")));
        if instance.will_destroy {
            let (log, name) = (Rc::clone(&self.log), instance.name.clone());
            destroyable = destroyable.with_will_destroy(move || record(&log, format!("will_destroy {name}")));
        }
        Some(destroyable)
    }
}

/// Modifier that logs its lifecycle together with its first positional argument
pub struct RecordingModifier {
    log: CallLog,
}

impl RecordingModifier {
    pub fn new(log: &CallLog) -> Self {
        Self { log: Rc::clone(log) }
    }
}

pub struct RecordingModifierState {
    element: NodeId,
    args: CapturedArguments,
    log: CallLog,
}

impl RecordingModifierState {
    fn first(&self) -> String {
        self.args
            .positional_value(0)
            .map(|value| value.to_display_string())
            .unwrap_or_default()
    }
}

impl ModifierManager for RecordingModifier {
    type State = RecordingModifierState;

    fn create(&self, element: NodeId, args: &CapturedArguments) -> RecordingModifierState {
        RecordingModifierState {
            element,
            args: args.clone(),
            log: Rc::clone(&self.log),
        }
    }

    fn install(&self, state: &mut RecordingModifierState) {
        let entry = format!("install {} {}", state.element.0, state.first());
        record(&state.log, entry);
    }

    fn update(&self, state: &mut RecordingModifierState) {
        let entry = format!("update {} {}", state.element.0, state.first());
        record(&state.log, entry);
    }

    fn destroy(&self, state: &mut RecordingModifierState) {
        record(&state.log, format!("destroy {}", state.element.0));
    }
}
