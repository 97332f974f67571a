//! Component instances.
//!
//! One [`ComponentInstance`] exists per invocation. It only moves forward
//! through its phases: a curried or dynamic invocation starts `Initial`
//! and becomes `Populated` once its definition is resolved, a static one
//! starts `Populated`. Attaching the layout makes it `Finished`, and
//! teardown makes it `Destroyed`.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::arguments::CapturedArguments;
use crate::capabilities::CapabilityFlags;
use crate::checks::CHECKED;
use crate::curry::CurriedComponentDefinition;
use crate::destroyables::DestroyableId;
use crate::error::{Result, RuntimeError};
use crate::layout::CompiledLayout;
use crate::manager::{ComponentDefinition, InternalComponentManager};
use crate::render_tree::Bucket;
use crate::scope::EvalLookup;
use crate::state::InstanceState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum InstancePhase {
    Initial,
    Populated,
    Finished,
    Destroyed,
}

#[derive(Debug, Clone)]
pub enum InstanceDefinition {
    Concrete(ComponentDefinition),
    Curried(CurriedComponentDefinition),
}

pub struct ComponentInstance {
    bucket: Bucket,
    phase: InstancePhase,
    definition: InstanceDefinition,
    capabilities: CapabilityFlags,
    state: Option<InstanceState>,
    layout: Option<CompiledLayout>,
    lookup: Option<EvalLookup>,
    args: Option<CapturedArguments>,
    destroyable: Option<DestroyableId>,
    render_buckets: Vec<Bucket>,
}

pub type InstanceRef = Rc<RefCell<ComponentInstance>>;

impl ComponentInstance {
    pub fn new(definition: InstanceDefinition) -> Self {
        let (phase, capabilities) = match &definition {
            InstanceDefinition::Concrete(concrete) => (InstancePhase::Populated, concrete.capabilities()),
            InstanceDefinition::Curried(_) => (InstancePhase::Initial, CapabilityFlags::empty()),
        };
        Self {
            bucket: Bucket::new(),
            phase,
            definition,
            capabilities,
            state: None,
            layout: None,
            lookup: None,
            args: None,
            destroyable: None,
            render_buckets: Vec::new(),
        }
    }

    pub fn into_ref(self) -> InstanceRef {
        Rc::new(RefCell::new(self))
    }

    pub fn bucket(&self) -> Bucket {
        self.bucket
    }

    pub fn phase(&self) -> InstancePhase {
        self.phase
    }

    fn advance(&mut self, next: InstancePhase) -> Result<()> {
        if CHECKED && next < self.phase {
            return Err(RuntimeError::invariant(format!(
                "component instance cannot move from {:?} back to {next:?}",
                self.phase
            )));
        }
        log::debug!("instance {}: {:?} -> {next:?}", self.name(), self.phase);
        self.phase = next;
        Ok(())
    }

    fn require(&self, phase: InstancePhase, action: &str) -> Result<()> {
        if self.phase != phase {
            return Err(RuntimeError::invariant(format!(
                "cannot {action} a component instance in phase {:?}",
                self.phase
            )));
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        match &self.definition {
            InstanceDefinition::Concrete(definition) => definition.name(),
            InstanceDefinition::Curried(_) => "(curried)",
        }
    }

    pub fn definition(&self) -> &InstanceDefinition {
        &self.definition
    }

    /// The resolved definition; only available from `Populated` on
    pub fn concrete_definition(&self) -> Result<&ComponentDefinition> {
        match &self.definition {
            InstanceDefinition::Concrete(definition) => Ok(definition),
            InstanceDefinition::Curried(_) => Err(RuntimeError::invariant(
                "component instance has not been resolved to a definition",
            )),
        }
    }

    pub fn manager(&self) -> Result<Rc<dyn InternalComponentManager>> {
        Ok(Rc::clone(self.concrete_definition()?.manager()))
    }

    /// Replace a curried definition with the one it resolved to
    pub fn resolve(&mut self, definition: ComponentDefinition) -> Result<()> {
        self.require(InstancePhase::Initial, "resolve")?;
        self.capabilities = definition.capabilities();
        self.definition = InstanceDefinition::Concrete(definition);
        self.advance(InstancePhase::Populated)
    }

    pub fn capabilities(&self) -> CapabilityFlags {
        self.capabilities
    }

    pub fn has(&self, capability: CapabilityFlags) -> bool {
        self.capabilities.contains(capability)
    }

    pub fn set_state(&mut self, state: InstanceState) -> Result<()> {
        self.require(InstancePhase::Populated, "create state for")?;
        self.state = Some(state);
        Ok(())
    }

    pub fn state(&self) -> Option<&InstanceState> {
        self.state.as_ref()
    }

    pub fn populate_layout(&mut self, layout: CompiledLayout) -> Result<()> {
        self.require(InstancePhase::Populated, "populate the layout of")?;
        self.layout = Some(layout);
        self.advance(InstancePhase::Finished)
    }

    pub fn layout(&self) -> Result<&CompiledLayout> {
        self.layout
            .as_ref()
            .ok_or_else(|| RuntimeError::invariant(format!("component {} has no layout yet", self.name())))
    }

    pub fn is_finished(&self) -> bool {
        self.phase == InstancePhase::Finished
    }

    pub fn set_lookup(&mut self, lookup: EvalLookup) {
        self.lookup = Some(lookup);
    }

    pub fn lookup(&self) -> Option<&EvalLookup> {
        self.lookup.as_ref()
    }

    pub fn set_args(&mut self, args: CapturedArguments) {
        self.args = Some(args);
    }

    pub fn args(&self) -> Option<&CapturedArguments> {
        self.args.as_ref()
    }

    pub fn set_destroyable(&mut self, id: DestroyableId) {
        self.destroyable = Some(id);
    }

    pub fn destroyable(&self) -> Option<DestroyableId> {
        self.destroyable
    }

    /// Buckets this instance reported to the debug render tree
    pub fn render_buckets(&self) -> &[Bucket] {
        &self.render_buckets
    }

    pub fn add_render_bucket(&mut self, bucket: Bucket) {
        self.render_buckets.push(bucket);
    }

    /// Release the manager state; the instance is never used again.
    pub fn mark_destroyed(&mut self) -> Result<()> {
        self.state = None;
        self.lookup = None;
        self.advance(InstancePhase::Destroyed)
    }
}

impl fmt::Debug for ComponentInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("name", &self.name())
            .field("phase", &self.phase)
            .field("capabilities", &self.capabilities)
            .field("layout", &self.layout.as_ref().map(|layout| layout.handle))
            .finish()
    }
}
