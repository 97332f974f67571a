//! Updating ops and the VM that replays them.
//!
//! Every component invocation records its ops inside a cache group:
//! `JumpIfNotModified` guards the group and `EndTrackFrame` closes it. When
//! nothing the group read has changed since the last pass, the whole group
//! is skipped.
//!
//! Resumable blocks nest their own op list. An `AssertSame` inside one that
//! sees a new identity tears the block down and renders it again from the
//! program.

use std::fmt;
use std::rc::Rc;

use stencil_reactive::{
    Reference, Revision, Tag, begin_track_frame, consume_tag, end_track_frame, frame_depth, truncate_frames,
    validate_tag, value_for_ref, value_for_tag,
};

use super::Vm;
use crate::arguments::CapturedArguments;
use crate::destroyables::DestroyableId;
use crate::environment::Environment;
use crate::error::{Result, RuntimeError};
use crate::manager::InternalComponentManager;
use crate::program::Program;
use crate::render_tree::Bucket;
use crate::resolver::RuntimeResolver;
use crate::scope::{DynamicScope, Scope};
use crate::state::InstanceState;
use crate::tree::{AttributeId, Bounds, NodeId, TreeConstruction};
use crate::value::Value;

/// A rendered region that can be thrown away and rendered again
pub struct TryBlock {
    /// Program counter of the `Enter` that opened the block
    pub(crate) pc: usize,
    pub(crate) scope: Scope,
    pub(crate) dynamic_scope: DynamicScope,
    /// Destroyable the block's own destroyable hangs off
    pub(crate) parent: DestroyableId,
    pub(crate) destroyable: DestroyableId,
    pub(crate) bounds: Bounds,
    pub(crate) ops: Vec<UpdatingOp>,
}

pub enum UpdatingOp {
    /// Skip to `target` while `tag` is still valid at `snapshot`
    JumpIfNotModified { tag: Tag, snapshot: Revision, target: usize },
    BeginTrackFrame,
    /// Closes the group guarded by the op at `guard`
    EndTrackFrame { guard: usize },
    UpdateComponent {
        manager: Rc<dyn InternalComponentManager>,
        state: InstanceState,
        dynamic_scope: Option<DynamicScope>,
        args: Option<CapturedArguments>,
    },
    DidUpdateLayout {
        manager: Rc<dyn InternalComponentManager>,
        state: InstanceState,
        bounds: Bounds,
    },
    /// Reset the enclosing block once `reference` no longer holds `last`
    AssertSame { reference: Reference<Value>, last: Value },
    Try(Box<TryBlock>),
    DebugRenderTreeUpdate { bucket: Bucket },
    DebugRenderTreeDidRender { bucket: Bucket, bounds: Bounds },
    UpdateDynamicAttribute {
        attribute: AttributeId,
        reference: Reference<Value>,
        last: Value,
    },
    UpdateDynamicText {
        node: NodeId,
        reference: Reference<Value>,
        last: String,
    },
}

impl fmt::Debug for UpdatingOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::JumpIfNotModified { snapshot, target, .. } => f
                .debug_struct("JumpIfNotModified")
                .field("snapshot", snapshot)
                .field("target", target)
                .finish(),
            Self::BeginTrackFrame => f.write_str("BeginTrackFrame"),
            Self::EndTrackFrame { guard } => f.debug_struct("EndTrackFrame").field("guard", guard).finish(),
            Self::UpdateComponent { args, .. } => f
                .debug_struct("UpdateComponent")
                .field("args", &args.is_some())
                .finish_non_exhaustive(),
            Self::DidUpdateLayout { bounds, .. } => f
                .debug_struct("DidUpdateLayout")
                .field("bounds", bounds)
                .finish_non_exhaustive(),
            Self::AssertSame { last, .. } => f.debug_struct("AssertSame").field("last", last).finish_non_exhaustive(),
            Self::Try(block) => f
                .debug_struct("Try")
                .field("pc", &block.pc)
                .field("bounds", &block.bounds)
                .field("ops", &block.ops.len())
                .finish(),
            Self::DebugRenderTreeUpdate { bucket } => {
                f.debug_struct("DebugRenderTreeUpdate").field("bucket", bucket).finish()
            }
            Self::DebugRenderTreeDidRender { bucket, bounds } => f
                .debug_struct("DebugRenderTreeDidRender")
                .field("bucket", bucket)
                .field("bounds", bounds)
                .finish(),
            Self::UpdateDynamicAttribute { attribute, last, .. } => f
                .debug_struct("UpdateDynamicAttribute")
                .field("attribute", attribute)
                .field("last", last)
                .finish_non_exhaustive(),
            Self::UpdateDynamicText { node, last, .. } => f
                .debug_struct("UpdateDynamicText")
                .field("node", node)
                .field("last", last)
                .finish_non_exhaustive(),
        }
    }
}

/// What a rerender pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RerenderStats {
    pub evaluated: usize,
    pub skipped_groups: usize,
    /// Blocks torn down and rendered again
    pub reset_blocks: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Done,
    /// An assertion failed; unwind to the enclosing block
    Reset,
}

pub struct UpdatingVm<'a> {
    program: &'a Program,
    resolver: &'a dyn RuntimeResolver,
    env: &'a mut Environment,
    tree: &'a mut dyn TreeConstruction,
    stats: RerenderStats,
    /// Bounds of reset blocks, before and after
    moved: Vec<(Bounds, Bounds)>,
}

impl<'a> UpdatingVm<'a> {
    pub fn new(
        program: &'a Program,
        resolver: &'a dyn RuntimeResolver,
        env: &'a mut Environment,
        tree: &'a mut dyn TreeConstruction,
    ) -> Self {
        Self {
            program,
            resolver,
            env,
            tree,
            stats: RerenderStats::default(),
            moved: Vec::new(),
        }
    }

    /// Run `ops`. `bounds` encloses everything they update and is moved
    /// along with any block rendered again at its edges.
    pub fn execute(mut self, ops: &mut [UpdatingOp], bounds: &mut Bounds) -> Result<RerenderStats> {
        let depth = frame_depth();
        match self.run(ops) {
            Ok(Step::Done) => {
                follow_moves(bounds, &self.moved);
                Ok(self.stats)
            }
            Ok(Step::Reset) => {
                truncate_frames(depth);
                Err(RuntimeError::invariant("a component changed outside of a resumable block"))
            }
            Err(error) => {
                truncate_frames(depth);
                Err(error)
            }
        }
    }

    fn run(&mut self, ops: &mut [UpdatingOp]) -> Result<Step> {
        let mut pc = 0;
        while pc < ops.len() {
            log::trace!("update {pc:>5} {:?}", ops[pc]);
            self.stats.evaluated += 1;
            if let UpdatingOp::EndTrackFrame { guard } = ops[pc] {
                close_group(ops, guard)?;
                pc += 1;
                continue;
            }
            match &mut ops[pc] {
                UpdatingOp::JumpIfNotModified { tag, snapshot, target } => {
                    if validate_tag(tag, *snapshot) {
                        consume_tag(tag);
                        self.stats.skipped_groups += 1;
                        pc = *target;
                        continue;
                    }
                }
                UpdatingOp::BeginTrackFrame => begin_track_frame(),
                // closed above
                UpdatingOp::EndTrackFrame { .. } => {}
                UpdatingOp::UpdateComponent {
                    manager,
                    state,
                    dynamic_scope,
                    args,
                } => {
                    if let Some(args) = args {
                        for reference in &args.positional {
                            value_for_ref(reference);
                        }
                        for (_, reference) in &args.named {
                            value_for_ref(reference);
                        }
                    }
                    manager.update(state, dynamic_scope.as_ref())?;
                }
                UpdatingOp::DidUpdateLayout { manager, state, bounds } => {
                    manager.did_update_layout(state, bounds)?;
                    // queued after the children's layouts, so children commit first
                    self.env.did_update(Rc::clone(manager), state.clone())?;
                }
                UpdatingOp::AssertSame { reference, last } => {
                    if !value_for_ref(reference).same_identity(last) {
                        return Ok(Step::Reset);
                    }
                }
                UpdatingOp::Try(block) => self.run_try(block)?,
                UpdatingOp::DebugRenderTreeUpdate { bucket } => {
                    if let Some(tree) = self.env.debug_render_tree() {
                        tree.update(*bucket);
                    }
                }
                UpdatingOp::DebugRenderTreeDidRender { bucket, bounds } => {
                    if let Some(tree) = self.env.debug_render_tree() {
                        tree.did_render(*bucket, bounds);
                    }
                }
                UpdatingOp::UpdateDynamicAttribute {
                    attribute,
                    reference,
                    last,
                } => {
                    let value = value_for_ref(reference);
                    if value != *last {
                        self.tree.update_attribute(*attribute, &value);
                        *last = value;
                    }
                }
                UpdatingOp::UpdateDynamicText { node, reference, last } => {
                    let text = self.env.display_text(&value_for_ref(reference));
                    if text != *last {
                        self.tree.update_text(*node, &text);
                        *last = text;
                    }
                }
            }
            pc += 1;
        }
        Ok(Step::Done)
    }

    fn run_try(&mut self, block: &mut TryBlock) -> Result<()> {
        let depth = frame_depth();
        if self.run(&mut block.ops)? == Step::Done {
            follow_moves(&mut block.bounds, &self.moved);
            return Ok(());
        }
        truncate_frames(depth);
        self.reset(block)
    }

    /// Destroy what the block rendered and render it again in place.
    fn reset(&mut self, block: &mut TryBlock) -> Result<()> {
        log::debug!("re-rendering the block entered at {}", block.pc);
        let next = block.bounds.last.and_then(|last| self.tree.next_sibling(last));
        self.tree.remove(&block.bounds);
        self.env.destroy(block.destroyable)?;

        self.tree.push_insertion_point(block.bounds.parent, next);
        let resumed = Vm::new(
            self.program,
            &mut *self.env,
            self.resolver,
            &mut *self.tree,
            block.parent,
            block.dynamic_scope.clone(),
        )
        .resume(block.pc, block.scope.clone());
        self.tree.pop_insertion_point();

        let resumed = resumed?;
        self.moved.push((block.bounds, resumed.bounds));
        *block = resumed;
        self.stats.reset_blocks += 1;
        Ok(())
    }
}

/// Re-point the edges of `bounds` that sat on a block rendered again.
fn follow_moves(bounds: &mut Bounds, moved: &[(Bounds, Bounds)]) {
    for (old, new) in moved {
        if old.first.is_some() && bounds.first == old.first {
            bounds.first = new.first;
        }
        if old.last.is_some() && bounds.last == old.last {
            bounds.last = new.last;
        }
    }
}

/// End the group's tracking frame and re-arm its guard with what it read.
fn close_group(ops: &mut [UpdatingOp], guard: usize) -> Result<()> {
    let tag = end_track_frame()?;
    consume_tag(&tag);
    match ops.get_mut(guard) {
        Some(UpdatingOp::JumpIfNotModified { tag: guarded, snapshot, .. }) => {
            *snapshot = value_for_tag(&tag);
            *guarded = tag;
            Ok(())
        }
        _ => Err(RuntimeError::invariant(format!("op {guard} does not guard a cache group"))),
    }
}
