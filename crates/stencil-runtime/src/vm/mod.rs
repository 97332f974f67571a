//! The append VM.
//!
//! [`Vm`] executes a [`Program`] once, building output through an
//! [`ElementBuilder`] and recording [`UpdatingOp`]s for everything that may
//! change later. Later passes replay only those ops through
//! [`UpdatingVm`].
//!
//! The machine has an operand stack, five registers, a lexical scope stack,
//! a dynamic scope stack and a call-frame stack. Component invocations keep
//! their instance in `S0` for the duration of the invocation.

mod component;
mod updating;

use std::rc::Rc;

use stencil_reactive::{Reference, frame_depth, is_const_ref, truncate_frames, value_for_ref};

pub use updating::{RerenderStats, TryBlock, UpdatingOp, UpdatingVm};

use crate::arguments::{CapturedArguments, VmArguments};
use crate::destroyables::DestroyableId;
use crate::effects::{Effect, ModifierEffect};
use crate::element_operations::ComponentElementOperations;
use crate::environment::Environment;
use crate::error::{Result, RuntimeError};
use crate::helper::ModifierDefinition;
use crate::instance::{InstanceDefinition, InstanceRef};
use crate::layout::CompiledLayout;
use crate::program::{Op, Program, Register};
use crate::references::{child_ref_for, null_ref};
use crate::resolver::{RuntimeResolver, resolve_helper_handle, resolve_modifier_handle};
use crate::scope::{DynamicScope, Scope, ScopeBlock};
use crate::tree::{Bounds, ElementBuilder, TreeConstruction};
use crate::value::Value;

/// Anything the operand stack or a register can hold
#[derive(Debug, Clone, Default)]
pub(crate) enum StackValue {
    #[default]
    Empty,
    Ref(Reference<Value>),
    Block(Option<ScopeBlock>),
    Definition(InstanceDefinition),
    Instance(InstanceRef),
    Args(VmArguments),
    Captured(CapturedArguments),
    Invocation(CompiledLayout),
}

impl StackValue {
    fn kind_name(&self) -> &'static str {
        match self {
            Self::Empty => "nothing",
            Self::Ref(_) => "reference",
            Self::Block(_) => "block",
            Self::Definition(_) => "definition",
            Self::Instance(_) => "component instance",
            Self::Args(_) => "arguments",
            Self::Captured(_) => "captured arguments",
            Self::Invocation(_) => "layout",
        }
    }
}

fn unexpected(expected: &str, found: &StackValue) -> RuntimeError {
    RuntimeError::invariant(format!("expected {expected} on the stack, found {}", found.kind_name()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    /// Returning from it ends the run
    Root,
    Layout,
    /// Returning pops the block's scope and output block
    Yield,
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    ra: usize,
    kind: FrameKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Halt,
}

/// A block between `Enter` and its `Exit`. The updating ops and cache
/// groups of the enclosing code wait here until the block closes.
struct OpenTry {
    pc: usize,
    scope: Scope,
    dynamic_scope: DynamicScope,
    parent: DestroyableId,
    destroyable: DestroyableId,
    outer_updating: Vec<UpdatingOp>,
    outer_cache_groups: Vec<usize>,
}

pub struct Vm<'a> {
    program: &'a Program,
    env: &'a mut Environment,
    resolver: &'a dyn RuntimeResolver,
    builder: ElementBuilder<'a>,
    pc: usize,
    frames: Vec<Frame>,
    stack: Vec<StackValue>,
    registers: [StackValue; Register::COUNT],
    scopes: Vec<Scope>,
    dynamic_scopes: Vec<DynamicScope>,
    updating: Vec<UpdatingOp>,
    cache_groups: Vec<usize>,
    destroyables: Vec<DestroyableId>,
    element_operations: Option<ComponentElementOperations>,
    pending_modifiers: Vec<(ModifierDefinition, CapturedArguments)>,
    tries: Vec<OpenTry>,
    /// Set while rendering a single block again; its `Exit` ends the run
    resumed: Option<Option<TryBlock>>,
}

impl<'a> Vm<'a> {
    pub fn new(
        program: &'a Program,
        env: &'a mut Environment,
        resolver: &'a dyn RuntimeResolver,
        tree: &'a mut dyn TreeConstruction,
        root: DestroyableId,
        dynamic_scope: DynamicScope,
    ) -> Self {
        Self {
            program,
            env,
            resolver,
            builder: ElementBuilder::new(tree),
            pc: 0,
            frames: Vec::new(),
            stack: Vec::new(),
            registers: Default::default(),
            scopes: Vec::new(),
            dynamic_scopes: vec![dynamic_scope],
            updating: Vec::new(),
            cache_groups: Vec::new(),
            destroyables: vec![root],
            element_operations: None,
            pending_modifiers: Vec::new(),
            tries: Vec::new(),
            resumed: None,
        }
    }

    pub fn push_scope(&mut self, scope: Scope) {
        self.scopes.push(scope);
    }

    pub(crate) fn push(&mut self, value: StackValue) {
        self.stack.push(value);
    }

    /// Run the routine at `handle` until it returns. Yields the updating
    /// ops it recorded and the bounds of everything it rendered.
    pub fn execute(mut self, handle: u32) -> Result<(Vec<UpdatingOp>, Bounds)> {
        let depth = frame_depth();
        self.builder.push_block();
        self.frames.push(Frame {
            ra: 0,
            kind: FrameKind::Root,
        });
        self.pc = handle as usize;
        if let Err(error) = self.run() {
            truncate_frames(depth);
            return Err(error);
        }
        if !self.cache_groups.is_empty() || !self.tries.is_empty() {
            truncate_frames(depth);
            return Err(RuntimeError::invariant("program ended inside a component transaction"));
        }
        let bounds = self.builder.pop_block()?;
        Ok((self.updating, bounds))
    }

    /// Render the block entered at `pc` again, in `scope`. The VM must have
    /// been created with the block's parent destroyable and dynamic scope.
    pub fn resume(mut self, pc: usize, scope: Scope) -> Result<TryBlock> {
        let depth = frame_depth();
        self.scopes.push(scope);
        self.resumed = Some(None);
        self.pc = pc;
        if let Err(error) = self.run() {
            truncate_frames(depth);
            return Err(error);
        }
        self.resumed
            .take()
            .flatten()
            .ok_or_else(|| RuntimeError::invariant(format!("the block entered at {pc} never exited")))
    }

    fn run(&mut self) -> Result<()> {
        let program = self.program;
        loop {
            let pc = self.pc;
            let op = program
                .op(pc)
                .ok_or_else(|| RuntimeError::invariant(format!("program counter {pc} is outside the program")))?;
            self.pc += 1;
            log::trace!("{pc:>5} {op:?}");
            if self.evaluate(op)? == Flow::Halt {
                return Ok(());
            }
        }
    }

    fn evaluate(&mut self, op: &Op) -> Result<Flow> {
        match op {
            Op::Return => return self.return_from_frame(),
            Op::Pop { count } => {
                for _ in 0..*count {
                    self.pop()?;
                }
            }
            Op::Load(register) => {
                let value = self.pop()?;
                self.registers[register.index()] = value;
            }
            Op::Fetch(register) => {
                let value = self.registers[register.index()].clone();
                self.push(value);
            }
            Op::PushNull => self.push(StackValue::Ref(null_ref())),

            Op::Primitive { constant } => {
                let value = self.program.constants().get_value(*constant)?.clone();
                self.push(StackValue::Ref(Reference::constant(value)));
            }
            Op::GetVariable { slot } => {
                let reference = self.scope()?.get_symbol(*slot as usize);
                self.push(StackValue::Ref(reference));
            }
            Op::GetEvalVariable { name } => {
                let reference = self.scope()?.lookup(name);
                self.push(StackValue::Ref(reference));
            }
            Op::SetVariable { slot } => {
                let reference = self.pop_ref()?;
                self.scope()?.bind_symbol(*slot as usize, reference)?;
            }
            Op::GetBlock { slot } => {
                let block = self.scope()?.get_block(*slot as usize);
                self.push(StackValue::Block(block));
            }
            Op::PushBlock { handle, parameters } => {
                let scope = self.scope()?.clone();
                self.push(StackValue::Block(Some(ScopeBlock {
                    handle: *handle,
                    parameters: *parameters,
                    scope,
                })));
            }
            Op::PushEmptyBlock => self.push(StackValue::Block(None)),
            Op::InvokeYield { positional } => self.invoke_yield(*positional)?,
            Op::GetProperty { key } => {
                let parent = self.pop_ref()?;
                let child = child_ref_for(&parent, key, self.env.delegate());
                self.push(StackValue::Ref(child));
            }
            Op::Helper { handle } => {
                let args = self.pop_captured()?;
                let helper = resolve_helper_handle(self.resolver, *handle)?;
                self.push(StackValue::Ref(helper.invoke(&args)));
            }
            Op::Modifier { handle } => {
                let args = self.pop_captured()?;
                let modifier = resolve_modifier_handle(self.resolver, *handle)?;
                match self.element_operations.as_mut() {
                    Some(operations) => operations.add_modifier(modifier, args),
                    None => self.pending_modifiers.push((modifier, args)),
                }
            }
            Op::ToBoolean => {
                let reference = self.pop_ref()?;
                let delegate = Rc::clone(self.env.delegate());
                self.push(StackValue::Ref(Reference::compute(move || {
                    Value::Bool(delegate.to_bool(&value_for_ref(&reference)))
                })));
            }
            Op::PushDynamicScope => {
                let child = self.dynamic_scope()?.child();
                self.dynamic_scopes.push(child);
            }
            Op::PopDynamicScope => {
                if self.dynamic_scopes.len() <= 1 {
                    return Err(RuntimeError::invariant("cannot pop the root dynamic scope"));
                }
                self.dynamic_scopes.pop();
            }
            Op::BindDynamicScope { names } => {
                let mut references = Vec::with_capacity(names.len());
                for _ in names {
                    references.push(self.pop_ref()?);
                }
                references.reverse();
                let scope = self.dynamic_scope()?.clone();
                for (name, reference) in names.iter().zip(references) {
                    scope.set(name.clone(), reference);
                }
            }
            Op::PopScope => {
                self.scopes
                    .pop()
                    .ok_or_else(|| RuntimeError::invariant("scope stack underflow"))?;
            }
            Op::Enter => self.enter()?,
            Op::Exit => return self.exit(),

            Op::Text { constant } => {
                let text = self.program.constants().get_string(*constant)?;
                self.builder.append_text(text)?;
            }
            Op::AppendText => {
                let reference = self.pop_ref()?;
                let value = value_for_ref(&reference);
                let text = self.env.display_text(&value);
                let node = self.builder.append_text(&text)?;
                if !is_const_ref(&reference) {
                    self.updating.push(UpdatingOp::UpdateDynamicText {
                        node,
                        reference,
                        last: text,
                    });
                }
            }
            Op::OpenElement { tag } => {
                self.builder.open_element(tag)?;
            }
            Op::OpenDynamicElement => {
                let reference = self.pop_ref()?;
                match value_for_ref(&reference) {
                    Value::String(tag) if !tag.is_empty() => {
                        self.builder.open_element(&tag)?;
                    }
                    other => {
                        return Err(RuntimeError::invariant(format!(
                            "a dynamic tag name must be a non-empty string, found {}",
                            other.type_name()
                        )));
                    }
                }
            }
            Op::FlushElement => self.flush_element()?,
            Op::CloseElement => self.builder.close_element()?,
            Op::StaticAttr { name, value, namespace } => {
                self.builder.set_static_attribute(name, value, namespace.as_deref())?;
            }
            Op::DynamicAttr {
                name,
                trusting,
                namespace,
            } => {
                let reference = self.pop_ref()?;
                let value = value_for_ref(&reference);
                let attribute = self
                    .builder
                    .set_dynamic_attribute(name, &value, *trusting, namespace.as_deref())?;
                if !is_const_ref(&reference) {
                    self.updating.push(UpdatingOp::UpdateDynamicAttribute {
                        attribute,
                        reference,
                        last: value,
                    });
                }
            }

            Op::CurryComponent { owner } => self.curry_component(*owner)?,
            Op::PushComponentDefinition { handle } => self.push_component_definition(*handle)?,
            Op::ResolveDynamicComponent { owner } => self.resolve_dynamic_component(*owner)?,
            Op::ResolveCurriedComponent => self.resolve_curried_component()?,
            Op::PushDynamicComponentInstance => self.push_dynamic_component_instance()?,
            Op::PushArgs {
                names,
                block_names,
                positional,
            } => self.push_args(names, block_names, *positional)?,
            Op::PushEmptyArgs => self.push(StackValue::Args(VmArguments::empty())),
            Op::CaptureArgs => {
                let args = self.pop_args()?;
                self.push(StackValue::Captured(args.capture()));
            }
            Op::PrepareArgs => self.prepare_args()?,

            Op::BeginComponentTransaction => self.begin_component_transaction(),
            Op::CreateComponent { has_default_block } => self.create_component(*has_default_block)?,
            Op::RegisterComponentDestructor => self.register_component_destructor()?,
            Op::PutComponentOperations => {
                self.element_operations = Some(ComponentElementOperations::new());
            }
            Op::ComponentAttr {
                name,
                trusting,
                namespace,
            } => {
                let reference = self.pop_ref()?;
                self.component_operations()?
                    .set_attribute(name, reference, *trusting, namespace.clone());
            }
            Op::StaticComponentAttr { name, value, namespace } => {
                self.component_operations()?
                    .set_static_attribute(name, value, namespace.clone());
            }
            Op::DidCreateElement => self.did_create_element()?,
            Op::GetComponentSelf => self.get_component_self()?,
            Op::GetComponentTagName => self.get_component_tag_name()?,
            Op::GetComponentLayout => self.get_component_layout()?,
            Op::Main => self.main()?,
            Op::PopulateLayout => self.populate_layout()?,
            Op::VirtualRootScope => self.virtual_root_scope()?,
            Op::SetupForEval => self.setup_for_eval()?,
            Op::SetNamedVariables => self.set_named_variables()?,
            Op::SetBlocks => self.set_blocks()?,
            Op::InvokeComponentLayout => self.invoke_component_layout()?,
            Op::DidRenderLayout => self.did_render_layout()?,
            Op::CommitComponentTransaction => self.commit_component_transaction()?,
        }
        Ok(Flow::Continue)
    }

    fn return_from_frame(&mut self) -> Result<Flow> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| RuntimeError::invariant("return without a call frame"))?;
        match frame.kind {
            FrameKind::Root => return Ok(Flow::Halt),
            FrameKind::Layout => {}
            FrameKind::Yield => {
                self.scopes
                    .pop()
                    .ok_or_else(|| RuntimeError::invariant("scope stack underflow"))?;
                self.builder.pop_block()?;
            }
        }
        self.pc = frame.ra;
        Ok(Flow::Continue)
    }

    fn enter(&mut self) -> Result<()> {
        let parent = self.destroyable()?;
        let destroyable = self.env.destructors_mut().create_child(parent)?;
        self.destroyables.push(destroyable);
        self.builder.push_block();
        let open = OpenTry {
            pc: self.pc - 1,
            scope: self.scope()?.clone(),
            dynamic_scope: self.dynamic_scope()?.clone(),
            parent,
            destroyable,
            outer_updating: std::mem::take(&mut self.updating),
            outer_cache_groups: std::mem::take(&mut self.cache_groups),
        };
        self.tries.push(open);
        Ok(())
    }

    fn exit(&mut self) -> Result<Flow> {
        let open = self
            .tries
            .pop()
            .ok_or_else(|| RuntimeError::invariant("exit without an open block"))?;
        if !self.cache_groups.is_empty() {
            return Err(RuntimeError::invariant("block exited inside a component transaction"));
        }
        if self.builder.is_block_empty() {
            self.builder.append_comment("")?;
        }
        let bounds = self.builder.pop_block()?;
        if self.destroyables.pop() != Some(open.destroyable) {
            return Err(RuntimeError::invariant("block exited with an unbalanced destroyable stack"));
        }
        let block = TryBlock {
            pc: open.pc,
            scope: open.scope,
            dynamic_scope: open.dynamic_scope,
            parent: open.parent,
            destroyable: open.destroyable,
            bounds,
            ops: std::mem::replace(&mut self.updating, open.outer_updating),
        };
        self.cache_groups = open.outer_cache_groups;
        if self.tries.is_empty() {
            if let Some(resumed) = self.resumed.as_mut() {
                *resumed = Some(block);
                return Ok(Flow::Halt);
            }
        }
        self.updating.push(UpdatingOp::Try(Box::new(block)));
        Ok(Flow::Continue)
    }

    fn invoke_yield(&mut self, positional: u32) -> Result<()> {
        let block = self.pop_block()?;
        let mut references = Vec::with_capacity(positional as usize);
        for _ in 0..positional {
            references.push(self.pop_ref()?);
        }
        references.reverse();
        let Some(block) = block else {
            return Ok(());
        };

        let base = block.scope.len();
        let scope = block.scope.child(block.parameters as usize);
        for (offset, reference) in references.into_iter().take(block.parameters as usize).enumerate() {
            scope.bind_symbol(base + offset, reference)?;
        }
        self.scopes.push(scope);
        self.builder.push_block();
        self.frames.push(Frame {
            ra: self.pc,
            kind: FrameKind::Yield,
        });
        self.pc = block.handle as usize;
        Ok(())
    }

    fn flush_element(&mut self) -> Result<()> {
        let mut modifiers = std::mem::take(&mut self.pending_modifiers);
        if let Some(operations) = self.element_operations.take() {
            let flushed = operations.flush(&mut self.builder)?;
            self.updating.extend(flushed.updating);
            modifiers.extend(flushed.modifiers);
        }
        let element = self.builder.flush_element()?;
        if modifiers.is_empty() {
            return Ok(());
        }
        let owner = self.destroyable()?;
        for (modifier, args) in modifiers {
            let manager = Rc::clone(modifier.manager());
            let state = manager.create(element, &args);
            log::trace!("installing modifier {} on {element:?}", modifier.name());
            self.env
                .register_effect(Effect::new(ModifierEffect::new(manager, state), owner))?;
        }
        Ok(())
    }

    // stack access

    fn pop(&mut self) -> Result<StackValue> {
        self.stack
            .pop()
            .ok_or_else(|| RuntimeError::invariant("operand stack underflow"))
    }

    fn pop_ref(&mut self) -> Result<Reference<Value>> {
        match self.pop()? {
            StackValue::Ref(reference) => Ok(reference),
            other => Err(unexpected("a reference", &other)),
        }
    }

    fn pop_block(&mut self) -> Result<Option<ScopeBlock>> {
        match self.pop()? {
            StackValue::Block(block) => Ok(block),
            other => Err(unexpected("a block", &other)),
        }
    }

    fn pop_args(&mut self) -> Result<VmArguments> {
        match self.pop()? {
            StackValue::Args(args) => Ok(args),
            other => Err(unexpected("arguments", &other)),
        }
    }

    fn peek_args(&self) -> Result<&VmArguments> {
        match self.stack.last() {
            Some(StackValue::Args(args)) => Ok(args),
            Some(other) => Err(unexpected("arguments", other)),
            None => Err(RuntimeError::invariant("operand stack underflow")),
        }
    }

    fn pop_captured(&mut self) -> Result<CapturedArguments> {
        match self.pop()? {
            StackValue::Captured(args) => Ok(args),
            other => Err(unexpected("captured arguments", &other)),
        }
    }

    fn pop_definition(&mut self) -> Result<InstanceDefinition> {
        match self.pop()? {
            StackValue::Definition(definition) => Ok(definition),
            other => Err(unexpected("a component definition", &other)),
        }
    }

    fn pop_invocation(&mut self) -> Result<CompiledLayout> {
        match self.pop()? {
            StackValue::Invocation(layout) => Ok(layout),
            other => Err(unexpected("a layout", &other)),
        }
    }

    /// Instance of the invocation in progress
    fn instance(&self) -> Result<InstanceRef> {
        match &self.registers[Register::S0.index()] {
            StackValue::Instance(instance) => Ok(Rc::clone(instance)),
            other => Err(RuntimeError::invariant(format!(
                "expected a component instance in S0, found {}",
                other.kind_name()
            ))),
        }
    }

    fn scope(&self) -> Result<&Scope> {
        self.scopes
            .last()
            .ok_or_else(|| RuntimeError::invariant("no lexical scope"))
    }

    fn dynamic_scope(&self) -> Result<&DynamicScope> {
        self.dynamic_scopes
            .last()
            .ok_or_else(|| RuntimeError::invariant("no dynamic scope"))
    }

    fn destroyable(&self) -> Result<DestroyableId> {
        self.destroyables
            .last()
            .copied()
            .ok_or_else(|| RuntimeError::invariant("no destroyable to own new content"))
    }

    fn component_operations(&mut self) -> Result<&mut ComponentElementOperations> {
        self.element_operations
            .as_mut()
            .ok_or_else(|| RuntimeError::invariant("no component element is being constructed"))
    }
}
