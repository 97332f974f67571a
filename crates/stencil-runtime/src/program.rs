//! Compiled programs.
//!
//! A [`Program`] is a flat list of [`Op`]s plus a constant pool. Layouts and
//! blocks are contiguous runs of ops ending in `Return`; their handle is the
//! index of their first op. [`ProgramBuilder`] lowers a small expression and
//! invocation vocabulary into those runs, emitting the same invocation
//! sequences a template compiler would.

use std::rc::Rc;

use crate::error::{Result, RuntimeError};
use crate::layout::{CompiledLayout, ProgramSymbolTable};
use crate::resolution::{
    ComponentOrHelper, ContainingMetadata, FreeVariable, FreeVariableKind, OptionalResolution, resolve_component_head,
    resolve_component_or_helper_head, resolve_helper_head, resolve_modifier_head, resolve_optional_component_or_helper,
    resolve_optional_helper,
};
use crate::resolver::{CompileTimeResolver, ResolvedValue};
use crate::value::{Owner, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    /// Component instance of the invocation in progress
    S0,
    S1,
    T0,
    T1,
    V0,
}

impl Register {
    pub const COUNT: usize = 5;

    pub fn index(self) -> usize {
        match self {
            Self::S0 => 0,
            Self::S1 => 1,
            Self::T0 => 2,
            Self::T1 => 3,
            Self::V0 => 4,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Constants {
    values: Vec<Value>,
    strings: Vec<Rc<str>>,
    owners: Vec<Owner>,
}

impl Constants {
    pub fn value(&mut self, value: Value) -> u32 {
        self.values.push(value);
        self.values.len() as u32 - 1
    }

    pub fn string(&mut self, string: &str) -> u32 {
        if let Some(index) = self.strings.iter().position(|existing| &**existing == string) {
            return index as u32;
        }
        self.strings.push(Rc::from(string));
        self.strings.len() as u32 - 1
    }

    pub fn owner(&mut self, owner: Owner) -> u32 {
        if let Some(index) = self.owners.iter().position(|existing| *existing == owner) {
            return index as u32;
        }
        self.owners.push(owner);
        self.owners.len() as u32 - 1
    }

    pub fn get_value(&self, index: u32) -> Result<&Value> {
        self.values
            .get(index as usize)
            .ok_or_else(|| RuntimeError::invariant(format!("value constant {index} is out of range")))
    }

    pub fn get_string(&self, index: u32) -> Result<&Rc<str>> {
        self.strings
            .get(index as usize)
            .ok_or_else(|| RuntimeError::invariant(format!("string constant {index} is out of range")))
    }

    pub fn get_owner(&self, index: u32) -> Result<&Owner> {
        self.owners
            .get(index as usize)
            .ok_or_else(|| RuntimeError::invariant(format!("owner constant {index} is out of range")))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    // machine
    Return,
    Pop { count: u32 },
    Load(Register),
    Fetch(Register),
    PushNull,

    // expressions and scope
    Primitive { constant: u32 },
    GetVariable { slot: u32 },
    GetEvalVariable { name: Rc<str> },
    SetVariable { slot: u32 },
    GetBlock { slot: u32 },
    PushBlock { handle: u32, parameters: u32 },
    PushEmptyBlock,
    InvokeYield { positional: u32 },
    GetProperty { key: Rc<str> },
    Helper { handle: u32 },
    Modifier { handle: u32 },
    ToBoolean,
    PushDynamicScope,
    PopDynamicScope,
    BindDynamicScope { names: Vec<Rc<str>> },
    PopScope,
    /// Start a block the update pass can render again from here
    Enter,
    Exit,

    // content
    Text { constant: u32 },
    AppendText,
    OpenElement { tag: Rc<str> },
    OpenDynamicElement,
    FlushElement,
    CloseElement,
    StaticAttr { name: Rc<str>, value: Rc<str>, namespace: Option<Rc<str>> },
    DynamicAttr { name: Rc<str>, trusting: bool, namespace: Option<Rc<str>> },

    // component definitions
    CurryComponent { owner: u32 },
    PushComponentDefinition { handle: u32 },
    ResolveDynamicComponent { owner: u32 },
    ResolveCurriedComponent,
    PushDynamicComponentInstance,

    // arguments
    PushArgs { names: Vec<Rc<str>>, block_names: Vec<Rc<str>>, positional: u32 },
    PushEmptyArgs,
    CaptureArgs,
    PrepareArgs,

    // component lifecycle
    BeginComponentTransaction,
    CreateComponent { has_default_block: bool },
    RegisterComponentDestructor,
    PutComponentOperations,
    ComponentAttr { name: Rc<str>, trusting: bool, namespace: Option<Rc<str>> },
    StaticComponentAttr { name: Rc<str>, value: Rc<str>, namespace: Option<Rc<str>> },
    DidCreateElement,
    GetComponentSelf,
    GetComponentTagName,
    GetComponentLayout,
    Main,
    PopulateLayout,
    VirtualRootScope,
    SetupForEval,
    SetNamedVariables,
    SetBlocks,
    InvokeComponentLayout,
    DidRenderLayout,
    CommitComponentTransaction,
}

#[derive(Debug, Clone)]
pub struct Program {
    ops: Vec<Op>,
    constants: Constants,
    main: u32,
}

impl Program {
    pub fn op(&self, pc: usize) -> Option<&Op> {
        self.ops.get(pc)
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn constants(&self) -> &Constants {
        &self.constants
    }

    /// Handle of the routine that invokes a definition pushed by the host
    pub fn main(&self) -> u32 {
        self.main
    }
}

/// Expression vocabulary accepted by [`LayoutBuilder`]
#[derive(Debug, Clone)]
pub enum Expr {
    Value(Value),
    /// A symbol in scope: `this`, `@arg` or a block parameter
    Variable(Rc<str>),
    /// A name read from the layout's eval lookup at runtime
    Lookup(Rc<str>),
    Property(Box<Expr>, Rc<str>),
    Helper { handle: u32, args: Args },
    Curry { component: Box<Expr>, owner: Owner, args: Args },
    ToBool(Box<Expr>),
}

impl Expr {
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }

    pub fn var(name: &str) -> Self {
        Self::Variable(Rc::from(name))
    }

    pub fn lookup(name: &str) -> Self {
        Self::Lookup(Rc::from(name))
    }

    pub fn this() -> Self {
        Self::var("this")
    }

    pub fn get(self, key: &str) -> Self {
        Self::Property(Box::new(self), Rc::from(key))
    }

    pub fn helper(handle: u32, args: Args) -> Self {
        Self::Helper { handle, args }
    }

    pub fn curry(component: Expr, owner: Owner, args: Args) -> Self {
        Self::Curry {
            component: Box::new(component),
            owner,
            args,
        }
    }

    pub fn to_bool(self) -> Self {
        Self::ToBool(Box::new(self))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Args {
    pub positional: Vec<Expr>,
    pub named: Vec<(Rc<str>, Expr)>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positional(mut self, expr: Expr) -> Self {
        self.positional.push(expr);
        self
    }

    pub fn named(mut self, name: &str, expr: Expr) -> Self {
        self.named.push((Rc::from(name), expr));
        self
    }
}

/// A compiled block ready to be passed to an invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockArg {
    pub handle: u32,
    pub parameters: u32,
}

/// Arguments, blocks and root-element attributes of one component invocation
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    pub args: Args,
    pub blocks: Vec<(Rc<str>, BlockArg)>,
    pub attributes: Vec<(Rc<str>, Expr)>,
}

impl Invocation {
    pub fn new(args: Args) -> Self {
        Self {
            args,
            ..Self::default()
        }
    }

    pub fn block(mut self, name: &str, block: BlockArg) -> Self {
        self.blocks.push((Rc::from(name), block));
        self
    }

    pub fn attribute(mut self, name: &str, expr: Expr) -> Self {
        self.attributes.push((Rc::from(name), expr));
        self
    }
}

/// Name of the block that carries an invocation's root-element attributes
pub const ATTRS_BLOCK: &str = "attrs";

pub struct ProgramBuilder {
    ops: Vec<Op>,
    constants: Constants,
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self {
            ops: Vec::new(),
            constants: Constants::default(),
        }
    }

    fn append(&mut self, mut ops: Vec<Op>) -> u32 {
        let handle = self.ops.len() as u32;
        ops.push(Op::Return);
        self.ops.append(&mut ops);
        handle
    }

    /// Compile a layout whose scope is described by `table`
    pub fn layout(
        &mut self,
        table: ProgramSymbolTable,
        body: impl FnOnce(&mut LayoutBuilder<'_>),
    ) -> Result<CompiledLayout> {
        let mut builder = LayoutBuilder::new(self, table.symbols.clone());
        body(&mut builder);
        let (ops, error) = builder.finish();
        if let Some(error) = error {
            return Err(error);
        }
        let handle = self.append(ops);
        Ok(CompiledLayout::new(handle, table))
    }

    pub fn build(mut self) -> Program {
        let mut main = vec![Op::Main];
        emit_prepared_invocation(&mut main, false);
        let main = self.append(main);
        Program {
            ops: self.ops,
            constants: self.constants,
            main,
        }
    }
}

/// Everything from argument preparation to the end of the layout.
/// Expects the instance in `S0` and its arguments on top of the stack.
fn emit_prepared_invocation(ops: &mut Vec<Op>, has_default_block: bool) {
    ops.extend([
        Op::PrepareArgs,
        Op::BeginComponentTransaction,
        Op::PushDynamicScope,
        Op::CreateComponent { has_default_block },
        Op::RegisterComponentDestructor,
        Op::GetComponentSelf,
        Op::GetComponentLayout,
        Op::PopulateLayout,
        Op::VirtualRootScope,
        Op::SetupForEval,
        Op::SetNamedVariables,
        Op::SetBlocks,
        Op::Pop { count: 1 },
        Op::InvokeComponentLayout,
        Op::DidRenderLayout,
        Op::PopScope,
        Op::PopDynamicScope,
        Op::CommitComponentTransaction,
    ]);
}

/// Emits the ops of one layout or block.
///
/// Compile errors are recorded and reported when the layout is finished, so
/// the builder methods chain without `?`.
pub struct LayoutBuilder<'p> {
    program: &'p mut ProgramBuilder,
    ops: Vec<Op>,
    symbols: Vec<Rc<str>>,
    error: Option<RuntimeError>,
}

impl<'p> LayoutBuilder<'p> {
    fn new(program: &'p mut ProgramBuilder, symbols: Vec<Rc<str>>) -> Self {
        Self {
            program,
            ops: Vec::new(),
            symbols,
            error: None,
        }
    }

    fn finish(self) -> (Vec<Op>, Option<RuntimeError>) {
        (self.ops, self.error)
    }

    fn fail(&mut self, error: RuntimeError) {
        self.error.get_or_insert(error);
    }

    fn slot(&mut self, name: &str) -> Option<u32> {
        if name == "this" {
            return Some(0);
        }
        let slot = self.symbols.iter().rposition(|symbol| &**symbol == name).map(|index| index as u32 + 1);
        if slot.is_none() {
            self.fail(RuntimeError::invariant(format!("`{name}` is not in scope")));
        }
        slot
    }

    fn emit(&mut self, op: Op) -> &mut Self {
        self.ops.push(op);
        self
    }

    pub fn expr(&mut self, expr: &Expr) -> &mut Self {
        match expr {
            Expr::Value(value) => {
                let constant = self.program.constants.value(value.clone());
                self.emit(Op::Primitive { constant })
            }
            Expr::Variable(name) => match self.slot(name) {
                Some(slot) => self.emit(Op::GetVariable { slot }),
                None => self.emit(Op::PushNull),
            },
            Expr::Lookup(name) => self.emit(Op::GetEvalVariable { name: name.clone() }),
            Expr::Property(parent, key) => {
                self.expr(parent);
                self.emit(Op::GetProperty { key: key.clone() })
            }
            Expr::Helper { handle, args } => {
                self.args(args, &[]);
                self.emit(Op::CaptureArgs);
                self.emit(Op::Helper { handle: *handle })
            }
            Expr::Curry { component, owner, args } => {
                self.expr(component);
                self.args(args, &[]);
                self.emit(Op::CaptureArgs);
                let owner = self.program.constants.owner(owner.clone());
                self.emit(Op::CurryComponent { owner })
            }
            Expr::ToBool(inner) => {
                self.expr(inner);
                self.emit(Op::ToBoolean)
            }
        }
    }

    fn args(&mut self, args: &Args, blocks: &[(Rc<str>, BlockArg)]) -> &mut Self {
        if args.positional.is_empty() && args.named.is_empty() && blocks.is_empty() {
            return self.emit(Op::PushEmptyArgs);
        }
        for expr in &args.positional {
            self.expr(expr);
        }
        for (_, expr) in &args.named {
            self.expr(expr);
        }
        for (_, block) in blocks {
            self.emit(Op::PushBlock {
                handle: block.handle,
                parameters: block.parameters,
            });
        }
        self.emit(Op::PushArgs {
            names: args.named.iter().map(|(name, _)| name.clone()).collect(),
            block_names: blocks.iter().map(|(name, _)| name.clone()).collect(),
            positional: args.positional.len() as u32,
        })
    }

    /// Compile a block closed over the current scope, with `parameters`
    /// bound after the enclosing symbols.
    pub fn block(&mut self, parameters: &[&str], body: impl FnOnce(&mut LayoutBuilder<'_>)) -> BlockArg {
        let mut symbols = self.symbols.clone();
        symbols.extend(parameters.iter().map(|name| Rc::from(*name)));
        let mut child = LayoutBuilder::new(&mut *self.program, symbols);
        body(&mut child);
        let (ops, error) = child.finish();
        if let Some(error) = error {
            self.fail(error);
        }
        BlockArg {
            handle: self.program.append(ops),
            parameters: parameters.len() as u32,
        }
    }

    pub fn text(&mut self, text: &str) -> &mut Self {
        let constant = self.program.constants.string(text);
        self.emit(Op::Text { constant })
    }

    pub fn append(&mut self, expr: Expr) -> &mut Self {
        self.expr(&expr);
        self.emit(Op::AppendText)
    }

    pub fn open_element(&mut self, tag: &str) -> &mut Self {
        self.emit(Op::OpenElement { tag: Rc::from(tag) })
    }

    pub fn static_attr(&mut self, name: &str, value: &str) -> &mut Self {
        self.emit(Op::StaticAttr {
            name: Rc::from(name),
            value: Rc::from(value),
            namespace: None,
        })
    }

    pub fn dynamic_attr(&mut self, name: &str, expr: Expr) -> &mut Self {
        self.expr(&expr);
        self.emit(Op::DynamicAttr {
            name: Rc::from(name),
            trusting: false,
            namespace: None,
        })
    }

    pub fn modifier(&mut self, handle: u32, args: Args) -> &mut Self {
        self.args(&args, &[]);
        self.emit(Op::CaptureArgs);
        self.emit(Op::Modifier { handle })
    }

    pub fn flush_element(&mut self) -> &mut Self {
        self.emit(Op::FlushElement)
    }

    pub fn close_element(&mut self) -> &mut Self {
        self.emit(Op::CloseElement)
    }

    /// Open the component's root element, with the tag from the manager when
    /// `tag` is `None`, and start collecting its attributes.
    pub fn open_component_element(&mut self, tag: Option<&str>) -> &mut Self {
        match tag {
            Some(tag) => self.emit(Op::OpenElement { tag: Rc::from(tag) }),
            None => {
                self.emit(Op::GetComponentTagName);
                self.emit(Op::OpenDynamicElement)
            }
        };
        self.emit(Op::PutComponentOperations)
    }

    pub fn component_attr(&mut self, name: &str, value: &str) -> &mut Self {
        self.emit(Op::StaticComponentAttr {
            name: Rc::from(name),
            value: Rc::from(value),
            namespace: None,
        })
    }

    pub fn component_dynamic_attr(&mut self, name: &str, expr: Expr) -> &mut Self {
        self.expr(&expr);
        self.emit(Op::ComponentAttr {
            name: Rc::from(name),
            trusting: false,
            namespace: None,
        })
    }

    /// Apply the caller's attributes, if it passed any
    pub fn splattributes(&mut self) -> &mut Self {
        let name = format!("&{ATTRS_BLOCK}");
        if let Some(slot) = self.slot(&name) {
            self.emit(Op::GetBlock { slot });
            self.emit(Op::InvokeYield { positional: 0 });
        }
        self
    }

    pub fn flush_component_element(&mut self) -> &mut Self {
        self.emit(Op::DidCreateElement);
        self.emit(Op::FlushElement)
    }

    /// Yield to the block bound as `&name`
    pub fn yield_to(&mut self, name: &str, positional: Vec<Expr>) -> &mut Self {
        let count = positional.len() as u32;
        for expr in &positional {
            self.expr(expr);
        }
        if let Some(slot) = self.slot(&format!("&{name}")) {
            self.emit(Op::GetBlock { slot });
            self.emit(Op::InvokeYield { positional: count });
        }
        self
    }

    /// Bind dynamic variables for everything `body` renders
    pub fn with_dynamic_vars(
        &mut self,
        vars: Vec<(&str, Expr)>,
        body: impl FnOnce(&mut Self),
    ) -> &mut Self {
        self.emit(Op::PushDynamicScope);
        let names: Vec<Rc<str>> = vars.iter().map(|(name, _)| Rc::from(*name)).collect();
        for (_, expr) in &vars {
            self.expr(expr);
        }
        self.emit(Op::BindDynamicScope { names });
        body(self);
        self.emit(Op::PopDynamicScope)
    }

    fn invocation_blocks(&mut self, invocation: &Invocation) -> Vec<(Rc<str>, BlockArg)> {
        let mut blocks = invocation.blocks.clone();
        if !invocation.attributes.is_empty() {
            let attributes = invocation.attributes.clone();
            let attrs = self.block(&[], |block| {
                for (name, expr) in &attributes {
                    block.component_dynamic_attr(name, expr.clone());
                }
            });
            blocks.push((Rc::from(ATTRS_BLOCK), attrs));
        }
        blocks
    }

    fn invoke_with(&mut self, push_instance: impl FnOnce(&mut Self), invocation: &Invocation) -> &mut Self {
        let blocks = self.invocation_blocks(invocation);
        let has_default_block = blocks.iter().any(|(name, _)| &**name == "default");
        self.emit(Op::Fetch(Register::S0));
        push_instance(self);
        self.emit(Op::Load(Register::S0));
        self.args(&invocation.args, &blocks);
        emit_prepared_invocation(&mut self.ops, has_default_block);
        self.emit(Op::Load(Register::S0))
    }

    /// Invoke the component registered under resolver handle `handle`
    pub fn invoke_static(&mut self, handle: u32, invocation: Invocation) -> &mut Self {
        self.invoke_with(
            |builder| {
                builder.emit(Op::PushComponentDefinition { handle });
            },
            &invocation,
        )
    }

    /// Resolve `variable` as a `<Head />` component and invoke it. Failures
    /// are reported when the layout is finished.
    pub fn invoke_head<R: CompileTimeResolver>(
        &mut self,
        resolver: &mut R,
        meta: &ContainingMetadata,
        variable: &FreeVariable,
        invocation: Invocation,
    ) -> &mut Self {
        match resolve_component_head(&*resolver, meta, variable) {
            Ok(definition) => {
                let handle = resolver.register(ResolvedValue::Component(definition));
                self.invoke_static(handle, invocation)
            }
            Err(error) => {
                self.fail(error);
                self
            }
        }
    }

    /// Append `{{head args}}`. A component is invoked with `args`, a helper's
    /// result is appended, and positions with a property fallback append
    /// `this.head` when nothing is registered under the name.
    pub fn append_head<R: CompileTimeResolver>(
        &mut self,
        resolver: &mut R,
        meta: &ContainingMetadata,
        variable: &FreeVariable,
        args: Args,
    ) -> &mut Self {
        let resolved = match variable.kind {
            FreeVariableKind::AsHelperHead => resolve_helper_head(&*resolver, meta, variable)
                .map(|helper| OptionalResolution::Resolved(ComponentOrHelper::Helper(helper))),
            FreeVariableKind::AsComponentOrHelperHead => {
                resolve_component_or_helper_head(&*resolver, meta, variable).map(OptionalResolution::Resolved)
            }
            FreeVariableKind::AsHelperHeadOrThisFallback => {
                resolve_optional_helper(&*resolver, meta, variable).map(|resolved| match resolved {
                    OptionalResolution::Resolved(helper) => {
                        OptionalResolution::Resolved(ComponentOrHelper::Helper(helper))
                    }
                    OptionalResolution::Literal(name) => OptionalResolution::Literal(name),
                })
            }
            _ => resolve_optional_component_or_helper(&*resolver, meta, variable),
        };
        match resolved {
            Ok(OptionalResolution::Resolved(ComponentOrHelper::Component(definition))) => {
                let handle = resolver.register(ResolvedValue::Component(definition));
                self.invoke_static(handle, Invocation::new(args))
            }
            Ok(OptionalResolution::Resolved(ComponentOrHelper::Helper(helper))) => {
                let handle = resolver.register(ResolvedValue::Helper(helper));
                self.append(Expr::helper(handle, args))
            }
            Ok(OptionalResolution::Literal(name)) => self.append(Expr::this().get(&name)),
            Err(error) => {
                self.fail(error);
                self
            }
        }
    }

    /// Resolve `variable` as `{{head}}` in element position and install it
    pub fn modifier_head<R: CompileTimeResolver>(
        &mut self,
        resolver: &mut R,
        meta: &ContainingMetadata,
        variable: &FreeVariable,
        args: Args,
    ) -> &mut Self {
        match resolve_modifier_head(&*resolver, meta, variable) {
            Ok(modifier) => {
                let handle = resolver.register(ResolvedValue::Modifier(modifier));
                self.modifier(handle, args)
            }
            Err(error) => {
                self.fail(error);
                self
            }
        }
    }

    /// Invoke whatever `component` evaluates to: a name, a definition or a
    /// curried definition. The invocation renders again when the value
    /// changes identity.
    pub fn invoke_dynamic(&mut self, component: Expr, owner: Owner, invocation: Invocation) -> &mut Self {
        self.emit(Op::Enter);
        self.invoke_with(
            |builder| {
                builder.expr(&component);
                let owner = builder.program.constants.owner(owner);
                builder.emit(Op::ResolveDynamicComponent { owner });
                builder.emit(Op::PushDynamicComponentInstance);
            },
            &invocation,
        );
        self.emit(Op::Exit)
    }

    /// Invoke a value that must already be a definition or curried definition
    pub fn invoke_curried(&mut self, component: Expr, invocation: Invocation) -> &mut Self {
        self.emit(Op::Enter);
        self.invoke_with(
            |builder| {
                builder.expr(&component);
                builder.emit(Op::ResolveCurriedComponent);
                builder.emit(Op::PushDynamicComponentInstance);
            },
            &invocation,
        );
        self.emit(Op::Exit)
    }
}
