//! Invocation arguments.
//!
//! [`VmArguments`] is what an invocation site pushes: positional and named
//! references plus blocks. [`CapturedArguments`] is the detached snapshot of
//! the reference lists that outlives the operand stack, used by curried
//! definitions, helpers and modifiers.

use std::rc::Rc;

use smallvec::SmallVec;
use stencil_reactive::{Reference, value_for_ref};

use crate::references::undefined_ref;
use crate::scope::ScopeBlock;
use crate::value::Value;

#[derive(Clone, Debug, Default)]
pub struct PositionalArguments {
    refs: SmallVec<[Reference<Value>; 4]>,
}

impl PositionalArguments {
    pub fn new(refs: impl IntoIterator<Item = Reference<Value>>) -> Self {
        Self {
            refs: refs.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Reference at `index`; missing positions read as undefined
    pub fn at(&self, index: usize) -> Reference<Value> {
        self.refs.get(index).cloned().unwrap_or_else(undefined_ref)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reference<Value>> {
        self.refs.iter()
    }

    /// Put captured references in front of the existing ones
    pub fn prepend(&mut self, captured: &[Reference<Value>]) {
        if captured.is_empty() {
            return;
        }
        let mut refs: SmallVec<[Reference<Value>; 4]> = captured.iter().cloned().collect();
        refs.extend(self.refs.drain(..));
        self.refs = refs;
    }
}

#[derive(Clone, Debug, Default)]
pub struct NamedArguments {
    names: SmallVec<[Rc<str>; 4]>,
    refs: SmallVec<[Reference<Value>; 4]>,
}

impl NamedArguments {
    pub fn new(entries: impl IntoIterator<Item = (Rc<str>, Reference<Value>)>) -> Self {
        let mut named = Self::default();
        for (name, reference) in entries {
            named.names.push(name);
            named.refs.push(reference);
        }
        named
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[Rc<str>] {
        &self.names
    }

    /// Names as the layout's symbol table spells them
    pub fn at_names(&self) -> impl Iterator<Item = String> + '_ {
        self.names.iter().map(|name| format!("@{name}"))
    }

    pub fn has(&self, name: &str) -> bool {
        self.names.iter().any(|existing| &**existing == name)
    }

    pub fn get(&self, name: &str) -> Option<Reference<Value>> {
        let index = self.names.iter().position(|existing| &**existing == name)?;
        self.refs.get(index).cloned()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&Rc<str>, &Reference<Value>)> {
        self.names.iter().zip(self.refs.iter())
    }

    /// Add captured entries whose names are not already present.
    /// Existing entries win, so values supplied closer to the invocation take precedence.
    pub fn merge(&mut self, captured: &[(Rc<str>, Reference<Value>)]) {
        for (name, reference) in captured {
            if !self.has(name) {
                self.names.push(name.clone());
                self.refs.push(reference.clone());
            }
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct BlockArguments {
    names: SmallVec<[Rc<str>; 2]>,
    blocks: SmallVec<[Option<ScopeBlock>; 2]>,
}

impl BlockArguments {
    pub fn new(entries: impl IntoIterator<Item = (Rc<str>, Option<ScopeBlock>)>) -> Self {
        let mut blocks = Self::default();
        for (name, block) in entries {
            blocks.names.push(name);
            blocks.blocks.push(block);
        }
        blocks
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<ScopeBlock> {
        let index = self.names.iter().position(|existing| &**existing == name)?;
        self.blocks.get(index).cloned().flatten()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Rc<str>, &Option<ScopeBlock>)> {
        self.names.iter().zip(self.blocks.iter())
    }
}

/// Arguments as pushed by an invocation site
#[derive(Clone, Debug, Default)]
pub struct VmArguments {
    pub positional: PositionalArguments,
    pub named: NamedArguments,
    pub blocks: BlockArguments,
}

impl VmArguments {
    pub fn new(positional: PositionalArguments, named: NamedArguments, blocks: BlockArguments) -> Self {
        Self {
            positional,
            named,
            blocks,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_captured(captured: &CapturedArguments) -> Self {
        Self {
            positional: PositionalArguments::new(captured.positional.iter().cloned()),
            named: NamedArguments::new(captured.named.iter().cloned()),
            blocks: BlockArguments::default(),
        }
    }

    pub fn capture(&self) -> CapturedArguments {
        CapturedArguments {
            positional: self.positional.refs.clone(),
            named: self
                .named
                .iter()
                .map(|(name, reference)| (name.clone(), reference.clone()))
                .collect(),
        }
    }

    /// Read every argument so the enclosing tracking frame records them.
    pub fn consume(&self) {
        for reference in self.positional.iter() {
            value_for_ref(reference);
        }
        for (_, reference) in self.named.iter() {
            value_for_ref(reference);
        }
    }

    /// Replace the reference lists with a manager's prepared ones; blocks stay.
    pub fn rewrite(&mut self, prepared: PreparedArguments) {
        self.positional = PositionalArguments::new(prepared.positional);
        self.named = NamedArguments::new(prepared.named);
    }
}

/// Detached positional and named references. Blocks are not captured.
#[derive(Clone, Debug, Default)]
pub struct CapturedArguments {
    pub positional: SmallVec<[Reference<Value>; 4]>,
    pub named: SmallVec<[(Rc<str>, Reference<Value>); 4]>,
}

impl CapturedArguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_positional(mut self, reference: Reference<Value>) -> Self {
        self.positional.push(reference);
        self
    }

    pub fn with_named(mut self, name: impl Into<Rc<str>>, reference: Reference<Value>) -> Self {
        self.named.push((name.into(), reference));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }

    pub fn named_ref(&self, name: &str) -> Option<&Reference<Value>> {
        self.named
            .iter()
            .find(|(existing, _)| &**existing == name)
            .map(|(_, reference)| reference)
    }

    pub fn named_value(&self, name: &str) -> Option<Value> {
        self.named_ref(name).map(value_for_ref)
    }

    pub fn positional_value(&self, index: usize) -> Option<Value> {
        self.positional.get(index).map(value_for_ref)
    }

    /// Current values of every named argument, in order
    pub fn named_values(&self) -> Vec<(Rc<str>, Value)> {
        self.named
            .iter()
            .map(|(name, reference)| (name.clone(), value_for_ref(reference)))
            .collect()
    }
}

/// Replacement argument lists produced by a manager's `prepare_args`
#[derive(Clone, Debug, Default)]
pub struct PreparedArguments {
    pub positional: Vec<Reference<Value>>,
    pub named: Vec<(Rc<str>, Reference<Value>)>,
}
