//! Compiled layouts and their symbol tables.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

/// Symbols a compiled layout binds. Symbol `i` lives in scope slot `i + 1`;
/// slot 0 is always `self`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramSymbolTable {
    pub symbols: Vec<Rc<str>>,
    pub has_eval: bool,
}

impl ProgramSymbolTable {
    pub fn new<S: Into<Rc<str>>>(symbols: impl IntoIterator<Item = S>) -> Self {
        Self {
            symbols: symbols.into_iter().map(Into::into).collect(),
            has_eval: false,
        }
    }

    /// Mark the layout as needing a name-keyed lookup of its arguments
    pub fn with_eval(mut self) -> Self {
        self.has_eval = true;
        self
    }

    /// Position of `name` in the table
    pub fn symbol(&self, name: &str) -> Option<usize> {
        self.symbols.iter().position(|symbol| &**symbol == name)
    }

    /// Scope slot for `name`
    pub fn slot(&self, name: &str) -> Option<usize> {
        self.symbol(name).map(|symbol| symbol + 1)
    }

    /// Slots a scope needs for this table, including `self`
    pub fn scope_size(&self) -> usize {
        self.symbols.len() + 1
    }
}

/// Entry point into the program plus the symbols it expects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledLayout {
    pub handle: u32,
    pub symbol_table: ProgramSymbolTable,
}

impl CompiledLayout {
    pub fn new(handle: u32, symbol_table: ProgramSymbolTable) -> Self {
        Self { handle, symbol_table }
    }
}

/// A component template: its plain layout and, optionally, a wrapped one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    layout: CompiledLayout,
    wrapped: Option<CompiledLayout>,
}

impl Template {
    pub fn new(layout: CompiledLayout) -> Self {
        Self { layout, wrapped: None }
    }

    pub fn with_wrapped(mut self, wrapped: CompiledLayout) -> Self {
        self.wrapped = Some(wrapped);
        self
    }

    pub fn as_layout(&self) -> &CompiledLayout {
        &self.layout
    }

    pub fn as_wrapped_layout(&self) -> Option<&CompiledLayout> {
        self.wrapped.as_ref()
    }
}
