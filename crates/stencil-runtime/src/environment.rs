//! Rendering environment.
//!
//! The environment owns what outlives a single VM pass: the open
//! transaction, the destructor registry, registered effects and the
//! optional debug render tree. Host policy (truthiness, iteration, property
//! paths) comes from an [`EnvironmentDelegate`].

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::destroyables::{DestroyableId, DestructorRegistry};
use crate::effects::{Effect, EffectList};
use crate::error::{Result, RuntimeError};
use crate::manager::InternalComponentManager;
use crate::render_tree::DebugRenderTree;
use crate::state::InstanceState;
use crate::transaction::{CommitSummary, LifecycleCallback, Transaction};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentOptions {
    /// Whether effects run. Server rendering turns this off.
    pub interactive: bool,
}

impl Default for EnvironmentOptions {
    fn default() -> Self {
        Self { interactive: true }
    }
}

/// Host hooks the runtime defers to
pub trait EnvironmentDelegate {
    fn to_bool(&self, value: &Value) -> bool {
        value.is_truthy()
    }

    /// Items of an iterable value, or `None` when it is not iterable
    fn to_iterator(&self, value: &Value) -> Option<Box<dyn Iterator<Item = Value>>> {
        match value {
            Value::List(items) => {
                let items = Rc::clone(items);
                Some(Box::new((0..items.len()).filter_map(move |index| items.get(index).cloned())))
            }
            _ => None,
        }
    }

    fn get_path(&self, parent: &Value, key: &str) -> Value {
        match parent {
            Value::Object(object) => object.get(key),
            Value::List(items) if key == "length" => Value::number(items.len() as f64),
            Value::List(items) => key
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index).cloned())
                .unwrap_or_default(),
            Value::String(text) if key == "length" => Value::number(text.chars().count() as f64),
            _ => Value::Undefined,
        }
    }

    fn set_path(&self, parent: &Value, key: &str, value: Value) {
        if let Value::Object(object) = parent {
            object.set(key, value);
        } else {
            log::warn!("cannot set `{key}` on a {}", parent.type_name());
        }
    }

    fn on_transaction_begin(&self) {}

    fn on_transaction_commit(&self) {}
}

/// Delegate with every default
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDelegate;

impl EnvironmentDelegate for DefaultDelegate {}

pub struct Environment {
    options: EnvironmentOptions,
    delegate: Rc<dyn EnvironmentDelegate>,
    transaction: Option<Transaction>,
    destructors: DestructorRegistry,
    effects: EffectList,
    debug_render_tree: Option<Rc<dyn DebugRenderTree>>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new(EnvironmentOptions::default(), Rc::new(DefaultDelegate))
    }
}

impl Environment {
    pub fn new(options: EnvironmentOptions, delegate: Rc<dyn EnvironmentDelegate>) -> Self {
        Self {
            options,
            delegate,
            transaction: None,
            destructors: DestructorRegistry::new(),
            effects: EffectList::new(),
            debug_render_tree: None,
        }
    }

    pub fn with_debug_render_tree(mut self, tree: Rc<dyn DebugRenderTree>) -> Self {
        self.debug_render_tree = Some(tree);
        self
    }

    pub fn options(&self) -> EnvironmentOptions {
        self.options
    }

    pub fn delegate(&self) -> &Rc<dyn EnvironmentDelegate> {
        &self.delegate
    }

    pub fn debug_render_tree(&self) -> Option<&Rc<dyn DebugRenderTree>> {
        self.debug_render_tree.as_ref()
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    pub fn begin(&mut self) -> Result<()> {
        if self.transaction.is_some() {
            return Err(RuntimeError::invariant(
                "a transaction is already open; nested transactions are not supported",
            ));
        }
        log::debug!("transaction begin");
        self.delegate.on_transaction_begin();
        self.transaction = Some(Transaction::new());
        Ok(())
    }

    pub fn commit(&mut self) -> Result<CommitSummary> {
        let transaction = self
            .transaction
            .take()
            .ok_or_else(|| RuntimeError::invariant("commit without an open transaction"))?;
        let summary = transaction.commit(
            &self.destructors,
            &mut self.effects,
            self.debug_render_tree.as_deref(),
        )?;
        self.delegate.on_transaction_commit();
        log::debug!("transaction commit: {summary:?}");
        Ok(summary)
    }

    /// Drop the open transaction without running anything it queued
    pub fn discard(&mut self) {
        if let Some(transaction) = self.transaction.take() {
            log::warn!("discarding transaction with {} queued callbacks", transaction.queued());
        }
    }

    fn transaction_mut(&mut self) -> Result<&mut Transaction> {
        self.transaction
            .as_mut()
            .ok_or_else(|| RuntimeError::invariant("lifecycle event outside of a transaction"))
    }

    pub fn did_create(&mut self, manager: Rc<dyn InternalComponentManager>, state: InstanceState) -> Result<()> {
        self.transaction_mut()?
            .did_create(LifecycleCallback { manager, state });
        Ok(())
    }

    pub fn did_update(&mut self, manager: Rc<dyn InternalComponentManager>, state: InstanceState) -> Result<()> {
        self.transaction_mut()?
            .did_update(LifecycleCallback { manager, state });
        Ok(())
    }

    /// Queue an effect. Non-interactive environments drop it.
    pub fn register_effect(&mut self, effect: Effect) -> Result<()> {
        if !self.options.interactive {
            return Ok(());
        }
        self.transaction_mut()?.schedule_effect(effect);
        Ok(())
    }

    /// Release `id` and its subtree; hooks run when the transaction commits.
    pub fn destroy(&mut self, id: DestroyableId) -> Result<()> {
        if self.transaction.is_none() {
            return Err(RuntimeError::invariant("destroy outside of a transaction"));
        }
        let teardown = self.destructors.destroy(id)?;
        self.transaction_mut()?.did_destroy(teardown);
        Ok(())
    }

    pub fn destructors(&self) -> &DestructorRegistry {
        &self.destructors
    }

    pub fn destructors_mut(&mut self) -> &mut DestructorRegistry {
        &mut self.destructors
    }

    pub fn effects(&self) -> &EffectList {
        &self.effects
    }

    /// Text appended for `value`; iterable values render their items joined by commas
    pub fn display_text(&self, value: &Value) -> String {
        match self.delegate.to_iterator(value) {
            Some(items) => items.map(|item| item.to_display_string()).collect::<Vec<_>>().join(","),
            None => value.to_display_string(),
        }
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("options", &self.options)
            .field("transaction", &self.transaction)
            .field("live_destroyables", &self.destructors.live_count())
            .field("effects", &self.effects.len())
            .finish()
    }
}

/// Run `f` inside a transaction, reusing one that is already open.
///
/// A transaction opened here commits when `f` succeeds and is discarded when
/// it fails.
pub fn in_transaction<T>(env: &mut Environment, f: impl FnOnce(&mut Environment) -> Result<T>) -> Result<T> {
    if env.in_transaction() {
        return f(env);
    }
    env.begin()?;
    match f(env) {
        Ok(value) => {
            env.commit()?;
            Ok(value)
        }
        Err(error) => {
            env.discard();
            Err(error)
        }
    }
}
