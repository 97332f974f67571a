//! Transactions.
//!
//! A transaction spans one VM pass. Lifecycle callbacks are queued while the
//! pass runs and only invoked by [`Transaction::commit`], in a fixed order:
//! creates, updates, destruction, effects, then the sweep of effects whose
//! owner is gone.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::destroyables::{DestructorRegistry, Teardown};
use crate::effects::{Effect, EffectList};
use crate::error::Result;
use crate::manager::InternalComponentManager;
use crate::render_tree::DebugRenderTree;
use crate::state::InstanceState;

/// A manager hook to call on one instance
#[derive(Clone)]
pub struct LifecycleCallback {
    pub manager: Rc<dyn InternalComponentManager>,
    pub state: InstanceState,
}

/// Counts of what a commit ran
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub created: usize,
    pub updated: usize,
    pub destroyed: usize,
    pub effects_run: usize,
    pub effects_swept: usize,
}

#[derive(Default)]
pub struct Transaction {
    created: Vec<LifecycleCallback>,
    updated: Vec<LifecycleCallback>,
    destroyed: Vec<Teardown>,
    scheduled_effects: Vec<Effect>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn did_create(&mut self, callback: LifecycleCallback) {
        self.created.push(callback);
    }

    pub fn did_update(&mut self, callback: LifecycleCallback) {
        self.updated.push(callback);
    }

    pub fn did_destroy(&mut self, teardown: Teardown) {
        self.destroyed.push(teardown);
    }

    pub fn schedule_effect(&mut self, effect: Effect) {
        self.scheduled_effects.push(effect);
    }

    /// Number of queued entries of every kind
    pub fn queued(&self) -> usize {
        self.created.len() + self.updated.len() + self.destroyed.len() + self.scheduled_effects.len()
    }

    pub fn commit(
        self,
        destructors: &DestructorRegistry,
        effects: &mut EffectList,
        render_tree: Option<&dyn DebugRenderTree>,
    ) -> Result<CommitSummary> {
        let mut summary = CommitSummary::default();

        for callback in &self.created {
            callback.manager.did_create(&callback.state)?;
            summary.created += 1;
        }
        for callback in &self.updated {
            callback.manager.did_update(&callback.state)?;
            summary.updated += 1;
        }

        let mut finals = Vec::new();
        let mut instances = Vec::new();
        for teardown in self.destroyed {
            summary.destroyed += teardown.destroyed.len();
            for destroyable in teardown.destructors {
                let (will_destroy, destroy) = destroyable.into_hooks();
                if let Some(will_destroy) = will_destroy {
                    will_destroy();
                }
                finals.push(destroy);
            }
            instances.extend(teardown.instances);
        }
        for destroy in finals {
            destroy();
        }
        for instance in instances {
            let mut instance = instance.borrow_mut();
            if let Some(tree) = render_tree {
                for bucket in instance.render_buckets() {
                    tree.will_destroy(*bucket);
                }
            }
            instance.mark_destroyed()?;
        }

        let head = effects.head();
        for effect in self.scheduled_effects {
            if destructors.is_destroyed(effect.owner()) {
                continue;
            }
            effects.insert_before(effect, head);
        }
        for id in effects.ids() {
            let Some(effect) = effects.get_mut(id) else {
                continue;
            };
            if destructors.is_destroyed(effect.owner()) {
                continue;
            }
            if effect.run()? {
                summary.effects_run += 1;
            }
        }

        for id in effects.ids() {
            let owner_gone = effects
                .get(id)
                .is_some_and(|effect| destructors.is_destroyed(effect.owner()));
            if !owner_gone {
                continue;
            }
            if let Some(effect) = effects.remove(id) {
                effect.teardown()?;
                summary.effects_swept += 1;
            }
        }

        Ok(summary)
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("created", &self.created.len())
            .field("updated", &self.updated.len())
            .field("destroyed", &self.destroyed.len())
            .field("scheduled_effects", &self.scheduled_effects.len())
            .finish()
    }
}
