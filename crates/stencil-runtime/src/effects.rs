//! Effects.
//!
//! An effect runs after its transaction commits: `setup` once, then
//! `update` whenever something it read during its last run changed, and
//! `teardown` once its owner is destroyed. Registered effects live in an
//! arena-backed list so removal during a sweep is O(1).

use std::fmt;
use std::rc::Rc;

use stencil_reactive::{Revision, Tag, track, validate_tag, value_for_tag};

use crate::destroyables::DestroyableId;
use crate::error::Result;
use crate::helper::InternalModifierManager;
use crate::state::ModifierState;

pub trait EffectHooks {
    fn setup(&self) -> Result<()>;
    fn update(&self) -> Result<()>;
    fn teardown(&self) -> Result<()>;
}

pub struct Effect {
    hooks: Box<dyn EffectHooks>,
    owner: DestroyableId,
    memo: Option<(Tag, Revision)>,
}

impl Effect {
    pub fn new(hooks: impl EffectHooks + 'static, owner: DestroyableId) -> Self {
        Self {
            hooks: Box::new(hooks),
            owner,
            memo: None,
        }
    }

    pub fn owner(&self) -> DestroyableId {
        self.owner
    }

    pub fn is_set_up(&self) -> bool {
        self.memo.is_some()
    }

    /// Set up or update the effect. Returns whether a hook ran.
    pub fn run(&mut self) -> Result<bool> {
        if let Some((tag, snapshot)) = &self.memo {
            if validate_tag(tag, *snapshot) {
                return Ok(false);
            }
        }
        let first = self.memo.is_none();
        let (result, tag) = track(|| if first { self.hooks.setup() } else { self.hooks.update() });
        result?;
        let snapshot = value_for_tag(&tag);
        self.memo = Some((tag, snapshot));
        Ok(true)
    }

    /// Tear down an effect that was set up; one that never ran is dropped silently.
    pub fn teardown(self) -> Result<()> {
        if self.memo.is_some() {
            self.hooks.teardown()?;
        }
        Ok(())
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("owner", &self.owner)
            .field("set_up", &self.memo.is_some())
            .finish()
    }
}

/// Installation of one modifier on one element
pub struct ModifierEffect {
    manager: Rc<dyn InternalModifierManager>,
    state: ModifierState,
}

impl ModifierEffect {
    pub fn new(manager: Rc<dyn InternalModifierManager>, state: ModifierState) -> Self {
        Self { manager, state }
    }
}

impl EffectHooks for ModifierEffect {
    fn setup(&self) -> Result<()> {
        self.manager.install(&self.state)
    }

    fn update(&self) -> Result<()> {
        self.manager.update(&self.state)
    }

    fn teardown(&self) -> Result<()> {
        self.manager.destroy(&self.state)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EffectId {
    index: u32,
    generation: u32,
}

struct EffectEntry {
    effect: Effect,
    prev: Option<u32>,
    next: Option<u32>,
}

#[derive(Default)]
struct EffectSlot {
    generation: u32,
    entry: Option<EffectEntry>,
}

/// Doubly linked list of effects over an arena of slots
#[derive(Default)]
pub struct EffectList {
    slots: Vec<EffectSlot>,
    free_list: Vec<u32>,
    head: Option<u32>,
    tail: Option<u32>,
    len: usize,
}

impl EffectList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn id_at(&self, index: u32) -> EffectId {
        EffectId {
            index,
            generation: self.slots[index as usize].generation,
        }
    }

    pub fn head(&self) -> Option<EffectId> {
        self.head.map(|index| self.id_at(index))
    }

    fn entry(&self, id: EffectId) -> Option<&EffectEntry> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_ref()
    }

    pub fn get(&self, id: EffectId) -> Option<&Effect> {
        self.entry(id).map(|entry| &entry.effect)
    }

    pub fn get_mut(&mut self, id: EffectId) -> Option<&mut Effect> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_mut().map(|entry| &mut entry.effect)
    }

    fn alloc(&mut self, entry: EffectEntry) -> u32 {
        self.len += 1;
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation += 1;
            slot.entry = Some(entry);
            return index;
        }
        self.slots.push(EffectSlot {
            generation: 0,
            entry: Some(entry),
        });
        self.slots.len() as u32 - 1
    }

    fn set_prev(&mut self, index: Option<u32>, prev: Option<u32>) {
        match index {
            Some(index) => {
                if let Some(entry) = self.slots[index as usize].entry.as_mut() {
                    entry.prev = prev;
                }
            }
            None => self.tail = prev,
        }
    }

    fn set_next(&mut self, index: Option<u32>, next: Option<u32>) {
        match index {
            Some(index) => {
                if let Some(entry) = self.slots[index as usize].entry.as_mut() {
                    entry.next = next;
                }
            }
            None => self.head = next,
        }
    }

    pub fn push_back(&mut self, effect: Effect) -> EffectId {
        self.insert_before(effect, None)
    }

    /// Insert `effect` in front of `before`, or at the end when `before` is
    /// `None` or no longer in the list.
    pub fn insert_before(&mut self, effect: Effect, before: Option<EffectId>) -> EffectId {
        let next = before.filter(|id| self.entry(*id).is_some()).map(|id| id.index);
        let prev = match next {
            Some(index) => self.slots[index as usize].entry.as_ref().and_then(|entry| entry.prev),
            None => self.tail,
        };
        let index = self.alloc(EffectEntry { effect, prev, next });
        self.set_next(prev, Some(index));
        self.set_prev(next, Some(index));
        self.id_at(index)
    }

    pub fn remove(&mut self, id: EffectId) -> Option<Effect> {
        self.entry(id)?;
        let entry = self.slots[id.index as usize].entry.take()?;
        self.set_next(entry.prev, entry.next);
        self.set_prev(entry.next, entry.prev);
        self.free_list.push(id.index);
        self.len -= 1;
        Some(entry.effect)
    }

    /// Ids in list order
    pub fn ids(&self) -> Vec<EffectId> {
        let mut ids = Vec::with_capacity(self.len);
        let mut cursor = self.head;
        while let Some(index) = cursor {
            ids.push(self.id_at(index));
            cursor = self.slots[index as usize].entry.as_ref().and_then(|entry| entry.next);
        }
        ids
    }
}

impl fmt::Debug for EffectList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectList").field("len", &self.len).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::destroyables::DestructorRegistry;
    use stencil_reactive::TrackedCell;

    struct Logged {
        name: &'static str,
        log: Rc<RefCell<Vec<String>>>,
        input: Rc<TrackedCell<i32>>,
    }

    impl EffectHooks for Logged {
        fn setup(&self) -> Result<()> {
            let value = self.input.get();
            self.log.borrow_mut().push(format!("{} setup {value}", self.name));
            Ok(())
        }

        fn update(&self) -> Result<()> {
            let value = self.input.get();
            self.log.borrow_mut().push(format!("{} update {value}", self.name));
            Ok(())
        }

        fn teardown(&self) -> Result<()> {
            self.log.borrow_mut().push(format!("{} teardown", self.name));
            Ok(())
        }
    }

    fn owner() -> DestroyableId {
        DestructorRegistry::new().create_root()
    }

    #[test]
    fn effect_reruns_only_when_its_inputs_change() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let input = Rc::new(TrackedCell::new(1));
        let mut effect = Effect::new(
            Logged {
                name: "a",
                log: Rc::clone(&log),
                input: Rc::clone(&input),
            },
            owner(),
        );

        assert!(effect.run().unwrap());
        assert!(!effect.run().unwrap());
        input.set(2);
        assert!(effect.run().unwrap());
        effect.teardown().unwrap();

        assert_eq!(*log.borrow(), vec!["a setup 1", "a update 2", "a teardown"]);
    }

    #[test]
    fn list_keeps_order_across_inserts_and_removals() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let input = Rc::new(TrackedCell::new(0));
        let make = |name| {
            Effect::new(
                Logged {
                    name,
                    log: Rc::clone(&log),
                    input: Rc::clone(&input),
                },
                owner(),
            )
        };

        let mut list = EffectList::new();
        let b = list.push_back(make("b"));
        let c = list.push_back(make("c"));
        let a = list.insert_before(make("a"), list.head());
        assert_eq!(list.ids(), vec![a, b, c]);

        let removed = list.remove(b).unwrap();
        assert!(!removed.is_set_up());
        assert_eq!(list.ids(), vec![a, c]);
        assert!(list.remove(b).is_none());

        let d = list.push_back(make("d"));
        assert_ne!(d, b);
        assert_eq!(list.ids(), vec![a, c, d]);
        assert_eq!(list.len(), 3);
    }
}
