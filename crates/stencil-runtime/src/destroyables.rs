//! Destructor registry.
//!
//! Destroyables form a tree: each rendered component owns a node under the
//! node of whatever rendered it. Nodes live in a generational arena, so an
//! id that outlives its node simply reads as destroyed.

use crate::error::{Result, RuntimeError};
use crate::instance::InstanceRef;
use crate::manager::Destroyable;

/// Generational index into the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DestroyableId {
    pub index: u32,
    pub generation: u32,
}

#[derive(Default)]
struct DestroyableNode {
    generation: u32,
    live: bool,
    children: Vec<DestroyableId>,
    destructors: Vec<Destroyable>,
    instances: Vec<InstanceRef>,
}

/// Everything released by one `destroy` call, children before parents
#[derive(Debug, Default)]
pub struct Teardown {
    pub destroyed: Vec<DestroyableId>,
    pub destructors: Vec<Destroyable>,
    pub instances: Vec<InstanceRef>,
}

impl Teardown {
    pub fn is_empty(&self) -> bool {
        self.destroyed.is_empty()
    }
}

#[derive(Default)]
pub struct DestructorRegistry {
    nodes: Vec<DestroyableNode>,
    free_list: Vec<u32>,
    live: usize,
}

impl DestructorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&mut self) -> DestroyableId {
        self.live += 1;
        if let Some(index) = self.free_list.pop() {
            let node = &mut self.nodes[index as usize];
            node.generation += 1;
            node.live = true;
            return DestroyableId {
                index,
                generation: node.generation,
            };
        }
        let index = self.nodes.len() as u32;
        self.nodes.push(DestroyableNode {
            live: true,
            ..DestroyableNode::default()
        });
        DestroyableId { index, generation: 0 }
    }

    pub fn create_root(&mut self) -> DestroyableId {
        self.alloc()
    }

    pub fn create_child(&mut self, parent: DestroyableId) -> Result<DestroyableId> {
        self.node(parent)?;
        let child = self.alloc();
        self.node_mut(parent)?.children.push(child);
        Ok(child)
    }

    fn node(&self, id: DestroyableId) -> Result<&DestroyableNode> {
        self.nodes
            .get(id.index as usize)
            .filter(|node| node.live && node.generation == id.generation)
            .ok_or_else(|| RuntimeError::invariant(format!("destroyable {id:?} is already destroyed")))
    }

    fn node_mut(&mut self, id: DestroyableId) -> Result<&mut DestroyableNode> {
        self.nodes
            .get_mut(id.index as usize)
            .filter(|node| node.live && node.generation == id.generation)
            .ok_or_else(|| RuntimeError::invariant(format!("destroyable {id:?} is already destroyed")))
    }

    pub fn associate(&mut self, id: DestroyableId, destroyable: Destroyable) -> Result<()> {
        self.node_mut(id)?.destructors.push(destroyable);
        Ok(())
    }

    /// Tie an instance's lifetime to `id`
    pub fn adopt_instance(&mut self, id: DestroyableId, instance: InstanceRef) -> Result<()> {
        self.node_mut(id)?.instances.push(instance);
        Ok(())
    }

    pub fn is_live(&self, id: DestroyableId) -> bool {
        self.node(id).is_ok()
    }

    pub fn is_destroyed(&self, id: DestroyableId) -> bool {
        !self.is_live(id)
    }

    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Release `id` and everything below it. Destroying a dead id is a no-op.
    pub fn destroy(&mut self, id: DestroyableId) -> Result<Teardown> {
        let mut teardown = Teardown::default();
        if self.is_destroyed(id) {
            log::debug!("destroyable {id:?} was already destroyed");
            return Ok(teardown);
        }
        self.collect(id, &mut teardown);
        for node in &mut self.nodes {
            if node.live {
                node.children.retain(|child| *child != id);
            }
        }
        Ok(teardown)
    }

    fn collect(&mut self, id: DestroyableId, teardown: &mut Teardown) {
        let children = std::mem::take(&mut self.nodes[id.index as usize].children);
        for child in children {
            if self.is_live(child) {
                self.collect(child, teardown);
            }
        }
        let node = &mut self.nodes[id.index as usize];
        node.live = false;
        teardown.destructors.append(&mut node.destructors);
        teardown.instances.append(&mut node.instances);
        teardown.destroyed.push(id);
        self.free_list.push(id.index);
        self.live -= 1;
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn children_are_torn_down_before_parents() {
        let mut registry = DestructorRegistry::new();
        let root = registry.create_root();
        let child = registry.create_child(root).unwrap();
        let grandchild = registry.create_child(child).unwrap();

        let log = Rc::new(RefCell::new(Vec::new()));
        for (id, name) in [(root, "root"), (child, "child"), (grandchild, "grandchild")] {
            let log = Rc::clone(&log);
            registry
                .associate(id, Destroyable::new(move || log.borrow_mut().push(name)))
                .unwrap();
        }

        let teardown = registry.destroy(root).unwrap();
        assert_eq!(teardown.destroyed, vec![grandchild, child, root]);
        for destructor in teardown.destructors {
            let (_, destroy) = destructor.into_hooks();
            destroy();
        }
        assert_eq!(*log.borrow(), vec!["grandchild", "child", "root"]);
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn stale_ids_read_as_destroyed() {
        let mut registry = DestructorRegistry::new();
        let first = registry.create_root();
        registry.destroy(first).unwrap();
        let reused = registry.create_root();

        assert_eq!(reused.index, first.index);
        assert!(registry.is_destroyed(first));
        assert!(registry.is_live(reused));
        assert!(registry.destroy(first).unwrap().is_empty());
        assert!(registry.associate(first, Destroyable::new(|| {})).is_err());
    }

    #[test]
    fn destroying_a_child_detaches_it_from_its_parent() {
        let mut registry = DestructorRegistry::new();
        let root = registry.create_root();
        let child = registry.create_child(root).unwrap();
        registry.destroy(child).unwrap();

        let teardown = registry.destroy(root).unwrap();
        assert_eq!(teardown.destroyed, vec![root]);
    }
}
