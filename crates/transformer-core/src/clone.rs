//! Cloning the selection, at entity or part granularity.

use crate::domain::Granularity;
use crate::scene::{EntityId, NodeId, Scene};
use crate::session::ManipulationSession;
use std::collections::HashMap;

impl ManipulationSession {
    /// Clone every selected member and optionally select the clones.
    /// Returns the cloned nodes (entity roots at entity granularity).
    pub fn clone_selected<S: Scene + ?Sized>(
        &mut self,
        scene: &mut S,
        select_new: bool,
        append: bool,
    ) -> Vec<NodeId> {
        let selected = self.selection.as_slice().to_vec();
        let clones = self.clone_from_list(scene, &selected);
        if select_new {
            self.select_nodes(scene, &clones, append);
        }
        clones
    }

    /// Clone the given nodes without touching the selection.
    pub fn clone_from_list<S: Scene + ?Sized>(&mut self, scene: &mut S, nodes: &[NodeId]) -> Vec<NodeId> {
        let clones = match self.config.granularity {
            Granularity::Part => clone_parts(scene, nodes),
            Granularity::Entity => {
                let owners: Vec<EntityId> = nodes.iter().filter_map(|n| scene.owner(*n)).collect();
                clone_entities(scene, &owners)
            }
        };
        log::debug!("Cloned {} of {} nodes", clones.len(), nodes.len());

        // spawning must not interrupt a drag in progress
        if self.domain.is_active() {
            let domain = self.domain;
            if let Some(gizmo) = self.gizmo.as_mut() {
                gizmo.set_progress_state(true, domain);
            }
        }
        clones
    }
}

/// Spawn one copy per distinct entity and return the copies' roots.
pub fn clone_entities<S: Scene + ?Sized>(scene: &mut S, entities: &[EntityId]) -> Vec<NodeId> {
    let mut processed: Vec<EntityId> = Vec::new();
    let mut roots = Vec::new();
    for &template in entities {
        if processed.contains(&template) {
            continue;
        }
        processed.push(template);

        let Some(copy) = scene.spawn_from_template(template) else {
            log::warn!("Could not clone entity {}", template);
            continue;
        };
        match scene.root_of(copy) {
            Some(root) => roots.push(root),
            None => log::warn!("Cloned entity {} has no root", copy),
        }
    }
    roots
}

/// Duplicate parts inside their owners, then rebuild the hierarchy between
/// the copies.
///
/// A copy goes under the copy of its original parent when that parent was
/// cloned in the same batch. Otherwise the original ancestors are walked
/// until one with a copy is found; reaching the owner's root without finding
/// one attaches the copy to its original parent.
pub fn clone_parts<S: Scene + ?Sized>(scene: &mut S, parts: &[NodeId]) -> Vec<NodeId> {
    // original -> copy
    let mut copies: HashMap<NodeId, NodeId> = HashMap::new();
    // copy -> original parent, in clone order
    let mut pending: Vec<(NodeId, NodeId)> = Vec::new();
    let mut clones = Vec::new();

    for &part in parts {
        let Some(entity) = scene.owner(part) else {
            log::warn!("Cannot clone {}: not in the scene", part);
            continue;
        };
        let Some(copy) = scene.duplicate_part(part) else {
            log::warn!("Could not duplicate part {}", part);
            continue;
        };
        clones.push(copy);
        copies.insert(part, copy);

        let root = scene.root_of(entity);
        let original_parent = match scene.parent(part) {
            Some(parent) if root != Some(part) => parent,
            // the root maps onto itself, see the self-parent check below
            _ => part,
        };
        pending.push((copy, original_parent));
    }

    for (copy, original_parent) in pending {
        let parent = match copies.get(&original_parent) {
            Some(&cloned) if cloned != copy => cloned,
            Some(_) => original_parent,
            None => cloned_ancestor(&*scene, &copies, original_parent).unwrap_or(original_parent),
        };
        if !scene.attach(copy, parent) {
            log::warn!("Could not attach clone {} to {}", copy, parent);
        }
    }
    clones
}

/// Walk up from `start` looking for an ancestor that has a copy. Stops at
/// the owner's root.
fn cloned_ancestor<S: Scene + ?Sized>(
    scene: &S,
    copies: &HashMap<NodeId, NodeId>,
    start: NodeId,
) -> Option<NodeId> {
    let root = scene.owner(start).and_then(|e| scene.root_of(e));
    let mut current = start;
    loop {
        if Some(current) == root {
            return None;
        }
        let parent = scene.parent(current)?;
        if let Some(&cloned) = copies.get(&parent) {
            return Some(cloned);
        }
        current = parent;
    }
}
