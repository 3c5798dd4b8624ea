//! Scene arena.
//!
//! Objects live in a growing `Vec`; a [`GameObjectId`] is the slot index
//! plus one, so raw id 0 never names a live object. Destroyed slots are
//! left as `None` and ids are never reused, which keeps stale ids (for
//! example from an old pick result) harmless.

use glam::Mat4;
use tracing::warn;

use crate::object::{GameObject, GameObjectId};

/// Owns all game objects and their hierarchy.
#[derive(Debug, Default)]
pub struct Scene {
    objects: Vec<Option<GameObject>>,
}

impl Scene {
    /// Creates an empty scene.
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(id: GameObjectId) -> usize {
        (id.get() - 1) as usize
    }

    /// Spawns a root object and returns its id.
    pub fn spawn(&mut self, name: impl Into<String>) -> GameObjectId {
        let raw = self.objects.len() as u32 + 1;
        // The arena grows one at a time from index 0, so raw is non-zero.
        let id = match GameObjectId::from_raw(raw) {
            Some(id) => id,
            None => unreachable!("arena ids start at 1"),
        };
        self.objects.push(Some(GameObject::new(id, name)));
        id
    }

    /// Spawns an object as a child of `parent` and returns its id.
    ///
    /// Falls back to spawning a root object when the parent does not exist.
    pub fn spawn_child(&mut self, parent: GameObjectId, name: impl Into<String>) -> GameObjectId {
        let id = self.spawn(name);
        match self.objects.get_mut(Self::slot(parent)).and_then(Option::as_mut) {
            Some(parent_obj) => {
                parent_obj.children.push(id);
                if let Some(child) = self.get_mut(id) {
                    child.parent = Some(parent);
                }
            }
            None => warn!("spawn_child: parent {:?} does not exist", parent),
        }
        id
    }

    /// Returns the object with the given id, if it is still alive.
    pub fn get(&self, id: GameObjectId) -> Option<&GameObject> {
        self.objects.get(Self::slot(id)).and_then(Option::as_ref)
    }

    /// Returns the object with the given id mutably, if it is still alive.
    pub fn get_mut(&mut self, id: GameObjectId) -> Option<&mut GameObject> {
        self.objects.get_mut(Self::slot(id)).and_then(Option::as_mut)
    }

    /// Destroys an object and its whole subtree.
    ///
    /// Destroying an already-dead id is a no-op.
    pub fn destroy(&mut self, id: GameObjectId) {
        let Some(object) = self.get(id) else {
            return;
        };
        let parent = object.parent;
        let children = object.children.clone();

        for child in children {
            self.destroy(child);
        }
        if let Some(parent) = parent {
            if let Some(parent_obj) = self.get_mut(parent) {
                parent_obj.children.retain(|&c| c != id);
            }
        }
        self.objects[Self::slot(id)] = None;
    }

    /// Returns the number of live objects.
    pub fn len(&self) -> usize {
        self.objects.iter().filter(|o| o.is_some()).count()
    }

    /// Returns true when the scene holds no live objects.
    pub fn is_empty(&self) -> bool {
        self.objects.iter().all(Option::is_none)
    }

    /// Iterates over all live objects.
    pub fn iter(&self) -> impl Iterator<Item = &GameObject> {
        self.objects.iter().filter_map(Option::as_ref)
    }

    /// Computes the world matrix of an object by walking its parent chain.
    ///
    /// Returns identity for dead ids. A parent destroyed out from under a
    /// live child terminates the chain as if the child were a root.
    pub fn world_matrix(&self, id: GameObjectId) -> Mat4 {
        let mut matrix = Mat4::IDENTITY;
        let mut current = Some(id);
        while let Some(cursor) = current {
            let Some(object) = self.get(cursor) else {
                break;
            };
            matrix = object.transform.local_matrix() * matrix;
            current = object.parent;
        }
        matrix
    }

    /// Returns the id of the first live object with a camera component.
    pub fn main_camera(&self) -> Option<GameObjectId> {
        self.iter().find(|o| o.camera.is_some()).map(|o| o.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Camera, Transform};
    use glam::Vec3;

    #[test]
    fn test_ids_start_at_one_and_grow() {
        let mut scene = Scene::new();
        let a = scene.spawn("a");
        let b = scene.spawn("b");
        assert_eq!(a.get(), 1);
        assert_eq!(b.get(), 2);
    }

    #[test]
    fn test_ids_are_not_reused() {
        let mut scene = Scene::new();
        let a = scene.spawn("a");
        scene.destroy(a);
        let b = scene.spawn("b");
        assert_ne!(a, b);
        assert!(scene.get(a).is_none());
        assert!(scene.get(b).is_some());
    }

    #[test]
    fn test_destroy_takes_subtree() {
        let mut scene = Scene::new();
        let root = scene.spawn("root");
        let child = scene.spawn_child(root, "child");
        let grandchild = scene.spawn_child(child, "grandchild");
        let other = scene.spawn("other");

        scene.destroy(child);

        assert!(scene.get(root).is_some());
        assert!(scene.get(child).is_none());
        assert!(scene.get(grandchild).is_none());
        assert!(scene.get(other).is_some());
        assert!(scene.get(root).unwrap().children().is_empty());
        assert_eq!(scene.len(), 2);
    }

    #[test]
    fn test_world_matrix_composes_parent_chain() {
        let mut scene = Scene::new();
        let root = scene.spawn("root");
        let child = scene.spawn_child(root, "child");

        scene.get_mut(root).unwrap().transform =
            Transform::from_position(Vec3::new(10.0, 0.0, 0.0));
        scene.get_mut(child).unwrap().transform =
            Transform::from_position(Vec3::new(0.0, 5.0, 0.0));

        let world = scene.world_matrix(child);
        let origin = world.transform_point3(Vec3::ZERO);
        assert!((origin - Vec3::new(10.0, 5.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_world_matrix_of_dead_id_is_identity() {
        let mut scene = Scene::new();
        let a = scene.spawn("a");
        scene.destroy(a);
        assert_eq!(scene.world_matrix(a), Mat4::IDENTITY);
    }

    #[test]
    fn test_main_camera_finds_first() {
        let mut scene = Scene::new();
        let _empty = scene.spawn("empty");
        let cam = scene.spawn("camera");
        scene.get_mut(cam).unwrap().camera = Some(Camera::default());

        assert_eq!(scene.main_camera(), Some(cam));
    }

    #[test]
    fn test_spawn_child_of_dead_parent_becomes_root() {
        let mut scene = Scene::new();
        let parent = scene.spawn("parent");
        scene.destroy(parent);
        let child = scene.spawn_child(parent, "child");

        assert!(scene.get(child).unwrap().parent().is_none());
    }
}
