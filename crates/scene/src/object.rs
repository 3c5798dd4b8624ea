//! Game objects and their stable identifiers.

use std::num::NonZeroU32;

use crate::{Camera, PointLight, Transform};

/// Stable identifier of a [`GameObject`] within a scene.
///
/// Ids start at 1; the raw value 0 is reserved to mean "no object" and is
/// what a cleared object-id attachment reads back as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GameObjectId(NonZeroU32);

impl GameObjectId {
    /// Converts a raw id read back from the GPU. Zero maps to `None`.
    pub fn from_raw(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    /// Returns the raw non-zero value, suitable for writing into an
    /// object-id attachment.
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

/// Handle to mesh data owned by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshHandle(pub u32);

/// An entity in the scene.
///
/// Every object has a transform; components are optional. Parent and
/// children are stored as ids and resolved through the owning
/// [`Scene`](crate::Scene).
#[derive(Debug, Clone)]
pub struct GameObject {
    pub(crate) id: GameObjectId,
    /// Human-readable name for debugging.
    pub name: String,
    /// Local transform relative to the parent.
    pub transform: Transform,
    pub(crate) parent: Option<GameObjectId>,
    pub(crate) children: Vec<GameObjectId>,
    /// Optional camera component.
    pub camera: Option<Camera>,
    /// Optional mesh to render.
    pub mesh: Option<MeshHandle>,
    /// Optional point light component.
    pub point_light: Option<PointLight>,
}

impl GameObject {
    pub(crate) fn new(id: GameObjectId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            transform: Transform::default(),
            parent: None,
            children: Vec::new(),
            camera: None,
            mesh: None,
            point_light: None,
        }
    }

    /// Returns this object's id.
    pub fn id(&self) -> GameObjectId {
        self.id
    }

    /// Returns the parent id, if any.
    pub fn parent(&self) -> Option<GameObjectId> {
        self.parent
    }

    /// Returns the ids of direct children.
    pub fn children(&self) -> &[GameObjectId] {
        &self.children
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_zero_is_no_object() {
        assert!(GameObjectId::from_raw(0).is_none());
    }

    #[test]
    fn test_id_round_trips() {
        let id = GameObjectId::from_raw(42).unwrap();
        assert_eq!(id.get(), 42);
    }

    #[test]
    fn test_option_id_is_word_sized() {
        use std::mem::size_of;
        assert_eq!(size_of::<Option<GameObjectId>>(), size_of::<u32>());
    }
}
