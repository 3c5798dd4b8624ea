//! Scene graph and components for the Ember engine.
//!
//! A [`Scene`] is an arena of [`GameObject`]s linked by ids. Components
//! (camera, mesh, point light) hang off objects; spatial state lives in
//! each object's [`Transform`] and is composed through the parent chain.

pub mod camera;
pub mod light;
pub mod object;
pub mod scene;
pub mod transform;

pub use camera::{Camera, Projection};
pub use light::PointLight;
pub use object::{GameObject, GameObjectId, MeshHandle};
pub use scene::Scene;
pub use transform::Transform;
