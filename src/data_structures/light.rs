//! Light records used by the standard shader.

use cgmath::Vector3;

use crate::data_structures::color::Color;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LightType {
    Point = 0,
    Directional,
    Spot,
}

/// Handle into the light pool of a [`Context`](crate::context::Context).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LightId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightData {
    pub id: LightId,
    pub light_type: LightType,
    pub enabled: bool,

    pub position: Vector3<f32>,
    /// Cone direction target for directional and spot lights.
    pub target: Vector3<f32>,
    /// Attenuation radius in world units.
    pub radius: f32,

    pub diffuse: Color,
    pub intensity: f32,

    /// Maximum cone angle in degrees, spot lights only.
    pub cone_angle: f32,
}

impl LightData {
    pub fn new(id: LightId, light_type: LightType, position: Vector3<f32>, diffuse: Color) -> Self {
        Self {
            id,
            light_type,
            enabled: true,
            position,
            target: Vector3::new(0.0, 0.0, 0.0),
            radius: 10.0,
            diffuse,
            intensity: 1.0,
            cone_angle: 30.0,
        }
    }
}
