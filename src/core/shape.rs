use std::fmt;
use std::str::FromStr;

use glam::DVec3;
use serde::{Deserialize, Serialize};

use super::types::{ContactMaterial, Transform};
use crate::error::UnsupportedElementError;

/// Abstract collision geometry as described by the model loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    /// Infinite plane through the collision origin with the given outward normal.
    Plane { normal: DVec3 },
    Sphere { radius: f64 },
    /// `size` holds the full extents along each axis.
    Box { size: DVec3 },
    /// Cylinder aligned with the local Z axis.
    Cylinder { radius: f64, length: f64 },
    /// Regular grid of heights, row-major, spanning `size.x` by `size.y`
    /// centred on the collision origin; heights are scaled by `size.z`.
    Heightmap {
        rows: usize,
        cols: usize,
        size: DVec3,
        heights: Vec<f64>,
    },
    Mesh {
        vertices: Vec<DVec3>,
        triangles: Vec<[u32; 3]>,
    },
    /// Sensor ray; carries no contact geometry.
    Ray { length: f64 },
}

impl Shape {
    pub fn shape_type(&self) -> ShapeType {
        match self {
            Shape::Plane { .. } => ShapeType::Plane,
            Shape::Sphere { .. } => ShapeType::Sphere,
            Shape::Box { .. } => ShapeType::Box,
            Shape::Cylinder { .. } => ShapeType::Cylinder,
            Shape::Heightmap { .. } => ShapeType::Heightmap,
            Shape::Mesh { .. } => ShapeType::Mesh,
            Shape::Ray { .. } => ShapeType::Ray,
        }
    }
}

/// Type tag used when shapes are requested by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShapeType {
    Plane,
    Sphere,
    Box,
    Cylinder,
    Heightmap,
    Mesh,
    Ray,
}

impl ShapeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShapeType::Plane => "plane",
            ShapeType::Sphere => "sphere",
            ShapeType::Box => "box",
            ShapeType::Cylinder => "cylinder",
            ShapeType::Heightmap => "heightmap",
            ShapeType::Mesh => "mesh",
            ShapeType::Ray => "ray",
        }
    }

    /// Unit-sized shape of this type, to be resized by the loader.
    pub fn default_shape(&self) -> Shape {
        match self {
            ShapeType::Plane => Shape::Plane { normal: DVec3::Z },
            ShapeType::Sphere => Shape::Sphere { radius: 0.5 },
            ShapeType::Box => Shape::Box { size: DVec3::ONE },
            ShapeType::Cylinder => Shape::Cylinder {
                radius: 0.5,
                length: 1.0,
            },
            ShapeType::Heightmap => Shape::Heightmap {
                rows: 2,
                cols: 2,
                size: DVec3::ONE,
                heights: vec![0.0; 4],
            },
            ShapeType::Mesh => Shape::Mesh {
                vertices: Vec::new(),
                triangles: Vec::new(),
            },
            ShapeType::Ray => Shape::Ray { length: 1.0 },
        }
    }
}

impl fmt::Display for ShapeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShapeType {
    type Err = UnsupportedElementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plane" => Ok(ShapeType::Plane),
            "sphere" => Ok(ShapeType::Sphere),
            "box" => Ok(ShapeType::Box),
            "cylinder" => Ok(ShapeType::Cylinder),
            "heightmap" => Ok(ShapeType::Heightmap),
            "mesh" | "trimesh" => Ok(ShapeType::Mesh),
            "ray" => Ok(ShapeType::Ray),
            other => Err(UnsupportedElementError::ShapeType(other.to_string())),
        }
    }
}

/// Collision element attached to a link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collision {
    pub name: String,
    pub shape: Shape,
    /// Pose relative to the owning link.
    pub pose: Transform,
    pub material: ContactMaterial,
}

impl Collision {
    pub fn new(name: impl Into<String>, shape: Shape) -> Self {
        Self {
            name: name.into(),
            shape,
            pose: Transform::IDENTITY,
            material: ContactMaterial::default(),
        }
    }

    pub fn with_pose(mut self, pose: Transform) -> Self {
        self.pose = pose;
        self
    }

    pub fn with_material(mut self, material: ContactMaterial) -> Self {
        self.material = material;
        self
    }
}
