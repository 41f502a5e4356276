use glam::{DVec2, DVec3};

use crate::models::color::Color;
use crate::models::property::PropertyGroup;

/// One face of a [`Mesh`]. Attribute indices point into the owning mesh's lists.
///
/// Normal, uv and color indices are all-or-none per attribute, so each set is
/// stored as a single optional triple.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Triangle {
    pub vertices: [usize; 3],
    pub colors: Option<[usize; 3]>,
    pub normals: Option<[usize; 3]>,
    pub uvs: Option<[usize; 3]>,
    pub material: Option<usize>,
    /// Smoothing group. `None` is normalized to `0` during finalization.
    pub curve: Option<u32>,
}

impl Triangle {
    pub fn new(v0: usize, v1: usize, v2: usize) -> Self {
        Triangle {
            vertices: [v0, v1, v2],
            ..Default::default()
        }
    }

    pub fn with_normals(mut self, n0: usize, n1: usize, n2: usize) -> Self {
        self.normals = Some([n0, n1, n2]);
        self
    }

    pub fn with_uvs(mut self, u0: usize, u1: usize, u2: usize) -> Self {
        self.uvs = Some([u0, u1, u2]);
        self
    }

    pub fn with_colors(mut self, c0: usize, c1: usize, c2: usize) -> Self {
        self.colors = Some([c0, c1, c2]);
        self
    }

    pub fn with_material(mut self, material: usize) -> Self {
        self.material = Some(material);
        self
    }

    pub fn with_curve(mut self, curve: u32) -> Self {
        self.curve = Some(curve);
        self
    }

    pub fn has_normals(&self) -> bool {
        self.normals.is_some()
    }

    pub fn has_uvs(&self) -> bool {
        self.uvs.is_some()
    }

    pub fn has_vertex_colors(&self) -> bool {
        self.colors.is_some()
    }

    /// Reverse the winding by swapping the second and third corner of every attribute.
    pub fn flip(&mut self) {
        self.vertices.swap(1, 2);
        for corners in [&mut self.normals, &mut self.uvs, &mut self.colors]
            .into_iter()
            .flatten()
        {
            corners.swap(1, 2);
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Mesh {
    pub name: String,
    pub vertices: Vec<DVec3>,
    pub vertex_colors: Vec<Color>,
    pub normals: Vec<DVec3>,
    pub uvs: Vec<DVec2>,
    pub triangles: Vec<Triangle>,
    /// Material applied to triangles that carry none of their own.
    pub material: Option<usize>,
    pub property_groups: Vec<PropertyGroup>,
}

impl Mesh {
    pub fn new(name: impl Into<String>) -> Self {
        Mesh {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn add_vertex(&mut self, vertex: DVec3) -> usize {
        self.vertices.push(vertex);
        self.vertices.len() - 1
    }

    pub fn add_vertex_color(&mut self, color: Color) -> usize {
        self.vertex_colors.push(color);
        self.vertex_colors.len() - 1
    }

    pub fn add_normal(&mut self, normal: DVec3) -> usize {
        self.normals.push(normal);
        self.normals.len() - 1
    }

    pub fn add_uv(&mut self, uv: DVec2) -> usize {
        self.uvs.push(uv);
        self.uvs.len() - 1
    }

    pub fn add_triangle(&mut self, triangle: Triangle) -> usize {
        self.triangles.push(triangle);
        self.triangles.len() - 1
    }

    pub fn add_property_group(&mut self, group: PropertyGroup) -> usize {
        self.property_groups.push(group);
        self.property_groups.len() - 1
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn vertex_color_count(&self) -> usize {
        self.vertex_colors.len()
    }

    pub fn normal_count(&self) -> usize {
        self.normals.len()
    }

    pub fn uv_count(&self) -> usize {
        self.uvs.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Positions of a triangle's three corners.
    pub fn triangle_vertices(&self, triangle: &Triangle) -> Option<[DVec3; 3]> {
        let [v0, v1, v2] = triangle.vertices;
        Some([
            *self.vertices.get(v0)?,
            *self.vertices.get(v1)?,
            *self.vertices.get(v2)?,
        ])
    }
}
