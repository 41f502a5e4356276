//! Conversion of a triangle soup into per-material indexed vertex buffers.

use std::collections::HashMap;

use glam::{DVec2, DVec3};
use itertools::Itertools;

use crate::models::color::Color;
use crate::models::mesh::{Mesh, Triangle};
use crate::models::mesh_utils::calculate_triangle_normal;

/// One material-homogeneous run of deduplicated vertex data.
///
/// Attribute arrays are flattened: three numbers per position, normal and color,
/// two per uv. `colors` and `uvs` are empty when the source mesh has none.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PrimitiveBuffer {
    pub indices: Vec<u32>,
    pub vertices: Vec<f64>,
    /// Float RGB in `[0, 1]`, still in sRGB space.
    pub colors: Vec<f64>,
    pub normals: Vec<f64>,
    pub uvs: Vec<f64>,
    pub material: Option<usize>,
}

impl PrimitiveBuffer {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 3
    }

    /// Component-wise min and max over all positions.
    pub fn bounds(&self) -> ([f64; 3], [f64; 3]) {
        let mut min = [f64::INFINITY; 3];
        let mut max = [f64::NEG_INFINITY; 3];
        for vertex in self.vertices.chunks_exact(3) {
            for axis in 0..3 {
                min[axis] = min[axis].min(vertex[axis]);
                max[axis] = max[axis].max(vertex[axis]);
            }
        }
        (min, max)
    }

    /// Bytes needed to store this primitive with the given index and number widths.
    pub fn byte_length(&self, index_size: usize, number_size: usize) -> usize {
        let number_count =
            self.vertices.len() + self.colors.len() + self.normals.len() + self.uvs.len();
        self.indices.len() * index_size + number_count * number_size
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshBuffer {
    pub primitives: Vec<PrimitiveBuffer>,
}

impl MeshBuffer {
    pub fn primitive_count(&self) -> usize {
        self.primitives.len()
    }

    pub fn byte_length(&self, index_size: usize, number_size: usize) -> usize {
        self.primitives
            .iter()
            .map(|p| p.byte_length(index_size, number_size))
            .sum()
    }
}

/// Attribute values of one emitted buffer vertex, kept for reuse lookups.
struct BufferVertex {
    index: u32,
    color: Option<Color>,
    normal: DVec3,
    uv: Option<DVec2>,
}

struct CornerAttributes {
    vertex: DVec3,
    color: Option<Color>,
    normal: DVec3,
    uv: Option<DVec2>,
}

impl CornerAttributes {
    fn matches(&self, existing: &BufferVertex) -> bool {
        self.color == existing.color && self.normal == existing.normal && self.uv == existing.uv
    }
}

fn corner_attributes(
    mesh: &Mesh,
    triangle: &Triangle,
    corner: usize,
    flat: DVec3,
) -> CornerAttributes {
    let force_colors = !mesh.vertex_colors.is_empty();
    let force_uvs = !mesh.uvs.is_empty();

    let color = triangle
        .colors
        .and_then(|c| mesh.vertex_colors.get(c[corner]).copied())
        .or(force_colors.then_some(Color::BLACK));
    let uv = triangle
        .uvs
        .and_then(|u| mesh.uvs.get(u[corner]).copied())
        .or(force_uvs.then_some(DVec2::ZERO));
    let normal = triangle
        .normals
        .and_then(|n| mesh.normals.get(n[corner]).copied())
        .unwrap_or(flat);
    let vertex = mesh
        .vertices
        .get(triangle.vertices[corner])
        .copied()
        .unwrap_or(DVec3::ZERO);

    CornerAttributes {
        vertex,
        color,
        normal,
        uv,
    }
}

fn add_buffer_vertex(
    primitive: &mut PrimitiveBuffer,
    attributes: &CornerAttributes,
) -> BufferVertex {
    let index = primitive.vertex_count() as u32;
    primitive.indices.push(index);
    primitive.vertices.extend(attributes.vertex.to_array());
    if let Some(color) = attributes.color {
        primitive.colors.extend(color.to_float_components());
    }
    primitive.normals.extend(attributes.normal.to_array());
    if let Some(uv) = attributes.uv {
        primitive.uvs.extend(uv.to_array());
    }
    BufferVertex {
        index,
        color: attributes.color,
        normal: attributes.normal,
        uv: attributes.uv,
    }
}

/// Build the indexed representation of `mesh`, or `None` if it has no triangles.
///
/// Triangles are grouped by material in a stable order. Within a group a mesh vertex
/// is emitted once per distinct (color, normal, uv) combination it is used with.
pub fn build_mesh_buffer(mesh: &Mesh) -> Option<MeshBuffer> {
    if mesh.triangles.is_empty() {
        return None;
    }

    let triangle_order =
        (0..mesh.triangles.len()).sorted_by_key(|&index| mesh.triangles[index].material);

    let mut buffer = MeshBuffer::default();
    let mut candidates: HashMap<usize, Vec<BufferVertex>> = HashMap::new();
    for triangle_index in triangle_order {
        let triangle = &mesh.triangles[triangle_index];
        let starts_primitive = buffer
            .primitives
            .last()
            .is_none_or(|p| p.material != triangle.material);
        if starts_primitive {
            buffer.primitives.push(PrimitiveBuffer {
                material: triangle.material,
                ..Default::default()
            });
            candidates.clear();
        }
        let Some(primitive) = buffer.primitives.last_mut() else {
            continue;
        };

        let flat = if triangle.has_normals() {
            DVec3::ZERO
        } else {
            mesh.triangle_vertices(triangle)
                .map(|[v0, v1, v2]| calculate_triangle_normal(v0, v1, v2))
                .unwrap_or(DVec3::ZERO)
        };

        for corner in 0..3 {
            let attributes = corner_attributes(mesh, triangle, corner, flat);
            let vertex_candidates = candidates.entry(triangle.vertices[corner]).or_default();
            match vertex_candidates.iter().find(|c| attributes.matches(c)) {
                Some(existing) => primitive.indices.push(existing.index),
                None => {
                    let added = add_buffer_vertex(primitive, &attributes);
                    vertex_candidates.push(added);
                }
            }
        }
    }

    Some(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::finalization::{FinalizeOptions, check_model, finalize_model};
    use crate::models::model::Model;

    fn quad_mesh() -> Mesh {
        let mut mesh = Mesh::new("quad");
        mesh.add_vertex(DVec3::new(0.0, 0.0, 0.0));
        mesh.add_vertex(DVec3::new(1.0, 0.0, 0.0));
        mesh.add_vertex(DVec3::new(1.0, 1.0, 0.0));
        mesh.add_vertex(DVec3::new(0.0, 1.0, 0.0));
        mesh.add_normal(DVec3::new(0.0, 0.0, 1.0));
        mesh
    }

    fn cube_vertices(mesh: &mut Mesh) {
        for (x, y, z) in [
            (0.0, 0.0, 0.0),
            (1.0, 0.0, 0.0),
            (1.0, 1.0, 0.0),
            (0.0, 1.0, 0.0),
            (0.0, 0.0, 1.0),
            (1.0, 0.0, 1.0),
            (1.0, 1.0, 1.0),
            (0.0, 1.0, 1.0),
        ] {
            mesh.add_vertex(DVec3::new(x, y, z));
        }
    }

    const CUBE_FACES: [[usize; 3]; 12] = [
        [0, 1, 5],
        [0, 5, 4],
        [1, 2, 6],
        [1, 6, 5],
        [2, 3, 7],
        [2, 7, 6],
        [3, 0, 4],
        [3, 4, 7],
        [0, 3, 2],
        [0, 2, 1],
        [4, 5, 6],
        [4, 6, 7],
    ];

    #[test]
    fn test_two_materials() {
        let mut mesh = quad_mesh();
        for (x, y) in [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)] {
            mesh.add_vertex(DVec3::new(x, y, 1.0));
        }
        mesh.add_triangle(Triangle::new(4, 5, 6).with_normals(0, 0, 0).with_material(1));
        mesh.add_triangle(Triangle::new(0, 1, 2).with_normals(0, 0, 0).with_material(0));
        mesh.add_triangle(Triangle::new(4, 6, 7).with_normals(0, 0, 0).with_material(1));
        mesh.add_triangle(Triangle::new(0, 2, 3).with_normals(0, 0, 0).with_material(0));

        let buffer = build_mesh_buffer(&mesh).unwrap();
        assert_eq!(buffer.primitive_count(), 2);
        for (primitive, material) in buffer.primitives.iter().zip([0, 1]) {
            assert_eq!(primitive.material, Some(material));
            assert_eq!(primitive.indices, vec![0, 1, 2, 0, 2, 3]);
            assert_eq!(primitive.vertices.len(), 4 * 3);
            assert_eq!(primitive.normals.len(), 4 * 3);
            assert!(primitive.uvs.is_empty());
            assert!(primitive.colors.is_empty());
        }
        assert_eq!(buffer.primitives[1].vertices[2], 1.0);
    }

    #[test]
    fn test_shared_vertex_dedup() {
        let mut mesh = quad_mesh();
        mesh.add_triangle(Triangle::new(0, 1, 2).with_normals(0, 0, 0).with_material(0));
        mesh.add_triangle(Triangle::new(0, 2, 3).with_normals(0, 0, 0).with_material(0));
        let buffer = build_mesh_buffer(&mesh).unwrap();
        assert_eq!(buffer.primitives[0].indices.len(), 6);
        assert_eq!(buffer.primitives[0].vertex_count(), 4);
    }

    #[test]
    fn test_different_normals_split() {
        let mut mesh = quad_mesh();
        mesh.add_normal(DVec3::new(0.0, 0.0, -1.0));
        mesh.add_triangle(Triangle::new(0, 1, 2).with_normals(0, 0, 0).with_material(0));
        mesh.add_triangle(Triangle::new(0, 2, 3).with_normals(1, 1, 1).with_material(0));
        let buffer = build_mesh_buffer(&mesh).unwrap();
        assert_eq!(buffer.primitives.len(), 1);
        assert_eq!(buffer.primitives[0].indices.len(), 6);
        assert_eq!(buffer.primitives[0].vertex_count(), 6);
        assert_eq!(buffer.primitives[0].normals.len(), 6 * 3);
    }

    #[test]
    fn test_different_colors_split() {
        let mut mesh = quad_mesh();
        mesh.add_vertex_color(Color::new(10, 0, 0));
        mesh.add_vertex_color(Color::new(20, 0, 0));
        mesh.add_triangle(
            Triangle::new(0, 1, 2)
                .with_colors(0, 0, 0)
                .with_normals(0, 0, 0)
                .with_material(0),
        );
        mesh.add_triangle(
            Triangle::new(0, 2, 3)
                .with_colors(1, 1, 1)
                .with_normals(0, 0, 0)
                .with_material(0),
        );
        let buffer = build_mesh_buffer(&mesh).unwrap();
        assert_eq!(buffer.primitives[0].vertex_count(), 6);
        assert_eq!(buffer.primitives[0].colors.len(), 6 * 3);
        assert_eq!(buffer.primitives[0].colors[0], 10.0 / 255.0);
    }

    #[test]
    fn test_different_uvs_split() {
        let mut mesh = quad_mesh();
        mesh.add_uv(DVec2::new(1.0, 1.0));
        mesh.add_uv(DVec2::new(-1.0, -1.0));
        mesh.add_triangle(
            Triangle::new(0, 1, 2)
                .with_normals(0, 0, 0)
                .with_uvs(0, 0, 0)
                .with_material(0),
        );
        mesh.add_triangle(
            Triangle::new(0, 2, 3)
                .with_normals(0, 0, 0)
                .with_uvs(1, 1, 1)
                .with_material(0),
        );
        let buffer = build_mesh_buffer(&mesh).unwrap();
        assert_eq!(buffer.primitives[0].vertex_count(), 6);
        assert_eq!(buffer.primitives[0].uvs.len(), 6 * 2);
    }

    #[test]
    fn test_same_normals_and_uvs() {
        let mut mesh = quad_mesh();
        mesh.add_uv(DVec2::new(1.0, 1.0));
        mesh.add_triangle(
            Triangle::new(0, 1, 2)
                .with_normals(0, 0, 0)
                .with_uvs(0, 0, 0)
                .with_material(0),
        );
        mesh.add_triangle(
            Triangle::new(0, 2, 3)
                .with_normals(0, 0, 0)
                .with_uvs(0, 0, 0)
                .with_material(0),
        );
        let buffer = build_mesh_buffer(&mesh).unwrap();
        assert_eq!(buffer.primitives[0].vertex_count(), 4);
        assert_eq!(buffer.primitives[0].uvs.len(), 4 * 2);
    }

    #[test]
    fn test_missing_uv_uses_default() {
        let mut mesh = quad_mesh();
        mesh.add_uv(DVec2::ZERO);
        mesh.add_triangle(
            Triangle::new(0, 1, 2)
                .with_normals(0, 0, 0)
                .with_uvs(0, 0, 0)
                .with_material(0),
        );
        mesh.add_triangle(Triangle::new(0, 2, 3).with_normals(0, 0, 0).with_material(0));
        let buffer = build_mesh_buffer(&mesh).unwrap();
        assert_eq!(buffer.primitives[0].vertex_count(), 4);
        assert_eq!(buffer.primitives[0].uvs.len(), 4 * 2);
    }

    #[test]
    fn test_cube_auto_normals() {
        let mut mesh = Mesh::new("cube");
        cube_vertices(&mut mesh);
        for [v0, v1, v2] in CUBE_FACES {
            mesh.add_triangle(Triangle::new(v0, v1, v2));
        }
        let mut model = Model::new();
        model.add_mesh_to_root_node(mesh);
        finalize_model(&mut model, FinalizeOptions::default());
        assert!(check_model(&model).is_ok());

        let buffer = build_mesh_buffer(&model.meshes[0]).unwrap();
        assert_eq!(buffer.primitive_count(), 1);
        let primitive = &buffer.primitives[0];
        assert_eq!(primitive.indices.len(), 36);
        assert_eq!(primitive.vertex_count(), 24);
        assert_eq!(primitive.normals.len(), 24 * 3);
        assert!(primitive.uvs.is_empty());
        assert_eq!(primitive.byte_length(2, 4), 36 * 2 + 2 * 24 * 3 * 4);
        assert_eq!(buffer.byte_length(2, 4), 36 * 2 + 2 * 24 * 3 * 4);
        assert_eq!(primitive.bounds(), ([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]));
    }

    #[test]
    fn test_unfinalized_triangle_uses_flat_normal() {
        let mut mesh = quad_mesh();
        mesh.normals.clear();
        mesh.add_triangle(Triangle::new(0, 1, 2));
        let buffer = build_mesh_buffer(&mesh).unwrap();
        assert_eq!(buffer.primitives[0].material, None);
        assert_eq!(&buffer.primitives[0].normals[0..3], &[0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_empty_mesh() {
        assert!(build_mesh_buffer(&Mesh::new("empty")).is_none());
    }
}
