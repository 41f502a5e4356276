//! Geometric helpers shared by the finalizer, the importers and the exporters.

use glam::{DMat4, DVec3};

use crate::models::mesh::Mesh;

/// Determinants closer to zero than this are treated as zero.
pub const DETERMINANT_EPSILON: f64 = 1.0e-8;

/// Unit face normal of the triangle `(v0, v1, v2)` with counter-clockwise winding.
///
/// Degenerate triangles yield the zero vector.
pub fn calculate_triangle_normal(v0: DVec3, v1: DVec3, v2: DVec3) -> DVec3 {
    let v = v1 - v0;
    let w = v2 - v0;
    v.cross(w).normalize_or_zero()
}

/// Whether `matrix` flips handedness.
pub fn is_mirroring(matrix: &DMat4) -> bool {
    matrix.determinant() < -DETERMINANT_EPSILON
}

/// Transform vertices and normals of `mesh` in place.
///
/// Normals are rotated by the rotation part of the matrix only.
pub fn transform_mesh(mesh: &mut Mesh, matrix: &DMat4) {
    if *matrix == DMat4::IDENTITY {
        return;
    }

    for vertex in &mut mesh.vertices {
        *vertex = matrix.transform_point3(*vertex);
    }

    if !mesh.normals.is_empty() {
        let (_, rotation, _) = matrix.to_scale_rotation_translation();
        for normal in &mut mesh.normals {
            *normal = rotation * *normal;
        }
    }
}

pub fn flip_mesh_triangles_orientation(mesh: &mut Mesh) {
    for triangle in &mut mesh.triangles {
        triangle.flip();
    }
}

/// Axis-aligned bounds of all vertices, or `None` for a mesh without vertices.
pub fn mesh_bounding_box(mesh: &Mesh) -> Option<(DVec3, DVec3)> {
    let first = *mesh.vertices.first()?;
    Some(
        mesh.vertices
            .iter()
            .fold((first, first), |(min, max), v| (min.min(*v), max.max(*v))),
    )
}
