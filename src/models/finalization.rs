//! Post-import normalization: missing normals, material assignment, empty mesh and
//! node pruning, plus the read-only [`check_model`] validation pass.

use std::collections::HashMap;
use std::fmt;

use bon::Builder;
use glam::DVec3;
use thiserror::Error;
use tracing::debug;

use crate::models::color::Color;
use crate::models::material::Material;
use crate::models::mesh::Mesh;
use crate::models::mesh_utils::calculate_triangle_normal;
use crate::models::model::Model;
use crate::models::node::NodeId;

/// Settings for [`ModelFinalizer`].
#[derive(Clone, Debug, Default, Builder)]
pub struct FinalizeOptions {
    /// Template for the synthesized default material.
    default_material: Option<Material>,
    /// Color of the synthesized default material when no template is given.
    #[builder(default)]
    default_color: Color,
}

impl FinalizeOptions {
    pub fn default_color(&self) -> Color {
        self.default_color
    }

    fn create_default_material(&self) -> Material {
        let mut material = match &self.default_material {
            Some(template) => template.clone(),
            None => {
                let mut material = Material::phong();
                material.color = self.default_color;
                material
            }
        };
        material.is_default = true;
        material
    }
}

/// Repairs an imported model in place. Never fails; see [`check_model`] for validation.
pub struct ModelFinalizer {
    options: FinalizeOptions,
    default_material_index: Option<usize>,
}

impl ModelFinalizer {
    pub fn new(options: FinalizeOptions) -> Self {
        ModelFinalizer {
            options,
            default_material_index: None,
        }
    }

    pub fn finalize(&mut self, model: &mut Model) {
        self.default_material_index = None;

        self.finalize_meshes(model);
        self.finalize_materials(model);
        self.finalize_nodes(model);

        debug!(
            meshes = model.mesh_count(),
            materials = model.material_count(),
            nodes = model.node_count(),
            "finalized model"
        );
    }

    fn finalize_meshes(&mut self, model: &mut Model) {
        let mut mesh_index = 0;
        while mesh_index < model.meshes.len() {
            if model.meshes[mesh_index].is_empty() {
                debug!(mesh_index, name = %model.meshes[mesh_index].name, "removing empty mesh");
                model.remove_mesh(mesh_index);
                continue;
            }
            self.finalize_mesh(model, mesh_index);
            mesh_index += 1;
        }
    }

    fn finalize_mesh(&mut self, model: &mut Model, mesh_index: usize) {
        let mesh = &model.meshes[mesh_index];
        let needs_material = mesh.triangles.iter().any(|t| t.material.is_none());
        let fallback_material = match (needs_material, mesh.material) {
            (false, _) => None,
            (true, Some(material)) => Some(material),
            (true, None) => Some(self.default_material_index(model)),
        };

        let mesh = &mut model.meshes[mesh_index];
        let mut calculate_curve_normals = false;
        for triangle_index in 0..mesh.triangles.len() {
            let triangle = &mesh.triangles[triangle_index];
            if !triangle.has_normals() {
                if triangle.curve.unwrap_or(0) == 0 {
                    let normal = flat_normal(mesh, triangle_index);
                    let normal_index = mesh.add_normal(normal);
                    mesh.triangles[triangle_index].normals =
                        Some([normal_index, normal_index, normal_index]);
                } else {
                    calculate_curve_normals = true;
                }
            }

            let triangle = &mut mesh.triangles[triangle_index];
            triangle.curve.get_or_insert(0);
            if triangle.material.is_none() {
                triangle.material = fallback_material;
            }
        }

        if calculate_curve_normals {
            calculate_curve_normals_for_mesh(mesh);
        }
    }

    fn finalize_materials(&mut self, model: &mut Model) {
        let Model {
            meshes, materials, ..
        } = model;
        for triangle in meshes.iter().flat_map(|mesh| &mesh.triangles) {
            if !triangle.has_vertex_colors() {
                continue;
            }
            if let Some(material) = triangle.material.and_then(|m| materials.get_mut(m)) {
                material.vertex_colors = true;
            }
        }
    }

    fn finalize_nodes(&mut self, model: &mut Model) {
        let root = model.root();
        let mut empty_nodes: Vec<NodeId> = model
            .enumerate_nodes()
            .into_iter()
            .filter(|&id| id != root && model.node(id).is_empty())
            .collect();

        let mut index = 0;
        while index < empty_nodes.len() {
            let node = empty_nodes[index];
            index += 1;
            let Some(parent) = model.node(node).parent() else {
                continue;
            };
            model.remove_child_node(parent, node);
            if parent != root && model.node(parent).is_empty() {
                empty_nodes.push(parent);
            }
        }
    }

    fn default_material_index(&mut self, model: &mut Model) -> usize {
        *self
            .default_material_index
            .get_or_insert_with(|| model.add_material(self.options.create_default_material()))
    }
}

fn flat_normal(mesh: &Mesh, triangle_index: usize) -> DVec3 {
    mesh.triangle_vertices(&mesh.triangles[triangle_index])
        .map(|[v0, v1, v2]| calculate_triangle_normal(v0, v1, v2))
        .unwrap_or(DVec3::ZERO)
}

/// Average the flat normals of same-group neighbors at every corner still lacking a normal.
fn calculate_curve_normals_for_mesh(mesh: &mut Mesh) {
    let triangle_normals: Vec<DVec3> = (0..mesh.triangles.len())
        .map(|index| flat_normal(mesh, index))
        .collect();

    let mut vertex_to_triangles: HashMap<usize, Vec<usize>> = HashMap::new();
    for (triangle_index, triangle) in mesh.triangles.iter().enumerate() {
        for vertex in triangle.vertices {
            vertex_to_triangles
                .entry(vertex)
                .or_default()
                .push(triangle_index);
        }
    }

    for triangle_index in 0..mesh.triangles.len() {
        let triangle = &mesh.triangles[triangle_index];
        if triangle.has_normals() {
            continue;
        }
        let curve = triangle.curve;
        let corners = triangle.vertices.map(|vertex| {
            average_normal(mesh, curve, &vertex_to_triangles[&vertex], &triangle_normals)
        });
        let normals = corners.map(|normal| mesh.add_normal(normal));
        mesh.triangles[triangle_index].normals = Some(normals);
    }
}

fn average_normal(
    mesh: &Mesh,
    curve: Option<u32>,
    neighbors: &[usize],
    triangle_normals: &[DVec3],
) -> DVec3 {
    let mut distinct: Vec<DVec3> = Vec::new();
    for &neighbor in neighbors {
        if mesh.triangles[neighbor].curve != curve {
            continue;
        }
        let normal = triangle_normals[neighbor];
        if !distinct.contains(&normal) {
            distinct.push(normal);
        }
    }
    if distinct.is_empty() {
        return DVec3::ZERO;
    }
    let sum: DVec3 = distinct.iter().sum();
    (sum / distinct.len() as f64).normalize_or_zero()
}

/// Finalize `model` in place with a one-shot [`ModelFinalizer`].
pub fn finalize_model(model: &mut Model, options: FinalizeOptions) {
    ModelFinalizer::new(options).finalize(model);
}

/// Which attribute index of a triangle failed validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexKind {
    Vertex,
    VertexColor,
    Normal,
    Uv,
    Material,
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IndexKind::Vertex => "vertex",
            IndexKind::VertexColor => "vertex color",
            IndexKind::Normal => "normal",
            IndexKind::Uv => "uv",
            IndexKind::Material => "material",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelCheckError {
    #[error("mesh {mesh}: vertex {index} has a NaN coordinate")]
    InvalidVertex { mesh: usize, index: usize },
    #[error("mesh {mesh}: normal {index} has a NaN coordinate")]
    InvalidNormal { mesh: usize, index: usize },
    #[error("mesh {mesh}: uv {index} has a NaN coordinate")]
    InvalidUv { mesh: usize, index: usize },
    #[error("mesh {mesh}: triangle {triangle} has a {kind} index out of range")]
    IndexOutOfRange {
        mesh: usize,
        triangle: usize,
        kind: IndexKind,
    },
    #[error("mesh {mesh}: triangle {triangle} has no normals")]
    MissingNormals { mesh: usize, triangle: usize },
    #[error("mesh {mesh}: triangle {triangle} has no material")]
    MissingMaterial { mesh: usize, triangle: usize },
    #[error("mesh {mesh}: triangle {triangle} has no smoothing group")]
    MissingCurve { mesh: usize, triangle: usize },
    #[error("mesh {mesh}: mesh material {material} out of range")]
    InvalidMeshMaterial { mesh: usize, material: usize },
    #[error("node {node}: mesh index {mesh} out of range")]
    InvalidNodeMesh { node: usize, mesh: usize },
}

/// Validate index ranges and numeric sanity of a finalized model. Does not mutate.
pub fn check_model(model: &Model) -> Result<(), ModelCheckError> {
    for (mesh_index, mesh) in model.meshes.iter().enumerate() {
        check_mesh(model, mesh_index, mesh)?;
    }

    for node in model.enumerate_nodes() {
        if let Some(&mesh) = model
            .node(node)
            .mesh_indices
            .iter()
            .find(|&&m| m >= model.mesh_count())
        {
            return Err(ModelCheckError::InvalidNodeMesh {
                node: node.index(),
                mesh,
            });
        }
    }

    Ok(())
}

fn check_mesh(model: &Model, mesh_index: usize, mesh: &Mesh) -> Result<(), ModelCheckError> {
    if let Some(index) = mesh.vertices.iter().position(|v| v.is_nan()) {
        return Err(ModelCheckError::InvalidVertex {
            mesh: mesh_index,
            index,
        });
    }
    if let Some(index) = mesh.normals.iter().position(|n| n.is_nan()) {
        return Err(ModelCheckError::InvalidNormal {
            mesh: mesh_index,
            index,
        });
    }
    if let Some(index) = mesh.uvs.iter().position(|uv| uv.is_nan()) {
        return Err(ModelCheckError::InvalidUv {
            mesh: mesh_index,
            index,
        });
    }
    if let Some(material) = mesh.material
        && material >= model.material_count()
    {
        return Err(ModelCheckError::InvalidMeshMaterial {
            mesh: mesh_index,
            material,
        });
    }

    for (triangle_index, triangle) in mesh.triangles.iter().enumerate() {
        let out_of_range = |kind| ModelCheckError::IndexOutOfRange {
            mesh: mesh_index,
            triangle: triangle_index,
            kind,
        };
        let in_range = |indices: &[usize; 3], count: usize| indices.iter().all(|&i| i < count);

        if !in_range(&triangle.vertices, mesh.vertex_count()) {
            return Err(out_of_range(IndexKind::Vertex));
        }
        if let Some(colors) = &triangle.colors
            && !in_range(colors, mesh.vertex_color_count())
        {
            return Err(out_of_range(IndexKind::VertexColor));
        }
        let Some(normals) = &triangle.normals else {
            return Err(ModelCheckError::MissingNormals {
                mesh: mesh_index,
                triangle: triangle_index,
            });
        };
        if !in_range(normals, mesh.normal_count()) {
            return Err(out_of_range(IndexKind::Normal));
        }
        if let Some(uvs) = &triangle.uvs
            && !in_range(uvs, mesh.uv_count())
        {
            return Err(out_of_range(IndexKind::Uv));
        }
        let Some(material) = triangle.material else {
            return Err(ModelCheckError::MissingMaterial {
                mesh: mesh_index,
                triangle: triangle_index,
            });
        };
        if material >= model.material_count() {
            return Err(out_of_range(IndexKind::Material));
        }
        if triangle.curve.is_none() {
            return Err(ModelCheckError::MissingCurve {
                mesh: mesh_index,
                triangle: triangle_index,
            });
        }
    }

    Ok(())
}
