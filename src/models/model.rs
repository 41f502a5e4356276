use glam::DMat4;

use crate::models::color::Color;
use crate::models::material::Material;
use crate::models::mesh::Mesh;
use crate::models::mesh_utils::{flip_mesh_triangles_orientation, is_mirroring, transform_mesh};
use crate::models::node::{Node, NodeId};
use crate::models::property::PropertyGroup;

/// A mesh placed in the scene by a node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeshInstance {
    pub node: NodeId,
    pub mesh_index: usize,
    /// World transform of the instancing node.
    pub transformation: DMat4,
}

/// Format-independent scene: a node tree instancing meshes that reference materials by index.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Model {
    nodes: Vec<Node>,
    root: NodeId,
    pub materials: Vec<Material>,
    pub meshes: Vec<Mesh>,
    pub property_groups: Vec<PropertyGroup>,
}

impl Default for Model {
    fn default() -> Self {
        Model {
            nodes: vec![Node::default()],
            root: NodeId(0),
            materials: Vec::new(),
            meshes: Vec::new(),
            property_groups: Vec::new(),
        }
    }
}

impl Model {
    pub fn new() -> Self {
        Model::default()
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    /// Attach `node` as the last child of `parent` and return its handle.
    pub fn add_child_node(&mut self, parent: NodeId, mut node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        node.parent = Some(parent);
        node.children.clear();
        self.nodes.push(node);
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Detach `child` from `parent`. The detached subtree is no longer enumerated.
    pub fn remove_child_node(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[parent.0].children.retain(|&c| c != child);
        self.nodes[child.0].parent = None;
    }

    /// Pre-order traversal starting at `start`, `start` included.
    pub fn enumerate_nodes_from(&self, start: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            result.push(id);
            stack.extend(self.nodes[id.0].children.iter().rev());
        }
        result
    }

    /// Pre-order traversal of the whole tree, root first.
    pub fn enumerate_nodes(&self) -> Vec<NodeId> {
        self.enumerate_nodes_from(self.root)
    }

    /// Number of nodes reachable from the root, excluding the root itself.
    pub fn node_count(&self) -> usize {
        self.enumerate_nodes().len() - 1
    }

    /// Transform from node space to model space.
    pub fn world_transformation(&self, id: NodeId) -> DMat4 {
        let mut matrix = self.nodes[id.0].transformation;
        let mut parent = self.nodes[id.0].parent;
        while let Some(parent_id) = parent {
            let node = &self.nodes[parent_id.0];
            matrix = node.transformation * matrix;
            parent = node.parent;
        }
        matrix
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    pub fn add_material(&mut self, material: Material) -> usize {
        self.materials.push(material);
        self.materials.len() - 1
    }

    pub fn material(&self, index: usize) -> Option<&Material> {
        self.materials.get(index)
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn add_mesh(&mut self, mesh: Mesh) -> usize {
        self.meshes.push(mesh);
        self.meshes.len() - 1
    }

    pub fn add_mesh_to_root_node(&mut self, mesh: Mesh) -> usize {
        let index = self.add_mesh(mesh);
        let root = self.root;
        self.nodes[root.0].add_mesh_index(index);
        index
    }

    pub fn mesh(&self, index: usize) -> Option<&Mesh> {
        self.meshes.get(index)
    }

    pub fn mesh_mut(&mut self, index: usize) -> Option<&mut Mesh> {
        self.meshes.get_mut(index)
    }

    /// Remove a mesh and renumber every node reference to the meshes after it.
    pub fn remove_mesh(&mut self, index: usize) -> Mesh {
        let mesh = self.meshes.remove(index);
        for node in &mut self.nodes {
            node.mesh_indices.retain(|&i| i != index);
            for mesh_index in &mut node.mesh_indices {
                if *mesh_index > index {
                    *mesh_index -= 1;
                }
            }
        }
        mesh
    }

    pub fn add_property_group(&mut self, group: PropertyGroup) -> usize {
        self.property_groups.push(group);
        self.property_groups.len() - 1
    }

    /// Every mesh placement reachable from the root, in pre-order.
    pub fn mesh_instances(&self) -> Vec<MeshInstance> {
        self.enumerate_nodes()
            .into_iter()
            .flat_map(|id| {
                let transformation = self.world_transformation(id);
                self.nodes[id.0]
                    .mesh_indices
                    .iter()
                    .map(move |&mesh_index| MeshInstance {
                        node: id,
                        mesh_index,
                        transformation,
                    })
            })
            .collect()
    }

    pub fn mesh_instance_count(&self) -> usize {
        self.enumerate_nodes()
            .into_iter()
            .map(|id| self.nodes[id.0].mesh_indices.len())
            .sum()
    }

    /// Copies of every instanced mesh with the world transform baked into its geometry.
    pub fn transformed_mesh_instances(&self) -> Vec<Mesh> {
        self.mesh_instances()
            .into_iter()
            .filter_map(|instance| {
                let mut mesh = self.meshes.get(instance.mesh_index)?.clone();
                transform_mesh(&mut mesh, &instance.transformation);
                if is_mirroring(&instance.transformation) {
                    flip_mesh_triangles_orientation(&mut mesh);
                }
                Some(mesh)
            })
            .collect()
    }

    fn sum_over_instances(&self, count: impl Fn(&Mesh) -> usize) -> usize {
        self.mesh_instances()
            .iter()
            .filter_map(|instance| self.meshes.get(instance.mesh_index))
            .map(count)
            .sum()
    }

    pub fn vertex_count(&self) -> usize {
        self.sum_over_instances(Mesh::vertex_count)
    }

    pub fn vertex_color_count(&self) -> usize {
        self.sum_over_instances(Mesh::vertex_color_count)
    }

    pub fn normal_count(&self) -> usize {
        self.sum_over_instances(Mesh::normal_count)
    }

    pub fn uv_count(&self) -> usize {
        self.sum_over_instances(Mesh::uv_count)
    }

    pub fn triangle_count(&self) -> usize {
        self.sum_over_instances(Mesh::triangle_count)
    }

    /// Recolor every synthesized default material.
    pub fn set_default_material_color(&mut self, color: Color) {
        for material in self.materials.iter_mut().filter(|m| m.is_default) {
            material.color = color;
        }
    }

    pub fn summary(&self) -> ModelSummary {
        ModelSummary {
            meshes: self.mesh_count(),
            mesh_instances: self.mesh_instance_count(),
            materials: self.material_count(),
            nodes: self.node_count(),
            vertices: self.vertex_count(),
            vertex_colors: self.vertex_color_count(),
            normals: self.normal_count(),
            uvs: self.uv_count(),
            triangles: self.triangle_count(),
            property_groups: self.property_groups.clone(),
        }
    }
}

/// Counters over the mesh instances of a model, plus its model-level properties.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ModelSummary {
    pub meshes: usize,
    pub mesh_instances: usize,
    pub materials: usize,
    pub nodes: usize,
    pub vertices: usize,
    pub vertex_colors: usize,
    pub normals: usize,
    pub uvs: usize,
    pub triangles: usize,
    pub property_groups: Vec<PropertyGroup>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::mesh::Triangle;
    use glam::DVec3;

    fn triangle_mesh(name: &str) -> Mesh {
        let mut mesh = Mesh::new(name);
        mesh.add_vertex(DVec3::ZERO);
        mesh.add_vertex(DVec3::X);
        mesh.add_vertex(DVec3::Y);
        mesh.add_triangle(Triangle::new(0, 1, 2));
        mesh
    }

    #[test]
    fn test_node_tree() {
        let mut model = Model::new();
        let root = model.root();
        let a = model.add_child_node(root, Node::new("a"));
        let b = model.add_child_node(a, Node::new("b"));
        let c = model.add_child_node(root, Node::new("c"));
        assert_eq!(model.enumerate_nodes(), vec![root, a, b, c]);
        assert_eq!(model.node_count(), 3);
        assert_eq!(model.node(b).parent(), Some(a));

        model.remove_child_node(root, a);
        assert_eq!(model.enumerate_nodes(), vec![root, c]);
        assert_eq!(model.node(a).parent(), None);
    }

    #[test]
    fn test_world_transformation() {
        let mut model = Model::new();
        let root = model.root();
        let parent = model.add_child_node(
            root,
            Node::new("p").with_transformation(DMat4::from_translation(DVec3::X)),
        );
        let child = model.add_child_node(
            parent,
            Node::new("c").with_transformation(DMat4::from_scale(DVec3::splat(2.0))),
        );
        let world = model.world_transformation(child);
        assert_eq!(world.transform_point3(DVec3::Y), DVec3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn test_remove_mesh_renumbers_nodes() {
        let mut model = Model::new();
        let root = model.root();
        for name in ["a", "b", "c"] {
            model.add_mesh(triangle_mesh(name));
        }
        let node = model.add_child_node(root, Node::new("n"));
        model.node_mut(node).mesh_indices = vec![0, 1, 2];
        model.node_mut(root).mesh_indices = vec![2, 1];

        let removed = model.remove_mesh(1);
        assert_eq!(removed.name, "b");
        assert_eq!(model.node(node).mesh_indices, vec![0, 1]);
        assert_eq!(model.node(root).mesh_indices, vec![1]);
        assert_eq!(model.mesh(1).map(|m| m.name.as_str()), Some("c"));
    }

    #[test]
    fn test_instance_counters() {
        let mut model = Model::new();
        let root = model.root();
        let index = model.add_mesh_to_root_node(triangle_mesh("a"));
        let node = model.add_child_node(root, Node::new("n"));
        model.node_mut(node).add_mesh_index(index);
        assert_eq!(model.mesh_instance_count(), 2);
        assert_eq!(model.vertex_count(), 6);
        assert_eq!(model.triangle_count(), 2);
        assert_eq!(model.normal_count(), 0);

        let summary = model.summary();
        assert_eq!(summary.meshes, 1);
        assert_eq!(summary.mesh_instances, 2);
        assert_eq!(summary.nodes, 1);
        assert_eq!(summary.triangles, 2);
    }

    #[test]
    fn test_transformed_instances_flip_mirrored() {
        let mut model = Model::new();
        let root = model.root();
        let index = model.add_mesh(triangle_mesh("a"));
        let node = model.add_child_node(
            root,
            Node::new("mirror")
                .with_transformation(DMat4::from_scale(DVec3::new(-1.0, 1.0, 1.0))),
        );
        model.node_mut(node).add_mesh_index(index);

        let meshes = model.transformed_mesh_instances();
        assert_eq!(meshes.len(), 1);
        assert_eq!(meshes[0].vertices[1], DVec3::new(-1.0, 0.0, 0.0));
        assert_eq!(meshes[0].triangles[0].vertices, [0, 2, 1]);
        assert_eq!(model.meshes[0].vertices[1], DVec3::X);
    }

    #[test]
    fn test_default_material_color() {
        let mut model = Model::new();
        model.add_material(Material::phong());
        let mut default = Material::phong();
        default.is_default = true;
        model.add_material(default);
        model.set_default_material_color(Color::new(10, 20, 30));
        assert_eq!(model.materials[0].color, Color::BLACK);
        assert_eq!(model.materials[1].color, Color::new(10, 20, 30));
    }
}
