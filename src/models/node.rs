use glam::DMat4;

/// Handle of a [`Node`] inside its owning [`Model`](crate::models::model::Model).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Scene graph node. Links are kept by the model's node arena.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Node {
    pub name: String,
    /// Local transform relative to the parent.
    pub transformation: DMat4,
    pub mesh_indices: Vec<usize>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
}

impl Default for Node {
    fn default() -> Self {
        Node {
            name: String::new(),
            transformation: DMat4::IDENTITY,
            mesh_indices: Vec::new(),
            parent: None,
            children: Vec::new(),
        }
    }
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Node {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_transformation(mut self, transformation: DMat4) -> Self {
        self.transformation = transformation;
        self
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn add_mesh_index(&mut self, mesh_index: usize) -> usize {
        self.mesh_indices.push(mesh_index);
        self.mesh_indices.len() - 1
    }

    /// A node without meshes and without children.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty() && self.mesh_indices.is_empty()
    }

    pub fn is_mesh_node(&self) -> bool {
        self.children.is_empty() && self.mesh_indices.len() == 1
    }
}
