//! Importer for the 3DS chunk format.
//!
//! The file is a tree of chunks: an editor section holding materials and triangle
//! meshes, and an optional keyframer section holding a node hierarchy. When the
//! keyframer section is present, mesh geometry is baked into world space using
//! each node's transform, and meshes instanced by several nodes are duplicated.

use std::collections::{HashMap, HashSet};

use glam::{DMat4, DQuat, DVec2, DVec3};
use rootcause::Report;
use tracing::{debug, trace, warn};
use winnow::Parser;
use winnow::binary::{le_f32, le_i32, le_u8, le_u16, le_u32};
use winnow::token::take;

use crate::data::chunk::{Chunk, ChunkReader};
use crate::data::parser_utils::{WResult, consumed, parse_name, parse_vector};
use crate::error::ParseError;
use crate::import::{Direction, ImportCallbacks, ImportError, Importer};
use crate::models::color::Color;
use crate::models::material::{Material, PhongProperties, Shading, TextureMap};
use crate::models::mesh::{Mesh, Triangle};
use crate::models::mesh_utils::{
    DETERMINANT_EPSILON, flip_mesh_triangles_orientation, is_mirroring, transform_mesh,
};
use crate::models::model::Model;
use crate::models::node::{Node, NodeId};

mod chunk_id {
    pub const MAIN: u16 = 0x4D4D;
    pub const EDITOR: u16 = 0x3D3D;
    pub const MATERIAL: u16 = 0xAFFF;
    pub const MAT_NAME: u16 = 0xA000;
    pub const MAT_AMBIENT: u16 = 0xA010;
    pub const MAT_DIFFUSE: u16 = 0xA020;
    pub const MAT_SPECULAR: u16 = 0xA030;
    pub const MAT_SHININESS: u16 = 0xA040;
    pub const MAT_SHININESS_STRENGTH: u16 = 0xA041;
    pub const MAT_TRANSPARENCY: u16 = 0xA050;
    pub const MAT_TEXMAP: u16 = 0xA200;
    pub const MAT_SPECMAP: u16 = 0xA204;
    pub const MAT_BUMPMAP: u16 = 0xA230;
    pub const MAT_SELFIMAP: u16 = 0xA33D;
    pub const MAT_MAPNAME: u16 = 0xA300;
    pub const MAT_MAP_USCALE: u16 = 0xA354;
    pub const MAT_MAP_VSCALE: u16 = 0xA356;
    pub const MAT_MAP_UOFFSET: u16 = 0xA358;
    pub const MAT_MAP_VOFFSET: u16 = 0xA35A;
    pub const MAT_MAP_ROTATION: u16 = 0xA35C;
    pub const COLOR_F: u16 = 0x0010;
    pub const COLOR_24: u16 = 0x0011;
    pub const LIN_COLOR_24: u16 = 0x0012;
    pub const LIN_COLOR_F: u16 = 0x0013;
    pub const PERCENTAGE_INT: u16 = 0x0030;
    pub const PERCENTAGE_F: u16 = 0x0031;
    pub const OBJECT: u16 = 0x4000;
    pub const OBJ_TRIMESH: u16 = 0x4100;
    pub const OBJ_LIGHT: u16 = 0x4600;
    pub const OBJ_CAMERA: u16 = 0x4700;
    pub const TRI_VERTEX: u16 = 0x4110;
    pub const TRI_FACE: u16 = 0x4120;
    pub const TRI_MATERIAL: u16 = 0x4130;
    pub const TRI_TEXVERTEX: u16 = 0x4140;
    pub const TRI_SMOOTH: u16 = 0x4150;
    pub const TRI_TRANSFORMATION: u16 = 0x4160;
    pub const KEYFRAMER: u16 = 0xB000;
    pub const OBJECT_NODE: u16 = 0xB002;
    pub const NODE_HIERARCHY: u16 = 0xB010;
    pub const NODE_INSTANCE_NAME: u16 = 0xB011;
    pub const NODE_PIVOT: u16 = 0xB013;
    pub const POSITION_TRACK: u16 = 0xB020;
    pub const ROTATION_TRACK: u16 = 0xB021;
    pub const SCALE_TRACK: u16 = 0xB022;
    pub const NODE_ID: u16 = 0xB030;
}

/// Parent id marking a top-level keyframe node.
const ROOT_PARENT_ID: u16 = 0xFFFF;
const DUMMY_NODE_NAME: &str = "$$$DUMMY";
/// Bytes of track header preceding the key count.
const TRACK_HEADER_SIZE: usize = 10;

type PResult<T> = Result<T, Report<ParseError>>;

pub struct ThreeDsImporter;

impl Importer for ThreeDsImporter {
    fn can_import_extension(&self, extension: &str) -> bool {
        extension == "3ds"
    }

    fn up_direction(&self) -> Direction {
        Direction::Z
    }

    fn import(
        &self,
        content: &[u8],
        callbacks: &dyn ImportCallbacks,
    ) -> Result<Model, Report<ImportError>> {
        let mut reader = ThreeDsReader::new(callbacks);
        reader.read(content).map_err(ImportError::from_parse_report)?;
        Ok(reader.finish())
    }
}

/// Run a winnow parser over a whole leaf payload.
fn parse_leaf<T>(
    chunk: &Chunk<'_>,
    mut parser: impl FnMut(&mut &[u8]) -> WResult<T>,
) -> PResult<T> {
    parse_prefix(chunk, &mut parser).map(|(value, _)| value)
}

/// Run a winnow parser over the start of a payload, returning the bytes it consumed.
fn parse_prefix<T>(
    chunk: &Chunk<'_>,
    mut parser: impl FnMut(&mut &[u8]) -> WResult<T>,
) -> PResult<(T, usize)> {
    let mut input = chunk.data;
    match parser(&mut input) {
        Ok(value) => Ok((value, consumed(chunk.data, input))),
        Err(e) => Err(Report::new(ParseError::winnow(
            chunk.payload_offset(),
            consumed(chunk.data, input),
            e,
        ))),
    }
}

fn skip_chunk(chunk: &Chunk<'_>) {
    trace!(
        "skipping chunk 0x{:04X} at 0x{:X} ({} bytes)",
        chunk.id,
        chunk.offset,
        chunk.data.len()
    );
}

fn parse_color_24(input: &mut &[u8]) -> WResult<Color> {
    let r = le_u8.parse_next(input)?;
    let g = le_u8.parse_next(input)?;
    let b = le_u8.parse_next(input)?;
    Ok(Color::new(r, g, b))
}

fn parse_color_f(input: &mut &[u8]) -> WResult<Color> {
    let [r, g, b] = parse_vector(input)?;
    Ok(Color::from_float_components(r, g, b))
}

fn parse_f64(input: &mut &[u8]) -> WResult<f64> {
    le_f32.parse_next(input).map(f64::from)
}

fn parse_uv(input: &mut &[u8]) -> WResult<DVec2> {
    let u = parse_f64(input)?;
    let v = parse_f64(input)?;
    Ok(DVec2::new(u, v))
}

/// Four rows of three floats; the last row is the translation.
fn parse_transformation(input: &mut &[u8]) -> WResult<DMat4> {
    let mut columns = [0.0f64; 16];
    for row in 0..4 {
        let [x, y, z] = parse_vector(input)?;
        columns[row * 4] = x;
        columns[row * 4 + 1] = y;
        columns[row * 4 + 2] = z;
        columns[row * 4 + 3] = if row == 3 { 1.0 } else { 0.0 };
    }
    Ok(DMat4::from_cols_array(&columns))
}

fn parse_face(input: &mut &[u8]) -> WResult<Triangle> {
    let v0 = le_u16.parse_next(input)?;
    let v1 = le_u16.parse_next(input)?;
    let v2 = le_u16.parse_next(input)?;
    let _flags = le_u16.parse_next(input)?;
    Ok(Triangle::new(v0 as usize, v1 as usize, v2 as usize))
}

fn parse_counted<T>(
    input: &mut &[u8],
    mut item: impl FnMut(&mut &[u8]) -> WResult<T>,
) -> WResult<Vec<T>> {
    let count = le_u16.parse_next(input)?;
    let mut items = Vec::new();
    for _ in 0..count {
        items.push(item(input)?);
    }
    Ok(items)
}

fn parse_face_materials(input: &mut &[u8]) -> WResult<(String, Vec<u16>)> {
    let name = parse_name(input)?;
    let faces = parse_counted(input, |input| le_u16.parse_next(input))?;
    Ok((name, faces))
}

fn parse_node_hierarchy(input: &mut &[u8]) -> WResult<(String, u32, u16)> {
    let name = parse_name(input)?;
    let flags = le_u32.parse_next(input)?;
    let parent_id = le_u16.parse_next(input)?;
    Ok((name, flags, parent_id))
}

/// Keyframe track: a fixed header, a key count, then one value per key.
fn parse_track<T>(
    input: &mut &[u8],
    mut key: impl FnMut(&mut &[u8]) -> WResult<T>,
) -> WResult<Vec<T>> {
    let _ = take(TRACK_HEADER_SIZE).parse_next(input)?;
    let key_count = le_i32.parse_next(input)?;
    let mut keys = Vec::new();
    for _ in 0..key_count.max(0) {
        let _frame = le_i32.parse_next(input)?;
        let flags = le_u16.parse_next(input)?;
        if flags != 0 {
            let _ = le_f32.parse_next(input)?;
        }
        keys.push(key(input)?);
    }
    Ok(keys)
}

fn parse_vector_key(input: &mut &[u8]) -> WResult<DVec3> {
    parse_vector(input).map(DVec3::from_array)
}

/// Rotation key: angle first, then the axis. Stored as `[x, y, z, angle]`.
fn parse_rotation_key(input: &mut &[u8]) -> WResult<[f64; 4]> {
    let angle = parse_f64(input)?;
    let [x, y, z] = parse_vector(input)?;
    Ok([x, y, z, angle])
}

fn quaternion_from_axis_angle([x, y, z, angle]: [f64; 4]) -> DQuat {
    let length = (x * x + y * y + z * z).sqrt();
    if length <= 0.0 {
        return DQuat::IDENTITY;
    }
    let omega = angle * -0.5;
    let si = omega.sin() / length;
    DQuat::from_xyzw(si * x, si * y, si * z, omega.cos())
}

#[derive(Debug, Clone, Default)]
struct KeyframeNode {
    id: Option<u16>,
    name: String,
    instance_name: String,
    parent_id: u16,
    pivot: DVec3,
    positions: Vec<DVec3>,
    rotations: Vec<[f64; 4]>,
    scales: Vec<DVec3>,
}

impl KeyframeNode {
    /// Transform relative to the parent node, from the first key of each track.
    fn local_transformation(&self) -> DMat4 {
        let translation = self.positions.first().copied().unwrap_or(DVec3::ZERO);
        let rotation = self
            .rotations
            .first()
            .map(|&r| quaternion_from_axis_angle(r))
            .unwrap_or(DQuat::IDENTITY);
        let scale = self.scales.first().copied().unwrap_or(DVec3::ONE);
        DMat4::from_scale_rotation_translation(scale, rotation, translation)
    }

    fn display_name(&self) -> String {
        if self.name.is_empty() || self.name == DUMMY_NODE_NAME {
            String::new()
        } else if self.instance_name.is_empty() {
            self.name.clone()
        } else {
            format!("{} {}", self.name, self.instance_name)
        }
    }
}

#[derive(Debug, Default)]
struct KeyframeHierarchy {
    nodes: Vec<KeyframeNode>,
    id_to_index: HashMap<u16, usize>,
}

impl KeyframeHierarchy {
    fn add_node(&mut self, node: KeyframeNode) {
        if let Some(id) = node.id {
            self.id_to_index.insert(id, self.nodes.len());
        }
        self.nodes.push(node);
    }

    fn parent_index(&self, index: usize) -> Option<usize> {
        let parent_id = self.nodes[index].parent_id;
        if parent_id == ROOT_PARENT_ID {
            return None;
        }
        self.id_to_index.get(&parent_id).copied()
    }
}

#[derive(Clone, Copy)]
enum Resolution {
    Unresolved,
    InProgress,
    Resolved(DMat4),
}

/// Memoized world transforms of keyframe nodes. Parents may appear after their
/// children; a parent cycle is cut at the node that closes it.
struct NodeTransformResolver<'a> {
    hierarchy: &'a KeyframeHierarchy,
    resolutions: Vec<Resolution>,
}

impl<'a> NodeTransformResolver<'a> {
    fn new(hierarchy: &'a KeyframeHierarchy) -> Self {
        NodeTransformResolver {
            hierarchy,
            resolutions: vec![Resolution::Unresolved; hierarchy.nodes.len()],
        }
    }

    fn world_transformation(&mut self, index: usize) -> DMat4 {
        match self.resolutions[index] {
            Resolution::Resolved(matrix) => return matrix,
            Resolution::InProgress => {
                warn!(
                    "keyframe node {:?} is part of a parent cycle",
                    self.hierarchy.nodes[index].name
                );
                return DMat4::IDENTITY;
            }
            Resolution::Unresolved => {}
        }

        self.resolutions[index] = Resolution::InProgress;
        let local = self.hierarchy.nodes[index].local_transformation();
        let world = match self.hierarchy.parent_index(index) {
            Some(parent) => self.world_transformation(parent) * local,
            None => local,
        };
        self.resolutions[index] = Resolution::Resolved(world);
        world
    }
}

/// Bake the node transform into a mesh given in its local coordinate system.
fn apply_mesh_transformation(
    mesh: &mut Mesh,
    mesh_matrix: DMat4,
    node_matrix: DMat4,
    pivot: DVec3,
) {
    let mirror = is_mirroring(&mesh_matrix);
    let mesh_matrix = if mirror {
        mesh_matrix * DMat4::from_scale(DVec3::new(-1.0, 1.0, 1.0))
    } else {
        mesh_matrix
    };
    if mesh_matrix.determinant().abs() < DETERMINANT_EPSILON {
        warn!("mesh {:?} has a singular local transformation", mesh.name);
        return;
    }

    let matrix = node_matrix * DMat4::from_translation(-pivot) * mesh_matrix.inverse();
    if mirror {
        flip_mesh_triangles_orientation(mesh);
    }
    transform_mesh(mesh, &matrix);
}

struct ThreeDsReader<'c> {
    callbacks: &'c dyn ImportCallbacks,
    model: Model,
    material_names: HashMap<String, usize>,
    mesh_names: HashMap<String, usize>,
    /// Local coordinate system of each mesh, by mesh index.
    mesh_transforms: Vec<Option<DMat4>>,
    hierarchy: KeyframeHierarchy,
    has_keyframes: bool,
}

impl<'c> ThreeDsReader<'c> {
    fn new(callbacks: &'c dyn ImportCallbacks) -> Self {
        ThreeDsReader {
            callbacks,
            model: Model::new(),
            material_names: HashMap::new(),
            mesh_names: HashMap::new(),
            mesh_transforms: Vec::new(),
            hierarchy: KeyframeHierarchy::default(),
            has_keyframes: false,
        }
    }

    fn read(&mut self, content: &[u8]) -> PResult<()> {
        for chunk in ChunkReader::new(content) {
            let chunk = chunk?;
            match chunk.id {
                chunk_id::MAIN => self.read_main(&chunk)?,
                _ => skip_chunk(&chunk),
            }
        }
        Ok(())
    }

    fn read_main(&mut self, chunk: &Chunk<'_>) -> PResult<()> {
        for child in chunk.children() {
            let child = child?;
            match child.id {
                chunk_id::EDITOR => self.read_editor(&child)?,
                chunk_id::KEYFRAMER => self.read_keyframer(&child)?,
                _ => skip_chunk(&child),
            }
        }
        Ok(())
    }

    fn read_editor(&mut self, chunk: &Chunk<'_>) -> PResult<()> {
        for child in chunk.children() {
            let child = child?;
            match child.id {
                chunk_id::MATERIAL => self.read_material(&child)?,
                chunk_id::OBJECT => self.read_object(&child)?,
                _ => skip_chunk(&child),
            }
        }
        Ok(())
    }

    fn read_material(&mut self, chunk: &Chunk<'_>) -> PResult<()> {
        let mut material = Material::phong();
        let mut phong = PhongProperties::default();
        let mut shininess = None;
        let mut shininess_strength = None;

        for child in chunk.children() {
            let child = child?;
            match child.id {
                chunk_id::MAT_NAME => material.name = parse_leaf(&child, parse_name)?,
                chunk_id::MAT_AMBIENT => phong.ambient = read_color(&child)?,
                chunk_id::MAT_DIFFUSE => material.color = read_color(&child)?,
                chunk_id::MAT_SPECULAR => phong.specular = read_color(&child)?,
                chunk_id::MAT_SHININESS => shininess = Some(read_percentage(&child)?),
                chunk_id::MAT_SHININESS_STRENGTH => {
                    shininess_strength = Some(read_percentage(&child)?)
                }
                chunk_id::MAT_TRANSPARENCY => {
                    material.opacity = 1.0 - read_percentage(&child)?;
                    material.update_transparency();
                }
                chunk_id::MAT_TEXMAP => {
                    material.diffuse_map = self.read_texture_map(&child)?;
                    material.update_transparency();
                }
                chunk_id::MAT_SPECMAP => phong.specular_map = self.read_texture_map(&child)?,
                chunk_id::MAT_BUMPMAP => material.bump_map = self.read_texture_map(&child)?,
                chunk_id::MAT_SELFIMAP => material.emissive_map = self.read_texture_map(&child)?,
                _ => skip_chunk(&child),
            }
        }

        if let (Some(shininess), Some(strength)) = (shininess, shininess_strength) {
            phong.shininess = shininess * strength / 10.0;
        }
        material.shading = Shading::Phong(phong);

        let name = material.name.clone();
        let index = self.model.add_material(material);
        self.material_names.insert(name, index);
        Ok(())
    }

    /// Texture slot, or `None` when the image cannot be resolved.
    fn read_texture_map(&self, chunk: &Chunk<'_>) -> PResult<Option<TextureMap>> {
        let mut texture = TextureMap::default();
        for child in chunk.children() {
            let child = child?;
            match child.id {
                chunk_id::MAT_MAPNAME => texture.name = Some(parse_leaf(&child, parse_name)?),
                chunk_id::MAT_MAP_UOFFSET => texture.offset.x = parse_leaf(&child, parse_f64)?,
                chunk_id::MAT_MAP_VOFFSET => texture.offset.y = parse_leaf(&child, parse_f64)?,
                chunk_id::MAT_MAP_USCALE => texture.scale.x = parse_leaf(&child, parse_f64)?,
                chunk_id::MAT_MAP_VSCALE => texture.scale.y = parse_leaf(&child, parse_f64)?,
                chunk_id::MAT_MAP_ROTATION => {
                    texture.rotation = parse_leaf(&child, parse_f64)?.to_radians()
                }
                _ => skip_chunk(&child),
            }
        }

        let Some(name) = texture.name.as_deref() else {
            return Ok(None);
        };
        match self.callbacks.texture_buffer(name) {
            Some(resolved) => {
                texture.url = Some(resolved.url);
                texture.buffer = Some(resolved.buffer);
                Ok(Some(texture))
            }
            None => {
                warn!("texture {name:?} not found");
                Ok(None)
            }
        }
    }

    fn read_object(&mut self, chunk: &Chunk<'_>) -> PResult<()> {
        let (name, name_len) = parse_prefix(chunk, parse_name)?;
        for child in chunk.children_after(name_len) {
            let child = child?;
            match child.id {
                chunk_id::OBJ_TRIMESH => self.read_mesh(&child, &name)?,
                chunk_id::OBJ_LIGHT | chunk_id::OBJ_CAMERA => {
                    trace!("skipping light or camera {name:?}")
                }
                _ => skip_chunk(&child),
            }
        }
        Ok(())
    }

    fn read_mesh(&mut self, chunk: &Chunk<'_>, name: &str) -> PResult<()> {
        let mut mesh = Mesh::new(name);
        let mut transformation = None;

        for child in chunk.children() {
            let child = child?;
            match child.id {
                chunk_id::TRI_VERTEX => {
                    for vertex in parse_leaf(&child, |i| parse_counted(i, parse_vector_key))? {
                        mesh.add_vertex(vertex);
                    }
                }
                chunk_id::TRI_TEXVERTEX => {
                    for uv in parse_leaf(&child, |i| parse_counted(i, parse_uv))? {
                        mesh.add_uv(uv);
                    }
                }
                chunk_id::TRI_FACE => self.read_faces(&child, &mut mesh)?,
                chunk_id::TRI_TRANSFORMATION => {
                    transformation = Some(parse_leaf(&child, parse_transformation)?)
                }
                _ => skip_chunk(&child),
            }
        }

        if mesh.uv_count() > 0 && mesh.vertex_count() == mesh.uv_count() {
            for triangle in &mut mesh.triangles {
                triangle.uvs = Some(triangle.vertices);
            }
        }

        let index = self.model.add_mesh(mesh);
        self.mesh_names.insert(name.to_string(), index);
        self.mesh_transforms.push(transformation);
        Ok(())
    }

    fn read_faces(&self, chunk: &Chunk<'_>, mesh: &mut Mesh) -> PResult<()> {
        let (faces, faces_len) = parse_prefix(chunk, |i| parse_counted(i, parse_face))?;
        let first = mesh.triangle_count();
        let face_count = faces.len();
        for face in faces {
            mesh.add_triangle(face);
        }

        for child in chunk.children_after(faces_len) {
            let child = child?;
            match child.id {
                chunk_id::TRI_MATERIAL => {
                    let (material_name, face_indices) = parse_leaf(&child, parse_face_materials)?;
                    let Some(&material) = self.material_names.get(&material_name) else {
                        warn!("mesh {:?} references unknown material {material_name:?}", mesh.name);
                        continue;
                    };
                    for face in face_indices {
                        match mesh.triangles.get_mut(first + face as usize) {
                            Some(triangle) => triangle.material = Some(material),
                            None => warn!(
                                "mesh {:?}: material face index {face} out of range",
                                mesh.name
                            ),
                        }
                    }
                }
                chunk_id::TRI_SMOOTH => {
                    let groups = parse_leaf(&child, |input| {
                        let mut groups = Vec::with_capacity(face_count);
                        for _ in 0..face_count {
                            groups.push(le_u32.parse_next(input)?);
                        }
                        Ok(groups)
                    })?;
                    for (triangle, group) in mesh.triangles[first..].iter_mut().zip(groups) {
                        triangle.curve = Some(group);
                    }
                }
                _ => skip_chunk(&child),
            }
        }
        Ok(())
    }

    fn read_keyframer(&mut self, chunk: &Chunk<'_>) -> PResult<()> {
        self.has_keyframes = true;
        for child in chunk.children() {
            let child = child?;
            match child.id {
                chunk_id::OBJECT_NODE => self.read_object_node(&child)?,
                _ => skip_chunk(&child),
            }
        }
        Ok(())
    }

    fn read_object_node(&mut self, chunk: &Chunk<'_>) -> PResult<()> {
        let mut node = KeyframeNode {
            parent_id: ROOT_PARENT_ID,
            ..Default::default()
        };

        for child in chunk.children() {
            let child = child?;
            match child.id {
                chunk_id::NODE_HIERARCHY => {
                    let (name, _flags, parent_id) = parse_leaf(&child, parse_node_hierarchy)?;
                    node.name = name;
                    node.parent_id = parent_id;
                }
                chunk_id::NODE_INSTANCE_NAME => {
                    node.instance_name = parse_leaf(&child, parse_name)?
                }
                chunk_id::NODE_PIVOT => node.pivot = parse_leaf(&child, parse_vector_key)?,
                chunk_id::POSITION_TRACK => {
                    node.positions = parse_leaf(&child, |i| parse_track(i, parse_vector_key))?
                }
                chunk_id::ROTATION_TRACK => {
                    node.rotations = parse_leaf(&child, |i| parse_track(i, parse_rotation_key))?
                }
                chunk_id::SCALE_TRACK => {
                    node.scales = parse_leaf(&child, |i| parse_track(i, parse_vector_key))?
                }
                chunk_id::NODE_ID => node.id = Some(parse_leaf(&child, |i| le_u16.parse_next(i))?),
                _ => skip_chunk(&child),
            }
        }

        self.hierarchy.add_node(node);
        Ok(())
    }

    fn finish(mut self) -> Model {
        if !self.has_keyframes {
            let root = self.model.root();
            for mesh_index in 0..self.model.mesh_count() {
                self.model.node_mut(root).add_mesh_index(mesh_index);
            }
            return self.model;
        }

        let node_meshes = self.apply_model_transformations();
        self.build_node_tree(&node_meshes);
        debug!(
            "3ds: {} meshes, {} materials, {} keyframe nodes",
            self.model.mesh_count(),
            self.model.material_count(),
            self.hierarchy.nodes.len()
        );
        self.model
    }

    /// Bake node transforms into mesh geometry. Returns the mesh assigned to each keyframe node.
    fn apply_model_transformations(&mut self) -> Vec<Option<usize>> {
        let mut resolver = NodeTransformResolver::new(&self.hierarchy);
        let original_count = self.model.mesh_count();

        let mut instances: Vec<Vec<usize>> = vec![Vec::new(); original_count];
        for (node_index, node) in self.hierarchy.nodes.iter().enumerate() {
            if let Some(&mesh_index) = self.mesh_names.get(&node.name) {
                instances[mesh_index].push(node_index);
            }
        }

        let mut node_meshes = vec![None; self.hierarchy.nodes.len()];
        for (mesh_index, nodes) in instances.iter().enumerate() {
            let mesh_matrix = self.mesh_transforms[mesh_index];
            if nodes.is_empty() {
                if let Some(matrix) = mesh_matrix {
                    let mesh = &mut self.model.meshes[mesh_index];
                    apply_mesh_transformation(mesh, matrix, matrix, DVec3::ZERO);
                }
                continue;
            }

            let mut targets = vec![mesh_index];
            for _ in 1..nodes.len() {
                let copy = self.model.meshes[mesh_index].clone();
                targets.push(self.model.add_mesh(copy));
            }

            for (&node_index, &target) in nodes.iter().zip(&targets) {
                node_meshes[node_index] = Some(target);
                if let Some(matrix) = mesh_matrix {
                    let node_matrix = resolver.world_transformation(node_index);
                    let pivot = self.hierarchy.nodes[node_index].pivot;
                    let mesh = &mut self.model.meshes[target];
                    apply_mesh_transformation(mesh, matrix, node_matrix, pivot);
                }
            }
        }
        node_meshes
    }

    /// Mirror the keyframe hierarchy under the root. Geometry is already in world
    /// space, so every node keeps an identity transform.
    fn build_node_tree(&mut self, node_meshes: &[Option<usize>]) {
        let mut created = vec![None; self.hierarchy.nodes.len()];
        let mut visiting = vec![false; self.hierarchy.nodes.len()];
        for index in 0..self.hierarchy.nodes.len() {
            self.create_model_node(index, node_meshes, &mut created, &mut visiting);
        }

        let referenced: HashSet<usize> = node_meshes.iter().flatten().copied().collect();
        let root = self.model.root();
        for mesh_index in 0..self.model.mesh_count() {
            if !referenced.contains(&mesh_index) {
                self.model.node_mut(root).add_mesh_index(mesh_index);
            }
        }
    }

    fn create_model_node(
        &mut self,
        index: usize,
        node_meshes: &[Option<usize>],
        created: &mut [Option<NodeId>],
        visiting: &mut [bool],
    ) -> NodeId {
        if let Some(id) = created[index] {
            return id;
        }
        visiting[index] = true;

        let parent = match self.hierarchy.parent_index(index) {
            Some(parent) => match created[parent] {
                Some(id) => id,
                None if !visiting[parent] => {
                    self.create_model_node(parent, node_meshes, created, visiting)
                }
                None => self.model.root(),
            },
            None => self.model.root(),
        };

        let mut node = Node::new(self.hierarchy.nodes[index].display_name());
        if let Some(mesh_index) = node_meshes[index] {
            node.add_mesh_index(mesh_index);
        }
        let id = self.model.add_child_node(parent, node);
        created[index] = Some(id);
        id
    }
}

fn read_color(chunk: &Chunk<'_>) -> PResult<Color> {
    let mut color = Color::BLACK;
    let mut has_linear_color = false;
    for child in chunk.children() {
        let child = child?;
        match child.id {
            chunk_id::COLOR_24 if !has_linear_color => color = parse_leaf(&child, parse_color_24)?,
            chunk_id::COLOR_F if !has_linear_color => color = parse_leaf(&child, parse_color_f)?,
            chunk_id::LIN_COLOR_24 => {
                color = parse_leaf(&child, parse_color_24)?;
                has_linear_color = true;
            }
            chunk_id::LIN_COLOR_F => {
                color = parse_leaf(&child, parse_color_f)?;
                has_linear_color = true;
            }
            _ => skip_chunk(&child),
        }
    }
    Ok(color)
}

/// Percentage in `0.0..=1.0`, from either the integer or the float form.
fn read_percentage(chunk: &Chunk<'_>) -> PResult<f64> {
    let mut percentage = 0.0;
    for child in chunk.children() {
        let child = child?;
        match child.id {
            chunk_id::PERCENTAGE_INT => {
                percentage = parse_leaf(&child, |i| le_u16.parse_next(i))? as f64 / 100.0
            }
            chunk_id::PERCENTAGE_F => percentage = parse_leaf(&child, parse_f64)?,
            _ => skip_chunk(&child),
        }
    }
    Ok(percentage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::chunk::write_chunk;
    use crate::import::{BufferCallbacks, import_file};
    use std::f64::consts::FRAC_PI_2;

    fn name(value: &str) -> Vec<u8> {
        let mut bytes = value.as_bytes().to_vec();
        bytes.push(0);
        bytes
    }

    fn floats(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn shorts(values: &[u16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn color_24(id: u16, rgb: [u8; 3]) -> Vec<u8> {
        write_chunk(id, &write_chunk(chunk_id::COLOR_24, &rgb))
    }

    fn percentage(id: u16, value: u16) -> Vec<u8> {
        write_chunk(id, &write_chunk(chunk_id::PERCENTAGE_INT, &shorts(&[value])))
    }

    fn triangle_object(object_name: &str, extra: &[u8]) -> Vec<u8> {
        let vertices = write_chunk(
            chunk_id::TRI_VERTEX,
            &[shorts(&[3]), floats(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0])].concat(),
        );
        let faces = write_chunk(chunk_id::TRI_FACE, &shorts(&[1, 0, 1, 2, 0]));
        let trimesh =
            write_chunk(chunk_id::OBJ_TRIMESH, &[vertices, faces, extra.to_vec()].concat());
        write_chunk(chunk_id::OBJECT, &[name(object_name), trimesh].concat())
    }

    fn identity_transformation() -> Vec<u8> {
        write_chunk(
            chunk_id::TRI_TRANSFORMATION,
            &floats(&[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0]),
        )
    }

    fn track(id: u16, keys: &[Vec<f32>]) -> Vec<u8> {
        let mut payload = vec![0u8; TRACK_HEADER_SIZE];
        payload.extend_from_slice(&(keys.len() as i32).to_le_bytes());
        for key in keys {
            payload.extend_from_slice(&0i32.to_le_bytes());
            payload.extend_from_slice(&0u16.to_le_bytes());
            payload.extend(floats(key));
        }
        write_chunk(id, &payload)
    }

    fn object_node(
        node_name: &str,
        instance: &str,
        id: u16,
        parent: u16,
        extra: &[Vec<u8>],
    ) -> Vec<u8> {
        let mut hierarchy = name(node_name);
        hierarchy.extend_from_slice(&0u32.to_le_bytes());
        hierarchy.extend_from_slice(&parent.to_le_bytes());
        let mut payload = write_chunk(chunk_id::NODE_ID, &id.to_le_bytes());
        payload.extend(write_chunk(chunk_id::NODE_HIERARCHY, &hierarchy));
        if !instance.is_empty() {
            payload.extend(write_chunk(chunk_id::NODE_INSTANCE_NAME, &name(instance)));
        }
        for chunk in extra {
            payload.extend_from_slice(chunk);
        }
        write_chunk(chunk_id::OBJECT_NODE, &payload)
    }

    fn file(editor: &[Vec<u8>], keyframer: Option<&[Vec<u8>]>) -> Vec<u8> {
        let mut main = write_chunk(chunk_id::EDITOR, &editor.concat());
        if let Some(nodes) = keyframer {
            main.extend(write_chunk(chunk_id::KEYFRAMER, &nodes.concat()));
        }
        write_chunk(chunk_id::MAIN, &main)
    }

    fn import(content: &[u8]) -> Model {
        ThreeDsImporter.import(content, &BufferCallbacks::new()).unwrap()
    }

    fn assert_vec_eq(actual: DVec3, expected: DVec3) {
        assert!(actual.abs_diff_eq(expected, 1e-6), "{actual} != {expected}");
    }

    #[test]
    fn test_material_and_mesh() {
        let material = write_chunk(
            chunk_id::MATERIAL,
            &[
                write_chunk(chunk_id::MAT_NAME, &name("Red")),
                color_24(chunk_id::MAT_DIFFUSE, [255, 0, 0]),
                color_24(chunk_id::MAT_SPECULAR, [10, 20, 30]),
                percentage(chunk_id::MAT_SHININESS, 50),
                percentage(chunk_id::MAT_SHININESS_STRENGTH, 20),
                percentage(chunk_id::MAT_TRANSPARENCY, 25),
            ]
            .concat(),
        );
        let face_material =
            write_chunk(chunk_id::TRI_MATERIAL, &[name("Red"), shorts(&[1, 0])].concat());
        let smoothing = write_chunk(chunk_id::TRI_SMOOTH, &1u32.to_le_bytes());
        let object = {
            let vertices = write_chunk(
                chunk_id::TRI_VERTEX,
                &[shorts(&[3]), floats(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0])].concat(),
            );
            let faces = write_chunk(
                chunk_id::TRI_FACE,
                &[shorts(&[1, 0, 1, 2, 0]), face_material, smoothing].concat(),
            );
            let trimesh = write_chunk(chunk_id::OBJ_TRIMESH, &[vertices, faces].concat());
            write_chunk(chunk_id::OBJECT, &[name("Box"), trimesh].concat())
        };

        let model = import(&file(&[material, object], None));
        assert_eq!(model.material_count(), 1);
        let material = &model.materials[0];
        assert_eq!(material.name, "Red");
        assert_eq!(material.color, Color::new(255, 0, 0));
        assert!((material.opacity - 0.75).abs() < 1e-12);
        assert!(material.transparent);
        let phong = material.shading.phong_ref().unwrap();
        assert_eq!(phong.specular, Color::new(10, 20, 30));
        assert!((phong.shininess - 0.01).abs() < 1e-12);

        assert_eq!(model.mesh_count(), 1);
        let mesh = &model.meshes[0];
        assert_eq!(mesh.name, "Box");
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.triangles[0].vertices, [0, 1, 2]);
        assert_eq!(mesh.triangles[0].material, Some(0));
        assert_eq!(mesh.triangles[0].curve, Some(1));
        assert_eq!(model.node(model.root()).mesh_indices, vec![0]);
    }

    #[test]
    fn test_linear_color_wins() {
        let color = write_chunk(
            chunk_id::MAT_DIFFUSE,
            &[
                write_chunk(chunk_id::LIN_COLOR_24, &[1, 2, 3]),
                write_chunk(chunk_id::COLOR_24, &[9, 9, 9]),
                write_chunk(chunk_id::COLOR_F, &floats(&[1.0, 1.0, 1.0])),
            ]
            .concat(),
        );
        let chunk = ChunkReader::new(&color).next().unwrap().unwrap();
        assert_eq!(read_color(&chunk).unwrap(), Color::new(1, 2, 3));

        let color = write_chunk(
            chunk_id::MAT_DIFFUSE,
            &write_chunk(chunk_id::COLOR_F, &floats(&[0.5, 1.0, 0.0])),
        );
        let chunk = ChunkReader::new(&color).next().unwrap().unwrap();
        assert_eq!(read_color(&chunk).unwrap(), Color::new(128, 255, 0));
    }

    #[test]
    fn test_uvs_follow_vertices() {
        let uvs = write_chunk(
            chunk_id::TRI_TEXVERTEX,
            &[shorts(&[3]), floats(&[0.0, 0.0, 1.0, 0.0, 0.0, 1.0])].concat(),
        );
        let model = import(&file(&[triangle_object("Box", &uvs)], None));
        let mesh = &model.meshes[0];
        assert_eq!(mesh.uv_count(), 3);
        assert_eq!(mesh.triangles[0].uvs, Some([0, 1, 2]));
    }

    #[test]
    fn test_unknown_chunks_skipped() {
        let unknown = write_chunk(0x7777, &[1, 2, 3, 4, 5]);
        let light = write_chunk(
            chunk_id::OBJECT,
            &[name("Lamp"), write_chunk(chunk_id::OBJ_LIGHT, &floats(&[1.0, 2.0, 3.0]))].concat(),
        );
        let model = import(&file(
            &[unknown.clone(), light, triangle_object("Box", &unknown)],
            None,
        ));
        assert_eq!(model.mesh_count(), 1);
        assert_eq!(model.meshes[0].triangle_count(), 1);
    }

    #[test]
    fn test_truncated_file_is_error() {
        let mut content = file(&[triangle_object("Box", &[])], None);
        content.truncate(content.len() - 4);
        let err = ThreeDsImporter
            .import(&content, &BufferCallbacks::new())
            .unwrap_err();
        assert!(matches!(err.current_context(), ImportError::Parse(_)));
        // the chunk reading report stays attached below the import failure
        assert!(format!("{err}").matches("declares length").count() >= 2);
    }

    #[test]
    fn test_unknown_material_name_ignored() {
        let face_material =
            write_chunk(chunk_id::TRI_MATERIAL, &[name("Nope"), shorts(&[1, 0])].concat());
        let vertices = write_chunk(
            chunk_id::TRI_VERTEX,
            &[shorts(&[3]), floats(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0])].concat(),
        );
        let faces = write_chunk(
            chunk_id::TRI_FACE,
            &[shorts(&[1, 0, 1, 2, 0]), face_material].concat(),
        );
        let trimesh = write_chunk(chunk_id::OBJ_TRIMESH, &[vertices, faces].concat());
        let object = write_chunk(chunk_id::OBJECT, &[name("Box"), trimesh].concat());
        let model = import(&file(&[object], None));
        assert_eq!(model.meshes[0].triangles[0].material, None);
    }

    #[test]
    fn test_texture_map() {
        let texmap = write_chunk(
            chunk_id::MAT_TEXMAP,
            &[
                write_chunk(chunk_id::MAT_MAPNAME, &name("wood.png")),
                write_chunk(chunk_id::MAT_MAP_UOFFSET, &floats(&[0.25])),
                write_chunk(chunk_id::MAT_MAP_VSCALE, &floats(&[2.0])),
                write_chunk(chunk_id::MAT_MAP_ROTATION, &floats(&[90.0])),
            ]
            .concat(),
        );
        let material = write_chunk(
            chunk_id::MATERIAL,
            &[write_chunk(chunk_id::MAT_NAME, &name("Wood")), texmap].concat(),
        );
        let content = file(&[material, triangle_object("Box", &[])], None);

        let model = import(&content);
        assert!(model.materials[0].diffuse_map.is_none());

        let mut callbacks = BufferCallbacks::new();
        callbacks.add_file("wood.png", vec![1u8, 2, 3]);
        let model = ThreeDsImporter.import(&content, &callbacks).unwrap();
        let map = model.materials[0].diffuse_map.as_ref().unwrap();
        assert!(map.is_valid());
        assert_eq!(map.name.as_deref(), Some("wood.png"));
        assert_eq!(map.offset, DVec2::new(0.25, 0.0));
        assert_eq!(map.scale, DVec2::new(1.0, 2.0));
        assert!((map.rotation - FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn test_keyframe_translation() {
        let node = object_node(
            "Box",
            "",
            0,
            ROOT_PARENT_ID,
            &[track(chunk_id::POSITION_TRACK, &[vec![1.0, 2.0, 3.0]])],
        );
        let content = file(&[triangle_object("Box", &identity_transformation())], Some(&[node]));
        let model = import(&content);

        let mesh = &model.meshes[0];
        assert_vec_eq(mesh.vertices[0], DVec3::new(1.0, 2.0, 3.0));
        assert_vec_eq(mesh.vertices[1], DVec3::new(2.0, 2.0, 3.0));

        let children = model.node(model.root()).children();
        assert_eq!(children.len(), 1);
        let node = model.node(children[0]);
        assert_eq!(node.name, "Box");
        assert_eq!(node.mesh_indices, vec![0]);
        assert_eq!(node.transformation, DMat4::IDENTITY);
        assert!(model.node(model.root()).mesh_indices.is_empty());
    }

    #[test]
    fn test_keyframe_rotation() {
        let node = object_node(
            "Box",
            "",
            0,
            ROOT_PARENT_ID,
            &[track(chunk_id::ROTATION_TRACK, &[vec![FRAC_PI_2 as f32, 0.0, 0.0, 1.0]])],
        );
        let content = file(&[triangle_object("Box", &identity_transformation())], Some(&[node]));
        let model = import(&content);
        assert_vec_eq(model.meshes[0].vertices[1], DVec3::new(0.0, -1.0, 0.0));
    }

    #[test]
    fn test_multiple_instances_duplicate_mesh() {
        let first = object_node(
            "Box",
            "a",
            0,
            ROOT_PARENT_ID,
            &[track(chunk_id::POSITION_TRACK, &[vec![1.0, 0.0, 0.0]])],
        );
        let second = object_node(
            "Box",
            "b",
            1,
            ROOT_PARENT_ID,
            &[track(chunk_id::POSITION_TRACK, &[vec![0.0, 1.0, 0.0]])],
        );
        let content = file(
            &[triangle_object("Box", &identity_transformation())],
            Some(&[first, second]),
        );
        let model = import(&content);

        assert_eq!(model.mesh_count(), 2);
        assert_vec_eq(model.meshes[0].vertices[0], DVec3::X);
        assert_vec_eq(model.meshes[1].vertices[0], DVec3::Y);

        let names: Vec<_> = model
            .node(model.root())
            .children()
            .iter()
            .map(|&id| (model.node(id).name.clone(), model.node(id).mesh_indices.clone()))
            .collect();
        assert_eq!(
            names,
            vec![("Box a".to_string(), vec![0]), ("Box b".to_string(), vec![1])]
        );
    }

    #[test]
    fn test_parent_defined_after_child() {
        let child = object_node(
            "Box",
            "",
            0,
            1,
            &[track(chunk_id::POSITION_TRACK, &[vec![1.0, 0.0, 0.0]])],
        );
        let parent = object_node(
            DUMMY_NODE_NAME,
            "",
            1,
            ROOT_PARENT_ID,
            &[track(chunk_id::POSITION_TRACK, &[vec![0.0, 0.0, 5.0]])],
        );
        let content = file(
            &[triangle_object("Box", &identity_transformation())],
            Some(&[child, parent]),
        );
        let model = import(&content);
        assert_vec_eq(model.meshes[0].vertices[0], DVec3::new(1.0, 0.0, 5.0));

        let top = model.node(model.root()).children();
        assert_eq!(top.len(), 1);
        let dummy = model.node(top[0]);
        assert_eq!(dummy.name, "");
        assert_eq!(dummy.children().len(), 1);
        assert_eq!(model.node(dummy.children()[0]).name, "Box");
    }

    #[test]
    fn test_parent_cycle_terminates() {
        let first = object_node("Box", "", 0, 1, &[]);
        let second = object_node("Other", "", 1, 0, &[]);
        let content = file(
            &[triangle_object("Box", &identity_transformation())],
            Some(&[first, second]),
        );
        let model = import(&content);
        assert_eq!(model.mesh_count(), 1);
        assert_eq!(model.mesh_instance_count(), 1);
    }

    #[test]
    fn test_mirrored_mesh_flips_winding() {
        let mirrored = write_chunk(
            chunk_id::TRI_TRANSFORMATION,
            &floats(&[-1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0]),
        );
        let node = object_node("Box", "", 0, ROOT_PARENT_ID, &[]);
        let content = file(&[triangle_object("Box", &mirrored)], Some(&[node]));
        let model = import(&content);
        let mesh = &model.meshes[0];
        assert_eq!(mesh.triangles[0].vertices, [0, 2, 1]);
        assert_vec_eq(mesh.vertices[1], DVec3::X);
    }

    #[test]
    fn test_unreferenced_mesh_attaches_to_root() {
        let node = object_node("Box", "", 0, ROOT_PARENT_ID, &[]);
        let content = file(
            &[
                triangle_object("Box", &identity_transformation()),
                triangle_object("Loose", &identity_transformation()),
            ],
            Some(&[node]),
        );
        let model = import(&content);
        assert_eq!(model.node(model.root()).mesh_indices, vec![1]);
        assert_eq!(model.mesh_instance_count(), 2);
    }

    fn face_object(object_name: &str, vertices: &[f32], faces: &[u16], extra: &[u8]) -> Vec<u8> {
        let vertices = write_chunk(
            chunk_id::TRI_VERTEX,
            &[shorts(&[(vertices.len() / 3) as u16]), floats(vertices)].concat(),
        );
        let faces = write_chunk(
            chunk_id::TRI_FACE,
            &[shorts(&[(faces.len() / 4) as u16]), shorts(faces), extra.to_vec()].concat(),
        );
        let trimesh = write_chunk(chunk_id::OBJ_TRIMESH, &[vertices, faces].concat());
        write_chunk(chunk_id::OBJECT, &[name(object_name), trimesh].concat())
    }

    #[test]
    fn test_keyframe_pivot() {
        let node = object_node(
            "Box",
            "",
            0,
            ROOT_PARENT_ID,
            &[
                write_chunk(chunk_id::NODE_PIVOT, &floats(&[1.0, 2.0, 3.0])),
                track(chunk_id::POSITION_TRACK, &[vec![10.0, 0.0, 0.0]]),
            ],
        );
        let content = file(&[triangle_object("Box", &identity_transformation())], Some(&[node]));
        let model = import(&content);

        let mesh = &model.meshes[0];
        assert_vec_eq(mesh.vertices[0], DVec3::new(9.0, -2.0, -3.0));
        assert_vec_eq(mesh.vertices[1], DVec3::new(10.0, -2.0, -3.0));
        assert_vec_eq(mesh.vertices[2], DVec3::new(9.0, -1.0, -3.0));
    }

    #[test]
    fn test_keyframe_pivot_with_local_transformation() {
        // uniform scale 2, translated by (5, 0, 0)
        let local = write_chunk(
            chunk_id::TRI_TRANSFORMATION,
            &floats(&[2.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 2.0, 5.0, 0.0, 0.0]),
        );
        let node = object_node(
            "Box",
            "",
            0,
            ROOT_PARENT_ID,
            &[
                write_chunk(chunk_id::NODE_PIVOT, &floats(&[1.0, 2.0, 3.0])),
                track(chunk_id::POSITION_TRACK, &[vec![10.0, 0.0, 0.0]]),
            ],
        );
        let content = file(&[triangle_object("Box", &local)], Some(&[node]));
        let model = import(&content);

        let mesh = &model.meshes[0];
        assert_vec_eq(mesh.vertices[0], DVec3::new(6.5, -2.0, -3.0));
        assert_vec_eq(mesh.vertices[1], DVec3::new(7.0, -2.0, -3.0));
        assert_vec_eq(mesh.vertices[2], DVec3::new(6.5, -1.5, -3.0));
        assert_eq!(mesh.triangles[0].vertices, [0, 1, 2]);
    }

    #[test]
    fn test_smoothing_group_shares_normals() {
        let groups = [1u32, 1].map(u32::to_le_bytes).concat();
        let smoothing = write_chunk(chunk_id::TRI_SMOOTH, &groups);
        let object = face_object(
            "Corner",
            &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            &[0, 1, 2, 0, 0, 3, 1, 0],
            &smoothing,
        );
        let content = file(&[object], None);

        let imported = import(&content);
        let curves: Vec<_> = imported.meshes[0].triangles.iter().map(|t| t.curve).collect();
        assert_eq!(curves, vec![Some(1), Some(1)]);

        let model = import_file("corner.3ds", &content, &BufferCallbacks::new()).unwrap();
        let mesh = &model.meshes[0];
        let normal = |triangle: usize, corner: usize| {
            mesh.normals[mesh.triangles[triangle].normals.unwrap()[corner]]
        };
        let shared = DVec3::new(0.0, 1.0, 1.0).normalize();
        // vertex 0 is corner 0 of both faces, vertex 1 is corner 1 and corner 2
        assert_vec_eq(normal(0, 0), shared);
        assert_vec_eq(normal(1, 0), shared);
        assert_vec_eq(normal(0, 1), shared);
        assert_vec_eq(normal(1, 2), shared);
        assert_vec_eq(normal(0, 2), DVec3::Z);
        assert_vec_eq(normal(1, 1), DVec3::Y);
    }

    #[test]
    fn test_material_face_index_out_of_range_ignored() {
        let material =
            write_chunk(chunk_id::MATERIAL, &write_chunk(chunk_id::MAT_NAME, &name("Red")));
        let face_material =
            write_chunk(chunk_id::TRI_MATERIAL, &[name("Red"), shorts(&[2, 5, 0])].concat());
        let object = face_object(
            "Box",
            &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            &[0, 1, 2, 0],
            &face_material,
        );
        let model = import(&file(&[material, object], None));
        assert_eq!(model.meshes[0].triangle_count(), 1);
        assert_eq!(model.meshes[0].triangles[0].material, Some(0));
    }
}
