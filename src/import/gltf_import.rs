//! glTF 2.0 importer for both the JSON form (`.gltf`) and the binary container (`.glb`).

use std::collections::{HashMap, HashSet};

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use glam::{DMat4, DVec2, DVec3};
use gltf::mesh::Mode;
use gltf_json as json;
use itertools::Itertools;
use rootcause::Report;
use tracing::{debug, trace, warn};

use crate::Rc;
use crate::data::glb::{is_glb, parse_glb};
use crate::import::{Direction, ImportCallbacks, ImportError, Importer};
use crate::models::color::Color;
use crate::models::material::{Material, Shading, TextureMap};
use crate::models::mesh::{Mesh, Triangle};
use crate::models::model::Model;
use crate::models::node::{Node, NodeId};
use crate::models::property::{Property, PropertyGroup, PropertyValue};

/// Required extensions this importer understands.
const SUPPORTED_EXTENSIONS: &[&str] = &["KHR_texture_transform"];
const DEFAULT_ALPHA_CUTOFF: f64 = 0.5;

pub struct GltfImporter;

impl Importer for GltfImporter {
    fn can_import_extension(&self, extension: &str) -> bool {
        matches!(extension, "gltf" | "glb")
    }

    fn up_direction(&self) -> Direction {
        Direction::Y
    }

    fn import(
        &self,
        content: &[u8],
        callbacks: &dyn ImportCallbacks,
    ) -> Result<Model, Report<ImportError>> {
        let (json_bytes, blob) = if is_glb(content) {
            let container = parse_glb(content).map_err(ImportError::from_parse_report)?;
            (container.json, container.bin)
        } else {
            (content, None)
        };

        let root = json::Root::from_slice(json_bytes)
            .map_err(|e| Report::new(ImportError::InvalidDocument(e.to_string())))?;
        let unsupported = root
            .extensions_required
            .iter()
            .filter(|extension| !SUPPORTED_EXTENSIONS.contains(&extension.as_str()))
            .join(", ");
        if !unsupported.is_empty() {
            return Err(Report::new(ImportError::Unsupported(unsupported)));
        }
        let asset = json::serialize::to_value(&root.asset).ok();

        let document = gltf::Document::from_json(root)
            .map_err(|e| Report::new(ImportError::InvalidDocument(e.to_string())))?;
        let buffers = load_buffers(&document, blob, callbacks)?;

        let mut reader = GltfReader {
            buffers: &buffers,
            callbacks,
            textures: HashMap::new(),
            active_nodes: HashSet::new(),
            model: Model::new(),
        };
        reader.read(&document, asset.as_ref());
        Ok(reader.model)
    }
}

/// Split a `data:` URI into its media type and base64 payload.
fn split_data_uri(uri: &str) -> Option<(&str, &str)> {
    let rest = uri.strip_prefix("data:")?;
    let (media_type, payload) = rest.split_once(',')?;
    let media_type = media_type.strip_suffix(";base64")?;
    Some((media_type, payload))
}

fn load_buffers(
    document: &gltf::Document,
    blob: Option<&[u8]>,
    callbacks: &dyn ImportCallbacks,
) -> Result<Vec<Rc<[u8]>>, Report<ImportError>> {
    document
        .buffers()
        .map(|buffer| {
            let data: Rc<[u8]> = match buffer.source() {
                gltf::buffer::Source::Bin => blob
                    .map(Rc::from)
                    .ok_or_else(|| Report::new(ImportError::MissingBuffer("BIN chunk".into())))?,
                gltf::buffer::Source::Uri(uri) => match split_data_uri(uri) {
                    Some((_, payload)) => BASE64_STANDARD
                        .decode(payload)
                        .map(Rc::from)
                        .map_err(|e| Report::new(ImportError::InvalidDocument(e.to_string())))?,
                    None => callbacks
                        .file_buffer(uri)
                        .ok_or_else(|| Report::new(ImportError::MissingBuffer(uri.to_string())))?,
                },
            };
            if data.len() < buffer.length() {
                return Err(Report::new(ImportError::InvalidDocument(format!(
                    "buffer {} holds {} bytes, {} declared",
                    buffer.index(),
                    data.len(),
                    buffer.length()
                ))));
            }
            Ok(data)
        })
        .collect()
}

/// File extension for an image media type, `image/png` -> `png`.
fn extension_from_mime_type(mime_type: &str) -> &str {
    mime_type.rsplit('/').next().unwrap_or(mime_type)
}

fn embedded_texture(name: String, buffer: Rc<[u8]>) -> TextureMap {
    TextureMap {
        url: Some(name.clone()),
        name: Some(name),
        buffer: Some(buffer),
        ..Default::default()
    }
}

/// Scalar members of a JSON object as a property group, `None` when there are none.
fn property_group_from_value(name: &str, value: &json::Value) -> Option<PropertyGroup> {
    let object = value.as_object()?;
    let mut group = PropertyGroup::new(name);
    for (key, value) in object {
        let value = match value {
            json::Value::String(text) => PropertyValue::Text(text.clone()),
            json::Value::Number(number) => match number.as_i64() {
                Some(integer) => PropertyValue::Integer(integer),
                None => PropertyValue::Number(number.as_f64().unwrap_or_default()),
            },
            _ => continue,
        };
        group.add_property(Property::new(key.clone(), value));
    }
    (!group.is_empty()).then_some(group)
}

fn extras_value(extras: &json::Extras) -> Option<json::Value> {
    let raw = extras.as_ref()?;
    json::deserialize::from_str(raw.get()).ok()
}

fn to_dvec3(value: [f32; 3]) -> DVec3 {
    DVec3::new(value[0] as f64, value[1] as f64, value[2] as f64)
}

struct GltfReader<'a> {
    buffers: &'a [Rc<[u8]>],
    callbacks: &'a dyn ImportCallbacks,
    /// Resolved images by image index. `None` records a failed resolution.
    textures: HashMap<usize, Option<TextureMap>>,
    /// Nodes on the current traversal path.
    active_nodes: HashSet<usize>,
    model: Model,
}

impl GltfReader<'_> {
    fn read(&mut self, document: &gltf::Document, asset: Option<&json::Value>) {
        for material in document.materials() {
            let material = self.read_material(&material);
            self.model.add_material(material);
        }
        for mesh in document.meshes() {
            let mesh = self.read_mesh(&mesh);
            self.model.add_mesh(mesh);
        }
        if let Some(group) =
            asset.and_then(|asset| property_group_from_value("Asset properties", asset))
        {
            self.model.add_property_group(group);
        }

        let scene = document.default_scene().or_else(|| document.scenes().next());
        if let Some(scene) = scene {
            let root = self.model.root();
            for node in scene.nodes() {
                self.read_node(&node, root);
            }
        }
        debug!(
            "glTF: {} materials, {} meshes, {} nodes",
            self.model.material_count(),
            self.model.mesh_count(),
            self.model.node_count()
        );
    }

    fn read_material(&mut self, material: &gltf::Material) -> Material {
        let mut result = Material::physical();
        result.name = material.name().unwrap_or_default().to_string();

        let pbr = material.pbr_metallic_roughness();
        let [r, g, b, a] = pbr.base_color_factor();
        result.color = Color::from_linear([r as f64, g as f64, b as f64]);
        result.opacity = a as f64;
        result.emissive = Color::from_linear(material.emissive_factor().map(f64::from));

        match material.alpha_mode() {
            gltf::material::AlphaMode::Opaque => {}
            gltf::material::AlphaMode::Blend => result.transparent = true,
            gltf::material::AlphaMode::Mask => {
                result.transparent = true;
                result.alpha_test = material
                    .alpha_cutoff()
                    .map_or(DEFAULT_ALPHA_CUTOFF, f64::from);
            }
        }

        if let Some(info) = pbr.base_color_texture() {
            result.diffuse_map = self.read_texture_info(&info);
            result.multiply_diffuse_map = result.diffuse_map.is_some();
        }
        let metalness_map = pbr
            .metallic_roughness_texture()
            .and_then(|info| self.read_texture_info(&info));
        if let Shading::Physical(physical) = &mut result.shading {
            physical.metalness = pbr.metallic_factor() as f64;
            physical.roughness = pbr.roughness_factor() as f64;
            physical.metalness_map = metalness_map;
        }
        result.normal_map = material
            .normal_texture()
            .and_then(|normal| self.read_texture(&normal.texture()));
        result.emissive_map = material
            .emissive_texture()
            .and_then(|info| self.read_texture_info(&info));
        result
    }

    fn read_texture_info(&mut self, info: &gltf::texture::Info) -> Option<TextureMap> {
        let mut texture = self.read_texture(&info.texture())?;
        if let Some(transform) = info.texture_transform() {
            let [x, y] = transform.offset();
            texture.offset = DVec2::new(x as f64, -y as f64);
            let [x, y] = transform.scale();
            texture.scale = DVec2::new(x as f64, y as f64);
            texture.rotation = -transform.rotation() as f64;
        }
        Some(texture)
    }

    fn read_texture(&mut self, texture: &gltf::Texture) -> Option<TextureMap> {
        let image = texture.source();
        if !self.textures.contains_key(&image.index()) {
            let resolved = self.load_image(&image);
            self.textures.insert(image.index(), resolved);
        }
        self.textures.get(&image.index()).cloned().flatten()
    }

    fn load_image(&self, image: &gltf::Image) -> Option<TextureMap> {
        match image.source() {
            gltf::image::Source::View { view, mime_type } => {
                let start = view.offset();
                let bytes = self
                    .buffers
                    .get(view.buffer().index())
                    .and_then(|data| data.get(start..start + view.length()));
                let Some(bytes) = bytes else {
                    warn!("image {} buffer view is out of range", image.index());
                    return None;
                };
                let name = format!(
                    "Binary_{}.{}",
                    image.index(),
                    extension_from_mime_type(mime_type)
                );
                Some(embedded_texture(name, Rc::from(bytes)))
            }
            gltf::image::Source::Uri { uri, .. } => {
                if let Some((media_type, payload)) = split_data_uri(uri) {
                    let bytes = match BASE64_STANDARD.decode(payload) {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            warn!("image {} has a malformed data URI: {e}", image.index());
                            return None;
                        }
                    };
                    let name = format!(
                        "Embedded_{}.{}",
                        image.index(),
                        extension_from_mime_type(media_type)
                    );
                    return Some(embedded_texture(name, Rc::from(bytes)));
                }
                let Some(texture_buffer) = self.callbacks.texture_buffer(uri) else {
                    warn!("texture {uri} not found");
                    return None;
                };
                Some(TextureMap {
                    name: Some(uri.to_string()),
                    url: Some(texture_buffer.url),
                    buffer: Some(texture_buffer.buffer),
                    ..Default::default()
                })
            }
        }
    }

    fn read_mesh(&self, mesh: &gltf::Mesh) -> Mesh {
        let mut result = Mesh::new(mesh.name().unwrap_or_default());
        for primitive in mesh.primitives() {
            self.read_primitive(&primitive, &mut result);
        }
        if let Some(group) = extras_value(mesh.extras())
            .and_then(|extras| property_group_from_value("Mesh properties", &extras))
        {
            result.add_property_group(group);
        }
        result
    }

    fn read_primitive(&self, primitive: &gltf::Primitive, mesh: &mut Mesh) {
        let reader =
            primitive.reader(|buffer| self.buffers.get(buffer.index()).map(|data| &data[..]));
        let Some(positions) = reader.read_positions() else {
            trace!("skipping primitive {} without positions", primitive.index());
            return;
        };
        let positions: Vec<DVec3> = positions.map(to_dvec3).collect();
        let vertex_count = positions.len();
        if vertex_count == 0 {
            return;
        }

        let colors: Option<Vec<Color>> = reader
            .read_colors(0)
            .map(|colors| {
                colors
                    .into_rgb_f32()
                    .map(|rgb| Color::from_linear(rgb.map(f64::from)))
                    .collect::<Vec<_>>()
            })
            .filter(|colors| colors.len() == vertex_count);
        let normals: Option<Vec<DVec3>> = reader
            .read_normals()
            .map(|normals| normals.map(to_dvec3).collect::<Vec<_>>())
            .filter(|normals| normals.len() == vertex_count);
        let uvs: Option<Vec<DVec2>> = reader
            .read_tex_coords(0)
            .map(|uvs| {
                uvs.into_f32()
                    .map(|[u, v]| DVec2::new(u as f64, -v as f64))
                    .collect::<Vec<_>>()
            })
            .filter(|uvs| uvs.len() == vertex_count);
        let indices: Vec<usize> = match reader.read_indices() {
            Some(indices) => indices.into_u32().map(|index| index as usize).collect(),
            None => (0..vertex_count).collect(),
        };

        let corners: Vec<[usize; 3]> = match primitive.mode() {
            Mode::Triangles => indices
                .chunks_exact(3)
                .map(|corners| [corners[0], corners[1], corners[2]])
                .collect(),
            Mode::TriangleStrip => indices
                .windows(3)
                .enumerate()
                .map(|(i, w)| if i % 2 == 0 { [w[0], w[1], w[2]] } else { [w[0], w[2], w[1]] })
                .collect(),
            Mode::TriangleFan => indices
                .windows(2)
                .skip(1)
                .map(|w| [indices[0], w[0], w[1]])
                .collect(),
            other => {
                warn!("skipping primitive with unsupported mode {other:?}");
                return;
            }
        };

        let vertex_offset = mesh.vertex_count();
        let color_offset = mesh.vertex_color_count();
        let normal_offset = mesh.normal_count();
        let uv_offset = mesh.uv_count();
        mesh.vertices.extend(positions);
        if let Some(colors) = &colors {
            mesh.vertex_colors.extend_from_slice(colors);
        }
        if let Some(normals) = &normals {
            mesh.normals.extend_from_slice(normals);
        }
        if let Some(uvs) = &uvs {
            mesh.uvs.extend_from_slice(uvs);
        }

        let material = primitive.material().index();
        for [a, b, c] in corners {
            if a.max(b).max(c) >= vertex_count {
                warn!(
                    "ignoring triangle ({a}, {b}, {c}) referencing past {vertex_count} vertices"
                );
                continue;
            }
            let mut triangle =
                Triangle::new(vertex_offset + a, vertex_offset + b, vertex_offset + c);
            if colors.is_some() {
                triangle =
                    triangle.with_colors(color_offset + a, color_offset + b, color_offset + c);
            }
            if normals.is_some() {
                triangle =
                    triangle.with_normals(normal_offset + a, normal_offset + b, normal_offset + c);
            }
            if uvs.is_some() {
                triangle = triangle.with_uvs(uv_offset + a, uv_offset + b, uv_offset + c);
            }
            triangle.material = material;
            mesh.add_triangle(triangle);
        }
    }

    fn read_node(&mut self, node: &gltf::Node, parent: NodeId) {
        if node.children().next().is_none() && node.mesh().is_none() {
            return;
        }
        if !self.active_nodes.insert(node.index()) {
            warn!("node {} is its own ancestor, skipping", node.index());
            return;
        }

        let matrix = node.transform().matrix().map(|column| column.map(f64::from));
        let created = Node::new(node.name().unwrap_or_default())
            .with_transformation(DMat4::from_cols_array_2d(&matrix));
        let id = self.model.add_child_node(parent, created);
        for child in node.children() {
            self.read_node(&child, id);
        }
        if let Some(mesh) = node.mesh() {
            self.model.node_mut(id).add_mesh_index(mesh.index());
        }

        self.active_nodes.remove(&node.index());
    }
}
