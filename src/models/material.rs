use glam::DVec2;
use variantly::Variantly;

use crate::Rc;
use crate::models::color::Color;

/// Opacity values at or above this threshold count as fully opaque.
const OPACITY_EPSILON: f64 = 1.0e-5;

/// Image reference used by one of a material's texture slots.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TextureMap {
    /// File name as stored in the source model.
    pub name: Option<String>,
    /// Location the buffer was resolved from.
    pub url: Option<String>,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub buffer: Option<Rc<[u8]>>,
    pub offset: DVec2,
    pub scale: DVec2,
    /// Rotation in radians.
    pub rotation: f64,
}

impl Default for TextureMap {
    fn default() -> Self {
        TextureMap {
            name: None,
            url: None,
            buffer: None,
            offset: DVec2::ZERO,
            scale: DVec2::ONE,
            rotation: 0.0,
        }
    }
}

impl TextureMap {
    pub fn new(name: impl Into<String>) -> Self {
        TextureMap {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// A map can be exported only once its name, source and content are known.
    pub fn is_valid(&self) -> bool {
        self.name.is_some() && self.url.is_some() && self.buffer.is_some()
    }

    pub fn has_transformation(&self) -> bool {
        self.offset != DVec2::ZERO || self.scale != DVec2::ONE || self.rotation.abs() > f64::EPSILON
    }

    /// Last path component of the map's name.
    pub fn file_name(&self) -> Option<&str> {
        let name = self.name.as_deref()?;
        Some(name.rsplit(['/', '\\']).next().unwrap_or(name))
    }

    /// Lowercase extension of the map's file name.
    pub fn extension(&self) -> Option<String> {
        let file_name = self.file_name()?;
        let (_, extension) = file_name.rsplit_once('.')?;
        Some(extension.to_ascii_lowercase())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MaterialType {
    Phong,
    Physical,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PhongProperties {
    pub ambient: Color,
    pub specular: Color,
    /// `0.0..=1.0`
    pub shininess: f64,
    pub specular_map: Option<TextureMap>,
}

impl Default for PhongProperties {
    fn default() -> Self {
        PhongProperties {
            ambient: Color::BLACK,
            specular: Color::BLACK,
            shininess: 0.0,
            specular_map: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PhysicalProperties {
    pub metalness: f64,
    pub roughness: f64,
    pub metalness_map: Option<TextureMap>,
}

impl Default for PhysicalProperties {
    fn default() -> Self {
        PhysicalProperties {
            metalness: 0.0,
            roughness: 1.0,
            metalness_map: None,
        }
    }
}

/// Shading-model specific attributes. Exactly one set is meaningful per material.
#[derive(Clone, Debug, PartialEq, Variantly)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Shading {
    Phong(PhongProperties),
    Physical(PhysicalProperties),
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Material {
    pub name: String,
    pub is_default: bool,
    pub color: Color,
    pub vertex_colors: bool,
    pub emissive: Color,
    /// `0.0..=1.0`
    pub opacity: f64,
    pub transparent: bool,
    pub diffuse_map: Option<TextureMap>,
    pub bump_map: Option<TextureMap>,
    pub normal_map: Option<TextureMap>,
    pub emissive_map: Option<TextureMap>,
    pub alpha_test: f64,
    pub multiply_diffuse_map: bool,
    pub shading: Shading,
}

impl Material {
    fn with_shading(shading: Shading) -> Self {
        Material {
            name: String::new(),
            is_default: false,
            color: Color::BLACK,
            vertex_colors: false,
            emissive: Color::BLACK,
            opacity: 1.0,
            transparent: false,
            diffuse_map: None,
            bump_map: None,
            normal_map: None,
            emissive_map: None,
            alpha_test: 0.0,
            multiply_diffuse_map: false,
            shading,
        }
    }

    pub fn phong() -> Self {
        Material::with_shading(Shading::Phong(PhongProperties::default()))
    }

    pub fn physical() -> Self {
        Material::with_shading(Shading::Physical(PhysicalProperties::default()))
    }

    pub fn material_type(&self) -> MaterialType {
        match self.shading {
            Shading::Phong(_) => MaterialType::Phong,
            Shading::Physical(_) => MaterialType::Physical,
        }
    }

    /// Recompute the transparent flag from the current opacity.
    pub fn update_transparency(&mut self) {
        self.transparent = self.opacity < 1.0 - OPACITY_EPSILON;
    }

    /// Every populated texture slot, common slots first.
    pub fn texture_maps(&self) -> impl Iterator<Item = &TextureMap> {
        let type_specific = match &self.shading {
            Shading::Phong(phong) => phong.specular_map.as_ref(),
            Shading::Physical(physical) => physical.metalness_map.as_ref(),
        };
        [
            self.diffuse_map.as_ref(),
            self.bump_map.as_ref(),
            self.normal_map.as_ref(),
            self.emissive_map.as_ref(),
            type_specific,
        ]
        .into_iter()
        .flatten()
    }
}
