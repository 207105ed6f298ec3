use crate::content::{ids, mismatch, Content};
use crate::reader::ContentReader;
use crate::types::TypeName;
use crate::writer::ContentWriter;
use crate::{Error, Result};
use bincode::Options;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Hash, Eq, PartialEq, Copy, Clone, Debug, Serialize, Deserialize)]
#[repr(u8)]
pub enum BlendMode {
    /// Suitable for normal solid objects with no transparent areas.
    Opaque,
    /// Hard edges between the opaque and transparent areas. The surface is
    /// either fully opaque or invisible, depending on `alpha_cutoff`.
    Masked,
    /// Blended with the background using `opacity`.
    Translucent,
}

/// Material is a descriptive asset that contains some properties and links
/// to other assets (maps).
#[derive(PartialEq, Copy, Clone, Debug, Serialize, Deserialize)]
pub struct Material {
    pub blend_mode: BlendMode,

    pub albedo_color: [f32; 3],
    pub roughness: f32,
    pub metallic: f32,
    pub opacity: f32,
    pub ior: f32,
    pub sss: bool,

    // only used in masked blend mode
    pub alpha_cutoff: f32,

    pub albedo_map: Option<Uuid>,
    pub normal_map: Option<Uuid>,
    pub displacement_map: Option<Uuid>,
    pub roughness_map: Option<Uuid>,
    pub ao_map: Option<Uuid>,
    pub metallic_map: Option<Uuid>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            blend_mode: BlendMode::Opaque,
            albedo_color: [86.0 / 255.0, 93.0 / 255.0, 110.0 / 255.0],
            roughness: 0.5,
            metallic: 0.0,
            opacity: 1.0,
            ior: 1.5,
            sss: false,
            alpha_cutoff: 0.0,
            albedo_map: None,
            normal_map: None,
            displacement_map: None,
            roughness_map: None,
            ao_map: None,
            metallic_map: None,
        }
    }
}

fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
}

pub(crate) fn read(r: &mut ContentReader<'_>, _: &TypeName) -> Result<Content> {
    let bytes = r.read_blob()?;
    let material = options()
        .deserialize(&bytes)
        .map_err(|e| Error::malformed(ids::MATERIAL, e.to_string()))?;
    Ok(Content::Material(material))
}

pub(crate) fn write(w: &mut ContentWriter<'_>, t: &TypeName, value: &Content) -> Result<()> {
    let material = match value {
        Content::Material(material) => material,
        other => return Err(mismatch(t, other)),
    };
    let bytes = options()
        .serialize(material)
        .map_err(|e| Error::malformed(ids::MATERIAL, e.to_string()))?;
    w.write_blob(&bytes)
}
