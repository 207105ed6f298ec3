use crate::content::{ids, mismatch, Content};
use crate::reader::ContentReader;
use crate::types::TypeName;
use crate::writer::ContentWriter;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

#[repr(u8)]
#[derive(Eq, PartialEq, Copy, Clone, Debug, Serialize, Deserialize)]
pub enum VertexFormat {
    // vec3(pos), vec3(nor), vec2(uv), vec3(tangent) + 1 float padding
    PositionNormalUvTangent = 0,
    // vec3(pos), vec2(uv)
    PositionUv = 1,
    // vec3(pos), rgba8(color)
    PositionColor = 2,
}

impl VertexFormat {
    /// Returns the size in bytes of one vertex of this type.
    #[inline]
    pub fn size_of_one_vertex(self) -> usize {
        match self {
            VertexFormat::PositionNormalUvTangent => std::mem::size_of::<f32>() * 12,
            VertexFormat::PositionUv => std::mem::size_of::<f32>() * 5,
            VertexFormat::PositionColor => std::mem::size_of::<f32>() * 3 + 4,
        }
    }
}

impl TryFrom<u8> for VertexFormat {
    type Error = ();

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(VertexFormat::PositionNormalUvTangent),
            1 => Ok(VertexFormat::PositionUv),
            2 => Ok(VertexFormat::PositionColor),
            _ => Err(()),
        }
    }
}

/// Only `u16` and `u32` indices are supported by graphics APIs.
#[repr(u8)]
#[derive(Eq, PartialEq, Copy, Clone, Debug, Serialize, Deserialize)]
pub enum IndexType {
    U16 = 0,
    U32 = 1,
}

impl IndexType {
    /// Returns the size in bytes of one index of this type.
    #[inline]
    pub fn size_of_one_index(self) -> usize {
        match self {
            IndexType::U16 => std::mem::size_of::<u16>(),
            IndexType::U32 => std::mem::size_of::<u32>(),
        }
    }
}

impl TryFrom<u8> for IndexType {
    type Error = ();

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(IndexType::U16),
            1 => Ok(IndexType::U32),
            _ => Err(()),
        }
    }
}

/// Indexed triangular geometry. Each mesh has a specified format of vertex
/// data and index type.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Mesh {
    pub vertex_format: VertexFormat,
    pub vertex_data: Vec<u8>,
    pub index_type: IndexType,
    pub index_data: Vec<u8>,
}

impl Mesh {
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertex_data.len() / self.vertex_format.size_of_one_vertex()
    }

    #[inline]
    pub fn index_count(&self) -> usize {
        self.index_data.len() / self.index_type.size_of_one_index()
    }

    fn check(&self) -> Result<()> {
        if self.vertex_data.len() % self.vertex_format.size_of_one_vertex() != 0 {
            return Err(Error::malformed(
                ids::MESH,
                format!(
                    "{} bytes of vertex data is not a multiple of {:?}",
                    self.vertex_data.len(),
                    self.vertex_format
                ),
            ));
        }
        if self.index_data.len() % self.index_type.size_of_one_index() != 0 {
            return Err(Error::malformed(
                ids::MESH,
                format!(
                    "{} bytes of index data is not a multiple of {:?}",
                    self.index_data.len(),
                    self.index_type
                ),
            ));
        }
        Ok(())
    }
}

pub(crate) fn read(r: &mut ContentReader<'_>, _: &TypeName) -> Result<Content> {
    let raw = r.read_u8()?;
    let vertex_format = VertexFormat::try_from(raw)
        .map_err(|_| Error::malformed(ids::MESH, format!("unknown vertex format {}", raw)))?;
    let vertex_data = r.read_blob()?;
    let raw = r.read_u8()?;
    let index_type = IndexType::try_from(raw)
        .map_err(|_| Error::malformed(ids::MESH, format!("unknown index type {}", raw)))?;
    let index_data = r.read_blob()?;

    let mesh = Mesh {
        vertex_format,
        vertex_data,
        index_type,
        index_data,
    };
    mesh.check()?;
    Ok(Content::Mesh(mesh))
}

pub(crate) fn write(w: &mut ContentWriter<'_>, t: &TypeName, value: &Content) -> Result<()> {
    let mesh = match value {
        Content::Mesh(mesh) => mesh,
        other => return Err(mismatch(t, other)),
    };
    mesh.check()?;

    w.write_u8(mesh.vertex_format as u8)?;
    w.write_blob(&mesh.vertex_data)?;
    w.write_u8(mesh.index_type as u8)?;
    w.write_blob(&mesh.index_data)
}

#[cfg(test)]
mod tests {
    use crate::content::{Content, ContentGraph, IndexType, Mesh, VertexFormat};
    use crate::registry::TypeRegistry;
    use crate::writer::ContentWriter;
    use crate::Error;
    use matches::assert_matches;

    #[test]
    fn vertex_sizes() {
        assert_eq!(VertexFormat::PositionNormalUvTangent.size_of_one_vertex(), 48);
        assert_eq!(VertexFormat::PositionUv.size_of_one_vertex(), 20);
        assert_eq!(VertexFormat::PositionColor.size_of_one_vertex(), 16);
    }

    #[test]
    fn counts() {
        let mesh = Mesh {
            vertex_format: VertexFormat::PositionUv,
            vertex_data: vec![0; 60],
            index_type: IndexType::U16,
            index_data: vec![0; 6],
        };

        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.index_count(), 3);
    }

    #[test]
    fn partial_vertex_is_rejected() {
        let registry = TypeRegistry::with_builtins();
        let mesh = Mesh {
            vertex_format: VertexFormat::PositionColor,
            vertex_data: vec![0; 17],
            index_type: IndexType::U32,
            index_data: vec![],
        };

        assert_matches!(
            ContentWriter::write_root(&registry, &ContentGraph::new(Content::Mesh(mesh))),
            Err(Error::MalformedContent { type_id, .. }) if type_id == "mesh"
        );
    }
}
