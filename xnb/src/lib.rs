//! Reading and writing of XNB content files.
//!
//! An XNB file holds one processed asset (texture, compiled shader, mesh...)
//! as a graph of type-tagged values. Every type appearing in the file is
//! listed in a manifest and resolved through a [`TypeRegistry`]. Values used
//! from several places are stored once in a shared resource table.
//!
//! ```no_run
//! use xnb::{Content, ContentGraph, SurfaceFormat, Texture2D, TypeName, TypeRegistry};
//!
//! let registry = TypeRegistry::with_builtins();
//! let texture = Texture2D::new(SurfaceFormat::Rgba8, 1, 1, vec![vec![255; 4]]);
//! let graph = ContentGraph::new(Content::Texture2D(texture));
//!
//! let mut bytes = vec![];
//! xnb::serialize(&registry, &graph, &mut bytes, true)?;
//! let loaded = xnb::deserialize(&registry, &mut bytes.as_slice(), &"texture2d".parse()?)?;
//! assert!(loaded.equivalent(&graph));
//! # Ok::<(), xnb::Error>(())
//! ```

mod error;
mod header;
mod options;
mod registry;
mod types;

pub mod codec;
pub mod content;
pub mod reader;
pub mod writer;

pub use codec::Compression;
pub use content::{
    BlendMode, Content, ContentGraph, Effect, IndexType, Material, Mesh, Node, NodeId, Record,
    SurfaceFormat, Texture2D, VertexFormat,
};
pub use error::{Error, ErrorKind, Result};
pub use header::{
    ContainerHeader, GraphicsProfile, TargetPlatform, XNB_FORMAT_VERSION, XNB_MAGIC,
    XNB_MAX_SUPPORTED_VERSION,
};
pub use options::{ReaderOptions, WriterOptions};
pub use reader::{ContentReader, ReaderState};
pub use registry::{ReadFn, TypeReaderDescriptor, TypeRegistry, WriteFn};
pub use types::TypeName;
pub use writer::ContentWriter;

pub use uuid;

use std::io::{Read, Write};

/// Writes `graph` as a complete XNB file to `target`. When `compress` is
/// set the payload is deflated.
pub fn serialize<W: Write>(
    registry: &TypeRegistry,
    graph: &ContentGraph,
    target: &mut W,
    compress: bool,
) -> Result<()> {
    let compression = if compress {
        Compression::Deflate
    } else {
        Compression::None
    };
    serialize_with_options(
        registry,
        graph,
        target,
        &WriterOptions::default().with_compression(compression),
    )
}

pub fn serialize_with_options<W: Write>(
    registry: &TypeRegistry,
    graph: &ContentGraph,
    target: &mut W,
    options: &WriterOptions,
) -> Result<()> {
    let payload = ContentWriter::write_root(registry, graph)?;
    let framed = codec::encode_with(&payload, options)?;
    target.write_all(&framed)?;
    Ok(())
}

/// Reads a complete XNB file from `source`. The root must be of type
/// `expected_root` (or a shared reference to it).
pub fn deserialize<R: Read>(
    registry: &TypeRegistry,
    source: &mut R,
    expected_root: &TypeName,
) -> Result<ContentGraph> {
    deserialize_with_options(registry, source, expected_root, ReaderOptions::default())
}

pub fn deserialize_with_options<R: Read>(
    registry: &TypeRegistry,
    source: &mut R,
    expected_root: &TypeName,
    options: ReaderOptions,
) -> Result<ContentGraph> {
    let mut bytes = vec![];
    source.read_to_end(&mut bytes)?;
    ContentReader::with_options(registry, options).read_root_as(&bytes, expected_root)
}
