//! Deserialization of XNB files into a [`ContentGraph`].
//!
//! A [`ContentReader`] processes exactly one file. It walks through a fixed
//! sequence of states and ends either in `Done` or in `Failed`, after which
//! it refuses any further work.

use crate::codec;
use crate::content::{ids, Content, ContentGraph, NodeId};
use crate::error::ErrorKind;
use crate::header::ContainerHeader;
use crate::options::ReaderOptions;
use crate::registry::{TypeReaderDescriptor, TypeRegistry};
use crate::types::TypeName;
use crate::{Error, Result};
use byteorder::{ByteOrder, LittleEndian};
use log::{debug, trace};
use std::collections::HashMap;
use std::sync::Arc;

/// Smallest possible manifest entry: empty id and a version.
const MIN_MANIFEST_ENTRY: usize = 1 + 4;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ReaderState {
    Start,
    HeaderValidated,
    Decompressed,
    ManifestLoaded,
    RootRead,
    SharedTableResolved,
    Done,
    Failed(ErrorKind),
}

/// Reader context of a single file. Type readers receive it to read the
/// body of their values.
pub struct ContentReader<'a> {
    registry: &'a TypeRegistry,
    options: ReaderOptions,
    state: ReaderState,
    header: Option<ContainerHeader>,
    payload: Vec<u8>,
    pos: usize,
    manifest: Vec<Arc<TypeReaderDescriptor>>,
    descriptors: HashMap<TypeName, Arc<TypeReaderDescriptor>>,
    shared_count: usize,
    // shared slots (1-based) and the type their referrers expect
    shared_checks: Vec<(usize, TypeName)>,
    depth: usize,
}

impl<'a> ContentReader<'a> {
    pub fn new(registry: &'a TypeRegistry) -> Self {
        Self::with_options(registry, ReaderOptions::default())
    }

    pub fn with_options(registry: &'a TypeRegistry, options: ReaderOptions) -> Self {
        Self {
            registry,
            options,
            state: ReaderState::Start,
            header: None,
            payload: Vec::new(),
            pos: 0,
            manifest: vec![],
            descriptors: HashMap::new(),
            shared_count: 0,
            shared_checks: vec![],
            depth: 0,
        }
    }

    #[inline]
    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// Header of the file, available once it was validated.
    #[inline]
    pub fn header(&self) -> Option<&ContainerHeader> {
        self.header.as_ref()
    }

    /// Content types declared by the file, in manifest order.
    pub fn manifest(&self) -> impl Iterator<Item = &TypeReaderDescriptor> {
        self.manifest.iter().map(|d| d.as_ref())
    }

    /// Number of entries in the shared resource table.
    #[inline]
    pub fn shared_count(&self) -> usize {
        self.shared_count
    }

    /// Reads a whole file. The root may be of any type.
    pub fn read_root(&mut self, bytes: &[u8]) -> Result<ContentGraph> {
        self.read_file(bytes, None)
    }

    /// Reads a whole file whose root must be of type `expected`.
    pub fn read_root_as(&mut self, bytes: &[u8], expected: &TypeName) -> Result<ContentGraph> {
        self.read_file(bytes, Some(expected))
    }

    fn read_file(&mut self, bytes: &[u8], expected: Option<&TypeName>) -> Result<ContentGraph> {
        if self.state != ReaderState::Start {
            return Err(Error::ContextConsumed);
        }

        let result = self.run(bytes, expected);
        self.payload = Vec::new();
        self.shared_checks.clear();
        if let Err(e) = &result {
            debug!("reading failed in state {:?}: {}", self.state, e);
            self.transition(ReaderState::Failed(e.kind()));
        }
        result
    }

    fn run(&mut self, bytes: &[u8], expected: Option<&TypeName>) -> Result<ContentGraph> {
        let header = ContainerHeader::parse(bytes)?;
        codec::check_header(&header, &self.options)?;
        self.header = Some(header);
        self.transition(ReaderState::HeaderValidated);

        self.payload = codec::decompress(&header, &bytes[header.encoded_len()..], &self.options)?;
        self.pos = 0;
        self.transition(ReaderState::Decompressed);

        self.read_manifest()?;
        if let Some(expected) = expected {
            self.check_root_type(expected)?;
        }
        self.transition(ReaderState::ManifestLoaded);

        let root = self.read_object()?;
        self.transition(ReaderState::RootRead);

        let mut shared = Vec::with_capacity(self.shared_count);
        for _ in 0..self.shared_count {
            shared.push(self.read_object()?);
        }
        self.check_shared(&shared)?;
        if self.pos != self.payload.len() {
            return Err(Error::malformed(
                "payload",
                format!("{} trailing bytes", self.payload.len() - self.pos),
            ));
        }
        self.transition(ReaderState::SharedTableResolved);

        let graph = ContentGraph::from_parts(root, shared);
        debug!(
            "read {} content types, {} shared resources",
            self.manifest.len(),
            self.shared_count
        );
        self.transition(ReaderState::Done);
        Ok(graph)
    }

    fn transition(&mut self, next: ReaderState) {
        trace!("{:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn read_manifest(&mut self) -> Result<()> {
        let count = self.read_7bit()? as usize;
        self.ensure_available(count, MIN_MANIFEST_ENTRY)?;

        let mut manifest = Vec::with_capacity(count);
        for _ in 0..count {
            let id = self.read_string()?;
            let version = self.read_i32()?;
            let descriptor = self.registry.resolve(&id)?;
            if descriptor.version() != version {
                return Err(Error::TypeVersionMismatch {
                    type_id: id,
                    file: version,
                    registered: descriptor.version(),
                });
            }
            trace!("manifest entry {}: {} v{}", manifest.len() + 1, id, version);
            manifest.push(Arc::new(descriptor));
        }
        self.manifest = manifest;

        self.shared_count = self.read_7bit()? as usize;
        self.ensure_available(self.shared_count, 1)
    }

    /// Peeks at the root's type tag without consuming it.
    fn check_root_type(&mut self, expected: &TypeName) -> Result<()> {
        let start = self.pos;
        let tag = self.read_7bit()? as usize;
        self.pos = start;

        let found = match tag {
            0 => None,
            k => Some(self.manifest_entry(k)?.type_name().clone()),
        };
        match found {
            Some(t) if accepts(expected, &t) => Ok(()),
            Some(t) => Err(Error::TypeMismatch {
                expected: expected.to_string(),
                found: t.to_string(),
            }),
            None => Err(Error::TypeMismatch {
                expected: expected.to_string(),
                found: "null".to_owned(),
            }),
        }
    }

    fn check_shared(&self, shared: &[Content]) -> Result<()> {
        for (index, expected) in &self.shared_checks {
            let found = shared[*index - 1].type_name();
            if found.as_ref() != Some(expected) {
                return Err(Error::TypeMismatch {
                    expected: expected.to_string(),
                    found: shared[*index - 1].describe(),
                });
            }
        }
        Ok(())
    }

    fn manifest_entry(&self, tag: usize) -> Result<Arc<TypeReaderDescriptor>> {
        self.manifest.get(tag - 1).cloned().ok_or_else(|| {
            Error::malformed(
                "object",
                format!(
                    "type tag {} outside of manifest with {} entries",
                    tag,
                    self.manifest.len()
                ),
            )
        })
    }

    fn take(&mut self, len: usize) -> Result<&[u8]> {
        let available = self.payload.len() - self.pos;
        if len > available {
            return Err(Error::TruncatedStream {
                needed: len,
                available,
            });
        }
        let start = self.pos;
        self.pos += len;
        Ok(&self.payload[start..self.pos])
    }

    /// Fails unless at least `count` items of `item_size` bytes remain.
    /// Guards allocations sized from counts stored in the file.
    pub fn ensure_available(&self, count: usize, item_size: usize) -> Result<()> {
        let needed = count.saturating_mul(item_size);
        let available = self.payload.len() - self.pos;
        if needed > available {
            return Err(Error::TruncatedStream { needed, available });
        }
        Ok(())
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(Error::malformed(ids::BOOL, format!("invalid value {}", other))),
        }
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(LittleEndian::read_i32(self.take(4)?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(LittleEndian::read_i64(self.take(8)?))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(LittleEndian::read_f32(self.take(4)?))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(LittleEndian::read_f64(self.take(8)?))
    }

    /// Reads an integer in the 7-bit variable length encoding.
    pub fn read_7bit(&mut self) -> Result<u32> {
        let mut value = 0u32;
        for shift in (0..35).step_by(7) {
            let byte = self.read_u8()?;
            if shift == 28 && byte > 0x0f {
                break;
            }
            value |= ((byte & 0x7f) as u32) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(Error::malformed("7bit", "encoded integer does not fit in 32 bits"))
    }

    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_7bit()? as usize;
        let bytes = self.take(len)?.to_vec();
        String::from_utf8(bytes).map_err(|e| Error::malformed(ids::STRING, e.to_string()))
    }

    /// Reads a `u32` element count and checks that many items of at least
    /// `min_item_size` bytes can still follow.
    pub fn read_count(&mut self, min_item_size: usize) -> Result<usize> {
        let count = self.read_u32()? as usize;
        self.ensure_available(count, min_item_size)?;
        Ok(count)
    }

    /// Reads a `u32` byte length followed by that many bytes.
    pub fn read_blob(&mut self) -> Result<Vec<u8>> {
        let len = self.read_u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    /// Reads a type-tagged value of any type.
    pub fn read_object(&mut self) -> Result<Content> {
        match self.read_7bit()? as usize {
            0 => Ok(Content::Null),
            tag => {
                let descriptor = self.manifest_entry(tag)?;
                self.read_with(&descriptor)
            }
        }
    }

    /// Reads a type-tagged value that must be null, of type `expected` or
    /// a shared reference to such value.
    pub fn read_object_of(&mut self, expected: &TypeName) -> Result<Content> {
        match self.read_7bit()? as usize {
            0 => Ok(Content::Null),
            tag => {
                let descriptor = self.manifest_entry(tag)?;
                if !accepts(expected, descriptor.type_name()) {
                    return Err(Error::TypeMismatch {
                        expected: expected.to_string(),
                        found: descriptor.type_name().to_string(),
                    });
                }
                self.read_with(&descriptor)
            }
        }
    }

    /// Reads the body of a value of type `expected` stored without a tag.
    pub fn read_raw(&mut self, expected: &TypeName) -> Result<Content> {
        let descriptor = match self.descriptors.get(expected) {
            Some(d) => d.clone(),
            None => {
                let d = Arc::new(self.registry.resolve_name(expected)?);
                self.descriptors.insert(expected.clone(), d.clone());
                d
            }
        };
        self.read_with(&descriptor)
    }

    /// Reads a 1-based shared resource index. The referenced value is
    /// checked against `expected` once the shared table is read.
    pub fn read_shared_ref(&mut self, expected: &TypeName) -> Result<Content> {
        let index = self.read_7bit()? as usize;
        if index == 0 {
            return Ok(Content::Null);
        }
        if index > self.shared_count {
            return Err(Error::DanglingSharedReference {
                index,
                count: self.shared_count,
            });
        }
        self.shared_checks.push((index, expected.clone()));
        Ok(Content::Ref(NodeId(index)))
    }

    fn read_with(&mut self, descriptor: &TypeReaderDescriptor) -> Result<Content> {
        if self.depth >= self.options.max_object_depth {
            return Err(Error::TypeNestingTooDeep {
                type_id: descriptor.type_name().to_string(),
                limit: self.options.max_object_depth,
            });
        }
        self.depth += 1;
        let value = descriptor.read(self);
        self.depth -= 1;
        value
    }
}

/// `expected` itself or a shared reference to it.
fn accepts(expected: &TypeName, found: &TypeName) -> bool {
    found == expected
        || (found.name() == ids::SHARED && found.args().len() == 1 && &found.args()[0] == expected)
}

#[cfg(test)]
mod tests {
    use crate::codec;
    use crate::content::{ids, Content, ContentGraph};
    use crate::error::ErrorKind;
    use crate::options::ReaderOptions;
    use crate::reader::{ContentReader, ReaderState};
    use crate::registry::TypeRegistry;
    use crate::types::TypeName;
    use crate::writer::ContentWriter;
    use crate::{Error, Result};
    use matches::assert_matches;

    fn file(registry: &TypeRegistry, root: Content) -> Vec<u8> {
        let payload = ContentWriter::write_root(registry, &ContentGraph::new(root)).unwrap();
        codec::encode(&payload, false).unwrap()
    }

    // payload with a single manifest entry and a root of that type
    fn handcrafted(id: &str, version: i32, body: &[u8]) -> Vec<u8> {
        let mut payload = vec![1, id.len() as u8];
        payload.extend_from_slice(id.as_bytes());
        payload.extend_from_slice(&version.to_le_bytes());
        payload.push(0);
        payload.push(1);
        payload.extend_from_slice(body);
        codec::encode(&payload, false).unwrap()
    }

    #[test]
    fn states_of_successful_read() {
        let registry = TypeRegistry::with_builtins();
        let bytes = file(&registry, Content::String("hello".into()));
        let mut reader = ContentReader::new(&registry);

        assert_eq!(reader.state(), ReaderState::Start);
        let graph = reader.read_root(&bytes).unwrap();

        assert_eq!(reader.state(), ReaderState::Done);
        assert_eq!(graph.root(), &Content::String("hello".into()));
        assert_eq!(reader.manifest().count(), 1);
        assert_eq!(reader.shared_count(), 0);
        assert!(reader.header().is_some());
    }

    #[test]
    fn context_is_single_use() {
        let registry = TypeRegistry::with_builtins();
        let bytes = file(&registry, Content::Int32(1));
        let mut reader = ContentReader::new(&registry);

        reader.read_root(&bytes).unwrap();
        assert_matches!(reader.read_root(&bytes), Err(Error::ContextConsumed));
        assert_eq!(reader.state(), ReaderState::Done);
    }

    #[test]
    fn failure_is_terminal() {
        let registry = TypeRegistry::with_builtins();
        let mut reader = ContentReader::new(&registry);

        assert_matches!(reader.read_root(b"PNG\x89...."), Err(Error::NotAnXnbFile { .. }));
        assert_eq!(reader.state(), ReaderState::Failed(ErrorKind::NotAnXnbFile));
        assert!(reader.header().is_none());

        let bytes = file(&registry, Content::Int32(1));
        assert_matches!(reader.read_root(&bytes), Err(Error::ContextConsumed));
    }

    #[test]
    fn version_mismatch() {
        let registry = TypeRegistry::with_builtins();
        let bytes = handcrafted("texture2d", 2, &[]);
        let mut reader = ContentReader::new(&registry);

        assert_matches!(
            reader.read_root(&bytes),
            Err(Error::TypeVersionMismatch { type_id, file: 2, registered: 1 }) if type_id == "texture2d"
        );
        assert_eq!(reader.state(), ReaderState::Failed(ErrorKind::TypeVersionMismatch));
    }

    #[test]
    fn unknown_type_in_manifest() {
        let registry = TypeRegistry::with_builtins();
        let bytes = handcrafted("array<mygame.enemy>", 0, &[0, 0, 0, 0]);

        assert_matches!(
            ContentReader::new(&registry).read_root(&bytes),
            Err(Error::UnknownType { type_id }) if type_id == "mygame.enemy"
        );
    }

    #[test]
    fn tag_outside_of_manifest() {
        let registry = TypeRegistry::with_builtins();
        let mut bytes = file(&registry, Content::Int32(5));
        // root tag sits right before the i32 body
        let at = bytes.len() - 5;
        bytes[at] = 9;

        assert_matches!(
            ContentReader::new(&registry).read_root(&bytes),
            Err(Error::MalformedContent { .. })
        );
    }

    #[test]
    fn truncation_at_every_offset() {
        let registry = TypeRegistry::with_builtins();
        let root = Content::Dictionary {
            key: TypeName::simple(ids::STRING),
            value: TypeName::simple(ids::BYTES),
            entries: vec![
                (Content::String("a".into()), Content::Bytes(vec![1, 2, 3])),
                (Content::String("b".into()), Content::Null),
            ],
        };
        let payload = ContentWriter::write_root(&registry, &ContentGraph::new(root)).unwrap();

        for len in 0..payload.len() {
            let bytes = codec::encode(&payload[..len], false).unwrap();
            let result: Result<_> = ContentReader::new(&registry).read_root(&bytes);
            assert!(
                matches!(result, Err(Error::TruncatedStream { .. })),
                "cut at {}: {:?}",
                len,
                result
            );
        }
    }

    #[test]
    fn expected_root_type() {
        let registry = TypeRegistry::with_builtins();
        let bytes = file(&registry, Content::Int32(5));

        assert!(ContentReader::new(&registry)
            .read_root_as(&bytes, &TypeName::simple(ids::INT32))
            .is_ok());
        assert_matches!(
            ContentReader::new(&registry).read_root_as(&bytes, &TypeName::simple(ids::TEXTURE2D)),
            Err(Error::TypeMismatch { expected, found }) if expected == "texture2d" && found == "int32"
        );
    }

    #[test]
    fn shared_index_out_of_range() {
        let registry = TypeRegistry::with_builtins();
        // root is shared<bytes> pointing at slot 2 of an empty table
        let bytes = handcrafted("shared<bytes>", 0, &[2]);

        assert_matches!(
            ContentReader::new(&registry).read_root(&bytes),
            Err(Error::DanglingSharedReference { index: 2, count: 0 })
        );
    }

    #[test]
    fn object_depth_is_bounded() {
        let registry = TypeRegistry::with_builtins();
        let mut root = Content::Int32(1);
        let mut element = TypeName::simple(ids::INT32);
        for _ in 0..8 {
            root = Content::array(element.clone(), vec![root]);
            element = TypeName::generic(ids::ARRAY, vec![element]);
        }
        let bytes = file(&registry, root);

        let options = ReaderOptions {
            max_object_depth: 4,
            ..Default::default()
        };
        assert_matches!(
            ContentReader::with_options(&registry, options).read_root(&bytes),
            Err(Error::TypeNestingTooDeep { limit: 4, .. })
        );
        assert!(ContentReader::new(&registry).read_root(&bytes).is_ok());
    }

    #[test]
    fn invalid_bool() {
        let registry = TypeRegistry::with_builtins();
        let bytes = handcrafted("bool", 0, &[2]);

        assert_matches!(
            ContentReader::new(&registry).read_root(&bytes),
            Err(Error::MalformedContent { type_id, .. }) if type_id == "bool"
        );
    }
}
