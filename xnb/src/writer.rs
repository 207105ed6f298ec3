//! Serialization of a [`ContentGraph`] into the XNB payload.
//!
//! The payload starts with the type manifest and the number of shared
//! resources, followed by the root object and the shared resources in the
//! order they were first referenced. The manifest is only known once all
//! objects are written, so objects go to a separate buffer first.

use crate::content::{ids, mismatch, Content, ContentGraph, NodeId};
use crate::registry::{TypeReaderDescriptor, TypeRegistry};
use crate::types::TypeName;
use crate::{Error, Result};
use byteorder::{LittleEndian, WriteBytesExt};
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

/// Decides which nodes of a graph go to the shared resource table and
/// counts the shareable values written in place, each of which gets a slot
/// of its own.
pub(crate) struct SharingPlan {
    shared: Vec<bool>,
    inline: usize,
}

impl SharingPlan {
    /// Walks every node reachable from the root and counts references to it.
    pub(crate) fn compute(graph: &ContentGraph) -> Result<Self> {
        let count = graph.node_count();
        let mut references = vec![0usize; count];
        let mut visited = vec![false; count];
        let mut pending = vec![ContentGraph::ROOT];
        let mut refs = vec![];
        let mut inline = graph.root().is_shareable() as usize;
        visited[0] = true;

        while let Some(id) = pending.pop() {
            refs.clear();
            if let Some(content) = graph.content(id) {
                content.collect_refs(&mut refs);
                inline += content.nested_shareable_count();
            }

            for &target in &refs {
                if target.index() >= count {
                    return Err(Error::DanglingSharedReference {
                        index: target.index(),
                        count,
                    });
                }
                // the root is written inline, anything pointing back at it
                // would have to embed it into itself
                if target == ContentGraph::ROOT {
                    return Err(Error::CyclicReference { node: 0 });
                }
                references[target.index()] += 1;
                if !visited[target.index()] {
                    visited[target.index()] = true;
                    pending.push(target);
                }
            }
        }

        let shared = graph
            .nodes()
            .map(|(id, node)| {
                id != ContentGraph::ROOT
                    && visited[id.index()]
                    && (node.shared || references[id.index()] > 1 || node.content.is_shareable())
            })
            .collect();

        Ok(Self { shared, inline })
    }

    #[inline]
    pub(crate) fn is_shared(&self, id: NodeId) -> bool {
        self.shared.get(id.index()).copied().unwrap_or(false)
    }

    pub(crate) fn shared_count(&self) -> usize {
        self.shared.iter().filter(|s| **s).count() + self.inline
    }
}

/// Entry of the shared resource table.
enum SharedSlot {
    Node(NodeId),
    Inline(Content),
}

/// Writer context of a single file. Type writers receive it to write the
/// body of their values.
pub struct ContentWriter<'a> {
    registry: &'a TypeRegistry,
    graph: &'a ContentGraph,
    plan: SharingPlan,
    out: Vec<u8>,
    manifest: Vec<Arc<TypeReaderDescriptor>>,
    manifest_index: HashMap<TypeName, usize>,
    descriptors: HashMap<TypeName, Arc<TypeReaderDescriptor>>,
    shared_index: HashMap<NodeId, usize>,
    shared_order: Vec<SharedSlot>,
}

impl<'a> ContentWriter<'a> {
    /// Serializes `graph` and returns the payload (without container header).
    pub fn write_root(registry: &'a TypeRegistry, graph: &'a ContentGraph) -> Result<Vec<u8>> {
        let mut writer = ContentWriter {
            registry,
            graph,
            plan: SharingPlan::compute(graph)?,
            out: Vec::new(),
            manifest: vec![],
            manifest_index: HashMap::new(),
            descriptors: HashMap::new(),
            shared_index: HashMap::new(),
            shared_order: vec![],
        };

        writer.write_object(graph.root())?;

        // shared resources may reference further shared resources
        let mut next = 0;
        while next < writer.shared_order.len() {
            match &mut writer.shared_order[next] {
                SharedSlot::Node(id) => {
                    let id = *id;
                    let content = graph.content(id).ok_or(Error::DanglingSharedReference {
                        index: id.index(),
                        count: graph.node_count(),
                    })?;
                    writer.write_value(content)?;
                }
                SharedSlot::Inline(content) => {
                    let content = std::mem::replace(content, Content::Null);
                    writer.write_value(&content)?;
                }
            }
            next += 1;
        }

        writer.finish()
    }

    fn finish(self) -> Result<Vec<u8>> {
        let mut payload = Vec::with_capacity(self.out.len() + 16 * self.manifest.len() + 8);

        put_7bit(&mut payload, len_u32(self.manifest.len())?);
        for descriptor in &self.manifest {
            put_string(&mut payload, &descriptor.type_name().to_string())?;
            payload.write_i32::<LittleEndian>(descriptor.version())?;
        }
        put_7bit(&mut payload, len_u32(self.shared_order.len())?);
        payload.extend_from_slice(&self.out);

        debug!(
            "wrote {} bytes, {} content types, {} shared resources",
            payload.len(),
            self.manifest.len(),
            self.shared_order.len()
        );
        Ok(payload)
    }

    /// The graph being written.
    #[inline]
    pub fn graph(&self) -> &'a ContentGraph {
        self.graph
    }

    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.write_u8(value as u8)
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.out.push(value);
        Ok(())
    }

    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        Ok(self.out.write_i32::<LittleEndian>(value)?)
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        Ok(self.out.write_u32::<LittleEndian>(value)?)
    }

    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        Ok(self.out.write_i64::<LittleEndian>(value)?)
    }

    pub fn write_f32(&mut self, value: f32) -> Result<()> {
        Ok(self.out.write_f32::<LittleEndian>(value)?)
    }

    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        Ok(self.out.write_f64::<LittleEndian>(value)?)
    }

    /// Writes an integer in the 7-bit variable length encoding.
    pub fn write_7bit(&mut self, value: u32) -> Result<()> {
        put_7bit(&mut self.out, value);
        Ok(())
    }

    pub fn write_7bit_len(&mut self, len: usize) -> Result<()> {
        self.write_7bit(len_u32(len)?)
    }

    /// Writes a length-prefixed UTF-8 string.
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        put_string(&mut self.out, value)
    }

    /// Writes the element count of a container as `u32`.
    pub fn write_count(&mut self, count: usize) -> Result<()> {
        self.write_u32(len_u32(count)?)
    }

    /// Writes a `u32` byte length followed by the bytes.
    pub fn write_blob(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_count(bytes.len())?;
        self.out.extend_from_slice(bytes);
        Ok(())
    }

    /// Writes a type-tagged value. `Null` is written as tag 0, references to
    /// shared nodes as `shared<T>` and other references inline. Shareable
    /// values always take a slot of the shared resource table.
    pub fn write_object(&mut self, value: &Content) -> Result<()> {
        match value {
            Content::Null => self.write_7bit(0),
            Content::Ref(id) => self.write_ref(*id, value),
            other if other.is_shareable() => self.write_inline_shared(other),
            other => self.write_value(other),
        }
    }

    /// Writes a value in place, tagged with its own type.
    fn write_value(&mut self, value: &Content) -> Result<()> {
        match value {
            Content::Null => self.write_7bit(0),
            Content::Ref(id) => self.write_ref(*id, value),
            other => match other.type_name() {
                Some(name) => self.write_tagged(name, other),
                None => Err(Error::malformed("object", "value has no type")),
            },
        }
    }

    /// Like [`write_object`](Self::write_object) but requires the value to
    /// be of type `expected`, a reference to such value, or null.
    pub fn write_object_of(&mut self, expected: &TypeName, value: &Content) -> Result<()> {
        let resolved = self
            .graph
            .resolve(value)
            .ok_or_else(|| mismatch(expected, value))?;
        match resolved.type_name() {
            Some(actual) if &actual != expected => Err(mismatch(expected, resolved)),
            _ => self.write_object(value),
        }
    }

    /// Writes the body of a value of type `expected` without a type tag.
    pub fn write_raw(&mut self, expected: &TypeName, value: &Content) -> Result<()> {
        if value.type_name().as_ref() != Some(expected) {
            return Err(mismatch(expected, value));
        }
        let descriptor = self.descriptor(expected)?;
        descriptor.write(self, value)
    }

    /// Writes the 1-based index of a shared node, assigning the next free
    /// index on first use.
    pub fn write_shared_index(&mut self, id: NodeId) -> Result<()> {
        let next = self.shared_order.len() + 1;
        let index = *self.shared_index.entry(id).or_insert(next);
        if index == next {
            self.shared_order.push(SharedSlot::Node(id));
        }
        self.write_7bit_len(index)
    }

    fn write_inline_shared(&mut self, value: &Content) -> Result<()> {
        let target = value
            .type_name()
            .ok_or_else(|| Error::malformed(ids::SHARED, "shared value must be typed"))?;
        let (tag, _) = self.manifest_entry(TypeName::generic(ids::SHARED, vec![target]))?;
        self.write_7bit_len(tag)?;
        self.shared_order.push(SharedSlot::Inline(value.clone()));
        self.write_7bit_len(self.shared_order.len())
    }

    fn write_ref(&mut self, id: NodeId, value: &Content) -> Result<()> {
        let graph = self.graph;
        let content = graph.content(id).ok_or(Error::DanglingSharedReference {
            index: id.index(),
            count: graph.node_count(),
        })?;

        if !self.plan.is_shared(id) {
            return self.write_value(content);
        }

        let target = content
            .type_name()
            .ok_or_else(|| Error::malformed(ids::SHARED, "shared node must hold a typed value"))?;
        self.write_tagged(TypeName::generic(ids::SHARED, vec![target]), value)
    }

    fn write_tagged(&mut self, name: TypeName, value: &Content) -> Result<()> {
        let (tag, descriptor) = self.manifest_entry(name)?;
        self.write_7bit_len(tag)?;
        descriptor.write(self, value)
    }

    /// 1-based manifest tag of `name`, appending it on first use.
    fn manifest_entry(&mut self, name: TypeName) -> Result<(usize, Arc<TypeReaderDescriptor>)> {
        Ok(match self.manifest_index.get(&name) {
            Some(&index) => (index + 1, self.manifest[index].clone()),
            None => {
                let descriptor = Arc::new(self.registry.resolve_name(&name)?);
                self.manifest.push(descriptor.clone());
                self.manifest_index.insert(name, self.manifest.len() - 1);
                (self.manifest.len(), descriptor)
            }
        })
    }

    fn descriptor(&mut self, name: &TypeName) -> Result<Arc<TypeReaderDescriptor>> {
        if let Some(descriptor) = self.descriptors.get(name) {
            return Ok(descriptor.clone());
        }
        let descriptor = Arc::new(self.registry.resolve_name(name)?);
        self.descriptors.insert(name.clone(), descriptor.clone());
        Ok(descriptor)
    }
}

fn len_u32(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::PayloadTooLarge {
        declared: len,
        limit: u32::MAX as usize,
    })
}

fn put_7bit(out: &mut Vec<u8>, mut value: u32) {
    while value >= 0x80 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

fn put_string(out: &mut Vec<u8>, value: &str) -> Result<()> {
    put_7bit(out, len_u32(value.len())?);
    out.extend_from_slice(value.as_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::codec;
    use crate::content::{ids, Content, ContentGraph, Effect, NodeId, Record};
    use crate::reader::ContentReader;
    use crate::registry::TypeRegistry;
    use crate::types::TypeName;
    use crate::writer::{put_7bit, ContentWriter, SharingPlan};
    use crate::Error;
    use matches::assert_matches;

    fn occurrences(haystack: &[u8], needle: &[u8]) -> usize {
        haystack.windows(needle.len()).filter(|w| *w == needle).count()
    }

    #[test]
    fn seven_bit_encoding() {
        let encode = |v| {
            let mut out = vec![];
            put_7bit(&mut out, v);
            out
        };

        assert_eq!(encode(0), vec![0x00]);
        assert_eq!(encode(127), vec![0x7f]);
        assert_eq!(encode(128), vec![0x80, 0x01]);
        assert_eq!(encode(300), vec![0xac, 0x02]);
        assert_eq!(encode(u32::MAX), vec![0xff, 0xff, 0xff, 0xff, 0x0f]);
    }

    #[test]
    fn manifest_is_in_first_use_order() {
        let registry = TypeRegistry::with_builtins();
        let graph = ContentGraph::new(Content::array(
            TypeName::simple(ids::STRING),
            vec![Content::String("a".into()), Content::Null],
        ));

        let payload = ContentWriter::write_root(&registry, &graph).unwrap();

        let mut expected = vec![2u8];
        expected.push(13);
        expected.extend_from_slice(b"array<string>");
        expected.extend_from_slice(&0i32.to_le_bytes());
        expected.push(6);
        expected.extend_from_slice(b"string");
        expected.extend_from_slice(&0i32.to_le_bytes());
        // no shared resources, root tag, count, first item, null item
        expected.extend_from_slice(&[0, 1, 2, 0, 0, 0, 2, 1, b'a', 0]);
        assert_eq!(payload, expected);
    }

    #[test]
    fn repeated_blob_is_written_once() {
        let registry = TypeRegistry::with_builtins();
        let blob: Vec<u8> = (0..10 * 1024).map(|i| (i * 7 % 251) as u8).collect();

        let mut graph = ContentGraph::new(Content::Null);
        let node = graph.add(Content::Bytes(blob.clone()));
        graph.set_root(Content::Record(Record::new(
            "demo.sprites",
            vec![Content::Ref(node), Content::Ref(node), Content::Ref(node)],
        )));

        let mut registry = registry;
        registry.register_record("demo.sprites", 1).unwrap();
        let payload = ContentWriter::write_root(&registry, &graph).unwrap();

        assert_eq!(occurrences(&payload, &blob), 1);
        assert!(payload.len() < blob.len() + 128);
    }

    #[test]
    fn single_reference_is_inline() {
        let registry = TypeRegistry::with_builtins();
        let mut graph = ContentGraph::new(Content::Null);
        let node = graph.add(Content::Int32(9));
        graph.set_root(Content::array(
            TypeName::simple(ids::INT32),
            vec![Content::Ref(node)],
        ));

        let plan = SharingPlan::compute(&graph).unwrap();
        assert!(!plan.is_shared(node));

        let payload = ContentWriter::write_root(&registry, &graph).unwrap();
        assert!(!payload.windows(6).any(|w| w == b"shared"));
    }

    #[test]
    fn effects_are_shared_even_when_used_once() {
        let mut graph = ContentGraph::new(Content::Null);
        let effect = graph.add(Content::Effect(Effect::new(vec![1, 2, 3])));
        graph.set_root(Content::Ref(effect));

        let plan = SharingPlan::compute(&graph).unwrap();
        assert!(plan.is_shared(effect));
        assert_eq!(plan.shared_count(), 1);
    }

    #[test]
    fn unreachable_nodes_are_skipped() {
        let mut graph = ContentGraph::new(Content::Int32(1));
        graph.add_shared(Content::Bytes(vec![1; 64]));

        assert_eq!(SharingPlan::compute(&graph).unwrap().shared_count(), 0);
    }

    #[test]
    fn cycle_through_root_fails() {
        let mut registry = TypeRegistry::with_builtins();
        registry.register_record("demo.node", 1).unwrap();

        let mut graph = ContentGraph::new(Content::Null);
        let child = graph.add_shared(Content::Record(Record::new(
            "demo.node",
            vec![Content::Ref(ContentGraph::ROOT)],
        )));
        graph.set_root(Content::Record(Record::new(
            "demo.node",
            vec![Content::Ref(child)],
        )));

        assert_matches!(
            ContentWriter::write_root(&registry, &graph),
            Err(Error::CyclicReference { node: 0 })
        );
    }

    #[test]
    fn dangling_reference_fails() {
        let registry = TypeRegistry::with_builtins();
        let mut other = ContentGraph::new(Content::Null);
        other.add(Content::Null);
        let foreign = other.add(Content::Int32(1));

        let graph = ContentGraph::new(Content::array(
            TypeName::simple(ids::INT32),
            vec![Content::Ref(foreign)],
        ));

        assert_matches!(
            ContentWriter::write_root(&registry, &graph),
            Err(Error::DanglingSharedReference { index: 2, count: 1 })
        );
    }

    #[test]
    fn shared_cycle_is_fine() {
        let mut registry = TypeRegistry::with_builtins();
        registry.register_record("demo.node", 1).unwrap();

        let mut graph = ContentGraph::new(Content::Null);
        let a = graph.add(Content::Null);
        let b = graph.add(Content::Record(Record::new("demo.node", vec![Content::Ref(a)])));
        *graph.content_mut(a).unwrap() =
            Content::Record(Record::new("demo.node", vec![Content::Ref(b)]));
        graph.set_root(Content::Ref(a));

        // `a` is referenced by the root and by `b`, so both end up shared
        let plan = SharingPlan::compute(&graph).unwrap();
        assert!(plan.is_shared(a));
        assert!(!plan.is_shared(b));

        let payload = ContentWriter::write_root(&registry, &graph).unwrap();
        let framed = codec::encode(&payload, false).unwrap();
        let mut reader = ContentReader::new(&registry);
        let decoded = reader.read_root(&framed).unwrap();

        assert_eq!(reader.shared_count(), 1);
        assert!(decoded.equivalent(&graph));
        // the table entry refers back to itself through the inline `b`
        match decoded.root() {
            Content::Ref(id) => match decoded.content(*id) {
                Some(Content::Record(outer)) => match &outer.fields[0] {
                    Content::Record(inner) => assert_eq!(inner.fields[0], Content::Ref(*id)),
                    other => panic!("expected inline record, got {:?}", other),
                },
                other => panic!("expected record, got {:?}", other),
            },
            other => panic!("expected reference, got {:?}", other),
        }
    }

    #[test]
    fn inline_effects_take_shared_slots() {
        let registry = TypeRegistry::with_builtins();
        let effect = Content::Effect(Effect::new(vec![0xfe, 0xff, 9, 9]));

        let graphs = vec![
            ContentGraph::new(effect.clone()),
            ContentGraph::new(Content::array(
                TypeName::simple(ids::EFFECT),
                vec![effect.clone()],
            )),
        ];
        for graph in &graphs {
            assert_eq!(SharingPlan::compute(graph).unwrap().shared_count(), 1);

            let payload = ContentWriter::write_root(&registry, graph).unwrap();
            assert_eq!(occurrences(&payload, b"shared<effect>"), 1);

            let framed = codec::encode(&payload, false).unwrap();
            let mut reader = ContentReader::new(&registry);
            let decoded = reader.read_root(&framed).unwrap();
            assert_eq!(reader.shared_count(), 1);
            assert!(decoded.equivalent(graph));
            assert_eq!(decoded.content(NodeId(1)), Some(&effect));
        }
    }

    #[test]
    fn each_inline_effect_gets_its_own_slot() {
        let mut registry = TypeRegistry::with_builtins();
        registry.register_record("demo.pass", 1).unwrap();
        let effect = |byte: u8| Content::Effect(Effect::new(vec![byte; 8]));
        let graph = ContentGraph::new(Content::Record(Record::new(
            "demo.pass",
            vec![effect(1), Content::Int32(3), effect(2)],
        )));

        let payload = ContentWriter::write_root(&registry, &graph).unwrap();
        let framed = codec::encode(&payload, true).unwrap();
        let mut reader = ContentReader::new(&registry);
        let decoded = reader.read_root(&framed).unwrap();

        assert_eq!(reader.shared_count(), 2);
        assert!(decoded.equivalent(&graph));
    }
}
