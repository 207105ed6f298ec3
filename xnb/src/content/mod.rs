//! In-memory representation of processed content.
//!
//! Content is a closed set of variants. Values form trees; anything that has
//! to be referenced from more than one place (or from itself) lives in a
//! node of the [`ContentGraph`] arena and is linked with [`Content::Ref`].

mod builtin;
mod effect;
mod material;
mod mesh;
mod texture;

pub use effect::Effect;
pub use material::{BlendMode, Material};
pub use mesh::{IndexType, Mesh, VertexFormat};
pub use texture::{SurfaceFormat, Texture2D};

pub(crate) use builtin::{read_record, write_record};

use crate::registry::TypeRegistry;
use crate::types::TypeName;
use crate::writer::SharingPlan;
use crate::Error;
use std::collections::HashSet;

/// Ids of the content types registered by [`TypeRegistry::with_builtins`].
pub mod ids {
    pub const BOOL: &str = "bool";
    pub const BYTE: &str = "byte";
    pub const INT32: &str = "int32";
    pub const UINT32: &str = "uint32";
    pub const INT64: &str = "int64";
    pub const SINGLE: &str = "single";
    pub const DOUBLE: &str = "double";
    pub const STRING: &str = "string";
    pub const BYTES: &str = "bytes";

    pub const ARRAY: &str = "array";
    pub const NULLABLE: &str = "nullable";
    pub const DICTIONARY: &str = "dictionary";
    /// `shared<T>` marks a reference into the shared resource table.
    pub const SHARED: &str = "shared";

    pub const TEXTURE2D: &str = "texture2d";
    pub const EFFECT: &str = "effect";
    pub const MESH: &str = "mesh";
    pub const MATERIAL: &str = "material";
}

/// Handle of a node inside a [`ContentGraph`].
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Debug)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Value of a type registered by a pipeline extension. Fields are stored as
/// type-tagged objects in order.
#[derive(Clone, PartialEq, Debug)]
pub struct Record {
    pub type_name: TypeName,
    pub fields: Vec<Content>,
}

impl Record {
    pub fn new(type_id: &str, fields: Vec<Content>) -> Self {
        Self {
            type_name: TypeName::simple(type_id),
            fields,
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub enum Content {
    Null,
    Bool(bool),
    Byte(u8),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    Single(f32),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    Array {
        element: TypeName,
        items: Vec<Content>,
    },
    Nullable {
        inner: TypeName,
        value: Option<Box<Content>>,
    },
    Dictionary {
        key: TypeName,
        value: TypeName,
        entries: Vec<(Content, Content)>,
    },
    Texture2D(Texture2D),
    Effect(Effect),
    Mesh(Mesh),
    Material(Material),
    Record(Record),
    /// Link to a node of the enclosing graph.
    Ref(NodeId),
}

impl Content {
    /// Convenience constructor for `array<element>`.
    pub fn array(element: TypeName, items: Vec<Content>) -> Self {
        Content::Array { element, items }
    }

    /// Type of this value, `None` for `Null` and `Ref`.
    pub fn type_name(&self) -> Option<TypeName> {
        let simple = |id: &str| Some(TypeName::simple(id));
        match self {
            Content::Null | Content::Ref(_) => None,
            Content::Bool(_) => simple(ids::BOOL),
            Content::Byte(_) => simple(ids::BYTE),
            Content::Int32(_) => simple(ids::INT32),
            Content::UInt32(_) => simple(ids::UINT32),
            Content::Int64(_) => simple(ids::INT64),
            Content::Single(_) => simple(ids::SINGLE),
            Content::Double(_) => simple(ids::DOUBLE),
            Content::String(_) => simple(ids::STRING),
            Content::Bytes(_) => simple(ids::BYTES),
            Content::Array { element, .. } => {
                Some(TypeName::generic(ids::ARRAY, vec![element.clone()]))
            }
            Content::Nullable { inner, .. } => {
                Some(TypeName::generic(ids::NULLABLE, vec![inner.clone()]))
            }
            Content::Dictionary { key, value, .. } => Some(TypeName::generic(
                ids::DICTIONARY,
                vec![key.clone(), value.clone()],
            )),
            Content::Texture2D(_) => simple(ids::TEXTURE2D),
            Content::Effect(_) => simple(ids::EFFECT),
            Content::Mesh(_) => simple(ids::MESH),
            Content::Material(_) => simple(ids::MATERIAL),
            Content::Record(r) => Some(r.type_name.clone()),
        }
    }

    /// Values that always go to the shared resource table when placed in
    /// a node. Compiled shaders are large and used by many passes.
    pub fn is_shareable(&self) -> bool {
        matches!(self, Content::Effect(_))
    }

    /// Shareable values nested in this one, not counting itself and not
    /// following references.
    pub(crate) fn nested_shareable_count(&self) -> usize {
        let count = |c: &Content| c.is_shareable() as usize + c.nested_shareable_count();
        match self {
            Content::Array { items, .. } => items.iter().map(count).sum(),
            // the inner value of a nullable is written raw, in place
            Content::Nullable { value: Some(v), .. } => v.nested_shareable_count(),
            Content::Dictionary { entries, .. } => {
                entries.iter().map(|(k, v)| count(k) + count(v)).sum()
            }
            Content::Record(r) => r.fields.iter().map(count).sum(),
            _ => 0,
        }
    }

    pub(crate) fn describe(&self) -> String {
        match self {
            Content::Null => "null".to_owned(),
            Content::Ref(id) => format!("reference to node {}", id.0),
            other => other
                .type_name()
                .map(|t| t.to_string())
                .unwrap_or_default(),
        }
    }

    /// Collects every node referenced from this value, without following
    /// the references themselves.
    pub(crate) fn collect_refs(&self, out: &mut Vec<NodeId>) {
        match self {
            Content::Ref(id) => out.push(*id),
            Content::Array { items, .. } => items.iter().for_each(|i| i.collect_refs(out)),
            Content::Nullable { value: Some(v), .. } => v.collect_refs(out),
            Content::Dictionary { entries, .. } => {
                for (k, v) in entries {
                    k.collect_refs(out);
                    v.collect_refs(out);
                }
            }
            Content::Record(r) => r.fields.iter().for_each(|f| f.collect_refs(out)),
            _ => {}
        }
    }
}

pub(crate) fn mismatch(expected: &TypeName, found: &Content) -> Error {
    Error::TypeMismatch {
        expected: expected.to_string(),
        found: found.describe(),
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct Node {
    pub content: Content,
    /// Explicitly marked for the shared resource table.
    pub shared: bool,
}

/// Arena holding a root value and every node it references.
///
/// Node 0 is the root and is always written inline. Other nodes are written
/// into the shared resource table when they are marked shared, referenced
/// from more than one place or hold shareable content. The remaining nodes
/// are written inline at their single reference.
#[derive(Clone, PartialEq, Debug)]
pub struct ContentGraph {
    nodes: Vec<Node>,
}

impl ContentGraph {
    pub const ROOT: NodeId = NodeId(0);

    pub fn new(root: Content) -> Self {
        Self {
            nodes: vec![Node {
                content: root,
                shared: false,
            }],
        }
    }

    pub(crate) fn from_parts(root: Content, shared: Vec<Content>) -> Self {
        let mut graph = Self::new(root);
        for content in shared {
            graph.add_shared(content);
        }
        graph
    }

    /// Adds a node that is shared only if it ends up referenced more than once.
    pub fn add(&mut self, content: Content) -> NodeId {
        self.push(content, false)
    }

    /// Adds a node that is always written to the shared resource table.
    pub fn add_shared(&mut self, content: Content) -> NodeId {
        self.push(content, true)
    }

    fn push(&mut self, content: Content, shared: bool) -> NodeId {
        self.nodes.push(Node { content, shared });
        NodeId(self.nodes.len() - 1)
    }

    pub fn set_root(&mut self, content: Content) {
        self.nodes[0].content = content;
    }

    #[inline]
    pub fn root(&self) -> &Content {
        &self.nodes[0].content
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    #[inline]
    pub fn content(&self, id: NodeId) -> Option<&Content> {
        self.node(id).map(|n| &n.content)
    }

    /// Mutable access to a node, used to patch forward references.
    pub fn content_mut(&mut self, id: NodeId) -> Option<&mut Content> {
        self.nodes.get_mut(id.0).map(|n| &mut n.content)
    }

    /// Number of nodes including the root.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    /// Follows `Ref`s until a value is reached. Returns `None` for dangling
    /// references and for nodes that only refer to each other.
    pub fn resolve<'g>(&'g self, mut value: &'g Content) -> Option<&'g Content> {
        for _ in 0..=self.nodes.len() {
            match value {
                Content::Ref(id) => value = self.content(*id)?,
                other => return Some(other),
            }
        }
        None
    }

    /// Structural equality following references, with both graphs required
    /// to use the same number of shared slots.
    pub fn equivalent(&self, other: &ContentGraph) -> bool {
        match (SharingPlan::compute(self), SharingPlan::compute(other)) {
            (Ok(a), Ok(b)) if a.shared_count() == b.shared_count() => {
                let mut assumed = HashSet::new();
                same(self, self.root(), other, other.root(), &mut assumed)
            }
            _ => false,
        }
    }
}

fn same(
    ga: &ContentGraph,
    a: &Content,
    gb: &ContentGraph,
    b: &Content,
    assumed: &mut HashSet<(NodeId, NodeId)>,
) -> bool {
    let all = |xs: &[Content], ys: &[Content], assumed: &mut HashSet<_>| {
        xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| same(ga, x, gb, y, assumed))
    };

    match (a, b) {
        (Content::Ref(x), Content::Ref(y)) => {
            // pairs already under comparison are assumed equal, which is
            // what makes cyclic graphs terminate
            if !assumed.insert((*x, *y)) {
                return true;
            }
            match (ga.content(*x), gb.content(*y)) {
                (Some(ca), Some(cb)) => same(ga, ca, gb, cb, assumed),
                _ => false,
            }
        }
        (Content::Ref(x), _) => ga
            .content(*x)
            .map_or(false, |ca| same(ga, ca, gb, b, assumed)),
        (_, Content::Ref(y)) => gb
            .content(*y)
            .map_or(false, |cb| same(ga, a, gb, cb, assumed)),
        (
            Content::Array { element: ea, items: ia },
            Content::Array { element: eb, items: ib },
        ) => ea == eb && all(ia, ib, assumed),
        (
            Content::Nullable { inner: ia, value: va },
            Content::Nullable { inner: ib, value: vb },
        ) => {
            ia == ib
                && match (va, vb) {
                    (Some(x), Some(y)) => same(ga, x, gb, y, assumed),
                    (None, None) => true,
                    _ => false,
                }
        }
        (
            Content::Dictionary { key: ka, value: va, entries: ea },
            Content::Dictionary { key: kb, value: vb, entries: eb },
        ) => {
            ka == kb
                && va == vb
                && ea.len() == eb.len()
                && ea.iter().zip(eb).all(|((k1, v1), (k2, v2))| {
                    same(ga, k1, gb, k2, assumed) && same(ga, v1, gb, v2, assumed)
                })
        }
        (Content::Record(ra), Content::Record(rb)) => {
            ra.type_name == rb.type_name && all(&ra.fields, &rb.fields, assumed)
        }
        _ => a == b,
    }
}

/// Registers every content type of this crate.
pub(crate) fn register_builtins(registry: &mut TypeRegistry) {
    builtin::register(registry);
    registry.builtin(ids::TEXTURE2D, 0, texture::read, texture::write, 1);
    registry.builtin(ids::EFFECT, 0, effect::read, effect::write, 1);
    registry.builtin(ids::MESH, 0, mesh::read, mesh::write, 1);
    registry.builtin(ids::MATERIAL, 0, material::read, material::write, 1);
}

#[cfg(test)]
mod tests {
    use crate::content::{ids, Content, ContentGraph, Effect, Record};
    use crate::types::TypeName;

    fn bytes_array(items: Vec<Content>) -> Content {
        Content::array(TypeName::simple(ids::BYTES), items)
    }

    #[test]
    fn type_names_of_generic_values() {
        let value = Content::Dictionary {
            key: TypeName::simple(ids::STRING),
            value: TypeName::generic(ids::ARRAY, vec![TypeName::simple(ids::INT32)]),
            entries: vec![],
        };

        assert_eq!(
            value.type_name().unwrap().to_string(),
            "dictionary<string,array<int32>>"
        );
        assert_eq!(Content::Null.type_name(), None);
    }

    #[test]
    fn resolve_follows_references() {
        let mut graph = ContentGraph::new(Content::Null);
        let blob = graph.add(Content::Bytes(vec![1, 2, 3]));
        let link = graph.add(Content::Ref(blob));

        assert_eq!(
            graph.resolve(&Content::Ref(link)),
            Some(&Content::Bytes(vec![1, 2, 3]))
        );

        let a = graph.add(Content::Null);
        let b = graph.add(Content::Ref(a));
        *graph.content_mut(a).unwrap() = Content::Ref(b);
        assert_eq!(graph.resolve(&Content::Ref(a)), None);
    }

    #[test]
    fn equivalence_ignores_node_numbering() {
        let mut a = ContentGraph::new(Content::Null);
        let _unused = a.add(Content::Int32(5));
        let blob = a.add(Content::Bytes(vec![9; 32]));
        a.set_root(bytes_array(vec![Content::Ref(blob), Content::Ref(blob)]));

        let mut b = ContentGraph::new(Content::Null);
        let blob = b.add_shared(Content::Bytes(vec![9; 32]));
        b.set_root(bytes_array(vec![Content::Ref(blob), Content::Ref(blob)]));

        assert!(a.equivalent(&b));
    }

    #[test]
    fn equivalence_counts_shared_slots() {
        let mut a = ContentGraph::new(Content::Null);
        let blob = a.add(Content::Bytes(vec![9; 32]));
        a.set_root(bytes_array(vec![Content::Ref(blob), Content::Ref(blob)]));

        // same values but written twice instead of shared
        let b = ContentGraph::new(bytes_array(vec![
            Content::Bytes(vec![9; 32]),
            Content::Bytes(vec![9; 32]),
        ]));

        assert!(!a.equivalent(&b));
    }

    #[test]
    fn equivalence_of_cycles() {
        let build = || {
            let mut graph = ContentGraph::new(Content::Null);
            let node = graph.add_shared(Content::Null);
            *graph.content_mut(node).unwrap() =
                Content::Record(Record::new("demo.loop", vec![Content::Ref(node)]));
            graph.set_root(Content::Ref(node));
            graph
        };

        assert!(build().equivalent(&build()));
    }

    #[test]
    fn effects_are_shareable() {
        assert!(Content::Effect(Effect::new(vec![0xde, 0xad])).is_shareable());
        assert!(!Content::Bytes(vec![]).is_shareable());
    }
}
