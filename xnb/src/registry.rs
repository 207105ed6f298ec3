//! Registry translating content type ids to their readers and writers.
//!
//! Every content type is registered once, usually at startup, with a pair of
//! plain function pointers and a format version. Generic types (arrays,
//! nullables, dictionaries, shared references) are registered as templates
//! with an arity; an instantiation such as `array<texture2d>` resolves when
//! the template and all of its arguments resolve.
//!
//! After registration the registry is only read, so a single instance can
//! be shared by any number of reader and writer contexts across threads.

use crate::content::{self, Content};
use crate::reader::ContentReader;
use crate::types::{TypeName, DEFAULT_MAX_NESTING};
use crate::writer::ContentWriter;
use crate::{Error, Result};
use log::{debug, trace};
use std::collections::hash_map::Entry as MapEntry;
use std::collections::HashMap;

/// Deserializes the body of one value of the given type.
pub type ReadFn = fn(&mut ContentReader<'_>, &TypeName) -> Result<Content>;

/// Serializes the body of one value of the given type.
pub type WriteFn = fn(&mut ContentWriter<'_>, &TypeName, &Content) -> Result<()>;

#[derive(Copy, Clone, Debug)]
struct Registration {
    arity: usize,
    version: i32,
    read: ReadFn,
    write: WriteFn,
}

impl Registration {
    /// Function pointer addresses are not stable across codegen units, so
    /// registrations are told apart by their shape and version only.
    fn same_as(&self, other: &Registration) -> bool {
        self.arity == other.arity && self.version == other.version
    }
}

/// Resolved reader and writer of one concrete (fully instantiated) type.
#[derive(Clone, Debug)]
pub struct TypeReaderDescriptor {
    type_name: TypeName,
    version: i32,
    read: ReadFn,
    write: WriteFn,
}

impl TypeReaderDescriptor {
    #[inline]
    pub fn type_name(&self) -> &TypeName {
        &self.type_name
    }

    #[inline]
    pub fn version(&self) -> i32 {
        self.version
    }

    pub(crate) fn read(&self, reader: &mut ContentReader<'_>) -> Result<Content> {
        (self.read)(reader, &self.type_name)
    }

    pub(crate) fn write(&self, writer: &mut ContentWriter<'_>, value: &Content) -> Result<()> {
        (self.write)(writer, &self.type_name, value)
    }
}

#[derive(Debug)]
pub struct TypeRegistry {
    entries: HashMap<String, Registration>,
    max_nesting: usize,
}

impl TypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            max_nesting: DEFAULT_MAX_NESTING,
        }
    }

    /// Creates a registry with all content types of this crate registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        content::register_builtins(&mut registry);
        registry
    }

    /// Sets the bound on how deeply generic type arguments may nest.
    pub fn with_max_nesting(mut self, max_nesting: usize) -> Self {
        self.max_nesting = max_nesting;
        self
    }

    #[inline]
    pub fn max_nesting(&self) -> usize {
        self.max_nesting
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if a type or template with this exact id is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Registers a non-generic content type.
    ///
    /// Registering an existing id again with the same version is a no-op
    /// and keeps the first functions. A different version fails with
    /// `DuplicateTypeConflict` and keeps the first registration.
    pub fn register(&mut self, id: &str, read: ReadFn, write: WriteFn, version: i32) -> Result<()> {
        self.register_template(id, 0, read, write, version)
    }

    /// Registers a generic template taking `arity` type arguments.
    pub fn register_template(
        &mut self,
        id: &str,
        arity: usize,
        read: ReadFn,
        write: WriteFn,
        version: i32,
    ) -> Result<()> {
        let name = TypeName::parse(id, self.max_nesting)?;
        if name.is_generic() {
            return Err(Error::InvalidTypeId {
                type_id: id.to_owned(),
            });
        }

        let registration = Registration {
            arity,
            version,
            read,
            write,
        };
        match self.entries.entry(id.to_owned()) {
            MapEntry::Occupied(e) if e.get().same_as(&registration) => {
                trace!("content type `{}` is already registered", id);
                Ok(())
            }
            MapEntry::Occupied(e) => Err(Error::DuplicateTypeConflict {
                type_id: id.to_owned(),
                existing: e.get().version,
                attempted: version,
            }),
            MapEntry::Vacant(e) => {
                debug!("registered content type `{}` (arity {}, v{})", id, arity, version);
                e.insert(registration);
                Ok(())
            }
        }
    }

    /// Registers an extension type stored as a [`Record`](crate::Record).
    pub fn register_record(&mut self, id: &str, version: i32) -> Result<()> {
        self.register(id, content::read_record, content::write_record, version)
    }

    /// Builtins go in without the duplicate check, the registry is fresh.
    pub(crate) fn builtin(&mut self, id: &str, arity: usize, read: ReadFn, write: WriteFn, version: i32) {
        self.entries.insert(
            id.to_owned(),
            Registration {
                arity,
                version,
                read,
                write,
            },
        );
    }

    /// Resolves a textual type id such as `array<texture2d>`.
    pub fn resolve(&self, id: &str) -> Result<TypeReaderDescriptor> {
        let name = TypeName::parse(id, self.max_nesting).map_err(|e| match e {
            Error::InvalidTypeId { type_id } => Error::UnknownType { type_id },
            other => other,
        })?;
        self.resolve_name(&name)
    }

    pub fn resolve_name(&self, name: &TypeName) -> Result<TypeReaderDescriptor> {
        let registration = self.check(name, 0)?;
        Ok(TypeReaderDescriptor {
            type_name: name.clone(),
            version: registration.version,
            read: registration.read,
            write: registration.write,
        })
    }

    /// Verifies `name` and all of its type arguments are registered with
    /// matching arity.
    fn check(&self, name: &TypeName, depth: usize) -> Result<&Registration> {
        let registration = self
            .entries
            .get(name.name())
            .ok_or_else(|| Error::UnknownType {
                type_id: name.name().to_owned(),
            })?;

        if registration.arity != name.args().len() {
            return Err(Error::UnknownType {
                type_id: name.to_string(),
            });
        }

        for arg in name.args() {
            if depth + 1 > self.max_nesting {
                return Err(Error::TypeNestingTooDeep {
                    type_id: name.name().to_owned(),
                    limit: self.max_nesting,
                });
            }
            self.check(arg, depth + 1)?;
        }

        Ok(registration)
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use crate::content::ids;
    use crate::reader::ContentReader;
    use crate::registry::TypeRegistry;
    use crate::types::TypeName;
    use crate::writer::ContentWriter;
    use crate::{Content, Error, Result};
    use matches::assert_matches;

    fn read_a(_: &mut ContentReader<'_>, _: &TypeName) -> Result<Content> {
        Ok(Content::Int32(1))
    }

    fn read_b(_: &mut ContentReader<'_>, _: &TypeName) -> Result<Content> {
        Ok(Content::Int32(2))
    }

    fn write_nothing(_: &mut ContentWriter<'_>, _: &TypeName, _: &Content) -> Result<()> {
        Ok(())
    }

    #[test]
    fn identical_registration_is_idempotent() {
        let mut registry = TypeRegistry::new();

        registry.register("mygame.level", read_a, write_nothing, 1).unwrap();
        registry.register("mygame.level", read_a, write_nothing, 1).unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.resolve("mygame.level").unwrap().version(), 1);
    }

    #[test]
    fn same_version_keeps_first_functions() {
        let mut registry = TypeRegistry::new();

        registry.register("mygame.level", read_a, write_nothing, 1).unwrap();
        registry.register("mygame.level", read_b, write_nothing, 1).unwrap();
        assert_matches!(
            registry.register_template("mygame.level", 1, read_a, write_nothing, 1),
            Err(Error::DuplicateTypeConflict { existing: 1, attempted: 1, .. })
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn conflicting_registration_keeps_first() {
        let mut registry = TypeRegistry::new();

        registry.register("mygame.level", read_a, write_nothing, 1).unwrap();
        assert_matches!(
            registry.register("mygame.level", read_b, write_nothing, 2),
            Err(Error::DuplicateTypeConflict { existing: 1, attempted: 2, .. })
        );

        let descriptor = registry.resolve("mygame.level").unwrap();
        assert_eq!(descriptor.version(), 1);
        assert_eq!(descriptor.type_name(), &TypeName::simple("mygame.level"));
    }

    #[test]
    fn generic_ids_can_not_be_registered() {
        let mut registry = TypeRegistry::new();

        assert_matches!(
            registry.register("array<int32>", read_a, write_nothing, 0),
            Err(Error::InvalidTypeId { .. })
        );
    }

    #[test]
    fn unknown_types_carry_their_id() {
        let registry = TypeRegistry::with_builtins();

        assert_matches!(
            registry.resolve("mygame.level"),
            Err(Error::UnknownType { type_id }) if type_id == "mygame.level"
        );
        assert_matches!(
            registry.resolve("array<mygame.level>"),
            Err(Error::UnknownType { type_id }) if type_id == "mygame.level"
        );
        assert_matches!(
            registry.resolve("array<"),
            Err(Error::UnknownType { type_id }) if type_id == "array<"
        );
    }

    #[test]
    fn arity_must_match() {
        let registry = TypeRegistry::with_builtins();

        assert_matches!(registry.resolve("array"), Err(Error::UnknownType { .. }));
        assert_matches!(registry.resolve("array<int32,int32>"), Err(Error::UnknownType { .. }));
        assert_matches!(registry.resolve("int32<int32>"), Err(Error::UnknownType { .. }));
    }

    #[test]
    fn resolves_nested_generics() {
        let registry = TypeRegistry::with_builtins();
        let id = "dictionary<string,array<nullable<array<texture2d>>>>";

        let descriptor = registry.resolve(id).unwrap();
        assert_eq!(descriptor.type_name().to_string(), id);
        assert_eq!(descriptor.version(), 0);
        assert_eq!(registry.resolve(ids::TEXTURE2D).unwrap().version(), 1);
    }

    #[test]
    fn nesting_is_bounded() {
        let registry = TypeRegistry::with_builtins().with_max_nesting(3);

        assert!(registry.resolve("array<array<array<int32>>>").is_ok());
        assert_matches!(
            registry.resolve("array<array<array<array<int32>>>>"),
            Err(Error::TypeNestingTooDeep { limit: 3, .. })
        );

        // names built in code skip the parser and are checked while resolving
        let mut name = TypeName::simple(ids::INT32);
        for _ in 0..4 {
            name = TypeName::generic(ids::ARRAY, vec![name]);
        }
        assert_matches!(
            registry.resolve_name(&name),
            Err(Error::TypeNestingTooDeep { .. })
        );
    }
}
