//! Primitive values, generic containers, shared references and records.

use crate::content::{ids, mismatch, Content, Record};
use crate::reader::ContentReader;
use crate::registry::TypeRegistry;
use crate::types::TypeName;
use crate::writer::ContentWriter;
use crate::Result;

// generates the reader and writer of a `Copy` primitive
macro_rules! primitive {
    ($variant:ident, $read:ident, $write:ident, $read_value:ident, $write_value:ident) => {
        fn $read(r: &mut ContentReader<'_>, _: &TypeName) -> Result<Content> {
            Ok(Content::$variant(r.$read_value()?))
        }

        fn $write(w: &mut ContentWriter<'_>, t: &TypeName, value: &Content) -> Result<()> {
            match value {
                Content::$variant(v) => w.$write_value(*v),
                other => Err(mismatch(t, other)),
            }
        }
    };
}

primitive!(Bool, read_bool, write_bool, read_bool, write_bool);
primitive!(Byte, read_byte, write_byte, read_u8, write_u8);
primitive!(Int32, read_int32, write_int32, read_i32, write_i32);
primitive!(UInt32, read_uint32, write_uint32, read_u32, write_u32);
primitive!(Int64, read_int64, write_int64, read_i64, write_i64);
primitive!(Single, read_single, write_single, read_f32, write_f32);
primitive!(Double, read_double, write_double, read_f64, write_f64);

fn read_string(r: &mut ContentReader<'_>, _: &TypeName) -> Result<Content> {
    Ok(Content::String(r.read_string()?))
}

fn write_string(w: &mut ContentWriter<'_>, t: &TypeName, value: &Content) -> Result<()> {
    match value {
        Content::String(s) => w.write_string(s),
        other => Err(mismatch(t, other)),
    }
}

fn read_bytes(r: &mut ContentReader<'_>, _: &TypeName) -> Result<Content> {
    Ok(Content::Bytes(r.read_blob()?))
}

fn write_bytes(w: &mut ContentWriter<'_>, t: &TypeName, value: &Content) -> Result<()> {
    match value {
        Content::Bytes(b) => w.write_blob(b),
        other => Err(mismatch(t, other)),
    }
}

fn read_array(r: &mut ContentReader<'_>, t: &TypeName) -> Result<Content> {
    let element = t.args()[0].clone();
    let count = r.read_count(1)?;

    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(r.read_object_of(&element)?);
    }
    Ok(Content::Array { element, items })
}

fn write_array(w: &mut ContentWriter<'_>, t: &TypeName, value: &Content) -> Result<()> {
    match value {
        Content::Array { element, items } if element == &t.args()[0] => {
            w.write_count(items.len())?;
            for item in items {
                w.write_object_of(element, item)?;
            }
            Ok(())
        }
        other => Err(mismatch(t, other)),
    }
}

/// Nullable values are stored raw, without a type tag of their own.
fn read_nullable(r: &mut ContentReader<'_>, t: &TypeName) -> Result<Content> {
    let inner = t.args()[0].clone();
    let value = if r.read_bool()? {
        Some(Box::new(r.read_raw(&inner)?))
    } else {
        None
    };
    Ok(Content::Nullable { inner, value })
}

fn write_nullable(w: &mut ContentWriter<'_>, t: &TypeName, value: &Content) -> Result<()> {
    match value {
        Content::Nullable { inner, value } if inner == &t.args()[0] => {
            w.write_bool(value.is_some())?;
            match value {
                Some(v) => w.write_raw(inner, v),
                None => Ok(()),
            }
        }
        other => Err(mismatch(t, other)),
    }
}

fn read_dictionary(r: &mut ContentReader<'_>, t: &TypeName) -> Result<Content> {
    let key = t.args()[0].clone();
    let value = t.args()[1].clone();
    let count = r.read_count(2)?;

    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let k = r.read_object_of(&key)?;
        let v = r.read_object_of(&value)?;
        entries.push((k, v));
    }
    Ok(Content::Dictionary {
        key,
        value,
        entries,
    })
}

fn write_dictionary(w: &mut ContentWriter<'_>, t: &TypeName, content: &Content) -> Result<()> {
    match content {
        Content::Dictionary {
            key,
            value,
            entries,
        } if key == &t.args()[0] && value == &t.args()[1] => {
            w.write_count(entries.len())?;
            for (k, v) in entries {
                w.write_object_of(key, k)?;
                w.write_object_of(value, v)?;
            }
            Ok(())
        }
        other => Err(mismatch(t, other)),
    }
}

fn read_shared(r: &mut ContentReader<'_>, t: &TypeName) -> Result<Content> {
    r.read_shared_ref(&t.args()[0])
}

fn write_shared(w: &mut ContentWriter<'_>, t: &TypeName, value: &Content) -> Result<()> {
    match value {
        Content::Ref(id) => w.write_shared_index(*id),
        other => Err(mismatch(t, other)),
    }
}

pub(crate) fn read_record(r: &mut ContentReader<'_>, t: &TypeName) -> Result<Content> {
    let count = r.read_7bit()? as usize;
    r.ensure_available(count, 1)?;

    let mut fields = Vec::with_capacity(count);
    for _ in 0..count {
        fields.push(r.read_object()?);
    }
    Ok(Content::Record(Record {
        type_name: t.clone(),
        fields,
    }))
}

pub(crate) fn write_record(w: &mut ContentWriter<'_>, t: &TypeName, value: &Content) -> Result<()> {
    match value {
        Content::Record(record) if &record.type_name == t => {
            w.write_7bit_len(record.fields.len())?;
            for field in &record.fields {
                w.write_object(field)?;
            }
            Ok(())
        }
        other => Err(mismatch(t, other)),
    }
}

pub(super) fn register(registry: &mut TypeRegistry) {
    registry.builtin(ids::BOOL, 0, read_bool, write_bool, 0);
    registry.builtin(ids::BYTE, 0, read_byte, write_byte, 0);
    registry.builtin(ids::INT32, 0, read_int32, write_int32, 0);
    registry.builtin(ids::UINT32, 0, read_uint32, write_uint32, 0);
    registry.builtin(ids::INT64, 0, read_int64, write_int64, 0);
    registry.builtin(ids::SINGLE, 0, read_single, write_single, 0);
    registry.builtin(ids::DOUBLE, 0, read_double, write_double, 0);
    registry.builtin(ids::STRING, 0, read_string, write_string, 0);
    registry.builtin(ids::BYTES, 0, read_bytes, write_bytes, 0);

    registry.builtin(ids::ARRAY, 1, read_array, write_array, 0);
    registry.builtin(ids::NULLABLE, 1, read_nullable, write_nullable, 0);
    registry.builtin(ids::DICTIONARY, 2, read_dictionary, write_dictionary, 0);
    registry.builtin(ids::SHARED, 1, read_shared, write_shared, 0);
}
