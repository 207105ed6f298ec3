use crate::content::{mismatch, Content};
use crate::reader::ContentReader;
use crate::types::TypeName;
use crate::writer::ContentWriter;
use crate::Result;

/// Compiled shader. The bytecode is produced by an external compiler and
/// carried byte for byte.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Effect {
    pub bytecode: Vec<u8>,
}

impl Effect {
    pub fn new(bytecode: Vec<u8>) -> Self {
        Self { bytecode }
    }
}

pub(crate) fn read(r: &mut ContentReader<'_>, _: &TypeName) -> Result<Content> {
    Ok(Content::Effect(Effect::new(r.read_blob()?)))
}

pub(crate) fn write(w: &mut ContentWriter<'_>, t: &TypeName, value: &Content) -> Result<()> {
    match value {
        Content::Effect(effect) => w.write_blob(&effect.bytecode),
        other => Err(mismatch(t, other)),
    }
}
