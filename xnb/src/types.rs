//! Content type identifiers.
//!
//! A [`TypeName`] is the on-wire discriminator of a content type. Simple
//! types are a bare identifier (`texture2d`), generic instantiations carry
//! their type arguments (`dictionary<string,array<texture2d>>`). The textual
//! form is canonical: no whitespace, arguments separated by a single comma.

use crate::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Default bound on how deeply generic type arguments may nest.
pub const DEFAULT_MAX_NESTING: usize = 64;

#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct TypeName {
    name: String,
    args: Vec<TypeName>,
}

impl TypeName {
    /// Creates a non-generic type name.
    pub fn simple(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: vec![],
        }
    }

    /// Creates an instantiation of the generic template `name`.
    pub fn generic(name: impl Into<String>, args: Vec<TypeName>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Parses a type id, failing with `TypeNestingTooDeep` when type
    /// arguments nest deeper than `max_nesting` levels.
    pub fn parse(id: &str, max_nesting: usize) -> Result<Self> {
        let mut parser = Parser {
            src: id,
            pos: 0,
            max_nesting,
        };
        let name = parser.type_name(0)?;
        if parser.pos != id.len() {
            return Err(Error::InvalidTypeId {
                type_id: id.to_owned(),
            });
        }
        Ok(name)
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn args(&self) -> &[TypeName] {
        &self.args
    }

    #[inline]
    pub fn is_generic(&self) -> bool {
        !self.args.is_empty()
    }

    /// Number of generic levels. `int32` has depth 0, `array<int32>` depth 1.
    pub fn depth(&self) -> usize {
        self.args.iter().map(|a| a.depth() + 1).max().unwrap_or(0)
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some((first, rest)) = self.args.split_first() {
            write!(f, "<{}", first)?;
            for arg in rest {
                write!(f, ",{}", arg)?;
            }
            f.write_str(">")?;
        }
        Ok(())
    }
}

impl FromStr for TypeName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        TypeName::parse(s, DEFAULT_MAX_NESTING)
    }
}

/// Returns true for characters allowed inside an identifier.
fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '+' | '-')
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    max_nesting: usize,
}

impl<'a> Parser<'a> {
    fn invalid(&self) -> Error {
        Error::InvalidTypeId {
            type_id: self.src.to_owned(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn ident(&mut self) -> Result<String> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !is_ident_char(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
        if start == self.pos {
            return Err(self.invalid());
        }
        Ok(self.src[start..self.pos].to_owned())
    }

    fn type_name(&mut self, depth: usize) -> Result<TypeName> {
        let name = self.ident()?;
        if self.peek() != Some('<') {
            return Ok(TypeName::simple(name));
        }

        // entering the argument list adds one level of nesting
        if depth + 1 > self.max_nesting {
            return Err(Error::TypeNestingTooDeep {
                type_id: self.src.to_owned(),
                limit: self.max_nesting,
            });
        }
        self.pos += 1;

        let mut args = vec![self.type_name(depth + 1)?];
        loop {
            match self.peek() {
                Some(',') => {
                    self.pos += 1;
                    args.push(self.type_name(depth + 1)?);
                }
                Some('>') => {
                    self.pos += 1;
                    return Ok(TypeName::generic(name, args));
                }
                _ => return Err(self.invalid()),
            }
        }
    }
}
