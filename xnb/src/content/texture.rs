use crate::content::{ids, mismatch, Content};
use crate::reader::ContentReader;
use crate::types::TypeName;
use crate::writer::ContentWriter;
use crate::{Error, Result};

/// Pixel formats of texture content. Discriminants are the values stored
/// in files.
#[repr(i32)]
#[derive(Eq, PartialEq, Hash, Copy, Clone, Debug)]
pub enum SurfaceFormat {
    Rgba8 = 0,
    Bgr565 = 1,
    Bgra5551 = 2,
    Bgra4444 = 3,
    Dxt1 = 4,
    Dxt3 = 5,
    Dxt5 = 6,
    Alpha8 = 12,
    Single = 13,
    Vector4 = 15,
}

impl SurfaceFormat {
    pub fn bits_per_pixel(self) -> u32 {
        match self {
            SurfaceFormat::Rgba8 => 32,
            SurfaceFormat::Bgr565 => 16,
            SurfaceFormat::Bgra5551 => 16,
            SurfaceFormat::Bgra4444 => 16,
            SurfaceFormat::Dxt1 => 4,
            SurfaceFormat::Dxt3 => 8,
            SurfaceFormat::Dxt5 => 8,
            SurfaceFormat::Alpha8 => 8,
            SurfaceFormat::Single => 32,
            SurfaceFormat::Vector4 => 128,
        }
    }

    /// Block compressed formats store 4x4 pixel blocks.
    pub fn is_block_compressed(self) -> bool {
        matches!(
            self,
            SurfaceFormat::Dxt1 | SurfaceFormat::Dxt3 | SurfaceFormat::Dxt5
        )
    }

    /// Returns the exact byte size of mip `level` of a `width`x`height`
    /// texture, or `None` if it does not fit in `usize`.
    pub fn level_size(self, width: u32, height: u32, level: u32) -> Option<usize> {
        let w = width.checked_shr(level).unwrap_or(0).max(1) as usize;
        let h = height.checked_shr(level).unwrap_or(0).max(1) as usize;

        if self.is_block_compressed() {
            let block = if self == SurfaceFormat::Dxt1 { 8 } else { 16 };
            ((w + 3) / 4)
                .checked_mul((h + 3) / 4)?
                .checked_mul(block)
        } else {
            w.checked_mul(h)?
                .checked_mul(self.bits_per_pixel() as usize / 8)
        }
    }
}

impl TryFrom<i32> for SurfaceFormat {
    type Error = ();

    fn try_from(value: i32) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(SurfaceFormat::Rgba8),
            1 => Ok(SurfaceFormat::Bgr565),
            2 => Ok(SurfaceFormat::Bgra5551),
            3 => Ok(SurfaceFormat::Bgra4444),
            4 => Ok(SurfaceFormat::Dxt1),
            5 => Ok(SurfaceFormat::Dxt3),
            6 => Ok(SurfaceFormat::Dxt5),
            12 => Ok(SurfaceFormat::Alpha8),
            13 => Ok(SurfaceFormat::Single),
            15 => Ok(SurfaceFormat::Vector4),
            _ => Err(()),
        }
    }
}

/// Two dimensional texture with its full mip chain. `levels[0]` is the
/// full resolution image.
#[derive(Clone, PartialEq, Debug)]
pub struct Texture2D {
    pub format: SurfaceFormat,
    pub width: u32,
    pub height: u32,
    pub levels: Vec<Vec<u8>>,
}

impl Texture2D {
    pub fn new(format: SurfaceFormat, width: u32, height: u32, levels: Vec<Vec<u8>>) -> Self {
        Self {
            format,
            width,
            height,
            levels,
        }
    }

    #[inline]
    pub fn mip_count(&self) -> usize {
        self.levels.len()
    }

    /// Dimensions of the mip `level`.
    pub fn level_dimensions(&self, level: u32) -> (u32, u32) {
        (
            self.width.checked_shr(level).unwrap_or(0).max(1),
            self.height.checked_shr(level).unwrap_or(0).max(1),
        )
    }

    fn check(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::malformed(ids::TEXTURE2D, "texture has zero size"));
        }
        if self.levels.is_empty() {
            return Err(Error::malformed(ids::TEXTURE2D, "texture has no levels"));
        }
        for (level, data) in self.levels.iter().enumerate() {
            let expected = self
                .format
                .level_size(self.width, self.height, level as u32)
                .ok_or_else(|| Error::malformed(ids::TEXTURE2D, "texture is too large"))?;
            if data.len() != expected {
                return Err(Error::malformed(
                    ids::TEXTURE2D,
                    format!(
                        "level {} of {:?} {}x{} has {} bytes, expected {}",
                        level,
                        self.format,
                        self.width,
                        self.height,
                        data.len(),
                        expected
                    ),
                ));
            }
        }
        Ok(())
    }
}

pub(crate) fn read(r: &mut ContentReader<'_>, _: &TypeName) -> Result<Content> {
    let raw_format = r.read_i32()?;
    let format = SurfaceFormat::try_from(raw_format).map_err(|_| {
        Error::malformed(ids::TEXTURE2D, format!("unknown surface format {}", raw_format))
    })?;
    let width = r.read_u32()?;
    let height = r.read_u32()?;
    let count = r.read_count(4)?;

    let mut levels = Vec::with_capacity(count);
    for _ in 0..count {
        levels.push(r.read_blob()?);
    }

    let texture = Texture2D::new(format, width, height, levels);
    texture.check()?;
    Ok(Content::Texture2D(texture))
}

pub(crate) fn write(w: &mut ContentWriter<'_>, t: &TypeName, value: &Content) -> Result<()> {
    let texture = match value {
        Content::Texture2D(texture) => texture,
        other => return Err(mismatch(t, other)),
    };
    texture.check()?;

    w.write_i32(texture.format as i32)?;
    w.write_u32(texture.width)?;
    w.write_u32(texture.height)?;
    w.write_count(texture.levels.len())?;
    for level in &texture.levels {
        w.write_blob(level)?;
    }
    Ok(())
}
