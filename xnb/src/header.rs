use crate::codec::Compression;
use crate::{Error, Result};
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::str::FromStr;

/// Three byte signature every XNB file starts with.
pub const XNB_MAGIC: [u8; 3] = *b"XNB";
/// Format version written by this crate.
pub const XNB_FORMAT_VERSION: u8 = 5;
pub const XNB_MAX_SUPPORTED_VERSION: u8 = 5;

/// Length of the fixed part of the header (magic, platform, version, flags).
pub const HEADER_LEN: usize = 6;
/// Length of the uncompressed-length field following a compressed header.
pub const LENGTH_FIELD_LEN: usize = 4;

pub const FLAG_DEFLATE: u8 = 0x01;
pub const FLAG_LZ4: u8 = 0x02;
pub const FLAG_HIDEF: u8 = 0x04;
const KNOWN_FLAGS: u8 = FLAG_DEFLATE | FLAG_LZ4 | FLAG_HIDEF;

/// Platforms an asset can be compiled for. Stored as a single ASCII tag.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetPlatform {
    Windows,
    Xbox360,
    WindowsPhone,
    IOS,
    Android,
    DesktopGL,
    MacOSX,
    WindowsStoreApp,
    RaspberryPi,
    PlayStation4,
    XboxOne,
    Switch,
    Web,
}

impl TargetPlatform {
    const ALL: [TargetPlatform; 13] = [
        TargetPlatform::Windows,
        TargetPlatform::Xbox360,
        TargetPlatform::WindowsPhone,
        TargetPlatform::IOS,
        TargetPlatform::Android,
        TargetPlatform::DesktopGL,
        TargetPlatform::MacOSX,
        TargetPlatform::WindowsStoreApp,
        TargetPlatform::RaspberryPi,
        TargetPlatform::PlayStation4,
        TargetPlatform::XboxOne,
        TargetPlatform::Switch,
        TargetPlatform::Web,
    ];

    pub fn tag(self) -> u8 {
        match self {
            TargetPlatform::Windows => b'w',
            TargetPlatform::Xbox360 => b'x',
            TargetPlatform::WindowsPhone => b'm',
            TargetPlatform::IOS => b'i',
            TargetPlatform::Android => b'a',
            TargetPlatform::DesktopGL => b'd',
            TargetPlatform::MacOSX => b'X',
            TargetPlatform::WindowsStoreApp => b'W',
            TargetPlatform::RaspberryPi => b'r',
            TargetPlatform::PlayStation4 => b'P',
            TargetPlatform::XboxOne => b'O',
            TargetPlatform::Switch => b'S',
            TargetPlatform::Web => b'b',
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.tag() == tag)
    }

    pub fn name(self) -> &'static str {
        match self {
            TargetPlatform::Windows => "windows",
            TargetPlatform::Xbox360 => "xbox360",
            TargetPlatform::WindowsPhone => "windowsphone",
            TargetPlatform::IOS => "ios",
            TargetPlatform::Android => "android",
            TargetPlatform::DesktopGL => "desktopgl",
            TargetPlatform::MacOSX => "macosx",
            TargetPlatform::WindowsStoreApp => "windowsstoreapp",
            TargetPlatform::RaspberryPi => "raspberrypi",
            TargetPlatform::PlayStation4 => "playstation4",
            TargetPlatform::XboxOne => "xboxone",
            TargetPlatform::Switch => "switch",
            TargetPlatform::Web => "web",
        }
    }
}

impl Default for TargetPlatform {
    fn default() -> Self {
        TargetPlatform::DesktopGL
    }
}

impl fmt::Display for TargetPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TargetPlatform {
    type Err = &'static str;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.name() == lower)
            .ok_or("unknown platform")
    }
}

/// Graphics feature level the asset was built against.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphicsProfile {
    Reach,
    HiDef,
}

impl Default for GraphicsProfile {
    fn default() -> Self {
        GraphicsProfile::Reach
    }
}

/// Fixed header of every XNB file. Everything in the header is stored
/// uncompressed and little-endian.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct ContainerHeader {
    /// Raw platform tag. Unknown tags are kept as they are.
    pub platform: u8,
    pub version: u8,
    pub profile: GraphicsProfile,
    pub compression: Compression,
    /// Length of the payload after decompression. Present only for
    /// compressed files.
    pub uncompressed_len: Option<u32>,
}

impl ContainerHeader {
    pub fn new(
        platform: TargetPlatform,
        profile: GraphicsProfile,
        compression: Compression,
        uncompressed_len: Option<u32>,
    ) -> Self {
        ContainerHeader {
            platform: platform.tag(),
            version: XNB_FORMAT_VERSION,
            profile,
            compression,
            uncompressed_len,
        }
    }

    #[inline]
    pub fn platform(&self) -> Option<TargetPlatform> {
        TargetPlatform::from_tag(self.platform)
    }

    pub fn flags(&self) -> u8 {
        let profile = match self.profile {
            GraphicsProfile::Reach => 0,
            GraphicsProfile::HiDef => FLAG_HIDEF,
        };
        profile | self.compression.flag()
    }

    /// Number of bytes the header occupies in front of the payload.
    #[inline]
    pub fn encoded_len(&self) -> usize {
        match self.compression {
            Compression::None => HEADER_LEN,
            _ => HEADER_LEN + LENGTH_FIELD_LEN,
        }
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<()> {
        out.write_all(&XNB_MAGIC)?;
        out.write_u8(self.platform)?;
        out.write_u8(self.version)?;
        out.write_u8(self.flags())?;
        if self.compression != Compression::None {
            out.write_u32::<LittleEndian>(self.uncompressed_len.unwrap_or(0))?;
        }
        Ok(())
    }

    /// Parses and validates the header at the start of `bytes`. The payload
    /// starts at `header.encoded_len()`.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        // verify as much of the magic as is available before complaining
        // about the length so that foreign files are always reported as such
        let prefix = &bytes[..bytes.len().min(XNB_MAGIC.len())];
        if prefix != &XNB_MAGIC[..prefix.len()] {
            return Err(Error::NotAnXnbFile {
                found: prefix.to_vec(),
            });
        }
        if bytes.len() < HEADER_LEN {
            return Err(Error::TruncatedStream {
                needed: HEADER_LEN,
                available: bytes.len(),
            });
        }

        let version = bytes[4];
        if version > XNB_MAX_SUPPORTED_VERSION {
            return Err(Error::UnsupportedFormatVersion {
                version,
                max: XNB_MAX_SUPPORTED_VERSION,
            });
        }

        let flags = bytes[5];
        if flags & !KNOWN_FLAGS != 0 {
            return Err(Error::MalformedHeader {
                reason: "unknown flag bits set",
            });
        }
        let compression = Compression::from_flags(flags)?;
        let profile = if flags & FLAG_HIDEF != 0 {
            GraphicsProfile::HiDef
        } else {
            GraphicsProfile::Reach
        };

        let uncompressed_len = match compression {
            Compression::None => None,
            _ => {
                let end = HEADER_LEN + LENGTH_FIELD_LEN;
                if bytes.len() < end {
                    return Err(Error::TruncatedStream {
                        needed: end,
                        available: bytes.len(),
                    });
                }
                Some(LittleEndian::read_u32(&bytes[HEADER_LEN..end]))
            }
        };

        Ok(ContainerHeader {
            platform: bytes[3],
            version,
            profile,
            compression,
            uncompressed_len,
        })
    }
}
