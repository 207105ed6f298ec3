//! Settings for writing and reading XNB files.

use crate::codec::Compression;
use crate::header::{GraphicsProfile, TargetPlatform, XNB_MAX_SUPPORTED_VERSION};
use serde::{Deserialize, Serialize};

/// Default limit on the size of a decompressed payload.
pub const DEFAULT_MAX_PAYLOAD_LEN: usize = 256 * 1024 * 1024;

/// Default limit on how deeply objects may be nested inside each other.
pub const DEFAULT_MAX_OBJECT_DEPTH: usize = 256;

#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterOptions {
    /// Platform the asset is compiled for.
    pub platform: TargetPlatform,
    pub profile: GraphicsProfile,
    pub compression: Compression,
}

impl WriterOptions {
    pub fn with_platform(mut self, platform: TargetPlatform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_profile(mut self, profile: GraphicsProfile) -> Self {
        self.profile = profile;
        self
    }
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            platform: TargetPlatform::default(),
            profile: GraphicsProfile::default(),
            compression: Compression::None,
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderOptions {
    /// Files with a newer format version are rejected.
    pub max_format_version: u8,

    /// When set, files compiled for any other platform are rejected.
    /// Otherwise the platform tag is informational only.
    pub required_platform: Option<TargetPlatform>,

    /// Largest decompressed payload the reader is willing to allocate.
    pub max_payload_len: usize,

    pub max_object_depth: usize,
}

impl ReaderOptions {
    pub fn with_required_platform(mut self, platform: TargetPlatform) -> Self {
        self.required_platform = Some(platform);
        self
    }

    pub fn with_max_payload_len(mut self, len: usize) -> Self {
        self.max_payload_len = len;
        self
    }
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            max_format_version: XNB_MAX_SUPPORTED_VERSION,
            required_platform: None,
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
            max_object_depth: DEFAULT_MAX_OBJECT_DEPTH,
        }
    }
}
