//! Container framing and payload compression.
//!
//! The codec knows nothing about the content of the payload. It writes the
//! [`ContainerHeader`] in front of the payload and, when requested, stores
//! the payload compressed with one of the two supported codecs:
//!
//! * `Deflate` - general purpose streaming compressor (flag bit 0)
//! * `Lz4` - faster block compressor (flag bit 1)

use crate::header::{ContainerHeader, FLAG_DEFLATE, FLAG_LZ4};
use crate::options::{ReaderOptions, WriterOptions};
use crate::{Error, Result};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use log::warn;
use lz4::block::CompressionMode;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::io::{Read, Write};
use std::str::FromStr;

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    Deflate,
    Lz4,
}

impl Compression {
    /// Header flag bit representing this compression.
    pub fn flag(self) -> u8 {
        match self {
            Compression::None => 0,
            Compression::Deflate => FLAG_DEFLATE,
            Compression::Lz4 => FLAG_LZ4,
        }
    }

    pub(crate) fn from_flags(flags: u8) -> Result<Self> {
        match (flags & FLAG_DEFLATE != 0, flags & FLAG_LZ4 != 0) {
            (true, true) => Err(Error::MalformedHeader {
                reason: "both compression flags set",
            }),
            (true, false) => Ok(Compression::Deflate),
            (false, true) => Ok(Compression::Lz4),
            (false, false) => Ok(Compression::None),
        }
    }
}

impl FromStr for Compression {
    type Err = &'static str;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Compression::None),
            "deflate" => Ok(Compression::Deflate),
            "lz4" => Ok(Compression::Lz4),
            _ => Err("unknown compression"),
        }
    }
}

/// Frames `payload` with a default header, compressing it with the primary
/// codec when `compress` is set.
pub fn encode(payload: &[u8], compress: bool) -> Result<Vec<u8>> {
    let compression = if compress {
        Compression::Deflate
    } else {
        Compression::None
    };
    encode_with(payload, &WriterOptions::default().with_compression(compression))
}

pub fn encode_with(payload: &[u8], options: &WriterOptions) -> Result<Vec<u8>> {
    let uncompressed_len = match options.compression {
        Compression::None => None,
        _ => Some(
            u32::try_from(payload.len()).map_err(|_| Error::PayloadTooLarge {
                declared: payload.len(),
                limit: u32::MAX as usize,
            })?,
        ),
    };

    let header = ContainerHeader::new(
        options.platform,
        options.profile,
        options.compression,
        uncompressed_len,
    );
    let body = compress(payload, options.compression)?;

    let mut framed = Vec::with_capacity(header.encoded_len() + body.len());
    header.write_to(&mut framed)?;
    framed.extend_from_slice(&body);
    Ok(framed)
}

/// Validates the header of `framed` and returns the decompressed payload.
pub fn decode(framed: &[u8]) -> Result<Vec<u8>> {
    decode_with(framed, &ReaderOptions::default()).map(|(_, payload)| payload)
}

pub fn decode_with(framed: &[u8], options: &ReaderOptions) -> Result<(ContainerHeader, Vec<u8>)> {
    let header = ContainerHeader::parse(framed)?;
    check_header(&header, options)?;
    let payload = decompress(&header, &framed[header.encoded_len()..], options)?;
    Ok((header, payload))
}

/// Applies the reader's policy to an already parsed header.
pub(crate) fn check_header(header: &ContainerHeader, options: &ReaderOptions) -> Result<()> {
    if header.version > options.max_format_version {
        return Err(Error::UnsupportedFormatVersion {
            version: header.version,
            max: options.max_format_version,
        });
    }

    match options.required_platform {
        Some(expected) if expected.tag() != header.platform => Err(Error::PlatformMismatch {
            expected: expected.tag(),
            found: header.platform,
        }),
        Some(_) => Ok(()),
        None => {
            if header.platform().is_none() {
                warn!("unknown platform tag {:?}", header.platform as char);
            }
            Ok(())
        }
    }
}

pub(crate) fn compress(payload: &[u8], compression: Compression) -> Result<Cow<'_, [u8]>> {
    Ok(match compression {
        Compression::None => Cow::Borrowed(payload),
        Compression::Deflate => {
            let mut encoder = DeflateEncoder::new(
                Vec::with_capacity(payload.len() / 2),
                flate2::Compression::default(),
            );
            encoder.write_all(payload)?;
            Cow::Owned(encoder.finish()?)
        }
        // lz4 does not like empty input, the empty body stands for it
        Compression::Lz4 if payload.is_empty() => Cow::Owned(vec![]),
        Compression::Lz4 => Cow::Owned(lz4::block::compress(
            payload,
            Some(CompressionMode::DEFAULT),
            false,
        )?),
    })
}

/// Restores the payload stored in `body`. The output buffer is sized from
/// the declared length which must match the actual decompressed length.
pub(crate) fn decompress(
    header: &ContainerHeader,
    body: &[u8],
    options: &ReaderOptions,
) -> Result<Vec<u8>> {
    let declared = match header.uncompressed_len {
        None => return Ok(body.to_vec()),
        Some(len) => len as usize,
    };
    if declared > options.max_payload_len {
        return Err(Error::PayloadTooLarge {
            declared,
            limit: options.max_payload_len,
        });
    }

    let payload = match header.compression {
        Compression::None => body.to_vec(),
        Compression::Deflate => inflate(body, declared)?,
        Compression::Lz4 => lz4_decompress(body, declared)?,
    };

    if payload.len() != declared {
        return Err(Error::PayloadLengthMismatch {
            declared,
            actual: payload.len(),
        });
    }
    Ok(payload)
}

fn inflate(body: &[u8], declared: usize) -> Result<Vec<u8>> {
    let mut payload = Vec::with_capacity(declared);
    // one byte past the declared length is enough to notice a longer stream
    DeflateDecoder::new(body)
        .take(declared as u64 + 1)
        .read_to_end(&mut payload)
        .map_err(|e| Error::CorruptPayload {
            codec: Compression::Deflate,
            reason: e.to_string(),
        })?;
    Ok(payload)
}

fn lz4_decompress(body: &[u8], declared: usize) -> Result<Vec<u8>> {
    if body.is_empty() {
        return Ok(vec![]);
    }
    // one byte of headroom tells an overlong block from a corrupt one
    let size = i32::try_from(declared + 1).map_err(|_| Error::PayloadTooLarge {
        declared,
        limit: i32::MAX as usize - 1,
    })?;
    match lz4::block::decompress(body, Some(size)) {
        Ok(payload) => Ok(payload),
        Err(e) => match lz4_block_len(body) {
            Some(actual) if actual > declared => Err(Error::PayloadLengthMismatch { declared, actual }),
            _ => Err(Error::CorruptPayload {
                codec: Compression::Lz4,
                reason: e.to_string(),
            }),
        },
    }
}

/// Walks the sequences of an lz4 block and sums the bytes they would
/// produce without materializing them. Returns `None` for a malformed block.
fn lz4_block_len(body: &[u8]) -> Option<usize> {
    fn extended(body: &[u8], pos: &mut usize, mut len: usize) -> Option<usize> {
        loop {
            let byte = *body.get(*pos)?;
            *pos += 1;
            len = len.checked_add(byte as usize)?;
            if byte != 0xFF {
                return Some(len);
            }
        }
    }

    let mut pos = 0;
    let mut produced = 0usize;
    loop {
        let token = *body.get(pos)?;
        pos += 1;

        let mut literals = (token >> 4) as usize;
        if literals == 15 {
            literals = extended(body, &mut pos, literals)?;
        }
        pos = pos.checked_add(literals).filter(|&end| end <= body.len())?;
        produced = produced.checked_add(literals)?;
        if pos == body.len() {
            return Some(produced);
        }

        let offset = u16::from_le_bytes([*body.get(pos)?, *body.get(pos + 1)?]) as usize;
        pos += 2;
        if offset == 0 || offset > produced {
            return None;
        }
        let mut matched = (token & 0x0F) as usize;
        if matched == 15 {
            matched = extended(body, &mut pos, matched)?;
        }
        produced = produced.checked_add(matched + 4)?;
    }
}

#[cfg(test)]
mod tests {
    use crate::codec::{decode, decode_with, encode, encode_with, Compression};
    use crate::header::{TargetPlatform, HEADER_LEN};
    use crate::options::{ReaderOptions, WriterOptions};
    use crate::Error;
    use matches::assert_matches;
    use quickcheck_macros::quickcheck;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const SIZES: [usize; 4] = [0, 1, 4096, 1_048_576];

    fn payloads() -> Vec<Vec<u8>> {
        let mut rng = StdRng::seed_from_u64(0x584e42);
        let mut out = vec![];
        for &size in SIZES.iter() {
            out.push(vec![0u8; size]);

            let mut random = vec![0u8; size];
            rng.fill(random.as_mut_slice());
            out.push(random);
        }
        out
    }

    #[test]
    fn round_trip_all_codecs() {
        for compression in &[Compression::None, Compression::Deflate, Compression::Lz4] {
            let options = WriterOptions::default().with_compression(*compression);
            for payload in payloads() {
                let framed = encode_with(&payload, &options).unwrap();
                let (header, decoded) = decode_with(&framed, &ReaderOptions::default()).unwrap();

                assert_eq!(header.compression, *compression);
                assert_eq!(decoded, payload, "{:?} {} bytes", compression, payload.len());
            }
        }
    }

    #[test]
    fn compress_flag_selects_primary_codec() {
        let payload = vec![7u8; 100];

        let plain = encode(&payload, false).unwrap();
        assert_eq!(plain[5], 0x00);
        assert_eq!(&plain[HEADER_LEN..], payload.as_slice());

        let packed = encode(&payload, true).unwrap();
        assert_eq!(packed[5], 0x01);
        assert_eq!(&packed[6..10], &100u32.to_le_bytes());
        assert!(packed.len() < plain.len());
        assert_eq!(decode(&packed).unwrap(), payload);
    }

    #[test]
    fn declared_length_must_match() {
        let payload = b"hello world ".repeat(64);
        for compression in &[Compression::Deflate, Compression::Lz4] {
            let options = WriterOptions::default().with_compression(*compression);
            let mut framed = encode_with(&payload, &options).unwrap();

            let declared = payload.len() as u32 + 1;
            framed[6..10].copy_from_slice(&declared.to_le_bytes());
            assert_matches!(
                decode(&framed),
                Err(Error::PayloadLengthMismatch { declared: d, actual: a })
                    if d == payload.len() + 1 && a == payload.len()
            );

            let declared = payload.len() as u32 - 1;
            framed[6..10].copy_from_slice(&declared.to_le_bytes());
            assert_matches!(
                decode(&framed),
                Err(Error::PayloadLengthMismatch { declared: d, actual: a })
                    if d == payload.len() - 1 && a == payload.len()
            );
        }
    }

    #[test]
    fn random_lz4_payload_declared_short() {
        let mut payload = vec![0u8; 768];
        StdRng::seed_from_u64(7).fill(payload.as_mut_slice());
        let options = WriterOptions::default().with_compression(Compression::Lz4);
        let mut framed = encode_with(&payload, &options).unwrap();
        framed[6..10].copy_from_slice(&767u32.to_le_bytes());

        assert_matches!(
            decode(&framed),
            Err(Error::PayloadLengthMismatch { declared: 767, actual: 768 })
        );

        // well past the output buffer the block itself is measured
        framed[6..10].copy_from_slice(&100u32.to_le_bytes());
        assert_matches!(
            decode(&framed),
            Err(Error::PayloadLengthMismatch { declared: 100, actual: 768 })
        );
    }

    #[test]
    fn lz4_block_length_counts_matches() {
        let payload = b"abcabcabcabcabcabcabcabcabcabcabcabc xyz".repeat(20);
        let block = lz4::block::compress(&payload, None, false).unwrap();

        assert!(block.len() < payload.len());
        assert_eq!(super::lz4_block_len(&block), Some(payload.len()));
        assert_eq!(super::lz4_block_len(&block[..block.len() - 1]), None);
    }

    #[test]
    fn both_compression_flags_are_malformed() {
        let mut framed = encode(b"payload", true).unwrap();
        framed[5] |= Compression::Lz4.flag();

        assert_matches!(decode(&framed), Err(Error::MalformedHeader { .. }));
    }

    #[test]
    fn declared_length_is_bounded() {
        let framed = encode(&[1u8; 2048], true).unwrap();
        let options = ReaderOptions::default().with_max_payload_len(1024);

        assert_matches!(
            decode_with(&framed, &options),
            Err(Error::PayloadTooLarge { declared: 2048, limit: 1024 })
        );
    }

    #[test]
    fn corrupt_lz4_body() {
        let options = WriterOptions::default().with_compression(Compression::Lz4);
        let mut framed = encode_with(&[3u8; 512], &options).unwrap();
        let len = framed.len();
        framed.truncate(len - 3);

        assert!(decode(&framed).is_err());
    }

    #[test]
    fn platform_exclusivity_is_opt_in() {
        let options = WriterOptions::default().with_platform(TargetPlatform::Android);
        let framed = encode_with(b"abc", &options).unwrap();

        assert!(decode(&framed).is_ok());
        assert_matches!(
            decode_with(
                &framed,
                &ReaderOptions::default().with_required_platform(TargetPlatform::Windows)
            ),
            Err(Error::PlatformMismatch { expected: b'w', found: b'a' })
        );
        assert!(decode_with(
            &framed,
            &ReaderOptions::default().with_required_platform(TargetPlatform::Android)
        )
        .is_ok());
    }

    #[quickcheck]
    fn test_random(payload: Vec<u8>, lz4: bool) -> bool {
        let compression = if lz4 {
            Compression::Lz4
        } else {
            Compression::Deflate
        };
        let framed =
            encode_with(&payload, &WriterOptions::default().with_compression(compression))
                .unwrap();

        decode(&framed).unwrap() == payload
    }
}
