// Copyright 2025 the Compound Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Outer compression of container files.

use std::path::Path;

use crate::codec::MAGIC;
use crate::error::Result;

/// Compression wrapped around the container bytes.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Compression {
    /// Raw container.
    #[default]
    None,
    /// LZ4 block with the decompressed size prepended.
    Lz4,
}

impl Compression {
    /// Guess the compression of `data` read from a file named `name`.
    ///
    /// Data that starts with the container magic is never treated as
    /// compressed. Otherwise only an extension starting with `s` selects LZ4;
    /// anything else is left for the codec to reject.
    pub fn detect(name: &str, data: &[u8]) -> Self {
        if data.starts_with(&MAGIC) {
            return Self::None;
        }
        let compressed_ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.starts_with('s'));
        if compressed_ext {
            log::debug!("{name}: no container magic, decompressing as lz4");
            Self::Lz4
        } else {
            Self::None
        }
    }

    /// Undo this compression.
    pub fn decompress(self, data: Vec<u8>) -> Result<Vec<u8>> {
        match self {
            Self::None => Ok(data),
            Self::Lz4 => Ok(lz4_flex::decompress_size_prepended(&data)?),
        }
    }

    /// Apply this compression.
    pub fn compress(self, data: Vec<u8>) -> Vec<u8> {
        match self {
            Self::None => data,
            Self::Lz4 => lz4_flex::compress_prepend_size(&data),
        }
    }
}
