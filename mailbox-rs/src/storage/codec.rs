//! Raw payload compression
//!
//! Each call builds its own zstd stream, so a codec can be shared freely
//! between tasks.

use crate::error::{MailError, Result};

#[derive(Debug, Clone, Copy)]
pub struct PayloadCodec {
    level: i32,
}

impl PayloadCodec {
    pub fn new(level: i32) -> Self {
        Self { level }
    }

    pub fn level(&self) -> i32 {
        self.level
    }

    pub fn compress(&self, raw: &[u8]) -> Result<Vec<u8>> {
        Ok(zstd::stream::encode_all(raw, self.level)?)
    }

    pub fn decompress(&self, compressed: &[u8]) -> Result<Vec<u8>> {
        zstd::stream::decode_all(compressed)
            .map_err(|e| MailError::CorruptPayload(format!("error decompressing message: {}", e)))
    }
}

impl Default for PayloadCodec {
    fn default() -> Self {
        Self::new(3)
    }
}
