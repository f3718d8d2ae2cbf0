use super::error::{GgufError, Result};
use crate::envconfig::ReaderConfig;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Read;

/// Sequential little-endian cursor over a GGUF stream.
///
/// Every read consumes exactly the width of its type. Short reads surface as
/// `TruncatedInput` tagged with the section currently being decoded.
pub(crate) struct ByteReader<'a, R> {
    inner: &'a mut R,
    config: &'a ReaderConfig,
    section: &'static str,
}

macro_rules! read_scalar {
    ($name:ident, $ty:ty, $method:ident) => {
        pub fn $name(&mut self) -> Result<$ty> {
            let section = self.section;
            self.inner
                .$method::<LittleEndian>()
                .map_err(|e| GgufError::from_read(e, section))
        }
    };
}

impl<'a, R: Read> ByteReader<'a, R> {
    pub fn new(inner: &'a mut R, config: &'a ReaderConfig) -> Self {
        Self {
            inner,
            config,
            section: "header",
        }
    }

    pub fn config(&self) -> &ReaderConfig {
        self.config
    }

    /// Names the section subsequent errors are attributed to.
    pub fn enter(&mut self, section: &'static str) {
        self.section = section;
    }

    pub fn inner_mut(&mut self) -> &mut R {
        self.inner
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let section = self.section;
        self.inner
            .read_u8()
            .map_err(|e| GgufError::from_read(e, section))
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        let section = self.section;
        self.inner
            .read_i8()
            .map_err(|e| GgufError::from_read(e, section))
    }

    read_scalar!(read_u16, u16, read_u16);
    read_scalar!(read_i16, i16, read_i16);
    read_scalar!(read_u32, u32, read_u32);
    read_scalar!(read_i32, i32, read_i32);
    read_scalar!(read_u64, u64, read_u64);
    read_scalar!(read_i64, i64, read_i64);
    read_scalar!(read_f32, f32, read_f32);
    read_scalar!(read_f64, f64, read_f64);

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_magic(&mut self) -> Result<[u8; 4]> {
        let mut buf = [0u8; 4];
        let section = self.section;
        self.inner
            .read_exact(&mut buf)
            .map_err(|e| GgufError::from_read(e, section))?;
        Ok(buf)
    }

    /// Reads a u64 length prefix followed by that many UTF-8 bytes.
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_u64()?;
        let limit = self.config.max_string_len;
        if len > limit {
            return Err(GgufError::LimitExceeded {
                what: "string length",
                value: len,
                limit,
            });
        }
        let buf = self.read_bytes(len)?;
        Ok(String::from_utf8(buf)?)
    }

    /// Reads exactly `len` bytes without trusting `len` for the allocation.
    pub fn read_bytes(&mut self, len: u64) -> Result<Vec<u8>> {
        read_exact_len(&mut self.inner, len, self.section)
    }

    /// Reads a u64 count and checks it against `limit`.
    pub fn read_count(&mut self, what: &'static str, limit: u64) -> Result<u64> {
        let count = self.read_u64()?;
        if count > limit {
            return Err(GgufError::LimitExceeded {
                what,
                value: count,
                limit,
            });
        }
        Ok(count)
    }
}

/// Reads exactly `len` bytes, growing the buffer only as data arrives.
pub(crate) fn read_exact_len<R: Read>(
    reader: &mut R,
    len: u64,
    section: &'static str,
) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader
        .by_ref()
        .take(len)
        .read_to_end(&mut buf)
        .map_err(|e| GgufError::from_read(e, section))?;
    if (buf.len() as u64) < len {
        return Err(GgufError::truncated(section));
    }
    Ok(buf)
}
