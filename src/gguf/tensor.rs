use super::error::{GgufError, Result};
use super::reader::{read_exact_len, ByteReader};
use crate::envconfig::ReaderConfig;
use byteorder::{ByteOrder, LittleEndian};
use half::{bf16, f16};
use serde::{Serialize, Serializer};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// On-disk tensor element encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum GgmlType {
    F32,
    F16,
    Q4_0,
    Q4_1,
    Q5_0,
    Q5_1,
    Q8_0,
    Q8_1,
    Q2_K,
    Q3_K,
    Q4_K,
    Q5_K,
    Q6_K,
    Q8_K,
    I8,
    I16,
    I32,
    I64,
    F64,
    BF16,
    Unknown(u32),
}

impl From<u32> for GgmlType {
    fn from(v: u32) -> Self {
        match v {
            0 => GgmlType::F32,
            1 => GgmlType::F16,
            2 => GgmlType::Q4_0,
            3 => GgmlType::Q4_1,
            6 => GgmlType::Q5_0,
            7 => GgmlType::Q5_1,
            8 => GgmlType::Q8_0,
            9 => GgmlType::Q8_1,
            10 => GgmlType::Q2_K,
            11 => GgmlType::Q3_K,
            12 => GgmlType::Q4_K,
            13 => GgmlType::Q5_K,
            14 => GgmlType::Q6_K,
            15 => GgmlType::Q8_K,
            24 => GgmlType::I8,
            25 => GgmlType::I16,
            26 => GgmlType::I32,
            27 => GgmlType::I64,
            28 => GgmlType::F64,
            30 => GgmlType::BF16,
            _ => GgmlType::Unknown(v),
        }
    }
}

impl GgmlType {
    pub fn code(&self) -> u32 {
        match self {
            GgmlType::F32 => 0,
            GgmlType::F16 => 1,
            GgmlType::Q4_0 => 2,
            GgmlType::Q4_1 => 3,
            GgmlType::Q5_0 => 6,
            GgmlType::Q5_1 => 7,
            GgmlType::Q8_0 => 8,
            GgmlType::Q8_1 => 9,
            GgmlType::Q2_K => 10,
            GgmlType::Q3_K => 11,
            GgmlType::Q4_K => 12,
            GgmlType::Q5_K => 13,
            GgmlType::Q6_K => 14,
            GgmlType::Q8_K => 15,
            GgmlType::I8 => 24,
            GgmlType::I16 => 25,
            GgmlType::I32 => 26,
            GgmlType::I64 => 27,
            GgmlType::F64 => 28,
            GgmlType::BF16 => 30,
            GgmlType::Unknown(v) => *v,
        }
    }

    /// Elements per storage block and bytes per block.
    fn layout(&self) -> Option<(u64, u64)> {
        Some(match self {
            GgmlType::F32 => (1, 4),
            GgmlType::F16 => (1, 2),
            GgmlType::BF16 => (1, 2),
            GgmlType::F64 => (1, 8),
            GgmlType::I8 => (1, 1),
            GgmlType::I16 => (1, 2),
            GgmlType::I32 => (1, 4),
            GgmlType::I64 => (1, 8),
            GgmlType::Q4_0 => (32, 18),
            GgmlType::Q4_1 => (32, 20),
            GgmlType::Q5_0 => (32, 22),
            GgmlType::Q5_1 => (32, 24),
            GgmlType::Q8_0 => (32, 34),
            GgmlType::Q8_1 => (32, 36),
            GgmlType::Q2_K => (256, 84),
            GgmlType::Q3_K => (256, 110),
            GgmlType::Q4_K => (256, 144),
            GgmlType::Q5_K => (256, 176),
            GgmlType::Q6_K => (256, 210),
            GgmlType::Q8_K => (256, 292),
            GgmlType::Unknown(_) => return None,
        })
    }

    pub fn block_size(&self) -> Option<u64> {
        self.layout().map(|(block, _)| block)
    }

    pub fn type_size(&self) -> Option<u64> {
        self.layout().map(|(_, size)| size)
    }

    pub fn is_quantized(&self) -> bool {
        matches!(self.block_size(), Some(b) if b > 1)
    }

    /// Bytes needed to store `elements` values of this type.
    pub fn bytes_for(&self, elements: u64) -> Option<u64> {
        let (block, size) = self.layout()?;
        elements.div_ceil(block).checked_mul(size)
    }

    pub fn name(&self) -> String {
        match self {
            GgmlType::Unknown(v) => format!("unknown({})", v),
            other => format!("{:?}", other),
        }
    }
}

impl fmt::Display for GgmlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl Serialize for GgmlType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name())
    }
}

/// Directory entry for one tensor. The payload stays on disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TensorDescriptor {
    pub name: String,
    pub dims: Vec<u64>,
    #[serde(rename = "type")]
    pub ty: GgmlType,
    /// Offset relative to the start of the data section.
    pub offset: u64,
    pub element_count: u64,
}

impl TensorDescriptor {
    pub fn new(name: String, dims: Vec<u64>, ty: GgmlType, offset: u64) -> Result<Self> {
        let element_count = element_count(&dims)?;
        Ok(Self {
            name,
            dims,
            ty,
            offset,
            element_count,
        })
    }

    pub fn byte_size(&self) -> Option<u64> {
        self.ty.bytes_for(self.element_count)
    }
}

/// Product of the extents; an empty list counts as zero elements.
pub fn element_count(dims: &[u64]) -> Result<u64> {
    if dims.is_empty() {
        return Ok(0);
    }
    dims.iter().try_fold(1u64, |acc, &d| {
        acc.checked_mul(d).ok_or(GgufError::LimitExceeded {
            what: "tensor element count",
            value: d,
            limit: u64::MAX / acc.max(1),
        })
    })
}

pub(crate) fn read_descriptor<R: Read>(reader: &mut ByteReader<'_, R>) -> Result<TensorDescriptor> {
    let name = reader.read_string()?;
    let n_dims = reader.read_u32()?;
    let max_dims = reader.config().max_dims;
    if n_dims > max_dims {
        return Err(GgufError::LimitExceeded {
            what: "dimension count",
            value: n_dims as u64,
            limit: max_dims as u64,
        });
    }

    let mut dims = Vec::with_capacity(n_dims as usize);
    for _ in 0..n_dims {
        dims.push(reader.read_u64()?);
    }

    let ty = GgmlType::from(reader.read_u32()?);
    let offset = reader.read_u64()?;

    TensorDescriptor::new(name, dims, ty, offset)
}

/// Decoded tensor payload.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorValues {
    F32(Vec<f32>),
    F16(Vec<f16>),
    Bf16(Vec<bf16>),
    F64(Vec<f64>),
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    /// Block-packed encodings, left as raw blocks.
    Quantized { ty: GgmlType, bytes: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TensorData {
    shape: Vec<usize>,
    values: TensorValues,
}

impl TensorData {
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn values(&self) -> &TensorValues {
        &self.values
    }

    /// Logical element count.
    pub fn len(&self) -> usize {
        if self.shape.is_empty() {
            0
        } else {
            self.shape.iter().product()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Widens unpacked payloads to f32. Quantized payloads yield `None`.
    pub fn to_f32_vec(&self) -> Option<Vec<f32>> {
        Some(match &self.values {
            TensorValues::F32(v) => v.clone(),
            TensorValues::F16(v) => v.iter().map(|x| x.to_f32()).collect(),
            TensorValues::Bf16(v) => v.iter().map(|x| x.to_f32()).collect(),
            TensorValues::F64(v) => v.iter().map(|&x| x as f32).collect(),
            TensorValues::I8(v) => v.iter().map(|&x| x as f32).collect(),
            TensorValues::I16(v) => v.iter().map(|&x| x as f32).collect(),
            TensorValues::I32(v) => v.iter().map(|&x| x as f32).collect(),
            TensorValues::I64(v) => v.iter().map(|&x| x as f32).collect(),
            TensorValues::Quantized { .. } => return None,
        })
    }

    /// Row-major lookup, outer dimension first.
    pub fn get_f32(&self, index: &[usize]) -> Option<f32> {
        if index.len() != self.shape.len() || self.shape.is_empty() {
            return None;
        }
        let mut flat = 0usize;
        for (&i, &extent) in index.iter().zip(&self.shape) {
            if i >= extent {
                return None;
            }
            flat = flat * extent + i;
        }
        Some(match &self.values {
            TensorValues::F32(v) => v[flat],
            TensorValues::F16(v) => v[flat].to_f32(),
            TensorValues::Bf16(v) => v[flat].to_f32(),
            TensorValues::F64(v) => v[flat] as f32,
            TensorValues::I8(v) => v[flat] as f32,
            TensorValues::I16(v) => v[flat] as f32,
            TensorValues::I32(v) => v[flat] as f32,
            TensorValues::I64(v) => v[flat] as f32,
            TensorValues::Quantized { .. } => return None,
        })
    }
}

/// Reads one tensor's payload from `path`, opening a fresh handle.
pub(crate) fn read_tensor_data(
    path: &Path,
    data_offset: u64,
    desc: &TensorDescriptor,
    config: &ReaderConfig,
) -> Result<TensorData> {
    let ty = match desc.ty {
        GgmlType::Unknown(code) if config.f32_fallback => {
            tracing::warn!(
                tensor = %desc.name,
                ty = code,
                "unknown tensor type, reading payload as f32"
            );
            GgmlType::F32
        }
        GgmlType::Unknown(code) => {
            return Err(GgufError::UnsupportedTensorType {
                name: desc.name.clone(),
                ty: code,
            })
        }
        ty => ty,
    };

    let byte_len = ty
        .bytes_for(desc.element_count)
        .ok_or(GgufError::LimitExceeded {
            what: "tensor byte size",
            value: desc.element_count,
            limit: u64::MAX,
        })?;
    let start = data_offset
        .checked_add(desc.offset)
        .ok_or_else(|| GgufError::truncated("tensor data"))?;

    let shape = desc
        .dims
        .iter()
        .map(|&d| usize::try_from(d))
        .collect::<std::result::Result<Vec<usize>, _>>()
        .map_err(|_| GgufError::LimitExceeded {
            what: "tensor extent",
            value: desc.dims.iter().copied().max().unwrap_or(0),
            limit: usize::MAX as u64,
        })?;

    let mut file = BufReader::new(File::open(path)?);
    file.seek(SeekFrom::Start(start))?;
    let bytes = read_exact_len(&mut file, byte_len, "tensor data")?;

    tracing::debug!(tensor = %desc.name, ty = %ty, bytes = byte_len, "read tensor payload");

    Ok(TensorData {
        shape,
        values: decode_values(ty, bytes),
    })
}

fn decode_values(ty: GgmlType, bytes: Vec<u8>) -> TensorValues {
    match ty {
        GgmlType::F32 => {
            let mut out = vec![0f32; bytes.len() / 4];
            LittleEndian::read_f32_into(&bytes, &mut out);
            TensorValues::F32(out)
        }
        GgmlType::F64 => {
            let mut out = vec![0f64; bytes.len() / 8];
            LittleEndian::read_f64_into(&bytes, &mut out);
            TensorValues::F64(out)
        }
        GgmlType::F16 => TensorValues::F16(
            bytes
                .chunks_exact(2)
                .map(|c| f16::from_le_bytes([c[0], c[1]]))
                .collect(),
        ),
        GgmlType::BF16 => TensorValues::Bf16(
            bytes
                .chunks_exact(2)
                .map(|c| bf16::from_le_bytes([c[0], c[1]]))
                .collect(),
        ),
        GgmlType::I8 => TensorValues::I8(bytes.iter().map(|&b| b as i8).collect()),
        GgmlType::I16 => {
            let mut out = vec![0i16; bytes.len() / 2];
            LittleEndian::read_i16_into(&bytes, &mut out);
            TensorValues::I16(out)
        }
        GgmlType::I32 => {
            let mut out = vec![0i32; bytes.len() / 4];
            LittleEndian::read_i32_into(&bytes, &mut out);
            TensorValues::I32(out)
        }
        GgmlType::I64 => {
            let mut out = vec![0i64; bytes.len() / 8];
            LittleEndian::read_i64_into(&bytes, &mut out);
            TensorValues::I64(out)
        }
        ty => TensorValues::Quantized { ty, bytes },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ggml_type_codes() {
        assert_eq!(GgmlType::from(0), GgmlType::F32);
        assert_eq!(GgmlType::from(12), GgmlType::Q4_K);
        assert_eq!(GgmlType::from(30), GgmlType::BF16);
        assert_eq!(GgmlType::from(4), GgmlType::Unknown(4));
        assert_eq!(GgmlType::Q8_0.code(), 8);
        assert_eq!(GgmlType::Unknown(99).code(), 99);
    }

    #[test]
    fn test_bytes_for() {
        assert_eq!(GgmlType::F32.bytes_for(6), Some(24));
        assert_eq!(GgmlType::F16.bytes_for(6), Some(12));
        assert_eq!(GgmlType::Q4_0.bytes_for(64), Some(36));
        assert_eq!(GgmlType::Q4_0.bytes_for(33), Some(36));
        assert_eq!(GgmlType::Q6_K.bytes_for(256), Some(210));
        assert_eq!(GgmlType::Unknown(4).bytes_for(1), None);
        assert!(GgmlType::Q4_K.is_quantized());
        assert!(!GgmlType::BF16.is_quantized());
    }

    #[test]
    fn test_element_count() {
        assert_eq!(element_count(&[2, 3]).unwrap(), 6);
        assert_eq!(element_count(&[4096, 32000]).unwrap(), 131_072_000);
        assert_eq!(element_count(&[]).unwrap(), 0);
        assert_eq!(element_count(&[5, 0]).unwrap(), 0);
        assert!(element_count(&[u64::MAX, 2]).is_err());
    }

    #[test]
    fn test_decode_f16() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&f16::from_f32(1.5).to_le_bytes());
        bytes.extend_from_slice(&f16::from_f32(-2.0).to_le_bytes());
        match decode_values(GgmlType::F16, bytes) {
            TensorValues::F16(v) => assert_eq!(v, vec![f16::from_f32(1.5), f16::from_f32(-2.0)]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_row_major_lookup() {
        let data = TensorData {
            shape: vec![2, 3],
            values: TensorValues::F32(vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]),
        };
        assert_eq!(data.len(), 6);
        assert_eq!(data.get_f32(&[0, 2]), Some(2.0));
        assert_eq!(data.get_f32(&[1, 0]), Some(3.0));
        assert_eq!(data.get_f32(&[2, 0]), None);
        assert_eq!(data.get_f32(&[1]), None);
    }

    #[test]
    fn test_quantized_has_no_f32_view() {
        let data = TensorData {
            shape: vec![32],
            values: decode_values(GgmlType::Q4_0, vec![0u8; 18]),
        };
        assert!(data.to_f32_vec().is_none());
        assert!(matches!(data.values(), TensorValues::Quantized { ty: GgmlType::Q4_0, .. }));
    }
}
