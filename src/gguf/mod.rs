//! Reader for GGUF model files.
//!
//! [`parse`] decodes the header, the metadata key/value section, and the
//! tensor directory in one sequential pass. Tensor payloads stay on disk until
//! [`get_tensor_data`] reads one of them through a fresh file handle.

mod error;
mod reader;
pub mod summary;
mod tensor;
mod value;

pub use error::{GgufError, Result};
pub use summary::{summary_json, Summary};
pub use tensor::{element_count, GgmlType, TensorData, TensorDescriptor, TensorValues};
pub use value::{TaggedValue, ValueType};

use crate::envconfig::ReaderConfig;
use reader::ByteReader;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

pub const GGUF_MAGIC: [u8; 4] = *b"GGUF";
pub const MIN_VERSION: u32 = 2;
pub const DEFAULT_ALIGNMENT: u64 = 32;
pub const FILE_EXTENSION: &str = "gguf";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Header {
    #[serde(serialize_with = "serialize_magic")]
    pub magic: [u8; 4],
    pub version: u32,
    pub tensor_count: u64,
    pub metadata_count: u64,
}

fn serialize_magic<S: serde::Serializer>(
    magic: &[u8; 4],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(magic))
}

/// Metadata entries in file order. Lookups return the last entry for a key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    entries: Vec<(String, TaggedValue)>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: String, value: TaggedValue) {
        self.entries.push((key, value));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TaggedValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn get(&self, key: &str) -> Option<&TaggedValue> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn string(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(TaggedValue::as_str)
    }

    pub fn uint(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(TaggedValue::as_u64)
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(TaggedValue::as_i64)
    }

    pub fn float(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(TaggedValue::as_f64)
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(TaggedValue::as_bool)
    }

    /// String array entries; `None` if the key is missing or not all strings.
    pub fn strings(&self, key: &str) -> Option<Vec<&str>> {
        self.get(key)?
            .as_array()?
            .iter()
            .map(TaggedValue::as_str)
            .collect()
    }
}

impl Serialize for Metadata {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// A decoded GGUF file. No file handle is kept open.
#[derive(Debug, Clone)]
pub struct ParsedModel {
    path: PathBuf,
    header: Header,
    metadata: Metadata,
    tensors: Vec<TensorDescriptor>,
    index: HashMap<String, usize>,
    data_offset: u64,
    file_size: u64,
}

impl ParsedModel {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn tensors(&self) -> &[TensorDescriptor] {
        &self.tensors
    }

    /// Looks up a tensor by name; on duplicate names the last one wins.
    pub fn tensor(&self, name: &str) -> Option<&TensorDescriptor> {
        self.index.get(name).map(|&i| &self.tensors[i])
    }

    /// Absolute file offset where the tensor data section begins.
    pub fn data_offset(&self) -> u64 {
        self.data_offset
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn data_section_size(&self) -> u64 {
        self.file_size.saturating_sub(self.data_offset)
    }

    /// Sum of the payload sizes of every tensor with a known encoding.
    pub fn tensor_bytes(&self) -> u64 {
        self.tensors
            .iter()
            .filter_map(TensorDescriptor::byte_size)
            .fold(0u64, u64::saturating_add)
    }

    pub fn architecture(&self) -> Option<&str> {
        self.metadata.string("general.architecture")
    }

    pub fn name(&self) -> Option<&str> {
        self.metadata.string("general.name")
    }

    pub fn block_count(&self) -> Option<u64> {
        let arch = self.architecture()?;
        self.metadata.uint(&format!("{}.block_count", arch))
    }

    pub fn context_length(&self) -> Option<u64> {
        let arch = self.architecture()?;
        self.metadata.uint(&format!("{}.context_length", arch))
    }

    pub fn alignment(&self) -> u64 {
        alignment_of(&self.metadata)
    }
}

/// Parses `path` using limits from the environment.
pub fn parse<P: AsRef<Path>>(path: P) -> Result<ParsedModel> {
    parse_with(path, &ReaderConfig::from_env())
}

pub fn parse_with<P: AsRef<Path>>(path: P, config: &ReaderConfig) -> Result<ParsedModel> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut model = parse_reader(&mut reader, config)?;
    model.path = path.to_path_buf();
    Ok(model)
}

/// Decodes a GGUF stream. The returned model has an empty path.
pub fn parse_reader<R: Read + Seek>(reader: &mut R, config: &ReaderConfig) -> Result<ParsedModel> {
    let mut r = ByteReader::new(reader, config);

    let magic = r.read_magic()?;
    if magic != GGUF_MAGIC {
        return Err(GgufError::BadSignature {
            expected: GGUF_MAGIC,
            found: magic,
        });
    }

    let version = r.read_u32()?;
    if version < MIN_VERSION {
        return Err(GgufError::UnsupportedVersion {
            found: version,
            minimum: MIN_VERSION,
        });
    }

    let tensor_count = r.read_u64()?;
    let metadata_count = r.read_u64()?;
    let header = Header {
        magic,
        version,
        tensor_count,
        metadata_count,
    };
    tracing::debug!(version, tensor_count, metadata_count, "read GGUF header");

    r.enter("metadata");
    let mut metadata = Metadata::new();
    for _ in 0..metadata_count {
        let key = r.read_string()?;
        let ty = value::read_value_type(&mut r)?;
        let value = value::read_value(&mut r, ty)?;
        metadata.push(key, value);
    }

    r.enter("tensor directory");
    let mut tensors = Vec::with_capacity(tensor_count.min(4096) as usize);
    let mut index = HashMap::new();
    for i in 0..tensor_count {
        let desc = tensor::read_descriptor(&mut r)?;
        index.insert(desc.name.clone(), i as usize);
        tensors.push(desc);
    }

    let reader = r.inner_mut();
    let directory_end = reader.stream_position()?;
    let file_size = reader.seek(SeekFrom::End(0))?;
    let data_offset = align_up(directory_end, alignment_of(&metadata));
    tracing::debug!(directory_end, data_offset, file_size, "decoded tensor directory");

    Ok(ParsedModel {
        path: PathBuf::new(),
        header,
        metadata,
        tensors,
        index,
        data_offset,
        file_size,
    })
}

/// Reads one tensor's payload, reopening the model's file.
pub fn get_tensor_data(model: &ParsedModel, tensor_name: &str) -> Result<TensorData> {
    get_tensor_data_with(model, tensor_name, &ReaderConfig::from_env())
}

pub fn get_tensor_data_with(
    model: &ParsedModel,
    tensor_name: &str,
    config: &ReaderConfig,
) -> Result<TensorData> {
    let desc = model
        .tensor(tensor_name)
        .ok_or_else(|| GgufError::UnknownTensor(tensor_name.to_string()))?;
    tensor::read_tensor_data(&model.path, model.data_offset, desc, config)
}

fn alignment_of(metadata: &Metadata) -> u64 {
    match metadata.uint("general.alignment") {
        Some(a) if a > 0 && a.is_power_of_two() => a,
        _ => DEFAULT_ALIGNMENT,
    }
}

fn align_up(offset: u64, alignment: u64) -> u64 {
    offset.div_ceil(alignment).saturating_mul(alignment)
}
