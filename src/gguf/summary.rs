use super::{ParsedModel, TaggedValue, ValueType};
use crate::format::{human_bytes, human_number};
use serde_json::{json, Value};
use std::fmt;

/// Arrays longer than this are printed as a count.
pub const ARRAY_PREVIEW_LIMIT: usize = 10;

/// Human-readable dump of a parsed model, for diagnostics only.
pub struct Summary<'a> {
    model: &'a ParsedModel,
}

impl<'a> Summary<'a> {
    pub fn new(model: &'a ParsedModel) -> Self {
        Self { model }
    }
}

/// Element type and length of an array too long to print.
fn elided(value: &TaggedValue) -> Option<(ValueType, usize)> {
    match value {
        TaggedValue::Array {
            element_type,
            values,
        } if values.len() > ARRAY_PREVIEW_LIMIT => Some((*element_type, values.len())),
        _ => None,
    }
}

impl fmt::Display for Summary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let model = self.model;
        let header = model.header();

        writeln!(f, "GGUF File: {}", model.path().display())?;
        writeln!(f, "Version: {}", header.version)?;
        writeln!(f, "Tensors: {}", header.tensor_count)?;
        writeln!(f, "Metadata entries: {}", header.metadata_count)?;
        writeln!(
            f,
            "Tensor data: {} ({} parameters)",
            human_bytes(model.tensor_bytes()),
            human_number(model.tensors().iter().map(|t| t.element_count).sum())
        )?;
        writeln!(
            f,
            "Data section: {} at offset {} (file: {})",
            human_bytes(model.data_section_size()),
            model.data_offset(),
            human_bytes(model.file_size())
        )?;
        if let Some(ctx) = model.context_length() {
            writeln!(f, "Context length: {}", ctx)?;
        }

        writeln!(f, "\nMetadata:")?;
        for (key, value) in model.metadata().iter() {
            match elided(value) {
                Some((ty, len)) => writeln!(
                    f,
                    "  {}: [array with {} {} items]",
                    key,
                    len,
                    ty.name()
                )?,
                None => writeln!(f, "  {}: {}", key, value)?,
            }
        }

        writeln!(f, "\nTensors:")?;
        for t in model.tensors() {
            writeln!(
                f,
                "  {}: {:?} (type: {}, offset: {})",
                t.name, t.dims, t.ty, t.offset
            )?;
        }
        Ok(())
    }
}

pub fn summary_json(model: &ParsedModel) -> Value {
    let metadata: serde_json::Map<String, Value> = model
        .metadata()
        .iter()
        .map(|(key, value)| {
            let v = match elided(value) {
                Some((ty, len)) => json!({ "array_len": len, "element_type": ty.name() }),
                None => serde_json::to_value(value).unwrap_or(Value::Null),
            };
            (key.to_string(), v)
        })
        .collect();

    json!({
        "path": model.path().display().to_string(),
        "header": model.header(),
        "data_offset": model.data_offset(),
        "file_size": model.file_size(),
        "data_section_size": model.data_section_size(),
        "context_length": model.context_length(),
        "tensor_bytes": model.tensor_bytes(),
        "metadata": metadata,
        "tensors": model.tensors(),
    })
}
