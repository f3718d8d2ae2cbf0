//! Tells text-generation models apart from image-diffusion models and
//! multimodal projectors that share the GGUF container.

use crate::envconfig::ClassifierConfig;
use crate::gguf::{self, ParsedModel, TaggedValue, FILE_EXTENSION};
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// `general.architecture` values that are never text-generation models.
pub const NON_TEXT_ARCHITECTURES: &[&str] = &[
    "flux", "sd1", "sdxl", "sd3", "aura", "ltxv", "hyvid", "wan", "hidream", "cosmos",
    // multimodal projector
    "clip",
];

/// Tensor name prefixes written by diffusion quantizers that leave metadata empty.
pub const DIFFUSION_TENSOR_PREFIXES: &[&str] = &["model.diffusion_model"];

pub const ARCHITECTURE_KEY: &str = "general.architecture";

static BUILTIN_NON_TEXT: Lazy<HashSet<&'static str>> =
    Lazy::new(|| NON_TEXT_ARCHITECTURES.iter().copied().collect());

/// Built-in tables extended with configured entries.
#[derive(Debug, Clone, Default)]
pub struct ArchitectureTable {
    extra_architectures: HashSet<String>,
    extra_prefixes: Vec<String>,
}

impl ArchitectureTable {
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            extra_architectures: config.extra_non_text_architectures.iter().cloned().collect(),
            extra_prefixes: config.extra_diffusion_prefixes.clone(),
        }
    }

    pub fn is_non_text_architecture(&self, arch: &str) -> bool {
        BUILTIN_NON_TEXT.contains(arch) || self.extra_architectures.contains(arch)
    }

    pub fn is_diffusion_tensor(&self, name: &str) -> bool {
        DIFFUSION_TENSOR_PREFIXES
            .iter()
            .copied()
            .chain(self.extra_prefixes.iter().map(String::as_str))
            .any(|prefix| name.starts_with(prefix))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum NonTextReason {
    /// Metadata is empty and a tensor carries a diffusion-model prefix.
    DiffusionTensors { tensor: String },
    /// The declared architecture is an image or projector family.
    Architecture(String),
    MissingArchitecture,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelKind {
    Text { architecture: String },
    NonText { reason: NonTextReason },
    /// No metadata and nothing that marks the file as non-text.
    Indeterminate,
}

impl ModelKind {
    pub fn is_text_model(&self) -> bool {
        matches!(self, ModelKind::Text { .. } | ModelKind::Indeterminate)
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::Text { architecture } => write!(f, "text model ({})", architecture),
            ModelKind::Indeterminate => write!(f, "no metadata, assumed text model"),
            ModelKind::NonText { reason } => match reason {
                NonTextReason::DiffusionTensors { tensor } => {
                    write!(f, "image model (diffusion tensor '{}')", tensor)
                }
                NonTextReason::Architecture(arch) => {
                    write!(f, "not a text model (architecture '{}')", arch)
                }
                NonTextReason::MissingArchitecture => {
                    write!(f, "not a text model (no {} key)", ARCHITECTURE_KEY)
                }
            },
        }
    }
}

pub fn classify(model: &ParsedModel, config: &ClassifierConfig) -> ModelKind {
    classify_with_table(model, &ArchitectureTable::new(config))
}

pub fn classify_with_table(model: &ParsedModel, table: &ArchitectureTable) -> ModelKind {
    if model.metadata().is_empty() {
        return match model.tensors().iter().find(|t| table.is_diffusion_tensor(&t.name)) {
            Some(t) => ModelKind::NonText {
                reason: NonTextReason::DiffusionTensors {
                    tensor: t.name.clone(),
                },
            },
            None => ModelKind::Indeterminate,
        };
    }

    // Only an absent key is rejected; a non-string value cannot name a
    // non-text family, so it passes as text.
    match model.metadata().get(ARCHITECTURE_KEY) {
        None => ModelKind::NonText {
            reason: NonTextReason::MissingArchitecture,
        },
        Some(TaggedValue::String(arch)) if table.is_non_text_architecture(arch) => {
            ModelKind::NonText {
                reason: NonTextReason::Architecture(arch.clone()),
            }
        }
        Some(value) => ModelKind::Text {
            architecture: value.to_string(),
        },
    }
}

/// Whether `path` names an existing file with the `.gguf` extension.
pub fn has_model_extension(path: &Path) -> bool {
    path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(FILE_EXTENSION)
}

/// True when `path` can be handed to a text-generation server.
///
/// Parse failures count as "not valid"; call [`gguf::parse`] directly to
/// tell a corrupt file from a non-text one.
pub fn is_valid_text_model<P: AsRef<Path>>(path: P) -> bool {
    is_valid_text_model_with(path, &ClassifierConfig::from_env())
}

pub fn is_valid_text_model_with<P: AsRef<Path>>(path: P, config: &ClassifierConfig) -> bool {
    let path = path.as_ref();
    if !has_model_extension(path) {
        tracing::debug!(path = %path.display(), "missing file or wrong extension");
        return false;
    }

    match gguf::parse(path) {
        Ok(model) => {
            let kind = classify(&model, config);
            tracing::debug!(path = %path.display(), %kind, "classified model");
            kind.is_text_model()
        }
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "failed to parse model");
            false
        }
    }
}

/// The `<stem>-mmproj.gguf` projector next to a model, if present.
pub fn projector_path_for<P: AsRef<Path>>(model_path: P) -> Option<PathBuf> {
    let model_path = model_path.as_ref();
    let stem = model_path.file_stem()?.to_str()?;
    let candidate = model_path.with_file_name(format!("{}-mmproj.{}", stem, FILE_EXTENSION));
    candidate.is_file().then_some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_tables() {
        let table = ArchitectureTable::default();
        assert!(table.is_non_text_architecture("sdxl"));
        assert!(table.is_non_text_architecture("clip"));
        assert!(!table.is_non_text_architecture("llama"));
        assert!(table.is_diffusion_tensor("model.diffusion_model.input_blocks.0.weight"));
        assert!(!table.is_diffusion_tensor("blk.0.attn_q.weight"));
    }

    #[test]
    fn test_configured_extras() {
        let table = ArchitectureTable::new(&ClassifierConfig {
            extra_non_text_architectures: vec!["pixart".into()],
            extra_diffusion_prefixes: vec!["unet.".into()],
        });
        assert!(table.is_non_text_architecture("pixart"));
        assert!(table.is_non_text_architecture("flux"));
        assert!(table.is_diffusion_tensor("unet.conv_in.weight"));
    }

    #[test]
    fn test_is_text_model() {
        assert!(ModelKind::Indeterminate.is_text_model());
        assert!(ModelKind::Text {
            architecture: "qwen2".into()
        }
        .is_text_model());
        assert!(!ModelKind::NonText {
            reason: NonTextReason::MissingArchitecture
        }
        .is_text_model());
    }

    #[test]
    fn test_kind_json() {
        let kind = ModelKind::NonText {
            reason: NonTextReason::Architecture("sdxl".into()),
        };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["kind"], "non_text");
        assert_eq!(json["reason"]["reason"], "architecture");
        assert_eq!(json["reason"]["detail"], "sdxl");
    }

    #[test]
    fn test_extension_check_requires_existing_file() {
        assert!(!has_model_extension(Path::new("/definitely/not/here.gguf")));
    }
}
