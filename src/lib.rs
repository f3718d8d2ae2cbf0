pub mod classify;
pub mod envconfig;
pub mod format;
pub mod gguf;

pub use classify::{
    classify, is_valid_text_model, is_valid_text_model_with, projector_path_for, ModelKind,
    NonTextReason,
};
pub use envconfig::{ClassifierConfig, ReaderConfig};
pub use gguf::{
    get_tensor_data, parse, GgmlType, GgufError, Header, Metadata, ParsedModel, TaggedValue,
    TensorData, TensorDescriptor, TensorValues, ValueType,
};
