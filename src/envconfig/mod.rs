use std::env;
use std::str::FromStr;

pub const DEFAULT_MAX_STRING_LEN: u64 = 64 * 1024 * 1024;
pub const DEFAULT_MAX_ARRAY_LEN: u64 = 1 << 26;
pub const DEFAULT_MAX_DIMS: u32 = 8;

/// Limits and compatibility switches applied while decoding GGUF files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderConfig {
    pub max_string_len: u64,
    pub max_array_len: u64,
    pub max_dims: u32,
    /// Treat unknown tensor types as f32 when extracting payloads.
    pub f32_fallback: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            max_string_len: DEFAULT_MAX_STRING_LEN,
            max_array_len: DEFAULT_MAX_ARRAY_LEN,
            max_dims: DEFAULT_MAX_DIMS,
            f32_fallback: false,
        }
    }
}

impl ReaderConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_string_len: parse_var("OPENGPT_GGUF_MAX_STRING", defaults.max_string_len),
            max_array_len: parse_var("OPENGPT_GGUF_MAX_ARRAY", defaults.max_array_len),
            max_dims: parse_var("OPENGPT_GGUF_MAX_DIMS", defaults.max_dims),
            f32_fallback: bool_var("OPENGPT_GGUF_F32_FALLBACK", defaults.f32_fallback),
        }
    }

    pub fn with_f32_fallback(mut self, enabled: bool) -> Self {
        self.f32_fallback = enabled;
        self
    }
}

/// Extra entries appended to the built-in non-text tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifierConfig {
    pub extra_non_text_architectures: Vec<String>,
    pub extra_diffusion_prefixes: Vec<String>,
}

impl ClassifierConfig {
    pub fn from_env() -> Self {
        Self {
            extra_non_text_architectures: list_var("OPENGPT_EXTRA_NON_TEXT_ARCHS"),
            extra_diffusion_prefixes: list_var("OPENGPT_EXTRA_DIFFUSION_PREFIXES"),
        }
    }
}

fn parse_var<T: FromStr + Copy>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => parse_or(name, &raw, default),
        Err(_) => default,
    }
}

fn parse_or<T: FromStr + Copy>(name: &str, raw: &str, default: T) -> T {
    match raw.trim().parse() {
        Ok(v) => v,
        Err(_) => {
            tracing::warn!("ignoring invalid value {:?} for {}", raw, name);
            default
        }
    }
}

fn bool_var(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(raw) => parse_bool(&raw).unwrap_or_else(|| {
            tracing::warn!("ignoring invalid value {:?} for {}", raw, name);
            default
        }),
        Err(_) => default,
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

fn list_var(name: &str) -> Vec<String> {
    env::var(name).map(|raw| split_list(&raw)).unwrap_or_default()
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
