use anyhow::{Context, Result};
use dialoguer::Input;
use opengpt::format::{human_bytes, shape};
use opengpt::gguf::{self, Summary, TensorValues};
use opengpt::{classify, projector_path_for, ClassifierConfig, ReaderConfig};
use std::path::Path;

pub fn info(path: &Path, json: bool) -> Result<()> {
    let model = gguf::parse(path).with_context(|| format!("failed to read {}", path.display()))?;

    if json {
        let out = serde_json::to_string_pretty(&gguf::summary_json(&model))?;
        println!("{}", out);
    } else {
        print!("{}", Summary::new(&model));
    }
    Ok(())
}

/// Prints the classification; returns whether the file is a usable text model.
pub fn check(path: &Path) -> Result<bool> {
    if !classify::has_model_extension(path) {
        println!("{}: not a .gguf file", path.display());
        return Ok(false);
    }

    let model = gguf::parse(path).with_context(|| format!("failed to read {}", path.display()))?;
    let kind = classify(&model, &ClassifierConfig::from_env());
    println!("{}: {}", path.display(), kind);

    if let Some(mmproj) = projector_path_for(path) {
        println!("projector: {}", mmproj.display());
    }
    Ok(kind.is_text_model())
}

pub fn tensor(path: &Path, name: &str, f32_fallback: bool, limit: usize) -> Result<()> {
    let config = ReaderConfig::from_env();
    let config = if f32_fallback {
        config.with_f32_fallback(true)
    } else {
        config
    };

    let model = gguf::parse_with(path, &config)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let data = gguf::get_tensor_data_with(&model, name, &config)?;
    let desc = model
        .tensor(name)
        .context("tensor vanished from the directory")?;

    println!("{}: {} ({})", name, shape(&desc.dims), desc.ty);

    if let TensorValues::Quantized { ty, bytes } = data.values() {
        println!("{} of packed {} blocks", human_bytes(bytes.len() as u64), ty);
        return Ok(());
    }

    let values = data.to_f32_vec().unwrap_or_default();
    let preview: Vec<String> = values.iter().take(limit).map(|v| v.to_string()).collect();
    let more = values.len().saturating_sub(limit);
    if more > 0 {
        println!("[{}, ... {} more]", preview.join(", "), more);
    } else {
        println!("[{}]", preview.join(", "));
    }
    Ok(())
}

pub fn select() -> Result<()> {
    let config = ClassifierConfig::from_env();
    loop {
        let raw: String = Input::new()
            .with_prompt("Enter a language model path")
            .interact_text()?;
        let path = strip_path_quotes(&raw);

        if !opengpt::is_valid_text_model_with(path, &config) {
            eprintln!("File does not exist nor is a valid language model");
            continue;
        }

        println!("model: {}", path);
        match projector_path_for(path) {
            Some(mmproj) => println!("projector: {}", mmproj.display()),
            None => println!("projector: none"),
        }
        return Ok(());
    }
}

/// Drops the quotes terminals add around dragged-in paths.
fn strip_path_quotes(raw: &str) -> &str {
    let trimmed = raw.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = trimmed
            .strip_prefix(quote)
            .and_then(|s| s.strip_suffix(quote))
        {
            return inner;
        }
    }
    trimmed
}
