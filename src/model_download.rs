use std::{
    fs,
    io::{Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;

/// A downloadable ONNX model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModelSpec {
    pub label: &'static str,
    pub file_name: &'static str,
    pub url: &'static str,
}

impl ModelSpec {
    pub fn default_path(&self) -> PathBuf {
        PathBuf::from("models").join(self.file_name)
    }
}

/// Makes sure `model_path` exists, downloading `spec.url` into it when missing.
pub fn ensure_model_ready(spec: &ModelSpec, model_path: &Path) -> anyhow::Result<()> {
    if model_path.exists() {
        log::debug!("{} model present at {}", spec.label, model_path.display());
        return Ok(());
    }

    if let Some(parent) = model_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create model directory {}", parent.display()))?;
    }

    download_to_path(spec, model_path)
        .with_context(|| format!("failed to download {} model", spec.label))
}

fn download_to_path(spec: &ModelSpec, dest: &Path) -> anyhow::Result<()> {
    log::info!(
        "downloading {} model from {} to {}",
        spec.label,
        spec.url,
        dest.display()
    );

    let client = Client::new();
    let mut response = client
        .get(spec.url)
        .send()
        .context("failed to start model download")?
        .error_for_status()
        .context("model download returned error status")?;

    let progress = create_progress_bar(response.content_length());

    let tmp_path = dest.with_extension("download");
    let mut file = fs::File::create(&tmp_path)
        .with_context(|| format!("failed to create {}", tmp_path.display()))?;

    let mut downloaded: u64 = 0;
    let mut buffer = [0u8; 16 * 1024];
    loop {
        let bytes_read = response
            .read(&mut buffer)
            .context("failed while reading model bytes")?;
        if bytes_read == 0 {
            break;
        }

        file.write_all(&buffer[..bytes_read])
            .context("failed while writing model to disk")?;
        downloaded += bytes_read as u64;
        progress.set_position(downloaded);
    }

    file.sync_all()
        .context("failed to flush downloaded model to disk")?;
    fs::rename(&tmp_path, dest).with_context(|| {
        format!(
            "failed to move temp model {} into place at {}",
            tmp_path.display(),
            dest.display()
        )
    })?;

    progress.finish_with_message(format!("{} model ready", spec.label));
    Ok(())
}

fn create_progress_bar(total_size: Option<u64>) -> ProgressBar {
    match total_size {
        Some(total) if total > 0 => {
            let pb = ProgressBar::new(total);
            if let Ok(style) = ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            ) {
                pb.set_style(style.progress_chars("=>-"));
            }
            pb
        }
        _ => {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner:.green} downloading model")
            {
                pb.set_style(style);
            }
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEC: ModelSpec = ModelSpec {
        label: "test",
        file_name: "test.onnx",
        url: "http://127.0.0.1:9/unreachable.onnx",
    };

    #[test]
    fn default_path_lives_under_models() {
        assert_eq!(SPEC.default_path(), PathBuf::from("models/test.onnx"));
    }

    #[test]
    fn existing_file_skips_download() {
        let path = std::env::temp_dir().join(format!("pose-relay-model-{}.onnx", std::process::id()));
        fs::write(&path, b"onnx").unwrap();
        ensure_model_ready(&SPEC, &path).unwrap();
        fs::remove_file(&path).unwrap();
    }
}
