//! Local Tesseract backend.
//!
//! Runs the `tesseract` CLI on a temp copy of the upload. PDFs are first
//! rasterized page by page with `pdftoppm`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use secrecy::SecretString;
use tempfile::TempDir;
use tokio::process::Command;

use crate::config::TesseractConfig;
use crate::engine::{EngineError, OcrBackend};
use crate::job::OcrEngine;

pub struct TesseractBackend {
    binary: String,
    pdftoppm_binary: String,
    languages: String,
    dpi: u32,
}

impl TesseractBackend {
    pub fn new(config: &TesseractConfig) -> Self {
        let languages = if config.languages.is_empty() {
            "eng".to_string()
        } else {
            config.language_arg()
        };
        Self {
            binary: config.binary.clone(),
            pdftoppm_binary: config.pdftoppm_binary.clone(),
            languages,
            dpi: config.dpi,
        }
    }

    async fn run_tesseract(&self, image_path: &Path) -> Result<String, EngineError> {
        let output = Command::new(&self.binary)
            .arg(image_path)
            .arg("stdout")
            .args(["-l", &self.languages])
            .kill_on_drop(true)
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                Ok(String::from_utf8_lossy(&output.stdout).into_owned())
            }
            Ok(output) => Err(EngineError::Request {
                engine: OcrEngine::Tesseract,
                message: format!(
                    "tesseract exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(EngineError::Unavailable {
                engine: OcrEngine::Tesseract,
                reason: "tesseract binary not found".to_string(),
            }),
            Err(e) => Err(EngineError::Io(e)),
        }
    }

    /// Renders every page of `pdf_path` into `out_dir`, returning the images in page order.
    async fn rasterize_pdf(&self, pdf_path: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, EngineError> {
        let output = Command::new(&self.pdftoppm_binary)
            .args(["-png", "-r", &self.dpi.to_string()])
            .arg(pdf_path)
            .arg(out_dir.join("page"))
            .kill_on_drop(true)
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {}
            Ok(output) => {
                return Err(EngineError::Request {
                    engine: OcrEngine::Tesseract,
                    message: format!(
                        "pdftoppm failed to convert PDF: {}",
                        String::from_utf8_lossy(&output.stderr).trim()
                    ),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EngineError::Unavailable {
                    engine: OcrEngine::Tesseract,
                    reason: "pdftoppm binary not found (install poppler-utils)".to_string(),
                })
            }
            Err(e) => return Err(EngineError::Io(e)),
        }

        let pages = page_images(out_dir)?;
        if pages.is_empty() {
            return Err(EngineError::Request {
                engine: OcrEngine::Tesseract,
                message: "pdftoppm produced no pages".to_string(),
            });
        }
        Ok(pages)
    }
}

/// `page-1.png`, `page-01.png`, ... sorted by name. pdftoppm pads all
/// page numbers in one run to the same width.
fn page_images(dir: &Path) -> Result<Vec<PathBuf>, EngineError> {
    let mut pages: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("page-") && n.ends_with(".png"))
                .unwrap_or(false)
        })
        .collect();
    pages.sort();
    Ok(pages)
}

fn input_extension(mime_type: &str) -> Result<&'static str, EngineError> {
    match mime_type {
        "application/pdf" => Ok("pdf"),
        "image/png" => Ok("png"),
        "image/jpeg" | "image/jpg" => Ok("jpg"),
        "image/tiff" => Ok("tif"),
        "image/bmp" => Ok("bmp"),
        "image/gif" => Ok("gif"),
        "image/webp" => Ok("webp"),
        other if other.starts_with("image/") => Ok("img"),
        other => Err(EngineError::InvalidInput(format!(
            "tesseract cannot read '{}' documents",
            other
        ))),
    }
}

#[async_trait]
impl OcrBackend for TesseractBackend {
    fn engine(&self) -> OcrEngine {
        OcrEngine::Tesseract
    }

    async fn recognize_text(
        &self,
        file_bytes: &[u8],
        mime_type: &str,
        _api_key: Option<&SecretString>,
    ) -> Result<String, EngineError> {
        let extension = input_extension(mime_type)?;
        let temp_dir = TempDir::new()?;
        let input = temp_dir.path().join(format!("input.{}", extension));
        tokio::fs::write(&input, file_bytes).await?;

        if extension != "pdf" {
            return self.run_tesseract(&input).await;
        }

        let pages = self.rasterize_pdf(&input, temp_dir.path()).await?;
        log::debug!("Tesseract: recognizing {} PDF page(s)", pages.len());
        let mut texts = Vec::with_capacity(pages.len());
        for page in &pages {
            texts.push(self.run_tesseract(page).await?);
        }
        Ok(texts.join("\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend_with(binary: &str, pdftoppm: &str) -> TesseractBackend {
        TesseractBackend::new(&TesseractConfig {
            binary: binary.to_string(),
            pdftoppm_binary: pdftoppm.to_string(),
            ..TesseractConfig::default()
        })
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_abandoned_call_kills_subprocess() {
        use std::os::unix::fs::PermissionsExt;
        use std::time::Duration;

        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("finished");
        let script = dir.path().join("slow-tesseract");
        std::fs::write(
            &script,
            format!("#!/bin/sh\nsleep 1\ntouch '{}'\n", marker.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let backend = backend_with(&script.to_string_lossy(), "pdftoppm");
        let call = backend.recognize_text(b"png", "image/png", None);
        let timed_out = tokio::time::timeout(Duration::from_millis(200), call).await;
        assert!(timed_out.is_err());

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists(), "subprocess outlived the dropped call");
    }

    #[test]
    fn test_languages_joined() {
        let backend = TesseractBackend::new(&TesseractConfig {
            languages: vec!["eng".to_string(), "mar".to_string()],
            ..TesseractConfig::default()
        });
        assert_eq!(backend.languages, "eng+mar");
    }

    #[test]
    fn test_input_extension() {
        assert_eq!(input_extension("application/pdf").unwrap(), "pdf");
        assert_eq!(input_extension("image/jpeg").unwrap(), "jpg");
        assert_eq!(input_extension("image/x-portable-pixmap").unwrap(), "img");
        assert!(matches!(
            input_extension("text/plain"),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_page_images_sorted() {
        let dir = TempDir::new().unwrap();
        for name in ["page-10.png", "page-02.png", "page-01.png", "input.pdf"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let names: Vec<String> = page_images(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["page-01.png", "page-02.png", "page-10.png"]);
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let backend = backend_with("omniocr-no-such-tesseract", "pdftoppm");
        let err = backend
            .recognize_text(b"\x89PNG", "image/png", None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Unavailable { engine: OcrEngine::Tesseract, .. }));
        assert!(err.to_string().contains("binary not found"));
    }

    #[tokio::test]
    async fn test_missing_pdftoppm_is_unavailable() {
        let backend = backend_with("tesseract", "omniocr-no-such-pdftoppm");
        let err = backend
            .recognize_text(b"%PDF-1.7", "application/pdf", None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("pdftoppm binary not found"));
    }
}
