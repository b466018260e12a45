//! Extracción de texto de ficheros subidos o de un directorio local.
//!
//! El resto del sistema sólo necesita pares (nombre de fichero, texto): aquí
//! se decide el formato (PDF o texto plano) y se convierte a [`Document`].

use std::{
    fs, panic,
    path::Path,
    sync::{Arc, Mutex},
};

use mime_guess::MimeGuess;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::{
    app_state::Status,
    error::{RagError, Result},
    models::Document,
};

const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "rs", "toml", "log", "html", "css", "js", "csv", "json"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceFormat {
    Pdf,
    Text,
}

fn detect_format(filename: &str) -> Option<SourceFormat> {
    let extension = Path::new(filename)
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .unwrap_or("")
        .to_lowercase();
    if extension == "pdf" {
        return Some(SourceFormat::Pdf);
    }
    if TEXT_EXTENSIONS.contains(&extension.as_str()) {
        return Some(SourceFormat::Text);
    }

    let mime = MimeGuess::from_path(filename).first()?;
    match (mime.type_().as_str(), mime.subtype().as_str()) {
        ("application", "pdf") => Some(SourceFormat::Pdf),
        ("text", _) => Some(SourceFormat::Text),
        _ => None,
    }
}

/// Ejecuta `extract` convirtiendo un pánico del extractor en un error de ese fichero.
fn guard_extraction<F>(filename: &str, extract: F) -> Result<String>
where
    F: FnOnce() -> Result<String> + panic::UnwindSafe,
{
    panic::catch_unwind(extract).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "causa desconocida".to_string());
        Err(RagError::Extraction {
            filename: filename.to_string(),
            message: format!("el extractor abortó: {message}"),
        })
    })
}

/// Extrae el texto plano de un fichero a partir de su contenido en memoria.
pub fn extract_text(filename: &str, bytes: &[u8]) -> Result<String> {
    match detect_format(filename) {
        // pdf-extract puede entrar en pánico con PDFs malformados.
        Some(SourceFormat::Pdf) => guard_extraction(filename, || {
            pdf_extract::extract_text_from_mem(bytes).map_err(|e| RagError::Extraction {
                filename: filename.to_string(),
                message: e.to_string(),
            })
        }),
        Some(SourceFormat::Text) => {
            String::from_utf8(bytes.to_vec()).map_err(|_| RagError::Extraction {
                filename: filename.to_string(),
                message: "el fichero no es UTF-8 válido".to_string(),
            })
        }
        None => Err(RagError::UnsupportedFormat {
            filename: filename.to_string(),
        }),
    }
}

/// Convierte un fichero subido en un [`Document`].
pub fn document_from_upload(filename: &str, bytes: &[u8]) -> Result<Document> {
    let text = extract_text(filename, bytes)?;
    Ok(Document::new(filename, text))
}

/// Resumen de una carga de directorio.
#[derive(Debug, Default)]
pub struct LoadSummary {
    pub documents: Vec<Document>,
    pub files_scanned: u32,
    pub files_skipped: u32,
}

impl std::fmt::Display for LoadSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let chars: usize = self.documents.iter().map(|d| d.raw_text.chars().count()).sum();
        write!(
            f,
            "{} ficheros escaneados, {} documentos cargados ({} caracteres), {} omitidos.",
            self.files_scanned,
            self.documents.len(),
            chars,
            self.files_skipped
        )
    }
}

/// Recorre recursivamente un directorio y extrae el texto de cada PDF o
/// fichero de texto. Los ficheros ilegibles o no soportados se omiten.
pub fn load_documents_from_folder(root: &Path, status: Arc<Mutex<Status>>) -> Result<LoadSummary> {
    if !root.is_dir() {
        return Err(RagError::InvalidConfig(format!(
            "La ruta no es un directorio: {}",
            root.display()
        )));
    }

    let mut entries: Vec<_> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .collect();
    entries.sort_by(|a, b| a.path().cmp(b.path()));

    let total_files = entries.len().max(1) as f32;
    let mut summary = LoadSummary::default();

    for (index, entry) in entries.iter().enumerate() {
        summary.files_scanned += 1;
        let path = entry.path();
        let filename = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());

        Status::update(
            &status,
            format!("[{}/{}] Procesando: {}...", index + 1, entries.len(), filename),
            (index + 1) as f32 / total_files,
        );

        if detect_format(&filename).is_none() {
            info!("Saltando fichero con formato no soportado: {}", path.display());
            summary.files_skipped += 1;
            continue;
        }

        let extracted = fs::read(path)
            .map_err(|e| RagError::Extraction {
                filename: filename.clone(),
                message: e.to_string(),
            })
            .and_then(|bytes| extract_text(&filename, &bytes));

        match extracted {
            Ok(text) => summary.documents.push(Document::new(filename, text)),
            Err(err) => {
                warn!("No se pudo extraer texto de {}: {}. Saltando fichero.", path.display(), err);
                summary.files_skipped += 1;
            }
        }
    }

    info!("Carga de {} completada. {}", root.display(), summary);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_formats_by_extension() {
        assert_eq!(detect_format("informe.PDF"), Some(SourceFormat::Pdf));
        assert_eq!(detect_format("notas.md"), Some(SourceFormat::Text));
        assert_eq!(detect_format("foto.png"), None);
        assert_eq!(detect_format("sin_extension"), None);
    }

    #[test]
    fn extracts_plain_text() {
        let text = extract_text("a.txt", "The sky is blue.".as_bytes()).unwrap();
        assert_eq!(text, "The sky is blue.");
    }

    #[test]
    fn rejects_unsupported_and_invalid_input() {
        assert!(matches!(
            extract_text("foto.png", b"\x89PNG"),
            Err(RagError::UnsupportedFormat { .. })
        ));
        assert!(matches!(
            extract_text("a.txt", &[0xff, 0xfe, 0xfd]),
            Err(RagError::Extraction { .. })
        ));
        assert!(matches!(
            extract_text("roto.pdf", b"esto no es un pdf"),
            Err(RagError::Extraction { .. })
        ));
    }

    #[test]
    fn extractor_panic_becomes_an_extraction_error() {
        let result = guard_extraction("roto.pdf", || panic!("xref corrupta"));
        match result {
            Err(RagError::Extraction { filename, message }) => {
                assert_eq!(filename, "roto.pdf");
                assert!(message.contains("xref corrupta"));
            }
            other => panic!("se esperaba un error de extracción: {other:?}"),
        }
        assert_eq!(guard_extraction("ok.pdf", || Ok("texto".to_string())).unwrap(), "texto");
    }

    #[test]
    fn loads_supported_files_and_skips_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "The sky is blue.").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("b.md"), "Grass is green.").unwrap();
        fs::write(dir.path().join("c.bin"), [0u8, 1, 2]).unwrap();
        fs::write(dir.path().join("d.pdf"), b"esto no es un pdf").unwrap();

        let status = Arc::new(Mutex::new(Status::default()));
        let summary = load_documents_from_folder(dir.path(), status.clone()).unwrap();

        assert_eq!(summary.files_scanned, 4);
        assert_eq!(summary.files_skipped, 2);
        let names: Vec<_> = summary.documents.iter().map(|d| d.filename.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.md"]);
        assert_eq!(status.lock().unwrap().progress, 1.0);
    }

    #[test]
    fn missing_directory_is_rejected() {
        let status = Arc::new(Mutex::new(Status::default()));
        let result = load_documents_from_folder(Path::new("/no/existe/seguro"), status);
        assert!(matches!(result, Err(RagError::InvalidConfig(_))));
    }
}
