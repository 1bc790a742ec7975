//! EPUB archive translation
//!
//! An EPUB is a ZIP archive. Markup entries (`.xhtml`, `.html`, `.htm`) are
//! parsed, translated unit by unit and written back; every other entry is
//! copied raw so its bytes, compression and position stay exactly as they were.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use log::{info, warn};
use serde::Serialize;
use zip::read::ZipArchive;
use zip::write::{SimpleFileOptions, ZipWriter};

use crate::ai::UnitTranslator;
use crate::backup::{build_temp_path, swap_into_place, BackupError};
use crate::markup::{MarkupDocument, MarkupError};
use crate::time::{output_timestamp, Sleeper};
use crate::translate::{DocumentReport, DocumentTranslator};

const MARKUP_EXTENSIONS: &[&str] = &["xhtml", "html", "htm"];

/// Upper bound on the buffer reserved from an entry's declared size.
const MAX_PREALLOC: u64 = 16 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Archive not found: {0}")]
    NotFound(String),

    #[error("Failed to process {entry}: {source}")]
    Document {
        entry: String,
        #[source]
        source: MarkupError,
    },

    #[error("Failed to move output into place: {0}")]
    Backup(#[from] BackupError),
}

pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Summary of one archive run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveReport {
    pub output_path: PathBuf,
    pub backup_path: Option<PathBuf>,
    /// Markup entries that went through translation.
    pub documents: usize,
    /// Entries copied without modification, directories included.
    pub copied_entries: usize,
    pub units: DocumentReport,
}

/// True for entry names ending in `.xhtml`, `.html` or `.htm`, any case.
pub fn is_markup_entry(entry_name: &str) -> bool {
    Path::new(entry_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            MARKUP_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// `translated-<YYYYMMDD-HHMM>-<file name>` next to `input`.
pub fn default_output_path(input: &Path, now: &DateTime<Local>) -> PathBuf {
    let file_name = input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "book.epub".to_string());
    input.with_file_name(format!("translated-{}-{}", output_timestamp(now), file_name))
}

/// Buffer capacity for an entry whose header claims `declared` bytes. The
/// header is untrusted; larger entries still read fine, they just grow.
fn initial_capacity(declared: u64) -> usize {
    usize::try_from(declared.min(MAX_PREALLOC)).unwrap_or(0)
}

/// Translates every markup entry of the archive at `input` into a new archive at `output`.
///
/// Entries keep their order. The archive is assembled in a temporary sibling
/// file and only moved to `output` once it has been finalized; a file that
/// already exists at `output` is backed up first.
pub async fn translate_archive<T, S>(
    input: &Path,
    output: &Path,
    translator: &DocumentTranslator<T, S>,
    target_language: &str,
) -> ArchiveResult<ArchiveReport>
where
    T: UnitTranslator,
    S: Sleeper,
{
    if !input.is_file() {
        return Err(ArchiveError::NotFound(input.display().to_string()));
    }

    if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let temp_path = build_temp_path(output);
    let written = write_translated(input, &temp_path, translator, target_language).await;
    let (documents, copied_entries, units) = match written {
        Ok(counts) => counts,
        Err(err) => {
            if let Err(cleanup) = fs::remove_file(&temp_path) {
                if cleanup.kind() != io::ErrorKind::NotFound {
                    warn!(
                        "Could not remove temporary file {}: {}",
                        temp_path.display(),
                        cleanup
                    );
                }
            }
            return Err(err);
        }
    };

    let outcome = swap_into_place(&temp_path, output)?;
    if let Some(backup) = &outcome.backup_path {
        info!("Existing output backed up to {}", backup.display());
    }
    info!(
        "Wrote {} ({} documents, {} units translated, {} failed)",
        outcome.final_path.display(),
        documents,
        units.translated,
        units.failed
    );

    Ok(ArchiveReport {
        output_path: outcome.final_path,
        backup_path: outcome.backup_path,
        documents,
        copied_entries,
        units,
    })
}

async fn write_translated<T, S>(
    input: &Path,
    temp_path: &Path,
    translator: &DocumentTranslator<T, S>,
    target_language: &str,
) -> ArchiveResult<(usize, usize, DocumentReport)>
where
    T: UnitTranslator,
    S: Sleeper,
{
    let mut archive = ZipArchive::new(File::open(input)?)?;
    let total_documents = archive
        .file_names()
        .filter(|name| !name.ends_with('/') && is_markup_entry(name))
        .count();

    let mut writer = ZipWriter::new(File::create(temp_path)?);
    let mut documents = 0;
    let mut copied_entries = 0;
    let mut units = DocumentReport::default();

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let name = entry.name().to_string();

        if entry.is_dir() || !is_markup_entry(&name) {
            writer.raw_copy_file(entry)?;
            copied_entries += 1;
            continue;
        }

        let compression = entry.compression();
        let mut bytes = Vec::with_capacity(initial_capacity(entry.size()));
        entry.read_to_end(&mut bytes)?;
        drop(entry);

        documents += 1;
        info!("Translating {} ({}/{})", name, documents, total_documents);

        let document = MarkupDocument::parse(&bytes).map_err(|source| ArchiveError::Document {
            entry: name.clone(),
            source,
        })?;
        let (document, report) = translator
            .run(document, target_language)
            .await
            .map_err(|source| ArchiveError::Document {
                entry: name.clone(),
                source,
            })?;
        let translated = document.to_bytes().map_err(|source| ArchiveError::Document {
            entry: name.clone(),
            source,
        })?;

        if report.failed > 0 {
            warn!("{}: {} of {} units left untranslated", name, report.failed, report.service_units());
        }
        units.absorb(&report);

        let options = SimpleFileOptions::default().compression_method(compression);
        writer.start_file(name.as_str(), options)?;
        writer.write_all(&translated)?;
    }

    writer.finish()?;
    Ok((documents, copied_entries, units))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::mock::{MockMode, MockTranslator};
    use crate::time::NoopSleeper;
    use chrono::TimeZone;
    use std::time::Duration;
    use tempfile::tempdir;
    use zip::CompressionMethod;

    fn write_zip(path: &Path, entries: &[(&str, &[u8], CompressionMethod)]) {
        let mut writer = ZipWriter::new(File::create(path).unwrap());
        for (name, data, method) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default().compression_method(*method))
                .unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }

    fn orchestrator(mode: MockMode) -> DocumentTranslator<MockTranslator, NoopSleeper> {
        DocumentTranslator::new(MockTranslator::new(mode), NoopSleeper, Duration::ZERO)
    }

    #[test]
    fn test_is_markup_entry() {
        assert!(is_markup_entry("OEBPS/chapter1.xhtml"));
        assert!(is_markup_entry("text/INDEX.HTML"));
        assert!(is_markup_entry("old.htm"));
        assert!(!is_markup_entry("mimetype"));
        assert!(!is_markup_entry("OEBPS/content.opf"));
        assert!(!is_markup_entry("OEBPS/toc.ncx"));
        assert!(!is_markup_entry("styles/xhtml.css"));
    }

    #[test]
    fn test_default_output_path() {
        let now = Local
            .with_ymd_and_hms(2025, 1, 31, 23, 4, 0)
            .single()
            .unwrap();
        let output = default_output_path(Path::new("/books/novel.epub"), &now);
        assert_eq!(output, PathBuf::from("/books/translated-20250131-2304-novel.epub"));
    }

    #[test]
    fn declared_entry_size_does_not_drive_allocation() {
        assert_eq!(initial_capacity(0), 0);
        assert_eq!(initial_capacity(4096), 4096);
        assert_eq!(initial_capacity(u64::MAX), MAX_PREALLOC as usize);
        assert_eq!(initial_capacity(MAX_PREALLOC + 1), MAX_PREALLOC as usize);
    }

    #[test]
    fn missing_input_is_reported() {
        let dir = tempdir().unwrap();
        let result = tokio_test::block_on(translate_archive(
            &dir.path().join("absent.epub"),
            &dir.path().join("out.epub"),
            &orchestrator(MockMode::Fail),
            "German",
        ));
        assert!(matches!(result, Err(ArchiveError::NotFound(_))));
    }

    #[test]
    fn invalid_document_aborts_without_leaving_output() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("book.epub");
        let output = dir.path().join("out.epub");
        write_zip(
            &input,
            &[
                ("mimetype", &b"application/epub+zip"[..], CompressionMethod::Stored),
                ("OEBPS/bad.xhtml", &[b'<', b'p', b'>', 0xFF, 0xFE][..], CompressionMethod::Deflated),
            ],
        );

        let result = tokio_test::block_on(translate_archive(
            &input,
            &output,
            &orchestrator(MockMode::Prefix("[de] ".into())),
            "German",
        ));

        match result {
            Err(ArchiveError::Document { entry, source }) => {
                assert_eq!(entry, "OEBPS/bad.xhtml");
                assert!(matches!(source, MarkupError::InvalidUtf8(_)));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(!output.exists());
        assert!(!build_temp_path(&output).exists());
    }

    #[test]
    fn translated_entry_keeps_its_compression() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("book.epub");
        let output = dir.path().join("out.epub");
        write_zip(
            &input,
            &[
                ("mimetype", &b"application/epub+zip"[..], CompressionMethod::Stored),
                ("stored.html", &b"<p>Hi</p>"[..], CompressionMethod::Stored),
                ("packed.xhtml", &b"<p>Hi</p>"[..], CompressionMethod::Deflated),
            ],
        );

        let report = tokio_test::block_on(translate_archive(
            &input,
            &output,
            &orchestrator(MockMode::Prefix("[de] ".into())),
            "German",
        ))
        .unwrap();

        assert_eq!(report.documents, 2);
        assert_eq!(report.copied_entries, 1);
        assert_eq!(report.units.translated, 2);

        let mut archive = ZipArchive::new(File::open(&output).unwrap()).unwrap();
        assert_eq!(
            archive.by_name("stored.html").unwrap().compression(),
            CompressionMethod::Stored
        );
        let mut packed = archive.by_name("packed.xhtml").unwrap();
        assert_eq!(packed.compression(), CompressionMethod::Deflated);
        let mut content = String::new();
        packed.read_to_string(&mut content).unwrap();
        assert!(content.contains("<p>[de] Hi</p>"));
    }
}
