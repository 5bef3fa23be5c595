//! services/api/src/adapters/epub.rs
//!
//! `BookSource` backed by the `epub` crate. The container is parsed on a
//! blocking thread; chapters are read on demand from the open archive.

use async_trait::async_trait;
use epub::doc::{EpubDoc, NavPoint};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use visnovel_core::ports::{BookSource, FlowEntry, OpenedBook, PortError, PortResult};

type Doc = EpubDoc<BufReader<File>>;

#[derive(Clone, Default)]
pub struct EpubBookSource;

impl EpubBookSource {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BookSource for EpubBookSource {
    async fn open(&self, path: &Path) -> PortResult<Arc<dyn OpenedBook>> {
        let path = path.to_path_buf();
        let book = tokio::task::spawn_blocking(move || EpubBook::open(&path))
            .await
            .map_err(|e| PortError::Unexpected(format!("EPUB worker failed: {e}")))??;
        Ok(Arc::new(book))
    }
}

pub struct EpubBook {
    flow: Vec<FlowEntry>,
    doc: Arc<Mutex<Doc>>,
}

impl EpubBook {
    fn open(path: &Path) -> PortResult<Self> {
        let mut doc = EpubDoc::new(path).map_err(|e| {
            PortError::Unexpected(format!("Failed to open EPUB at {}: {}", path.display(), e))
        })?;

        let toc = flatten_toc(&doc.toc);
        let mut flow = Vec::new();
        // Walk the spine once to learn the reading order.
        loop {
            if let Some(id) = doc.get_current_id() {
                let title = doc
                    .get_current_path()
                    .and_then(|chapter_path| title_for(&chapter_path, &toc));
                flow.push(FlowEntry {
                    position: flow.len(),
                    id,
                    title,
                });
            }
            if !doc.go_next() {
                break;
            }
        }

        info!(path = %path.display(), chapters = flow.len(), "Opened EPUB");
        Ok(Self {
            flow,
            doc: Arc::new(Mutex::new(doc)),
        })
    }
}

#[async_trait]
impl OpenedBook for EpubBook {
    fn flow(&self) -> &[FlowEntry] {
        &self.flow
    }

    async fn chapter_markup(&self, entry: &FlowEntry) -> PortResult<String> {
        let doc = self.doc.clone();
        let id = entry.id.clone();
        tokio::task::spawn_blocking(move || {
            let mut doc = doc
                .lock()
                .map_err(|_| PortError::Unexpected("EPUB handle poisoned".to_string()))?;
            let (markup, mime) = doc
                .get_resource_str(&id)
                .ok_or_else(|| PortError::NotFound(format!("Chapter {} not found", id)))?;
            debug!(chapter = %id, %mime, bytes = markup.len(), "Read chapter");
            Ok(markup)
        })
        .await
        .map_err(|e| PortError::Unexpected(format!("EPUB worker failed: {e}")))?
    }
}

/// Table-of-contents entries as `(label, target path without fragment)`, in
/// document order with nested entries after their parent.
fn flatten_toc(points: &[NavPoint]) -> Vec<(String, PathBuf)> {
    let mut entries = Vec::new();
    for point in points {
        entries.push((point.label.trim().to_string(), strip_fragment(&point.content)));
        entries.extend(flatten_toc(&point.children));
    }
    entries
}

fn strip_fragment(target: &Path) -> PathBuf {
    let raw = target.to_string_lossy();
    match raw.split_once('#') {
        Some((file, _)) => PathBuf::from(file),
        None => target.to_path_buf(),
    }
}

/// The first non-empty label whose target is `chapter_path`.
fn title_for(chapter_path: &Path, toc: &[(String, PathBuf)]) -> Option<String> {
    toc.iter()
        .find(|(label, target)| !label.is_empty() && target.as_path() == chapter_path)
        .map(|(label, _)| label.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::LocalFileStore;
    use std::io::Write;
    use visnovel_core::{BoundedCache, DocumentKind, PaginationSettings, Paginator};
    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, ZipWriter};

    const CONTAINER: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
<rootfiles><rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/></rootfiles>
</container>"#;

    // The manifest lists the second chapter first; the spine decides the order.
    const PACKAGE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="uid">
<metadata xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>Harbor Lights</dc:title><dc:identifier id="uid">harbor-lights</dc:identifier></metadata>
<manifest>
<item id="c2" href="b.xhtml" media-type="application/xhtml+xml"/>
<item id="c1" href="a.xhtml" media-type="application/xhtml+xml"/>
<item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
</manifest>
<spine toc="ncx"><itemref idref="c1"/><itemref idref="c2"/></spine>
</package>"#;

    const NCX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
<docTitle><text>Harbor Lights</text></docTitle>
<navMap>
<navPoint id="n1" playOrder="1"><navLabel><text>Opening</text></navLabel><content src="a.xhtml"/></navPoint>
<navPoint id="n2" playOrder="2"><navLabel><text>Second</text></navLabel><content src="b.xhtml#x"/></navPoint>
</navMap>
</ncx>"#;

    const FIRST: &str = r#"<html xmlns="http://www.w3.org/1999/xhtml"><head></head><body><p>the lamps came on early</p></body></html>"#;
    const SECOND: &str = r#"<html xmlns="http://www.w3.org/1999/xhtml"><head></head><body><p id="x">boats rocked slowly against the stone pier</p></body></html>"#;

    fn write_book(path: &Path) {
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        let entries = [
            ("mimetype", "application/epub+zip"),
            ("META-INF/container.xml", CONTAINER),
            ("OEBPS/content.opf", PACKAGE),
            ("OEBPS/toc.ncx", NCX),
            ("OEBPS/a.xhtml", FIRST),
            ("OEBPS/b.xhtml", SECOND),
        ];
        for (name, body) in entries {
            zip.start_file(name, stored).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    fn toc() -> Vec<(String, PathBuf)> {
        vec![
            ("Part One".to_string(), PathBuf::from("OEBPS/part1.xhtml")),
            ("".to_string(), PathBuf::from("OEBPS/ch1.xhtml")),
            ("The Harbor".to_string(), PathBuf::from("OEBPS/ch1.xhtml")),
        ]
    }

    #[test]
    fn fragments_are_ignored_when_matching_targets() {
        assert_eq!(
            strip_fragment(Path::new("OEBPS/ch1.xhtml#start")),
            PathBuf::from("OEBPS/ch1.xhtml")
        );
        assert_eq!(strip_fragment(Path::new("ch2.xhtml")), PathBuf::from("ch2.xhtml"));
    }

    #[test]
    fn titles_skip_blank_labels() {
        assert_eq!(
            title_for(Path::new("OEBPS/ch1.xhtml"), &toc()),
            Some("The Harbor".to_string())
        );
        assert_eq!(
            title_for(Path::new("OEBPS/part1.xhtml"), &toc()),
            Some("Part One".to_string())
        );
        assert_eq!(title_for(Path::new("OEBPS/notes.xhtml"), &toc()), None);
    }

    #[tokio::test]
    async fn reading_order_follows_the_spine() {
        let path = std::env::temp_dir().join(format!("visnovel-{}.epub", uuid::Uuid::new_v4()));
        write_book(&path);

        let book = EpubBookSource::new().open(&path).await.unwrap();
        let ids: Vec<&str> = book.flow().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2"]);
        let titles: Vec<Option<&str>> = book.flow().iter().map(|e| e.title.as_deref()).collect();
        assert_eq!(titles, vec![Some("Opening"), Some("Second")]);
        let markup = book.chapter_markup(&book.flow()[1]).await.unwrap();
        assert!(markup.contains("boats rocked"));

        let paginator = Paginator::new(
            Arc::new(LocalFileStore::new()),
            Arc::new(EpubBookSource::new()),
            PaginationSettings {
                words_per_page: 4,
                ..PaginationSettings::default()
            },
            BoundedCache::new(4),
            BoundedCache::new(4),
        );
        assert_eq!(paginator.count_pages(&path, DocumentKind::Epub).await.unwrap(), 3);

        let expected = [
            (1, 0, "Opening", 0, 4),
            (2, 0, "Opening", 4, 1),
            (3, 1, "Second", 3, 4),
        ];
        for (page, chapter_index, title, offset, take) in expected {
            let resolved = paginator.page(&path, DocumentKind::Epub, page).await.unwrap();
            assert!(resolved.is_html);
            let chapter = resolved.chapter.unwrap();
            assert_eq!(chapter.chapter_index, chapter_index);
            assert_eq!(chapter.chapter_title, title);
            assert_eq!(chapter.word_offset, offset);
            assert_eq!(chapter.words_to_take, take);
            assert_eq!(chapter.total_chapters, 2);
        }

        let past = paginator.page(&path, DocumentKind::Epub, 4).await.unwrap();
        assert_eq!(past.content, "");
        assert_eq!(past.chapter, None);

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn unreadable_containers_fail_to_open() {
        let path = std::env::temp_dir().join(format!("visnovel-{}.epub", uuid::Uuid::new_v4()));
        std::fs::write(&path, b"definitely not a zip archive").unwrap();

        let result = EpubBookSource::new().open(&path).await;
        assert!(matches!(result, Err(PortError::Unexpected(_))));

        std::fs::remove_file(path).unwrap();
    }
}
