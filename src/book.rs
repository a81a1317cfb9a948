//! Access to the book on disk: an EPUB archive or a single XHTML file.
//!
//! Both kinds hand out the item list in reading order, a [`SourceOpener`] for
//! item markup and an [`ExternalOpener`] for everything links point at that is
//! not an item.

use std::cell::RefCell;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, Result};
use epub::doc::EpubDoc;
use log::{debug, info, warn};

use crate::error::{self, ReaderError};
use crate::hyperlink::is_absolute;
use crate::markup::{TokenSource, XmlTokenSource};
use crate::pager::SourceOpener;
use crate::session::ExternalOpener;

const XHTML_MIME: &str = "application/xhtml+xml";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookInfo {
    pub title: String,
    pub creator: Option<String>,
    pub publisher: Option<String>,
    pub rights: Option<String>,
    pub language: Option<String>,
    /// Archive reference of the cover image.
    pub cover: Option<String>,
}

impl BookInfo {
    /// `label: value` lines for every field that is present.
    pub fn describe(&self) -> Vec<String> {
        let mut lines = vec![format!("Title: {}", self.title)];
        let fields = [
            ("Author", &self.creator),
            ("Publisher", &self.publisher),
            ("Rights", &self.rights),
            ("Language", &self.language),
            ("Cover", &self.cover),
        ];
        for (label, value) in fields {
            if let Some(value) = value {
                lines.push(format!("{label}: {value}"));
            }
        }
        lines
    }
}

/// Everything the reader needs from an opened book.
pub struct OpenedBook {
    pub info: BookInfo,
    pub items: Vec<String>,
    pub is_html: bool,
    pub opener: Box<dyn SourceOpener>,
    pub external: Box<dyn ExternalOpener>,
}

impl OpenedBook {
    /// Hands the cover image to the external opener and returns its
    /// reference.
    pub fn open_cover(&mut self) -> Result<String> {
        let cover = self
            .info
            .cover
            .clone()
            .with_context(|| format!("{} has no cover", self.info.title))?;
        info!("Opening cover {cover}");
        self.external.open_external(&cover)?;
        Ok(cover)
    }
}

/// Opens `path` as a single XHTML file when `html` is set or the extension
/// says so, as an EPUB archive otherwise.
pub fn open_book(path: &Path, html: bool) -> Result<OpenedBook> {
    if html || is_html_path(path) {
        let file = HtmlFile::new(path)?;
        Ok(OpenedBook {
            info: file.info(),
            items: file.items(),
            is_html: true,
            opener: Box::new(file.clone()),
            external: Box::new(file),
        })
    } else {
        let book = EpubBook::open(path)?;
        Ok(OpenedBook {
            info: book.info(),
            items: book.items(),
            is_html: false,
            opener: Box::new(book.clone()),
            external: Box::new(book),
        })
    }
}

pub fn is_html_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| matches!(ext.to_ascii_lowercase().as_str(), "html" | "htm" | "xhtml"))
}

type Doc = EpubDoc<BufReader<File>>;

/// An EPUB archive shared between the pager and the link handler.
#[derive(Clone)]
pub struct EpubBook {
    path: PathBuf,
    doc: Rc<RefCell<Doc>>,
}

impl EpubBook {
    pub fn open(path: &Path) -> Result<Self> {
        info!("Loading EPUB from {path:?}");
        let doc = EpubDoc::new(path).with_context(|| format!("Failed to open EPUB {path:?}"))?;
        Ok(Self {
            path: path.to_path_buf(),
            doc: Rc::new(RefCell::new(doc)),
        })
    }

    pub fn info(&self) -> BookInfo {
        let doc = self.doc.borrow();
        let field = |name: &str| doc.mdata(name).map(|item| item.value.clone());
        let creators = doc
            .metadata
            .iter()
            .filter(|item| item.property == "creator")
            .map(|item| item.value.as_str());
        let cover = doc
            .get_cover_id()
            .and_then(|id| doc.resources.get(&id).map(|resource| archive_path(&resource.path)));
        BookInfo {
            title: field("title").unwrap_or_else(|| file_stem(&self.path)),
            creator: join_names(creators),
            publisher: field("publisher"),
            rights: field("rights"),
            language: field("language"),
            cover,
        }
    }

    /// Item references in spine order. A book without a spine falls back to
    /// every XHTML resource, sorted by path.
    pub fn items(&self) -> Vec<String> {
        let doc = self.doc.borrow();
        let spine: Vec<String> = doc
            .spine
            .iter()
            .filter_map(|entry| match doc.resources.get(&entry.idref) {
                Some(resource) => Some(archive_path(&resource.path)),
                None => {
                    warn!("Spine entry {} has no manifest item", entry.idref);
                    None
                }
            })
            .collect();
        if !spine.is_empty() {
            return spine;
        }

        let mut items: Vec<String> = doc
            .resources
            .values()
            .filter(|resource| resource.mime == XHTML_MIME)
            .map(|resource| archive_path(&resource.path))
            .collect();
        items.sort();
        debug!("Empty spine, using {} XHTML resources", items.len());
        items
    }

    fn resource(&self, path: &str) -> Option<Vec<u8>> {
        self.doc.borrow_mut().get_resource_by_path(path)
    }
}

impl SourceOpener for EpubBook {
    fn open_source(&mut self, path: &str) -> error::Result<Box<dyn TokenSource>> {
        let bytes = self
            .resource(path)
            .ok_or_else(|| ReaderError::unavailable(path, "not found in archive"))?;
        debug!("Opened {path} ({} bytes)", bytes.len());
        Ok(Box::new(XmlTokenSource::from_bytes(bytes)))
    }
}

impl ExternalOpener for EpubBook {
    /// Archive members are extracted to a temporary file first; anything
    /// else (web links, absolute paths) is handed over as is.
    fn open_external(&mut self, reference: &str) -> Result<()> {
        match self.resource(reference) {
            Some(bytes) => {
                let extracted = extract_to_temp(reference, &bytes)?;
                open::that(&extracted).with_context(|| format!("Failed to open {extracted:?}"))
            }
            None if is_absolute(reference) => {
                open::that(reference).with_context(|| format!("Failed to open {reference}"))
            }
            None => anyhow::bail!("{reference} is not in the book"),
        }
    }
}

/// One loose XHTML document read straight from disk.
#[derive(Debug, Clone)]
pub struct HtmlFile {
    path: PathBuf,
}

impl HtmlFile {
    pub fn new(path: &Path) -> Result<Self> {
        anyhow::ensure!(path.is_file(), "{path:?} is not a file");
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn info(&self) -> BookInfo {
        BookInfo {
            title: file_stem(&self.path),
            ..BookInfo::default()
        }
    }

    pub fn items(&self) -> Vec<String> {
        vec![self.path.to_string_lossy().into_owned()]
    }
}

impl SourceOpener for HtmlFile {
    fn open_source(&mut self, path: &str) -> error::Result<Box<dyn TokenSource>> {
        let file = File::open(path).map_err(|e| ReaderError::unavailable(path, e))?;
        Ok(Box::new(XmlTokenSource::new(Box::new(BufReader::new(file)))))
    }
}

impl ExternalOpener for HtmlFile {
    fn open_external(&mut self, reference: &str) -> Result<()> {
        open::that(reference).with_context(|| format!("Failed to open {reference}"))
    }
}

/// Comma-separated non-empty names, `None` when there are none.
fn join_names<'a>(names: impl Iterator<Item = &'a str>) -> Option<String> {
    let names: Vec<&str> = names.map(str::trim).filter(|name| !name.is_empty()).collect();
    (!names.is_empty()).then(|| names.join(", "))
}

fn archive_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Writes `bytes` to a kept temp file carrying the reference's extension so
/// the desktop picks a sensible viewer.
fn extract_to_temp(reference: &str, bytes: &[u8]) -> Result<PathBuf> {
    let suffix = Path::new(reference)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    let mut file = tempfile::Builder::new()
        .prefix("pageflow-")
        .suffix(&suffix)
        .tempfile()
        .context("Failed to create temp file")?;
    file.write_all(bytes)?;
    let (_, path) = file.keep().context("Failed to keep temp file")?;
    debug!("Extracted {reference} to {path:?}");
    Ok(path)
}
