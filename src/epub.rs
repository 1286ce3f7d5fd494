//! EPUB container reader – ZIP archive, `META-INF/container.xml` and the OPF
//! package document (metadata, manifest, spine).

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use percent_encoding::percent_decode_str;
use zip::ZipArchive;

use crate::error::ContainerError;

pub const CONTAINER_PATH: &str = "META-INF/container.xml";
pub const DC_NAMESPACE: &str = "http://purl.org/dc/elements/1.1/";

/// One `<dc:*>` (or other) entry of the package metadata block.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataEntry {
    pub namespace: Option<String>,
    pub name: String,
    pub value: String,
}

/// One `<item>` of the package manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestItem {
    pub id: String,
    /// The href as written in the manifest.
    pub href: String,
    /// Archive entry name the href resolves to.
    pub path: String,
    pub media_type: String,
    pub properties: Vec<String>,
}

impl ManifestItem {
    /// Renderable markup, as opposed to images, stylesheets or fonts.
    pub fn is_document(&self) -> bool {
        matches!(
            self.media_type.trim().to_ascii_lowercase().as_str(),
            "application/xhtml+xml" | "text/html"
        )
    }

    /// The EPUB 3 navigation document.
    pub fn is_navigation(&self) -> bool {
        self.properties.iter().any(|p| p == "nav")
    }
}

/// An opened EPUB with its package document already parsed.
pub struct EpubArchive<R: Read + Seek> {
    archive: ZipArchive<R>,
    package_path: String,
    metadata: Vec<MetadataEntry>,
    manifest: Vec<ManifestItem>,
    spine: Vec<String>,
}

impl EpubArchive<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ContainerError> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(BufReader::new(file))
    }
}

impl<R: Read + Seek> EpubArchive<R> {
    pub fn from_reader(reader: R) -> Result<Self, ContainerError> {
        let mut archive =
            ZipArchive::new(reader).map_err(|e| ContainerError::Archive(e.to_string()))?;

        let container = read_entry_string(&mut archive, CONTAINER_PATH)?;
        let package_path = parse_container(&container)?;
        let package = read_entry_string(&mut archive, &package_path)?;
        let opf = parse_package(&package, &package_path)?;

        Ok(Self {
            archive,
            package_path,
            metadata: opf.metadata,
            manifest: opf.manifest,
            spine: opf.spine,
        })
    }

    pub fn package_path(&self) -> &str {
        &self.package_path
    }

    /// All metadata values for `namespace` + `field`, in document order.
    pub fn metadata(&self, namespace: &str, field: &str) -> Vec<&str> {
        self.metadata
            .iter()
            .filter(|m| m.namespace.as_deref() == Some(namespace) && m.name == field)
            .map(|m| m.value.as_str())
            .collect()
    }

    /// The first non-blank value for a Dublin Core field.
    pub fn dublin_core(&self, field: &str) -> Option<String> {
        self.metadata(DC_NAMESPACE, field)
            .into_iter()
            .map(str::trim)
            .find(|v| !v.is_empty())
            .map(str::to_string)
    }

    pub fn manifest(&self) -> &[ManifestItem] {
        &self.manifest
    }

    /// Spine idrefs in reading order.
    pub fn spine(&self) -> &[String] {
        &self.spine
    }

    /// Document items in reading order: spine first, then any remaining
    /// manifest documents. The navigation document is left out.
    pub fn document_items(&self) -> Vec<ManifestItem> {
        let mut ordered: Vec<ManifestItem> = Vec::new();
        let wanted = |item: &ManifestItem| item.is_document() && !item.is_navigation();

        for idref in &self.spine {
            if let Some(item) = self.manifest.iter().find(|i| &i.id == idref) {
                if wanted(item) && !ordered.iter().any(|o| o.id == item.id) {
                    ordered.push(item.clone());
                }
            }
        }
        for item in &self.manifest {
            if wanted(item) && !ordered.iter().any(|o| o.id == item.id) {
                ordered.push(item.clone());
            }
        }
        ordered
    }

    /// Raw bytes of a manifest item.
    pub fn read_item(&mut self, item: &ManifestItem) -> Result<Vec<u8>, ContainerError> {
        read_entry(&mut self.archive, &item.path)
    }
}

fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Vec<u8>, ContainerError> {
    let mut file = archive
        .by_name(name)
        .map_err(|_| ContainerError::MissingEntry(name.to_string()))?;
    let mut content = Vec::new();
    file.read_to_end(&mut content)?;
    Ok(content)
}

fn read_entry_string<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<String, ContainerError> {
    let bytes = read_entry(archive, name)?;
    Ok(String::from_utf8_lossy(&bytes)
        .trim_start_matches('\u{feff}')
        .to_string())
}

fn parse_xml<'a>(content: &'a str, path: &str) -> Result<roxmltree::Document<'a>, ContainerError> {
    let mut options = roxmltree::ParsingOptions::default();
    options.allow_dtd = true;
    roxmltree::Document::parse_with_options(content, options).map_err(|e| ContainerError::Xml {
        path: path.to_string(),
        message: e.to_string(),
    })
}

/// Path of the package document named by `container.xml`.
fn parse_container(content: &str) -> Result<String, ContainerError> {
    let doc = parse_xml(content, CONTAINER_PATH)?;
    doc.descendants()
        .filter(|n| n.tag_name().name() == "rootfile")
        .filter_map(|n| n.attribute("full-path"))
        .map(|p| p.trim().trim_start_matches('/').to_string())
        .find(|p| !p.is_empty())
        .ok_or(ContainerError::MissingRootfile)
}

#[derive(Debug)]
struct ParsedPackage {
    metadata: Vec<MetadataEntry>,
    manifest: Vec<ManifestItem>,
    spine: Vec<String>,
}

fn parse_package(content: &str, package_path: &str) -> Result<ParsedPackage, ContainerError> {
    let doc = parse_xml(content, package_path)?;
    let base_dir = match package_path.rfind('/') {
        Some(idx) => &package_path[..=idx],
        None => "",
    };

    let metadata = doc
        .descendants()
        .find(|n| n.tag_name().name() == "metadata")
        .map(|meta| {
            meta.descendants()
                .filter(|n| n.is_element() && n != &meta)
                .filter_map(|n| {
                    let value: String = n
                        .children()
                        .filter(|c| c.is_text())
                        .filter_map(|c| c.text())
                        .collect();
                    let value = value.trim();
                    (!value.is_empty()).then(|| MetadataEntry {
                        namespace: n.tag_name().namespace().map(str::to_string),
                        name: n.tag_name().name().to_string(),
                        value: value.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let manifest_node = doc
        .descendants()
        .find(|n| n.tag_name().name() == "manifest")
        .ok_or(ContainerError::MissingManifest)?;

    let manifest = manifest_node
        .children()
        .filter(|n| n.tag_name().name() == "item")
        .filter_map(|n| {
            let id = n.attribute("id")?;
            let href = n.attribute("href")?;
            Some(ManifestItem {
                id: id.to_string(),
                href: href.to_string(),
                path: resolve_href(base_dir, href),
                media_type: n.attribute("media-type").unwrap_or_default().to_string(),
                properties: n
                    .attribute("properties")
                    .map(|p| p.split_whitespace().map(str::to_string).collect())
                    .unwrap_or_default(),
            })
        })
        .collect();

    let spine = doc
        .descendants()
        .filter(|n| n.tag_name().name() == "itemref")
        .filter_map(|n| n.attribute("idref"))
        .map(str::to_string)
        .collect();

    Ok(ParsedPackage {
        metadata,
        manifest,
        spine,
    })
}

/// Resolve a manifest href against the package directory: drop any fragment,
/// decode percent-escapes and fold `.` / `..` segments.
pub fn resolve_href(base_dir: &str, href: &str) -> String {
    let href = href.split('#').next().unwrap_or(href);
    let decoded = percent_decode_str(href).decode_utf8_lossy();

    let joined = if decoded.starts_with('/') {
        decoded.trim_start_matches('/').to_string()
    } else {
        format!("{base_dir}{decoded}")
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}
