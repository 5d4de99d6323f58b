//! The OPC container: opening a `.docx`, exposing the parts the engine
//! edits, and writing the container back out.

pub mod opc;
mod part;

pub use part::{Body, Part};

use std::io::{Cursor, Read, Seek, Write};

use log::{debug, warn};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::wml;
use crate::xml::{self, Element, XmlDocument, XmlError, XmlNode};
use opc::{
    COMMENTS_CONTENT_TYPE, CONTENT_TYPES_PART, DEFAULT_MAIN_PART, PACKAGE_RELS_PART,
    REL_TYPE_COMMENTS,
};

/// Settings children that precede `w:trackRevisions` in the schema sequence.
const SETTINGS_BEFORE_TRACK_REVISIONS: &[&str] = &[
    "w:writeProtection",
    "w:view",
    "w:zoom",
    "w:removePersonalInformation",
    "w:removeDateAndTime",
    "w:doNotDisplayPageBoundaries",
    "w:displayBackgroundShape",
    "w:printPostScriptOverText",
    "w:printFractionalCharacterWidth",
    "w:printFormsData",
    "w:embedTrueTypeFonts",
    "w:embedSystemFonts",
    "w:saveSubsetFonts",
    "w:saveFormsData",
    "w:mirrorMargins",
    "w:alignBordersAndEdges",
    "w:bordersDoNotSurroundHeader",
    "w:bordersDoNotSurroundFooter",
    "w:gutterAtTop",
    "w:hideSpellingErrors",
    "w:hideGrammaticalErrors",
    "w:activeWritingStyle",
    "w:proofState",
    "w:formsDesign",
    "w:attachedTemplate",
    "w:linkStyles",
    "w:stylePaneFormatFilter",
    "w:stylePaneSortMethod",
    "w:documentType",
    "w:mailMerge",
    "w:revisionView",
];

#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("Corrupt package: {reason}")]
    CorruptPackage { reason: String },
    #[error("Failed to serialize {part}: {source}")]
    Serialize {
        part: String,
        #[source]
        source: XmlError,
    },
    #[error("Failed to write package: {0}")]
    Zip(#[from] ZipError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn corrupt(reason: impl Into<String>) -> PackageError {
    PackageError::CorruptPackage {
        reason: reason.into(),
    }
}

/// An opened word-processing package.
///
/// Holds the original container bytes so untouched entries can be copied
/// through without decompressing them.
#[derive(Debug)]
pub struct DocumentPackage {
    source: Vec<u8>,
    main_part: String,
    body: Body,
    relationships: Part,
    content_types: Part,
    comments: Option<Part>,
    settings: Option<Part>,
    id_seed: u64,
}

impl DocumentPackage {
    pub fn open(bytes: &[u8]) -> Result<Self, PackageError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| corrupt(format!("unreadable container: {e}")))?;

        let content_types = load_required(&mut archive, CONTENT_TYPES_PART, "Types")?;
        let main_part = resolve_main_part(&mut archive)?;
        let body = Body::new(load_required(&mut archive, &main_part, wml::DOCUMENT)?);
        let relationships = load_required(
            &mut archive,
            &opc::rels_part_name(&main_part),
            "Relationships",
        )?;

        let mut package = Self {
            source: bytes.to_vec(),
            main_part,
            body,
            relationships,
            content_types,
            comments: None,
            settings: None,
            id_seed: 0,
        };
        package.comments = package.load_related(&mut archive, "comments", wml::COMMENTS)?;
        package.settings = package.load_related(&mut archive, "settings", wml::SETTINGS)?;
        package.id_seed = scan_max_id(&mut archive)?.map_or(0, |max| max + 1);

        if let Some(comments) = &package.comments
            && comments.is_dirty()
        {
            // Relationship present but the part itself was missing.
            let name = comments.name().to_string();
            register_comments(
                &mut package.relationships,
                &mut package.content_types,
                opc::part_dir(&package.main_part),
                &name,
            );
        }

        debug!(
            "Opened package: main part {}, comments {}, id seed {}",
            package.main_part,
            package.comments.is_some(),
            package.id_seed
        );
        Ok(package)
    }

    /// Loads the part a main-document relationship of `kind` points at.
    fn load_related<R: Read + Seek>(
        &self,
        archive: &mut ZipArchive<R>,
        kind: &str,
        root: &str,
    ) -> Result<Option<Part>, PackageError> {
        let Some(target) =
            opc::find_relationship(self.relationships.root(), kind).and_then(|rel| rel.attr("Target"))
        else {
            return Ok(None);
        };
        let name = opc::resolve_target(opc::part_dir(&self.main_part), target);
        match read_entry(archive, &name)? {
            Some(bytes) => Ok(Some(Part::loaded(name.as_str(), parse_part(&bytes, &name, root)?))),
            None if kind == "comments" => {
                warn!("Comments relationship points at missing part {name}; recreating it");
                Ok(Some(Part::created(name, empty_comments_root())))
            }
            None => {
                warn!("Relationship {kind} points at missing part {name}");
                Ok(None)
            }
        }
    }

    pub fn main_part(&self) -> &str {
        &self.main_part
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }

    pub fn relationships(&self) -> &Part {
        &self.relationships
    }

    pub fn content_types(&self) -> &Part {
        &self.content_types
    }

    pub fn comments(&self) -> Option<&Part> {
        self.comments.as_ref()
    }

    pub fn settings(&self) -> Option<&Part> {
        self.settings.as_ref()
    }

    /// One greater than the largest numeric `*:id` in any XML part at open
    /// time, or zero when there are none.
    pub fn id_seed(&self) -> u64 {
        self.id_seed
    }

    /// Mutable access to the body together with the comment store,
    /// creating and registering the store on first use.
    pub fn body_and_comments_mut(&mut self) -> (&mut Body, &mut Part) {
        let base = opc::part_dir(&self.main_part);
        let name = opc::resolve_target(base, "comments.xml");
        if self.comments.is_none() {
            register_comments(&mut self.relationships, &mut self.content_types, base, &name);
        }
        let comments = self
            .comments
            .get_or_insert_with(|| Part::created(name, empty_comments_root()));
        (&mut self.body, comments)
    }

    /// Turns on "track changes" in the settings part so further edits made
    /// in a viewer are tracked too. Returns whether the part changed.
    pub fn enable_track_revisions(&mut self) -> bool {
        let Some(settings) = self.settings.as_mut() else {
            debug!("Package has no settings part; leaving revision tracking unchanged");
            return false;
        };
        if settings.root().find_child(wml::TRACK_REVISIONS).is_some() {
            return false;
        }
        let root = settings.root_mut();
        let index = root
            .children
            .iter()
            .rposition(|child| {
                child
                    .as_element()
                    .is_some_and(|el| SETTINGS_BEFORE_TRACK_REVISIONS.contains(&el.name.as_str()))
            })
            .map_or(0, |i| i + 1);
        root.children
            .insert(index, XmlNode::Element(Element::new(wml::TRACK_REVISIONS)));
        true
    }

    fn parts(&self) -> impl Iterator<Item = &Part> {
        [
            Some(self.body.part()),
            Some(&self.relationships),
            Some(&self.content_types),
            self.comments.as_ref(),
            self.settings.as_ref(),
        ]
        .into_iter()
        .flatten()
    }

    fn modified_part(&self, name: &str) -> Option<&Part> {
        self.parts().find(|part| part.is_dirty() && part.name() == name)
    }

    /// Reassembles the container.
    ///
    /// Entries keep their original order; unmodified ones are raw-copied
    /// with their compressed bytes intact, and parts created since opening
    /// are appended.
    pub fn save(&self) -> Result<Vec<u8>, PackageError> {
        let mut archive = ZipArchive::new(Cursor::new(self.source.as_slice()))?;
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut written = Vec::new();

        for index in 0..archive.len() {
            let file = archive.by_index_raw(index)?;
            let name = file.name().to_string();
            match self.modified_part(&name) {
                Some(part) => {
                    drop(file);
                    write_part(&mut writer, part, options)?;
                }
                None => writer.raw_copy_file(file)?,
            }
            written.push(name);
        }

        for part in self.parts().filter(|part| part.is_dirty()) {
            if !written.iter().any(|name| name == part.name()) {
                debug!("Adding new part {}", part.name());
                write_part(&mut writer, part, options)?;
            }
        }

        Ok(writer.finish()?.into_inner())
    }
}

fn write_part<W: Write + Seek>(
    writer: &mut ZipWriter<W>,
    part: &Part,
    options: SimpleFileOptions,
) -> Result<(), PackageError> {
    let bytes = part.to_bytes().map_err(|source| PackageError::Serialize {
        part: part.name().to_string(),
        source,
    })?;
    writer.start_file(part.name(), options)?;
    writer.write_all(&bytes)?;
    Ok(())
}

fn register_comments(rels: &mut Part, types: &mut Part, base_dir: &str, name: &str) {
    if opc::find_relationship(rels.root(), "comments").is_none() {
        let target = opc::relative_target(base_dir, name);
        let id = opc::add_relationship(rels.root_mut(), REL_TYPE_COMMENTS, &target);
        debug!("Registered comments relationship {id} -> {target}");
    }
    let part_name = format!("/{name}");
    if !opc::has_override(types.root(), &part_name) {
        opc::add_override(types.root_mut(), &part_name, COMMENTS_CONTENT_TYPE);
    }
}

fn empty_comments_root() -> Element {
    Element::new(wml::COMMENTS)
        .with_attr("xmlns:w", wml::W_NS)
        .with_attr("xmlns:r", wml::R_NS)
}

fn resolve_main_part<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<String, PackageError> {
    let Some(bytes) = read_entry(archive, PACKAGE_RELS_PART)? else {
        return Ok(DEFAULT_MAIN_PART.to_string());
    };
    let rels = parse_part(&bytes, PACKAGE_RELS_PART, "Relationships")?;
    Ok(opc::find_relationship(&rels.root, "officeDocument")
        .and_then(|rel| rel.attr("Target"))
        .map(|target| opc::resolve_target("", target))
        .unwrap_or_else(|| DEFAULT_MAIN_PART.to_string()))
}

fn load_required<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
    root: &str,
) -> Result<Part, PackageError> {
    let bytes = read_entry(archive, name)?.ok_or_else(|| corrupt(format!("missing part {name}")))?;
    Ok(Part::loaded(name, parse_part(&bytes, name, root)?))
}

fn parse_part(bytes: &[u8], name: &str, root: &str) -> Result<XmlDocument, PackageError> {
    XmlDocument::parse_rooted(bytes, root).map_err(|e| corrupt(format!("{name}: {e}")))
}

fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<Vec<u8>>, PackageError> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(corrupt(format!("cannot read {name}: {e}"))),
    };
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .map_err(|e| corrupt(format!("cannot read {name}: {e}")))?;
    Ok(Some(bytes))
}

fn scan_max_id<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<Option<u64>, PackageError> {
    let mut max = None;
    for index in 0..archive.len() {
        let mut file = archive
            .by_index(index)
            .map_err(|e| corrupt(format!("cannot read entry {index}: {e}")))?;
        let name = file.name().to_string();
        if !(name.ends_with(".xml") || name.ends_with(".rels")) {
            continue;
        }
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|e| corrupt(format!("cannot read {name}: {e}")))?;
        match xml::max_numeric_id(&bytes) {
            Ok(id) => max = max.max(id),
            Err(e) => warn!("Skipping {name} while scanning ids: {e}"),
        }
    }
    Ok(max)
}
