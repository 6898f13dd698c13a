//! The catalog: a DICOM directory in memory.
use crate::dictionary::{record_type_for, required_fields, Requirement};
use crate::file_id::{FileId, FileLocation};
use crate::header::CatalogHeader;
use crate::layout::{self, Layout, WriteOptions};
use crate::load::{self, LoadReport};
use crate::record::{self, DirectoryRecord, Siblings, Walk};
use crate::record_type::RecordType;
use crate::{
    CreateFileSnafu, EmptyCatalogSnafu, MissingAttributeSnafu, NoFileSetRootSnafu,
    OpenInstanceSnafu, ReadFileSnafu, ResolveRootSnafu, Result, UnsupportedRecordTypeSnafu,
};
use dicom_core::header::Length;
use dicom_core::value::{DataSetSequence, PrimitiveValue};
use dicom_core::{DataElement, Tag, VR};
use dicom_dictionary_std::tags;
use dicom_object::{FileDicomObject, InMemDicomObject, OpenFileOptions};
use snafu::{OptionExt, ResultExt};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// A DICOM directory:
/// the header of a file-set and the tree of its directory records.
///
/// A new catalog is empty.
/// Records are added by [inserting](Catalog::insert) instances,
/// and the catalog is written with [`save`](Catalog::save)
/// or [`write_to`](Catalog::write_to).
#[derive(Debug, Default)]
pub struct Catalog {
    header: CatalogHeader,
    root: Option<Box<DirectoryRecord>>,
    root_dir: Option<PathBuf>,
}

/// Identifying values of the instance being inserted,
/// one per level.
struct Keys {
    patient_id: String,
    patient_name: String,
    study_uid: String,
    series_uid: String,
    instance_uid: String,
}

fn trimmed(s: &str) -> &str {
    s.trim_matches(|c: char| c == ' ' || c == '\0')
}

fn string_of(obj: &InMemDicomObject, tag: Tag) -> Option<String> {
    let e = obj.element(tag).ok()?;
    let s = e.to_str().ok()?;
    Some(trimmed(&s).to_string())
}

fn has_value(obj: &InMemDicomObject, tag: Tag) -> bool {
    match obj.element(tag) {
        Ok(e) => match e.to_str() {
            Ok(s) => !trimmed(&s).is_empty(),
            // sequences and binary values
            Err(_) => true,
        },
        Err(_) => false,
    }
}

/// Collect the attributes of a directory record of the given type
/// from the instance being indexed.
///
/// Attributes describing the referenced file are not included.
fn record_fields(record_type: RecordType, source: &InMemDicomObject) -> Result<InMemDicomObject> {
    let mut fields = InMemDicomObject::new_empty();
    if let Ok(charset) = source.element(tags::SPECIFIC_CHARACTER_SET) {
        fields.put(charset.clone());
    }
    for field in required_fields(record_type) {
        let elem = source.element(field.tag).ok();
        match field.requirement {
            Requirement::Reference => {}
            Requirement::Required => {
                snafu::ensure!(
                    has_value(source, field.tag),
                    MissingAttributeSnafu {
                        tag: field.tag,
                        alias: field.alias,
                        record_type,
                    }
                );
                if let Some(e) = elem {
                    fields.put(e.clone());
                }
            }
            Requirement::Empty => match elem {
                Some(e) => {
                    fields.put(e.clone());
                }
                None if field.vr == VR::SQ => {
                    fields.put(DataElement::new(
                        field.tag,
                        VR::SQ,
                        DataSetSequence::new(Vec::<InMemDicomObject>::new(), Length::UNDEFINED),
                    ));
                }
                None => {
                    fields.put(DataElement::new(field.tag, field.vr, PrimitiveValue::Empty));
                }
            },
            Requirement::Optional => {
                if let Some(e) = elem {
                    fields.put(e.clone());
                }
            }
        }
    }
    Ok(fields)
}

/// Find the first record in a chain which satisfies the predicate,
/// returning the slot holding it,
/// or the empty slot at the end of the chain.
fn slot_of<F>(
    mut slot: &mut Option<Box<DirectoryRecord>>,
    is_match: F,
) -> &mut Option<Box<DirectoryRecord>>
where
    F: Fn(&DirectoryRecord) -> bool,
{
    let (position, len) = match slot.as_deref() {
        Some(first) => (
            first.siblings().position(|r| is_match(r)),
            first.siblings().count(),
        ),
        None => (None, 0),
    };
    for _ in 0..position.unwrap_or(len) {
        if let Some(record) = slot {
            slot = &mut record.next;
        }
    }
    slot
}

/// Descend into the record of a chain matching the predicate,
/// appending `record` to the chain if there is none.
fn find_or_append<F>(
    slot: &mut Option<Box<DirectoryRecord>>,
    is_match: F,
    record: DirectoryRecord,
) -> &mut DirectoryRecord
where
    F: Fn(&DirectoryRecord) -> bool,
{
    let slot = slot_of(slot, is_match);
    if slot.is_none() {
        tracing::debug!("Adding {} record", record.record_type());
    }
    slot.get_or_insert_with(|| Box::new(record))
}

/// The directory containing the given file.
fn parent_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

fn warn_nonconformant(file_id: &FileId) {
    if !file_id.is_conformant() {
        tracing::warn!(
            "Referenced file ID {} does not follow the media storage naming rules",
            file_id
        );
    }
}

fn absolute_dir(dir: &Path) -> Result<PathBuf> {
    if dir.is_absolute() {
        return Ok(dir.to_path_buf());
    }
    let cwd = std::env::current_dir().context(ResolveRootSnafu { path: dir })?;
    Ok(cwd.join(dir))
}

impl Catalog {
    /// Create an empty catalog for a new file-set with the given ID.
    pub fn new(file_set_id: impl AsRef<str>) -> Result<Self> {
        Ok(Catalog::with_header(CatalogHeader::new(file_set_id)?))
    }

    /// Create an empty catalog with the given header.
    ///
    /// Root record offsets in the header are recomputed on save.
    pub fn with_header(header: CatalogHeader) -> Self {
        Catalog {
            header,
            root: None,
            root_dir: None,
        }
    }

    /// Set the file-set root directory,
    /// against which paths of inserted files are resolved.
    ///
    /// Without one, files inserted by absolute path
    /// are referenced relative to the directory the catalog is saved in.
    pub fn with_root_dir(mut self, root_dir: impl Into<PathBuf>) -> Self {
        self.root_dir = Some(root_dir.into());
        self
    }

    /// The file-set root directory, if known.
    pub fn root_dir(&self) -> Option<&Path> {
        self.root_dir.as_deref()
    }

    /// Set or clear the file-set root directory.
    pub fn set_root_dir(&mut self, root_dir: Option<PathBuf>) {
        self.root_dir = root_dir;
    }

    /// The catalog header.
    pub fn header(&self) -> &CatalogHeader {
        &self.header
    }

    /// Mutable access to the catalog header.
    pub fn header_mut(&mut self) -> &mut CatalogHeader {
        &mut self.header
    }

    /// The first record of the root directory entity.
    pub fn root(&self) -> Option<&DirectoryRecord> {
        self.root.as_deref()
    }

    /// Iterate over the records of the root directory entity,
    /// usually patient records.
    pub fn root_records(&self) -> Siblings<'_> {
        Siblings::new(self.root())
    }

    /// Iterate over all records with their depth in the tree,
    /// in the order in which they are written to the file.
    pub fn walk(&self) -> Walk<'_> {
        Walk::new(self.root())
    }

    /// Iterate over all records,
    /// in the order in which they are written to the file.
    pub fn records(&self) -> impl Iterator<Item = &DirectoryRecord> {
        self.walk().map(|(_, record)| record)
    }

    /// The number of records in the catalog.
    pub fn len(&self) -> usize {
        self.walk().count()
    }

    /// Whether the catalog has no records.
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Index an instance in the catalog.
    ///
    /// `fields` is the data set of the instance,
    /// `transfer_syntax` the UID of the transfer syntax of its file,
    /// and `location` where the file is
    /// (see [`FileLocation`]).
    ///
    /// Patient, study and series records for the instance are created
    /// if the catalog does not have them yet.
    /// Indexing an instance which is already in the catalog does nothing.
    /// On error, the catalog is left unchanged.
    pub fn insert(
        &mut self,
        fields: &InMemDicomObject,
        transfer_syntax: &str,
        location: impl Into<FileLocation>,
    ) -> Result<()> {
        let sop_class_uid = string_of(fields, tags::SOP_CLASS_UID).unwrap_or_default();
        let sop_instance_uid = string_of(fields, tags::SOP_INSTANCE_UID).unwrap_or_default();
        self.insert_impl(
            fields,
            &sop_class_uid,
            &sop_instance_uid,
            transfer_syntax,
            location.into(),
        )
    }

    /// Index a DICOM object read from a file.
    ///
    /// The transfer syntax is taken from the file meta group,
    /// as are the SOP class and instance UIDs
    /// when missing from the data set.
    pub fn insert_object(
        &mut self,
        obj: &FileDicomObject<InMemDicomObject>,
        location: impl Into<FileLocation>,
    ) -> Result<()> {
        let meta = obj.meta();
        let fields: &InMemDicomObject = obj;
        let sop_class_uid = string_of(fields, tags::SOP_CLASS_UID)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| trimmed(&meta.media_storage_sop_class_uid).to_string());
        let sop_instance_uid = string_of(fields, tags::SOP_INSTANCE_UID)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| trimmed(&meta.media_storage_sop_instance_uid).to_string());
        let transfer_syntax = trimmed(&meta.transfer_syntax).to_string();
        self.insert_impl(
            fields,
            &sop_class_uid,
            &sop_instance_uid,
            &transfer_syntax,
            location.into(),
        )
    }

    /// Open a DICOM file and index it in the catalog.
    ///
    /// Relative paths are resolved against the file-set root directory,
    /// if there is one.
    /// Absolute paths in a catalog without a root directory
    /// get their file ID when the catalog is saved.
    /// The file is read up to the pixel data.
    pub fn insert_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let full_path = match &self.root_dir {
            Some(root_dir) if path.is_relative() => root_dir.join(path),
            _ => path.to_path_buf(),
        };
        let obj = OpenFileOptions::new()
            .read_until(tags::PIXEL_DATA)
            .open_file(&full_path)
            .boxed()
            .context(OpenInstanceSnafu { path: &full_path })?;
        self.insert_object(&obj, path)
    }

    fn insert_impl(
        &mut self,
        fields: &InMemDicomObject,
        sop_class_uid: &str,
        sop_instance_uid: &str,
        transfer_syntax: &str,
        location: FileLocation,
    ) -> Result<()> {
        let record_type = record_type_for(sop_class_uid).context(UnsupportedRecordTypeSnafu {
            sop_class_uid,
        })?;
        snafu::ensure!(
            !sop_instance_uid.is_empty(),
            MissingAttributeSnafu {
                tag: tags::SOP_INSTANCE_UID,
                alias: "SOPInstanceUID",
                record_type,
            }
        );

        let (file_id, pending_file) = match location {
            FileLocation::Path(path) if path.is_absolute() && self.root_dir.is_none() => {
                (None, Some(path))
            }
            FileLocation::Path(path) => {
                (Some(FileId::from_path(&path, self.root_dir.as_deref())?), None)
            }
            FileLocation::FileId(file_id) => (Some(file_id), None),
        };
        if let Some(file_id) = &file_id {
            warn_nonconformant(file_id);
        }

        // prepare every record before touching the tree
        let patient = record_fields(RecordType::Patient, fields)?;
        let study = record_fields(RecordType::Study, fields)?;
        let series = record_fields(RecordType::Series, fields)?;
        let mut instance = record_fields(record_type, fields)?;
        for field in required_fields(record_type) {
            if field.requirement != Requirement::Reference {
                continue;
            }
            let value = match field.tag {
                tags::REFERENCED_FILE_ID => match &file_id {
                    Some(file_id) => {
                        PrimitiveValue::Strs(file_id.components().iter().cloned().collect())
                    }
                    None => continue,
                },
                tags::REFERENCED_SOP_CLASS_UID_IN_FILE => PrimitiveValue::from(sop_class_uid),
                tags::REFERENCED_SOP_INSTANCE_UID_IN_FILE => {
                    PrimitiveValue::from(sop_instance_uid)
                }
                tags::REFERENCED_TRANSFER_SYNTAX_UID_IN_FILE => {
                    PrimitiveValue::from(trimmed(transfer_syntax))
                }
                _ => continue,
            };
            instance.put(DataElement::new(field.tag, field.vr, value));
        }

        let keys = Keys {
            patient_id: string_of(fields, tags::PATIENT_ID).unwrap_or_default(),
            patient_name: string_of(fields, tags::PATIENT_NAME).unwrap_or_default(),
            study_uid: string_of(fields, tags::STUDY_INSTANCE_UID).unwrap_or_default(),
            series_uid: string_of(fields, tags::SERIES_INSTANCE_UID).unwrap_or_default(),
            instance_uid: sop_instance_uid.to_string(),
        };

        let patient = find_or_append(
            &mut self.root,
            |r| {
                r.record_type() == RecordType::Patient
                    && r.string(tags::PATIENT_ID).unwrap_or_default() == keys.patient_id
                    && r.string(tags::PATIENT_NAME).unwrap_or_default() == keys.patient_name
            },
            DirectoryRecord::new(RecordType::Patient, patient),
        );
        let study = find_or_append(
            &mut patient.child,
            |r| r.string(tags::STUDY_INSTANCE_UID).as_deref() == Some(keys.study_uid.as_str()),
            DirectoryRecord::new(RecordType::Study, study),
        );
        let series = find_or_append(
            &mut study.child,
            |r| r.string(tags::SERIES_INSTANCE_UID).as_deref() == Some(keys.series_uid.as_str()),
            DirectoryRecord::new(RecordType::Series, series),
        );
        let mut instance = DirectoryRecord::new(record_type, instance);
        if let Some(path) = pending_file {
            tracing::debug!("File ID of {} is resolved on save", path.display());
            instance.set_pending_file(path);
        }
        find_or_append(
            &mut series.child,
            |r| {
                r.string(tags::REFERENCED_SOP_INSTANCE_UID_IN_FILE).as_deref()
                    == Some(keys.instance_uid.as_str())
            },
            instance,
        );
        Ok(())
    }

    /// Derive the file IDs of the records with a pending file
    /// relative to the given root directory.
    ///
    /// On error, no record is changed.
    fn resolve_pending_files(&mut self, root_dir: &Path) -> Result<()> {
        let file_ids = self
            .records()
            .filter_map(|r| r.pending_file())
            .map(|path| FileId::from_path(path, Some(root_dir)))
            .collect::<Result<Vec<_>>>()?;
        if file_ids.is_empty() {
            return Ok(());
        }
        let mut file_ids = file_ids.into_iter();
        if let Some(root) = self.root.as_deref_mut() {
            record::for_each_mut(root, &mut |record: &mut DirectoryRecord| {
                if record.pending_file().is_none() {
                    return;
                }
                if let Some(file_id) = file_ids.next() {
                    warn_nonconformant(&file_id);
                    record.resolve_file_id(&file_id);
                }
            });
        }
        Ok(())
    }

    /// Resolve pending files against the file-set root directory,
    /// failing if there are pending files and no root directory.
    fn resolve_against_root_dir(&mut self) -> Result<()> {
        match self.root_dir.as_deref() {
            Some(root_dir) => {
                let root_dir = absolute_dir(root_dir)?;
                self.resolve_pending_files(&root_dir)
            }
            None => match self.records().find_map(|r| r.pending_file()) {
                Some(path) => NoFileSetRootSnafu { path }.fail(),
                None => Ok(()),
            },
        }
    }

    /// Compute the layout of the catalog file,
    /// updating the offsets of every record and of the header.
    ///
    /// Fails if the catalog has no records,
    /// or if it references files by absolute path
    /// and has no file-set root directory.
    pub fn layout(&mut self, options: WriteOptions) -> Result<Layout> {
        self.resolve_against_root_dir()?;
        let root = self.root.as_deref_mut().context(EmptyCatalogSnafu)?;
        layout::compute(&mut self.header, root, options)
    }

    /// Write the catalog file to the given writer,
    /// returning its layout.
    ///
    /// Fails if the catalog has no records,
    /// or if it references files by absolute path
    /// and has no file-set root directory.
    pub fn write_to<W>(&mut self, to: W, options: WriteOptions) -> Result<Layout>
    where
        W: Write,
    {
        self.resolve_against_root_dir()?;
        let root = self.root.as_deref_mut().context(EmptyCatalogSnafu)?;
        layout::write(&mut self.header, root, options, to)
    }

    /// Write the catalog to a new file at the given path,
    /// with the default options.
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<Layout> {
        self.save_with_options(path, WriteOptions::default())
    }

    /// Write the catalog to a new file at the given path.
    ///
    /// If the catalog has no file-set root directory,
    /// the directory of the new file becomes its root,
    /// and files inserted by absolute path must be inside it.
    pub fn save_with_options(
        &mut self,
        path: impl AsRef<Path>,
        options: WriteOptions,
    ) -> Result<Layout> {
        let path = path.as_ref();
        snafu::ensure!(self.root.is_some(), EmptyCatalogSnafu);
        let new_root_dir = match self.root_dir {
            Some(_) => None,
            None => {
                let root_dir = absolute_dir(parent_dir(path))?;
                self.resolve_pending_files(&root_dir)?;
                Some(root_dir)
            }
        };
        let file = File::create(path).context(CreateFileSnafu { path })?;
        let layout = self.write_to(BufWriter::new(file), options)?;
        if new_root_dir.is_some() {
            self.root_dir = new_root_dir;
        }
        Ok(layout)
    }

    /// Read a catalog from the contents of a catalog file.
    pub fn load(bytes: &[u8]) -> Result<Self> {
        Catalog::load_with_report(bytes).map(|(catalog, _)| catalog)
    }

    /// Read a catalog from the contents of a catalog file,
    /// also reporting the links between records
    /// which could not be resolved.
    pub fn load_with_report(bytes: &[u8]) -> Result<(Self, LoadReport)> {
        let loaded = load::read_catalog(bytes)?;
        tracing::debug!(
            records = loaded.report.records,
            clean = loaded.report.is_clean(),
            "Loaded catalog"
        );
        let catalog = Catalog {
            header: loaded.header,
            root: loaded.root.map(Box::new),
            root_dir: None,
        };
        Ok((catalog, loaded.report))
    }

    /// Read a catalog from a reader,
    /// which is read to the end.
    pub fn from_reader<R>(mut reader: R) -> Result<Self>
    where
        R: Read,
    {
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .context(crate::IoSnafu)?;
        Catalog::load(&bytes)
    }

    /// Open a catalog file.
    ///
    /// The directory containing the file
    /// becomes the file-set root directory of the catalog.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Catalog::open_with_report(path).map(|(catalog, _)| catalog)
    }

    /// Open a catalog file,
    /// also reporting the links between records
    /// which could not be resolved.
    pub fn open_with_report(path: impl AsRef<Path>) -> Result<(Self, LoadReport)> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).context(ReadFileSnafu { path })?;
        let (mut catalog, report) = Catalog::load_with_report(&bytes)?;
        catalog.root_dir = Some(parent_dir(path).to_path_buf());
        Ok((catalog, report))
    }

    /// Replace the contents of this catalog
    /// with the catalog in the given file contents.
    ///
    /// The file-set root directory is kept.
    /// On error, the catalog is left unchanged.
    pub fn reload(&mut self, bytes: &[u8]) -> Result<LoadReport> {
        let (catalog, report) = Catalog::load_with_report(bytes)?;
        self.header = catalog.header;
        self.root = catalog.root;
        Ok(report)
    }
}
