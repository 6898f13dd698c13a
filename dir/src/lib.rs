//! This crate implements reading and writing of DICOM media storage directories,
//! the `DICOMDIR` files which index the instances of a DICOM file-set.
//!
//! A [`Catalog`] holds the directory records of a file-set
//! as a tree of [`DirectoryRecord`]s,
//! organized in patient, study, series and instance levels.
//! Instances are added one at a time with [`Catalog::insert`]
//! (or [`Catalog::insert_file`]),
//! which creates the missing upper level records
//! and reuses the ones already in the catalog.
//!
//! When saved, the tree is flattened into the directory record sequence
//! and the links between records are written as absolute byte offsets
//! into the file.
//! Loading a catalog resolves those offsets back into a tree.
//!
//! # Examples
//!
//! Build a catalog for the files in a directory:
//!
//! ```no_run
//! use dicom_dir::Catalog;
//! # fn run() -> Result<(), dicom_dir::Error> {
//! let mut catalog = Catalog::new("MY_FILE_SET")?.with_root_dir("/media/cdrom");
//! catalog.insert_file("/media/cdrom/DICOM/IM0001")?;
//! catalog.insert_file("/media/cdrom/DICOM/IM0002")?;
//! catalog.save("/media/cdrom/DICOMDIR")?;
//! # Ok(())
//! # }
//! ```
//!
//! Read an existing catalog and list the files it references:
//!
//! ```no_run
//! use dicom_dir::{Catalog, RecordType};
//! # fn run() -> Result<(), dicom_dir::Error> {
//! let catalog = Catalog::open("/media/cdrom/DICOMDIR")?;
//! for record in catalog.records() {
//!     if let Some(file_id) = record.referenced_file_id() {
//!         println!("{}: {}", record.record_type(), file_id);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
use dicom_core::Tag;
use snafu::Snafu;
use std::path::PathBuf;

pub mod catalog;
pub mod dictionary;
pub mod file_id;
pub mod header;
pub mod layout;
pub mod load;
pub mod record;
pub mod record_type;

pub use crate::catalog::Catalog;
pub use crate::dictionary::{record_type_for, required_fields, FieldSpec, Requirement};
pub use crate::file_id::{FileId, FileLocation};
pub use crate::header::CatalogHeader;
pub use crate::layout::{LengthEncoding, Layout, LayoutEntry, WriteOptions};
pub use crate::load::{DroppedLink, LinkKind, LoadReport};
pub use crate::record::DirectoryRecord;
pub use crate::record_type::RecordType;

type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// An error which may occur when building, writing or reading a catalog.
#[derive(Debug, Snafu)]
#[non_exhaustive]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// Instances of SOP class `{sop_class_uid}` cannot be indexed in a catalog
    UnsupportedRecordType { sop_class_uid: String },

    /// Missing attribute {alias} {tag} required for a {record_type} record
    MissingAttribute {
        tag: Tag,
        alias: &'static str,
        record_type: RecordType,
    },

    /// Catalog has no records to write
    EmptyCatalog,

    /// Directory record sequence not found in the data set
    MissingRecordSequence,

    /// No directory record at root record offset {offset}
    DanglingRootOffset { offset: u32 },

    /// Invalid file-set ID `{id}`: more than 16 characters
    InvalidFileSetId { id: String },

    /// Invalid referenced file ID `{id}`: {reason}
    InvalidFileId { id: String, reason: &'static str },

    #[snafu(display(
        "Cannot reference absolute path {} without a file-set root directory",
        path.display()
    ))]
    NoFileSetRoot { path: PathBuf },

    #[snafu(display(
        "File {} is outside of the file-set root directory {}",
        path.display(),
        root.display()
    ))]
    OutsideFileSet { path: PathBuf, root: PathBuf },

    /// Unsupported transfer syntax `{uid}`
    UnsupportedTransferSyntax { uid: String },

    /// Not a DICOM file: missing DICM magic code
    NotDicom,

    /// Could not build the file meta group
    BuildMeta { source: BoxedError },

    /// Could not write the file meta group
    WriteMeta { source: BoxedError },

    /// Could not read the file meta group
    ReadMeta { source: BoxedError },

    /// Could not encode the catalog header
    EncodeHeader { source: BoxedError },

    /// Could not encode directory record #{index}
    EncodeRecord { index: usize, source: BoxedError },

    /// Could not read the catalog data set
    ReadDataSet { source: BoxedError },

    /// Unexpected token {token} in the catalog data set
    UnexpectedToken { token: String },

    #[snafu(display("Could not open instance file {}", path.display()))]
    OpenInstance { path: PathBuf, source: BoxedError },

    /// Directory record #{index} encoded to {actual} bytes instead of {expected}
    LayoutMismatch {
        index: usize,
        expected: u64,
        actual: u64,
    },

    /// Catalog is too large for 32-bit record offsets
    OffsetOverflow,

    /// Could not write catalog data
    Io { source: std::io::Error },

    #[snafu(display("Could not create file {}", path.display()))]
    CreateFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Could not read file {}", path.display()))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Could not resolve file-set root directory {}", path.display()))]
    ResolveRoot {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
