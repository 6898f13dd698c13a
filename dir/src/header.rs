//! The catalog header:
//! file-set identification and file meta information
//! of a DICOMDIR file.
use crate::file_id::FileId;
use crate::{BuildMetaSnafu, InvalidFileSetIdSnafu, Result, UnsupportedTransferSyntaxSnafu};
use dicom_core::value::PrimitiveValue;
use dicom_core::{DataElement, VR};
use dicom_dictionary_std::tags;
use dicom_object::{FileMetaTable, FileMetaTableBuilder, InMemDicomObject};
use snafu::{ensure, ResultExt};

/// Media Storage Directory Storage SOP class UID,
/// the SOP class of every DICOMDIR file.
pub const MEDIA_STORAGE_DIRECTORY_STORAGE: &str = "1.2.840.10008.1.3.10";

/// Explicit VR Little Endian transfer syntax UID
pub const EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1";

/// Implicit VR Little Endian transfer syntax UID
pub const IMPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2";

/// Implementation class UID of DICOMDIR files written by this crate.
pub const IMPLEMENTATION_CLASS_UID: &str = "2.25.300215462117438729546017416815640617489";

/// Implementation version name of DICOMDIR files written by this crate.
pub const IMPLEMENTATION_VERSION_NAME: &str = "DICOMDIR-RS 0.1";

/// The maximum length of a file-set ID.
pub const MAX_FILE_SET_ID_LEN: usize = 16;

/// Identification and file meta information of a catalog.
///
/// The root record offsets are only meaningful
/// after the catalog is saved or loaded,
/// and are 0 when the catalog has no records.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogHeader {
    file_set_id: String,
    file_set_descriptor_file_id: Option<FileId>,
    descriptor_character_set: Option<String>,
    source_application_entity_title: Option<String>,
    transfer_syntax: String,
    implementation_class_uid: String,
    implementation_version_name: Option<String>,
    media_storage_sop_instance_uid: String,
    pub(crate) first_root_offset: u32,
    pub(crate) last_root_offset: u32,
    consistency_flag: u16,
}

impl Default for CatalogHeader {
    fn default() -> Self {
        CatalogHeader {
            file_set_id: String::new(),
            file_set_descriptor_file_id: None,
            descriptor_character_set: None,
            source_application_entity_title: None,
            transfer_syntax: EXPLICIT_VR_LITTLE_ENDIAN.to_string(),
            implementation_class_uid: IMPLEMENTATION_CLASS_UID.to_string(),
            implementation_version_name: Some(IMPLEMENTATION_VERSION_NAME.to_string()),
            media_storage_sop_instance_uid: new_instance_uid(),
            first_root_offset: 0,
            last_root_offset: 0,
            consistency_flag: 0,
        }
    }
}

/// Generate a new UID under the `2.25` root
/// from a random UUID.
pub fn new_instance_uid() -> String {
    format!("2.25.{}", uuid::Uuid::new_v4().as_u128())
}

fn trim_value(s: &str) -> &str {
    s.trim_matches(|c: char| c == ' ' || c == '\0')
}

/// Pad a text value to an even length.
fn even(s: &str, pad: char) -> String {
    let mut s = s.to_string();
    if s.len() % 2 == 1 {
        s.push(pad);
    }
    s
}

impl CatalogHeader {
    /// Create a header for a new file-set with the given ID.
    ///
    /// The ID is trimmed of surrounding spaces
    /// and may be empty,
    /// but cannot be longer than 16 characters.
    pub fn new(file_set_id: impl AsRef<str>) -> Result<Self> {
        let mut header = CatalogHeader::default();
        header.set_file_set_id(file_set_id)?;
        Ok(header)
    }

    /// The file-set ID
    pub fn file_set_id(&self) -> &str {
        &self.file_set_id
    }

    /// Replace the file-set ID.
    pub fn set_file_set_id(&mut self, file_set_id: impl AsRef<str>) -> Result<()> {
        let id = trim_value(file_set_id.as_ref());
        ensure!(
            id.len() <= MAX_FILE_SET_ID_LEN,
            InvalidFileSetIdSnafu { id }
        );
        self.file_set_id = id.to_string();
        Ok(())
    }

    /// The file ID of the file-set descriptor file, if any.
    pub fn file_set_descriptor_file_id(&self) -> Option<&FileId> {
        self.file_set_descriptor_file_id.as_ref()
    }

    /// The specific character set of the file-set descriptor file, if any.
    pub fn descriptor_character_set(&self) -> Option<&str> {
        self.descriptor_character_set.as_deref()
    }

    /// Set the file-set descriptor file
    /// and the character set in which it is written.
    pub fn set_file_set_descriptor(
        &mut self,
        file_id: Option<FileId>,
        character_set: Option<String>,
    ) {
        self.file_set_descriptor_file_id = file_id;
        self.descriptor_character_set = character_set;
    }

    /// The application entity title of the application writing the catalog
    pub fn source_application_entity_title(&self) -> Option<&str> {
        self.source_application_entity_title.as_deref()
    }

    /// Set the application entity title of the application writing the catalog.
    pub fn set_source_application_entity_title(&mut self, ae_title: Option<String>) {
        self.source_application_entity_title = ae_title
            .map(|s| trim_value(&s).to_string())
            .filter(|s| !s.is_empty());
    }

    /// The UID of the transfer syntax in which the catalog is encoded.
    pub fn transfer_syntax(&self) -> &str {
        &self.transfer_syntax
    }

    /// Set the transfer syntax in which the catalog is encoded.
    ///
    /// Only the explicit and implicit VR little endian
    /// transfer syntaxes are supported.
    pub fn set_transfer_syntax(&mut self, uid: impl AsRef<str>) -> Result<()> {
        let uid = trim_value(uid.as_ref());
        ensure!(
            uid == EXPLICIT_VR_LITTLE_ENDIAN || uid == IMPLICIT_VR_LITTLE_ENDIAN,
            UnsupportedTransferSyntaxSnafu { uid }
        );
        self.transfer_syntax = uid.to_string();
        Ok(())
    }

    /// Whether the catalog can be written in its transfer syntax.
    ///
    /// Catalogs read from a file keep the transfer syntax of the file,
    /// which may be one that catalogs are never written in.
    pub fn is_writable(&self) -> bool {
        self.transfer_syntax == EXPLICIT_VR_LITTLE_ENDIAN
            || self.transfer_syntax == IMPLICIT_VR_LITTLE_ENDIAN
    }

    /// Whether the catalog is encoded with explicit value representations.
    pub fn is_explicit_vr(&self) -> bool {
        self.transfer_syntax == EXPLICIT_VR_LITTLE_ENDIAN
    }

    /// The implementation class UID
    pub fn implementation_class_uid(&self) -> &str {
        &self.implementation_class_uid
    }

    /// The implementation version name
    pub fn implementation_version_name(&self) -> Option<&str> {
        self.implementation_version_name.as_deref()
    }

    /// Set the implementation identification written to the file meta group.
    pub fn set_implementation(&mut self, class_uid: String, version_name: Option<String>) {
        self.implementation_class_uid = class_uid;
        self.implementation_version_name = version_name;
    }

    /// The media storage SOP instance UID of the catalog file.
    pub fn media_storage_sop_instance_uid(&self) -> &str {
        &self.media_storage_sop_instance_uid
    }

    /// Set the media storage SOP instance UID of the catalog file.
    pub fn set_media_storage_sop_instance_uid(&mut self, uid: impl AsRef<str>) {
        self.media_storage_sop_instance_uid = trim_value(uid.as_ref()).to_string();
    }

    /// The offset of the first record of the root directory entity,
    /// or 0 if there is none.
    pub fn first_root_offset(&self) -> u32 {
        self.first_root_offset
    }

    /// The offset of the last record of the root directory entity,
    /// or 0 if there is none.
    pub fn last_root_offset(&self) -> u32 {
        self.last_root_offset
    }

    /// The file-set consistency flag.
    /// 0 means that no known inconsistencies exist.
    pub fn consistency_flag(&self) -> u16 {
        self.consistency_flag
    }

    /// Build the file meta group of the catalog file.
    pub(crate) fn meta_table(&self) -> Result<FileMetaTable> {
        let mut builder = FileMetaTableBuilder::new()
            .media_storage_sop_class_uid(MEDIA_STORAGE_DIRECTORY_STORAGE)
            .media_storage_sop_instance_uid(self.media_storage_sop_instance_uid.as_str())
            .transfer_syntax(self.transfer_syntax.as_str())
            .implementation_class_uid(self.implementation_class_uid.as_str());
        if let Some(name) = &self.implementation_version_name {
            builder = builder.implementation_version_name(even(name, ' '));
        }
        if let Some(ae_title) = &self.source_application_entity_title {
            builder = builder.source_application_entity_title(even(ae_title, ' '));
        }
        builder.build().boxed().context(BuildMetaSnafu)
    }

    /// Build the main data set of the catalog file,
    /// without the directory record sequence.
    pub(crate) fn root_data_set(&self) -> InMemDicomObject {
        let mut obj = InMemDicomObject::new_empty();
        obj.put(DataElement::new(
            tags::FILE_SET_ID,
            VR::CS,
            PrimitiveValue::from(self.file_set_id.as_str()),
        ));
        if let Some(file_id) = &self.file_set_descriptor_file_id {
            obj.put(DataElement::new(
                tags::FILE_SET_DESCRIPTOR_FILE_ID,
                VR::CS,
                PrimitiveValue::Strs(file_id.components().iter().cloned().collect()),
            ));
        }
        if let Some(charset) = &self.descriptor_character_set {
            obj.put(DataElement::new(
                tags::SPECIFIC_CHARACTER_SET_OF_FILE_SET_DESCRIPTOR_FILE,
                VR::CS,
                PrimitiveValue::from(charset.as_str()),
            ));
        }
        obj.put(DataElement::new(
            tags::OFFSET_OF_THE_FIRST_DIRECTORY_RECORD_OF_THE_ROOT_DIRECTORY_ENTITY,
            VR::UL,
            PrimitiveValue::from(self.first_root_offset),
        ));
        obj.put(DataElement::new(
            tags::OFFSET_OF_THE_LAST_DIRECTORY_RECORD_OF_THE_ROOT_DIRECTORY_ENTITY,
            VR::UL,
            PrimitiveValue::from(self.last_root_offset),
        ));
        obj.put(DataElement::new(
            tags::FILE_SET_CONSISTENCY_FLAG,
            VR::US,
            PrimitiveValue::from(self.consistency_flag),
        ));
        obj
    }

    /// Reconstruct a header from the file meta group
    /// and the main data set of a catalog file.
    pub(crate) fn from_file(meta: &FileMetaTable, root: &InMemDicomObject) -> Result<Self> {
        let string = |tag| {
            root.element(tag)
                .ok()
                .and_then(|e| e.to_str().ok())
                .map(|s| trim_value(&s).to_string())
        };
        let uint = |tag| root.element(tag).ok().and_then(|e| e.to_int::<u32>().ok());

        let mut header = CatalogHeader {
            file_set_id: string(tags::FILE_SET_ID).unwrap_or_default(),
            file_set_descriptor_file_id: root
                .element(tags::FILE_SET_DESCRIPTOR_FILE_ID)
                .ok()
                .and_then(|e| e.to_multi_str().ok())
                .and_then(|c| FileId::new(c.iter().map(|s| trim_value(s))).ok()),
            descriptor_character_set: string(
                tags::SPECIFIC_CHARACTER_SET_OF_FILE_SET_DESCRIPTOR_FILE,
            )
            .filter(|s| !s.is_empty()),
            source_application_entity_title: meta
                .source_application_entity_title
                .as_deref()
                .map(|s| trim_value(s).to_string())
                .filter(|s| !s.is_empty()),
            transfer_syntax: trim_value(&meta.transfer_syntax).to_string(),
            implementation_class_uid: trim_value(&meta.implementation_class_uid).to_string(),
            implementation_version_name: meta
                .implementation_version_name
                .as_deref()
                .map(|s| trim_value(s).to_string()),
            media_storage_sop_instance_uid: trim_value(&meta.media_storage_sop_instance_uid)
                .to_string(),
            first_root_offset: uint(
                tags::OFFSET_OF_THE_FIRST_DIRECTORY_RECORD_OF_THE_ROOT_DIRECTORY_ENTITY,
            )
            .unwrap_or(0),
            last_root_offset: uint(
                tags::OFFSET_OF_THE_LAST_DIRECTORY_RECORD_OF_THE_ROOT_DIRECTORY_ENTITY,
            )
            .unwrap_or(0),
            consistency_flag: root
                .element(tags::FILE_SET_CONSISTENCY_FLAG)
                .ok()
                .and_then(|e| e.to_int::<u16>().ok())
                .unwrap_or(0),
        };
        // validate the file-set ID read from the file as if it were set anew
        let file_set_id = std::mem::take(&mut header.file_set_id);
        header.set_file_set_id(file_set_id)?;
        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn file_set_id_is_trimmed_and_bounded() {
        let header = CatalogHeader::new("  STUDY_CD_01 ").unwrap();
        assert_eq!(header.file_set_id(), "STUDY_CD_01");

        let header = CatalogHeader::new("").unwrap();
        assert_eq!(header.file_set_id(), "");

        assert!(matches!(
            CatalogHeader::new("A_FILE_SET_ID_THAT_IS_TOO_LONG"),
            Err(Error::InvalidFileSetId { .. })
        ));
    }

    #[test]
    fn new_header_defaults() {
        let header = CatalogHeader::default();
        assert_eq!(header.transfer_syntax(), EXPLICIT_VR_LITTLE_ENDIAN);
        assert!(header.is_explicit_vr());
        assert_eq!(header.first_root_offset(), 0);
        assert_eq!(header.last_root_offset(), 0);
        assert_eq!(header.consistency_flag(), 0);
        assert!(header.media_storage_sop_instance_uid().starts_with("2.25."));
        assert!(header.media_storage_sop_instance_uid().len() <= 64);
        assert_ne!(
            header.media_storage_sop_instance_uid(),
            CatalogHeader::default().media_storage_sop_instance_uid()
        );
    }

    #[test]
    fn only_little_endian_transfer_syntaxes() {
        let mut header = CatalogHeader::default();
        header.set_transfer_syntax("1.2.840.10008.1.2\0").unwrap();
        assert!(!header.is_explicit_vr());
        // explicit VR big endian
        assert!(matches!(
            header.set_transfer_syntax("1.2.840.10008.1.2.2"),
            Err(Error::UnsupportedTransferSyntax { .. })
        ));
        assert_eq!(header.transfer_syntax(), IMPLICIT_VR_LITTLE_ENDIAN);
    }

    #[test]
    fn header_from_file_reads_root_data_set() {
        let mut header = CatalogHeader::new("CD1").unwrap();
        header.first_root_offset = 396;
        header.last_root_offset = 1210;
        header.consistency_flag = 0x7;
        let meta = header.meta_table().unwrap();
        let read = CatalogHeader::from_file(&meta, &header.root_data_set()).unwrap();
        assert_eq!(read.file_set_id(), "CD1");
        assert_eq!(read.first_root_offset(), 396);
        assert_eq!(read.last_root_offset(), 1210);
        assert_eq!(read.consistency_flag(), 0x7);
        assert!(read.is_writable());
    }

    #[test]
    fn consistency_flag_out_of_range_reads_as_zero() {
        let header = CatalogHeader::new("CD1").unwrap();
        let meta = header.meta_table().unwrap();
        let mut root = header.root_data_set();
        root.put(DataElement::new(
            tags::FILE_SET_CONSISTENCY_FLAG,
            VR::UL,
            PrimitiveValue::from(0x1_0001_u32),
        ));
        let read = CatalogHeader::from_file(&meta, &root).unwrap();
        assert_eq!(read.consistency_flag(), 0);
    }

    #[test]
    fn big_endian_header_is_read_but_not_writable() {
        let header = CatalogHeader::new("CD1").unwrap();
        let mut meta = header.meta_table().unwrap();
        meta.transfer_syntax = "1.2.840.10008.1.2.2\0".to_string();
        let mut read = CatalogHeader::from_file(&meta, &header.root_data_set()).unwrap();
        assert_eq!(read.transfer_syntax(), "1.2.840.10008.1.2.2");
        assert!(!read.is_writable());
        assert!(!read.is_explicit_vr());

        read.set_transfer_syntax(EXPLICIT_VR_LITTLE_ENDIAN).unwrap();
        assert!(read.is_writable());
    }

    #[test]
    fn meta_table_describes_a_directory() {
        let mut header = CatalogHeader::new("CD1").unwrap();
        header.set_source_application_entity_title(Some("STORE-SCP".to_string()));
        let meta = header.meta_table().unwrap();
        assert_eq!(
            meta.media_storage_sop_class_uid.trim_end_matches('\0'),
            MEDIA_STORAGE_DIRECTORY_STORAGE
        );
        assert_eq!(
            meta.transfer_syntax.trim_end_matches('\0'),
            EXPLICIT_VR_LITTLE_ENDIAN
        );
        assert_eq!(
            meta.source_application_entity_title
                .as_deref()
                .map(|s| s.trim_end()),
            Some("STORE-SCP")
        );
    }
}
