//! Directory records, the nodes of a catalog tree.
//!
//! Records at the same level of the hierarchy are chained
//! through their `next` relation,
//! while the `child` relation points to the first record
//! of the lower level entity.
//! Both relations are owned,
//! so a catalog tree is owned top-down by its root record.
use crate::file_id::FileId;
use crate::record_type::RecordType;
use dicom_core::value::PrimitiveValue;
use dicom_core::{DataElement, Tag, VR};
use dicom_dictionary_std::tags;
use dicom_object::InMemDicomObject;
use std::path::{Path, PathBuf};

/// Value of the record in-use flag for records in use.
pub const RECORD_IN_USE: u16 = 0xFFFF;

/// A single entry of a DICOM directory.
#[derive(Debug)]
pub struct DirectoryRecord {
    record_type: RecordType,
    fields: InMemDicomObject,
    offset: Option<u32>,
    pending_file: Option<PathBuf>,
    pub(crate) next: Option<Box<DirectoryRecord>>,
    pub(crate) child: Option<Box<DirectoryRecord>>,
}

impl DirectoryRecord {
    /// Create a new record of the given type with the given attributes.
    ///
    /// The directory record structure attributes
    /// (next and lower-level offsets, in-use flag and record type)
    /// are added to the field set.
    /// Offsets stay at 0 until the catalog is saved.
    pub fn new(record_type: RecordType, mut fields: InMemDicomObject) -> Self {
        fields.put(DataElement::new(
            tags::OFFSET_OF_THE_NEXT_DIRECTORY_RECORD,
            VR::UL,
            PrimitiveValue::from(0_u32),
        ));
        fields.put(DataElement::new(
            tags::RECORD_IN_USE_FLAG,
            VR::US,
            PrimitiveValue::from(RECORD_IN_USE),
        ));
        fields.put(DataElement::new(
            tags::OFFSET_OF_REFERENCED_LOWER_LEVEL_DIRECTORY_ENTITY,
            VR::UL,
            PrimitiveValue::from(0_u32),
        ));
        fields.put(DataElement::new(
            tags::DIRECTORY_RECORD_TYPE,
            VR::CS,
            PrimitiveValue::from(record_type.as_str()),
        ));
        DirectoryRecord {
            record_type,
            fields,
            offset: None,
            pending_file: None,
            next: None,
            child: None,
        }
    }

    /// Create a record out of a field set read from a file,
    /// which was found at the given offset.
    pub(crate) fn from_file(fields: InMemDicomObject, offset: u32) -> Self {
        let record_type = fields
            .element(tags::DIRECTORY_RECORD_TYPE)
            .ok()
            .and_then(|e| e.to_str().ok())
            .map(|code| RecordType::from_code_lossy(&code))
            .unwrap_or(RecordType::Private);
        DirectoryRecord {
            record_type,
            fields,
            offset: Some(offset),
            pending_file: None,
            next: None,
            child: None,
        }
    }

    /// The type of this record.
    pub fn record_type(&self) -> RecordType {
        self.record_type
    }

    /// The attributes of this record,
    /// including the directory record structure attributes.
    pub fn fields(&self) -> &InMemDicomObject {
        &self.fields
    }

    /// Mutable access to the attributes of this record.
    ///
    /// Offset attributes are recomputed on save,
    /// so changes to them have no lasting effect.
    pub fn fields_mut(&mut self) -> &mut InMemDicomObject {
        &mut self.fields
    }

    /// The absolute position of this record in the catalog file,
    /// if the record was saved or loaded.
    pub fn offset(&self) -> Option<u32> {
        self.offset
    }

    pub(crate) fn set_offset(&mut self, offset: u32) {
        self.offset = Some(offset);
    }

    /// The next record at the same level.
    pub fn next(&self) -> Option<&DirectoryRecord> {
        self.next.as_deref()
    }

    /// The first record of the lower level entity.
    pub fn child(&self) -> Option<&DirectoryRecord> {
        self.child.as_deref()
    }

    /// Iterate over this record and the records following it
    /// at the same level.
    pub fn siblings(&self) -> Siblings<'_> {
        Siblings::new(Some(self))
    }

    /// Iterate over the records of the lower level entity.
    pub fn children(&self) -> Siblings<'_> {
        Siblings::new(self.child())
    }

    /// Retrieve the value of a string attribute,
    /// with surrounding padding removed.
    pub fn string(&self, tag: Tag) -> Option<String> {
        let e = self.fields.element(tag).ok()?;
        let s = e.to_str().ok()?;
        Some(s.trim_matches(|c: char| c == ' ' || c == '\0').to_string())
    }

    /// Retrieve the value of an offset attribute.
    pub(crate) fn offset_field(&self, tag: Tag) -> Option<u32> {
        self.fields.element(tag).ok()?.to_int::<u32>().ok()
    }

    /// The referenced file ID of this record, if it references a file.
    pub fn referenced_file_id(&self) -> Option<FileId> {
        let e = self.fields.element(tags::REFERENCED_FILE_ID).ok()?;
        let components = e.to_multi_str().ok()?;
        FileId::new(
            components
                .iter()
                .map(|c| c.trim_matches(|c: char| c == ' ' || c == '\0')),
        )
        .ok()
    }

    /// The path of the file referenced by this record,
    /// if its file ID is not known yet.
    ///
    /// Files inserted by absolute path into a catalog
    /// with no file-set root directory
    /// get their file ID when the catalog is saved.
    pub fn pending_file(&self) -> Option<&Path> {
        self.pending_file.as_deref()
    }

    pub(crate) fn set_pending_file(&mut self, path: PathBuf) {
        self.pending_file = Some(path);
    }

    /// Store the file ID of the pending file.
    pub(crate) fn resolve_file_id(&mut self, file_id: &FileId) {
        self.fields.put(DataElement::new(
            tags::REFERENCED_FILE_ID,
            VR::CS,
            PrimitiveValue::Strs(file_id.components().iter().cloned().collect()),
        ));
        self.pending_file = None;
    }

    /// Set the offset and relation attributes of this record.
    pub(crate) fn put_offset_fields(&mut self, next: u32, child: u32) {
        self.fields.put(DataElement::new(
            tags::OFFSET_OF_THE_NEXT_DIRECTORY_RECORD,
            VR::UL,
            PrimitiveValue::from(next),
        ));
        self.fields.put(DataElement::new(
            tags::OFFSET_OF_REFERENCED_LOWER_LEVEL_DIRECTORY_ENTITY,
            VR::UL,
            PrimitiveValue::from(child),
        ));
    }

    /// Attach a record to the end of the lower level entity,
    /// returning a reference to it.
    #[cfg(test)]
    pub(crate) fn push_child(&mut self, record: DirectoryRecord) -> &mut DirectoryRecord {
        append(&mut self.child, record)
    }

    /// Attach a record to the end of this record's sibling chain,
    /// returning a reference to it.
    #[cfg(test)]
    pub(crate) fn push_sibling(&mut self, record: DirectoryRecord) -> &mut DirectoryRecord {
        append(&mut self.next, record)
    }
}

#[cfg(test)]
fn append(
    mut tail: &mut Option<Box<DirectoryRecord>>,
    record: DirectoryRecord,
) -> &mut DirectoryRecord {
    while let Some(last) = tail {
        tail = &mut last.next;
    }
    tail.insert(Box::new(record))
}

impl Drop for DirectoryRecord {
    fn drop(&mut self) {
        // unlink the sibling chain iteratively,
        // so that long chains do not exhaust the stack
        let mut next = self.next.take();
        while let Some(mut record) = next {
            next = record.next.take();
        }
    }
}

/// Iterator over a chain of records at the same level.
#[derive(Debug, Clone)]
pub struct Siblings<'a> {
    cursor: Option<&'a DirectoryRecord>,
}

impl<'a> Siblings<'a> {
    pub(crate) fn new(first: Option<&'a DirectoryRecord>) -> Self {
        Siblings { cursor: first }
    }
}

impl<'a> Iterator for Siblings<'a> {
    type Item = &'a DirectoryRecord;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.cursor?;
        self.cursor = record.next();
        Some(record)
    }
}

/// Depth-first iterator over a catalog tree,
/// in the order in which records are written to the file:
/// each record, then its lower level entity, then its next siblings.
///
/// Each item is the record paired with its depth
/// (0 for root level records).
#[derive(Debug, Clone)]
pub struct Walk<'a> {
    stack: Vec<(usize, &'a DirectoryRecord)>,
}

impl<'a> Walk<'a> {
    pub(crate) fn new(root: Option<&'a DirectoryRecord>) -> Self {
        Walk {
            stack: root.map(|r| (0, r)).into_iter().collect(),
        }
    }
}

impl<'a> Iterator for Walk<'a> {
    type Item = (usize, &'a DirectoryRecord);

    fn next(&mut self) -> Option<Self::Item> {
        let (depth, record) = self.stack.pop()?;
        if let Some(next) = record.next() {
            self.stack.push((depth, next));
        }
        if let Some(child) = record.child() {
            self.stack.push((depth + 1, child));
        }
        Some((depth, record))
    }
}

/// Visit every record of a tree mutably, in walk order.
pub(crate) fn for_each_mut<F>(root: &mut DirectoryRecord, f: &mut F)
where
    F: FnMut(&mut DirectoryRecord),
{
    let mut cursor = Some(root);
    while let Some(record) = cursor {
        f(record);
        if let Some(child) = record.child.as_deref_mut() {
            for_each_mut(child, f);
        }
        cursor = record.next.as_deref_mut();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom_core::dicom_value;

    fn series(uid: &str) -> DirectoryRecord {
        DirectoryRecord::new(
            RecordType::Series,
            InMemDicomObject::from_element_iter([DataElement::new(
                tags::SERIES_INSTANCE_UID,
                VR::UI,
                dicom_value!(Str, uid),
            )]),
        )
    }

    #[test]
    fn new_record_has_structure_attributes() {
        let record = series("1.2.3");
        assert_eq!(record.record_type(), RecordType::Series);
        assert_eq!(record.string(tags::DIRECTORY_RECORD_TYPE).as_deref(), Some("SERIES"));
        assert_eq!(record.offset_field(tags::OFFSET_OF_THE_NEXT_DIRECTORY_RECORD), Some(0));
        assert_eq!(record.offset_field(tags::OFFSET_OF_REFERENCED_LOWER_LEVEL_DIRECTORY_ENTITY), Some(0));
        assert_eq!(
            record
                .fields()
                .element(tags::RECORD_IN_USE_FLAG)
                .unwrap()
                .to_int::<u16>()
                .unwrap(),
            0xFFFF
        );
        assert_eq!(record.offset(), None);
        assert_eq!(record.string(tags::SERIES_INSTANCE_UID).as_deref(), Some("1.2.3"));
    }

    #[test]
    fn walk_visits_children_before_siblings() {
        let mut a = series("A");
        a.push_child(series("A1"));
        a.push_child(series("A2")).push_child(series("A2a"));
        a.push_sibling(series("B"));
        a.push_sibling(series("C")).push_child(series("C1"));

        let visited: Vec<_> = Walk::new(Some(&a))
            .map(|(depth, r)| (depth, r.string(tags::SERIES_INSTANCE_UID).unwrap()))
            .collect();
        assert_eq!(
            visited,
            vec![
                (0, "A".to_string()),
                (1, "A1".to_string()),
                (1, "A2".to_string()),
                (2, "A2a".to_string()),
                (0, "B".to_string()),
                (0, "C".to_string()),
                (1, "C1".to_string()),
            ]
        );

        let mut order = Vec::new();
        for_each_mut(&mut a, &mut |r: &mut DirectoryRecord| {
            order.push(r.string(tags::SERIES_INSTANCE_UID).unwrap())
        });
        assert_eq!(order, vec!["A", "A1", "A2", "A2a", "B", "C", "C1"]);

        assert_eq!(a.siblings().count(), 3);
        assert_eq!(a.children().count(), 2);
    }

    #[test]
    fn long_sibling_chain_drops() {
        let mut first = series("0");
        let mut last = &mut first;
        for i in 1..200_000 {
            last = last.push_sibling(series(&i.to_string()));
        }
        drop(first);
    }
}
