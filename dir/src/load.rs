//! Reading catalogs back from their encoded form.
//!
//! The data set is read token by token over a reader which counts
//! the bytes consumed, so that the absolute offset of each record item
//! is known as soon as its item header is read.
//! Records are first collected into a flat table keyed by offset,
//! and then linked into a tree
//! by following the root record offset of the header
//! and the next and lower-level offsets of each record.
//!
//! Links to offsets which do not hold a record
//! and links to records which were already placed in the tree
//! are dropped instead of failing the load.
//! Each of these is logged and listed in the [`LoadReport`].
use crate::header::CatalogHeader;
use crate::layout::PREAMBLE_LEN;
use crate::record::DirectoryRecord;
use crate::{
    DanglingRootOffsetSnafu, MissingRecordSequenceSnafu, NotDicomSnafu, ReadDataSetSnafu,
    ReadMetaSnafu, Result, UnexpectedTokenSnafu, UnsupportedTransferSyntaxSnafu,
};
use dicom_core::header::{DataElementHeader, Length};
use dicom_core::value::DataSetSequence;
use dicom_core::{DataElement, Tag, VR};
use dicom_dictionary_std::tags;
use dicom_encoding::transfer_syntax::TransferSyntaxIndex;
use dicom_object::mem::InMemElement;
use dicom_object::{FileMetaTable, InMemDicomObject};
use dicom_parser::dataset::{DataSetReader, DataToken};
use dicom_transfer_syntax_registry::TransferSyntaxRegistry;
use snafu::{ensure, OptionExt, ResultExt};
use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::rc::Rc;

/// The relation a link between two records stands for.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub enum LinkKind {
    /// next record at the same level
    Next,
    /// first record of the lower level entity
    Child,
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkKind::Next => f.write_str("next"),
            LinkKind::Child => f.write_str("lower-level"),
        }
    }
}

/// A link between records which was dropped while loading a catalog.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub struct DroppedLink {
    /// offset of the record holding the link
    pub from: u32,
    /// the relation
    pub kind: LinkKind,
    /// the offset the link points to
    pub target: u32,
}

/// Irregularities found while loading a catalog.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LoadReport {
    /// number of directory records in the record sequence
    pub records: usize,
    /// links to offsets where no record starts
    pub dangling_links: Vec<DroppedLink>,
    /// links to records already placed elsewhere in the tree
    pub revisiting_links: Vec<DroppedLink>,
    /// number of records not reachable from the root record
    pub orphans: usize,
}

impl LoadReport {
    /// Whether the catalog was loaded without dropping anything.
    pub fn is_clean(&self) -> bool {
        self.dangling_links.is_empty() && self.revisiting_links.is_empty() && self.orphans == 0
    }
}

/// A reader which keeps count of the bytes read through it.
struct CountingReader<R> {
    inner: R,
    count: Rc<Cell<u64>>,
}

impl<R> Read for CountingReader<R>
where
    R: Read,
{
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count.set(self.count.get() + n as u64);
        Ok(n)
    }
}

/// The contents of a catalog file.
pub(crate) struct Loaded {
    pub header: CatalogHeader,
    pub root: Option<DirectoryRecord>,
    pub report: LoadReport,
}

/// Read a catalog from the full contents of a catalog file.
pub(crate) fn read_catalog(bytes: &[u8]) -> Result<Loaded> {
    let preamble = PREAMBLE_LEN as usize;
    ensure!(
        bytes.len() >= preamble + 4 && &bytes[preamble..preamble + 4] == b"DICM",
        NotDicomSnafu
    );
    let meta = FileMetaTable::from_reader(&bytes[preamble..])
        .boxed()
        .context(ReadMetaSnafu)?;

    // magic code and the group length element precede the group
    let dataset_start = u64::from(PREAMBLE_LEN) + 4 + 12 + u64::from(meta.information_group_length);
    let dataset = usize::try_from(dataset_start)
        .ok()
        .and_then(|start| bytes.get(start..))
        .unwrap_or(&[]);

    let ts_uid = meta.transfer_syntax.trim_end_matches(|c: char| c == '\0' || c == ' ');
    let ts = TransferSyntaxRegistry
        .get(ts_uid)
        .context(UnsupportedTransferSyntaxSnafu { uid: ts_uid })?;

    let count = Rc::new(Cell::new(0));
    let source = CountingReader {
        inner: dataset,
        count: Rc::clone(&count),
    };
    let mut tokens = DataSetReader::new_with_ts(source, ts)
        .boxed()
        .context(ReadDataSetSnafu)?;

    let mut root_data_set = InMemDicomObject::new_empty();
    let mut items = None;
    while let Some(token) = tokens.next() {
        match token.boxed().context(ReadDataSetSnafu)? {
            DataToken::ElementHeader(header) => {
                let elem = read_element(&mut tokens, header)?;
                root_data_set.put(elem);
            }
            DataToken::SequenceStart { tag, .. } if tag == tags::DIRECTORY_RECORD_SEQUENCE => {
                items = Some(read_record_items(&mut tokens, &count, dataset_start)?);
            }
            DataToken::SequenceStart { tag, .. } => {
                let elem = read_sequence(&mut tokens, tag)?;
                root_data_set.put(elem);
            }
            token => return UnexpectedTokenSnafu { token: token.to_string() }.fail(),
        }
    }
    let items = items.context(MissingRecordSequenceSnafu)?;

    let header = CatalogHeader::from_file(&meta, &root_data_set)?;
    let (root, report) = link_records(&header, items)?;
    Ok(Loaded {
        header,
        root,
        report,
    })
}

/// Read the value of a primitive data element.
fn read_element<I, E>(tokens: &mut I, header: DataElementHeader) -> Result<InMemElement>
where
    I: Iterator<Item = std::result::Result<DataToken, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    match tokens.next() {
        Some(token) => match token.boxed().context(ReadDataSetSnafu)? {
            DataToken::PrimitiveValue(value) => Ok(DataElement::new(header.tag, header.vr, value)),
            token => UnexpectedTokenSnafu { token: token.to_string() }.fail(),
        },
        None => UnexpectedTokenSnafu {
            token: "end of data set",
        }
        .fail(),
    }
}

/// Read the items of a sequence nested in a record or in the header,
/// after its start token.
fn read_sequence<I, E>(tokens: &mut I, tag: Tag) -> Result<InMemElement>
where
    I: Iterator<Item = std::result::Result<DataToken, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    let mut items: Vec<InMemDicomObject> = Vec::new();
    while let Some(token) = tokens.next() {
        match token.boxed().context(ReadDataSetSnafu)? {
            DataToken::ItemStart { .. } => items.push(read_item(tokens)?),
            DataToken::SequenceEnd => break,
            token => return UnexpectedTokenSnafu { token: token.to_string() }.fail(),
        }
    }
    // written anew on save, with undefined length
    Ok(DataElement::new(
        tag,
        VR::SQ,
        DataSetSequence::new(items, Length::UNDEFINED),
    ))
}

/// Read the contents of an item, after its start token.
fn read_item<I, E>(tokens: &mut I) -> Result<InMemDicomObject>
where
    I: Iterator<Item = std::result::Result<DataToken, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    let mut obj = InMemDicomObject::new_empty();
    while let Some(token) = tokens.next() {
        match token.boxed().context(ReadDataSetSnafu)? {
            DataToken::ElementHeader(header) => {
                obj.put(read_element(tokens, header)?);
            }
            DataToken::SequenceStart { tag, .. } => {
                obj.put(read_sequence(tokens, tag)?);
            }
            DataToken::ItemEnd => return Ok(obj),
            token => return UnexpectedTokenSnafu { token: token.to_string() }.fail(),
        }
    }
    Ok(obj)
}

/// Read the items of the directory record sequence,
/// paired with the absolute offset of each item.
fn read_record_items<I, E>(
    tokens: &mut I,
    count: &Cell<u64>,
    dataset_start: u64,
) -> Result<Vec<(u32, InMemDicomObject)>>
where
    I: Iterator<Item = std::result::Result<DataToken, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    let mut items = Vec::new();
    while let Some(token) = tokens.next() {
        match token.boxed().context(ReadDataSetSnafu)? {
            DataToken::ItemStart { .. } => {
                // the item header was just read
                let offset = dataset_start + count.get() - 8;
                let obj = read_item(tokens)?;
                match u32::try_from(offset) {
                    Ok(offset) => items.push((offset, obj)),
                    Err(_) => {
                        tracing::warn!("Ignoring directory record beyond 4 GiB at {}", offset);
                    }
                }
            }
            DataToken::SequenceEnd => break,
            token => return UnexpectedTokenSnafu { token: token.to_string() }.fail(),
        }
    }
    Ok(items)
}

/// Link the records found in a file into a tree.
fn link_records(
    header: &CatalogHeader,
    items: Vec<(u32, InMemDicomObject)>,
) -> Result<(Option<DirectoryRecord>, LoadReport)> {
    let mut report = LoadReport {
        records: items.len(),
        ..Default::default()
    };

    let index: HashMap<u32, usize> = items
        .iter()
        .enumerate()
        .map(|(i, (offset, _))| (*offset, i))
        .collect();
    let mut slots: Vec<Option<DirectoryRecord>> = items
        .into_iter()
        .map(|(offset, fields)| Some(DirectoryRecord::from_file(fields, offset)))
        .collect();
    let links: Vec<(u32, u32, u32)> = slots
        .iter()
        .flatten()
        .map(|r| {
            (
                r.offset().unwrap_or(0),
                r.offset_field(tags::OFFSET_OF_THE_NEXT_DIRECTORY_RECORD).unwrap_or(0),
                r.offset_field(tags::OFFSET_OF_REFERENCED_LOWER_LEVEL_DIRECTORY_ENTITY).unwrap_or(0),
            )
        })
        .collect();

    let root_offset = header.first_root_offset();
    if root_offset == 0 {
        report.orphans = slots.len();
        if report.orphans > 0 {
            tracing::warn!(
                "Catalog has no root record, {} directory records are unreachable",
                report.orphans
            );
        }
        return Ok((None, report));
    }
    let root_index = *index
        .get(&root_offset)
        .context(DanglingRootOffsetSnafu {
            offset: root_offset,
        })?;

    let mut placed = vec![false; slots.len()];
    let mut next_of: Vec<Option<usize>> = vec![None; slots.len()];
    let mut child_of: Vec<Option<usize>> = vec![None; slots.len()];
    // records in the order they were reached,
    // every record after the ones linking to it
    let mut order = Vec::with_capacity(slots.len());
    let mut stack = vec![root_index];
    placed[root_index] = true;

    while let Some(i) = stack.pop() {
        order.push(i);
        let (from, next, child) = links[i];
        for (kind, target) in [(LinkKind::Next, next), (LinkKind::Child, child)] {
            if target == 0 {
                continue;
            }
            let link = DroppedLink { from, kind, target };
            match index.get(&target) {
                None => {
                    tracing::warn!(
                        "Directory record at {} has a {} link to {}, where no record starts",
                        from,
                        kind,
                        target
                    );
                    report.dangling_links.push(link);
                }
                Some(&j) if placed[j] => {
                    tracing::warn!(
                        "Directory record at {} has a {} link to record {} already in the tree",
                        from,
                        kind,
                        target
                    );
                    report.revisiting_links.push(link);
                }
                Some(&j) => {
                    placed[j] = true;
                    stack.push(j);
                    match kind {
                        LinkKind::Next => next_of[i] = Some(j),
                        LinkKind::Child => child_of[i] = Some(j),
                    }
                }
            }
        }
    }

    report.orphans = slots.len() - order.len();
    if report.orphans > 0 {
        tracing::warn!(
            "{} directory records are unreachable from the root record",
            report.orphans
        );
    }

    // attach records bottom-up
    for &i in order.iter().rev() {
        let next = next_of[i].and_then(|j| slots[j].take());
        let child = child_of[i].and_then(|j| slots[j].take());
        if let Some(record) = slots[i].as_mut() {
            record.next = next.map(Box::new);
            record.child = child.map(Box::new);
        }
    }
    let root = slots[root_index].take();

    if let Some(root) = &root {
        let last = root.siblings().last().and_then(|r| r.offset()).unwrap_or(0);
        if last != header.last_root_offset() {
            tracing::warn!(
                "Last root record offset is {}, but the last root record is at {}",
                header.last_root_offset(),
                last
            );
        }
    }

    Ok((root, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{self, WriteOptions};
    use crate::record_type::RecordType;
    use crate::Error;
    use dicom_core::value::PrimitiveValue;
    use dicom_encoding::encode::explicit_le::ExplicitVRLittleEndianEncoder;

    fn patient(id: &str) -> DirectoryRecord {
        DirectoryRecord::new(
            RecordType::Patient,
            InMemDicomObject::from_element_iter([DataElement::new(
                tags::PATIENT_ID,
                VR::LO,
                PrimitiveValue::from(id),
            )]),
        )
    }

    fn patient_ids(root: Option<&DirectoryRecord>) -> Vec<String> {
        root.into_iter()
            .flat_map(|r| r.siblings())
            .filter_map(|r| r.string(tags::PATIENT_ID))
            .collect()
    }

    /// Write three root records,
    /// letting `tamper` change the record fields after the layout is computed.
    fn write_tampered(
        tamper: impl FnOnce(&mut CatalogHeader, &mut DirectoryRecord, &layout::Layout),
    ) -> Vec<u8> {
        let mut header = CatalogHeader::new("TAMPERED").unwrap();
        let mut root = patient("P1");
        root.push_sibling(patient("P2"));
        root.push_sibling(patient("P3"));
        let layout = layout::compute(&mut header, &mut root, WriteOptions::new()).unwrap();
        tamper(&mut header, &mut root, &layout);
        let mut out = Vec::new();
        layout::write_file(
            &ExplicitVRLittleEndianEncoder::default(),
            &header,
            &root,
            &layout,
            &mut out,
        )
        .unwrap();
        out
    }

    #[test]
    fn item_offsets_are_absolute() {
        let bytes = write_tampered(|_, _, _| {});
        let loaded = read_catalog(&bytes).unwrap();
        assert!(loaded.report.is_clean());
        assert_eq!(loaded.report.records, 3);
        let root = loaded.root.unwrap();
        for record in root.siblings() {
            let at = record.offset().unwrap() as usize;
            assert_eq!(&bytes[at..at + 4], &[0xFE, 0xFF, 0x00, 0xE0]);
        }
        assert_eq!(patient_ids(Some(&root)), vec!["P1", "P2", "P3"]);
        assert_eq!(loaded.header.file_set_id(), "TAMPERED");
    }

    #[test]
    fn dangling_next_link_is_dropped_and_reported() {
        let bytes = write_tampered(|_, root, layout| {
            // P2 points past the end of the file
            let p2 = root.next.as_deref_mut().unwrap();
            p2.put_offset_fields(layout.end_offset + 1000, 0);
        });
        let loaded = read_catalog(&bytes).unwrap();
        assert_eq!(patient_ids(loaded.root.as_ref()), vec!["P1", "P2"]);
        assert_eq!(loaded.report.dangling_links.len(), 1);
        assert_eq!(loaded.report.dangling_links[0].kind, LinkKind::Next);
        assert_eq!(loaded.report.orphans, 1);
        assert!(!loaded.report.is_clean());
    }

    #[test]
    fn link_back_to_placed_record_is_dropped() {
        let bytes = write_tampered(|_, root, layout| {
            let first = layout.entries[0].offset;
            let p3 = root.next.as_deref_mut().unwrap().next.as_deref_mut().unwrap();
            p3.put_offset_fields(first, 0);
        });
        let loaded = read_catalog(&bytes).unwrap();
        assert_eq!(patient_ids(loaded.root.as_ref()), vec!["P1", "P2", "P3"]);
        assert_eq!(loaded.report.revisiting_links.len(), 1);
        assert_eq!(loaded.report.orphans, 0);
    }

    #[test]
    fn dangling_root_offset_fails() {
        let bytes = write_tampered(|header, _, _| {
            header.first_root_offset = 12;
        });
        assert!(matches!(
            read_catalog(&bytes),
            Err(Error::DanglingRootOffset { offset: 12 })
        ));
    }

    #[test]
    fn zero_root_offset_means_no_records() {
        let bytes = write_tampered(|header, _, _| {
            header.first_root_offset = 0;
        });
        let loaded = read_catalog(&bytes).unwrap();
        assert!(loaded.root.is_none());
        assert_eq!(loaded.report.records, 3);
        assert_eq!(loaded.report.orphans, 3);
    }

    #[test]
    fn missing_record_sequence_fails() {
        let header = CatalogHeader::new("NO_RECORDS").unwrap();
        let ts = TransferSyntaxRegistry
            .get(header.transfer_syntax())
            .unwrap();
        let mut bytes = vec![0; 128];
        bytes.extend_from_slice(b"DICM");
        header.meta_table().unwrap().write(&mut bytes).unwrap();
        header
            .root_data_set()
            .write_dataset_with_ts(&mut bytes, ts)
            .unwrap();
        assert!(matches!(
            read_catalog(&bytes),
            Err(Error::MissingRecordSequence)
        ));
    }

    #[test]
    fn not_dicom() {
        assert!(matches!(
            read_catalog(b"DICOMDIR"),
            Err(Error::NotDicom)
        ));
        assert!(matches!(
            read_catalog(&[0; 256]),
            Err(Error::NotDicom)
        ));
    }
}
