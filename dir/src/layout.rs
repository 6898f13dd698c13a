//! Catalog file layout and serialization.
//!
//! Links between directory records are stored as absolute byte offsets
//! into the catalog file,
//! so the position of every record must be known before it is written.
//! Saving a catalog happens in three phases:
//!
//! 1. the tree is flattened into the order in which records are written
//!    (each record, then its lower level entity, then its next siblings),
//!    and the encoded length of each record's field set is measured;
//! 2. the absolute offset of each record is assigned
//!    in a single forward pass,
//!    starting right after the directory record sequence header;
//! 3. the next and lower-level offset attributes of each record
//!    and the root record offsets of the header are back-patched.
//!
//! Offset attributes have a fixed encoded length,
//! so back-patching does not change the measured lengths.
use crate::header::CatalogHeader;
use crate::record::{for_each_mut, DirectoryRecord, Walk};
use crate::record_type::RecordType;
use crate::{
    EncodeHeaderSnafu, EncodeRecordSnafu, IoSnafu, LayoutMismatchSnafu, OffsetOverflowSnafu,
    Result, UnsupportedTransferSyntaxSnafu, WriteMetaSnafu,
};
use dicom_core::header::{DataElementHeader, Length};
use dicom_core::VR;
use dicom_dictionary_std::tags;
use dicom_encoding::encode::explicit_le::ExplicitVRLittleEndianEncoder;
use dicom_encoding::encode::implicit_le::ImplicitVRLittleEndianEncoder;
use dicom_encoding::encode::Encode;
use dicom_encoding::transfer_syntax::{TransferSyntax, TransferSyntaxIndex};
use dicom_transfer_syntax_registry::TransferSyntaxRegistry;
use snafu::{ensure, OptionExt, ResultExt};
use std::io::Write;

/// Length of the file preamble.
pub const PREAMBLE_LEN: u32 = 128;

/// Length of an item header or an item delimiter.
const ITEM_TAG_LEN: u32 = 8;

/// How the length of items and sequences is encoded.
#[derive(Debug, Default, Copy, Clone, Eq, Hash, PartialEq)]
pub enum LengthEncoding {
    /// The length is written in the header
    Defined,
    /// The length is left undefined
    /// and the end is marked with a delimitation item
    #[default]
    Undefined,
}

/// Options for writing a catalog.
///
/// Both items and the directory record sequence
/// are written with undefined length by default.
#[derive(Debug, Default, Copy, Clone, Eq, Hash, PartialEq)]
pub struct WriteOptions {
    /// how directory record items are delimited
    pub item_length: LengthEncoding,
    /// how the directory record sequence is delimited
    pub sequence_length: LengthEncoding,
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set how directory record items are delimited.
    pub fn item_length(mut self, encoding: LengthEncoding) -> Self {
        self.item_length = encoding;
        self
    }

    /// Set how the directory record sequence is delimited.
    pub fn sequence_length(mut self, encoding: LengthEncoding) -> Self {
        self.sequence_length = encoding;
        self
    }

    /// Bytes written around each record's field set.
    fn item_overhead(&self) -> u32 {
        match self.item_length {
            LengthEncoding::Defined => ITEM_TAG_LEN,
            LengthEncoding::Undefined => 2 * ITEM_TAG_LEN,
        }
    }
}

/// The position of one directory record in the catalog file.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub struct LayoutEntry {
    /// the type of the record
    pub record_type: RecordType,
    /// depth of the record in the tree, 0 for root level records
    pub depth: usize,
    /// absolute offset of the record's item header
    pub offset: u32,
    /// encoded length of the record's field set
    pub encoded_len: u32,
    /// item header and delimiter bytes around the field set
    pub overhead: u32,
}

impl LayoutEntry {
    /// The offset right after this record.
    pub fn end(&self) -> u32 {
        self.offset + self.overhead + self.encoded_len
    }
}

/// The computed layout of a catalog file.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    /// the options used to compute the layout
    pub options: WriteOptions,
    /// offset of the first record, right after the record sequence header
    pub base_offset: u32,
    /// records in the order in which they are written
    pub entries: Vec<LayoutEntry>,
    /// length of the record sequence contents,
    /// excluding the sequence delimiter
    pub sequence_len: u32,
    /// total length of the catalog file
    pub end_offset: u32,
}

/// Resolve the transfer syntax of a catalog.
///
/// Catalogs are only written in explicit or implicit VR little endian.
fn transfer_syntax(header: &CatalogHeader) -> Result<&'static TransferSyntax> {
    ensure!(
        header.is_writable(),
        UnsupportedTransferSyntaxSnafu {
            uid: header.transfer_syntax(),
        }
    );
    TransferSyntaxRegistry
        .get(header.transfer_syntax())
        .context(UnsupportedTransferSyntaxSnafu {
            uid: header.transfer_syntax(),
        })
}

fn to_u32(value: u64) -> Result<u32> {
    u32::try_from(value).ok().context(OffsetOverflowSnafu)
}

fn encode_record(record: &DirectoryRecord, ts: &TransferSyntax, index: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    record
        .fields()
        .write_dataset_with_ts(&mut buf, ts)
        .boxed()
        .context(EncodeRecordSnafu { index })?;
    Ok(buf)
}

fn sequence_header<E>(encoder: &E, len: Length) -> Result<Vec<u8>>
where
    E: Encode,
{
    let mut buf = Vec::with_capacity(12);
    encoder
        .encode_element_header(
            &mut buf,
            DataElementHeader::new(tags::DIRECTORY_RECORD_SEQUENCE, VR::SQ, len),
        )
        .boxed()
        .context(EncodeHeaderSnafu)?;
    Ok(buf)
}

/// The parts of the catalog file which precede the records.
struct Prologue {
    meta: Vec<u8>,
    root_len: u32,
    sequence_header_len: u32,
}

impl Prologue {
    fn len(&self) -> u64 {
        u64::from(PREAMBLE_LEN)
            + 4
            + self.meta.len() as u64
            + u64::from(self.root_len)
            + u64::from(self.sequence_header_len)
    }
}

fn prologue(header: &CatalogHeader, ts: &TransferSyntax) -> Result<Prologue> {
    let mut meta = Vec::new();
    header
        .meta_table()?
        .write(&mut meta)
        .boxed()
        .context(WriteMetaSnafu)?;

    let mut root = Vec::new();
    header
        .root_data_set()
        .write_dataset_with_ts(&mut root, ts)
        .boxed()
        .context(EncodeHeaderSnafu)?;

    // the value of the sequence length does not change the header length
    let sequence_header_len = if header.is_explicit_vr() {
        sequence_header(&ExplicitVRLittleEndianEncoder::default(), Length::UNDEFINED)?.len()
    } else {
        sequence_header(&ImplicitVRLittleEndianEncoder::default(), Length::UNDEFINED)?.len()
    };

    Ok(Prologue {
        meta,
        root_len: to_u32(root.len() as u64)?,
        sequence_header_len: sequence_header_len as u32,
    })
}

/// Compute the layout of a catalog tree,
/// storing the resulting offsets in the records and the header.
pub(crate) fn compute(
    header: &mut CatalogHeader,
    root: &mut DirectoryRecord,
    options: WriteOptions,
) -> Result<Layout> {
    let ts = transfer_syntax(header)?;

    // offsets from a previous save or load
    // must not leak into the measured lengths
    for_each_mut(root, &mut |record: &mut DirectoryRecord| {
        record.put_offset_fields(0, 0)
    });

    let prologue = prologue(header, ts)?;
    let base_offset = to_u32(prologue.len())?;

    // flatten and measure
    let overhead = options.item_overhead();
    let mut entries = Vec::new();
    let mut cursor = u64::from(base_offset);
    for (index, (depth, record)) in Walk::new(Some(&*root)).enumerate() {
        let encoded_len = to_u32(encode_record(record, ts, index)?.len() as u64)?;
        // assign offsets in the same pass
        let offset = to_u32(cursor)?;
        cursor += u64::from(overhead) + u64::from(encoded_len);
        entries.push(LayoutEntry {
            record_type: record.record_type(),
            depth,
            offset,
            encoded_len,
            overhead,
        });
    }
    let sequence_len = to_u32(cursor - u64::from(base_offset))?;
    if options.sequence_length == LengthEncoding::Undefined {
        cursor += u64::from(ITEM_TAG_LEN);
    }
    let end_offset = to_u32(cursor)?;

    let mut offsets = entries.iter().map(|e| e.offset);
    for_each_mut(root, &mut |record: &mut DirectoryRecord| {
        if let Some(offset) = offsets.next() {
            record.set_offset(offset);
        }
    });

    // back-patch the relations
    for_each_mut(root, &mut |record: &mut DirectoryRecord| {
        let next = record.next().and_then(|r| r.offset()).unwrap_or(0);
        let child = record.child().and_then(|r| r.offset()).unwrap_or(0);
        record.put_offset_fields(next, child);
    });
    header.first_root_offset = root.offset().unwrap_or(0);
    header.last_root_offset = root
        .siblings()
        .last()
        .and_then(|r| r.offset())
        .unwrap_or(0);

    tracing::debug!(
        base_offset,
        records = entries.len(),
        end_offset,
        "Computed catalog layout"
    );

    Ok(Layout {
        options,
        base_offset,
        entries,
        sequence_len,
        end_offset,
    })
}

/// Lay out and write a catalog tree to the given writer.
pub(crate) fn write<W>(
    header: &mut CatalogHeader,
    root: &mut DirectoryRecord,
    options: WriteOptions,
    to: W,
) -> Result<Layout>
where
    W: Write,
{
    let layout = compute(header, root, options)?;
    if header.is_explicit_vr() {
        write_file(
            &ExplicitVRLittleEndianEncoder::default(),
            header,
            root,
            &layout,
            to,
        )?;
    } else {
        write_file(
            &ImplicitVRLittleEndianEncoder::default(),
            header,
            root,
            &layout,
            to,
        )?;
    }
    Ok(layout)
}

pub(crate) fn write_file<E, W>(
    encoder: &E,
    header: &CatalogHeader,
    root: &DirectoryRecord,
    layout: &Layout,
    mut to: W,
) -> Result<()>
where
    E: Encode,
    W: Write,
{
    let ts = transfer_syntax(header)?;
    let prologue = prologue(header, ts)?;

    to.write_all(&[0; PREAMBLE_LEN as usize]).context(IoSnafu)?;
    to.write_all(b"DICM").context(IoSnafu)?;
    to.write_all(&prologue.meta).context(IoSnafu)?;
    header
        .root_data_set()
        .write_dataset_with_ts(&mut to, ts)
        .boxed()
        .context(EncodeHeaderSnafu)?;

    let (sequence_len, item_len) = (
        match layout.options.sequence_length {
            LengthEncoding::Defined => Length(layout.sequence_len),
            LengthEncoding::Undefined => Length::UNDEFINED,
        },
        layout.options.item_length,
    );
    to.write_all(&sequence_header(encoder, sequence_len)?)
        .context(IoSnafu)?;

    for (index, ((_, record), entry)) in Walk::new(Some(root))
        .zip(&layout.entries)
        .enumerate()
    {
        let data = encode_record(record, ts, index)?;
        ensure!(
            data.len() as u64 == u64::from(entry.encoded_len),
            LayoutMismatchSnafu {
                index,
                expected: u64::from(entry.encoded_len),
                actual: data.len() as u64,
            }
        );
        let len = match item_len {
            LengthEncoding::Defined => entry.encoded_len,
            LengthEncoding::Undefined => Length::UNDEFINED.0,
        };
        encoder
            .encode_item_header(&mut to, len)
            .boxed()
            .context(EncodeRecordSnafu { index })?;
        to.write_all(&data).context(IoSnafu)?;
        if item_len == LengthEncoding::Undefined {
            encoder
                .encode_item_delimiter(&mut to)
                .boxed()
                .context(EncodeRecordSnafu { index })?;
        }
    }

    if layout.options.sequence_length == LengthEncoding::Undefined {
        encoder
            .encode_sequence_delimiter(&mut to)
            .boxed()
            .context(EncodeHeaderSnafu)?;
    }
    to.flush().context(IoSnafu)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom_core::value::PrimitiveValue;
    use dicom_core::DataElement;
    use dicom_object::InMemDicomObject;

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

    #[test]
    fn offsets_follow_write_order() {
        let mut header = CatalogHeader::new("LAYOUT").unwrap();
        let mut root = patient("P1");
        root.push_child(patient("S1")).push_child(patient("SE1"));
        root.push_sibling(patient("P2"));

        let layout = compute(&mut header, &mut root, WriteOptions::new()).unwrap();
        assert_eq!(layout.entries.len(), 4);
        assert_eq!(layout.entries[0].offset, layout.base_offset);
        for w in layout.entries.windows(2) {
            assert_eq!(w[0].end(), w[1].offset);
            assert_eq!(w[0].overhead, 16);
        }
        assert_eq!(
            layout.end_offset,
            layout.entries[3].end() + 8,
            "sequence delimiter expected after the last record"
        );
        assert_eq!(layout.sequence_len, layout.entries[3].end() - layout.base_offset);

        let depths: Vec<_> = layout.entries.iter().map(|e| e.depth).collect();
        assert_eq!(depths, vec![0, 1, 2, 0]);

        // relations were back-patched
        assert_eq!(root.offset(), Some(layout.entries[0].offset));
        assert_eq!(
            root.offset_field(tags::OFFSET_OF_REFERENCED_LOWER_LEVEL_DIRECTORY_ENTITY),
            Some(layout.entries[1].offset)
        );
        assert_eq!(
            root.offset_field(tags::OFFSET_OF_THE_NEXT_DIRECTORY_RECORD),
            Some(layout.entries[3].offset)
        );
        let p2 = root.next().unwrap();
        assert_eq!(p2.offset_field(tags::OFFSET_OF_THE_NEXT_DIRECTORY_RECORD), Some(0));
        assert_eq!(p2.offset_field(tags::OFFSET_OF_REFERENCED_LOWER_LEVEL_DIRECTORY_ENTITY), Some(0));
        assert_eq!(header.first_root_offset(), layout.entries[0].offset);
        assert_eq!(header.last_root_offset(), layout.entries[3].offset);
    }

    #[test]
    fn defined_lengths_have_less_overhead() {
        let mut header = CatalogHeader::new("LAYOUT").unwrap();
        let mut root = patient("P1");
        root.push_sibling(patient("P2"));

        let undefined = compute(&mut header, &mut root, WriteOptions::new()).unwrap();
        let defined = compute(
            &mut header,
            &mut root,
            WriteOptions::new()
                .item_length(LengthEncoding::Defined)
                .sequence_length(LengthEncoding::Defined),
        )
        .unwrap();
        assert_eq!(undefined.base_offset, defined.base_offset);
        assert_eq!(defined.entries[0].overhead, 8);
        assert_eq!(defined.end_offset, defined.entries[1].end());
        assert_eq!(
            undefined.end_offset - defined.end_offset,
            2 * 8 + 8,
            "one item delimiter per record and one sequence delimiter"
        );
    }

    #[test]
    fn written_length_matches_layout() {
        let mut header = CatalogHeader::new("LAYOUT").unwrap();
        let mut root = patient("P1");
        root.push_child(patient("S1"));

        let mut out = Vec::new();
        let layout = write(&mut header, &mut root, WriteOptions::new(), &mut out).unwrap();
        assert_eq!(out.len() as u32, layout.end_offset);
        assert_eq!(&out[128..132], b"DICM");
        // each record starts with an item tag (FFFE,E000)
        for entry in &layout.entries {
            let at = entry.offset as usize;
            assert_eq!(&out[at..at + 4], &[0xFE, 0xFF, 0x00, 0xE0]);
        }
    }

    #[test]
    fn implicit_vr_sequence_header_is_shorter() {
        let mut explicit = CatalogHeader::new("LAYOUT").unwrap();
        let mut implicit = explicit.clone();
        implicit
            .set_transfer_syntax(crate::header::IMPLICIT_VR_LITTLE_ENDIAN)
            .unwrap();

        let ts = transfer_syntax(&explicit).unwrap();
        let explicit_prologue = prologue(&explicit, ts).unwrap();
        let ts = transfer_syntax(&implicit).unwrap();
        let implicit_prologue = prologue(&implicit, ts).unwrap();
        assert_eq!(explicit_prologue.sequence_header_len, 12);
        assert_eq!(implicit_prologue.sequence_header_len, 8);

        let mut root = patient("P1");
        let layout = compute(&mut implicit, &mut root, WriteOptions::new()).unwrap();
        assert_eq!(layout.base_offset as u64, implicit_prologue.len());
        let layout = compute(&mut explicit, &mut root, WriteOptions::new()).unwrap();
        assert_eq!(layout.base_offset as u64, explicit_prologue.len());
    }

    #[test]
    fn big_endian_catalog_is_not_written() {
        let header = CatalogHeader::new("LAYOUT").unwrap();
        let mut meta = header.meta_table().unwrap();
        // explicit VR big endian
        meta.transfer_syntax = "1.2.840.10008.1.2.2\0".to_string();
        let mut header = CatalogHeader::from_file(&meta, &header.root_data_set()).unwrap();
        let mut root = patient("P1");

        let mut out = Vec::new();
        assert!(matches!(
            write(&mut header, &mut root, WriteOptions::new(), &mut out),
            Err(crate::Error::UnsupportedTransferSyntax { .. })
        ));
        assert!(out.is_empty());

        header
            .set_transfer_syntax(crate::header::EXPLICIT_VR_LITTLE_ENDIAN)
            .unwrap();
        let layout = write(&mut header, &mut root, WriteOptions::new(), &mut out).unwrap();
        assert_eq!(out.len() as u32, layout.end_offset);
    }
}
