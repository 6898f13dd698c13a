//! The record type directory:
//! static look-up tables from SOP classes to directory record types,
//! and from record types to the attributes their records carry.
//!
//! Both tables are immutable and indexed once on first use,
//! so they can be shared freely across threads.
use crate::record_type::RecordType;
use dicom_dictionary_std::tags;
use dicom_core::{Tag, VR};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// How an attribute of a directory record is obtained
/// from the instance being indexed.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub enum Requirement {
    /// The attribute must be present in the instance with a non-empty value.
    Required,
    /// The attribute is copied from the instance,
    /// or written with an empty value if the instance does not have it.
    Empty,
    /// The attribute is copied only if the instance has it.
    Optional,
    /// The attribute describes the referenced file
    /// and is filled in by the catalog builder.
    Reference,
}

/// An attribute of a directory record.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub struct FieldSpec {
    /// the attribute tag
    pub tag: Tag,
    /// the attribute keyword
    pub alias: &'static str,
    /// the value representation used when writing an empty value
    pub vr: VR,
    /// how the attribute is obtained
    pub requirement: Requirement,
}

const fn field(tag: Tag, alias: &'static str, vr: VR, requirement: Requirement) -> FieldSpec {
    FieldSpec {
        tag,
        alias,
        vr,
        requirement,
    }
}

use Requirement::{Empty, Optional, Reference, Required};

const REFERENCED_FILE_ID: FieldSpec =
    field(tags::REFERENCED_FILE_ID, "ReferencedFileID", VR::CS, Reference);
const REFERENCED_SOP_CLASS: FieldSpec = field(
    tags::REFERENCED_SOP_CLASS_UID_IN_FILE,
    "ReferencedSOPClassUIDInFile",
    VR::UI,
    Reference,
);
const REFERENCED_SOP_INSTANCE: FieldSpec = field(
    tags::REFERENCED_SOP_INSTANCE_UID_IN_FILE,
    "ReferencedSOPInstanceUIDInFile",
    VR::UI,
    Reference,
);
const REFERENCED_TRANSFER_SYNTAX: FieldSpec = field(
    tags::REFERENCED_TRANSFER_SYNTAX_UID_IN_FILE,
    "ReferencedTransferSyntaxUIDInFile",
    VR::UI,
    Reference,
);

const IMAGE_TYPE: FieldSpec = field(tags::IMAGE_TYPE, "ImageType", VR::CS, Empty);
const CONTENT_DATE: FieldSpec = field(tags::CONTENT_DATE, "ContentDate", VR::DA, Empty);
const CONTENT_TIME: FieldSpec = field(tags::CONTENT_TIME, "ContentTime", VR::TM, Empty);
const INSTANCE_NUMBER: FieldSpec = field(tags::INSTANCE_NUMBER, "InstanceNumber", VR::IS, Empty);
const CONTENT_LABEL: FieldSpec = field(tags::CONTENT_LABEL, "ContentLabel", VR::CS, Empty);
const CONTENT_DESCRIPTION: FieldSpec =
    field(tags::CONTENT_DESCRIPTION, "ContentDescription", VR::LO, Empty);
const CONTENT_CREATOR_NAME: FieldSpec =
    field(tags::CONTENT_CREATOR_NAME, "ContentCreatorName", VR::PN, Empty);
const CONCEPT_NAME_CODE_SEQUENCE: FieldSpec = field(
    tags::CONCEPT_NAME_CODE_SEQUENCE,
    "ConceptNameCodeSequence",
    VR::SQ,
    Optional,
);
const ICON_IMAGE_SEQUENCE: FieldSpec =
    field(tags::ICON_IMAGE_SEQUENCE, "IconImageSequence", VR::SQ, Optional);

static PATIENT_FIELDS: &[FieldSpec] = &[
    field(tags::PATIENT_NAME, "PatientName", VR::PN, Empty),
    field(tags::PATIENT_ID, "PatientID", VR::LO, Required),
    field(tags::PATIENT_BIRTH_DATE, "PatientBirthDate", VR::DA, Optional),
    field(tags::PATIENT_SEX, "PatientSex", VR::CS, Optional),
];

static STUDY_FIELDS: &[FieldSpec] = &[
    field(tags::STUDY_DATE, "StudyDate", VR::DA, Empty),
    field(tags::STUDY_TIME, "StudyTime", VR::TM, Empty),
    field(tags::ACCESSION_NUMBER, "AccessionNumber", VR::SH, Empty),
    field(tags::STUDY_DESCRIPTION, "StudyDescription", VR::LO, Empty),
    field(tags::STUDY_INSTANCE_UID, "StudyInstanceUID", VR::UI, Required),
    field(tags::STUDY_ID, "StudyID", VR::SH, Empty),
];

static SERIES_FIELDS: &[FieldSpec] = &[
    field(tags::SERIES_DATE, "SeriesDate", VR::DA, Optional),
    field(tags::SERIES_TIME, "SeriesTime", VR::TM, Optional),
    field(tags::MODALITY, "Modality", VR::CS, Empty),
    field(tags::SERIES_DESCRIPTION, "SeriesDescription", VR::LO, Optional),
    field(tags::SERIES_INSTANCE_UID, "SeriesInstanceUID", VR::UI, Required),
    field(tags::SERIES_NUMBER, "SeriesNumber", VR::IS, Empty),
    ICON_IMAGE_SEQUENCE,
];

static IMAGE_FIELDS: &[FieldSpec] = &[
    REFERENCED_FILE_ID,
    REFERENCED_SOP_CLASS,
    REFERENCED_SOP_INSTANCE,
    REFERENCED_TRANSFER_SYNTAX,
    field(tags::IMAGE_TYPE, "ImageType", VR::CS, Optional),
    INSTANCE_NUMBER,
    field(tags::ROWS, "Rows", VR::US, Optional),
    field(tags::COLUMNS, "Columns", VR::US, Optional),
    ICON_IMAGE_SEQUENCE,
];

static RT_DOSE_FIELDS: &[FieldSpec] = &[
    REFERENCED_FILE_ID,
    REFERENCED_SOP_CLASS,
    REFERENCED_SOP_INSTANCE,
    REFERENCED_TRANSFER_SYNTAX,
    INSTANCE_NUMBER,
    field(tags::DOSE_COMMENT, "DoseComment", VR::LO, Optional),
    field(tags::DOSE_SUMMATION_TYPE, "DoseSummationType", VR::CS, Empty),
];

static RT_STRUCTURE_SET_FIELDS: &[FieldSpec] = &[
    REFERENCED_FILE_ID,
    REFERENCED_SOP_CLASS,
    REFERENCED_SOP_INSTANCE,
    REFERENCED_TRANSFER_SYNTAX,
    INSTANCE_NUMBER,
    field(tags::STRUCTURE_SET_LABEL, "StructureSetLabel", VR::SH, Empty),
    field(tags::STRUCTURE_SET_DATE, "StructureSetDate", VR::DA, Empty),
    field(tags::STRUCTURE_SET_TIME, "StructureSetTime", VR::TM, Empty),
];

static RT_PLAN_FIELDS: &[FieldSpec] = &[
    REFERENCED_FILE_ID,
    REFERENCED_SOP_CLASS,
    REFERENCED_SOP_INSTANCE,
    REFERENCED_TRANSFER_SYNTAX,
    INSTANCE_NUMBER,
    field(tags::RT_PLAN_LABEL, "RTPlanLabel", VR::SH, Empty),
    field(tags::RT_PLAN_DATE, "RTPlanDate", VR::DA, Empty),
    field(tags::RT_PLAN_TIME, "RTPlanTime", VR::TM, Empty),
];

static RT_TREAT_RECORD_FIELDS: &[FieldSpec] = &[
    REFERENCED_FILE_ID,
    REFERENCED_SOP_CLASS,
    REFERENCED_SOP_INSTANCE,
    REFERENCED_TRANSFER_SYNTAX,
    INSTANCE_NUMBER,
    field(tags::TREATMENT_DATE, "TreatmentDate", VR::DA, Empty),
    field(tags::TREATMENT_TIME, "TreatmentTime", VR::TM, Empty),
];

static PRESENTATION_FIELDS: &[FieldSpec] = &[
    REFERENCED_FILE_ID,
    REFERENCED_SOP_CLASS,
    REFERENCED_SOP_INSTANCE,
    REFERENCED_TRANSFER_SYNTAX,
    CONTENT_DATE,
    CONTENT_TIME,
    field(tags::REFERENCED_SERIES_SEQUENCE, "ReferencedSeriesSequence", VR::SQ, Optional),
    INSTANCE_NUMBER,
    CONTENT_LABEL,
    CONTENT_DESCRIPTION,
    field(tags::PRESENTATION_CREATION_DATE, "PresentationCreationDate", VR::DA, Empty),
    field(tags::PRESENTATION_CREATION_TIME, "PresentationCreationTime", VR::TM, Empty),
    CONTENT_CREATOR_NAME,
];

static WAVEFORM_FIELDS: &[FieldSpec] = &[
    REFERENCED_FILE_ID,
    REFERENCED_SOP_CLASS,
    REFERENCED_SOP_INSTANCE,
    REFERENCED_TRANSFER_SYNTAX,
    CONTENT_DATE,
    CONTENT_TIME,
    INSTANCE_NUMBER,
];

static SR_DOCUMENT_FIELDS: &[FieldSpec] = &[
    REFERENCED_FILE_ID,
    REFERENCED_SOP_CLASS,
    REFERENCED_SOP_INSTANCE,
    REFERENCED_TRANSFER_SYNTAX,
    CONTENT_DATE,
    CONTENT_TIME,
    INSTANCE_NUMBER,
    field(tags::VERIFICATION_DATE_TIME, "VerificationDateTime", VR::DT, Optional),
    CONCEPT_NAME_CODE_SEQUENCE,
    field(tags::COMPLETION_FLAG, "CompletionFlag", VR::CS, Empty),
    field(tags::VERIFICATION_FLAG, "VerificationFlag", VR::CS, Empty),
];

static KEY_OBJECT_DOC_FIELDS: &[FieldSpec] = &[
    REFERENCED_FILE_ID,
    REFERENCED_SOP_CLASS,
    REFERENCED_SOP_INSTANCE,
    REFERENCED_TRANSFER_SYNTAX,
    CONTENT_DATE,
    CONTENT_TIME,
    INSTANCE_NUMBER,
    CONCEPT_NAME_CODE_SEQUENCE,
];

static SPECTROSCOPY_FIELDS: &[FieldSpec] = &[
    REFERENCED_FILE_ID,
    REFERENCED_SOP_CLASS,
    REFERENCED_SOP_INSTANCE,
    REFERENCED_TRANSFER_SYNTAX,
    IMAGE_TYPE,
    CONTENT_DATE,
    CONTENT_TIME,
    INSTANCE_NUMBER,
    field(tags::NUMBER_OF_FRAMES, "NumberOfFrames", VR::IS, Empty),
    field(tags::ROWS, "Rows", VR::US, Empty),
    field(tags::COLUMNS, "Columns", VR::US, Empty),
    field(tags::DATA_POINT_ROWS, "DataPointRows", VR::UL, Empty),
    field(tags::DATA_POINT_COLUMNS, "DataPointColumns", VR::UL, Empty),
];

static RAW_DATA_FIELDS: &[FieldSpec] = &[
    REFERENCED_FILE_ID,
    REFERENCED_SOP_CLASS,
    REFERENCED_SOP_INSTANCE,
    REFERENCED_TRANSFER_SYNTAX,
    CONTENT_DATE,
    CONTENT_TIME,
    INSTANCE_NUMBER,
];

/// Record types describing derived content
/// (registrations, fiducials, surfaces, value maps, ...)
/// share the content identification attributes.
static CONTENT_IDENTIFICATION_FIELDS: &[FieldSpec] = &[
    REFERENCED_FILE_ID,
    REFERENCED_SOP_CLASS,
    REFERENCED_SOP_INSTANCE,
    REFERENCED_TRANSFER_SYNTAX,
    CONTENT_DATE,
    CONTENT_TIME,
    INSTANCE_NUMBER,
    CONTENT_LABEL,
    CONTENT_DESCRIPTION,
    CONTENT_CREATOR_NAME,
];

static MEASUREMENT_FIELDS: &[FieldSpec] = &[
    REFERENCED_FILE_ID,
    REFERENCED_SOP_CLASS,
    REFERENCED_SOP_INSTANCE,
    REFERENCED_TRANSFER_SYNTAX,
    CONTENT_DATE,
    CONTENT_TIME,
    INSTANCE_NUMBER,
    CONCEPT_NAME_CODE_SEQUENCE,
];

static ENCAP_DOC_FIELDS: &[FieldSpec] = &[
    REFERENCED_FILE_ID,
    REFERENCED_SOP_CLASS,
    REFERENCED_SOP_INSTANCE,
    REFERENCED_TRANSFER_SYNTAX,
    CONTENT_DATE,
    CONTENT_TIME,
    INSTANCE_NUMBER,
    CONCEPT_NAME_CODE_SEQUENCE,
    field(tags::HL7_INSTANCE_IDENTIFIER, "HL7InstanceIdentifier", VR::ST, Optional),
    field(tags::DOCUMENT_TITLE, "DocumentTitle", VR::ST, Empty),
    field(
        tags::MIME_TYPE_OF_ENCAPSULATED_DOCUMENT,
        "MIMETypeOfEncapsulatedDocument",
        VR::LO,
        Empty,
    ),
];

static STEREOMETRIC_FIELDS: &[FieldSpec] = &[
    REFERENCED_FILE_ID,
    REFERENCED_SOP_CLASS,
    REFERENCED_SOP_INSTANCE,
    REFERENCED_TRANSFER_SYNTAX,
];

static HL7_STRUC_DOC_FIELDS: &[FieldSpec] = &[
    REFERENCED_FILE_ID,
    field(tags::HL7_INSTANCE_IDENTIFIER, "HL7InstanceIdentifier", VR::ST, Required),
    field(tags::HL7_DOCUMENT_EFFECTIVE_TIME, "HL7DocumentEffectiveTime", VR::DT, Empty),
    field(
        tags::HL7_DOCUMENT_TYPE_CODE_SEQUENCE,
        "HL7DocumentTypeCodeSequence",
        VR::SQ,
        Optional,
    ),
    field(tags::DOCUMENT_TITLE, "DocumentTitle", VR::ST, Optional),
];

static HANGING_PROTOCOL_FIELDS: &[FieldSpec] = &[
    REFERENCED_FILE_ID,
    REFERENCED_SOP_CLASS,
    REFERENCED_SOP_INSTANCE,
    REFERENCED_TRANSFER_SYNTAX,
    field(tags::HANGING_PROTOCOL_NAME, "HangingProtocolName", VR::SH, Empty),
    field(tags::HANGING_PROTOCOL_DESCRIPTION, "HangingProtocolDescription", VR::LO, Empty),
    field(tags::HANGING_PROTOCOL_LEVEL, "HangingProtocolLevel", VR::CS, Empty),
    field(tags::HANGING_PROTOCOL_CREATOR, "HangingProtocolCreator", VR::LO, Empty),
    field(
        tags::HANGING_PROTOCOL_CREATION_DATE_TIME,
        "HangingProtocolCreationDateTime",
        VR::DT,
        Empty,
    ),
    field(tags::NUMBER_OF_PRIORS_REFERENCED, "NumberOfPriorsReferenced", VR::US, Empty),
];

static PALETTE_FIELDS: &[FieldSpec] = &[
    REFERENCED_FILE_ID,
    REFERENCED_SOP_CLASS,
    REFERENCED_SOP_INSTANCE,
    REFERENCED_TRANSFER_SYNTAX,
    CONTENT_LABEL,
    field(tags::CONTENT_DESCRIPTION, "ContentDescription", VR::LO, Optional),
];

static IMPLANT_FIELDS: &[FieldSpec] = &[
    REFERENCED_FILE_ID,
    REFERENCED_SOP_CLASS,
    REFERENCED_SOP_INSTANCE,
    REFERENCED_TRANSFER_SYNTAX,
    field(tags::MANUFACTURER, "Manufacturer", VR::LO, Empty),
    field(tags::IMPLANT_NAME, "ImplantName", VR::LO, Empty),
    field(tags::IMPLANT_PART_NUMBER, "ImplantPartNumber", VR::LO, Empty),
    field(tags::IMPLANT_SIZE, "ImplantSize", VR::LO, Optional),
];

static IMPLANT_ASSY_FIELDS: &[FieldSpec] = &[
    REFERENCED_FILE_ID,
    REFERENCED_SOP_CLASS,
    REFERENCED_SOP_INSTANCE,
    REFERENCED_TRANSFER_SYNTAX,
    field(tags::MANUFACTURER, "Manufacturer", VR::LO, Empty),
    field(
        tags::IMPLANT_ASSEMBLY_TEMPLATE_NAME,
        "ImplantAssemblyTemplateName",
        VR::LO,
        Empty,
    ),
];

static IMPLANT_GROUP_FIELDS: &[FieldSpec] = &[
    REFERENCED_FILE_ID,
    REFERENCED_SOP_CLASS,
    REFERENCED_SOP_INSTANCE,
    REFERENCED_TRANSFER_SYNTAX,
    field(tags::IMPLANT_TEMPLATE_GROUP_NAME, "ImplantTemplateGroupName", VR::LO, Empty),
];

static PRIVATE_FIELDS: &[FieldSpec] = &[field(
    tags::PRIVATE_RECORD_UID,
    "PrivateRecordUID",
    VR::UI,
    Empty,
)];

/// Retrieve the attributes which a directory record
/// of the given type carries,
/// besides the directory record structure attributes.
pub fn required_fields(record_type: RecordType) -> &'static [FieldSpec] {
    use RecordType::*;
    match record_type {
        Patient => PATIENT_FIELDS,
        Study => STUDY_FIELDS,
        Series => SERIES_FIELDS,
        Image => IMAGE_FIELDS,
        RtDose => RT_DOSE_FIELDS,
        RtStructureSet => RT_STRUCTURE_SET_FIELDS,
        RtPlan => RT_PLAN_FIELDS,
        RtTreatRecord => RT_TREAT_RECORD_FIELDS,
        Presentation => PRESENTATION_FIELDS,
        Waveform => WAVEFORM_FIELDS,
        SrDocument => SR_DOCUMENT_FIELDS,
        KeyObjectDoc => KEY_OBJECT_DOC_FIELDS,
        Spectroscopy => SPECTROSCOPY_FIELDS,
        RawData => RAW_DATA_FIELDS,
        Measurement | Assessment => MEASUREMENT_FIELDS,
        Registration | Fiducial | ValueMap | Surface | SurfaceScan | Tract | Plan
        | Radiotherapy | Annotation => CONTENT_IDENTIFICATION_FIELDS,
        EncapDoc => ENCAP_DOC_FIELDS,
        Stereometric => STEREOMETRIC_FIELDS,
        Hl7StrucDoc => HL7_STRUC_DOC_FIELDS,
        HangingProtocol => HANGING_PROTOCOL_FIELDS,
        Palette => PALETTE_FIELDS,
        Implant => IMPLANT_FIELDS,
        ImplantAssy => IMPLANT_ASSY_FIELDS,
        ImplantGroup => IMPLANT_GROUP_FIELDS,
        Private => PRIVATE_FIELDS,
    }
}

/// Storage SOP classes which can be indexed under a series record,
/// and the type of directory record created for them.
///
/// Root level record types (hanging protocols, color palettes, implants)
/// are not listed, since they do not belong to a patient.
static SOP_CLASS_RECORD_TYPES: &[(&str, RecordType)] = &[
    // Computed Radiography
    ("1.2.840.10008.5.1.4.1.1.1", RecordType::Image),
    // Digital X-Ray (presentation, processing)
    ("1.2.840.10008.5.1.4.1.1.1.1", RecordType::Image),
    ("1.2.840.10008.5.1.4.1.1.1.1.1", RecordType::Image),
    // Digital Mammography X-Ray (presentation, processing)
    ("1.2.840.10008.5.1.4.1.1.1.2", RecordType::Image),
    ("1.2.840.10008.5.1.4.1.1.1.2.1", RecordType::Image),
    // Digital Intra-Oral X-Ray (presentation, processing)
    ("1.2.840.10008.5.1.4.1.1.1.3", RecordType::Image),
    ("1.2.840.10008.5.1.4.1.1.1.3.1", RecordType::Image),
    // CT, Enhanced CT, Legacy Converted Enhanced CT
    ("1.2.840.10008.5.1.4.1.1.2", RecordType::Image),
    ("1.2.840.10008.5.1.4.1.1.2.1", RecordType::Image),
    ("1.2.840.10008.5.1.4.1.1.2.2", RecordType::Image),
    // Ultrasound Multi-frame
    ("1.2.840.10008.5.1.4.1.1.3.1", RecordType::Image),
    // MR, Enhanced MR, Enhanced MR Color, Legacy Converted Enhanced MR
    ("1.2.840.10008.5.1.4.1.1.4", RecordType::Image),
    ("1.2.840.10008.5.1.4.1.1.4.1", RecordType::Image),
    ("1.2.840.10008.5.1.4.1.1.4.3", RecordType::Image),
    ("1.2.840.10008.5.1.4.1.1.4.4", RecordType::Image),
    // MR Spectroscopy
    ("1.2.840.10008.5.1.4.1.1.4.2", RecordType::Spectroscopy),
    // Ultrasound, Enhanced US Volume
    ("1.2.840.10008.5.1.4.1.1.6.1", RecordType::Image),
    ("1.2.840.10008.5.1.4.1.1.6.2", RecordType::Image),
    // Secondary Capture (plain and multi-frame variants)
    ("1.2.840.10008.5.1.4.1.1.7", RecordType::Image),
    ("1.2.840.10008.5.1.4.1.1.7.1", RecordType::Image),
    ("1.2.840.10008.5.1.4.1.1.7.2", RecordType::Image),
    ("1.2.840.10008.5.1.4.1.1.7.3", RecordType::Image),
    ("1.2.840.10008.5.1.4.1.1.7.4", RecordType::Image),
    // Waveforms: ECG, hemodynamic, electrophysiology, audio, pulse, respiratory
    ("1.2.840.10008.5.1.4.1.1.9.1.1", RecordType::Waveform),
    ("1.2.840.10008.5.1.4.1.1.9.1.2", RecordType::Waveform),
    ("1.2.840.10008.5.1.4.1.1.9.1.3", RecordType::Waveform),
    ("1.2.840.10008.5.1.4.1.1.9.2.1", RecordType::Waveform),
    ("1.2.840.10008.5.1.4.1.1.9.3.1", RecordType::Waveform),
    ("1.2.840.10008.5.1.4.1.1.9.4.1", RecordType::Waveform),
    ("1.2.840.10008.5.1.4.1.1.9.4.2", RecordType::Waveform),
    ("1.2.840.10008.5.1.4.1.1.9.5.1", RecordType::Waveform),
    ("1.2.840.10008.5.1.4.1.1.9.6.1", RecordType::Waveform),
    // Presentation states: grayscale, color, pseudo-color, blending, XA/XRF
    ("1.2.840.10008.5.1.4.1.1.11.1", RecordType::Presentation),
    ("1.2.840.10008.5.1.4.1.1.11.2", RecordType::Presentation),
    ("1.2.840.10008.5.1.4.1.1.11.3", RecordType::Presentation),
    ("1.2.840.10008.5.1.4.1.1.11.4", RecordType::Presentation),
    ("1.2.840.10008.5.1.4.1.1.11.5", RecordType::Presentation),
    // X-Ray Angiographic and Radiofluoroscopic (plain and enhanced)
    ("1.2.840.10008.5.1.4.1.1.12.1", RecordType::Image),
    ("1.2.840.10008.5.1.4.1.1.12.1.1", RecordType::Image),
    ("1.2.840.10008.5.1.4.1.1.12.2", RecordType::Image),
    ("1.2.840.10008.5.1.4.1.1.12.2.1", RecordType::Image),
    // X-Ray 3D Angiographic, 3D Craniofacial, Breast Tomosynthesis
    ("1.2.840.10008.5.1.4.1.1.13.1.1", RecordType::Image),
    ("1.2.840.10008.5.1.4.1.1.13.1.2", RecordType::Image),
    ("1.2.840.10008.5.1.4.1.1.13.1.3", RecordType::Image),
    // Nuclear Medicine
    ("1.2.840.10008.5.1.4.1.1.20", RecordType::Image),
    // Parametric Map
    ("1.2.840.10008.5.1.4.1.1.30", RecordType::Image),
    // Raw Data
    ("1.2.840.10008.5.1.4.1.1.66", RecordType::RawData),
    // Spatial Registration, Deformable Spatial Registration
    ("1.2.840.10008.5.1.4.1.1.66.1", RecordType::Registration),
    ("1.2.840.10008.5.1.4.1.1.66.3", RecordType::Registration),
    // Spatial Fiducials
    ("1.2.840.10008.5.1.4.1.1.66.2", RecordType::Fiducial),
    // Segmentation
    ("1.2.840.10008.5.1.4.1.1.66.4", RecordType::Image),
    // Surface Segmentation
    ("1.2.840.10008.5.1.4.1.1.66.5", RecordType::Surface),
    // Tractography Results
    ("1.2.840.10008.5.1.4.1.1.66.6", RecordType::Tract),
    // Real World Value Mapping
    ("1.2.840.10008.5.1.4.1.1.67", RecordType::ValueMap),
    // Surface Scan Mesh, Surface Scan Point Cloud
    ("1.2.840.10008.5.1.4.1.1.68.1", RecordType::SurfaceScan),
    ("1.2.840.10008.5.1.4.1.1.68.2", RecordType::SurfaceScan),
    // Visible Light: endoscopic, microscopic, slide coordinates, photographic
    ("1.2.840.10008.5.1.4.1.1.77.1.1", RecordType::Image),
    ("1.2.840.10008.5.1.4.1.1.77.1.1.1", RecordType::Image),
    ("1.2.840.10008.5.1.4.1.1.77.1.2", RecordType::Image),
    ("1.2.840.10008.5.1.4.1.1.77.1.2.1", RecordType::Image),
    ("1.2.840.10008.5.1.4.1.1.77.1.3", RecordType::Image),
    ("1.2.840.10008.5.1.4.1.1.77.1.4", RecordType::Image),
    ("1.2.840.10008.5.1.4.1.1.77.1.4.1", RecordType::Image),
    // Ophthalmic Photography 8 bit and 16 bit, Ophthalmic Tomography
    ("1.2.840.10008.5.1.4.1.1.77.1.5.1", RecordType::Image),
    ("1.2.840.10008.5.1.4.1.1.77.1.5.2", RecordType::Image),
    ("1.2.840.10008.5.1.4.1.1.77.1.5.4", RecordType::Image),
    // Stereometric Relationship
    ("1.2.840.10008.5.1.4.1.1.77.1.5.3", RecordType::Stereometric),
    // VL Whole Slide Microscopy
    ("1.2.840.10008.5.1.4.1.1.77.1.6", RecordType::Image),
    // Ophthalmic measurements
    // (lensometry, refraction, visual acuity, axial measurements, ...)
    ("1.2.840.10008.5.1.4.1.1.78.1", RecordType::Measurement),
    ("1.2.840.10008.5.1.4.1.1.78.2", RecordType::Measurement),
    ("1.2.840.10008.5.1.4.1.1.78.3", RecordType::Measurement),
    ("1.2.840.10008.5.1.4.1.1.78.4", RecordType::Measurement),
    ("1.2.840.10008.5.1.4.1.1.78.5", RecordType::Measurement),
    ("1.2.840.10008.5.1.4.1.1.78.6", RecordType::Measurement),
    ("1.2.840.10008.5.1.4.1.1.78.7", RecordType::Measurement),
    ("1.2.840.10008.5.1.4.1.1.78.8", RecordType::Measurement),
    ("1.2.840.10008.5.1.4.1.1.79.1", RecordType::Measurement),
    ("1.2.840.10008.5.1.4.1.1.80.1", RecordType::Measurement),
    ("1.2.840.10008.5.1.4.1.1.81.1", RecordType::Measurement),
    ("1.2.840.10008.5.1.4.1.1.82.1", RecordType::Measurement),
    // Structured reports
    ("1.2.840.10008.5.1.4.1.1.88.11", RecordType::SrDocument),
    ("1.2.840.10008.5.1.4.1.1.88.22", RecordType::SrDocument),
    ("1.2.840.10008.5.1.4.1.1.88.33", RecordType::SrDocument),
    ("1.2.840.10008.5.1.4.1.1.88.34", RecordType::SrDocument),
    ("1.2.840.10008.5.1.4.1.1.88.35", RecordType::SrDocument),
    ("1.2.840.10008.5.1.4.1.1.88.40", RecordType::SrDocument),
    ("1.2.840.10008.5.1.4.1.1.88.50", RecordType::SrDocument),
    ("1.2.840.10008.5.1.4.1.1.88.65", RecordType::SrDocument),
    ("1.2.840.10008.5.1.4.1.1.88.67", RecordType::SrDocument),
    ("1.2.840.10008.5.1.4.1.1.88.68", RecordType::SrDocument),
    ("1.2.840.10008.5.1.4.1.1.88.69", RecordType::SrDocument),
    ("1.2.840.10008.5.1.4.1.1.88.70", RecordType::SrDocument),
    ("1.2.840.10008.5.1.4.1.1.88.71", RecordType::SrDocument),
    ("1.2.840.10008.5.1.4.1.1.88.72", RecordType::SrDocument),
    ("1.2.840.10008.5.1.4.1.1.88.73", RecordType::SrDocument),
    // Key Object Selection Document
    ("1.2.840.10008.5.1.4.1.1.88.59", RecordType::KeyObjectDoc),
    // Microscopy Bulk Simple Annotations
    ("1.2.840.10008.5.1.4.1.1.91.1", RecordType::Annotation),
    // Encapsulated PDF, CDA, STL
    ("1.2.840.10008.5.1.4.1.1.104.1", RecordType::EncapDoc),
    ("1.2.840.10008.5.1.4.1.1.104.2", RecordType::EncapDoc),
    ("1.2.840.10008.5.1.4.1.1.104.3", RecordType::EncapDoc),
    // PET, Legacy Converted Enhanced PET, Enhanced PET
    ("1.2.840.10008.5.1.4.1.1.128", RecordType::Image),
    ("1.2.840.10008.5.1.4.1.1.128.1", RecordType::Image),
    ("1.2.840.10008.5.1.4.1.1.130", RecordType::Image),
    // RT Image
    ("1.2.840.10008.5.1.4.1.1.481.1", RecordType::Image),
    // RT Dose
    ("1.2.840.10008.5.1.4.1.1.481.2", RecordType::RtDose),
    // RT Structure Set
    ("1.2.840.10008.5.1.4.1.1.481.3", RecordType::RtStructureSet),
    // RT Beams, Brachy and Ion Beams Treatment Records, Treatment Summary
    ("1.2.840.10008.5.1.4.1.1.481.4", RecordType::RtTreatRecord),
    ("1.2.840.10008.5.1.4.1.1.481.6", RecordType::RtTreatRecord),
    ("1.2.840.10008.5.1.4.1.1.481.7", RecordType::RtTreatRecord),
    ("1.2.840.10008.5.1.4.1.1.481.9", RecordType::RtTreatRecord),
    // RT Plan, RT Ion Plan
    ("1.2.840.10008.5.1.4.1.1.481.5", RecordType::RtPlan),
    ("1.2.840.10008.5.1.4.1.1.481.8", RecordType::RtPlan),
];

static SOP_CLASS_INDEX: Lazy<HashMap<&'static str, RecordType>> =
    Lazy::new(|| SOP_CLASS_RECORD_TYPES.iter().copied().collect());

/// Determine the type of directory record
/// which indexes instances of the given SOP class.
///
/// Trailing padding in the UID is ignored.
/// Returns `None` if the SOP class cannot be indexed in a catalog.
pub fn record_type_for(sop_class_uid: &str) -> Option<RecordType> {
    let uid = sop_class_uid.trim_end_matches(|c: char| c == '\0' || c == ' ');
    SOP_CLASS_INDEX.get(uid).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn classify_common_sop_classes() {
        // CT Image Storage
        assert_eq!(
            record_type_for("1.2.840.10008.5.1.4.1.1.2"),
            Some(RecordType::Image)
        );
        // padded with a null character, as UIDs are in data sets
        assert_eq!(
            record_type_for("1.2.840.10008.5.1.4.1.1.481.2\0"),
            Some(RecordType::RtDose)
        );
        assert_eq!(
            record_type_for("1.2.840.10008.5.1.4.1.1.88.59"),
            Some(RecordType::KeyObjectDoc)
        );
        // Verification SOP class cannot be stored in a file-set
        assert_eq!(record_type_for("1.2.840.10008.1.1"), None);
        assert_eq!(record_type_for(""), None);
    }

    #[test]
    fn sop_class_table_has_no_duplicates() {
        let mut seen = HashSet::new();
        for (uid, _) in SOP_CLASS_RECORD_TYPES {
            assert!(seen.insert(*uid), "duplicate SOP class {}", uid);
        }
        assert_eq!(SOP_CLASS_INDEX.len(), SOP_CLASS_RECORD_TYPES.len());
    }

    #[test]
    fn every_mapped_type_references_its_file() {
        for (uid, record_type) in SOP_CLASS_RECORD_TYPES {
            let fields = required_fields(*record_type);
            for tag in [
                tags::REFERENCED_FILE_ID,
                tags::REFERENCED_SOP_CLASS_UID_IN_FILE,
                tags::REFERENCED_SOP_INSTANCE_UID_IN_FILE,
                tags::REFERENCED_TRANSFER_SYNTAX_UID_IN_FILE,
            ] {
                assert!(
                    fields
                        .iter()
                        .any(|f| f.tag == tag && f.requirement == Requirement::Reference),
                    "{} ({}) lacks reference attribute {}",
                    record_type,
                    uid,
                    tag
                );
            }
        }
    }

    #[test]
    fn series_fields() {
        let fields = required_fields(RecordType::Series);
        let aliases: Vec<_> = fields.iter().map(|f| f.alias).collect();
        assert!(aliases.contains(&"Modality"));
        assert!(aliases.contains(&"SeriesDate"));
        assert!(aliases.contains(&"SeriesTime"));
        assert!(aliases.contains(&"SeriesNumber"));
        assert!(aliases.contains(&"SeriesDescription"));
        let uid = fields.iter().find(|f| f.alias == "SeriesInstanceUID").unwrap();
        assert_eq!(uid.requirement, Requirement::Required);
    }

    #[test]
    fn field_tags_match_the_standard_dictionary() {
        use dicom_core::dictionary::{DataDictionary, DataDictionaryEntry};
        use dicom_dictionary_std::StandardDataDictionary;

        for &record_type in RecordType::all() {
            for field in required_fields(record_type) {
                let entry = StandardDataDictionary
                    .by_tag(field.tag)
                    .unwrap_or_else(|| panic!("{}: unknown tag {}", record_type, field.tag));
                assert_eq!(entry.alias(), field.alias, "{}: {}", record_type, field.tag);
            }
        }
    }

    #[test]
    fn fields_are_sorted_by_tag() {
        // records are data sets, so listing attributes in tag order
        // keeps the tables readable against the standard
        for &record_type in RecordType::all() {
            let fields = required_fields(record_type);
            for w in fields.windows(2) {
                assert!(
                    w[0].tag < w[1].tag,
                    "{}: {} listed before {}",
                    record_type,
                    w[0].alias,
                    w[1].alias
                );
            }
        }
    }
}
