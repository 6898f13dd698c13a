//! Directory record types.
//!
//! Each directory record declares its type in the
//! _Directory Record Type_ attribute (0004,1430)
//! as one of the defined terms listed in DICOM PS3.3 F.5.
use std::fmt;
use std::str::FromStr;

/// The type of a directory record,
/// which determines its level in the directory hierarchy
/// and the attributes it carries.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub enum RecordType {
    Patient,
    Study,
    Series,
    Image,
    RtDose,
    RtStructureSet,
    RtPlan,
    RtTreatRecord,
    Presentation,
    Waveform,
    SrDocument,
    KeyObjectDoc,
    Spectroscopy,
    RawData,
    Registration,
    Fiducial,
    HangingProtocol,
    EncapDoc,
    Hl7StrucDoc,
    ValueMap,
    Stereometric,
    Palette,
    Implant,
    ImplantAssy,
    ImplantGroup,
    Plan,
    Measurement,
    Surface,
    SurfaceScan,
    Tract,
    Assessment,
    Radiotherapy,
    Annotation,
    /// Private record, also used for record types not known to this crate
    Private,
}

/// Error type for an unrecognized directory record type string.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseRecordTypeError {
    code: String,
}

impl fmt::Display for ParseRecordTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown directory record type `{}`", self.code)
    }
}

impl std::error::Error for ParseRecordTypeError {}

static ALL: &[RecordType] = &[
    RecordType::Patient,
    RecordType::Study,
    RecordType::Series,
    RecordType::Image,
    RecordType::RtDose,
    RecordType::RtStructureSet,
    RecordType::RtPlan,
    RecordType::RtTreatRecord,
    RecordType::Presentation,
    RecordType::Waveform,
    RecordType::SrDocument,
    RecordType::KeyObjectDoc,
    RecordType::Spectroscopy,
    RecordType::RawData,
    RecordType::Registration,
    RecordType::Fiducial,
    RecordType::HangingProtocol,
    RecordType::EncapDoc,
    RecordType::Hl7StrucDoc,
    RecordType::ValueMap,
    RecordType::Stereometric,
    RecordType::Palette,
    RecordType::Implant,
    RecordType::ImplantAssy,
    RecordType::ImplantGroup,
    RecordType::Plan,
    RecordType::Measurement,
    RecordType::Surface,
    RecordType::SurfaceScan,
    RecordType::Tract,
    RecordType::Assessment,
    RecordType::Radiotherapy,
    RecordType::Annotation,
    RecordType::Private,
];

impl RecordType {
    /// Obtain a slice of all record types known to this crate.
    pub fn all() -> &'static [RecordType] {
        ALL
    }

    /// Retrieve the defined term used in the _Directory Record Type_
    /// attribute for this record type.
    pub fn as_str(self) -> &'static str {
        use RecordType::*;
        match self {
            Patient => "PATIENT",
            Study => "STUDY",
            Series => "SERIES",
            Image => "IMAGE",
            RtDose => "RT DOSE",
            RtStructureSet => "RT STRUCTURE SET",
            RtPlan => "RT PLAN",
            RtTreatRecord => "RT TREAT RECORD",
            Presentation => "PRESENTATION",
            Waveform => "WAVEFORM",
            SrDocument => "SR DOCUMENT",
            KeyObjectDoc => "KEY OBJECT DOC",
            Spectroscopy => "SPECTROSCOPY",
            RawData => "RAW DATA",
            Registration => "REGISTRATION",
            Fiducial => "FIDUCIAL",
            HangingProtocol => "HANGING PROTOCOL",
            EncapDoc => "ENCAP DOC",
            Hl7StrucDoc => "HL7 STRUC DOC",
            ValueMap => "VALUE MAP",
            Stereometric => "STEREOMETRIC",
            Palette => "PALETTE",
            Implant => "IMPLANT",
            ImplantAssy => "IMPLANT ASSY",
            ImplantGroup => "IMPLANT GROUP",
            Plan => "PLAN",
            Measurement => "MEASUREMENT",
            Surface => "SURFACE",
            SurfaceScan => "SURFACE SCAN",
            Tract => "TRACT",
            Assessment => "ASSESSMENT",
            Radiotherapy => "RADIOTHERAPY",
            Annotation => "ANNOTATION",
            Private => "PRIVATE",
        }
    }

    /// Interpret a directory record type string,
    /// mapping unrecognized types to [`RecordType::Private`].
    ///
    /// Leading and trailing padding is ignored.
    pub fn from_code_lossy(code: &str) -> RecordType {
        code.parse().unwrap_or(RecordType::Private)
    }
}

impl FromStr for RecordType {
    type Err = ParseRecordTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim_matches(|c: char| c == ' ' || c == '\0');
        ALL.iter()
            .copied()
            .find(|t| t.as_str() == code)
            .ok_or_else(|| ParseRecordTypeError {
                code: code.to_string(),
            })
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::RecordType;

    #[test]
    fn record_type_codes_round_trip() {
        for &t in RecordType::all() {
            assert_eq!(t.as_str().parse::<RecordType>(), Ok(t));
        }
    }

    #[test]
    fn parse_with_padding() {
        assert_eq!("SERIES ".parse::<RecordType>(), Ok(RecordType::Series));
        assert_eq!("RT DOSE\0".parse::<RecordType>(), Ok(RecordType::RtDose));
        assert!("MRDR".parse::<RecordType>().is_err());
        assert_eq!(RecordType::from_code_lossy("MRDR"), RecordType::Private);
    }
}
