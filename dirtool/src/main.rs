//! A command line tool for creating, extending and inspecting
//! DICOM media storage directories (DICOMDIR files).
use clap::{Args, Parser, Subcommand};
use dicom_dictionary_std::tags;
use dicom_dir::{Catalog, DirectoryRecord, LengthEncoding, RecordType, WriteOptions};
use indicatif::{ProgressBar, ProgressStyle};
use snafu::prelude::*;
use snafu::{Report, Whatever};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn, Level};
use walkdir::WalkDir;

const EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1";
const IMPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2";

/// DICOMDIR creation and inspection
#[derive(Debug, Parser)]
#[command(version)]
struct App {
    #[command(subcommand)]
    command: Command,
    /// verbose mode
    #[arg(short = 'v', long = "verbose", global = true)]
    verbose: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create a new DICOMDIR indexing the given files
    Create {
        /// path of the DICOMDIR file to create
        output: PathBuf,
        /// the DICOM file(s) or directories to index
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// the file-set ID (up to 16 characters)
        #[arg(long = "file-set-id", default_value = "")]
        file_set_id: String,
        /// the file-set root directory
        /// [default: the directory of the DICOMDIR file]
        #[arg(long = "root")]
        root: Option<PathBuf>,
        #[command(flatten)]
        write: WriteArgs,
    },
    /// Add files to an existing DICOMDIR
    Add {
        /// path of the DICOMDIR file to update
        dicomdir: PathBuf,
        /// the DICOM file(s) or directories to index
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[command(flatten)]
        write: WriteArgs,
    },
    /// Print the header and record tree of a DICOMDIR
    Dump {
        /// path of the DICOMDIR file to inspect
        dicomdir: PathBuf,
    },
}

#[derive(Debug, Args)]
struct WriteArgs {
    /// encode the DICOMDIR in implicit VR little endian
    #[arg(long = "implicit-vr")]
    implicit_vr: bool,
    /// write directory records and the record sequence with defined lengths
    #[arg(long = "defined-length")]
    defined_length: bool,
    /// fail if any of the files cannot be indexed
    #[arg(long = "fail-first")]
    fail_first: bool,
}

impl WriteArgs {
    fn options(&self) -> WriteOptions {
        let encoding = if self.defined_length {
            LengthEncoding::Defined
        } else {
            LengthEncoding::Undefined
        };
        WriteOptions::new()
            .item_length(encoding)
            .sequence_length(encoding)
    }

    fn transfer_syntax(&self) -> &'static str {
        if self.implicit_vr {
            IMPLICIT_VR_LITTLE_ENDIAN
        } else {
            EXPLICIT_VR_LITTLE_ENDIAN
        }
    }
}

fn main() {
    run().unwrap_or_else(|e| {
        error!("{}", Report::from_error(e));
        std::process::exit(-2);
    });
}

fn run() -> Result<(), Whatever> {
    let App { command, verbose } = App::parse();

    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(if verbose { Level::DEBUG } else { Level::INFO })
            .finish(),
    )
    .whatever_context("Could not set up global logging subscriber")
    .unwrap_or_else(|e: Whatever| {
        eprintln!("[ERROR] {}", Report::from_error(e));
    });

    match command {
        Command::Create {
            output,
            files,
            file_set_id,
            root,
            write,
        } => create(&output, files, &file_set_id, root, &write, verbose),
        Command::Add {
            dicomdir,
            files,
            write,
        } => add(&dicomdir, files, &write, verbose),
        Command::Dump { dicomdir } => dump(&dicomdir),
    }
}

fn create(
    output: &Path,
    files: Vec<PathBuf>,
    file_set_id: &str,
    root: Option<PathBuf>,
    write: &WriteArgs,
    verbose: bool,
) -> Result<(), Whatever> {
    let root = absolute(&root.unwrap_or_else(|| parent_dir(output)))?;
    let mut catalog = Catalog::new(file_set_id)
        .whatever_context("Invalid file-set ID")?
        .with_root_dir(root);
    catalog
        .header_mut()
        .set_transfer_syntax(write.transfer_syntax())
        .whatever_context("Could not set transfer syntax")?;
    index_files(&mut catalog, &collect_files(files), write.fail_first, verbose)?;
    save(&mut catalog, output, write)
}

fn add(
    dicomdir: &Path,
    files: Vec<PathBuf>,
    write: &WriteArgs,
    verbose: bool,
) -> Result<(), Whatever> {
    let mut catalog = Catalog::open(dicomdir)
        .with_whatever_context(|_| format!("Could not open DICOMDIR {}", dicomdir.display()))?;
    let root = absolute(&parent_dir(dicomdir))?;
    catalog.set_root_dir(Some(root));
    if write.implicit_vr {
        catalog
            .header_mut()
            .set_transfer_syntax(IMPLICIT_VR_LITTLE_ENDIAN)
            .whatever_context("Could not set transfer syntax")?;
    }
    index_files(&mut catalog, &collect_files(files), write.fail_first, verbose)?;
    save(&mut catalog, dicomdir, write)
}

/// Resolve a path given on the command line,
/// so that it does not depend on the working directory.
fn absolute(path: &Path) -> Result<PathBuf, Whatever> {
    std::fs::canonicalize(path)
        .with_whatever_context(|_| format!("Could not resolve path {}", path.display()))
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf()
}

/// Expand directories into the files inside them,
/// leaving out DICOMDIR files.
fn collect_files(files: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut checked_files: Vec<PathBuf> = vec![];
    for file in files {
        if file.is_dir() {
            for file in WalkDir::new(file.as_path())
                .sort_by_file_name()
                .into_iter()
                .filter_map(Result::ok)
                .filter(|f| !f.file_type().is_dir())
            {
                checked_files.push(file.into_path());
            }
        } else {
            checked_files.push(file);
        }
    }
    checked_files.retain(|f| f.file_name() != Some(OsStr::new("DICOMDIR")));
    checked_files
}

fn index_files(
    catalog: &mut Catalog,
    files: &[PathBuf],
    fail_first: bool,
    verbose: bool,
) -> Result<(), Whatever> {
    let progress_bar = if verbose {
        None
    } else {
        let pb = ProgressBar::new(files.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} {wide_msg}")
                .whatever_context("Invalid progress bar template")?,
        );
        pb.enable_steady_tick(Duration::from_millis(480));
        Some(pb)
    };

    let mut indexed = 0;
    for file in files {
        if let Some(pb) = &progress_bar {
            pb.set_message(file.display().to_string());
        } else {
            info!("Indexing file '{}'...", file.display());
        }

        // relative paths would be taken as relative to the file-set root
        let result = absolute(file).and_then(|file| {
            catalog
                .insert_file(&file)
                .with_whatever_context(|_| format!("Could not index file {}", file.display()))
        });
        match result {
            Ok(()) => indexed += 1,
            Err(e) if fail_first => return Err(e),
            Err(e) => {
                warn!("Skipping file: {}", Report::from_error(e));
            }
        }

        if let Some(pb) = &progress_bar {
            pb.inc(1);
        }
    }

    if let Some(pb) = progress_bar {
        pb.finish_with_message("done");
    }
    info!("Indexed {} of {} files", indexed, files.len());
    Ok(())
}

fn save(catalog: &mut Catalog, path: &Path, write: &WriteArgs) -> Result<(), Whatever> {
    if catalog.is_empty() {
        whatever!("No files could be indexed, DICOMDIR not written");
    }
    let layout = catalog
        .save_with_options(path, write.options())
        .with_whatever_context(|_| format!("Could not write DICOMDIR {}", path.display()))?;
    info!(
        "Wrote {} ({} records, {} bytes)",
        path.display(),
        layout.entries.len(),
        layout.end_offset
    );
    Ok(())
}

fn dump(path: &Path) -> Result<(), Whatever> {
    let (catalog, report) = Catalog::open_with_report(path)
        .with_whatever_context(|_| format!("Could not open DICOMDIR {}", path.display()))?;

    let header = catalog.header();
    println!("File-set ID: {}", header.file_set_id());
    println!("Transfer syntax: {}", header.transfer_syntax());
    println!(
        "Media storage SOP instance UID: {}",
        header.media_storage_sop_instance_uid()
    );
    println!("Implementation class UID: {}", header.implementation_class_uid());
    if let Some(name) = header.implementation_version_name() {
        println!("Implementation version name: {}", name);
    }
    if let Some(ae_title) = header.source_application_entity_title() {
        println!("Source AE title: {}", ae_title);
    }
    if let Some(file_id) = header.file_set_descriptor_file_id() {
        println!("File-set descriptor: {}", file_id);
    }
    println!(
        "Root records: first at {}, last at {}",
        header.first_root_offset(),
        header.last_root_offset()
    );
    println!();

    for (depth, record) in catalog.walk() {
        println!(
            "{:indent$}{} @{}: {}",
            "",
            record.record_type(),
            record.offset().unwrap_or(0),
            summary(record),
            indent = depth * 2
        );
    }

    if !report.is_clean() {
        println!();
        for link in report.dangling_links.iter().chain(&report.revisiting_links) {
            warn!(
                "Ignored {} link from {} to {}",
                link.kind, link.from, link.target
            );
        }
        if report.orphans > 0 {
            warn!("{} records are not reachable from the root", report.orphans);
        }
    }
    Ok(())
}

/// A one line description of a directory record.
fn summary(record: &DirectoryRecord) -> String {
    let get = |tag| record.string(tag).unwrap_or_default();
    match record.record_type() {
        RecordType::Patient => format!(
            "{} [{}]",
            get(tags::PATIENT_NAME),
            get(tags::PATIENT_ID)
        ),
        RecordType::Study => format!(
            "{} {} [{}]",
            get(tags::STUDY_DATE),
            get(tags::STUDY_DESCRIPTION),
            get(tags::STUDY_INSTANCE_UID)
        ),
        RecordType::Series => format!(
            "{} #{} [{}]",
            get(tags::MODALITY),
            get(tags::SERIES_NUMBER),
            get(tags::SERIES_INSTANCE_UID)
        ),
        _ => match record.referenced_file_id() {
            Some(file_id) => format!("{} #{}", file_id, get(tags::INSTANCE_NUMBER)),
            None => String::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom_core::{dicom_value, DataElement, VR};
    use dicom_dir::FileId;
    use dicom_object::meta::FileMetaTableBuilder;
    use dicom_object::InMemDicomObject;

    const CT_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.2";

    fn write_instance(path: &Path, sop_instance: &str) {
        InMemDicomObject::from_element_iter([
            DataElement::new(tags::SOP_CLASS_UID, VR::UI, dicom_value!(Str, CT_IMAGE_STORAGE)),
            DataElement::new(tags::SOP_INSTANCE_UID, VR::UI, dicom_value!(Str, sop_instance)),
            DataElement::new(tags::MODALITY, VR::CS, dicom_value!(Str, "CT")),
            DataElement::new(tags::PATIENT_NAME, VR::PN, dicom_value!(Str, "Doe^John")),
            DataElement::new(tags::PATIENT_ID, VR::LO, dicom_value!(Str, "P1")),
            DataElement::new(tags::STUDY_INSTANCE_UID, VR::UI, dicom_value!(Str, "1.2.3")),
            DataElement::new(tags::SERIES_INSTANCE_UID, VR::UI, dicom_value!(Str, "1.2.3.0")),
        ])
        .with_meta(
            FileMetaTableBuilder::new()
                .transfer_syntax(EXPLICIT_VR_LITTLE_ENDIAN)
                .media_storage_sop_class_uid(CT_IMAGE_STORAGE)
                .media_storage_sop_instance_uid(sop_instance)
                .implementation_class_uid("1.2.345.6.7890.1.234"),
        )
        .unwrap()
        .write_to_file(path)
        .unwrap();
    }

    fn write_args() -> WriteArgs {
        WriteArgs {
            implicit_vr: false,
            defined_length: false,
            fail_first: true,
        }
    }

    fn file_ids(dicomdir: &Path) -> Vec<FileId> {
        Catalog::open(dicomdir)
            .unwrap()
            .records()
            .filter_map(|r| r.referenced_file_id())
            .collect()
    }

    // the only test changing the working directory of the process
    #[test]
    fn relative_paths_are_taken_from_the_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("cd").join("DICOM");
        std::fs::create_dir_all(&images).unwrap();
        write_instance(&images.join("IM1"), "1.2.3.0.1");
        write_instance(&images.join("IM2"), "1.2.3.0.2");
        std::env::set_current_dir(dir.path()).unwrap();

        create(
            Path::new("cd/DICOMDIR"),
            vec![PathBuf::from("cd/DICOM/IM1")],
            "TEST",
            None,
            &write_args(),
            true,
        )
        .unwrap();
        let dicomdir = dir.path().join("cd").join("DICOMDIR");
        assert_eq!(file_ids(&dicomdir), vec![FileId::new(["DICOM", "IM1"]).unwrap()]);

        add(
            Path::new("cd/DICOMDIR"),
            vec![PathBuf::from("cd/DICOM/IM2")],
            &write_args(),
            true,
        )
        .unwrap();
        assert_eq!(
            file_ids(&dicomdir),
            vec![
                FileId::new(["DICOM", "IM1"]).unwrap(),
                FileId::new(["DICOM", "IM2"]).unwrap(),
            ]
        );
    }
}
