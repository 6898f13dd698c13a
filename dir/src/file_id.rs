//! Referenced file IDs.
//!
//! A file ID locates a file of the file-set
//! as a list of path components relative to the file-set root directory
//! (the directory containing the `DICOMDIR` file).
//! It is stored in the _Referenced File ID_ attribute (0004,1500),
//! one component per value.
use crate::{InvalidFileIdSnafu, NoFileSetRootSnafu, OutsideFileSetSnafu, Result};
use snafu::{ensure, OptionExt};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// The maximum number of components in a conformant file ID.
pub const MAX_COMPONENTS: usize = 8;

/// The maximum length of each component in a conformant file ID.
pub const MAX_COMPONENT_LEN: usize = 8;

/// The location of a file relative to the file-set root.
#[derive(Debug, Clone, Eq, Hash, PartialEq)]
pub struct FileId {
    components: Vec<String>,
}

impl FileId {
    /// Create a file ID out of its path components.
    ///
    /// Components must be non-empty
    /// and cannot contain a backslash or a path separator.
    /// Conformance to the media storage rules
    /// (see [`is_conformant`](FileId::is_conformant))
    /// is not required here.
    pub fn new<I, T>(components: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let components: Vec<String> = components.into_iter().map(Into::into).collect();
        let id = components.join("\\");
        ensure!(
            !components.is_empty(),
            InvalidFileIdSnafu {
                id,
                reason: "no path components",
            }
        );
        for c in &components {
            ensure!(
                !c.trim().is_empty(),
                InvalidFileIdSnafu {
                    id: id.clone(),
                    reason: "empty path component",
                }
            );
            ensure!(
                !c.contains(|ch| ch == '\\' || ch == '/'),
                InvalidFileIdSnafu {
                    id: id.clone(),
                    reason: "path separator in component",
                }
            );
        }
        Ok(FileId { components })
    }

    /// Derive the file ID of a file in the file-set,
    /// given its path and the file-set root directory.
    ///
    /// Relative paths are interpreted as relative to the root.
    /// If `root` is `None`, only relative paths can be resolved.
    pub fn from_path(path: &Path, root: Option<&Path>) -> Result<Self> {
        let relative = if path.is_absolute() {
            let root = root.context(NoFileSetRootSnafu { path })?;
            path.strip_prefix(root)
                .ok()
                .context(OutsideFileSetSnafu { path, root })?
        } else {
            path
        };

        let mut components = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(c) => components.push(c.to_string_lossy().into_owned()),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return OutsideFileSetSnafu {
                        path,
                        root: root.unwrap_or_else(|| Path::new("")),
                    }
                    .fail();
                }
            }
        }
        FileId::new(components)
    }

    /// The path components of this file ID.
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Resolve this file ID into a file path under the given root directory.
    pub fn to_path(&self, root: impl AsRef<Path>) -> PathBuf {
        let mut path = root.as_ref().to_path_buf();
        path.extend(&self.components);
        path
    }

    /// Check whether this file ID follows the media storage file naming rules:
    /// at most 8 components,
    /// each made of 1 to 8 upper case letters, digits or underscores.
    pub fn is_conformant(&self) -> bool {
        self.components.len() <= MAX_COMPONENTS
            && self.components.iter().all(|c| {
                c.len() <= MAX_COMPONENT_LEN
                    && c
                        .chars()
                        .all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit() || ch == '_')
            })
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.components.join("\\"))
    }
}

/// Where the instance file being indexed is located.
#[derive(Debug, Clone, Eq, Hash, PartialEq)]
pub enum FileLocation {
    /// A path in the file system,
    /// converted to a file ID relative to the file-set root.
    Path(PathBuf),
    /// An explicit file ID
    FileId(FileId),
}

impl From<PathBuf> for FileLocation {
    fn from(path: PathBuf) -> Self {
        FileLocation::Path(path)
    }
}

impl From<&Path> for FileLocation {
    fn from(path: &Path) -> Self {
        FileLocation::Path(path.to_path_buf())
    }
}

impl From<FileId> for FileLocation {
    fn from(id: FileId) -> Self {
        FileLocation::FileId(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn file_id_from_components() {
        let id = FileId::new(["DICOM", "IM0001"]).unwrap();
        assert_eq!(id.components(), &["DICOM".to_string(), "IM0001".to_string()]);
        assert_eq!(id.to_string(), "DICOM\\IM0001");
        assert!(id.is_conformant());

        let id = FileId::new(["images", "ct-0001.dcm"]).unwrap();
        assert!(!id.is_conformant());

        assert!(matches!(
            FileId::new(Vec::<String>::new()),
            Err(Error::InvalidFileId { .. })
        ));
        assert!(matches!(
            FileId::new(["A", ""]),
            Err(Error::InvalidFileId { .. })
        ));
        assert!(matches!(
            FileId::new(["A\\B"]),
            Err(Error::InvalidFileId { .. })
        ));
    }

    #[test]
    fn file_id_from_absolute_path() {
        let root = Path::new("/media/cdrom");
        let id = FileId::from_path(Path::new("/media/cdrom/DICOM/ST1/IM1"), Some(root)).unwrap();
        assert_eq!(id.components(), &["DICOM", "ST1", "IM1"]);
        assert_eq!(id.to_path(root), Path::new("/media/cdrom/DICOM/ST1/IM1"));
    }

    #[test]
    fn file_id_from_relative_path() {
        let id = FileId::from_path(Path::new("./DICOM/IM1"), None).unwrap();
        assert_eq!(id.components(), &["DICOM", "IM1"]);
    }

    #[test]
    fn file_id_outside_of_file_set() {
        let root = Path::new("/media/cdrom");
        assert!(matches!(
            FileId::from_path(Path::new("/home/user/IM1"), Some(root)),
            Err(Error::OutsideFileSet { .. })
        ));
        assert!(matches!(
            FileId::from_path(Path::new("../IM1"), Some(root)),
            Err(Error::OutsideFileSet { .. })
        ));
        assert!(matches!(
            FileId::from_path(Path::new("/media/cdrom/IM1"), None),
            Err(Error::NoFileSetRoot { .. })
        ));
    }
}
