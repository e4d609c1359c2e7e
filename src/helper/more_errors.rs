use std::{error, fmt, io};

#[derive(Debug)]
pub enum IoError {
    ReadFileFailed(String, io::Error),
    FileNotFound(String),
    WriteFileFailed(String, io::Error),
    CreateDirectoryFailed(String, io::Error),
    SerializeFailed(bincode::Error),
    DeserializeFailed(bincode::Error),
    /// The file is shorter than the precursor bytes or the precursor bytes don't match
    InvalidPrecursor(String),
}

impl IoError {
    /// Sorts out a not found error from other read failures
    pub fn read_file_error(error: io::Error, file_path: String) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound => Self::FileNotFound(file_path),
            _ => Self::ReadFileFailed(file_path, error),
        }
    }
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::ReadFileFailed(path, e) => write!(f, "failed to read file {}: {}", path, e),
            Self::FileNotFound(path) => write!(f, "file {} not found", path),
            Self::WriteFileFailed(path, e) => write!(f, "failed to write file {}: {}", path, e),
            Self::CreateDirectoryFailed(dir, e) => {
                write!(f, "failed to create directory {}: {}", dir, e)
            }
            Self::SerializeFailed(e) => write!(f, "serialization failed: {}", e),
            Self::DeserializeFailed(e) => write!(f, "deserialization failed: {}", e),
            Self::InvalidPrecursor(path) => {
                write!(f, "file {} was not written by this engine version", path)
            }
        }
    }
}

impl error::Error for IoError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::ReadFileFailed(_, e) => Some(e),
            Self::WriteFileFailed(_, e) => Some(e),
            Self::CreateDirectoryFailed(_, e) => Some(e),
            Self::SerializeFailed(e) => Some(e),
            Self::DeserializeFailed(e) => Some(e),
            Self::FileNotFound(_) | Self::InvalidPrecursor(_) => None,
        }
    }
}
