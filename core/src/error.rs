use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Is a directory: {0}")]
    IsADirectory(String),

    #[error("No space left: {0}")]
    NoSpace(String),

    #[error("Invalid name: {0}")]
    NameInvalid(String),

    #[error("Directory not empty: {0}")]
    NotEmpty(String),

    #[error("Filesystem corrupt: {0}")]
    Corrupt(String),

    #[error("Cluster chain loop detected starting at cluster {0}")]
    FatLoop(u32),

    #[error("Bad cluster in chain: {0}")]
    BadCluster(u32),

    #[error("Not supported: {0}")]
    NotSupported(String),
}

pub type FsResult<T> = Result<T, FsError>;

impl FsError {
    /// Negative status code for callers that still speak integer statuses.
    pub fn code(&self) -> i32 {
        match self {
            FsError::IoError(_) => -1,
            FsError::InvalidArgument(_) => -2,
            FsError::NotFound(_) => -3,
            FsError::AlreadyExists(_) => -4,
            FsError::NotADirectory(_) => -5,
            FsError::IsADirectory(_) => -6,
            FsError::NoSpace(_) => -7,
            FsError::NameInvalid(_) => -8,
            FsError::NotEmpty(_) => -9,
            FsError::Corrupt(_) => -10,
            FsError::FatLoop(_) => -11,
            FsError::BadCluster(_) => -12,
            FsError::NotSupported(_) => -13,
        }
    }

    /// True for the corruption class (`Corrupt`, `FatLoop`, `BadCluster`).
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            FsError::Corrupt(_) | FsError::FatLoop(_) | FsError::BadCluster(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_negative_and_distinct() {
        let errors = vec![
            FsError::IoError(std::io::Error::new(std::io::ErrorKind::Other, "x")),
            FsError::InvalidArgument(String::new()),
            FsError::NotFound(String::new()),
            FsError::AlreadyExists(String::new()),
            FsError::NotADirectory(String::new()),
            FsError::IsADirectory(String::new()),
            FsError::NoSpace(String::new()),
            FsError::NameInvalid(String::new()),
            FsError::NotEmpty(String::new()),
            FsError::Corrupt(String::new()),
            FsError::FatLoop(2),
            FsError::BadCluster(3),
            FsError::NotSupported(String::new()),
        ];

        let mut codes: Vec<i32> = errors.iter().map(|e| e.code()).collect();
        assert!(codes.iter().all(|&c| c < 0));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_corruption_class() {
        assert!(FsError::FatLoop(5).is_corruption());
        assert!(FsError::Corrupt("bad bpb".into()).is_corruption());
        assert!(!FsError::NotFound("x".into()).is_corruption());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        let err: FsError = io.into();
        assert!(matches!(err, FsError::IoError(_)));
        assert!(err.to_string().contains("short read"));
    }
}
