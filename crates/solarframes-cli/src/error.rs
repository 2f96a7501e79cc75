use snafu::Snafu;
use solarframes_core::{AcquisitionError, DatasetError, ErrorCategory, storage::StorageError};

pub type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display("Invalid --channel list: {source}"))]
    InvalidChannels { source: DatasetError },

    #[snafu(display("Failed to open dataset at {dir}: {source}"))]
    OpenDataset {
        dir: String,
        #[snafu(source(from(DatasetError, Box::new)))]
        source: Box<DatasetError>,
    },

    #[snafu(display("Cannot read frame '{query}': {source}"))]
    ReadFrame {
        query: String,
        #[snafu(source(from(DatasetError, Box::new)))]
        source: Box<DatasetError>,
    },

    #[snafu(display("Failed to write frame to {path}: {source}"))]
    WriteFrame { path: String, source: StorageError },

    #[snafu(display("Acquisition failed: {source}"))]
    Acquisition { source: AcquisitionError },
}

impl CliError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            CliError::InvalidChannels { source } => source.category(),
            CliError::OpenDataset { source, .. } | CliError::ReadFrame { source, .. } => {
                source.category()
            }
            CliError::WriteFrame { .. } => ErrorCategory::Io,
            CliError::Acquisition { source } => source.category(),
        }
    }
}
