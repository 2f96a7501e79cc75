//! Download job expansion.
//!
//! Every timestamp of a cadence plan becomes one job per wavelength. A job
//! pairs the remote URL with the local destination:
//!
//! ```text
//! remote: <remote_root>/2022/11/01/H0000/20221101_000000_M_1k.jpg
//! local:  <local_root>/2022/11/01/20221101_000000_M_1k.jpg
//! ```

use std::{
    fmt,
    path::{Path, PathBuf},
};

use chrono::{
    NaiveDateTime,
    format::{Item, StrftimeItems},
};
use serde::Serialize;
use snafu::prelude::*;

use super::{
    cadence::Cadence,
    error::{
        AcquisitionError, InvalidFilenamePatternSnafu, InvalidWavelengthSnafu,
        MissingWavelengthPlaceholderSnafu, NoJobsSnafu, NoWavelengthsSnafu,
    },
};

/// Placeholder substituted with the wavelength before strftime formatting.
pub const WAVELENGTH_PLACEHOLDER: &str = "{wavelength}";

/// HMI 1k magnetogram JPEGs.
pub const HMI_FILENAME_PATTERN: &str = "%Y%m%d_%H%M00_M_1k.jpg";

/// AIA synoptic FITS files, one per wavelength.
pub const AIA_FILENAME_PATTERN: &str = "AIA%Y%m%d_%H%M_{wavelength}.fits";

/// A strftime file name pattern with an optional `{wavelength}` placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenamePattern(String);

impl FilenamePattern {
    /// Validate `pattern`.
    ///
    /// The pattern must be non-empty, must not contain `/`, and every `%`
    /// specifier must be one chrono understands.
    pub fn new(pattern: impl Into<String>) -> Result<Self, AcquisitionError> {
        let pattern = pattern.into();
        ensure!(
            !pattern.is_empty(),
            InvalidFilenamePatternSnafu {
                pattern: pattern.as_str(),
                reason: "pattern is empty",
            }
        );
        ensure!(
            !pattern.contains('/'),
            InvalidFilenamePatternSnafu {
                pattern: pattern.as_str(),
                reason: "pattern must name a file, not a path",
            }
        );
        let probe = pattern.replace(WAVELENGTH_PLACEHOLDER, "w");
        ensure!(
            !StrftimeItems::new(&probe).any(|item| matches!(item, Item::Error)),
            InvalidFilenamePatternSnafu {
                pattern: pattern.as_str(),
                reason: "unknown or incomplete strftime specifier",
            }
        );
        Ok(Self(pattern))
    }

    /// The raw pattern.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the pattern distinguishes wavelengths.
    pub fn has_wavelength(&self) -> bool {
        self.0.contains(WAVELENGTH_PLACEHOLDER)
    }

    /// File name for `timestamp` and `wavelength`.
    pub fn render(&self, timestamp: &NaiveDateTime, wavelength: &str) -> String {
        // `%` in a wavelength must survive strftime literally.
        let fmt = self
            .0
            .replace(WAVELENGTH_PLACEHOLDER, &wavelength.replace('%', "%%"));
        timestamp.format(&fmt).to_string()
    }
}

impl Default for FilenamePattern {
    fn default() -> Self {
        Self(HMI_FILENAME_PATTERN.to_string())
    }
}

impl fmt::Display for FilenamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One remote file to retrieve and where to store it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadJob {
    /// Target timestamp.
    pub timestamp: NaiveDateTime,
    /// Wavelength identifier.
    pub wavelength: String,
    /// Remote URL.
    pub remote: String,
    /// Local destination path.
    pub local: PathBuf,
}

/// Remote/local layout shared by all jobs of a plan.
#[derive(Debug, Clone)]
pub struct JobTemplate {
    remote_root: String,
    local_root: PathBuf,
    pattern: FilenamePattern,
}

impl JobTemplate {
    /// Build a template.
    pub fn new(
        remote_root: impl Into<String>,
        local_root: impl Into<PathBuf>,
        pattern: FilenamePattern,
    ) -> Self {
        Self {
            remote_root: remote_root.into(),
            local_root: local_root.into(),
            pattern,
        }
    }

    /// Local root directory.
    pub fn local_root(&self) -> &Path {
        &self.local_root
    }

    /// The job for `timestamp` and `wavelength`.
    pub fn job(&self, timestamp: NaiveDateTime, wavelength: &str) -> DownloadJob {
        let file_name = self.pattern.render(&timestamp, wavelength);
        let remote = format!(
            "{}/{}/{file_name}",
            self.remote_root.trim_end_matches('/'),
            timestamp.format("%Y/%m/%d/H%H00")
        );
        let local = self
            .local_root
            .join(timestamp.format("%Y/%m/%d").to_string())
            .join(&file_name);
        DownloadJob {
            timestamp,
            wavelength: wavelength.to_string(),
            remote,
            local,
        }
    }
}

/// Check the wavelength list against the file name pattern.
pub fn validate_wavelengths(
    wavelengths: &[String],
    pattern: &FilenamePattern,
) -> Result<(), AcquisitionError> {
    ensure!(!wavelengths.is_empty(), NoWavelengthsSnafu);
    for wavelength in wavelengths {
        ensure!(
            !wavelength.is_empty() && !wavelength.contains('/'),
            InvalidWavelengthSnafu {
                wavelength: wavelength.as_str(),
            }
        );
    }
    ensure!(
        wavelengths.len() == 1 || pattern.has_wavelength(),
        MissingWavelengthPlaceholderSnafu {
            pattern: pattern.as_str(),
            count: wavelengths.len(),
        }
    );
    Ok(())
}

/// Expand a cadence plan into jobs, chronologically then by wavelength.
///
/// # Errors
///
/// Wavelength validation errors, and [`AcquisitionError::NoJobs`] when the
/// normalized range is empty.
pub fn plan_jobs(
    cadence: Cadence,
    start: NaiveDateTime,
    end: NaiveDateTime,
    wavelengths: &[String],
    template: &JobTemplate,
) -> Result<Vec<DownloadJob>, AcquisitionError> {
    validate_wavelengths(wavelengths, &template.pattern)?;

    let plan = cadence.plan(start, end);
    let first = plan.current();
    let jobs: Vec<DownloadJob> = plan
        .flat_map(|ts| wavelengths.iter().map(move |w| template.job(ts, w)))
        .collect();

    ensure!(!jobs.is_empty(), NoJobsSnafu { start: first, end });
    Ok(jobs)
}
