//! Pipeline file records.
//!
//! A [`PipelineFile`] is the unit of work tracked across phases: where the
//! file lives on scratch, where it came from, what check applies, which
//! publish actions are flagged, and how far each action has progressed.
//! Completion flags are monotonic and destination paths freeze once the
//! corresponding action has completed.

use std::fs::File;
use std::io::{BufReader, Read};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use strum::Display;

use crate::error::FloodgateError;

/// Declared type of a pipeline file, derived from its extension.
///
/// Drives check dispatch: scientific formats are eligible for compliance
/// suites, known formats get structural validation, unknown formats fall
/// back to the minimal nonempty check.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
#[strum(serialize_all = "lowercase")]
pub enum FileType {
    NetCdf,
    Pdf,
    Csv,
    Json,
    Zip,
    #[strum(serialize = "tar.gz")]
    TarGz,
    Manifest,
    Unknown,
}

impl FileType {
    /// Derives the file type from a path's extension.
    pub fn from_path(path: &Utf8Path) -> Self {
        let name = path.file_name().unwrap_or_default().to_ascii_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            return Self::TarGz;
        }
        match path.extension().map(|e| e.to_ascii_lowercase()).as_deref() {
            Some("nc") => Self::NetCdf,
            Some("pdf") => Self::Pdf,
            Some("csv") => Self::Csv,
            Some("json") => Self::Json,
            Some("zip") => Self::Zip,
            Some("manifest") => Self::Manifest,
            _ => Self::Unknown,
        }
    }

    /// Returns true for formats recognised by compliance suites.
    pub fn is_scientific(&self) -> bool {
        matches!(self, Self::NetCdf)
    }

    /// Returns true when the extension was recognised.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// Which validation strategy applies to a file.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
#[strum(serialize_all = "kebab-case")]
pub enum CheckType {
    /// Run the configured compliance suites via the external checker.
    ComplianceSuite,
    /// Structural format validation only (magic bytes, encoding).
    FormatOnly,
    /// Minimal check: the file is nonempty.
    NonEmpty,
}

/// Tri-state check outcome for a pipeline file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CheckResult {
    /// The check phase has not run for this file yet.
    #[default]
    NotChecked,
    Passed,
    /// The check failed; diagnostics carry the checker output.
    Failed {
        /// Collected diagnostics for the notification payload.
        diagnostics: String,
    },
}

impl CheckResult {
    /// Returns true if the check ran and passed.
    pub fn passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    /// Returns true if the check ran and failed.
    pub fn failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// The set of publish actions flagged on a pipeline file.
///
/// Actions are orthogonal: a file may be archived, harvested, and uploaded
/// in the same execution. The one exception is `upload` together with
/// `delete`, which is only legal when `late_deletion` is set on the file
/// (safe-replace pattern, see the publisher).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PublishType {
    /// Copy to the archive sink under `archive_path`.
    pub archive: bool,
    /// Submit to the matching harvester as an addition.
    pub harvest: bool,
    /// Submit to the matching harvester as a deletion.
    pub unharvest: bool,
    /// Transfer to the store sink at `dest_path`.
    pub upload: bool,
    /// Remove `dest_path` from the store sink.
    pub delete: bool,
}

impl PublishType {
    pub const NO_ACTION: Self = Self {
        archive: false,
        harvest: false,
        unharvest: false,
        upload: false,
        delete: false,
    };
    pub const ARCHIVE_ONLY: Self = Self {
        archive: true,
        ..Self::NO_ACTION
    };
    pub const UPLOAD_ONLY: Self = Self {
        upload: true,
        ..Self::NO_ACTION
    };
    pub const HARVEST_ONLY: Self = Self {
        harvest: true,
        ..Self::NO_ACTION
    };
    pub const HARVEST_UPLOAD: Self = Self {
        harvest: true,
        upload: true,
        ..Self::NO_ACTION
    };
    pub const HARVEST_ARCHIVE_UPLOAD: Self = Self {
        archive: true,
        harvest: true,
        upload: true,
        ..Self::NO_ACTION
    };
    pub const DELETE_ONLY: Self = Self {
        delete: true,
        ..Self::NO_ACTION
    };
    pub const DELETE_UNHARVEST: Self = Self {
        unharvest: true,
        delete: true,
        ..Self::NO_ACTION
    };

    /// Returns true if any action is flagged.
    pub fn any(&self) -> bool {
        self.archive || self.harvest || self.unharvest || self.upload || self.delete
    }

    /// Returns true if a store-class action (upload or delete) is flagged.
    pub fn has_store_action(&self) -> bool {
        self.upload || self.delete
    }

    /// Returns true if a harvester-class action is flagged.
    pub fn has_harvest_action(&self) -> bool {
        self.harvest || self.unharvest
    }

    /// Validates the action set against the upload/delete exclusivity rule.
    pub fn validate(&self, late_deletion: bool) -> Result<(), FloodgateError> {
        if self.upload && self.delete && !late_deletion {
            return Err(FloodgateError::Validation(
                "publish type combines upload and delete without late_deletion".to_string(),
            ));
        }
        Ok(())
    }
}

/// Named publish action sets accepted in handler configuration.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum PublishMode {
    NoAction,
    ArchiveOnly,
    UploadOnly,
    HarvestOnly,
    #[default]
    HarvestUpload,
    HarvestArchiveUpload,
    DeleteOnly,
    DeleteUnharvest,
}

impl PublishMode {
    /// Expands the named mode into its action set.
    pub fn to_publish_type(self) -> PublishType {
        match self {
            Self::NoAction => PublishType::NO_ACTION,
            Self::ArchiveOnly => PublishType::ARCHIVE_ONLY,
            Self::UploadOnly => PublishType::UPLOAD_ONLY,
            Self::HarvestOnly => PublishType::HARVEST_ONLY,
            Self::HarvestUpload => PublishType::HARVEST_UPLOAD,
            Self::HarvestArchiveUpload => PublishType::HARVEST_ARCHIVE_UPLOAD,
            Self::DeleteOnly => PublishType::DELETE_ONLY,
            Self::DeleteUnharvest => PublishType::DELETE_UNHARVEST,
        }
    }
}

/// One unit of work tracked across phases.
///
/// Fields guarded by lifecycle invariants (destinations, completion flags,
/// check outcome) are private; everything flows through accessors so the
/// record cannot be driven backwards.
#[derive(Debug, Clone)]
pub struct PipelineFile {
    local_path: Utf8PathBuf,
    source_path: Utf8PathBuf,
    file_type: FileType,
    check_type: CheckType,
    check_result: CheckResult,
    publish_type: PublishType,
    dest_path: Option<Utf8PathBuf>,
    archive_path: Option<Utf8PathBuf>,
    delete_path: Option<Utf8PathBuf>,
    is_stored: bool,
    is_archived: bool,
    is_harvested: bool,
    is_deletion: bool,
    late_deletion: bool,
    checksum: Option<String>,
    mime_type: Option<String>,
    size: Option<u64>,
}

impl PipelineFile {
    /// Creates a record for a locally materialised file.
    ///
    /// `local_path` is where the file lives on scratch; `source_path` is the
    /// path as the uploader named it (used for notifications and destination
    /// derivation).
    pub fn new(local_path: impl Into<Utf8PathBuf>, source_path: impl Into<Utf8PathBuf>) -> Self {
        let local_path = local_path.into();
        let file_type = FileType::from_path(&local_path);
        Self {
            local_path,
            source_path: source_path.into(),
            file_type,
            check_type: CheckType::NonEmpty,
            check_result: CheckResult::NotChecked,
            publish_type: PublishType::NO_ACTION,
            dest_path: None,
            archive_path: None,
            delete_path: None,
            is_stored: false,
            is_archived: false,
            is_harvested: false,
            is_deletion: false,
            late_deletion: false,
            checksum: None,
            mime_type: None,
            size: None,
        }
    }

    /// Creates a record representing a deletion intent.
    ///
    /// There is no local materialisation; the record names the artifact to
    /// remove from the store and catalog. Deletion records pass checks
    /// trivially (there is no content to validate).
    pub fn deletion(source_path: impl Into<Utf8PathBuf>) -> Self {
        let source_path = source_path.into();
        let mut file = Self::new(source_path.clone(), source_path);
        file.is_deletion = true;
        file.check_result = CheckResult::Passed;
        file.publish_type = PublishType::DELETE_UNHARVEST;
        file
    }

    pub fn local_path(&self) -> &Utf8Path {
        &self.local_path
    }

    pub fn source_path(&self) -> &Utf8Path {
        &self.source_path
    }

    /// Returns the file name component of the source path for display.
    pub fn name(&self) -> &str {
        self.source_path.file_name().unwrap_or(self.source_path.as_str())
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    pub fn check_type(&self) -> CheckType {
        self.check_type
    }

    pub fn check_result(&self) -> &CheckResult {
        &self.check_result
    }

    pub fn publish_type(&self) -> PublishType {
        self.publish_type
    }

    pub fn dest_path(&self) -> Option<&Utf8Path> {
        self.dest_path.as_deref()
    }

    pub fn archive_path(&self) -> Option<&Utf8Path> {
        self.archive_path.as_deref()
    }

    /// The store path the delete action targets.
    ///
    /// Defaults to `dest_path`; differs in the safe-replace pattern, where
    /// the upload lands at `dest_path` and the superseded artifact named by
    /// `delete_path` is removed afterwards.
    pub fn delete_target(&self) -> Option<&Utf8Path> {
        self.delete_path.as_deref().or(self.dest_path.as_deref())
    }

    pub fn is_stored(&self) -> bool {
        self.is_stored
    }

    pub fn is_archived(&self) -> bool {
        self.is_archived
    }

    pub fn is_harvested(&self) -> bool {
        self.is_harvested
    }

    pub fn is_deletion(&self) -> bool {
        self.is_deletion
    }

    pub fn late_deletion(&self) -> bool {
        self.late_deletion
    }

    pub fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// Sets the check strategy for this file. Assigned by the checker during
    /// dispatch; handlers may override in `preprocess`.
    pub fn set_check_type(&mut self, check_type: CheckType) {
        self.check_type = check_type;
    }

    /// Records a passed check.
    pub fn record_check_pass(&mut self) {
        self.check_result = CheckResult::Passed;
    }

    /// Records a failed check with the collected diagnostics.
    pub fn record_check_failure(&mut self, diagnostics: impl Into<String>) {
        self.check_result = CheckResult::Failed {
            diagnostics: diagnostics.into(),
        };
    }

    /// Sets the publish action set, validating the upload/delete rule.
    pub fn set_publish_type(&mut self, publish_type: PublishType) -> Result<(), FloodgateError> {
        publish_type.validate(self.late_deletion)?;
        self.publish_type = publish_type;
        Ok(())
    }

    /// Strips all publish actions from this file.
    ///
    /// Used when a handler opts into continue-on-check-failure: failed files
    /// stay in the collection for the notification summary but can no longer
    /// participate in publish.
    pub fn clear_publish_type(&mut self) {
        self.publish_type = PublishType::NO_ACTION;
    }

    /// Enables the deferred-delete-after-upload pattern for this file.
    ///
    /// Must be set before a publish type combining upload and delete.
    pub fn set_late_deletion(&mut self, late_deletion: bool) {
        self.late_deletion = late_deletion;
    }

    /// Sets the target path under the store root.
    ///
    /// Rejected once the file has been stored: the destination of a
    /// completed action is immutable.
    pub fn set_dest_path(&mut self, dest: impl Into<Utf8PathBuf>) -> Result<(), FloodgateError> {
        if self.is_stored {
            return Err(FloodgateError::Invariant(format!(
                "dest_path is immutable after store completed: {}",
                self.local_path
            )));
        }
        self.dest_path = Some(dest.into());
        Ok(())
    }

    /// Sets the target path under the archive root.
    ///
    /// Rejected once the file has been archived.
    pub fn set_archive_path(&mut self, dest: impl Into<Utf8PathBuf>) -> Result<(), FloodgateError> {
        if self.is_archived {
            return Err(FloodgateError::Invariant(format!(
                "archive_path is immutable after archive completed: {}",
                self.local_path
            )));
        }
        self.archive_path = Some(dest.into());
        Ok(())
    }

    /// Names a superseded artifact for the delete action when it differs
    /// from `dest_path`.
    ///
    /// Rejected once the file has been stored.
    pub fn set_delete_path(&mut self, dest: impl Into<Utf8PathBuf>) -> Result<(), FloodgateError> {
        if self.is_stored {
            return Err(FloodgateError::Invariant(format!(
                "delete_path is immutable after store completed: {}",
                self.local_path
            )));
        }
        self.delete_path = Some(dest.into());
        Ok(())
    }

    /// Marks the store action complete. Monotonic.
    pub fn mark_stored(&mut self) {
        self.is_stored = true;
    }

    /// Marks the archive action complete. Monotonic.
    pub fn mark_archived(&mut self) {
        self.is_archived = true;
    }

    /// Marks the harvest action complete. Monotonic except for rollback.
    pub fn mark_harvested(&mut self) {
        self.is_harvested = true;
    }

    /// Reverses `is_harvested` after a compensating harvester deletion.
    ///
    /// Only the publisher's rollback path may call this.
    pub(crate) fn mark_unharvested(&mut self) {
        self.is_harvested = false;
    }

    /// Computes checksum, size, and mime type from the local materialisation.
    ///
    /// Called by the resolver once the file exists on scratch. The checksum
    /// is a lowercase hex SHA-256 digest of the content.
    pub fn compute_metadata(&mut self) -> Result<(), FloodgateError> {
        let metadata = std::fs::metadata(&self.local_path)
            .map_err(|e| FloodgateError::io(format!("failed to stat {}", self.local_path), e))?;
        self.size = Some(metadata.len());
        self.checksum = Some(sha256_hex(&self.local_path)?);
        self.mime_type = mime_guess::from_path(self.local_path.as_std_path())
            .first_raw()
            .map(str::to_string);
        Ok(())
    }

    /// One-line status summary for operator diagnostics and notifications.
    pub fn status_line(&self) -> String {
        let check = match &self.check_result {
            CheckResult::NotChecked => "not-checked",
            CheckResult::Passed => "passed",
            CheckResult::Failed { .. } => "failed",
        };
        format!(
            "{}: check={} stored={} archived={} harvested={}",
            self.name(),
            check,
            self.is_stored,
            self.is_archived,
            self.is_harvested
        )
    }
}

/// Computes the lowercase hex SHA-256 digest of a file's content.
pub(crate) fn sha256_hex(path: &Utf8Path) -> Result<String, FloodgateError> {
    let file = File::open(path)
        .map_err(|e| FloodgateError::io(format!("failed to open {} for checksum", path), e))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let read = reader
            .read(&mut buf)
            .map_err(|e| FloodgateError::io(format!("failed to read {} for checksum", path), e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}
