//! Ordered collection of pipeline files.
//!
//! The collection is the authoritative mutable state threaded through the
//! phases. Iteration order is insertion order so operator diagnostics and
//! notification summaries are reproducible. Filtered views are iterator
//! adapters over the live records, not snapshots.

use camino::Utf8Path;

use crate::error::FloodgateError;
use crate::file::PipelineFile;

/// An insertion-ordered set of pipeline files keyed by local path.
#[derive(Debug, Default)]
pub struct FileCollection {
    files: Vec<PipelineFile>,
}

impl FileCollection {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file to the collection.
    ///
    /// Rejected with [`FloodgateError::DuplicateFile`] if a record with the
    /// same `local_path` already exists.
    pub fn add(&mut self, file: PipelineFile) -> Result<(), FloodgateError> {
        if self.contains(file.local_path()) {
            return Err(FloodgateError::DuplicateFile(file.local_path().to_owned()));
        }
        self.files.push(file);
        Ok(())
    }

    /// Removes the record with the given local path, if present.
    ///
    /// Returns true if a record was removed. A discarded file cannot
    /// participate in any later phase.
    pub fn discard(&mut self, local_path: &Utf8Path) -> bool {
        let before = self.files.len();
        self.files.retain(|f| f.local_path() != local_path);
        self.files.len() != before
    }

    /// Returns true if a record with the given local path exists.
    pub fn contains(&self, local_path: &Utf8Path) -> bool {
        self.files.iter().any(|f| f.local_path() == local_path)
    }

    /// Returns the record with the given local path, if present.
    pub fn get(&self, local_path: &Utf8Path) -> Option<&PipelineFile> {
        self.files.iter().find(|f| f.local_path() == local_path)
    }

    /// Returns the record with the given local path mutably, if present.
    pub fn get_mut(&mut self, local_path: &Utf8Path) -> Option<&mut PipelineFile> {
        self.files.iter_mut().find(|f| f.local_path() == local_path)
    }

    /// Number of records in the collection.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns true if the collection holds no records.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Iterates records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &PipelineFile> {
        self.files.iter()
    }

    /// Iterates records mutably in insertion order.
    ///
    /// Phases own mutation one at a time; read-side callers should prefer
    /// [`iter`](Self::iter) or the filtered views.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PipelineFile> {
        self.files.iter_mut()
    }

    /// Lazy filtered view over records matching the predicate.
    pub fn filter<'a, P>(&'a self, predicate: P) -> impl Iterator<Item = &'a PipelineFile>
    where
        P: Fn(&PipelineFile) -> bool + 'a,
    {
        self.files.iter().filter(move |f| predicate(f))
    }

    /// Files flagged for archive that have not been archived yet.
    pub fn pending_archive(&self) -> impl Iterator<Item = &PipelineFile> {
        self.filter(|f| f.publish_type().archive && !f.is_archived())
    }

    /// Files with a harvester-class action that have not been harvested yet.
    pub fn pending_harvest(&self) -> impl Iterator<Item = &PipelineFile> {
        self.filter(|f| f.publish_type().has_harvest_action() && !f.is_harvested())
    }

    /// Files with a store-class action that have not been stored yet.
    pub fn pending_store(&self) -> impl Iterator<Item = &PipelineFile> {
        self.filter(|f| f.publish_type().has_store_action() && !f.is_stored())
    }

    /// Files whose check failed.
    pub fn failed_checks(&self) -> impl Iterator<Item = &PipelineFile> {
        self.filter(|f| f.check_result().failed())
    }

    /// Per-file status lines in insertion order, for the notification summary.
    pub fn summary(&self) -> Vec<String> {
        self.files.iter().map(|f| f.status_line()).collect()
    }
}

impl<'a> IntoIterator for &'a FileCollection {
    type Item = &'a PipelineFile;
    type IntoIter = std::slice::Iter<'a, PipelineFile>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.iter()
    }
}
