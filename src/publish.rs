//! Publish coordinator: drive per-file side effects against the sinks.
//!
//! The order of operations is **archive, then harvest, then store**, and it
//! is load-bearing. Harvest-before-store accepts a brief window where a
//! catalog entry references an object not yet visible in the store; in
//! exchange, once store completes both the catalog entry and the object
//! exist. A store failure after a successful harvest submits a compensating
//! deletion to the harvester, shrinking the exposure window. Archive is
//! parallel durability: its failures never roll back harvest or store. Do
//! not reorder these phases without revisiting the rollback protocol.
//!
//! Within each phase files are processed in insertion order, and harvester
//! invocations are serialised across groups.

use tracing::{info, warn};

use crate::collection::FileCollection;
use crate::config::ArchiveFailurePolicy;
use crate::error::FloodgateError;
use crate::file::PipelineFile;
use crate::harvest::{HarvestEvent, HarvesterSet, group_by_harvester};
use crate::sink::Sink;

/// Looks up a collection member that an earlier pass in the same phase
/// observed; absence means the collection was mutated mid-phase.
fn member<'c>(
    collection: &'c FileCollection,
    local_path: &camino::Utf8Path,
) -> Result<&'c PipelineFile, FloodgateError> {
    collection.get(local_path).ok_or_else(|| {
        FloodgateError::Invariant(format!("file vanished from collection: {}", local_path))
    })
}

fn member_mut<'c>(
    collection: &'c mut FileCollection,
    local_path: &camino::Utf8Path,
) -> Result<&'c mut PipelineFile, FloodgateError> {
    collection.get_mut(local_path).ok_or_else(|| {
        FloodgateError::Invariant(format!("file vanished from collection: {}", local_path))
    })
}

/// Coordinates archival, harvesting, and store operations for a collection.
pub struct Publisher {
    archive: Box<dyn Sink>,
    store: Box<dyn Sink>,
    harvesters: HarvesterSet,
    archive_failure: ArchiveFailurePolicy,
}

impl Publisher {
    pub fn new(
        archive: Box<dyn Sink>,
        store: Box<dyn Sink>,
        harvesters: HarvesterSet,
        archive_failure: ArchiveFailurePolicy,
    ) -> Self {
        Self {
            archive,
            store,
            harvesters,
            archive_failure,
        }
    }

    /// Runs the three publish phases over the collection.
    pub fn publish(&self, collection: &mut FileCollection) -> Result<(), FloodgateError> {
        self.preflight(collection)?;
        self.run_archive_phase(collection)?;
        self.run_harvest_phase(collection)?;
        self.run_store_phase(collection)?;
        Ok(())
    }

    /// Verifies the cross-phase contract before touching any sink.
    ///
    /// A failed-check file carrying publish actions, a store-class action
    /// without a destination, or an illegal upload/delete combination means
    /// an upstream phase broke the contract.
    fn preflight(&self, collection: &FileCollection) -> Result<(), FloodgateError> {
        for file in collection.iter() {
            let publish = file.publish_type();
            if file.check_result().failed() && publish.any() {
                return Err(FloodgateError::Invariant(format!(
                    "file with failed check still carries publish actions: {}",
                    file.local_path()
                )));
            }
            publish.validate(file.late_deletion())?;
            if publish.has_store_action() && file.dest_path().is_none() && file.delete_target().is_none()
            {
                return Err(FloodgateError::Invariant(format!(
                    "file has a store action but no dest_path: {}",
                    file.local_path()
                )));
            }
            if publish.upload && file.dest_path().is_none() {
                return Err(FloodgateError::Invariant(format!(
                    "file has an upload action but no dest_path: {}",
                    file.local_path()
                )));
            }
            if publish.archive && file.archive_path().is_none() {
                return Err(FloodgateError::Invariant(format!(
                    "file has an archive action but no archive_path: {}",
                    file.local_path()
                )));
            }
        }
        Ok(())
    }

    /// Copies flagged files to the archive sink.
    ///
    /// Low-risk cold store: failures are fatal or warn-only per handler
    /// configuration, and never roll back anything.
    fn run_archive_phase(&self, collection: &mut FileCollection) -> Result<(), FloodgateError> {
        let pending: Vec<_> = collection
            .pending_archive()
            .map(|f| f.local_path().to_owned())
            .collect();

        for local_path in pending {
            let file = member(collection, &local_path)?;
            let archive_path = file
                .archive_path()
                .ok_or_else(|| {
                    FloodgateError::Invariant(format!(
                        "archive_path cleared after preflight: {}",
                        local_path
                    ))
                })?
                .to_owned();
            match self.archive.put(&local_path, &archive_path) {
                Ok(()) => {
                    info!("archived {} at {}", local_path, archive_path);
                    member_mut(collection, &local_path)?.mark_archived();
                }
                Err(e) => match self.archive_failure {
                    ArchiveFailurePolicy::Fatal => return Err(e),
                    ArchiveFailurePolicy::Warn => {
                        warn!("archive failed for {} (continuing): {}", local_path, e);
                    }
                },
            }
        }
        Ok(())
    }

    /// Invokes each matching harvester once with its group.
    ///
    /// Additions are submitted before deletions within a group. On success
    /// every member is marked harvested.
    fn run_harvest_phase(&self, collection: &mut FileCollection) -> Result<(), FloodgateError> {
        let groups = group_by_harvester(&self.harvesters, collection)?;

        for group in groups {
            let harvester = self.harvesters.get(group.harvester);
            let mut additions = Vec::new();
            let mut deletions = Vec::new();
            for local_path in &group.members {
                let file = member(collection, local_path)?;
                let event = HarvestEvent::from_file(file)?;
                if event.deletion {
                    deletions.push(event);
                } else {
                    additions.push(event);
                }
            }

            if !additions.is_empty() {
                harvester.ingest(&additions)?;
            }
            if !deletions.is_empty() {
                harvester.remove(&deletions)?;
            }
            info!(
                "harvester {} processed {} addition(s), {} deletion(s)",
                harvester.name(),
                additions.len(),
                deletions.len()
            );

            for local_path in &group.members {
                member_mut(collection, local_path)?.mark_harvested();
            }
        }
        Ok(())
    }

    /// Transfers uploads and executes deletes against the store sink.
    ///
    /// For a file flagged upload+delete with `late_deletion`, the delete of
    /// the superseded artifact runs only after its upload succeeded, so
    /// consumers never observe a gap. A store failure aborts the phase:
    /// compensating harvester deletions are submitted for every harvested
    /// file whose store operation did not complete, then the error
    /// propagates.
    fn run_store_phase(&self, collection: &mut FileCollection) -> Result<(), FloodgateError> {
        let pending: Vec<_> = collection
            .pending_store()
            .map(|f| f.local_path().to_owned())
            .collect();

        for (index, local_path) in pending.iter().enumerate() {
            let file = member(collection, local_path)?;
            let publish = file.publish_type();

            if publish.upload {
                let dest = file
                    .dest_path()
                    .ok_or_else(|| {
                        FloodgateError::Invariant(format!(
                            "dest_path cleared after preflight: {}",
                            local_path
                        ))
                    })?
                    .to_owned();
                if let Err(e) = self.store.put(local_path, &dest) {
                    return Err(self.abort_store_phase(collection, &pending[index..], e));
                }
                info!("stored {} at {}", local_path, dest);
            }

            if publish.delete {
                let file = member(collection, local_path)?;
                let target = file
                    .delete_target()
                    .ok_or_else(|| {
                        FloodgateError::Invariant(format!(
                            "delete target cleared after preflight: {}",
                            local_path
                        ))
                    })?
                    .to_owned();
                if let Err(e) = self.store.delete(&target) {
                    return Err(self.abort_store_phase(collection, &pending[index..], e));
                }
                info!("deleted {} from store", target);
            }

            member_mut(collection, local_path)?.mark_stored();
        }
        Ok(())
    }

    /// Compensates every harvested file whose store operation will not run,
    /// starting with the one that failed, then returns the original cause.
    ///
    /// A rollback failure supersedes the cause: a catalog entry that cannot
    /// be withdrawn is the louder problem.
    fn abort_store_phase(
        &self,
        collection: &mut FileCollection,
        unstored: &[camino::Utf8PathBuf],
        cause: FloodgateError,
    ) -> FloodgateError {
        for local_path in unstored {
            if let Err(rollback_err) = self.rollback_harvest(collection, local_path) {
                warn!("store failure cause: {}", cause);
                return rollback_err;
            }
        }
        cause
    }

    /// Submits a compensating harvester deletion for a harvested file whose
    /// store operation did not complete, clearing `is_harvested` on success.
    ///
    /// No-op for files that were never harvested. A harvester that cannot
    /// delete makes this fail loudly.
    fn rollback_harvest(
        &self,
        collection: &mut FileCollection,
        local_path: &camino::Utf8Path,
    ) -> Result<(), FloodgateError> {
        let file = member(collection, local_path)?;
        if !file.is_harvested() || !file.publish_type().harvest {
            return Ok(());
        }
        let dest = file.dest_path().ok_or_else(|| {
            FloodgateError::Invariant(format!(
                "harvested file lost its dest_path: {}",
                local_path
            ))
        })?;
        let index = self.harvesters.route(dest.as_str()).ok_or_else(|| {
            FloodgateError::Invariant(format!(
                "no harvester matches previously harvested dest_path: {}",
                dest
            ))
        })?;
        let mut event = HarvestEvent::from_file(file)?;
        event.deletion = true;

        warn!(
            "store failed after harvest; submitting compensating deletion for {}",
            dest
        );
        self.harvesters.get(index).remove(std::slice::from_ref(&event))?;
        member_mut(collection, local_path)?.mark_unharvested();
        Ok(())
    }
}

/// Assigns default destinations for a resolved file.
///
/// `dest_path` defaults to the source path; `archive_path` mirrors it. A
/// handler's path function replaces the default before publish.
pub fn assign_default_paths(file: &mut PipelineFile) -> Result<(), FloodgateError> {
    if file.dest_path().is_none() {
        let dest = file.source_path().as_str().trim_start_matches('/').to_string();
        file.set_dest_path(dest)?;
    }
    if file.publish_type().archive
        && file.archive_path().is_none()
        && let Some(dest) = file.dest_path().map(|d| d.to_owned())
    {
        file.set_archive_path(dest)?;
    }
    Ok(())
}
