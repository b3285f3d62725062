//! Harvester invocation boundary.
//!
//! A harvester is an external tool that ingests catalog records describing
//! stored artifacts. Files are routed to the first harvester whose
//! configured regex matches their destination path, grouped per harvester,
//! and handed over in a single invocation per group. Invocations are
//! serialised: harvesters are assumed not concurrency-safe.

use std::fs;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::collection::FileCollection;
use crate::config::{HarvesterSection, compile_regex};
use crate::error::FloodgateError;
use crate::executor::{CommandExecutor, CommandSpec};
use crate::file::PipelineFile;

/// One catalog record handed to a harvester.
///
/// Owned snapshot of the fields a harvester consumes, detached from the
/// collection so invocation does not borrow the records being updated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestEvent {
    pub source_path: Utf8PathBuf,
    pub dest_path: Utf8PathBuf,
    pub checksum: Option<String>,
    pub size: Option<u64>,
    pub deletion: bool,
}

impl HarvestEvent {
    /// Builds an event from a pipeline file. The destination path must be
    /// set: it is the catalog key.
    pub fn from_file(file: &PipelineFile) -> Result<Self, FloodgateError> {
        let dest_path = file.dest_path().ok_or_else(|| {
            FloodgateError::Invariant(format!(
                "file has a harvest action but no dest_path: {}",
                file.local_path()
            ))
        })?;
        Ok(Self {
            source_path: file.source_path().to_owned(),
            dest_path: dest_path.to_owned(),
            checksum: file.checksum().map(str::to_string),
            size: file.size(),
            deletion: file.is_deletion() || file.publish_type().unharvest,
        })
    }
}

/// External catalog ingestion tool.
///
/// The two-step interface mirrors the tools in the field: `ingest` uploads
/// records, `remove` deletes them. Tools without deletion support cannot be
/// rolled back; `remove` against one fails loudly.
pub trait Harvester: Send + Sync {
    /// Unique harvester name for logs and grouping.
    fn name(&self) -> &str;

    /// Whether the tool supports the removal step.
    fn supports_deletion(&self) -> bool;

    /// Ingests a group of records in one invocation.
    fn ingest(&self, events: &[HarvestEvent]) -> Result<(), FloodgateError>;

    /// Removes a group of records in one invocation.
    fn remove(&self, events: &[HarvestEvent]) -> Result<(), FloodgateError>;
}

/// Harvester invoked as an external process with a CSV event file.
///
/// The event file is written into the handler's scratch directory and
/// removed after the invocation, success or failure.
pub struct ExecHarvester {
    name: String,
    command: String,
    supports_deletion: bool,
    executor: Arc<dyn CommandExecutor>,
    scratch: Utf8PathBuf,
}

impl ExecHarvester {
    pub fn new(
        name: impl Into<String>,
        command: impl Into<String>,
        supports_deletion: bool,
        executor: Arc<dyn CommandExecutor>,
        scratch: &Utf8Path,
    ) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            supports_deletion,
            executor,
            scratch: scratch.to_owned(),
        }
    }

    fn invoke(&self, action: &str, events: &[HarvestEvent]) -> Result<(), FloodgateError> {
        let event_file = self
            .scratch
            .join(format!("harvest-{}-{}-{}.csv", self.name, action, Uuid::new_v4()));
        write_event_file(&event_file, events)?;
        let _guard = EventFileGuard(&event_file);

        info!(
            "invoking harvester {} {} with {} record(s)",
            self.name,
            action,
            events.len()
        );
        let spec = CommandSpec::new(
            &self.command,
            vec![action.to_string(), event_file.to_string()],
        );
        let result = self
            .executor
            .execute(&spec)
            .map_err(|e| match e.downcast::<FloodgateError>() {
                Ok(typed) => typed,
                Err(e) => FloodgateError::Execution {
                    command: self.command.clone(),
                    status: format!("{:#}", e),
                },
            })?;
        if !result.success() {
            return Err(FloodgateError::execution(&spec, result.status.to_string()));
        }
        Ok(())
    }
}

impl Harvester for ExecHarvester {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_deletion(&self) -> bool {
        self.supports_deletion
    }

    fn ingest(&self, events: &[HarvestEvent]) -> Result<(), FloodgateError> {
        self.invoke("ingest", events)
    }

    fn remove(&self, events: &[HarvestEvent]) -> Result<(), FloodgateError> {
        if !self.supports_deletion {
            return Err(FloodgateError::SinkPermanent {
                sink: self.name.clone(),
                context: "harvester does not support deletion; manual catalog cleanup required"
                    .to_string(),
            });
        }
        self.invoke("remove", events)
    }
}

/// Removes the event file when the invocation scope ends.
struct EventFileGuard<'a>(&'a Utf8Path);

impl Drop for EventFileGuard<'_> {
    fn drop(&mut self) {
        match fs::remove_file(self.0) {
            Ok(()) => debug!("cleaned up event file: {}", self.0),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::error!(path = %self.0, "failed to cleanup event file: {}", e),
        }
    }
}

/// Writes events as a CSV with a fixed header.
fn write_event_file(path: &Utf8Path, events: &[HarvestEvent]) -> Result<(), FloodgateError> {
    let mut out = String::from("source_path,dest_path,checksum,size,deletion\n");
    for event in events {
        out.push_str(&format!(
            "{},{},{},{},{}\n",
            csv_field(event.source_path.as_str()),
            csv_field(event.dest_path.as_str()),
            csv_field(event.checksum.as_deref().unwrap_or("")),
            event.size.map(|s| s.to_string()).unwrap_or_default(),
            event.deletion
        ));
    }
    fs::write(path, out)
        .map_err(|e| FloodgateError::io(format!("failed to write event file {}", path), e))
}

/// Quotes a CSV field when it contains a delimiter or quote.
fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// The configured harvesters with their routing patterns.
pub struct HarvesterSet {
    harvesters: Vec<(Regex, Box<dyn Harvester>)>,
}

impl HarvesterSet {
    /// Builds the set from declarations, constructing exec harvesters that
    /// drop their event files into the given scratch directory.
    pub fn from_config(
        section: &HarvesterSection,
        executor: Arc<dyn CommandExecutor>,
        scratch: &Utf8Path,
    ) -> Result<Self, FloodgateError> {
        let mut harvesters: Vec<(Regex, Box<dyn Harvester>)> = Vec::new();
        for config in &section.harvesters {
            let pattern =
                compile_regex(&config.dest_match, &format!("harvester '{}'", config.name))?;
            harvesters.push((
                pattern,
                Box::new(ExecHarvester::new(
                    &config.name,
                    &config.command,
                    config.supports_deletion,
                    executor.clone(),
                    scratch,
                )),
            ));
        }
        Ok(Self { harvesters })
    }

    /// Builds a set from already-constructed harvesters (used by tests).
    pub fn new(harvesters: Vec<(Regex, Box<dyn Harvester>)>) -> Self {
        Self { harvesters }
    }

    /// Returns the index of the first harvester matching the destination.
    pub fn route(&self, dest_path: &str) -> Option<usize> {
        self.harvesters
            .iter()
            .position(|(pattern, _)| pattern.is_match(dest_path))
    }

    pub fn get(&self, index: usize) -> &dyn Harvester {
        self.harvesters[index].1.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.harvesters.is_empty()
    }
}

/// One harvester invocation group: member local paths in insertion order.
#[derive(Debug)]
pub struct HarvestGroup {
    pub harvester: usize,
    pub members: Vec<Utf8PathBuf>,
}

/// Groups pending harvest files by matching harvester.
///
/// Groups are ordered by their first member's position in the collection; a
/// file with a harvester-class action but no matching harvester is an
/// invariant violation surfaced before any invocation.
pub fn group_by_harvester(
    set: &HarvesterSet,
    collection: &FileCollection,
) -> Result<Vec<HarvestGroup>, FloodgateError> {
    let mut groups: Vec<HarvestGroup> = Vec::new();
    for file in collection.pending_harvest() {
        let dest = file.dest_path().ok_or_else(|| {
            FloodgateError::Invariant(format!(
                "file has a harvest action but no dest_path: {}",
                file.local_path()
            ))
        })?;
        let index = set.route(dest.as_str()).ok_or_else(|| {
            FloodgateError::Config(format!("no harvester matches dest_path: {}", dest))
        })?;
        match groups.iter_mut().find(|g| g.harvester == index) {
            Some(group) => group.members.push(file.local_path().to_owned()),
            None => groups.push(HarvestGroup {
                harvester: index,
                members: vec![file.local_path().to_owned()],
            }),
        }
    }
    Ok(groups)
}
