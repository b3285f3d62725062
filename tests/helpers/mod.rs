#![allow(dead_code)]

use std::collections::BTreeSet;
use std::io::Write;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::sync::{Arc, Mutex};

use camino::{Utf8Path, Utf8PathBuf};
use floodgate::FloodgateError;
use floodgate::config::{Settings, load_settings};
use floodgate::executor::{CommandExecutor, CommandSpec, ExecutionResult};
use floodgate::file::{PipelineFile, PublishType};
use floodgate::harvest::{HarvestEvent, Harvester};
use floodgate::notify::{Notification, Notifier};
use floodgate::runtime::Disposition;
use floodgate::sink::Sink;
use tempfile::NamedTempFile;

#[macro_export]
macro_rules! yaml {
    ($content:literal) => {
        $crate::helpers::dedent($content)
    };
}

pub fn dedent(input: &str) -> String {
    let mut lines: Vec<&str> = input.lines().collect();
    while matches!(lines.first(), Some(line) if line.trim().is_empty()) {
        lines.remove(0);
    }
    while matches!(lines.last(), Some(line) if line.trim().is_empty()) {
        lines.pop();
    }

    let min_indent = lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            line.as_bytes()
                .iter()
                .take_while(|ch| **ch == b' ' || **ch == b'\t')
                .count()
        })
        .min()
        .unwrap_or(0);

    let mut out = String::new();
    for (idx, line) in lines.iter().enumerate() {
        let trimmed = if line.len() >= min_indent {
            &line[min_indent..]
        } else {
            ""
        };
        out.push_str(trimmed);
        if idx + 1 < lines.len() {
            out.push('\n');
        }
    }
    out.push('\n');
    out
}

/// Loads Settings from YAML content in a temporary file.
pub fn load_settings_from_yaml(
    yaml: impl AsRef<str>,
) -> std::result::Result<Settings, FloodgateError> {
    let yaml = yaml.as_ref();
    let mut file = NamedTempFile::new().expect("failed to create temp file");
    file.write_all(yaml.as_bytes()).expect("failed to write yaml");
    if !yaml.ends_with('\n') {
        writeln!(file).expect("failed to write trailing newline");
    }
    let path = Utf8Path::from_path(file.path()).expect("temp file path should be valid");
    load_settings(path)
}

/// Converts a std path into a Utf8PathBuf, panicking on non-UTF-8.
pub fn utf8(path: std::path::PathBuf) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(path).expect("path should be valid UTF-8")
}

/// Writes a file under the given directory, creating parents as needed.
pub fn write_file(dir: &Utf8Path, name: &str, content: &[u8]) -> Utf8PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("failed to create parent directories");
    }
    std::fs::write(&path, content).expect("failed to write file");
    path
}

/// Creates a zip archive at `path` with the given entries.
pub fn make_zip(path: &Utf8Path, entries: &[(&str, &[u8])]) {
    let file = std::fs::File::create(path).expect("failed to create zip file");
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();
    for (name, content) in entries {
        writer.start_file(*name, options).expect("failed to start zip entry");
        writer.write_all(content).expect("failed to write zip entry");
    }
    writer.finish().expect("failed to finish zip archive");
}

// =============================================================================
// Mock infrastructure
// =============================================================================

/// Records executed commands in order, optionally failing on specific calls.
pub struct MockExecutor {
    calls: Mutex<Vec<CommandSpec>>,
    /// If set, the Nth call (0-indexed) will exit nonzero.
    fail_on_call: Option<usize>,
    /// Stderr content produced by failing calls.
    failure_output: String,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_on_call: None,
            failure_output: String::new(),
        }
    }

    pub fn failing_on(call_index: usize, failure_output: impl Into<String>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_on_call: Some(call_index),
            failure_output: failure_output.into(),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }
}

impl CommandExecutor for MockExecutor {
    fn execute(&self, spec: &CommandSpec) -> anyhow::Result<ExecutionResult> {
        let mut calls = self.calls.lock().unwrap();
        let index = calls.len();
        calls.push(spec.clone());
        drop(calls);

        if self.fail_on_call == Some(index) {
            Ok(ExecutionResult {
                status: ExitStatus::from_raw(1 << 8),
                stdout: String::new(),
                stderr: self.failure_output.clone(),
            })
        } else {
            Ok(ExecutionResult {
                status: ExitStatus::from_raw(0),
                stdout: String::new(),
                stderr: String::new(),
            })
        }
    }
}

/// Shares a mock executor with code taking `Arc<dyn CommandExecutor>`.
pub struct SharedExecutor(pub Arc<MockExecutor>);

impl CommandExecutor for SharedExecutor {
    fn execute(&self, spec: &CommandSpec) -> anyhow::Result<ExecutionResult> {
        self.0.execute(spec)
    }
}

/// In-memory sink that records operations and tracks stored paths.
#[derive(Debug)]
pub struct MockSink {
    label: &'static str,
    objects: Mutex<BTreeSet<Utf8PathBuf>>,
    ops: Mutex<Vec<String>>,
    /// Puts whose remote path contains this substring fail permanently.
    fail_put_containing: Option<String>,
    /// Deletes whose remote path contains this substring fail permanently.
    fail_delete_containing: Option<String>,
}

impl MockSink {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            objects: Mutex::new(BTreeSet::new()),
            ops: Mutex::new(Vec::new()),
            fail_put_containing: None,
            fail_delete_containing: None,
        }
    }

    pub fn failing_put(label: &'static str, substring: impl Into<String>) -> Self {
        Self {
            fail_put_containing: Some(substring.into()),
            ..Self::new(label)
        }
    }

    pub fn failing_delete(label: &'static str, substring: impl Into<String>) -> Self {
        Self {
            fail_delete_containing: Some(substring.into()),
            ..Self::new(label)
        }
    }

    /// Seeds an already-present object, as if stored by an earlier execution.
    pub fn seed(&self, remote: &str) {
        self.objects.lock().unwrap().insert(Utf8PathBuf::from(remote));
    }

    pub fn contains(&self, remote: &str) -> bool {
        self.objects.lock().unwrap().contains(Utf8Path::new(remote))
    }

    /// Recorded operations in order, e.g. `"put data/a.nc"`.
    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    fn permanent(&self, context: String) -> FloodgateError {
        FloodgateError::SinkPermanent {
            sink: self.label.to_string(),
            context,
        }
    }
}

impl Sink for MockSink {
    fn name(&self) -> &'static str {
        self.label
    }

    fn put(&self, _local: &Utf8Path, remote: &Utf8Path) -> Result<(), FloodgateError> {
        self.ops.lock().unwrap().push(format!("put {}", remote));
        if let Some(substring) = &self.fail_put_containing
            && remote.as_str().contains(substring.as_str())
        {
            return Err(self.permanent(format!("simulated put failure: {}", remote)));
        }
        self.objects.lock().unwrap().insert(remote.to_owned());
        Ok(())
    }

    fn delete(&self, remote: &Utf8Path) -> Result<(), FloodgateError> {
        self.ops.lock().unwrap().push(format!("delete {}", remote));
        if let Some(substring) = &self.fail_delete_containing
            && remote.as_str().contains(substring.as_str())
        {
            return Err(self.permanent(format!("simulated delete failure: {}", remote)));
        }
        self.objects.lock().unwrap().remove(remote);
        Ok(())
    }

    fn query(&self, remote: &Utf8Path) -> Result<bool, FloodgateError> {
        self.ops.lock().unwrap().push(format!("query {}", remote));
        Ok(self.objects.lock().unwrap().contains(remote))
    }
}

/// Shares a mock sink with code taking `Box<dyn Sink>`.
#[derive(Debug)]
pub struct SharedSink(pub Arc<MockSink>);

impl Sink for SharedSink {
    fn name(&self) -> &'static str {
        self.0.name()
    }

    fn put(&self, local: &Utf8Path, remote: &Utf8Path) -> Result<(), FloodgateError> {
        self.0.put(local, remote)
    }

    fn delete(&self, remote: &Utf8Path) -> Result<(), FloodgateError> {
        self.0.delete(remote)
    }

    fn query(&self, remote: &Utf8Path) -> Result<bool, FloodgateError> {
        self.0.query(remote)
    }
}

/// Records harvester invocations, optionally failing them.
pub struct MockHarvester {
    name: String,
    supports_deletion: bool,
    fail_ingest: bool,
    fail_remove: bool,
    ingested: Mutex<Vec<Vec<HarvestEvent>>>,
    removed: Mutex<Vec<Vec<HarvestEvent>>>,
}

impl MockHarvester {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            supports_deletion: true,
            fail_ingest: false,
            fail_remove: false,
            ingested: Mutex::new(Vec::new()),
            removed: Mutex::new(Vec::new()),
        }
    }

    pub fn without_deletion(name: impl Into<String>) -> Self {
        Self {
            supports_deletion: false,
            ..Self::new(name)
        }
    }

    pub fn failing_ingest(name: impl Into<String>) -> Self {
        Self {
            fail_ingest: true,
            ..Self::new(name)
        }
    }

    /// Groups submitted to ingest, in invocation order.
    pub fn ingested(&self) -> Vec<Vec<HarvestEvent>> {
        self.ingested.lock().unwrap().clone()
    }

    /// Groups submitted to remove, in invocation order.
    pub fn removed(&self) -> Vec<Vec<HarvestEvent>> {
        self.removed.lock().unwrap().clone()
    }
}

impl Harvester for MockHarvester {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_deletion(&self) -> bool {
        self.supports_deletion
    }

    fn ingest(&self, events: &[HarvestEvent]) -> Result<(), FloodgateError> {
        self.ingested.lock().unwrap().push(events.to_vec());
        if self.fail_ingest {
            return Err(FloodgateError::Execution {
                command: self.name.clone(),
                status: "simulated ingest failure".to_string(),
            });
        }
        Ok(())
    }

    fn remove(&self, events: &[HarvestEvent]) -> Result<(), FloodgateError> {
        if !self.supports_deletion {
            return Err(FloodgateError::SinkPermanent {
                sink: self.name.clone(),
                context: "harvester does not support deletion".to_string(),
            });
        }
        self.removed.lock().unwrap().push(events.to_vec());
        if self.fail_remove {
            return Err(FloodgateError::Execution {
                command: self.name.clone(),
                status: "simulated remove failure".to_string(),
            });
        }
        Ok(())
    }
}

/// Shares a mock harvester with code taking `Box<dyn Harvester>`.
pub struct SharedHarvester(pub Arc<MockHarvester>);

impl Harvester for SharedHarvester {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn supports_deletion(&self) -> bool {
        self.0.supports_deletion()
    }

    fn ingest(&self, events: &[HarvestEvent]) -> Result<(), FloodgateError> {
        self.0.ingest(events)
    }

    fn remove(&self, events: &[HarvestEvent]) -> Result<(), FloodgateError> {
        self.0.remove(events)
    }
}

/// Captured notification fields, detached from the payload's lifetime.
#[derive(Debug, Clone)]
pub struct SentNotification {
    pub recipients: Vec<String>,
    pub disposition: Disposition,
    pub error: Option<String>,
    pub error_kind: Option<String>,
    pub summary: Vec<String>,
}

/// Records every notification it is asked to deliver.
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentNotification>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, recipients: &[String], notification: &Notification) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(SentNotification {
            recipients: recipients.to_vec(),
            disposition: notification.disposition,
            error: notification.error.clone(),
            error_kind: notification.error_kind.clone(),
            summary: notification.summary.clone(),
        });
        if self.fail {
            anyhow::bail!("simulated notification failure");
        }
        Ok(())
    }
}

/// Shares a recording notifier with code taking `Box<dyn Notifier>`.
pub struct SharedNotifier(pub Arc<RecordingNotifier>);

impl Notifier for SharedNotifier {
    fn send(&self, recipients: &[String], notification: &Notification) -> anyhow::Result<()> {
        self.0.send(recipients, notification)
    }
}

/// Creates a checked, destination-assigned pipeline file backed by a real
/// file on disk.
pub fn publishable_file(
    dir: &Utf8Path,
    name: &str,
    content: &[u8],
    publish: PublishType,
) -> PipelineFile {
    let local = write_file(dir, name, content);
    let mut file = PipelineFile::new(local, name);
    file.compute_metadata().expect("metadata computation failed");
    file.record_check_pass();
    file.set_publish_type(publish).expect("publish type rejected");
    file.set_dest_path(name).expect("dest path rejected");
    if publish.archive {
        file.set_archive_path(name).expect("archive path rejected");
    }
    file
}
