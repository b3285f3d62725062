//! Input resolution: populate the file collection from a deposited input.
//!
//! The input kind is identified by extension first, then by content sniff:
//! archives are expanded into the scratch directory, manifests are
//! dereferenced in place with no copy, and anything else is copied into
//! scratch as a single file. Archive entries with absolute paths or `..`
//! segments are rejected. After resolution every record's local path exists
//! and is readable, with checksum, size, and mime type populated.

use std::fs::{self, File};
use std::io::{BufReader, Read};

use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::GzDecoder;
use regex::Regex;
use tracing::{debug, info};

use crate::collection::FileCollection;
use crate::config::{HandlerConfig, compile_regex};
use crate::error::FloodgateError;
use crate::file::PipelineFile;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
/// "ustar" at offset 257 of the first tar header block.
const TAR_MAGIC_OFFSET: usize = 257;
const TAR_MAGIC: &[u8] = b"ustar";

/// Include/exclude regex filter applied to source paths during resolve.
///
/// A file is retained when it matches the include pattern (if configured)
/// and does not match the exclude pattern (if configured). Excluded files
/// are never materialised and cannot participate in any later phase.
#[derive(Debug, Default)]
pub struct FileFilter {
    include: Option<Regex>,
    exclude: Option<Regex>,
}

impl FileFilter {
    /// Builds the filter from a handler's configured patterns.
    pub fn from_handler(config: &HandlerConfig) -> Result<Self, FloodgateError> {
        let include = config
            .include
            .as_deref()
            .map(|p| compile_regex(p, "include filter"))
            .transpose()?;
        let exclude = config
            .exclude
            .as_deref()
            .map(|p| compile_regex(p, "exclude filter"))
            .transpose()?;
        Ok(Self { include, exclude })
    }

    /// Returns true when the source path passes the filter.
    pub fn retains(&self, source_path: &str) -> bool {
        if let Some(include) = &self.include
            && !include.is_match(source_path)
        {
            return false;
        }
        if let Some(exclude) = &self.exclude
            && exclude.is_match(source_path)
        {
            return false;
        }
        true
    }
}

/// The kind of input deposited for processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputKind {
    ZipArchive,
    TarArchive,
    Manifest,
    Single,
}

/// Identifies the input kind by extension, falling back to a content sniff.
fn detect_kind(input: &Utf8Path) -> Result<InputKind, FloodgateError> {
    let name = input.file_name().unwrap_or_default().to_ascii_lowercase();
    if name.ends_with(".zip") {
        return Ok(InputKind::ZipArchive);
    }
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") || name.ends_with(".tar") {
        return Ok(InputKind::TarArchive);
    }
    if name.ends_with(".manifest") {
        return Ok(InputKind::Manifest);
    }

    let mut header = [0u8; 512];
    let mut file = File::open(input)
        .map_err(|e| FloodgateError::io(format!("failed to open input {}", input), e))?;
    let read = file
        .read(&mut header)
        .map_err(|e| FloodgateError::io(format!("failed to read input {}", input), e))?;
    let header = &header[..read];

    if header.starts_with(ZIP_MAGIC) {
        return Ok(InputKind::ZipArchive);
    }
    if header.starts_with(GZIP_MAGIC) {
        return Ok(InputKind::TarArchive);
    }
    if header.len() >= TAR_MAGIC_OFFSET + TAR_MAGIC.len()
        && &header[TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + TAR_MAGIC.len()] == TAR_MAGIC
    {
        return Ok(InputKind::TarArchive);
    }
    Ok(InputKind::Single)
}

/// Populates a collection from the deposited input.
///
/// `scratch` must already exist; expanded and copied files are materialised
/// beneath it. Excluded files are logged and skipped before any copy.
pub fn resolve_input(
    input: &Utf8Path,
    scratch: &Utf8Path,
    filter: &FileFilter,
) -> Result<FileCollection, FloodgateError> {
    let metadata = fs::metadata(input)
        .map_err(|e| FloodgateError::io(format!("failed to stat input {}", input), e))?;
    if !metadata.is_file() {
        return Err(FloodgateError::InvalidInput(format!(
            "input is not a regular file: {}",
            input
        )));
    }

    let kind = detect_kind(input)?;
    debug!("resolved input kind for {}: {:?}", input, kind);

    let mut collection = FileCollection::new();
    match kind {
        InputKind::ZipArchive => expand_zip(input, scratch, filter, &mut collection)?,
        InputKind::TarArchive => expand_tar(input, scratch, filter, &mut collection)?,
        InputKind::Manifest => read_manifest(input, filter, &mut collection)?,
        InputKind::Single => add_single(input, scratch, filter, &mut collection)?,
    }

    for file in collection.iter_mut() {
        file.compute_metadata()?;
    }

    info!("resolved {} file(s) from {}", collection.len(), input);
    Ok(collection)
}

/// Rejects archive entry names with absolute paths or `..` segments.
fn validate_entry_path(raw: &str, archive: &Utf8Path) -> Result<Utf8PathBuf, FloodgateError> {
    let path = Utf8Path::new(raw);
    if path.is_absolute() {
        return Err(FloodgateError::Resolve(format!(
            "archive {} contains entry with absolute path: {}",
            archive, raw
        )));
    }
    if path
        .components()
        .any(|c| c == camino::Utf8Component::ParentDir)
    {
        return Err(FloodgateError::Resolve(format!(
            "archive {} contains entry with '..' segment: {}",
            archive, raw
        )));
    }
    Ok(path.to_owned())
}

/// Expands a zip archive into scratch, adding each retained entry.
fn expand_zip(
    input: &Utf8Path,
    scratch: &Utf8Path,
    filter: &FileFilter,
    collection: &mut FileCollection,
) -> Result<(), FloodgateError> {
    let file = File::open(input)
        .map_err(|e| FloodgateError::io(format!("failed to open archive {}", input), e))?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))
        .map_err(|e| FloodgateError::Resolve(format!("failed to read zip archive {}: {}", input, e)))?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(|e| {
            FloodgateError::Resolve(format!("failed to read entry {} of {}: {}", index, input, e))
        })?;
        if entry.is_dir() {
            continue;
        }
        let entry_path = validate_entry_path(entry.name(), input)?;
        if !filter.retains(entry_path.as_str()) {
            info!("filter excluded {} from {}", entry_path, input);
            continue;
        }

        let target = scratch.join(&entry_path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                FloodgateError::io(format!("failed to create directory {}", parent), e)
            })?;
        }
        let mut out = File::create(&target)
            .map_err(|e| FloodgateError::io(format!("failed to create {}", target), e))?;
        std::io::copy(&mut entry, &mut out).map_err(|e| {
            FloodgateError::io(format!("failed to extract {} from {}", entry_path, input), e)
        })?;

        collection.add(PipelineFile::new(target, entry_path))?;
    }
    Ok(())
}

/// Expands a tar archive (optionally gzip-compressed) into scratch.
fn expand_tar(
    input: &Utf8Path,
    scratch: &Utf8Path,
    filter: &FileFilter,
    collection: &mut FileCollection,
) -> Result<(), FloodgateError> {
    let file = File::open(input)
        .map_err(|e| FloodgateError::io(format!("failed to open archive {}", input), e))?;
    let mut magic = [0u8; 2];
    let gzipped = {
        let mut probe = File::open(input)
            .map_err(|e| FloodgateError::io(format!("failed to open archive {}", input), e))?;
        matches!(probe.read(&mut magic), Ok(2)) && magic == [0x1f, 0x8b]
    };

    let reader: Box<dyn Read> = if gzipped {
        Box::new(GzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    let mut archive = tar::Archive::new(reader);
    let entries = archive.entries().map_err(|e| {
        FloodgateError::Resolve(format!("failed to read tar archive {}: {}", input, e))
    })?;

    for entry in entries {
        let mut entry = entry.map_err(|e| {
            FloodgateError::Resolve(format!("failed to read entry of {}: {}", input, e))
        })?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let raw = entry
            .path()
            .map_err(|e| FloodgateError::Resolve(format!("bad entry path in {}: {}", input, e)))?
            .to_string_lossy()
            .into_owned();
        let entry_path = validate_entry_path(&raw, input)?;
        if !filter.retains(entry_path.as_str()) {
            info!("filter excluded {} from {}", entry_path, input);
            continue;
        }

        if !entry.unpack_in(scratch.as_std_path()).map_err(|e| {
            FloodgateError::io(format!("failed to extract {} from {}", entry_path, input), e)
        })? {
            return Err(FloodgateError::Resolve(format!(
                "archive {} entry escaped the scratch directory: {}",
                input, entry_path
            )));
        }

        collection.add(PipelineFile::new(scratch.join(&entry_path), entry_path))?;
    }
    Ok(())
}

/// Dereferences a manifest: each listed path is added in place with no copy.
///
/// Blank lines and `#` comments are skipped. A listed path that does not
/// exist or is not readable is a resolve failure.
fn read_manifest(
    input: &Utf8Path,
    filter: &FileFilter,
    collection: &mut FileCollection,
) -> Result<(), FloodgateError> {
    let content = fs::read_to_string(input)
        .map_err(|e| FloodgateError::io(format!("failed to read manifest {}", input), e))?;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if !filter.retains(line) {
            info!("filter excluded manifest entry {}", line);
            continue;
        }
        let path = Utf8PathBuf::from(line);
        let readable = File::open(&path).is_ok();
        if !fs::metadata(&path).map(|m| m.is_file()).unwrap_or(false) || !readable {
            return Err(FloodgateError::Resolve(format!(
                "manifest {} entry does not exist or is not readable: {}",
                input, line
            )));
        }
        collection.add(PipelineFile::new(path.clone(), path))?;
    }
    Ok(())
}

/// Copies a single input file into scratch and adds it.
fn add_single(
    input: &Utf8Path,
    scratch: &Utf8Path,
    filter: &FileFilter,
    collection: &mut FileCollection,
) -> Result<(), FloodgateError> {
    if !filter.retains(input.as_str()) {
        info!("filter excluded input {}", input);
        return Ok(());
    }
    let name = input.file_name().ok_or_else(|| {
        FloodgateError::InvalidInput(format!("input has no file name: {}", input))
    })?;
    let target = scratch.join(name);
    fs::copy(input, &target)
        .map_err(|e| FloodgateError::io(format!("failed to copy {} to {}", input, target), e))?;
    collection.add(PipelineFile::new(target, input))?;
    Ok(())
}
