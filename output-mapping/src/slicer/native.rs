use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::debug;

use crate::bail;
use crate::error::{ErrorKind, OutputResult};
use crate::mapping::ManifestCodec;
use crate::output_error;
use crate::slicer::{SliceCommand, SliceRequest};

/// In-process CSV slicer.
///
/// Records are copied byte for byte, so quoting and line endings of the input survive.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeSliceCommand;

impl SliceCommand for NativeSliceCommand {
    async fn slice(&self, request: &SliceRequest) -> OutputResult<()> {
        let request = request.clone();
        tokio::task::spawn_blocking(move || slice_blocking(&request))
            .await
            .map_err(|err| output_error!(ErrorKind::SliceFailed, "Slicing task failed", err))?
    }
}

fn slice_blocking(request: &SliceRequest) -> OutputResult<()> {
    let codec = ManifestCodec::new(request.manifest_format);
    let mut manifest = match &request.input_manifest_path {
        Some(path) => match codec.read_value(path)? {
            Value::Object(manifest) => manifest,
            _ => Map::new(),
        },
        None => Map::new(),
    };

    let delimiter = dialect_byte(&manifest, "delimiter").unwrap_or(Some(b','));
    let quote = dialect_byte(&manifest, "enclosure").unwrap_or(Some(b'"'));
    let mut columns = manifest_columns(&manifest);

    let inputs = if request.input_path.is_dir() {
        if columns.is_none() {
            bail!(
                ErrorKind::SliceFailed,
                "Sliced input without columns",
                format!(
                    "Sliced file \"{}\" columns specification missing.",
                    request.table_name
                )
            );
        }
        list_parts(&request.input_path)?
    } else {
        vec![request.input_path.clone()]
    };

    fs::create_dir_all(&request.output_dir)?;
    let mut parts = PartWriter::new(&request.output_dir, request.max_part_size_bytes);

    for input in inputs {
        let mut builder = csv::ReaderBuilder::new();
        builder.has_headers(false).flexible(true);
        if let Some(delimiter) = delimiter {
            builder.delimiter(delimiter);
        }
        match quote {
            Some(quote) => builder.quote(quote),
            None => builder.quoting(false),
        };

        let mut reader = builder.from_reader(RecordingReader::new(File::open(&input)?));
        let mut record = csv::ByteRecord::new();
        while reader.read_byte_record(&mut record)? {
            let start = record.position().map(|position| position.byte()).unwrap_or(0);
            let end = reader.position().byte();
            let mut bytes = reader.get_mut().take_range(start, end)?;

            if columns.is_none() {
                columns = Some(
                    record
                        .iter()
                        .map(|field| String::from_utf8_lossy(field).into_owned())
                        .collect(),
                );
                continue;
            }

            if bytes.last() != Some(&b'\n') {
                bytes.push(b'\n');
            }
            parts.write(&bytes)?;
        }
    }

    let written = parts.finish()?;
    debug!(table_name = %request.table_name, parts = written, "slicing finished");

    let columns = columns.unwrap_or_default();
    manifest.insert(
        "columns".to_string(),
        Value::Array(columns.into_iter().map(Value::String).collect()),
    );
    codec.write(&request.output_manifest_path, &Value::Object(manifest))?;

    Ok(())
}

/// Returns the single byte configured under `key`.
///
/// `None` when the key is absent, `Some(None)` for an empty value.
fn dialect_byte(manifest: &Map<String, Value>, key: &str) -> Option<Option<u8>> {
    let value = manifest.get(key)?.as_str()?;
    Some(value.as_bytes().first().copied())
}

fn manifest_columns(manifest: &Map<String, Value>) -> Option<Vec<String>> {
    let columns = manifest
        .get("columns")?
        .as_array()?
        .iter()
        .filter_map(|column| column.as_str().map(str::to_string))
        .collect::<Vec<_>>();

    (!columns.is_empty()).then_some(columns)
}

fn list_parts(dir: &Path) -> OutputResult<Vec<PathBuf>> {
    let mut parts = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let is_hidden = entry.file_name().to_string_lossy().starts_with('.');
        if entry.file_type()?.is_file() && !is_hidden {
            parts.push(entry.path());
        }
    }
    parts.sort();

    Ok(parts)
}

/// Keeps the bytes handed to the CSV parser until the records they belong to are taken.
struct RecordingReader<R> {
    inner: R,
    recorded: Vec<u8>,
    offset: u64,
}

impl<R: Read> RecordingReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            recorded: Vec::new(),
            offset: 0,
        }
    }

    /// Returns the bytes in `start..end` and forgets everything before `end`.
    fn take_range(&mut self, start: u64, end: u64) -> OutputResult<Vec<u8>> {
        let from = start.checked_sub(self.offset).map(|from| from as usize);
        let to = end.checked_sub(self.offset).map(|to| to as usize);
        let bytes = match (from, to) {
            (Some(from), Some(to)) => self.recorded.get(from..to).map(<[u8]>::to_vec),
            _ => None,
        };
        let Some(bytes) = bytes else {
            return Err(output_error!(
                ErrorKind::SliceFailed,
                "Record boundaries out of range",
                format!("bytes {start}..{end} are no longer available")
            ));
        };

        let consumed = (end - self.offset) as usize;
        self.recorded.drain(..consumed);
        self.offset = end;

        Ok(bytes)
    }
}

impl<R: Read> Read for RecordingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.recorded.extend_from_slice(&buf[..read]);
        Ok(read)
    }
}

/// Writes records into `part0001`, `part0002`, ... of at most `max_size` bytes each.
///
/// A record larger than `max_size` gets a part of its own.
struct PartWriter<'a> {
    dir: &'a Path,
    max_size: u64,
    index: usize,
    current: Option<BufWriter<File>>,
    current_size: u64,
}

impl<'a> PartWriter<'a> {
    fn new(dir: &'a Path, max_size: u64) -> Self {
        Self {
            dir,
            max_size,
            index: 0,
            current: None,
            current_size: 0,
        }
    }

    fn write(&mut self, bytes: &[u8]) -> OutputResult<()> {
        let len = bytes.len() as u64;
        let rotate = match self.current {
            Some(_) => self.current_size > 0 && self.current_size + len > self.max_size,
            None => true,
        };

        if rotate {
            self.flush_current()?;
            self.index += 1;
            let path = self.dir.join(format!("part{:04}", self.index));
            self.current = Some(BufWriter::new(File::create(path)?));
            self.current_size = 0;
        }

        if let Some(writer) = self.current.as_mut() {
            writer.write_all(bytes)?;
        }
        self.current_size += len;

        Ok(())
    }

    fn flush_current(&mut self) -> OutputResult<()> {
        if let Some(mut writer) = self.current.take() {
            writer.flush()?;
        }

        Ok(())
    }

    /// Flushes the last part and returns the number of parts written.
    fn finish(mut self) -> OutputResult<usize> {
        self.flush_current()?;
        Ok(self.index)
    }
}
