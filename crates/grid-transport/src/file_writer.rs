//! Background session logger.
//!
//! Recorded wire frames are pushed from the realtime path onto a
//! `crossbeam_channel`; a dedicated thread drains the channel and appends
//! them to a rotating log file, so a slow or stalled disk never blocks the
//! caller.

use crate::error::{TransportError, TransportResult};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

const CHANNEL_CAPACITY: usize = 4096;

/// Where and how the background writer rotates log files.
#[derive(Debug, Clone)]
pub struct FileWriterConfig {
    pub output_dir: PathBuf,
    pub file_prefix: String,
    /// Roll over to a new file once the current one reaches this many bytes.
    pub max_file_bytes: u64,
}

impl Default for FileWriterConfig {
    fn default() -> Self {
        FileWriterConfig { output_dir: PathBuf::from("."), file_prefix: "session".to_string(), max_file_bytes: 16 * 1024 * 1024 }
    }
}

enum Command {
    Chunk(Vec<u8>),
    Flush,
}

/// Handle to the background writer thread. Dropping it closes the channel
/// and joins the thread.
pub struct FileWriter {
    sender: Sender<Command>,
    handle: Option<JoinHandle<()>>,
}

impl FileWriter {
    pub fn spawn(config: FileWriterConfig) -> TransportResult<Self> {
        std::fs::create_dir_all(&config.output_dir)?;
        let (sender, receiver) = bounded(CHANNEL_CAPACITY);
        let handle = std::thread::Builder::new()
            .name("grid-file-writer".to_string())
            .spawn(move || run(config, receiver))
            .map_err(|e| TransportError::Protocol(format!("failed to spawn file writer thread: {e}")))?;

        Ok(FileWriter { sender, handle: Some(handle) })
    }

    /// Enqueue a chunk for writing. Drops the chunk (and logs it) if the
    /// channel is full rather than blocking the realtime caller.
    pub fn write(&self, chunk: Vec<u8>) {
        if self.sender.try_send(Command::Chunk(chunk)).is_err() {
            log::warn!("file writer channel full, dropping chunk");
        }
    }

    pub fn flush(&self) {
        let _ = self.sender.send(Command::Flush);
    }

    pub fn shutdown(mut self) {
        drop(self.sender.clone());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FileWriter {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

struct RotatingFile {
    config: FileWriterConfig,
    writer: Option<BufWriter<File>>,
    bytes_written: u64,
    file_index: u32,
}

impl RotatingFile {
    fn new(config: FileWriterConfig) -> Self {
        RotatingFile { config, writer: None, bytes_written: 0, file_index: 0 }
    }

    fn path_for(&self, index: u32) -> PathBuf {
        self.config.output_dir.join(format!("{}_{:04}.grid", self.config.file_prefix, index))
    }

    fn ensure_open(&mut self) -> TransportResult<()> {
        if self.writer.is_none() {
            self.open(self.file_index)?;
        }
        Ok(())
    }

    fn open(&mut self, index: u32) -> TransportResult<()> {
        let path = self.path_for(index);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        self.writer = Some(BufWriter::new(file));
        self.bytes_written = 0;
        self.file_index = index;
        log::info!("file writer rolled to {:?}", path);
        Ok(())
    }

    fn write(&mut self, chunk: &[u8]) -> TransportResult<()> {
        self.ensure_open()?;
        if self.bytes_written > 0 && self.bytes_written + chunk.len() as u64 > self.config.max_file_bytes {
            self.open(self.file_index + 1)?;
        }
        let writer = self.writer.as_mut().expect("ensure_open just set this");
        writer.write_all(chunk)?;
        self.bytes_written += chunk.len() as u64;
        Ok(())
    }

    fn flush(&mut self) -> TransportResult<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}

fn run(config: FileWriterConfig, receiver: Receiver<Command>) {
    let mut file = RotatingFile::new(config);
    for command in receiver.iter() {
        let result = match command {
            Command::Chunk(chunk) => file.write(&chunk),
            Command::Flush => file.flush(),
        };
        if let Err(e) = result {
            log::error!("file writer error: {e}");
        }
    }
    let _ = file.flush();
}

/// Read back all `.grid` chunk files written to `dir` under `prefix`, in
/// rotation order, concatenated.
pub fn read_session(dir: &Path, prefix: &str) -> TransportResult<Vec<u8>> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.file_name().and_then(|n| n.to_str()).is_some_and(|n| n.starts_with(prefix) && n.ends_with(".grid")))
        .collect();
    entries.sort();

    let mut data = Vec::new();
    for path in entries {
        data.extend(std::fs::read(path)?);
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn writes_chunks_and_they_can_be_read_back() {
        let dir = tempdir().unwrap();
        let config = FileWriterConfig { output_dir: dir.path().to_path_buf(), file_prefix: "test".to_string(), max_file_bytes: 1024 * 1024 };
        let writer = FileWriter::spawn(config).unwrap();

        writer.write(b"hello ".to_vec());
        writer.write(b"world".to_vec());
        writer.flush();
        std::thread::sleep(Duration::from_millis(50));
        writer.shutdown();

        let data = read_session(dir.path(), "test").unwrap();
        assert_eq!(data, b"hello world");
    }

    #[test]
    fn rotates_to_a_new_file_once_the_size_limit_is_exceeded() {
        let dir = tempdir().unwrap();
        let config = FileWriterConfig { output_dir: dir.path().to_path_buf(), file_prefix: "rot".to_string(), max_file_bytes: 8 };
        let writer = FileWriter::spawn(config).unwrap();

        writer.write(b"12345678".to_vec());
        writer.write(b"90".to_vec());
        writer.flush();
        std::thread::sleep(Duration::from_millis(50));
        writer.shutdown();

        let mut files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().filter_map(|e| e.ok()).collect();
        files.sort_by_key(|e| e.path());
        assert_eq!(files.len(), 2);
    }
}
