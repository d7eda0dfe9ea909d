use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::debug;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::format::{ChunkIndex, ChunkInfo, PARALLEL_THRESHOLD};

/// Worker count for an input of `input_len` bytes: one below
/// [`PARALLEL_THRESHOLD`], otherwise one per available core.
pub fn ideal_thread_count(input_len: u64) -> usize {
    if input_len < PARALLEL_THRESHOLD {
        return 1;
    }
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

struct Source<R> {
    inner: R,
    /// Next offset handed out by `read_next`.
    cursor: u64,
}

struct Sink<W> {
    inner: W,
    /// Append position for compressed chunks.
    cursor: u64,
    /// Chunks appended so far; only grows together with `cursor`.
    index: ChunkIndex,
}

/// The single reader and single writer shared by every worker of one run.
///
/// Each stream sits behind its own lock and is only reached through
/// positional calls (`read_at`, `write_at`, `append_chunk`), each of which
/// performs its seek and transfer as one step under that lock. Workers never
/// hold both locks at once.
///
/// A session serves exactly one compress or decompress run.
pub struct Session<R, W> {
    reader: Mutex<Source<R>>,
    writer: Mutex<Sink<W>>,
    input_len: u64,
}

impl Session<File, File> {
    /// Open `input` for reading and create (or truncate) `output`.
    pub fn from_paths(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<Self> {
        let input = input.as_ref();
        let output = output.as_ref();
        check_path("input", input)?;
        check_path("output", output)?;

        let reader = File::open(input).map_err(|source| Error::Open {
            path: input.to_path_buf(),
            source,
        })?;
        if let (Ok(a), Ok(b)) = (fs::canonicalize(input), fs::canonicalize(output)) {
            if a == b {
                return Err(Error::invalid_argument(format!(
                    "input and output refer to the same file {a:?}"
                )));
            }
        }
        let writer = File::create(output).map_err(|source| Error::Open {
            path: output.to_path_buf(),
            source,
        })?;

        Self::new(reader, writer)
    }
}

fn check_path(role: &str, path: &Path) -> Result<()> {
    if path.as_os_str().to_string_lossy().trim().is_empty() {
        return Err(Error::invalid_argument(format!(
            "{role} path cannot be empty or whitespace"
        )));
    }
    Ok(())
}

impl<R: Read + Seek, W: Write + Seek> Session<R, W> {
    /// Wrap two already-open streams. Both must support seeking; compressed
    /// chunks are appended from the writer's current position.
    pub fn new(mut reader: R, mut writer: W) -> Result<Self> {
        let input_len = reader
            .seek(SeekFrom::End(0))
            .map_err(|e| Error::invalid_argument(format!("input must support seeking: {e}")))?;
        let cursor = writer
            .stream_position()
            .map_err(|e| Error::invalid_argument(format!("output must support seeking: {e}")))?;
        debug!("session opened: input {input_len} bytes, output cursor at {cursor}");

        Ok(Self {
            reader: Mutex::new(Source { inner: reader, cursor: 0 }),
            writer: Mutex::new(Sink {
                inner: writer,
                cursor,
                index: ChunkIndex::new(),
            }),
            input_len,
        })
    }

    /// Length of the input stream in bytes, measured when the session opened.
    pub fn input_len(&self) -> u64 {
        self.input_len
    }

    /// [`ideal_thread_count`] for this session's input.
    pub fn ideal_threads(&self) -> usize {
        ideal_thread_count(self.input_len)
    }

    /// Hand out the next sequential range of the input: fills `buf` as far as
    /// the input allows and returns `(start_offset, bytes_read)`. A return of
    /// zero bytes means the input is exhausted.
    pub fn read_next(&self, buf: &mut [u8]) -> Result<(u64, usize)> {
        let mut source = self.reader.lock();
        let start = source.cursor;
        source.inner.seek(SeekFrom::Start(start))?;
        let mut filled = 0;
        while filled < buf.len() {
            match source.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        source.cursor += filled as u64;
        Ok((start, filled))
    }

    /// Read exactly `buf.len()` bytes of the input starting at `offset`.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut source = self.reader.lock();
        source.inner.seek(SeekFrom::Start(offset))?;
        source.inner.read_exact(buf)?;
        Ok(())
    }

    /// Parse and validate the archive footer at the end of the input.
    pub fn read_footer(&self) -> Result<ChunkIndex> {
        let mut source = self.reader.lock();
        ChunkIndex::read_archive(&mut source.inner)
    }

    /// Write all of `data` to the output starting at `offset`.
    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        let mut sink = self.writer.lock();
        sink.inner.seek(SeekFrom::Start(offset))?;
        sink.inner.write_all(data)?;
        Ok(())
    }

    /// Append one compressed chunk at the writer cursor and record it in the
    /// session's chunk index, as a single step under the writer lock.
    pub fn append_chunk(
        &self,
        original_start: u64,
        original_length: u64,
        compressed: &[u8],
    ) -> Result<ChunkInfo> {
        let mut sink = self.writer.lock();
        let compressed_start = sink.cursor;
        sink.inner.seek(SeekFrom::Start(compressed_start))?;
        sink.inner.write_all(compressed)?;

        let chunk = ChunkInfo {
            original_start,
            compressed_start,
            original_length,
            compressed_length: compressed.len() as u64,
        };
        sink.index.push(chunk)?;
        sink.cursor += chunk.compressed_length;
        Ok(chunk)
    }

    /// Write the footer after the last appended chunk and flush the output.
    /// Returns a copy of the index that was written.
    pub fn write_footer(&self) -> Result<ChunkIndex> {
        let mut sink = self.writer.lock();
        let Sink { inner, cursor, index } = &mut *sink;
        inner.seek(SeekFrom::Start(*cursor))?;
        let written = index.write_to(inner)?;
        *cursor += written;
        inner.flush()?;
        Ok(index.clone())
    }

    pub fn flush(&self) -> Result<()> {
        self.writer.lock().inner.flush()?;
        Ok(())
    }

    /// Give back the underlying streams.
    pub fn into_inner(self) -> (R, W) {
        (self.reader.into_inner().inner, self.writer.into_inner().inner)
    }
}
