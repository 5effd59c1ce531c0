//! Sequential, bounded-memory chunk reader

use std::io::{self, Read, Seek, SeekFrom};

use tracing::trace;

use crate::{
    error::{Error, Phase, Result},
    io::FileHandle,
};

/// Forward-only chunk reader over a file's contents.
///
/// Each pass yields the file exactly once, in order, in chunks of
/// `chunk_size` bytes; only the final chunk may be shorter. Memory use is
/// one chunk buffer regardless of file size.
#[derive(Debug)]
pub struct ByteStreamReader {
    handle: FileHandle,
    buffer: Vec<u8>,
    consumed: u64,
    exhausted: bool,
}

impl ByteStreamReader {
    pub fn new(handle: FileHandle, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::InvalidState("chunk size must be non-zero".into()));
        }
        Ok(Self {
            handle,
            buffer: vec![0u8; chunk_size],
            consumed: 0,
            exhausted: false,
        })
    }

    /// Returns the next chunk, or `None` once the file is exhausted.
    ///
    /// A short read is only accepted at end of file. A failure part-way
    /// reports the bytes consumed before it.
    pub fn next_chunk(&mut self) -> Result<Option<&[u8]>> {
        if self.exhausted {
            return Ok(None);
        }

        let mut filled = 0;
        while filled < self.buffer.len() {
            match self.handle.file_mut().read(&mut self.buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(Error::from_io(
                        self.handle.path(),
                        Phase::Read,
                        self.consumed + filled as u64,
                        e,
                    ))
                }
            }
        }

        if filled < self.buffer.len() {
            self.exhausted = true;
        }
        if filled == 0 {
            return Ok(None);
        }

        self.consumed += filled as u64;
        trace!(consumed = self.consumed, chunk = filled, "read chunk");
        Ok(Some(&self.buffer[..filled]))
    }

    /// True while a pass has started but not reached end of file
    pub fn in_pass(&self) -> bool {
        self.consumed > 0 && !self.exhausted
    }

    /// Restarts the stream at offset zero. Only valid between passes.
    pub fn rewind(&mut self) -> Result<()> {
        if self.in_pass() {
            return Err(Error::InvalidState(
                "rewind requested in the middle of a pass".into(),
            ));
        }
        self.seek(SeekFrom::Start(0))?;
        self.consumed = 0;
        self.exhausted = false;
        Ok(())
    }

    /// Reads up to `len` trailing bytes. Only valid between passes; leaves
    /// the stream exhausted, so a new pass needs `rewind` first.
    pub fn read_tail(&mut self, len: usize) -> Result<Vec<u8>> {
        if self.in_pass() {
            return Err(Error::InvalidState(
                "tail read requested in the middle of a pass".into(),
            ));
        }

        let size = self.seek(SeekFrom::End(0))?;
        let take = (len as u64).min(size);
        let start = self.seek(SeekFrom::Start(size - take))?;

        let mut tail = Vec::with_capacity(take as usize);
        self.handle
            .file_mut()
            .take(take)
            .read_to_end(&mut tail)
            .map_err(|e| Error::from_io(self.handle.path(), Phase::Read, start, e))?;

        self.exhausted = true;
        Ok(tail)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let consumed = self.consumed;
        self.handle
            .file_mut()
            .seek(pos)
            .map_err(|e| Error::from_io(self.handle.path(), Phase::Seek, consumed, e))
    }

    /// Bytes yielded during the current pass
    pub fn bytes_consumed(&self) -> u64 {
        self.consumed
    }

    pub fn chunk_size(&self) -> usize {
        self.buffer.len()
    }

    pub fn handle(&self) -> &FileHandle {
        &self.handle
    }

    pub fn into_handle(self) -> FileHandle {
        self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn reader_over(data: &[u8], chunk: usize) -> (NamedTempFile, ByteStreamReader) {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(data).unwrap();
        temp.flush().unwrap();
        let handle = FileHandle::open_read(temp.path()).unwrap();
        let reader = ByteStreamReader::new(handle, chunk).unwrap();
        (temp, reader)
    }

    #[test]
    fn test_chunks_cover_file_once() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let (_temp, mut reader) = reader_over(&data, 300);

        let mut sizes = Vec::new();
        let mut collected = Vec::new();
        while let Some(chunk) = reader.next_chunk().unwrap() {
            sizes.push(chunk.len());
            collected.extend_from_slice(chunk);
        }

        assert_eq!(sizes, vec![300, 300, 300, 100]);
        assert_eq!(collected, data);
        assert_eq!(reader.bytes_consumed(), 1000);
        assert!(reader.next_chunk().unwrap().is_none());
    }

    #[test]
    fn test_empty_file_yields_nothing() {
        let (_temp, mut reader) = reader_over(b"", 64);
        assert!(reader.next_chunk().unwrap().is_none());
        assert_eq!(reader.bytes_consumed(), 0);
    }

    #[test]
    fn test_rewind_mid_pass_is_rejected() {
        let (_temp, mut reader) = reader_over(&[7u8; 256], 64);
        reader.next_chunk().unwrap();
        assert!(matches!(reader.rewind(), Err(Error::InvalidState(_))));
        assert!(matches!(reader.read_tail(8), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_tail_then_rewind_restarts() {
        let (_temp, mut reader) = reader_over(b"%PDF-1.4 body %%EOF", 64);
        while reader.next_chunk().unwrap().is_some() {}

        assert_eq!(reader.read_tail(5).unwrap(), b"%%EOF");
        assert!(reader.next_chunk().unwrap().is_none());

        reader.rewind().unwrap();
        assert_eq!(reader.next_chunk().unwrap().unwrap(), b"%PDF-1.4 body %%EOF");
    }

    #[test]
    fn test_tail_longer_than_file() {
        let (_temp, mut reader) = reader_over(b"abc", 64);
        assert_eq!(reader.read_tail(1024).unwrap(), b"abc");
    }
}
