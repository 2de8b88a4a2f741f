use std::io::{self, Write};

use crate::Error;
use crate::checksum::{Crc32Writer, StreamDigest};

/// Routes one continuous stream into a sequence of sinks of known sizes.
///
/// `open` is called for sub-stream `i` when the first byte of it arrives (or
/// as soon as the previous sub-stream completes, for zero-length ones), and
/// `close` receives the sink back together with the digest of the bytes it
/// was given once the declared size has been reached. Writing more than the
/// sum of the sizes fails with [`Error::StreamBoundary`], as does calling
/// [`finish`](Self::finish) before every sub-stream is complete.
pub struct SplitWriter<S, F, C> {
    sizes: Vec<u64>,
    open: F,
    close: C,
    index: usize,
    current: Option<(Crc32Writer<S>, u64)>,
}

impl<S, F, C> SplitWriter<S, F, C>
where
    S: Write,
    F: FnMut(usize) -> io::Result<S>,
    C: FnMut(usize, S, StreamDigest) -> io::Result<()>,
{
    /// Creates a writer over sub-streams of the given sizes.
    pub fn new(sizes: Vec<u64>, open: F, close: C) -> Self {
        Self {
            sizes,
            open,
            close,
            index: 0,
            current: None,
        }
    }

    /// Returns the index of the sub-stream currently being filled.
    pub fn current_index(&self) -> usize {
        self.index
    }

    /// Opens the next sub-stream, completing any zero-length ones on the way.
    fn advance(&mut self) -> io::Result<()> {
        while self.current.is_none() && self.index < self.sizes.len() {
            let sink = Crc32Writer::new((self.open)(self.index)?);
            let size = self.sizes[self.index];
            if size == 0 {
                self.complete(sink)?;
            } else {
                self.current = Some((sink, size));
            }
        }
        Ok(())
    }

    fn complete(&mut self, mut sink: Crc32Writer<S>) -> io::Result<()> {
        sink.flush()?;
        let digest = sink.digest();
        (self.close)(self.index, sink.into_inner(), digest)?;
        self.index += 1;
        Ok(())
    }

    /// Completes trailing zero-length sub-streams and checks that every
    /// sub-stream received its full size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StreamBoundary`] if the input ended early.
    pub fn finish(mut self) -> crate::Result<()> {
        self.advance()?;
        if let Some((sink, remaining)) = &self.current {
            return Err(Error::StreamBoundary(format!(
                "sub-stream {} ended {} bytes short after {} bytes",
                self.index,
                remaining,
                sink.bytes_written()
            )));
        }
        Ok(())
    }
}

impl<S, F, C> Write for SplitWriter<S, F, C>
where
    S: Write,
    F: FnMut(usize) -> io::Result<S>,
    C: FnMut(usize, S, StreamDigest) -> io::Result<()>,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.advance()?;

        let Some((sink, remaining)) = self.current.as_mut() else {
            return Err(Error::StreamBoundary(format!(
                "{} bytes past the end of the last sub-stream",
                buf.len()
            ))
            .into());
        };

        let len = (*remaining).min(buf.len() as u64) as usize;
        sink.write_all(&buf[..len])?;
        *remaining -= len as u64;

        if *remaining == 0 {
            if let Some((sink, _)) = self.current.take() {
                self.complete(sink)?;
            }
        }
        Ok(len)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.current.as_mut() {
            Some((sink, _)) => sink.flush(),
            None => Ok(()),
        }
    }
}

impl<S, F, C> std::fmt::Debug for SplitWriter<S, F, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SplitWriter")
            .field("sizes", &self.sizes)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}
