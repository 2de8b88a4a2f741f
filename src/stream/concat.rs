use std::io::{self, Read};

use crate::checksum::{Crc32Reader, StreamDigest};

type BoundaryCallback<'a> = Box<dyn FnMut(usize, &StreamDigest) -> io::Result<()> + 'a>;

/// Presents `count` lazily opened readers as one continuous stream.
///
/// `open` is called with the index of the next sub-stream only when the
/// previous one is exhausted, so at most one sub-stream is open at a time.
/// Sizes do not need to be known up front: the realized size and CRC of each
/// sub-stream are recorded as it ends, and can be read back through
/// [`digests`](Self::digests) once the reader returns end of stream.
///
/// # Example
///
/// ```rust
/// use std::io::{Cursor, Read};
/// use sevenz_container::stream::ConcatReader;
///
/// let parts: [&[u8]; 3] = [b"ab", b"", b"cde"];
/// let mut reader = ConcatReader::new(parts.len(), |i| Ok(Cursor::new(parts[i])));
/// let mut out = Vec::new();
/// reader.read_to_end(&mut out).unwrap();
///
/// assert_eq!(out, b"abcde");
/// let sizes: Vec<u64> = reader.digests().iter().map(|d| d.size).collect();
/// assert_eq!(sizes, [2, 0, 3]);
/// ```
pub struct ConcatReader<'a, R, F> {
    count: usize,
    open: F,
    current: Option<Crc32Reader<R>>,
    digests: Vec<StreamDigest>,
    on_boundary: Option<BoundaryCallback<'a>>,
}

impl<'a, R, F> ConcatReader<'a, R, F>
where
    R: Read,
    F: FnMut(usize) -> io::Result<R>,
{
    /// Creates a reader over `count` sub-streams supplied by `open`.
    pub fn new(count: usize, open: F) -> Self {
        Self {
            count,
            open,
            current: None,
            digests: Vec::with_capacity(count),
            on_boundary: None,
        }
    }

    /// Installs a callback invoked with each sub-stream's digest as it ends.
    ///
    /// An error returned by the callback aborts the read in progress.
    pub fn on_boundary(
        mut self,
        callback: impl FnMut(usize, &StreamDigest) -> io::Result<()> + 'a,
    ) -> Self {
        self.on_boundary = Some(Box::new(callback));
        self
    }

    /// Returns the digests of the sub-streams that have ended so far.
    pub fn digests(&self) -> &[StreamDigest] {
        &self.digests
    }

    /// Consumes the reader and returns the recorded digests.
    pub fn into_digests(self) -> Vec<StreamDigest> {
        self.digests
    }

    /// Returns `true` once every sub-stream has been read to its end.
    pub fn is_exhausted(&self) -> bool {
        self.digests.len() == self.count
    }

    fn close_current(&mut self) -> io::Result<()> {
        if let Some(done) = self.current.take() {
            let digest = done.digest();
            let index = self.digests.len();
            self.digests.push(digest);
            if let Some(callback) = self.on_boundary.as_mut() {
                callback(index, &digest)?;
            }
        }
        Ok(())
    }
}

impl<'a, R, F> Read for ConcatReader<'a, R, F>
where
    R: Read,
    F: FnMut(usize) -> io::Result<R>,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.current.is_none() {
                let next = self.digests.len();
                if next >= self.count {
                    return Ok(0);
                }
                self.current = Some(Crc32Reader::new((self.open)(next)?));
            }

            if let Some(current) = self.current.as_mut() {
                let n = current.read(buf)?;
                if n > 0 {
                    return Ok(n);
                }
            }
            self.close_current()?;
        }
    }
}

impl<R, F> std::fmt::Debug for ConcatReader<'_, R, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcatReader")
            .field("count", &self.count)
            .field("finished", &self.digests.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::checksum::Crc32;
    use std::io::Cursor;

    #[test]
    fn test_records_sizes_and_crcs() {
        let parts: Vec<Vec<u8>> = vec![b"first".to_vec(), vec![], b"third part".to_vec()];
        let mut reader = ConcatReader::new(parts.len(), |i| Ok(Cursor::new(parts[i].clone())));

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"firstthird part");
        assert!(reader.is_exhausted());

        let digests = reader.into_digests();
        for (digest, part) in digests.iter().zip(&parts) {
            assert_eq!(digest.size, part.len() as u64);
            assert_eq!(digest.crc, Crc32::compute(part));
        }
    }

    #[test]
    fn test_opens_lazily() {
        let mut opened = Vec::new();
        let mut reader = ConcatReader::new(3, |i| {
            opened.push(i);
            Ok(Cursor::new(vec![i as u8; 4]))
        });
        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf).unwrap();
        drop(reader);
        assert_eq!(opened, [0]);
    }

    #[test]
    fn test_zero_streams() {
        let mut reader = ConcatReader::new(0, |_| Ok(io::empty()));
        let mut out = Vec::new();
        assert_eq!(reader.read_to_end(&mut out).unwrap(), 0);
        assert!(reader.is_exhausted());
    }

    #[test]
    fn test_boundary_callback_can_abort() {
        let mut seen = Vec::new();
        let mut reader = ConcatReader::new(3, |_| Ok(Cursor::new(b"xy".to_vec()))).on_boundary(
            |i, digest| {
                seen.push((i, digest.size));
                if i == 1 {
                    return Err(Error::Cancelled.into());
                }
                Ok(())
            },
        );

        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).unwrap_err();
        drop(reader);
        assert!(matches!(Error::from(err), Error::Cancelled));
        assert_eq!(seen, [(0, 2), (1, 2)]);
    }

    #[test]
    fn test_open_error_propagates() {
        let mut reader = ConcatReader::new(2, |i| {
            if i == 1 {
                Err(io::Error::new(io::ErrorKind::NotFound, "gone"))
            } else {
                Ok(Cursor::new(b"a".to_vec()))
            }
        });
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert_eq!(reader.digests().len(), 1);
    }
}
