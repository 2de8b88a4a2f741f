use std::cell::RefCell;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::rc::Rc;

use log::warn;

use crate::Error;

/// A view of the byte range `[start, start + size)` of a shared stream.
///
/// The window keeps its own logical cursor and seeks the backing stream to it
/// before every access, so windows over the same backing stream can be read
/// in any interleaving. Reads stop at the end of the window. Writes that would
/// cross it are truncated to the room left and logged; a write with no room
/// left at all fails with [`Error::StreamBoundary`].
///
/// # Example
///
/// ```rust
/// use std::cell::RefCell;
/// use std::io::{Cursor, Read};
/// use std::rc::Rc;
/// use sevenz_container::stream::BoundedWindow;
///
/// let backing = Rc::new(RefCell::new(Cursor::new(b"0123456789".to_vec())));
/// let mut low = BoundedWindow::new(Rc::clone(&backing), 0, 4);
/// let mut high = BoundedWindow::new(backing, 6, 4);
///
/// let mut buf = [0u8; 2];
/// low.read_exact(&mut buf).unwrap();
/// assert_eq!(&buf, b"01");
/// high.read_exact(&mut buf).unwrap();
/// assert_eq!(&buf, b"67");
/// low.read_exact(&mut buf).unwrap();
/// assert_eq!(&buf, b"23");
/// ```
pub struct BoundedWindow<S> {
    backing: Rc<RefCell<S>>,
    start: u64,
    size: u64,
    position: u64,
}

impl<S> BoundedWindow<S> {
    /// Creates a window of `size` bytes starting at `start`.
    pub fn new(backing: Rc<RefCell<S>>, start: u64, size: u64) -> Self {
        Self {
            backing,
            start,
            size,
            position: 0,
        }
    }

    /// Returns the window size.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns the logical cursor relative to the window start.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Returns the bytes left between the cursor and the window end.
    pub fn remaining(&self) -> u64 {
        self.size.saturating_sub(self.position)
    }

    fn clamp(&self, len: usize) -> usize {
        self.remaining().min(len as u64) as usize
    }
}

impl<S> std::fmt::Debug for BoundedWindow<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedWindow")
            .field("start", &self.start)
            .field("size", &self.size)
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}

impl<S: Read + Seek> Read for BoundedWindow<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len = self.clamp(buf.len());
        if len == 0 {
            return Ok(0);
        }

        let mut backing = self.backing.borrow_mut();
        backing.seek(SeekFrom::Start(self.start + self.position))?;
        let n = backing.read(&mut buf[..len])?;
        self.position += n as u64;
        Ok(n)
    }
}

impl<S: Write + Seek> Write for BoundedWindow<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let len = self.clamp(buf.len());
        if len == 0 {
            return Err(Error::StreamBoundary(format!(
                "write of {} bytes past the end of a {}-byte window",
                buf.len(),
                self.size
            ))
            .into());
        }
        if len < buf.len() {
            warn!(
                "window write truncated from {} to {} bytes at offset {}",
                buf.len(),
                len,
                self.position
            );
        }

        let mut backing = self.backing.borrow_mut();
        backing.seek(SeekFrom::Start(self.start + self.position))?;
        let n = backing.write(&buf[..len])?;
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.backing.borrow_mut().flush()
    }
}

impl<S> Seek for BoundedWindow<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.size.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        };
        match target {
            Some(offset) if offset <= self.size => {
                self.position = offset;
                Ok(offset)
            }
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek outside bounded window",
            )),
        }
    }
}
