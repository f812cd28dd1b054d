//! Growable output buffer with an optional per-byte source map.
//!
//! Every byte the render pass emits goes through this buffer. When the source
//! map is enabled, each output byte carries the index of the Markdown source
//! byte that produced it (or `None` for generated bytes such as tag syntax the
//! renderer invented).
//!
//! Invariants:
//! - The source map, when enabled, always has exactly one entry per logical
//!   byte of content.
//! - Growth is geometric in multiples of `unit` and hard-capped at
//!   [`MAX_ALLOC`]; exceeding the cap is an allocation failure, not a silent
//!   truncation.
//! - A failed append never corrupts existing content; it only omits the new
//!   content. Callers that want the best-effort contract ignore the result.
//! - A pending NUL terminator (from [`OutBuf::as_cstr`]) sits one byte past
//!   the logical length and is dropped before the next append or truncate.

use core_types::{MapEntry, OutPos, SrcMap};
use std::ffi::CStr;
use std::fmt;

/// Hard cap on the buffer allocation (16 MiB).
pub const MAX_ALLOC: usize = 16 * 1024 * 1024;

/// Buffer allocation failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufError {
    /// Growing to `requested` bytes would exceed [`MAX_ALLOC`].
    CapExceeded { requested: usize },
}

impl fmt::Display for BufError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufError::CapExceeded { requested } => write!(
                f,
                "buffer growth to {requested} bytes exceeds the {MAX_ALLOC}-byte cap"
            ),
        }
    }
}

impl std::error::Error for BufError {}

/// Output byte buffer with optional parallel source map.
#[derive(Debug)]
pub struct OutBuf {
    data: Vec<u8>,
    srcmap: Option<Vec<MapEntry>>,
    unit: usize,
    nul_pending: bool,
}

impl OutBuf {
    /// Create a buffer without a source map. `unit` is the growth quantum.
    pub fn new(unit: usize) -> Self {
        assert!(unit > 0, "growth unit must be non-zero");
        Self {
            data: Vec::new(),
            srcmap: None,
            unit,
            nul_pending: false,
        }
    }

    /// Create a buffer that records a source map alongside its content.
    pub fn with_srcmap(unit: usize) -> Self {
        let mut buf = Self::new(unit);
        buf.srcmap = Some(Vec::new());
        buf
    }

    /// Logical content length in bytes (a pending NUL terminator is excluded).
    pub fn len(&self) -> usize {
        self.data.len() - usize::from(self.nul_pending)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current write position.
    pub fn pos(&self) -> OutPos {
        OutPos(self.len())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len()]
    }

    /// The source map, if enabled. Always the same length as [`Self::len`].
    pub fn srcmap(&self) -> Option<&SrcMap> {
        self.srcmap.as_deref()
    }

    /// Append bytes, with an optional source map slice aligned to them.
    ///
    /// If the buffer carries a source map and `map` is `None`, the new bytes
    /// are recorded as unmapped. On failure nothing is written.
    pub fn append(&mut self, bytes: &[u8], map: Option<&SrcMap>) -> Result<(), BufError> {
        if let Some(map) = map {
            debug_assert_eq!(map.len(), bytes.len(), "source map must align with bytes");
        }
        if bytes.is_empty() {
            return Ok(());
        }
        self.drop_pending_nul();
        self.ensure(self.data.len() + bytes.len())?;
        self.data.extend_from_slice(bytes);
        if let Some(srcmap) = self.srcmap.as_mut() {
            match map {
                Some(map) => srcmap.extend_from_slice(&map[..bytes.len()]),
                None => srcmap.resize(self.data.len(), None),
            }
        }
        Ok(())
    }

    /// Append an unmapped string literal.
    pub fn append_literal(&mut self, s: &str) -> Result<(), BufError> {
        self.append(s.as_bytes(), None)
    }

    /// Append a single unmapped byte.
    pub fn append_byte(&mut self, b: u8) -> Result<(), BufError> {
        self.append(&[b], None)
    }

    /// Format into the buffer; the result is unmapped.
    ///
    /// On growth failure the buffer is restored to its prior length, so a
    /// partially formatted write is never observable.
    pub fn append_fmt(&mut self, args: fmt::Arguments<'_>) -> Result<(), BufError> {
        self.drop_pending_nul();
        let rollback = self.len();
        let mut sink = FmtSink {
            buf: self,
            error: None,
        };
        if fmt::write(&mut sink, args).is_err() {
            let err = sink.error.take().unwrap_or(BufError::CapExceeded {
                requested: rollback,
            });
            self.truncate_to(OutPos(rollback));
            return Err(err);
        }
        Ok(())
    }

    /// NUL-terminated read-only view, growing by one byte if exactly full.
    ///
    /// The terminator is not part of [`Self::len`] and is invalidated by the
    /// next append. Content after an interior NUL is not visible through the
    /// returned view.
    pub fn as_cstr(&mut self) -> Result<&CStr, BufError> {
        if !self.nul_pending {
            self.ensure(self.data.len() + 1)?;
            self.data.push(0);
            self.nul_pending = true;
        }
        Ok(CStr::from_bytes_until_nul(&self.data).expect("terminator was just appended"))
    }

    /// Roll content back to `pos`. Used by the block-mode raw-HTML fallback.
    pub fn truncate_to(&mut self, pos: OutPos) {
        debug_assert!(pos.get() <= self.len(), "truncate_to beyond content");
        self.drop_pending_nul();
        self.data.truncate(pos.get());
        if let Some(srcmap) = self.srcmap.as_mut() {
            srcmap.truncate(pos.get());
        }
    }

    /// Two-line dump of content and source map, for test diagnostics.
    pub fn fmt_debug_srcmap(&self) -> String {
        use std::fmt::Write;
        let mut out = String::new();
        for &b in self.as_bytes() {
            if b == b'\n' {
                out.push_str("\\n ");
            } else {
                let _ = write!(out, " {} ", b as char);
            }
        }
        out.push('\n');
        if let Some(map) = self.srcmap() {
            for entry in map {
                match entry {
                    Some(pos) => {
                        let _ = write!(out, "{:2} ", pos.get());
                    }
                    None => out.push_str(" - "),
                }
            }
            out.push('\n');
        }
        out
    }

    fn drop_pending_nul(&mut self) {
        if self.nul_pending {
            self.data.pop();
            self.nul_pending = false;
        }
    }

    /// Reserve capacity for `total` logical bytes, in multiples of `unit`.
    fn ensure(&mut self, total: usize) -> Result<(), BufError> {
        if total > MAX_ALLOC {
            log::debug!(target: "outbuf", "growth to {total} bytes refused (cap {MAX_ALLOC})");
            return Err(BufError::CapExceeded { requested: total });
        }
        if total > self.data.capacity() {
            let mut target = self.data.capacity().max(self.unit);
            while target < total {
                target += self.unit;
            }
            let target = target.min(MAX_ALLOC);
            self.data.reserve_exact(target - self.data.len());
            if let Some(srcmap) = self.srcmap.as_mut() {
                srcmap.reserve_exact(target - srcmap.len());
            }
        }
        Ok(())
    }
}

struct FmtSink<'a> {
    buf: &'a mut OutBuf,
    error: Option<BufError>,
}

impl fmt::Write for FmtSink<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        match self.buf.append(s.as_bytes(), None) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.error = Some(err);
                Err(fmt::Error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::SrcPos;

    fn map_of(indices: &[usize]) -> Vec<MapEntry> {
        indices.iter().map(|&i| Some(SrcPos(i))).collect()
    }

    #[test]
    fn appends_concatenate_in_order() {
        let mut buf = OutBuf::new(8);
        buf.append(b"hello ", None).unwrap();
        buf.append(b"world", None).unwrap();
        assert_eq!(buf.as_bytes(), b"hello world");
        assert_eq!(buf.pos(), OutPos(11));
    }

    #[test]
    fn growth_preserves_existing_content() {
        let mut buf = OutBuf::new(4);
        let mut expected = Vec::new();
        for i in 0..64u8 {
            let chunk = [i; 13];
            buf.append(&chunk, None).unwrap();
            expected.extend_from_slice(&chunk);
        }
        assert_eq!(buf.as_bytes(), &expected[..]);
    }

    #[test]
    fn srcmap_round_trips_exactly() {
        let mut buf = OutBuf::with_srcmap(8);
        let map = map_of(&[5, 6, 7]);
        buf.append(b"abc", Some(&map)).unwrap();
        assert_eq!(buf.srcmap().unwrap(), &map[..]);
    }

    #[test]
    fn unmapped_appends_record_none() {
        let mut buf = OutBuf::with_srcmap(8);
        buf.append(b"ab", Some(&map_of(&[1, 2]))).unwrap();
        buf.append_literal("<p>").unwrap();
        buf.append_byte(b'!').unwrap();
        assert_eq!(
            buf.srcmap().unwrap(),
            &[Some(SrcPos(1)), Some(SrcPos(2)), None, None, None, None]
        );
    }

    #[test]
    fn buffer_without_srcmap_accepts_mapped_appends() {
        let mut buf = OutBuf::new(8);
        buf.append(b"ab", Some(&map_of(&[1, 2]))).unwrap();
        assert!(buf.srcmap().is_none());
        assert_eq!(buf.as_bytes(), b"ab");
    }

    #[test]
    fn cap_exceeded_append_is_a_no_op() {
        let mut buf = OutBuf::with_srcmap(64);
        buf.append(b"keep", Some(&map_of(&[0, 1, 2, 3]))).unwrap();
        let oversized = vec![0u8; MAX_ALLOC + 1];
        let err = buf.append(&oversized, None).unwrap_err();
        assert!(matches!(err, BufError::CapExceeded { .. }));
        assert_eq!(buf.as_bytes(), b"keep");
        assert_eq!(buf.srcmap().unwrap().len(), 4);
    }

    #[test]
    fn append_fmt_formats_and_grows() {
        let mut buf = OutBuf::new(2);
        buf.append_fmt(format_args!("<h{}>", 3)).unwrap();
        buf.append_fmt(format_args!("{}-{}", "a", 42)).unwrap();
        assert_eq!(buf.as_bytes(), b"<h3>a-42");
    }

    #[test]
    fn as_cstr_excludes_terminator_from_len() {
        let mut buf = OutBuf::new(4);
        buf.append(b"abcd", None).unwrap();
        let before = buf.len();
        assert_eq!(buf.as_cstr().unwrap().to_bytes(), b"abcd");
        assert_eq!(buf.len(), before);
        buf.append(b"e", None).unwrap();
        assert_eq!(buf.as_bytes(), b"abcde");
    }

    #[test]
    fn truncate_to_restores_content_and_srcmap() {
        let mut buf = OutBuf::with_srcmap(8);
        buf.append(b"ab", Some(&map_of(&[0, 1]))).unwrap();
        let mark = buf.pos();
        buf.append(b"cdef", Some(&map_of(&[2, 3, 4, 5]))).unwrap();
        buf.truncate_to(mark);
        assert_eq!(buf.as_bytes(), b"ab");
        assert_eq!(buf.srcmap().unwrap(), &[Some(SrcPos(0)), Some(SrcPos(1))]);
    }

    #[test]
    fn fmt_debug_srcmap_lists_entries() {
        let mut buf = OutBuf::with_srcmap(8);
        buf.append(b"a\n", Some(&map_of(&[3, 4]))).unwrap();
        let dump = buf.fmt_debug_srcmap();
        assert!(dump.contains(" a "), "dump was: {dump}");
        assert!(dump.contains(" 3 "), "dump was: {dump}");
    }
}
