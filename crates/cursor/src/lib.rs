//! Cursor-to-output marker placement.
//!
//! The editor hands the render pass its cursor position as a byte offset into
//! the Markdown source. While output spans are flushed, the tracker decides
//! whether the cursor falls inside the span's represented source range and, if
//! so, splices a zero-width marker element into the output — exactly once per
//! render. The preview locates the marker by its reserved element id and
//! scrolls to it.
//!
//! State machine: `YetToBeInserted` transitions exactly once, to `Inserted`
//! (normal case), `CannotBeInserted` (cursor sits inside an untrustworthy
//! region such as an opaque raw-HTML block), or `ShouldNotBeInserted` (caller
//! suppressed marker insertion for this render, e.g. a non-interactive
//! export). Terminal states never transition again.

use core_types::{SrcMap, SrcPos};
use outbuf::OutBuf;

/// Reserved element id the preview uses to find the marker.
pub const MARKER_ELEMENT_ID: &str = "__cursor_marker__";

/// The marker as realized in the output HTML: a zero-width element.
pub const MARKER_HTML: &str = "<span id=\"__cursor_marker__\"></span>";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum MarkerStatus {
    YetToBeInserted,
    Inserted,
    CannotBeInserted,
    ShouldNotBeInserted,
}

/// Final marker state of a finished render pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MarkerOutcome {
    pub status: MarkerStatus,
    /// Source position the marker ended up logically adjacent to. This is what
    /// scroll alignment uses; it can differ from the raw cursor offset when
    /// escaping expanded one input byte into several output bytes.
    pub effective_pos: Option<SrcPos>,
}

/// Result of locating the cursor inside one span's source map.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Hit {
    /// Byte index within the span at which to split the pending flush.
    /// Equal to the span length for end-of-span placement.
    pub split_index: usize,
    /// Index of the map entry the marker is adjacent to.
    pub effective_index: usize,
}

#[derive(Debug)]
pub struct CursorTracker {
    cursor: SrcPos,
    status: MarkerStatus,
    effective_pos: Option<SrcPos>,
}

impl CursorTracker {
    pub fn new(cursor: SrcPos) -> Self {
        Self {
            cursor,
            status: MarkerStatus::YetToBeInserted,
            effective_pos: None,
        }
    }

    /// Tracker for a render that must not receive a marker.
    pub fn suppressed() -> Self {
        Self {
            cursor: SrcPos(0),
            status: MarkerStatus::ShouldNotBeInserted,
            effective_pos: None,
        }
    }

    pub fn status(&self) -> MarkerStatus {
        self.status
    }

    pub fn effective_pos(&self) -> Option<SrcPos> {
        self.effective_pos
    }

    pub fn outcome(&self) -> MarkerOutcome {
        MarkerOutcome {
            status: self.status,
            effective_pos: self.effective_pos,
        }
    }

    /// Locate the cursor within a span's source map.
    ///
    /// Trailing unmapped entries are trimmed. A leading unmapped entry is
    /// treated as sitting below every cursor position, so spans with unmapped
    /// prefixes can still match. Ties break toward the earliest mapped index
    /// at or after the cursor ("insert before the first character at or after
    /// the cursor"); a cursor immediately following the span's last mapped
    /// byte yields end-of-span placement.
    pub fn locate(&self, map: &SrcMap) -> Option<Hit> {
        if self.status != MarkerStatus::YetToBeInserted {
            return None;
        }
        let trimmed = trim_unmapped_tail(map);
        let len = trimmed.len();
        if len == 0 {
            return None;
        }
        let last = trimmed[len - 1].expect("trimmed slice ends mapped");
        let lower_ok = trimmed[0].is_none_or(|first| first <= self.cursor);
        if lower_ok && last >= self.cursor {
            for (i, entry) in trimmed.iter().enumerate() {
                if let Some(pos) = entry
                    && *pos >= self.cursor
                {
                    return Some(Hit {
                        split_index: i,
                        effective_index: i,
                    });
                }
            }
            None
        } else if last.next() == self.cursor {
            Some(Hit {
                split_index: len,
                effective_index: len - 1,
            })
        } else {
            None
        }
    }

    /// Whether the cursor falls inside the source range this map represents.
    /// Used to detect a cursor stranded in an untrustworthy region.
    pub fn in_range(&self, map: &SrcMap) -> bool {
        let trimmed = trim_unmapped_tail(map);
        let Some(&last) = trimmed.last() else {
            return false;
        };
        let last = last.expect("trimmed slice ends mapped");
        trimmed[0].is_none_or(|first| first <= self.cursor) && last >= self.cursor
    }

    /// Write the marker at the current end of `out` if the cursor belongs to
    /// the source range of `map` and no terminal state has been reached.
    ///
    /// `effective_index` names the map entry the marker sits next to (from a
    /// [`Hit`], or an explicit index for tag-adjacent placement). Returns
    /// whether the marker was written.
    pub fn maybe_insert(
        &mut self,
        out: &mut OutBuf,
        map: &SrcMap,
        effective_index: usize,
    ) -> bool {
        if self.status != MarkerStatus::YetToBeInserted {
            return false;
        }
        let trimmed = trim_unmapped_tail(map);
        let Some(&last) = trimmed.last() else {
            return false;
        };
        let last = last.expect("trimmed slice ends mapped");
        let lower_ok = trimmed[0].is_none_or(|first| first <= self.cursor);
        if !(lower_ok && last.next() >= self.cursor) {
            return false;
        }
        if out.append_literal(MARKER_HTML).is_err() {
            log::debug!(target: "cursor", "marker append failed, leaving status unchanged");
            return false;
        }
        self.status = MarkerStatus::Inserted;
        self.effective_pos = map.get(effective_index).copied().flatten();
        log::trace!(
            target: "cursor",
            "marker inserted at output {:?}, effective source pos {:?}",
            out.pos(),
            self.effective_pos
        );
        true
    }

    /// The cursor is known to sit inside a region whose structure cannot be
    /// trusted; give up on insertion for this render.
    pub fn mark_unlocatable(&mut self) {
        if self.status == MarkerStatus::YetToBeInserted {
            self.status = MarkerStatus::CannotBeInserted;
        }
    }

    /// Rescind a marker whose surrounding output was rolled back. The render
    /// already proved the cursor sits in this (now untrustworthy) region, so
    /// the terminal state is `CannotBeInserted`, not a fresh start.
    pub fn rescind_inserted(&mut self) {
        if self.status == MarkerStatus::Inserted {
            self.status = MarkerStatus::CannotBeInserted;
            self.effective_pos = None;
        }
    }

    /// Caller-requested suppression for this render.
    pub fn suppress(&mut self) {
        if self.status == MarkerStatus::YetToBeInserted {
            self.status = MarkerStatus::ShouldNotBeInserted;
        }
    }
}

/// Flush a text span through the marker: when the cursor lands inside the
/// span, the pending append is split at the hit and the marker written
/// between the two halves. The marker is only ever spliced between appends,
/// never into the middle of one.
///
/// Append failures follow the buffer's best-effort contract and are ignored.
pub fn write_text_with_marker(
    out: &mut OutBuf,
    tracker: &mut CursorTracker,
    bytes: &[u8],
    map: Option<&SrcMap>,
) {
    if let Some(map) = map {
        debug_assert_eq!(map.len(), bytes.len(), "source map must align with bytes");
        if let Some(hit) = tracker.locate(map) {
            let split = hit.split_index;
            let _ = out.append(&bytes[..split], Some(&map[..split]));
            tracker.maybe_insert(out, map, hit.effective_index);
            let _ = out.append(&bytes[split..], Some(&map[split..]));
            return;
        }
        let _ = out.append(bytes, Some(map));
    } else {
        let _ = out.append(bytes, None);
    }
}

fn trim_unmapped_tail(map: &SrcMap) -> &SrcMap {
    let mut len = map.len();
    while len > 0 && map[len - 1].is_none() {
        len -= 1;
    }
    &map[..len]
}
