//! Playlist cursor
//!
//! Tracks which playlist entry streams next. The index always stays inside
//! the playlist, including after the final entry of a non-looping playlist.

/// Result of moving the cursor past the current entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Moved to the given index within the current pass
    Next(usize),
    /// Passed the last entry and restarted at index 0
    Wrapped,
    /// Passed the last entry of a non-looping playlist
    Exhausted,
}

/// Index into an ordered playlist of a fixed length
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistCursor {
    index: usize,
    len: usize,
    looping: bool,
}

impl PlaylistCursor {
    /// Create a cursor at index 0
    ///
    /// Returns None for an empty playlist.
    pub fn new(len: usize, looping: bool) -> Option<Self> {
        if len == 0 {
            return None;
        }
        Some(Self {
            index: 0,
            len,
            looping,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false; an empty cursor cannot be constructed
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Move past the current entry
    ///
    /// On exhaustion the index is left on the last entry.
    pub fn advance(&mut self) -> Advance {
        let next = self.index + 1;
        if next < self.len {
            self.index = next;
            Advance::Next(next)
        } else if self.looping {
            self.index = 0;
            Advance::Wrapped
        } else {
            Advance::Exhausted
        }
    }
}
