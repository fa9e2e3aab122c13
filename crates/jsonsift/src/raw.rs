//! Cross-chunk byte retention for raw emission mode.
//!
//! Raw emissions deliver exact source bytes, but a match may straddle any
//! number of chunk boundaries and chunks are only borrowed for the duration
//! of one `process_chunk` call. [`Retained`] keeps a contiguous window of
//! already-consumed bytes, starting at the capture offset of the match in
//! flight. Memory is bounded by the size of that match.
//!
//! Assembly is the three-case discipline: a match contained in the current
//! chunk is one subslice copy; one that started in an earlier chunk is the
//! retained head plus the current chunk's tail.

/// Contiguous retained window `[base, base + len)` of stream bytes.
#[derive(Debug, Default)]
pub(crate) struct Retained {
    base: u64,
    len: u64,
    segments: Vec<Vec<u8>>,
}

impl Retained {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.segments.clear();
        self.base = 0;
        self.len = 0;
    }

    /// Called once per chunk, after processing: keeps every byte from
    /// `floor` (inclusive) through the end of `chunk`, dropping anything
    /// older. `chunk_base` is the logical offset of `chunk[0]`.
    pub fn retain(&mut self, floor: u64, chunk: &[u8], chunk_base: u64) {
        let chunk_end = chunk_base + chunk.len() as u64;
        if floor >= chunk_end {
            self.clear();
            self.base = floor;
            return;
        }
        if floor >= chunk_base || self.segments.is_empty() {
            let start = floor.max(chunk_base);
            self.segments.clear();
            self.base = start;
            #[allow(clippy::cast_possible_truncation)]
            let skip = (start - chunk_base) as usize;
            self.segments.push(chunk[skip..].to_vec());
            self.len = chunk_end - start;
        } else {
            debug_assert!(self.base <= floor);
            debug_assert_eq!(self.base + self.len, chunk_base, "retention gap");
            self.segments.push(chunk.to_vec());
            self.len += chunk.len() as u64;
        }
    }

    /// Assembles the bytes of `[start, end)`, reading anything at or past
    /// `chunk_base` out of the current `chunk` and the rest out of the
    /// retained window.
    pub fn slice(&self, start: u64, end: u64, chunk: &[u8], chunk_base: u64) -> Vec<u8> {
        debug_assert!(start <= end);
        #[allow(clippy::cast_possible_truncation)]
        let mut out = Vec::with_capacity((end - start) as usize);
        // Retained part, below the current chunk.
        let ret_end = end.min(chunk_base);
        if start < ret_end {
            let mut seg_start = self.base;
            for seg in &self.segments {
                let seg_end = seg_start + seg.len() as u64;
                let lo = start.max(seg_start);
                let hi = ret_end.min(seg_end);
                if lo < hi {
                    #[allow(clippy::cast_possible_truncation)]
                    out.extend_from_slice(&seg[(lo - seg_start) as usize..(hi - seg_start) as usize]);
                }
                seg_start = seg_end;
            }
        }
        // Current chunk part.
        if end > chunk_base {
            let lo = start.max(chunk_base);
            #[allow(clippy::cast_possible_truncation)]
            out.extend_from_slice(&chunk[(lo - chunk_base) as usize..(end - chunk_base) as usize]);
        }
        out
    }
}
