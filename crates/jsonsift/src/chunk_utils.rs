//! Byte-chunk helpers for tests and benchmarks.

/// Split `payload` into approximately equal-sized chunks.
///
/// # Panics
///
/// Panics if `parts` is zero.
#[must_use]
pub fn produce_chunks(payload: &[u8], parts: usize) -> Vec<&[u8]> {
    assert!(parts > 0);
    let chunk_size = payload.len().div_ceil(parts).max(1);
    payload.chunks(chunk_size).collect()
}

/// Split `payload` at the given sorted cut points (offsets into the
/// payload). Out-of-range or duplicate points are ignored.
#[must_use]
pub fn split_at_points<'a>(payload: &'a [u8], points: &[usize]) -> Vec<&'a [u8]> {
    let mut chunks = Vec::with_capacity(points.len() + 1);
    let mut start = 0;
    for &p in points {
        if p > start && p < payload.len() {
            chunks.push(&payload[start..p]);
            start = p;
        }
    }
    chunks.push(&payload[start..]);
    chunks
}
