//! Row-aligned parallel iteration over image buffers.
//!
//! Every chunk handed out contains whole rows and chunks never overlap, so a
//! closure may write its chunk without synchronisation.

use rayon::prelude::*;

#[cfg(test)]
mod tests;

/// Chunks per rayon thread. More chunks than threads keeps the pool busy
/// when rows cost different amounts.
const CHUNKS_PER_THREAD: usize = 3;

/// Number of rows per chunk for an image of `height` rows.
#[inline]
pub fn rows_per_chunk(height: usize) -> usize {
    let num_chunks = rayon::current_num_threads() * CHUNKS_PER_THREAD;
    (height / num_chunks).max(1)
}

fn check_row_layout(len: usize, width: usize) {
    assert!(width > 0, "row width must be > 0");
    assert_eq!(len % width, 0, "slice length must be a multiple of width");
}

/// Split `data` into row-aligned chunks processed in parallel.
///
/// Yields `(first_row, chunk)` pairs where `chunk` holds complete rows.
pub fn par_rows_mut<'a, T: Send + 'a>(
    data: &'a mut [T],
    width: usize,
) -> impl IndexedParallelIterator<Item = (usize, &'a mut [T])> + 'a {
    check_row_layout(data.len(), width);
    let chunk_rows = rows_per_chunk(data.len() / width);
    data.par_chunks_mut(width * chunk_rows)
        .enumerate()
        .map(move |(idx, chunk)| (idx * chunk_rows, chunk))
}

/// Like [`par_rows_mut`], for two buffers of the same shape split at the same
/// row boundaries.
pub fn par_rows2_mut<'a, A: Send + 'a, B: Send + 'a>(
    a: &'a mut [A],
    b: &'a mut [B],
    width: usize,
) -> impl IndexedParallelIterator<Item = (usize, (&'a mut [A], &'a mut [B]))> + 'a {
    assert_eq!(a.len(), b.len(), "zipped slices must have equal length");
    check_row_layout(a.len(), width);
    let chunk_rows = rows_per_chunk(a.len() / width);
    let chunk_size = width * chunk_rows;
    a.par_chunks_mut(chunk_size)
        .zip(b.par_chunks_mut(chunk_size))
        .enumerate()
        .map(move |(idx, pair)| (idx * chunk_rows, pair))
}
