use super::*;

#[test]
fn test_rows_per_chunk_is_at_least_one() {
    assert_eq!(rows_per_chunk(0), 1);
    assert_eq!(rows_per_chunk(1), 1);
    assert!(rows_per_chunk(100_000) >= 1);
}

#[test]
fn test_par_rows_mut_offsets() {
    let width = 10;
    let height = 20;
    let mut data: Vec<usize> = vec![0; width * height];

    par_rows_mut(&mut data, width).for_each(|(first_row, chunk)| {
        assert_eq!(chunk.len() % width, 0, "chunk not row-aligned");
        for (local_y, row) in chunk.chunks_mut(width).enumerate() {
            let y = first_row + local_y;
            for (x, v) in row.iter_mut().enumerate() {
                *v = y * width + x;
            }
        }
    });

    for (i, &v) in data.iter().enumerate() {
        assert_eq!(v, i);
    }
}

#[test]
fn test_par_rows_mut_odd_height() {
    let width = 7;
    let height = 13;
    let mut data: Vec<u32> = vec![u32::MAX; width * height];

    par_rows_mut(&mut data, width).for_each(|(first_row, chunk)| {
        for (local_y, row) in chunk.chunks_mut(width).enumerate() {
            row.fill((first_row + local_y) as u32);
        }
    });

    for y in 0..height {
        for x in 0..width {
            assert_eq!(data[y * width + x], y as u32);
        }
    }
}

#[test]
fn test_par_rows2_mut_same_boundaries() {
    let width = 8;
    let height = 10;
    let mut a: Vec<f64> = vec![0.0; width * height];
    let mut b: Vec<f64> = vec![0.0; width * height];

    par_rows2_mut(&mut a, &mut b, width).for_each(|(first_row, (a_chunk, b_chunk))| {
        assert_eq!(a_chunk.len(), b_chunk.len());
        for i in 0..a_chunk.len() {
            let global = first_row * width + i;
            a_chunk[i] = global as f64;
            b_chunk[i] = global as f64 * 2.0;
        }
    });

    for i in 0..width * height {
        assert_eq!(a[i], i as f64);
        assert_eq!(b[i], i as f64 * 2.0);
    }
}

#[test]
#[should_panic(expected = "equal length")]
fn test_par_rows2_mut_unequal_lengths_panics() {
    let mut a: Vec<f32> = vec![0.0; 100];
    let mut b: Vec<f32> = vec![0.0; 50];
    par_rows2_mut(&mut a, &mut b, 10).for_each(|_| {});
}

#[test]
#[should_panic(expected = "multiple of width")]
fn test_par_rows_mut_ragged_panics() {
    let mut data: Vec<u8> = vec![0; 11];
    par_rows_mut(&mut data, 4).for_each(|_| {});
}

#[test]
fn test_par_rows_mut_empty() {
    let mut data: Vec<u8> = Vec::new();
    assert_eq!(par_rows_mut(&mut data, 4).count(), 0);
}
