use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use shardblas::pool::{CpuFleet, FleetConfig, UnitFleet};
use shardblas::{gemv, ResidentMatrix};

fn fleet(units: usize, capacity: usize, workers: usize) -> CpuFleet {
    CpuFleet::new(
        FleetConfig::default()
            .with_units(units)
            .with_unit_capacity(capacity)
            .with_workers(workers),
    )
}

/// Straightforward row-major triple-loop reference.
fn host_gemv_f32(m: usize, n: usize, a: &[f32], x: &[f32], y: &mut [f32], alpha: f32, beta: f32) {
    for row in 0..m {
        let mut acc = 0.0f32;
        for col in 0..n {
            acc += a[row * n + col] * x[col];
        }
        y[row] = alpha * acc + beta * y[row];
    }
}

fn host_gemv_i32(m: usize, n: usize, a: &[i32], x: &[i32], y: &mut [i32], alpha: i32, beta: i32) {
    for row in 0..m {
        let mut acc = 0i32;
        for col in 0..n {
            acc += a[row * n + col] * x[col];
        }
        y[row] = alpha * acc + beta * y[row];
    }
}

#[test]
fn test_gemv_f32_non_aligned_shape_with_beta() {
    // Non-power-of-two, non-multiple-of-32 shape: the last unit's row block
    // is mostly padding.
    let (m, n) = (100u32, 37u32);
    let mut rng = StdRng::seed_from_u64(21);
    let a: Vec<f32> = (0..m * n).map(|_| rng.gen_range(-2.0f32..2.0)).collect();
    let x: Vec<f32> = (0..n).map(|_| rng.gen_range(-2.0f32..2.0)).collect();
    let mut y: Vec<f32> = (0..m).map(|_| rng.gen_range(-2.0f32..2.0)).collect();
    let mut expected = y.clone();

    let fleet = fleet(8, 256 * 1024, 4);
    gemv(&fleet, m, n, &a, &x, &mut y, 2.5, 1.5).unwrap();
    host_gemv_f32(m as usize, n as usize, &a, &x, &mut expected, 2.5, 1.5);

    for (row, (&got, &want)) in y.iter().zip(&expected).enumerate() {
        assert!((got - want).abs() < 1e-3, "row {row}: {got} vs {want}");
    }
    assert_eq!(fleet.available(), 8, "driver released its pool");
}

#[test]
fn test_gemv_f32_beta_zero_ignores_y_contents() {
    let (m, n) = (64u32, 16u32);
    let mut rng = StdRng::seed_from_u64(22);
    let a: Vec<f32> = (0..m * n).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
    let x: Vec<f32> = (0..n).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
    // Poisoned output buffer: with beta = 0 it must be fully overwritten.
    let mut y = vec![f32::NAN; m as usize];
    let mut expected = vec![0.0f32; m as usize];

    let fleet = fleet(8, 256 * 1024, 4);
    gemv(&fleet, m, n, &a, &x, &mut y, 1.0, 0.0).unwrap();
    host_gemv_f32(m as usize, n as usize, &a, &x, &mut expected, 1.0, 0.0);

    for (&got, &want) in y.iter().zip(&expected) {
        assert!((got - want).abs() < 1e-4);
    }
}

#[test]
fn test_gemv_i32_exact() {
    let (m, n) = (96u32, 33u32);
    let mut rng = StdRng::seed_from_u64(23);
    let a: Vec<i32> = (0..m * n).map(|_| rng.gen_range(-50..50)).collect();
    let x: Vec<i32> = (0..n).map(|_| rng.gen_range(-50..50)).collect();
    let mut y: Vec<i32> = (0..m).map(|_| rng.gen_range(-100..100)).collect();
    let mut expected = y.clone();

    let fleet = fleet(8, 128 * 1024, 4);
    gemv(&fleet, m, n, &a, &x, &mut y, 3, 2).unwrap();
    host_gemv_i32(m as usize, n as usize, &a, &x, &mut expected, 3, 2);
    assert_eq!(y, expected);
}

#[test]
fn test_gemv_i8_widens_to_i32() {
    let (m, n) = (40u32, 13u32);
    let mut rng = StdRng::seed_from_u64(24);
    let a: Vec<i8> = (0..m * n).map(|_| rng.gen_range(-128i16..128) as i8).collect();
    let x: Vec<i8> = (0..n).map(|_| rng.gen_range(-128i16..128) as i8).collect();
    let mut y: Vec<i32> = (0..m).map(|_| rng.gen_range(-100..100)).collect();
    let mut expected = y.clone();

    let fleet = fleet(8, 64 * 1024, 4);
    gemv(&fleet, m, n, &a, &x, &mut y, 1, 1).unwrap();

    for row in 0..m as usize {
        let acc: i32 = (0..n as usize)
            .map(|col| a[row * n as usize + col] as i32 * x[col] as i32)
            .sum();
        expected[row] += acc;
    }
    assert_eq!(y, expected);
}

#[test]
fn test_gemv_single_row_block() {
    // Small enough for one unit: the degenerate plan must still be exact.
    let (m, n) = (8u32, 8u32);
    let a: Vec<i32> = (1..=64).collect();
    let x = vec![1i32; 8];
    let mut y = vec![0i32; 8];

    let fleet = fleet(2, 64 * 1024, 2);
    gemv(&fleet, m, n, &a, &x, &mut y, 1, 0).unwrap();

    let mut expected = vec![0i32; 8];
    host_gemv_i32(8, 8, &a, &x, &mut expected, 1, 0);
    assert_eq!(y, expected);
}

#[test]
fn test_resident_matrix_repeated_multiplies() {
    let (m, n) = (64u32, 24u32);
    let mut rng = StdRng::seed_from_u64(25);
    let a: Vec<i32> = (0..m * n).map(|_| rng.gen_range(-20..20)).collect();

    let fleet = fleet(8, 128 * 1024, 4);
    let mut resident = ResidentMatrix::<i32, _>::new(&fleet, &a, m, n, 1, 0).unwrap();

    // The matrix is transferred once; every multiply reuses it.
    for round in 0..4 {
        let x: Vec<i32> = (0..n).map(|_| rng.gen_range(-20..20)).collect();
        let mut y = vec![0i32; m as usize];
        resident.multiply(&x, &mut y).unwrap();

        let mut expected = vec![0i32; m as usize];
        host_gemv_i32(m as usize, n as usize, &a, &x, &mut expected, 1, 0);
        assert_eq!(y, expected, "round {round}");
    }

    resident.release();
    assert_eq!(fleet.available(), 8);
}
