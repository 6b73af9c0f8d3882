use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use shardblas::pool::{CpuFleet, FleetConfig};
use shardblas::{dot, dot_planes};

fn fleet(units: usize, capacity: usize) -> CpuFleet {
    CpuFleet::new(
        FleetConfig::default()
            .with_units(units)
            .with_unit_capacity(capacity)
            .with_workers(4),
    )
}

fn host_dot_u32(a: &[u32], b: &[u32]) -> u64 {
    a.iter().zip(b).map(|(&x, &y)| x as u64 * y as u64).sum()
}

#[test]
fn test_dot_u32_single_unit() {
    let mut rng = StdRng::seed_from_u64(7);
    // Bounded so the u64 accumulator cannot overflow even at full length.
    let a: Vec<u32> = (0..1024).map(|_| rng.gen_range(0..1 << 24)).collect();
    let b: Vec<u32> = (0..1024).map(|_| rng.gen_range(0..1 << 24)).collect();

    let fleet = fleet(4, 64 * 1024);
    assert_eq!(dot(&fleet, &a, &b).unwrap(), host_dot_u32(&a, &b));
}

#[test]
fn test_dot_u32_chunked_with_remainder() {
    let mut rng = StdRng::seed_from_u64(8);
    // Capacity 4096 → 512-element chunks; 1324 = 2 * 512 + 300.
    let n = 1324;
    let a: Vec<u32> = (0..n).map(|_| rng.gen_range(0..1u32 << 24)).collect();
    let b: Vec<u32> = (0..n).map(|_| rng.gen_range(0..1u32 << 24)).collect();

    let fleet = fleet(8, 4096);
    assert_eq!(dot(&fleet, &a, &b).unwrap(), host_dot_u32(&a, &b));
}

#[test]
fn test_dot_u32_odd_length() {
    let mut rng = StdRng::seed_from_u64(9);
    let n = 1023;
    let a: Vec<u32> = (0..n).map(|_| rng.gen_range(0..1u32 << 24)).collect();
    let b: Vec<u32> = (0..n).map(|_| rng.gen_range(0..1u32 << 24)).collect();

    let fleet = fleet(8, 2048);
    assert_eq!(dot(&fleet, &a, &b).unwrap(), host_dot_u32(&a, &b));
}

#[test]
fn test_dot_i32_signed() {
    let mut rng = StdRng::seed_from_u64(10);
    let n = 777;
    let a: Vec<i32> = (0..n).map(|_| rng.gen_range(-10_000..10_000)).collect();
    let b: Vec<i32> = (0..n).map(|_| rng.gen_range(-10_000..10_000)).collect();

    let expected: i64 = a.iter().zip(&b).map(|(&x, &y)| x as i64 * y as i64).sum();
    let fleet = fleet(8, 2048);
    assert_eq!(dot(&fleet, &a, &b).unwrap(), expected);
}

#[test]
fn test_dot_f32_close_to_reference() {
    let mut rng = StdRng::seed_from_u64(11);
    let n = 2048;
    let a: Vec<f32> = (0..n).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
    let b: Vec<f32> = (0..n).map(|_| rng.gen_range(-1.0f32..1.0)).collect();

    let expected: f64 = a
        .iter()
        .zip(&b)
        .map(|(&x, &y)| x as f64 * y as f64)
        .sum();
    let fleet = fleet(8, 2048);
    let result = dot(&fleet, &a, &b).unwrap() as f64;
    assert!(
        (result - expected).abs() < 1e-2,
        "result {result}, reference {expected}"
    );
}

#[test]
fn test_dot_empty_is_zero() {
    let fleet = fleet(2, 1024);
    assert_eq!(dot::<u32, _>(&fleet, &[], &[]).unwrap(), 0);
}

#[test]
fn test_dot_planes_matches_plain_mac() {
    let mut rng = StdRng::seed_from_u64(12);
    let a: Vec<u32> = (0..1024).map(|_| rng.gen_range(0..1u32 << 24)).collect();
    let b: Vec<u32> = (0..1024).map(|_| rng.gen_range(0..1u32 << 24)).collect();

    let fleet = fleet(4, 64 * 1024);
    assert_eq!(dot_planes(&fleet, &a, &b).unwrap(), host_dot_u32(&a, &b));
}

#[test]
fn test_dot_planes_chunked_across_units() {
    let mut rng = StdRng::seed_from_u64(13);
    // 40000 elements encode to 20000 plane words; with a 64 KiB unit the
    // driver chunks at 4096 words, so five units carry a short tail chunk.
    let n = 40_000;
    let a: Vec<u32> = (0..n).map(|_| rng.gen_range(0..1u32 << 23)).collect();
    let b: Vec<u32> = (0..n).map(|_| rng.gen_range(0..1u32 << 23)).collect();

    let fleet = fleet(8, 64 * 1024);
    assert_eq!(dot_planes(&fleet, &a, &b).unwrap(), host_dot_u32(&a, &b));
}

#[test]
fn test_dot_planes_small_and_unpadded_sizes() {
    let fleet = fleet(4, 64 * 1024);
    let mut rng = StdRng::seed_from_u64(14);
    for n in [1usize, 2, 63, 64, 65, 100] {
        let a: Vec<u32> = (0..n).map(|_| rng.gen_range(0..1u32 << 24)).collect();
        let b: Vec<u32> = (0..n).map(|_| rng.gen_range(0..1u32 << 24)).collect();
        assert_eq!(
            dot_planes(&fleet, &a, &b).unwrap(),
            host_dot_u32(&a, &b),
            "n={n}"
        );
    }
}

#[test]
fn test_dot_planes_empty_is_zero() {
    let fleet = fleet(2, 1024);
    assert_eq!(dot_planes(&fleet, &[], &[]).unwrap(), 0);
}
