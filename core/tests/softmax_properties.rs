use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use shardblas::pool::{CpuFleet, FleetConfig, UnitFleet};
use shardblas::softmax;

fn fleet(units: usize, capacity: usize) -> CpuFleet {
    CpuFleet::new(
        FleetConfig::default()
            .with_units(units)
            .with_unit_capacity(capacity)
            .with_workers(4),
    )
}

fn host_softmax(input: &[f32]) -> Vec<f32> {
    let max = input.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = input.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

#[test]
fn test_softmax_sums_to_one_across_units() {
    // 742 elements over 256-element ranges: three units, odd-length tail.
    let mut input = vec![0.0f32; 742];
    input[31] = 14.0;
    let mut output = vec![0.0f32; 742];

    let fleet = fleet(4, 1024);
    softmax(&fleet, &input, &mut output).unwrap();

    let sum: f32 = output.iter().sum();
    assert!((sum - 1.0).abs() < 1e-4, "sum = {sum}");
    assert_eq!(fleet.available(), 4);
}

#[test]
fn test_softmax_dominant_input_is_near_one_hot() {
    let mut input = vec![0.0f32; 742];
    input[31] = 14.0;
    let mut output = vec![0.0f32; 742];

    let fleet = fleet(4, 1024);
    softmax(&fleet, &input, &mut output).unwrap();

    assert!(output[31] > 0.99, "dominant lane got {}", output[31]);
    for (i, &v) in output.iter().enumerate() {
        if i != 31 {
            assert!(v < 1e-5, "lane {i} got {v}");
        }
    }
}

#[test]
fn test_softmax_matches_host_reference() {
    let mut rng = StdRng::seed_from_u64(41);
    let input: Vec<f32> = (0..513).map(|_| rng.gen_range(-5.0f32..5.0)).collect();
    let mut output = vec![0.0f32; input.len()];

    let fleet = fleet(4, 1024);
    softmax(&fleet, &input, &mut output).unwrap();

    let expected = host_softmax(&input);
    for (i, (&got, &want)) in output.iter().zip(&expected).enumerate() {
        assert!((got - want).abs() < 1e-5, "lane {i}: {got} vs {want}");
    }
}

#[test]
fn test_softmax_shift_invariance() {
    let mut rng = StdRng::seed_from_u64(42);
    let input: Vec<f32> = (0..600).map(|_| rng.gen_range(-3.0f32..3.0)).collect();
    let shifted: Vec<f32> = input.iter().map(|&x| x + 7.25).collect();

    let fleet = fleet(4, 1024);
    let mut plain = vec![0.0f32; input.len()];
    let mut offset = vec![0.0f32; input.len()];
    softmax(&fleet, &input, &mut plain).unwrap();
    softmax(&fleet, &shifted, &mut offset).unwrap();

    for (i, (&a, &b)) in plain.iter().zip(&offset).enumerate() {
        assert!((a - b).abs() < 1e-5, "lane {i}: {a} vs {b}");
    }
}

#[test]
fn test_softmax_all_negative_inputs() {
    // The max phase must hold up when every element is below zero.
    let input: Vec<f32> = (0..300).map(|i| -1.0 - (i as f32) * 0.01).collect();
    let mut output = vec![0.0f32; input.len()];

    let fleet = fleet(4, 1024);
    softmax(&fleet, &input, &mut output).unwrap();

    let sum: f32 = output.iter().sum();
    assert!((sum - 1.0).abs() < 1e-4);
    // The least negative input carries the largest probability.
    let argmax = output
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
        .unwrap()
        .0;
    assert_eq!(argmax, 0);
}

#[test]
fn test_softmax_single_element() {
    let fleet = fleet(2, 1024);
    let mut output = vec![0.0f32; 1];
    softmax(&fleet, &[3.7], &mut output).unwrap();
    assert!((output[0] - 1.0).abs() < 1e-6);
}

#[test]
fn test_softmax_empty_is_noop() {
    let fleet = fleet(2, 1024);
    let mut output: Vec<f32> = Vec::new();
    softmax(&fleet, &[], &mut output).unwrap();
    assert_eq!(fleet.available(), 2);
}
