#![allow(dead_code)]

use briny_autograd::{Array, Params, Registry, Tensor};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

const EPS: f64 = 1e-6;
const TOL: f64 = 1e-6;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Uniform values in `[-1, 1)`.
pub fn random(rng: &mut StdRng, shape: &[usize]) -> Array {
    let n = shape.iter().product();
    Array::new(shape.to_vec(), (0..n).map(|_| rng.random_range(-1.0..1.0)).collect())
}

/// Values with magnitude in `[0.1, 1)` so kinks at zero stay out of reach of
/// the finite-difference step.
pub fn away_from_zero(rng: &mut StdRng, shape: &[usize]) -> Array {
    let n = shape.iter().product();
    let data = (0..n)
        .map(|_| {
            let m: f64 = rng.random_range(0.1..1.0);
            if rng.random_bool(0.5) { m } else { -m }
        })
        .collect();
    Array::new(shape.to_vec(), data)
}

/// Pairwise distinct values (spaced by 0.1) in random order.
pub fn distinct(rng: &mut StdRng, shape: &[usize]) -> Array {
    let n: usize = shape.iter().product();
    let mut data: Vec<f64> = (0..n).map(|i| i as f64 * 0.1 - 1.0).collect();
    data.shuffle(rng);
    Array::new(shape.to_vec(), data)
}

/// Compares the analytic gradient of `<op(inputs), r>` for a random `r` with
/// central finite differences, for every element of every input.
pub fn check_gradients(
    reg: &Registry,
    name: &str,
    inputs: &[Array],
    params: Params,
    rng: &mut StdRng,
) {
    let leaves: Vec<Tensor> = inputs.iter().cloned().map(Tensor::param).collect();
    let refs: Vec<&Tensor> = leaves.iter().collect();
    let out = reg.apply(name, &refs, params.clone()).unwrap();
    let proj = random(rng, out.shape());
    out.backward_with(Some(&proj), false).unwrap();

    let objective = |arrays: &[Array]| -> f64 {
        let ts: Vec<Tensor> = arrays.iter().cloned().map(Tensor::new).collect();
        let refs: Vec<&Tensor> = ts.iter().collect();
        let out = reg.apply(name, &refs, params.clone()).unwrap();
        out.value()
            .data()
            .iter()
            .zip(proj.data())
            .map(|(a, b)| a * b)
            .sum()
    };

    let mut probe = inputs.to_vec();
    for (i, leaf) in leaves.iter().enumerate() {
        let analytic = leaf.grad().expect("every input should receive a gradient");
        assert_eq!(analytic.shape(), inputs[i].shape());
        for j in 0..inputs[i].numel() {
            let orig = inputs[i].data()[j];
            probe[i].data_mut()[j] = orig + EPS;
            let up = objective(&probe);
            probe[i].data_mut()[j] = orig - EPS;
            let down = objective(&probe);
            probe[i].data_mut()[j] = orig;

            let numeric = (up - down) / (2.0 * EPS);
            let a = analytic.data()[j];
            assert!(
                (a - numeric).abs() <= TOL * (1.0 + a.abs().max(numeric.abs())),
                "{name}: input {i} element {j}: analytic {a} vs numeric {numeric}"
            );
        }
    }
}
