mod common;

use briny_autograd::config::{ConvStrategy, EngineConfig};
use briny_autograd::{Array, Error, Params, Registry, Tensor};
use common::{random, rng};

fn conv(strategy: ConvStrategy, x: &Array, w: &Array, seed: &Array) -> (Array, Array, Array) {
    let reg = Registry::with_defaults(EngineConfig::with_conv(strategy));
    let x = Tensor::param(x.clone());
    let w = Tensor::param(w.clone());
    let y = reg.apply("conv2d", &[&x, &w], Params::None).unwrap();
    assert_eq!(y.op_name(), Some("conv2d"));
    y.backward_with(Some(seed), false).unwrap();
    (y.value().clone(), x.grad().unwrap(), w.grad().unwrap())
}

#[test]
fn strategies_agree() {
    let mut rng = rng(42);
    for (xs, ws) in [
        ([2, 3, 6, 5], [4, 3, 3, 2]),
        ([1, 1, 4, 4], [2, 1, 4, 4]),
        ([3, 2, 5, 7], [1, 2, 1, 1]),
    ] {
        let x = random(&mut rng, &xs);
        let w = random(&mut rng, &ws);
        let out_shape = [xs[0], ws[0], xs[2] - ws[2] + 1, xs[3] - ws[3] + 1];
        let seed = random(&mut rng, &out_shape);

        let (y_d, dx_d, dw_d) = conv(ConvStrategy::Direct, &x, &w, &seed);
        let (y_p, dx_p, dw_p) = conv(ConvStrategy::PatchMatrix, &x, &w, &seed);

        assert_eq!(y_d.shape(), &out_shape);
        assert_eq!(y_d, y_p);
        assert!(dx_d.allclose(&dx_p, 1e-12), "dx differs by {}", dx_d.max_abs_diff(&dx_p));
        assert!(dw_d.allclose(&dw_p, 1e-12), "dw differs by {}", dw_d.max_abs_diff(&dw_p));
    }
}

#[test]
fn hand_computed_difference_kernel() {
    let x = Array::new(vec![1, 1, 3, 3], (1..=9).map(f64::from).collect());
    let w = Array::new(vec![1, 1, 2, 2], vec![1.0, 0.0, 0.0, -1.0]);
    let ones = Array::ones(vec![1, 1, 2, 2]);
    for strategy in [ConvStrategy::Direct, ConvStrategy::PatchMatrix] {
        let (y, dx, dw) = conv(strategy, &x, &w, &ones);
        assert_eq!(y, Array::full(vec![1, 1, 2, 2], -4.0));
        assert_eq!(dw.data(), &[12.0, 16.0, 24.0, 28.0]);
        assert_eq!(
            dx.data(),
            &[1.0, 1.0, 0.0, 1.0, 0.0, -1.0, 0.0, -1.0, -1.0]
        );
    }
}

#[test]
fn tensor_sugar_uses_configured_alias() {
    let x = Tensor::param(Array::ones(vec![1, 2, 3, 3]));
    let w = Tensor::new(Array::ones(vec![1, 2, 2, 2]));
    let y = x.conv2d(&w).unwrap();
    assert_eq!(y.value(), &Array::full(vec![1, 1, 2, 2], 8.0));
    y.sum().unwrap().backward().unwrap();
    assert_eq!(
        x.grad().unwrap().data()[..9],
        [1.0, 2.0, 1.0, 2.0, 4.0, 2.0, 1.0, 2.0, 1.0]
    );
    assert!(w.grad().is_none());
}

#[test]
fn invalid_geometry_is_rejected() {
    let reg = Registry::default();
    let cases = [
        (vec![1, 2, 4, 4], vec![1, 3, 2, 2]),
        (vec![1, 1, 2, 2], vec![1, 1, 3, 1]),
        (vec![1, 4, 4], vec![1, 1, 2, 2]),
    ];
    for name in ["conv2d_direct", "conv2d_im2col"] {
        for (xs, ws) in &cases {
            let x = Tensor::new(Array::zeros(xs.clone()));
            let w = Tensor::new(Array::zeros(ws.clone()));
            assert!(matches!(
                reg.apply(name, &[&x, &w], Params::None),
                Err(Error::ShapeMismatch { .. })
            ));
        }
    }
}
