mod common;

use briny_autograd::config::EngineConfig;
use briny_autograd::registry::{self, Registry};
use briny_autograd::{Array, Error, Params, Tensor, array};
use common::init_logging;

#[test]
fn dot_then_sum_end_to_end() {
    init_logging();
    let a = Tensor::param(array!([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]));
    let b = Tensor::param(array!([
        [1.0, 0.0, -1.0, 2.0],
        [0.5, 1.0, 0.0, -2.0],
        [3.0, -1.0, 1.0, 0.0]
    ]));
    let s = a.dot(&b).unwrap().sum().unwrap();
    assert_eq!(s.shape(), &[1]);
    // rows of a·b: [11, -1, 2, -2] and [24.5, -1, 2, -2]
    assert_eq!(s.value().item(), Some(33.5));

    s.backward().unwrap();
    // d/da = ones(2,4)·bᵀ: every row holds the row sums of b
    assert_eq!(
        a.grad().unwrap(),
        array!([[2.0, -0.5, 3.0], [2.0, -0.5, 3.0]])
    );
    // d/db = aᵀ·ones(2,4): row k holds the column sum k of a
    assert_eq!(
        b.grad().unwrap(),
        array!([
            [5.0, 5.0, 5.0, 5.0],
            [7.0, 7.0, 7.0, 7.0],
            [9.0, 9.0, 9.0, 9.0]
        ])
    );
}

#[test]
fn fan_out_gradients_add_up() {
    init_logging();
    let w = Tensor::param(array!([1.5, -2.0, 0.5]));
    // loss = Σ (w * w + w)  =>  dloss/dw = 2w + 1
    let loss = w.mul(&w).unwrap().add(&w).unwrap().sum().unwrap();
    loss.backward().unwrap();
    assert_eq!(w.grad().unwrap(), array!([4.0, -3.0, 2.0]));
}

#[test]
fn shared_subexpression_dispatches_once() {
    init_logging();
    let x = Tensor::param(array!([1.0, -1.0, 2.0]));
    let h = x.relu().unwrap();
    let loss = h.add(&h).unwrap().sum().unwrap();
    loss.backward().unwrap();
    assert_eq!(x.grad().unwrap(), array!([2.0, 0.0, 2.0]));
}

#[test]
fn reshape_round_trip() {
    let x = Tensor::param(Array::parse("[[1, 2, 3], [4, 5, 6]]").unwrap());
    let y = x.reshape(&[3, 2]).unwrap().reshape(&[6]).unwrap();
    let back = y.reshape(&[2, 3]).unwrap();
    assert_eq!(back.value(), x.value());

    let weights = Tensor::new(array!([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]));
    back.mul(&weights).unwrap().sum().unwrap().backward().unwrap();
    assert_eq!(x.grad().unwrap(), *weights.value());
}

#[test]
fn log_softmax_rows_are_normalised() {
    let x = Tensor::new(array!([[1.0, 2.0, 3.0], [1000.0, 1000.0, 1000.0], [-5.0, 0.0, 5.0]]));
    let y = x.log_softmax().unwrap();
    for row in y.value().data().chunks(3) {
        let total: f64 = row.iter().map(|v| v.exp()).sum();
        assert!((total - 1.0).abs() < 1e-12, "row sums to {total}");
        assert!(row.iter().all(|v| v.is_finite() && *v <= 0.0));
    }
}

#[test]
fn max_pool_ties_go_to_first_candidate() {
    let x = Tensor::param(Array::full(vec![1, 1, 2, 4], 7.0));
    let pooled = x.max_pool2x2().unwrap();
    assert_eq!(pooled.value(), &Array::new(vec![1, 1, 1, 2], vec![7.0, 7.0]));

    pooled
        .backward_with(Some(&Array::new(vec![1, 1, 1, 2], vec![3.0, 5.0])), false)
        .unwrap();
    assert_eq!(
        x.grad().unwrap(),
        Array::new(vec![1, 1, 2, 4], vec![3.0, 0.0, 5.0, 0.0, 0.0, 0.0, 0.0, 0.0])
    );
}

#[test]
fn max_pool_routes_gradient_to_first_nan() {
    let x = Tensor::param(Array::new(vec![1, 1, 2, 2], vec![1.0, f64::NAN, 0.0, f64::NAN]));
    let pooled = x.max_pool2x2().unwrap();
    assert!(pooled.value().data()[0].is_nan());
    pooled.sum().unwrap().backward().unwrap();
    assert_eq!(x.grad().unwrap().data(), &[0.0, 1.0, 0.0, 0.0]);
}

#[test]
fn max_pool_rejects_odd_sizes() {
    let x = Tensor::new(Array::zeros(vec![1, 1, 3, 4]));
    assert!(matches!(x.max_pool2x2(), Err(Error::ShapeMismatch { .. })));
}

#[test]
fn constants_get_no_graph() {
    let a = Tensor::new(array!([1.0, 2.0]));
    let b = Tensor::leaf(array!([3.0, 4.0]), false);
    let c = a.mul(&b).unwrap();
    assert!(c.node().is_none());
    assert!(!c.requires_grad());
    assert!(matches!(c.sum().unwrap().backward(), Err(Error::NoGraph)));
}

#[test]
fn only_gradient_requiring_inputs_receive_gradients() {
    let x = Tensor::param(array!([[1.0, 2.0]]));
    let w = Tensor::new(array!([[3.0], [4.0]]));
    let y = x.dot(&w).unwrap();
    assert_eq!(y.op_name(), Some("dot"));
    y.sum().unwrap().backward().unwrap();
    assert_eq!(x.grad().unwrap(), array!([[3.0, 4.0]]));
    assert!(w.grad().is_none());
}

#[test]
fn detached_values_stop_gradients() {
    let x = Tensor::param(array!([2.0]));
    let y = x.mul(&x).unwrap();
    let z = y.detach().mul(&x).unwrap();
    z.backward().unwrap();
    // y is treated as the constant 4
    assert_eq!(x.grad().unwrap(), array!([4.0]));
}

#[test]
fn gradients_accumulate_until_zeroed() {
    let x = Tensor::param(array!([1.0, 2.0]));
    for _ in 0..2 {
        x.mul(&x).unwrap().sum().unwrap().backward().unwrap();
    }
    assert_eq!(x.grad().unwrap(), array!([4.0, 8.0]));
    x.zero_grad();
    assert!(x.grad().is_none());
}

#[test]
fn retained_graph_can_be_replayed() {
    let x = Tensor::param(array!([1.0, 3.0]));
    let loss = x.mul(&x).unwrap().sum().unwrap();

    loss.backward_with(None, true).unwrap();
    loss.backward_with(None, true).unwrap();
    assert_eq!(x.grad().unwrap(), array!([4.0, 12.0]));

    loss.backward().unwrap();
    assert!(!loss.node().unwrap().has_context());
    assert!(matches!(
        loss.backward(),
        Err(Error::GraphReleased { op }) if op == "sum"
    ));
    assert_eq!(x.grad().unwrap(), array!([6.0, 18.0]));
}

#[test]
fn failed_backward_changes_nothing() {
    init_logging();
    let mut reg = Registry::with_defaults(EngineConfig::default());
    reg.register_fn(
        "broken",
        1,
        |inputs, _| Ok((inputs[0].clone(), Vec::new())),
        |_, _, _| Ok(vec![Some(Array::zeros(vec![7]))]),
    )
    .unwrap();

    let x = Tensor::param(array!([1.0, -2.0]));
    let h = reg.apply("relu", &[&x], Params::None).unwrap();
    let b = reg.apply("broken", &[&h], Params::None).unwrap();
    let loss = reg.apply("sum", &[&b], Params::None).unwrap();

    assert!(matches!(
        loss.backward(),
        Err(Error::ShapeMismatch { op, .. }) if op == "broken"
    ));
    assert!(x.grad().is_none());
    assert!(loss.node().unwrap().has_context());
    assert!(h.node().unwrap().has_context());
}

#[test]
fn deep_chain_backward_and_drop() {
    let x = Tensor::param(array!([2.0]));
    let mut y = x.clone();
    for _ in 0..50_000 {
        y = y.reshape(&[1]).unwrap();
    }
    let loss = y.sum().unwrap();
    loss.backward().unwrap();
    assert_eq!(x.grad().unwrap(), array!([1.0]));

    drop(y);
    drop(loss);
    // the leaf outlives its consumers
    assert_eq!(x.grad().unwrap(), array!([1.0]));
}

#[test]
fn dropping_a_branch_keeps_shared_history() {
    let x = Tensor::param(array!([1.0, -2.0]));
    let mut shared = x.relu().unwrap();
    for _ in 0..1_000 {
        shared = shared.reshape(&[2]).unwrap();
    }
    let left = shared.mul(&shared).unwrap();
    let right = shared.add(&x).unwrap();
    drop(shared);
    drop(left);

    right.sum().unwrap().backward().unwrap();
    assert_eq!(x.grad().unwrap(), array!([2.0, 1.0]));
}

#[test]
fn registry_reports_bad_invocations() {
    let x = Tensor::param(array!([[1.0, 2.0], [3.0, 4.0]]));

    assert!(matches!(
        registry::apply("softmax", &[&x], Params::None),
        Err(Error::UnknownOperation { name }) if name == "softmax"
    ));
    assert!(matches!(
        registry::apply("add", &[&x], Params::None),
        Err(Error::ArityMismatch { expected: 2, got: 1, .. })
    ));
    assert!(matches!(
        registry::apply("relu", &[&x], Params::Shape(vec![4])),
        Err(Error::InvalidParams { .. })
    ));
    assert!(matches!(
        registry::apply("reshape", &[&x], Params::None),
        Err(Error::InvalidParams { .. })
    ));
    assert!(matches!(x.reshape(&[3]), Err(Error::ShapeMismatch { .. })));
    assert!(matches!(
        x.dot(&Tensor::new(Array::ones(vec![3, 1]))),
        Err(Error::ShapeMismatch { .. })
    ));
    assert!(matches!(
        x.add(&Tensor::new(Array::ones(vec![2]))),
        Err(Error::ShapeMismatch { .. })
    ));
}

#[test]
fn custom_operation_joins_the_graph() {
    let mut reg = Registry::new(EngineConfig::default());
    reg.register_fn(
        "square",
        1,
        |inputs, params| {
            params.expect_none("square")?;
            let x = inputs[0].clone();
            Ok((x.map(|v| v * v), vec![x]))
        },
        |saved, grad, _| {
            let dx = saved[0].zip_map(grad, "square", |x, g| 2.0 * x * g)?;
            Ok(vec![Some(dx)])
        },
    )
    .unwrap();
    assert!(matches!(
        reg.register_fn("square", 1, |i, _| Ok((i[0].clone(), vec![])), |_, _, _| Ok(vec![None])),
        Err(Error::DuplicateRegistration { .. })
    ));
    assert_eq!(reg.names(), vec!["square"]);

    let x = Tensor::param(array!([3.0, -1.0]));
    let y = reg.apply("square", &[&x], Params::None).unwrap();
    assert_eq!(y.value(), &array!([9.0, 1.0]));
    // custom op output feeding a globally registered op
    y.sum().unwrap().backward().unwrap();
    assert_eq!(x.grad().unwrap(), array!([6.0, -2.0]));
}

#[test]
fn independent_graphs_on_many_threads() {
    init_logging();
    let handles: Vec<_> = (0..4)
        .map(|t| {
            std::thread::spawn(move || {
                let scale = f64::from(t + 1);
                let x = Tensor::param(Array::full(vec![2, 3], scale));
                let w = Tensor::param(Array::ones(vec![3, 2]));
                let loss = x.dot(&w).unwrap().relu().unwrap().sum().unwrap();
                loss.backward().unwrap();
                (scale, x.grad().unwrap(), w.grad().unwrap())
            })
        })
        .collect();

    for handle in handles {
        let (scale, dx, dw) = handle.join().unwrap();
        assert_eq!(dx, Array::full(vec![2, 3], 2.0));
        assert_eq!(dw, Array::full(vec![3, 2], 2.0 * scale));
    }
}
