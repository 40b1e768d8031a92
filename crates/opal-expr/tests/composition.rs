#![allow(clippy::float_cmp)]

use opal_expr::{
    gradient, jacobian, vertcat, DenseMatrix, Function, Graph, MatrixExpr, Slice,
};

/// Test: x^2 + 10 evaluated at a scalar and elementwise
#[test]
fn test_square_plus_ten() {
    let g = Graph::new();
    let x = MatrixExpr::scalar_sym(&g, "x");
    let f = Function::new("f", &[x.clone()], &[&x.powf(2.0) + 10.0]).unwrap();
    let out = f.evaluate(&[DenseMatrix::scalar(3.0)]).unwrap();
    assert_eq!(out[0].as_scalar(), Some(19.0));

    let v = MatrixExpr::sym(&g, "v", 3, 1);
    let fv = Function::new("fv", &[v.clone()], &[&v.sq() + 10.0]).unwrap();
    let out = fv
        .evaluate(&[DenseMatrix::column(vec![0.0, 2.0, 4.0])])
        .unwrap();
    assert_eq!(out[0].data(), &[10.0, 14.0, 26.0]);
}

/// Test: a function embedded twice in another graph, then differentiated
#[test]
fn test_nested_call_and_derivative() {
    let g = Graph::new();
    let x = MatrixExpr::scalar_sym(&g, "x");
    let f = Function::new("f", &[x.clone()], &[&x.sq() + 10.0]).unwrap();

    let h = Graph::new();
    let y = MatrixExpr::scalar_sym(&h, "y");
    let once = f.call(&h, &[y.clone()]).unwrap().remove(0);
    let twice = f.call(&h, &[once]).unwrap().remove(0);
    let outer = Function::new("ff", &[y.clone()], &[twice.clone()]).unwrap();

    // f(f(1)) = 11^2 + 10
    let value = outer.evaluate(&[DenseMatrix::scalar(1.0)]).unwrap();
    assert_eq!(value[0].as_scalar(), Some(131.0));

    // d/dy f(f(y)) = 2 f(y) * 2y = 44 at y = 1
    let d = gradient(&twice, &y).unwrap();
    let df = Function::new("dff", &[y], &[d]).unwrap();
    let slope = df.evaluate(&[DenseMatrix::scalar(1.0)]).unwrap();
    assert!((slope[0].as_scalar().unwrap() - 44.0).abs() < 1e-12);
}

/// Test: full slice evaluates to the same numbers as the source matrix
#[test]
fn test_slice_identity_numerically() {
    let g = Graph::new();
    let m = MatrixExpr::sym(&g, "m", 3, 2);
    let expr = m.sin();
    let sliced = expr.slice(Slice::all(), Slice::all()).unwrap();
    let f = Function::new("f", &[m], &[expr, sliced]).unwrap();
    let input = DenseMatrix::from_rows(&[vec![0.1, 0.2], vec![0.3, 0.4], vec![0.5, 0.6]]).unwrap();
    let out = f.evaluate(&[input]).unwrap();
    assert_eq!(out[0], out[1]);
}

/// Test: Jacobian of a stacked vector function through slices
#[test]
fn test_velocity_jacobian() {
    let g = Graph::new();
    let q = MatrixExpr::sym(&g, "q", 4, 1);
    let head = q.slice(Slice::new(0, -1), Slice::all()).unwrap();
    let tail = q.slice(Slice::starting_at(1), Slice::all()).unwrap();
    let velocity = tail.sub(&head).unwrap();
    let stacked = vertcat(&g, &[velocity.clone(), MatrixExpr::empty(&g)]).unwrap();
    assert_eq!(stacked.shape(), (3, 1));

    let jac = jacobian(&stacked, &[q.clone()]).unwrap();
    assert!(jac.disconnected_inputs().is_empty());
    let f = Function::new("jv", &[q], &[jac.into_matrix()]).unwrap();
    let out = f.evaluate(&[DenseMatrix::zeros(4, 1)]).unwrap();
    assert_eq!(
        out[0].to_rows(),
        vec![
            vec![-1.0, 1.0, 0.0, 0.0],
            vec![0.0, -1.0, 1.0, 0.0],
            vec![0.0, 0.0, -1.0, 1.0],
        ]
    );
}
