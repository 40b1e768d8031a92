//! Reverse-mode differentiation over the expression DAG.
//!
//! One backward sweep per output element. Nodes are visited in descending id
//! order, which is a reverse topological order, so every adjoint contribution
//! from shared parents is accumulated before the node's own rule runs. Each
//! reachable node that depends on an input is visited at most once per sweep.

use std::collections::HashMap;

use tracing::debug;

use crate::expr::graph::{Arena, Graph};
use crate::expr::node::{BinaryOp, Node, UnaryOp};
use crate::expr::{ExprError, MatrixExpr};
use crate::function::Function;
use crate::ids::{CallSiteId, NodeId};

/// Per-node visit counts accumulated over all sweeps.
#[derive(Debug, Clone, Default)]
pub struct SweepTrace {
    sweeps: usize,
    visits: HashMap<NodeId, usize>,
}

impl SweepTrace {
    /// Number of backward sweeps (one per output element).
    pub fn sweeps(&self) -> usize {
        self.sweeps
    }

    /// How many times the derivative rule of `node` was applied.
    pub fn visits(&self, node: NodeId) -> usize {
        self.visits.get(&node).copied().unwrap_or(0)
    }

    pub fn total_visits(&self) -> usize {
        self.visits.values().sum()
    }
}

#[derive(Debug, Clone)]
pub struct Jacobian {
    matrix: MatrixExpr,
    disconnected: Vec<usize>,
    trace: SweepTrace,
}

impl Jacobian {
    /// `numel(output) x sum(numel(inputs))` matrix.
    pub fn matrix(&self) -> &MatrixExpr {
        &self.matrix
    }

    pub fn into_matrix(self) -> MatrixExpr {
        self.matrix
    }

    /// Positions of inputs that do not influence the output (zero columns).
    pub fn disconnected_inputs(&self) -> &[usize] {
        &self.disconnected
    }

    pub fn trace(&self) -> &SweepTrace {
        &self.trace
    }
}

/// Read-only copy of the reachable subgraph.
struct Snapshot {
    order: Vec<NodeId>,
    nodes: Vec<Node>,
    position: HashMap<NodeId, usize>,
    depends: Vec<bool>,
    sites: HashMap<CallSiteId, (Function, Vec<NodeId>)>,
}

impl Snapshot {
    fn take(graph: &Graph, roots: &[NodeId], columns: &HashMap<NodeId, Vec<usize>>) -> Self {
        let arena = graph.read();
        let order = arena.reachable(roots);
        let nodes: Vec<Node> = order.iter().map(|&id| arena.node(id)).collect();
        let position: HashMap<NodeId, usize> =
            order.iter().enumerate().map(|(p, &id)| (id, p)).collect();

        let mut depends = vec![false; order.len()];
        let mut sites = HashMap::new();
        for (p, (&id, node)) in order.iter().zip(&nodes).enumerate() {
            depends[p] = match *node {
                Node::Symbol { .. } => columns.contains_key(&id),
                Node::Constant(_) => false,
                Node::Unary { arg, .. } => depends[position[&arg]],
                Node::Binary { lhs, rhs, .. } => depends[position[&lhs]] || depends[position[&rhs]],
                Node::Call { site, .. } => {
                    let call = arena.call_site(site);
                    sites
                        .entry(site)
                        .or_insert_with(|| (call.function.clone(), call.args.clone()));
                    call.args.iter().any(|arg| depends[position[arg]])
                }
            };
        }

        Self {
            order,
            nodes,
            position,
            depends,
            sites,
        }
    }

    fn depends(&self, id: NodeId) -> bool {
        self.position.get(&id).is_some_and(|&p| self.depends[p])
    }
}

/// Jacobian of `vec(output)` with respect to the concatenated `vec(inputs)`.
pub fn jacobian(output: &MatrixExpr, inputs: &[MatrixExpr]) -> Result<Jacobian, ExprError> {
    let graph = output.graph();
    let mut columns: HashMap<NodeId, Vec<usize>> = HashMap::new();
    let mut n_cols = 0;
    for input in inputs {
        output.ensure_same_graph(input)?;
        if let Some(position) = input.first_non_symbolic() {
            return Err(ExprError::NotSymbolic {
                position: n_cols + position,
            });
        }
        for (k, &id) in input.cells().iter().enumerate() {
            columns.entry(id).or_default().push(n_cols + k);
        }
        n_cols += input.numel();
    }
    let n_rows = output.numel();

    let snapshot = Snapshot::take(graph, output.cells(), &columns);

    // Callee Jacobians lock only their own private arenas; build them before
    // taking the write lock on this graph.
    let mut callee_jacobians: HashMap<CallSiteId, Function> = HashMap::new();
    for (p, node) in snapshot.nodes.iter().enumerate() {
        if let Node::Call { site, .. } = *node {
            if !snapshot.depends[p] || callee_jacobians.contains_key(&site) {
                continue;
            }
            let function = &snapshot.sites[&site].0;
            let jac = function
                .jacobian_function()
                .map_err(|err| ExprError::CallDerivative {
                    function: function.name().to_string(),
                    reason: err.to_string(),
                })?;
            callee_jacobians.insert(site, jac);
        }
    }

    let mut arena = graph.write();
    let zero = arena.constant(0.0);
    let one = arena.constant(1.0);
    let mut cells = vec![zero; n_rows * n_cols];
    let mut embedded: HashMap<CallSiteId, Vec<NodeId>> = HashMap::new();
    let mut trace = SweepTrace::default();
    let mut contributions: Vec<(NodeId, NodeId)> = Vec::new();

    for (row, &out) in output.cells().iter().enumerate() {
        trace.sweeps += 1;
        let Some(&out_pos) = snapshot.position.get(&out) else {
            continue;
        };
        if !snapshot.depends[out_pos] {
            continue;
        }
        let mut adjoint: Vec<Option<NodeId>> = vec![None; snapshot.order.len()];
        adjoint[out_pos] = Some(one);

        for p in (0..=out_pos).rev() {
            let Some(adj) = adjoint[p] else {
                continue;
            };
            let id = snapshot.order[p];
            *trace.visits.entry(id).or_insert(0) += 1;
            contributions.clear();

            match snapshot.nodes[p] {
                Node::Symbol { .. } => {
                    for &col in &columns[&id] {
                        cells[col * n_rows + row] = adj;
                    }
                }
                Node::Constant(_) => {}
                Node::Unary { op, arg } => {
                    let partial = unary_partial(&mut arena, op, arg, id)?;
                    let contribution = arena.binary(BinaryOp::Mul, adj, partial);
                    contributions.push((arg, contribution));
                }
                Node::Binary { op, lhs, rhs } => {
                    if snapshot.depends(lhs) {
                        let partial = binary_partial(&mut arena, op, Side::Left, lhs, rhs, id);
                        let contribution = arena.binary(BinaryOp::Mul, adj, partial);
                        contributions.push((lhs, contribution));
                    }
                    if snapshot.depends(rhs) {
                        let partial = binary_partial(&mut arena, op, Side::Right, lhs, rhs, id);
                        let contribution = arena.binary(BinaryOp::Mul, adj, partial);
                        contributions.push((rhs, contribution));
                    }
                }
                Node::Call { site, output } => {
                    let (function, args) = &snapshot.sites[&site];
                    let jac = &callee_jacobians[&site];
                    let n_out = function.flat_output_len();
                    for (j, &arg) in args.iter().enumerate() {
                        if !snapshot.depends(arg) {
                            continue;
                        }
                        let entry = j * n_out + output;
                        let partial = match jac.flat_output_constant(entry) {
                            Some(value) if value == 0.0 => continue,
                            Some(value) => arena.constant(value),
                            None => {
                                let nodes = embedded
                                    .entry(site)
                                    .or_insert_with(|| arena.call(jac.clone(), args.clone()));
                                nodes[entry]
                            }
                        };
                        let contribution = arena.binary(BinaryOp::Mul, adj, partial);
                        contributions.push((arg, contribution));
                    }
                }
            }

            for &(child, contribution) in &contributions {
                if arena.is_zero(contribution) || !snapshot.depends(child) {
                    continue;
                }
                let slot = &mut adjoint[snapshot.position[&child]];
                *slot = Some(match *slot {
                    Some(existing) => arena.binary(BinaryOp::Add, existing, contribution),
                    None => contribution,
                });
            }
        }
    }
    drop(arena);

    let disconnected = inputs
        .iter()
        .enumerate()
        .filter(|(_, input)| !input.cells().iter().any(|&id| snapshot.depends(id)))
        .map(|(k, _)| k)
        .collect::<Vec<_>>();

    debug!(
        component = "ad",
        operation = "jacobian",
        status = "success",
        rows = n_rows,
        cols = n_cols,
        reachable = snapshot.order.len(),
        visits = trace.total_visits(),
        disconnected = disconnected.len(),
        "Jacobian built"
    );

    Ok(Jacobian {
        matrix: MatrixExpr::from_cells(graph, n_rows, n_cols, cells),
        disconnected,
        trace,
    })
}

/// Gradient of a scalar expression as a column vector.
pub fn gradient(scalar: &MatrixExpr, input: &MatrixExpr) -> Result<MatrixExpr, ExprError> {
    if !scalar.is_scalar() {
        return Err(ExprError::shape("gradient", scalar.shape(), (1, 1)));
    }
    let jac = jacobian(scalar, std::slice::from_ref(input))?;
    Ok(jac.into_matrix().transpose())
}

/// Hessian of a scalar expression (Jacobian of its gradient).
pub fn hessian(scalar: &MatrixExpr, input: &MatrixExpr) -> Result<MatrixExpr, ExprError> {
    let grad = gradient(scalar, input)?;
    Ok(jacobian(&grad, std::slice::from_ref(input))?.into_matrix())
}

/// d(op(arg))/d(arg); `node` is the result node.
fn unary_partial(
    arena: &mut Arena,
    op: UnaryOp,
    arg: NodeId,
    node: NodeId,
) -> Result<NodeId, ExprError> {
    let one = arena.constant(1.0);
    let partial = match op {
        UnaryOp::Neg => arena.constant(-1.0),
        UnaryOp::Sin => arena.unary(UnaryOp::Cos, arg),
        UnaryOp::Cos => {
            let s = arena.unary(UnaryOp::Sin, arg);
            arena.unary(UnaryOp::Neg, s)
        }
        UnaryOp::Tan => {
            let sq = arena.unary(UnaryOp::Sq, node);
            arena.binary(BinaryOp::Add, one, sq)
        }
        UnaryOp::Asin | UnaryOp::Acos => {
            let sq = arena.unary(UnaryOp::Sq, arg);
            let rest = arena.binary(BinaryOp::Sub, one, sq);
            let root = arena.unary(UnaryOp::Sqrt, rest);
            let inv = arena.binary(BinaryOp::Div, one, root);
            if op == UnaryOp::Acos {
                arena.unary(UnaryOp::Neg, inv)
            } else {
                inv
            }
        }
        UnaryOp::Atan => {
            let sq = arena.unary(UnaryOp::Sq, arg);
            let den = arena.binary(BinaryOp::Add, one, sq);
            arena.binary(BinaryOp::Div, one, den)
        }
        UnaryOp::Exp => node,
        UnaryOp::Log => arena.binary(BinaryOp::Div, one, arg),
        UnaryOp::Sqrt => {
            let two = arena.constant(2.0);
            let den = arena.binary(BinaryOp::Mul, two, node);
            arena.binary(BinaryOp::Div, one, den)
        }
        UnaryOp::Sq => {
            let two = arena.constant(2.0);
            arena.binary(BinaryOp::Mul, two, arg)
        }
        UnaryOp::Abs => arena.unary(UnaryOp::Sign, arg),
        UnaryOp::Tanh => {
            let sq = arena.unary(UnaryOp::Sq, node);
            arena.binary(BinaryOp::Sub, one, sq)
        }
        UnaryOp::Sign | UnaryOp::Floor | UnaryOp::Ceil => {
            return Err(ExprError::NotDifferentiable { op: op.as_str() })
        }
    };
    Ok(partial)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

/// d(lhs op rhs)/d(side); `node` is the result node.
fn binary_partial(
    arena: &mut Arena,
    op: BinaryOp,
    side: Side,
    lhs: NodeId,
    rhs: NodeId,
    node: NodeId,
) -> NodeId {
    let left = side == Side::Left;
    match op {
        BinaryOp::Add => arena.constant(1.0),
        BinaryOp::Sub => arena.constant(if left { 1.0 } else { -1.0 }),
        BinaryOp::Mul => {
            if left {
                rhs
            } else {
                lhs
            }
        }
        BinaryOp::Div => {
            if left {
                let one = arena.constant(1.0);
                arena.binary(BinaryOp::Div, one, rhs)
            } else {
                let ratio = arena.binary(BinaryOp::Div, node, rhs);
                arena.unary(UnaryOp::Neg, ratio)
            }
        }
        BinaryOp::Pow => {
            if left {
                let one = arena.constant(1.0);
                let reduced = arena.binary(BinaryOp::Sub, rhs, one);
                let power = arena.binary(BinaryOp::Pow, lhs, reduced);
                arena.binary(BinaryOp::Mul, rhs, power)
            } else {
                let log = arena.unary(UnaryOp::Log, lhs);
                arena.binary(BinaryOp::Mul, node, log)
            }
        }
        BinaryOp::Atan2 => {
            let y2 = arena.unary(UnaryOp::Sq, lhs);
            let x2 = arena.unary(UnaryOp::Sq, rhs);
            let den = arena.binary(BinaryOp::Add, y2, x2);
            if left {
                arena.binary(BinaryOp::Div, rhs, den)
            } else {
                let ratio = arena.binary(BinaryOp::Div, lhs, den);
                arena.unary(UnaryOp::Neg, ratio)
            }
        }
        BinaryOp::Fmin | BinaryOp::Fmax => {
            // selector (1 ± sign(lhs - rhs)) / 2; ties split evenly
            let diff = arena.binary(BinaryOp::Sub, lhs, rhs);
            let sign = arena.unary(UnaryOp::Sign, diff);
            let one = arena.constant(1.0);
            let towards_lhs = (op == BinaryOp::Fmax) == left;
            let selector = if towards_lhs {
                arena.binary(BinaryOp::Add, one, sign)
            } else {
                arena.binary(BinaryOp::Sub, one, sign)
            };
            let half = arena.constant(0.5);
            arena.binary(BinaryOp::Mul, half, selector)
        }
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::dense::DenseMatrix;
    use crate::function::Function;

    fn eval_at(x: &MatrixExpr, expr: &MatrixExpr, at: &[f64]) -> Vec<f64> {
        let f = Function::new("probe", &[x.clone()], &[expr.clone()]).unwrap();
        let value = DenseMatrix::from_column_major(x.rows(), x.cols(), at.to_vec()).unwrap();
        f.evaluate(&[value]).unwrap().remove(0).into_data()
    }

    #[test]
    fn shared_subexpression_visited_once() {
        let g = Graph::new();
        let x = MatrixExpr::scalar_sym(&g, "x");
        let inner = x.sin();
        let f = inner.add(&inner).unwrap();
        let jac = jacobian(&f, &[x.clone()]).unwrap();

        assert_eq!(jac.trace().sweeps(), 1);
        assert_eq!(jac.trace().visits(inner.cells()[0]), 1);
        assert_eq!(jac.trace().visits(x.cells()[0]), 1);

        let d = eval_at(&x, jac.matrix(), &[0.3]);
        assert!((d[0] - 2.0 * 0.3_f64.cos()).abs() < 1e-12);
    }

    #[test]
    fn deep_sharing_stays_linear() {
        let g = Graph::new();
        let x = MatrixExpr::scalar_sym(&g, "x");
        let mut acc = x.clone();
        for _ in 0..30 {
            acc = acc.mul(&acc).unwrap().sin();
        }
        let jac = jacobian(&acc, &[x]).unwrap();
        // each node once, even though a tree expansion would have 2^30 paths
        assert!(jac.trace().total_visits() <= 61);
    }

    #[test]
    fn linearity_of_sum() {
        let g = Graph::new();
        let x = MatrixExpr::sym(&g, "x", 2, 1);
        let a = x.sin().mul(&x).unwrap();
        let b = x.exp().sq();
        let sum = a.add(&b).unwrap();
        let ja = jacobian(&a, &[x.clone()]).unwrap().into_matrix();
        let jb = jacobian(&b, &[x.clone()]).unwrap().into_matrix();
        let js = jacobian(&sum, &[x.clone()]).unwrap().into_matrix();
        let expected = ja.add(&jb).unwrap();
        let at = [0.4, -1.2];
        let lhs = eval_at(&x, &js, &at);
        let rhs = eval_at(&x, &expected, &at);
        for (l, r) in lhs.iter().zip(&rhs) {
            assert!((l - r).abs() < 1e-10);
        }
    }

    #[test]
    fn jacobian_layout_is_output_by_input() {
        let g = Graph::new();
        let x = MatrixExpr::sym(&g, "x", 2, 1);
        let y = MatrixExpr::scalar_sym(&g, "y");
        // f = [x0 * y, x1 + y, x0^2]
        let f0 = x.at(0, 0).unwrap().mul(&y).unwrap();
        let f1 = x.at(1, 0).unwrap().add(&y).unwrap();
        let f2 = x.at(0, 0).unwrap().sq();
        let f = crate::expr::vertcat(&g, &[f0, f1, f2]).unwrap();
        let jac = jacobian(&f, &[x.clone(), y.clone()]).unwrap();
        assert_eq!(jac.matrix().shape(), (3, 3));

        let func = Function::new("j", &[x, y], &[jac.into_matrix()]).unwrap();
        let out = func
            .evaluate(&[DenseMatrix::column(vec![2.0, 5.0]), DenseMatrix::scalar(3.0)])
            .unwrap();
        assert_eq!(
            out[0].to_rows(),
            vec![
                vec![3.0, 0.0, 2.0],
                vec![0.0, 1.0, 1.0],
                vec![4.0, 0.0, 0.0]
            ]
        );
    }

    #[test]
    fn disconnected_input_gives_zero_columns() {
        let g = Graph::new();
        let x = MatrixExpr::scalar_sym(&g, "x");
        let p = MatrixExpr::sym(&g, "p", 2, 1);
        let f = x.cos();
        let jac = jacobian(&f, &[x, p]).unwrap();
        assert_eq!(jac.disconnected_inputs(), &[1]);
        let m = jac.matrix();
        assert_eq!(m.shape(), (1, 3));
        let zeros = MatrixExpr::zeros(&g, 1, 2);
        assert_eq!(&m.cells()[1..], zeros.cells());
    }

    #[test]
    fn floor_is_not_differentiable() {
        let g = Graph::new();
        let x = MatrixExpr::scalar_sym(&g, "x");
        let err = jacobian(&x.floor(), &[x.clone()]).unwrap_err();
        assert_eq!(err, ExprError::NotDifferentiable { op: "floor" });
        // unaffected when the operand does not depend on the input
        let p = MatrixExpr::scalar_sym(&g, "p");
        let f = x.mul(&p.sign()).unwrap();
        assert!(jacobian(&f, &[x]).is_ok());
    }

    #[test]
    fn inputs_must_be_symbolic() {
        let g = Graph::new();
        let x = MatrixExpr::scalar_sym(&g, "x");
        let shifted = &x + 1.0;
        let err = jacobian(&x.sq(), &[shifted]).unwrap_err();
        assert_eq!(err, ExprError::NotSymbolic { position: 0 });
    }

    #[test]
    fn chain_rule_through_call() {
        let inner_graph = Graph::new();
        let u = MatrixExpr::scalar_sym(&inner_graph, "u");
        let body = (&u.sq() + 10.0).sqrt();
        let f = Function::new("f", &[u], &[body]).unwrap();

        let g = Graph::new();
        let x = MatrixExpr::scalar_sym(&g, "x");
        let two_x = &x * 2.0;
        let call = f.call(&g, &[two_x]).unwrap().remove(0);
        let d = gradient(&call, &x).unwrap();

        // d/dx sqrt(4x^2 + 10) = 4x / sqrt(4x^2 + 10)
        let at = 1.5_f64;
        let expected = 4.0 * at / (4.0 * at * at + 10.0).sqrt();
        let value = eval_at(&x, &d, &[at]);
        assert!((value[0] - expected).abs() < 1e-12);
    }

    #[test]
    fn structural_zeros_of_callee_are_skipped() {
        let inner_graph = Graph::new();
        let u = MatrixExpr::sym(&inner_graph, "u", 2, 1);
        let f = Function::new("f", &[u.clone()], &[u.sq()]).unwrap();

        let g = Graph::new();
        let x = MatrixExpr::sym(&g, "x", 2, 1);
        let out = f.call(&g, &[x.clone()]).unwrap().remove(0);
        let jac = jacobian(&out, &[x]).unwrap().into_matrix();
        // off-diagonal entries stay the shared zero constant
        assert_eq!(jac.cells()[1], jac.cells()[2]);
        assert_eq!(g.node(jac.cells()[1]).as_constant(), Some(0.0));
    }

    #[test]
    fn gradient_and_hessian_of_quadratic() {
        let g = Graph::new();
        let x = MatrixExpr::sym(&g, "x", 2, 1);
        // f = x0^2 + 3 x0 x1
        let x0 = x.at(0, 0).unwrap();
        let x1 = x.at(1, 0).unwrap();
        let f = x0.sq().add(&(&x0.mul(&x1).unwrap() * 3.0)).unwrap();
        let grad = gradient(&f, &x).unwrap();
        assert_eq!(grad.shape(), (2, 1));
        assert_eq!(eval_at(&x, &grad, &[1.0, 2.0]), vec![8.0, 3.0]);

        let hess = hessian(&f, &x).unwrap();
        assert_eq!(hess.shape(), (2, 2));
        assert_eq!(eval_at(&x, &hess, &[1.0, 2.0]), vec![2.0, 3.0, 3.0, 0.0]);

        assert!(gradient(&x, &x).is_err());
    }

    #[test]
    fn elementary_rules_match_finite_differences() {
        let g = Graph::new();
        let x = MatrixExpr::scalar_sym(&g, "x");
        let y = MatrixExpr::constant(&g, 0.7);
        let cases = vec![
            x.tan(),
            x.asin(),
            x.acos(),
            x.atan(),
            x.log(),
            x.sqrt(),
            x.abs(),
            x.tanh(),
            x.atan2(&y).unwrap(),
            y.atan2(&x).unwrap(),
            x.powf(3.5),
            y.pow(&x).unwrap(),
            x.div(&(&x + 2.0)).unwrap(),
            x.fmin(&y).unwrap(),
            x.fmax(&y).unwrap(),
        ];
        let at = 0.45;
        let h = 1e-6;
        for expr in cases {
            let d = gradient(&expr, &x).unwrap();
            let analytic = eval_at(&x, &d, &[at])[0];
            let plus = eval_at(&x, &expr, &[at + h])[0];
            let minus = eval_at(&x, &expr, &[at - h])[0];
            let numeric = (plus - minus) / (2.0 * h);
            assert!(
                (analytic - numeric).abs() < 1e-5,
                "{expr}: analytic {analytic} vs numeric {numeric}"
            );
        }
    }
}
