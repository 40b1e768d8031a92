use super::support::RecordingSolver;
use super::*;
use opal_solver::{SolverError, SolverStatus};

fn small_problem() -> (Problem, MatrixExpr, MatrixExpr) {
    let mut problem = Problem::new();
    let x = problem.variable_named("x", 2, 1).unwrap();
    let p = problem.parameter_named("p", 1, 1).unwrap();
    problem.minimize(&x.sumsqr().mul(&p).unwrap()).unwrap();
    problem.subject_to(x.sum().ge_scalar(1.0)).unwrap();
    (problem, x, p)
}

#[test]
fn test_solve_without_solver() {
    let (mut problem, _, _) = small_problem();
    assert!(!problem.has_solver());
    assert_eq!(problem.solve().unwrap_err(), ModelError::NoSolver);
    assert!(!problem.is_frozen());
}

#[test]
fn test_solve_without_objective() {
    let mut problem = Problem::new();
    let _x = problem.variable(1, 1).unwrap();
    let mut solver = RecordingSolver::default();
    assert_eq!(
        problem.solve_with(&mut solver).unwrap_err(),
        ModelError::NoObjective
    );
}

#[test]
fn test_inputs_follow_declarations() {
    let (mut problem, x, p) = small_problem();
    problem.set_bounds(&x, 0.0, 3.0).unwrap();
    problem
        .set_initial(&x, &DenseMatrix::column(vec![0.25, 0.75]))
        .unwrap();
    problem.set_value(&p, &DenseMatrix::scalar(2.0)).unwrap();

    let mut solver = RecordingSolver::default();
    let solution = problem.solve_with(&mut solver).unwrap();

    let seen = &solver.seen[0];
    assert_eq!(seen.x0, vec![0.25, 0.75]);
    assert_eq!(seen.lbx, vec![0.0, 0.0]);
    assert_eq!(seen.ubx, vec![3.0, 3.0]);
    assert_eq!(seen.lbg, vec![1.0]);
    assert_eq!(seen.ubg, vec![f64::INFINITY]);
    assert_eq!(seen.p, vec![2.0]);

    // (0.25^2 + 0.75^2) * 2
    assert!((solution.objective_value() - 1.25).abs() < 1e-12);
    assert_eq!(solution.status(), SolverStatus::Optimal);
}

#[test]
fn test_structure_frozen_after_first_solve() {
    let (mut problem, x, p) = small_problem();
    let mut solver = RecordingSolver::default();
    problem.solve_with(&mut solver).unwrap();
    assert!(problem.is_frozen());

    assert_eq!(
        problem.variable(1, 1).unwrap_err().code(),
        "MODEL_STRUCTURE_FROZEN"
    );
    assert!(problem.parameter(1, 1).is_err());
    assert!(problem.subject_to(x.le_scalar(4.0)).is_err());
    assert!(matches!(
        problem.minimize(&x.sum()),
        Err(ModelError::StructureFrozen { .. })
    ));

    // numeric changes are still accepted and reach the next solve
    problem.set_value(&p, &DenseMatrix::scalar(3.0)).unwrap();
    problem.set_bounds(&x, -1.0, 1.0).unwrap();
    problem.solve_with(&mut solver).unwrap();
    assert_eq!(solver.seen.len(), 2);
    assert_eq!(solver.seen[1].p, vec![3.0]);
    assert_eq!(solver.seen[1].lbx, vec![-1.0, -1.0]);
}

#[test]
fn test_non_optimal_status_is_an_error() {
    let (mut problem, _, _) = small_problem();
    let mut solver = RecordingSolver::with_status(SolverStatus::Infeasible);
    let err = problem.solve_with(&mut solver).unwrap_err();
    assert_eq!(
        err,
        ModelError::Solver(SolverError::SolveFailure {
            status: SolverStatus::Infeasible
        })
    );
    assert_eq!(err.status(), Some(SolverStatus::Infeasible));
    assert_eq!(err.code(), "SOLVER_INFEASIBLE");
}

#[test]
fn test_short_primal_vector_is_rejected() {
    let (mut problem, x, _) = small_problem();
    let mut solver = RecordingSolver {
        drop_primal: true,
        ..RecordingSolver::default()
    };
    let err = problem.solve_with(&mut solver).unwrap_err();
    assert_eq!(
        err,
        ModelError::Solver(SolverError::DimensionMismatch {
            what: "x",
            expected: 2,
            actual: 0,
        })
    );
    assert_eq!(err.code(), "SOLVER_DIMENSION_MISMATCH");
    assert!(problem.is_frozen());

    // a solution built around a short vector reports instead of panicking
    let short = opal_solver::Solution {
        status: SolverStatus::Optimal,
        x: Vec::new(),
        f: 0.0,
        g: vec![0.0],
        dual_g: vec![0.0],
        dual_x: vec![0.0],
        iterations: 0,
        solve_time_seconds: 0.0,
    };
    let solution = ProblemSolution::new(&problem, short);
    assert!(matches!(
        solution.value_of(&x),
        Err(ModelError::Solver(SolverError::DimensionMismatch { what: "x", .. }))
    ));
    assert!(matches!(
        solution.bound_dual_of(&x),
        Err(ModelError::Solver(SolverError::DimensionMismatch { what: "dual_x", .. }))
    ));
    assert!(solution.value(&x.sum()).is_err());
}

#[test]
fn test_stored_solver_is_kept_across_solves() {
    let (mut problem, _, _) = small_problem();
    problem.solver(RecordingSolver::default());
    problem.solve().unwrap();
    assert!(problem.has_solver());
    problem.solve().unwrap();
}

#[test]
fn test_solution_values_and_duals() {
    let mut problem = Problem::new();
    let x = problem.variable_named("x", 2, 1).unwrap();
    let y = problem.variable_named("y", 1, 1).unwrap();
    let p = problem.parameter_named("p", 1, 1).unwrap();
    problem.minimize(&x.sumsqr().add(&y).unwrap()).unwrap();
    let first = problem.subject_to(x.ge_scalar(0.0)).unwrap();
    let second = problem.subject_to(y.le_scalar(5.0)).unwrap();
    problem
        .set_initial(&x, &DenseMatrix::column(vec![1.0, 2.0]))
        .unwrap();
    problem.set_initial(&y, &DenseMatrix::scalar(3.0)).unwrap();
    problem.set_value(&p, &DenseMatrix::scalar(10.0)).unwrap();

    let mut solver = RecordingSolver::default();
    let solution = problem.solve_with(&mut solver).unwrap();

    assert_eq!(
        solution.value_of(&x).unwrap(),
        DenseMatrix::column(vec![1.0, 2.0])
    );
    assert_eq!(solution.value_of(&y).unwrap().as_scalar(), Some(3.0));
    assert_eq!(
        solution.dual_of(first).unwrap(),
        DenseMatrix::column(vec![1.0, 2.0])
    );
    assert_eq!(solution.dual_of(second).unwrap().as_scalar(), Some(3.0));
    assert_eq!(
        solution.constraint_value_of(first).unwrap(),
        DenseMatrix::column(vec![1.0, 2.0])
    );
    assert!(solution.dual_of(ConstraintHandle(7)).is_none());
    assert_eq!(solution.value_of(&p).unwrap_err(), ModelError::UnknownVariable);

    // arbitrary expressions over variables and parameters
    let expr = x.mul(&p).unwrap().add(&y).unwrap();
    assert_eq!(
        solution.value(&expr).unwrap(),
        DenseMatrix::column(vec![13.0, 23.0])
    );
    let constant = MatrixExpr::constant(problem.graph(), 4.0);
    assert_eq!(solution.value(&constant).unwrap().as_scalar(), Some(4.0));

    let stray = MatrixExpr::scalar_sym(problem.graph(), "stray");
    assert_eq!(
        solution.value(&stray).unwrap_err(),
        ModelError::UndeclaredSymbol {
            name: "stray".to_string()
        }
    );
}

#[test]
fn test_solution_survives_later_parameter_changes() {
    let (mut problem, x, p) = small_problem();
    problem.set_value(&p, &DenseMatrix::scalar(1.0)).unwrap();
    let mut solver = RecordingSolver::default();
    let solution = problem.solve_with(&mut solver).unwrap();

    problem.set_value(&p, &DenseMatrix::scalar(5.0)).unwrap();
    let scaled = x.sum().mul(&p).unwrap();
    assert_eq!(solution.value(&scaled).unwrap().as_scalar(), Some(0.0));
    assert_eq!(solution.value(&p).unwrap().as_scalar(), Some(1.0));
}
