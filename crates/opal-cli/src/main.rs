mod logging;

use clap::{Args, Parser, Subcommand, ValueEnum};
use opal_alm::{AlmOptions, AlmSolver};
use opal_core::Problem;
use opal_expr::{jacobian, ConstraintExpr, DenseMatrix, Function, Graph, MatrixExpr, Slice};
use opal_solver::{Solution, SolverConfig};
use serde::Serialize;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Symbolic expressions, compiled functions and NLP scenarios"
)]
struct Cli {
    /// Tracing filter; overrides OPAL_TRACE
    #[arg(long, global = true)]
    log: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build and print symbolic matrices and expressions
    Expr(FormatArgs),
    /// Build `x^2 + 10` as a function, evaluate it, embed it and differentiate it
    Function(FunctionArgs),
    /// Build (and with --solve, solve) the small Opti problem with parameter `p`
    Opti(OptiArgs),
    /// Minimum joint-velocity trajectory from rest to a goal configuration
    Trajopt(TrajoptArgs),
}

#[derive(Args, Debug)]
struct FormatArgs {
    /// Output format for stdout
    #[arg(long, value_enum, default_value = "table")]
    format: OutputFormat,
}

#[derive(Args, Debug)]
struct FunctionArgs {
    /// Point for scalar evaluation and the Jacobian
    #[arg(long, default_value_t = 3.0, allow_negative_numbers = true)]
    at: f64,

    /// Points evaluated one by one
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "0,2,4",
        allow_negative_numbers = true
    )]
    points: Vec<f64>,

    #[command(flatten)]
    output: FormatArgs,
}

#[derive(Args, Debug)]
struct SolveArgs {
    /// Run the solver; without it only the built problem is printed
    #[arg(long = "solve")]
    run: bool,

    /// Wall-clock limit in seconds
    #[arg(long)]
    time_limit: Option<f64>,

    /// Outer iteration cap
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Stationarity tolerance
    #[arg(long)]
    tolerance: Option<f64>,

    /// Initial augmented Lagrangian penalty
    #[arg(long)]
    initial_penalty: Option<f64>,
}

#[derive(Args, Debug)]
struct OptiArgs {
    /// Value of parameter p
    #[arg(long, default_value_t = 3.0, allow_negative_numbers = true)]
    p: f64,

    #[command(flatten)]
    solve: SolveArgs,

    #[command(flatten)]
    output: FormatArgs,
}

#[derive(Args, Debug)]
struct TrajoptArgs {
    #[arg(long, default_value_t = 10)]
    waypoints: usize,

    #[arg(long, default_value_t = 7)]
    joints: usize,

    /// Bound on every per-step joint change
    #[arg(long, default_value_t = 0.2)]
    velocity_limit: f64,

    /// Goal configuration, one value per joint (default 0.1, 0.2, ...)
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    goal: Option<Vec<f64>>,

    #[command(flatten)]
    solve: SolveArgs,

    #[command(flatten)]
    output: FormatArgs,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Debug, Clone, Serialize)]
struct ExprRow {
    name: String,
    rows: usize,
    cols: usize,
    expression: String,
}

#[derive(Debug, Clone, Serialize)]
struct FunctionReport {
    function: String,
    instructions: usize,
    at: f64,
    value: f64,
    points: Vec<f64>,
    values: Vec<f64>,
    embedded: String,
    embedded_jacobian: String,
    jacobian_at: f64,
    second_function: String,
    second_embedded: String,
}

/// Sizes and objective of a built problem.
#[derive(Debug, Clone, Serialize)]
struct ProblemSummary {
    variables: usize,
    parameters: usize,
    constraints: usize,
    constraint_blocks: usize,
    objective: String,
}

impl ProblemSummary {
    fn of(problem: &Problem) -> Self {
        Self {
            variables: problem.n_x(),
            parameters: problem.n_p(),
            constraints: problem.n_g(),
            constraint_blocks: problem.num_constraint_blocks(),
            objective: problem.f().map(ToString::to_string).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct OptiReport {
    p: f64,
    problem: ProblemSummary,
    constraint_expression: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    z: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    solution: Option<Solution>,
}

#[derive(Debug, Clone, Serialize)]
struct TrajoptReport {
    waypoints: usize,
    joints: usize,
    velocity_limit: f64,
    goal: Vec<f64>,
    problem: ProblemSummary,
    /// Row per waypoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    joint_values: Option<Vec<Vec<f64>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_velocity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    solution: Option<Solution>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init(cli.log)?;
    match cli.command {
        Command::Expr(args) => expr_command(args),
        Command::Function(args) => function_command(args),
        Command::Opti(args) => opti_command(args),
        Command::Trajopt(args) => trajopt_command(args),
    }
}

fn expr_rows() -> Result<Vec<ExprRow>, Box<dyn std::error::Error>> {
    let graph = Graph::new();
    let x = MatrixExpr::scalar_sym(&graph, "x");
    let y = MatrixExpr::sym(&graph, "y", 5, 1);
    let z = MatrixExpr::sym(&graph, "Z", 4, 2);
    let f = (x.sq() + 10.0).sqrt();
    let block = z.slice(Slice::new(1, -1), Slice::all())?;
    let scaled = y.mul(&x)?.sum();

    let row = |name: &str, expr: &MatrixExpr| ExprRow {
        name: name.to_string(),
        rows: expr.rows(),
        cols: expr.cols(),
        expression: expr.to_string(),
    };
    Ok(vec![
        row("x", &x),
        row("y", &y),
        row("Z", &z),
        row("f", &f),
        row("Z[1:-1, :]", &block),
        row("Z'", &z.transpose()),
        row("sum(x*y)", &scaled),
    ])
}

fn expr_command(args: FormatArgs) -> Result<(), Box<dyn std::error::Error>> {
    let rows = expr_rows()?;
    match args.format {
        OutputFormat::Table => {
            println!("{:<12} {:>6}  expression", "name", "shape");
            for row in &rows {
                println!(
                    "{:<12} {:>6}  {}",
                    row.name,
                    format!("{}x{}", row.rows, row.cols),
                    row.expression
                );
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
    }
    Ok(())
}

fn function_report(args: &FunctionArgs) -> Result<FunctionReport, Box<dyn std::error::Error>> {
    let function1 = {
        let graph = Graph::new();
        let x = MatrixExpr::scalar_sym(&graph, "x");
        let f = x.sq() + 10.0;
        Function::with_names("Function1", &[x], &["x"], &[f], &["f"])?
    };
    let function2 = {
        let graph = Graph::new();
        let x = MatrixExpr::sym(&graph, "x", 2, 1);
        let y = MatrixExpr::scalar_sym(&graph, "y");
        let f = x.mul(&y.sin())?;
        Function::with_names("Function2", &[x, y], &["x", "y"], &[f], &["f"])?
    };

    let scalar = |at: f64| -> Result<f64, Box<dyn std::error::Error>> {
        let outputs = function1.evaluate(&[DenseMatrix::scalar(at)])?;
        outputs
            .first()
            .and_then(DenseMatrix::as_scalar)
            .ok_or_else(|| "Function1 returned no scalar".into())
    };
    let value = scalar(args.at)?;
    let values = args
        .points
        .iter()
        .map(|&point| scalar(point))
        .collect::<Result<Vec<_>, _>>()?;

    // embed both functions in a host graph that knows nothing of their bodies
    let host = Graph::new();
    let c = MatrixExpr::scalar_sym(&host, "c");
    let embedded = function1.call(&host, std::slice::from_ref(&c))?.remove(0);
    let embedded_jacobian = jacobian(&embedded, std::slice::from_ref(&c))?.into_matrix();

    let jacobian_function = function1.jacobian_function()?;
    let jacobian_at = jacobian_function.evaluate(&[DenseMatrix::scalar(args.at)])?[0]
        .as_scalar()
        .ok_or("Jacobian is not 1x1")?;

    let a = MatrixExpr::sym(&host, "a", 2, 1);
    let b = MatrixExpr::scalar_sym(&host, "b");
    let second_embedded = function2.call(&host, &[a, b])?.remove(0);

    debug!(
        component = "cli",
        operation = "function",
        status = "success",
        host_nodes = host.len() as u64,
        "Built function scenario"
    );

    Ok(FunctionReport {
        function: function1.to_string(),
        instructions: function1.n_instructions(),
        at: args.at,
        value,
        points: args.points.clone(),
        values,
        embedded: embedded.to_string(),
        embedded_jacobian: embedded_jacobian.to_string(),
        jacobian_at,
        second_function: function2.to_string(),
        second_embedded: second_embedded.to_string(),
    })
}

fn function_command(args: FunctionArgs) -> Result<(), Box<dyn std::error::Error>> {
    let report = function_report(&args)?;
    match args.output.format {
        OutputFormat::Table => {
            println!("{:<24} {}", "function", report.function);
            println!("{:<24} {}", "instructions", report.instructions);
            println!("{:<24} {}", format!("f({})", report.at), report.value);
            for (point, value) in report.points.iter().zip(&report.values) {
                println!("{:<24} {}", format!("f({point})"), value);
            }
            println!("{:<24} {}", "embedded f(c)", report.embedded);
            println!("{:<24} {}", "df/dc", report.embedded_jacobian);
            println!("{:<24} {}", format!("df/dx at {}", report.at), report.jacobian_at);
            println!("{:<24} {}", "second function", report.second_function);
            println!("{:<24} {}", "embedded f2(a, b)", report.second_embedded);
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}

fn build_solver(args: &SolveArgs) -> (AlmSolver, SolverConfig) {
    let mut options = AlmOptions::new();
    if let Some(penalty) = args.initial_penalty {
        options = options.with_initial_penalty(penalty);
    }
    let mut config = SolverConfig::new();
    if let Some(limit) = args.time_limit {
        config = config.with_time_limit(limit);
    }
    if let Some(iterations) = args.max_iterations {
        config = config.with_max_iterations(iterations);
    }
    if let Some(tolerance) = args.tolerance {
        config = config.with_tolerance(tolerance);
    }
    (AlmSolver::with_options(options), config)
}

fn opti_report(args: &OptiArgs) -> Result<OptiReport, Box<dyn std::error::Error>> {
    let mut problem = Problem::new();
    let x = problem.variable_named("x", 1, 1)?;
    let y = problem.variable_named("y", 1, 1)?;
    let z = problem.variable_named("z", 1, 1)?;
    let p = problem.parameter_named("p", 1, 1)?;
    problem.set_value(&p, &DenseMatrix::scalar(args.p))?;

    let residual = y.sub(&x.sq())?.add(&z)?.sub(&p)?;
    problem.minimize(&residual.sq())?;
    let ring = x.sq().add(&y)?.add(&z)?.sq();
    problem.subject_to(ring.eq_scalar(1.0))?;
    problem.subject_to(x.add(&y)?.ge_scalar(1.0))?;
    problem.subject_to(z.eq_scalar(0.0))?;
    problem.set_initial(&y, &DenseMatrix::scalar(0.5))?;

    let mut report = OptiReport {
        p: args.p,
        problem: ProblemSummary::of(&problem),
        constraint_expression: problem.g()?.to_string(),
        x: None,
        y: None,
        z: None,
        solution: None,
    };
    if !args.solve.run {
        return Ok(report);
    }

    let (solver, config) = build_solver(&args.solve);
    problem.solver(solver);
    problem.set_config(config);
    let solution = problem.solve()?;

    let scalar = |expr: &MatrixExpr| -> Result<f64, Box<dyn std::error::Error>> {
        solution
            .value_of(expr)?
            .as_scalar()
            .ok_or_else(|| "variable is not 1x1".into())
    };
    report.x = Some(scalar(&x)?);
    report.y = Some(scalar(&y)?);
    report.z = Some(scalar(&z)?);
    report.solution = Some(solution.into_solution());
    Ok(report)
}

fn print_problem_summary(summary: &ProblemSummary) {
    println!("{:<16} {}", "variables", summary.variables);
    println!("{:<16} {}", "parameters", summary.parameters);
    println!(
        "{:<16} {} in {} blocks",
        "constraints", summary.constraints, summary.constraint_blocks
    );
    println!("{:<16} {}", "objective expr", summary.objective);
}

fn print_not_solved() {
    println!("{:<16} not solved (pass --solve)", "status");
}

fn print_solution_summary(solution: &Solution) {
    println!("{:<16} {}", "status", solution.status.as_str());
    println!("{:<16} {:.6}", "objective", solution.f);
    println!("{:<16} {}", "iterations", solution.iterations);
    println!("{:<16} {:.3}", "solve_time_ms", solution.solve_time_seconds * 1e3);
}

fn opti_command(args: OptiArgs) -> Result<(), Box<dyn std::error::Error>> {
    let report = opti_report(&args)?;
    match args.output.format {
        OutputFormat::Table => {
            print_problem_summary(&report.problem);
            println!("{:<16} {}", "constraint expr", report.constraint_expression);
            let Some(solution) = &report.solution else {
                print_not_solved();
                return Ok(());
            };
            print_solution_summary(solution);
            for (name, value) in [("x", report.x), ("y", report.y), ("z", report.z)] {
                if let Some(value) = value {
                    println!("{name:<16} {value:.6}");
                }
            }
            println!("{:<16} {:?}", "dual_g", solution.dual_g);
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}

fn default_goal(joints: usize) -> Vec<f64> {
    (1..=joints).map(|j| 0.1 * j as f64).collect()
}

fn trajopt_report(args: &TrajoptArgs) -> Result<TrajoptReport, Box<dyn std::error::Error>> {
    if args.waypoints < 2 {
        return Err(boxed_input_error("waypoints must be at least 2"));
    }
    if args.joints == 0 {
        return Err(boxed_input_error("joints must be greater than zero"));
    }
    if !(args.velocity_limit > 0.0) {
        return Err(boxed_input_error("velocity-limit must be positive"));
    }
    let goal = args.goal.clone().unwrap_or_else(|| default_goal(args.joints));
    if goal.len() != args.joints {
        return Err(boxed_input_error("goal needs one value per joint"));
    }

    let mut problem = Problem::new();
    let q = problem.variable_named("joint_vals", args.waypoints, args.joints)?;
    let target = problem.parameter_named("goal", 1, args.joints)?;
    let goal_row = DenseMatrix::from_column_major(1, args.joints, goal.clone()).ok_or("bad goal")?;
    problem.set_value(&target, &goal_row)?;

    let velocity = q
        .slice(Slice::starting_at(1), Slice::all())?
        .sub(&q.slice(Slice::new(0, -1), Slice::all())?)?;
    problem.minimize(&velocity.sumsqr())?;
    problem.subject_to(q.row(0)?.eq_scalar(0.0))?;
    problem.subject_to(q.row(-1)?.sub(&target)?.eq_scalar(0.0))?;
    problem.subject_to(ConstraintExpr::range(
        -args.velocity_limit,
        &velocity,
        args.velocity_limit,
    ))?;

    let mut report = TrajoptReport {
        waypoints: args.waypoints,
        joints: args.joints,
        velocity_limit: args.velocity_limit,
        goal,
        problem: ProblemSummary::of(&problem),
        joint_values: None,
        max_velocity: None,
        solution: None,
    };
    if !args.solve.run {
        return Ok(report);
    }

    let (mut solver, config) = build_solver(&args.solve);
    problem.set_config(config);
    let solution = problem.solve_with(&mut solver)?;

    let values = solution.value_of(&q)?;
    let steps = solution.value(&velocity)?;
    report.max_velocity = Some(steps.data().iter().fold(0.0_f64, |acc, v| acc.max(v.abs())));
    report.joint_values = Some(values.to_rows());
    report.solution = Some(solution.into_solution());
    Ok(report)
}

fn trajopt_command(args: TrajoptArgs) -> Result<(), Box<dyn std::error::Error>> {
    let report = trajopt_report(&args)?;
    match args.output.format {
        OutputFormat::Table => {
            print_problem_summary(&report.problem);
            let (Some(solution), Some(joint_values), Some(max_velocity)) = (
                &report.solution,
                &report.joint_values,
                report.max_velocity,
            ) else {
                print_not_solved();
                return Ok(());
            };
            print_solution_summary(solution);
            println!("{:<16} {:.6}", "max_velocity", max_velocity);
            print!("{:>8}", "waypoint");
            for joint in 0..report.joints {
                print!(" {:>9}", format!("j{joint}"));
            }
            println!();
            for (k, row) in joint_values.iter().enumerate() {
                print!("{k:>8}");
                for value in row {
                    print!(" {value:>9.4}");
                }
                println!();
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}

fn boxed_input_error(message: &str) -> Box<dyn std::error::Error> {
    Box::new(std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        message.to_string(),
    ))
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    fn approx_eq(left: f64, right: f64, tol: f64) {
        assert!((left - right).abs() < tol, "left={left}, right={right}");
    }

    fn solve_args() -> SolveArgs {
        SolveArgs {
            run: true,
            time_limit: None,
            max_iterations: None,
            tolerance: None,
            initial_penalty: None,
        }
    }

    fn format_args() -> FormatArgs {
        FormatArgs {
            format: OutputFormat::Json,
        }
    }

    #[test]
    fn expr_rows_cover_shapes() {
        let rows = expr_rows().unwrap();
        let z = rows.iter().find(|r| r.name == "Z").unwrap();
        assert_eq!((z.rows, z.cols), (4, 2));
        let block = rows.iter().find(|r| r.name == "Z[1:-1, :]").unwrap();
        assert_eq!((block.rows, block.cols), (2, 2));
        let f = rows.iter().find(|r| r.name == "f").unwrap();
        assert!(f.expression.starts_with("sqrt("));
    }

    #[test]
    fn function_report_values() {
        let args = FunctionArgs {
            at: 3.0,
            points: vec![0.0, 2.0, 4.0],
            output: format_args(),
        };
        let report = function_report(&args).unwrap();
        approx_eq(report.value, 19.0, 1e-12);
        assert_eq!(report.values, vec![10.0, 14.0, 26.0]);
        approx_eq(report.jacobian_at, 6.0, 1e-12);
        assert!(report.embedded.contains("Function1"));
    }

    #[test]
    fn opti_reaches_known_optimum() {
        let args = OptiArgs {
            p: 3.0,
            solve: solve_args(),
            output: format_args(),
        };
        let report = opti_report(&args).unwrap();
        approx_eq(report.x.unwrap(), 0.0, 1e-3);
        approx_eq(report.y.unwrap(), 1.0, 1e-3);
        approx_eq(report.z.unwrap(), 0.0, 1e-4);
        approx_eq(report.solution.unwrap().f, 4.0, 1e-2);
    }

    #[test]
    fn opti_without_solve_flag_only_builds() {
        let args = OptiArgs {
            p: 3.0,
            solve: SolveArgs {
                run: false,
                ..solve_args()
            },
            output: format_args(),
        };
        let report = opti_report(&args).unwrap();
        assert!(report.solution.is_none());
        assert!(report.x.is_none());
        assert_eq!(report.problem.variables, 3);
        assert_eq!(report.problem.parameters, 1);
        assert_eq!(report.problem.constraints, 3);
        assert!(report.problem.objective.starts_with("sq("));

        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("solution").is_none());
        assert_eq!(json["problem"]["constraints"], 3);
    }

    #[test]
    fn trajopt_respects_limits() {
        let args = TrajoptArgs {
            waypoints: 10,
            joints: 7,
            velocity_limit: 0.2,
            goal: None,
            solve: solve_args(),
            output: format_args(),
        };
        let report = trajopt_report(&args).unwrap();
        assert!(report.solution.as_ref().unwrap().is_optimal());
        let joint_values = report.joint_values.as_ref().unwrap();
        assert_eq!(joint_values.len(), 10);
        assert_eq!(joint_values[0].len(), 7);
        for (joint, goal) in report.goal.iter().enumerate() {
            approx_eq(joint_values[0][joint], 0.0, 1e-4);
            approx_eq(joint_values[9][joint], *goal, 1e-4);
        }
        assert!(report.max_velocity.unwrap() <= 0.2 + 1e-5);
    }

    #[test]
    fn trajopt_without_solve_flag_reports_sizes() {
        let args = TrajoptArgs {
            waypoints: 10,
            joints: 7,
            velocity_limit: 0.2,
            goal: None,
            solve: SolveArgs {
                run: false,
                ..solve_args()
            },
            output: format_args(),
        };
        let report = trajopt_report(&args).unwrap();
        assert!(report.solution.is_none());
        assert!(report.joint_values.is_none());
        assert_eq!(report.problem.variables, 70);
        assert_eq!(report.problem.parameters, 7);
        // start row, goal row, 9 steps of velocity bounds
        assert_eq!(report.problem.constraints, 7 + 7 + 63);
        assert_eq!(report.problem.constraint_blocks, 3);
    }

    #[test]
    fn trajopt_rejects_goal_of_wrong_length() {
        let args = TrajoptArgs {
            waypoints: 4,
            joints: 3,
            velocity_limit: 0.2,
            goal: Some(vec![0.1, 0.2]),
            solve: solve_args(),
            output: format_args(),
        };
        let err = trajopt_report(&args).unwrap_err();
        assert!(err.to_string().contains("one value per joint"));
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli =
            Cli::try_parse_from(["opal", "trajopt", "--goal", "0.1,-0.2", "--joints", "2"])
                .unwrap();
        match cli.command {
            Command::Trajopt(args) => {
                assert_eq!(args.goal, Some(vec![0.1, -0.2]));
                assert_eq!(args.waypoints, 10);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn solve_flag_is_opt_in() {
        let cli = Cli::try_parse_from(["opal", "opti", "--p", "2"]).unwrap();
        match cli.command {
            Command::Opti(args) => {
                assert!(!args.solve.run);
                assert_eq!(args.p, 2.0);
            }
            other => panic!("unexpected command {other:?}"),
        }

        let cli = Cli::try_parse_from([
            "opal",
            "trajopt",
            "--solve",
            "--time-limit",
            "5",
            "--format",
            "json",
        ])
        .unwrap();
        match cli.command {
            Command::Trajopt(args) => {
                assert!(args.solve.run);
                assert_eq!(args.solve.time_limit, Some(5.0));
                assert_eq!(args.output.format, OutputFormat::Json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
