//! Function objects: named, compiled mappings from symbolic inputs to outputs.
//!
//! Building a function copies the reachable body into a private arena and
//! compiles it to a tape. Evaluation never touches the graph it was built
//! from, and embedding a function into another graph adds call nodes instead
//! of inlining the body.

mod error;
mod tape;

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, OnceLock};

use tracing::debug;

use crate::ad;
use crate::dense::DenseMatrix;
use crate::expr::graph::{Arena, Graph};
use crate::expr::node::Node;
use crate::expr::{ExprError, MatrixExpr};
use crate::ids::NodeId;

pub use error::FunctionError;
use tape::Tape;

/// Cheap-to-clone handle to a compiled function.
#[derive(Clone)]
pub struct Function {
    inner: Arc<FunctionInner>,
}

struct FunctionInner {
    name: String,
    input_names: Vec<String>,
    output_names: Vec<String>,
    input_shapes: Vec<(usize, usize)>,
    output_shapes: Vec<(usize, usize)>,
    body: Arena,
    /// Flattened input elements, in body ids.
    input_cells: Vec<NodeId>,
    /// Flattened output elements, in body ids.
    output_cells: Vec<NodeId>,
    tape: Tape,
    jacobian: OnceLock<Result<Function, FunctionError>>,
}

fn default_names(prefix: char, count: usize) -> Vec<String> {
    (0..count).map(|k| format!("{prefix}{k}")).collect()
}

impl Function {
    /// Build with default input/output names `i0, i1, ...` and `o0, o1, ...`.
    pub fn new(
        name: &str,
        inputs: &[MatrixExpr],
        outputs: &[MatrixExpr],
    ) -> Result<Self, FunctionError> {
        Self::build(
            name,
            inputs,
            default_names('i', inputs.len()),
            outputs,
            default_names('o', outputs.len()),
        )
    }

    pub fn with_names(
        name: &str,
        inputs: &[MatrixExpr],
        input_names: &[&str],
        outputs: &[MatrixExpr],
        output_names: &[&str],
    ) -> Result<Self, FunctionError> {
        if input_names.len() != inputs.len() {
            return Err(FunctionError::NameCountMismatch {
                expected: inputs.len(),
                actual: input_names.len(),
            });
        }
        if output_names.len() != outputs.len() {
            return Err(FunctionError::NameCountMismatch {
                expected: outputs.len(),
                actual: output_names.len(),
            });
        }
        Self::build(
            name,
            inputs,
            input_names.iter().map(|s| s.to_string()).collect(),
            outputs,
            output_names.iter().map(|s| s.to_string()).collect(),
        )
    }

    fn build(
        name: &str,
        inputs: &[MatrixExpr],
        input_names: Vec<String>,
        outputs: &[MatrixExpr],
        output_names: Vec<String>,
    ) -> Result<Self, FunctionError> {
        let graph = match inputs.first().or(outputs.first()) {
            Some(first) => first.graph().clone(),
            None => Graph::new(),
        };
        if inputs
            .iter()
            .chain(outputs)
            .any(|expr| !expr.graph().same(&graph))
        {
            return Err(ExprError::ForeignGraph.into());
        }

        let arena = graph.read();
        let mut seen: HashSet<NodeId> = HashSet::new();
        let mut input_roots = Vec::new();
        for (input, expr) in inputs.iter().enumerate() {
            for (position, &id) in expr.cells().iter().enumerate() {
                match arena.node(id) {
                    Node::Symbol { symbol, offset } => {
                        if !seen.insert(id) {
                            return Err(FunctionError::DuplicateInput {
                                symbol: arena.symbol(symbol).element_name(offset),
                            });
                        }
                    }
                    _ => return Err(FunctionError::NotSymbolic { input, position }),
                }
                input_roots.push(id);
            }
        }
        let output_roots: Vec<NodeId> = outputs
            .iter()
            .flat_map(|expr| expr.cells().iter().copied())
            .collect();
        let roots: Vec<NodeId> = input_roots.iter().chain(&output_roots).copied().collect();
        let (body, map) = arena.extract(&roots);
        drop(arena);

        let input_cells: Vec<NodeId> = input_roots.iter().map(|id| map[id]).collect();
        let output_cells: Vec<NodeId> = output_roots.iter().map(|id| map[id]).collect();
        let tape = Tape::compile(&body, &input_cells, &output_cells)?;

        debug!(
            component = "function",
            operation = "build",
            status = "success",
            function = name,
            n_in = inputs.len(),
            n_out = outputs.len(),
            body_nodes = body.len(),
            instructions = tape.len(),
            "Function compiled"
        );

        Ok(Self {
            inner: Arc::new(FunctionInner {
                name: name.to_string(),
                input_names,
                output_names,
                input_shapes: inputs.iter().map(MatrixExpr::shape).collect(),
                output_shapes: outputs.iter().map(MatrixExpr::shape).collect(),
                body,
                input_cells,
                output_cells,
                tape,
                jacobian: OnceLock::new(),
            }),
        })
    }

    // ── Introspection ───────────────────────────────────────

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn n_in(&self) -> usize {
        self.inner.input_shapes.len()
    }

    pub fn n_out(&self) -> usize {
        self.inner.output_shapes.len()
    }

    pub fn input_shape(&self, k: usize) -> Option<(usize, usize)> {
        self.inner.input_shapes.get(k).copied()
    }

    pub fn output_shape(&self, k: usize) -> Option<(usize, usize)> {
        self.inner.output_shapes.get(k).copied()
    }

    pub fn name_in(&self, k: usize) -> Option<&str> {
        self.inner.input_names.get(k).map(String::as_str)
    }

    pub fn name_out(&self, k: usize) -> Option<&str> {
        self.inner.output_names.get(k).map(String::as_str)
    }

    /// Position of the input called `name`.
    pub fn index_in(&self, name: &str) -> Option<usize> {
        self.inner.input_names.iter().position(|n| n == name)
    }

    /// Total number of input elements.
    pub fn flat_input_len(&self) -> usize {
        self.inner.input_cells.len()
    }

    /// Total number of output elements.
    pub fn flat_output_len(&self) -> usize {
        self.inner.output_cells.len()
    }

    /// Number of compiled tape instructions.
    pub fn n_instructions(&self) -> usize {
        self.inner.tape.len()
    }

    /// Whether two handles share the same compiled function.
    pub fn ptr_eq(&self, other: &Function) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Value of flattened output `k` if it is a constant in the body.
    pub(crate) fn flat_output_constant(&self, k: usize) -> Option<f64> {
        self.inner.body.constant_value(self.inner.output_cells[k])
    }

    // ── Evaluation ──────────────────────────────────────────

    /// Numeric evaluation; argument shapes must match the inputs exactly.
    pub fn evaluate(&self, args: &[DenseMatrix]) -> Result<Vec<DenseMatrix>, FunctionError> {
        self.check_arity(args.len())?;
        let mut flat = Vec::with_capacity(self.flat_input_len());
        for (input, (arg, &expected)) in args.iter().zip(&self.inner.input_shapes).enumerate() {
            if arg.shape() != expected {
                return Err(FunctionError::ShapeMismatch {
                    input,
                    expected,
                    actual: arg.shape(),
                });
            }
            flat.extend_from_slice(arg.data());
        }
        let values = self.run_flat(&flat);

        let mut outputs = Vec::with_capacity(self.n_out());
        let mut offset = 0;
        for &(rows, cols) in &self.inner.output_shapes {
            let len = rows * cols;
            let data = values[offset..offset + len].to_vec();
            offset += len;
            outputs.push(DenseMatrix::from_column_major(rows, cols, data).unwrap_or_else(
                || DenseMatrix::zeros(rows, cols),
            ));
        }
        Ok(outputs)
    }

    /// Evaluation on flattened, concatenated inputs.
    pub fn evaluate_flat(&self, inputs: &[f64]) -> Result<Vec<f64>, FunctionError> {
        if inputs.len() != self.flat_input_len() {
            return Err(FunctionError::ShapeMismatch {
                input: 0,
                expected: (self.flat_input_len(), 1),
                actual: (inputs.len(), 1),
            });
        }
        Ok(self.run_flat(inputs))
    }

    pub(crate) fn run_flat(&self, inputs: &[f64]) -> Vec<f64> {
        self.inner.tape.run(inputs)
    }

    fn check_arity(&self, actual: usize) -> Result<(), FunctionError> {
        if actual == self.n_in() {
            Ok(())
        } else {
            Err(FunctionError::ArityMismatch {
                expected: self.n_in(),
                actual,
            })
        }
    }

    // ── Composition ─────────────────────────────────────────

    /// Embed a call into `graph`; one node per output element.
    pub fn call(&self, graph: &Graph, args: &[MatrixExpr]) -> Result<Vec<MatrixExpr>, FunctionError> {
        self.check_arity(args.len())?;
        let mut flat = Vec::with_capacity(self.flat_input_len());
        for (input, (arg, &expected)) in args.iter().zip(&self.inner.input_shapes).enumerate() {
            if !arg.graph().same(graph) {
                return Err(ExprError::ForeignGraph.into());
            }
            if arg.shape() != expected {
                return Err(FunctionError::ShapeMismatch {
                    input,
                    expected,
                    actual: arg.shape(),
                });
            }
            flat.extend_from_slice(arg.cells());
        }

        let nodes = graph.write().call(self.clone(), flat);
        let mut outputs = Vec::with_capacity(self.n_out());
        let mut offset = 0;
        for &(rows, cols) in &self.inner.output_shapes {
            let len = rows * cols;
            outputs.push(MatrixExpr::from_cells(
                graph,
                rows,
                cols,
                nodes[offset..offset + len].to_vec(),
            ));
            offset += len;
        }
        Ok(outputs)
    }

    /// Function `(inputs...) -> jac`, where `jac` is the Jacobian of all
    /// flattened outputs with respect to all flattened inputs. Built on first
    /// use and cached.
    pub fn jacobian_function(&self) -> Result<Function, FunctionError> {
        self.inner
            .jacobian
            .get_or_init(|| self.build_jacobian())
            .clone()
    }

    fn build_jacobian(&self) -> Result<Function, FunctionError> {
        let inner = &self.inner;
        let graph = Graph::from_arena(inner.body.clone());
        let mut offset = 0;
        let inputs: Vec<MatrixExpr> = inner
            .input_shapes
            .iter()
            .map(|&(rows, cols)| {
                let cells = inner.input_cells[offset..offset + rows * cols].to_vec();
                offset += rows * cols;
                MatrixExpr::from_cells(&graph, rows, cols, cells)
            })
            .collect();
        let outputs = MatrixExpr::from_cells(
            &graph,
            inner.output_cells.len(),
            1,
            inner.output_cells.clone(),
        );
        let jac = ad::jacobian(&outputs, &inputs)?;
        let input_names: Vec<&str> = inner.input_names.iter().map(String::as_str).collect();
        Function::with_names(
            &format!("jac_{}", inner.name),
            &inputs,
            &input_names,
            &[jac.into_matrix()],
            &["jac"],
        )
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.inner.name)
            .field("inputs", &self.inner.input_shapes)
            .field("outputs", &self.inner.output_shapes)
            .field("instructions", &self.inner.tape.len())
            .finish()
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let render = |names: &[String], shapes: &[(usize, usize)]| {
            names
                .iter()
                .zip(shapes)
                .map(|(name, (r, c))| format!("{name}[{r}x{c}]"))
                .collect::<Vec<_>>()
                .join(",")
        };
        write!(
            f,
            "{}:({})->({})",
            self.inner.name,
            render(&self.inner.input_names, &self.inner.input_shapes),
            render(&self.inner.output_names, &self.inner.output_shapes)
        )
    }
}
