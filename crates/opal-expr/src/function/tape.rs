//! Compiled instruction tape for function bodies.
//!
//! One register per reachable body node, assigned in ascending id order, so a
//! single forward pass evaluates every node once. A call site is one
//! instruction that fills the registers of all its used outputs.

use std::collections::{HashMap, HashSet};

use crate::expr::graph::Arena;
use crate::expr::node::{BinaryOp, Node, UnaryOp};
use crate::function::{Function, FunctionError};
use crate::ids::{CallSiteId, NodeId};

#[derive(Debug, Clone)]
enum Instr {
    Input {
        dst: usize,
        slot: usize,
    },
    Const {
        dst: usize,
        value: f64,
    },
    Unary {
        dst: usize,
        op: UnaryOp,
        arg: usize,
    },
    Binary {
        dst: usize,
        op: BinaryOp,
        lhs: usize,
        rhs: usize,
    },
    Call {
        function: Function,
        args: Vec<usize>,
        /// `(callee output index, destination register)`
        outputs: Vec<(usize, usize)>,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct Tape {
    instrs: Vec<Instr>,
    registers: usize,
    outputs: Vec<usize>,
}

impl Tape {
    /// Compile the subgraph of `body` reachable from `outputs`.
    ///
    /// Every symbol element reached must be one of `inputs`; the first one
    /// that is not is reported as `InputMismatch`.
    pub(crate) fn compile(
        body: &Arena,
        inputs: &[NodeId],
        outputs: &[NodeId],
    ) -> Result<Tape, FunctionError> {
        let order = body.reachable(outputs);
        let mut register = vec![usize::MAX; body.len()];
        for (index, &id) in order.iter().enumerate() {
            register[id.index()] = index;
        }
        let slots: HashMap<NodeId, usize> = inputs
            .iter()
            .enumerate()
            .map(|(slot, &id)| (id, slot))
            .collect();

        let mut site_outputs: HashMap<CallSiteId, Vec<(usize, usize)>> = HashMap::new();
        for &id in &order {
            if let Node::Call { site, output } = body.node(id) {
                site_outputs
                    .entry(site)
                    .or_default()
                    .push((output, register[id.index()]));
            }
        }

        let mut emitted: HashSet<CallSiteId> = HashSet::new();
        let mut instrs = Vec::with_capacity(order.len());
        for (dst, &id) in order.iter().enumerate() {
            let instr = match body.node(id) {
                Node::Symbol { symbol, offset } => match slots.get(&id) {
                    Some(&slot) => Instr::Input { dst, slot },
                    None => {
                        return Err(FunctionError::InputMismatch {
                            symbol: body.symbol(symbol).element_name(offset),
                        })
                    }
                },
                Node::Constant(value) => Instr::Const { dst, value },
                Node::Unary { op, arg } => Instr::Unary {
                    dst,
                    op,
                    arg: register[arg.index()],
                },
                Node::Binary { op, lhs, rhs } => Instr::Binary {
                    dst,
                    op,
                    lhs: register[lhs.index()],
                    rhs: register[rhs.index()],
                },
                Node::Call { site, .. } => {
                    if !emitted.insert(site) {
                        continue;
                    }
                    let call = body.call_site(site);
                    Instr::Call {
                        function: call.function.clone(),
                        args: call.args.iter().map(|arg| register[arg.index()]).collect(),
                        outputs: site_outputs.remove(&site).unwrap_or_default(),
                    }
                }
            };
            instrs.push(instr);
        }

        Ok(Tape {
            instrs,
            registers: order.len(),
            outputs: outputs.iter().map(|id| register[id.index()]).collect(),
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.instrs.len()
    }

    /// Evaluate with flattened inputs; returns flattened outputs.
    pub(crate) fn run(&self, inputs: &[f64]) -> Vec<f64> {
        let mut work = vec![0.0; self.registers];
        for instr in &self.instrs {
            match instr {
                Instr::Input { dst, slot } => work[*dst] = inputs[*slot],
                Instr::Const { dst, value } => work[*dst] = *value,
                Instr::Unary { dst, op, arg } => work[*dst] = op.apply(work[*arg]),
                Instr::Binary { dst, op, lhs, rhs } => {
                    work[*dst] = op.apply(work[*lhs], work[*rhs]);
                }
                Instr::Call {
                    function,
                    args,
                    outputs,
                } => {
                    let values: Vec<f64> = args.iter().map(|&r| work[r]).collect();
                    let result = function.run_flat(&values);
                    for &(output, dst) in outputs {
                        work[dst] = result[output];
                    }
                }
            }
        }
        self.outputs.iter().map(|&r| work[r]).collect()
    }
}
