//! Append-only arena of expression nodes.
//!
//! Nodes are addressed by [`NodeId`] and never mutated once pushed. Children
//! are always pushed before their parents, so ascending id order is a
//! topological order of any subgraph. [`Graph`] is a cheap, cloneable handle to
//! a shared arena.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::expr::node::{BinaryOp, Node, UnaryOp};
use crate::function::Function;
use crate::ids::{CallSiteId, NodeId, SymbolId};

/// Name and shape of a declared symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolInfo {
    pub name: String,
    pub rows: usize,
    pub cols: usize,
}

impl SymbolInfo {
    /// Display name of one element (column-major offset).
    pub fn element_name(&self, offset: usize) -> String {
        if self.rows * self.cols == 1 {
            self.name.clone()
        } else {
            format!("{}_{}", self.name, offset)
        }
    }
}

/// One embedding of a function into a graph.
#[derive(Debug, Clone)]
pub(crate) struct CallSite {
    pub(crate) function: Function,
    /// Flattened arguments, input by input, each column-major.
    pub(crate) args: Vec<NodeId>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Arena {
    nodes: Vec<Node>,
    symbols: Vec<SymbolInfo>,
    call_sites: Vec<CallSite>,
    constants: HashMap<u64, NodeId>,
}

impl Arena {
    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn node(&self, id: NodeId) -> Node {
        self.nodes[id.index()]
    }

    pub(crate) fn symbol(&self, id: SymbolId) -> &SymbolInfo {
        &self.symbols[id.index()]
    }

    pub(crate) fn call_site(&self, id: CallSiteId) -> &CallSite {
        &self.call_sites[id.index()]
    }

    fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId::new(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub(crate) fn constant(&mut self, value: f64) -> NodeId {
        // -0.0 and 0.0 share a node
        let key = if value == 0.0 { 0u64 } else { value.to_bits() };
        if let Some(&id) = self.constants.get(&key) {
            return id;
        }
        let id = self.push(Node::Constant(value));
        self.constants.insert(key, id);
        id
    }

    pub(crate) fn constant_value(&self, id: NodeId) -> Option<f64> {
        self.node(id).as_constant()
    }

    pub(crate) fn is_zero(&self, id: NodeId) -> bool {
        self.constant_value(id) == Some(0.0)
    }

    pub(crate) fn symbol_elements(
        &mut self,
        name: &str,
        rows: usize,
        cols: usize,
    ) -> (SymbolId, Vec<NodeId>) {
        let symbol = SymbolId::new(self.symbols.len() as u32);
        self.symbols.push(SymbolInfo {
            name: name.to_string(),
            rows,
            cols,
        });
        let cells = (0..rows * cols)
            .map(|offset| self.push(Node::Symbol { symbol, offset }))
            .collect();
        (symbol, cells)
    }

    pub(crate) fn unary(&mut self, op: UnaryOp, arg: NodeId) -> NodeId {
        if let Some(value) = self.constant_value(arg) {
            return self.constant(op.apply(value));
        }
        if op == UnaryOp::Neg {
            if let Node::Unary {
                op: UnaryOp::Neg,
                arg: inner,
            } = self.node(arg)
            {
                return inner;
            }
        }
        self.push(Node::Unary { op, arg })
    }

    pub(crate) fn binary(&mut self, op: BinaryOp, lhs: NodeId, rhs: NodeId) -> NodeId {
        let a = self.constant_value(lhs);
        let b = self.constant_value(rhs);
        if let (Some(a), Some(b)) = (a, b) {
            return self.constant(op.apply(a, b));
        }
        match op {
            BinaryOp::Add if a == Some(0.0) => return rhs,
            BinaryOp::Add if b == Some(0.0) => return lhs,
            BinaryOp::Sub if b == Some(0.0) => return lhs,
            BinaryOp::Sub if a == Some(0.0) => return self.unary(UnaryOp::Neg, rhs),
            BinaryOp::Sub if lhs == rhs => return self.constant(0.0),
            BinaryOp::Mul if a == Some(0.0) || b == Some(0.0) => return self.constant(0.0),
            BinaryOp::Mul if a == Some(1.0) => return rhs,
            BinaryOp::Mul if b == Some(1.0) => return lhs,
            BinaryOp::Mul if a == Some(-1.0) => return self.unary(UnaryOp::Neg, rhs),
            BinaryOp::Mul if b == Some(-1.0) => return self.unary(UnaryOp::Neg, lhs),
            BinaryOp::Div if b == Some(1.0) => return lhs,
            BinaryOp::Div if a == Some(0.0) => return self.constant(0.0),
            BinaryOp::Pow if b == Some(1.0) => return lhs,
            BinaryOp::Pow if b == Some(0.0) => return self.constant(1.0),
            BinaryOp::Pow if b == Some(2.0) => return self.unary(UnaryOp::Sq, lhs),
            _ => {}
        }
        self.push(Node::Binary { op, lhs, rhs })
    }

    /// Register a call site and push one node per flattened output element.
    pub(crate) fn call(&mut self, function: Function, args: Vec<NodeId>) -> Vec<NodeId> {
        let site = CallSiteId::new(self.call_sites.len() as u32);
        let outputs = function.flat_output_len();
        self.call_sites.push(CallSite { function, args });
        (0..outputs)
            .map(|output| self.push(Node::Call { site, output }))
            .collect()
    }

    pub(crate) fn for_each_child(&self, id: NodeId, mut visit: impl FnMut(NodeId)) {
        match self.node(id) {
            Node::Symbol { .. } | Node::Constant(_) => {}
            Node::Unary { arg, .. } => visit(arg),
            Node::Binary { lhs, rhs, .. } => {
                visit(lhs);
                visit(rhs);
            }
            Node::Call { site, .. } => {
                for &arg in &self.call_site(site).args {
                    visit(arg);
                }
            }
        }
    }

    /// All nodes reachable from `roots`, in ascending (topological) order.
    pub(crate) fn reachable(&self, roots: &[NodeId]) -> Vec<NodeId> {
        let mut seen = vec![false; self.nodes.len()];
        let mut stack: Vec<NodeId> = roots.to_vec();
        while let Some(id) = stack.pop() {
            if seen[id.index()] {
                continue;
            }
            seen[id.index()] = true;
            self.for_each_child(id, |child| {
                if !seen[child.index()] {
                    stack.push(child);
                }
            });
        }
        seen.iter()
            .enumerate()
            .filter(|(_, hit)| **hit)
            .map(|(index, _)| NodeId::new(index as u32))
            .collect()
    }

    /// Copy the subgraph reachable from `roots` into a fresh arena.
    ///
    /// Returns the new arena and the old-to-new id map. Sharing is preserved:
    /// each reachable node is copied exactly once.
    pub(crate) fn extract(&self, roots: &[NodeId]) -> (Arena, HashMap<NodeId, NodeId>) {
        let mut target = Arena::default();
        let mut map: HashMap<NodeId, NodeId> = HashMap::new();
        let mut symbol_map: HashMap<SymbolId, SymbolId> = HashMap::new();
        let mut site_map: HashMap<CallSiteId, CallSiteId> = HashMap::new();

        for id in self.reachable(roots) {
            let copied = match self.node(id) {
                Node::Constant(value) => target.constant(value),
                Node::Symbol { symbol, offset } => {
                    let new_symbol = *symbol_map.entry(symbol).or_insert_with(|| {
                        let info = self.symbol(symbol).clone();
                        let new_id = SymbolId::new(target.symbols.len() as u32);
                        target.symbols.push(info);
                        new_id
                    });
                    target.push(Node::Symbol {
                        symbol: new_symbol,
                        offset,
                    })
                }
                Node::Unary { op, arg } => target.push(Node::Unary { op, arg: map[&arg] }),
                Node::Binary { op, lhs, rhs } => target.push(Node::Binary {
                    op,
                    lhs: map[&lhs],
                    rhs: map[&rhs],
                }),
                Node::Call { site, output } => {
                    let new_site = *site_map.entry(site).or_insert_with(|| {
                        let call = self.call_site(site);
                        let args = call.args.iter().map(|arg| map[arg]).collect();
                        let new_id = CallSiteId::new(target.call_sites.len() as u32);
                        target.call_sites.push(CallSite {
                            function: call.function.clone(),
                            args,
                        });
                        new_id
                    });
                    target.push(Node::Call {
                        site: new_site,
                        output,
                    })
                }
            };
            map.insert(id, copied);
        }

        (target, map)
    }

    /// Infix rendering of every node reachable from `roots`.
    pub(crate) fn render(&self, roots: &[NodeId]) -> HashMap<NodeId, String> {
        let mut text: HashMap<NodeId, String> = HashMap::new();
        for id in self.reachable(roots) {
            let rendered = match self.node(id) {
                Node::Constant(value) => format_number(value),
                Node::Symbol { symbol, offset } => self.symbol(symbol).element_name(offset),
                Node::Unary {
                    op: UnaryOp::Neg,
                    arg,
                } => format!("(-{})", text[&arg]),
                Node::Unary { op, arg } => format!("{}({})", op.as_str(), text[&arg]),
                Node::Binary { op, lhs, rhs } => match op.infix() {
                    Some(symbol) => format!("({}{}{})", text[&lhs], symbol, text[&rhs]),
                    None => format!("{}({},{})", op.as_str(), text[&lhs], text[&rhs]),
                },
                Node::Call { site, output } => {
                    let call = self.call_site(site);
                    let args = call
                        .args
                        .iter()
                        .map(|arg| text[arg].as_str())
                        .collect::<Vec<_>>()
                        .join(", ");
                    format!("{}({})[{}]", call.function.name(), args, output)
                }
            };
            text.insert(id, rendered);
        }
        text
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Shared handle to an expression arena.
#[derive(Clone, Default)]
pub struct Graph {
    inner: Arc<RwLock<Arena>>,
}

impl Graph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_arena(arena: Arena) -> Self {
        Self {
            inner: Arc::new(RwLock::new(arena)),
        }
    }

    /// Whether two handles refer to the same arena.
    pub fn same(&self, other: &Graph) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Arena> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Arena> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Number of nodes in the arena.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the node at `id`.
    pub fn node(&self, id: NodeId) -> Node {
        self.read().node(id)
    }

    /// Name and shape of a symbol.
    pub fn symbol(&self, id: SymbolId) -> SymbolInfo {
        self.read().symbol(id).clone()
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph").field("nodes", &self.len()).finish()
    }
}
