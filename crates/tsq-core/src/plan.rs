//! Operator DAG description consumed by the engine.
//!
//! A query parser (outside this workspace) produces a `QueryPlan`: nodes keyed
//! by `NodeId`, each naming an operator type, a JSON config payload and its
//! upstream nodes in slot order. The exec crate resolves op types through the
//! operator registry.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hash::{hash_serde, Hash256};
use crate::id::NodeId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanNode {
    pub id: NodeId,
    /// Stable operator type name, e.g. "absent" or "fetch".
    pub op: String,
    #[serde(default)]
    pub config: serde_json::Value,
    /// Upstream nodes, in the slot order the operator expects.
    #[serde(default)]
    pub inputs: Vec<NodeId>,
}

impl PlanNode {
    pub fn new(id: u64, op: impl Into<String>) -> Self {
        Self {
            id: NodeId::new(id),
            op: op.into(),
            config: serde_json::Value::Null,
            inputs: vec![],
        }
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }

    pub fn with_inputs(mut self, inputs: &[u64]) -> Self {
        self.inputs = inputs.iter().copied().map(NodeId::new).collect();
        self
    }

    pub fn is_leaf(&self) -> bool {
        self.inputs.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub nodes: Vec<PlanNode>,
    /// Terminal node whose block is the query result.
    pub output: NodeId,
}

impl QueryPlan {
    pub fn new(nodes: Vec<PlanNode>, output: u64) -> Self {
        Self {
            nodes,
            output: NodeId::new(output),
        }
    }

    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| Error::Plan(format!("decode plan: {e}")))
    }

    pub fn node(&self, id: NodeId) -> Option<&PlanNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Stable digest of the plan, logged alongside every query.
    pub fn fingerprint(&self) -> Result<Hash256> {
        hash_serde(self)
    }

    /// Number of downstream edges per node, counting only consumers in
    /// `scheduled` (usually the result of `topological_order`). An input
    /// listed twice by the same consumer counts twice.
    pub fn consumers(&self, scheduled: &[NodeId]) -> BTreeMap<NodeId, usize> {
        let scheduled: HashSet<NodeId> = scheduled.iter().copied().collect();
        let mut out: BTreeMap<NodeId, usize> = self.nodes.iter().map(|n| (n.id, 0)).collect();
        for n in self.nodes.iter().filter(|n| scheduled.contains(&n.id)) {
            for i in &n.inputs {
                *out.entry(*i).or_default() += 1;
            }
        }
        out
    }

    /// Validate the plan and return the nodes needed for `output` in a
    /// dependency-respecting order. Ties are broken by declaration order so
    /// the order is reproducible.
    pub fn topological_order(&self) -> Result<Vec<NodeId>> {
        let mut index: HashMap<NodeId, usize> = HashMap::with_capacity(self.nodes.len());
        for (i, n) in self.nodes.iter().enumerate() {
            if index.insert(n.id, i).is_some() {
                return Err(Error::Plan(format!("duplicate node id {}", n.id)));
            }
        }
        for n in &self.nodes {
            if let Some(missing) = n.inputs.iter().find(|i| !index.contains_key(i)) {
                return Err(Error::Plan(format!(
                    "node {} reads unknown input {}",
                    n.id, missing
                )));
            }
        }
        if !index.contains_key(&self.output) {
            return Err(Error::Plan(format!("output node {} not in plan", self.output)));
        }

        // Only nodes the output depends on are scheduled.
        let mut needed: HashSet<NodeId> = HashSet::new();
        let mut stack = vec![self.output];
        while let Some(id) = stack.pop() {
            if needed.insert(id) {
                stack.extend(self.nodes[index[&id]].inputs.iter().copied());
            }
        }

        let mut in_degree: HashMap<NodeId, usize> = HashMap::new();
        let mut dependents: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for n in self.nodes.iter().filter(|n| needed.contains(&n.id)) {
            in_degree.insert(n.id, n.inputs.len());
            for i in &n.inputs {
                dependents.entry(*i).or_default().push(n.id);
            }
        }

        let mut ready: VecDeque<NodeId> = self
            .nodes
            .iter()
            .filter(|n| needed.contains(&n.id) && n.inputs.is_empty())
            .map(|n| n.id)
            .collect();

        let mut order = Vec::with_capacity(needed.len());
        while let Some(id) = ready.pop_front() {
            order.push(id);
            if let Some(nexts) = dependents.get(&id) {
                for v in nexts {
                    if let Some(deg) = in_degree.get_mut(v) {
                        *deg -= 1;
                        if *deg == 0 {
                            ready.push_back(*v);
                        }
                    }
                }
            }
        }

        if order.len() != needed.len() {
            return Err(Error::Plan("plan contains a cycle".into()));
        }
        Ok(order)
    }
}
