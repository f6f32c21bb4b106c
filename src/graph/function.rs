use crate::error::Error;
use crate::graph::{Graph, Node, NodeId};
use crate::tensor::TensorDesc;
use itertools::Itertools;
use log::debug;
use std::collections::HashMap;

/// A named, self-contained computation: the nodes reachable from `results`, copied out of
/// the builder graph into a compact arena of their own.
#[derive(Clone, Debug)]
pub struct Function {
    name: String,
    nodes: Vec<Node>,
    parameters: Vec<NodeId>,
    results: Vec<NodeId>,
}

#[derive(Copy, Clone, Eq, PartialEq)]
enum Mark {
    Unvisited,
    Visiting,
    Done,
}

impl Function {
    pub fn new(
        graph: &Graph,
        results: &[NodeId],
        parameters: &[NodeId],
        name: &str,
    ) -> Result<Function, Error> {
        for (i, &p) in parameters.iter().enumerate() {
            if !graph.node(p)?.is_parameter() {
                return Err(Error::NotAParameter(p));
            }
            if parameters[..i].contains(&p) {
                return Err(Error::DuplicateParameter(p));
            }
        }
        for &r in results {
            graph.node(r)?;
        }

        let marks = reach(graph, results)?;

        let nodes = graph.nodes();
        for (i, node) in nodes.iter().enumerate() {
            if marks[i] == Mark::Done && node.is_parameter() && !parameters.contains(&NodeId(i)) {
                return Err(Error::UngroundedInput(NodeId(i)));
            }
        }

        // keep construction order; declared parameters are kept even when unused
        let kept = (0..nodes.len())
            .filter(|&i| marks[i] == Mark::Done || parameters.contains(&NodeId(i)))
            .collect_vec();
        let remap: HashMap<usize, NodeId> = kept
            .iter()
            .enumerate()
            .map(|(new, &old)| (old, NodeId(new)))
            .collect();
        let local = |id: &NodeId| remap[&id.0];

        let function = Function {
            name: name.to_string(),
            nodes: kept
                .iter()
                .map(|&i| {
                    let mut node = nodes[i].clone();
                    node.inputs = node.inputs.iter().map(local).collect();
                    node
                })
                .collect(),
            parameters: parameters.iter().map(local).collect(),
            results: results.iter().map(local).collect(),
        };

        debug!(
            "built function '{}' with {} nodes ({} parameters, {} results)",
            function.name,
            function.nodes.len(),
            function.parameters.len(),
            function.results.len()
        );
        Ok(function)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, Error> {
        self.nodes.get(id.0).ok_or(Error::UnknownNode(id))
    }

    pub fn parameters(&self) -> &[NodeId] {
        &self.parameters
    }

    pub fn results(&self) -> &[NodeId] {
        &self.results
    }

    pub fn parameter_descs(&self) -> Vec<TensorDesc> {
        self.parameters
            .iter()
            .map(|p| self.nodes[p.0].desc.clone())
            .collect()
    }

    pub fn result_descs(&self) -> Vec<TensorDesc> {
        self.results
            .iter()
            .map(|r| self.nodes[r.0].desc.clone())
            .collect()
    }
}

/// Depth-first walk from `roots` with three-colour marking; meeting a node that is still on
/// the stack means the input edges form a cycle.
fn reach(graph: &Graph, roots: &[NodeId]) -> Result<Vec<Mark>, Error> {
    let nodes = graph.nodes();
    let mut marks = vec![Mark::Unvisited; nodes.len()];
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for root in roots {
        if marks[root.0] != Mark::Unvisited {
            continue;
        }
        marks[root.0] = Mark::Visiting;
        stack.push((root.0, 0));

        while let Some((index, next)) = stack.pop() {
            match nodes[index].inputs.get(next) {
                Some(&input) => {
                    stack.push((index, next + 1));
                    graph.node(input)?;
                    let child = input.0;
                    match marks[child] {
                        Mark::Visiting => return Err(Error::CyclicGraph(NodeId(child))),
                        Mark::Unvisited => {
                            marks[child] = Mark::Visiting;
                            stack.push((child, 0));
                        }
                        Mark::Done => {}
                    }
                }
                None => marks[index] = Mark::Done,
            }
        }
    }
    Ok(marks)
}
