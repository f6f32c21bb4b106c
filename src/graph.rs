use crate::error::Error;
use crate::ops::Op;
use crate::tensor::data::{DataLiteral, ElementType, HostData, Scalar};
use crate::tensor::TensorDesc;
use smallvec::SmallVec;
use std::fmt;
use std::fmt::{Display, Formatter};

pub mod function;

pub use function::Function;

/// Index of a node inside the arena that created it.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

pub type Inputs = SmallVec<[NodeId; 3]>;

#[derive(Clone, Debug)]
pub struct Node {
    pub(crate) op: Op,
    pub(crate) inputs: Inputs,
    pub(crate) desc: TensorDesc,
    pub(crate) name: Option<String>,
}

impl Node {
    pub fn op(&self) -> &Op {
        &self.op
    }

    pub fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }

    pub fn desc(&self) -> &TensorDesc {
        &self.desc
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_parameter(&self) -> bool {
        matches!(self.op, Op::Parameter)
    }
}

/// Append-only node arena. Builder methods run shape and type inference eagerly, so a
/// malformed node is rejected by the call that tries to create it.
#[derive(Clone, Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,
}

impl Graph {
    pub fn new() -> Self {
        Graph::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, Error> {
        self.nodes.get(id.0).ok_or(Error::UnknownNode(id))
    }

    pub fn desc(&self, id: NodeId) -> Result<&TensorDesc, Error> {
        self.node(id).map(|n| &n.desc)
    }

    pub(crate) fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub(crate) fn descs(&self, ids: &[NodeId]) -> Result<Vec<TensorDesc>, Error> {
        ids.iter().map(|&id| self.desc(id).cloned()).collect()
    }

    pub(crate) fn push(&mut self, op: Op, inputs: &[NodeId], desc: TensorDesc) -> NodeId {
        self.nodes.push(Node {
            op,
            inputs: inputs.iter().copied().collect(),
            desc,
            name: None,
        });
        NodeId(self.nodes.len() - 1)
    }

    // ******************************** Leaves ******************************** //

    pub fn parameter(&mut self, element_type: ElementType, extents: &[usize]) -> NodeId {
        self.push(Op::Parameter, &[], TensorDesc::new(element_type, extents))
    }

    pub fn named_parameter(
        &mut self,
        name: &str,
        element_type: ElementType,
        extents: &[usize],
    ) -> NodeId {
        let id = self.parameter(element_type, extents);
        self.nodes[id.0].name = Some(name.to_string());
        id
    }

    pub fn constant(&mut self, data: HostData, extents: &[usize]) -> Result<NodeId, Error> {
        let desc = TensorDesc::new(data.element_type(), extents);
        if data.len() != desc.size() {
            return Err(Error::ShapeMismatch(format!(
                "constant of shape {} needs {} elements but {} were given",
                desc.shape(),
                desc.size(),
                data.len()
            )));
        }
        Ok(self.push(Op::Constant(data), &[], desc))
    }

    /// A constant from a (nested) array literal, e.g. `[[1.0f32, 2.0], [3.0, 4.0]]`.
    pub fn constant_literal<D, T>(&mut self, data: D) -> NodeId
    where
        D: DataLiteral<T>,
        T: Scalar,
    {
        let desc = TensorDesc::new(T::element_type(), &data.extents());
        self.push(Op::Constant(data.to_buf()), &[], desc)
    }

    // ******************************** Rewriting ******************************** //

    pub fn set_name(&mut self, id: NodeId, name: &str) -> Result<(), Error> {
        self.node(id)?;
        self.nodes[id.0].name = Some(name.to_string());
        Ok(())
    }

    /// Rewires every consumer of `target` to read `replacement` instead. Returns the number
    /// of rewired edges. If `replacement` itself depends on `target` this creates a cycle,
    /// which `Function::new` later rejects.
    pub fn replace_node(&mut self, target: NodeId, replacement: NodeId) -> Result<usize, Error> {
        let (from, to) = (self.desc(target)?, self.desc(replacement)?);
        if from.element_type() != to.element_type() {
            return Err(Error::TypeMismatch(format!(
                "cannot replace {:?} with {:?}",
                from, to
            )));
        }
        if from.shape() != to.shape() {
            return Err(Error::ShapeMismatch(format!(
                "cannot replace {:?} with {:?}",
                from, to
            )));
        }

        let mut count = 0;
        for (index, node) in self.nodes.iter_mut().enumerate() {
            if index == target.0 {
                continue;
            }
            for input in node.inputs.iter_mut().filter(|i| **i == target) {
                *input = replacement;
                count += 1;
            }
        }
        Ok(count)
    }
}
