use crate::error::Error;
use crate::graph::{Function, NodeId};
use crate::ops::{Category, Kernel};
use crate::tensor::data::HostData;
use crate::tensor::TensorDesc;
use itertools::Itertools;
use log::{debug, trace};
use rayon::prelude::*;
use smallvec::SmallVec;
use std::borrow::Cow;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt::{Debug, Formatter};

enum Action {
    /// Value comes from the call argument at this slot.
    Parameter(usize),
    Kernel(Kernel),
}

struct Step {
    node: NodeId,
    op: &'static str,
    category: Category,
    action: Action,
    inputs: SmallVec<[usize; 3]>,
    desc: TensorDesc,
    level: usize,
}

impl Debug for Step {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} = {}({}) -> {:?} @{}",
            self.node,
            self.op,
            self.inputs.iter().map(|i| format!("#{}", i)).join(", "),
            self.desc,
            self.level
        )
    }
}

/// Executable lowering of a [`Function`]: its nodes in a stable topological order, each
/// bound to a kernel for its concrete element types.
///
/// A plan owns everything it needs and shares nothing with other plans, so it can be
/// reused for any number of calls and from several threads at once.
pub struct CompiledPlan {
    name: String,
    steps: Vec<Step>,
    parameters: Vec<TensorDesc>,
    results: Vec<TensorDesc>,
    // step index of each result, in declaration order
    outputs: Vec<usize>,
    waves: Vec<Vec<usize>>,
    // values dropped after a step (serial) or after a wave (parallel)
    release: Vec<Vec<usize>>,
    wave_release: Vec<Vec<usize>>,
}

impl Debug for CompiledPlan {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "plan '{}' ({} steps, {} levels)", self.name, self.steps.len(), self.waves.len())?;
        for (i, step) in self.steps.iter().enumerate() {
            writeln!(f, "  #{}: {:?}", i, step)?;
        }
        Ok(())
    }
}

pub fn compile(function: &Function) -> Result<CompiledPlan, Error> {
    let nodes = function.nodes();
    let n = nodes.len();

    // Kahn's algorithm; the heap hands out ready nodes in construction order
    let mut users = vec![Vec::new(); n];
    let mut pending = vec![0usize; n];
    for (i, node) in nodes.iter().enumerate() {
        for input in node.inputs() {
            users[input.index()].push(i);
            pending[i] += 1;
        }
    }
    let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
        .filter(|&i| pending[i] == 0)
        .map(Reverse)
        .collect();
    let mut order = Vec::with_capacity(n);
    while let Some(Reverse(i)) = ready.pop() {
        order.push(i);
        for &user in &users[i] {
            pending[user] -= 1;
            if pending[user] == 0 {
                ready.push(Reverse(user));
            }
        }
    }
    if order.len() < n {
        let stuck = (0..n).find(|&i| pending[i] > 0).unwrap_or(0);
        return Err(Error::CyclicGraph(NodeId(stuck)));
    }

    let mut position = vec![0usize; n];
    for (step, &i) in order.iter().enumerate() {
        position[i] = step;
    }

    let mut steps: Vec<Step> = Vec::with_capacity(n);
    for &i in &order {
        let node = &nodes[i];
        let id = NodeId(i);
        let inputs: SmallVec<[usize; 3]> = node.inputs().iter().map(|x| position[x.index()]).collect();

        let action = if node.is_parameter() {
            match function.parameters().iter().position(|&p| p == id) {
                Some(slot) => Action::Parameter(slot),
                None => return Err(Error::UngroundedInput(id)),
            }
        } else {
            let descs = node
                .inputs()
                .iter()
                .map(|x| nodes[x.index()].desc().clone())
                .collect_vec();
            Action::Kernel(node.op().bind(&descs, node.desc())?)
        };

        let level = inputs
            .iter()
            .map(|&s| steps[s].level + 1)
            .max()
            .unwrap_or(0);

        steps.push(Step {
            node: id,
            op: node.op().name(),
            category: node.op().category(),
            action,
            inputs,
            desc: node.desc().clone(),
            level,
        });
    }

    let outputs = function
        .results()
        .iter()
        .map(|r| position[r.index()])
        .collect_vec();

    let depth = steps.iter().map(|s| s.level + 1).max().unwrap_or(0);
    let mut waves = vec![Vec::new(); depth];
    for (i, step) in steps.iter().enumerate() {
        waves[step.level].push(i);
    }

    // a value lives until its last consumer has run; results are never released
    let mut last_step: Vec<usize> = (0..n).collect();
    let mut last_level: Vec<usize> = steps.iter().map(|s| s.level).collect();
    for (i, step) in steps.iter().enumerate() {
        for &input in &step.inputs {
            last_step[input] = last_step[input].max(i);
            last_level[input] = last_level[input].max(step.level);
        }
    }
    let mut release = vec![Vec::new(); n];
    let mut wave_release = vec![Vec::new(); depth];
    for i in (0..n).filter(|i| !outputs.contains(i)) {
        release[last_step[i]].push(i);
        wave_release[last_level[i]].push(i);
    }

    let plan = CompiledPlan {
        name: function.name().to_string(),
        steps,
        parameters: function.parameter_descs(),
        results: function.result_descs(),
        outputs,
        waves,
        release,
        wave_release,
    };

    debug!(
        "compiled '{}': {} steps in {} levels, widest level {} [{}]",
        plan.name,
        plan.steps.len(),
        plan.waves.len(),
        plan.waves.iter().map(|w| w.len()).max().unwrap_or(0),
        plan.steps
            .iter()
            .map(|s| s.category)
            .counts()
            .into_iter()
            .sorted_by_key(|(c, _)| format!("{:?}", c))
            .map(|(c, k)| format!("{:?}: {}", c, k))
            .join(", ")
    );
    trace!("{:?}", plan);
    Ok(plan)
}

type Values<'a> = Vec<Option<Cow<'a, HostData>>>;

impl CompiledPlan {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn parameter_descs(&self) -> &[TensorDesc] {
        &self.parameters
    }

    pub fn result_descs(&self) -> &[TensorDesc] {
        &self.results
    }

    /// Number of wavefront levels.
    pub fn depth(&self) -> usize {
        self.waves.len()
    }

    /// Node ids in execution order.
    pub fn schedule(&self) -> Vec<NodeId> {
        self.steps.iter().map(|s| s.node).collect()
    }

    /// Node ids grouped by wavefront level. Nodes within a level do not depend on each
    /// other.
    pub fn levels(&self) -> Vec<Vec<NodeId>> {
        self.waves
            .iter()
            .map(|w| w.iter().map(|&i| self.steps[i].node).collect())
            .collect()
    }

    fn check_inputs(&self, inputs: &[HostData]) -> Result<(), Error> {
        if inputs.len() != self.parameters.len() {
            return Err(Error::ArityMismatch {
                role: "input",
                expected: self.parameters.len(),
                found: inputs.len(),
            });
        }
        for (index, (desc, data)) in self.parameters.iter().zip(inputs).enumerate() {
            if !desc.admits(data) {
                return Err(Error::SignatureMismatch {
                    role: "input",
                    index,
                    expected: desc.clone(),
                    found: TensorDesc::new(data.element_type(), &[data.len()]),
                });
            }
        }
        Ok(())
    }

    fn run_step<'a>(
        &self,
        index: usize,
        values: &[Option<Cow<'a, HostData>>],
        inputs: &'a [HostData],
    ) -> Result<Cow<'a, HostData>, Error> {
        let step = &self.steps[index];
        match &step.action {
            Action::Parameter(slot) => inputs
                .get(*slot)
                .map(Cow::Borrowed)
                .ok_or(Error::ArityMismatch {
                    role: "input",
                    expected: self.parameters.len(),
                    found: inputs.len(),
                }),
            Action::Kernel(kernel) => {
                let args = step
                    .inputs
                    .iter()
                    .map(|&i| {
                        values[i].as_deref().ok_or_else(|| {
                            Error::Evaluation(format!("value of step #{} is not available", i))
                        })
                    })
                    .collect::<Result<SmallVec<[&HostData; 3]>, Error>>()?;

                let out = kernel(&args)?;
                if !step.desc.admits(&out) {
                    return Err(Error::Evaluation(format!(
                        "{} produced {} {} values for {:?}",
                        step.op,
                        out.len(),
                        out.element_type(),
                        step.desc
                    )));
                }
                trace!("{}: evaluated {:?}", self.name, step);
                Ok(Cow::Owned(out))
            }
        }
    }

    fn finish(&self, values: Values) -> Result<Vec<HostData>, Error> {
        self.outputs
            .iter()
            .map(|&i| match &values[i] {
                Some(v) => Ok(v.clone().into_owned()),
                None => Err(Error::Evaluation(format!("result step #{} was not computed", i))),
            })
            .collect()
    }

    /// Runs the schedule step by step on the calling thread.
    pub fn evaluate(&self, inputs: &[HostData]) -> Result<Vec<HostData>, Error> {
        self.check_inputs(inputs)?;

        let mut values: Values = vec![None; self.steps.len()];
        for (i, release) in self.release.iter().enumerate() {
            let value = self.run_step(i, &values, inputs)?;
            values[i] = Some(value);
            for &dead in release {
                values[dead] = None;
            }
        }
        self.finish(values)
    }

    /// Runs one wavefront level at a time, evaluating the steps of a level on the rayon
    /// pool. Each level is complete before the next one reads it.
    pub fn evaluate_parallel(&self, inputs: &[HostData]) -> Result<Vec<HostData>, Error> {
        self.check_inputs(inputs)?;

        let mut values: Values = vec![None; self.steps.len()];
        for (wave, release) in self.waves.iter().zip(&self.wave_release) {
            let computed = wave
                .par_iter()
                .map(|&i| self.run_step(i, &values, inputs).map(|v| (i, v)))
                .collect::<Result<Vec<_>, Error>>()?;

            for (i, value) in computed {
                values[i] = Some(value);
            }
            for &dead in release {
                values[dead] = None;
            }
        }
        self.finish(values)
    }
}
