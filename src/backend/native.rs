use crate::backend::memory::Allocator;
use crate::backend::{check_views, Backend, BackendKind, TensorView};
use crate::compiler::CompiledPlan;
use crate::error::Error;
use itertools::Itertools;
use log::{debug, info};
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

/// The host reference engine. `INTERPRETER` runs a plan one step at a time, `CPU` runs
/// each wavefront level on the rayon pool.
#[derive(Debug)]
pub struct Native {
    kind: BackendKind,
    id: usize,
    allocator: Allocator,
}

impl Native {
    pub fn new(kind: BackendKind, mem_cap: Option<usize>) -> Result<Self, Error> {
        if kind == BackendKind::Gpu {
            return Err(Error::BackendUnavailable(kind.to_string()));
        }
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        info!("created {} backend #{} (memory cap: {:?})", kind, id, mem_cap);
        Ok(Native {
            kind,
            id,
            allocator: Allocator::new(mem_cap),
        })
    }
}

impl Backend for Native {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn id(&self) -> usize {
        self.id
    }

    fn allocator(&self) -> &Allocator {
        &self.allocator
    }

    fn execute(
        &self,
        plan: &CompiledPlan,
        inputs: &[&TensorView],
        outputs: &[&TensorView],
    ) -> Result<(), Error> {
        check_views(self, "input", plan.parameter_descs(), inputs)?;
        check_views(self, "output", plan.result_descs(), outputs)?;

        // inputs are copied out before any output is written, so a view may be bound on
        // both sides
        let args = inputs.iter().map(|v| v.to_host()).collect_vec();
        let results = match self.kind {
            BackendKind::Cpu => plan.evaluate_parallel(&args)?,
            _ => plan.evaluate(&args)?,
        };
        for (view, data) in outputs.iter().zip(&results) {
            view.store(data)?;
        }

        debug!(
            "{} #{} executed '{}' ({} inputs, {} outputs)",
            self.kind,
            self.id,
            plan.name(),
            inputs.len(),
            outputs.len()
        );
        Ok(())
    }
}
