use crate::backend::native::Native;
use crate::backend::{Backend, BackendKind, CallFrame, TensorView};
use crate::compiler::{compile, CompiledPlan};
use crate::error::Error;
use crate::graph::Function;
use crate::tensor::data::ElementType;
use itertools::Itertools;
use lazy_static::lazy_static;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

pub const BACKEND_VAR: &str = "SAGE_BACKEND";
pub const MEMORY_CAPACITY_VAR: &str = "SAGE_MEMORY_CAPACITY";

/// Which backend to run on and how much memory its views may hold.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub backend: BackendKind,
    /// Bytes; `None` is unlimited.
    pub memory_capacity: Option<usize>,
}

impl RuntimeConfig {
    pub fn new(backend: BackendKind) -> Self {
        RuntimeConfig {
            backend,
            memory_capacity: None,
        }
    }

    pub fn with_memory_capacity(mut self, bytes: usize) -> Self {
        self.memory_capacity = Some(bytes);
        self
    }

    /// Reads `SAGE_BACKEND` and `SAGE_MEMORY_CAPACITY`; unset variables keep their
    /// defaults.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = RuntimeConfig::default();
        if let Some(name) = lookup(BACKEND_VAR) {
            config.backend = name
                .trim()
                .parse()
                .map_err(|e| Error::InvalidConfig(format!("{}: {}", BACKEND_VAR, e)))?;
        }
        if let Some(bytes) = lookup(MEMORY_CAPACITY_VAR) {
            let bytes = bytes.trim().parse::<usize>().map_err(|e| {
                Error::InvalidConfig(format!("{}='{}': {}", MEMORY_CAPACITY_VAR, bytes, e))
            })?;
            config.memory_capacity = Some(bytes);
        }
        Ok(config)
    }
}

lazy_static! {
    static ref BACKENDS: Mutex<HashMap<RuntimeConfig, Arc<dyn Backend>>> =
        Mutex::new(HashMap::new());
}

fn backends() -> MutexGuard<'static, HashMap<RuntimeConfig, Arc<dyn Backend>>> {
    BACKENDS.lock().unwrap_or_else(|e| e.into_inner())
}

/// Entry point for running functions: resolves a backend from a [`RuntimeConfig`] and
/// shares it process-wide with every other manager of the same configuration.
#[derive(Clone)]
pub struct Manager {
    config: RuntimeConfig,
    backend: Arc<dyn Backend>,
}

impl Manager {
    pub fn new(config: RuntimeConfig) -> Result<Manager, Error> {
        let mut cache = backends();
        let backend = match cache.get(&config) {
            Some(backend) => backend.clone(),
            None => {
                let backend: Arc<dyn Backend> =
                    Arc::new(Native::new(config.backend, config.memory_capacity)?);
                cache.insert(config.clone(), backend.clone());
                backend
            }
        };
        Ok(Manager { config, backend })
    }

    /// A manager for the backend called `name` (`"INTERPRETER"`, `"CPU"` or `"GPU"`).
    pub fn get(name: &str) -> Result<Manager, Error> {
        Manager::new(RuntimeConfig::new(name.parse()?))
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn backend(&self) -> Arc<dyn Backend> {
        self.backend.clone()
    }

    pub fn compile(&self, function: &Function) -> Result<Arc<CompiledPlan>, Error> {
        Ok(Arc::new(compile(function)?))
    }

    pub fn allocate_view(&self, element_type: ElementType, extents: &[usize]) -> Result<TensorView, Error> {
        self.backend.allocate_view(element_type, extents)
    }

    pub fn execute(
        &self,
        plan: &CompiledPlan,
        inputs: &[&TensorView],
        outputs: &[&TensorView],
    ) -> Result<(), Error> {
        self.backend.execute(plan, inputs, outputs)
    }

    pub fn make_call_frame(&self, plan: Arc<CompiledPlan>) -> CallFrame {
        CallFrame::new(self.backend.clone(), plan)
    }

    /// Drops every cached backend and returns how many there were. Managers and views that
    /// are still alive keep their backend.
    pub fn teardown() -> usize {
        let mut cache = backends();
        let count = cache.len();
        cache.clear();
        info!("runtime teardown released {} cached backends", count);
        count
    }

    pub fn cached_backends() -> Vec<BackendKind> {
        backends().keys().map(|c| c.backend).unique().sorted_by_key(|k| k.name()).collect()
    }
}
