pub mod memory;
pub mod native;

use crate::backend::memory::{Allocator, Memory};
use crate::compiler::CompiledPlan;
use crate::error::Error;
use crate::tensor::data::{DataLiteral, ElementType, HostData, Scalar};
use crate::tensor::TensorDesc;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Default, Serialize, Deserialize)]
pub enum BackendKind {
    #[default]
    #[serde(rename = "INTERPRETER")]
    Interpreter,
    #[serde(rename = "CPU")]
    Cpu,
    #[serde(rename = "GPU")]
    Gpu,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [BackendKind::Interpreter, BackendKind::Cpu, BackendKind::Gpu];

    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Interpreter => "INTERPRETER",
            BackendKind::Cpu => "CPU",
            BackendKind::Gpu => "GPU",
        }
    }
}

impl Display for BackendKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BackendKind::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| Error::UnknownBackend(s.to_string()))
    }
}

/// An execution context that owns tensor views and runs compiled plans on them.
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Process-unique id, stamped on every view this backend allocates.
    fn id(&self) -> usize;

    fn allocator(&self) -> &Allocator;

    fn allocate_view(&self, element_type: ElementType, extents: &[usize]) -> Result<TensorView, Error> {
        let desc = TensorDesc::new(element_type, extents);
        let memory = self.allocator().alloc(desc.size_in_bytes())?;
        Ok(TensorView {
            desc,
            memory,
            backend: self.id(),
        })
    }

    /// Binds `inputs` to the plan's parameters and `outputs` to its results, positionally,
    /// and runs the plan. Blocks until the plan has finished or failed.
    fn execute(
        &self,
        plan: &CompiledPlan,
        inputs: &[&TensorView],
        outputs: &[&TensorView],
    ) -> Result<(), Error>;
}

/// Checks a positional view list against a plan signature.
pub(crate) fn check_views(
    backend: &dyn Backend,
    role: &'static str,
    expected: &[TensorDesc],
    views: &[&TensorView],
) -> Result<(), Error> {
    if views.len() != expected.len() {
        return Err(Error::ArityMismatch {
            role,
            expected: expected.len(),
            found: views.len(),
        });
    }
    for (index, (desc, view)) in expected.iter().zip(views).enumerate() {
        if view.backend != backend.id() {
            return Err(Error::ForeignTensorView { role, index });
        }
        if view.desc() != desc {
            return Err(Error::SignatureMismatch {
                role,
                index,
                expected: desc.clone(),
                found: view.desc().clone(),
            });
        }
    }
    Ok(())
}

/// A fixed-signature byte buffer owned by a backend.
pub struct TensorView {
    desc: TensorDesc,
    memory: Memory,
    backend: usize,
}

impl TensorView {
    pub fn desc(&self) -> &TensorDesc {
        &self.desc
    }

    pub fn element_type(&self) -> ElementType {
        self.desc.element_type()
    }

    pub fn extents(&self) -> &[usize] {
        self.desc.extents()
    }

    pub fn size_in_bytes(&self) -> usize {
        self.desc.size_in_bytes()
    }

    fn check_range(&self, offset: usize, length: usize, buffer: usize) -> Result<(), Error> {
        let size = self.size_in_bytes();
        if offset.checked_add(length).map_or(true, |end| end > size) {
            return Err(Error::OutOfBounds {
                offset,
                length,
                size,
            });
        }
        if length > buffer {
            return Err(Error::OutOfBounds {
                offset: 0,
                length,
                size: buffer,
            });
        }
        Ok(())
    }

    /// Copies `length` bytes from the front of `src` into the view at byte `offset`.
    pub fn write(&self, src: &[u8], offset: usize, length: usize) -> Result<(), Error> {
        self.check_range(offset, length, src.len())?;
        self.memory.write()[offset..offset + length].copy_from_slice(&src[..length]);
        Ok(())
    }

    /// Copies `length` bytes of the view starting at byte `offset` to the front of `dst`.
    pub fn read(&self, dst: &mut [u8], offset: usize, length: usize) -> Result<(), Error> {
        self.check_range(offset, length, dst.len())?;
        dst[..length].copy_from_slice(&self.memory.read()[offset..offset + length]);
        Ok(())
    }

    pub fn write_slice<T: Scalar>(&self, values: &[T]) -> Result<(), Error> {
        self.store(&T::vec_to_data(values.to_vec()))
    }

    pub fn write_data<D, T>(&self, data: D) -> Result<(), Error>
    where
        D: DataLiteral<T>,
        T: Scalar,
    {
        self.store(&data.to_buf())
    }

    pub fn to_vec<T: Scalar>(&self) -> Result<Vec<T>, Error> {
        let data = self.to_host();
        Ok(T::data_to_vec(&data)?.to_vec())
    }

    pub(crate) fn to_host(&self) -> HostData {
        HostData::from_bytes(self.element_type(), &self.memory.read())
    }

    pub(crate) fn store(&self, data: &HostData) -> Result<(), Error> {
        if data.element_type() != self.element_type() {
            return Err(Error::TypeMismatch(format!(
                "cannot store {} values in {:?}",
                data.element_type(),
                self.desc
            )));
        }
        if !self.desc.admits(data) {
            return Err(Error::ShapeMismatch(format!(
                "cannot store {} values in {:?}",
                data.len(),
                self.desc
            )));
        }
        *self.memory.write() = data.to_bytes();
        Ok(())
    }
}

impl Debug for TensorView {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "TensorView({:?} on backend {})", self.desc, self.backend)
    }
}

/// A backend bound to one compiled plan.
#[derive(Clone)]
pub struct CallFrame {
    backend: Arc<dyn Backend>,
    plan: Arc<CompiledPlan>,
}

impl CallFrame {
    pub fn new(backend: Arc<dyn Backend>, plan: Arc<CompiledPlan>) -> Self {
        CallFrame { backend, plan }
    }

    pub fn plan(&self) -> &CompiledPlan {
        &self.plan
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn call(&self, inputs: &[&TensorView], outputs: &[&TensorView]) -> Result<(), Error> {
        self.backend.execute(&self.plan, inputs, outputs)
    }
}
