//! The opaque, owning wrapper around a loaded FMU instance.
//!
//! `fmi::fmi2::instance::Instance<'a, CS>` borrows from the `Fmi2Import`
//! that created it, which makes "one struct owning both" self-referential.
//! We box the import for a stable heap address, erase the instance's
//! lifetime to `'static`, and hold it in a `ManuallyDrop` so `Drop` can run
//! `terminate` before `fmi2FreeInstance` fires — and strictly before the
//! box behind it is freed.

use std::mem::ManuallyDrop;
use std::path::Path;

use fmi::fmi2::instance::{Common, Instance};
use fmi::fmi2::schema::Fmi2ModelDescription;
use fmi::fmi2::{import::Fmi2Import, CS};
use tracing::warn;

use crate::FmuError;

pub(crate) struct FmuHandle {
    import: Box<Fmi2Import>,
    instance: ManuallyDrop<Instance<'static, CS>>,
}

impl FmuHandle {
    /// Unpack `fmu_path`, instantiate it as an FMI 2.0 Co-Simulation slave
    /// named `instance_name`.
    pub(crate) fn load(fmu_path: &Path, instance_name: &str) -> Result<Self, FmuError> {
        let import: Fmi2Import =
            fmi::import::from_path(fmu_path).map_err(|e| FmuError::LoadFailed(e.to_string()))?;
        let import = Box::new(import);

        // SAFETY: `import` is heap-allocated; its address is stable for the
        // lifetime of this `FmuHandle`. `instance` never outlives `import`
        // because `Drop` tears `instance` down before the box is released.
        let import_ref: &'static Fmi2Import = unsafe { &*(import.as_ref() as *const Fmi2Import) };

        let instance = import_ref
            .instantiate_cs(instance_name, false, false)
            .map_err(|e| FmuError::InstantiationFailed(e.to_string()))?;

        Ok(Self {
            import,
            instance: ManuallyDrop::new(instance),
        })
    }

    pub(crate) fn instance_mut(&mut self) -> &mut Instance<'static, CS> {
        &mut self.instance
    }

    pub(crate) fn model_description(&self) -> &Fmi2ModelDescription {
        self.import.model_description()
    }
}

impl Drop for FmuHandle {
    fn drop(&mut self) {
        if let Err(e) = Common::terminate(&mut *self.instance) {
            warn!(error = %e, "FMU terminate failed during teardown, proceeding to freeInstance");
        }
        // SAFETY: last use of `self.instance`. Dropping it here runs the
        // crate's own `Drop for Instance`, which calls `fmi2FreeInstance`,
        // strictly before the compiler drops `self.import` below.
        unsafe { ManuallyDrop::drop(&mut self.instance) };
    }
}
