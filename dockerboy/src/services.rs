use log::warn;
use std::{collections::BTreeSet as Set, path::Path};

use crate::{
    error::{Error, Result},
    models::{
        ContainerId, ContainerName, ContainerSpec, ImageName, PsField, RunRequest, RuntimeConfig,
        StartOutcome,
    },
};

/// A container definition together with the runtime settings it was configured with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Project {
    pub spec: ContainerSpec,
    pub runtime: RuntimeConfig,
}

pub trait SpecFrontend {
    fn project(&mut self, config_path: &Path) -> Result<Project>;

    /// Persists the generation a rebuild moved the container to, so the next
    /// invocation derives the same names.
    fn record_generation(&mut self, config_path: &Path, generation: Option<u32>) -> Result<()>;
}

/// The container runtime as seen by the reconciliation engine. Every call
/// blocks until the runtime has answered.
pub trait ContainerRuntime {
    /// True only when the build output carries a success marker.
    fn build_image(&mut self, name: &ImageName, dockerfile: &Path) -> Result<bool>;

    fn list_running_container_names(&mut self) -> Result<Set<String>>;

    /// Running and stopped containers.
    fn list_all_container_names(&mut self) -> Result<Set<String>>;

    fn list_image_names(&mut self) -> Result<Set<String>>;

    /// Ids of every container matching `name`, in the runtime's listing order.
    fn list_container_ids(&mut self, name: &ContainerName) -> Result<Vec<ContainerId>>;

    fn start_container(&mut self, name: &ContainerName) -> Result<StartOutcome>;

    /// Runs `cmd` attached to the terminal and returns its exit code.
    fn exec_in_container(
        &mut self,
        name: &ContainerName,
        cmd: &[String],
        interactive: bool,
    ) -> Result<i32>;

    /// Creates and starts a container attached to the terminal and returns
    /// the exit code of its command.
    fn run_new_container(&mut self, request: &RunRequest) -> Result<i32>;

    fn stop_container(&mut self, name: &ContainerName) -> Result<()>;

    fn kill_container(&mut self, name: &ContainerName) -> Result<()>;

    fn remove_container(&mut self, id: &ContainerId) -> Result<()>;

    fn remove_image(&mut self, name: &ImageName) -> Result<()>;

    fn commit_container(&mut self, id: &ContainerId, new_name: &ImageName) -> Result<()>;

    fn container_field(&mut self, name: &ContainerName, field: PsField) -> Result<String>;

    fn container_name_from_id(&mut self, id: &ContainerId) -> Result<Option<ContainerName>>;

    fn container_label(&mut self, name: &ContainerName, key: &str) -> Result<Option<String>>;

    fn container_exists(&mut self, name: &ContainerName) -> Result<bool> {
        Ok(self.list_all_container_names()?.contains(&name.0))
    }

    fn container_running(&mut self, name: &ContainerName) -> Result<bool> {
        Ok(self.list_running_container_names()?.contains(&name.0))
    }

    fn image_exists(&mut self, name: &ImageName) -> Result<bool> {
        Ok(self.list_image_names()?.contains(&name.0))
    }

    /// Id of the container called `name`. When several match, the first one
    /// listed wins and a warning is logged.
    fn container_id(&mut self, name: &ContainerName) -> Result<ContainerId> {
        let mut ids = self.list_container_ids(name)?;

        if ids.len() > 1 {
            warn!("multiple containers match {}: {:?}, using the first", name, ids);
        }

        if ids.is_empty() {
            return Err(Error::ContainerNotFound {
                name: name.0.clone(),
            });
        }

        Ok(ids.swap_remove(0))
    }

    /// Like `container_id`, but several matches are an error.
    fn unique_container_id(&mut self, name: &ContainerName) -> Result<ContainerId> {
        let mut ids = self.list_container_ids(name)?;

        match ids.len() {
            0 => Err(Error::ContainerNotFound {
                name: name.0.clone(),
            }),
            1 => Ok(ids.remove(0)),
            _ => Err(Error::AmbiguousContainerId {
                name: name.0.clone(),
                ids: ids.into_iter().map(|id| id.0).collect(),
            }),
        }
    }
}
