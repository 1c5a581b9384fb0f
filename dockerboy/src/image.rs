use log::{debug, info, warn};
use std::path::{Path, PathBuf};

use crate::{
    error::Result,
    models::{BuildStatus, ContainerSpec, ImageName},
    naming::ResourceName,
    services::ContainerRuntime,
};

/// A buildable image. The build status is resolved at most once per handle,
/// either by `build` or by the first readiness probe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageHandle {
    name: ResourceName,
    dockerfile: PathBuf,
    build_status: BuildStatus,
}

impl ImageHandle {
    pub fn new(name: ResourceName, dockerfile: PathBuf) -> ImageHandle {
        ImageHandle {
            name,
            dockerfile,
            build_status: BuildStatus::Unknown,
        }
    }

    pub fn name(&self) -> ImageName {
        self.name.image_name()
    }

    pub fn resource(&self) -> &ResourceName {
        &self.name
    }

    pub fn dockerfile(&self) -> &Path {
        &self.dockerfile
    }

    pub fn build_status(&self) -> BuildStatus {
        self.build_status
    }

    /// Generations above zero are snapshots committed from a container.
    /// Building one replaces that snapshot with a fresh Dockerfile build.
    pub fn is_commit(&self) -> bool {
        self.name.version().is_some()
    }

    pub fn build(&mut self, runtime: &mut dyn ContainerRuntime) -> Result<bool> {
        let name = self.name();
        if self.is_commit() {
            warn!("building {} replaces the snapshot committed under that tag", name);
        }
        info!("building image {} from {:?}", name, self.dockerfile);

        let built = runtime.build_image(&name, &self.dockerfile)?;
        self.build_status = BuildStatus::from_built(built);

        info!("image {} {}", name, if built { "built" } else { "failed to build" });
        Ok(built)
    }

    /// Asks the runtime only while the status is still unknown.
    pub fn is_ready(&mut self, runtime: &mut dyn ContainerRuntime) -> Result<bool> {
        if self.build_status == BuildStatus::Unknown {
            let exists = runtime.image_exists(&self.name())?;
            debug!("image {} exists: {}", self.name(), exists);
            self.build_status = BuildStatus::from_built(exists);
        }

        Ok(self.build_status == BuildStatus::Built)
    }
}

impl ContainerSpec {
    pub fn to_image(&self) -> Result<ImageHandle> {
        let name = ResourceName::new(self.name.clone())?.at_version(self.generation);
        Ok(ImageHandle::new(name, self.dockerfile.clone()))
    }
}
