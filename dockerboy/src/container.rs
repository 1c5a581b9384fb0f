use log::{info, warn};
use std::path::{Path, PathBuf};

use crate::{
    controller::{self, ExecOrRun, Reconciled},
    error::{Error, Result},
    hasher::request_digest,
    image::ImageHandle,
    models::{BuildStatus, ContainerName, ContainerSpec, PortMapping},
    naming::ResourceName,
    services::ContainerRuntime,
};

/// Per-call overrides for `ContainerHandle::run`. `None` falls back to the
/// handle's configured value.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub build: bool,
    pub interactive: Option<bool>,
    pub post_removal: Option<bool>,
}

/// A named container bound to its image, a host directory and port
/// mappings. The container name is always derived from the image's name,
/// so the two cannot drift apart.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerHandle {
    image: ImageHandle,
    host_dir: PathBuf,
    container_dir: Option<String>,
    ports: Vec<PortMapping>,
    interactive: bool,
    post_removal: bool,
    rebuild: bool,
    configured: bool,
    alive: bool,
}

impl ContainerHandle {
    /// An unconfigured handle, `configure` has to be called before `run`.
    pub fn from_image(image: ImageHandle) -> ContainerHandle {
        ContainerHandle {
            image,
            host_dir: PathBuf::new(),
            container_dir: None,
            ports: Vec::new(),
            interactive: true,
            post_removal: true,
            rebuild: true,
            configured: false,
            alive: false,
        }
    }

    pub fn configure<P: Into<PathBuf>>(
        &mut self,
        host_dir: P,
        ports: Vec<PortMapping>,
        interactive: bool,
        post_removal: bool,
    ) -> Result<&mut ContainerHandle> {
        let host_dir = host_dir.into();
        if self.container_dir.is_none() {
            default_container_dir(&host_dir)?;
        }

        self.host_dir = host_dir;
        self.ports = ports;
        self.interactive = interactive;
        self.post_removal = post_removal;
        self.configured = true;

        Ok(self)
    }

    /// Mount point inside the container. Without one, the last segment of
    /// the host directory is mounted at the root.
    pub fn set_container_dir<S: Into<String>>(&mut self, container_dir: S) -> &mut ContainerHandle {
        self.container_dir = Some(container_dir.into());
        self
    }

    pub fn set_rebuild(&mut self, rebuild: bool) -> &mut ContainerHandle {
        self.rebuild = rebuild;
        self
    }

    pub fn name(&self) -> ContainerName {
        self.image.resource().container_name()
    }

    pub fn resource(&self) -> &ResourceName {
        self.image.resource()
    }

    pub fn image(&self) -> &ImageHandle {
        &self.image
    }

    pub fn host_dir(&self) -> &Path {
        &self.host_dir
    }

    pub fn container_dir(&self) -> Result<String> {
        match &self.container_dir {
            Some(container_dir) => Ok(container_dir.clone()),
            None => default_container_dir(&self.host_dir),
        }
    }

    pub fn ports(&self) -> &[PortMapping] {
        &self.ports
    }

    pub fn interactive(&self) -> bool {
        self.interactive
    }

    pub fn post_removal(&self) -> bool {
        self.post_removal
    }

    pub fn rebuild_allowed(&self) -> bool {
        self.rebuild
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    /// Liveness as of the last runtime query made through this handle.
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn run(
        &mut self,
        runtime: &mut dyn ContainerRuntime,
        cmd: &[String],
        options: RunOptions,
    ) -> Result<Reconciled> {
        if !self.configured {
            return Err(Error::NotConfigured {
                container: self.name().0,
            });
        }

        if options.build && self.image.build_status() != BuildStatus::Built {
            self.image.build(runtime)?;
        }

        if !self.image.is_ready(runtime)? {
            warn!("image {} is not ready, not running {:?}", self.image.name(), cmd);
            return Err(Error::ImageNotReady {
                image: self.image.name().0,
            });
        }

        let container_dir = self.container_dir()?;
        let plan = ExecOrRun {
            name: self.image.resource(),
            host_dir: &self.host_dir,
            container_dir: &container_dir,
            ports: &self.ports,
            cmd,
            interactive: options.interactive.unwrap_or(self.interactive),
            post_removal: options.post_removal.unwrap_or(self.post_removal),
            rebuild_allowed: self.rebuild,
        };

        let reconciled = controller::exec_or_run(runtime, &plan)?;

        if reconciled.name != *self.resource() {
            info!("container moved to {}", reconciled.name.container_name());
            *self = self.with_generation(reconciled.name.clone());
        }

        self.refresh(runtime)?;

        Ok(reconciled)
    }

    /// Stops the container if it is running. Returns whether the container
    /// is down afterwards, as reported by the runtime.
    pub fn shutdown(&mut self, runtime: &mut dyn ContainerRuntime) -> Result<bool> {
        if !self.refresh(runtime)? {
            return Ok(true);
        }

        let name = self.name();
        runtime.stop_container(&name)?;
        let alive = self.refresh(runtime)?;
        info!("shutdown of {} {}", name, if alive { "failed" } else { "succeeded" });

        Ok(!alive)
    }

    pub fn remove(&mut self, runtime: &mut dyn ContainerRuntime) -> Result<()> {
        if self.refresh(runtime)? {
            self.shutdown(runtime)?;
        }

        let id = runtime.container_id(&self.name())?;
        runtime.remove_container(&id)?;
        self.alive = false;

        Ok(())
    }

    pub fn build_image(&mut self, runtime: &mut dyn ContainerRuntime) -> Result<bool> {
        self.image.build(runtime)
    }

    pub fn image_ready(&mut self, runtime: &mut dyn ContainerRuntime) -> Result<bool> {
        self.image.is_ready(runtime)
    }

    /// Digest a container created from the current configuration would be
    /// labelled with.
    pub fn expected_digest(&self) -> Result<String> {
        let container_dir = self.container_dir()?;
        let plan = ExecOrRun {
            name: self.resource(),
            host_dir: &self.host_dir,
            container_dir: &container_dir,
            ports: &self.ports,
            cmd: &[],
            interactive: self.interactive,
            post_removal: self.post_removal,
            rebuild_allowed: self.rebuild,
        };

        Ok(request_digest(&controller::run_request(self.resource(), &plan)))
    }

    /// Commits the container to the next image version and returns the
    /// handle of that new generation. The old handle is consumed, its names
    /// no longer refer to anything.
    pub fn rebuild(self, runtime: &mut dyn ContainerRuntime) -> Result<ContainerHandle> {
        let next = controller::rebuild_transition(runtime, self.resource())?;
        let mut rebuilt = self.with_generation(next);
        rebuilt.refresh(runtime)?;

        Ok(rebuilt)
    }

    /// The same configuration pointed at another generation of the image.
    pub fn with_generation(&self, name: ResourceName) -> ContainerHandle {
        ContainerHandle {
            image: ImageHandle::new(name, self.image.dockerfile().to_path_buf()),
            alive: false,
            ..self.clone()
        }
    }

    fn refresh(&mut self, runtime: &mut dyn ContainerRuntime) -> Result<bool> {
        self.alive = runtime.container_running(&self.name())?;
        Ok(self.alive)
    }
}

impl ContainerSpec {
    /// Image and container handles in one step, configured from the loaded settings.
    pub fn into_container(self) -> Result<ContainerHandle> {
        let mut container = ContainerHandle::from_image(self.to_image()?);

        if let Some(container_dir) = self.container_dir {
            container.set_container_dir(container_dir);
        }

        container
            .set_rebuild(self.rebuild)
            .configure(self.host_dir, self.ports, self.interactive, self.post_removal)?;

        Ok(container)
    }
}

fn default_container_dir(host_dir: &Path) -> Result<String> {
    let segment = host_dir
        .file_name()
        .and_then(|segment| segment.to_str())
        .ok_or_else(|| {
            Error::Config(format!(
                "cannot derive a container directory from {:?}",
                host_dir
            ))
        })?;

    Ok(format!("/{}", segment))
}
