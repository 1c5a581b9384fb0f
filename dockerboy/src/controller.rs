use log::{info, warn};
use std::{collections::BTreeMap as Map, path::Path};

use crate::{
    error::{Error, Result},
    hasher::{request_digest, LABEL_HASH},
    models::{ContainerState, PortMapping, RunRequest, StartOutcome},
    naming::ResourceName,
    ports::normalize_ports,
    services::ContainerRuntime,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ContainerOperation {
    /// The container was running, the command was executed in it.
    Attach,
    /// The container was stopped, it was started and the command executed.
    StartAndAttach,
    /// Starting failed, the container was committed to a new version and a
    /// new container created from it.
    Rebuild,
    /// Starting failed, the container was removed and created again.
    Recreate,
    /// There was no container, a new one was created.
    Create,
}

impl ContainerOperation {
    pub fn verb(self) -> &'static str {
        match self {
            ContainerOperation::Attach => "Attached to",
            ContainerOperation::StartAndAttach => "Started",
            ContainerOperation::Rebuild => "Rebuilt",
            ContainerOperation::Recreate => "Recreated",
            ContainerOperation::Create => "Created",
        }
    }
}

/// Inputs of the exec-or-run decision. `name` fixes both the image and the
/// container the command is meant for.
#[derive(Clone, Debug)]
pub struct ExecOrRun<'a> {
    pub name: &'a ResourceName,
    pub host_dir: &'a Path,
    pub container_dir: &'a str,
    pub ports: &'a [PortMapping],
    pub cmd: &'a [String],
    pub interactive: bool,
    pub post_removal: bool,
    pub rebuild_allowed: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reconciled {
    pub operation: ContainerOperation,
    /// The generation the command ended up running in. Differs from the
    /// requested one only after a rebuild.
    pub name: ResourceName,
    pub exit_code: i32,
}

pub fn classify(runtime: &mut dyn ContainerRuntime, name: &ResourceName) -> Result<ContainerState> {
    let container = name.container_name();

    let state = if runtime.container_running(&container)? {
        ContainerState::Running
    } else if runtime.container_exists(&container)? {
        ContainerState::StoppedExists
    } else {
        ContainerState::Absent
    };

    Ok(state)
}

pub fn exec_or_run(runtime: &mut dyn ContainerRuntime, plan: &ExecOrRun<'_>) -> Result<Reconciled> {
    let container = plan.name.container_name();
    let state = classify(runtime, plan.name)?;
    info!("container {} is {:?}", container, state);

    let (operation, name, exit_code) = match state {
        ContainerState::Running => {
            info!("executing {:?} in running container {}", plan.cmd, container);
            let code = runtime.exec_in_container(&container, plan.cmd, plan.interactive)?;
            (ContainerOperation::Attach, plan.name.clone(), code)
        }
        ContainerState::StoppedExists => match runtime.start_container(&container)? {
            StartOutcome::Started => {
                info!("started container {}, executing {:?}", container, plan.cmd);
                let code = runtime.exec_in_container(&container, plan.cmd, plan.interactive)?;
                (ContainerOperation::StartAndAttach, plan.name.clone(), code)
            }
            StartOutcome::Error(message) if plan.rebuild_allowed => {
                warn!("could not start {}: {}, rebuilding it", container, message);
                let next = rebuild_transition(runtime, plan.name)?;
                let code = create_fresh(runtime, &next, plan)?;
                (ContainerOperation::Rebuild, next, code)
            }
            StartOutcome::Error(message) => {
                warn!("could not start {}: {}, recreating it", container, message);
                let code = destroy_and_recreate(runtime, plan)?;
                (ContainerOperation::Recreate, plan.name.clone(), code)
            }
        },
        ContainerState::Absent => {
            info!("container {} does not exist, creating it", container);
            let code = create_fresh(runtime, plan.name, plan)?;
            (ContainerOperation::Create, plan.name.clone(), code)
        }
    };

    Ok(Reconciled {
        operation,
        name,
        exit_code,
    })
}

/// Commits the container of `name` to the next image version and removes
/// it. Returns the name of the new generation.
pub fn rebuild_transition(
    runtime: &mut dyn ContainerRuntime,
    name: &ResourceName,
) -> Result<ResourceName> {
    let container = name.container_name();

    if !runtime.container_exists(&container)? {
        return Err(Error::ContainerNotFound { name: container.0 });
    }

    if runtime.container_running(&container)? {
        info!("stopping {} before committing it", container);
        runtime.stop_container(&container)?;
    }

    let id = runtime.unique_container_id(&container)?;
    let next = name.next();
    let image = next.image_name();

    info!("committing {} ({}) to {}", container, id, image);
    runtime.commit_container(&id, &image)?;
    runtime.remove_container(&id)?;

    Ok(next)
}

fn destroy_and_recreate(runtime: &mut dyn ContainerRuntime, plan: &ExecOrRun<'_>) -> Result<i32> {
    let container = plan.name.container_name();

    if runtime.container_running(&container)? {
        runtime.stop_container(&container)?;
    }

    let id = runtime.container_id(&container)?;
    runtime.remove_container(&id)?;

    create_fresh(runtime, plan.name, plan)
}

fn create_fresh(
    runtime: &mut dyn ContainerRuntime,
    name: &ResourceName,
    plan: &ExecOrRun<'_>,
) -> Result<i32> {
    let request = run_request(name, plan);
    info!(
        "creating container {} from {} with {:?}",
        request.name, request.image, request.cmd
    );

    runtime.run_new_container(&request)
}

pub fn run_request(name: &ResourceName, plan: &ExecOrRun<'_>) -> RunRequest {
    let mut request = RunRequest {
        image: name.image_name(),
        name: name.container_name(),
        host_dir: plan.host_dir.to_path_buf(),
        container_dir: plan.container_dir.to_owned(),
        ports: normalize_ports(plan.ports.iter().copied()),
        interactive: plan.interactive,
        post_removal: plan.post_removal,
        labels: Map::new(),
        cmd: plan.cmd.to_vec(),
    };

    let digest = request_digest(&request);
    request.labels.insert(LABEL_HASH.into(), digest);

    request
}
