#![allow(dead_code)]

use std::{
    collections::{BTreeMap as Map, BTreeSet as Set},
    path::{Path, PathBuf},
};

use dockerboy::{
    error::{Error, Result},
    models::{
        ContainerId, ContainerName, ContainerSpec, ImageName, PortMapping, PsField, RunRequest,
        StartOutcome,
    },
    ContainerRuntime,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    BuildImage(String),
    ListRunning,
    ListAll,
    ListImages,
    ContainerRunning(String),
    ContainerExists(String),
    ImageExists(String),
    ListContainerIds(String),
    Start(String),
    Exec(String, Vec<String>),
    RunNew(String, String),
    Stop(String),
    Kill(String),
    Remove(String),
    RemoveImage(String),
    Commit(String, String),
    Field(String),
    NameFromId(String),
    Label(String),
}

impl Call {
    /// Calls that change the runtime's state.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Call::BuildImage(_)
                | Call::Start(_)
                | Call::Exec(_, _)
                | Call::RunNew(_, _)
                | Call::Stop(_)
                | Call::Kill(_)
                | Call::Remove(_)
                | Call::RemoveImage(_)
                | Call::Commit(_, _)
        )
    }
}

/// In-memory runtime that records every call and mimics docker closely
/// enough for the reconciliation paths.
#[derive(Debug, Default)]
pub struct FakeRuntime {
    pub calls: Vec<Call>,
    pub running: Set<String>,
    pub stopped: Set<String>,
    pub images: Set<String>,
    pub build_fails: bool,
    pub start_fails: bool,
    /// Overrides the ids reported for a container name.
    pub ids: Map<String, Vec<String>>,
    pub labels: Map<String, Map<String, String>>,
    pub requests: Vec<RunRequest>,
    pub exit_code: i32,
}

impl FakeRuntime {
    pub fn new() -> FakeRuntime {
        FakeRuntime::default()
    }

    pub fn with_image(mut self, name: &str) -> FakeRuntime {
        self.images.insert(name.to_owned());
        self
    }

    pub fn with_running(mut self, name: &str) -> FakeRuntime {
        self.running.insert(name.to_owned());
        self
    }

    pub fn with_stopped(mut self, name: &str) -> FakeRuntime {
        self.stopped.insert(name.to_owned());
        self
    }

    pub fn mutations(&self) -> Vec<Call> {
        self.calls.iter().filter(|call| call.is_mutation()).cloned().collect()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls.iter().filter(|recorded| *recorded == call).count()
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }

    fn exists(&self, name: &str) -> bool {
        self.running.contains(name) || self.stopped.contains(name)
    }

    fn name_of(&self, id: &str) -> Option<String> {
        self.ids
            .iter()
            .find(|(_, ids)| ids.iter().any(|known| known == id))
            .map(|(name, _)| name.clone())
            .or_else(|| id.strip_prefix("id-").map(str::to_owned))
            .filter(|name| self.exists(name))
    }
}

pub fn id_of(name: &str) -> String {
    format!("id-{}", name)
}

impl ContainerRuntime for FakeRuntime {
    fn build_image(&mut self, name: &ImageName, _dockerfile: &Path) -> Result<bool> {
        self.calls.push(Call::BuildImage(name.0.clone()));
        if self.build_fails {
            return Ok(false);
        }

        self.images.insert(name.0.clone());
        Ok(true)
    }

    fn list_running_container_names(&mut self) -> Result<Set<String>> {
        self.calls.push(Call::ListRunning);
        Ok(self.running.clone())
    }

    fn list_all_container_names(&mut self) -> Result<Set<String>> {
        self.calls.push(Call::ListAll);
        Ok(self.running.union(&self.stopped).cloned().collect())
    }

    fn list_image_names(&mut self) -> Result<Set<String>> {
        self.calls.push(Call::ListImages);
        Ok(self.images.clone())
    }

    fn list_container_ids(&mut self, name: &ContainerName) -> Result<Vec<ContainerId>> {
        self.calls.push(Call::ListContainerIds(name.0.clone()));

        let ids = match self.ids.get(&name.0) {
            Some(ids) => ids.clone(),
            None if self.exists(&name.0) => vec![id_of(&name.0)],
            None => Vec::new(),
        };
        Ok(ids.into_iter().map(ContainerId).collect())
    }

    fn start_container(&mut self, name: &ContainerName) -> Result<StartOutcome> {
        self.calls.push(Call::Start(name.0.clone()));

        if self.start_fails {
            return Ok(StartOutcome::Error(format!(
                "Error response from daemon: cannot start {}",
                name
            )));
        }

        self.stopped.remove(&name.0);
        self.running.insert(name.0.clone());
        Ok(StartOutcome::Started)
    }

    fn exec_in_container(
        &mut self,
        name: &ContainerName,
        cmd: &[String],
        _interactive: bool,
    ) -> Result<i32> {
        self.calls.push(Call::Exec(name.0.clone(), cmd.to_vec()));
        Ok(self.exit_code)
    }

    fn run_new_container(&mut self, request: &RunRequest) -> Result<i32> {
        self.calls
            .push(Call::RunNew(request.image.0.clone(), request.name.0.clone()));

        if self.exists(&request.name.0) {
            return Err(Error::Runtime {
                command: "run".into(),
                message: format!("the name {} is already in use", request.name),
            });
        }

        if !request.post_removal {
            self.stopped.insert(request.name.0.clone());
            self.labels
                .insert(request.name.0.clone(), request.labels.clone());
        }
        self.requests.push(request.clone());

        Ok(self.exit_code)
    }

    fn stop_container(&mut self, name: &ContainerName) -> Result<()> {
        self.calls.push(Call::Stop(name.0.clone()));
        if self.running.remove(&name.0) {
            self.stopped.insert(name.0.clone());
        }
        Ok(())
    }

    fn kill_container(&mut self, name: &ContainerName) -> Result<()> {
        self.calls.push(Call::Kill(name.0.clone()));
        if self.running.remove(&name.0) {
            self.stopped.insert(name.0.clone());
        }
        Ok(())
    }

    fn remove_container(&mut self, id: &ContainerId) -> Result<()> {
        self.calls.push(Call::Remove(id.0.clone()));

        let name = self.name_of(&id.0).ok_or_else(|| Error::Runtime {
            command: "rm".into(),
            message: format!("no such container: {}", id),
        })?;

        if self.running.contains(&name) {
            return Err(Error::Runtime {
                command: "rm".into(),
                message: format!("cannot remove running container {}", name),
            });
        }

        self.stopped.remove(&name);
        self.labels.remove(&name);
        Ok(())
    }

    fn remove_image(&mut self, name: &ImageName) -> Result<()> {
        self.calls.push(Call::RemoveImage(name.0.clone()));
        self.images.remove(&name.0);
        Ok(())
    }

    fn commit_container(&mut self, id: &ContainerId, new_name: &ImageName) -> Result<()> {
        self.calls.push(Call::Commit(id.0.clone(), new_name.0.clone()));
        self.images.insert(new_name.0.clone());
        Ok(())
    }

    fn container_field(&mut self, name: &ContainerName, field: PsField) -> Result<String> {
        self.calls.push(Call::Field(name.0.clone()));

        let value = match field {
            PsField::Id => id_of(&name.0),
            PsField::Names => name.0.clone(),
            PsField::Status if self.running.contains(&name.0) => "Up 2 minutes".into(),
            PsField::Status => "Exited (0) 1 minute ago".into(),
            _ => String::new(),
        };
        Ok(value)
    }

    fn container_name_from_id(&mut self, id: &ContainerId) -> Result<Option<ContainerName>> {
        self.calls.push(Call::NameFromId(id.0.clone()));
        Ok(self.name_of(&id.0).map(ContainerName))
    }

    fn container_label(&mut self, name: &ContainerName, key: &str) -> Result<Option<String>> {
        self.calls.push(Call::Label(name.0.clone()));
        Ok(self
            .labels
            .get(&name.0)
            .and_then(|labels| labels.get(key).cloned()))
    }

    fn container_exists(&mut self, name: &ContainerName) -> Result<bool> {
        self.calls.push(Call::ContainerExists(name.0.clone()));
        Ok(self.exists(&name.0))
    }

    fn container_running(&mut self, name: &ContainerName) -> Result<bool> {
        self.calls.push(Call::ContainerRunning(name.0.clone()));
        Ok(self.running.contains(&name.0))
    }

    fn image_exists(&mut self, name: &ImageName) -> Result<bool> {
        self.calls.push(Call::ImageExists(name.0.clone()));
        Ok(self.images.contains(&name.0))
    }
}

pub fn spec(rebuild: bool) -> ContainerSpec {
    ContainerSpec {
        name: "demo".into(),
        generation: None,
        dockerfile: PathBuf::from("/src/demo"),
        host_dir: PathBuf::from("/src/demo/shared"),
        container_dir: None,
        ports: vec![PortMapping::new(Some(6006), None), PortMapping::default()],
        interactive: true,
        post_removal: false,
        rebuild,
    }
}

pub fn cmd(args: &[&str]) -> Vec<String> {
    args.iter().map(|arg| (*arg).to_owned()).collect()
}
