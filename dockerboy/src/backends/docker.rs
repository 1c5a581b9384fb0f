use log::{debug, warn};
use std::{
    collections::{BTreeMap as Map, BTreeSet as Set},
    io::{self, Read},
    path::Path,
    process::{Child, Command, ExitStatus, Stdio},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crate::{
    error::{Error, Result},
    models::{
        ContainerId, ContainerName, ImageName, PsField, RunRequest, RuntimeConfig, StartOutcome,
    },
    services::ContainerRuntime,
};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Exit code docker uses when the daemon or the CLI itself failed, as
/// opposed to the command inside the container.
const DOCKER_ERROR_EXIT: i32 = 125;

pub struct DockerBackend {
    config: RuntimeConfig,
}

struct Captured {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

impl Captured {
    fn text(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

impl DockerBackend {
    pub fn new(config: RuntimeConfig) -> DockerBackend {
        DockerBackend { config }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    fn command_line(&self, args: &[String]) -> String {
        let mut line = self.config.binary.clone();
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    fn capture(&self, args: &[String], timeout: Option<Duration>) -> Result<Captured> {
        let command_line = self.command_line(args);
        debug!("running {}", command_line);

        let mut child = Command::new(&self.config.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| Error::runtime(command_line.as_str(), err.to_string()))?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match timeout {
            Some(timeout) => wait_with_deadline(&mut child, timeout, &command_line)?,
            None => child.wait()?,
        };

        Ok(Captured {
            status,
            stdout: collect(stdout, &command_line)?,
            stderr: collect(stderr, &command_line)?,
        })
    }

    /// Captured call that has to exit with zero. Returns stdout.
    fn checked(&self, args: Vec<String>) -> Result<String> {
        let captured = self.capture(&args, self.config.command_timeout)?;

        if !captured.status.success() {
            return Err(Error::runtime(
                self.command_line(&args),
                failure_message(&captured),
            ));
        }

        Ok(captured.stdout)
    }

    /// Runs attached to the terminal, without a deadline.
    fn attached(&self, args: Vec<String>) -> Result<i32> {
        let command_line = self.command_line(&args);
        debug!("running {}", command_line);

        let status = Command::new(&self.config.binary)
            .args(&args)
            .status()
            .map_err(|err| Error::runtime(command_line.as_str(), err.to_string()))?;

        match status.code() {
            Some(DOCKER_ERROR_EXIT) => Err(Error::runtime(
                command_line,
                format!("exited with {}", DOCKER_ERROR_EXIT),
            )),
            Some(code) => Ok(code),
            None => Err(Error::runtime(command_line, "terminated by a signal")),
        }
    }

    fn lines(&self, args: Vec<String>) -> Result<Vec<String>> {
        let stdout = self.checked(args)?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect())
    }

    fn container_names(&self, all: bool) -> Result<Set<String>> {
        let mut args = argv(&["ps"]);
        if all {
            args.push("-a".into());
        }
        args.extend(argv(&["--format", "{{.Names}}"]));

        Ok(self
            .lines(args)?
            .iter()
            .flat_map(|line| line.split(','))
            .map(|name| name.trim().to_owned())
            .filter(|name| !name.is_empty())
            .collect())
    }
}

impl ContainerRuntime for DockerBackend {
    fn build_image(&mut self, name: &ImageName, dockerfile: &Path) -> Result<bool> {
        let args = build_args(name, dockerfile, dockerfile.is_file());
        let captured = self.capture(&args, self.config.build_timeout)?;
        let output = captured.text();
        debug!("build output:\n{}", output);

        let marked = self
            .config
            .build_success_markers
            .iter()
            .any(|marker| output.contains(marker.as_str()));

        if !captured.status.success() {
            warn!("building {} failed: {}", name, failure_message(&captured));
        } else if !marked {
            warn!("building {} exited cleanly but reported no success marker", name);
        }

        Ok(marked)
    }

    fn list_running_container_names(&mut self) -> Result<Set<String>> {
        self.container_names(false)
    }

    fn list_all_container_names(&mut self) -> Result<Set<String>> {
        self.container_names(true)
    }

    fn list_image_names(&mut self) -> Result<Set<String>> {
        let lines = self.lines(argv(&["images", "-a", "--format", "{{.Repository}}:{{.Tag}}"]))?;
        Ok(parse_image_names(&lines))
    }

    fn list_container_ids(&mut self, name: &ContainerName) -> Result<Vec<ContainerId>> {
        let mut args = argv(&["ps", "-a", "--filter"]);
        args.push(name_filter(name));
        args.extend(argv(&["--format", "{{.ID}}"]));

        Ok(self.lines(args)?.into_iter().map(ContainerId).collect())
    }

    fn start_container(&mut self, name: &ContainerName) -> Result<StartOutcome> {
        let captured = self.capture(&argv(&["start", &name.0]), self.config.command_timeout)?;

        if !captured.status.success() || captured.stdout.contains("Error") {
            return Ok(StartOutcome::Error(failure_message(&captured)));
        }

        Ok(StartOutcome::Started)
    }

    fn exec_in_container(
        &mut self,
        name: &ContainerName,
        cmd: &[String],
        interactive: bool,
    ) -> Result<i32> {
        self.attached(exec_args(name, cmd, interactive))
    }

    fn run_new_container(&mut self, request: &RunRequest) -> Result<i32> {
        self.attached(run_args(request))
    }

    fn stop_container(&mut self, name: &ContainerName) -> Result<()> {
        self.checked(argv(&["stop", &name.0]))?;
        Ok(())
    }

    fn kill_container(&mut self, name: &ContainerName) -> Result<()> {
        self.checked(argv(&["kill", &name.0]))?;
        Ok(())
    }

    fn remove_container(&mut self, id: &ContainerId) -> Result<()> {
        self.checked(argv(&["rm", &id.0]))?;
        Ok(())
    }

    fn remove_image(&mut self, name: &ImageName) -> Result<()> {
        self.checked(argv(&["rmi", &name.0]))?;
        Ok(())
    }

    fn commit_container(&mut self, id: &ContainerId, new_name: &ImageName) -> Result<()> {
        self.checked(argv(&["commit", &id.0, &new_name.0]))?;
        Ok(())
    }

    fn container_field(&mut self, name: &ContainerName, field: PsField) -> Result<String> {
        let mut args = argv(&["ps", "-a", "--filter"]);
        args.push(name_filter(name));
        args.extend(argv(&["--format", field.template()]));

        Ok(self.checked(args)?.trim().to_owned())
    }

    fn container_name_from_id(&mut self, id: &ContainerId) -> Result<Option<ContainerName>> {
        let filter = format!("id={}", id.0);
        let stdout = self.checked(argv(&["ps", "-a", "--filter", &filter, "--format", "{{.Names}}"]))?;

        let name = stdout.trim();
        if name.is_empty() {
            return Ok(None);
        }

        Ok(Some(ContainerName(name.to_owned())))
    }

    fn container_label(&mut self, name: &ContainerName, key: &str) -> Result<Option<String>> {
        let args = argv(&[
            "inspect",
            "--type",
            "container",
            "--format",
            "{{json .Config.Labels}}",
            &name.0,
        ]);
        let captured = self.capture(&args, self.config.command_timeout)?;

        if !captured.status.success() {
            if captured.stderr.contains("No such") {
                return Ok(None);
            }
            return Err(Error::runtime(self.command_line(&args), failure_message(&captured)));
        }

        let labels: Option<Map<String, String>> = serde_json::from_str(captured.stdout.trim())
            .map_err(|err| Error::runtime(self.command_line(&args), err.to_string()))?;

        Ok(labels.and_then(|mut labels| labels.remove(key)))
    }
}

fn argv(args: &[&str]) -> Vec<String> {
    args.iter().map(|arg| (*arg).to_owned()).collect()
}

/// Anchored so that `demo-container` does not also match
/// `demo-container-v1`.
fn name_filter(name: &ContainerName) -> String {
    format!("name=^/?{}$", name.0.replace('.', "\\."))
}

pub fn build_args(name: &ImageName, dockerfile: &Path, is_file: bool) -> Vec<String> {
    let mut args = argv(&["build", "-t", &name.0]);

    if is_file {
        let context = dockerfile
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        args.push("-f".into());
        args.push(dockerfile.display().to_string());
        args.push(context.display().to_string());
    } else {
        args.push(dockerfile.display().to_string());
    }

    args
}

pub fn exec_args(name: &ContainerName, cmd: &[String], interactive: bool) -> Vec<String> {
    let mut args = argv(&["exec"]);
    if interactive {
        args.push("-it".into());
    }
    args.push(name.0.clone());
    args.extend(cmd.iter().cloned());
    args
}

/// Arguments of `docker run` for a fresh container. GPUs are always
/// requested.
pub fn run_args(request: &RunRequest) -> Vec<String> {
    let mut args = argv(&["run", "--gpus", "all"]);

    if request.interactive {
        args.push("-it".into());
    }

    if request.post_removal {
        args.push("--rm".into());
    }

    args.push("--name".into());
    args.push(request.name.0.clone());
    args.push("-v".into());
    args.push(format!("{}:{}", request.host_dir.display(), request.container_dir));
    args.push("-w".into());
    args.push(request.container_dir.clone());
    args.extend(crate::ports::publish_args(&request.ports));

    for (key, value) in request.labels.iter() {
        args.push("--label".into());
        args.push(format!("{}={}", key, value));
    }

    args.push(request.image.0.clone());
    args.extend(request.cmd.iter().cloned());
    args
}

/// `repository:tag` lines from `images`. Images tagged `latest` are also
/// reachable by their bare repository name.
pub fn parse_image_names<S: AsRef<str>>(lines: &[S]) -> Set<String> {
    let mut names = Set::new();

    for line in lines {
        let line = line.as_ref().trim();
        if line.is_empty() || line.contains("<none>") {
            continue;
        }

        names.insert(line.to_owned());
        if let Some((repository, "latest")) = line.rsplit_once(':') {
            names.insert(repository.to_owned());
        }
    }

    names
}

fn failure_message(captured: &Captured) -> String {
    let stderr = captured.stderr.trim();
    let stdout = captured.stdout.trim();

    let detail = if !stderr.is_empty() { stderr } else { stdout };
    match captured.status.code() {
        Some(code) => format!("exit code {}: {}", code, detail),
        None => format!("terminated by a signal: {}", detail),
    }
}

fn drain<R>(pipe: Option<R>) -> Option<JoinHandle<io::Result<String>>>
where
    R: Read + Send + 'static,
{
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buffer = String::new();
            pipe.read_to_string(&mut buffer)?;
            Ok(buffer)
        })
    })
}

fn collect(handle: Option<JoinHandle<io::Result<String>>>, command_line: &str) -> Result<String> {
    match handle {
        Some(handle) => handle
            .join()
            .map_err(|_| Error::runtime(command_line, "output reader panicked"))?
            .map_err(Error::from),
        None => Ok(String::new()),
    }
}

fn wait_with_deadline(child: &mut Child, timeout: Duration, command_line: &str) -> Result<ExitStatus> {
    let deadline = Instant::now() + timeout;

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }

        if Instant::now() >= deadline {
            warn!("{} timed out after {:?}, killing it", command_line, timeout);
            let _ = child.kill();
            let _ = child.wait();
            return Err(Error::timeout(command_line, timeout));
        }

        thread::sleep(POLL_INTERVAL);
    }
}
