use std::{collections::BTreeMap as Map, fmt, path::PathBuf, time::Duration};

#[derive(Clone, Debug, Hash, PartialOrd, Ord, PartialEq, Eq)]
pub struct ImageName(pub String);

#[derive(Clone, Debug, Hash, PartialOrd, Ord, PartialEq, Eq)]
pub struct ContainerId(pub String);

#[derive(Clone, Debug, Hash, PartialOrd, Ord, PartialEq, Eq)]
pub struct ContainerName(pub String);

impl fmt::Display for ImageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ContainerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the runtime reports about a container name, in the order the
/// decision procedure checks it.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum ContainerState {
    Running,
    StoppedExists,
    Absent,
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum BuildStatus {
    Unknown,
    Built,
    Failed,
}

impl BuildStatus {
    pub fn from_built(built: bool) -> BuildStatus {
        if built {
            BuildStatus::Built
        } else {
            BuildStatus::Failed
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    Error(String),
}

/// A host/container port pair. Either side may be missing until the pair
/// has gone through `ports::normalize_port`.
#[derive(Copy, Clone, Debug, Default, Hash, PartialEq, Eq)]
pub struct PortMapping {
    pub host: Option<u16>,
    pub container: Option<u16>,
}

impl PortMapping {
    pub fn new(host: Option<u16>, container: Option<u16>) -> PortMapping {
        PortMapping { host, container }
    }

    pub fn symmetric(port: u16) -> PortMapping {
        PortMapping::new(Some(port), Some(port))
    }
}

/// Columns of `ps --format` that can be queried for a single container.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PsField {
    Id,
    Image,
    Command,
    Created,
    Status,
    Ports,
    Names,
}

impl PsField {
    pub fn template(self) -> &'static str {
        match self {
            PsField::Id => "{{.ID}}",
            PsField::Image => "{{.Image}}",
            PsField::Command => "{{.Command}}",
            PsField::Created => "{{.CreatedAt}}",
            PsField::Status => "{{.Status}}",
            PsField::Ports => "{{.Ports}}",
            PsField::Names => "{{.Names}}",
        }
    }

    pub fn parse(field: &str) -> Option<PsField> {
        let field = match field.to_ascii_lowercase().as_str() {
            "id" => PsField::Id,
            "image" => PsField::Image,
            "command" => PsField::Command,
            "created" => PsField::Created,
            "status" => PsField::Status,
            "ports" => PsField::Ports,
            "names" => PsField::Names,
            _ => return None,
        };

        Some(field)
    }
}

/// Declarative description of an image plus the environment its container
/// runs in. `name` is the bare base name, without image/container suffixes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    /// Set once the container has been rebuilt at least once.
    pub generation: Option<u32>,
    pub dockerfile: PathBuf,
    pub host_dir: PathBuf,
    pub container_dir: Option<String>,
    pub ports: Vec<PortMapping>,
    pub interactive: bool,
    pub post_removal: bool,
    pub rebuild: bool,
}

/// Everything needed to create a fresh container with `run`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunRequest {
    pub image: ImageName,
    pub name: ContainerName,
    pub host_dir: PathBuf,
    pub container_dir: String,
    /// Already normalized.
    pub ports: Vec<PortMapping>,
    pub interactive: bool,
    pub post_removal: bool,
    pub labels: Map<String, String>,
    pub cmd: Vec<String>,
}

/// How to reach the container runtime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub binary: String,
    /// Applies to every captured call except builds.
    pub command_timeout: Option<Duration>,
    pub build_timeout: Option<Duration>,
    pub build_success_markers: Vec<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            binary: "docker".into(),
            command_timeout: Some(Duration::from_secs(60)),
            build_timeout: None,
            build_success_markers: vec!["Successfully built".into(), "writing image sha256:".into()],
        }
    }
}
