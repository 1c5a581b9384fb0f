use log::info;
use serde::{Deserialize, Serialize};
use serde_yaml;
use std::{
    fs::{self, File},
    io::{BufRead, Write},
    path::{Path, PathBuf},
    time::Duration,
};
use tempfile::NamedTempFile;

use crate::{
    error::{Error, Result},
    models::{ContainerSpec, PortMapping, RuntimeConfig},
    services::{Project, SpecFrontend},
};

/// Contents of a `.dboy.yaml` file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DboyConfig {
    pub image_name: String,

    /// Bumped every time the container is rebuilt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<u32>,

    /// A Dockerfile, or the build context directory containing one.
    pub dockerfile_path: PathBuf,

    pub host_dir: PathBuf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_dir: Option<String>,

    #[serde(default)]
    pub ports: Vec<PortEntry>,

    #[serde(default = "enabled")]
    pub interactive: bool,

    #[serde(default = "enabled")]
    pub post_removal: bool,

    #[serde(default = "enabled")]
    pub rebuild: bool,

    #[serde(default, skip_serializing_if = "RuntimeSection::is_empty")]
    pub runtime: RuntimeSection,
}

fn enabled() -> bool {
    true
}

/// A port as written in the config: `6006`, `[6006, null]` or `"8080:80"`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortEntry {
    Single(u16),
    Pair(Option<u16>, Option<u16>),
    Short(String),
}

impl PortEntry {
    pub fn to_mapping(&self) -> Result<PortMapping> {
        match self {
            PortEntry::Single(port) => Ok(PortMapping::new(Some(*port), None)),
            PortEntry::Pair(host, container) => Ok(PortMapping::new(*host, *container)),
            PortEntry::Short(short) => parse_short_port(short),
        }
    }
}

impl From<PortMapping> for PortEntry {
    fn from(port: PortMapping) -> PortEntry {
        PortEntry::Pair(port.host, port.container)
    }
}

fn parse_short_port(short: &str) -> Result<PortMapping> {
    let side = |side: &str| -> Result<Option<u16>> {
        let side = side.trim();
        if side.is_empty() {
            return Ok(None);
        }

        side.parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("invalid port {:?} in {:?}", side, short)))
    };

    match short.find(':') {
        Some(index) => Ok(PortMapping::new(
            side(&short[..index])?,
            side(&short[index + 1..])?,
        )),
        None => Ok(PortMapping::new(side(short)?, None)),
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<String>,

    /// Zero disables the deadline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_timeout_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_timeout_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_success_markers: Option<Vec<String>>,
}

impl RuntimeSection {
    pub fn is_empty(&self) -> bool {
        *self == RuntimeSection::default()
    }

    pub fn to_runtime_config(&self) -> RuntimeConfig {
        let defaults = RuntimeConfig::default();
        let deadline = |secs: u64| Some(secs).filter(|secs| *secs > 0).map(Duration::from_secs);

        RuntimeConfig {
            binary: self.binary.clone().unwrap_or(defaults.binary),
            command_timeout: self
                .command_timeout_secs
                .map_or(defaults.command_timeout, deadline),
            build_timeout: self.build_timeout_secs.map_or(defaults.build_timeout, deadline),
            build_success_markers: self
                .build_success_markers
                .clone()
                .unwrap_or(defaults.build_success_markers),
        }
    }
}

impl DboyConfig {
    pub fn into_spec(self) -> Result<ContainerSpec> {
        let ports = self
            .ports
            .iter()
            .map(PortEntry::to_mapping)
            .collect::<Result<Vec<_>>>()?;

        Ok(ContainerSpec {
            name: self.image_name,
            generation: self.generation,
            dockerfile: self.dockerfile_path,
            host_dir: self.host_dir,
            container_dir: self.container_dir,
            ports,
            interactive: self.interactive,
            post_removal: self.post_removal,
            rebuild: self.rebuild,
        })
    }
}

pub fn default_config(root: &Path) -> DboyConfig {
    DboyConfig {
        image_name: "default".into(),
        generation: None,
        dockerfile_path: root.to_path_buf(),
        host_dir: root.join("shared"),
        container_dir: None,
        ports: vec![PortEntry::Pair(Some(6006), Some(6006))],
        interactive: true,
        post_removal: true,
        rebuild: true,
        runtime: RuntimeSection::default(),
    }
}

pub fn load_config(path: &Path) -> Result<DboyConfig> {
    let file = File::open(path)?;
    let config = serde_yaml::from_reader(file)?;
    info!("loaded config {:?}", path);

    Ok(config)
}

/// Writes `config` to `path`. An existing file is first moved to
/// `<path>.bak`, whose path is returned.
pub fn save_config(config: &DboyConfig, path: &Path) -> Result<Option<PathBuf>> {
    let backup = if path.exists() {
        let mut backup = path.as_os_str().to_owned();
        backup.push(".bak");
        let backup = PathBuf::from(backup);

        fs::rename(path, &backup)?;
        info!("backed up {:?} to {:?}", path, backup);
        Some(backup)
    } else {
        None
    };

    write_config(config, path)?;

    Ok(backup)
}

/// Serializes into a temporary file next to `path` and renames it over
/// `path`, so a failed write leaves the previous file intact.
fn write_config(config: &DboyConfig, path: &Path) -> Result<()> {
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut file = NamedTempFile::new_in(dir)?;
    serde_yaml::to_writer(&mut file, config)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|err| err.error)?;

    Ok(())
}

/// Asks for every field on `output`, reading answers from `input`. Blank
/// answers keep the defaults, relative paths are taken from `root`.
pub fn interactive_config<R, W>(mut input: R, mut output: W, root: &Path) -> Result<DboyConfig>
where
    R: BufRead,
    W: Write,
{
    let mut config = default_config(root);

    let mut ask = |question: &str| -> Result<String> {
        write!(output, "{}: ", question)?;
        output.flush()?;

        let mut answer = String::new();
        input.read_line(&mut answer)?;
        Ok(answer.trim().to_owned())
    };

    let name = ask("Image name")?;
    if !name.is_empty() {
        config.image_name = name;
    }

    let dockerfile = ask("Dockerfile path")?;
    if !dockerfile.is_empty() {
        config.dockerfile_path = root.join(dockerfile);
    }

    let host_dir = ask("Host shared directory")?;
    if !host_dir.is_empty() {
        config.host_dir = root.join(host_dir);
    }

    let ports = ask("Ports (e.g. 6006:6006, 8888)")?;
    if !ports.is_empty() {
        config.ports = ports
            .split(',')
            .map(|port| parse_short_port(port).map(PortEntry::from))
            .collect::<Result<_>>()?;
    }

    config.interactive = yes(&ask("Interactive mode? (Y/n)")?);
    config.post_removal = yes(&ask("Post removal? (Y/n)")?);
    config.rebuild = yes(&ask("Rebuild? (Y/n)")?);

    Ok(config)
}

fn yes(answer: &str) -> bool {
    !answer.to_ascii_lowercase().starts_with('n')
}

pub struct DboyYamlFrontend;

impl DboyYamlFrontend {
    pub fn new() -> DboyYamlFrontend {
        DboyYamlFrontend
    }
}

impl SpecFrontend for DboyYamlFrontend {
    fn project(&mut self, config_path: &Path) -> Result<Project> {
        let config = load_config(config_path)?;
        let runtime = config.runtime.to_runtime_config();

        Ok(Project {
            spec: config.into_spec()?,
            runtime,
        })
    }

    fn record_generation(&mut self, config_path: &Path, generation: Option<u32>) -> Result<()> {
        let mut config = load_config(config_path)?;
        config.generation = generation;

        write_config(&config, config_path)?;
        info!("recorded generation {:?} in {:?}", generation, config_path);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    #[test]
    fn parses_every_port_form() {
        let config: DboyConfig = serde_yaml::from_str(
            r#"
image_name: demo
dockerfile_path: /src/demo
host_dir: /src/demo/shared
ports:
  - 6006
  - [8888, null]
  - [null, 22]
  - [2222, 22]
  - "8080:80"
  - ":9000"
"#,
        )
        .unwrap();

        assert!(config.interactive && config.post_removal && config.rebuild);

        let spec = config.into_spec().unwrap();
        assert_eq!(
            spec.ports,
            vec![
                PortMapping::new(Some(6006), None),
                PortMapping::new(Some(8888), None),
                PortMapping::new(None, Some(22)),
                PortMapping::new(Some(2222), Some(22)),
                PortMapping::new(Some(8080), Some(80)),
                PortMapping::new(None, Some(9000)),
            ]
        );
    }

    #[test]
    fn bad_short_ports_are_rejected() {
        let entry = PortEntry::Short("http:80".into());
        assert!(matches!(entry.to_mapping(), Err(Error::Config(_))));
    }

    #[test]
    fn runtime_section_overrides_defaults() {
        let section = RuntimeSection {
            binary: Some("podman".into()),
            command_timeout_secs: Some(0),
            build_timeout_secs: Some(600),
            build_success_markers: None,
        };

        let config = section.to_runtime_config();
        assert_eq!(config.binary, "podman");
        assert_eq!(config.command_timeout, None);
        assert_eq!(config.build_timeout, Some(Duration::from_secs(600)));
        assert_eq!(
            config.build_success_markers,
            RuntimeConfig::default().build_success_markers
        );
        assert_eq!(RuntimeSection::default().to_runtime_config(), RuntimeConfig::default());
    }

    #[test]
    fn save_backs_up_an_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".dboy.yaml");

        let mut config = default_config(dir.path());
        assert_eq!(save_config(&config, &path).unwrap(), None);

        config.image_name = "second".into();
        let backup = save_config(&config, &path).unwrap().unwrap();

        assert_eq!(backup, dir.path().join(".dboy.yaml.bak"));
        assert_eq!(load_config(&backup).unwrap().image_name, "default");
        assert_eq!(load_config(&path).unwrap(), config);
    }

    #[test]
    fn frontend_reads_a_project() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".dboy.yaml");
        save_config(&default_config(dir.path()), &path).unwrap();

        let project = DboyYamlFrontend::new().project(&path).unwrap();
        assert_eq!(project.spec.name, "default");
        assert_eq!(project.spec.generation, None);
        assert_eq!(project.spec.host_dir, dir.path().join("shared"));
        assert_eq!(project.spec.ports, vec![PortMapping::symmetric(6006)]);
        assert_eq!(project.runtime, RuntimeConfig::default());
    }

    #[test]
    fn recorded_generation_is_read_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".dboy.yaml");
        save_config(&default_config(dir.path()), &path).unwrap();

        let mut frontend = DboyYamlFrontend::new();
        frontend.record_generation(&path, Some(2)).unwrap();

        assert_eq!(frontend.project(&path).unwrap().spec.generation, Some(2));
        assert!(!dir.path().join(".dboy.yaml.bak").exists());
    }

    #[test]
    fn recording_leaves_no_stray_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".dboy.yaml");
        let mut config = default_config(dir.path());
        config.image_name = "demo".into();
        save_config(&config, &path).unwrap();

        DboyYamlFrontend::new()
            .record_generation(&path, Some(1))
            .unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from(".dboy.yaml")]);

        config.generation = Some(1);
        assert_eq!(load_config(&path).unwrap(), config);
    }

    #[test]
    fn interactive_answers_fill_the_config() {
        let root = Path::new("/work");
        let answers = "demo\ndocker/gpu.Dockerfile\ndata\n6006:6006, 8888\nn\n\nN\n";
        let mut prompts = Vec::new();

        let config = interactive_config(Cursor::new(answers), &mut prompts, root).unwrap();

        assert_eq!(config.image_name, "demo");
        assert_eq!(config.dockerfile_path, root.join("docker/gpu.Dockerfile"));
        assert_eq!(config.host_dir, root.join("data"));
        assert_eq!(
            config.ports,
            vec![
                PortEntry::Pair(Some(6006), Some(6006)),
                PortEntry::Pair(Some(8888), None),
            ]
        );
        assert!(!config.interactive);
        assert!(config.post_removal);
        assert!(!config.rebuild);
        assert!(String::from_utf8(prompts).unwrap().starts_with("Image name: "));
    }

    #[test]
    fn blank_answers_keep_defaults() {
        let root = Path::new("/work");
        let config = interactive_config(Cursor::new("\n\n\n\n\n\n\n"), Vec::new(), root).unwrap();
        assert_eq!(config, default_config(root));
    }
}
