use anyhow::{anyhow, Result};
use crossterm::{
    style::{self, Colorize, Styler},
    QueueableCommand,
};
use log::info;
use std::{
    env,
    io::{stdin, stdout, Write},
    path::{Path, PathBuf},
    process,
};
use structopt::{clap::AppSettings, StructOpt};

use dockerboy::{
    backends::DockerBackend,
    controller,
    frontends::{default_config, interactive_config, load_config, save_config, DboyYamlFrontend},
    hasher::LABEL_HASH,
    management,
    models::{ContainerState, RuntimeConfig},
    services::{ContainerRuntime, SpecFrontend},
    ContainerHandle, ContainerOperation, Error, RunOptions,
};

const CONFIG_FILE: &str = ".dboy.yaml";

#[derive(Debug, StructOpt)]
#[structopt(
    name = "dockerboy",
    about = "Builds an image and runs commands in a container made from it."
)]
struct Opt {
    #[structopt(short, long, parse(from_os_str))]
    /// Path to the config file, `.dboy.yaml` by default.
    config: Option<PathBuf>,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Builds the image.
    #[structopt(name = "b")]
    Build {
        #[structopt(short, long)]
        /// Commit the container to a new version instead.
        rebuild: bool,
    },
    /// Runs a command in the container, creating or restarting it as needed.
    #[structopt(name = "r", setting = AppSettings::TrailingVarArg)]
    Run {
        #[structopt(long)]
        non_interactive: bool,

        #[structopt(long)]
        /// Keep the container after the command exits.
        keep: bool,

        #[structopt(long)]
        /// Build the image first unless it is known to be built.
        build: bool,

        #[structopt(required = true, allow_hyphen_values = true)]
        cmd: Vec<String>,
    },
    /// Removes the container.
    #[structopt(name = "rm")]
    Remove,
    /// Stops the container.
    #[structopt(name = "sd")]
    Shutdown,
    /// Runs tensorboard on `tb_logs` in the container.
    #[structopt(name = "tb")]
    Tensorboard,
    /// Writes a config file and exits.
    #[structopt(name = "cfg")]
    Config {
        #[structopt(short, long)]
        /// Ask for every value instead of writing the defaults.
        interactive: bool,
    },
    /// Runs a container management command by its code.
    #[structopt(name = "cm")]
    Manage {
        #[structopt(long)]
        /// List the available codes.
        list: bool,

        code: Option<String>,

        args: Vec<String>,
    },
    /// Shows the state of the container and its image.
    Status,
}

fn main() -> Result<()> {
    pretty_env_logger::init_custom_env("DOCKERBOY_LOG");

    let opt = Opt::from_args();

    let mut stdout = stdout();
    let current_dir = env::current_dir()?;
    let config_path = opt.config.unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
    info!("using config {:?}", config_path);

    match opt.command {
        Command::Config { interactive } => {
            let config = if interactive {
                interactive_config(stdin().lock(), &mut stdout, &current_dir)?
            } else {
                default_config(&current_dir)
            };

            if let Some(backup) = save_config(&config, &config_path)? {
                print_info(&mut stdout, &format!("backed up the old config to {:?}", backup))?;
            }
            print_info(&mut stdout, &format!("wrote {:?}", config_path))?;

            Ok(())
        }
        Command::Manage { list, code, args } => {
            let runtime = if config_path.exists() {
                load_config(&config_path)?.runtime.to_runtime_config()
            } else {
                RuntimeConfig::default()
            };
            let mut backend = DockerBackend::new(runtime);

            manage(&mut backend, &mut stdout, list, code, &args)
        }
        command => {
            if !config_path.exists() {
                print_info(
                    &mut stdout,
                    &format!("no config found at {:?}, let's create one", config_path),
                )?;
                let config = interactive_config(stdin().lock(), &mut stdout, &current_dir)?;
                save_config(&config, &config_path)?;
            }

            let mut frontend = DboyYamlFrontend::new();
            let project = frontend.project(&config_path)?;
            info!("loaded project {:?}", project.spec.name);

            let mut backend = DockerBackend::new(project.runtime);
            let container = project.spec.into_container()?;

            let code = execute(
                command,
                container,
                &mut backend,
                &mut frontend,
                &config_path,
                &mut stdout,
            )?;
            process::exit(code);
        }
    }
}

/// Runs a command that needs the configured container. Returns the exit
/// code for the process.
fn execute(
    command: Command,
    mut container: ContainerHandle,
    backend: &mut dyn ContainerRuntime,
    frontend: &mut dyn SpecFrontend,
    config_path: &Path,
    stdout: &mut impl Write,
) -> Result<i32> {
    match command {
        Command::Build { rebuild: false } => {
            if container.image().is_commit() {
                print_warning(
                    stdout,
                    &format!(
                        "{} holds a committed snapshot, building replaces it",
                        container.image().name()
                    ),
                )?;
            }

            let built = container.build_image(backend)?;
            let name = container.image().name();
            if built {
                print_done(stdout, &format!("image {} built", name))?;
                Ok(0)
            } else {
                print_warning(stdout, &format!("image {} failed to build", name))?;
                Ok(1)
            }
        }
        Command::Build { rebuild: true } => {
            let rebuilt = container.rebuild(backend)?;
            frontend.record_generation(config_path, rebuilt.resource().version())?;
            print_done(
                stdout,
                &format!("committed to {}, next container is {}", rebuilt.image().name(), rebuilt.name()),
            )?;
            Ok(0)
        }
        Command::Run {
            non_interactive,
            keep,
            build,
            cmd,
        } => {
            let options = RunOptions {
                build,
                interactive: if non_interactive { Some(false) } else { None },
                post_removal: if keep { Some(false) } else { None },
            };
            let post_removal = options.post_removal.unwrap_or_else(|| container.post_removal());

            let code = run(&mut container, backend, frontend, config_path, stdout, &cmd, options)?;

            // A container created without --rm earlier outlives the command.
            if post_removal && backend.container_exists(&container.name())? {
                container.remove(backend)?;
                print_info(stdout, &format!("removed {}", container.name()))?;
            }

            Ok(code)
        }
        Command::Remove => {
            container.remove(backend)?;
            print_done(stdout, &format!("removed {}", container.name()))?;
            Ok(0)
        }
        Command::Shutdown => {
            let down = container.shutdown(backend)?;
            if down {
                print_done(stdout, &format!("{} is down", container.name()))?;
                Ok(0)
            } else {
                print_warning(stdout, &format!("{} is still running", container.name()))?;
                Ok(1)
            }
        }
        Command::Tensorboard => {
            let cmd = ["tensorboard", "--logdir", "tb_logs"]
                .iter()
                .map(|arg| (*arg).to_owned())
                .collect::<Vec<_>>();
            run(
                &mut container,
                backend,
                frontend,
                config_path,
                stdout,
                &cmd,
                RunOptions::default(),
            )
        }
        Command::Status => status(&mut container, backend, stdout),
        Command::Config { .. } | Command::Manage { .. } => {
            Err(anyhow!("this command does not use the configured container"))
        }
    }
}

fn run(
    container: &mut ContainerHandle,
    backend: &mut dyn ContainerRuntime,
    frontend: &mut dyn SpecFrontend,
    config_path: &Path,
    stdout: &mut impl Write,
    cmd: &[String],
    options: RunOptions,
) -> Result<i32> {
    let reconciled = match container.run(backend, cmd, options) {
        Ok(reconciled) => reconciled,
        Err(Error::ImageNotReady { image }) => {
            print_warning(
                stdout,
                &format!("image {} is not built, run `dockerboy b` or pass --build", image),
            )?;
            return Ok(1);
        }
        Err(err) => return Err(err.into()),
    };

    if reconciled.operation == ContainerOperation::Rebuild {
        frontend.record_generation(config_path, reconciled.name.version())?;
    }

    print_info(
        stdout,
        &format!(
            "{} {}, command exited with {}",
            reconciled.operation.verb(),
            reconciled.name.container_name(),
            reconciled.exit_code
        ),
    )?;

    Ok(reconciled.exit_code)
}

fn status(
    container: &mut ContainerHandle,
    backend: &mut dyn ContainerRuntime,
    stdout: &mut impl Write,
) -> Result<i32> {
    let name = container.name();
    let state = controller::classify(backend, container.resource())?;
    let ready = container.image_ready(backend)?;

    let state_text = match state {
        ContainerState::Running => "running",
        ContainerState::StoppedExists => "stopped",
        ContainerState::Absent => "absent",
    };
    print_info(stdout, &format!("container {}: {}", name, state_text))?;
    print_info(
        stdout,
        &format!(
            "image {}: {}",
            container.image().name(),
            if ready { "ready" } else { "not built" }
        ),
    )?;

    if state != ContainerState::Absent {
        let id = backend.container_id(&name)?;
        print_info(stdout, &format!("id {}", id))?;

        let expected = container.expected_digest()?;
        match backend.container_label(&name, LABEL_HASH)? {
            Some(digest) if digest == expected => {
                print_info(stdout, "created from the current configuration")?;
            }
            Some(_) => {
                print_warning(
                    stdout,
                    "created from a different configuration, remove it to pick up changes",
                )?;
            }
            None => print_info(stdout, "not created by dockerboy")?,
        }
    }

    Ok(0)
}

fn manage(
    backend: &mut dyn ContainerRuntime,
    stdout: &mut impl Write,
    list: bool,
    code: Option<String>,
    args: &[String],
) -> Result<()> {
    if list {
        for command in management::COMMANDS {
            stdout.queue(style::PrintStyledContent(
                style::style(format!("{:>6}", command.code)).cyan().bold(),
            ))?;
            stdout.queue(style::Print(format!("  {} {}\n", command.name, command.usage)))?;
        }
        stdout.flush()?;
        return Ok(());
    }

    let code = code.ok_or_else(|| anyhow!("missing command code, see `dockerboy cm --list`"))?;
    let output = management::dispatch(backend, &code, args)?;

    stdout.queue(style::Print(format!("{}\n", output)))?.flush()?;
    Ok(())
}

fn print_info(stdout: &mut impl Write, message: &str) -> Result<()> {
    stdout
        .queue(style::PrintStyledContent("INFO: ".cyan().bold()))?
        .queue(style::Print(format!("{}\n", message)))?
        .flush()?;
    Ok(())
}

fn print_warning(stdout: &mut impl Write, message: &str) -> Result<()> {
    stdout
        .queue(style::PrintStyledContent("WARN: ".yellow().bold()))?
        .queue(style::Print(format!("{}\n", message)))?
        .flush()?;
    Ok(())
}

fn print_done(stdout: &mut impl Write, message: &str) -> Result<()> {
    stdout
        .queue(style::Print(format!("{} ", message)))?
        .queue(style::PrintStyledContent("done".green().bold()))?
        .queue(style::Print("\n"))?
        .flush()?;
    Ok(())
}
