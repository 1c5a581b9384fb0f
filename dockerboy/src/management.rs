//! Direct runtime commands, reachable from the command line by short code.

use crate::{
    controller,
    error::{Error, Result},
    models::{ContainerId, ContainerName, ImageName, PsField},
    naming::{container_to_image_name, ResourceName},
    services::ContainerRuntime,
};

pub type Handler = fn(&mut dyn ContainerRuntime, &[String]) -> Result<String>;

pub struct ManagementCommand {
    pub code: &'static str,
    pub name: &'static str,
    pub usage: &'static str,
    pub arity: usize,
    pub handler: Handler,
}

pub static COMMANDS: &[ManagementCommand] = &[
    ManagementCommand {
        code: "sd",
        name: "shutdown_container",
        usage: "<container>",
        arity: 1,
        handler: shutdown_container,
    },
    ManagementCommand {
        code: "kc",
        name: "kill_container",
        usage: "<container>",
        arity: 1,
        handler: kill_container,
    },
    ManagementCommand {
        code: "rc",
        name: "remove_container",
        usage: "<container>",
        arity: 1,
        handler: remove_container,
    },
    ManagementCommand {
        code: "ri",
        name: "remove_image",
        usage: "<image>",
        arity: 1,
        handler: remove_image,
    },
    ManagementCommand {
        code: "grc",
        name: "get_running_containers",
        usage: "",
        arity: 0,
        handler: running_containers,
    },
    ManagementCommand {
        code: "gac",
        name: "get_all_containers",
        usage: "",
        arity: 0,
        handler: all_containers,
    },
    ManagementCommand {
        code: "icr",
        name: "is_container_running",
        usage: "<container>",
        arity: 1,
        handler: is_container_running,
    },
    ManagementCommand {
        code: "dce",
        name: "does_container_exist",
        usage: "<container>",
        arity: 1,
        handler: does_container_exist,
    },
    ManagementCommand {
        code: "gcnfi",
        name: "get_container_name_from_id",
        usage: "<id>",
        arity: 1,
        handler: container_name_from_id,
    },
    ManagementCommand {
        code: "iir",
        name: "is_image_ready",
        usage: "<image>",
        arity: 1,
        handler: is_image_ready,
    },
    ManagementCommand {
        code: "gci",
        name: "get_container_id",
        usage: "<container>",
        arity: 1,
        handler: container_id,
    },
    ManagementCommand {
        code: "gcf",
        name: "get_container_ps_format",
        usage: "<container> <id|image|command|created|status|ports|names>",
        arity: 2,
        handler: container_field,
    },
    ManagementCommand {
        code: "csc",
        name: "commit_stopped_container",
        usage: "<container>",
        arity: 1,
        handler: commit_stopped_container,
    },
    ManagementCommand {
        code: "uarc",
        name: "update_and_rebuild_container",
        usage: "<container>",
        arity: 1,
        handler: update_and_rebuild_container,
    },
    ManagementCommand {
        code: "gbi",
        name: "get_built_images",
        usage: "<container>",
        arity: 1,
        handler: built_images,
    },
];

pub fn lookup(code: &str) -> Option<&'static ManagementCommand> {
    COMMANDS.iter().find(|command| command.code == code)
}

pub fn dispatch(runtime: &mut dyn ContainerRuntime, code: &str, args: &[String]) -> Result<String> {
    let command =
        lookup(code).ok_or_else(|| Error::Config(format!("unknown management command {:?}", code)))?;

    if args.len() != command.arity {
        return Err(Error::Config(format!(
            "{} ({}) takes {} argument(s): {} {}",
            command.code, command.name, command.arity, command.code, command.usage
        )));
    }

    (command.handler)(runtime, args)
}

fn arg(args: &[String], index: usize) -> Result<&str> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| Error::Config(format!("missing argument {}", index + 1)))
}

fn container(args: &[String]) -> Result<ContainerName> {
    Ok(ContainerName(arg(args, 0)?.to_owned()))
}

fn join<I: IntoIterator<Item = String>>(lines: I) -> String {
    lines.into_iter().collect::<Vec<_>>().join("\n")
}

fn shutdown_container(runtime: &mut dyn ContainerRuntime, args: &[String]) -> Result<String> {
    let name = container(args)?;
    runtime.stop_container(&name)?;
    Ok(format!("stopped {}", name))
}

fn kill_container(runtime: &mut dyn ContainerRuntime, args: &[String]) -> Result<String> {
    let name = container(args)?;
    runtime.kill_container(&name)?;
    Ok(format!("killed {}", name))
}

fn remove_container(runtime: &mut dyn ContainerRuntime, args: &[String]) -> Result<String> {
    let name = container(args)?;
    let id = runtime.container_id(&name)?;
    runtime.remove_container(&id)?;
    Ok(format!("removed {} ({})", name, id))
}

fn remove_image(runtime: &mut dyn ContainerRuntime, args: &[String]) -> Result<String> {
    let name = ImageName(arg(args, 0)?.to_owned());
    runtime.remove_image(&name)?;
    Ok(format!("removed {}", name))
}

fn running_containers(runtime: &mut dyn ContainerRuntime, _: &[String]) -> Result<String> {
    Ok(join(runtime.list_running_container_names()?))
}

fn all_containers(runtime: &mut dyn ContainerRuntime, _: &[String]) -> Result<String> {
    Ok(join(runtime.list_all_container_names()?))
}

fn is_container_running(runtime: &mut dyn ContainerRuntime, args: &[String]) -> Result<String> {
    Ok(runtime.container_running(&container(args)?)?.to_string())
}

fn does_container_exist(runtime: &mut dyn ContainerRuntime, args: &[String]) -> Result<String> {
    Ok(runtime.container_exists(&container(args)?)?.to_string())
}

fn container_name_from_id(runtime: &mut dyn ContainerRuntime, args: &[String]) -> Result<String> {
    let name = runtime.container_name_from_id(&ContainerId(arg(args, 0)?.to_owned()))?;
    Ok(name.map(|name| name.0).unwrap_or_default())
}

fn is_image_ready(runtime: &mut dyn ContainerRuntime, args: &[String]) -> Result<String> {
    Ok(runtime.image_exists(&ImageName(arg(args, 0)?.to_owned()))?.to_string())
}

fn container_id(runtime: &mut dyn ContainerRuntime, args: &[String]) -> Result<String> {
    Ok(runtime.container_id(&container(args)?)?.0)
}

fn container_field(runtime: &mut dyn ContainerRuntime, args: &[String]) -> Result<String> {
    let field = arg(args, 1)?;
    let field =
        PsField::parse(field).ok_or_else(|| Error::Config(format!("unknown ps field {:?}", field)))?;
    runtime.container_field(&container(args)?, field)
}

/// Commits without removing. The id has to be unambiguous.
fn commit_stopped_container(runtime: &mut dyn ContainerRuntime, args: &[String]) -> Result<String> {
    let name = container(args)?;
    let next = ResourceName::from_container_name(&name.0)?.next();
    let id = runtime.unique_container_id(&name)?;

    let image = next.image_name();
    runtime.commit_container(&id, &image)?;

    Ok(image.0)
}

fn update_and_rebuild_container(
    runtime: &mut dyn ContainerRuntime,
    args: &[String],
) -> Result<String> {
    let name = ResourceName::from_container_name(arg(args, 0)?)?;
    let next = controller::rebuild_transition(runtime, &name)?;
    Ok(next.container_name().0)
}

/// Every generation of the image behind a container.
fn built_images(runtime: &mut dyn ContainerRuntime, args: &[String]) -> Result<String> {
    let image = container_to_image_name(&container(args)?)?;
    let base = ResourceName::from_image_name(&image.0)?;

    let images = runtime.list_image_names()?.into_iter().filter(|name| {
        ResourceName::from_image_name(name)
            .map(|resource| resource.base() == base.base())
            .unwrap_or(false)
    });

    Ok(join(images))
}
