mod docker;

pub use docker::{build_args, exec_args, parse_image_names, run_args, DockerBackend};
