mod dboy_yaml;

pub use dboy_yaml::{
    default_config, interactive_config, load_config, save_config, DboyConfig, DboyYamlFrontend,
    PortEntry, RuntimeSection,
};
