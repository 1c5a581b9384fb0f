//! Builds an image from a Dockerfile and runs commands in a container made
//! from it, reusing, restarting, recreating or rebuilding that container
//! depending on what the runtime currently reports.

pub mod backends;
pub mod container;
pub mod controller;
pub mod error;
pub mod frontends;
pub mod hasher;
pub mod image;
pub mod management;
pub mod models;
pub mod naming;
pub mod ports;
pub mod services;

pub use container::{ContainerHandle, RunOptions};
pub use controller::{ContainerOperation, Reconciled};
pub use error::{Error, Result};
pub use image::ImageHandle;
pub use services::ContainerRuntime;
