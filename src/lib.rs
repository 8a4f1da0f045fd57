//! jx: create Jenkins X addons, clusters and integrations

pub mod cloud;
pub mod codeship;
pub mod commands;
pub mod config;
pub mod helm;
pub mod install;
pub mod k8s;
pub mod utils;
