//! Configuration parsing for package manifests and run configuration files

pub mod manifest;
pub mod run;
