//! Code shared between the Vault injector tools: configuration loading and
//! the container mutations which let a workload talk to Vault.

#![warn(missing_docs)]

pub use k8s_openapi;
pub use tracing;

pub mod config;
pub mod errors;
pub mod mutate;
pub mod tracing_support;

/// Common imports used by many modules.
pub mod prelude {
    pub use anyhow::{format_err, Context};
    pub use k8s_openapi::api::core::v1::{
        Container, EnvVar, Pod, PodSpec, Volume, VolumeMount,
    };
    pub use serde::{Deserialize, Serialize};
    pub use std::{
        collections::BTreeMap,
        fs::File,
        path::{Path, PathBuf},
    };
    pub use tracing::{debug, info, trace, warn};

    pub use super::config::VaultConfig;
    pub use super::{Error, Result};
}

/// Error type for this crate's functions.
pub type Error = anyhow::Error;

/// Result type for this crate's functions.
pub type Result<T> = ::std::result::Result<T, Error>;
