//! Our subcommands.

use serde::de::DeserializeOwned;
use std::io::Read;
use structopt::StructOpt;
use vault_injector_common::prelude::*;

pub mod container;
pub mod describe;
pub mod env;
pub mod pod;

/// Options shared by every subcommand which needs a Vault config.
#[derive(Debug, StructOpt)]
pub struct ConfigOpt {
    /// Path to a YAML or JSON Vault config. Defaults to an empty config.
    #[structopt(long = "config", short = "c", parse(from_os_str))]
    config: Option<PathBuf>,
}

impl ConfigOpt {
    /// Load the requested config.
    pub fn load(&self) -> Result<VaultConfig> {
        match &self.config {
            Some(path) => {
                debug!("loading config from {}", path.display());
                VaultConfig::from_path(path)
            }
            None => Ok(VaultConfig::default()),
        }
    }
}

/// Load a YAML (or JSON) file and deserialize it as `T`.
pub fn load_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let mut f = File::open(path)
        .with_context(|| format!("can't open {}", path.display()))?;
    let mut yaml = String::new();
    f.read_to_string(&mut yaml)
        .with_context(|| format!("can't read {}", path.display()))?;
    serde_yaml::from_str(&yaml)
        .with_context(|| format!("can't parse {}", path.display()))
}

/// Print a value to standard output as YAML.
pub fn print_yaml<T: Serialize>(value: &T) -> Result<()> {
    let yaml = serde_yaml::to_string(value).context("can't serialize YAML")?;
    print!("{}", yaml);
    Ok(())
}
