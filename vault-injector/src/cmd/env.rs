//! The `env` subcommand.

use vault_injector_common::{mutate::env_vars, prelude::*};

use super::ConfigOpt;

/// Print `NAME=value` for each environment variable implied by our config.
pub fn run(opt: &ConfigOpt) -> Result<()> {
    let config = opt.load()?;
    for line in env_lines(&config) {
        println!("{}", line);
    }
    Ok(())
}

/// Format our environment variables the way a shell would expect them.
fn env_lines(config: &VaultConfig) -> Vec<String> {
    env_vars(config)
        .into_iter()
        .map(|var| format!("{}={}", var.name, var.value.unwrap_or_default()))
        .collect()
}

#[test]
fn env_lines_are_ordered() {
    let config = VaultConfig {
        addr: "http://vault:8200".to_owned(),
        path: "secret/app".to_owned(),
        role: "app-role".to_owned(),
        token_path: "/tmp/token".to_owned(),
        ..VaultConfig::default()
    };
    assert_eq!(
        env_lines(&config),
        &[
            "VAULT_ADDR=http://vault:8200",
            "VAULT_PATH=secret/app",
            "VAULT_ROLE=app-role",
            "TOKEN_PATH=/tmp/token",
        ],
    );
}
