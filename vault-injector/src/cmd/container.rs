//! The `container` subcommand.

use vault_injector_common::{mutate::mutate_container, prelude::*};

use super::{load_yaml, print_yaml, ConfigOpt};

/// Mutate the container stored in `path` and print it.
pub fn run(opt: &ConfigOpt, path: &Path) -> Result<()> {
    let config = opt.load()?;
    let container: Container = load_yaml(path)?;
    info!(container = %container.name, "injecting Vault settings");
    print_yaml(&mutate_container(container, &config))
}

#[test]
fn container_yaml_round_trips() {
    let yaml = r#"
name: app
image: app:1.0
env:
  - name: LANG
    value: C
"#;
    let container: Container = serde_yaml::from_str(yaml).expect("parse error");
    let config = VaultConfig {
        addr: "https://vault:8200".to_owned(),
        tls_secret_name: "vault-tls".to_owned(),
        vault_ca_cert: "ca.crt".to_owned(),
        ..VaultConfig::default()
    };
    let output = serde_yaml::to_string(&mutate_container(container, &config))
        .expect("serialize error");
    assert!(output.contains("subPath: ca.crt"));

    let reparsed: Container = serde_yaml::from_str(&output).expect("reparse error");
    assert_eq!(reparsed.name, "app");
    assert_eq!(reparsed.image.as_deref(), Some("app:1.0"));
    let env = reparsed.env.unwrap_or_default();
    let names = env.iter().map(|e| e.name.as_str()).collect::<Vec<_>>();
    assert_eq!(
        names,
        &["LANG", "VAULT_ADDR", "VAULT_PATH", "VAULT_ROLE", "VAULT_CACERT"],
    );
    let mounts = reparsed.volume_mounts.unwrap_or_default();
    assert_eq!(mounts.len(), 1);
    assert_eq!(mounts[0].mount_path, "/etc/tls/ca.crt");
}
