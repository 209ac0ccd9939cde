//! The `describe` subcommand.

use vault_injector_common::{
    mutate::{mutate_container, volumes},
    prelude::*,
};

use super::{load_yaml, ConfigOpt};
use crate::description::render_description;

/// Template for human-readable `describe` output.
const DESCRIBE_TEMPLATE: &str = include_str!("describe.txt.hbs");

/// An environment variable, flattened for our template.
#[derive(Serialize)]
struct EnvParams {
    name: String,
    value: String,
}

/// A volume mount, flattened for our template.
#[derive(Serialize)]
struct VolumeMountParams {
    name: String,
    mount_path: String,
    sub_path: String,
}

/// A secret-backed volume, flattened for our template.
#[derive(Serialize)]
struct VolumeParams {
    name: String,
    secret_name: String,
}

/// Template parameters.
#[derive(Serialize)]
struct Params {
    config: VaultConfig,
    skip_tls_verify: bool,
    env: Vec<EnvParams>,
    volume_mounts: Vec<VolumeMountParams>,
    volumes: Vec<VolumeParams>,
}

impl Params {
    /// Work out what injecting `config` would do to an empty container.
    fn new(config: VaultConfig) -> Params {
        let container = mutate_container(Container::default(), &config);
        let env = container
            .env
            .unwrap_or_default()
            .into_iter()
            .map(|var| EnvParams {
                name: var.name,
                value: var.value.unwrap_or_default(),
            })
            .collect();
        let volume_mounts = container
            .volume_mounts
            .unwrap_or_default()
            .into_iter()
            .map(|mount| VolumeMountParams {
                name: mount.name,
                mount_path: mount.mount_path,
                sub_path: mount.sub_path.unwrap_or_default(),
            })
            .collect();
        let volumes = volumes(&config)
            .into_iter()
            .map(|volume| VolumeParams {
                secret_name: volume
                    .secret
                    .and_then(|s| s.secret_name)
                    .unwrap_or_default(),
                name: volume.name,
            })
            .collect();
        Params {
            skip_tls_verify: config.tls_secret_name.is_empty(),
            config,
            env,
            volume_mounts,
            volumes,
        }
    }
}

/// Run the `describe` subcommand.
pub fn run(opt: &ConfigOpt, annotations: Option<&Path>) -> Result<()> {
    let mut config = opt.load()?;
    if let Some(path) = annotations {
        let annotations: BTreeMap<String, String> = load_yaml(path)?;
        config = config.with_annotations(&annotations)?;
    }
    if !config.enabled {
        warn!("injection is not enabled in this config");
    }

    // Print the description.
    print!("{}", render_description(DESCRIBE_TEMPLATE, &Params::new(config))?);
    Ok(())
}

#[test]
fn render_template() {
    let config = VaultConfig {
        enabled: true,
        addr: "https://vault:8200".to_owned(),
        tls_secret_name: "vault-tls".to_owned(),
        vault_ca_cert: "ca.crt".to_owned(),
        gcp_service_account_key_secret_name: "gcp-key".to_owned(),
        backend: "gcp".to_owned(),
        ..VaultConfig::default()
    };
    let out = render_description(DESCRIBE_TEMPLATE, &Params::new(config))
        .expect("could not render template");
    assert!(out.contains("VAULT_ADDR=https://vault:8200"));
    assert!(out.contains("VAULT_CACERT=/etc/tls/ca.crt"));
    assert!(out.contains("(sub path ca.crt)"));
    assert!(out.contains("google-cloud-key from secret gcp-key"));
    assert!(out.contains("using vault-tls"));
}

#[test]
fn render_template_without_tls() {
    let out = render_description(DESCRIBE_TEMPLATE, &Params::new(VaultConfig::default()))
        .expect("could not render template");
    assert!(out.contains("VAULT_SKIP_VERIFY=true"));
    assert!(out.contains("disabled"));
    assert!(out.contains("(none)"));
}
