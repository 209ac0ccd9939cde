//! Mutations which point containers at Vault.
//!
//! The environment variable names, volume names and mount paths used here are
//! read by the secret-fetching agent running inside the container, so they
//! must not change.

use k8s_openapi::api::core::v1::SecretVolumeSource;

use crate::prelude::*;

/// The `backend` value which selects GCP authentication.
pub const BACKEND_GCP: &str = "gcp";

/// Where the GCP service account key appears inside the container.
pub const GOOGLE_APPLICATION_CREDENTIALS_PATH: &str =
    "/var/run/secret/cloud.google.com/service-account.json";

/// The pod volume holding the GCP service account key.
pub const GOOGLE_CLOUD_KEY_VOLUME_NAME: &str = "google-cloud-key";

/// The directory where we mount `GOOGLE_CLOUD_KEY_VOLUME_NAME`.
pub const GOOGLE_CLOUD_KEY_MOUNT_PATH: &str = "/var/run/secret/cloud.google.com";

/// The pod volume holding Vault's CA certificate.
pub const VAULT_TLS_VOLUME_NAME: &str = "vault-tls";

/// The directory under which we mount Vault's CA certificate.
pub const VAULT_TLS_MOUNT_PATH: &str = "/etc/tls";

/// Build an environment variable with a literal value.
fn env_var(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_owned(),
        value: Some(value.to_owned()),
        ..Default::default()
    }
}

/// The environment variables implied by `config`, in a stable order.
pub fn env_vars(config: &VaultConfig) -> Vec<EnvVar> {
    let mut env = vec![
        env_var("VAULT_ADDR", &config.addr),
        env_var("VAULT_PATH", &config.path),
        env_var("VAULT_ROLE", &config.role),
    ];

    if config.backend == BACKEND_GCP {
        env.push(env_var("VAULT_BACKEND", BACKEND_GCP));
        if !config.gcp_service_account_key_secret_name.is_empty() {
            env.push(env_var(
                "GOOGLE_APPLICATION_CREDENTIALS",
                GOOGLE_APPLICATION_CREDENTIALS_PATH,
            ));
        }
    }

    if !config.token_path.is_empty() {
        env.push(env_var("TOKEN_PATH", &config.token_path));
    }

    env
}

/// Append everything a container needs to talk to Vault. Existing environment
/// variables and volume mounts are kept as-is, and nothing is de-duplicated.
///
/// The volumes referenced by the new mounts must exist in the pod. See
/// [`volumes`].
pub fn mutate_container(mut container: Container, config: &VaultConfig) -> Container {
    let mut env = env_vars(config);
    let mut mounts = vec![];

    if config.use_secret_names_as_keys {
        env.push(env_var("VAULT_USE_SECRET_NAMES_AS_KEYS", "true"));
    }

    if !config.version.is_empty() {
        env.push(env_var("VAULT_SECRET_VERSION", &config.version));
    }

    if !config.gcp_service_account_key_secret_name.is_empty() {
        mounts.push(VolumeMount {
            name: GOOGLE_CLOUD_KEY_VOLUME_NAME.to_owned(),
            mount_path: GOOGLE_CLOUD_KEY_MOUNT_PATH.to_owned(),
            ..Default::default()
        });
    }

    if !config.tls_secret_name.is_empty() {
        // Project just the CA certificate, not the whole secret.
        let mount_path = format!("{}/{}", VAULT_TLS_MOUNT_PATH, config.vault_ca_cert);
        env.push(env_var("VAULT_CACERT", &mount_path));
        let sub_path = if config.vault_ca_cert.is_empty() {
            None
        } else {
            Some(config.vault_ca_cert.clone())
        };
        mounts.push(VolumeMount {
            name: VAULT_TLS_VOLUME_NAME.to_owned(),
            mount_path,
            sub_path,
            ..Default::default()
        });
    } else {
        env.push(env_var("VAULT_SKIP_VERIFY", "true"));
    }

    trace!(
        container = %container.name,
        env_vars = env.len(),
        volume_mounts = mounts.len(),
        "mutating container"
    );
    container.env.get_or_insert_with(Vec::new).extend(env);
    if !mounts.is_empty() {
        container
            .volume_mounts
            .get_or_insert_with(Vec::new)
            .extend(mounts);
    }
    container
}

/// Build a pod volume backed by a Kubernetes secret.
fn secret_volume(volume_name: &str, secret_name: &str) -> Volume {
    Volume {
        name: volume_name.to_owned(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(secret_name.to_owned()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// The pod volumes needed by the mounts added in [`mutate_container`].
pub fn volumes(config: &VaultConfig) -> Vec<Volume> {
    let mut volumes = vec![];
    if !config.gcp_service_account_key_secret_name.is_empty() {
        volumes.push(secret_volume(
            GOOGLE_CLOUD_KEY_VOLUME_NAME,
            &config.gcp_service_account_key_secret_name,
        ));
    }
    if !config.tls_secret_name.is_empty() {
        volumes.push(secret_volume(VAULT_TLS_VOLUME_NAME, &config.tls_secret_name));
    }
    volumes
}

/// Mutate an entire pod spec: add our volumes, and then mutate every init
/// container and regular container. Does nothing unless `config.enabled` is
/// set.
///
/// A volume which is already present in the pod, exactly as we would have
/// added it, is left alone. Any other volume with one of our names is an
/// error, because our mounts would then point at the wrong data.
pub fn mutate_pod_spec(mut spec: PodSpec, config: &VaultConfig) -> Result<PodSpec> {
    if !config.enabled {
        debug!("Vault injection is disabled, leaving pod alone");
        return Ok(spec);
    }

    let had_volumes = spec.volumes.is_some();
    let pod_volumes = spec.volumes.get_or_insert_with(Vec::new);
    for volume in volumes(config) {
        match pod_volumes.iter().find(|v| v.name == volume.name) {
            Some(existing) if *existing == volume => {
                debug!(volume = %volume.name, "pod already has volume, not adding it");
            }
            Some(_) => {
                return Err(format_err!(
                    "pod already has a volume named {:?} which does not match our configuration",
                    volume.name,
                ));
            }
            None => pod_volumes.push(volume),
        }
    }
    if !had_volumes && pod_volumes.is_empty() {
        spec.volumes = None;
    }

    if let Some(init_containers) = spec.init_containers.take() {
        spec.init_containers = Some(
            init_containers
                .into_iter()
                .map(|c| mutate_container(c, config))
                .collect(),
        );
    }
    let containers = std::mem::take(&mut spec.containers);
    spec.containers = containers
        .into_iter()
        .map(|c| mutate_container(c, config))
        .collect();

    debug!(
        containers = spec.containers.len(),
        init_containers = spec.init_containers.as_ref().map_or(0, Vec::len),
        "mutated pod spec"
    );
    Ok(spec)
}

#[cfg(test)]
fn base_config() -> VaultConfig {
    VaultConfig {
        addr: "http://vault:8200".to_owned(),
        path: "secret/app".to_owned(),
        role: "app-role".to_owned(),
        ..VaultConfig::default()
    }
}

#[cfg(test)]
fn env_pairs(container: &Container) -> Vec<(String, String)> {
    container
        .env
        .iter()
        .flatten()
        .map(|e| (e.name.clone(), e.value.clone().unwrap_or_default()))
        .collect()
}

#[cfg(test)]
fn pairs(expected: &[(&str, &str)]) -> Vec<(String, String)> {
    expected
        .iter()
        .map(|&(k, v)| (k.to_owned(), v.to_owned()))
        .collect()
}

#[cfg(test)]
fn has_env(env: &[EnvVar], name: &str) -> bool {
    env.iter().any(|e| e.name == name)
}

#[test]
fn plain_config_skips_tls_verification() {
    let container = mutate_container(Container::default(), &base_config());
    assert_eq!(
        env_pairs(&container),
        pairs(&[
            ("VAULT_ADDR", "http://vault:8200"),
            ("VAULT_PATH", "secret/app"),
            ("VAULT_ROLE", "app-role"),
            ("VAULT_SKIP_VERIFY", "true"),
        ]),
    );
    assert!(container.volume_mounts.is_none());
}

#[test]
fn tls_secret_mounts_ca_cert() {
    let config = VaultConfig {
        tls_secret_name: "vault-tls".to_owned(),
        vault_ca_cert: "ca.crt".to_owned(),
        ..base_config()
    };
    let container = mutate_container(Container::default(), &config);
    assert_eq!(
        env_pairs(&container),
        pairs(&[
            ("VAULT_ADDR", "http://vault:8200"),
            ("VAULT_PATH", "secret/app"),
            ("VAULT_ROLE", "app-role"),
            ("VAULT_CACERT", "/etc/tls/ca.crt"),
        ]),
    );
    assert_eq!(
        container.volume_mounts,
        Some(vec![VolumeMount {
            name: VAULT_TLS_VOLUME_NAME.to_owned(),
            mount_path: "/etc/tls/ca.crt".to_owned(),
            sub_path: Some("ca.crt".to_owned()),
            ..Default::default()
        }]),
    );
}

#[test]
fn non_gcp_backends_get_no_gcp_env() {
    for backend in &["", "kubernetes", "GCP", "gcp "] {
        let config = VaultConfig {
            backend: (*backend).to_owned(),
            gcp_service_account_key_secret_name: "gcp-key".to_owned(),
            ..base_config()
        };
        let env = env_vars(&config);
        assert!(!has_env(&env, "VAULT_BACKEND"), "backend {:?}", backend);
        assert!(!has_env(&env, "GOOGLE_APPLICATION_CREDENTIALS"));

        // The key is still mounted, because that only depends on the secret.
        let container = mutate_container(Container::default(), &config);
        let mounts = container.volume_mounts.unwrap_or_default();
        assert_eq!(mounts.len(), 1, "backend {:?}", backend);
        assert_eq!(mounts[0].name, GOOGLE_CLOUD_KEY_VOLUME_NAME);
        assert_eq!(mounts[0].mount_path, GOOGLE_CLOUD_KEY_MOUNT_PATH);
    }
}

#[test]
fn gcp_backend_with_key_gets_credentials() {
    let config = VaultConfig {
        backend: "gcp".to_owned(),
        gcp_service_account_key_secret_name: "gcp-key".to_owned(),
        token_path: "/var/run/vault/token".to_owned(),
        ..base_config()
    };
    let env = env_vars(&config);
    let names = env.iter().map(|e| e.name.as_str()).collect::<Vec<_>>();
    assert_eq!(
        names,
        &[
            "VAULT_ADDR",
            "VAULT_PATH",
            "VAULT_ROLE",
            "VAULT_BACKEND",
            "GOOGLE_APPLICATION_CREDENTIALS",
            "TOKEN_PATH",
        ],
    );
    assert_eq!(env[4].value.as_deref(), Some(GOOGLE_APPLICATION_CREDENTIALS_PATH));
    assert_eq!(env[5].value.as_deref(), Some("/var/run/vault/token"));

    // The key is mounted whichever TLS branch we take.
    for tls_secret_name in &["", "vault-tls"] {
        let config = VaultConfig {
            tls_secret_name: (*tls_secret_name).to_owned(),
            vault_ca_cert: "ca.crt".to_owned(),
            ..config.clone()
        };
        let container = mutate_container(Container::default(), &config);
        let mounts = container.volume_mounts.unwrap_or_default();
        assert_eq!(mounts[0].name, GOOGLE_CLOUD_KEY_VOLUME_NAME);
        assert_eq!(mounts[0].mount_path, GOOGLE_CLOUD_KEY_MOUNT_PATH);
        assert_eq!(mounts[0].sub_path, None);
    }
}

#[test]
fn gcp_backend_without_key_only_sets_backend() {
    let config = VaultConfig {
        backend: "gcp".to_owned(),
        ..base_config()
    };
    let env = env_vars(&config);
    assert!(has_env(&env, "VAULT_BACKEND"));
    assert!(!has_env(&env, "GOOGLE_APPLICATION_CREDENTIALS"));
}

#[test]
fn optional_flags_are_appended_in_order() {
    let config = VaultConfig {
        use_secret_names_as_keys: true,
        version: "7".to_owned(),
        ..base_config()
    };
    let container = mutate_container(Container::default(), &config);
    assert_eq!(
        env_pairs(&container),
        pairs(&[
            ("VAULT_ADDR", "http://vault:8200"),
            ("VAULT_PATH", "secret/app"),
            ("VAULT_ROLE", "app-role"),
            ("VAULT_USE_SECRET_NAMES_AS_KEYS", "true"),
            ("VAULT_SECRET_VERSION", "7"),
            ("VAULT_SKIP_VERIFY", "true"),
        ]),
    );
}

#[test]
fn existing_entries_are_preserved() {
    let existing_mount = VolumeMount {
        name: "data".to_owned(),
        mount_path: "/data".to_owned(),
        ..Default::default()
    };
    let container = Container {
        name: "app".to_owned(),
        image: Some("app:1.0".to_owned()),
        env: Some(vec![env_var("VAULT_ADDR", "old"), env_var("LANG", "C")]),
        volume_mounts: Some(vec![existing_mount.clone()]),
        ..Default::default()
    };
    let config = VaultConfig {
        tls_secret_name: "vault-tls".to_owned(),
        vault_ca_cert: "ca.crt".to_owned(),
        ..base_config()
    };
    let mutated = mutate_container(container, &config);

    assert_eq!(mutated.name, "app");
    assert_eq!(mutated.image.as_deref(), Some("app:1.0"));
    let env = env_pairs(&mutated);
    assert_eq!(env[0], ("VAULT_ADDR".to_owned(), "old".to_owned()));
    assert_eq!(env[1], ("LANG".to_owned(), "C".to_owned()));
    assert_eq!(env[2], ("VAULT_ADDR".to_owned(), "http://vault:8200".to_owned()));
    assert_eq!(env.len(), 6);
    let mounts = mutated.volume_mounts.unwrap_or_default();
    assert_eq!(mounts.len(), 2);
    assert_eq!(mounts[0], existing_mount);
    assert_eq!(mounts[1].name, VAULT_TLS_VOLUME_NAME);
}

#[test]
fn empty_address_is_passed_through() {
    let container = mutate_container(Container::default(), &VaultConfig::default());
    let env = env_pairs(&container);
    assert_eq!(env[0], ("VAULT_ADDR".to_owned(), String::new()));
}

#[test]
fn volumes_match_mounts() {
    let config = VaultConfig {
        tls_secret_name: "my-vault-tls".to_owned(),
        vault_ca_cert: "ca.crt".to_owned(),
        gcp_service_account_key_secret_name: "gcp-key".to_owned(),
        ..base_config()
    };
    let pod_volumes = volumes(&config);
    let names = pod_volumes.iter().map(|v| v.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, &[GOOGLE_CLOUD_KEY_VOLUME_NAME, VAULT_TLS_VOLUME_NAME]);
    let secret_names = pod_volumes
        .iter()
        .map(|v| v.secret.as_ref().and_then(|s| s.secret_name.clone()))
        .collect::<Vec<_>>();
    assert_eq!(
        secret_names,
        &[Some("gcp-key".to_owned()), Some("my-vault-tls".to_owned())],
    );

    assert!(volumes(&base_config()).is_empty());
}

#[test]
fn disabled_pod_spec_is_untouched() {
    let spec = PodSpec {
        containers: vec![Container {
            name: "app".to_owned(),
            ..Default::default()
        }],
        ..Default::default()
    };
    assert_eq!(mutate_pod_spec(spec.clone(), &base_config()).unwrap(), spec);
}

#[test]
fn enabled_pod_spec_mutates_every_container() {
    let spec = PodSpec {
        init_containers: Some(vec![Container {
            name: "init".to_owned(),
            ..Default::default()
        }]),
        containers: vec![
            Container {
                name: "app".to_owned(),
                ..Default::default()
            },
            Container {
                name: "sidecar".to_owned(),
                ..Default::default()
            },
        ],
        volumes: Some(vec![secret_volume(VAULT_TLS_VOLUME_NAME, "vault-tls")]),
        ..Default::default()
    };
    let config = VaultConfig {
        enabled: true,
        tls_secret_name: "vault-tls".to_owned(),
        vault_ca_cert: "ca.crt".to_owned(),
        gcp_service_account_key_secret_name: "gcp-key".to_owned(),
        ..base_config()
    };
    let spec = mutate_pod_spec(spec, &config).expect("mutation failed");

    let pod_volumes = spec.volumes.unwrap_or_default();
    let names = pod_volumes.iter().map(|v| v.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, &[VAULT_TLS_VOLUME_NAME, GOOGLE_CLOUD_KEY_VOLUME_NAME]);
    assert_eq!(
        pod_volumes[0].secret.as_ref().and_then(|s| s.secret_name.as_deref()),
        Some("vault-tls"),
    );

    let containers = spec
        .init_containers
        .unwrap_or_default()
        .into_iter()
        .chain(spec.containers)
        .collect::<Vec<_>>();
    let names = containers.iter().map(|c| c.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, &["init", "app", "sidecar"]);
    for container in &containers {
        let env = container.env.as_deref().unwrap_or_default();
        assert!(has_env(env, "VAULT_CACERT"));
        assert!(!has_env(env, "VAULT_SKIP_VERIFY"));
        assert_eq!(container.volume_mounts.as_ref().map(Vec::len), Some(2));
    }
}

#[test]
fn enabled_pod_spec_without_volumes_keeps_volumes_unset() {
    let spec = PodSpec {
        containers: vec![Container::default()],
        ..Default::default()
    };
    let config = VaultConfig {
        enabled: true,
        ..base_config()
    };
    let spec = mutate_pod_spec(spec, &config).expect("mutation failed");
    assert!(spec.volumes.is_none());
    let env = spec.containers[0].env.as_deref().unwrap_or_default();
    assert!(has_env(env, "VAULT_SKIP_VERIFY"));
}

#[test]
fn enabled_pod_spec_keeps_empty_volume_list() {
    let spec = PodSpec {
        containers: vec![Container::default()],
        volumes: Some(vec![]),
        ..Default::default()
    };
    let config = VaultConfig {
        enabled: true,
        ..base_config()
    };
    let spec = mutate_pod_spec(spec, &config).expect("mutation failed");
    assert_eq!(spec.volumes, Some(vec![]));
}

#[test]
fn conflicting_pod_volume_is_an_error() {
    let spec = PodSpec {
        containers: vec![Container::default()],
        volumes: Some(vec![Volume {
            name: VAULT_TLS_VOLUME_NAME.to_owned(),
            empty_dir: Some(Default::default()),
            ..Default::default()
        }]),
        ..Default::default()
    };
    let config = VaultConfig {
        enabled: true,
        tls_secret_name: "my-ca".to_owned(),
        vault_ca_cert: "ca.crt".to_owned(),
        ..base_config()
    };
    let err = mutate_pod_spec(spec, &config).unwrap_err();
    assert!(err.to_string().contains(VAULT_TLS_VOLUME_NAME));

    // A volume backed by a different secret conflicts too.
    let spec = PodSpec {
        containers: vec![Container::default()],
        volumes: Some(vec![secret_volume(VAULT_TLS_VOLUME_NAME, "other-ca")]),
        ..Default::default()
    };
    assert!(mutate_pod_spec(spec, &config).is_err());
}

#[test]
fn tls_secret_without_ca_cert_omits_sub_path() {
    let config = VaultConfig {
        tls_secret_name: "vault-tls".to_owned(),
        ..base_config()
    };
    let container = mutate_container(Container::default(), &config);
    let mounts = container.volume_mounts.unwrap_or_default();
    assert_eq!(mounts.len(), 1);
    assert_eq!(mounts[0].mount_path, "/etc/tls/");
    assert_eq!(mounts[0].sub_path, None);
}
