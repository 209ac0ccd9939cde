//! The `pod` subcommand.

use vault_injector_common::{mutate::mutate_pod_spec, prelude::*};

use super::{load_yaml, print_yaml, ConfigOpt};

/// Mutate the pod stored in `path` and print it.
pub fn run(opt: &ConfigOpt, ignore_annotations: bool, path: &Path) -> Result<()> {
    let config = opt.load()?;
    let pod: Pod = load_yaml(path)?;
    print_yaml(&mutate_pod(pod, &config, ignore_annotations)?)
}

/// Apply the pod's annotations to `config`, and then mutate the pod's spec.
fn mutate_pod(mut pod: Pod, config: &VaultConfig, ignore_annotations: bool) -> Result<Pod> {
    let pod_name = pod.metadata.name.clone().unwrap_or_default();
    let config = match (&pod.metadata.annotations, ignore_annotations) {
        (Some(annotations), false) => config
            .with_annotations(annotations)
            .with_context(|| format!("bad annotations on pod {:?}", pod_name))?,
        _ => config.clone(),
    };
    let spec = pod
        .spec
        .take()
        .ok_or_else(|| format_err!("pod {:?} has no spec", pod_name))?;
    info!(pod = %pod_name, enabled = config.enabled, "injecting Vault settings");
    let spec = mutate_pod_spec(spec, &config)
        .with_context(|| format!("could not inject Vault settings into pod {:?}", pod_name))?;
    pod.spec = Some(spec);
    Ok(pod)
}

#[cfg(test)]
const POD_YAML: &str = r#"
apiVersion: v1
kind: Pod
metadata:
  name: app
  annotations:
    vault.security/enabled: "true"
    vault.security/vault-role: app-role
    vault.security/vault-tls-secret-name: vault-tls
    vault.security/vault-ca-cert: ca.crt
spec:
  containers:
    - name: app
      image: app:1.0
"#;

#[test]
fn annotations_enable_injection() {
    let pod: Pod = serde_yaml::from_str(POD_YAML).expect("parse error");
    let config = VaultConfig {
        addr: "https://vault:8200".to_owned(),
        ..VaultConfig::default()
    };
    let pod = mutate_pod(pod, &config, false).expect("mutation failed");
    let spec = pod.spec.expect("spec should be present");
    let env = spec.containers[0].env.clone().unwrap_or_default();
    let names = env.iter().map(|e| e.name.as_str()).collect::<Vec<_>>();
    assert_eq!(
        names,
        &["VAULT_ADDR", "VAULT_PATH", "VAULT_ROLE", "VAULT_CACERT"],
    );
    assert_eq!(env[0].value.as_deref(), Some("https://vault:8200"));
    assert_eq!(env[2].value.as_deref(), Some("app-role"));
    assert_eq!(spec.volumes.map(|v| v.len()), Some(1));
}

#[test]
fn ignored_annotations_leave_pod_alone() {
    let pod: Pod = serde_yaml::from_str(POD_YAML).expect("parse error");
    let mutated =
        mutate_pod(pod.clone(), &VaultConfig::default(), true).expect("mutation failed");
    assert_eq!(mutated, pod);
}

#[test]
fn pod_without_spec_is_an_error() {
    let pod = Pod::default();
    let config = VaultConfig {
        enabled: true,
        ..VaultConfig::default()
    };
    assert!(mutate_pod(pod, &config, false).is_err());
}

#[test]
fn conflicting_volume_fails_the_pod() {
    let yaml = format!(
        "{}  volumes:\n    - name: vault-tls\n      emptyDir: {{}}\n",
        POD_YAML,
    );
    let pod: Pod = serde_yaml::from_str(&yaml).expect("parse error");
    let err = mutate_pod(pod, &VaultConfig::default(), false).unwrap_err();
    assert!(err.to_string().contains("\"app\""));
}
