//! Configuration describing how to reach Vault.
//!
//! A base configuration is normally loaded from a YAML file, and individual
//! pods may then override it using `vault.security/*` annotations.

use std::io::Read;

use crate::prelude::*;

/// The prefix shared by all the annotations we understand.
pub const ANNOTATION_PREFIX: &str = "vault.security/";

/// Everything we need to know to point a container at Vault.
///
/// Nothing here is validated. An empty `addr` will simply produce an empty
/// `VAULT_ADDR`, for example.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct VaultConfig {
    /// Should pods be mutated at all?
    pub enabled: bool,
    /// The address of the Vault server, for example `https://vault:8200`.
    pub addr: String,
    /// The Kubernetes secret containing Vault's CA certificate. If this is
    /// empty, TLS verification is disabled inside the container.
    pub tls_secret_name: String,
    /// The file name of the CA certificate within `tls_secret_name`.
    pub vault_ca_cert: String,
    /// The file name of the CA key within `tls_secret_name`.
    pub vault_ca_key: String,
    /// The Vault path to read secrets from.
    pub path: String,
    /// The Vault role to authenticate as.
    pub role: String,
    /// Where the in-container agent should write its Vault token.
    pub token_path: String,
    /// The Vault auth mount path.
    pub auth_path: String,
    /// The Vault auth backend. Only `gcp` is treated specially.
    pub backend: String,
    /// Should the agent use secret names as map keys?
    pub use_secret_names_as_keys: bool,
    /// The Kubernetes secret holding a GCP service account key.
    pub gcp_service_account_key_secret_name: String,
    /// Pin secrets to a specific version.
    pub version: String,
}

impl VaultConfig {
    /// Load a configuration file. JSON files work too, because YAML is a
    /// superset of JSON.
    pub fn from_path(path: &Path) -> Result<VaultConfig> {
        let mut f = File::open(path)
            .with_context(|| format!("could not open {}", path.display()))?;
        let mut yaml = String::new();
        f.read_to_string(&mut yaml)
            .with_context(|| format!("could not read {}", path.display()))?;
        VaultConfig::from_yaml(&yaml)
            .with_context(|| format!("could not parse {}", path.display()))
    }

    /// Parse a configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<VaultConfig> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Return a copy of this configuration, overridden by any
    /// `vault.security/*` annotations.
    pub fn with_annotations(
        &self,
        annotations: &BTreeMap<String, String>,
    ) -> Result<VaultConfig> {
        let mut config = self.clone();
        for (key, value) in annotations {
            let name = match key.strip_prefix(ANNOTATION_PREFIX) {
                Some(name) => name,
                None => continue,
            };
            trace!(annotation = %key, value = %value, "applying annotation");
            match name {
                "enabled" => config.enabled = parse_bool(key, value)?,
                "vault-addr" => config.addr = value.to_owned(),
                "vault-tls-secret-name" => config.tls_secret_name = value.to_owned(),
                "vault-ca-cert" => config.vault_ca_cert = value.to_owned(),
                "vault-ca-key" => config.vault_ca_key = value.to_owned(),
                "vault-path" => config.path = value.to_owned(),
                "vault-role" => config.role = value.to_owned(),
                "token-path" => config.token_path = value.to_owned(),
                "vault-auth-path" => config.auth_path = value.to_owned(),
                "vault-backend" => config.backend = value.to_owned(),
                "vault-use-secret-names-as-keys" => {
                    config.use_secret_names_as_keys = parse_bool(key, value)?
                }
                "gcp-service-account-key-secret-name" => {
                    config.gcp_service_account_key_secret_name = value.to_owned()
                }
                "vault-secret-version" => config.version = value.to_owned(),
                _ => debug!(annotation = %key, "ignoring unknown annotation"),
            }
        }
        Ok(config)
    }
}

/// Parse a boolean annotation value.
fn parse_bool(key: &str, value: &str) -> Result<bool> {
    value
        .trim()
        .parse::<bool>()
        .with_context(|| format!("invalid value {:?} for annotation {}", value, key))
}

#[cfg(test)]
fn annotations(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|&(k, v)| (k.to_owned(), v.to_owned()))
        .collect()
}

#[test]
fn parse_partial_yaml_config() {
    let yaml = r#"
enabled: true
addr: "https://vault:8200"
tlsSecretName: vault-tls
vaultCaCert: ca.crt
role: app-role
"#;
    let config = VaultConfig::from_yaml(yaml).expect("parse error");
    assert!(config.enabled);
    assert_eq!(config.addr, "https://vault:8200");
    assert_eq!(config.tls_secret_name, "vault-tls");
    assert_eq!(config.vault_ca_cert, "ca.crt");
    assert_eq!(config.role, "app-role");
    assert_eq!(config.path, "");
    assert!(!config.use_secret_names_as_keys);
}

#[test]
fn parse_json_config() {
    let json = r#"{ "addr": "http://vault:8200", "backend": "gcp", "useSecretNamesAsKeys": true }"#;
    let config = VaultConfig::from_yaml(json).expect("parse error");
    assert_eq!(config.addr, "http://vault:8200");
    assert_eq!(config.backend, "gcp");
    assert!(config.use_secret_names_as_keys);

    let round_tripped: VaultConfig =
        serde_json::from_str(&serde_json::to_string(&config).unwrap()).unwrap();
    assert_eq!(round_tripped, config);
}

#[test]
fn reject_unknown_config_fields() {
    assert!(VaultConfig::from_yaml("vaultAddress: http://vault:8200").is_err());
}

#[test]
fn missing_config_file_names_path() {
    let err = VaultConfig::from_path(Path::new("/nonexistent/vault.yml")).unwrap_err();
    assert!(err.to_string().contains("/nonexistent/vault.yml"));
}

#[test]
fn annotations_override_config() {
    let base = VaultConfig {
        addr: "https://vault:8200".to_owned(),
        role: "default".to_owned(),
        ..VaultConfig::default()
    };
    let config = base
        .with_annotations(&annotations(&[
            ("vault.security/enabled", "true"),
            ("vault.security/vault-role", "app-role"),
            ("vault.security/vault-path", "secret/app"),
            ("vault.security/vault-backend", "gcp"),
            ("vault.security/vault-use-secret-names-as-keys", " false "),
            ("vault.security/gcp-service-account-key-secret-name", "gcp-key"),
            ("vault.security/vault-secret-version", "3"),
            ("vault.security/something-new", "ignored"),
            ("app.kubernetes.io/name", "app"),
        ]))
        .expect("annotations should apply");
    assert!(config.enabled);
    assert_eq!(config.addr, "https://vault:8200");
    assert_eq!(config.role, "app-role");
    assert_eq!(config.path, "secret/app");
    assert_eq!(config.backend, "gcp");
    assert!(!config.use_secret_names_as_keys);
    assert_eq!(config.gcp_service_account_key_secret_name, "gcp-key");
    assert_eq!(config.version, "3");

    // The base config is left alone.
    assert_eq!(base.role, "default");
    assert!(!base.enabled);
}

#[test]
fn bad_boolean_annotation_is_an_error() {
    let err = VaultConfig::default()
        .with_annotations(&annotations(&[("vault.security/enabled", "yes")]))
        .unwrap_err();
    assert!(err.to_string().contains("vault.security/enabled"));
}
