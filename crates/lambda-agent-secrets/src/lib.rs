//! Maintains a namespace-local image-pull credential derived from a
//! cluster-wide source.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::{Api, ObjectMeta, PostParams};
use maplit::btreemap;
use tracing::{info, warn};

use lambda_agent_types::PULL_SECRET_NAME;

const MANAGED_BY_LABEL: &str = "lambda.babylonhealth.io/managed-by";

/// Outcome of one propagation attempt, reported back to the reconciler so it
/// can log without failing the reconcile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropagationOutcome {
    /// The namespace-local credential already existed; nothing changed.
    AlreadyPresent,
    /// A new namespace-local credential was created from the source.
    Created,
    /// The source credential is absent or unreadable; the skip is logged,
    /// not fatal.
    SourceUnavailable,
}

#[async_trait]
pub trait SecretPropagator: Send + Sync {
    /// Ensures `PULL_SECRET_NAME` exists in `namespace`, deriving it from
    /// `source_namespace`/`source_name` if it does not. Never mutates an
    /// existing namespace-local credential.
    async fn propagate(
        &self,
        namespace: &str,
        agent_name: &str,
        source_namespace: &str,
        source_name: &str,
    ) -> anyhow::Result<PropagationOutcome>;
}

pub struct KubernetesSecretPropagator {
    client: kube::Client,
}

impl KubernetesSecretPropagator {
    pub fn new(client: kube::Client) -> Self {
        KubernetesSecretPropagator { client }
    }

    fn secret_api(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl SecretPropagator for KubernetesSecretPropagator {
    async fn propagate(
        &self,
        namespace: &str,
        agent_name: &str,
        source_namespace: &str,
        source_name: &str,
    ) -> anyhow::Result<PropagationOutcome> {
        let local_api = self.secret_api(namespace);

        match local_api.get_opt(PULL_SECRET_NAME).await {
            Ok(Some(_)) => return Ok(PropagationOutcome::AlreadyPresent),
            Ok(None) => {}
            Err(e) => return Err(e.into()),
        }

        let source_api = self.secret_api(source_namespace);
        let source = match source_api.get_opt(source_name).await {
            Ok(Some(secret)) => secret,
            Ok(None) => {
                warn!(
                    %namespace, %source_namespace, %source_name,
                    "credential source secret absent; skipping pull-secret propagation"
                );
                return Ok(PropagationOutcome::SourceUnavailable);
            }
            Err(e) => {
                warn!(
                    %namespace, %source_namespace, %source_name, error = %e,
                    "failed to read credential source secret; skipping pull-secret propagation"
                );
                return Ok(PropagationOutcome::SourceUnavailable);
            }
        };

        let Some(token) = extract_token(&source) else {
            warn!(
                %namespace, %source_namespace, %source_name,
                "credential source secret has no password/token/value key; skipping"
            );
            return Ok(PropagationOutcome::SourceUnavailable);
        };
        let username = extract_username(&source).unwrap_or_else(|| "git".to_string());

        let dockerconfig = build_dockerconfigjson(&username, &token);

        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(PULL_SECRET_NAME.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(btreemap! {
                    MANAGED_BY_LABEL.to_string() => agent_name.to_string(),
                }),
                ..Default::default()
            },
            type_: Some("kubernetes.io/dockerconfigjson".to_string()),
            data: Some(btreemap! {
                ".dockerconfigjson".to_string() => ByteString(dockerconfig.into_bytes()),
            }),
            ..Default::default()
        };

        match local_api.create(&PostParams::default(), &secret).await {
            Ok(_) => {
                info!(%namespace, "created namespace-local image-pull credential");
                Ok(PropagationOutcome::Created)
            }
            Err(kube::Error::Api(e)) if e.code == 409 => {
                // Another reconcile raced us to create it; the invariant
                // ("never mutate after creation") holds regardless of who won.
                Ok(PropagationOutcome::AlreadyPresent)
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn extract_token(secret: &Secret) -> Option<String> {
    let data = secret.data.as_ref()?;
    for key in ["password", "token", "value"] {
        if let Some(ByteString(bytes)) = data.get(key) {
            return String::from_utf8(bytes.clone()).ok();
        }
    }
    None
}

fn extract_username(secret: &Secret) -> Option<String> {
    let data = secret.data.as_ref()?;
    let ByteString(bytes) = data.get("username")?;
    String::from_utf8(bytes.clone()).ok()
}

fn build_dockerconfigjson(username: &str, token: &str) -> String {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    let encoded_auth = STANDARD.encode(format!("{username}:{token}"));
    let mut auths: BTreeMap<&str, serde_json::Value> = BTreeMap::new();
    auths.insert(
        "ghcr.io",
        serde_json::json!({
            "username": username,
            "password": token,
            "auth": encoded_auth,
        }),
    );
    serde_json::json!({ "auths": auths }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_token_from_any_recognised_key() {
        for key in ["password", "token", "value"] {
            let secret = Secret {
                data: Some(btreemap! {
                    key.to_string() => ByteString(b"s3cr3t".to_vec()),
                }),
                ..Default::default()
            };
            assert_eq!(extract_token(&secret).as_deref(), Some("s3cr3t"));
        }
    }

    #[test]
    fn missing_token_keys_yield_none() {
        let secret = Secret {
            data: Some(btreemap! {
                "unrelated".to_string() => ByteString(b"x".to_vec()),
            }),
            ..Default::default()
        };
        assert_eq!(extract_token(&secret), None);
    }

    #[test]
    fn username_defaults_are_left_to_the_caller() {
        let secret = Secret::default();
        assert_eq!(extract_username(&secret), None);
    }

    #[test]
    fn dockerconfigjson_embeds_base64_auth() {
        let json = build_dockerconfigjson("git", "s3cr3t");
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["auths"]["ghcr.io"]["username"], "git");
        assert!(parsed["auths"]["ghcr.io"]["auth"].as_str().unwrap().len() > 0);
    }
}
