//! Secret reads

use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::Secret;
use kube::Client;
use kube::api::Api;

use super::is_not_found;

/// Decoded value of `key` in the Secret; `None` when the Secret or key is absent
pub async fn secret_value(
    client: &Client,
    namespace: &str,
    name: &str,
    key: &str,
) -> Result<Option<String>> {
    let api: Api<Secret> = Api::namespaced(client.clone(), namespace);
    let secret = match api.get(name).await {
        Ok(s) => s,
        Err(e) if is_not_found(&e) => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("failed to get secret {}/{}", namespace, name)),
    };
    let Some(bytes) = secret.data.as_ref().and_then(|d| d.get(key)) else {
        return Ok(None);
    };
    let value = String::from_utf8(bytes.0.clone())
        .with_context(|| format!("secret {}/{} key {} is not UTF-8", namespace, name, key))?;
    Ok(Some(value))
}
