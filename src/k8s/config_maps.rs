//! Exposecontroller and Knative ConfigMaps

use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::Client;
use kube::api::{Api, ObjectMeta, Patch};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

use super::is_not_found;

pub const EXPOSECONTROLLER_CONFIG_MAP: &str = "exposecontroller";
pub const EXPOSECONTROLLER_CONFIG_KEY: &str = "config.yml";

pub const KNATIVE_SERVING_NAMESPACE: &str = "knative-serving";
pub const KNATIVE_DOMAIN_CONFIG_MAP: &str = "config-domain";

/// The `config.yml` document Exposecontroller reads
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExposeControllerConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub domain: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub exposer: String,
    #[serde(default)]
    pub http: bool,
    #[serde(default, rename = "tls-acme")]
    pub tls_acme: bool,
    /// Settings jx does not manage, such as `urltemplate` or `pathMode`
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl ExposeControllerConfig {
    pub fn parse(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).context("failed to parse exposecontroller config.yml")
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("failed to render exposecontroller config.yml")
    }
}

/// Current Exposecontroller settings; `None` when the ConfigMap is absent
pub async fn get_exposecontroller_config(
    client: &Client,
    namespace: &str,
) -> Result<Option<ExposeControllerConfig>> {
    let api: Api<ConfigMap> = Api::namespaced(client.clone(), namespace);
    match api.get(EXPOSECONTROLLER_CONFIG_MAP).await {
        Ok(cm) => {
            let text = cm
                .data
                .as_ref()
                .and_then(|d| d.get(EXPOSECONTROLLER_CONFIG_KEY))
                .cloned()
                .unwrap_or_default();
            Ok(Some(ExposeControllerConfig::parse(&text)?))
        }
        Err(e) if is_not_found(&e) => Ok(None),
        Err(e) => Err(e).context("failed to get exposecontroller config map"),
    }
}

/// Write Exposecontroller settings, creating the ConfigMap when needed
pub async fn update_exposecontroller_config(
    client: &Client,
    namespace: &str,
    config: &ExposeControllerConfig,
) -> Result<()> {
    let api: Api<ConfigMap> = Api::namespaced(client.clone(), namespace);
    let cm = json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": { "name": EXPOSECONTROLLER_CONFIG_MAP, "namespace": namespace },
        "data": { EXPOSECONTROLLER_CONFIG_KEY: config.to_yaml()? }
    });
    api.patch(
        EXPOSECONTROLLER_CONFIG_MAP,
        &super::apply_params(),
        &Patch::Apply(&cm),
    )
    .await
    .context("failed to update exposecontroller config map")?;
    Ok(())
}

/// Create the ConfigMap with `data` unless it exists; returns whether it was created
pub async fn create_config_map_if_missing(
    client: &Client,
    namespace: &str,
    name: &str,
    data: BTreeMap<String, String>,
) -> Result<bool> {
    let api: Api<ConfigMap> = Api::namespaced(client.clone(), namespace);
    match api.get(name).await {
        Ok(_) => return Ok(false),
        Err(e) if is_not_found(&e) => {}
        Err(e) => return Err(e).with_context(|| format!("failed to get config map {}/{}", namespace, name)),
    }
    let cm = ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    };
    api.create(&super::post_params(), &cm)
        .await
        .with_context(|| format!("failed to create config map {}/{}", namespace, name))?;
    Ok(true)
}

/// Make `domain` the default Knative Serving domain
pub async fn set_knative_domain(client: &Client, domain: &str) -> Result<()> {
    let api: Api<ConfigMap> = Api::namespaced(client.clone(), KNATIVE_SERVING_NAMESPACE);
    let patch = json!({ "data": { domain: "" } });
    api.patch(
        KNATIVE_DOMAIN_CONFIG_MAP,
        &super::merge_params(),
        &Patch::Merge(&patch),
    )
    .await
    .with_context(|| format!("failed to set knative domain {}", domain))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::testing::{mock_client, not_found, respond};

    #[test]
    fn test_parse_exposecontroller_config() {
        let config = ExposeControllerConfig::parse(
            "domain: 1.2.3.4.nip.io\nexposer: Ingress\nhttp: true\ntls-acme: false\n",
        )
        .unwrap();
        assert_eq!(
            config,
            ExposeControllerConfig {
                domain: "1.2.3.4.nip.io".into(),
                exposer: "Ingress".into(),
                http: true,
                tls_acme: false,
                extra: BTreeMap::new(),
            }
        );
        assert_eq!(ExposeControllerConfig::parse("").unwrap(), ExposeControllerConfig::default());
    }

    #[test]
    fn test_unmanaged_settings_survive_rewrite() {
        let mut config = ExposeControllerConfig::parse(
            "domain: old.nip.io\nexposer: Ingress\nurltemplate: '{{.Service}}.{{.Domain}}'\npathMode: path\n",
        )
        .unwrap();
        config.domain = "35.1.2.3.nip.io".into();

        let text = config.to_yaml().unwrap();
        let reread = ExposeControllerConfig::parse(&text).unwrap();
        assert_eq!(reread.domain, "35.1.2.3.nip.io");
        assert_eq!(
            reread.extra.get("urltemplate").and_then(|v| v.as_str()),
            Some("{{.Service}}.{{.Domain}}")
        );
        assert_eq!(reread.extra.get("pathMode").and_then(|v| v.as_str()), Some("path"));
        assert!(!reread.extra.contains_key("domain"));
    }

    #[test]
    fn test_render_uses_tls_acme_key() {
        let config = ExposeControllerConfig {
            tls_acme: true,
            ..Default::default()
        };
        assert!(config.to_yaml().unwrap().contains("tls-acme: true"));
    }

    #[tokio::test]
    async fn test_missing_exposecontroller_config() {
        let (client, mut handle) = mock_client();
        let server = tokio::spawn(async move {
            let req = respond(&mut handle, 404, not_found()).await;
            assert_eq!(req.path, "/api/v1/namespaces/jx/configmaps/exposecontroller");
        });

        assert_eq!(get_exposecontroller_config(&client, "jx").await.unwrap(), None);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_update_exposecontroller_config() {
        let (client, mut handle) = mock_client();
        let server = tokio::spawn(async move {
            let req = respond(
                &mut handle,
                200,
                json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "exposecontroller", "namespace": "jx"}}),
            )
            .await;
            assert_eq!(req.method, http::Method::PATCH);
            let text = req.body["data"]["config.yml"].as_str().unwrap().to_string();
            let config = ExposeControllerConfig::parse(&text).unwrap();
            assert_eq!(config.domain, "35.1.2.3.nip.io");
            assert_eq!(config.exposer, "Ingress");
        });

        let config = ExposeControllerConfig {
            domain: "35.1.2.3.nip.io".into(),
            exposer: "Ingress".into(),
            http: true,
            ..Default::default()
        };
        update_exposecontroller_config(&client, "jx", &config).await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_create_config_map_if_missing() {
        let (client, mut handle) = mock_client();
        let server = tokio::spawn(async move {
            let get = respond(&mut handle, 404, not_found()).await;
            assert_eq!(get.path, "/api/v1/namespaces/jx/configmaps/config");
            let create = respond(
                &mut handle,
                201,
                json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "config", "namespace": "jx"}}),
            )
            .await;
            assert_eq!(create.method, http::Method::POST);
            assert_eq!(create.path, "/api/v1/namespaces/jx/configmaps");
            assert_eq!(create.body["metadata"]["name"], "config");
            assert_eq!(create.body["data"]["config.yaml"], "tide: {}\n");
        });

        let data = BTreeMap::from([("config.yaml".to_string(), "tide: {}\n".to_string())]);
        assert!(create_config_map_if_missing(&client, "jx", "config", data).await.unwrap());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_existing_config_map_is_left_alone() {
        let (client, mut handle) = mock_client();
        let server = tokio::spawn(async move {
            respond(
                &mut handle,
                200,
                json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "config", "namespace": "jx"}}),
            )
            .await;
        });

        assert!(!create_config_map_if_missing(&client, "jx", "config", BTreeMap::new()).await.unwrap());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_set_knative_domain() {
        let (client, mut handle) = mock_client();
        let server = tokio::spawn(async move {
            let req = respond(
                &mut handle,
                200,
                json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "config-domain", "namespace": "knative-serving"}}),
            )
            .await;
            assert_eq!(req.path, "/api/v1/namespaces/knative-serving/configmaps/config-domain");
            assert_eq!(req.body, json!({"data": {"35.1.2.3.nip.io": ""}}));
        });

        set_knative_domain(&client, "35.1.2.3.nip.io").await.unwrap();
        server.await.unwrap();
    }
}
