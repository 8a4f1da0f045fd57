//! Service addresses, URLs and Exposecontroller annotations

use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::Service;
use kube::Client;
use kube::api::{Api, Patch};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::utils::progress::WaitProgress;
use crate::utils::wait::poll_until;

/// Label asking Exposecontroller to create an Ingress for the Service
pub const EXPOSE_LABEL: &str = "fabric8.io/expose";
/// Annotation Exposecontroller records the public URL in
pub const EXPOSE_URL_ANNOTATION: &str = "fabric8.io/exposeUrl";

/// Whether the LoadBalancer has published an IP or hostname
pub fn has_external_address(svc: &Service) -> bool {
    external_address(svc).is_some()
}

/// LoadBalancer address, IP preferred over hostname; the last ingress entry wins
pub fn external_address(svc: &Service) -> Option<String> {
    let ingresses = svc
        .status
        .as_ref()?
        .load_balancer
        .as_ref()?
        .ingress
        .as_ref()?;

    let mut answer = None;
    for ing in ingresses {
        if let Some(ip) = ing.ip.as_deref().filter(|ip| !ip.is_empty()) {
            answer = Some(ip.to_string());
        } else if let Some(host) = ing.hostname.as_deref().filter(|h| !h.is_empty()) {
            answer = Some(host.to_string());
        }
    }
    answer
}

/// Public URL: the exposeUrl annotation, else the LoadBalancer address
pub fn service_url(svc: &Service) -> Option<String> {
    if let Some(url) = svc
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(EXPOSE_URL_ANNOTATION))
        .filter(|u| !u.is_empty())
    {
        return Some(url.clone());
    }

    let spec = svc.spec.as_ref()?;
    if spec.type_.as_deref() != Some("LoadBalancer") {
        return None;
    }
    let address = external_address(svc)?;
    let secure = spec
        .ports
        .as_ref()
        .map(|ports| ports.iter().any(|p| p.port == 443))
        .unwrap_or(false);
    let scheme = if secure { "https" } else { "http" };
    Some(format!("{}://{}/", scheme, address))
}

/// Poll the Service until its LoadBalancer has an address.
///
/// Get errors are logged and polling continues; `None` once `timeout` passes.
pub async fn wait_for_external_ip(
    client: &Client,
    name: &str,
    namespace: &str,
    timeout: Duration,
    interval: Duration,
) -> Option<String> {
    let services: Api<Service> = Api::namespaced(client.clone(), namespace);
    let progress = WaitProgress::new(&format!("service/{}", name), "assigned an external IP");
    let what = format!("external IP of service {}/{}", namespace, name);

    let result = poll_until(&what, timeout, interval, || {
        let services = services.clone();
        async move {
            match services.get(name).await {
                Ok(svc) => Ok(external_address(&svc)),
                Err(e) => {
                    crate::log_warn!("Failed to get service {}/{}: {}", namespace, name, e);
                    Ok(None)
                }
            }
        }
    })
    .await;

    match result {
        Ok(address) => {
            progress.finish_success();
            Some(address)
        }
        Err(e) => {
            progress.finish_error(&e.to_string());
            None
        }
    }
}

pub async fn get_service(client: &Client, namespace: &str, name: &str) -> Result<Service> {
    let services: Api<Service> = Api::namespaced(client.clone(), namespace);
    services
        .get(name)
        .await
        .with_context(|| format!("failed to get service {}/{}", namespace, name))
}

/// Merge `annotations` into the Service's annotations
pub async fn annotate_service(
    client: &Client,
    namespace: &str,
    name: &str,
    annotations: &BTreeMap<String, String>,
) -> Result<Service> {
    let services: Api<Service> = Api::namespaced(client.clone(), namespace);
    let patch = json!({ "metadata": { "annotations": annotations } });
    services
        .patch(name, &super::merge_params(), &Patch::Merge(&patch))
        .await
        .with_context(|| format!("failed to annotate service {}/{}", namespace, name))
}

/// Label the Service so Exposecontroller creates an Ingress for it
pub async fn expose_service(client: &Client, namespace: &str, name: &str) -> Result<Service> {
    let services: Api<Service> = Api::namespaced(client.clone(), namespace);
    let patch = json!({ "metadata": { "labels": { EXPOSE_LABEL: "true" } } });
    services
        .patch(name, &super::merge_params(), &Patch::Merge(&patch))
        .await
        .with_context(|| format!("failed to expose service {}/{}", namespace, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::testing::{mock_client, not_found, respond};

    fn service(svc_type: &str, port: i32, ingress: serde_json::Value) -> serde_json::Value {
        json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": {"name": "hook", "namespace": "jx"},
            "spec": {"type": svc_type, "ports": [{"port": port}]},
            "status": {"loadBalancer": {"ingress": ingress}}
        })
    }

    fn parse(value: serde_json::Value) -> Service {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_external_address_prefers_ip() {
        let svc = parse(service(
            "LoadBalancer",
            80,
            json!([{"ip": "1.2.3.4", "hostname": "lb.example.com"}]),
        ));
        assert_eq!(external_address(&svc), Some("1.2.3.4".to_string()));
        assert!(has_external_address(&svc));
    }

    #[test]
    fn test_external_address_last_entry_wins() {
        let svc = parse(service(
            "LoadBalancer",
            80,
            json!([{"ip": "1.2.3.4"}, {"hostname": "lb.example.com"}]),
        ));
        assert_eq!(external_address(&svc), Some("lb.example.com".to_string()));
    }

    #[test]
    fn test_no_external_address() {
        let svc = parse(service("LoadBalancer", 80, json!([])));
        assert!(!has_external_address(&svc));
        assert!(!has_external_address(&Service::default()));
    }

    #[test]
    fn test_service_url() {
        let svc = parse(service("LoadBalancer", 443, json!([{"ip": "1.2.3.4"}])));
        assert_eq!(service_url(&svc), Some("https://1.2.3.4/".to_string()));

        let svc = parse(service("LoadBalancer", 80, json!([{"ip": "1.2.3.4"}])));
        assert_eq!(service_url(&svc), Some("http://1.2.3.4/".to_string()));

        let svc = parse(service("ClusterIP", 80, json!([])));
        assert_eq!(service_url(&svc), None);

        let mut svc = parse(service("ClusterIP", 80, json!([])));
        svc.metadata.annotations = Some(BTreeMap::from([(
            EXPOSE_URL_ANNOTATION.to_string(),
            "http://hook.jx.example.com".to_string(),
        )]));
        assert_eq!(service_url(&svc), Some("http://hook.jx.example.com".to_string()));
    }

    #[tokio::test]
    async fn test_wait_for_external_ip_tolerates_errors() {
        let (client, mut handle) = mock_client();
        let server = tokio::spawn(async move {
            respond(&mut handle, 404, not_found()).await;
            respond(&mut handle, 200, service("LoadBalancer", 80, json!([]))).await;
            let req = respond(
                &mut handle,
                200,
                service("LoadBalancer", 80, json!([{"ip": "35.1.2.3"}])),
            )
            .await;
            assert_eq!(req.path, "/api/v1/namespaces/istio-system/services/istio-ingressgateway");
        });

        let ip = wait_for_external_ip(
            &client,
            "istio-ingressgateway",
            "istio-system",
            Duration::from_secs(10),
            Duration::from_millis(5),
        )
        .await;
        server.await.unwrap();
        assert_eq!(ip, Some("35.1.2.3".to_string()));
    }

    #[tokio::test]
    async fn test_annotate_service_sends_merge_patch() {
        let (client, mut handle) = mock_client();
        let server = tokio::spawn(async move {
            let req = respond(&mut handle, 200, service("ClusterIP", 80, json!([]))).await;
            assert_eq!(req.method, http::Method::PATCH);
            assert_eq!(req.path, "/api/v1/namespaces/jx/services/hook");
            assert_eq!(
                req.body,
                json!({"metadata": {"annotations": {"fabric8.io/exposeUrl": "http://hook"}}})
            );
        });

        let annotations = BTreeMap::from([(
            EXPOSE_URL_ANNOTATION.to_string(),
            "http://hook".to_string(),
        )]);
        annotate_service(&client, "jx", "hook", &annotations)
            .await
            .unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_expose_service_sets_label() {
        let (client, mut handle) = mock_client();
        let server = tokio::spawn(async move {
            let req = respond(&mut handle, 200, service("ClusterIP", 80, json!([]))).await;
            assert_eq!(req.body, json!({"metadata": {"labels": {"fabric8.io/expose": "true"}}}));
        });

        expose_service(&client, "jx", "hook").await.unwrap();
        server.await.unwrap();
    }
}
