//! Kubernetes service accounts and their role bindings

use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::{ClusterRoleBinding, RoleBinding};
use kube::Client;
use kube::api::{Api, Patch};
use serde_json::json;

use super::is_not_found;

/// Create the ServiceAccount unless it already exists.
/// Returns true when it was created.
pub async fn create_service_account(client: &Client, namespace: &str, name: &str) -> Result<bool> {
    let api: Api<ServiceAccount> = Api::namespaced(client.clone(), namespace);
    match api.get(name).await {
        Ok(_) => Ok(false),
        Err(e) if is_not_found(&e) => {
            let sa: ServiceAccount = serde_json::from_value(json!({
                "apiVersion": "v1",
                "kind": "ServiceAccount",
                "metadata": { "name": name, "namespace": namespace }
            }))?;
            api.create(&super::post_params(), &sa)
                .await
                .with_context(|| format!("failed to create service account {}/{}", namespace, name))?;
            Ok(true)
        }
        Err(e) => Err(e).with_context(|| format!("failed to get service account {}/{}", namespace, name)),
    }
}

/// Name of the binding created for `sa` and `role`
pub fn binding_name(sa: &str, role: &str) -> String {
    format!("{}-{}", sa, role)
}

/// Bind `role` to the service account; `cluster` selects a ClusterRole
/// and ClusterRoleBinding. Applying again is a no-op.
pub async fn bind_role(
    client: &Client,
    namespace: &str,
    sa: &str,
    role: &str,
    cluster: bool,
) -> Result<String> {
    let name = binding_name(sa, role);
    let subjects = json!([{ "kind": "ServiceAccount", "name": sa, "namespace": namespace }]);
    let params = super::apply_params();

    if cluster {
        let api: Api<ClusterRoleBinding> = Api::all(client.clone());
        let binding = json!({
            "apiVersion": "rbac.authorization.k8s.io/v1",
            "kind": "ClusterRoleBinding",
            "metadata": { "name": name },
            "roleRef": { "apiGroup": "rbac.authorization.k8s.io", "kind": "ClusterRole", "name": role },
            "subjects": subjects
        });
        api.patch(&name, &params, &Patch::Apply(&binding))
            .await
            .with_context(|| format!("failed to bind cluster role {} to {}", role, sa))?;
    } else {
        let api: Api<RoleBinding> = Api::namespaced(client.clone(), namespace);
        let binding = json!({
            "apiVersion": "rbac.authorization.k8s.io/v1",
            "kind": "RoleBinding",
            "metadata": { "name": name, "namespace": namespace },
            "roleRef": { "apiGroup": "rbac.authorization.k8s.io", "kind": "Role", "name": role },
            "subjects": subjects
        });
        api.patch(&name, &params, &Patch::Apply(&binding))
            .await
            .with_context(|| format!("failed to bind role {} to {}", role, sa))?;
    }
    Ok(name)
}
