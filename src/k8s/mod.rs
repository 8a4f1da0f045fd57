//! Kubernetes operations

pub mod client;
pub mod config_maps;
pub mod deployments;
pub mod kubectl;
pub mod namespaces;
pub mod secrets;
pub mod service_accounts;
pub mod services;

pub use client::create_client;

use kube::api::{PatchParams, PostParams};

use crate::utils::dryrun;

/// Field manager used for server-side apply
pub const FIELD_MANAGER: &str = "jx";

/// True when a kube error is an API 404
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(response) if response.code == 404)
}

/// Create parameters; the API server only validates in dry-run mode
pub fn post_params() -> PostParams {
    PostParams {
        dry_run: dryrun::is_dry_run(),
        ..Default::default()
    }
}

/// Server-side apply parameters owned by jx
pub fn apply_params() -> PatchParams {
    with_dry_run(PatchParams::apply(FIELD_MANAGER).force())
}

/// Parameters for JSON merge patches
pub fn merge_params() -> PatchParams {
    with_dry_run(PatchParams::default())
}

fn with_dry_run(params: PatchParams) -> PatchParams {
    if dryrun::is_dry_run() {
        params.dry_run()
    } else {
        params
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use http::{Request, Response};
    use kube::Client;
    use kube::client::Body;
    use tower_test::mock;

    pub type ApiServerHandle = mock::Handle<Request<Body>, Response<Body>>;

    /// A request the mock API server received
    pub struct Received {
        pub method: http::Method,
        pub path: String,
        pub body: serde_json::Value,
    }

    pub fn mock_client() -> (Client, ApiServerHandle) {
        let (mock_service, handle) = mock::pair::<Request<Body>, Response<Body>>();
        (Client::new(mock_service, "default"), handle)
    }

    /// Answer the next request with `status` and a JSON body
    pub async fn respond(
        handle: &mut ApiServerHandle,
        status: u16,
        body: serde_json::Value,
    ) -> Received {
        let (request, send) = handle.next_request().await.expect("service not called");
        let method = request.method().clone();
        let path = request.uri().path().to_string();
        let raw = request.into_body().collect_bytes().await.unwrap();
        let body_json = if raw.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&raw).expect("request body is json")
        };
        send.send_response(
            Response::builder()
                .status(status)
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
        );
        Received {
            method,
            path,
            body: body_json,
        }
    }

    pub fn not_found() -> serde_json::Value {
        serde_json::json!({
            "kind": "Status",
            "apiVersion": "v1",
            "metadata": {},
            "status": "Failure",
            "message": "not found",
            "reason": "NotFound",
            "code": 404
        })
    }
}
