use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;

use super::types::*;
use crate::utils::dryrun;

pub const DEFAULT_API_URL: &str = "https://api.codeship.com/v2";

/// UUID reported for projects that were not created because of dry-run
pub const DRY_RUN_PROJECT_UUID: &str = "dry-run";

#[derive(Error, Debug)]
pub enum CodeshipError {
    #[error("codeship request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("codeship API returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("codeship organization '{0}' not found for this user")]
    OrganizationNotFound(String),
}

/// Authenticated Codeship session
#[derive(Debug, Clone)]
pub struct CodeshipClient {
    http: Client,
    base_url: String,
    token: String,
    organizations: Vec<Organization>,
}

impl CodeshipClient {
    /// Exchange basic credentials for an access token
    pub async fn authenticate(base_url: &str, username: &str, password: &str) -> Result<Self, CodeshipError> {
        let http = Client::new();
        let base_url = base_url.trim_end_matches('/').to_string();
        let request = http
            .post(format!("{}/auth", base_url))
            .basic_auth(username, Some(password))
            .header("Content-Type", "application/json");
        let auth: AuthResponse = send_json(request).await?;
        Ok(Self {
            http,
            base_url,
            token: auth.access_token,
            organizations: auth.organizations,
        })
    }

    pub fn organizations(&self) -> &[Organization] {
        &self.organizations
    }

    /// Organization the user belongs to, matched case-insensitively by name
    pub fn organization(&self, name: &str) -> Result<Organization, CodeshipError> {
        self.organizations
            .iter()
            .find(|o| o.name.eq_ignore_ascii_case(name))
            .cloned()
            .ok_or_else(|| CodeshipError::OrganizationNotFound(name.to_string()))
    }

    fn url(&self, org: &Organization, path: &str) -> String {
        format!("{}/organizations/{}/projects{}", self.base_url, org.uuid, path)
    }

    pub async fn list_projects(&self, org: &Organization) -> Result<Vec<Project>, CodeshipError> {
        let request = self.http.get(self.url(org, "")).bearer_auth(&self.token);
        let list: ProjectList = send_json(request).await?;
        Ok(list.projects)
    }

    /// UUID of the project named `<org_name>/<repo>`, if it exists
    pub async fn project_exists(
        &self,
        org: &Organization,
        org_name: &str,
        repo: &str,
    ) -> Result<Option<String>, CodeshipError> {
        let name = format!("{}/{}", org_name, repo);
        let found = self
            .list_projects(org)
            .await?
            .into_iter()
            .find(|p| p.name == name)
            .map(|p| p.uuid);
        if found.is_some() {
            crate::log_info!("Project {} already exists", crate::utils::logger::info(&name));
        }
        Ok(found)
    }

    pub async fn create_project(
        &self,
        org: &Organization,
        request: &ProjectCreateRequest,
    ) -> Result<Project, CodeshipError> {
        if dryrun::is_dry_run() {
            dryrun::log_action(&format!("create Codeship project for {}", request.repository_url));
            return Ok(Project {
                uuid: DRY_RUN_PROJECT_UUID.to_string(),
                repository_url: request.repository_url.clone(),
                organization_uuid: org.uuid.clone(),
                project_type: request.project_type,
                ..Default::default()
            });
        }
        let builder = self.http.post(self.url(org, "")).bearer_auth(&self.token).json(request);
        let response: ProjectResponse = send_json(builder).await?;
        Ok(response.project)
    }

    pub async fn update_project(
        &self,
        org: &Organization,
        uuid: &str,
        request: &ProjectUpdateRequest,
    ) -> Result<Project, CodeshipError> {
        if dryrun::is_dry_run() {
            dryrun::log_action(&format!("update Codeship project {}", uuid));
            return Ok(Project {
                uuid: uuid.to_string(),
                organization_uuid: org.uuid.clone(),
                project_type: request.project_type,
                ..Default::default()
            });
        }
        let builder = self
            .http
            .put(self.url(org, &format!("/{}", uuid)))
            .bearer_auth(&self.token)
            .json(request);
        let response: ProjectResponse = send_json(builder).await?;
        Ok(response.project)
    }

    /// Trigger a build of `git_ref`, e.g. `heads/master`
    pub async fn create_build(&self, org: &Organization, uuid: &str, git_ref: &str) -> Result<(), CodeshipError> {
        if dryrun::is_dry_run() {
            dryrun::log_action(&format!("trigger Codeship build of {} for project {}", git_ref, uuid));
            return Ok(());
        }
        let body = BuildRequest { git_ref, commit_sha: "" };
        let response = self
            .http
            .post(self.url(org, &format!("/{}/builds", uuid)))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, CodeshipError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(CodeshipError::Api { status, body })
}

async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, CodeshipError> {
    let response = check_status(request.send().await?).await?;
    Ok(response.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn auth_mock(server: &MockServer) -> httpmock::Mock<'_> {
        server.mock(|when, then| {
            when.method(POST)
                .path("/v2/auth")
                .header("authorization", "Basic dXNlcjpwYXNz");
            then.status(200).json_body(json!({
                "access_token": "token-123",
                "organizations": [{"uuid": "org-uuid", "name": "Jenkins-X", "scopes": ["project.read"]}]
            }));
        })
    }

    async fn client(server: &MockServer) -> CodeshipClient {
        CodeshipClient::authenticate(&server.url("/v2"), "user", "pass")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_authenticate_and_pick_organization() {
        let server = MockServer::start();
        let auth = auth_mock(&server);

        let cs = client(&server).await;
        auth.assert();
        assert_eq!(cs.organizations().len(), 1);
        assert_eq!(cs.organization("jenkins-x").unwrap().uuid, "org-uuid");
        assert!(matches!(
            cs.organization("other"),
            Err(CodeshipError::OrganizationNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_authentication_failure() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/v2/auth");
            then.status(401).body("unauthorized");
        });

        let err = CodeshipClient::authenticate(&server.url("/v2"), "user", "bad")
            .await
            .unwrap_err();
        match err {
            CodeshipError::Api { status, body } => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert_eq!(body, "unauthorized");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_project_exists() {
        let server = MockServer::start();
        auth_mock(&server);
        let list = server.mock(|when, then| {
            when.method(GET)
                .path("/v2/organizations/org-uuid/projects")
                .header("authorization", "Bearer token-123");
            then.status(200).json_body(json!({
                "projects": [
                    {"uuid": "p1", "name": "jenkins-x/other"},
                    {"uuid": "p2", "name": "jenkins-x/organisation-acme"}
                ]
            }));
        });

        let cs = client(&server).await;
        let org = cs.organization("jenkins-x").unwrap();
        let uuid = cs
            .project_exists(&org, "jenkins-x", "organisation-acme")
            .await
            .unwrap();
        list.assert();
        assert_eq!(uuid, Some("p2".to_string()));

        let missing = cs.project_exists(&org, "jenkins-x", "nope").await.unwrap();
        assert_eq!(missing, None);
    }

    #[tokio::test]
    async fn test_create_project_and_build() {
        let _guard = crate::utils::env_lock();
        let server = MockServer::start();
        auth_mock(&server);
        let create = server.mock(|when, then| {
            when.method(POST)
                .path("/v2/organizations/org-uuid/projects")
                .json_body(json!({
                    "type": "basic",
                    "repository_url": "git@github.com:acme/organisation-acme",
                    "setup_commands": ["./build.sh"],
                    "environment_variables": [{"name": "ORG", "value": "acme"}]
                }));
            then.status(200).json_body(json!({
                "project": {"uuid": "new-uuid", "name": "acme/organisation-acme", "type": "basic"}
            }));
        });
        let build = server.mock(|when, then| {
            when.method(POST)
                .path("/v2/organizations/org-uuid/projects/new-uuid/builds")
                .json_body(json!({"ref": "heads/master"}));
            then.status(202);
        });

        let cs = client(&server).await;
        let org = cs.organization("Jenkins-X").unwrap();
        let request = ProjectCreateRequest {
            project_type: ProjectType::Basic,
            repository_url: "git@github.com:acme/organisation-acme".into(),
            setup_commands: vec!["./build.sh".into()],
            environment_variables: vec![EnvironmentVariable::new("ORG", "acme")],
        };
        let project = cs.create_project(&org, &request).await.unwrap();
        create.assert();
        assert_eq!(project.uuid, "new-uuid");

        cs.create_build(&org, &project.uuid, "heads/master").await.unwrap();
        build.assert();
    }

    #[tokio::test]
    async fn test_mutations_skipped_in_dry_run() {
        let _guard = crate::utils::env_lock();
        let server = MockServer::start();
        auth_mock(&server);
        let create = server.mock(|when, then| {
            when.method(POST).path("/v2/organizations/org-uuid/projects");
            then.status(200).json_body(json!({"project": {"uuid": "new-uuid"}}));
        });
        let update = server.mock(|when, then| {
            when.method(PUT).path("/v2/organizations/org-uuid/projects/p2");
            then.status(200).json_body(json!({"project": {"uuid": "p2"}}));
        });
        let build = server.mock(|when, then| {
            when.method(POST).path_contains("/builds");
            then.status(202);
        });

        let cs = client(&server).await;
        let org = cs.organization("jenkins-x").unwrap();

        unsafe { std::env::set_var(dryrun::DRY_RUN_ENV, "1") };
        let request = ProjectCreateRequest {
            repository_url: "git@github.com:acme/organisation-acme".into(),
            ..Default::default()
        };
        let created = cs.create_project(&org, &request).await;
        let updated = cs.update_project(&org, "p2", &ProjectUpdateRequest::default()).await;
        let built = cs.create_build(&org, "p2", "heads/master").await;
        unsafe { std::env::remove_var(dryrun::DRY_RUN_ENV) };

        let created = created.unwrap();
        assert_eq!(created.uuid, DRY_RUN_PROJECT_UUID);
        assert_eq!(created.repository_url, "git@github.com:acme/organisation-acme");
        assert_eq!(updated.unwrap().uuid, "p2");
        assert!(built.is_ok());
        create.assert_hits(0);
        update.assert_hits(0);
        build.assert_hits(0);
    }

    #[tokio::test]
    async fn test_update_project() {
        let _guard = crate::utils::env_lock();
        let server = MockServer::start();
        auth_mock(&server);
        let update = server.mock(|when, then| {
            when.method(PUT).path("/v2/organizations/org-uuid/projects/p2");
            then.status(200)
                .json_body(json!({"project": {"uuid": "p2", "name": "acme/organisation-acme"}}));
        });

        let cs = client(&server).await;
        let org = cs.organization("jenkins-x").unwrap();
        let project = cs
            .update_project(&org, "p2", &ProjectUpdateRequest::default())
            .await
            .unwrap();
        update.assert();
        assert_eq!(project.name, "acme/organisation-acme");
    }
}
