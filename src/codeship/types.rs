use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Organization {
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct AuthResponse {
    pub access_token: String,
    #[serde(default)]
    pub organizations: Vec<Organization>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ProjectType {
    #[default]
    Basic,
    Pro,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnvironmentVariable {
    pub name: String,
    pub value: String,
}

impl EnvironmentVariable {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Project {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub repository_url: String,
    #[serde(default)]
    pub organization_uuid: String,
    #[serde(rename = "type", default)]
    pub project_type: ProjectType,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProjectCreateRequest {
    #[serde(rename = "type")]
    pub project_type: ProjectType,
    pub repository_url: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub setup_commands: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub environment_variables: Vec<EnvironmentVariable>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProjectUpdateRequest {
    #[serde(rename = "type")]
    pub project_type: ProjectType,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub setup_commands: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub environment_variables: Vec<EnvironmentVariable>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ProjectList {
    #[serde(default)]
    pub projects: Vec<Project>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ProjectResponse {
    pub project: Project,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct BuildRequest<'a> {
    #[serde(rename = "ref")]
    pub git_ref: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub commit_sha: &'a str,
}
