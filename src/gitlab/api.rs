use anyhow::Result;

use super::types::{Group, NewVariable, Project, User, Variable, VariableOwner, VariableUpdate};

/// Operations the variable commands need from a GitLab instance
#[async_trait::async_trait]
pub trait GitLabApi: Send + Sync {
    /// Look up a project by numeric id or `namespace/path`
    async fn get_project(&self, id_or_path: &str) -> Result<Project>;

    /// Look up a group by numeric id or path
    async fn get_group(&self, id_or_path: &str) -> Result<Group>;

    /// List all projects of a group
    async fn list_group_projects(&self, group_id: u64) -> Result<Vec<Project>>;

    /// List every variable of a project or group, in server order
    async fn list_variables(&self, owner: VariableOwner) -> Result<Vec<Variable>>;

    /// Create a project variable
    async fn create_variable(&self, project_id: u64, variable: &NewVariable) -> Result<Variable>;

    /// Replace the value of an existing project variable
    async fn update_variable(&self, project_id: u64, update: &VariableUpdate) -> Result<Variable>;

    /// Delete a project variable by key
    async fn delete_variable(&self, project_id: u64, key: &str) -> Result<()>;

    /// The user owning the credential
    async fn current_user(&self) -> Result<User>;

    /// Base URL of the instance for display purposes
    fn instance_url(&self) -> &str;
}
