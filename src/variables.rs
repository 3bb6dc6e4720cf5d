use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::export::Exporter;
use crate::gitlab::{GitLabApi, Project, Variable, VariableOwner};
use crate::resolver::{self, FilterSpec, SetAction};

/// Result of a `set`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetOutcome {
    Created(Variable),
    Updated(Variable),
}

async fn filtered_project_variables(
    api: &dyn GitLabApi,
    project: &str,
    spec: &FilterSpec,
) -> Result<(Project, Vec<Variable>)> {
    let project = api
        .get_project(project)
        .await
        .with_context(|| format!("Failed to look up project {}", project))?;
    info!(
        "Project Id: {}, Namespace: {}",
        project.id, project.path_with_namespace
    );

    let variables = api
        .list_variables(VariableOwner::Project(project.id))
        .await
        .context("Failed to list project variables")?;

    let matches = resolver::filter(&variables, spec);
    debug!(
        "{} of {} variables match {:?}",
        matches.len(),
        variables.len(),
        spec
    );
    Ok((project, matches))
}

/// Variables of a project matching the filter
pub async fn get_variables(
    api: &dyn GitLabApi,
    project: &str,
    spec: &FilterSpec,
) -> Result<Vec<Variable>> {
    let (_, matches) = filtered_project_variables(api, project, spec).await?;
    Ok(resolver::resolve_get(matches))
}

/// Create a variable, or update the value of the one variable matching the
/// key and the optional scope/protected filters.
///
/// Nothing is written when more than one variable matches.
pub async fn set_variable(
    api: &dyn GitLabApi,
    project: &str,
    key: &str,
    value: &str,
    environment_scope: Option<&str>,
    protected: Option<bool>,
) -> Result<SetOutcome> {
    let spec = FilterSpec::new([key], environment_scope.map(str::to_string), protected);
    let (project, matches) = filtered_project_variables(api, project, &spec).await?;

    match resolver::resolve_set(&matches, key, value, protected, environment_scope)? {
        SetAction::Create(new_variable) => {
            let created = api
                .create_variable(project.id, &new_variable)
                .await
                .with_context(|| format!("Failed to create variable {}", key))?;
            Ok(SetOutcome::Created(created))
        }
        SetAction::Update(update) => {
            let updated = api
                .update_variable(project.id, &update)
                .await
                .with_context(|| format!("Failed to update variable {}", key))?;
            Ok(SetOutcome::Updated(updated))
        }
    }
}

/// Delete every project variable matching the filter; returns the count
pub async fn delete_variables(
    api: &dyn GitLabApi,
    project: &str,
    spec: &FilterSpec,
) -> Result<usize> {
    let (project, matches) = filtered_project_variables(api, project, spec).await?;
    let actions = resolver::resolve_delete(&matches);

    for action in &actions {
        api.delete_variable(project.id, &action.key)
            .await
            .with_context(|| format!("Failed to delete variable {}", action.key))?;
    }

    info!(
        "Deleted {} variables: {:?}",
        actions.len(),
        actions.iter().map(|a| a.key.as_str()).collect::<Vec<_>>()
    );
    Ok(actions.len())
}

async fn export_project_variables(
    api: &dyn GitLabApi,
    exporter: &Exporter,
    project: &Project,
) -> Result<usize> {
    info!(
        "Project Id: {}, Namespace: {}",
        project.id, project.path_with_namespace
    );
    let owner = VariableOwner::Project(project.id);
    let variables = api
        .list_variables(owner)
        .await
        .with_context(|| format!("Failed to list variables of {}", project.path_with_namespace))?;

    exporter.export(owner, &project.path_with_namespace, &variables)?;
    info!("exported {} secret variables.", variables.len());
    Ok(variables.len())
}

/// Export all variables of a project; returns the count
pub async fn export_project(api: &dyn GitLabApi, exporter: &Exporter, project: &str) -> Result<usize> {
    let project = api
        .get_project(project)
        .await
        .with_context(|| format!("Failed to look up project {}", project))?;
    export_project_variables(api, exporter, &project).await
}

/// Export the variables of a group and, with `include_projects`, of each of
/// its projects as separate documents. Returns the total count.
pub async fn export_group(
    api: &dyn GitLabApi,
    exporter: &Exporter,
    group: &str,
    include_projects: bool,
) -> Result<usize> {
    let group = api
        .get_group(group)
        .await
        .with_context(|| format!("Failed to look up group {}", group))?;
    let owner = VariableOwner::Group(group.id);

    let variables = api
        .list_variables(owner)
        .await
        .with_context(|| format!("Failed to list variables of group {}", group.namespace()))?;
    debug!("Group variables: {}", variables.len());
    exporter.export(owner, group.namespace(), &variables)?;
    let mut total = variables.len();

    if include_projects {
        let projects = api
            .list_group_projects(group.id)
            .await
            .with_context(|| format!("Failed to list projects of group {}", group.namespace()))?;
        for project in &projects {
            total += export_project_variables(api, exporter, project).await?;
        }
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{exit_code_for, SvmError, EXIT_AMBIGUOUS};
    use crate::export::{Destination, ExportFormat};
    use crate::gitlab::{Group, NewVariable, User, VariableUpdate};
    use anyhow::bail;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Create(u64, NewVariable),
        Update(u64, VariableUpdate),
        Delete(u64, String),
    }

    /// In-memory GitLab holding one group with one project
    struct FakeGitLab {
        project: Project,
        group: Group,
        project_variables: Vec<Variable>,
        group_variables: Vec<Variable>,
        calls: Mutex<Vec<Call>>,
    }

    impl FakeGitLab {
        fn new(project_variables: Vec<Variable>) -> Self {
            Self {
                project: Project {
                    id: 42,
                    path_with_namespace: "myorg/mysubgroup/myproject".to_string(),
                },
                group: Group {
                    id: 7,
                    path: "myorg".to_string(),
                    full_path: Some("myorg".to_string()),
                },
                project_variables,
                group_variables: vec![variable("G1", "g", false, "*")],
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl GitLabApi for FakeGitLab {
        async fn get_project(&self, id_or_path: &str) -> Result<Project> {
            if id_or_path == self.project.path_with_namespace || id_or_path == "42" {
                Ok(self.project.clone())
            } else {
                Err(SvmError::Api {
                    status: 404,
                    body: "404 Project Not Found".to_string(),
                }
                .into())
            }
        }

        async fn get_group(&self, id_or_path: &str) -> Result<Group> {
            if id_or_path == self.group.path {
                Ok(self.group.clone())
            } else {
                bail!("unknown group {}", id_or_path)
            }
        }

        async fn list_group_projects(&self, _group_id: u64) -> Result<Vec<Project>> {
            Ok(vec![self.project.clone()])
        }

        async fn list_variables(&self, owner: VariableOwner) -> Result<Vec<Variable>> {
            Ok(match owner {
                VariableOwner::Project(_) => self.project_variables.clone(),
                VariableOwner::Group(_) => self.group_variables.clone(),
            })
        }

        async fn create_variable(&self, project_id: u64, variable: &NewVariable) -> Result<Variable> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Create(project_id, variable.clone()));
            Ok(Variable {
                key: variable.key.clone(),
                value: variable.value.clone(),
                protected: variable.protected,
                environment_scope: variable.environment_scope.clone(),
                variable_type: None,
                masked: None,
            })
        }

        async fn update_variable(&self, project_id: u64, update: &VariableUpdate) -> Result<Variable> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Update(project_id, update.clone()));
            let existing = self
                .project_variables
                .iter()
                .find(|v| v.key == update.key && v.environment_scope == update.environment_scope)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no such variable"))?;
            Ok(Variable {
                value: update.value.clone(),
                ..existing
            })
        }

        async fn delete_variable(&self, project_id: u64, key: &str) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Delete(project_id, key.to_string()));
            Ok(())
        }

        async fn current_user(&self) -> Result<User> {
            Ok(User {
                id: 1,
                username: "tester".to_string(),
            })
        }

        fn instance_url(&self) -> &str {
            "https://gitlab.test"
        }
    }

    const PROJECT: &str = "myorg/mysubgroup/myproject";

    fn variable(key: &str, value: &str, protected: bool, scope: &str) -> Variable {
        Variable {
            key: key.to_string(),
            value: value.to_string(),
            protected,
            environment_scope: scope.to_string(),
            variable_type: None,
            masked: None,
        }
    }

    fn existing() -> Vec<Variable> {
        vec![
            variable("K1", "1", true, "Testenv"),
            variable("K1", "2", false, "*"),
            variable("K2", "3", false, "*"),
        ]
    }

    #[tokio::test]
    async fn test_get_filters_variables() {
        let api = FakeGitLab::new(existing());
        let spec = FilterSpec::new(["K1"], None, Some(true));
        let found = get_variables(&api, PROJECT, &spec).await.unwrap();
        assert_eq!(found, vec![variable("K1", "1", true, "Testenv")]);
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_get_unknown_project_fails() {
        let api = FakeGitLab::new(existing());
        let result = get_variables(&api, "other/project", &FilterSpec::default()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_set_creates_missing_variable() {
        let api = FakeGitLab::new(existing());
        let outcome = set_variable(&api, PROJECT, "K3", "123", Some("Testenv"), Some(true))
            .await
            .unwrap();

        assert!(matches!(outcome, SetOutcome::Created(ref v) if v.key == "K3"));
        assert_eq!(
            api.calls(),
            vec![Call::Create(
                42,
                NewVariable {
                    key: "K3".to_string(),
                    value: "123".to_string(),
                    protected: true,
                    environment_scope: "Testenv".to_string(),
                }
            )]
        );
    }

    #[tokio::test]
    async fn test_set_updates_single_match() {
        let api = FakeGitLab::new(existing());
        let outcome = set_variable(&api, PROJECT, "K1", "456", Some("Testenv"), None)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            SetOutcome::Updated(variable("K1", "456", true, "Testenv"))
        );
        assert_eq!(
            api.calls(),
            vec![Call::Update(
                42,
                VariableUpdate {
                    key: "K1".to_string(),
                    value: "456".to_string(),
                    environment_scope: "Testenv".to_string(),
                }
            )]
        );
    }

    #[tokio::test]
    async fn test_set_with_ambiguous_key_writes_nothing() {
        let api = FakeGitLab::new(existing());
        let err = set_variable(&api, PROJECT, "K1", "456", None, None)
            .await
            .unwrap_err();

        assert_eq!(exit_code_for(&err), EXIT_AMBIGUOUS);
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_issues_one_call_per_match() {
        let api = FakeGitLab::new(existing());
        let spec = FilterSpec::new(["K1", "K2"], Some("*".to_string()), None);
        let deleted = delete_variables(&api, PROJECT, &spec).await.unwrap();

        assert_eq!(deleted, 2);
        assert_eq!(
            api.calls(),
            vec![
                Call::Delete(42, "K1".to_string()),
                Call::Delete(42, "K2".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_delete_without_matches() {
        let api = FakeGitLab::new(existing());
        let spec = FilterSpec::new(["NOPE"], None, None);
        assert_eq!(delete_variables(&api, PROJECT, &spec).await.unwrap(), 0);
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_export_project_to_file() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let api = FakeGitLab::new(existing());
        let exporter = Exporter::new(
            ExportFormat::Json,
            Destination::Directory(temp_dir.path().to_path_buf()),
        );

        let count = export_project(&api, &exporter, PROJECT).await?;
        assert_eq!(count, 3);

        let files: Vec<_> = std::fs::read_dir(temp_dir.path())?
            .collect::<std::io::Result<Vec<_>>>()?;
        assert_eq!(files.len(), 1);
        let name = files[0].file_name().to_string_lossy().to_string();
        assert!(name.starts_with("myorg_mysubgroup_myproject_"));
        assert!(name.ends_with(".json"));

        let exported: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(files[0].path())?)?;
        assert_eq!(exported.as_array().map(Vec::len), Some(3));
        assert_eq!(exported[0]["projectId"], 42);
        assert_eq!(exported[0]["namespace"], PROJECT);
        Ok(())
    }

    #[tokio::test]
    async fn test_export_group_with_projects() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let api = FakeGitLab::new(existing());
        let exporter = Exporter::new(
            ExportFormat::Csv,
            Destination::Directory(temp_dir.path().to_path_buf()),
        );

        let count = export_group(&api, &exporter, "myorg", true).await?;
        assert_eq!(count, 4);

        let mut names: Vec<String> = std::fs::read_dir(temp_dir.path())?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().to_string()))
            .collect::<std::io::Result<_>>()?;
        names.sort();
        assert_eq!(names.len(), 2);
        assert!(names[0].starts_with("myorg_") && names[0].ends_with(".csv"));
        assert!(names[1].starts_with("myorg_mysubgroup_myproject_"));
        Ok(())
    }

    #[tokio::test]
    async fn test_export_group_only() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let api = FakeGitLab::new(existing());
        let exporter = Exporter::new(
            ExportFormat::Json,
            Destination::Directory(temp_dir.path().to_path_buf()),
        );

        assert_eq!(export_group(&api, &exporter, "myorg", false).await?, 1);
        assert_eq!(std::fs::read_dir(temp_dir.path())?.count(), 1);
        Ok(())
    }
}
