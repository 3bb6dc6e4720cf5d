use serde::{Deserialize, Serialize};

use super::DEFAULT_ENVIRONMENT_SCOPE;

fn default_environment_scope() -> String {
    DEFAULT_ENVIRONMENT_SCOPE.to_string()
}

/// A CI/CD variable as returned by the variables endpoints.
///
/// The key alone is not unique: a project may hold several variables with the
/// same key that differ in `environment_scope` or `protected`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub protected: bool,
    // Group variables on older GitLab versions carry no scope at all.
    #[serde(default = "default_environment_scope")]
    pub environment_scope: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub masked: Option<bool>,
}

/// Payload for creating a project variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewVariable {
    pub key: String,
    pub value: String,
    pub protected: bool,
    pub environment_scope: String,
}

/// Value-only update of an existing project variable.
///
/// `environment_scope` selects which of the variables sharing `key` is
/// addressed. It is sent as a filter, never as a new value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableUpdate {
    pub key: String,
    pub value: String,
    pub environment_scope: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: u64,
    pub path_with_namespace: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: u64,
    pub path: String,
    #[serde(default)]
    pub full_path: Option<String>,
}

impl Group {
    /// Full namespace path, falling back to the short path
    pub fn namespace(&self) -> &str {
        self.full_path.as_deref().unwrap_or(&self.path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct User {
    pub id: u64,
    pub username: String,
}

/// Owner of a set of variables.
///
/// Serialized flat into export records as `projectId` or `groupId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariableOwner {
    #[serde(rename = "projectId")]
    Project(u64),
    #[serde(rename = "groupId")]
    Group(u64),
}

impl VariableOwner {
    pub fn id(&self) -> u64 {
        match self {
            VariableOwner::Project(id) | VariableOwner::Group(id) => *id,
        }
    }

    /// Export column / JSON field naming this owner
    pub fn column(&self) -> &'static str {
        match self {
            VariableOwner::Project(_) => "projectId",
            VariableOwner::Group(_) => "groupId",
        }
    }

    /// REST collection the owner lives in
    pub(crate) fn collection(&self) -> &'static str {
        match self {
            VariableOwner::Project(_) => "projects",
            VariableOwner::Group(_) => "groups",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_defaults_environment_scope() {
        let json = r#"{"key":"K1","value":"v","protected":false}"#;
        let variable: Variable = serde_json::from_str(json).unwrap();
        assert_eq!(variable.environment_scope, "*");
        assert_eq!(variable.variable_type, None);
    }

    #[test]
    fn test_variable_ignores_unknown_fields() {
        let json = r#"{
            "variable_type": "env_var",
            "key": "TEST_VARIABLE_1",
            "value": "TEST_1",
            "protected": true,
            "masked": false,
            "raw": false,
            "environment_scope": "production",
            "description": null
        }"#;
        let variable: Variable = serde_json::from_str(json).unwrap();
        assert_eq!(variable.key, "TEST_VARIABLE_1");
        assert!(variable.protected);
        assert_eq!(variable.environment_scope, "production");
        assert_eq!(variable.variable_type.as_deref(), Some("env_var"));
        assert_eq!(variable.masked, Some(false));
    }

    #[test]
    fn test_group_namespace_prefers_full_path() {
        let group = Group {
            id: 7,
            path: "sub".to_string(),
            full_path: Some("org/sub".to_string()),
        };
        assert_eq!(group.namespace(), "org/sub");

        let group = Group {
            full_path: None,
            ..group
        };
        assert_eq!(group.namespace(), "sub");
    }

    #[test]
    fn test_owner_columns() {
        assert_eq!(VariableOwner::Project(1).column(), "projectId");
        assert_eq!(VariableOwner::Group(2).column(), "groupId");
        assert_eq!(VariableOwner::Group(2).id(), 2);
    }
}
