//! Plan and apply-report types for a first apply

use serde::{Deserialize, Serialize};

/// Represents a planned action for a resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// Logical resource name
    pub id: String,

    /// Type of action to perform
    pub action_type: ActionType,

    /// Resource type (e.g., "aws:ec2:Vpc", "random:password")
    pub resource_type: String,

    /// Component that declared the resource, if any
    pub component: Option<String>,

    /// Names of the resources this one waits for
    pub depends_on: Vec<String>,

    /// Rendered desired state with secrets and unknowns replaced by placeholders
    pub details: serde_json::Value,
}

/// Type of action to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Create a resource through the provider
    Create,
    /// Generate a secret locally
    Generate,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::Generate => write!(f, "generate"),
        }
    }
}

/// Plan containing all actions in evaluation order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Actions in a valid topological order
    pub actions: Vec<Action>,

    /// Groups of mutually independent actions, by name
    pub waves: Vec<Vec<String>>,
}

impl Plan {
    pub fn new(actions: Vec<Action>, waves: Vec<Vec<String>>) -> Self {
        Self { actions, waves }
    }

    /// Get actions by type
    pub fn actions_by_type(&self, action_type: ActionType) -> Vec<&Action> {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .collect()
    }

    /// Summary of the plan
    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            create: self.actions_by_type(ActionType::Create).len(),
            generate: self.actions_by_type(ActionType::Generate).len(),
            waves: self.waves.len(),
        }
    }
}

/// Summary of planned actions
#[derive(Debug, Clone)]
pub struct PlanSummary {
    pub create: usize,
    pub generate: usize,
    pub waves: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to generate, {} waves",
            self.create, self.generate, self.waves
        )
    }
}

/// Result of applying a plan
///
/// A partially successful apply is a legitimate terminal state: created
/// resources are not rolled back, and every failure is listed together with
/// the dependents that were skipped because of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyReport {
    /// Successfully created resources
    pub succeeded: Vec<ActionResult>,

    /// Resources whose creation failed
    pub failed: Vec<ActionResult>,

    /// Resources never attempted because a dependency did not complete
    pub skipped: Vec<SkippedAction>,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl ApplyReport {
    pub fn new() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }

    pub fn add_success(&mut self, action_id: String, message: String) {
        self.succeeded.push(ActionResult {
            action_id,
            success: true,
            message,
            error: None,
        });
    }

    pub fn add_failure(&mut self, action_id: String, error: String) {
        self.failed.push(ActionResult {
            action_id,
            success: false,
            message: String::new(),
            error: Some(error),
        });
    }

    pub fn add_skipped(&mut self, action_id: String, blocked_by: String) {
        self.skipped.push(SkippedAction {
            action_id,
            blocked_by,
        });
    }

    pub fn was_created(&self, action_id: &str) -> bool {
        self.succeeded.iter().any(|r| r.action_id == action_id)
    }

    pub fn was_skipped(&self, action_id: &str) -> bool {
        self.skipped.iter().any(|s| s.action_id == action_id)
    }

    pub fn failure(&self, action_id: &str) -> Option<&ActionResult> {
        self.failed.iter().find(|r| r.action_id == action_id)
    }
}

impl Default for ApplyReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of a single action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    /// Name of the resource
    pub action_id: String,

    /// Whether the action succeeded
    pub success: bool,

    /// Success message
    pub message: String,

    /// Error message if failed
    pub error: Option<String>,
}

/// A resource that was not attempted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedAction {
    /// Name of the skipped resource
    pub action_id: String,

    /// The failed resource at the root of the skip
    pub blocked_by: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(id: &str, action_type: ActionType) -> Action {
        Action {
            id: id.to_string(),
            action_type,
            resource_type: "aws:ec2:Vpc".to_string(),
            component: None,
            depends_on: Vec::new(),
            details: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_plan_summary() {
        let plan = Plan::new(
            vec![
                action("vpc", ActionType::Create),
                action("subnet", ActionType::Create),
                action("password", ActionType::Generate),
            ],
            vec![
                vec!["vpc".to_string(), "password".to_string()],
                vec!["subnet".to_string()],
            ],
        );

        let summary = plan.summary();
        assert_eq!(summary.create, 2);
        assert_eq!(summary.generate, 1);
        assert_eq!(summary.to_string(), "2 to create, 1 to generate, 2 waves");
    }

    #[test]
    fn test_report_success_requires_no_skips() {
        let mut report = ApplyReport::new();
        report.add_success("vpc".to_string(), "vpc-1".to_string());
        assert!(report.is_success());

        report.add_skipped("subnet".to_string(), "vpc".to_string());
        assert!(!report.is_success());
        assert!(report.was_skipped("subnet"));
        assert!(report.was_created("vpc"));
    }

    #[test]
    fn test_report_failure_lookup() {
        let mut report = ApplyReport::new();
        report.add_failure("cluster".to_string(), "API error: throttled".to_string());

        let failure = report.failure("cluster").unwrap();
        assert!(!failure.success);
        assert_eq!(failure.error.as_deref(), Some("API error: throttled"));
        assert!(report.failure("vpc").is_none());
    }
}
