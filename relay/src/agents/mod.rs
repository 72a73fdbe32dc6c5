//! Role agents run by the pipeline, in order.
//!
//! A role is static data: who the agent is, what it writes, and which
//! documents from earlier stages it receives. [`stage::RoleAgent`] turns a
//! role into a runtime turn.

use serde::Serialize;

pub mod stage;

/// One file a role is expected to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Deliverable {
    pub path: &'static str,
    pub purpose: &'static str,
    /// Later stages read this file; the run stops if it is missing.
    pub required: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Role {
    /// Stable id used on the status protocol.
    pub id: &'static str,
    pub name: &'static str,
    /// Step label shown while the role is running.
    pub step: &'static str,
    pub start_log: &'static str,
    pub done_log: &'static str,
    /// Project documents embedded in this role's payload, in order.
    pub reads: &'static [&'static str],
    pub deliverables: &'static [Deliverable],
}

impl Role {
    pub fn required_deliverables(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.deliverables
            .iter()
            .filter(|d| d.required)
            .map(|d| d.path)
    }
}

pub const REQUIREMENTS: &str = "REQUIREMENTS.md";
pub const AGENT_TASKS: &str = "AGENT_TASKS.md";
pub const TEST_PLAN: &str = "TEST.md";
pub const DESIGN_SPEC: &str = "design/design_spec.md";

pub const PROJECT_MANAGER: Role = Role {
    id: "pm",
    name: "Project Manager",
    step: "Planning requirements",
    start_log: "Starting requirements and task breakdown.",
    done_log: "Requirements written.",
    reads: &[],
    deliverables: &[
        Deliverable {
            path: REQUIREMENTS,
            purpose: "concise summary of product goals, target users, key features, and constraints",
            required: true,
        },
        Deliverable {
            path: TEST_PLAN,
            purpose: "tasks with [Owner] tags (Designer, Frontend, Backend, Tester) and clear acceptance criteria",
            required: true,
        },
        Deliverable {
            path: AGENT_TASKS,
            purpose: "one section per role with the project name, required deliverables (exact file names and purpose), and key technical notes",
            required: true,
        },
    ],
};

pub const DESIGNER: Role = Role {
    id: "designer",
    name: "Designer",
    step: "Designing UI",
    start_log: "Creating design spec.",
    done_log: "Design spec written.",
    reads: &[REQUIREMENTS, AGENT_TASKS],
    deliverables: &[
        Deliverable {
            path: DESIGN_SPEC,
            purpose: "UI/UX layout, screens, and visual notes",
            required: true,
        },
        Deliverable {
            path: "design/wireframe.md",
            purpose: "text or ASCII wireframe if specified",
            required: false,
        },
    ],
};

pub const FRONTEND: Role = Role {
    id: "frontend",
    name: "Frontend Developer",
    step: "Building UI",
    start_log: "Implementing frontend.",
    done_log: "Frontend written.",
    reads: &[REQUIREMENTS, AGENT_TASKS, DESIGN_SPEC],
    deliverables: &[
        Deliverable {
            path: "frontend/index.html",
            purpose: "main page structure",
            required: false,
        },
        Deliverable {
            path: "frontend/styles.css",
            purpose: "styles, or inline styles if specified",
            required: false,
        },
        Deliverable {
            path: "frontend/main.js",
            purpose: "client logic (or frontend/game.js if specified)",
            required: false,
        },
    ],
};

pub const BACKEND: Role = Role {
    id: "backend",
    name: "Backend Developer",
    step: "Building backend",
    start_log: "Implementing backend.",
    done_log: "Backend written.",
    reads: &[REQUIREMENTS, AGENT_TASKS],
    deliverables: &[
        Deliverable {
            path: "backend/package.json",
            purpose: "include a start script if requested",
            required: false,
        },
        Deliverable {
            path: "backend/server.js",
            purpose: "implement the API endpoints and logic exactly as specified",
            required: false,
        },
    ],
};

pub const TESTER: Role = Role {
    id: "tester",
    name: "Tester",
    step: "Testing outputs",
    start_log: "Creating test plan.",
    done_log: "Test plan written.",
    reads: &[REQUIREMENTS, AGENT_TASKS, TEST_PLAN],
    deliverables: &[
        Deliverable {
            path: "tests/TEST_PLAN.md",
            purpose: "bullet list of manual checks or automated steps as requested",
            required: false,
        },
        Deliverable {
            path: "tests/test.sh",
            purpose: "a simple automated script if specified",
            required: false,
        },
    ],
};

/// Stage order.
pub static ROLES: [Role; 5] = [PROJECT_MANAGER, DESIGNER, FRONTEND, BACKEND, TESTER];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn role_ids_are_unique_and_ordered() {
        let ids: Vec<&str> = ROLES.iter().map(|role| role.id).collect();
        assert_eq!(ids, vec!["pm", "designer", "frontend", "backend", "tester"]);
        assert_eq!(ids.iter().collect::<HashSet<_>>().len(), ROLES.len());
    }

    #[test]
    fn every_read_document_is_written_by_an_earlier_role() {
        for (index, role) in ROLES.iter().enumerate() {
            for doc in role.reads {
                let produced = ROLES[..index]
                    .iter()
                    .any(|earlier| earlier.required_deliverables().any(|path| path == *doc));
                assert!(produced, "{} reads {doc} before it is produced", role.id);
            }
        }
    }
}
