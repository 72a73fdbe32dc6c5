//! Prompt rendering for role agents.
//!
//! All prompt text lives in `prompts/` and is embedded at compile time.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use minijinja::{Environment, context};
use serde::Serialize;

use crate::agents::Role;
use crate::core::types::ProjectKind;

const TEMPLATES: &[(&str, &str)] = &[
    ("preamble", include_str!("prompts/preamble.md")),
    ("role", include_str!("prompts/role.md")),
    ("roles/pm", include_str!("prompts/roles/pm.md")),
    ("roles/designer", include_str!("prompts/roles/designer.md")),
    ("roles/frontend", include_str!("prompts/roles/frontend.md")),
    ("roles/backend", include_str!("prompts/roles/backend.md")),
    ("roles/tester", include_str!("prompts/roles/tester.md")),
    ("payload", include_str!("prompts/payload.md")),
    ("default_task", include_str!("prompts/default_task.md")),
    ("brief_task", include_str!("prompts/brief_task.md")),
    ("blazor_constraints", include_str!("prompts/blazor_constraints.md")),
    ("permissions", include_str!("prompts/permissions.md")),
    ("environment_context", include_str!("prompts/environment_context.md")),
    ("readme", include_str!("prompts/readme.md")),
];

/// A project document embedded in a stage payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    pub path: String,
    pub content: String,
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        for &(name, source) in TEMPLATES {
            env.add_template(name, source)
                .expect("embedded prompt templates should be valid");
        }
        Self { env }
    }

    fn render<S: Serialize>(&self, name: &str, ctx: S) -> Result<String> {
        let template = self
            .env
            .get_template(name)
            .with_context(|| format!("load template {name}"))?;
        let rendered = template
            .render(ctx)
            .with_context(|| format!("render template {name}"))?;
        Ok(rendered.trim().to_string())
    }

    /// System instructions for `role`.
    pub fn role_instructions(&self, role: &Role) -> Result<String> {
        let name = format!("roles/{}", role.id);
        if self.env.get_template(&name).is_err() {
            return Err(anyhow!("no instructions template for role '{}'", role.id));
        }
        self.render(&name, context! { role => role })
    }

    /// User payload embedding the documents a stage reads.
    pub fn stage_payload(&self, documents: &[Document]) -> Result<String> {
        self.render("payload", context! { documents => documents })
    }

    pub fn default_task(&self) -> Result<String> {
        self.render("default_task", context! {})
    }

    /// Task built from an `AGENTS.md` project brief.
    pub fn task_from_brief(&self, brief: &str, kind: ProjectKind) -> Result<String> {
        self.render(
            "brief_task",
            context! { brief => brief.trim(), blazor => kind == ProjectKind::Blazor },
        )
    }

    pub fn permissions(&self) -> Result<String> {
        self.render("permissions", context! {})
    }

    pub fn environment_context(&self, cwd: &Path, shell: &str) -> Result<String> {
        self.render(
            "environment_context",
            context! { cwd => cwd.display().to_string(), shell => shell },
        )
    }

    /// README written when no stage produced one.
    pub fn readme_fallback(&self, kind: ProjectKind) -> Result<String> {
        let mut readme = self.render("readme", context! { blazor => kind == ProjectKind::Blazor })?;
        readme.push('\n');
        Ok(readme)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{DESIGNER, PROJECT_MANAGER, ROLES};

    #[test]
    fn every_role_has_instructions() {
        let engine = PromptEngine::new();
        for role in &ROLES {
            let text = engine.role_instructions(role).expect("render");
            assert!(text.starts_with("# System context"), "{}", role.id);
            assert!(text.contains(&format!("You are the {}.", role.name)));
            for deliverable in role.deliverables {
                assert!(text.contains(&format!("### FILE: {}\n<content>", deliverable.path)));
            }
            assert!(text.ends_with("Do not wrap file contents in triple backticks."));
        }
    }

    #[test]
    fn project_manager_writes_in_project_root() {
        let engine = PromptEngine::new();
        let pm = engine.role_instructions(&PROJECT_MANAGER).expect("pm");
        assert!(pm.contains("Deliverables (write in project root):"));
        assert!(pm.contains("Objective:"));
        let designer = engine.role_instructions(&DESIGNER).expect("designer");
        assert!(designer.contains("\nDeliverables:\n"));
        assert!(designer.contains("- design/design_spec.md - UI/UX layout"));
    }

    #[test]
    fn payload_lists_documents_in_order() {
        let engine = PromptEngine::new();
        let payload = engine
            .stage_payload(&[
                Document {
                    path: "REQUIREMENTS.md".to_string(),
                    content: "reqs".to_string(),
                },
                Document {
                    path: "AGENT_TASKS.md".to_string(),
                    content: "tasks".to_string(),
                },
            ])
            .expect("payload");
        assert_eq!(payload, "REQUIREMENTS.md:\nreqs\n\nAGENT_TASKS.md:\ntasks");
    }

    #[test]
    fn brief_task_adds_blazor_constraints_only_for_blazor() {
        let engine = PromptEngine::new();
        let web = engine
            .task_from_brief("A todo app.", ProjectKind::Web)
            .expect("web");
        assert!(web.contains("Project Brief (AGENTS.md):\nA todo app."));
        assert!(web.contains("- A README.md in the project root"));
        assert!(!web.contains("Blazor"));

        let blazor = engine
            .task_from_brief("A todo app.", ProjectKind::Blazor)
            .expect("blazor");
        assert!(blazor.contains("This is a Blazor WebAssembly project."));
    }

    #[test]
    fn base_context_blocks() {
        let engine = PromptEngine::new();
        let permissions = engine.permissions().expect("permissions");
        assert!(permissions.starts_with("<permissions instructions>"));
        let env = engine
            .environment_context(Path::new("/work/app"), "zsh")
            .expect("env");
        assert!(env.contains("<cwd>/work/app</cwd>"));
        assert!(env.contains("<shell>zsh</shell>"));
    }

    #[test]
    fn readme_fallback_mentions_blazor_only_when_needed() {
        let engine = PromptEngine::new();
        let web = engine.readme_fallback(ProjectKind::Web).expect("web");
        assert!(web.starts_with("# Project Output"));
        assert!(web.ends_with("`http://localhost:3000/`.\n"));
        assert!(!web.contains("dotnet"));
        let blazor = engine.readme_fallback(ProjectKind::Blazor).expect("blazor");
        assert!(blazor.contains("## Run (Blazor)"));
        assert!(blazor.contains("`app/` - Blazor WebAssembly app"));
    }

    #[test]
    fn default_task_is_nonempty() {
        let engine = PromptEngine::new();
        assert!(engine.default_task().expect("task").starts_with("Goal:"));
    }
}
