//! Prompt Loader
//!
//! Loads prompt templates from the override directory or falls back to the
//! embedded defaults.

use std::path::{Path, PathBuf};

use eyre::{Result, eyre};
use handlebars::Handlebars;
use serde::Serialize;
use tracing::debug;

use super::embedded;

/// Loads and renders prompt templates
pub struct PromptLoader {
    hbs: Handlebars<'static>,
    /// User override directory (`.pmagent/prompts/`)
    user_dir: Option<PathBuf>,
}

impl std::fmt::Debug for PromptLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptLoader").field("user_dir", &self.user_dir).finish()
    }
}

impl PromptLoader {
    /// Create a loader rooted at `root`, picking up `.pmagent/prompts/` if it exists
    pub fn new(root: impl AsRef<Path>) -> Self {
        let user_dir = root.as_ref().join(".pmagent/prompts");
        let exists = user_dir.is_dir();
        debug!(?user_dir, %exists, "PromptLoader::new: called");
        Self {
            hbs: Self::engine(),
            user_dir: exists.then_some(user_dir),
        }
    }

    /// Loader that only uses embedded prompts
    pub fn embedded_only() -> Self {
        debug!("PromptLoader::embedded_only: called");
        Self {
            hbs: Self::engine(),
            user_dir: None,
        }
    }

    fn engine() -> Handlebars<'static> {
        let mut hbs = Handlebars::new();
        // prompts are plain text, not HTML
        hbs.register_escape_fn(handlebars::no_escape);
        hbs
    }

    fn load_template(&self, name: &str) -> Result<String> {
        debug!(%name, "PromptLoader::load_template: called");
        if let Some(ref user_dir) = self.user_dir {
            let path = user_dir.join(format!("{}.pmt", name));
            if path.exists() {
                debug!(?path, "PromptLoader::load_template: found in user override");
                return std::fs::read_to_string(&path)
                    .map_err(|e| eyre!("Failed to read user prompt {}: {}", path.display(), e));
            }
        }

        embedded::get_embedded(name)
            .map(str::to_string)
            .ok_or_else(|| eyre!("Prompt template not found: {}", name))
    }

    /// Render a template with any serializable context
    pub fn render<T: Serialize>(&self, name: &str, context: &T) -> Result<String> {
        debug!(%name, "PromptLoader::render: called");
        let template = self.load_template(name)?;
        self.hbs
            .render_template(&template, context)
            .map_err(|e| eyre!("Failed to render template {}: {}", name, e))
    }
}

impl Default for PromptLoader {
    fn default() -> Self {
        match std::env::current_dir() {
            Ok(dir) => Self::new(dir),
            Err(_) => Self::embedded_only(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_system_prompt_lists_tools() {
        let loader = PromptLoader::embedded_only();
        let out = loader
            .render(
                "system",
                &json!({
                    "role": "Project Planner",
                    "goal": "Plan work",
                    "backstory": "Seasoned PM",
                    "tools": ["create_issue", "search_issues"],
                }),
            )
            .unwrap();

        assert!(out.starts_with("You are a Project Planner.\n\nGoal: Plan work\n\nBackground: Seasoned PM"));
        assert!(out.contains("Available tools: create_issue, search_issues"));
    }

    #[test]
    fn test_render_does_not_html_escape() {
        let loader = PromptLoader::embedded_only();
        let out = loader
            .render("plan", &json!({ "brief": "Use <b>OAuth</b> & \"SSO\"", "project_name": "x", "repository": "o/r" }))
            .unwrap();
        assert!(out.contains("Project Brief: Use <b>OAuth</b> & \"SSO\""));
    }

    #[test]
    fn test_user_override_wins() {
        let dir = TempDir::new().unwrap();
        let prompts = dir.path().join(".pmagent/prompts");
        std::fs::create_dir_all(&prompts).unwrap();
        std::fs::write(prompts.join("standup.pmt"), "custom {{date}}").unwrap();

        let loader = PromptLoader::new(dir.path());
        assert_eq!(loader.render("standup", &json!({ "date": "today" })).unwrap(), "custom today");
        // templates without an override still come from the binary
        assert!(loader.render("plan", &json!({})).unwrap().contains("Project Brief"));
    }

    #[test]
    fn test_unknown_template_is_error() {
        let loader = PromptLoader::embedded_only();
        let err = loader.render("nonexistent-template", &json!({})).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
