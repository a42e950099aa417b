//! Prompt catalog: per-item templates with lightweight `{{ var }}`
//! substitution and few-shot assembly.
//!
//! Templates live as JSON files in a directory, keyed by file stem
//! (`item5_fees.json` registers as `item5_fees`). Only simple variable
//! substitution is supported; templates are otherwise opaque text.

use anyhow::{Context, Result};
use fdd_core::catalog;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").unwrap());

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FewShotExample {
    pub input: String,
    pub output: String,
}

/// One extraction prompt template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub name: String,
    pub system_prompt: String,
    pub user_prompt: String,
    #[serde(default)]
    pub few_shot_examples: Vec<FewShotExample>,
    #[serde(default)]
    pub validation_rules: Vec<String>,
}

/// Fully rendered prompt pair ready for a backend call.
#[derive(Debug, Clone)]
pub struct RenderedPrompt {
    pub system: String,
    pub user: String,
}

/// Substitute `{{ var }}` placeholders; unknown variables render empty.
fn substitute(template: &str, vars: &HashMap<&str, String>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures<'_>| {
            caps.get(1)
                .and_then(|name| vars.get(name.as_str()))
                .cloned()
                .unwrap_or_default()
        })
        .into_owned()
}

/// Loaded prompt templates, keyed by name.
#[derive(Debug)]
pub struct PromptCatalog {
    templates: HashMap<String, PromptTemplate>,
}

impl PromptCatalog {
    /// Load every `*.json` template in a directory. Unreadable or
    /// malformed files are skipped with a warning; a missing directory is
    /// an error.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("failed to read prompt directory {}", dir.display()))?;

        let mut templates = HashMap::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let loaded = std::fs::read(&path)
                .map_err(anyhow::Error::from)
                .and_then(|bytes| {
                    serde_json::from_slice::<PromptTemplate>(&bytes)
                        .context("failed to parse prompt template")
                });
            match loaded {
                Ok(mut template) => {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        template.name = stem.to_string();
                    }
                    info!(name = template.name, "loaded prompt template");
                    templates.insert(template.name.clone(), template);
                }
                Err(err) => {
                    warn!("skipping invalid prompt template {:?}: {}", path, err);
                }
            }
        }

        Ok(Self { templates })
    }

    /// Build a catalog from in-memory templates (tests, embedded sets).
    pub fn from_templates(list: Vec<PromptTemplate>) -> Self {
        let templates = list
            .into_iter()
            .map(|t| (t.name.clone(), t))
            .collect();
        Self { templates }
    }

    pub fn get(&self, name: &str) -> Option<&PromptTemplate> {
        self.templates.get(name)
    }

    /// Template registered for an item, if extraction is supported and
    /// the template is present.
    pub fn template_for_item(&self, item_no: u8) -> Option<&PromptTemplate> {
        catalog::prompt_name_for(item_no).and_then(|name| self.templates.get(name))
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Render a template: substitute variables in both prompts and append
    /// up to `max_examples` few-shot pairs to the system prompt.
    pub fn render(
        &self,
        template: &PromptTemplate,
        vars: &HashMap<&str, String>,
        max_examples: usize,
    ) -> RenderedPrompt {
        let mut system = substitute(&template.system_prompt, vars);
        let user = substitute(&template.user_prompt, vars);

        let examples = &template.few_shot_examples[..template.few_shot_examples.len().min(max_examples)];
        if !examples.is_empty() {
            system.push_str("\n\nHere are some examples:\n\n");
            for (i, example) in examples.iter().enumerate() {
                system.push_str(&format!(
                    "Example {}:\nInput: {}\nOutput: {}\n\n",
                    i + 1,
                    example.input,
                    example.output
                ));
            }
        }

        RenderedPrompt { system, user }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> PromptTemplate {
        PromptTemplate {
            name: "item5_fees".into(),
            system_prompt: "Extract initial fees for {{ franchise_name }}.".into(),
            user_prompt: "Section content:\n{{ section_content }}".into(),
            few_shot_examples: vec![
                FewShotExample {
                    input: "fee of $45,000".into(),
                    output: r#"{"initial_franchise_fee_cents": 4500000}"#.into(),
                },
                FewShotExample {
                    input: "fee of $30,000".into(),
                    output: r#"{"initial_franchise_fee_cents": 3000000}"#.into(),
                },
                FewShotExample {
                    input: "fee of $10,000".into(),
                    output: r#"{"initial_franchise_fee_cents": 1000000}"#.into(),
                },
            ],
            validation_rules: vec!["fee must be non-negative".into()],
        }
    }

    #[test]
    fn variables_are_substituted() {
        let catalog = PromptCatalog::from_templates(vec![template()]);
        let template = catalog.get("item5_fees").unwrap();
        let vars = HashMap::from([
            ("franchise_name", "Valvoline".to_string()),
            ("section_content", "ITEM 5 INITIAL FEES ...".to_string()),
        ]);
        let rendered = catalog.render(template, &vars, 0);
        assert_eq!(rendered.system, "Extract initial fees for Valvoline.");
        assert!(rendered.user.contains("ITEM 5 INITIAL FEES"));
    }

    #[test]
    fn unknown_variables_render_empty() {
        let vars = HashMap::new();
        assert_eq!(substitute("a {{ missing }} b", &vars), "a  b");
        assert_eq!(substitute("{{franchise_name}}", &vars), "");
    }

    #[test]
    fn few_shot_examples_are_capped() {
        let catalog = PromptCatalog::from_templates(vec![template()]);
        let template = catalog.get("item5_fees").unwrap();
        let rendered = catalog.render(template, &HashMap::new(), 2);
        assert!(rendered.system.contains("Example 1:"));
        assert!(rendered.system.contains("Example 2:"));
        assert!(!rendered.system.contains("Example 3:"));
    }

    #[test]
    fn item_lookup_uses_registered_names() {
        let catalog = PromptCatalog::from_templates(vec![template()]);
        assert!(catalog.template_for_item(5).is_some());
        assert!(catalog.template_for_item(6).is_none());
        assert!(catalog.template_for_item(12).is_none());
    }

    #[test]
    fn load_dir_reads_json_templates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("item19_fpr.json");
        std::fs::write(
            &path,
            serde_json::to_vec(&PromptTemplate {
                name: "ignored".into(),
                system_prompt: "Extract FPR tables.".into(),
                user_prompt: "{{ section_content }}".into(),
                few_shot_examples: vec![],
                validation_rules: vec![],
            })
            .unwrap(),
        )
        .unwrap();
        std::fs::write(dir.path().join("broken.json"), b"{ not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let catalog = PromptCatalog::load_dir(dir.path()).unwrap();
        assert_eq!(catalog.len(), 1);
        // File stem wins over the embedded name field.
        assert!(catalog.get("item19_fpr").is_some());
        assert!(catalog.template_for_item(19).is_some());
    }

    #[test]
    fn missing_directory_is_an_error() {
        let err = PromptCatalog::load_dir("/definitely/not/here").unwrap_err();
        assert!(err.to_string().contains("prompt directory"));
    }
}
