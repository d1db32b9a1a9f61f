//! Embedded templates, compiled into the binary so the orchestrator works from
//! any working directory.

use crate::error::{ProvisionError, Result};
use tera::{Context, Tera};

pub const KIND_CLUSTER: &str = "kind/cluster.yaml.j2";

pub static KIND_CLUSTER_YAML: &str = include_str!("templates/kind-cluster.yaml.j2");

/// All embedded templates as (name, content) pairs for registration with Tera.
pub const ALL_TEMPLATES: &[(&str, &str)] = &[(KIND_CLUSTER, KIND_CLUSTER_YAML)];

/// Template renderer using Tera for Jinja2-style rendering
pub struct TemplateRenderer {
    tera: Tera,
}

impl TemplateRenderer {
    pub fn from_embedded() -> Result<Self> {
        let mut tera = Tera::default();
        for (name, content) in ALL_TEMPLATES {
            tera.add_raw_template(name, content).map_err(|e| {
                ProvisionError::Template(format!("Failed to add embedded template {}: {}", name, e))
            })?;
            tracing::debug!("[TemplateRenderer] Loaded embedded template: {}", name);
        }
        Ok(Self { tera })
    }

    pub fn render_with_context(&self, template_name: &str, context: &Context) -> Result<String> {
        let rendered = self.tera.render(template_name, context).map_err(|e| {
            ProvisionError::Template(format!(
                "Failed to render template {}: {}",
                template_name, e
            ))
        })?;

        tracing::debug!(
            "[TemplateRenderer] Rendered template {} ({} bytes)",
            template_name,
            rendered.len()
        );

        Ok(rendered)
    }

    pub fn list_templates(&self) -> Vec<String> {
        self.tera.get_template_names().map(String::from).collect()
    }
}
