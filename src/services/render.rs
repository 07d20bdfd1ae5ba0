//! Configuration file rendering.
//!
//! Templates are compiled into the binary and rendered with Tera. A render
//! either resolves every placeholder or fails with
//! [`ProvisionError::ConfigRender`]; partially substituted output never
//! reaches disk.

use crate::error::{ProvisionError, Result};
use tera::{Context, Tera};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    PanelEnv,
    NginxVhost,
    ApacheVhost,
    QueueWorkerUnit,
    AgentUnit,
    SchedulerCron,
    PhpFpmPool,
    RootClientConfig,
}

impl Template {
    pub const ALL: [Template; 8] = [
        Template::PanelEnv,
        Template::NginxVhost,
        Template::ApacheVhost,
        Template::QueueWorkerUnit,
        Template::AgentUnit,
        Template::SchedulerCron,
        Template::PhpFpmPool,
        Template::RootClientConfig,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Template::PanelEnv => "panel.env",
            Template::NginxVhost => "nginx-vhost.conf",
            Template::ApacheVhost => "apache-vhost.conf",
            Template::QueueWorkerUnit => "pteroq.service",
            Template::AgentUnit => "wings.service",
            Template::SchedulerCron => "scheduler.cron",
            Template::PhpFpmPool => "php-fpm-pool.conf",
            Template::RootClientConfig => "root-my.cnf",
        }
    }

    fn source(&self) -> &'static str {
        match self {
            Template::PanelEnv => include_str!("../templates/panel.env.j2"),
            Template::NginxVhost => include_str!("../templates/nginx-vhost.conf.j2"),
            Template::ApacheVhost => include_str!("../templates/apache-vhost.conf.j2"),
            Template::QueueWorkerUnit => include_str!("../templates/pteroq.service.j2"),
            Template::AgentUnit => include_str!("../templates/wings.service.j2"),
            Template::SchedulerCron => include_str!("../templates/scheduler.cron.j2"),
            Template::PhpFpmPool => include_str!("../templates/php-fpm-pool.conf.j2"),
            Template::RootClientConfig => include_str!("../templates/root-my.cnf.j2"),
        }
    }
}

pub struct TemplateRenderer {
    tera: Tera,
}

impl TemplateRenderer {
    pub fn from_embedded() -> Result<Self> {
        let mut tera = Tera::default();
        for template in Template::ALL {
            tera.add_raw_template(template.name(), template.source())
                .map_err(|e| {
                    ProvisionError::ConfigRender(format!(
                        "Invalid embedded template {}: {}",
                        template.name(),
                        e
                    ))
                })?;
        }
        tracing::debug!("Loaded {} embedded templates", Template::ALL.len());
        Ok(Self { tera })
    }

    pub fn render(&self, template: Template, context: &Context) -> Result<String> {
        let rendered = self.tera.render(template.name(), context).map_err(|e| {
            ProvisionError::ConfigRender(format!(
                "Failed to render {}: {}",
                template.name(),
                render_error_chain(&e)
            ))
        })?;

        if let Some(marker) = residual_marker(&rendered) {
            return Err(ProvisionError::ConfigRender(format!(
                "Rendered {} still contains '{}'",
                template.name(),
                marker
            )));
        }

        tracing::debug!(
            "Rendered template {} ({} bytes)",
            template.name(),
            rendered.len()
        );
        Ok(rendered)
    }
}

/// Template syntax left in rendered output, usually from a substituted value.
fn residual_marker(rendered: &str) -> Option<&'static str> {
    ["{{", "}}", "{%", "%}"]
        .into_iter()
        .find(|marker| rendered.contains(marker))
}

fn render_error_chain(err: &tera::Error) -> String {
    use std::error::Error;

    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
