use crate::config::Config;
use crate::models::{DATABASE_HOST, DATABASE_PORT};
use crate::paths::{MYSQL_CLIENT_CONFIG, WINGS_BINARY, WINGS_CONFIG_DIR};
use crate::services::provisioner::ProvisionContext;
use secrecy::ExposeSecret;
use std::fmt::Write;

const RULE: &str = "==================================================================";

/// The operator-facing report printed once the run completes. This is the
/// only place generated secrets appear in cleartext.
pub fn render(ctx: &ProvisionContext, config: &Config) -> String {
    let mut out = String::new();
    let plan = ctx.plan();

    line(&mut out, RULE);
    line(&mut out, " Installation complete");
    line(&mut out, RULE);
    line(
        &mut out,
        &format!(
            "Host: {} {} ({}), timezone {}",
            ctx.profile().distro,
            ctx.profile().version,
            ctx.profile().arch,
            ctx.profile().timezone
        ),
    );
    line(
        &mut out,
        &format!("Finished: {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S %Z")),
    );

    if let (Some(panel), Some(credentials)) = (plan.panel.as_ref(), ctx.credentials()) {
        line(&mut out, "");
        line(&mut out, "Panel");
        field(&mut out, "URL", &panel.app_url());
        field(&mut out, "Domain", &panel.domain);
        if let Some(version) = &ctx.outputs.panel_version {
            field(&mut out, "Version", version);
        }
        field(&mut out, "Web server", &panel.web_server.to_string());
        field(&mut out, "Install path", &config.panel_dir);
        field(&mut out, "Admin username", &credentials.admin_username);
        field(&mut out, "Admin email", &credentials.admin_email);
        field(
            &mut out,
            "Admin password",
            &secret_label(
                credentials.admin_password.expose_secret(),
                credentials.generated_admin_password,
            ),
        );

        line(&mut out, "");
        line(&mut out, "Database");
        field(
            &mut out,
            "Host",
            &format!("{}:{}", DATABASE_HOST, DATABASE_PORT),
        );
        field(&mut out, "Name", &credentials.database_name);
        field(&mut out, "User", &credentials.database_user);
        field(
            &mut out,
            "Password",
            &secret_label(
                credentials.database_password.expose_secret(),
                credentials.generated_database_password,
            ),
        );
        field(
            &mut out,
            "Root password",
            &format!(
                "{} (generated, saved to {})",
                credentials.database_root_password.expose_secret(),
                MYSQL_CLIENT_CONFIG
            ),
        );
        field(
            &mut out,
            "Backends",
            &format!(
                "cache={} queue={} session={}",
                plan.backends.cache,
                plan.backends.queue,
                plan.backends.session.as_str()
            ),
        );
        if let Some(backup) = &ctx.outputs.env_backup {
            field(&mut out, "Previous .env", &backup.display().to_string());
        }
    }

    if let Some(agent) = plan.agent.as_ref() {
        line(&mut out, "");
        line(&mut out, "Wings");
        if let Some(version) = &ctx.outputs.agent_version {
            field(&mut out, "Version", version);
        }
        if let Some(domain) = &agent.domain {
            field(&mut out, "FQDN", domain);
        }
        field(&mut out, "Binary", WINGS_BINARY);
        line(
            &mut out,
            &format!(
                "  Next: create a node in the panel, save its configuration to {}/config.yml,",
                WINGS_CONFIG_DIR
            ),
        );
        line(&mut out, "        then run `systemctl start wings`.");
    }

    if !ctx.outputs.certificates.is_empty() {
        line(&mut out, "");
        line(&mut out, "TLS certificates");
        for certificate in &ctx.outputs.certificates {
            if certificate.issued {
                field(&mut out, &certificate.domain, "issued");
            } else {
                field(&mut out, &certificate.domain, "NOT issued, run manually:");
                if let Some(command) = &certificate.manual_command {
                    line(&mut out, &format!("    {}", command));
                }
            }
        }
    }

    if !ctx.outputs.artifacts.is_empty() {
        line(&mut out, "");
        line(&mut out, "Files written");
        for artifact in &ctx.outputs.artifacts {
            line(&mut out, &format!("  {}", artifact.display()));
        }
    }

    let ports: Vec<String> = plan
        .firewall_ports()
        .iter()
        .map(|port| format!("{}/tcp ({})", port.port, port.purpose))
        .collect();
    line(&mut out, "");
    field(&mut out, "Firewall", &ports.join(", "));

    line(&mut out, RULE);
    if plan.target.includes_panel() {
        line(
            &mut out,
            "Store these credentials somewhere safe. They are not shown again.",
        );
    }
    out
}

fn line(out: &mut String, text: &str) {
    let _ = writeln!(out, "{}", text);
}

fn field(out: &mut String, label: &str, value: &str) {
    let _ = writeln!(out, "  {:<16} {}", format!("{}:", label), value);
}

fn secret_label(value: &str, generated: bool) -> String {
    if generated {
        format!("{} (generated)", value)
    } else {
        value.to_string()
    }
}
