use crate::config::Config;
use crate::error::{ProvisionError, Result};
use crate::models::{
    AgentSettings, Backends, Credentials, HostProfile, InstallPlan, PanelSettings, Target,
    WebServer,
};
use crate::services::secrets;
use crate::ui;
use dialoguer::{Confirm, Input, Password};
use secrecy::SecretString;

pub const MENU: [&str; 4] = [
    "[1] Install the panel",
    "[2] Install Wings (node agent)",
    "[3] Install the panel and Wings on this machine",
    "[4] Cancel",
];

const FORBIDDEN_PASSWORD_CHARS: [char; 7] = ['\'', '"', '\\', '$', '`', '{', '}'];
const MIN_SUPPLIED_PASSWORD: usize = 8;

pub trait Prompter {
    fn input(&mut self, prompt: &str, default: Option<&str>) -> Result<String>;

    /// Read without echo. Empty input is allowed.
    fn password(&mut self, prompt: &str) -> Result<String>;

    fn confirm(&mut self, prompt: &str, default: bool) -> Result<bool>;

    fn show(&mut self, line: &str);

    fn reject(&mut self, message: &str);
}

pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn input(&mut self, prompt: &str, default: Option<&str>) -> Result<String> {
        let mut input = Input::<String>::new().with_prompt(prompt).allow_empty(true);
        if let Some(default) = default {
            input = input.default(default.to_string());
        }
        Ok(input.interact_text()?.trim().to_string())
    }

    fn password(&mut self, prompt: &str) -> Result<String> {
        Ok(Password::new()
            .with_prompt(prompt)
            .with_confirmation("Repeat password", "Passwords do not match")
            .allow_empty_password(true)
            .interact()?)
    }

    fn confirm(&mut self, prompt: &str, default: bool) -> Result<bool> {
        Ok(Confirm::new()
            .with_prompt(prompt)
            .default(default)
            .interact()?)
    }

    fn show(&mut self, line: &str) {
        println!("{}", line);
    }

    fn reject(&mut self, message: &str) {
        ui::error(message);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Install(Target),
    Cancel,
}

pub fn parse_menu_choice(input: &str) -> Option<MenuChoice> {
    match input.trim() {
        "1" => Some(MenuChoice::Install(Target::Panel)),
        "2" => Some(MenuChoice::Install(Target::Agent)),
        "3" => Some(MenuChoice::Install(Target::Both)),
        "4" => Some(MenuChoice::Cancel),
        _ => None,
    }
}

/// Shows the menu until a listed option is picked.
pub fn choose_target<P: Prompter>(prompter: &mut P) -> Result<MenuChoice> {
    for line in MENU {
        prompter.show(line);
    }
    loop {
        let answer = prompter.input("Select an option", None)?;
        match parse_menu_choice(&answer) {
            Some(choice) => return Ok(choice),
            None => prompter.reject(&format!(
                "Invalid option '{}', enter a number from 1 to {}",
                answer.trim(),
                MENU.len()
            )),
        }
    }
}

fn ask<P, T, F>(prompter: &mut P, prompt: &str, default: Option<&str>, validate: F) -> Result<T>
where
    P: Prompter,
    F: Fn(&str) -> std::result::Result<T, String>,
{
    loop {
        let answer = prompter.input(prompt, default)?;
        match validate(&answer) {
            Ok(value) => return Ok(value),
            Err(reason) => prompter.reject(&reason),
        }
    }
}

/// Returns the password and whether it was generated.
fn ask_password<P: Prompter>(
    prompter: &mut P,
    prompt: &str,
    length: usize,
) -> Result<(SecretString, bool)> {
    loop {
        let answer = prompter.password(prompt)?;
        match validate_supplied_password(&answer) {
            Ok(Some(password)) => return Ok((SecretString::from(password), false)),
            Ok(None) => return Ok((secrets::generate_password(length), true)),
            Err(reason) => prompter.reject(&reason),
        }
    }
}

pub fn validate_domain(input: &str) -> std::result::Result<String, String> {
    let domain = input.trim().trim_end_matches('.').to_ascii_lowercase();
    if domain.contains("://") || domain.contains('/') {
        return Err("Enter a bare domain without scheme or path".to_string());
    }
    if domain.len() > 253 || !domain.contains('.') {
        return Err(format!("'{}' is not a fully qualified domain name", domain));
    }
    let labels_valid = domain.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    });
    if !labels_valid {
        return Err(format!("'{}' is not a valid domain name", domain));
    }
    Ok(domain)
}

pub fn validate_email(input: &str) -> std::result::Result<String, String> {
    let email = input.trim();
    let Some((local, domain)) = email.split_once('@') else {
        return Err(format!("'{}' is not a valid email address", email));
    };
    let local_valid = !local.is_empty()
        && local.len() <= 64
        && local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '%' | '+' | '-'));
    if !local_valid || domain.contains('@') {
        return Err(format!("'{}' is not a valid email address", email));
    }
    let domain = validate_domain(domain)
        .map_err(|_| format!("'{}' is not a valid email address", email))?;
    Ok(format!("{}@{}", local, domain))
}

pub fn validate_username(input: &str) -> std::result::Result<String, String> {
    let username = input.trim();
    if username.is_empty()
        || username.len() > 191
        || !username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err("Username may only contain letters, numbers, '_', '-' and '.'".to_string());
    }
    Ok(username.to_string())
}

pub fn validate_name(input: &str) -> std::result::Result<String, String> {
    let name = input.trim();
    if name.is_empty() || name.chars().any(char::is_control) || name.contains('"') {
        return Err("Name cannot be empty or contain quotes".to_string());
    }
    Ok(name.to_string())
}

pub fn validate_identifier(input: &str, max_len: usize) -> std::result::Result<String, String> {
    let identifier = input.trim();
    if identifier.is_empty()
        || identifier.len() > max_len
        || !identifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(format!(
            "'{}' must be 1-{} characters of letters, numbers and '_'",
            identifier, max_len
        ));
    }
    Ok(identifier.to_string())
}

/// `Ok(None)` means "generate one".
pub fn validate_supplied_password(input: &str) -> std::result::Result<Option<String>, String> {
    if input.is_empty() {
        return Ok(None);
    }
    if input.chars().any(char::is_whitespace)
        || input.chars().any(|c| FORBIDDEN_PASSWORD_CHARS.contains(&c))
    {
        return Err("Password cannot contain whitespace, quotes, braces, '\\', '$' or '`'".to_string());
    }
    if input.len() < MIN_SUPPLIED_PASSWORD {
        return Err(format!(
            "Password must be at least {} characters",
            MIN_SUPPLIED_PASSWORD
        ));
    }
    Ok(Some(input.to_string()))
}

pub fn parse_web_server(input: &str) -> std::result::Result<WebServer, String> {
    match input.trim().to_ascii_lowercase().as_str() {
        "1" | "nginx" => Ok(WebServer::Nginx),
        "2" | "apache" => Ok(WebServer::Apache),
        other => Err(format!("Invalid web server '{}', enter 1 or 2", other)),
    }
}

fn optional_domain(input: &str) -> std::result::Result<Option<String>, String> {
    if input.trim().is_empty() {
        return Ok(None);
    }
    validate_domain(input).map(Some)
}

/// Everything decided before the first mutating step.
pub struct PlanDecision {
    pub plan: InstallPlan,
    pub credentials: Option<Credentials>,
}

/// Collects the operator's choices. `None` when the operator cancels.
pub fn collect_plan<P: Prompter>(
    prompter: &mut P,
    profile: &HostProfile,
    config: &Config,
) -> Result<Option<PlanDecision>> {
    let target = match choose_target(prompter)? {
        MenuChoice::Install(target) => target,
        MenuChoice::Cancel => return Ok(None),
    };

    if target.includes_agent() && profile.arch.release_suffix().is_none() {
        return Err(ProvisionError::Precondition(format!(
            "Wings is not published for architecture {}",
            profile.arch
        )));
    }

    let mut panel = None;
    let mut credentials = None;
    if target.includes_panel() {
        let (settings, creds) = collect_panel(prompter, config)?;
        panel = Some(settings);
        credentials = Some(creds);
    }

    let agent = if target.includes_agent() {
        Some(collect_agent(prompter, panel.as_ref(), credentials.as_ref())?)
    } else {
        None
    };

    let plan = InstallPlan {
        target,
        panel,
        agent,
        backends: Backends::with_session(config.session_driver),
    };
    tracing::debug!("Install plan: {:?}", plan);
    Ok(Some(PlanDecision { plan, credentials }))
}

fn collect_panel<P: Prompter>(
    prompter: &mut P,
    config: &Config,
) -> Result<(PanelSettings, Credentials)> {
    let domain = ask(prompter, "Panel domain (FQDN)", None, validate_domain)?;
    let admin_email = ask(prompter, "Admin email", None, validate_email)?;
    let admin_username = ask(prompter, "Admin username", Some("admin"), validate_username)?;
    let admin_first_name = ask(prompter, "Admin first name", Some("Admin"), validate_name)?;
    let admin_last_name = ask(prompter, "Admin last name", Some("User"), validate_name)?;
    let (admin_password, generated_admin_password) = ask_password(
        prompter,
        "Admin password (leave empty to generate)",
        config.password_length,
    )?;

    let database_name = ask(prompter, "Database name", Some("panel"), |s| {
        validate_identifier(s, 64)
    })?;
    let database_user = ask(prompter, "Database user", Some("pterodactyl"), |s| {
        validate_identifier(s, 32)
    })?;
    let (database_password, generated_database_password) = ask_password(
        prompter,
        "Database password (leave empty to generate)",
        config.password_length,
    )?;

    let web_server = ask(
        prompter,
        "Web server: [1] nginx [2] apache",
        Some("1"),
        parse_web_server,
    )?;
    let request_certificate = prompter.confirm(
        &format!("Request a Let's Encrypt certificate for {}?", domain),
        true,
    )?;

    let settings = PanelSettings {
        domain,
        web_server,
        request_certificate,
        admin_first_name,
        admin_last_name,
    };
    let credentials = Credentials {
        database_name,
        database_user,
        database_password,
        database_root_password: secrets::generate_password(config.password_length),
        admin_email,
        admin_username,
        admin_password,
        app_key: secrets::generate_app_key(),
        hashids_salt: secrets::generate_hashids_salt(),
        generated_database_password,
        generated_admin_password,
    };
    Ok((settings, credentials))
}

fn collect_agent<P: Prompter>(
    prompter: &mut P,
    panel: Option<&PanelSettings>,
    credentials: Option<&Credentials>,
) -> Result<AgentSettings> {
    let default_domain = panel.map(|panel| panel.domain.as_str());
    let domain = ask(
        prompter,
        "Wings FQDN (leave empty to skip TLS)",
        default_domain,
        optional_domain,
    )?;

    let Some(domain) = domain else {
        return Ok(AgentSettings {
            domain: None,
            request_certificate: false,
            certificate_email: None,
        });
    };

    let request_certificate = prompter.confirm(
        &format!("Request a Let's Encrypt certificate for {}?", domain),
        true,
    )?;
    let certificate_email = match (request_certificate, credentials) {
        (false, _) => None,
        (true, Some(credentials)) => Some(credentials.admin_email.clone()),
        (true, None) => Some(ask(
            prompter,
            "Email for Let's Encrypt",
            None,
            validate_email,
        )?),
    };

    Ok(AgentSettings {
        domain: Some(domain),
        request_certificate,
        certificate_email,
    })
}
