use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Panel,
    Agent,
    Both,
}

impl Target {
    pub fn includes_panel(&self) -> bool {
        matches!(self, Target::Panel | Target::Both)
    }

    pub fn includes_agent(&self) -> bool {
        matches!(self, Target::Agent | Target::Both)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebServer {
    Nginx,
    Apache,
}

impl fmt::Display for WebServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebServer::Nginx => f.write_str("nginx"),
            WebServer::Apache => f.write_str("apache"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionDriver {
    Redis,
    Database,
}

impl SessionDriver {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionDriver::Redis => "redis",
            SessionDriver::Database => "database",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "redis" => Some(SessionDriver::Redis),
            "database" => Some(SessionDriver::Database),
            _ => None,
        }
    }
}

/// Cache, queue and session backends written into the panel environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backends {
    pub cache: &'static str,
    pub queue: &'static str,
    pub session: SessionDriver,
}

impl Backends {
    pub fn with_session(session: SessionDriver) -> Self {
        Self {
            cache: "redis",
            queue: "redis",
            session,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelSettings {
    pub domain: String,
    pub web_server: WebServer,
    pub request_certificate: bool,
    pub admin_first_name: String,
    pub admin_last_name: String,
}

impl PanelSettings {
    pub fn app_url(&self) -> String {
        let scheme = if self.request_certificate {
            "https"
        } else {
            "http"
        };
        format!("{}://{}", scheme, self.domain)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSettings {
    pub domain: Option<String>,
    pub request_certificate: bool,
    pub certificate_email: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirewallPort {
    pub port: u16,
    pub purpose: &'static str,
}

/// What to install. Chosen once by the operator and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPlan {
    pub target: Target,
    pub panel: Option<PanelSettings>,
    pub agent: Option<AgentSettings>,
    pub backends: Backends,
}

impl InstallPlan {
    pub fn web_server(&self) -> Option<WebServer> {
        self.panel.as_ref().map(|panel| panel.web_server)
    }

    pub fn wants_certificate(&self) -> bool {
        self.panel
            .as_ref()
            .is_some_and(|panel| panel.request_certificate)
            || self.agent_certificate_domain().is_some()
    }

    /// Agent domain that needs its own certificate, if any.
    pub fn agent_certificate_domain(&self) -> Option<&str> {
        let agent = self.agent.as_ref()?;
        if !agent.request_certificate {
            return None;
        }
        let domain = agent.domain.as_deref()?;
        let covered_by_panel = self
            .panel
            .as_ref()
            .is_some_and(|panel| panel.request_certificate && panel.domain == domain);
        if covered_by_panel { None } else { Some(domain) }
    }

    /// Allow-list for the firewall. SSH is always kept open.
    pub fn firewall_ports(&self) -> Vec<FirewallPort> {
        let mut ports = vec![FirewallPort {
            port: 22,
            purpose: "ssh",
        }];
        let agent_acme = self
            .agent
            .as_ref()
            .is_some_and(|agent| agent.request_certificate);
        if self.target.includes_panel() || agent_acme {
            ports.push(FirewallPort {
                port: 80,
                purpose: "http",
            });
            ports.push(FirewallPort {
                port: 443,
                purpose: "https",
            });
        }
        if self.target.includes_agent() {
            ports.push(FirewallPort {
                port: 8080,
                purpose: "wings api",
            });
            ports.push(FirewallPort {
                port: 2022,
                purpose: "wings sftp",
            });
        }
        ports
    }
}
