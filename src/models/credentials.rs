use secrecy::SecretString;

/// Host the panel's database user is scoped to.
pub const DATABASE_HOST: &str = "127.0.0.1";
pub const DATABASE_PORT: u16 = 3306;

/// Secrets and identities for a panel install.
///
/// Built once during planning. Every sink (database grant, environment file,
/// admin account, summary) reads from the same instance.
#[derive(Debug)]
pub struct Credentials {
    pub database_name: String,
    pub database_user: String,
    pub database_password: SecretString,
    /// Replaces the server's empty or socket-only root login.
    pub database_root_password: SecretString,
    pub admin_email: String,
    pub admin_username: String,
    pub admin_password: SecretString,
    pub app_key: SecretString,
    pub hashids_salt: SecretString,
    pub generated_database_password: bool,
    pub generated_admin_password: bool,
}
