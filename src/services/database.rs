use crate::error::{ProvisionError, Result};
use crate::executor::CommandSpec;
use crate::models::{Credentials, DATABASE_HOST};
use secrecy::{ExposeSecret, SecretString};

const MAX_DATABASE_NAME: usize = 64;
const MAX_USER_NAME: usize = 32;
const LOCAL_HOSTS: [&str; 3] = ["localhost", "127.0.0.1", "::1"];

/// SQL that creates the panel database and its user, grants access, and
/// hardens what a fresh server ships with: anonymous accounts, the test
/// database, remote root logins and a root account without a password.
///
/// Re-running is safe: passwords are reset to the current ones so the
/// environment file, the root option file and the server never disagree.
pub fn setup_script(credentials: &Credentials, hostname: &str) -> Result<SecretString> {
    let database = checked_identifier("database name", &credentials.database_name, MAX_DATABASE_NAME)?;
    let user = checked_identifier("database user", &credentials.database_user, MAX_USER_NAME)?;
    let password = checked_password(&credentials.database_password)?;
    let root_password = checked_password(&credentials.database_root_password)?;
    let hostname = checked_hostname(hostname)?;

    let account = format!("'{}'@'{}'", user, DATABASE_HOST);
    let mut statements = vec![
        format!("CREATE DATABASE IF NOT EXISTS `{}`;", database),
        format!(
            "CREATE USER IF NOT EXISTS {} IDENTIFIED BY '{}';",
            account, password
        ),
        format!("ALTER USER {} IDENTIFIED BY '{}';", account, password),
        format!(
            "GRANT ALL PRIVILEGES ON `{}`.* TO {} WITH GRANT OPTION;",
            database, account
        ),
        "DROP USER IF EXISTS ''@'localhost';".to_string(),
        format!("DROP USER IF EXISTS ''@'{}';", hostname),
        "DROP DATABASE IF EXISTS test;".to_string(),
        "DELETE FROM mysql.db WHERE Db='test' OR Db='test\\_%';".to_string(),
        format!(
            "ALTER USER 'root'@'localhost' IDENTIFIED BY '{}';",
            root_password
        ),
    ];
    for host in ["127.0.0.1", "::1"] {
        statements.push(format!(
            "ALTER USER IF EXISTS 'root'@'{}' IDENTIFIED BY '{}';",
            host, root_password
        ));
    }
    // mysql.user is a view on current servers, so remote roots are dropped by name.
    statements.push("DROP USER IF EXISTS 'root'@'%';".to_string());
    if !LOCAL_HOSTS.contains(&hostname) {
        statements.push(format!("DROP USER IF EXISTS 'root'@'{}';", hostname));
    }
    statements.push("FLUSH PRIVILEGES;".to_string());

    let mut script = statements.join("\n");
    script.push('\n');
    Ok(SecretString::from(script))
}

/// Feeds `script` to the local server as root. Once a root password is set
/// the client reads it from root's option file.
pub fn mysql_command(script: SecretString) -> CommandSpec {
    CommandSpec::new("mysql").args(["-u", "root"]).stdin(script)
}

fn checked_identifier<'a>(label: &str, value: &'a str, max_len: usize) -> Result<&'a str> {
    let valid = !value.is_empty()
        && value.len() <= max_len
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(ProvisionError::Credential(format!(
            "Invalid {} '{}': use up to {} letters, digits or '_'",
            label, value, max_len
        )));
    }
    Ok(value)
}

fn checked_password(password: &SecretString) -> Result<&str> {
    let value = password.expose_secret();
    if value.is_empty() {
        return Err(ProvisionError::Credential(
            "Database password is empty".to_string(),
        ));
    }
    if value
        .chars()
        .any(|c| matches!(c, '\'' | '"' | '\\' | '`') || c.is_whitespace() || c.is_control())
    {
        return Err(ProvisionError::Credential(
            "Database password contains characters that cannot be quoted safely".to_string(),
        ));
    }
    Ok(value)
}

fn checked_hostname(hostname: &str) -> Result<&str> {
    let valid = !hostname.is_empty()
        && hostname
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
    if !valid {
        return Err(ProvisionError::Credential(format!(
            "Unexpected host name '{}'",
            hostname
        )));
    }
    Ok(hostname)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials(user: &str, password: &str) -> Credentials {
        Credentials {
            database_name: "panel".to_string(),
            database_user: user.to_string(),
            database_password: SecretString::from(password.to_string()),
            database_root_password: SecretString::from("RootPassword1234567".to_string()),
            admin_email: "admin@example.com".to_string(),
            admin_username: "admin".to_string(),
            admin_password: SecretString::from("AdminPassword1".to_string()),
            app_key: SecretString::from("base64:AAAA".to_string()),
            hashids_salt: SecretString::from("salt".to_string()),
            generated_database_password: true,
            generated_admin_password: true,
        }
    }

    #[test]
    fn grants_the_panel_user_on_loopback() {
        let script = setup_script(&credentials("pterodactyl", "Pw0rdPw0rdPw0rd1"), "node-1").unwrap();
        let sql = script.expose_secret();

        assert!(sql.starts_with("CREATE DATABASE IF NOT EXISTS `panel`;\n"));
        assert!(sql.contains(
            "CREATE USER IF NOT EXISTS 'pterodactyl'@'127.0.0.1' IDENTIFIED BY 'Pw0rdPw0rdPw0rd1';"
        ));
        assert!(sql.contains("ALTER USER 'pterodactyl'@'127.0.0.1' IDENTIFIED BY 'Pw0rdPw0rdPw0rd1';"));
        assert!(sql.contains(
            "GRANT ALL PRIVILEGES ON `panel`.* TO 'pterodactyl'@'127.0.0.1' WITH GRANT OPTION;"
        ));
        assert!(sql.contains("DROP USER IF EXISTS ''@'node-1';"));
        assert!(sql.contains("DROP DATABASE IF EXISTS test;"));
        assert!(sql.trim_end().ends_with("FLUSH PRIVILEGES;"));
    }

    #[test]
    fn hardens_the_root_account() {
        let script = setup_script(&credentials("pterodactyl", "Pw0rdPw0rdPw0rd1"), "node-1").unwrap();
        let sql = script.expose_secret();

        assert!(sql.contains("ALTER USER 'root'@'localhost' IDENTIFIED BY 'RootPassword1234567';"));
        assert!(sql.contains(
            "ALTER USER IF EXISTS 'root'@'127.0.0.1' IDENTIFIED BY 'RootPassword1234567';"
        ));
        assert!(sql.contains("ALTER USER IF EXISTS 'root'@'::1' IDENTIFIED BY 'RootPassword1234567';"));
        assert!(sql.contains("DROP USER IF EXISTS 'root'@'%';"));
        assert!(sql.contains("DROP USER IF EXISTS 'root'@'node-1';"));
        assert!(!sql.contains("DROP USER IF EXISTS 'root'@'localhost'"));
    }

    #[test]
    fn local_hostname_keeps_root_login() {
        let script =
            setup_script(&credentials("pterodactyl", "Pw0rdPw0rdPw0rd1"), "localhost").unwrap();
        let sql = script.expose_secret();
        assert!(!sql.contains("DROP USER IF EXISTS 'root'@'localhost'"));
        assert!(sql.contains("ALTER USER 'root'@'localhost'"));
    }

    #[test]
    fn empty_root_password_is_rejected() {
        let mut credentials = credentials("pterodactyl", "Pw0rdPw0rdPw0rd1");
        credentials.database_root_password = SecretString::from(String::new());
        let err = setup_script(&credentials, "node-1").unwrap_err();
        assert!(matches!(err, ProvisionError::Credential(_)));
    }

    #[test]
    fn rejects_unsafe_identifiers() {
        let err = setup_script(&credentials("ptero'; DROP", "Pw0rdPw0rdPw0rd1"), "node-1").unwrap_err();
        assert!(matches!(err, ProvisionError::Credential(_)));

        let err = setup_script(&credentials(&"u".repeat(33), "Pw0rdPw0rdPw0rd1"), "node-1").unwrap_err();
        assert!(matches!(err, ProvisionError::Credential(_)));
    }

    #[test]
    fn rejects_unquotable_passwords() {
        for password in ["", "it's", "back\\slash", "two words"] {
            let err = setup_script(&credentials("pterodactyl", password), "node-1").unwrap_err();
            assert!(matches!(err, ProvisionError::Credential(_)), "{password:?}");
        }
    }

    #[test]
    fn command_keeps_the_script_off_the_command_line() {
        let script = setup_script(&credentials("pterodactyl", "Pw0rdPw0rdPw0rd1"), "node-1").unwrap();
        let spec = mysql_command(script);
        assert_eq!(spec.to_string(), "mysql -u root < ********");
        assert!(spec.exposed_stdin().unwrap().contains("FLUSH PRIVILEGES;"));
    }
}
