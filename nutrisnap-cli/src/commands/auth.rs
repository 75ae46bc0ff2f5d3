use std::path::Path;

use clap::{Args, Subcommand};
use nutrisnap_core::{HttpRemoteStore, RemoteError};

use crate::config::Config;

#[derive(Args)]
pub struct AuthCommand {
    #[command(subcommand)]
    command: AuthSubcommand,
}

#[derive(Subcommand)]
enum AuthSubcommand {
    /// Save an API key issued by the server admin
    Login {
        /// API key
        key: String,

        /// Server URL to save alongside the key
        #[arg(long)]
        server: Option<String>,
    },

    /// Remove the saved API key
    Logout,

    /// Show which account this device uses
    Status,
}

impl AuthCommand {
    pub async fn run(&self, config: &Config) -> Result<(), AuthError> {
        match &self.command {
            AuthSubcommand::Login { key, server } => login(config, key, server.as_deref()).await,
            AuthSubcommand::Logout => logout(config),
            AuthSubcommand::Status => status(config).await,
        }
    }
}

#[derive(Debug)]
pub enum AuthError {
    Remote(RemoteError),
    ConfigError(String),
    NotConfigured,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::Remote(e) => write!(f, "Server error: {}", e),
            AuthError::ConfigError(e) => write!(f, "Config error: {}", e),
            AuthError::NotConfigured => write!(
                f,
                "Sync server not configured. Set sync.server_url in config or pass --server."
            ),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<RemoteError> for AuthError {
    fn from(e: RemoteError) -> Self {
        AuthError::Remote(e)
    }
}

/// Checks the key against the server, then saves it.
async fn login(config: &Config, key: &str, server: Option<&str>) -> Result<(), AuthError> {
    let server_url = server
        .map(str::to_string)
        .or_else(|| config.sync.server_url.clone())
        .ok_or(AuthError::NotConfigured)?;

    let account = HttpRemoteStore::new(server_url.clone(), key.to_string())
        .fetch_account()
        .await?;

    let config_path = config.writable_path();
    let mut values = vec![("api_key", key)];
    if server.is_some() {
        values.push(("server_url", server_url.as_str()));
    }
    update_sync_section(&config_path, &values, &[])?;

    let label = account.email.as_deref().unwrap_or(&account.user_id);
    if account.anonymous {
        println!("Signed in as guest {}", label);
    } else {
        println!("Signed in as {}", label);
        println!("This device's food log will be moved to your account on the next command.");
    }
    Ok(())
}

fn logout(config: &Config) -> Result<(), AuthError> {
    let config_path = config.writable_path();
    if !config_path.exists() {
        println!("Already logged out (no config file).");
        return Ok(());
    }

    update_sync_section(&config_path, &[], &["api_key"])?;
    println!("Logged out. New entries are kept on this device.");
    Ok(())
}

async fn status(config: &Config) -> Result<(), AuthError> {
    let (Some(url), Some(key)) = (&config.sync.server_url, &config.sync.api_key) else {
        if config.sync.server_url.is_some() {
            println!("Not logged in. Run 'snap auth login <key>' to authenticate.");
        } else {
            println!("Not configured. Entries are kept on this device.");
        }
        return Ok(());
    };

    println!("Server:  {}", url);
    println!("API key: {}", mask_key(key));
    match HttpRemoteStore::new(url.clone(), key.clone())
        .fetch_account()
        .await
    {
        Ok(account) => {
            println!("User:    {}", account.user_id);
            if let Some(email) = &account.email {
                println!("Email:   {}", email);
            }
            println!(
                "Mode:    {}",
                if account.anonymous { "guest" } else { "account" }
            );
        }
        Err(e) => println!("Status:  unreachable ({})", e),
    }
    Ok(())
}

fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    } else {
        "****".to_string()
    }
}

/// Sets and removes keys of the `sync` section, leaving the rest of the
/// file untouched.
fn update_sync_section(
    config_path: &Path,
    set: &[(&str, &str)],
    remove: &[&str],
) -> Result<(), AuthError> {
    let mut config: serde_yaml::Value = if config_path.exists() {
        let contents = std::fs::read_to_string(config_path)
            .map_err(|e| AuthError::ConfigError(e.to_string()))?;
        serde_yaml::from_str(&contents).map_err(|e| AuthError::ConfigError(e.to_string()))?
    } else {
        serde_yaml::Value::Mapping(serde_yaml::Mapping::new())
    };
    if config.is_null() {
        config = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());
    }

    let mapping = config
        .as_mapping_mut()
        .ok_or_else(|| AuthError::ConfigError("Invalid config format".to_string()))?;

    let sync_key = serde_yaml::Value::String("sync".to_string());
    if !mapping.contains_key(&sync_key) {
        mapping.insert(
            sync_key.clone(),
            serde_yaml::Value::Mapping(serde_yaml::Mapping::new()),
        );
    }

    let sync = mapping
        .get_mut(&sync_key)
        .and_then(|s| s.as_mapping_mut())
        .ok_or_else(|| AuthError::ConfigError("Invalid sync section".to_string()))?;
    for (key, value) in set {
        sync.insert(
            serde_yaml::Value::String(key.to_string()),
            serde_yaml::Value::String(value.to_string()),
        );
    }
    for key in remove {
        sync.remove(serde_yaml::Value::String(key.to_string()));
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| AuthError::ConfigError(e.to_string()))?;
    }
    let yaml = serde_yaml::to_string(&config).map_err(|e| AuthError::ConfigError(e.to_string()))?;
    std::fs::write(config_path, yaml).map_err(|e| AuthError::ConfigError(e.to_string()))?;
    Ok(())
}
