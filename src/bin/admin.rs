//! NutriSnap Admin CLI
//!
//! Issues and revokes the API keys the server accepts.
//!
//! # Usage
//!
//! ```bash
//! nutrisnap-admin key add alice --email alice@example.com
//! nutrisnap-admin key add guest-7f3a --anonymous
//! nutrisnap-admin key add alice --merge-from guest-7f3a
//! nutrisnap-admin key list
//! nutrisnap-admin key remove <key>
//! ```
//!
//! # Environment Variables
//!
//! - `NUTRISNAP_CONFIG`: Path to the server config file
//!   (default: ~/.config/nutrisnap-server/config.yaml)

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use clap::{Args, Parser, Subcommand};
use nutrisnap_server::server::UserStorage;
use nutrisnap_server::{ApiKeyEntry, ConfigFile, ServerConfig};
use rand::Rng;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "nutrisnap-admin")]
#[command(version)]
#[command(about = "NutriSnap server administration tool")]
struct Cli {
    /// Path to the server config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage API keys
    Key(KeyCommand),
}

#[derive(Args)]
struct KeyCommand {
    #[command(subcommand)]
    command: KeySubcommand,
}

#[derive(Subcommand)]
enum KeySubcommand {
    /// Issue a new key for a user
    Add {
        /// User ID the key grants access to
        user_id: String,
        /// Email shown for the account
        #[arg(long, short)]
        email: Option<String>,
        /// Mark the account as a guest whose log may be claimed by another account
        #[arg(long)]
        anonymous: bool,
        /// Anonymous user ID whose entries this key may list (repeatable)
        #[arg(long = "merge-from", value_name = "USER_ID")]
        merge_from: Vec<String>,
    },
    /// List issued keys
    List,
    /// Revoke a key
    Remove {
        /// The key to revoke
        key: String,
    },
}

/// 32 random bytes, base64url without padding.
fn generate_key() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn mask_key(key: &str) -> String {
    match (key.get(..6), key.len() > 12) {
        (Some(head), true) => format!("{}...", head),
        _ => "******".to_string(),
    }
}

fn add_key(
    file: &mut ConfigFile,
    user_id: String,
    email: Option<String>,
    anonymous: bool,
    merge_from: Vec<String>,
) -> Result<ApiKeyEntry, Box<dyn std::error::Error>> {
    UserStorage::validate_user_id(&user_id)?;
    for uid in &merge_from {
        UserStorage::validate_user_id(uid)?;
        if file.api_keys.iter().any(|k| &k.user_id == uid && !k.anonymous) {
            return Err(format!("User '{}' is not anonymous", uid).into());
        }
    }

    if let Some(existing) = file.api_keys.iter().find(|k| k.user_id == user_id) {
        if existing.anonymous != anonymous {
            return Err(format!(
                "User '{}' already has keys with anonymous={}",
                user_id, existing.anonymous
            )
            .into());
        }
    }

    let entry = ApiKeyEntry {
        key: generate_key(),
        user_id,
        email,
        anonymous,
        merge_from,
    };
    file.api_keys.push(entry.clone());
    Ok(entry)
}

fn remove_key(file: &mut ConfigFile, key: &str) -> Option<ApiKeyEntry> {
    let index = file.api_keys.iter().position(|k| k.key == key)?;
    Some(file.api_keys.remove(index))
}

fn print_keys(file: &ConfigFile) {
    if file.api_keys.is_empty() {
        println!("No keys issued.");
        return;
    }

    println!("{:<12} {:<24} {:<32} {:<6}", "KEY", "USER", "EMAIL", "GUEST");
    println!("{}", "-".repeat(76));
    for entry in &file.api_keys {
        println!(
            "{:<12} {:<24} {:<32} {:<6}",
            mask_key(&entry.key),
            entry.user_id,
            entry.email.as_deref().unwrap_or(""),
            if entry.anonymous { "yes" } else { "" }
        );
    }
    println!();
    println!("Total: {} key(s)", file.api_keys.len());
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let path = cli
        .config
        .or_else(|| std::env::var("NUTRISNAP_CONFIG").ok().map(PathBuf::from))
        .unwrap_or_else(ServerConfig::default_config_path);
    let mut file = ConfigFile::load(&path)?;

    match cli.command {
        Commands::Key(key_cmd) => match key_cmd.command {
            KeySubcommand::Add {
                user_id,
                email,
                anonymous,
                merge_from,
            } => {
                let entry = add_key(&mut file, user_id, email, anonymous, merge_from)?;
                file.save(&path)?;
                println!("Issued key for {}:", entry.user_id);
                println!("  {}", entry.key);
                println!("Restart the server to activate it.");
            }
            KeySubcommand::List => print_keys(&file),
            KeySubcommand::Remove { key } => match remove_key(&mut file, &key) {
                Some(entry) => {
                    file.save(&path)?;
                    println!("Revoked key for {}", entry.user_id);
                }
                None => return Err("Key not found".into()),
            },
        },
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
