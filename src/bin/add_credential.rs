// Credential File Maintenance
//
// Purpose: Add a user to the credential YAML read by /sailing/auth
// Usage: cargo run --bin add_credential -- --username alice [--role admin]
//
// The password comes from --password / SAILING_PASSWORD, or else two lines
// on stdin (password, then confirmation).

use anyhow::{bail, Context, Result};
use clap::Parser;
use sailing_metrics::auth::{CredentialStore, DEFAULT_ITERATIONS, DEFAULT_ROLE, MIN_PASSWORD_LEN};
use std::io::BufRead;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(about = "Add a user to the sailing metrics credential file")]
struct Args {
    /// Credential file to create or extend
    #[arg(long, env = "AUTH_FILE", default_value = "sailing_auth.yaml")]
    auth_file: PathBuf,

    #[arg(long)]
    username: String,

    #[arg(long, default_value = DEFAULT_ROLE)]
    role: String,

    /// Password; read from stdin when omitted
    #[arg(long, env = "SAILING_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// PBKDF2 work factor for the new hash
    #[arg(long, default_value_t = DEFAULT_ITERATIONS)]
    iterations: u32,
}

fn read_password_from_stdin() -> Result<String> {
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();

    eprintln!("Password (min {} characters), then confirmation:", MIN_PASSWORD_LEN);
    let password = lines.next().context("No password on stdin")??;
    let confirm = lines.next().context("No password confirmation on stdin")??;

    let password = password.trim().to_string();
    if password != confirm.trim() {
        bail!("Passwords don't match");
    }
    Ok(password)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sailing_metrics=info,warn".into()),
        )
        .init();

    let args = Args::parse();
    let username = args.username.trim();

    let password = match args.password {
        Some(p) => p,
        None => read_password_from_stdin()?,
    };

    let store = CredentialStore::new(&args.auth_file).with_iterations(args.iterations);
    store
        .add_user(username, &password, Some(&args.role))
        .with_context(|| format!("Failed to add user '{}'", username))?;

    println!("Added user '{}' with role '{}'", username, args.role.trim());
    println!("Credentials saved to {}", args.auth_file.display());
    Ok(())
}
