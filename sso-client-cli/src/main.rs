mod callback_server;
mod commands;

use clap::{Parser, Subcommand};
use sso_client::ConfigManager;
use sso_client::api::VerificationPurpose;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "sso-client",
    version,
    about = "SSO login client (OAuth 2.0 authorization code + PKCE)"
)]
struct Cli {
    /// Config file (default: ~/.sso-client/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an authorization attempt and print the login center URL
    Begin {
        /// Session scope the PKCE parameters are kept in
        #[arg(short, long, default_value = "default")]
        session: String,

        /// Don't try to open a browser
        #[arg(long)]
        no_browser: bool,

        /// Wait for the callback on the redirect URI and finish the flow here
        #[arg(long)]
        listen: bool,

        /// Seconds to wait for the callback when listening
        #[arg(long, default_value = "300")]
        timeout: u64,
    },

    /// Finish an authorization attempt from the URL the browser was sent back to
    Callback {
        /// Full callback URL, including the query string
        url: String,

        #[arg(short, long, default_value = "default")]
        session: String,

        /// Validate only; don't exchange the code for tokens
        #[arg(long)]
        no_exchange: bool,
    },

    /// Email a one-time verification code
    SendCode {
        #[arg(short, long)]
        email: String,

        /// login or register
        #[arg(short, long, default_value = "login")]
        purpose: VerificationPurpose,
    },

    /// Create an account with an emailed code
    Register {
        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        code: String,

        #[arg(short, long)]
        name: Option<String>,
    },

    /// Log in to the login center, optionally approving a client's authorization URL
    Login {
        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        code: String,

        /// Authorization URL a client sent the user to
        #[arg(long)]
        authorize: Option<String>,

        /// End the login center session before exiting
        #[arg(long)]
        logout: bool,
    },

    /// Show or change configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Set one value, e.g. `config set redirect_uri http://127.0.0.1:8976/callback`
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sso_client=info,sso_client_cli=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let manager = cli
        .config
        .map(ConfigManager::new)
        .unwrap_or_else(ConfigManager::default_path);

    match cli.command {
        Commands::Begin {
            session,
            no_browser,
            listen,
            timeout,
        } => {
            commands::run_begin(&manager, &session, !no_browser, listen.then_some(timeout)).await?;
        }
        Commands::Callback {
            url,
            session,
            no_exchange,
        } => {
            commands::run_callback(&manager, &session, &url, !no_exchange).await?;
        }
        Commands::SendCode { email, purpose } => {
            commands::run_send_code(&manager, &email, purpose).await?;
        }
        Commands::Register { email, code, name } => {
            commands::run_register(&manager, &email, &code, name.as_deref()).await?;
        }
        Commands::Login {
            email,
            code,
            authorize,
            logout,
        } => {
            commands::run_login(&manager, &email, &code, authorize.as_deref(), logout).await?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::run_config_show(&manager)?,
            ConfigAction::Set { key, value } => commands::run_config_set(&manager, &key, &value)?,
        },
    }

    Ok(())
}
