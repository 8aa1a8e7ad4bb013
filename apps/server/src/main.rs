use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use taskhub_auth::JwtManager;
use taskhub_config::{load as load_config, AppConfig};
use taskhub_gateway::create_router;
use taskhub_realtime::{Identity, Role, UserProfile};
use taskhub_runtime::{shutdown_signal, telemetry, BackendServices};
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser)]
#[command(name = "taskhub-server")]
#[command(about = "TaskHub realtime presence, messaging and notification server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP, websocket and long-poll server (default)
    Serve {
        /// Keep messages and presence in memory instead of SQLite
        #[arg(long)]
        in_memory: bool,
        /// Seed a user as id:username[:role], repeatable
        #[arg(long = "user", value_name = "ID:NAME[:ROLE]")]
        users: Vec<String>,
    },
    /// Print a signed credential for local testing
    IssueToken {
        user_id: String,
        #[arg(long, default_value = "user")]
        role: String,
    },
    /// Create or update a user in the database
    AddUser {
        id: String,
        username: String,
        #[arg(long, default_value = "user")]
        role: String,
        #[arg(long)]
        avatar: Option<String>,
    },
    /// List users with their stored presence
    Presence,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing().context("failed to initialise tracing")?;
    let config = load_config().context("failed to load configuration")?;

    match cli.command.unwrap_or(Commands::Serve {
        in_memory: false,
        users: Vec::new(),
    }) {
        Commands::Serve { in_memory, users } => run_server(config, in_memory, &users).await,
        Commands::IssueToken { user_id, role } => issue_token(&config, user_id, &role),
        Commands::AddUser {
            id,
            username,
            role,
            avatar,
        } => {
            let mut profile = UserProfile::new(id, username, parse_role(&role)?);
            profile.avatar = avatar;
            add_user(&config, profile).await
        }
        Commands::Presence => show_presence(&config).await,
    }
}

async fn run_server(config: AppConfig, in_memory: bool, users: &[String]) -> anyhow::Result<()> {
    info!(in_memory, "starting TaskHub realtime server");

    let services = BackendServices::initialise(&config, in_memory)
        .await
        .context("failed to initialise backend services")?;
    services.storage.reset_presence().await?;
    for seed in users {
        let profile = parse_seed_user(seed)?;
        services.storage.add_user(&profile).await?;
        info!(user_id = %profile.id, "seeded user");
    }

    let state = services.gateway_state(&config.realtime);
    let background = services.spawn_background(&state);
    let app = create_router(state, &config.http);

    let address = format!("{}:{}", config.http.address, config.http.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind http listener on {address}"))?;

    info!(%address, "http server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server error")?;

    background.shutdown();
    info!("server shut down");
    Ok(())
}

fn issue_token(config: &AppConfig, user_id: String, role: &str) -> anyhow::Result<()> {
    let identity = Identity::new(user_id, parse_role(role)?);
    let token = JwtManager::from_config(&config.auth)
        .issue(&identity)
        .context("failed to sign token")?;
    println!("{token}");
    Ok(())
}

async fn add_user(config: &AppConfig, profile: UserProfile) -> anyhow::Result<()> {
    let services = BackendServices::initialise(config, false)
        .await
        .context("failed to initialise backend services")?;
    services.storage.add_user(&profile).await?;
    println!("stored {} ({}, {})", profile.id, profile.username, profile.role.as_str());
    Ok(())
}

async fn show_presence(config: &AppConfig) -> anyhow::Result<()> {
    let services = BackendServices::initialise(config, false)
        .await
        .context("failed to initialise backend services")?;
    let users = services
        .hub
        .users()
        .list_users()
        .await
        .context("failed to list users")?;

    if users.is_empty() {
        println!("No users found");
        return Ok(());
    }

    println!(
        "{:<24} {:<20} {:<8} {:<8} {:<25}",
        "ID", "Username", "Role", "Online", "Last Active"
    );
    println!("{}", "-".repeat(88));
    for user in users {
        println!(
            "{:<24} {:<20} {:<8} {:<8} {:<25}",
            user.id.as_str(),
            user.username,
            user.role.as_str(),
            user.is_online,
            user.last_active
                .map(|at| at.to_rfc3339())
                .unwrap_or_else(|| "never".to_string())
        );
    }
    Ok(())
}

fn parse_role(raw: &str) -> anyhow::Result<Role> {
    Role::parse(raw).ok_or_else(|| anyhow!("unknown role {raw:?}, expected user or admin"))
}

fn parse_seed_user(raw: &str) -> anyhow::Result<UserProfile> {
    let mut parts = raw.split(':');
    let (Some(id), Some(username)) = (parts.next(), parts.next()) else {
        bail!("invalid user {raw:?}, expected id:username[:role]");
    };
    if id.is_empty() || username.is_empty() {
        bail!("invalid user {raw:?}, id and username are required");
    }
    let role = match parts.next() {
        Some(role) => parse_role(role)?,
        None => Role::User,
    };
    if parts.next().is_some() {
        bail!("invalid user {raw:?}, too many fields");
    }
    Ok(UserProfile::new(id, username, role))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_users_default_to_the_user_role() {
        let profile = parse_seed_user("u-1:Ben").unwrap();
        assert_eq!(profile.id.as_str(), "u-1");
        assert_eq!(profile.username, "Ben");
        assert_eq!(profile.role, Role::User);

        assert_eq!(parse_seed_user("a-1:Ada:admin").unwrap().role, Role::Admin);
    }

    #[test]
    fn malformed_seed_users_are_rejected() {
        assert!(parse_seed_user("u-1").is_err());
        assert!(parse_seed_user(":Ben").is_err());
        assert!(parse_seed_user("u-1:Ben:owner").is_err());
        assert!(parse_seed_user("u-1:Ben:user:extra").is_err());
    }

    #[test]
    fn serve_accepts_repeated_users() {
        let cli = Cli::try_parse_from([
            "taskhub-server",
            "serve",
            "--in-memory",
            "--user",
            "a-1:Ada:admin",
            "--user",
            "u-1:Ben",
        ])
        .unwrap();

        match cli.command {
            Some(Commands::Serve { in_memory, users }) => {
                assert!(in_memory);
                assert_eq!(users, vec!["a-1:Ada:admin", "u-1:Ben"]);
            }
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn issue_token_defaults_role() {
        let cli = Cli::try_parse_from(["taskhub-server", "issue-token", "u-1"]).unwrap();
        match cli.command {
            Some(Commands::IssueToken { user_id, role }) => {
                assert_eq!(user_id, "u-1");
                assert_eq!(role, "user");
            }
            _ => panic!("expected issue-token"),
        }
    }
}
