use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use taskhub_auth::JwtManager;
use taskhub_config::{AppConfig, RealtimeConfig};
use taskhub_database::{initialize_database, MessageRepository, UserRepository};
use taskhub_gateway::GatewayState;
use taskhub_realtime::{
    HubSettings, MemoryStore, MessageStore, PresenceStore, RealtimeHub, UserProfile,
};
use tokio::task::JoinHandle;
use tracing::info;

pub mod telemetry {
    use anyhow::Result;
    use tracing_subscriber::{fmt, EnvFilter};

    /// Installs the global subscriber. `RUST_LOG` wins over the `info` default.
    pub fn init_tracing() -> Result<()> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(env_filter)
            .try_init()
            .map_err(|error| anyhow::anyhow!("failed to set tracing subscriber: {error}"))
    }
}

/// Where messages and presence live for this process.
#[derive(Clone)]
pub enum Storage {
    Sqlite {
        pool: SqlitePool,
        users: UserRepository,
        messages: MessageRepository,
    },
    Memory(MemoryStore),
}

impl Storage {
    async fn open(config: &AppConfig, in_memory: bool) -> Result<Self> {
        if in_memory {
            info!("using in-memory storage, nothing is persisted");
            return Ok(Storage::Memory(MemoryStore::new()));
        }

        let pool = initialize_database(&config.database)
            .await
            .context("failed to initialise database")?;

        Ok(Storage::Sqlite {
            messages: MessageRepository::new(pool.clone()),
            users: UserRepository::new(pool.clone()),
            pool,
        })
    }

    /// Marks every stored user offline. Only the serving process may do this,
    /// since it owns the live sessions the flags describe.
    pub async fn reset_presence(&self) -> Result<u64> {
        let cleared = match self {
            Storage::Sqlite { users, .. } => users
                .reset_presence()
                .await
                .context("failed to reset presence flags")?,
            Storage::Memory(_) => 0,
        };
        if cleared > 0 {
            info!(cleared, "cleared stale online flags");
        }
        Ok(cleared)
    }

    pub fn message_store(&self) -> Arc<dyn MessageStore> {
        match self {
            Storage::Sqlite { messages, .. } => Arc::new(messages.clone()),
            Storage::Memory(store) => Arc::new(store.clone()),
        }
    }

    pub fn presence_store(&self) -> Arc<dyn PresenceStore> {
        match self {
            Storage::Sqlite { users, .. } => Arc::new(users.clone()),
            Storage::Memory(store) => Arc::new(store.clone()),
        }
    }

    /// Creates or updates a user record.
    pub async fn add_user(&self, profile: &UserProfile) -> Result<()> {
        match self {
            Storage::Sqlite { users, .. } => users
                .upsert(profile)
                .await
                .with_context(|| format!("failed to store user {}", profile.id)),
            Storage::Memory(store) => {
                store.add_user(profile.clone()).await;
                Ok(())
            }
        }
    }

    pub fn pool(&self) -> Option<&SqlitePool> {
        match self {
            Storage::Sqlite { pool, .. } => Some(pool),
            Storage::Memory(_) => None,
        }
    }
}

pub fn hub_settings(config: &RealtimeConfig) -> HubSettings {
    HubSettings {
        stale_after: config.stale_after(),
        sweep_interval: config.sweep_interval(),
        session_buffer: config.session_buffer.max(1),
    }
}

#[derive(Clone)]
pub struct BackendServices {
    pub jwt: JwtManager,
    pub storage: Storage,
    pub hub: Arc<RealtimeHub>,
}

impl BackendServices {
    pub async fn initialise(config: &AppConfig, in_memory: bool) -> Result<Self> {
        let jwt = JwtManager::from_config(&config.auth);
        let storage = Storage::open(config, in_memory).await?;

        let hub = Arc::new(RealtimeHub::new(
            Arc::new(jwt.clone()),
            storage.message_store(),
            storage.presence_store(),
            hub_settings(&config.realtime),
        ));

        info!(
            stale_after_seconds = config.realtime.stale_after_seconds,
            sweep_interval_seconds = config.realtime.sweep_interval_seconds,
            "realtime hub ready"
        );

        Ok(Self { jwt, storage, hub })
    }

    pub fn gateway_state(&self, config: &RealtimeConfig) -> GatewayState {
        GatewayState::new(Arc::clone(&self.hub), config)
    }

    /// Starts the presence sweeper and the long-poll reaper.
    pub fn spawn_background(&self, state: &GatewayState) -> BackgroundTasks {
        BackgroundTasks {
            sweeper: self.hub.spawn_presence_sweeper(),
            poll_reaper: state.spawn_poll_reaper(),
        }
    }
}

pub struct BackgroundTasks {
    sweeper: JoinHandle<()>,
    poll_reaper: JoinHandle<()>,
}

impl BackgroundTasks {
    pub fn shutdown(self) {
        self.sweeper.abort();
        self.poll_reaper.abort();
        info!("background tasks stopped");
    }
}

pub async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(?error, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}
