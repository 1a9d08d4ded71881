use acmehost::auth::admin::bootstrap_admins;
use acmehost::challenge::Dns01Solver;
use acmehost::error::Error::DNSError;
use acmehost::provider::ProviderRegistry;
use acmehost::store::DynStore;
use acmehost::{Config, InMemoryStore, Orchestrator, SharedConfig};
use anyhow::{anyhow, Result};
use is_terminal::IsTerminal;
use std::future::pending;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_init();

    let mut first_args = std::env::args().take(2);
    let (program_name, config_file) = (
        first_args.next().unwrap_or("acmehost".to_string()),
        first_args.next(),
    );

    let config = config_init(&program_name, config_file)?;
    let store = store_init(&config).await?;
    bootstrap_admins(&store, &config.admins).await?;

    let registry = ProviderRegistry::default();
    let provider = registry.resolve(&config.provider, &config).await?;
    tracing::info!("using DNS provider \"{}\"", config.provider);

    let retry = config.retry_policy();
    let challenge = Arc::new(Dns01Solver::new(provider.clone(), config.provider_timeout));
    let orchestrator = Orchestrator::new(store.clone(), provider.clone(), challenge)
        .with_retry(retry)
        .with_deadline(config.request_deadline);

    let dns_handle = match (&config.dns, provider.record_table()) {
        (Some(dns_config), Some(table)) => {
            tracing::info!("DNS listening on UDP {}", dns_config.udp_bind_addr);
            tracing::info!("DNS listening on TCP {}", dns_config.tcp_bind_addr);
            let dns_server = acmehost::dns::new(dns_config.clone(), table).await?;
            Some(tokio::spawn(dns_server.block_until_done()))
        }
        (Some(_), None) => {
            tracing::warn!(
                "provider \"{}\" has no local records, not starting the DNS server",
                config.provider
            );
            None
        }
        _ => None,
    };

    if let Some(interval) = config.sync_interval {
        tracing::info!("reconciling hosts every {interval:?}");
        tokio::spawn(acmehost::sync::run(
            store.clone(),
            provider.clone(),
            retry,
            interval,
        ));
    }

    tracing::info!("API listening on {}", &config.api_bind_addr);
    let api_server = acmehost::api::new(config.clone(), orchestrator, store);
    let api_handle = tokio::spawn(api_server);

    let dns_done = async {
        match dns_handle {
            Some(handle) => handle.await,
            None => pending().await,
        }
    };

    tokio::select! {
        _ = signal::ctrl_c() => {
            tracing::info!("quitting from signal");
        },
        Ok(dns_res) = dns_done => {
            if let Err(err) = dns_res {
                return Err(DNSError(err).into())
            }
        }
        Ok(api_res) = api_handle => {
            if let Err(err) = api_res {
                return Err(err.into())
            }
        }
    }
    tracing::info!("goodbye");
    Ok(())
}

fn tracing_init() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_ansi(std::io::stdout().is_terminal()))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "acmehost=info".into()),
        )
        .init();
}

fn config_init(program_name: &str, config_file: Option<String>) -> Result<SharedConfig> {
    match config_file {
        None => Err(anyhow!("usage: {program_name} /path/to/config.json")),
        Some(config_file) => {
            let config = Config::try_from_file(&config_file)?;
            tracing::debug!("loaded config from {config_file}");
            Ok(Arc::new(config))
        }
    }
}

async fn store_init(config: &Config) -> Result<DynStore> {
    Ok(match &config.store_state_path {
        Some(path) => {
            tracing::info!("persisting store to {path}");
            Arc::new(InMemoryStore::persistent(path).await?)
        }
        None => {
            tracing::warn!("no store_state_path configured, principals and hosts won't persist");
            Arc::new(InMemoryStore::new())
        }
    })
}
