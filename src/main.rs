use anyhow::Result;
use container_registry::{
    config::{AppConfig, Command},
    create_router, db,
    jobs::{JobRunner, JobWorker, RetryPolicy, TokioJobQueue},
    services::registry_service::RegistryService,
};
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + command ---
    let (cfg, command) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting container-registry with config: {:?}", cfg);

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize SQLite connection ---
    tracing::debug!("Connecting using raw URL => {}", cfg.database_url);
    let pool = Arc::new(db::connect(&cfg.database_url).await?);

    if command == Command::Migrate {
        db::run_migrations(&pool).await?;
        tracing::info!("Database migration complete.");
        return Ok(());
    }
    db::run_migrations(&pool).await?;

    // --- Initialize core service ---
    let (queue, rx) = TokioJobQueue::new();
    let service = RegistryService::new(
        pool.clone(),
        cfg.storage_dir.clone(),
        Arc::new(queue.clone()),
        cfg.policy(),
    );

    if let Command::CreateUser {
        username,
        can_create,
        superuser,
    } = command
    {
        let user = service
            .create_user(&username, can_create, superuser)
            .await?;
        tracing::info!("Created user {}", user.username);
        println!("{}", user.token);
        return Ok(());
    }

    // --- Start job worker ---
    let worker = JobWorker::new(
        queue,
        rx,
        JobRunner::new(service.clone()),
        RetryPolicy::default(),
    );
    tokio::spawn(worker.run());

    // --- Build router ---
    let app = create_router(service);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
