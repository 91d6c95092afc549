use anyhow::{Context, Result};
use sokrat::{
    api::routes::create_router,
    cli::{output::Output, Cli, Commands, SessionCommands},
    research::Session,
    utils::logging::init_tracing,
    AppState, HistoryStore, SokratConfig,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse_args();
    let output = if cli.no_color {
        Output::no_color()
    } else {
        Output::new()
    };

    let config = match SokratConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            output.error(&format!("Invalid configuration {:?}: {}", cli.config, e));
            std::process::exit(1);
        }
    };

    let command = cli.command.unwrap_or(Commands::Serve {
        host: None,
        port: None,
    });

    if let Commands::Config { validate } = command {
        show_config(&output, &cli.config, &config, validate);
        return Ok(());
    }

    let _guard = init_tracing(&config.logging).context("Failed to initialise logging")?;

    match command {
        Commands::Serve { host, port } => serve(&output, config, host, port).await,
        Commands::Analyze { query, json } => {
            let state = AppState::from_config(config).await?;
            let response = state.pipeline.run(&query).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                output.analysis(&response);
            }
            Ok(())
        }
        Commands::Research {
            task,
            max_rounds,
            context,
            avoid,
            json,
        } => {
            let state = AppState::from_config(config).await?;
            let mut session = Session::new(task)
                .with_max_rounds(max_rounds.unwrap_or(state.config.research.max_rounds));
            if let Some(context) = context {
                session = session.with_rag_context(context);
            }
            if let Some(avoid) = avoid {
                session = session.with_negative_constraints(avoid);
            }

            let session = state.coordinator.run(session).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&session)?);
            } else {
                output.session(&session);
            }
            Ok(())
        }
        Commands::Sessions(command) => {
            let state = AppState::from_config(config).await?;
            sessions(&output, &state, command).await
        }
        Commands::Config { .. } => Ok(()),
    }
}

async fn serve(
    output: &Output,
    mut config: SokratConfig,
    host: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    let addr = format!("{}:{}", config.server.host, config.server.port);

    output.banner();
    let state = AppState::from_config(config).await?;
    let app = create_router().with_state(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    output.success(&format!("Listening on http://{}", addr));
    tracing::info!(addr = %addr, "Server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}

async fn sessions(output: &Output, state: &AppState, command: SessionCommands) -> Result<()> {
    match command {
        SessionCommands::List { limit } => {
            let sessions = state.store.list_sessions(limit).await?;
            output.header("Sessions");
            output.sessions(&sessions);
        }
        SessionCommands::Show { id } => {
            if !state.store.exists(&id).await? {
                output.error(&format!("Session {} not found", id));
                std::process::exit(1);
            }
            output.history(&state.store.get_history(&id).await?);
        }
        SessionCommands::Delete { id } => {
            if !state.store.exists(&id).await? {
                output.warning(&format!("Session {} not found", id));
                return Ok(());
            }
            state.store.delete_session(&id).await?;
            output.success(&format!("Deleted session {}", id));
        }
    }
    Ok(())
}

fn show_config(output: &Output, path: &std::path::Path, config: &SokratConfig, validate: bool) {
    if validate {
        output.success(&format!("{} is valid", path.display()));
        return;
    }

    let present = |key: Option<String>| if key.is_some() { "set" } else { "not set" };

    output.header("Configuration");
    output.kv("file", &path.display().to_string());
    output.kv(
        "server",
        &format!("{}:{}", config.server.host, config.server.port),
    );
    output.kv("database", &config.database.url);

    output.subheader("Search");
    output.kv("provider", &format!("{:?}", config.search.provider));
    output.kv(&config.search.api_key_env, present(config.search_api_key()));
    output.kv("max results", &config.search.max_results.to_string());

    output.subheader("Dispatch");
    output.kv("api base", &config.dispatch.api_base);
    output.kv(&config.dispatch.api_key_env, present(config.dispatch_api_key()));
    for model in &config.dispatch.models {
        output.list_item(model);
    }

    output.subheader("Research");
    output.kv("backend", &format!("{:?}", config.research.backend));
    output.kv("max rounds", &config.research.max_rounds.to_string());
    output.kv("experts", &config.research.experts.join(", "));
}
