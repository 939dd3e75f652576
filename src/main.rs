use std::{
    io::Write,
    process::ExitCode,
    sync::Arc,
    time::Duration,
};

use axum::http::StatusCode;
use futures::channel::oneshot;
use hydrant::{
    application::{
        error::AppError,
        render::{HttpClientFactory, Location, PageRequest, RenderConfig, Renderer},
    },
    config,
    domain::assets::AssetManifest,
    infra::{
        assets::PublicAssets,
        error::InfraError,
        http::{self, HttpState},
        telemetry,
    },
    presentation::shell::ShellApp,
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(error) => {
            report_application_error(&error);
            ExitCode::FAILURE
        }
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(std::io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<ExitCode, AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await.map(|()| ExitCode::SUCCESS),
        config::Command::Render(args) => run_render(settings, args).await,
    }
}

fn build_renderer(settings: &config::Settings) -> Result<Renderer, AppError> {
    let manifest = AssetManifest::load(&settings.assets.manifest)?;
    let render_config = RenderConfig::from(settings);
    let clients = HttpClientFactory::new(&render_config)
        .map_err(|err| AppError::unexpected(format!("failed to build HTTP client: {err}")))?;
    let app = ShellApp::from_settings(&settings.app);

    Ok(Renderer::new(
        render_config,
        Arc::new(manifest),
        Arc::new(app),
        Arc::new(clients),
    ))
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let state = HttpState {
        renderer: Arc::new(build_renderer(&settings)?),
        assets: Arc::new(PublicAssets::new(settings.assets.public_dir.clone())),
    };
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(InfraError::from)?;
    info!(
        target = "hydrant::serve",
        addr = %settings.server.addr,
        graphql = %settings.api_gateway.url,
        "listening"
    );

    let (signalled_tx, signalled_rx) = oneshot::channel::<()>();
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = signalled_tx.send(());
        })
        .into_future();
    tokio::pin!(server);

    let grace = settings.server.graceful_shutdown;
    tokio::select! {
        result = &mut server => {
            result.map_err(|err| InfraError::server(err.to_string()))?;
        }
        () = drain_deadline(signalled_rx, grace) => {
            warn!(
                target = "hydrant::serve",
                grace_secs = grace.as_secs(),
                "graceful shutdown timed out; dropping open connections"
            );
        }
    }

    info!(target = "hydrant::serve", "server stopped");
    Ok(())
}

/// Resolves `grace` after the shutdown signal fired; never resolves otherwise.
async fn drain_deadline(signalled: oneshot::Receiver<()>, grace: Duration) {
    if signalled.await.is_ok() {
        tokio::time::sleep(grace).await;
    } else {
        futures::future::pending::<()>().await;
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(target = "hydrant::serve", error = %err, "failed to listen for ctrl-c");
            futures::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(target = "hydrant::serve", error = %err, "failed to listen for SIGTERM");
                futures::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = futures::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    info!(target = "hydrant::serve", "shutdown signal received");
}

async fn run_render(
    settings: config::Settings,
    args: config::RenderArgs,
) -> Result<ExitCode, AppError> {
    let renderer = build_renderer(&settings)?;
    let request = PageRequest::new(Location::parse(&args.path));
    let page = renderer.render(&request).await?;

    info!(
        target = "hydrant::render",
        path = %args.path,
        status = page.status.as_u16(),
        location = page.location.as_deref().unwrap_or(""),
        "rendered to stdout"
    );

    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(page.html.as_bytes())
        .and_then(|()| stdout.flush())
        .map_err(InfraError::from)?;

    Ok(if page.status == StatusCode::OK {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
