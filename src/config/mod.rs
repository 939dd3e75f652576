//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::{application::graphql::Credentials, domain::style::Theme};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "hydrant";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_API_GATEWAY_URL: &str = "http://127.0.0.1:4000/graphql";
const DEFAULT_API_TIMEOUT_SECS: u64 = 10;
const DEFAULT_APP_TITLE: &str = "hydrant";
const DEFAULT_CLASS_PREFIX: &str = "hy";
const DEFAULT_MANIFEST_PATH: &str = "build/assets.json";
const DEFAULT_PUBLIC_DIR: &str = "build/public";
const DEFAULT_SCRIPT_ORDER: [&str; 2] = ["vendor", "client"];
const DEFAULT_STYLE_ORDER: [&str; 1] = ["client"];

/// Command-line arguments for the hydrant binary.
#[derive(Debug, Parser)]
#[command(name = "hydrant", version, about = "Server-side rendering shell")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "HYDRANT_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Serve rendered pages over HTTP.
    Serve(Box<ServeArgs>),
    /// Render a single path to stdout.
    Render(RenderArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Clone)]
pub struct RenderArgs {
    #[command(flatten)]
    pub sources: SourceOverrides,

    /// Request path to render, including any query string.
    #[arg(value_name = "PATH", default_value = "/", value_hint = ValueHint::Other)]
    pub path: String,
}

#[derive(Debug, Args, Default, Clone)]
pub struct SourceOverrides {
    /// Override the GraphQL endpoint pages fetch their data from.
    #[arg(long = "api-gateway-url", value_name = "URL")]
    pub api_gateway_url: Option<String>,

    /// Override the asset manifest path.
    #[arg(long = "assets-manifest", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub assets_manifest: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub sources: SourceOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub api_gateway: ApiGatewaySettings,
    pub app: AppSettings,
    pub assets: AssetSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct ApiGatewaySettings {
    pub url: String,
    pub timeout: Duration,
    pub credentials: Credentials,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone)]
pub struct AppSettings {
    pub title: String,
    pub description: String,
    pub favicon: String,
    pub class_prefix: String,
    pub prefetch: Vec<String>,
    pub routes: Vec<String>,
    pub redirects: Vec<Redirect>,
    pub theme: Theme,
}

#[derive(Debug, Clone)]
pub struct AssetSettings {
    pub manifest: PathBuf,
    pub public_dir: PathBuf,
    pub script_order: Vec<String>,
    pub style_order: Vec<String>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("HYDRANT").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Render(args)) => raw.apply_source_overrides(&args.sources),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    api_gateway: RawApiGatewaySettings,
    app: RawAppSettings,
    assets: RawAssetSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        self.apply_source_overrides(&overrides.sources);
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }

    fn apply_source_overrides(&mut self, overrides: &SourceOverrides) {
        if let Some(url) = overrides.api_gateway_url.as_ref() {
            self.api_gateway.url = Some(url.clone());
        }
        if let Some(path) = overrides.assets_manifest.as_ref() {
            self.assets.manifest = Some(path.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            api_gateway,
            app,
            assets,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            api_gateway: build_api_gateway_settings(api_gateway)?,
            app: build_app_settings(app)?,
            assets: build_asset_settings(assets)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_api_gateway_settings(
    api_gateway: RawApiGatewaySettings,
) -> Result<ApiGatewaySettings, LoadError> {
    let url = api_gateway
        .url
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_API_GATEWAY_URL.to_string());
    let parsed = Url::parse(&url)
        .map_err(|err| LoadError::invalid("api_gateway.url", format!("invalid url: {err}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "api_gateway.url",
            format!("unsupported scheme `{}`", parsed.scheme()),
        ));
    }

    let timeout_secs = api_gateway
        .timeout_seconds
        .unwrap_or(DEFAULT_API_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "api_gateway.timeout_seconds",
            "must be greater than zero",
        ));
    }

    let credentials = match api_gateway.credentials {
        Some(mode) => Credentials::from_str(mode.trim())
            .map_err(|reason| LoadError::invalid("api_gateway.credentials", reason))?,
        None => Credentials::default(),
    };

    Ok(ApiGatewaySettings {
        url,
        timeout: Duration::from_secs(timeout_secs),
        credentials,
    })
}

fn build_app_settings(app: RawAppSettings) -> Result<AppSettings, LoadError> {
    let title = app.title.unwrap_or_else(|| DEFAULT_APP_TITLE.to_string());
    let class_prefix = app
        .class_prefix
        .unwrap_or_else(|| DEFAULT_CLASS_PREFIX.to_string());
    if class_prefix.is_empty()
        || !class_prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        return Err(LoadError::invalid(
            "app.class_prefix",
            "must be non-empty ASCII letters, digits or `-`",
        ));
    }

    let prefetch = app
        .prefetch
        .into_iter()
        .map(|document| document.trim().to_string())
        .filter(|document| !document.is_empty())
        .collect();

    let routes = match app.routes {
        Some(routes) => routes,
        None => vec!["/".to_string()],
    };
    if let Some(route) = routes.iter().find(|route| !route.starts_with('/')) {
        return Err(LoadError::invalid(
            "app.routes",
            format!("route `{route}` must start with `/`"),
        ));
    }

    let mut redirects = Vec::with_capacity(app.redirects.len());
    for RawRedirect { from, to } in app.redirects {
        if !from.starts_with('/') {
            return Err(LoadError::invalid(
                "app.redirects",
                format!("redirect source `{from}` must start with `/`"),
            ));
        }
        if to.trim().is_empty() {
            return Err(LoadError::invalid(
                "app.redirects",
                format!("redirect from `{from}` has an empty target"),
            ));
        }
        redirects.push(Redirect { from, to });
    }

    Ok(AppSettings {
        title,
        description: app.description.unwrap_or_default(),
        favicon: app.favicon.unwrap_or_default(),
        class_prefix,
        prefetch,
        routes,
        redirects,
        theme: app.theme.unwrap_or_default(),
    })
}

fn build_asset_settings(assets: RawAssetSettings) -> Result<AssetSettings, LoadError> {
    let manifest = assets
        .manifest
        .unwrap_or_else(|| PathBuf::from(DEFAULT_MANIFEST_PATH));
    if manifest.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "assets.manifest",
            "path must not be empty",
        ));
    }

    let public_dir = assets
        .public_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_PUBLIC_DIR));
    if public_dir.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "assets.public_dir",
            "path must not be empty",
        ));
    }

    Ok(AssetSettings {
        manifest,
        public_dir,
        script_order: assets
            .script_order
            .unwrap_or_else(|| DEFAULT_SCRIPT_ORDER.map(String::from).to_vec()),
        style_order: assets
            .style_order
            .unwrap_or_else(|| DEFAULT_STYLE_ORDER.map(String::from).to_vec()),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawApiGatewaySettings {
    url: Option<String>,
    timeout_seconds: Option<u64>,
    credentials: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawRedirect {
    from: String,
    to: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAppSettings {
    title: Option<String>,
    description: Option<String>,
    favicon: Option<String>,
    class_prefix: Option<String>,
    prefetch: Vec<String>,
    routes: Option<Vec<String>>,
    redirects: Vec<RawRedirect>,
    theme: Option<Theme>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAssetSettings {
    manifest: Option<PathBuf>,
    public_dir: Option<PathBuf>,
    script_order: Option<Vec<String>>,
    style_order: Option<Vec<String>>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}
