//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "stampa";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_ENDPOINT: &str = "/render";
const DEFAULT_ENGINE: &str = "wkhtmltopdf";
const DEFAULT_WORK_DIR: &str = "/tmp/stampa-pdf";
const DEFAULT_WKHTMLTOPDF_BINARY: &str = "wkhtmltopdf";
const DEFAULT_TEX_BINARY: &str = "latexpdf";

/// Command-line arguments for the stampa binary.
#[derive(Debug, Parser)]
#[command(name = "stampa", version, about = "stampa PDF rendering gateway")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "STAMPA_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct Overrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the rendering endpoint path.
    #[arg(long = "server-endpoint", value_name = "PATH")]
    pub server_endpoint: Option<String>,

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

    /// Override the engine used when a request names none.
    #[arg(long = "render-default-engine", value_name = "NAME")]
    pub render_default_engine: Option<String>,

    /// Override the work directory for transient renderer artifacts.
    #[arg(long = "render-work-dir", value_name = "PATH")]
    pub render_work_dir: Option<PathBuf>,

    /// Override the wkhtmltopdf executable path.
    #[arg(long = "render-wkhtmltopdf-binary", value_name = "PATH")]
    pub render_wkhtmltopdf_binary: Option<PathBuf>,

    /// Override the TeX compiler executable path.
    #[arg(long = "render-tex-binary", value_name = "PATH")]
    pub render_tex_binary: Option<PathBuf>,

    /// Bound renderer runtime; the subprocess is killed when it elapses.
    /// Unset means wait indefinitely.
    #[arg(long = "render-timeout-seconds", value_name = "SECONDS")]
    pub render_timeout_seconds: Option<u64>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub render: RenderSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub endpoint: String,
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
pub struct RenderSettings {
    pub default_engine: String,
    pub work_dir: PathBuf,
    pub wkhtmltopdf_binary: PathBuf,
    pub tex_binary: PathBuf,
    pub timeout: Option<Duration>,
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

    builder = builder.add_source(Environment::with_prefix("STAMPA").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

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
    render: RawRenderSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(endpoint) = overrides.server_endpoint.as_ref() {
            self.server.endpoint = Some(endpoint.clone());
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(engine) = overrides.render_default_engine.as_ref() {
            self.render.default_engine = Some(engine.clone());
        }
        if let Some(dir) = overrides.render_work_dir.as_ref() {
            self.render.work_dir = Some(dir.clone());
        }
        if let Some(binary) = overrides.render_wkhtmltopdf_binary.as_ref() {
            self.render.wkhtmltopdf_binary = Some(binary.clone());
        }
        if let Some(binary) = overrides.render_tex_binary.as_ref() {
            self.render.tex_binary = Some(binary.clone());
        }
        if let Some(seconds) = overrides.render_timeout_seconds {
            self.render.timeout_seconds = Some(seconds);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            render,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            render: build_render_settings(render)?,
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

    let endpoint = server
        .endpoint
        .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
    if !endpoint.starts_with('/') {
        return Err(LoadError::invalid(
            "server.endpoint",
            "endpoint path must start with `/`",
        ));
    }

    Ok(ServerSettings { addr, endpoint })
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

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let default_engine = render
        .default_engine
        .unwrap_or_else(|| DEFAULT_ENGINE.to_string());
    if default_engine.is_empty() {
        return Err(LoadError::invalid(
            "render.default_engine",
            "engine name must not be empty",
        ));
    }

    let work_dir = render
        .work_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_WORK_DIR));
    if work_dir.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "render.work_dir",
            "path must not be empty",
        ));
    }

    let wkhtmltopdf_binary = render
        .wkhtmltopdf_binary
        .unwrap_or_else(|| PathBuf::from(DEFAULT_WKHTMLTOPDF_BINARY));
    if wkhtmltopdf_binary.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "render.wkhtmltopdf_binary",
            "path must not be empty",
        ));
    }

    let tex_binary = render
        .tex_binary
        .unwrap_or_else(|| PathBuf::from(DEFAULT_TEX_BINARY));
    if tex_binary.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "render.tex_binary",
            "path must not be empty",
        ));
    }

    let timeout = match render.timeout_seconds {
        Some(0) => {
            return Err(LoadError::invalid(
                "render.timeout_seconds",
                "must be greater than zero",
            ));
        }
        Some(seconds) => Some(Duration::from_secs(seconds)),
        None => None,
    };

    Ok(RenderSettings {
        default_engine,
        work_dir,
        wkhtmltopdf_binary,
        tex_binary,
        timeout,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    endpoint: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    default_engine: Option<String>,
    work_dir: Option<PathBuf>,
    wkhtmltopdf_binary: Option<PathBuf>,
    tex_binary: Option<PathBuf>,
    timeout_seconds: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}
