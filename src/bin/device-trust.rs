// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Device Trust Command-Line Tool
//!
//! Inspects how API traffic of this device would be routed and
//! authenticated.
//!
//! # Usage
//!
//! ```text
//! device-trust [OPTIONS] <COMMAND>
//!
//! Commands:
//!   resolve     Resolve an API endpoint and print transport directions
//!   enrollment  Show the device enrollment state
//!   match       Evaluate a URL pattern against a URL
//!   selector    Evaluate a certificate selector
//!   helper      Talk to the native helper
//!   probe       Check that the resolved endpoint accepts connections
//!   config      Configuration management
//!
//! Options:
//!   -c, --config <PATH>         Path to configuration file
//!       --machine-cert <PATH>   Certificate to treat as a machine store entry
//!       --user-cert <PATH>      Certificate to treat as a user store entry
//!   -v, --verbose               Enable verbose output
//!   -q, --quiet                 Suppress non-error output
//!   -h, --help                  Print help
//!   -V, --version               Print version
//! ```
//!
//! # Examples
//!
//! ```bash
//! # Where would Compute Engine requests go?
//! device-trust resolve https://compute.googleapis.com/compute/v1/
//!
//! # Enrollment state, including native helper advice
//! device-trust enrollment --user-id alice@example.com
//!
//! # Does a policy pattern cover a URL?
//! device-trust match --pattern 'https://[*.]example.org' https://a.b.example.org/
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use url::Url;

use device_trust::endpoint::well_known;
use device_trust::enrollment::{EnrollmentReport, HelperStatus};
use device_trust::helper::{NativeHelperClient, ProcessTransport};
use device_trust::logging::{init_logging, LogLevel};
use device_trust::probe::{probe_endpoint, DEFAULT_PROBE_TIMEOUT};
use device_trust::store::{CertificateStore, InMemoryCertificateStore};
use device_trust::{
    CanonicalServiceEndpoint, Certificate, CertificateSelectionPolicy, CertificateSelector,
    ConfigLoader, DeviceTrustConfig, DeviceTrustError, TransportDirections,
    TransportDirectionsBuilder, UrlMatchPattern,
};

/// Device Trust Command-Line Tool
#[derive(Parser)]
#[command(name = "device-trust")]
#[command(author = "U.S. Federal Government")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Endpoint and client certificate resolution for device-trust API access", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Certificate (PEM or DER) to treat as a machine store entry
    #[arg(long, global = true, value_name = "PATH")]
    machine_cert: Vec<PathBuf>,

    /// Certificate (PEM or DER) to treat as a user store entry
    #[arg(long, global = true, value_name = "PATH")]
    user_cert: Vec<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve an API endpoint and print transport directions
    Resolve {
        /// Canonical (TLS) address of the API
        url: String,

        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show the device enrollment state
    Enrollment {
        /// Ask the native helper whether this user's device should enroll
        #[arg(long, value_name = "ID")]
        user_id: Option<String>,

        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },

    /// Evaluate a URL pattern against a URL
    Match {
        /// Pattern, e.g. https://[*.]example.org
        #[arg(short, long)]
        pattern: String,

        /// URL to test
        url: String,
    },

    /// Evaluate a certificate selector against a certificate and URL
    Selector {
        /// Selector JSON
        #[arg(short, long)]
        selector: String,

        /// Certificate file (PEM or DER)
        #[arg(long, value_name = "PATH")]
        cert: PathBuf,

        /// URL the certificate would be presented to
        #[arg(long)]
        url: String,
    },

    /// Talk to the native helper
    Helper {
        #[command(subcommand)]
        action: HelperAction,
    },

    /// Check that the resolved endpoint accepts connections
    Probe {
        /// Canonical (TLS) address of the API
        url: String,

        /// Timeout in seconds
        #[arg(long, default_value_t = DEFAULT_PROBE_TIMEOUT.as_secs())]
        timeout: u64,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum HelperAction {
    /// Ask the helper for its version
    Ping,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate configuration file
    Validate,

    /// Display effective configuration
    Show {
        /// Output format (text, json, toml)
        #[arg(long, default_value = "toml")]
        format: ConfigFormat,
    },
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum ConfigFormat {
    Text,
    Json,
    #[default]
    Toml,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // `config validate` reports problems itself
    let validate = !matches!(
        cli.command,
        Commands::Config {
            action: ConfigAction::Validate
        }
    );
    let config = match load_config(&cli, validate) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut logging = config.logging.clone();
    if cli.quiet {
        logging.level = LogLevel::Error;
    } else if cli.verbose {
        logging.level = LogLevel::Debug;
    }
    if let Err(e) = init_logging(&logging) {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run_command(&cli, config)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli, validate: bool) -> Result<DeviceTrustConfig, DeviceTrustError> {
    let mut loader = ConfigLoader::new().with_validate(validate);
    if let Some(ref path) = cli.config {
        loader = loader.with_path(path);
    }
    loader.load_or_default()
}

async fn run_command(
    cli: &Cli,
    config: DeviceTrustConfig,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    match &cli.command {
        Commands::Resolve { url, format } => cmd_resolve(cli, &config, url, *format).await,
        Commands::Enrollment { user_id, format } => {
            cmd_enrollment(cli, &config, user_id.as_deref(), *format).await
        }
        Commands::Match { pattern, url } => cmd_match(pattern, url),
        Commands::Selector {
            selector,
            cert,
            url,
        } => cmd_selector(selector, cert, url),
        Commands::Helper {
            action: HelperAction::Ping,
        } => cmd_helper_ping(&config).await,
        Commands::Probe { url, timeout } => cmd_probe(cli, &config, url, *timeout).await,
        Commands::Config { action } => cmd_config(cli, &config, action),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_resolve(
    cli: &Cli,
    config: &DeviceTrustConfig,
    url: &str,
    format: OutputFormat,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let directions = transport_directions(cli, config, url)?;

    match format {
        OutputFormat::Text => print_directions(&directions),
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&directions_json(&directions))?
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_enrollment(
    cli: &Cli,
    config: &DeviceTrustConfig,
    user_id: Option<&str>,
    format: OutputFormat,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let store = certificate_store(cli)?;
    let resolver = config.enrollment_resolver_with_policy(store, selection_policy(config));

    let report = match user_id {
        Some(user_id) => resolver.refresh_with_helper(user_id).await?,
        None => EnrollmentReport {
            enrollment: resolver.refresh()?,
            helper: HelperStatus::Skipped,
        },
    };

    match format {
        OutputFormat::Text => {
            println!("State:       {}", report.enrollment.state());
            if let Some(source) = report.enrollment.source() {
                println!("Source:      {:?}", source);
            }
            if let Some(cert) = report.enrollment.certificate() {
                println!("Subject:     {}", cert.subject());
                println!("Issuer:      {}", cert.issuer());
                println!("Thumbprint:  {}", cert.thumbprint());
            }
            match report.helper {
                HelperStatus::Skipped => {}
                HelperStatus::NotInstalled => println!("Helper:      not installed"),
                HelperStatus::Installed {
                    ref version,
                    should_enroll,
                } => {
                    println!("Helper:      {}", version);
                    println!("Enroll:      {}", if should_enroll { "advised" } else { "not advised" });
                }
            }
        }
        OutputFormat::Json => {
            let certificate = report.enrollment.certificate().map(certificate_json);
            let value = serde_json::json!({
                "state": report.enrollment.state(),
                "source": report.enrollment.source(),
                "certificate": certificate,
                "helper": report.helper,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_match(pattern: &str, url: &str) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let pattern = UrlMatchPattern::parse(pattern)?;
    if pattern.is_match(url) {
        println!("match");
        Ok(ExitCode::SUCCESS)
    } else {
        println!("no match");
        Ok(ExitCode::FAILURE)
    }
}

fn cmd_selector(
    selector: &str,
    cert: &Path,
    url: &str,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let selector = CertificateSelector::try_parse(selector)
        .ok_or_else(|| DeviceTrustError::config("Invalid certificate selector"))?;
    let certificate = read_certificate(cert)?;
    let url = Url::parse(url)?;

    if selector.is_match_certificate(&url, &certificate) {
        println!("match");
        Ok(ExitCode::SUCCESS)
    } else {
        println!("no match");
        Ok(ExitCode::FAILURE)
    }
}

async fn cmd_helper_ping(config: &DeviceTrustConfig) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let Some(path) = config.helper.locator().locate() else {
        println!("Native helper is not installed");
        return Ok(ExitCode::FAILURE);
    };

    let transport = ProcessTransport::new(&path).with_origin(config.helper.origin());
    let mut client = NativeHelperClient::new(transport);
    if let Some(ref version) = config.helper.min_version {
        client = client.with_min_version(version)?;
    }

    match client.availability().await {
        Ok(version) => {
            println!("{} (version {})", path.display(), version);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) if e.is_helper_unavailable() => {
            println!("Native helper unavailable: {}", e);
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e.into()),
    }
}

async fn cmd_probe(
    cli: &Cli,
    config: &DeviceTrustConfig,
    url: &str,
    timeout: u64,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let directions = transport_directions(cli, config, url)?;
    let outcome = probe_endpoint(&directions.endpoint, Duration::from_secs(timeout)).await;

    println!("{}: {}", directions.endpoint, outcome);
    Ok(if outcome.is_reachable() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn cmd_config(
    cli: &Cli,
    config: &DeviceTrustConfig,
    action: &ConfigAction,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Validate => {
            if let Some(ref path) = cli.config {
                println!("Validating {}", path.display());
            }
            config.validate()?;
            for warning in config.warnings() {
                println!("Warning: {} (ignored)", warning);
            }
            println!("Configuration is valid");
        }
        ConfigAction::Show { format } => match format {
            ConfigFormat::Toml => print!("{}", config.to_toml()?),
            ConfigFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
            ConfigFormat::Text => {
                let settings = config.access_settings();
                println!(
                    "Device certificate authentication: {} ({})",
                    settings.device_certificate_authentication.value,
                    settings.device_certificate_authentication.source
                );
                println!(
                    "Device certificate selector:       {} ({})",
                    settings
                        .device_certificate_selector
                        .value
                        .as_deref()
                        .unwrap_or("(built-in)"),
                    settings.device_certificate_selector.source
                );
                println!(
                    "Service route:                     {} ({})",
                    settings.route(),
                    settings.private_service_connect_endpoint.source
                );
                println!(
                    "Policy entries:                    {}",
                    config.selection_policy().len()
                );
                println!("Log level:                         {}", config.logging.level);
            }
        },
    }
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// Helper Functions
// ============================================================================

fn transport_directions(
    cli: &Cli,
    config: &DeviceTrustConfig,
    url: &str,
) -> Result<TransportDirections, Box<dyn std::error::Error>> {
    let canonical = CanonicalServiceEndpoint::parse(url)?;

    let mut endpoints = well_known::all();
    endpoints.push(canonical.clone());
    let endpoint_resolver = config.endpoint_resolver(&endpoints)?;

    let store = certificate_store(cli)?;
    let enrollment = config
        .enrollment_resolver_with_policy(store, selection_policy(config))
        .refresh()?;

    let resolved = endpoint_resolver.resolve_endpoint(&canonical, enrollment.state());
    let route = config.access_settings().route();
    Ok(TransportDirectionsBuilder::build(&route, &enrollment, resolved))
}

fn print_directions(directions: &TransportDirections) {
    println!("Endpoint:           {}", directions.endpoint.uri());
    println!("Endpoint type:      {}", directions.endpoint.endpoint_type());
    println!("Bypass proxy:       {}", directions.bypass_proxy);
    println!("Client certificate: {}", directions.attach_client_certificate);
    if let Some(ref cert) = directions.client_certificate {
        println!("  Subject:          {}", cert.subject());
        println!("  Thumbprint:       {}", cert.thumbprint());
    }
}

fn directions_json(directions: &TransportDirections) -> serde_json::Value {
    serde_json::json!({
        "endpoint": directions.endpoint.uri().as_str(),
        "endpoint_type": directions.endpoint.endpoint_type(),
        "bypass_proxy": directions.bypass_proxy,
        "attach_client_certificate": directions.attach_client_certificate,
        "client_certificate": directions.client_certificate.as_ref().map(certificate_json),
    })
}

fn certificate_json(cert: &Certificate) -> serde_json::Value {
    serde_json::json!({
        "subject": cert.subject().to_string(),
        "issuer": cert.issuer().to_string(),
        "thumbprint": cert.thumbprint(),
    })
}

fn read_certificate(path: &Path) -> Result<Certificate, DeviceTrustError> {
    let bytes = std::fs::read(path)?;
    match std::str::from_utf8(&bytes) {
        Ok(text) if text.contains("-----BEGIN") => Certificate::from_pem(text),
        _ => Certificate::from_der(&bytes),
    }
}

/// Certificates given on the command line, or the system stores.
fn certificate_store(cli: &Cli) -> Result<Arc<dyn CertificateStore>, DeviceTrustError> {
    if cli.machine_cert.is_empty() && cli.user_cert.is_empty() {
        if let Some(store) = system_store() {
            return Ok(store);
        }
        tracing::warn!(
            "No system certificate store on this platform, pass --machine-cert or --user-cert"
        );
    }

    let mut store = InMemoryCertificateStore::new();
    for path in &cli.machine_cert {
        store = store.with_machine_certificate(read_certificate(path)?);
    }
    for path in &cli.user_cert {
        store = store.with_user_certificate(read_certificate(path)?);
    }
    Ok(Arc::new(store))
}

#[cfg(all(windows, feature = "windows"))]
fn system_store() -> Option<Arc<dyn CertificateStore>> {
    Some(Arc::new(device_trust::windows::SystemCertificateStore::new()))
}

#[cfg(not(all(windows, feature = "windows")))]
fn system_store() -> Option<Arc<dyn CertificateStore>> {
    None
}

/// The configured policy, or the registry policy when none is configured.
fn selection_policy(config: &DeviceTrustConfig) -> CertificateSelectionPolicy {
    let configured = config.selection_policy();

    #[cfg(all(windows, feature = "windows"))]
    {
        if configured.is_empty() {
            return device_trust::windows::registry_selection_policy();
        }
    }

    configured
}
