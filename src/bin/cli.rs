//! Binary API CLI Client
//!
//! Command-line interface for issuing raw binary API commands.

use std::fs::File;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pcloud_binapi::config::{DEFAULT_PORT, DEFAULT_SERVER};
use pcloud_binapi::protocol::encode;
use pcloud_binapi::{BinaryConnection, Config, ParamValue, Params, Payload, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// Binary API CLI
#[derive(Parser, Debug)]
#[command(name = "binapi-cli")]
#[command(about = "Issue commands over the pCloud binary protocol")]
#[command(version)]
struct Args {
    /// Server host name
    #[arg(short, long, default_value = DEFAULT_SERVER)]
    server: String,

    /// Server port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Auth token sent with every command
    #[arg(short, long)]
    auth: Option<String>,

    /// Socket timeout in milliseconds (0 disables)
    #[arg(short, long, default_value = "30000")]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Call a method and print the result as JSON
    Call {
        /// Method name
        method: String,

        /// Parameters as key=value
        #[arg(value_parser = parse_param)]
        params: Vec<(String, ParamValue)>,

        /// File to send as the command payload
        #[arg(long)]
        upload: Option<PathBuf>,

        /// File receiving raw data returned by the command
        #[arg(long)]
        download: Option<PathBuf>,
    },

    /// Print the encoded frame for a command without sending it
    Encode {
        /// Method name
        method: String,

        /// Parameters as key=value
        #[arg(value_parser = parse_param)]
        params: Vec<(String, ParamValue)>,
    },
}

/// Parse `key=value`, inferring integers and booleans
fn parse_param(raw: &str) -> std::result::Result<(String, ParamValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {:?}", raw))?;
    let value = if let Ok(n) = value.parse::<i64>() {
        ParamValue::Int(n)
    } else if let Ok(n) = value.parse::<u64>() {
        ParamValue::UInt(n)
    } else if let Ok(b) = value.parse::<bool>() {
        ParamValue::Bool(b)
    } else {
        ParamValue::Text(value.to_string())
    };
    Ok((key.to_string(), value))
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,pcloud_binapi=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    match args.command {
        Commands::Encode { method, params } => {
            let params: Params = params.into_iter().collect();
            let frame = encode(&method, &params, None)?;
            let hex: Vec<String> = frame.as_bytes().iter().map(|b| format!("{:02x}", b)).collect();
            println!("{}", hex.join(" "));
            Ok(())
        }
        Commands::Call {
            method,
            params,
            upload,
            download,
        } => {
            let mut builder = Config::builder()
                .server(&args.server)
                .port(args.port)
                .timeout_ms(args.timeout_ms);
            if let Some(token) = &args.auth {
                builder = builder.auth(token.as_str());
            }
            let config = builder.build();

            tracing::info!("binapi-cli v{}", pcloud_binapi::VERSION);
            tracing::info!("Server: {}", config.address());

            let mut conn = BinaryConnection::new(config);
            conn.connect()?;

            let params: Params = params.into_iter().collect();
            let result = match upload {
                Some(path) => {
                    let mut file = File::open(&path)?;
                    let mut sent = 0u64;
                    let payload = Payload::seekable(&mut file, None);
                    conn.send_command_with_data(&method, params, payload, |n| {
                        sent += n;
                        tracing::debug!("Uploaded {} bytes", sent);
                    })?
                }
                None => conn.send_command(&method, params)?,
            };

            if let Some(len) = conn.pending_data() {
                match download {
                    Some(path) => {
                        let mut file = File::create(&path)?;
                        conn.write_data(&mut file, len, |_| {})?;
                        tracing::info!("Wrote {} bytes to {}", len, path.display());
                    }
                    None => {
                        tracing::warn!("Discarding {} bytes of raw data (use --download)", len);
                        conn.write_data(&mut std::io::sink(), len, |_| {})?;
                    }
                }
            }

            let json = serde_json::to_string_pretty(&result)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            println!("{}", json);

            conn.close()
        }
    }
}
