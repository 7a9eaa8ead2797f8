//! Rapforum CLI - drive the forum API from the command line.
//!
//! Every subcommand goes through the same [`ApiClient`] the application uses,
//! so caching, duplicate cancellation, retries and metrics behave as they do in
//! the app. The metrics summary is printed after the command completes.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rapforum_core::{ApiClient, ClientConfig, MemorySession, ProgressCallback, RequestError, UploadFile};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "rapforum")]
#[command(about = "Command-line client for the rap album forum API")]
struct Args {
    /// API base URL (defaults to $RAPFORUM_API_BASE or http://localhost:8080/api)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Bearer token sent with every request
    #[arg(long, global = true)]
    token: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a GET request
    Get {
        path: String,

        /// Query parameter as key=value (repeatable)
        #[arg(short, long = "param", value_parser = parse_key_val)]
        params: Vec<(String, String)>,

        /// Issue the request this many times at once
        #[arg(long, default_value = "1")]
        repeat: usize,
    },
    /// Send a POST request
    Post {
        path: String,

        /// JSON request body
        #[arg(long)]
        data: Option<String>,
    },
    /// Send a PUT request
    Put {
        path: String,

        /// JSON request body
        #[arg(long)]
        data: Option<String>,
    },
    /// Send a DELETE request
    Delete { path: String },
    /// Upload a file as multipart form data
    Upload { path: String, file: PathBuf },
}

fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("invalid key=value: no `=` found in `{}`", s))
}

fn parse_data(data: Option<String>) -> Result<Option<Value>> {
    data.map(|raw| serde_json::from_str(&raw).context("--data is not valid JSON"))
        .transpose()
}

fn params_object(params: Vec<(String, String)>) -> Option<Value> {
    if params.is_empty() {
        return None;
    }
    let map: Map<String, Value> = params
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();
    Some(Value::Object(map))
}

fn print_payload(payload: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(payload)?);
    Ok(())
}

/// Print the payload, or nothing for a cancelled request.
fn report(result: rapforum_core::Result<Value>) -> Result<()> {
    match result {
        Ok(payload) => print_payload(&payload),
        Err(RequestError::Cancelled) => {
            debug!("Request cancelled");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn run(client: &ApiClient, command: Command) -> Result<()> {
    match command {
        Command::Get {
            path,
            params,
            repeat,
        } => {
            let params = params_object(params);
            let requests = (0..repeat.max(1)).map(|_| client.get::<Value>(&path, params.clone()));
            let mut failure = None;
            for result in futures::future::join_all(requests).await {
                if let Err(e) = report(result) {
                    failure = Some(e);
                }
            }
            failure.map_or(Ok(()), Err)
        }
        Command::Post { path, data } => report(client.post(&path, parse_data(data)?).await),
        Command::Put { path, data } => report(client.put(&path, parse_data(data)?).await),
        Command::Delete { path } => report(client.delete(&path, None).await),
        Command::Upload { path, file } => {
            let file = UploadFile::from_path(&file).await?;
            info!("Uploading {} ({} bytes)", file.file_name, file.len());
            let on_progress: ProgressCallback = Arc::new(|percent| info!("Upload {}%", percent));
            report(client.upload(&path, file, Some(on_progress)).await)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let mut config = ClientConfig::from_env()?;
    if let Some(base_url) = args.base_url {
        config = config.with_base_url(base_url);
    }

    let session = Arc::new(MemorySession::new());
    if let Some(token) = args.token {
        session.set_token(token);
    }

    let client = ApiClient::builder().config(config).session(session).build()?;
    debug!("Using API at {}", client.config().base_url);

    let outcome = run(&client, args.command).await;

    eprintln!(
        "requests: {}, average: {}ms, success rate: {}%",
        client.request_metrics().len(),
        client.average_request_duration(),
        client.request_success_rate()
    );

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_val() {
        assert_eq!(
            parse_key_val("keyword=mf doom"),
            Ok(("keyword".to_string(), "mf doom".to_string()))
        );
        assert_eq!(
            parse_key_val("q=a=b"),
            Ok(("q".to_string(), "a=b".to_string()))
        );
        assert!(parse_key_val("page").is_err());
    }

    #[test]
    fn test_params_object() {
        assert_eq!(params_object(Vec::new()), None);
        assert_eq!(
            params_object(vec![("page".into(), "2".into())]),
            Some(serde_json::json!({"page": "2"}))
        );
    }

    #[test]
    fn test_parse_data() {
        assert_eq!(parse_data(None).unwrap(), None);
        assert_eq!(
            parse_data(Some(r#"{"score": 9}"#.into())).unwrap(),
            Some(serde_json::json!({"score": 9}))
        );
        assert!(parse_data(Some("{".into())).is_err());
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let args = Args::parse_from([
            "rapforum",
            "--base-url",
            "http://localhost:9000/api",
            "get",
            "/albums",
            "--param",
            "page=1",
            "--repeat",
            "3",
        ]);
        assert_eq!(args.base_url.as_deref(), Some("http://localhost:9000/api"));
        match args.command {
            Command::Get { path, params, repeat } => {
                assert_eq!(path, "/albums");
                assert_eq!(params, vec![("page".to_string(), "1".to_string())]);
                assert_eq!(repeat, 3);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_report_swallows_cancellation() {
        assert!(report(Err(RequestError::Cancelled)).is_ok());
        assert!(report(Err(RequestError::Http {
            status: 500,
            message: String::new()
        }))
        .is_err());
    }
}
