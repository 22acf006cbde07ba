//! ldap-fs command line entry point

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use futures::Stream;
use tokio::io::AsyncReadExt;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use ldap_fs::config::{Config, CredentialsConfig};
use ldap_fs::credentials::{CredentialCache, NoCredentials, StaticCredentials, TerminalPrompt};
use ldap_fs::directory::ldap::Ldap3Connector;
use ldap_fs::ldap_url::LdapUrl;
use ldap_fs::worker::{ConsoleReply, LdapWorker, Request};
use ldap_fs::{LdapFsError, Result};

const READ_CHUNK: usize = 8192;

/// Print usage information
fn print_usage() {
    eprintln!("Usage: ldap-fs <config.yaml> <get|stat|list|put|del> <url> [options]");
    eprintln!();
    eprintln!("ldap-fs - LDAP directories through filesystem verbs");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  config.yaml    Path to configuration file");
    eprintln!("  url            LDAP URL, e.g. ldap://localhost/dc=example,dc=org??one");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --overwrite         put: replace entries that already exist");
    eprintln!("  --meta KEY=VALUE    request metadata, e.g. SERVER_CTRL0=1.2.3 true");
    eprintln!();
    eprintln!("put reads an LDIF change stream from stdin.");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Get,
    Stat,
    List,
    Put,
    Del,
}

impl Verb {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "get" => Some(Verb::Get),
            "stat" => Some(Verb::Stat),
            "list" => Some(Verb::List),
            "put" => Some(Verb::Put),
            "del" => Some(Verb::Del),
            _ => None,
        }
    }
}

struct Args {
    config_path: PathBuf,
    verb: Verb,
    url: String,
    overwrite: bool,
    metadata: Vec<(String, String)>,
}

fn parse_args(args: &[String]) -> Option<Args> {
    let [config_path, verb, url, rest @ ..] = args else {
        return None;
    };

    let mut parsed = Args {
        config_path: PathBuf::from(config_path),
        verb: Verb::parse(verb)?,
        url: url.clone(),
        overwrite: false,
        metadata: Vec::new(),
    };

    let mut rest = rest.iter();
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--overwrite" => parsed.overwrite = true,
            "--meta" => {
                let (key, value) = rest.next()?.split_once('=')?;
                parsed.metadata.push((key.to_string(), value.to_string()));
            }
            _ => return None,
        }
    }
    Some(parsed)
}

/// Standard input as a stream of chunks
fn stdin_stream() -> impl Stream<Item = io::Result<Bytes>> {
    async_stream::try_stream! {
        let mut stdin = tokio::io::stdin();
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            let n = stdin.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            yield Bytes::copy_from_slice(&buf[..n]);
        }
    }
}

fn credential_source(config: &CredentialsConfig) -> Arc<dyn CredentialCache> {
    match config {
        CredentialsConfig::Interactive => Arc::new(TerminalPrompt::new()),
        CredentialsConfig::Static { username, password } => {
            Arc::new(StaticCredentials::new(username.clone(), password.clone()))
        }
        CredentialsConfig::None => Arc::new(NoCredentials),
    }
}

async fn run(worker: &mut LdapWorker, args: &Args) -> Result<()> {
    let url = LdapUrl::parse(&args.url)?;
    let mut request = Request::new(url);
    for (key, value) in &args.metadata {
        request = request.with_metadata(key, value);
    }

    let mut reply = ConsoleReply::new(io::stdout());
    match args.verb {
        Verb::Get => worker.get(&request, &mut reply).await,
        Verb::Stat => worker.stat(&request, &mut reply).await,
        Verb::List => {
            let count = worker.list_dir(&request, &mut reply).await?;
            debug!("{} entries listed", count);
            Ok(())
        }
        Verb::Put => {
            let applied = worker
                .put(&request, Box::pin(stdin_stream()), args.overwrite)
                .await?;
            info!("{} change record(s) applied", applied);
            Ok(())
        }
        Verb::Del => worker.del(&request).await,
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Parse arguments
    let raw: Vec<String> = std::env::args().skip(1).collect();
    let Some(args) = parse_args(&raw) else {
        print_usage();
        std::process::exit(libc::EINVAL);
    };

    // Load configuration
    let config = match Config::from_file(&args.config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(libc::EINVAL);
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration error: {}", e);
        std::process::exit(libc::EINVAL);
    }

    // Initialize logging on stderr; stdout carries the verb's output
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!("Loaded configuration from {:?}", args.config_path);

    let mut worker = LdapWorker::new(
        Arc::new(Ldap3Connector),
        credential_source(&config.credentials),
        config.defaults.clone(),
    );

    let result = run(&mut worker, &args).await;
    worker.close().await;

    match result {
        Ok(()) => {}
        Err(e) if e.is_user_canceled() => {
            debug!("{}", e);
            std::process::exit(e.to_errno());
        }
        Err(e) => {
            error!("{:?} failed", args.verb);
            eprintln!("{}", e);
            std::process::exit(exit_code(&e));
        }
    }
}

fn exit_code(err: &LdapFsError) -> i32 {
    match err.to_errno() {
        0 => libc::EIO,
        code => code,
    }
}
