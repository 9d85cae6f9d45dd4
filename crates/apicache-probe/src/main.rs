//! apicache-probe - query a REST resource through an apicache and print the
//! resulting cache snapshots.
//!
//! Usage:
//!   apicache-probe list <resource>
//!   apicache-probe find <resource> <id>
//!   apicache-probe login <username>
//!   apicache-probe logout

use std::io;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

use apicache_core::{
    Cache, CacheEntry, Entity, FindRequest, ListRequest, Model, ModelContainer, Request,
};
use apicache_http::config::ENV_PASSWORD;
use apicache_http::{
    decode_json, CredentialStore, Credentials, HttpApi, HttpConfig, Method, RawRequest,
    RawResponse, RequestFailure,
};

/// Directory for daily log files; file logging is off when unset.
const ENV_LOG_DIR: &str = "APICACHE_LOG_DIR";

const LOG_FILE_PREFIX: &str = "apicache-probe.log";

const USAGE: &str = "usage: apicache-probe <list <resource> | find <resource> <id> | login <username> | logout>";

/// Initialize the tracing subscriber for logging
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(ENV_LOG_DIR) {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

// ===== Model and requests =====

/// An entity of any resource, kept as raw JSON fields.
struct Record;

impl Model for Record {
    type Properties = Map<String, Value>;

    const SCHEME: &'static str = "records";

    fn deleted_at(properties: &Map<String, Value>) -> Option<DateTime<Utc>> {
        properties
            .get("deletedAt")
            .or_else(|| properties.get("deleted_at"))
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

#[derive(Clone)]
struct ListRecords {
    resource: String,
}

impl Request for ListRecords {
    type Api = HttpApi;
    type Response = Vec<ModelContainer<Record>>;
    type Failure = RequestFailure;

    fn make_raw_request(&self) -> RawRequest {
        RawRequest::new(Method::GET, vec![self.resource.clone()])
    }

    fn decode_raw_response(&self, response: RawResponse) -> Result<Self::Response, RequestFailure> {
        decode_json(response)
    }
}

impl ListRequest for ListRecords {
    type Model = Record;
    type Filter = String;

    fn filter(&self) -> String {
        self.resource.clone()
    }

    // A probe run only ever lists one resource.
    fn matches(&self, _entity: &Entity<Record>) -> bool {
        true
    }
}

#[derive(Clone)]
struct FindRecord {
    resource: String,
    id: Uuid,
}

impl Request for FindRecord {
    type Api = HttpApi;
    type Response = ModelContainer<Record>;
    type Failure = RequestFailure;

    fn make_raw_request(&self) -> RawRequest {
        RawRequest::new(
            Method::GET,
            vec![self.resource.clone(), self.id.to_string()],
        )
    }

    fn decode_raw_response(
        &self,
        response: RawResponse,
    ) -> Result<ModelContainer<Record>, RequestFailure> {
        decode_json(response)
    }
}

impl FindRequest for FindRecord {
    type Model = Record;

    fn id(&self) -> Uuid {
        self.id
    }
}

// ===== Commands =====

#[derive(Debug, PartialEq, Eq)]
enum Command {
    List { resource: String },
    Find { resource: String, id: Uuid },
    Login { username: String },
    Logout,
}

impl Command {
    fn parse(args: &[String]) -> Result<Self> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        match args.as_slice() {
            ["list", resource] => Ok(Command::List {
                resource: resource.to_string(),
            }),
            ["find", resource, id] => Ok(Command::Find {
                resource: resource.to_string(),
                id: id
                    .parse()
                    .with_context(|| format!("Invalid id: {}", id))?,
            }),
            ["login", username] => Ok(Command::Login {
                username: username.to_string(),
            }),
            ["logout"] => Ok(Command::Logout),
            _ => bail!(USAGE),
        }
    }
}

/// What the cache knows about a query, as printed to stdout.
#[derive(Serialize)]
struct Snapshot {
    revision: u64,
    known: bool,
    loading: bool,
    failure: Option<String>,
    entities: Vec<Value>,
}

impl Snapshot {
    fn new<I>(revision: u64, entry: Option<CacheEntry<I, RequestFailure>>) -> Self
    where
        I: IntoIterator<Item = Entity<Record>>,
    {
        let Some(entry) = entry else {
            return Self {
                revision,
                known: false,
                loading: false,
                failure: None,
                entities: Vec::new(),
            };
        };

        let mut entities: Vec<Entity<Record>> = entry.value.into_iter().collect();
        entities.sort_by_key(|entity| entity.id);

        Self {
            revision,
            known: true,
            loading: entry.loading,
            failure: entry.failure.map(|failure| failure.to_string()),
            entities: entities
                .into_iter()
                .map(|entity| {
                    let mut fields = entity.properties;
                    fields.insert("id".to_string(), Value::String(entity.id.to_string()));
                    Value::Object(fields)
                })
                .collect(),
        }
    }
}

fn print(snapshot: &Snapshot) -> Result<()> {
    let json = serde_json::to_string_pretty(snapshot).context("Failed to encode snapshot")?;
    println!("{}", json);
    Ok(())
}

/// Password from the environment, then the keychain, then an interactive
/// prompt. No username means no credentials.
fn resolve_credentials(config: &HttpConfig) -> Result<Option<Credentials>> {
    let Some(username) = config.username.clone() else {
        return Ok(None);
    };

    if let Ok(password) = std::env::var(ENV_PASSWORD) {
        return Ok(Some(Credentials::new(username, password)));
    }

    match CredentialStore::default().load(&username) {
        Ok(Some(credentials)) => return Ok(Some(credentials)),
        Ok(None) => {}
        Err(e) => warn!(error = %e, "Keychain unavailable"),
    }

    let password = rpassword::prompt_password(format!("Password for {}: ", username))
        .context("Failed to read password")?;
    Ok(Some(Credentials::new(username, password)))
}

fn connect(config: &HttpConfig) -> Result<Cache<HttpApi>> {
    let credentials = resolve_credentials(config)?;
    let api = HttpApi::with_options(config.endpoint(), credentials, config.options())
        .context("Failed to create HTTP client")?;
    Ok(Cache::new(api))
}

async fn list(config: &HttpConfig, resource: String) -> Result<()> {
    let cache = connect(config)?;
    let request = ListRecords { resource };
    let snapshot = |cache: &Cache<HttpApi>| {
        let entry = cache.list_entry(&request).map(|entry| entry.map(|value| value.into_values()));
        Snapshot::new(cache.revision(), entry)
    };

    let operation = cache.list(request.clone());
    print(&snapshot(&cache))?;

    match operation.await {
        Ok(Ok(records)) => info!(count = records.len(), "Listed records"),
        Ok(Err(failure)) => warn!(failure = %failure, "List failed"),
        Err(error) => bail!("Request failed: {}", error),
    }

    print(&snapshot(&cache))
}

async fn find(config: &HttpConfig, resource: String, id: Uuid) -> Result<()> {
    let cache = connect(config)?;
    let request = FindRecord { resource, id };

    match cache.find(request.clone()).await {
        Ok(Ok(record)) => info!(id = %record.id, deleted = record.is_deleted(), "Found record"),
        Ok(Err(failure)) => warn!(failure = %failure, "Find failed"),
        Err(error) => bail!("Request failed: {}", error),
    }

    print(&Snapshot::new(cache.revision(), cache.find_entry(&request)))
}

fn login(mut config: HttpConfig, username: String) -> Result<()> {
    let password = rpassword::prompt_password(format!("Password for {}: ", username))
        .context("Failed to read password")?;
    CredentialStore::default().store(&Credentials::new(username.clone(), password))?;

    config.username = Some(username);
    config.save()?;
    info!("Stored credentials");
    Ok(())
}

fn logout(mut config: HttpConfig) -> Result<()> {
    if let Some(username) = config.username.take() {
        CredentialStore::default().delete(&username)?;
        config.save()?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let _guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = Command::parse(&args)?;
    let config = HttpConfig::load()?;
    info!(host = %config.host, port = config.port, "apicache-probe starting");

    match command {
        Command::List { resource } => list(&config, resource).await,
        Command::Find { resource, id } => find(&config, resource, id).await,
        Command::Login { username } => login(config, username),
        Command::Logout => logout(config),
    }
}
