//! identity-etl CLI - run one transform-and-load invocation from the shell
//!
//! Each subcommand maps to one deployable function. Warehouse-backed runs need
//! `DATABASE_URL`; stream pulls also connect to NATS JetStream.

use clap::{Parser, Subcommand};
use serde_json::Value;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process;

use identity_etl::handlers::{apply_ddl, ddl_statements, governed_registry, Function, Handlers};
use identity_etl::schema::ddl::render_script;
use identity_etl::serialization::NdjsonWriter;
use identity_etl::{
    BulkWriter, Database, DieselOffsetStore, DieselWarehouse, EtlConfig, FilePipeline,
    JetStreamReader, LocalObjectStore, MemoryMessageStream, MessageStream, OffsetTracker,
    TableKind,
};

#[derive(Parser)]
#[command(name = "identity-etl")]
#[command(version, about = "Transform and load identity-governance change events", long_about = None)]
struct Cli {
    /// YAML file overriding environment settings
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the file named by an object-store event into the state tables
    File {
        /// Event body (JSON); read from stdin when omitted
        event: Option<PathBuf>,
    },

    /// Load the file named by an object-store event into the history tables
    FileToTs {
        /// Event body (JSON); read from stdin when omitted
        event: Option<PathBuf>,
    },

    /// Pull the next stream batch into the state tables
    Stream,

    /// Load a connector-hub delivery into the history tables
    StreamToTs {
        /// Delivery body (JSON list); read from stdin when omitted
        body: Option<PathBuf>,
    },

    /// Pull the next stream batch of audit events
    Audit,

    /// Run the function named by DFA_FUNCTION_NAME
    Dispatch {
        /// Invocation body (JSON); read from stdin when omitted
        body: Option<PathBuf>,
    },

    /// Transform a local file and print the prepared rows as NDJSON
    Transform {
        /// File in either object framing (.jsonl / .ndjson or a single envelope)
        input: PathBuf,

        /// Preview rows for the history tables instead of the state tables
        #[arg(long)]
        timeseries: bool,
    },

    /// Create the warehouse tables (drops them first with DFA_RECREATE_DFA_ADW_TABLES)
    Ddl {
        /// Print the script instead of executing it
        #[arg(long)]
        print: bool,
    },
}

fn load_config(path: Option<&Path>) -> Result<EtlConfig, String> {
    let config = EtlConfig::from_env().map_err(|e| e.to_string())?;
    match path {
        Some(path) => config.with_yaml(path).map_err(|e| e.to_string()),
        None => Ok(config),
    }
}

fn read_body(path: Option<&Path>) -> Result<Value, String> {
    let raw = match path {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?,
        None => {
            let mut raw = String::new();
            std::io::stdin()
                .read_to_string(&mut raw)
                .map_err(|e| format!("Failed to read stdin: {}", e))?;
            raw
        }
    };
    if raw.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&raw).map_err(|e| format!("Invalid JSON body: {}", e))
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match load_config(cli.config.as_deref()) {
        Ok(config) => run(cli.command, config).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run(command: Commands, config: EtlConfig) -> Result<(), String> {
    match command {
        Commands::Transform { input, timeseries } => transform_preview(&config, &input, timeseries),
        Commands::Ddl { print: true } => {
            let statements = ddl_statements(&config).map_err(|e| e.to_string())?;
            print!("{}", render_script(&statements));
            Ok(())
        }
        Commands::Ddl { print: false } => {
            let database = connect_warehouse(&config)?;
            let mut warehouse = DieselWarehouse::from_database(&database);
            let count = apply_ddl(&config, &mut warehouse).map_err(|e| e.to_string())?;
            println!("Applied {} statements", count);
            Ok(())
        }
        Commands::File { event } => {
            invoke(&config, Function::File, read_body(event.as_deref())?).await
        }
        Commands::FileToTs { event } => {
            invoke(&config, Function::FileToTs, read_body(event.as_deref())?).await
        }
        Commands::Stream => invoke(&config, Function::Stream, Value::Null).await,
        Commands::StreamToTs { body } => {
            invoke(&config, Function::StreamToTs, read_body(body.as_deref())?).await
        }
        Commands::Audit => invoke(&config, Function::Audit, Value::Null).await,
        Commands::Dispatch { body } => {
            let function = config
                .require_function_name()
                .and_then(|name| name.parse::<Function>())
                .map_err(|e| e.to_string())?;
            invoke(&config, function, read_body(body.as_deref())?).await
        }
    }
}

fn connect_warehouse(config: &EtlConfig) -> Result<Database, String> {
    Database::connect(config).map_err(|e| e.to_string())
}

async fn invoke(config: &EtlConfig, function: Function, body: Value) -> Result<(), String> {
    let database = connect_warehouse(config)?;

    // only stream pulls read from JetStream
    let stream: Box<dyn MessageStream> = match function {
        Function::Stream | Function::Audit => Box::new(
            JetStreamReader::connect(config.nats.clone())
                .await
                .map_err(|e| e.to_string())?,
        ),
        _ => Box::new(MemoryMessageStream::new()),
    };

    let objects = LocalObjectStore::new(&config.object_store_root);
    let tracker = OffsetTracker::new(DieselOffsetStore::new(database.pool().clone(), &config.schema));
    let handlers = Handlers::new(config, &objects, &*stream, &tracker);

    let mut warehouse = DieselWarehouse::from_database(&database);
    let response = handlers
        .dispatch(function, &body, &mut warehouse)
        .await
        .map_err(|e| e.to_string())?;

    let output = serde_json::to_string(&response).map_err(|e| e.to_string())?;
    println!("{}", output);
    Ok(())
}

fn transform_preview(config: &EtlConfig, input: &Path, timeseries: bool) -> Result<(), String> {
    let bytes = std::fs::read(input).map_err(|e| format!("Failed to read {}: {}", input.display(), e))?;
    let object_name = input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let target = if timeseries { TableKind::TimeSeries } else { TableKind::State };

    let registry = governed_registry(config);
    let mut pipeline = FilePipeline::new(&registry, BulkWriter::new(config.schema.clone()), target, config.batch_size);
    pipeline.extract_bytes(&object_name, &bytes).map_err(|e| e.to_string())?;
    let rows = pipeline.transform().map_err(|e| e.to_string())?.to_vec();

    let Some((entity_type, operation)) = pipeline.group() else {
        eprintln!("No rows: {} has no processable entity type", input.display());
        return Ok(());
    };
    let table = BulkWriter::target(entity_type, target).map_err(|e| e.to_string())?;

    let stdout = std::io::stdout();
    let mut writer = NdjsonWriter::new(stdout.lock());
    writer
        .write_rows(entity_type, operation, &table.table_name, &rows)
        .map_err(|e| e.to_string())?;
    writer.flush().map_err(|e| e.to_string())?;
    eprintln!("{} rows", writer.lines());
    Ok(())
}
