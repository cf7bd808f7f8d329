use tracing::info;
use tracing_subscriber::EnvFilter;
use unicontact::config::{
    listen_from_port, ConfigOverrides, LoggingOverrides, ServerOverrides, StorageOverrides,
    UniContactConfig,
};
use unicontact::http::{serve, AppState};
use unicontact::persistence::PersistentOpenOptions;
use unicontact::{PersistentStore, Unicontact};

fn parse_arg(flag: &str) -> Option<String> {
    let mut args = std::env::args();
    while let Some(arg) = args.next() {
        if arg == flag {
            return args.next();
        }
    }
    None
}

fn has_flag(flag: &str) -> bool {
    std::env::args().any(|arg| arg == flag)
}

fn print_help() {
    eprintln!(
        r#"unicontact_server - Contact identity reconciliation over HTTP

USAGE:
    unicontact_server [OPTIONS]

OPTIONS:
    -c, --config <FILE>     Path to config file (TOML)
    -l, --listen <ADDR>     Override listen address [default: 127.0.0.1:8000]
    -d, --data-dir <DIR>    Persist contacts in RocksDB at DIR [default: in-memory]
        --repair            Repair the RocksDB directory before opening
        --log <FILTER>      Log filter directive [default: info]
    -h, --help              Print help

ENVIRONMENT:
    UNICONTACT_CONFIG                 Path to config file
    UNICONTACT_SERVER__LISTEN         Listen address
    UNICONTACT_STORAGE__DATA_DIR      RocksDB directory
    PORT                              Listen on 0.0.0.0:PORT
    RUST_LOG                          Log filter, overrides config

ROUTES:
    POST /identify    {{"phoneNumber": "...", "email": "..."}}
    GET  /health

CONFIG FILE (unicontact.toml):
    [server]
    listen = "0.0.0.0:8000"

    [storage]
    data_dir = "/var/lib/unicontact"
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if has_flag("-h") || has_flag("--help") {
        print_help();
        return Ok(());
    }

    // Build CLI overrides
    let mut overrides = ConfigOverrides::default();

    if let Some(listen) = parse_arg("--listen").or_else(|| parse_arg("-l")) {
        overrides.server = Some(ServerOverrides {
            listen: Some(listen.parse()?),
        });
    }

    let mut storage_overrides = StorageOverrides::default();
    if let Some(data_dir) = parse_arg("--data-dir").or_else(|| parse_arg("-d")) {
        storage_overrides.data_dir = Some(data_dir.into());
    }
    if has_flag("--repair") {
        storage_overrides.repair = Some(true);
    }
    if storage_overrides.data_dir.is_some() || storage_overrides.repair.is_some() {
        overrides.storage = Some(storage_overrides);
    }

    if let Some(filter) = parse_arg("--log") {
        overrides.logging = Some(LoggingOverrides {
            filter: Some(filter),
        });
    }

    // Load config: CLI > Env > File > Defaults
    let config_path = parse_arg("--config")
        .or_else(|| parse_arg("-c"))
        .or_else(|| std::env::var("UNICONTACT_CONFIG").ok());
    let config = UniContactConfig::load(config_path.as_deref(), overrides)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // An explicit --listen wins over the hosting platform's PORT.
    let listen = if parse_arg("--listen").or_else(|| parse_arg("-l")).is_some() {
        config.server.listen
    } else {
        listen_from_port(config.server.listen, std::env::var("PORT").ok().as_deref())?
    };

    let engine = match &config.storage.data_dir {
        Some(dir) => {
            let options = PersistentOpenOptions {
                repair: config.storage.repair,
                cache_capacity: config.storage.cache_capacity,
            };
            Unicontact::with_store(PersistentStore::open_with_options(dir, options)?)
        }
        None => {
            info!("no data_dir configured, contacts are kept in memory");
            Unicontact::new()
        }
    }
    .with_max_chain_hops(config.resolver.max_chain_hops);

    let state = AppState::new(engine).with_body_limit(config.server.body_limit);
    serve(listen, state).await
}
