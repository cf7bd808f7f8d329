use unicontact::config::{UniContactConfig, DEFAULT_SEED, DEFAULT_SEED_CONTACTS};
use unicontact::persistence::PersistentOpenOptions;
use unicontact::test_support::{census, seed_store};
use unicontact::PersistentStore;

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
        r#"unicontact_seed - Reset a contact store and fill it with demo contacts

USAGE:
    unicontact_seed [OPTIONS]

OPTIONS:
    -c, --config <FILE>     Path to config file (TOML)
    -d, --data-dir <DIR>    RocksDB directory [default: storage.data_dir]
    -n, --count <N>         Contacts to create [default: 6]
        --seed <N>          RNG seed [default: 42]
    -h, --help              Print help

One third of the contacts carry both fields, one third only an email and
one third only a phone number. All are primaries.
"#
    );
}

fn main() -> anyhow::Result<()> {
    if has_flag("-h") || has_flag("--help") {
        print_help();
        return Ok(());
    }

    tracing_subscriber::fmt::init();

    let config_path = parse_arg("--config")
        .or_else(|| parse_arg("-c"))
        .or_else(|| std::env::var("UNICONTACT_CONFIG").ok());
    let config = UniContactConfig::from_env(config_path.as_deref())?;

    let data_dir = parse_arg("--data-dir")
        .or_else(|| parse_arg("-d"))
        .map(std::path::PathBuf::from)
        .or(config.storage.data_dir)
        .ok_or_else(|| anyhow::anyhow!("no data directory: pass --data-dir or set storage.data_dir"))?;
    let count: usize = parse_arg("--count")
        .or_else(|| parse_arg("-n"))
        .map(|raw| raw.parse())
        .transpose()?
        .unwrap_or(DEFAULT_SEED_CONTACTS);
    let seed: u64 = parse_arg("--seed")
        .map(|raw| raw.parse())
        .transpose()?
        .unwrap_or(DEFAULT_SEED);

    let options = PersistentOpenOptions {
        repair: config.storage.repair,
        cache_capacity: config.storage.cache_capacity,
    };
    let mut store = PersistentStore::open_with_options(&data_dir, options)?;
    store.reset_data()?;
    println!("Cleared existing contacts in {}", data_dir.display());

    let created = seed_store(&mut store, count, seed)?;
    for contact in &created {
        println!(
            "  created {:>4}: {} | {}",
            contact.id.0,
            contact.email.as_deref().unwrap_or("no email"),
            contact.phone_number.as_deref().unwrap_or("no phone"),
        );
    }
    store.flush()?;

    let summary = census(&created);
    println!("Seeded {} contacts", summary.total());
    println!("  email + phone: {}", summary.both);
    println!("  email only:    {}", summary.email_only);
    println!("  phone only:    {}", summary.phone_only);
    Ok(())
}
