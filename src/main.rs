use anyhow::{Context, Result, bail};
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use scangate::capture::{Facing, StillImageDevice};
use scangate::config::{self, Config};
use scangate::decoder::QrFrameDecoder;
use scangate::pipeline::ScanSession;
use scangate::redeem::{CodeStore, JsonFileCodeStore, MemoryCodeStore, RedemptionCoordinator, ScanOutcome};

fn cli() -> Command {
    Command::new(config::app_name())
        .version(config::version())
        .author(env!("CARGO_PKG_AUTHORS"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("JSON configuration file.")
                .value_parser(value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            Arg::new("origin")
                .long("origin")
                .value_name("URL")
                .help("Origin own code urls start with (overrides the config file).")
                .global(true),
        )
        .arg(
            Arg::new("store")
                .long("store")
                .value_name("FILE")
                .help("JSON code store; codes are kept in memory without it.")
                .value_parser(value_parser!(PathBuf))
                .global(true),
        )
        .subcommand(
            Command::new("scan")
                .about("Scan codes from a directory of still frames.")
                .arg(
                    Arg::new("frames")
                        .long("frames")
                        .value_name("DIR")
                        .help("Directory of image files played back as the camera feed.")
                        .value_parser(value_parser!(PathBuf))
                        .required(true),
                )
                .arg(
                    Arg::new("facing")
                        .long("facing")
                        .value_name("FACING")
                        .help("Camera facing: user or environment.")
                        .value_parser(value_parser!(Facing)),
                )
                .arg(
                    Arg::new("interval-ms")
                        .long("interval-ms")
                        .value_name("MS")
                        .help("Sampling interval in milliseconds.")
                        .value_parser(value_parser!(u64).range(1..)),
                )
                .arg(
                    Arg::new("max-scans")
                        .long("max-scans")
                        .value_name("N")
                        .help("Stop after this many outcomes.")
                        .value_parser(value_parser!(usize)),
                )
                .arg(
                    Arg::new("timeout-secs")
                        .long("timeout-secs")
                        .value_name("SECS")
                        .help("Stop scanning after this many seconds.")
                        .value_parser(value_parser!(u64)),
                ),
        )
        .subcommand(
            Command::new("redeem")
                .about("Redeem a code id directly.")
                .arg(Arg::new("id").required(true)),
        )
        .subcommand(
            Command::new("status")
                .about("Show one code, or every code newest first.")
                .arg(Arg::new("id")),
        )
        .subcommand(
            Command::new("url")
                .about("Print the scan url encoded for a code id.")
                .arg(Arg::new("id").required(true)),
        )
        .subcommand(
            Command::new("import")
                .about("Register existing code ids as unredeemed (requires --store).")
                .arg(Arg::new("ids").required(true).action(ArgAction::Append)),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();
    let config = load_config(&matches)?;

    match matches.subcommand() {
        Some(("scan", args)) => scan(args, &config).await,
        Some(("redeem", args)) => {
            let coordinator = coordinator(&config).await?;
            let outcome = coordinator.redeem(required(args, "id")?).await;
            print_outcome(&outcome)
        }
        Some(("status", args)) => {
            let store = open_store(&config).await?;
            match args.get_one::<String>("id") {
                Some(id) => match store.find_code(id).await? {
                    Some(record) => println!("{}", serde_json::to_string(&record)?),
                    None => bail!("code {} not found", id),
                },
                None => {
                    for record in store.list_codes().await? {
                        println!("{}", serde_json::to_string(&record)?);
                    }
                }
            }
            Ok(())
        }
        Some(("url", args)) => {
            let coordinator = coordinator(&config).await?;
            println!("{}", coordinator.scan_url(required(args, "id")?));
            Ok(())
        }
        Some(("import", args)) => {
            let Some(path) = config.store_path.as_ref() else {
                bail!("import needs a persistent store, pass --store <FILE>");
            };
            let store = JsonFileCodeStore::open(path).await?;
            let ids = args.get_many::<String>("ids").into_iter().flatten().cloned();
            let added = store.import(ids).await?;
            info!("Imported {} new codes into {}", added, store.path().display());
            Ok(())
        }
        _ => bail!("unknown command"),
    }
}

fn load_config(matches: &ArgMatches) -> Result<Config> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => Config::load(path)?,
        None => Config::new(),
    };
    if let Some(origin) = matches.get_one::<String>("origin") {
        config.set_origin(origin);
    }
    if let Some(store) = matches.get_one::<PathBuf>("store") {
        config.store_path = Some(store.clone());
    }
    config.validate()?;
    Ok(config)
}

fn required<'a>(args: &'a ArgMatches, name: &str) -> Result<&'a str> {
    args.get_one::<String>(name)
        .map(String::as_str)
        .with_context(|| format!("missing <{}>", name))
}

async fn open_store(config: &Config) -> Result<Arc<dyn CodeStore>> {
    match &config.store_path {
        Some(path) => {
            let store = JsonFileCodeStore::open(path)
                .await
                .with_context(|| format!("failed to open store {}", path.display()))?;
            Ok(Arc::new(store))
        }
        None => {
            warn!("No --store given, codes live in memory only");
            Ok(Arc::new(MemoryCodeStore::new()))
        }
    }
}

async fn coordinator(config: &Config) -> Result<Arc<RedemptionCoordinator>> {
    let store = open_store(config).await?;
    let coordinator = RedemptionCoordinator::new(store, &config.origin).context("invalid origin")?;
    Ok(Arc::new(coordinator))
}

fn print_outcome(outcome: &ScanOutcome) -> Result<()> {
    let line = serde_json::json!({
        "outcome": outcome,
        "message": outcome.message(),
    });
    println!("{}", serde_json::to_string(&line)?);
    Ok(())
}

async fn scan(args: &ArgMatches, config: &Config) -> Result<()> {
    let frames = args
        .get_one::<PathBuf>("frames")
        .context("missing --frames")?;
    let facing = args.get_one::<Facing>("facing").copied().unwrap_or(config.facing);
    let interval = args
        .get_one::<u64>("interval-ms")
        .map(|ms| Duration::from_millis(*ms))
        .unwrap_or_else(|| config.scan_interval());
    let max_scans = args.get_one::<usize>("max-scans").copied();
    let timeout = args.get_one::<u64>("timeout-secs").map(|s| Duration::from_secs(*s));

    let device = StillImageDevice::new()
        .with_warmup(config.warmup_frames)
        .from_dir(facing, frames)
        .with_context(|| format!("failed to read frames from {}", frames.display()))?;

    let session = ScanSession::new(
        Arc::new(device),
        Arc::new(QrFrameDecoder::new()),
        coordinator(config).await?,
    )
    .with_scan_interval(interval)
    .with_facing(facing);

    session.start().await?;

    let result = tokio::select! {
        result = run_scans(&session, max_scans) => result,
        _ = deadline(timeout) => {
            info!("Scan timeout reached");
            Ok(())
        }
        signal = tokio::signal::ctrl_c() => {
            info!("Interrupted, stopping");
            signal.context("failed to listen for ctrl-c")
        }
    };

    session.stop();
    result
}

async fn run_scans(session: &ScanSession, max_scans: Option<usize>) -> Result<()> {
    let mut scans = 0;
    while let Some(outcome) = session.next_outcome().await {
        print_outcome(&outcome)?;
        scans += 1;
        if max_scans.is_some_and(|max| scans >= max) {
            break;
        }
        session.resume()?;
    }
    Ok(())
}

async fn deadline(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending().await,
    }
}
