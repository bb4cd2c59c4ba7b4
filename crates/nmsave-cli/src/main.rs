use anyhow::{Context, Result, anyhow};
use clap::{Args as ClapArgs, Parser, Subcommand};
use nmsave_core::{LoadingStrategy, Platform, PlatformKind, PlatformSettings};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "nmsave-cli",
    about = "Inspect No Man's Sky save directories",
    version
)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// List existing slots of an account directory
    Info(InfoArgs),
    /// Print the document of one slot as JSON
    Dump(SlotArgs),
    /// Print the metadata of one slot as JSON
    Meta(SlotArgs),
}

#[derive(ClapArgs, Debug)]
struct AccountArgs {
    /// Account directory
    dir: PathBuf,
    /// steam, gog, mac, microsoft, playstation or switch
    #[arg(long, value_parser = parse_platform)]
    platform: PlatformKind,
    /// Optional settings JSON
    #[arg(long)]
    settings: Option<PathBuf>,
}

#[derive(ClapArgs, Debug)]
struct InfoArgs {
    #[command(flatten)]
    account: AccountArgs,
    /// Include slots that exist but could not be read
    #[arg(long, default_value_t = false)]
    all: bool,
}

#[derive(ClapArgs, Debug)]
struct SlotArgs {
    #[command(flatten)]
    account: AccountArgs,
    /// Meta index, 0 is the account data
    #[arg(long)]
    slot: u32,
    /// Keep obfuscated keys
    #[arg(long, default_value_t = false)]
    raw: bool,
}

fn parse_platform(s: &str) -> std::result::Result<PlatformKind, String> {
    PlatformKind::from_short_name(s).ok_or_else(|| format!("unknown platform: {s}"))
}

fn main() {
    let cli = Cli::parse();
    let res = match cli.cmd {
        Cmd::Info(a) => cmd_info(a),
        Cmd::Dump(a) => cmd_dump(a),
        Cmd::Meta(a) => cmd_meta(a),
    };
    if let Err(e) = res {
        eprintln!("error: {e:#}");
        std::process::exit(2);
    }
}

fn open(args: &AccountArgs, strategy: LoadingStrategy, use_mapping: bool) -> Result<Platform> {
    let mut settings = match &args.settings {
        Some(p) => PlatformSettings::load(p)
            .with_context(|| format!("reading settings {}", p.display()))?,
        None => PlatformSettings::default(),
    };
    settings.loading_strategy = strategy;
    settings.use_mapping = use_mapping;
    Platform::open(&args.dir, args.platform, settings)
        .with_context(|| format!("opening {}", args.dir.display()))
}

fn cmd_info(args: InfoArgs) -> Result<()> {
    let platform = open(&args.account, LoadingStrategy::Hollow, true)?;
    if let Some(id) = platform.user_id() {
        println!("user\t{id}");
    }
    for c in platform.containers().iter().filter(|c| c.exists()) {
        match c.incompatibility() {
            Some(tag) if args.all => println!("{}\t{c}\t{tag}", c.meta_index()),
            Some(_) => {}
            None => println!(
                "{}\t{c}\t{:?}\t{:?}\t{}\t{}s\t{}",
                c.meta_index(),
                c.game_version(),
                c.game_mode(),
                c.save_name(),
                c.total_play_time(),
                c.last_write_time()
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default()
            ),
        }
    }
    Ok(())
}

fn cmd_dump(args: SlotArgs) -> Result<()> {
    let mut platform = open(&args.account, LoadingStrategy::Empty, !args.raw)?;
    let c = platform.read(args.slot)?;
    let doc = c.document().ok_or_else(|| match c.incompatibility() {
        Some(tag) => anyhow!("{c} not loaded: {tag}"),
        None => anyhow!("{c} not loaded"),
    })?;
    println!("{}", serde_json::to_string_pretty(doc)?);
    Ok(())
}

fn cmd_meta(args: SlotArgs) -> Result<()> {
    let platform = open(&args.account, LoadingStrategy::Hollow, true)?;
    let c = platform.get(args.slot)?;
    if !c.exists() {
        return Err(anyhow!("{c} does not exist"));
    }
    println!("{}", serde_json::to_string_pretty(c.extra())?);
    Ok(())
}
