use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use customizer::{
    Backend, CustomizerConfig, IdentityResolver, ImagePipeline, JsonFileOrderLedger,
    LocalObjectStore, ObjectStore, OrderLedger, PlacementParams, RawPlacement,
    ReclaimOpts, ReclaimRequest, Reclaimer, ResolverOpts, SessionStore, Shape, SourceImage,
    UploadRequest, UploadService, generate_mask,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "customizer", version)]
struct Cli {
    /// JSON configuration file; built-in defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a shaped PNG from a local image.
    Render(RenderArgs),
    /// Write a shape mask as a grayscale PNG.
    Mask(MaskArgs),
    /// Run a full upload against a local store and JSON order ledger.
    Upload(UploadArgs),
    /// Reclaim orphaned session folders in a local store.
    Reclaim(ReclaimArgs),
}

#[derive(Parser, Debug)]
struct PlacementArgs {
    /// Horizontal center, percent of canvas width.
    #[arg(long, default_value = "50")]
    x: String,

    /// Vertical center, percent of canvas height.
    #[arg(long, default_value = "50")]
    y: String,

    #[arg(long, default_value = "1")]
    zoom: String,

    /// circle | heart | rectangle
    #[arg(long, default_value = "circle")]
    shape: String,
}

impl PlacementArgs {
    fn raw(&self) -> RawPlacement {
        RawPlacement {
            x: Some(self.x.clone()),
            y: Some(self.y.clone()),
            zoom: Some(self.zoom.clone()),
            shape: Some(self.shape.clone()),
        }
    }
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Input PNG or JPEG.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Declared MIME type; guessed from the file extension when omitted.
    #[arg(long)]
    mime: Option<String>,

    #[command(flatten)]
    placement: PlacementArgs,
}

#[derive(Parser, Debug)]
struct MaskArgs {
    #[arg(long)]
    shape: String,

    /// Defaults to the configured canvas width.
    #[arg(long)]
    width: Option<u32>,

    /// Defaults to the configured canvas height.
    #[arg(long)]
    height: Option<u32>,

    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct StoreArgs {
    /// Root directory of the local object store.
    #[arg(long)]
    store: PathBuf,

    /// JSON file holding an array of orders. Without it the ledger is unavailable.
    #[arg(long)]
    ledger: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct UploadArgs {
    #[command(flatten)]
    backends: StoreArgs,

    #[arg(long)]
    session: String,

    #[arg(long)]
    product: String,

    #[arg(long = "in")]
    in_path: PathBuf,

    #[arg(long)]
    mime: Option<String>,

    #[command(flatten)]
    placement: PlacementArgs,
}

#[derive(Parser, Debug)]
struct ReclaimArgs {
    #[command(flatten)]
    backends: StoreArgs,

    /// Overrides the configured grace period.
    #[arg(long)]
    grace_days: Option<u32>,

    /// Delete regardless of age and order references.
    #[arg(long)]
    force: bool,

    /// Delete every folder no order mentions, regardless of age.
    #[arg(long)]
    not_in_orders: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = match &cli.config {
        Some(path) => CustomizerConfig::from_json_path(path)?,
        None => CustomizerConfig::default(),
    };

    match cli.cmd {
        Command::Render(args) => cmd_render(&cfg, args),
        Command::Mask(args) => cmd_mask(&cfg, args),
        Command::Upload(args) => cmd_upload(&cfg, args).await,
        Command::Reclaim(args) => cmd_reclaim(&cfg, args).await,
    }
}

fn guess_mime(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("jpg" | "jpeg") => "image/jpeg",
        _ => "image/png",
    }
}

fn read_input(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("read input image '{}'", path.display()))
}

fn write_output(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    std::fs::write(path, bytes).with_context(|| format!("write png '{}'", path.display()))?;
    eprintln!("wrote {}", path.display());
    Ok(())
}

fn cmd_render(cfg: &CustomizerConfig, args: RenderArgs) -> anyhow::Result<()> {
    let params: PlacementParams = args.placement.raw().into_params()?;
    let mime = args
        .mime
        .as_deref()
        .unwrap_or_else(|| guess_mime(&args.in_path));
    let source = SourceImage::new(read_input(&args.in_path)?, mime)?;

    let png = ImagePipeline::new(cfg.canvas).render_shaped_png(&source, &params)?;
    write_output(&args.out, &png)
}

fn cmd_mask(cfg: &CustomizerConfig, args: MaskArgs) -> anyhow::Result<()> {
    let shape: Shape = args.shape.parse()?;
    let width = args.width.unwrap_or(cfg.canvas.width);
    let height = args.height.unwrap_or(cfg.canvas.height);
    let mask = generate_mask(shape, width, height)?;

    if let Some(parent) = args.out.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    image::save_buffer_with_format(
        &args.out,
        mask.as_raw(),
        width,
        height,
        image::ColorType::L8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {} ({shape} {width}x{height})", args.out.display());
    Ok(())
}

fn open_backends(
    cfg: &CustomizerConfig,
    args: &StoreArgs,
) -> (SessionStore, Backend<dyn OrderLedger>) {
    let store = Backend::<dyn ObjectStore>::from_init(
        "object store",
        LocalObjectStore::open(&args.store, cfg.public_base_url.clone())
            .map(|s| Arc::new(s) as Arc<dyn ObjectStore>),
    );
    let ledger = match &args.ledger {
        Some(path) => Backend::<dyn OrderLedger>::ready(Arc::new(JsonFileOrderLedger::new(path))),
        None => Backend::degraded("order ledger", "no ledger file configured"),
    };
    (
        SessionStore::new(store, &cfg.root_prefix, cfg.cache_bust_token_len),
        ledger,
    )
}

async fn cmd_upload(cfg: &CustomizerConfig, args: UploadArgs) -> anyhow::Result<()> {
    let (store, ledger) = open_backends(cfg, &args.backends);
    let resolver = IdentityResolver::new(ledger, store.clone(), ResolverOpts::from(cfg));
    let service = UploadService::new(resolver, ImagePipeline::new(cfg.canvas), store);

    let mime_type = args
        .mime
        .clone()
        .unwrap_or_else(|| guess_mime(&args.in_path).to_string());
    let outcome = service
        .upload(UploadRequest {
            session_id: args.session,
            product_id: args.product,
            placement: args.placement.raw(),
            image_bytes: read_input(&args.in_path)?,
            mime_type,
        })
        .await?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

async fn cmd_reclaim(cfg: &CustomizerConfig, args: ReclaimArgs) -> anyhow::Result<()> {
    let (store, ledger) = open_backends(cfg, &args.backends);
    let reclaimer = Reclaimer::new(store, ledger, cfg.ledger_page_size);

    let request = ReclaimRequest {
        grace_days: args.grace_days,
        force: Some(args.force),
    };
    let opts = request.with_defaults(ReclaimOpts::from(cfg));
    let report = if args.not_in_orders {
        reclaimer.delete_sessions_not_in_orders(opts.force).await?
    } else {
        reclaimer.cleanup_orphaned_sessions(opts).await?
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    report.into_result()?;
    Ok(())
}
