use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use labelbridge_gateway::AppState;
use labelbridge_printing::{
    select_backend, BackendChoice, ImagePreparer, Orientation, PrintDispatcher, PrintRequest,
    ResvgRenderer, SimulationBackend,
};
use labelbridge_settings::{
    AppConfig, ConfigStore, MappingResolver, ReloadingResolver, DEFAULT_CONFIG_FILE,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "labelbridge",
    about = "Print mapped label images from button presses",
    author,
    version
)]
struct Cli {
    /// 設定檔路徑。 / Configuration file path.
    #[arg(
        long,
        global = true,
        value_name = "FILE",
        env = "LABELBRIDGE_CONFIG",
        default_value = DEFAULT_CONFIG_FILE
    )]
    config: PathBuf,

    /// 覆寫設定中的列印後端。 / Override the configured print backend (auto, native, simulation).
    #[arg(long, global = true, value_name = "BACKEND")]
    backend: Option<BackendChoice>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 啟動 HTTP 服務。 / Run the HTTP print server.
    Serve(ServeArgs),
    /// 列印按鈕對應的標籤。 / Print the label mapped to a button.
    Print(PrintArgs),
    /// 直接列印指定檔案。 / Print an image file directly.
    PrintFile(PrintFileArgs),
    /// 以空白頁測試印表機。 / Send a blank test page.
    TestPrint(TestPrintArgs),
    /// 列出可用的印表機。 / List available printers.
    Printers,
    /// 設定預設印表機。 / Choose the printer used for button presses.
    SelectPrinter(SelectPrinterArgs),
    /// 管理按鈕對應。 / Manage button to label mappings.
    #[command(subcommand)]
    Mappings(MappingsCommand),
}

#[derive(Args)]
struct ServeArgs {
    /// 監聽位址；預設取自設定檔。 / Bind address; defaults to the configured host.
    #[arg(long)]
    host: Option<String>,

    /// 監聽埠號；預設取自設定檔。 / Bind port; defaults to the configured port.
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Args)]
struct PrintArgs {
    /// 按鈕識別碼。 / Button identifier.
    button_id: String,

    /// 列印方向；預設取自設定檔。 / Page orientation; defaults to the configured one.
    #[arg(long)]
    orientation: Option<Orientation>,
}

#[derive(Args)]
struct PrintFileArgs {
    /// 要列印的影像檔。 / Image file to print.
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// 目標印表機；預設為已選定的印表機。 / Target printer; defaults to the selected one.
    #[arg(long)]
    printer: Option<String>,

    /// 列印方向；預設取自設定檔。 / Page orientation; defaults to the configured one.
    #[arg(long)]
    orientation: Option<Orientation>,
}

#[derive(Args)]
struct TestPrintArgs {
    /// 目標印表機；預設為已選定的印表機。 / Target printer; defaults to the selected one.
    #[arg(long)]
    printer: Option<String>,
}

#[derive(Args)]
struct SelectPrinterArgs {
    /// 印表機名稱（需完全相符）。 / Printer name, matched exactly.
    name: String,
}

#[derive(Subcommand)]
enum MappingsCommand {
    /// 列出所有對應。 / List all mappings.
    List,
    /// 新增或更新對應。 / Add or replace a mapping.
    Set(MappingSetArgs),
    /// 移除對應。 / Remove a mapping.
    Remove(MappingRemoveArgs),
}

#[derive(Args)]
struct MappingSetArgs {
    /// 按鈕識別碼。 / Button identifier.
    button_id: String,

    /// 標籤影像檔。 / Label image file.
    #[arg(value_name = "FILE")]
    file: PathBuf,
}

#[derive(Args)]
struct MappingRemoveArgs {
    /// 按鈕識別碼。 / Button identifier.
    button_id: String,
}

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let Cli {
        config,
        backend,
        command,
    } = Cli::parse();
    let mut store = ConfigStore::load(&config)
        .with_context(|| format!("failed to load configuration from {}", config.display()))?;
    match command {
        Commands::Serve(args) => execute_serve(args, &store, backend),
        Commands::Print(args) => execute_print(args, store.config(), backend),
        Commands::PrintFile(args) => execute_print_file(args, store.config(), backend),
        Commands::TestPrint(args) => execute_test_print(args, store.config(), backend),
        Commands::Printers => list_printers(store.config(), backend),
        Commands::SelectPrinter(args) => select_printer(args, &mut store, backend),
        Commands::Mappings(subcommand) => execute_mappings_command(subcommand, &mut store),
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,labelbridge=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn build_dispatcher(config: &AppConfig, backend: Option<BackendChoice>) -> PrintDispatcher {
    let simulation = SimulationBackend::new(&config.mock_print_dir)
        .with_area(config.simulated_area.to_printable_area());
    let backend = select_backend(backend.unwrap_or(config.backend), simulation);
    let preparer = ImagePreparer::with_vector_renderer(ResvgRenderer::new(config.svg_scale));
    PrintDispatcher::new(backend, preparer)
}

fn execute_serve(args: ServeArgs, store: &ConfigStore, backend: Option<BackendChoice>) -> Result<()> {
    let config = store.config();
    let resolver = ReloadingResolver::open(store.path())
        .with_context(|| format!("failed to load configuration from {}", store.path().display()))?;
    let host = args.host.unwrap_or_else(|| config.server_host.clone());
    let port = args.port.unwrap_or(config.server_port);
    if config.selected_printer.is_empty() {
        tracing::warn!("no printer selected; print requests will fail until one is chosen");
    }

    let state = AppState::new(build_dispatcher(config, backend), Arc::new(resolver))
        .with_default_orientation(config.default_orientation)
        .with_print_timeout(Duration::from_secs(config.print_timeout_secs));
    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime
        .block_on(labelbridge_gateway::serve(state, &host, port))
        .with_context(|| format!("server on {host}:{port} stopped"))
}

fn execute_print(args: PrintArgs, config: &AppConfig, backend: Option<BackendChoice>) -> Result<()> {
    let label = config.resolve(&args.button_id)?;
    let printer = config.selected_device()?;
    let orientation = args.orientation.unwrap_or(config.default_orientation);
    dispatch(config, backend, &label, &printer, orientation)
}

fn execute_print_file(
    args: PrintFileArgs,
    config: &AppConfig,
    backend: Option<BackendChoice>,
) -> Result<()> {
    let printer = match args.printer {
        Some(printer) => printer,
        None => config.selected_device()?,
    };
    let orientation = args.orientation.unwrap_or(config.default_orientation);
    dispatch(config, backend, &args.file, &printer, orientation)
}

fn dispatch(
    config: &AppConfig,
    backend: Option<BackendChoice>,
    label: &Path,
    printer: &str,
    orientation: Orientation,
) -> Result<()> {
    let dispatcher = build_dispatcher(config, backend);
    let receipt = dispatcher
        .execute(&PrintRequest::new(label, printer, orientation))
        .with_context(|| format!("failed to print {}", label.display()))?;
    match receipt.output {
        Some(output) => println!("Printed {} on '{}' ({output})", label.display(), receipt.device),
        None => println!("Printed {} on '{}'", label.display(), receipt.device),
    }
    Ok(())
}

fn execute_test_print(
    args: TestPrintArgs,
    config: &AppConfig,
    backend: Option<BackendChoice>,
) -> Result<()> {
    let printer = match args.printer {
        Some(printer) => printer,
        None => config.selected_device()?,
    };
    if !build_dispatcher(config, backend).test_print(&printer) {
        bail!("test print on '{printer}' failed");
    }
    println!("Test page sent to '{printer}'");
    Ok(())
}

fn list_printers(config: &AppConfig, backend: Option<BackendChoice>) -> Result<()> {
    let dispatcher = build_dispatcher(config, backend);
    let catalog = dispatcher.catalog();
    println!("Printers ({} backend):", catalog.backend().kind());
    for device in catalog.list_devices() {
        let marker = if device.name() == config.selected_printer {
            "*"
        } else {
            " "
        };
        println!("{marker} {device}");
    }
    Ok(())
}

fn select_printer(
    args: SelectPrinterArgs,
    store: &mut ConfigStore,
    backend: Option<BackendChoice>,
) -> Result<()> {
    let dispatcher = build_dispatcher(store.config(), backend);
    if !dispatcher.catalog().is_available(&args.name) {
        bail!(
            "printer '{}' is not available; run `labelbridge printers` to list printers",
            args.name
        );
    }
    store
        .set_selected_printer(&args.name)
        .with_context(|| format!("failed to save {}", store.path().display()))?;
    println!("Selected printer '{}'", args.name);
    Ok(())
}

fn execute_mappings_command(command: MappingsCommand, store: &mut ConfigStore) -> Result<()> {
    match command {
        MappingsCommand::List => {
            let mappings = &store.config().button_mappings;
            if mappings.is_empty() {
                println!("No button mappings configured.");
            }
            for (button_id, label) in mappings {
                println!("{button_id} -> {}", label.display());
            }
            Ok(())
        }
        MappingsCommand::Set(args) => {
            if !args.file.exists() {
                tracing::warn!(file = %args.file.display(), "label file does not exist yet");
            }
            store
                .add_mapping(&args.button_id, &args.file)
                .with_context(|| format!("failed to save {}", store.path().display()))?;
            println!("Mapped button {} to {}", args.button_id, args.file.display());
            Ok(())
        }
        MappingsCommand::Remove(args) => {
            let removed = store
                .remove_mapping(&args.button_id)
                .with_context(|| format!("failed to save {}", store.path().display()))?;
            if !removed {
                bail!("button '{}' has no mapping", args.button_id);
            }
            println!("Removed mapping for button {}", args.button_id);
            Ok(())
        }
    }
}
