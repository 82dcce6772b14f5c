use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::{debug, error, info};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use dbdash::catalog::DatabaseKind;
use dbdash::connect::{self, CancelToken, ConnectionRequest, ConnectionSettings};
use dbdash::controller::{Action, Controller};
use dbdash::domain::{DashConfig, DashError, Message};
use dbdash::export::SystemClipboard;
use dbdash::render;
use dbdash::session::{Session, Status};
use dbdash::view::{FilterCondition, FilterOperator};

#[derive(Debug, Parser)]
#[command(name = "dbdash", version, about = "A terminal dashboard for browsing database tables.")]
struct Cli {
    /// Rows per page
    #[arg(long, env = "DBDASH_PAGE_SIZE", global = true)]
    page_size: Option<usize>,

    /// Cells longer than this are cut unless expanded
    #[arg(long, env = "DBDASH_MAX_COLUMN_WIDTH", global = true)]
    max_column_width: Option<usize>,

    /// Simulated connection latency in milliseconds
    #[arg(long, env = "DBDASH_CONNECT_DELAY_MS", global = true)]
    connect_delay_ms: Option<u64>,

    /// Probability in [0, 1] that a simulated connection succeeds
    #[arg(long, env = "DBDASH_SUCCESS_RATE", global = true)]
    success_rate: Option<f64>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Args)]
struct ViewArgs {
    /// Free text search over all fields
    #[arg(long, short)]
    search: Option<String>,

    /// Filter as column:operator:value, may be repeated
    #[arg(long = "filter", short, value_parser = parse_filter)]
    filters: Vec<FilterCondition>,

    #[arg(long, short, default_value_t = 1)]
    page: usize,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List tables, optionally filtered by name
    Tables { query: Option<String> },
    /// Show one page of a table
    View {
        /// Table key, e.g. 1/users or users
        table: String,
        #[command(flatten)]
        view: ViewArgs,
    },
    /// Write the rows of a table page as JSON
    Export {
        table: String,
        output: PathBuf,
        /// Export every matching row instead of a single page
        #[arg(long)]
        all: bool,
        #[command(flatten)]
        view: ViewArgs,
    },
    /// Test a (simulated) database connection
    Connect {
        #[arg(value_parser = parse_kind)]
        kind: DatabaseKind,
        name: String,
        url: String,
    },
    /// Create a table in the first project and print its layout
    CreateTable {
        name: String,
        /// Columns as name:type[:pk]; id and created_at when omitted
        columns: Vec<String>,
    },
    /// Load a csv, parquet or arrow file and show it
    Import {
        file: PathBuf,
        #[command(flatten)]
        view: ViewArgs,
    },
    /// Interactive shell (default)
    Shell,
}

fn parse_filter(s: &str) -> Result<FilterCondition, String> {
    let mut parts = s.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(column), Some(operator), Some(value)) if !column.is_empty() => {
            let operator = operator.parse::<FilterOperator>().unwrap_or_else(|e| match e {});
            Ok(FilterCondition::new(column, operator, value))
        }
        _ => Err(format!("Expected column:operator:value, got \"{s}\"")),
    }
}

fn parse_kind(s: &str) -> Result<DatabaseKind, String> {
    s.parse::<DatabaseKind>().map_err(|e| e.to_string())
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("DBDASH_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(ErrorLayer::default())
        .init();
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Err(e) => {
            error!("{:?}", e);
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
    }
}

fn config_from(cli: &Cli) -> DashConfig {
    let mut cfg = DashConfig::default();
    if let Some(page_size) = cli.page_size {
        cfg = cfg.with_page_size(page_size);
    }
    if let Some(width) = cli.max_column_width {
        cfg = cfg.with_max_column_width(width);
    }
    if let Some(delay) = cli.connect_delay_ms {
        cfg = cfg.with_connect_delay_ms(delay);
    }
    if let Some(rate) = cli.success_rate {
        cfg = cfg.with_connect_success_rate(rate);
    }
    cfg
}

async fn run(cli: Cli) -> Result<(), DashError> {
    let cfg = config_from(&cli);
    debug!("Config: {:?}", cfg);
    let catalog = dbdash::demo::catalog()?;

    match cli.command.unwrap_or(Command::Shell) {
        Command::Tables { query } => {
            print!("{}", render::render_tables(&catalog.search_tables(query.as_deref().unwrap_or(""))));
        }
        Command::View { table, view } => {
            let mut session = Session::new(cfg, catalog, Box::new(SystemClipboard::default()));
            session.update(Message::OpenTable(table)).await?;
            apply_view_args(&mut session, view).await?;
            println!("{}", session.render());
        }
        Command::Export { table, output, all, view } => {
            let cfg = if all { cfg.with_page_size(usize::MAX) } else { cfg };
            let mut session = Session::new(cfg, catalog, Box::new(SystemClipboard::default()));
            session.update(Message::OpenTable(table)).await?;
            apply_view_args(&mut session, view).await?;
            session.update(Message::Export(output)).await?;
            println!("{}", session.status_message());
        }
        Command::Connect { kind, name, url } => {
            let mut catalog = catalog;
            let request = ConnectionRequest { name, kind, url };
            println!("Testing connection to {} ...", request.kind);
            let settings = ConnectionSettings::from(&cfg);
            match with_interrupt(connect::connect(&mut catalog, &request, settings, &CancelToken::new())).await? {
                Some(id) => println!("Connection successful! Added project {id} \"{}\"", request.name),
                None => println!("Connection failed. Please check your credentials."),
            }
        }
        Command::CreateTable { name, columns } => {
            let mut args = vec![name];
            args.extend(columns);
            let definition = Controller::parse_definition(&args)?;
            let mut session = Session::new(cfg, catalog, Box::new(SystemClipboard::default()));
            session.update(Message::CreateTable(definition)).await?;
            println!("{}", session.status_message());
            println!("{}", session.render());
        }
        Command::Import { file, view } => {
            let mut session = Session::new(cfg, catalog, Box::new(SystemClipboard::default()));
            session.update(Message::ImportFile(file)).await?;
            apply_view_args(&mut session, view).await?;
            println!("{}", session.render());
        }
        Command::Shell => {
            let session = Session::new(cfg, catalog, Box::new(SystemClipboard::default()));
            run_shell(session).await?;
        }
    }
    Ok(())
}

async fn apply_view_args(session: &mut Session, view: ViewArgs) -> Result<(), DashError> {
    if let Some(text) = view.search {
        session.update(Message::Search(text)).await?;
    }
    if !view.filters.is_empty() {
        session.update(Message::ApplyFilters(view.filters)).await?;
    }
    session.update(Message::GotoPage(view.page)).await
}

// Ctrl-C drops the pending operation
async fn with_interrupt<T>(
    operation: impl Future<Output = Result<T, DashError>>,
) -> Result<T, DashError> {
    tokio::select! {
        result = operation => result,
        _ = tokio::signal::ctrl_c() => Err(DashError::Cancelled),
    }
}

// Messages after which the table is printed again
fn shows_table(message: &Message) -> bool {
    !matches!(
        message,
        Message::CopyRow(_)
            | Message::CopyCell(_, _)
            | Message::Export(_)
            | Message::Help
            | Message::Quit
    )
}

async fn run_shell(mut session: Session) -> Result<(), DashError> {
    println!("dbdash v{}", env!("CARGO_PKG_VERSION"));
    println!("Type \"help\" for commands, \"quit\" to leave.");
    println!();
    print!("{}", session.render());

    let controller = Controller::new();
    let mut rl = DefaultEditor::new()?;
    let history_file = session.config().history_file.clone();
    if let Some(path) = &history_file {
        let _ = rl.load_history(path);
    }

    while session.status != Status::Quitting {
        let prompt = match session.current_table() {
            Ok(table) => format!("dbdash:{}> ", table.name),
            Err(_) => "dbdash> ".to_string(),
        };
        let line = match rl.readline(&prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        if !line.trim().is_empty() {
            let _ = rl.add_history_entry(line.as_str());
        }

        let action = match controller.handle_line(&line, &session) {
            Ok(action) => action,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };
        if let Err(e) = execute(&mut session, action).await {
            eprintln!("Error: {e}");
        }
    }

    if let Some(path) = &history_file
        && let Err(e) = rl.save_history(path)
    {
        info!("Could not save history to {}: {e}", path.display());
    }
    Ok(())
}

async fn execute(session: &mut Session, action: Action) -> Result<(), DashError> {
    match action {
        Action::Update(message) => {
            let show = shows_table(&message);
            with_interrupt(session.update(message)).await?;
            if session.status == Status::Quitting {
                return Ok(());
            }
            println!("{}", session.status_message());
            if show {
                println!("{}", session.render());
            }
        }
        Action::ListTables(query) => {
            print!("{}", render::render_tables(&session.catalog().search_tables(&query)));
        }
        Action::ShowFilters => {
            let filters = &session.view_state().filters;
            if filters.is_empty() {
                println!("No active filters");
            }
            for (idx, filter) in filters.iter().enumerate() {
                println!("{}. {}", idx + 1, filter);
            }
        }
        Action::Show => println!("{}", session.render()),
        Action::Connect(request) => {
            println!("Testing connection to {} ...", request.kind);
            let settings = ConnectionSettings::from(session.config());
            let cancel = session.cancel_token();
            let result = with_interrupt(connect::connect(
                session.catalog_mut(),
                &request,
                settings,
                &cancel,
            ))
            .await?;
            match result {
                Some(id) => println!("Connection successful! Added project {id} \"{}\"", request.name),
                None => println!("Connection failed. Please check your credentials."),
            }
        }
    }
    Ok(())
}
