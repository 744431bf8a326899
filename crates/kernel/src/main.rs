//! recordkit command line
//!
//! Runs repository queries against the configured database and prints the
//! result as JSON.
//!
//! Usage:
//!   recordkit migrate
//!   recordkit list --filter '{"filters":[{"field":"email","value":"a@b.c","operator":"EQUALS"}],"type":"AND"}'
//!   recordkit facets --sort-type desc

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use recordkit_kernel::config::Config;
use recordkit_kernel::db;
use recordkit_kernel::factory::Factory;
use recordkit_kernel::models::UserResponse;
use recordkit_kernel::query::types::{
    FilterRequest, ListOptions, PaginationParams, SortParams, SortType, parse_projection,
};
use recordkit_kernel::query::value::Record;
use recordkit_kernel::storage::PgSessionFactory;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply pending database migrations.
    Migrate,

    /// List users matching a filter, one page at a time.
    List {
        #[command(flatten)]
        filter: FilterArgs,

        /// Rows to skip.
        #[arg(long, default_value = "0")]
        skip: i64,

        /// Page size; -1 returns every row.
        #[arg(long, default_value = "100", allow_negative_numbers = true)]
        limit: i64,

        /// Column to sort by (default: updated_at).
        #[arg(long)]
        sort_by: Option<String>,

        /// Sort direction: asc or desc.
        #[arg(long, default_value = "asc")]
        sort_type: String,

        /// Comma-separated columns to return.
        #[arg(long)]
        fields: Option<String>,
    },

    /// Count users matching a filter.
    Count {
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Distinct values of every column for users matching a filter.
    Facets {
        #[command(flatten)]
        filter: FilterArgs,

        /// Sort direction of the values: asc or desc.
        #[arg(long, default_value = "asc")]
        sort_type: String,
    },

    /// Fetch one user by id.
    Get { id: Uuid },
}

#[derive(Args, Debug)]
struct FilterArgs {
    /// Filter request as JSON: {"filters":[{"field","value","operator"}],"type":"AND"}.
    #[arg(long)]
    filter: Option<String>,
}

impl FilterArgs {
    fn parse(&self) -> Result<Option<FilterRequest>> {
        self.filter
            .as_deref()
            .map(|raw| serde_json::from_str(raw).context("--filter must be a JSON filter request"))
            .transpose()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env().context("failed to load configuration")?;
    info!(environment = %config.environment, "Configuration loaded");

    let (writer, reader) = db::create_pools(&config).await?;
    info!("Database connections established");

    if let Command::Migrate = cli.command {
        db::run_migrations(&writer).await?;
        info!("Migrations applied");
        return Ok(());
    }

    let sessions = PgSessionFactory::new(writer, reader);
    let controller = Factory::from_config(&config).user_controller(sessions.session());

    match cli.command {
        Command::Migrate => {}
        Command::List {
            filter,
            skip,
            limit,
            sort_by,
            sort_type,
            fields,
        } => {
            let options = ListOptions::default()
                .paginate(PaginationParams::new(skip, limit)?)
                .sort(SortParams::new(sort_by, sort_type.parse()?));
            let request = filter.parse()?.unwrap_or_default();
            match parse_projection(fields.as_deref()) {
                Some(fields) => {
                    let options = options.project(fields);
                    let mut page = controller
                        .get_by_filters::<Record>(&request, &options)
                        .await?;
                    for record in &mut page.data {
                        record.remove("hashed_password");
                    }
                    print_json(&page)?;
                }
                None => {
                    let page = controller
                        .get_by_filters::<UserResponse>(&request, &options)
                        .await?;
                    print_json(&page)?;
                }
            }
        }
        Command::Count { filter } => {
            let request = filter.parse()?;
            print_json(&controller.count(request.as_ref()).await?)?;
        }
        Command::Facets { filter, sort_type } => {
            let request = filter.parse()?;
            let sort_type: SortType = sort_type.parse()?;
            let mut facets = controller
                .get_for_filters(request.as_ref(), sort_type)
                .await?;
            facets.columns.remove("hashed_password");
            print_json(&facets)?;
        }
        Command::Get { id } => {
            let user: UserResponse = controller
                .get_by_id(id, &ListOptions::default())
                .await?;
            print_json(&user)?;
        }
    }

    Ok(())
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
