use anyhow::Context;
use clap::Parser;
use db::{DBService, models::task::Task};
use services::services::config::AppConfig;

/// Print tasks whose title contains a filter, as JSON.
#[derive(Debug, Parser)]
#[command(name = "find-tasks", version)]
struct Args {
    /// Case-insensitive substring of the task title
    title_filter: String,

    /// Maximum number of tasks to print
    #[arg(long, short = 'n', default_value_t = 50, env = "FIND_TASKS_LIMIT")]
    limit: i64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("find-tasks: {e}");
            std::process::exit(1);
        }
    };

    let db = DBService::open_existing(&config.database_url)
        .await
        .with_context(|| format!("failed to open database {}", config.database_url))?;
    let tasks = Task::find_by_title(&db.pool, &args.title_filter, args.limit.max(1)).await?;
    println!("{}", serde_json::to_string_pretty(&tasks)?);
    Ok(())
}
