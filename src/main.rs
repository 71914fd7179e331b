use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use wheres_my_ssd::config::Config;
use wheres_my_ssd::core::{Dispatch, File};
use wheres_my_ssd::index::{Navigator, RatioBreakdown};
use wheres_my_ssd::query::QueryServer;
use wheres_my_ssd::stats::human_bytes;

#[derive(Parser)]
#[command(name = "wheres-my-ssd", version, about = "Find where your disk space went")]
struct Cli {
    /// worker 数（缺省为本机并行度）
    #[arg(long, global = true)]
    workers: Option<usize>,

    #[arg(long, value_enum, global = true)]
    dispatch: Option<Dispatch>,

    /// 配置文件路径（TOML）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// 列出目录子项及其大小
    Scan {
        #[arg(default_value = ".")]
        path: String,
        #[arg(long)]
        json: bool,
    },
    /// 子项占比拆分
    Ratio {
        #[arg(default_value = ".")]
        path: String,
        #[arg(long)]
        json: bool,
    },
    /// 启动 HTTP 查询服务
    Serve {
        #[arg(default_value = ".")]
        path: String,
        #[arg(long)]
        port: Option<u16>,
    },
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
    let mut config = Config::load_or_default(cli.config.as_deref())?;
    if cli.workers.is_some() {
        config.workers = cli.workers;
    }
    if let Some(d) = cli.dispatch {
        config.dispatch = d;
    }

    let command = cli.command.unwrap_or(Command::Scan {
        path: ".".to_string(),
        json: false,
    });

    match command {
        Command::Scan { path, json } => {
            tokio::task::spawn_blocking(move || scan(&config, &path, json)).await??;
        }
        Command::Ratio { path, json } => {
            tokio::task::spawn_blocking(move || ratio(&path, json)).await??;
        }
        Command::Serve { path, port } => {
            let start = File::open(&path)?;
            let navigator = Arc::new(Navigator::new(start, config.aggregator(), config.size_cache()));
            let port = port.unwrap_or(config.port);

            tokio::spawn(async move {
                if let Err(e) = QueryServer::new(navigator).run(port).await {
                    tracing::error!("query server stopped: {}", e);
                }
            });
            info!("wheres-my-ssd ready. Query via: http://127.0.0.1:{}/nav", port);

            tokio::signal::ctrl_c().await?;
            info!("Shutting down...");
        }
    }

    Ok(())
}

fn scan(config: &Config, path: &str, json: bool) -> anyhow::Result<()> {
    let target = File::open(path)?;
    let aggregator = config.aggregator();

    if !target.is_directory() {
        let report = aggregator.scan(&target)?;
        if json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print!("{}", report);
        }
        return Ok(());
    }

    let navigator = Navigator::new(target.clone(), aggregator, config.size_cache());
    let started = Instant::now();
    let (rows, total) = navigator.listing_with_total(&target);
    let elapsed = started.elapsed();

    if json {
        let out = serde_json::json!({
            "target": target.absolute_path(),
            "rows": rows,
            "bytes": total,
            "elapsed": elapsed.as_millis() as u64,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    for row in &rows {
        let size = row.size.map(human_bytes).unwrap_or_else(|| "?".to_string());
        let suffix = if row.is_dir { "/" } else { "" };
        println!("{:>12}  {}{}", size, row.name, suffix);
    }
    match total {
        Some(bytes) => println!(
            "{:>12}  total of {} ({:.1?})",
            human_bytes(bytes),
            target.absolute_path(),
            elapsed
        ),
        // 失败与“大小为 0”要区分开
        None => println!("{:>12}  total size unknown for {}", "?", target.absolute_path()),
    }
    Ok(())
}

fn ratio(path: &str, json: bool) -> anyhow::Result<()> {
    let target = File::open(path)?;
    let breakdown = RatioBreakdown::compute(&target)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&breakdown)?);
    } else {
        print!("{}", breakdown);
    }
    Ok(())
}
