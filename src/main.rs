//! Push Ingest CLI
//!
//! 用保存下来的推送 payload 调试摄入管线

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use push_ingest::notification::{payload, route_for};
use push_ingest::{AttachmentCache, PipelineConfig, RichNotificationService};

#[derive(Parser)]
#[command(name = "push-ingest")]
#[command(about = "Push Ingest - 推送通知摄入管线调试工具")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 解析 payload 并打印 deep link
    Parse {
        /// payload JSON 文件
        file: PathBuf,
    },
    /// 运行富通知服务，打印最终交付的内容
    Fetch {
        /// payload JSON 文件
        file: PathBuf,
        /// 覆盖附件截止时间（毫秒）
        #[arg(long)]
        deadline_ms: Option<u64>,
    },
    /// 清理过期的缓存附件
    Sweep {
        /// 覆盖保留时长（秒）
        #[arg(long)]
        max_age_secs: Option<u64>,
    },
}

fn read_payload(file: &Path) -> Result<Map<String, Value>> {
    let content = fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?;
    match serde_json::from_str::<Value>(&content).with_context(|| format!("Invalid JSON in {}", file.display()))? {
        Value::Object(raw) => Ok(raw),
        _ => anyhow::bail!("{} is not a JSON object", file.display()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // 通过 RUST_LOG 控制日志级别，默认 info
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("push_ingest=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let mut config = PipelineConfig::auto_load()?;

    match cli.command {
        Commands::Parse { file } => {
            let raw = read_payload(&file)?;
            match payload::parse(&raw) {
                Some(parsed) => {
                    println!("{}", serde_json::to_string_pretty(&parsed)?);
                    if let Some(route) = route_for(&parsed) {
                        println!("route: {}", route);
                    }
                }
                None => println!("no deep link"),
            }
        }
        Commands::Fetch { file, deadline_ms } => {
            if let Some(ms) = deadline_ms {
                config.deadline_ms = ms;
            }
            let raw = read_payload(&file)?;
            let service = RichNotificationService::from_config(&config)?;
            let content = service.receive(&raw).await;
            println!("{}", serde_json::to_string_pretty(&content)?);
        }
        Commands::Sweep { max_age_secs } => {
            let max_age = max_age_secs.map(Duration::from_secs).unwrap_or_else(|| config.cache_max_age());
            let cache = AttachmentCache::new(&config.cache_dir)?;
            let removed = cache.sweep(max_age)?;
            info!(removed, dir = %cache.dir().display(), "Sweep finished");
            println!("removed {} cached attachment(s)", removed);
        }
    }

    Ok(())
}
