use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use image_emailer_lib::schedule::{Clock, SystemClock};
use image_emailer_lib::{init_logging, load_settings, Collaborators, EmailerContext, ImageEmailer, SettingsManager};
use log::{error, info, warn};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;

/// 定时拍摄并每日邮件发送图片报告
#[derive(Parser, Debug)]
#[command(name = "image-emailer")]
#[command(version)]
#[command(about = "Scheduled camera capture with a daily emailed image report")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 启动调度循环；SIGHUP 重新加载配置，stdin 每行接收一条 JSON 命令
    Run {
        /// 配置文件路径
        #[arg(short, long)]
        config: PathBuf,
    },
    /// 校验配置并打印下一次拍摄/发送时间
    Check {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// 不启动循环，执行一条 JSON 命令
    Command {
        #[arg(short, long)]
        config: PathBuf,
        /// 例如 '{"command": "resend", "day": "20261019"}'
        request: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { config } => run(config).await,
        Commands::Check { config } => check(config),
        Commands::Command { config, request } => command(config, &request).await,
    }
}

async fn run(config: PathBuf) -> Result<()> {
    let manager = SettingsManager::load(&config)?;
    let emailer = Arc::new(ImageEmailer::new());

    let settings = manager.get();
    emailer
        .reconfigure(Arc::clone(&settings), Collaborators::from_settings(&settings)?)
        .await?;

    tokio::spawn(serve_stdin(Arc::clone(&emailer)));
    wait_for_shutdown(&manager, &emailer).await?;

    emailer.shutdown().await;
    info!("Shut down");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown(manager: &SettingsManager, emailer: &ImageEmailer) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).context("安装 SIGHUP 处理器失败")?;
    let mut terminate = signal(SignalKind::terminate()).context("安装 SIGTERM 处理器失败")?;

    loop {
        tokio::select! {
            _ = hangup.recv() => {
                info!("SIGHUP received, reloading {}", manager.path().display());
                reload(manager, emailer).await;
            }
            _ = terminate.recv() => return Ok(()),
            result = tokio::signal::ctrl_c() => return result.context("等待 Ctrl+C 失败"),
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_manager: &SettingsManager, _emailer: &ImageEmailer) -> Result<()> {
    tokio::signal::ctrl_c().await.context("等待 Ctrl+C 失败")
}

/// 重新加载配置；失败时保留当前配置继续运行
#[cfg_attr(not(unix), allow(dead_code))]
async fn reload(manager: &SettingsManager, emailer: &ImageEmailer) {
    let settings = match manager.reload() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Reload failed, keeping current configuration: {}", e);
            return;
        }
    };

    let result = match Collaborators::from_settings(&settings) {
        Ok(collaborators) => emailer.reconfigure(settings, collaborators).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        error!("Reconfiguration failed: {}", e);
    }
}

/// 从 stdin 逐行读取 JSON 命令，响应写到 stdout
async fn serve_stdin(emailer: Arc<ImageEmailer>) {
    let stdin = BufReader::new(tokio::io::stdin());
    if let Err(e) = emailer.serve_lines(stdin, tokio::io::stdout()).await {
        warn!("Stopped serving commands on stdin: {}", e);
    }
}

fn check(config: PathBuf) -> Result<()> {
    let settings = load_settings(&config)?;
    let schedule = settings.schedule()?;
    let now = SystemClock::new(settings.timezone).now();

    println!("configuration OK: {}", config.display());
    println!("timezone:      {}", settings.timezone);
    println!("now:           {}", now.format("%Y-%m-%d %H:%M:%S"));
    match schedule.next_capture(now) {
        Some(next) => println!("next capture:  {}", next.format("%Y-%m-%d %H:%M")),
        None => println!("next capture:  none"),
    }
    println!("next send:     {}", schedule.next_send(now).format("%Y-%m-%d %H:%M"));
    Ok(())
}

async fn command(config: PathBuf, request: &str) -> Result<()> {
    let settings = Arc::new(load_settings(&config)?);
    let request: Value = serde_json::from_str(request).context("命令不是有效的 JSON")?;

    let collaborators = Collaborators::from_settings(&settings)?;
    let ctx = Arc::new(EmailerContext::new(settings, collaborators)?);
    // 没有实例在运行时持有锁，当天重发才能记录为已发送
    let lock = ctx.acquire_lock().await?;
    if lock.is_none() {
        info!("Scheduler is running elsewhere, state stays untouched");
    }

    let emailer = ImageEmailer::new();
    emailer.attach(ctx);
    let response = emailer.do_command(&request).await;
    drop(lock);
    println!("{}", serde_json::to_string_pretty(&response)?);
    if !response.success {
        anyhow::bail!(response.error.unwrap_or_default());
    }
    Ok(())
}
