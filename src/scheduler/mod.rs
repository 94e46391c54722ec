/// 拍摄/发送调度器
///
/// 单个后台任务：取得实例锁后，反复计算下一次拍摄和发送时刻，
/// 可取消地睡眠到较早的那个，醒来后按当前时间处理所有到期事件。
/// 单次迭代失败只会让循环退避后继续，只有取消才会结束循环。

use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::AppResult;
use crate::lock::InstanceLock;

pub mod context;

pub use context::{Collaborators, EmailerContext, LoopState, SendResult, StatusSnapshot};

/// 单次睡眠上限，醒来后重新计算（应对系统时间或时区偏移变化）
pub const MAX_SLEEP: Duration = Duration::from_secs(300);

/// 迭代出错后的退避时间
pub const LOOP_BACKOFF: Duration = Duration::from_secs(60);

/// 停止旧循环时的最长等待
pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// 调度控制器
pub struct SchedulerController {
    cancel: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

impl SchedulerController {
    pub fn new() -> Self {
        Self {
            cancel: None,
            handle: None,
        }
    }

    /// 启动新循环；已有循环会先被停止
    pub async fn start(&mut self, ctx: Arc<EmailerContext>) {
        self.stop().await;

        let token = CancellationToken::new();
        self.handle = Some(tokio::spawn(run_loop(ctx, token.clone())));
        self.cancel = Some(token);
        info!("[Scheduler] Loop started");
    }

    /// 停止循环：先取消，等待至多 STOP_TIMEOUT，超时则强制中止
    pub async fn stop(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }

        let Some(mut handle) = self.handle.take() else {
            return;
        };

        match tokio::time::timeout(STOP_TIMEOUT, &mut handle).await {
            Ok(Ok(())) => info!("[Scheduler] Loop stopped"),
            Ok(Err(e)) => error!("[Scheduler] Loop task failed: {}", e),
            Err(_) => {
                warn!("[Scheduler] Loop did not stop within {:?}, aborting", STOP_TIMEOUT);
                handle.abort();
                let _ = handle.await;
            }
        }
    }

    /// 检查是否正在运行
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Default for SchedulerController {
    fn default() -> Self {
        Self::new()
    }
}

/// 调度循环主体
pub async fn run_loop(ctx: Arc<EmailerContext>, cancel: CancellationToken) {
    ctx.set_loop_state(LoopState::Starting, false);

    let lock = match InstanceLock::try_acquire(ctx.lock_path()) {
        Ok(Some(lock)) => lock,
        Ok(None) => {
            info!(
                "[Scheduler] Another instance holds {}, exiting",
                ctx.lock_path().display()
            );
            ctx.set_loop_state(LoopState::LockUnavailable, false);
            return;
        }
        Err(e) => {
            error!("[Scheduler] Could not acquire lock: {}", e);
            ctx.set_loop_state(LoopState::Stopped, false);
            return;
        }
    };

    let state = ctx.reload_state().await;
    ctx.set_loop_state(LoopState::Running, true);
    info!(
        "[Scheduler] Running (last capture: {:?}, last sent: {:?})",
        state.last_capture_timestamp, state.last_sent_date
    );

    run_locked(&ctx, &cancel).await;

    lock.release();
    ctx.set_loop_state(LoopState::Stopped, false);
    info!("[Scheduler] Lock released");
}

async fn run_locked(ctx: &EmailerContext, cancel: &CancellationToken) {
    if let Err(e) = ctx.startup_tasks(ctx.now()).await {
        error!("[Scheduler] Startup tasks failed: {}", e);
    }

    while !cancel.is_cancelled() {
        match iterate(ctx, cancel).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => {
                error!("[Scheduler] Iteration failed, backing off {:?}: {}", LOOP_BACKOFF, e);
                if !sleep_or_cancel(cancel, LOOP_BACKOFF).await {
                    break;
                }
            }
        }
    }
}

/// 一次迭代：睡到下一事件并处理；被取消时返回 Ok(false)
async fn iterate(ctx: &EmailerContext, cancel: &CancellationToken) -> AppResult<bool> {
    let now = ctx.now();
    let (next_capture, next_send) = ctx.next_events(now);
    let wake = next_capture.map_or(next_send, |capture| capture.min(next_send));
    // 今天的发送时刻在上一轮拍摄或退避期间已过，立即补发
    let wait = match ctx.overdue_send(now).await {
        Some(_) => Duration::ZERO,
        None => (wake - now).to_std().unwrap_or(Duration::ZERO).min(MAX_SLEEP),
    };

    debug!(
        "[Scheduler] Next capture {:?}, next send {}, sleeping {:?}",
        next_capture, next_send, wait
    );
    if !sleep_or_cancel(cancel, wait).await {
        return Ok(false);
    }

    ctx.handle_due(ctx.now(), next_capture, next_send).await?;
    Ok(true)
}

/// 可取消的睡眠；睡满返回 true，被取消返回 false
async fn sleep_or_cancel(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
