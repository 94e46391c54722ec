/// 调度上下文
///
/// 一次配置对应一个上下文：时间表、拍摄流水线、报告组装器、邮件传输和持久化状态。
/// 重新配置时整体重建，不在原地修改。
///
/// `state` 互斥锁同时作为操作闸门：调度循环的拍摄/发送和手动命令都必须先持有它，
/// 因此同一上下文内的操作严格串行。状态查询只读取 `status` 快照，不等待闸门。

use chrono::{NaiveDate, NaiveDateTime};
use log::{info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use uuid::Uuid;

use crate::capture::sources::build_source;
use crate::capture::{CaptureOptions, CaptureOutcome, CapturePipeline, CaptureSources, FrameSource};
use crate::error::{AppError, AppResult};
use crate::lock::{InstanceLock, LOCK_FILE_NAME};
use crate::mail::{deliver_with_retry, MailMessage, MailTransport, SmtpMailer, SEND_RETRY_DELAY};
use crate::report::{ReportAssembler, ReportOptions, ReportOutcome, SummaryOptions};
use crate::schedule::{Clock, ScheduleConfig, SystemClock};
use crate::settings::EmailerSettings;
use crate::state::{PersistentState, StateStore};
use crate::storage::ArchiveStore;

/// 调度循环状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Stopped,
    Starting,
    Running,
    /// 锁被其他实例持有，本实例已退出
    LockUnavailable,
}

/// 状态快照
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub loop_state: LoopState,
    pub instance_id: Uuid,
    pub pid: u32,
    pub lock_path: PathBuf,
    pub lock_held: bool,
    pub last_capture_timestamp: Option<NaiveDateTime>,
    pub last_sent_date: Option<NaiveDate>,
    pub last_capture_error: Option<String>,
    pub last_send_error: Option<String>,
    pub last_send_status: Option<String>,
    pub next_capture: Option<NaiveDateTime>,
    pub next_send: Option<NaiveDateTime>,
}

/// 一次发送的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendResult {
    /// 当天已经发送过
    AlreadySent,
    Sent { attachments: usize },
    /// 当天没有图片，不发送邮件
    NoImages,
    /// 投递失败（不致命，下次启动时补发）
    Failed(String),
}

impl SendResult {
    pub fn describe(&self, day: NaiveDate) -> String {
        match self {
            SendResult::AlreadySent => format!("Report for {} was already sent", day),
            SendResult::Sent { attachments } => {
                format!("Sent report for {} with {} image(s)", day, attachments)
            }
            SendResult::NoImages => format!("No images captured on {}, nothing sent", day),
            SendResult::Failed(e) => format!("Sending report for {} failed: {}", day, e),
        }
    }
}

/// 宿主提供的外部协作者
#[derive(Clone)]
pub struct Collaborators {
    pub primary: Arc<dyn FrameSource>,
    pub secondary: Option<Arc<dyn FrameSource>>,
    pub transport: Arc<dyn MailTransport>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// 按设置创建真实的摄像头、SMTP 传输和系统时钟
    pub fn from_settings(settings: &EmailerSettings) -> AppResult<Self> {
        let primary = build_source("primary", &settings.camera)?;
        let secondary = settings
            .secondary_camera
            .as_ref()
            .map(|camera| build_source("secondary", camera))
            .transpose()?;

        Ok(Self {
            primary,
            secondary,
            transport: Arc::new(SmtpMailer::from_settings(settings)?),
            clock: Arc::new(SystemClock::new(settings.timezone)),
        })
    }
}

/// 调度上下文
pub struct EmailerContext {
    settings: Arc<EmailerSettings>,
    schedule: ScheduleConfig,
    clock: Arc<dyn Clock>,
    pipeline: CapturePipeline,
    assembler: Arc<ReportAssembler>,
    transport: Arc<dyn MailTransport>,
    state_store: StateStore,
    lock_path: PathBuf,
    send_retry_delay: Duration,
    state: Mutex<PersistentState>,
    /// 本上下文内计划发送失败过的日期，不再自动重试
    failed_send: std::sync::Mutex<Option<NaiveDate>>,
    status: watch::Sender<StatusSnapshot>,
}

impl EmailerContext {
    /// 由设置和协作者构建上下文，确保存档目录存在
    pub fn new(settings: Arc<EmailerSettings>, collaborators: Collaborators) -> AppResult<Self> {
        let schedule = settings.schedule()?;
        let archive = ArchiveStore::new(settings.save_dir.clone())?;

        let capture_options = CaptureOptions {
            crop: settings.crop,
            stack: settings.stack.enabled.then_some(settings.stack.orientation),
        };
        let pipeline = CapturePipeline::new(
            CaptureSources {
                primary: collaborators.primary,
                secondary: collaborators.secondary,
            },
            capture_options,
            archive.clone(),
        );

        let report_options = ReportOptions {
            role: settings.report_role(),
            timestamp_overlay: settings.timestamp_overlay,
            summary_enabled: settings.summary.enabled,
            summary: SummaryOptions {
                frame_duration_ms: settings.summary.frame_duration_ms,
                max_width: settings.summary.max_width,
            },
            location: settings.location.clone(),
        };
        let assembler = Arc::new(ReportAssembler::new(archive.clone(), report_options));

        let state_store = StateStore::in_dir(archive.root());
        let lock_path = archive.root().join(LOCK_FILE_NAME);

        let (status, _) = watch::channel(StatusSnapshot {
            loop_state: LoopState::Stopped,
            instance_id: Uuid::new_v4(),
            pid: std::process::id(),
            lock_path: lock_path.clone(),
            lock_held: false,
            last_capture_timestamp: None,
            last_sent_date: None,
            last_capture_error: None,
            last_send_error: None,
            last_send_status: None,
            next_capture: None,
            next_send: None,
        });

        let ctx = Self {
            settings,
            schedule,
            clock: collaborators.clock,
            pipeline,
            assembler,
            transport: collaborators.transport,
            state_store,
            lock_path,
            send_retry_delay: SEND_RETRY_DELAY,
            state: Mutex::new(PersistentState::default()),
            failed_send: std::sync::Mutex::new(None),
            status,
        };
        ctx.publish_state(&ctx.state_store.load());
        Ok(ctx)
    }

    /// 覆盖拍摄与投递的重试间隔
    pub fn with_retry_delays(mut self, capture: Duration, send: Duration) -> Self {
        self.pipeline = self.pipeline.with_retry_delay(capture);
        self.send_retry_delay = send;
        self
    }

    pub fn settings(&self) -> &EmailerSettings {
        &self.settings
    }

    pub fn schedule(&self) -> &ScheduleConfig {
        &self.schedule
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    pub fn state_path(&self) -> &Path {
        self.state_store.path()
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    /// 下一次拍摄和发送时刻
    pub fn next_events(&self, now: NaiveDateTime) -> (Option<NaiveDateTime>, NaiveDateTime) {
        (self.schedule.next_capture(now), self.schedule.next_send(now))
    }

    /// 当前状态快照，下一次时刻按需重新计算
    pub fn status(&self) -> StatusSnapshot {
        let mut snapshot = self.status.borrow().clone();
        let (next_capture, next_send) = self.next_events(self.now());
        snapshot.next_capture = next_capture;
        snapshot.next_send = Some(next_send);
        snapshot
    }

    /// 订阅状态变化
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.subscribe()
    }

    pub(crate) fn set_loop_state(&self, loop_state: LoopState, lock_held: bool) {
        self.status.send_modify(|s| {
            s.loop_state = loop_state;
            s.lock_held = lock_held;
        });
    }

    fn lock_held(&self) -> bool {
        self.status.borrow().lock_held
    }

    fn publish_state(&self, state: &PersistentState) {
        self.status.send_modify(|s| {
            s.last_capture_timestamp = state.last_capture_timestamp;
            s.last_sent_date = state.last_sent_date;
        });
    }

    /// 从磁盘重新读取持久化状态（取得实例锁之后调用）
    pub async fn reload_state(&self) -> PersistentState {
        let loaded = self.state_store.load();
        let mut state = self.state.lock().await;
        *state = loaded.clone();
        self.publish_state(&state);
        loaded
    }

    /// 不启动循环时取得实例锁（单次命令使用）
    ///
    /// 取得后载入磁盘状态，之后的当天重发会写入 last_sent_date；
    /// 锁被运行中的实例持有时返回 `Ok(None)`，状态保持只读
    pub async fn acquire_lock(&self) -> AppResult<Option<InstanceLock>> {
        let Some(lock) = InstanceLock::try_acquire(&self.lock_path)? else {
            info!("[Scheduler] {} is held by a running instance", self.lock_path.display());
            return Ok(None);
        };
        self.reload_state().await;
        self.set_loop_state(LoopState::Stopped, true);
        Ok(Some(lock))
    }

    /// 当前持久化状态的副本（会等待进行中的操作）
    pub async fn persistent_state(&self) -> PersistentState {
        self.state.lock().await.clone()
    }

    /// 处理到期事件：先拍摄后发送，两者可能同时到期
    ///
    /// 拍摄出错时仍然执行发送步骤，之后再返回拍摄错误
    pub async fn handle_due(
        &self,
        now: NaiveDateTime,
        next_capture: Option<NaiveDateTime>,
        next_send: NaiveDateTime,
    ) -> AppResult<()> {
        let captured = match next_capture.filter(|t| *t <= now) {
            Some(threshold) => self.run_capture(threshold, now).await.map(|_| ()),
            None => Ok(()),
        };

        if next_send <= now {
            self.run_scheduled_send(next_send.date()).await?;
        }
        // 拍摄期间可能已经越过今天的发送时刻
        if let Some(day) = self.overdue_send(self.now()).await {
            self.run_scheduled_send(day).await?;
        }

        captured
    }

    /// 今天的发送时刻已过、尚未发送且本上下文未失败过时返回今天
    pub async fn overdue_send(&self, now: NaiveDateTime) -> Option<NaiveDate> {
        let today = now.date();
        if self.schedule.send_instant_on(today) > now || self.send_failed_on(today) {
            return None;
        }
        (!self.state.lock().await.sent_on(today)).then_some(today)
    }

    fn send_failed_on(&self, day: NaiveDate) -> bool {
        *self.failed_send.lock().unwrap_or_else(|e| e.into_inner()) == Some(day)
    }

    /// 执行一次计划拍摄；`threshold` 之后已经拍过时直接返回
    pub async fn run_capture(&self, threshold: NaiveDateTime, now: NaiveDateTime) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        if state.captured_since(threshold) {
            info!("[Scheduler] Capture for {} already done", threshold);
            return Ok(false);
        }

        match self.pipeline.capture(now).await {
            Ok(CaptureOutcome::Captured(images)) => {
                state.last_capture_timestamp = Some(now);
                self.state_store.save(&state)?;
                self.publish_state(&state);
                self.status.send_modify(|s| s.last_capture_error = None);
                info!("[Scheduler] Captured {} image(s) for {}", images.len(), threshold);
                Ok(true)
            }
            Ok(CaptureOutcome::Skipped { reason }) => {
                warn!("[Scheduler] Capture for {} skipped: {}", threshold, reason);
                self.status.send_modify(|s| s.last_capture_error = Some(reason));
                Ok(false)
            }
            Err(e) => {
                self.status.send_modify(|s| s.last_capture_error = Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// 计划发送：每天最多一次
    ///
    /// 投递失败不标记已发送，也不向上返回错误；没有图片时视为当天已完成
    pub async fn run_scheduled_send(&self, day: NaiveDate) -> AppResult<SendResult> {
        let mut state = self.state.lock().await;
        if state.sent_on(day) {
            return Ok(SendResult::AlreadySent);
        }

        let result = match self.send_report(day).await {
            Ok(result) => result,
            Err(e) => SendResult::Failed(e.to_string()),
        };

        match &result {
            SendResult::Sent { .. } | SendResult::NoImages => {
                state.last_sent_date = Some(day);
                self.state_store.save(&state)?;
                self.publish_state(&state);
                self.record_send(&result, day);
            }
            SendResult::Failed(_) => {
                *self.failed_send.lock().unwrap_or_else(|e| e.into_inner()) = Some(day);
                self.record_send(&result, day);
            }
            SendResult::AlreadySent => {}
        }

        info!("[Scheduler] {}", result.describe(day));
        Ok(result)
    }

    /// 手动重发某天的报告，不受 last_sent_date 限制
    ///
    /// 只有重发的是今天且本实例持有锁时才更新持久化状态
    pub async fn resend(&self, day: NaiveDate) -> AppResult<SendResult> {
        let today = self.now().date();
        if day > today {
            return Err(AppError::validation(30, format!("不能发送未来日期的报告: {}", day)));
        }

        let mut state = self.state.lock().await;
        let result = match self.send_report(day).await {
            Ok(result) => result,
            Err(e) => {
                let result = SendResult::Failed(e.to_string());
                self.record_send(&result, day);
                return Err(e);
            }
        };

        if day == today && self.lock_held() {
            state.last_sent_date = Some(day);
            self.state_store.save(&state)?;
            self.publish_state(&state);
        }
        self.record_send(&result, day);
        info!("[Scheduler] Manual resend: {}", result.describe(day));
        Ok(result)
    }

    /// 重新生成某天的动图摘要，不发送
    pub async fn rebuild_summary(&self, day: NaiveDate) -> AppResult<Option<PathBuf>> {
        let _gate = self.state.lock().await;
        let assembler = Arc::clone(&self.assembler);
        tokio::task::spawn_blocking(move || assembler.rebuild_summary(day))
            .await
            .map_err(|e| AppError::image(21, format!("生成动图任务异常退出: {}", e)))?
    }

    /// 启动任务：可选的启动拍摄，以及补发当天错过的报告
    pub async fn startup_tasks(&self, now: NaiveDateTime) -> AppResult<()> {
        if self.settings.startup_capture {
            let mut state = self.state.lock().await;
            if state.last_capture_timestamp.is_none() {
                match self.pipeline.capture_startup(now).await {
                    Ok(path) => {
                        info!("[Scheduler] Startup capture saved to {}", path.display());
                        state.last_capture_timestamp = Some(now);
                        self.state_store.save(&state)?;
                        self.publish_state(&state);
                    }
                    Err(e) => {
                        warn!("[Scheduler] Startup capture failed: {}", e);
                        self.status.send_modify(|s| s.last_capture_error = Some(e.to_string()));
                    }
                }
            }
        }

        if let Some(today) = self.overdue_send(now).await {
            info!("[Scheduler] Send time for {} already passed, catching up", today);
            self.run_scheduled_send(today).await?;
        }

        Ok(())
    }

    /// 组装并投递报告；返回 NoImages 或 Sent
    async fn send_report(&self, day: NaiveDate) -> AppResult<SendResult> {
        let assembler = Arc::clone(&self.assembler);
        let outcome = tokio::task::spawn_blocking(move || assembler.build(day))
            .await
            .map_err(|e| AppError::image(21, format!("组装报告任务异常退出: {}", e)))??;

        let payload = match outcome {
            ReportOutcome::NoImages { .. } => return Ok(SendResult::NoImages),
            ReportOutcome::Ready(payload) => payload,
        };

        let attachments = payload.attachments.len();
        let message = MailMessage::from_report(&self.settings.email, &self.settings.recipients, payload);
        deliver_with_retry(self.transport.as_ref(), &message, self.send_retry_delay).await?;
        Ok(SendResult::Sent { attachments })
    }

    fn record_send(&self, result: &SendResult, day: NaiveDate) {
        let description = result.describe(day);
        let error = match result {
            SendResult::Failed(e) => Some(e.clone()),
            _ => None,
        };
        self.status.send_modify(|s| {
            s.last_send_status = Some(description);
            s.last_send_error = error;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::processing::encode_jpeg;
    use crate::settings::parse_settings;
    use async_trait::async_trait;
    use image::{DynamicImage, Rgb, RgbImage};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    struct StaticSource {
        frame: Vec<u8>,
    }

    #[async_trait]
    impl FrameSource for StaticSource {
        fn name(&self) -> &str {
            "static"
        }

        async fn fetch_frame(&self) -> AppResult<Vec<u8>> {
            Ok(self.frame.clone())
        }
    }

    struct CountingTransport {
        calls: AtomicU32,
        fail: bool,
    }

    #[async_trait]
    impl MailTransport for CountingTransport {
        async fn send(&self, _message: &MailMessage) -> AppResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(AppError::mail(1, "SMTP 不可用"))
            } else {
                Ok(())
            }
        }
    }

    struct FixedClock(NaiveDateTime);

    impl Clock for FixedClock {
        fn now(&self) -> NaiveDateTime {
            self.0
        }
    }

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, day).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    fn context(temp_dir: &TempDir, now: NaiveDateTime, fail: bool, extra: &str) -> (EmailerContext, Arc<CountingTransport>) {
        let yaml = format!(
            r#"
email: camera@example.com
password: hunter2
recipients: [family@example.com]
camera: {{kind: http, url: "http://cam/snap.jpg"}}
save_dir: {}
weekday_schedule: ["07:00", "12:00"]
send_time: "20:00"
timestamp_overlay: false
{}
"#,
            temp_dir.path().display(),
            extra
        );
        let settings = Arc::new(parse_settings(&yaml).unwrap());
        let frame = encode_jpeg(&DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 48, Rgb([10, 20, 30])))).unwrap();
        let transport = Arc::new(CountingTransport { calls: AtomicU32::new(0), fail });
        let collaborators = Collaborators {
            primary: Arc::new(StaticSource { frame }),
            secondary: None,
            transport: transport.clone(),
            clock: Arc::new(FixedClock(now)),
        };
        let ctx = EmailerContext::new(settings, collaborators)
            .unwrap()
            .with_retry_delays(Duration::ZERO, Duration::ZERO);
        (ctx, transport)
    }

    #[tokio::test]
    async fn test_capture_then_send_same_wakeup() {
        let temp_dir = TempDir::new().unwrap();
        let (ctx, transport) = context(&temp_dir, at(19, 20, 0), false, "");

        ctx.handle_due(at(19, 20, 0), Some(at(19, 20, 0)), at(19, 20, 0)).await.unwrap();

        let state = ctx.persistent_state().await;
        assert_eq!(state.last_capture_timestamp, Some(at(19, 20, 0)));
        assert_eq!(state.last_sent_date, Some(at(19, 0, 0).date()));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert_eq!(StateStore::in_dir(temp_dir.path()).load(), state);
    }

    #[tokio::test]
    async fn test_capture_not_repeated_for_same_threshold() {
        let temp_dir = TempDir::new().unwrap();
        let (ctx, _) = context(&temp_dir, at(19, 7, 0), false, "");

        assert!(ctx.run_capture(at(19, 7, 0), at(19, 7, 0)).await.unwrap());
        assert!(!ctx.run_capture(at(19, 7, 0), at(19, 7, 0)).await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_send_is_not_marked() {
        let temp_dir = TempDir::new().unwrap();
        let (ctx, transport) = context(&temp_dir, at(19, 20, 0), true, "");
        ctx.run_capture(at(19, 7, 0), at(19, 7, 0)).await.unwrap();

        let result = ctx.run_scheduled_send(at(19, 0, 0).date()).await.unwrap();

        assert!(matches!(result, SendResult::Failed(_)));
        assert_eq!(transport.calls.load(Ordering::SeqCst), crate::mail::SEND_ATTEMPTS);
        assert!(ctx.persistent_state().await.last_sent_date.is_none());
        assert!(ctx.status().last_send_error.is_some());
    }

    #[tokio::test]
    async fn test_no_images_marks_day_done() {
        let temp_dir = TempDir::new().unwrap();
        let (ctx, transport) = context(&temp_dir, at(19, 20, 0), false, "");

        let result = ctx.run_scheduled_send(at(19, 0, 0).date()).await.unwrap();

        assert_eq!(result, SendResult::NoImages);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        assert_eq!(ctx.persistent_state().await.last_sent_date, Some(at(19, 0, 0).date()));
    }

    #[tokio::test]
    async fn test_resend_rejects_future_and_skips_state_without_lock() {
        let temp_dir = TempDir::new().unwrap();
        let (ctx, transport) = context(&temp_dir, at(19, 20, 30), false, "");
        ctx.run_capture(at(19, 12, 0), at(19, 12, 0)).await.unwrap();

        assert!(ctx.resend(at(20, 0, 0).date()).await.is_err());

        let result = ctx.resend(at(19, 0, 0).date()).await.unwrap();
        assert_eq!(result, SendResult::Sent { attachments: 1 });
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert!(ctx.persistent_state().await.last_sent_date.is_none());

        ctx.set_loop_state(LoopState::Running, true);
        ctx.resend(at(19, 0, 0).date()).await.unwrap();
        assert_eq!(ctx.persistent_state().await.last_sent_date, Some(at(19, 0, 0).date()));
    }

    #[tokio::test]
    async fn test_overdue_send_runs_after_next_send_rolled_over() {
        let temp_dir = TempDir::new().unwrap();
        let (ctx, transport) = context(&temp_dir, at(19, 20, 2), false, "");
        ctx.run_capture(at(19, 7, 0), at(19, 7, 0)).await.unwrap();

        // 醒来时重新计算的下一次发送已经是明天
        ctx.handle_due(at(19, 20, 2), None, at(20, 20, 0)).await.unwrap();

        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.persistent_state().await.last_sent_date, Some(at(19, 0, 0).date()));
        assert_eq!(ctx.overdue_send(at(19, 20, 3)).await, None);
    }

    #[tokio::test]
    async fn test_failed_overdue_send_not_retried_in_same_context() {
        let temp_dir = TempDir::new().unwrap();
        let (ctx, transport) = context(&temp_dir, at(19, 20, 2), true, "");
        ctx.run_capture(at(19, 7, 0), at(19, 7, 0)).await.unwrap();

        assert_eq!(ctx.overdue_send(at(19, 20, 2)).await, Some(at(19, 0, 0).date()));
        ctx.handle_due(at(19, 20, 2), None, at(20, 20, 0)).await.unwrap();
        ctx.handle_due(at(19, 20, 2), None, at(20, 20, 0)).await.unwrap();

        assert_eq!(transport.calls.load(Ordering::SeqCst), crate::mail::SEND_ATTEMPTS);
        assert_eq!(ctx.overdue_send(at(19, 20, 2)).await, None);
    }

    #[tokio::test]
    async fn test_send_not_overdue_before_send_time() {
        let temp_dir = TempDir::new().unwrap();
        let (ctx, _) = context(&temp_dir, at(19, 19, 59), false, "");
        assert_eq!(ctx.overdue_send(at(19, 19, 59)).await, None);
    }

    #[tokio::test]
    async fn test_startup_catch_up_and_capture() {
        let temp_dir = TempDir::new().unwrap();
        let (ctx, transport) = context(&temp_dir, at(19, 21, 0), false, "startup_capture: true");

        ctx.startup_tasks(at(19, 21, 0)).await.unwrap();

        let state = ctx.persistent_state().await;
        assert_eq!(state.last_capture_timestamp, Some(at(19, 21, 0)));
        assert_eq!(state.last_sent_date, Some(at(19, 0, 0).date()));
        // 启动拍摄不计入每日报告
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        assert!(temp_dir.path().join("startup").exists());
    }

    #[tokio::test]
    async fn test_status_recomputes_next_events() {
        let temp_dir = TempDir::new().unwrap();
        let (ctx, _) = context(&temp_dir, at(19, 6, 59), false, "");

        let status = ctx.status();
        assert_eq!(status.loop_state, LoopState::Stopped);
        assert_eq!(status.next_capture, Some(at(19, 7, 0)));
        assert_eq!(status.next_send, Some(at(19, 20, 0)));
        assert_eq!(status.lock_path, temp_dir.path().join(LOCK_FILE_NAME));
    }

    #[tokio::test]
    async fn test_rebuild_summary_for_day() {
        let temp_dir = TempDir::new().unwrap();
        let (ctx, _) = context(&temp_dir, at(19, 13, 0), false, "");
        ctx.run_capture(at(19, 7, 0), at(19, 7, 0)).await.unwrap();
        ctx.run_capture(at(19, 12, 0), at(19, 12, 0)).await.unwrap();

        let path = ctx.rebuild_summary(at(19, 0, 0).date()).await.unwrap().unwrap();
        assert!(path.ends_with("20261019/summary_20261019.gif"));
    }
}
