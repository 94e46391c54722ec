/// 宿主命令接口
///
/// 宿主通过 `ImageEmailer` 重新配置、停止调度器，并执行状态查询、
/// 手动重发和重建动图摘要等命令。

use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, RwLock};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};

use crate::error::{AppError, AppResult};
use crate::scheduler::{Collaborators, EmailerContext, SchedulerController, SendResult, StatusSnapshot};
use crate::settings::EmailerSettings;
use crate::storage::parse_day_key;

/// 通用响应结构
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(error: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

/// 将 Result 转换为 ApiResponse
impl<T, E: std::fmt::Display> From<Result<T, E>> for ApiResponse<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(data) => Self::success(data),
            Err(e) => Self::error(e.to_string()),
        }
    }
}

/// 从 AppError 转换为 ApiResponse
impl<T> From<AppError> for ApiResponse<T> {
    fn from(err: AppError) -> Self {
        Self::error(err.to_string())
    }
}

/// 手动命令，例如 `{"command": "resend", "day": "20261019"}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Status,
    Resend { day: String },
    RebuildSummary { day: String },
}

/// 调度引擎门面
pub struct ImageEmailer {
    controller: Mutex<SchedulerController>,
    context: RwLock<Option<Arc<EmailerContext>>>,
}

impl ImageEmailer {
    pub fn new() -> Self {
        Self {
            controller: Mutex::new(SchedulerController::new()),
            context: RwLock::new(None),
        }
    }

    /// 应用新配置：校验失败时同步返回错误且不影响正在运行的循环；
    /// 成功时取消旧循环并以新上下文重新启动
    pub async fn reconfigure(
        &self,
        settings: Arc<EmailerSettings>,
        collaborators: Collaborators,
    ) -> AppResult<()> {
        settings.validate()?;
        let ctx = Arc::new(EmailerContext::new(settings, collaborators)?);
        self.install(ctx).await;
        Ok(())
    }

    /// 以已构建的上下文重新启动循环
    pub async fn install(&self, ctx: Arc<EmailerContext>) {
        let mut controller = self.controller.lock().await;
        controller.start(Arc::clone(&ctx)).await;
        *self.context.write().unwrap_or_else(|e| e.into_inner()) = Some(ctx);
        info!("Configuration applied");
    }

    /// 只加载上下文，不启动循环（单次命令使用）
    pub fn attach(&self, ctx: Arc<EmailerContext>) {
        *self.context.write().unwrap_or_else(|e| e.into_inner()) = Some(ctx);
    }

    /// 停止循环
    pub async fn shutdown(&self) {
        self.controller.lock().await.stop().await;
    }

    pub async fn is_running(&self) -> bool {
        self.controller.lock().await.is_running()
    }

    fn context(&self) -> AppResult<Arc<EmailerContext>> {
        self.context
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| AppError::config(40, "尚未加载配置"))
    }

    /// 状态查询，不等待进行中的拍摄或发送
    pub fn status(&self) -> AppResult<StatusSnapshot> {
        Ok(self.context()?.status())
    }

    /// 手动重发某天（YYYYMMDD）的报告
    pub async fn resend(&self, day: &str) -> AppResult<String> {
        let day = parse_day_key(day)?;
        let ctx = self.context()?;
        let result = ctx.resend(day).await?;
        match result {
            SendResult::Failed(e) => Err(AppError::mail(2, e)),
            other => Ok(other.describe(day)),
        }
    }

    /// 重新生成某天（YYYYMMDD）的动图摘要
    pub async fn rebuild_summary(&self, day: &str) -> AppResult<String> {
        let day = parse_day_key(day)?;
        let ctx = self.context()?;
        match ctx.rebuild_summary(day).await? {
            Some(path) => Ok(format!("Summary for {} written to {}", day, path.display())),
            None => Ok(format!("No images captured on {}, summary not built", day)),
        }
    }

    /// 执行 JSON 命令
    pub async fn do_command(&self, request: &Value) -> ApiResponse<Value> {
        let command: Command = match serde_json::from_value(request.clone()) {
            Ok(command) => command,
            Err(e) => return ApiResponse::error(format!("无效的命令: {}", e)),
        };

        let result = match command {
            Command::Status => self
                .status()
                .and_then(|status| serde_json::to_value(status).map_err(AppError::from)),
            Command::Resend { day } => self.resend(&day).await.map(Value::String),
            Command::RebuildSummary { day } => self.rebuild_summary(&day).await.map(Value::String),
        };
        result.into()
    }

    /// 逐行读取 JSON 命令，逐行写出 JSON 响应
    ///
    /// 每条命令在独立任务中执行，响应按完成顺序写出，
    /// 因此进行中的投递不会阻塞后续的状态查询。输入结束后等待所有命令完成。
    pub async fn serve_lines<R, W>(self: Arc<Self>, reader: R, writer: W) -> AppResult<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<ApiResponse<Value>>();
        let writer_task = tokio::spawn(async move {
            let mut writer = writer;
            while let Some(response) = rx.recv().await {
                let mut line = serde_json::to_vec(&response)?;
                line.push(b'\n');
                writer.write_all(&line).await?;
                writer.flush().await?;
            }
            Ok::<(), AppError>(())
        });

        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let tx = tx.clone();
            match serde_json::from_str::<Value>(&line) {
                Ok(request) => {
                    let emailer = Arc::clone(&self);
                    tokio::spawn(async move {
                        let _ = tx.send(emailer.do_command(&request).await);
                    });
                }
                Err(e) => {
                    warn!("Ignoring malformed command line: {}", e);
                    let _ = tx.send(ApiResponse::error(format!("无效的 JSON: {}", e)));
                }
            }
        }
        drop(tx);

        writer_task
            .await
            .map_err(|e| AppError::io(2, format!("响应写出任务异常退出: {}", e)))?
    }
}

impl Default for ImageEmailer {
    fn default() -> Self {
        Self::new()
    }
}
