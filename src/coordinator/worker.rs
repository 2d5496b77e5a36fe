//! 焦点工作者：消费焦点请求，沿回退链调用生成器，回发结果
//!
//! 每次后端成功/失败都回报给注册表的健康跟踪；整条链都失败时
//! 以 FocusOutcome::Err 应答，让协调器把该分支记为软失败。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tokio::task::JoinHandle;

use crate::bus::{publish_json, BusError, Envelope, MessageBus, Subscription};
use crate::registry::Registry;

use super::generator::PlanGenerator;
use super::types::{FocusOutcome, FocusRequest, PlanFocusResult};

/// 处理焦点规划请求的后台工作者。每条请求在独立任务中处理，
/// 慢分支不会阻塞同回合的其他分支。
#[derive(Clone)]
pub struct FocusWorker {
    bus: Arc<dyn MessageBus>,
    registry: Arc<Registry>,
    generator: Arc<dyn PlanGenerator>,
}

impl FocusWorker {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        registry: Arc<Registry>,
        generator: Arc<dyn PlanGenerator>,
    ) -> Self {
        Self {
            bus,
            registry,
            generator,
        }
    }

    /// 订阅给定主题并在后台任务中消费，直到取消
    ///
    /// 返回时订阅已建立，调用方随后发布的请求不会丢失。
    pub async fn spawn(
        self,
        subject: &str,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<()>, BusError> {
        let sub = self.bus.subscribe(subject).await?;
        info!(subject, "focus worker started");
        let subject = subject.to_string();
        Ok(tokio::spawn(self.consume(subject, sub, cancel)))
    }

    async fn consume(
        self,
        subject: String,
        mut sub: Box<dyn Subscription>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                delivery = sub.next() => {
                    let delivery = match delivery {
                        Ok(d) => d,
                        Err(_) => break,
                    };
                    let envelope: Envelope<FocusRequest> =
                        match serde_json::from_slice(&delivery.payload) {
                            Ok(env) => {
                                delivery.ack();
                                env
                            }
                            Err(err) => {
                                warn!(error = %err, "rejecting malformed focus request");
                                delivery.reject();
                                continue;
                            }
                        };
                    let worker = self.clone();
                    tokio::spawn(async move { worker.handle(envelope).await });
                }
            }
        }

        let _ = sub.unsubscribe().await;
        info!(%subject, "focus worker stopped");
    }

    async fn handle(&self, envelope: Envelope<FocusRequest>) {
        let request = &envelope.payload;
        let outcome = match self.walk_chain(request).await {
            Ok(result) => FocusOutcome::Ok { result },
            Err(message) => {
                warn!(
                    focus = %request.focus.area,
                    slug = %request.slug,
                    %message,
                    "all backends failed for focus"
                );
                FocusOutcome::Err { message }
            }
        };

        if let Err(err) = publish_json(self.bus.as_ref(), &envelope.reply_to, &outcome).await {
            warn!(reply_to = %envelope.reply_to, error = %err, "failed to publish focus reply");
        }
    }

    /// 按序尝试请求携带的回退链
    async fn walk_chain(&self, request: &FocusRequest) -> Result<PlanFocusResult, String> {
        let mut last_error = String::from("no backends in chain");

        for name in &request.backends {
            let Some(descriptor) = self.registry.backend(name) else {
                last_error = format!("backend {name} is not registered");
                continue;
            };

            match self.generator.generate(&descriptor, name, request).await {
                Ok(result) => {
                    self.registry.record_success(name);
                    debug!(backend = %name, focus = %request.focus.area, "focus generated");
                    return Ok(result);
                }
                Err(err) => {
                    self.registry.record_failure(name);
                    warn!(backend = %name, error = %err, "backend attempt failed");
                    last_error = err.to_string();
                }
            }
        }

        Err(last_error)
    }
}
