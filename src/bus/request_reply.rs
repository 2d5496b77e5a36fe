//! 总线上的请求/应答原语
//!
//! 关联方式：每次请求生成 uuid v4 作为关联 ID，应答主题把 ID 嵌在尾段，
//! 请求方只监听自己那条应答主题。必须先建好监听器再发布请求，
//! 否则应答可能在监听器就位之前到达而永久丢失。
//!
//! 监听器在所有退出路径上统一注销：成功、超时、取消、载荷畸形都会走到
//! 同一处 unsubscribe。畸形应答拒收并报错，不做自动重试。

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::traits::{BusError, MessageBus, Subscription};

/// 请求/应答错误
#[derive(Debug, Error)]
pub enum RequestError {
    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("request on {subject} timed out after {timeout:?}")]
    Timeout { subject: String, timeout: Duration },

    #[error("request on {subject} cancelled")]
    Cancelled { subject: String },

    #[error("malformed reply on {subject}: {reason}")]
    Malformed { subject: String, reason: String },

    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// 请求信封：载荷外带关联 ID 与应答主题
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub request_id: String,
    pub reply_to: String,
    pub payload: T,
}

/// 带超时的请求/应答客户端
pub struct RequestReply {
    bus: Arc<dyn MessageBus>,
    timeout: Duration,
}

impl RequestReply {
    pub fn new(bus: Arc<dyn MessageBus>, timeout: Duration) -> Self {
        Self { bus, timeout }
    }

    /// 发出请求并等待一条应答
    ///
    /// reply_prefix 决定应答主题：`{reply_prefix}.{request_id}`。
    pub async fn request<Req, Resp>(
        &self,
        subject: &str,
        reply_prefix: &str,
        payload: Req,
        cancel: &CancellationToken,
    ) -> Result<Resp, RequestError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let request_id = Uuid::new_v4().to_string();
        let reply_to = format!("{reply_prefix}.{request_id}");

        let envelope = Envelope {
            request_id: request_id.clone(),
            reply_to: reply_to.clone(),
            payload,
        };
        let bytes = serde_json::to_vec(&envelope)?;

        // 先订阅后发布
        let mut sub = self.bus.subscribe(&reply_to).await?;
        debug!(subject, reply_to, "dispatching request");

        let outcome = self
            .await_reply(&mut sub, subject, &reply_to, bytes, cancel)
            .await;

        // 唯一的注销点，所有路径都经过这里
        if let Err(err) = sub.unsubscribe().await {
            warn!(reply_to, error = %err, "failed to remove reply listener");
        }

        outcome
    }

    async fn await_reply<Resp>(
        &self,
        sub: &mut Box<dyn Subscription>,
        subject: &str,
        reply_to: &str,
        bytes: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<Resp, RequestError>
    where
        Resp: DeserializeOwned,
    {
        self.bus.publish(subject, bytes).await?;

        tokio::select! {
            _ = cancel.cancelled() => Err(RequestError::Cancelled {
                subject: subject.to_string(),
            }),
            _ = tokio::time::sleep(self.timeout) => Err(RequestError::Timeout {
                subject: subject.to_string(),
                timeout: self.timeout,
            }),
            delivery = sub.next() => {
                let delivery = delivery?;
                match serde_json::from_slice::<Resp>(&delivery.payload) {
                    Ok(reply) => {
                        delivery.ack();
                        Ok(reply)
                    }
                    Err(err) => {
                        delivery.reject();
                        Err(RequestError::Malformed {
                            subject: reply_to.to_string(),
                            reason: err.to_string(),
                        })
                    }
                }
            }
        }
    }
}

/// 把一个可序列化值作为 JSON 发布到指定主题（应答方用）
pub async fn publish_json<T: Serialize>(
    bus: &dyn MessageBus,
    subject: &str,
    value: &T,
) -> Result<(), RequestError> {
    let bytes = serde_json::to_vec(value)?;
    bus.publish(subject, bytes).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::memory::InMemoryBus;

    #[derive(Debug, Serialize, Deserialize)]
    struct Ping {
        question: String,
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Pong {
        answer: String,
    }

    fn spawn_echo_responder(bus: Arc<InMemoryBus>) {
        tokio::spawn(async move {
            let mut sub = bus.subscribe("echo.request").await.unwrap();
            while let Ok(delivery) = sub.next().await {
                let env: Envelope<Ping> = serde_json::from_slice(&delivery.payload).unwrap();
                delivery.ack();
                let reply = Pong {
                    answer: env.payload.question.to_uppercase(),
                };
                publish_json(bus.as_ref(), &env.reply_to, &reply).await.unwrap();
            }
        });
    }

    #[tokio::test]
    async fn test_request_receives_correlated_reply() {
        let bus = Arc::new(InMemoryBus::new());
        spawn_echo_responder(Arc::clone(&bus));
        // 让出一轮调度，确保应答方在请求发布前完成订阅
        tokio::task::yield_now().await;

        let client = RequestReply::new(bus.clone(), Duration::from_secs(1));
        let cancel = CancellationToken::new();

        let reply: Pong = client
            .request(
                "echo.request",
                "echo.response",
                Ping { question: "hi".into() },
                &cancel,
            )
            .await
            .unwrap();

        assert_eq!(reply, Pong { answer: "HI".into() });
    }

    #[tokio::test]
    async fn test_timeout_when_nobody_replies() {
        let bus = Arc::new(InMemoryBus::new());
        let client = RequestReply::new(bus.clone(), Duration::from_millis(50));
        let cancel = CancellationToken::new();

        let result: Result<Pong, _> = client
            .request(
                "void.request",
                "void.response",
                Ping { question: "hello".into() },
                &cancel,
            )
            .await;

        assert!(matches!(result, Err(RequestError::Timeout { .. })));
        // 超时路径也要把监听器清掉
        assert_eq!(bus.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_tears_down_listener() {
        let bus = Arc::new(InMemoryBus::new());
        let client = RequestReply::new(bus.clone(), Duration::from_secs(5));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: Result<Pong, _> = client
            .request(
                "void.request",
                "void.response",
                Ping { question: "hello".into() },
                &cancel,
            )
            .await;

        assert!(matches!(result, Err(RequestError::Cancelled { .. })));
        assert_eq!(bus.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_malformed_reply_rejected_without_retry() {
        let bus = Arc::new(InMemoryBus::new());

        // 应答方回送无法解析的字节
        {
            let bus = Arc::clone(&bus);
            tokio::spawn(async move {
                let mut sub = bus.subscribe("echo.request").await.unwrap();
                let delivery = sub.next().await.unwrap();
                let env: Envelope<Ping> = serde_json::from_slice(&delivery.payload).unwrap();
                delivery.ack();
                bus.publish(&env.reply_to, b"not json".to_vec()).await.unwrap();
            });
        }
        // 让出一轮调度，确保应答方在请求发布前完成订阅
        tokio::task::yield_now().await;

        let client = RequestReply::new(bus.clone(), Duration::from_secs(1));
        let cancel = CancellationToken::new();

        let result: Result<Pong, _> = client
            .request(
                "echo.request",
                "echo.response",
                Ping { question: "hi".into() },
                &cancel,
            )
            .await;

        assert!(matches!(result, Err(RequestError::Malformed { .. })));
        assert_eq!(bus.active_subscriptions(), 0);

        tokio::time::sleep(Duration::from_millis(10)).await;
        let (_acked, rejected) = bus.delivery_counts();
        assert_eq!(rejected, 1);
    }
}
