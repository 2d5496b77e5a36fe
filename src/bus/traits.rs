//! 消息总线抽象
//!
//! 请求/应答原语只依赖这四个动作：按主题发布、按过滤器订阅、逐条确认/拒收、
//! 动态创建与删除监听器。内存实现见 memory.rs；接入真实总线时实现同一 trait。

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::oneshot;

/// 总线错误
#[derive(Debug, Error)]
pub enum BusError {
    #[error("publish to {subject} failed: {reason}")]
    Publish { subject: String, reason: String },

    #[error("subscribe to {filter} failed: {reason}")]
    Subscribe { filter: String, reason: String },

    #[error("bus closed")]
    Closed,
}

/// 投递结果：显式确认 / 显式拒收（畸形载荷等）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Acked,
    Rejected,
}

/// 一次消息投递。消费方必须显式 ack 或 reject；两者都消费掉自身，
/// 一条投递只能表态一次。
#[derive(Debug)]
pub struct Delivery {
    pub subject: String,
    pub payload: Vec<u8>,
    outcome_tx: Option<oneshot::Sender<DeliveryOutcome>>,
}

impl Delivery {
    pub fn new(
        subject: impl Into<String>,
        payload: Vec<u8>,
        outcome_tx: Option<oneshot::Sender<DeliveryOutcome>>,
    ) -> Self {
        Self {
            subject: subject.into(),
            payload,
            outcome_tx,
        }
    }

    /// 确认成功接收
    pub fn ack(mut self) {
        if let Some(tx) = self.outcome_tx.take() {
            let _ = tx.send(DeliveryOutcome::Acked);
        }
    }

    /// 拒收（载荷无法解析等），不使调用方崩溃
    pub fn reject(mut self) {
        if let Some(tx) = self.outcome_tx.take() {
            let _ = tx.send(DeliveryOutcome::Rejected);
        }
    }
}

/// 一个活动订阅。next 必须是取消安全的（可放进 select!）；
/// unsubscribe 显式删除监听器。实现方应保证 Drop 时也会注销，
/// 订阅永远不会比创建它的调用活得更久。
#[async_trait]
pub trait Subscription: Send {
    /// 等待下一条匹配消息；总线关闭时返回 Err(Closed)
    async fn next(&mut self) -> Result<Delivery, BusError>;

    /// 删除监听器
    async fn unsubscribe(self: Box<Self>) -> Result<(), BusError>;
}

/// 消息总线：按主题发布 + 按过滤器创建临时监听器
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), BusError>;

    async fn subscribe(&self, filter: &str) -> Result<Box<dyn Subscription>, BusError>;
}
