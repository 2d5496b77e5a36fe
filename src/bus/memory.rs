//! 内存消息总线
//!
//! 主题为点分层级，过滤器支持 NATS 风格通配：`*` 匹配单段，`>` 匹配余下所有段。
//! 订阅表用同步锁保护（临界区只做哈希表操作），Drop 订阅句柄时同步注销，
//! 保证监听器数量不随错误路径增长；active_subscriptions 暴露给测试断言无泄漏。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use super::traits::{BusError, Delivery, DeliveryOutcome, MessageBus, Subscription};

/// 过滤器是否匹配主题（逐段比较）
pub fn subject_matches(filter: &str, subject: &str) -> bool {
    let mut filter_parts = filter.split('.');
    let mut subject_parts = subject.split('.');

    loop {
        match (filter_parts.next(), subject_parts.next()) {
            (Some(">"), _) => return true,
            (Some("*"), Some(_)) => continue,
            (Some(f), Some(s)) if f == s => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

struct SubEntry {
    filter: String,
    tx: mpsc::UnboundedSender<Delivery>,
}

#[derive(Default)]
struct BusState {
    subscriptions: HashMap<u64, SubEntry>,
    acked: u64,
    rejected: u64,
}

/// 进程内总线实现
pub struct InMemoryBus {
    state: Arc<Mutex<BusState>>,
    next_id: AtomicU64,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BusState::default())),
            next_id: AtomicU64::new(1),
        }
    }

    /// 当前活动监听器数量（测试用：证明无泄漏）
    pub fn active_subscriptions(&self) -> usize {
        self.state.lock().unwrap().subscriptions.len()
    }

    /// 累计 (acked, rejected) 计数
    pub fn delivery_counts(&self) -> (u64, u64) {
        let state = self.state.lock().unwrap();
        (state.acked, state.rejected)
    }

    fn record_outcome(state: &Arc<Mutex<BusState>>, outcome: DeliveryOutcome) {
        let mut state = state.lock().unwrap();
        match outcome {
            DeliveryOutcome::Acked => state.acked += 1,
            DeliveryOutcome::Rejected => state.rejected += 1,
        }
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), BusError> {
        let mut deliveries = Vec::new();
        {
            let state = self.state.lock().unwrap();
            for entry in state.subscriptions.values() {
                if subject_matches(&entry.filter, subject) {
                    let (outcome_tx, outcome_rx) = oneshot::channel();
                    deliveries.push((
                        entry.tx.clone(),
                        Delivery::new(subject, payload.clone(), Some(outcome_tx)),
                        outcome_rx,
                    ));
                }
            }
        }

        for (tx, delivery, outcome_rx) in deliveries {
            // 订阅者可能刚好退出，发送失败忽略
            if tx.send(delivery).is_ok() {
                let state = Arc::clone(&self.state);
                tokio::spawn(async move {
                    if let Ok(outcome) = outcome_rx.await {
                        InMemoryBus::record_outcome(&state, outcome);
                    }
                });
            }
        }

        Ok(())
    }

    async fn subscribe(&self, filter: &str) -> Result<Box<dyn Subscription>, BusError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        self.state.lock().unwrap().subscriptions.insert(
            id,
            SubEntry {
                filter: filter.to_string(),
                tx,
            },
        );

        Ok(Box::new(MemorySubscription {
            id,
            rx,
            state: Arc::clone(&self.state),
            removed: false,
        }))
    }
}

struct MemorySubscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<Delivery>,
    state: Arc<Mutex<BusState>>,
    removed: bool,
}

impl MemorySubscription {
    fn remove(&mut self) {
        if !self.removed {
            self.state.lock().unwrap().subscriptions.remove(&self.id);
            self.removed = true;
        }
    }
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn next(&mut self) -> Result<Delivery, BusError> {
        self.rx.recv().await.ok_or(BusError::Closed)
    }

    async fn unsubscribe(mut self: Box<Self>) -> Result<(), BusError> {
        self.remove();
        Ok(())
    }
}

impl Drop for MemorySubscription {
    fn drop(&mut self) {
        self.remove();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_matching() {
        assert!(subject_matches("plan.focus.request", "plan.focus.request"));
        assert!(subject_matches("plan.focus.*", "plan.focus.request"));
        assert!(subject_matches("plan.>", "plan.focus.response.abc"));
        assert!(!subject_matches("plan.focus.*", "plan.focus.response.abc"));
        assert!(!subject_matches("plan.focus.request", "plan.focus"));
        assert!(!subject_matches("other.>", "plan.focus.request"));
    }

    #[tokio::test]
    async fn test_publish_reaches_matching_subscriber() {
        let bus = InMemoryBus::new();
        let mut sub = bus.subscribe("plan.focus.*").await.unwrap();

        bus.publish("plan.focus.request", b"hello".to_vec())
            .await
            .unwrap();

        let delivery = sub.next().await.unwrap();
        assert_eq!(delivery.subject, "plan.focus.request");
        assert_eq!(delivery.payload, b"hello");
        delivery.ack();
    }

    #[tokio::test]
    async fn test_non_matching_subject_not_delivered() {
        let bus = InMemoryBus::new();
        let mut sub = bus.subscribe("plan.result.*").await.unwrap();

        bus.publish("plan.focus.request", b"x".to_vec()).await.unwrap();

        // 不应有任何投递
        let got = tokio::time::timeout(std::time::Duration::from_millis(50), sub.next()).await;
        assert!(got.is_err(), "expected timeout, got a delivery");
    }

    #[tokio::test]
    async fn test_unsubscribe_removes_listener() {
        let bus = InMemoryBus::new();
        let sub = bus.subscribe("a.b").await.unwrap();
        assert_eq!(bus.active_subscriptions(), 1);

        sub.unsubscribe().await.unwrap();
        assert_eq!(bus.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_drop_also_removes_listener() {
        let bus = InMemoryBus::new();
        {
            let _sub = bus.subscribe("a.b").await.unwrap();
            assert_eq!(bus.active_subscriptions(), 1);
        }
        assert_eq!(bus.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_ack_and_reject_counted() {
        let bus = InMemoryBus::new();
        let mut sub = bus.subscribe("a.b").await.unwrap();

        bus.publish("a.b", b"1".to_vec()).await.unwrap();
        bus.publish("a.b", b"2".to_vec()).await.unwrap();

        sub.next().await.unwrap().ack();
        sub.next().await.unwrap().reject();

        // 结果经由 spawn 记录，让出一轮调度
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        assert_eq!(bus.delivery_counts(), (1, 1));
    }
}
