use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use scout_core::{Result, ScoutError};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// 订阅者 id
pub type SubscriberId = Uuid;

struct Subscriber {
    /// Box<mpsc::Sender<T>>
    sender: Box<dyn Any + Send>,
    /// 区分同 id 先后两次订阅，防止旧句柄 Drop 误删新订阅
    epoch: u64,
}

struct Topic {
    type_id: TypeId,
    type_name: &'static str,
    subs: HashMap<SubscriberId, Subscriber>,
}

struct Inner {
    topics: Mutex<HashMap<String, Topic>>,
    next_epoch: AtomicU64,
    next_response: AtomicU64,
    closed: AtomicBool,
}

/// 类型化话题 hub
#[derive(Clone)]
pub struct PubSub {
    inner: Arc<Inner>,
}

impl Default for PubSub {
    fn default() -> Self {
        Self::new()
    }
}

impl PubSub {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                topics: Mutex::new(HashMap::new()),
                next_epoch: AtomicU64::new(1),
                next_response: AtomicU64::new(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// 声明话题的消息类型，重复声明同类型幂等
    pub fn register_topic<T: Send + 'static>(&self, topic: &str) -> Result<()> {
        let mut topics = self.lock_topics();
        match topics.get(topic) {
            Some(existing) if existing.type_id != TypeId::of::<T>() => {
                Err(ScoutError::PubSub(format!(
                    "topic {} already registered as {}",
                    topic, existing.type_name
                )))
            }
            Some(_) => Ok(()),
            None => {
                topics.insert(topic.to_string(), Self::new_topic::<T>());
                Ok(())
            }
        }
    }

    pub fn unique_subscriber_id(&self) -> SubscriberId {
        Uuid::new_v4()
    }

    /// 生成唯一响应话题名：`<base>+<单调 id>`
    pub fn response_topic(&self, base: &str) -> String {
        let id = self.inner.next_response.fetch_add(1, Ordering::Relaxed);
        format!("{}+{}", base, id)
    }

    /// 订阅话题，同 id 重复订阅时替换旧队列
    pub fn subscribe<T: Send + 'static>(
        &self,
        topic: &str,
        id: SubscriberId,
        capacity: usize,
    ) -> Result<Subscription<T>> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(ScoutError::PubSub("hub closed".to_string()));
        }
        let mut topics = self.lock_topics();
        let entry = topics
            .entry(topic.to_string())
            .or_insert_with(Self::new_topic::<T>);
        if entry.type_id != TypeId::of::<T>() {
            return Err(ScoutError::PubSub(format!(
                "topic {} carries {}, not {}",
                topic,
                entry.type_name,
                std::any::type_name::<T>()
            )));
        }
        let (tx, rx) = mpsc::channel::<T>(capacity.max(1));
        let epoch = self.inner.next_epoch.fetch_add(1, Ordering::Relaxed);
        entry.subs.insert(
            id,
            Subscriber {
                sender: Box::new(tx),
                epoch,
            },
        );
        Ok(Subscription {
            topic: topic.to_string(),
            id,
            epoch,
            rx,
            hub: Arc::downgrade(&self.inner),
        })
    }

    /// 按 id 退订：移除发送端，订阅者的 recv 随之返回 None；重复退订为空操作
    pub fn unsubscribe(&self, topic: &str, id: SubscriberId) {
        let mut topics = self.lock_topics();
        if let Some(entry) = topics.get_mut(topic) {
            entry.subs.remove(&id);
        }
    }

    /// 发布消息：对每个订阅者非阻塞入队，队列满只丢该订阅者的这一条。
    /// 返回成功投递的订阅者数量。
    pub fn publish<T: Clone + Send + 'static>(&self, topic: &str, msg: T) -> Result<usize> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Ok(0);
        }
        let mut topics = self.lock_topics();
        let entry = topics
            .entry(topic.to_string())
            .or_insert_with(Self::new_topic::<T>);
        if entry.type_id != TypeId::of::<T>() {
            return Err(ScoutError::PubSub(format!(
                "topic {} carries {}, not {}",
                topic,
                entry.type_name,
                std::any::type_name::<T>()
            )));
        }
        let mut delivered = 0;
        let mut gone = Vec::new();
        for (id, sub) in entry.subs.iter() {
            let sender = match sub.sender.downcast_ref::<mpsc::Sender<T>>() {
                Some(s) => s,
                None => continue,
            };
            match sender.try_send(msg.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(topic = %topic, subscriber = %id, "subscriber queue full, dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => gone.push(*id),
            }
        }
        for id in gone {
            entry.subs.remove(&id);
        }
        Ok(delivered)
    }

    /// 请求-响应：订阅响应话题、发布请求、等待首条响应。
    /// 超时返回 None，订阅总是被回收。
    pub async fn send_receive<Req, Resp>(
        &self,
        req_topic: &str,
        resp_topic: &str,
        req: Req,
        timeout_ms: u64,
    ) -> Option<Resp>
    where
        Req: Clone + Send + 'static,
        Resp: Clone + Send + 'static,
    {
        let id = self.unique_subscriber_id();
        let mut sub = self.subscribe::<Resp>(resp_topic, id, 1).ok()?;
        if self.publish(req_topic, req).is_err() {
            return None;
        }
        match tokio::time::timeout(Duration::from_millis(timeout_ms), sub.recv()).await {
            Ok(Some(resp)) => Some(resp),
            _ => None,
        }
    }

    /// 关闭 hub：丢弃全部订阅发送端，订阅者的 recv 返回 None
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.lock_topics().clear();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    fn new_topic<T: Send + 'static>() -> Topic {
        Topic {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            subs: HashMap::new(),
        }
    }

    fn lock_topics(&self) -> std::sync::MutexGuard<'_, HashMap<String, Topic>> {
        match self.inner.topics.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// 有界订阅队列，Drop 时自动退订
pub struct Subscription<T> {
    topic: String,
    id: SubscriberId,
    epoch: u64,
    rx: mpsc::Receiver<T>,
    hub: Weak<Inner>,
}

impl<T> Subscription<T> {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// 显式退订，等价于 drop
    pub fn unsubscribe(self) {}
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.hub.upgrade() {
            let mut topics = match inner.topics.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(topic) = topics.get_mut(&self.topic) {
                // 同 id 可能已被替换，只删除属于自己这次订阅的条目
                if topic.subs.get(&self.id).map(|s| s.epoch) == Some(self.epoch) {
                    topic.subs.remove(&self.id);
                }
            }
        }
    }
}
