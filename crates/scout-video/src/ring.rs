use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::Notify;

/// 固定容量、最新优先的环形缓冲
///
/// push 永不阻塞：满了弹出并返回最旧元素交还调用方释放。
/// 内容排序模式下缓冲始终按排序键降序，弹出的是排序最低的元素。
pub struct RingBuffer<T> {
    /// front 最旧 / 排序最高，back 最新 / 排序最低
    ring: VecDeque<T>,
    capacity: usize,
    ready: Arc<Notify>,
    sort_key: Option<Box<dyn Fn(&T, &T) -> Ordering + Send>>,
}

impl<T> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: VecDeque::new(),
            capacity,
            ready: Arc::new(Notify::new()),
            sort_key: None,
        }
    }

    /// 启用内容排序：每次 push 后按 cmp 降序重排再裁剪
    pub fn sorted_by(mut self, cmp: impl Fn(&T, &T) -> Ordering + Send + 'static) -> Self {
        self.sort_key = Some(Box::new(cmp));
        self
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// push 一个元素，返回被挤出的元素（容量为 0 时即入参本身）
    pub fn push(&mut self, item: T) -> Option<T> {
        if self.capacity == 0 {
            return Some(item);
        }
        let evicted = match &self.sort_key {
            Some(cmp) => {
                self.ring.push_back(item);
                self.ring.make_contiguous().sort_by(|a, b| cmp(b, a));
                if self.ring.len() > self.capacity {
                    self.ring.pop_back()
                } else {
                    None
                }
            }
            None => {
                let evicted = if self.ring.len() == self.capacity {
                    self.ring.pop_front()
                } else {
                    None
                };
                self.ring.push_back(item);
                evicted
            }
        };
        // 边沿触发的就绪信号
        self.ready.notify_one();
        evicted
    }

    /// 弹出最新（排序模式下为排序最高）的元素
    pub fn pop(&mut self) -> Option<T> {
        if self.sort_key.is_some() {
            self.ring.pop_front()
        } else {
            self.ring.pop_back()
        }
    }

    /// 全部取出，最旧在前（排序模式下按排序键降序）
    pub fn drain_all(&mut self) -> Vec<T> {
        self.ring.drain(..).collect()
    }

    /// 就绪信号，每次 push 触发一次
    pub fn ready(&self) -> Arc<Notify> {
        self.ready.clone()
    }
}
