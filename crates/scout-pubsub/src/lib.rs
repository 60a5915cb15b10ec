//! 组件内消息总线
//!
//! 每个拥有状态的组件（Monitor、Manage、各 Writer）持有自己的一个 hub。
//! 话题在首次注册/订阅/发布时确定消息类型，之后每次发布都校验类型。
//! 订阅队列有界，发布端从不阻塞：队列满时只对该订阅者丢弃。

mod hub;

pub use hub::{PubSub, SubscriberId, Subscription};
