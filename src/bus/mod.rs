//! 消息总线层：总线抽象、内存实现、请求/应答原语、主题命名

pub mod memory;
pub mod request_reply;
pub mod subjects;
pub mod traits;

pub use memory::InMemoryBus;
pub use request_reply::{publish_json, Envelope, RequestError, RequestReply};
pub use traits::{BusError, Delivery, DeliveryOutcome, MessageBus, Subscription};
