#![doc = include_str!("../README.md")]

pub mod codec;
pub mod consumer;
pub mod envelope;
pub mod kind;
pub mod message;
pub mod payload;
pub mod queue;
pub mod rows;
pub mod transport;

#[doc(inline)]
pub use kind::{KindShape, PayloadKind};

#[doc(inline)]
pub use envelope::{Envelope, EnvelopeError, EnvelopeErrorKind, Malformation, RowMessage};

#[doc(inline)]
pub use message::{DEFAULT_MAX_RETRIES, QueueMessage, RetryableMessage, TransportHandle};

#[doc(inline)]
pub use payload::Payload;

#[doc(inline)]
pub use queue::{InMemoryQueue, MessageQueue, MockQueue, QueueError, QueueErrorKind, QueueStats};

#[doc(inline)]
pub use transport::Transport;

#[doc(inline)]
pub use consumer::{
    Consumer, ConsumerConfig, ConsumerHook, ConsumerRunError, ConsumerRunErrorKind,
    DefaultConsumerHook, MessageHandler,
};
