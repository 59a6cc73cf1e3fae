//! 类型系统模块：消息、会话、请求与流式事件的核心数据类型。
//!
//! # Types Module
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Message`] | Chat message with role and text content |
//! | [`MessageRole`] | `system`, `user` or `assistant` |
//! | [`Conversation`] | Append-only message history of one chat session |
//! | [`CompletionRequest`] | Provider-agnostic request handed to adapters |
//! | [`StreamEvent`] | One content delta (or the final marker) of a streamed reply |
//!
//! ## Example
//!
//! ```rust
//! use ai_lib_relay::types::{CompletionRequest, Conversation, MessageRole};
//!
//! let mut conversation = Conversation::with_system("You are terse.");
//! conversation.push_user("Name a prime.");
//!
//! let request = CompletionRequest::from_conversation(&conversation).with_model("small");
//! assert_eq!(request.messages.len(), 2);
//! assert_eq!(request.messages[1].role, MessageRole::User);
//! ```

pub mod events;
pub mod message;
pub mod request;

pub use events::StreamEvent;
pub use message::{Conversation, Message, MessageRole};
pub use request::CompletionRequest;
