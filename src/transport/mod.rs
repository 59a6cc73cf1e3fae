//! 传输层：为 HTTP 类 Provider 适配器提供连接池化的 JSON / SSE 请求能力。
//!
//! Adapters own their wire format; this module only moves bytes and reports failures in a
//! form the error classifier understands (`Failure::Http` carries the status and the
//! response body).

mod http;

pub use http::HttpTransport;
