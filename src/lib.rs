//! A JSON-RPC 1.0/2.0 message engine.
//!
//! [`Codec`] decodes and encodes protocol messages in a single forward-only
//! pass, consulting a [`ContractResolver`] for the types each method's
//! parameters, result and error data decode into. Decoded requests can then
//! be bound to registered callables with [`resolve_target`]. Payloads with
//! no static contract travel as [`JsonElement`] trees.
//!
//! ```
//! use std::sync::Arc;
//! use jsonwire::{Codec, ContractRegistry, ParamType, RequestContract, ValueKind};
//!
//! let registry = Arc::new(ContractRegistry::new());
//! registry.register_request(
//!     "sum",
//!     vec![RequestContract::by_position(vec![
//!         ParamType::of(ValueKind::Int),
//!         ParamType::of(ValueKind::Int),
//!     ])],
//! );
//! let codec = Codec::new(registry);
//! let decoded = codec.decode(r#"{"jsonrpc":"2.0","id":1,"method":"sum","params":[2,4]}"#)?;
//! let _message = decoded.into_single().unwrap()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
mod codec;
mod contract;
mod dispatch;
mod element;
mod error;
mod id;
mod message;

pub use codec::*;
pub use contract::*;
pub use dispatch::*;
pub use element::*;
pub use error::*;
pub use id::*;
pub use message::*;
