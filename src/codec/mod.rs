//! Message codec.
//!
//! - **Decoding**: [`parse_message_string`] splits client batches without a
//!   JSON parser; [`check_json`] is the frame syntax gate
//! - **Encoding**: [`Frame`] and [`encode_batch`] produce the open, heartbeat,
//!   message-batch and close frames every transport carries
//!
//! All functions are stateless.

mod decode;
mod frame;

pub use decode::{check_json, parse_message_string};
pub use frame::{Frame, close_frame, encode_batch};
