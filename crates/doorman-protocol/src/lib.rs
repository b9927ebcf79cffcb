//! Wire formats spoken between scanners, display units and the server.
//!
//! - [`payload`] - ingress payload grammar (`<credential>[;mac=..][;dir=..]`)
//! - [`codec`] - tokio-util codec framing payloads and acknowledgments
//! - [`display`] - feedback text rendered on the display units

pub mod codec;
pub mod display;
pub mod payload;

pub use codec::{IngressCodec, IngressReply};
pub use display::DisplayMessages;
pub use payload::{IngressFrame, ScanPayload};
