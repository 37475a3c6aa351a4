//! Protocol module - frame layout and incoming byte accumulation.
//!
//! - [`FrameKind`] / [`Selector`] and the frame builders describe what goes
//!   on the wire in each direction
//! - [`IncomingBuffer`] turns fragmented transport reads into decodable
//!   byte runs

mod frame;
mod incoming;

pub use frame::{build_event, build_fault, build_request, build_response, FrameKind, Selector};
pub use incoming::IncomingBuffer;
