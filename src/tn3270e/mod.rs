//! TN3270E (RFC 2355): device-type and functions negotiation, BIND image
//! decoding, and per-record header framing.

pub mod bind;
pub mod codes;
pub mod header;
pub mod session;

pub use bind::BindImage;
pub use header::{frame_record, Tn3270eHeader};
pub use session::{
    response_record, tn3270e_device_type, BidPolicy, FunctionSet, LuList, Negotiation, Submode,
    Tn3270eOptions, Tn3270eSession,
};
