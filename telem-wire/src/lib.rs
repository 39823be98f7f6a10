//! telem-wire
//!
//! Capability negotiation (C1) and line-protocol framing for the telem
//! streaming core: the reduction rules of §4.1, the integer/float
//! encodings of §4.3, and the verb encoder/parser of §6.
//!
//! - `capability`: [`capability::Advertisement`] and [`capability::negotiate`],
//!   the peer-mask-or-legacy-version reduction described in §4.1.
//! - `numeric`: BASE64/HEX integer encoding and BASE64/DECIMAL float
//!   encoding, selected by whether `IEEE754` was negotiated.
//! - `verbs`: encoders for every wire verb in §6's table, and a
//!   line-oriented parser that recognizes each one on the receive side.
#![warn(missing_docs)]

/// Capability negotiation (C1).
pub mod capability;
/// Connection-establishment handshake lines.
pub mod handshake;
/// Integer/float wire encodings, selected by the `IEEE754` capability.
pub mod numeric;
/// Verb encoders and the line parser.
pub mod verbs;

pub use capability::{Advertisement, negotiate, reduce};
pub use handshake::{HandshakeResponse, encode_handshake_response, parse_handshake_response};
pub use numeric::{FloatEncoding, IntEncoding, encode_float, encode_int};
pub use verbs::{ParsedVerb, parse_line};
