//! kvault core -- wire codec, clock abstraction, typed value, and the
//! Fernet-equivalent authenticated encryption primitives shared by the
//! server crate.
//!
//! - **Clock** ([`clock`]): `Clock` trait, `SystemClock`, `ManualClock`
//! - **Value** ([`value`]): tagged-variant `Value` used for record payloads
//!   and `extras`
//! - **Codec** ([`codec`]): length-prefixed MessagePack framing and the
//!   `RpcRequest`/`RpcResponse` wire types
//! - **Crypto** ([`crypto`]): AES-CBC + HMAC-SHA256 authenticated encryption

pub mod clock;
pub mod codec;
pub mod crypto;
pub mod error;
pub mod value;

pub use clock::{Clock, ManualClock, SystemClock, DEFAULT_TTL_SECS};
pub use codec::{read_frame, read_raw_frame, write_frame, write_raw_frame, RpcRequest, RpcResponse, MAX_FRAME_BYTES};
pub use crypto::{decrypt, encrypt, FernetKey};
pub use error::{CodecError, CryptoError};
pub use value::Value;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        let _ = SystemClock;
        let _ = Value::Null;
    }
}
