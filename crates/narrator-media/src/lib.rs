//! Media handling: decoding photo submissions and re-encoding them for storage.

pub mod codec;

pub use codec::{DecodedImage, decode_data_uri, to_data_uri};
