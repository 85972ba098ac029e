//! Key and value encodings.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{Result, StoreError};
use crate::options::{KeyEncoding, ValueEncoding};

pub(crate) fn encode_key(key: &str, encoding: KeyEncoding) -> Result<Vec<u8>> {
    match encoding {
        KeyEncoding::Utf8 => Ok(key.as_bytes().to_vec()),
        KeyEncoding::Hex => {
            hex::decode(key).map_err(|e| StoreError::Encode(format!("hex key {:?}: {}", key, e)))
        }
        KeyEncoding::Base64 => STANDARD
            .decode(key)
            .map_err(|e| StoreError::Encode(format!("base64 key {:?}: {}", key, e))),
    }
}

pub(crate) fn decode_key(bytes: &[u8], encoding: KeyEncoding) -> Result<String> {
    match encoding {
        KeyEncoding::Utf8 => String::from_utf8(bytes.to_vec())
            .map_err(|e| StoreError::Decode(format!("utf8 key: {}", e))),
        KeyEncoding::Hex => Ok(hex::encode(bytes)),
        KeyEncoding::Base64 => Ok(STANDARD.encode(bytes)),
    }
}

pub(crate) fn encode_value<T: Serialize>(value: &T, encoding: ValueEncoding) -> Result<Vec<u8>> {
    match encoding {
        ValueEncoding::Json => {
            serde_json::to_vec(value).map_err(|e| StoreError::Encode(e.to_string()))
        }
        ValueEncoding::Bitcode => {
            bitcode::serialize(value).map_err(|e| StoreError::Encode(e.to_string()))
        }
    }
}

pub(crate) fn decode_value<T: DeserializeOwned>(bytes: &[u8], encoding: ValueEncoding) -> Result<T> {
    match encoding {
        ValueEncoding::Json => {
            serde_json::from_slice(bytes).map_err(|e| StoreError::Decode(e.to_string()))
        }
        ValueEncoding::Bitcode => {
            bitcode::deserialize(bytes).map_err(|e| StoreError::Decode(e.to_string()))
        }
    }
}
