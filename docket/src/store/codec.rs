use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::collection::Document;
use crate::common::{RECORD_FORMAT_VERSION, RECORD_MAGIC};
use crate::errors::{DocketError, DocketResult, ErrorKind};

const HEADER_LEN: usize = RECORD_MAGIC.len() + 2;

/// Metadata record of a database.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DatabaseMeta {
    pub name: String,
    pub config: BTreeMap<String, String>,
    /// Live collections in creation order.
    pub collections: Vec<String>,
    pub deleted: bool,
}

/// Metadata record of a collection.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CollectionMeta {
    pub name: String,
    pub index_keys: Vec<String>,
    pub last_index: u64,
    pub current_batch: Option<String>,
    pub deleted: bool,
}

/// All documents of one batch.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BatchRecord {
    pub batch_id: String,
    pub documents: Vec<Document>,
}

/// Encodes a record as `magic | version (u16 LE) | bincode payload`.
pub fn encode<T: Serialize>(record: &T) -> DocketResult<Vec<u8>> {
    let payload = bincode::serde::encode_to_vec(record, bincode::config::standard())?;
    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(&RECORD_MAGIC);
    bytes.extend_from_slice(&RECORD_FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> DocketResult<T> {
    if bytes.len() < HEADER_LEN || bytes[..RECORD_MAGIC.len()] != RECORD_MAGIC {
        return Err(DocketError::new(
            "Record does not start with the expected magic bytes",
            ErrorKind::DecodeFailure,
        ));
    }

    let version = u16::from_le_bytes([bytes[RECORD_MAGIC.len()], bytes[RECORD_MAGIC.len() + 1]]);
    if version != RECORD_FORMAT_VERSION {
        return Err(DocketError::new(
            &format!(
                "Unsupported record format version {}, expected {}",
                version, RECORD_FORMAT_VERSION
            ),
            ErrorKind::DecodeFailure,
        ));
    }

    let (record, _) = bincode::serde::decode_from_slice(&bytes[HEADER_LEN..], bincode::config::standard())?;
    Ok(record)
}
