// Bincode 2 helpers shared by blocks, transactions and the wallet file
use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};

/// Encode with the bincode standard configuration
pub fn serialize<T: Serialize + bincode::Encode>(data: &T) -> Result<Vec<u8>> {
    bincode::encode_to_vec(data, bincode::config::standard())
        .map_err(|e| LedgerError::Serialization(format!("Serialization failed: {e}")))
}

/// Decode a value that must span the whole buffer.
///
/// Trailing bytes are rejected: a stored record with garbage appended is not
/// the record that was written.
pub fn deserialize<T>(bytes: &[u8]) -> Result<T>
where
    T: for<'de> Deserialize<'de> + bincode::Decode<()>,
{
    let (data, read) = bincode::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| LedgerError::Serialization(format!("Deserialization failed: {e}")))?;
    if read != bytes.len() {
        return Err(LedgerError::Serialization(format!(
            "Deserialization left {} trailing bytes",
            bytes.len() - read
        )));
    }
    Ok(data)
}
