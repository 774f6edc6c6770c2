use crate::ChunkingError;

/// Splits `data` into ordered slices of at most `chunk_size` bytes.
///
/// Every slice but the last is exactly `chunk_size` long; the last one holds
/// the remainder. Empty input yields no chunks.
pub fn split(data: &[u8], chunk_size: i64) -> Result<Vec<&[u8]>, ChunkingError> {
    if chunk_size <= 0 {
        return Err(ChunkingError { chunk_size });
    }
    let size = usize::try_from(chunk_size).unwrap_or(usize::MAX);
    Ok(data.chunks(size).collect())
}
