/// Splits `records` into `min(parts, len)` contiguous, non-empty chunks whose
/// sizes differ by at most one. Earlier chunks take the remainder.
pub fn partition<T: Clone>(records: &[T], parts: usize) -> Vec<Vec<T>> {
    if records.is_empty() {
        return Vec::new();
    }
    let count = parts.clamp(1, records.len());
    let base = records.len() / count;
    let extra = records.len() % count;

    let mut chunks = Vec::with_capacity(count);
    let mut start = 0;
    for index in 0..count {
        let size = base + usize::from(index < extra);
        chunks.push(records[start..start + size].to_vec());
        start += size;
    }
    chunks
}
