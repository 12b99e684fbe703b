//! # Batch Splitter
//!
//! Partitions a resolved audience into contiguous, order-preserving batches
//! of bounded size.

use crate::error::{FlowStartError, Result};
use crate::models::{ContactId, FlowStart, FlowStartBatch};

/// Number of batches an audience of `audience_size` splits into
pub fn batch_count(audience_size: usize, max_batch_size: usize) -> usize {
    if max_batch_size == 0 {
        return 0;
    }
    audience_size.div_ceil(max_batch_size)
}

pub fn split_into_batches(
    start: &FlowStart,
    audience: &[ContactId],
    max_batch_size: usize,
) -> Result<Vec<FlowStartBatch>> {
    if max_batch_size == 0 {
        return Err(FlowStartError::Configuration(
            "max_batch_size must be greater than zero".to_string(),
        ));
    }

    let total_contacts = audience.len() as i64;
    let count = batch_count(audience.len(), max_batch_size);

    Ok(audience
        .chunks(max_batch_size)
        .enumerate()
        .map(|(index, chunk)| {
            FlowStartBatch::for_start(
                start,
                index as u32,
                chunk.to_vec(),
                total_contacts,
                index + 1 == count,
            )
        })
        .collect())
}
