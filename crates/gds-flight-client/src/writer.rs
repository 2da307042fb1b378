//! Upload entity batches over a single Flight stream.
//!
//! Every batch is written with a bounded retry budget: transient transport
//! failures (unavailable, timed out, internal) are retried after a short
//! sleep, anything else aborts the upload immediately.

use std::time::Duration;

use arrow_array::RecordBatch;

use gds_flight_core::TransportError;

use crate::error::{ClientError, Result};
use crate::mapper::Mapper;
use crate::transport::{bounded, BatchSink, FlightTransport, PutDescriptor};

/// Retry budget for individual batch writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per batch, including the first.
    pub max_attempts: u32,
    /// Sleep before a retry is `base_delay / attempts_remaining`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Sleep before the next attempt when `remaining` attempts are left.
    pub fn delay_for(&self, remaining: u32) -> Duration {
        self.base_delay / remaining.max(1)
    }
}

/// Outcome of a completed upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    /// Rows in the input.
    pub rows: usize,
    /// Bytes in the input, as reported by the batches' memory size.
    pub bytes: usize,
    /// Transient failures absorbed by retries.
    pub retries: u32,
}

/// Entities to upload: one table sliced by the client, or caller-made batches.
#[derive(Debug, Clone)]
pub enum Entities {
    Table(RecordBatch),
    Batches(Vec<RecordBatch>),
}

impl From<RecordBatch> for Entities {
    fn from(table: RecordBatch) -> Self {
        Self::Table(table)
    }
}

impl From<Vec<RecordBatch>> for Entities {
    fn from(batches: Vec<RecordBatch>) -> Self {
        Self::Batches(batches)
    }
}

pub struct BatchWriter<'a> {
    transport: &'a dyn FlightTransport,
    policy: &'a RetryPolicy,
    timeout: Option<Duration>,
}

impl<'a> BatchWriter<'a> {
    pub fn new(
        transport: &'a dyn FlightTransport,
        policy: &'a RetryPolicy,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            transport,
            policy,
            timeout,
        }
    }

    /// Upload `entities`. A table is mapped once and sliced into batches of
    /// at most `max_chunk_size` rows; a batch list is mapped batch by batch.
    pub async fn write_entities(
        &self,
        descriptor: &PutDescriptor,
        entities: Entities,
        mapper: &Mapper<'_>,
        max_chunk_size: usize,
    ) -> Result<WriteSummary> {
        match entities {
            Entities::Batches(batches) => self.write_batches(descriptor, &batches, mapper).await,
            Entities::Table(table) => {
                if table.num_rows() == 0 {
                    return Err(ClientError::EmptyInput);
                }
                let mapped = mapper.apply(&table)?;
                let slices = slice_batch(&mapped, max_chunk_size);
                let summary = self
                    .write_batches(descriptor, &slices, &Mapper::Identity)
                    .await?;
                Ok(WriteSummary {
                    rows: table.num_rows(),
                    bytes: table.get_array_memory_size(),
                    retries: summary.retries,
                })
            }
        }
    }

    /// Upload pre-made batches over one stream, opened with the schema of
    /// the first mapped batch.
    pub async fn write_batches(
        &self,
        descriptor: &PutDescriptor,
        batches: &[RecordBatch],
        mapper: &Mapper<'_>,
    ) -> Result<WriteSummary> {
        let Some(first) = batches.first() else {
            return Err(ClientError::EmptyInput);
        };
        let first_mapped = mapper.apply(first)?;
        let schema = first_mapped.schema();
        let mut pending = Some(first_mapped);

        let body = serde_json::to_value(descriptor)?;
        let mut sink = bounded(self.timeout, "upload open", self.transport.do_put(&body, schema))
            .await?;

        let mut summary = WriteSummary::default();
        for batch in batches {
            let mapped = match pending.take() {
                Some(mapped) => mapped,
                None => mapper.apply(batch)?,
            };
            summary.retries +=
                write_with_retries(sink.as_mut(), &mapped, self.policy, self.timeout).await?;
            summary.rows += batch.num_rows();
            summary.bytes += batch.get_array_memory_size();
        }

        bounded(self.timeout, "upload close", sink.close()).await?;
        tracing::debug!(
            name = %descriptor.name,
            entity_type = %descriptor.entity_type,
            batches = batches.len(),
            rows = summary.rows,
            "Upload stream closed"
        );
        Ok(summary)
    }
}

/// Write one batch, retrying transient failures until the budget is spent.
/// Returns the number of retries used.
pub async fn write_with_retries(
    sink: &mut (dyn BatchSink + '_),
    batch: &RecordBatch,
    policy: &RetryPolicy,
    timeout: Option<Duration>,
) -> std::result::Result<u32, TransportError> {
    let mut remaining = policy.max_attempts.max(1);
    let mut retries = 0;
    loop {
        match bounded(timeout, "batch write", sink.write_batch(batch)).await {
            Ok(()) => return Ok(retries),
            Err(e) if e.is_transient() && remaining > 1 => {
                let delay = policy.delay_for(remaining);
                remaining -= 1;
                retries += 1;
                tracing::warn!(
                    error = %e,
                    attempts_left = remaining,
                    delay_ms = delay.as_millis() as u64,
                    "Transient error writing batch, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Zero-copy slices of at most `max_rows` rows. An empty batch yields none.
pub fn slice_batch(batch: &RecordBatch, max_rows: usize) -> Vec<RecordBatch> {
    let max_rows = max_rows.max(1);
    let total = batch.num_rows();
    (0..total)
        .step_by(max_rows)
        .map(|offset| batch.slice(offset, max_rows.min(total - offset)))
        .collect()
}
