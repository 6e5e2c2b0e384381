use crate::client::Client;
use crate::executor::{Cancellation, ParallelExecutor};
use crate::retry::{Attempt, BackoffRetrier, RetryPolicy};
use crate::types::{Item, TableDescriptor, WriteMode, WriteOp};
use crate::{Error, Result};

use std::sync::Arc;
use tracing::{info, warn};

/// DynamoDB accepts at most 25 entries per `BatchWriteItem`.
pub const MAX_BATCH_SIZE: usize = 25;

#[derive(Debug, Default)]
pub struct WriteReport {
    pub submitted: usize,
    pub succeeded: usize,
    pub failed: Vec<WriteOp>,
    pub attempts: u32,
}

impl WriteReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Turns leftover entries into a `ThrottleExhausted` error.
    pub fn into_result(self) -> Result<Self> {
        if self.is_complete() {
            Ok(self)
        } else {
            Err(Error::ThrottleExhausted {
                attempts: self.attempts,
                unprocessed: self.failed,
            })
        }
    }

    fn merge(mut self, other: WriteReport) -> Self {
        self.submitted += other.submitted;
        self.succeeded += other.succeeded;
        self.failed.extend(other.failed);
        self.attempts = self.attempts.max(other.attempts);
        self
    }
}

#[derive(Clone)]
pub struct BatchWriter {
    client: Arc<dyn Client>,
    policy: RetryPolicy,
    executor: ParallelExecutor,
    batch_size: usize,
    cancellation: Cancellation,
}

impl BatchWriter {
    pub fn new(client: Arc<dyn Client>, policy: RetryPolicy, executor: ParallelExecutor) -> Self {
        Self {
            client,
            policy,
            executor,
            batch_size: MAX_BATCH_SIZE,
            cancellation: Cancellation::none(),
        }
    }

    pub fn set_batch_size(self, batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.clamp(1, MAX_BATCH_SIZE),
            ..self
        }
    }

    pub fn set_executor(self, executor: ParallelExecutor) -> Self {
        Self { executor, ..self }
    }

    /// Retries give up as soon as `cancellation` fires.
    pub fn set_cancellation(self, cancellation: Cancellation) -> Self {
        Self {
            cancellation,
            ..self
        }
    }

    /// Puts or deletes `items` in `table`.
    ///
    /// Every item is checked against the table's key schema before anything is sent.
    /// Chunks are independent: one that runs out of retries lands in `failed`
    /// while the others carry on.
    pub async fn write(
        &self,
        table: &TableDescriptor,
        items: Vec<Item>,
        mode: WriteMode,
    ) -> Result<WriteReport> {
        let ops = to_ops(table, items, mode)?;
        let submitted = ops.len();

        if submitted == 0 {
            return Ok(WriteReport::default());
        }

        let chunks: Vec<Vec<WriteOp>> = ops
            .chunks(self.batch_size)
            .map(|chunk| chunk.to_vec())
            .collect();

        let client = Arc::clone(&self.client);
        let table_name = table.name().to_string();
        let policy = self.policy;
        let parent = self.cancellation.clone();

        let reports = self
            .executor
            .run(chunks, move |chunk, cancellation| {
                let client = Arc::clone(&client);
                let table_name = table_name.clone();
                let retrier =
                    BackoffRetrier::new(policy).set_cancellation(cancellation.join(&parent));

                async move { write_chunk(client, &table_name, chunk, retrier).await }
            })
            .await?;

        let report = reports
            .into_iter()
            .fold(WriteReport::default(), WriteReport::merge);

        if report.is_complete() {
            info!(
                "{mode} {} items to {} in {}",
                report.succeeded,
                table.name(),
                table.environment()
            );
        } else {
            warn!(
                "{mode} {} of {} items to {} in {}; {} exhausted retries",
                report.succeeded,
                report.submitted,
                table.name(),
                table.environment(),
                report.failed.len()
            );
        }

        Ok(report)
    }
}

async fn write_chunk(
    client: Arc<dyn Client>,
    table_name: &str,
    chunk: Vec<WriteOp>,
    retrier: BackoffRetrier,
) -> Result<WriteReport> {
    let submitted = chunk.len();

    let result = retrier
        .execute(chunk, |pending| {
            let client = Arc::clone(&client);
            async move {
                client
                    .batch_write(table_name, pending)
                    .await
                    .map(|unprocessed| Attempt { unprocessed })
            }
        })
        .await;

    match result {
        Ok(outcome) => Ok(WriteReport {
            submitted,
            succeeded: outcome.processed,
            failed: vec![],
            attempts: outcome.attempts,
        }),
        Err(Error::ThrottleExhausted {
            attempts,
            unprocessed,
        }) => Ok(WriteReport {
            submitted,
            succeeded: submitted - unprocessed.len(),
            failed: unprocessed,
            attempts,
        }),
        Err(err) => Err(err),
    }
}

fn to_ops(table: &TableDescriptor, items: Vec<Item>, mode: WriteMode) -> Result<Vec<WriteOp>> {
    items
        .into_iter()
        .map(|item| match mode {
            WriteMode::Put => table.validate(&item).map(|_| WriteOp::Put(item)),
            WriteMode::Delete => table
                .extract_key(&item)
                .map(|key| WriteOp::Delete(key.into_item())),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{MockClient, MockTable};
    use crate::types::KeySchema;
    use aws_sdk_dynamodb::types::AttributeValue;
    use tokio::sync::watch;
    use tokio::time::{sleep, Duration};

    fn item(id: usize) -> Item {
        [
            ("id".to_string(), AttributeValue::S(format!("{id:03}"))),
            ("name".to_string(), AttributeValue::S(format!("name-{id}"))),
        ]
        .into_iter()
        .collect()
    }

    fn table() -> TableDescriptor {
        TableDescriptor::new("foo", "dev", KeySchema::new("id", None))
    }

    fn setup(items: Vec<Item>) -> (MockClient, BatchWriter) {
        let client = MockClient::new();
        client.insert_table(MockTable::new(table()).with_items(items));

        let policy = RetryPolicy {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            max_attempts: 3,
        };
        let writer = BatchWriter::new(Arc::new(client.clone()), policy, ParallelExecutor::new(4));
        (client, writer)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn it_puts_items_in_chunks_of_25() {
        let (client, writer) = setup(vec![]);

        let report = writer
            .write(&table(), (0..60).map(item).collect(), WriteMode::Put)
            .await
            .unwrap();

        assert_eq!(report.submitted, 60);
        assert_eq!(report.succeeded, 60);
        assert!(report.is_complete());
        assert_eq!(client.batch_calls(), 3);
        assert_eq!(client.items("foo").len(), 60);
    }

    #[tokio::test]
    async fn it_deletes_items_by_key() {
        let (client, writer) = setup((0..5).map(item).collect());

        let report = writer
            .write(&table(), vec![item(1), item(3)], WriteMode::Delete)
            .await
            .unwrap();

        assert_eq!(report.succeeded, 2);
        let remaining: Vec<Item> = client.items("foo");
        assert_eq!(remaining, vec![item(0), item(2), item(4)]);
    }

    #[tokio::test]
    async fn it_rejects_items_without_keys_before_submitting() {
        let (client, writer) = setup(vec![]);

        let mut broken = item(1);
        broken.remove("id");

        let result = writer
            .write(&table(), vec![item(0), broken], WriteMode::Put)
            .await;

        match result {
            Err(Error::Schema(message)) => {
                assert_eq!(message, "foo: item is missing key attribute `id`");
            }
            _ => unreachable!("expected a schema error"),
        }
        assert_eq!(client.batch_calls(), 0);
    }

    #[tokio::test]
    async fn it_retries_throttled_entries() {
        let (client, writer) = setup(vec![]);
        client.throttle(10, 2);

        let report = writer
            .write(&table(), (0..20).map(item).collect(), WriteMode::Put)
            .await
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(report.succeeded, 20);
        assert_eq!(client.items("foo").len(), 20);
    }

    #[tokio::test]
    async fn it_reports_entries_that_exhausted_retries() {
        let (client, writer) = setup(vec![]);
        let writer = writer.set_executor(ParallelExecutor::new(1));
        // The first chunk keeps 5 entries unprocessed over all three attempts.
        client.throttle(5, 3);

        let report = writer
            .write(&table(), (0..30).map(item).collect(), WriteMode::Put)
            .await
            .unwrap();

        assert_eq!(report.submitted, 30);
        assert_eq!(report.succeeded + report.failed.len(), report.submitted);
        assert_eq!(report.failed.len(), 5);
        assert_eq!(client.items("foo").len(), 25);

        match report.into_result() {
            Err(Error::ThrottleExhausted { unprocessed, .. }) => {
                assert_eq!(unprocessed.len(), 5);
            }
            _ => unreachable!("expected ThrottleExhausted"),
        }
    }

    #[tokio::test]
    async fn it_writes_nothing_for_empty_input() {
        let (client, writer) = setup(vec![]);
        let report = writer.write(&table(), vec![], WriteMode::Put).await.unwrap();

        assert_eq!(report.submitted, 0);
        assert_eq!(client.batch_calls(), 0);
    }

    #[tokio::test]
    async fn it_absorbs_transient_store_errors() {
        let (client, writer) = setup(vec![]);
        client.fail_transiently(2);

        let report = writer
            .write(&table(), (0..10).map(item).collect(), WriteMode::Put)
            .await
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(report.succeeded, 10);
        assert_eq!(report.attempts, 3);
        assert_eq!(client.batch_calls(), 3);
        assert_eq!(client.items("foo").len(), 10);
    }

    #[tokio::test]
    async fn it_stops_retrying_when_cancelled_from_outside() {
        let (client, writer) = setup(vec![]);
        client.throttle(5, 100);

        let (tx, receiver) = watch::channel(false);
        let writer = writer
            .set_executor(ParallelExecutor::new(1))
            .set_cancellation(Cancellation::from(receiver));
        let writer = BatchWriter {
            policy: RetryPolicy {
                base_delay: Duration::from_secs(60),
                max_delay: Duration::from_secs(60),
                max_attempts: 5,
            },
            ..writer
        };

        let handle = tokio::spawn(async move {
            writer
                .write(&table(), (0..10).map(item).collect(), WriteMode::Put)
                .await
        });
        sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        match result {
            Err(Error::Cancelled { unprocessed }) => assert_eq!(unprocessed.len(), 5),
            _ => unreachable!("expected Cancelled"),
        }
        assert_eq!(client.batch_calls(), 1);
    }
}
