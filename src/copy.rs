use crate::client::Client;
use crate::config::Config;
use crate::executor::ParallelExecutor;
use crate::retry::RetryPolicy;
use crate::source::ItemSource;
use crate::types::{QueryRequest, ScanRequest, Segment, TableDescriptor, WriteMode};
use crate::writer::BatchWriter;
use crate::{Error, Result};

use std::fmt;
use std::sync::Arc;
use tracing::{error, info};

/// Where a copy workflow currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    BackupRequested,
    TargetTruncating,
    Copying,
    QueryingSource,
    QueryingTarget,
    DeletingTargetMatches,
    WritingSourceItems,
    DroppingBackupTable,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Moves items of one table between two environments.
///
/// A workflow runs its stages in order and stops at the first failing one. Items
/// written before the failure stay where they are.
pub struct CopyOrchestrator {
    source: Arc<dyn Client>,
    target: Arc<dyn Client>,
    workers: usize,
    batch_size: usize,
    page_limit: i32,
    retry: RetryPolicy,
    stage: Stage,
}

impl CopyOrchestrator {
    pub fn new(config: &Config, source: Arc<dyn Client>, target: Arc<dyn Client>) -> Self {
        Self {
            source,
            target,
            workers: config.workers(),
            batch_size: config.batch_size(),
            page_limit: config.page_limit(),
            retry: config.retry(),
            stage: Stage::Idle,
        }
    }

    pub fn state(&self) -> Stage {
        self.stage
    }

    /// Replaces every item of the target table with the source table's items.
    ///
    /// The target is backed up as `<table>-backup` before it is truncated.
    pub async fn copy_table(&mut self, source_table: &str, target_table: &str) -> Result<()> {
        let result = self.run_copy_table(source_table, target_table).await;
        self.finish(result)
    }

    async fn run_copy_table(&mut self, source_table: &str, target_table: &str) -> Result<()> {
        let (source, target) = self.resolve(source_table, target_table).await?;

        self.transition(Stage::BackupRequested);
        let backup_name = format!("{}-backup", target.name());
        let arn = self.target.create_backup(target.name(), &backup_name).await?;
        info!("Created backup {backup_name} ({arn})");

        self.transition(Stage::TargetTruncating);
        self.truncate(&target).await?;

        self.transition(Stage::Copying);
        let copied = self
            .transfer(Arc::clone(&self.source), &source, &target, None, WriteMode::Put)
            .await?;
        info!(
            "Copied {copied} items from {} in {} to {} in {}",
            source.name(),
            source.environment(),
            target.name(),
            target.environment()
        );

        Ok(())
    }

    /// Replaces the target items matching `request` with the matching source items.
    ///
    /// Target items outside the key condition are left alone.
    pub async fn copy_items(&mut self, request: QueryRequest, target_table: &str) -> Result<()> {
        let result = self.run_copy_items(request, target_table).await;
        self.finish(result)
    }

    async fn run_copy_items(&mut self, request: QueryRequest, target_table: &str) -> Result<()> {
        let (source, target) = self.resolve(&request.table_name, target_table).await?;
        let request = request.set_limit(self.page_limit);
        let index_name = request.index_name.as_deref();

        self.transition(Stage::QueryingSource);
        let items = ItemSource::query(
            Arc::clone(&self.source),
            request.clone(),
            source.schema_for(index_name)?.clone(),
        )
        .read_all()
        .await?;

        // Nothing in the target is touched until every source item fits its keys.
        for item in &items {
            target.validate(item)?;
        }

        self.transition(Stage::QueryingTarget);
        let matches = ItemSource::query(
            Arc::clone(&self.target),
            request.for_table(target.name()),
            target.schema_for(index_name)?.clone(),
        )
        .read_all()
        .await?;

        let writer = self.writer(Arc::clone(&self.target), self.workers);

        self.transition(Stage::DeletingTargetMatches);
        writer
            .write(&target, matches, WriteMode::Delete)
            .await?
            .into_result()?;

        self.transition(Stage::WritingSourceItems);
        writer
            .write(&target, items, WriteMode::Put)
            .await?
            .into_result()?;

        Ok(())
    }

    /// Refills `table_name` from the backup table, then drops the backup table.
    ///
    /// The backup table is read and dropped through the source client.
    pub async fn restore(&mut self, table_name: &str, backup_table: &str) -> Result<()> {
        let result = self.run_restore(table_name, backup_table).await;
        self.finish(result)
    }

    async fn run_restore(&mut self, table_name: &str, backup_table: &str) -> Result<()> {
        let (backup, target) = self.resolve(backup_table, table_name).await?;

        self.transition(Stage::TargetTruncating);
        self.truncate(&target).await?;

        self.transition(Stage::Copying);
        let copied = self
            .transfer(Arc::clone(&self.source), &backup, &target, None, WriteMode::Put)
            .await?;
        info!("Restored {copied} items from {}", backup.name());

        self.transition(Stage::DroppingBackupTable);
        self.source.delete_table(backup.name()).await?;
        info!("Deleted table {}", backup.name());

        Ok(())
    }

    async fn resolve(
        &self,
        source_table: &str,
        target_table: &str,
    ) -> Result<(TableDescriptor, TableDescriptor)> {
        let source = self.source.describe_table(source_table).await?;
        let target = self.target.describe_table(target_table).await?;

        if source.is_related(&target) {
            Ok((source, target))
        } else {
            Err(Error::TableMismatch {
                source_table: source.name().to_string(),
                target_table: target.name().to_string(),
            })
        }
    }

    async fn truncate(&self, target: &TableDescriptor) -> Result<usize> {
        let projection = target.key_schema().attribute_names();
        let deleted = self
            .transfer(
                Arc::clone(&self.target),
                target,
                target,
                Some(projection),
                WriteMode::Delete,
            )
            .await?;

        info!(
            "Deleted {deleted} items from {} in {}",
            target.name(),
            target.environment()
        );
        Ok(deleted)
    }

    /// Scans `from` in one segment per worker and writes every page to `to` as it arrives.
    async fn transfer(
        &self,
        client: Arc<dyn Client>,
        from: &TableDescriptor,
        to: &TableDescriptor,
        projection: Option<Vec<String>>,
        mode: WriteMode,
    ) -> Result<usize> {
        // One sequential writer per segment.
        let writer = self.writer(Arc::clone(&self.target), 1);
        let scan_table = from.name().to_string();
        let to = to.clone();

        let counts = ParallelExecutor::new(self.workers)
            .run(Segment::all(self.workers), move |segment, cancellation| {
                let client = Arc::clone(&client);
                let writer = writer.clone().set_cancellation(cancellation.clone());
                let to = to.clone();

                let mut request = ScanRequest::new(scan_table.as_str()).set_segment(segment);
                if let Some(names) = projection.clone() {
                    request = request.set_projection(names);
                }

                async move {
                    let mut source = ItemSource::scan(client, request);
                    let mut written = 0;

                    while let Some(page) = source.next_page().await? {
                        if cancellation.is_cancelled() {
                            info!("Segment {segment} stops after {written} items.");
                            break;
                        }

                        let report = writer.write(&to, page, mode).await?.into_result()?;
                        written += report.succeeded;
                    }

                    Ok::<usize, Error>(written)
                }
            })
            .await?;

        Ok(counts.into_iter().sum())
    }

    fn writer(&self, client: Arc<dyn Client>, workers: usize) -> BatchWriter {
        BatchWriter::new(client, self.retry, ParallelExecutor::new(workers))
            .set_batch_size(self.batch_size)
    }

    fn transition(&mut self, stage: Stage) {
        info!("{} -> {}", self.stage, stage);
        self.stage = stage;
    }

    fn finish(&mut self, result: Result<()>) -> Result<()> {
        match result {
            Ok(()) => {
                self.transition(Stage::Done);
                Ok(())
            }
            Err(err) => {
                let err = match self.stage {
                    Stage::Idle => err,
                    stage => err.at(stage),
                };
                error!("{err}");
                self.transition(Stage::Failed);
                Err(err)
            }
        }
    }
}
