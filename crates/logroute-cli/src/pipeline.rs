//! Batch pipeline: read a log table, route every row, write the labeled table.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use futures::stream::{self, StreamExt};
use logroute_ai::Router;
use logroute_core::{Label, LogRecord};
use logroute_store::{DEFAULT_OUTPUT, LogTable, StoreError};
use tracing::info;

/// Records classified concurrently when no limit is given.
pub const DEFAULT_CONCURRENCY: usize = 8;

#[derive(Debug)]
pub struct ClassifyStats {
    pub total_rows: usize,
    pub output: PathBuf,
    pub label_counts: Vec<(Label, usize)>,
    pub elapsed_secs: f64,
}

/// Route every record; `labels[i]` belongs to `records[i]`.
///
/// Up to `concurrency` records are in flight at once, but results are
/// yielded in input order.
pub async fn classify_batch(
    router: &Router,
    records: &[LogRecord],
    concurrency: usize,
) -> Vec<Label> {
    // Futures are built up front (they are lazy) rather than in a `map`
    // closure, which trips rustc's higher-ranked `Send` inference in axum
    // handlers (rust-lang/rust#102211).
    let pending: Vec<_> = records
        .iter()
        .map(|r| router.route(&r.source, &r.message))
        .collect();
    stream::iter(pending)
        .buffered(concurrency.max(1))
        .collect()
        .await
}

/// Validate `table`, classify its rows, and return it with a `target_label`
/// column together with the labels in row order.
///
/// Missing required columns fail before any row is routed.
pub async fn classify_table(
    router: &Router,
    table: &LogTable,
    concurrency: usize,
) -> Result<(LogTable, Vec<Label>), StoreError> {
    let records = table.records()?;
    let labels = classify_batch(router, &records, concurrency).await;
    let labeled = table.with_labels(&labels)?;
    Ok((labeled, labels))
}

/// Classify a CSV file, writing the result to `output` or [`DEFAULT_OUTPUT`].
pub async fn classify_csv(
    router: &Router,
    input: &Path,
    output: Option<&Path>,
    concurrency: usize,
) -> anyhow::Result<ClassifyStats> {
    let start = Instant::now();

    let table = LogTable::read_csv(input)
        .with_context(|| format!("reading {}", input.display()))?;
    let (labeled, labels) = classify_table(router, &table, concurrency).await?;
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));
    labeled
        .write_csv(&output)
        .with_context(|| format!("writing {}", output.display()))?;

    let stats = ClassifyStats {
        total_rows: table.num_rows(),
        label_counts: label_counts(&labels),
        output,
        elapsed_secs: start.elapsed().as_secs_f64(),
    };
    info!(
        rows = stats.total_rows,
        output = %stats.output.display(),
        elapsed_secs = stats.elapsed_secs,
        "classified log table"
    );
    Ok(stats)
}

/// Occurrences of each label, in vocabulary order, omitting zeros.
pub fn label_counts(labels: &[Label]) -> Vec<(Label, usize)> {
    Label::ALL
        .iter()
        .map(|&label| (label, labels.iter().filter(|&&l| l == label).count()))
        .filter(|&(_, n)| n > 0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{legacy_router, pattern_router};

    fn record(source: &str, message: &str) -> LogRecord {
        LogRecord::new(source, message)
    }

    #[tokio::test]
    async fn batch_preserves_input_order() {
        let router = legacy_router();
        let records = vec![
            record("LegacyCRM", "Case escalation for ticket 1 failed"),
            record("ModernCRM", "User User1 logged in."),
            record("LegacyCRM", "The 'BulkEmailSender' feature is no longer supported"),
            record("ModernHR", "no rule for this one"),
            record("LegacyCRM", "Case escalation for ticket 1 failed"),
            record("BillingSystem", "Backup completed successfully."),
        ];

        let labels = classify_batch(&router, &records, 4).await;
        assert_eq!(
            labels,
            vec![
                Label::WorkflowError,
                Label::UserAction,
                Label::DeprecationWarning,
                Label::Unclassified,
                Label::WorkflowError,
                Label::SystemNotification,
            ]
        );
    }

    #[tokio::test]
    async fn concurrency_does_not_change_labels() {
        let router = legacy_router();
        let records: Vec<LogRecord> = (0..20)
            .map(|i| {
                if i % 3 == 0 {
                    record("LegacyCRM", &format!("Workflow step {i} failed"))
                } else {
                    record("ModernCRM", &format!("User User{i} logged out."))
                }
            })
            .collect();

        let serial = classify_batch(&router, &records, 1).await;
        let parallel = classify_batch(&router, &records, 8).await;
        assert_eq!(serial, parallel);
        assert_eq!(serial.len(), 20);
    }

    #[tokio::test]
    async fn empty_batch_is_empty() {
        assert!(classify_batch(&pattern_router(), &[], 8).await.is_empty());
    }

    #[tokio::test]
    async fn zero_concurrency_still_progresses() {
        let labels = classify_batch(
            &pattern_router(),
            &[record("ModernCRM", "Disk cleanup completed")],
            0,
        )
        .await;
        assert_eq!(labels, vec![Label::SystemNotification]);
    }

    #[tokio::test]
    async fn classifies_csv_to_explicit_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("logs.csv");
        std::fs::write(
            &input,
            "source,log_message\n\
             ModernCRM,User User123 logged in.\n\
             BillingSystem,Backup completed successfully.\n\
             ModernHR,GET /api 200\n",
        )
        .unwrap();
        let output = dir.path().join("out").join("labeled.csv");

        let stats = classify_csv(&pattern_router(), &input, Some(&output), 8)
            .await
            .unwrap();
        assert_eq!(stats.total_rows, 3);
        assert_eq!(stats.output, output);
        assert_eq!(
            stats.label_counts,
            vec![
                (Label::UserAction, 1),
                (Label::SystemNotification, 1),
                (Label::Unclassified, 1),
            ]
        );

        let text = std::fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "source,log_message,target_label");
        assert_eq!(lines[1], "ModernCRM,User User123 logged in.,User Action");
        assert_eq!(lines[3], "ModernHR,GET /api 200,Unclassified");
    }

    #[tokio::test]
    async fn missing_column_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("logs.csv");
        std::fs::write(&input, "source,message\nModernCRM,User User1 logged in.\n").unwrap();
        let output = dir.path().join("labeled.csv");

        let err = classify_csv(&pattern_router(), &input, Some(&output), 8)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::MissingColumns { .. })
        ));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn classify_table_rejects_before_routing() {
        let table = LogTable::read_csv_from(std::io::Cursor::new("log_message\nhello\n")).unwrap();
        assert!(matches!(
            classify_table(&pattern_router(), &table, 8).await,
            Err(StoreError::MissingColumns { .. })
        ));
    }

    #[tokio::test]
    async fn classify_table_labels_match_column() {
        let table = LogTable::read_csv_from(std::io::Cursor::new(
            "source,log_message\nModernCRM,User User1 logged in.\nModernHR,nothing\n",
        ))
        .unwrap();
        let (labeled, labels) = classify_table(&pattern_router(), &table, 2).await.unwrap();
        assert_eq!(labels, vec![Label::UserAction, Label::Unclassified]);
        let text = String::from_utf8(labeled.to_csv_bytes().unwrap()).unwrap();
        assert_eq!(text.lines().last(), Some("ModernHR,nothing,Unclassified"));
    }

    #[test]
    fn counts_in_vocabulary_order() {
        let counts = label_counts(&[
            Label::Unclassified,
            Label::HttpStatus,
            Label::Unclassified,
        ]);
        assert_eq!(
            counts,
            vec![(Label::HttpStatus, 1), (Label::Unclassified, 2)]
        );
    }
}
