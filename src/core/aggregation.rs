use crate::domain::model::{AllocatedLine, Artifact};
use crate::domain::ports::Storage;
use crate::utils::error::{ReconError, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::io::Write;
use zip::write::{FileOptions, ZipWriter};

/// 未歸屬群組的保留檔名
pub const UNATTRIBUTED_REPORT: &str = "participant__unattributed.csv";
pub const ARCHIVE_NAME: &str = "reports.zip";

#[derive(Debug, Clone, Default)]
pub struct ReportOptions {
    /// 只影響輸出格式，不改動分攤金額
    pub decimal_places: Option<u32>,
    pub archive: bool,
}

#[derive(Debug, Serialize)]
struct ReportRow<'a> {
    participant: &'a str,
    split_amount: String,
    amount: f64,
    currency: &'a str,
    vendor_name: &'a str,
    date: Option<String>,
    event_id: &'a str,
    source_file: &'a str,
    record_kind: &'static str,
    matched_event_id: Option<&'a str>,
    matched_vendor_name: Option<&'a str>,
    matched_amount: Option<f64>,
    matched_date: Option<String>,
    match_score: f64,
}

/// 依參與者分組並輸出每組一份報表
pub struct ReportAggregator<S: Storage> {
    storage: S,
    options: ReportOptions,
}

impl<S: Storage> ReportAggregator<S> {
    pub fn new(storage: S, options: ReportOptions) -> Self {
        Self { storage, options }
    }

    pub async fn aggregate(&self, lines: &[AllocatedLine]) -> Result<Vec<Artifact>> {
        let groups = group_by_participant(lines);
        // 保留檔名只給未歸屬群組
        let mut used_names = HashSet::from([UNATTRIBUTED_REPORT.to_string()]);
        let mut artifacts = Vec::with_capacity(groups.len());
        let mut written = Vec::with_capacity(groups.len());

        for (participant, members) in groups {
            let file_name = unique_report_name(participant.as_deref(), &mut used_names);
            let data = self.render(&members)?;

            self.storage.write_file(&file_name, &data).await?;
            let location = self.storage.location(&file_name);
            tracing::info!(
                stage = "report",
                participant = participant.as_deref().unwrap_or("<unattributed>"),
                lines = members.len(),
                "📄 Generated report: {}",
                location
            );

            artifacts.push(Artifact {
                participant,
                location,
                line_count: members.len(),
            });
            written.push((file_name, data));
        }

        if self.options.archive && !written.is_empty() {
            let zip_data = build_archive(&written)?;
            self.storage.write_file(ARCHIVE_NAME, &zip_data).await?;
            tracing::info!(
                stage = "report",
                "📦 Bundled {} reports into {}",
                written.len(),
                self.storage.location(ARCHIVE_NAME)
            );
        }

        Ok(artifacts)
    }

    fn render(&self, lines: &[&AllocatedLine]) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());

        for line in lines {
            let expense = &line.source.expense;
            let matched = line.source.matched_transaction.as_ref();
            let split_amount = match self.options.decimal_places {
                Some(places) => format!("{:.*}", places as usize, line.split_amount),
                None => line.split_amount.to_string(),
            };

            writer.serialize(ReportRow {
                participant: line.participant.as_deref().unwrap_or(""),
                split_amount,
                amount: expense.amount(),
                currency: expense.currency().unwrap_or(""),
                vendor_name: expense.vendor_name().unwrap_or(""),
                date: expense.date().map(|d| d.format("%Y-%m-%d").to_string()),
                event_id: expense.event_id().unwrap_or(""),
                source_file: expense.source_file().unwrap_or(""),
                record_kind: expense.kind(),
                matched_event_id: matched.map(|t| t.event_id.as_str()),
                matched_vendor_name: matched.map(|t| t.vendor_name.as_str()),
                matched_amount: matched.map(|t| t.amount),
                matched_date: matched
                    .and_then(|t| t.date)
                    .map(|d| d.format("%Y-%m-%d").to_string()),
                match_score: line.source.match_score,
            })?;
        }

        writer.into_inner().map_err(|e| ReconError::ProcessingError {
            message: format!("Failed to flush report: {}", e),
        })
    }
}

/// 依首次出現順序分組，None 也是一組
fn group_by_participant(lines: &[AllocatedLine]) -> Vec<(Option<String>, Vec<&AllocatedLine>)> {
    let mut groups: Vec<(Option<String>, Vec<&AllocatedLine>)> = Vec::new();

    for line in lines {
        match groups.iter_mut().find(|(p, _)| *p == line.participant) {
            Some((_, members)) => members.push(line),
            None => groups.push((line.participant.clone(), vec![line])),
        }
    }

    groups
}

fn unique_report_name(participant: Option<&str>, used: &mut HashSet<String>) -> String {
    let Some(name) = participant else {
        return UNATTRIBUTED_REPORT.to_string();
    };
    let base = format!("participant_{}", sanitize(name));

    let mut candidate = format!("{}.csv", base);
    let mut n = 2;
    while !used.insert(candidate.clone()) {
        candidate = format!("{}-{}.csv", base, n);
        n += 1;
    }
    candidate
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

fn build_archive(files: &[(String, Vec<u8>)]) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));

    for (name, data) in files {
        zip.start_file::<_, ()>(name.as_str(), FileOptions::default())?;
        zip.write_all(data)?;
    }

    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{ExpenseRecord, ExtractedExpense, Match};
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[derive(Clone)]
    struct MockStorage {
        files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    }

    impl MockStorage {
        fn new() -> Self {
            Self {
                files: Arc::new(Mutex::new(HashMap::new())),
            }
        }

        async fn get_file(&self, path: &str) -> Option<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned()
        }
    }

    impl Storage for MockStorage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned().ok_or_else(|| {
                ReconError::IoError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path),
                ))
            })
        }

        async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
            let mut files = self.files.lock().await;
            files.insert(path.to_string(), data.to_vec());
            Ok(())
        }

        fn location(&self, path: &str) -> String {
            format!("reports/{}", path)
        }
    }

    fn line(participant: Option<&str>, split_amount: f64, source_file: &str) -> AllocatedLine {
        AllocatedLine {
            participant: participant.map(str::to_string),
            split_amount,
            source: Match::unmatched(ExpenseRecord::Extracted(ExtractedExpense {
                amount: 30.0,
                date: None,
                vendor_name: Some("Acme".to_string()),
                currency: Some("USD".to_string()),
                event_id: None,
                participant: None,
                source_file: source_file.to_string(),
            })),
        }
    }

    async fn read_rows(storage: &MockStorage, name: &str) -> Vec<csv::StringRecord> {
        let data = storage.get_file(name).await.unwrap();
        let mut reader = csv::Reader::from_reader(data.as_slice());
        reader.records().map(|r| r.unwrap()).collect()
    }

    #[tokio::test]
    async fn test_groups_partition_lines_in_first_appearance_order() {
        let storage = MockStorage::new();
        let aggregator = ReportAggregator::new(storage.clone(), ReportOptions::default());
        let lines = vec![
            line(Some("Bo"), 15.0, "a.png"),
            line(None, 30.0, "b.png"),
            line(Some("Al"), 15.0, "a.png"),
            line(Some("Bo"), 10.0, "c.png"),
        ];

        let artifacts = aggregator.aggregate(&lines).await.unwrap();

        let participants: Vec<Option<&str>> =
            artifacts.iter().map(|a| a.participant.as_deref()).collect();
        assert_eq!(participants, vec![Some("Bo"), None, Some("Al")]);
        assert_eq!(
            artifacts.iter().map(|a| a.line_count).sum::<usize>(),
            lines.len()
        );
        assert_eq!(artifacts[0].location, "reports/participant_Bo.csv");
        assert_eq!(artifacts[1].location, format!("reports/{}", UNATTRIBUTED_REPORT));

        let bo_rows = read_rows(&storage, "participant_Bo.csv").await;
        assert_eq!(bo_rows.len(), 2);
        assert!(bo_rows.iter().all(|r| &r[0] == "Bo"));

        let unattributed = read_rows(&storage, UNATTRIBUTED_REPORT).await;
        assert_eq!(unattributed.len(), 1);
        assert_eq!(&unattributed[0][0], "");
        assert_eq!(&unattributed[0][1], "30");
    }

    #[tokio::test]
    async fn test_report_header_and_rounding() {
        let storage = MockStorage::new();
        let options = ReportOptions {
            decimal_places: Some(2),
            archive: false,
        };
        let aggregator = ReportAggregator::new(storage.clone(), options);

        aggregator
            .aggregate(&[line(Some("Al"), 10.0 / 3.0, "a.png")])
            .await
            .unwrap();

        let data = storage.get_file("participant_Al.csv").await.unwrap();
        let mut reader = csv::Reader::from_reader(data.as_slice());
        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[0], "participant");
        assert_eq!(&headers[1], "split_amount");
        assert_eq!(&headers[13], "match_score");

        let row = reader.records().next().unwrap().unwrap();
        assert_eq!(&row[1], "3.33");
        assert_eq!(&row[7], "a.png");
        assert_eq!(&row[8], "extracted");
    }

    #[tokio::test]
    async fn test_colliding_names_do_not_overwrite() {
        let storage = MockStorage::new();
        let aggregator = ReportAggregator::new(storage.clone(), ReportOptions::default());

        let artifacts = aggregator
            .aggregate(&[line(Some("a/b"), 1.0, "x.png"), line(Some("a_b"), 2.0, "y.png")])
            .await
            .unwrap();

        assert_eq!(artifacts[0].location, "reports/participant_a_b.csv");
        assert_eq!(artifacts[1].location, "reports/participant_a_b-2.csv");
        assert!(storage.get_file("participant_a_b-2.csv").await.is_some());
    }

    #[tokio::test]
    async fn test_unattributed_name_stays_reserved() {
        let storage = MockStorage::new();
        let aggregator = ReportAggregator::new(storage.clone(), ReportOptions::default());
        let lines = vec![
            line(Some("_unattributed"), 15.0, "a.png"),
            line(None, 30.0, "b.png"),
        ];

        let artifacts = aggregator.aggregate(&lines).await.unwrap();

        assert_eq!(artifacts[0].participant.as_deref(), Some("_unattributed"));
        assert_eq!(
            artifacts[0].location,
            "reports/participant__unattributed-2.csv"
        );
        assert_eq!(artifacts[1].participant, None);
        assert_eq!(artifacts[1].location, format!("reports/{}", UNATTRIBUTED_REPORT));

        let unattributed = read_rows(&storage, UNATTRIBUTED_REPORT).await;
        assert_eq!(unattributed.len(), 1);
        assert_eq!(&unattributed[0][0], "");
    }

    #[tokio::test]
    async fn test_archive_bundles_every_report() {
        let storage = MockStorage::new();
        let options = ReportOptions {
            decimal_places: None,
            archive: true,
        };
        let aggregator = ReportAggregator::new(storage.clone(), options);

        aggregator
            .aggregate(&[line(Some("Al"), 1.0, "x.png"), line(None, 2.0, "y.png")])
            .await
            .unwrap();

        let zip_bytes = storage.get_file(ARCHIVE_NAME).await.unwrap();
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(zip_bytes)).unwrap();
        let mut names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["participant_Al.csv", "participant__unattributed.csv"]);
    }

    #[tokio::test]
    async fn test_no_lines_no_artifacts() {
        let storage = MockStorage::new();
        let aggregator = ReportAggregator::new(storage.clone(), ReportOptions::default());

        let artifacts = aggregator.aggregate(&[]).await.unwrap();

        assert!(artifacts.is_empty());
        assert!(storage.get_file(ARCHIVE_NAME).await.is_none());
    }
}
