use std::sync::Arc;

use async_trait::async_trait;
use dental_xlsx::{
    engine::{StatsEngine, SyncOutcome},
    error::{Absence, DentalXlsxError, NO_WORKBOOK_MESSAGE},
    stats::{DailyRecord, Parameter, TOTAL_SHEET},
    storage::{
        Contributor, FsObjectStore, MemoryObjectStore, ObjectStore, StaticDirectory, StorageError,
    },
    workbook::{Workbook, cell::CellValue, col_to_letters},
};

const FEB_KEY: &str = "monthly/dental_statistics_2024-02.xlsx";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn directory() -> StaticDirectory {
    StaticDirectory::new(vec![
        Contributor::new("u-alice", "Alice"),
        Contributor::new("u-bob", "Bob"),
    ])
}

fn memory_engine() -> StatsEngine<Arc<MemoryObjectStore>, StaticDirectory> {
    init_tracing();
    StatsEngine::builder(Arc::new(MemoryObjectStore::new("excel-reports")), directory())
        .build()
        .unwrap()
}

fn feb_5() -> DailyRecord {
    DailyRecord::parse_date("2024-02-05")
        .unwrap()
        .with(Parameter::Extractions, 3.0)
        .with(Parameter::Others, 1.0)
}

async fn stored(engine: &StatsEngine<Arc<MemoryObjectStore>, StaticDirectory>) -> Workbook {
    engine.monthly_workbook(2024, 2).await.unwrap()
}

#[tokio::test]
async fn alice_then_bob_roll_up_into_total() {
    let engine = memory_engine();

    engine
        .generate_monthly_excel(2024, 2, "u-alice", "Alice", &feb_5())
        .await
        .unwrap();
    let wb = stored(&engine).await;
    let alice = wb.get_sheet("Alice").unwrap();
    // Column F is day 5; row 4 Extractions, row 16 Others.
    assert_eq!(col_to_letters(6), "F");
    assert_eq!(alice.number_at(4, 6), Some(3.0));
    assert_eq!(alice.number_at(16, 6), Some(1.0));
    assert_eq!(wb.get_sheet(TOTAL_SHEET).unwrap().number_at(4, 6), Some(3.0));

    engine
        .generate_monthly_excel(2024, 2, "u-bob", "Bob", &feb_5())
        .await
        .unwrap();
    let wb = stored(&engine).await;
    let total = wb.get_sheet(TOTAL_SHEET).unwrap();
    assert_eq!(total.number_at(4, 6), Some(6.0));
    assert_eq!(total.number_at(16, 6), Some(2.0));
    assert_eq!(
        total.get(4, 31),
        Some(&CellValue::formula("SUM(B4:AD4)", Some(6.0)))
    );
    assert_eq!(wb.sheet_names(), ["Alice", "Total", "Bob"]);
    assert_eq!(engine.store().keys(), [FEB_KEY.to_string()]);
}

#[tokio::test]
async fn resubmitting_the_same_record_is_idempotent() {
    let engine = memory_engine();
    engine
        .generate_monthly_excel(2024, 2, "u-alice", "Alice", &feb_5())
        .await
        .unwrap();
    let first = stored(&engine).await;

    engine
        .generate_monthly_excel(2024, 2, "u-alice", "Alice", &feb_5())
        .await
        .unwrap();
    assert_eq!(stored(&engine).await, first);
}

#[tokio::test]
async fn partial_resubmission_zeroes_omitted_fields() {
    let engine = memory_engine();
    engine
        .generate_monthly_excel(2024, 2, "u-alice", "Alice", &feb_5())
        .await
        .unwrap();

    let amended = DailyRecord::from_json_str(r#"{"date":"2024-02-05","others":4}"#).unwrap();
    engine
        .generate_monthly_excel(2024, 2, "u-alice", "Alice", &amended)
        .await
        .unwrap();

    let wb = stored(&engine).await;
    assert_eq!(wb.get_sheet("Alice").unwrap().number_at(4, 6), Some(0.0));
    assert_eq!(wb.get_sheet(TOTAL_SHEET).unwrap().number_at(4, 6), Some(0.0));
    assert_eq!(wb.get_sheet(TOTAL_SHEET).unwrap().number_at(16, 6), Some(4.0));
}

#[tokio::test]
async fn leap_february_has_twenty_nine_day_columns() {
    let engine = memory_engine();
    let record = DailyRecord::parse_date("2024-02-29")
        .unwrap()
        .with(Parameter::InwardPatients, 2.0);
    engine
        .generate_monthly_excel(2024, 2, "u-alice", "Alice", &record)
        .await
        .unwrap();

    let wb = stored(&engine).await;
    let total = wb.get_sheet(TOTAL_SHEET).unwrap();
    assert_eq!(total.number_at(3, 30), Some(29.0));
    assert_eq!(total.get(3, 31), Some(&CellValue::text("Total")));
    assert_eq!(total.number_at(21, 30), Some(2.0));
    assert_eq!(total.merges(), ["A1:AE1".to_string()]);
}

async fn two_contributors_named(first: &str, second: &str) -> Workbook {
    let engine = memory_engine();
    let record = |n| DailyRecord::parse_date("2024-02-05").unwrap().with(Parameter::Extractions, n);
    engine
        .generate_monthly_excel(2024, 2, "u-1", first, &record(3.0))
        .await
        .unwrap();
    engine
        .generate_monthly_excel(2024, 2, "u-2", second, &record(5.0))
        .await
        .unwrap();
    stored(&engine).await
}

#[tokio::test]
async fn colliding_display_names_never_share_a_sheet() {
    for (first, second, expected) in [
        ("Alice", "alice", ["Alice", "Total", "alice (2)"]),
        (
            "Dr. Alexandra Catherine Smithson",
            "Dr. Alexandra Catherine Smithsonia",
            ["Dr. Alexandra Catherine Smithso", "Total", "Dr. Alexandra Catherine Smi (2)"],
        ),
        ("A/B", "A?B", ["A_B", "Total", "A_B (2)"]),
    ] {
        let wb = two_contributors_named(first, second).await;
        assert_eq!(wb.sheet_names(), expected, "{first} / {second}");
        assert_eq!(wb.get_sheet(expected[0]).unwrap().number_at(4, 6), Some(3.0));
        assert_eq!(wb.get_sheet(expected[2]).unwrap().number_at(4, 6), Some(5.0));
        assert_eq!(
            wb.get_sheet(TOTAL_SHEET).unwrap().number_at(4, 6),
            Some(8.0),
            "{first} / {second}"
        );
    }
}

#[tokio::test]
async fn sheet_ownership_survives_reloads() {
    let engine = memory_engine();
    let record = feb_5();
    for (id, name) in [("u-1", "Alice"), ("u-2", "alice"), ("u-2", "alice"), ("u-1", "Alice")] {
        engine
            .generate_monthly_excel(2024, 2, id, name, &record)
            .await
            .unwrap();
    }
    let wb = stored(&engine).await;
    assert_eq!(wb.sheet_owned_by("u-1"), Some("Alice"));
    assert_eq!(wb.sheet_owned_by("u-2"), Some("alice (2)"));
    assert_eq!(wb.len(), 3);
    assert_eq!(wb.get_sheet(TOTAL_SHEET).unwrap().number_at(4, 6), Some(6.0));
}

#[tokio::test]
async fn download_of_an_empty_month_is_no_workbook() {
    let engine = memory_engine();
    let err = engine.download_monthly_excel(2024, 3).await.unwrap_err();
    assert!(matches!(
        err,
        DentalXlsxError::NoWorkbook {
            absence: Absence::ObjectMissing,
            ..
        }
    ));
    assert_eq!(err.user_message(), NO_WORKBOOK_MESSAGE);
}

#[tokio::test]
async fn unprovisioned_bucket_is_no_workbook_too() {
    init_tracing();
    let engine = StatsEngine::builder(MemoryObjectStore::unprovisioned("excel-reports"), directory())
        .build()
        .unwrap();
    let err = engine.download_monthly_excel(2024, 2).await.unwrap_err();
    assert!(matches!(
        err,
        DentalXlsxError::NoWorkbook {
            absence: Absence::BucketMissing,
            ..
        }
    ));
    assert_eq!(err.user_message(), NO_WORKBOOK_MESSAGE);
}

/// Storage that fails every call, like a dropped connection.
struct BrokenStore;

#[async_trait]
impl ObjectStore for BrokenStore {
    async fn fetch(&self, _key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Err(StorageError::Transport("connection reset".into()))
    }

    async fn store(
        &self,
        _key: &str,
        _bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), StorageError> {
        Err(StorageError::Transport("connection reset".into()))
    }
}

#[tokio::test]
async fn transport_failures_are_distinct_but_read_the_same_to_users() {
    init_tracing();
    let engine = StatsEngine::builder(BrokenStore, directory()).build().unwrap();

    let err = engine.download_monthly_excel(2024, 2).await.unwrap_err();
    assert!(matches!(err, DentalXlsxError::Storage(_)));
    assert!(!err.is_no_workbook());
    assert_eq!(err.user_message(), NO_WORKBOOK_MESSAGE);

    let outcome = engine
        .sync_after_submission(2024, 2, "u-alice", "Alice", &feb_5())
        .await;
    assert!(matches!(outcome, SyncOutcome::Failed(DentalXlsxError::Storage(_))));
}

#[tokio::test]
async fn invalid_submissions_write_nothing() {
    let engine = memory_engine();

    let march = DailyRecord::parse_date("2024-03-05").unwrap();
    assert!(matches!(
        engine
            .generate_monthly_excel(2024, 2, "u-alice", "Alice", &march)
            .await,
        Err(DentalXlsxError::DateOutsideMonth { .. })
    ));
    assert!(matches!(
        engine
            .generate_monthly_excel(2024, 2, "u-x", "Total", &feb_5())
            .await,
        Err(DentalXlsxError::ReservedSheetName(_))
    ));
    assert!(matches!(
        engine
            .generate_monthly_excel(2024, 13, "u-alice", "Alice", &feb_5())
            .await,
        Err(DentalXlsxError::InvalidMonth(13))
    ));
    assert!(engine.store().keys().is_empty());
}

#[tokio::test]
async fn concurrent_submissions_for_one_month_all_land() {
    let engine = Arc::new(memory_engine());
    let names = ["Alice", "Bob", "Carol", "Dave", "Erin", "Frank", "Grace", "Heidi"];

    let tasks: Vec<_> = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let engine = Arc::clone(&engine);
            let name = name.to_string();
            tokio::spawn(async move {
                let record = DailyRecord::parse_date("2024-02-10")
                    .unwrap()
                    .with(Parameter::Scaling, (i + 1) as f64);
                engine
                    .generate_monthly_excel(2024, 2, &format!("u-{i}"), &name, &record)
                    .await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let wb = engine.monthly_workbook(2024, 2).await.unwrap();
    assert_eq!(wb.len(), names.len() + 1);
    // 1 + 2 + ... + 8
    assert_eq!(
        wb.get_sheet(TOTAL_SHEET).unwrap().number_at(Parameter::Scaling.row(), 11),
        Some(36.0)
    );
}

#[tokio::test]
async fn filesystem_bucket_end_to_end() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let engine = StatsEngine::builder(FsObjectStore::new(dir.path()), directory())
        .title_suffix("Clinic Statistics")
        .build()
        .unwrap();

    engine
        .generate_monthly_excel(2023, 2, "u-alice", "Alice", &{
            DailyRecord::parse_date("2023-02-28")
                .unwrap()
                .with(Parameter::Composite, 5.0)
        })
        .await
        .unwrap();

    assert!(dir.path().join("monthly/dental_statistics_2023-02.xlsx").is_file());
    let wb = engine.monthly_workbook(2023, 2).await.unwrap();
    let total = wb.get_sheet(TOTAL_SHEET).unwrap();
    assert_eq!(
        total.get(1, 1),
        Some(&CellValue::text("February 2023 Clinic Statistics"))
    );
    assert_eq!(total.get(3, 30), Some(&CellValue::text("Total")));
    assert_eq!(total.number_at(Parameter::Composite.row(), 29), Some(5.0));
    assert_eq!(
        engine.download_file_name(2023, 2).unwrap(),
        "dental_statistics_2023-02.xlsx"
    );
}
