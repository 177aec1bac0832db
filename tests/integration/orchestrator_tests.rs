//! Integration tests for diffing runs recorded in a store

use crate::common::{row, sample_data, TestFixture};
use chrono::{Duration, Utc};
use indexmap::IndexMap;
use rowdiff::dataset::BaselineStatus;
use rowdiff::history::ByteStream;
use rowdiff::output::{DirectorySinks, MemorySinks};
use rowdiff::store::{open_dataset_file, RunStatus};
use rowdiff::{Classification, DiffOrchestrator, DiffSettings, RunIdentity};
use std::io::Cursor;
use std::sync::Arc;

fn settings() -> DiffSettings {
    DiffSettings::from_json(&sample_data::students_config().to_string()).unwrap()
}

fn stream(text: &str) -> ByteStream {
    Box::new(Cursor::new(text.as_bytes().to_vec()))
}

#[test]
fn test_diff_against_previous_recorded_run() {
    let fixture = TestFixture::new().unwrap();
    let previous = fixture.create_csv("prev.csv", &sample_data::students_previous()).unwrap();
    let current = fixture.create_csv("cur.csv", &sample_data::students_current()).unwrap();
    let recorded = fixture
        .record_run(
            "nightly",
            "sis",
            Utc::now() - Duration::days(1),
            RunStatus::Completed,
            &[("students", &previous)],
        )
        .unwrap();

    let orchestrator = DiffOrchestrator::new(Arc::new(fixture.store.clone()), settings());
    let sinks = DirectorySinks::new(fixture.out_dir()).unwrap();
    let mut inputs = IndexMap::new();
    inputs.insert("students".to_string(), open_dataset_file(&current).unwrap());

    let report = orchestrator
        .run(&RunIdentity::new("nightly", "sis"), inputs, &sinks)
        .unwrap();

    assert_eq!(
        report.previous_run.as_ref().unwrap().run_id,
        recorded.identity.run_id
    );
    let students = report.dataset("students").unwrap();
    assert_eq!(
        students.baseline,
        BaselineStatus::Indexed {
            run_id: recorded.identity.run_id.clone(),
            rows: 3
        }
    );
    assert_eq!(students.counts.added, 1);
    assert_eq!(students.counts.modified, 1);
    assert_eq!(students.counts.unmodified, 1);
    assert_eq!(students.counts.deleted, 1);

    let header = row(&["id", "name", "grade"]);
    assert_eq!(
        fixture.read_output("students", Classification::Added),
        vec![header.clone(), row(&["4", "Dee", "B"])]
    );
    assert_eq!(
        fixture.read_output("students", Classification::Modified),
        vec![header.clone(), row(&["2", "Bob", "A"])]
    );
    assert_eq!(
        fixture.read_output("students", Classification::Unmodified),
        vec![header.clone(), row(&["1", "Ann", "A"])]
    );
    assert_eq!(
        fixture.read_output("students", Classification::Deleted),
        vec![header, row(&["3", "Cy", "C"])]
    );
}

#[test]
fn test_first_run_has_no_baseline() {
    let fixture = TestFixture::new().unwrap();
    let orchestrator = DiffOrchestrator::new(Arc::new(fixture.store.clone()), settings());
    let sinks = MemorySinks::new();
    let mut inputs = IndexMap::new();
    inputs.insert("students".to_string(), stream("id,name\n1,Ann\n2,Bob\n"));

    let report = orchestrator
        .run(&RunIdentity::new("nightly", "sis"), inputs, &sinks)
        .unwrap();

    assert!(report.previous_run.is_none());
    let students = report.dataset("students").unwrap();
    assert_eq!(students.baseline, BaselineStatus::NoPreviousRun);
    assert_eq!(students.counts.added, 2);
    assert_eq!(sinks.rows("studentsDeleted"), vec![row(&["id", "name"])]);
}

#[test]
fn test_dataset_missing_from_previous_run() {
    let fixture = TestFixture::new().unwrap();
    let recorded = fixture
        .record_run("nightly", "sis", Utc::now() - Duration::hours(1), RunStatus::Completed, &[])
        .unwrap();

    let orchestrator = DiffOrchestrator::new(Arc::new(fixture.store.clone()), settings());
    let sinks = MemorySinks::new();
    let mut inputs = IndexMap::new();
    inputs.insert("students".to_string(), stream("id,name\n1,Ann\n"));

    let report = orchestrator
        .run(&RunIdentity::new("nightly", "sis"), inputs, &sinks)
        .unwrap();

    let students = report.dataset("students").unwrap();
    assert_eq!(
        students.baseline,
        BaselineStatus::DatasetMissing {
            run_id: recorded.identity.run_id
        }
    );
    assert_eq!(students.counts.added, 1);
}

#[test]
fn test_compressed_previous_dataset() {
    let fixture = TestFixture::new().unwrap();
    let previous = fixture.create_csv("prev.csv", &sample_data::students_previous()).unwrap();
    let identity = RunIdentity::new("nightly", "sis").with_created_at(Utc::now() - Duration::hours(1));
    let mut stored = IndexMap::new();
    stored.insert("students".to_string(), previous);
    fixture
        .store
        .record_run(&identity, RunStatus::Completed, &stored, true)
        .unwrap();

    let orchestrator = DiffOrchestrator::new(Arc::new(fixture.store.clone()), settings());
    let sinks = MemorySinks::new();
    let mut inputs = IndexMap::new();
    inputs.insert(
        "students".to_string(),
        stream("id,name,grade\n1,Ann,A\n2,Bob,B\n3,Cy,C\n"),
    );

    let report = orchestrator
        .run(&RunIdentity::new("nightly", "sis"), inputs, &sinks)
        .unwrap();
    let students = report.dataset("students").unwrap();
    assert_eq!(students.counts.unmodified, 3);
    assert!(!students.counts.has_changes());
}

#[test]
fn test_multiple_datasets_processed_independently() {
    let fixture = TestFixture::new().unwrap();
    let students = fixture.create_csv("s.csv", &sample_data::students_previous()).unwrap();
    let courses = fixture
        .create_csv_raw("c.csv", "school,code,title\nN,101,Math\nN,102,Art\nS,101,Math\n")
        .unwrap();
    fixture
        .record_run(
            "nightly",
            "sis",
            Utc::now() - Duration::hours(1),
            RunStatus::Completed,
            &[("students", &students), ("courses", &courses)],
        )
        .unwrap();

    let settings = DiffSettings::from_json(
        r#"{
            "datasets": {
                "students": { "primaryKeyColumns": ["id"] },
                "courses": { "primaryKeyColumns": ["school", "code"] }
            }
        }"#,
    )
    .unwrap();
    let orchestrator = DiffOrchestrator::new(Arc::new(fixture.store.clone()), settings);
    let sinks = MemorySinks::new();
    let mut inputs = IndexMap::new();
    inputs.insert("students".to_string(), stream("id,name,grade\n1,Ann,A\n"));
    inputs.insert(
        "courses".to_string(),
        stream("school,code,title\nS,101,Math\nN,101,Algebra\n"),
    );

    let report = orchestrator
        .run(&RunIdentity::new("nightly", "sis"), inputs, &sinks)
        .unwrap();

    let names: Vec<&String> = report.datasets.keys().collect();
    assert_eq!(names, vec!["students", "courses"]);

    let courses = report.dataset("courses").unwrap();
    assert_eq!(courses.counts.unmodified, 1);
    assert_eq!(courses.counts.modified, 1);
    assert_eq!(courses.counts.deleted, 1);
    assert_eq!(
        sinks.rows("coursesDeleted"),
        vec![row(&["school", "code", "title"]), row(&["N", "102", "Art"])]
    );

    let students = report.dataset("students").unwrap();
    assert_eq!(students.counts.unmodified, 1);
    assert_eq!(students.counts.deleted, 2);
}
