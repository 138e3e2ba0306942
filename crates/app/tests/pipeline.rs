use rand::rngs::StdRng;
use rand::SeedableRng;
use saisonxform::{run, run_with, Config, FileStatus, RunError, RunOptions};
use saisonxform_archive::{has_retry_marker, GuardError, MarkerAction, RetryMarker};
use saisonxform_core::MonthKey;
use saisonxform_import::{
    read_statement, AnalyzerError, CharsetAnalyzer, CharsetGuess, RosterError, TextEncoding,
};
use std::fs;
use std::path::Path;

const PREAMBLE: &str = "\"カード名称\",\"セゾンカード\"\n\"お支払日\",\"2025/11/04\"\n\"今回ご請求額\",\"23,500\"\n\n";

const STATEMENT: &str = "利用日,ご利用店名及び商品名,利用者,本人・家族区分,利用金額,備考\n\
2025/10/01,レストランA,本人,1,\"12,000\",会議費\n\
2025/10/03,コンビニB,本人,1,500,\n\
2025/10/05,料亭C,本人,1,\"11,000\",接待費\n";

const NAMELIST: &str = "ID,Name,Title,Company\n1,山田,部長,本社\n2,佐藤,課長,本社\n3,鈴木,,取引先A\n4,田中,,取引先B\n5,高橋,,取引先C\n";

fn no_env(_: &str) -> Option<String> {
    None
}

fn month(s: &str) -> MonthKey {
    MonthKey::parse(s).unwrap()
}

fn project() -> (tempfile::TempDir, Config) {
    let root = tempfile::tempdir().unwrap();
    for dir in ["Input", "Reference", "Output"] {
        fs::create_dir(root.path().join(dir)).unwrap();
    }
    fs::write(root.path().join("Reference/NameList.csv"), NAMELIST).unwrap();
    let config = Config::load_with_env(root.path(), None, no_env).unwrap();
    (root, config)
}

fn drop_statement(config: &Config, name: &str) {
    fs::write(config.input_dir.join(name), format!("{PREAMBLE}{STATEMENT}")).unwrap();
}

fn rng() -> StdRng {
    StdRng::seed_from_u64(7)
}

fn output_names(config: &Config) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(&config.output_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Reports no usable guess, so only the fixed utf-8-sig, utf-8, cp932 chain
/// is tried.
struct NoGuess;

impl CharsetAnalyzer for NoGuess {
    fn analyze(&self, _bytes: &[u8]) -> Result<CharsetGuess, AnalyzerError> {
        Ok(CharsetGuess {
            encoding: TextEncoding::Utf8,
            confidence: 0.0,
        })
    }
}

#[test]
fn full_run_enriches_and_archives() {
    let (_root, config) = project();
    drop_statement(&config, "202510_saison.csv");

    let summary = run(&config, &RunOptions::default(), &mut rng()).unwrap();
    assert!(summary.is_success());
    assert_eq!(summary.processed(), 1);
    assert_eq!(summary.guard.fresh, vec![month("202510")]);
    assert_eq!(summary.markers, vec![(month("202510"), MarkerAction::Unchanged)]);

    let outcome = &summary.outcomes[0];
    let FileStatus::Processed { csv, html, relevant } = &outcome.status else {
        panic!("expected processed, got {:?}", outcome.status);
    };
    assert_eq!(*relevant, 2);
    assert_eq!(csv, &config.output_dir.join("202510_saison.csv"));
    let html = html.as_ref().unwrap();

    // BOM, then the banner byte for byte, then the header.
    let bytes = fs::read(csv).unwrap();
    assert!(bytes.starts_with(&[0xEF, 0xBB, 0xBF]));
    let text = String::from_utf8(bytes[3..].to_vec()).unwrap();
    assert!(text.starts_with(PREAMBLE));
    assert!(text[PREAMBLE.len()..].starts_with(
        "利用日,ご利用店名及び商品名,利用者,利用金額,備考,人数,ID1,ID2,ID3,ID4,ID5,ID6,ID7,ID8\n"
    ));

    let written = read_statement(csv).unwrap();
    assert_eq!(written.preamble.concat(), PREAMBLE);
    let rows = written.transactions();
    assert_eq!(rows.len(), 3);
    for row in [&rows[0], &rows[2]] {
        let count = row.attendee_count.unwrap();
        assert!((2..=8).contains(&count));
        assert_eq!(row.attendees.filled_count(), (count as usize).min(5));
        assert!(row.attendees.filled().any(|id| id == "1" || id == "2"));
    }
    assert_eq!(rows[1].attendee_count, None);
    assert_eq!(rows[1].attendees.filled_count(), 0);

    let report = fs::read_to_string(html).unwrap();
    assert!(report.contains("レストランA"));
    assert!(report.contains("料亭C"));
    assert!(!report.contains("コンビニB"));

    assert!(!config.input_dir.join("202510_saison.csv").exists());
    let archived = config.archive_dir.join("202510").join("202510_saison.csv");
    assert_eq!(outcome.archived_to.as_deref(), Some(archived.as_path()));
    assert!(archived.is_file());
}

#[test]
fn rerun_of_archived_month_is_rejected_until_forced() {
    let (_root, config) = project();
    drop_statement(&config, "202510_saison.csv");
    run(&config, &RunOptions::default(), &mut rng()).unwrap();

    drop_statement(&config, "202510_saison.csv");
    for _ in 0..2 {
        let err = run(&config, &RunOptions::default(), &mut rng()).unwrap_err();
        assert!(matches!(
            err,
            RunError::Guard(GuardError::AlreadyArchived(ref months)) if months == &vec![month("202510")]
        ));
    }
    assert!(config.input_dir.join("202510_saison.csv").exists());
    assert!(!config.output_dir.join("202510_saison_2.csv").exists());

    let forced = RunOptions {
        force: true,
        ..RunOptions::default()
    };
    let summary = run(&config, &forced, &mut rng()).unwrap();
    assert_eq!(summary.guard.forced, vec![month("202510")]);
    assert!(config.output_dir.join("202510_saison_2.csv").is_file());
    assert!(config.output_dir.join("202510_saison_2.html").is_file());

    let archived: Vec<_> = fs::read_dir(config.archive_dir.join("202510")).unwrap().collect();
    assert_eq!(archived.len(), 2);
}

#[test]
fn archival_failure_leaves_marker_and_recovers() {
    let (_root, config) = project();
    fs::create_dir(&config.archive_dir).unwrap();
    // A plain file where the month directory should go blocks archival.
    let blocker = config.archive_dir.join("202512");
    fs::write(&blocker, "").unwrap();
    drop_statement(&config, "202512_card.csv");

    let summary = run(&config, &RunOptions::default(), &mut rng()).unwrap();
    assert!(!summary.is_success());
    assert_eq!(summary.failed(), 1);
    assert!(matches!(summary.outcomes[0].status, FileStatus::Failed(_)));
    assert_eq!(summary.markers, vec![(month("202512"), MarkerAction::Written)]);
    assert_eq!(summary.outstanding, vec![month("202512")]);
    assert!(config.input_dir.join("202512_card.csv").exists());
    assert!(output_names(&config).is_empty());

    let marker = RetryMarker::load(&config.archive_dir, month("202512")).unwrap().unwrap();
    assert_eq!(marker.failed_files, vec!["202512_card.csv"]);
    assert_eq!(marker.errors.len(), 1);

    fs::remove_file(&blocker).unwrap();
    let summary = run(&config, &RunOptions::default(), &mut rng()).unwrap();
    assert!(summary.is_success());
    assert_eq!(summary.markers, vec![(month("202512"), MarkerAction::Deleted)]);
    assert!(summary.outstanding.is_empty());
    assert!(!has_retry_marker(&config.archive_dir, month("202512")));
    assert!(config.archive_dir.join("202512").join("202512_card.csv").is_file());
    assert_eq!(output_names(&config), vec!["202512_card.csv", "202512_card.html"]);
}

#[test]
fn undecodable_file_fails_alone_and_stays_for_retry() {
    let (_root, config) = project();
    fs::write(config.input_dir.join("202510_bad.csv"), b"\xFD\xFE\xFF\xFF\n").unwrap();
    drop_statement(&config, "202510_ok.csv");

    let summary = run_with(&NoGuess, &config, &RunOptions::default(), &mut rng()).unwrap();
    assert_eq!(summary.failed(), 1);
    assert_eq!(summary.processed(), 1);
    let FileStatus::Failed(error) = &summary.outcomes[0].status else {
        panic!("expected failure, got {:?}", summary.outcomes[0].status);
    };
    assert!(error.contains("Could not decode"));

    assert!(config.input_dir.join("202510_bad.csv").exists());
    assert!(!config.input_dir.join("202510_ok.csv").exists());
    assert!(config.archive_dir.join("202510").join("202510_ok.csv").is_file());
    assert_eq!(output_names(&config), vec!["202510_ok.csv", "202510_ok.html"]);

    let marker = RetryMarker::load(&config.archive_dir, month("202510")).unwrap().unwrap();
    assert_eq!(marker.failed_files, vec!["202510_bad.csv"]);
    assert_eq!(marker.errors, vec![error.clone()]);
    assert_eq!(summary.outstanding, vec![month("202510")]);
}

#[test]
fn retry_marker_admits_archived_month() {
    let (_root, config) = project();
    fs::create_dir_all(config.archive_dir.join("202511")).unwrap();
    RetryMarker::new(month("202511"), vec![("202511_card.csv".into(), "disk full".into())])
        .write(&config.archive_dir)
        .unwrap();
    drop_statement(&config, "202511_card.csv");

    let summary = run(&config, &RunOptions::default(), &mut rng()).unwrap();
    assert_eq!(summary.guard.retry, vec![month("202511")]);
    assert_eq!(summary.markers, vec![(month("202511"), MarkerAction::Deleted)]);
    assert!(!has_retry_marker(&config.archive_dir, month("202511")));
}

#[test]
fn files_without_relevant_rows_keep_every_row_and_get_no_report() {
    let (_root, config) = project();
    fs::write(config.input_dir.join("202510_empty.csv"), "").unwrap();
    fs::write(
        config.input_dir.join("202510_other.csv"),
        "利用日,ご利用店名及び商品名,本人・家族区分,利用金額,備考\n\
         2025-10-01,スーパーマーケット,1,3000,その他\n\
         2025-10-02,ガソリンスタンド,1,5000,交通費\n",
    )
    .unwrap();

    let summary = run(&config, &RunOptions::default(), &mut rng()).unwrap();
    assert!(summary.is_success());
    assert_eq!(summary.outcomes[0].status, FileStatus::Skipped);
    let csv = config.output_dir.join("202510_other.csv");
    assert_eq!(
        summary.outcomes[1].status,
        FileStatus::Processed {
            csv: csv.clone(),
            html: None,
            relevant: 0,
        }
    );
    assert_eq!(output_names(&config), vec!["202510_other.csv"]);

    let written = read_statement(&csv).unwrap();
    assert_eq!(
        written.table.headers,
        vec![
            "利用日", "ご利用店名及び商品名", "利用金額", "備考", "人数", "ID1", "ID2", "ID3", "ID4",
            "ID5", "ID6", "ID7", "ID8",
        ]
    );
    let rows = written.transactions();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.attendee_count.is_none() && r.attendees.filled_count() == 0));

    assert!(config.archive_dir.join("202510").join("202510_empty.csv").is_file());
    assert!(config.archive_dir.join("202510").join("202510_other.csv").is_file());
}

#[test]
fn no_archive_leaves_sources_and_markers_alone() {
    let (_root, config) = project();
    drop_statement(&config, "202510_saison.csv");
    fs::write(config.input_dir.join("unlabelled.csv"), format!("{PREAMBLE}{STATEMENT}")).unwrap();

    let options = RunOptions {
        archive: false,
        ..RunOptions::default()
    };
    let summary = run(&config, &options, &mut rng()).unwrap();
    assert_eq!(summary.processed(), 2);
    assert!(summary.markers.is_empty());
    assert!(config.input_dir.join("202510_saison.csv").exists());
    assert!(config.input_dir.join("unlabelled.csv").exists());
    assert!(!config.archive_dir.exists());
}

#[test]
fn month_selection_limits_the_batch() {
    let (_root, config) = project();
    drop_statement(&config, "202509_saison.csv");
    drop_statement(&config, "202510_saison.csv");

    let options = RunOptions {
        months: vec![month("202509")],
        ..RunOptions::default()
    };
    let summary = run(&config, &options, &mut rng()).unwrap();
    assert_eq!(summary.outcomes.len(), 1);
    assert_eq!(summary.outcomes[0].month, Some(month("202509")));
    assert!(config.input_dir.join("202510_saison.csv").exists());
}

#[test]
fn missing_namelist_aborts() {
    let (root, config) = project();
    fs::remove_file(root.path().join("Reference/NameList.csv")).unwrap();
    drop_statement(&config, "202510_saison.csv");

    let err = run(&config, &RunOptions::default(), &mut rng()).unwrap_err();
    assert!(matches!(err, RunError::Roster(RosterError::NotFound(_))));
    assert!(err.to_string().contains("NameList.csv"));
    assert!(config.input_dir.join("202510_saison.csv").exists());
}

#[test]
fn input_inside_git_repository_aborts() {
    let (root, config) = project();
    fs::create_dir(root.path().join(".git")).unwrap();

    let err = run(&config, &RunOptions::default(), &mut rng()).unwrap_err();
    assert!(matches!(err, RunError::InsideGitRepository { .. }));
    assert!(err.to_string().contains("git repository"));
}

#[test]
fn missing_output_directory_aborts() {
    let (_root, config) = project();
    fs::remove_dir(&config.output_dir).unwrap();
    let err = run(&config, &RunOptions::default(), &mut rng()).unwrap_err();
    assert!(matches!(err, RunError::Config(_)));
    assert!(!Path::new(&config.archive_dir).exists());
}
