use anyhow::Result;
use async_trait::async_trait;
use rust_xlsxwriter::Workbook;
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

use sales_outreach::app::dispatch_use_case::{DispatchOptions, DispatchUseCase};
use sales_outreach::app::outreach_use_case::{OutreachRequest, OutreachUseCase};
use sales_outreach::app::ports::{NotifierPort, SendReceipt};
use sales_outreach::domain::Phone;
use sales_outreach::error::{PipelineError, TransportError};
use sales_outreach::infra::write_contacts_file;
use sales_outreach::pipeline::processing::MatchMode;

fn euc_kr(text: &str) -> Vec<u8> {
    let (bytes, _, had_errors) = encoding_rs::EUC_KR.encode(text);
    assert!(!had_errors);
    bytes.into_owned()
}

const SALES: &str = "\
2024년 3월 판매내역,,
,,
농가명,상품명,회원명
햇살농장,딸기,김철수
햇살농장,딸기,김철수
햇살농장,상추,이영희
햇살농장,딸기,박민수
푸른농원,감자,김철수
";

const DIRECTORY: &str = "\
회원 명부,
회원명,핸드폰
김철수,01011112222
이영희,010-2222-3333
이영희,010-9999-8888
";

#[test]
fn test_legacy_encoded_files_join_by_name() -> Result<()> {
    let dir = tempdir()?;
    let sales_path = dir.path().join("sales.csv");
    let directory_path = dir.path().join("members.csv");
    std::fs::write(&sales_path, euc_kr(SALES))?;
    std::fs::write(&directory_path, euc_kr(DIRECTORY))?;

    let sales = std::fs::read(&sales_path)?;
    let directory = std::fs::read(&directory_path)?;

    let mut use_case = OutreachUseCase::default();
    let report = use_case.run(&sales, Some(&directory), &OutreachRequest::new("햇살농장"))?;

    assert_eq!(report.match_mode, Some(MatchMode::ByName));
    let join = report.join_report.clone().unwrap();
    assert_eq!(join.matched, 2);
    assert_eq!(join.unmatched, 1);
    assert_eq!(join.name_collisions, 1);

    let rows: Vec<(&str, &str, u32)> = report
        .contacts
        .iter()
        .map(|c| (c.display_name.as_str(), c.phone.as_str(), c.count))
        .collect();
    assert_eq!(
        rows,
        vec![
            ("김철수", "010-1111-2222", 2),
            ("이영희", "010-2222-3333", 1),
            ("박민수", "-", 1),
        ]
    );
    assert_eq!(report.top_items[0], ("딸기".to_string(), 3));
    Ok(())
}

#[test]
fn test_strict_never_grows_the_list() -> Result<()> {
    let sales = euc_kr(SALES);
    let directory = euc_kr(DIRECTORY);
    let mut use_case = OutreachUseCase::default();

    let loose = use_case.run(&sales, Some(&directory), &OutreachRequest::new("햇살농장"))?;
    let mut strict_request = OutreachRequest::new("햇살농장");
    strict_request.curation.strict = true;
    let strict = use_case.run(&sales, Some(&directory), &strict_request)?;

    assert!(strict.contacts.len() < loose.contacts.len());
    assert!(strict.contacts.iter().all(|c| !c.phone.is_sentinel()));
    assert_eq!(use_case.cache().misses(), 2);
    Ok(())
}

#[test]
fn test_sales_phones_used_without_directory() -> Result<()> {
    let sales = "농가명,회원명,연락처\nFarmA,Kim,010 1111 2222\nFarmA,Kim,\nFarmA,Lee,\n";
    let report = OutreachUseCase::default().run(sales.as_bytes(), None, &OutreachRequest::new("FarmA"))?;

    assert!(report.join_report.is_none());
    assert_eq!(report.contacts[0].phone, Phone::Canonical("010-1111-2222".into()));
    assert_eq!(report.contacts[0].count, 2);
    assert!(report.contacts[1].phone.is_sentinel());
    Ok(())
}

fn sales_workbook() -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(0, 0, "판매내역")?;
    for (col, label) in ["농가명", "상품명", "회원번호", "회원명"].iter().enumerate() {
        sheet.write_string(1, col as u16, *label)?;
    }
    let rows = [("사과", 1.0, "Kim"), ("배", 1.0, "Kim"), ("사과", 2.0, "Park")];
    for (i, (item, id, name)) in rows.iter().enumerate() {
        let row = i as u32 + 2;
        sheet.write_string(row, 0, "FarmA")?;
        sheet.write_string(row, 1, *item)?;
        sheet.write_number(row, 2, *id)?;
        sheet.write_string(row, 3, *name)?;
    }
    Ok(workbook.save_to_buffer()?)
}

fn directory_workbook() -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (col, label) in ["회원번호", "회원명", "핸드폰"].iter().enumerate() {
        sheet.write_string(0, col as u16, *label)?;
    }
    sheet.write_number(1, 0, 1.0)?;
    sheet.write_string(1, 1, "Kim")?;
    // Spreadsheet tools store a phone typed without dashes as a number.
    sheet.write_number(1, 2, 1011112222.0)?;
    sheet.write_number(2, 0, 2.0)?;
    sheet.write_string(2, 1, "Park")?;
    sheet.write_string(2, 2, "0101234567")?;
    Ok(workbook.save_to_buffer()?)
}

#[test]
fn test_xlsx_exports_join_by_numeric_id() -> Result<()> {
    let mut request = OutreachRequest::new("FarmA");
    request.match_mode = Some(MatchMode::ById);
    request.curation.strict = true;

    let report = OutreachUseCase::default().run(
        &sales_workbook()?,
        Some(&directory_workbook()?),
        &request,
    )?;

    assert!(report.sales_header_detected);
    assert_eq!(report.directory_header_detected, Some(true));
    assert_eq!(report.match_mode, Some(MatchMode::ById));
    let rows: Vec<(&str, &str, u32)> = report
        .contacts
        .iter()
        .map(|c| (c.display_name.as_str(), c.phone.as_str(), c.count))
        .collect();
    assert_eq!(
        rows,
        vec![("Kim", "010-1111-2222", 2), ("Park", "010-123-4567", 1)]
    );
    Ok(())
}

#[test]
fn test_unreadable_bytes_report_every_strategy() {
    let garbage = [0x80u8, 0x81, 0xFF, 0xFF, 0x00, 0x80];
    let err = OutreachUseCase::default()
        .run(&garbage, None, &OutreachRequest::new("FarmA"))
        .unwrap_err();
    match err {
        PipelineError::UnreadableFile { attempts } => assert_eq!(attempts.len(), 4),
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_contacts_export_to_csv() -> Result<()> {
    let dir = tempdir()?;
    let report = OutreachUseCase::default().run(
        &euc_kr(SALES),
        Some(&euc_kr(DIRECTORY)),
        &OutreachRequest::new("햇살농장"),
    )?;
    let path = dir.path().join("contacts.csv");
    write_contacts_file(&path, &report.contacts)?;

    let written = std::fs::read_to_string(&path)?;
    let lines: Vec<&str> = written.trim_start_matches('\u{feff}').lines().collect();
    assert_eq!(lines[0], "name,phone,count");
    assert_eq!(lines[1], "김철수,010-1111-2222,2");
    assert_eq!(lines.len(), 4);
    Ok(())
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl NotifierPort for RecordingNotifier {
    async fn send(&self, to: &str, text: &str) -> std::result::Result<SendReceipt, TransportError> {
        self.sent.lock().unwrap().push((to.to_string(), text.to_string()));
        Ok(SendReceipt::default())
    }
}

#[tokio::test]
async fn test_outreach_list_dispatches_to_verified_phones() -> Result<()> {
    let report = OutreachUseCase::default().run(
        &euc_kr(SALES),
        Some(&euc_kr(DIRECTORY)),
        &OutreachRequest::new("햇살농장"),
    )?;

    let notifier = Arc::new(RecordingNotifier::default());
    let dispatcher = DispatchUseCase::new(notifier.clone(), DispatchOptions::default());
    let result = dispatcher
        .dispatch(&report.contacts, &report.farmer, "{name}님 {farmer} {count}회")
        .await;

    assert_eq!(result.sent, 2);
    assert_eq!(result.skipped, 1);
    let mut sent = notifier.sent.lock().unwrap().clone();
    sent.sort();
    assert_eq!(
        sent[0],
        ("010-1111-2222".to_string(), "김철수님 햇살농장 2회".to_string())
    );
    Ok(())
}
