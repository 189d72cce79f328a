//! Result store behavior across both on-disk formats.

use std::fs::{self, OpenOptions};
use std::io::Write;

use sweeplab_core::grid::TpSlPair;
use sweeplab_core::params::{CombinationKey, ParamKind, ParamValue};
use sweeplab_runner::{ResultRow, ResultStore, StoreFormat, SweepStats};

fn names() -> Vec<String> {
    vec!["ema_len".into(), "rsi_buy".into(), "flag_sma".into(), "kind".into()]
}

fn store(root: &std::path::Path, format: StoreFormat) -> ResultStore {
    ResultStore::new(root, "rsi_trend", "2024-01-01_2024-06-30", "1h", format, &names())
}

fn row(len: i64, sl: f64, tp: f64, ret: f64) -> ResultRow {
    ResultRow {
        key: CombinationKey(vec![
            ParamValue::Int(len),
            ParamValue::Float(30.5),
            ParamValue::Bool(true),
            ParamValue::Text("fast".into()),
        ]),
        pair: TpSlPair::new(sl, tp),
        stats: SweepStats {
            max_drawdown_pct: 4.25,
            profit_factor: 1.5,
            sharpe: 0.75,
            total_trades: 12,
            win_rate_pct: 58.333333333333336,
            total_return_pct: ret,
        },
    }
}

fn read_append_read(format: StoreFormat) {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path(), format);

    let mut handle = store.open("ETHUSDT").unwrap();
    assert!(handle.is_empty());
    let first = vec![row(10, 0.03, 0.05, 1.0), row(10, 0.03, 0.10, -2.5)];
    assert_eq!(handle.append(&first).unwrap(), 2);

    let handle = store.open("ETHUSDT").unwrap();
    assert_eq!(handle.len(), 2);
    let done = handle.combinations_done().unwrap();
    assert!(done.contains(&first[0].key));

    let mut handle = handle;
    let second = vec![row(10, 0.03, 0.05, 1.0), row(20, 0.03, 0.05, 3.0)];
    // The first row is already stored under the same full key.
    assert_eq!(handle.append(&second).unwrap(), 1);

    let rows = store.read_rows("ETHUSDT").unwrap();
    assert_eq!(rows, vec![first[0].clone(), first[1].clone(), second[1].clone()]);
    assert_eq!(store.symbols().unwrap(), vec!["ETHUSDT".to_string()]);
}

#[test]
fn csv_read_append_read() {
    read_append_read(StoreFormat::Csv);
}

#[test]
fn parquet_read_append_read() {
    read_append_read(StoreFormat::Parquet);
}

#[test]
fn corrupt_csv_is_quarantined_and_restarted() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path(), StoreFormat::Csv);
    let path = store.path_for("BTCUSDT");
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut text = store.columns().join(",");
    text.push_str("\n10,30.5,true,fast,0.03,0.05,oops,1,1,1,1,1\n");
    fs::write(&path, text).unwrap();

    let handle = store.open("BTCUSDT").unwrap();
    assert!(handle.is_empty());
    assert!(!path.exists());
    let moved = path.with_file_name("BTCUSDT.csv.quarantined");
    assert!(moved.exists());
}

#[test]
fn corrupt_parquet_is_quarantined_and_restarted() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path(), StoreFormat::Parquet);
    let path = store.path_for("BTCUSDT");
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, b"definitely not parquet").unwrap();

    let mut handle = store.open("BTCUSDT").unwrap();
    assert!(handle.is_empty());
    assert!(path.with_file_name("BTCUSDT.parquet.quarantined").exists());

    // Writing starts a fresh file.
    assert_eq!(handle.append(&[row(5, 0.02, 0.04, 0.5)]).unwrap(), 1);
    assert_eq!(store.read_rows("BTCUSDT").unwrap().len(), 1);
}

#[test]
fn foreign_header_is_not_quarantined() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path(), StoreFormat::Csv);
    let path = store.path_for("BTCUSDT");
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, "a,b,c\n1,2,3\n").unwrap();

    let err = store.open("BTCUSDT").unwrap_err();
    assert!(!err.is_corrupt());
    assert!(path.exists());
}

#[test]
fn torn_last_csv_record_is_cut_and_earlier_rows_survive() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path(), StoreFormat::Csv);
    let mut handle = store.open("BTCUSDT").unwrap();
    let good = vec![row(1, 0.03, 0.05, 1.0), row(2, 0.03, 0.05, 2.0)];
    assert_eq!(handle.append(&good).unwrap(), 2);
    drop(handle);

    // A kill in the middle of the next append.
    let path = store.path_for("BTCUSDT");
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(b"3,30.5,true,fast,0.03,0.0").unwrap();
    drop(file);

    let mut handle = store.open("BTCUSDT").unwrap();
    let done = handle.combinations_done().unwrap();
    assert_eq!(done.len(), 2);
    assert!(done.contains(&good[0].key) && done.contains(&good[1].key));
    assert!(!path.with_file_name("BTCUSDT.csv.quarantined").exists());
    assert!(fs::read_to_string(&path).unwrap().ends_with('\n'));

    assert_eq!(handle.append(&[row(3, 0.03, 0.05, 3.0)]).unwrap(), 1);
    let rows = store.read_rows("BTCUSDT").unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[2], row(3, 0.03, 0.05, 3.0));
}

#[test]
fn torn_csv_header_starts_the_file_over() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path(), StoreFormat::Csv);
    let path = store.path_for("BTCUSDT");
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, "rsi_trend_ema_len,rsi_tr").unwrap();

    let mut handle = store.open("BTCUSDT").unwrap();
    assert!(handle.is_empty());
    assert_eq!(handle.append(&[row(4, 0.03, 0.05, 1.0)]).unwrap(), 1);
    assert_eq!(store.read_rows("BTCUSDT").unwrap().len(), 1);
}

#[test]
fn damage_before_the_last_csv_line_is_still_quarantined() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path(), StoreFormat::Csv);
    let path = store.path_for("BTCUSDT");
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut text = store.columns().join(",");
    text.push_str("\n10,30.5,true,fast,0.03\n11,30.5,true,fast,0.03,0.05,1,1,1,1,1,1\n");
    fs::write(&path, text).unwrap();

    let handle = store.open("BTCUSDT").unwrap();
    assert!(handle.is_empty());
    assert!(path.with_file_name("BTCUSDT.csv.quarantined").exists());
}

fn text_key_store(root: &std::path::Path, format: StoreFormat) -> ResultStore {
    let names = vec!["source".to_string(), "mode".to_string()];
    ResultStore::new(root, "rsi_trend", "2024-01-01_2024-06-30", "1h", format, &names)
        .with_kinds([Some(ParamKind::Text), Some(ParamKind::Text)])
}

fn number_like_text_keys_resume(format: StoreFormat) {
    let dir = tempfile::tempdir().unwrap();
    let store = text_key_store(dir.path(), format);
    let mut stored = row(0, 0.03, 0.05, 1.0);
    stored.key = CombinationKey(vec![ParamValue::Text("5".into()), ParamValue::Text("true".into())]);

    let mut handle = store.open("ETHUSDT").unwrap();
    assert_eq!(handle.append(std::slice::from_ref(&stored)).unwrap(), 1);

    let mut handle = store.open("ETHUSDT").unwrap();
    assert!(handle.combinations_done().unwrap().contains(&stored.key));
    assert_eq!(handle.append(std::slice::from_ref(&stored)).unwrap(), 0);
    assert_eq!(store.read_rows("ETHUSDT").unwrap(), vec![stored]);
}

#[test]
fn number_like_text_keys_resume_from_csv() {
    number_like_text_keys_resume(StoreFormat::Csv);
}

#[test]
fn number_like_text_keys_resume_from_parquet() {
    number_like_text_keys_resume(StoreFormat::Parquet);
}
