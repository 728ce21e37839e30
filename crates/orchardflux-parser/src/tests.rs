use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};

use chrono::NaiveDate;

use crate::errors::{SampleError, SourceError};
use crate::model::{FieldType, FieldValue, RawRow, SampleSpec};
use crate::sources::{
    parse_delimited, sniff_delimiter, split_payload, DelimitedFileSource, RowSource, WebSource,
    WebSourceOptions,
};
use crate::build_sample;

fn fixture_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/data")
}

fn names(fields: &[&str]) -> Vec<String> {
    fields.iter().map(|f| f.to_string()).collect()
}

fn sap_fields() -> Vec<String> {
    names(&["Date and Time", "Field", "Sensor ID", "Value 1", "Value 2"])
}

fn sap_spec() -> SampleSpec {
    SampleSpec::new(
        names(&["Value 1", "Value 2"]),
        vec![FieldType::Integer, FieldType::Integer],
    )
}

fn row(pairs: &[(&str, &str)]) -> RawRow {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn builds_sample_from_well_formed_row() {
    let raw = row(&[
        ("Date and Time", "2022-04-30 23:46:18"),
        ("Value 1", "1084"),
        ("Value 2", "2569"),
    ]);
    let sample = build_sample(&raw, &sap_spec()).expect("row should build");

    let expected = NaiveDate::from_ymd_opt(2022, 4, 30)
        .unwrap()
        .and_hms_opt(23, 46, 18)
        .unwrap();
    assert_eq!(sample.timestamp(), expected);
    assert_eq!(sample.important_fields(), &["Value 1", "Value 2"]);
    assert_eq!(sample.get("Value 1"), Some(&FieldValue::Integer(1084)));
    assert_eq!(sample.get("Value 2"), Some(&FieldValue::Integer(2569)));
}

#[test]
fn sample_keeps_only_important_fields() {
    let raw = row(&[
        ("time", "2022-04-30 23:46:18"),
        ("wanted 1", "13.5"),
        ("unwanted/bad", "abcdef"),
    ]);
    let spec = SampleSpec::new(names(&["wanted 1"]), vec![FieldType::Float])
        .with_timestamp("time", "%Y-%m-%d %H:%M:%S");
    let sample = build_sample(&raw, &spec).unwrap();

    assert_eq!(sample.important_fields(), &["wanted 1"]);
    assert_eq!(sample.get("wanted 1"), Some(&FieldValue::Float(13.5)));
    assert!(sample.get("unwanted/bad").is_none());
}

#[test]
fn missing_timestamp_field_is_reported_first() {
    let raw = row(&[("Value 1", "1084")]);
    let err = build_sample(&raw, &sap_spec()).unwrap_err();
    assert_eq!(
        err,
        SampleError::MissingTimestampField {
            field: "Date and Time".to_string()
        }
    );
}

#[test]
fn missing_field_names_every_absent_field() {
    let raw = row(&[
        ("Date and Time", "2022-04-30 23:46:18"),
        ("Value 1", "1084"),
    ]);
    let err = build_sample(&raw, &sap_spec()).unwrap_err();
    assert_eq!(
        err,
        SampleError::MissingFields {
            fields: vec!["Value 2".to_string()]
        }
    );

    let raw = row(&[("Date and Time", "2022-04-30 23:46:18")]);
    match build_sample(&raw, &sap_spec()).unwrap_err() {
        SampleError::MissingFields { fields } => assert_eq!(fields, ["Value 1", "Value 2"]),
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn field_type_count_mismatch_precedes_timestamp_parsing() {
    let raw = row(&[
        ("Date and Time", "not a timestamp"),
        ("Value 1", "1084"),
        ("Value 2", "2569"),
    ]);
    let spec = SampleSpec::new(names(&["Value 1", "Value 2"]), vec![FieldType::Integer]);
    let err = build_sample(&raw, &spec).unwrap_err();
    assert_eq!(
        err,
        SampleError::FieldTypeCountMismatch {
            fields: 2,
            types: 1
        }
    );
}

#[test]
fn bad_timestamp_format_is_rejected() {
    let raw = row(&[
        ("Date and Time", "23:46:18 2022-04-30"),
        ("Value 1", "1084"),
        ("Value 2", "2569"),
    ]);
    let err = build_sample(&raw, &sap_spec()).unwrap_err();
    assert!(matches!(err, SampleError::TimestampFormat { ref value, .. } if value == "23:46:18 2022-04-30"));
}

#[test]
fn integer_cast_rejects_fractional_text() {
    let raw = row(&[
        ("Date and Time", "2022-04-30 23:46:18"),
        ("Value 1", "1084"),
        ("Value 2", "2569.0"),
    ]);
    let err = build_sample(&raw, &sap_spec()).unwrap_err();
    assert_eq!(
        err,
        SampleError::TypeCast {
            field: "Value 2".to_string(),
            value: "2569.0".to_string(),
            expected: FieldType::Integer,
        }
    );
}

#[test]
fn sniffs_comma_and_semicolon_dialects() {
    assert_eq!(sniff_delimiter("a,b,c\n1,2,3\n"), Some(b','));
    assert_eq!(sniff_delimiter("a;b;c\n1;2,5;3\n"), Some(b';'));
    assert_eq!(sniff_delimiter("a\tb\n1\t2\n"), Some(b'\t'));
    assert_eq!(sniff_delimiter("\"x,y\";b\n\"1,2\";3\n"), Some(b';'));
    assert_eq!(sniff_delimiter("a,b,c\n1,2\n"), Some(b','));
    assert_eq!(sniff_delimiter("single\ncolumn\n"), None);
}

#[test]
fn delimited_source_skips_header_row() {
    let source = DelimitedFileSource::new(fixture_dir());
    let rows = source
        .rows("Data_TREWid6_22_04_almond.csv", &sap_fields())
        .expect("fixture should parse");

    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["Date and Time"], "2022-04-30 23:46:18");
    assert_eq!(rows[0]["Sensor ID"], "TREW 6");
    assert_eq!(rows[2]["Value 1"], "1071");
    assert!(rows.iter().all(|r| r.values().all(|v| v != "Value 1")));
}

#[test]
fn delimited_source_detects_semicolon_files() {
    let fields = names(&[
        "Date and Time",
        "Field",
        "Temperature [℃]",
        "Humidity [RH%]",
        "Pressure [hPa]",
        "Altitude [m]",
        "VOC [kΩ]",
    ]);
    let source = DelimitedFileSource::new(fixture_dir());
    let rows = source
        .rows("Data_weather_22_05_almond.csv", &fields)
        .expect("semicolon fixture should parse");

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1]["Humidity [RH%]"], "74.10");
    assert_eq!(rows[0]["VOC [kΩ]"], "44.59");
}

#[test]
fn short_records_surface_as_missing_fields() {
    let source = DelimitedFileSource::new(fixture_dir());
    let rows = source
        .rows("Data_TREWid6_22_05_almond.csv", &sap_fields())
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert!(!rows[0].contains_key("Value 2"));

    let err = build_sample(&rows[0], &sap_spec()).unwrap_err();
    assert!(matches!(err, SampleError::MissingFields { .. }));
}

#[test]
fn missing_file_is_a_fetch_error() {
    let source = DelimitedFileSource::new(fixture_dir());
    let err = source
        .rows("Data_TREWid9_99_01_almond.csv", &sap_fields())
        .unwrap_err();
    assert!(err.is_fetch());
    assert!(matches!(err, SourceError::Fetch { ref location, .. } if location == "Data_TREWid9_99_01_almond.csv"));
}

#[test]
fn empty_content_yields_no_rows() {
    let rows = parse_delimited("empty.csv", "  \n", &sap_fields()).unwrap();
    assert!(rows.is_empty());
}

#[test]
fn web_payload_splits_samples_and_fields() {
    let fields = names(&["an int", "a float", "a str"]);
    let rows = split_payload(
        "trew/?id=1&m=4&y=2022",
        b"20,2.0,zoinks;10,1.0,wowza;",
        &fields,
        &WebSourceOptions::default(),
    )
    .unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["an int"], "20");
    assert_eq!(rows[1]["a str"], "wowza");
}

#[test]
fn web_payload_field_count_must_match() {
    let fields = names(&["an int", "a float"]);
    let err = split_payload(
        "lux/?id=1&m=4&y=2022",
        b"10,1.0,wowza;20,2.0,zoinks;",
        &fields,
        &WebSourceOptions::default(),
    )
    .unwrap_err();

    match err {
        SourceError::FieldCountMismatch {
            expected, found, ..
        } => {
            assert_eq!(expected, 2);
            assert_eq!(found, 3);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn web_payload_honours_custom_separators() {
    let options = WebSourceOptions {
        sample_separator: "\n".to_string(),
        field_separator: "|".to_string(),
        ..WebSourceOptions::default()
    };
    let rows = split_payload("x", b"1|2\n3|4\n", &names(&["a", "b"]), &options).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1]["b"], "4");
}

#[test]
fn web_payload_rejects_invalid_utf8() {
    let err = split_payload(
        "x",
        &[0xff, 0xfe, b';'],
        &names(&["a"]),
        &WebSourceOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, SourceError::Content { .. }));
}

/// Answers a single HTTP request with `response` and returns the base URL.
fn serve_once(response: String) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut request = [0u8; 2048];
        let _ = stream.read(&mut request).unwrap();
        stream.write_all(response.as_bytes()).unwrap();
    });
    (base, handle)
}

#[test]
fn web_source_returns_rows_oldest_first() {
    let body = "2022-04-30 23:00:00,2;2022-04-30 22:00:00,1;";
    let (base, server) = serve_once(format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    ));

    let source = WebSource::new(base, WebSourceOptions::default()).unwrap();
    let rows = source
        .rows("trew/?id=1&m=4&y=2022", &names(&["Date and Time", "Value 1"]))
        .unwrap();
    server.join().unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["Value 1"], "1");
    assert_eq!(rows[1]["Date and Time"], "2022-04-30 23:00:00");
}

#[test]
fn web_error_status_is_a_fetch_error() {
    let (base, server) = serve_once(
        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string(),
    );

    let source = WebSource::new(base, WebSourceOptions::default()).unwrap();
    let err = source.rows("lux/?id=9&m=1&y=2022", &names(&["a"])).unwrap_err();
    server.join().unwrap();

    assert!(err.is_fetch());
}
