use std::fs;

use orchardflux_core::calibration::{
    calibration_from_file, discover_calibration_files, CalibrationError, MoistureCalibration,
};

#[test]
fn readings_map_wet_to_100_and_dry_to_0() {
    let calibration = MoistureCalibration::from_readings(&[5300.0, 5310.0], &[4500.0, 4510.0]).unwrap();

    assert!((calibration.apply(5305.0) - 100.0).abs() < 1e-9);
    assert!(calibration.apply(4505.0).abs() < 1e-9);
    assert!((calibration.a - 0.125).abs() < 1e-12);
}

#[test]
fn equal_means_cannot_be_calibrated() {
    let err = MoistureCalibration::from_readings(&[10.0, 20.0], &[15.0]).unwrap_err();
    assert!(matches!(err, CalibrationError::Degenerate { .. }));

    let err = MoistureCalibration::from_readings(&[], &[15.0]).unwrap_err();
    assert!(matches!(err, CalibrationError::EmptyReadings { which: "wet" }));
}

#[test]
fn calibration_file_has_header_then_wet_then_dry() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Calibration_TREWid6_almond.csv");
    fs::write(&path, "r1;r2;r3\n5300;5310;5320\n4500;4510;4520\n").unwrap();

    let calibration = calibration_from_file(&path).unwrap();
    assert!((calibration.a - 0.125).abs() < 1e-12);
    assert!((calibration.b + 0.125 * 4510.0).abs() < 1e-9);
}

#[test]
fn calibration_file_without_dry_row_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Calibration_TREWid1_almond.csv");
    fs::write(&path, "r1,r2\n5300,5310\n").unwrap();

    let err = calibration_from_file(&path).unwrap_err();
    assert!(matches!(err, CalibrationError::Format { .. }));
}

#[test]
fn calibration_file_rejects_non_numeric_readings() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Calibration_TREWid1_almond.csv");
    fs::write(&path, "r1,r2\n5300,wet\n4500,4510\n").unwrap();

    let err = calibration_from_file(&path).unwrap_err();
    assert!(err.to_string().contains("'wet' is not an integer reading"));
}

#[test]
fn calibration_readings_are_whole_numbers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Calibration_TREWid1_almond.csv");
    fs::write(&path, "r1,r2\n5300,5310.5\n4500,4510\n").unwrap();

    let err = calibration_from_file(&path).unwrap_err();
    assert!(matches!(err, CalibrationError::Format { .. }));
    assert!(err.to_string().contains("row 1: '5310.5'"));
}

#[test]
fn missing_calibration_file_is_a_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = calibration_from_file(&dir.path().join("nope.csv")).unwrap_err();
    assert!(matches!(err, CalibrationError::Read { .. }));
}

#[test]
fn discovers_files_for_one_site_sorted_by_id() {
    let dir = tempfile::tempdir().unwrap();
    for name in [
        "Calibration_TREWid10_almond.csv",
        "Calibration_TREWid2_almond.csv",
        "Calibration_TREWid3_pistachio.csv",
        "Calibration_TREWidX_almond.csv",
    ] {
        fs::write(dir.path().join(name), "h\n1\n0\n").unwrap();
    }

    let found = discover_calibration_files(dir.path(), "almond").unwrap();
    let ids: Vec<u32> = found.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, [2, 10]);
    assert!(found[0].1.ends_with("Calibration_TREWid2_almond.csv"));
}

#[test]
fn discovery_treats_the_directory_name_literally() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("run [1]");
    fs::create_dir(&dir).unwrap();
    fs::write(dir.join("Calibration_TREWid4_almond.csv"), "h\n1\n0\n").unwrap();

    let found = discover_calibration_files(&dir, "almond").unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].0, 4);
    assert_eq!(found[0].1, dir.join("Calibration_TREWid4_almond.csv"));
}
