use std::fs;
use std::path::Path;

use tempfile::tempdir;

fn data(name: &str) -> String {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/data")
        .join(name)
        .display()
        .to_string()
}

#[test]
fn runs_from_census_with_reports() {
    let output = tempdir().unwrap();
    let out = assert_cmd::cargo::cargo_bin_cmd!("geospread")
        .args(["--population", &data("census.csv")])
        .args(["--config", &data("config.json")])
        .args(["--steps", "5", "--fit-bounds", "--random-seed", "8"])
        .arg("-o")
        .arg(output.path())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let stdout = String::from_utf8(out).unwrap();
    assert!(stdout.contains("Final infectious:"));
    assert!(stdout.contains("Execution Summary"));
    assert!(stdout.contains("Population:              40"));

    let steps = fs::read_to_string(output.path().join("steps.csv")).unwrap();
    assert!(steps.lines().nth(1).unwrap().starts_with("0,36,4,0,"));
    assert!(steps.lines().count() <= 7);
    assert!(output.path().join("transitions.csv").exists());
}

#[test]
fn refuses_to_overwrite_reports() {
    let output = tempdir().unwrap();
    fs::write(output.path().join("steps.csv"), "keep me\n").unwrap();

    assert_cmd::cargo::cargo_bin_cmd!("geospread")
        .args(["--steps", "1", "-o"])
        .arg(output.path())
        .assert()
        .failure();
    assert_eq!(
        fs::read_to_string(output.path().join("steps.csv")).unwrap(),
        "keep me\n"
    );

    assert_cmd::cargo::cargo_bin_cmd!("geospread")
        .args(["--steps", "1", "--force-overwrite", "-o"])
        .arg(output.path())
        .assert()
        .success();
}

#[test]
fn rejects_unknown_log_levels() {
    assert_cmd::cargo::cargo_bin_cmd!("geospread")
        .args(["--log-level", "noisy", "--steps", "0"])
        .assert()
        .failure();
}
