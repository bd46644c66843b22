use std::fs;
use std::process::Command;

use tempfile::TempDir;

const VALID_PAYLOAD: &str = "void mainImage(out vec4 fragColor, in vec2 fragCoord) {
    vec2 uv = fragCoord / u_resolution;
    fragColor = vec4(uv, 0.5 + 0.5 * sin(u_time), 1.0);
}
";

const BROKEN_PAYLOAD: &str = "void mainImage(out vec4 fragColor, in vec2 fragCoord) {
    fragColor = vec4(undeclared, 1.0);
}
";

#[test]
fn check_accepts_bundled_scene() {
    let output = Command::new(env!("CARGO_BIN_EXE_ringmarch"))
        .env("RINGMARCH_LOG", "error")
        .arg("--check")
        .output()
        .expect("failed to run ringmarch --check");

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("compiled and linked"));
}

#[test]
fn check_accepts_payload_file() {
    let root = TempDir::new().unwrap();
    let path = root.path().join("scene.glsl");
    fs::write(&path, VALID_PAYLOAD).unwrap();

    let status = Command::new(env!("CARGO_BIN_EXE_ringmarch"))
        .env("RINGMARCH_LOG", "error")
        .arg("--check")
        .arg("--fragment")
        .arg(&path)
        .status()
        .expect("failed to run ringmarch --check");

    assert!(status.success());
}

#[test]
fn check_rejects_broken_payload() {
    let root = TempDir::new().unwrap();
    let path = root.path().join("broken.glsl");
    fs::write(&path, BROKEN_PAYLOAD).unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_ringmarch"))
        .env("RINGMARCH_LOG", "off")
        .arg("--check")
        .arg("--fragment")
        .arg(&path)
        .output()
        .expect("failed to run ringmarch --check");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("shader program check failed"));
    assert!(stderr.contains("fragment shader failed to compile"));
}

#[test]
fn check_reports_missing_payload_file() {
    let root = TempDir::new().unwrap();
    let status = Command::new(env!("CARGO_BIN_EXE_ringmarch"))
        .arg("--check")
        .arg("--fragment")
        .arg(root.path().join("absent.glsl"))
        .status()
        .expect("failed to run ringmarch --check");

    assert!(!status.success());
}
