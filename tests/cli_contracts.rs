use serde_json::Value;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::tempdir;

fn run_modset(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_modset"))
        .current_dir(root)
        .arg("--prefix")
        .arg(root)
        .args(args)
        .output()
        .expect("failed to execute modset")
}

fn envelope(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout is a JSON envelope")
}

#[test]
fn test_spec_lifecycle_through_cli() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();

    let out = run_modset(
        root,
        &[
            "spec",
            "create",
            "--json",
            r#"{"meta":{"name":"blog"},"title":"Blog","srvname":"blog"}"#,
        ],
    );
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let env = envelope(&out);
    assert_eq!(env["cmd"], "spec.create");
    assert_eq!(env["status"], "ok");
    assert_eq!(env["version"], "0.1.0");
    assert!(env["event_id"].as_str().is_some());

    let out = run_modset(
        root,
        &[
            "node",
            "set",
            "--module",
            "blog",
            "--json",
            r#"{"name":"post","title":"Post","fields":[{"name":"title","type":"string","length":500}]}"#,
        ],
    );
    assert!(out.status.success());
    assert_eq!(envelope(&out)["version"], "0.1.1");

    let out = run_modset(root, &["schema", "show", "--module", "blog"]);
    assert!(out.status.success());
    let env = envelope(&out);
    assert_eq!(env["schema"]["tables"].as_array().unwrap().len(), 1);

    let out = run_modset(root, &["schema", "sync", "--module", "blog"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(envelope(&out)["report"]["registry"], "inserted");
    assert!(root.join("modset.db").exists());
}

#[test]
fn test_errors_are_reported_as_envelopes() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();

    let out = run_modset(root, &["spec", "show", "--module", "ghost"]);
    assert!(!out.status.success());
    let env = envelope(&out);
    assert_eq!(env["status"], "error");
    assert_eq!(env["error"]["kind"], "not_found");

    let out = run_modset(root, &["spec", "create", "--json", "{not json"]);
    assert!(!out.status.success());
    assert_eq!(envelope(&out)["error"]["kind"], "invalid_argument");
}
