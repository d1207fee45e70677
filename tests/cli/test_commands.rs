use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

const DEFINITIONS: &str = r#"[
  {
    "id": "cleanup",
    "title": "Cleanup",
    "description": "Strip fillers",
    "steps": [
      {"id": "fillers", "type": "find_replace", "find_text": "\\b(um|uh)\\s+", "replace_text": "", "use_regex": true},
      {"id": "names", "type": "find_replace", "find_text": "jon", "replace_text": "Jon"}
    ]
  },
  {
    "id": "broken",
    "title": "Broken",
    "steps": [
      {"type": "find_replace", "find_text": "(", "replace_text": "", "use_regex": true}
    ]
  }
]"#;

fn scrivener(workspace: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("scrivener").unwrap();
    cmd.current_dir(workspace.path())
        .env("SCRIVENER_LOG_CONSOLE", "none")
        .env_remove("SCRIVENER_DATABASE_PATH")
        .env_remove("RUST_LOG");
    cmd
}

fn workspace_with_definitions() -> TempDir {
    let workspace = TempDir::new().unwrap();
    std::fs::write(workspace.path().join("definitions.json"), DEFINITIONS).unwrap();
    scrivener(&workspace)
        .args(["transformations", "import", "definitions.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported 2 transformation(s)."));
    workspace
}

#[test]
fn help_lists_pipeline_commands() {
    Command::cargo_bin("scrivener")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("PIPELINE COMMANDS"))
        .stdout(predicate::str::contains("transformations"))
        .stdout(predicate::str::contains("runs"));
}

#[test]
fn import_run_and_inspect_history() {
    let workspace = workspace_with_definitions();
    assert!(workspace.path().join(".scrivener/scrivener.db").exists());

    scrivener(&workspace)
        .args(["transformations", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cleanup"))
        .stdout(predicate::str::contains("Broken"));

    scrivener(&workspace)
        .args(["run", "cleanup", "--input", "um so jon said uh hi", "--recording-id", "rec-9"])
        .assert()
        .success()
        .stdout("so Jon said hi\n");

    let output = scrivener(&workspace)
        .args(["runs", "list", "--recording", "rec-9", "--format", "json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let runs: Value = serde_json::from_slice(&output).unwrap();
    let runs = runs.as_array().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0]["status"], "completed");
    assert_eq!(runs[0]["step_runs"][1]["input"], "so jon said hi");

    let run_id = runs[0]["id"].as_str().unwrap().to_string();
    scrivener(&workspace)
        .args(["runs", "show", &run_id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Step 2 [Find Replace] (names)"))
        .stdout(predicate::str::contains("so Jon said hi"));
}

#[test]
fn input_is_read_from_stdin() {
    let workspace = workspace_with_definitions();
    scrivener(&workspace)
        .args(["run", "cleanup"])
        .write_stdin("uh jon\n")
        .assert()
        .success()
        .stdout("Jon\n\n");
}

#[test]
fn failed_run_exits_non_zero_and_is_recorded() {
    let workspace = workspace_with_definitions();
    scrivener(&workspace)
        .args(["run", "broken", "--input", "anything"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid regex pattern"));

    scrivener(&workspace)
        .args(["runs", "list", "--transformation", "broken"])
        .assert()
        .success()
        .stdout(predicate::str::contains("failed"));
}

#[test]
fn engine_rejections_create_no_runs() {
    let workspace = workspace_with_definitions();
    scrivener(&workspace)
        .args(["run", "cleanup", "--input", "   "])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Empty input"));

    scrivener(&workspace)
        .args(["run", "missing", "--input", "text"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Could not find the selected transformation"));

    scrivener(&workspace)
        .args(["runs", "list", "--transformation", "cleanup"])
        .assert()
        .success()
        .stdout("No runs recorded.\n");
}

#[test]
fn reimport_requires_replace() {
    let workspace = workspace_with_definitions();
    scrivener(&workspace)
        .args(["transformations", "import", "definitions.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--replace"));

    scrivener(&workspace)
        .args(["transformations", "import", "definitions.json", "--replace"])
        .assert()
        .success();
}

#[test]
fn database_flag_points_at_another_store() {
    let workspace = workspace_with_definitions();
    scrivener(&workspace)
        .args(["--database", "other.db", "transformations", "list"])
        .assert()
        .success()
        .stdout("No transformations defined.\n");
    assert!(workspace.path().join("other.db").exists());
}
