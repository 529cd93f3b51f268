use std::process::Command;

use tempfile::tempdir;

fn deck() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_deck"));
    for (key, _) in std::env::vars() {
        if key.starts_with("DECK_") {
            cmd.env_remove(key);
        }
    }
    cmd
}

#[test]
fn cli_models_prints_builtin_routing() {
    let out = deck().arg("models").output().unwrap();
    assert!(out.status.success());

    let stdout = String::from_utf8(out.stdout).unwrap();
    let rows: Vec<&str> = stdout.lines().collect();
    assert_eq!(rows.len(), 9);
    assert!(rows[0].starts_with("outline"));
    assert!(stdout.contains("image_vision"));
    assert!(stdout.contains("openai/"));
}

#[test]
fn cli_models_honors_config_file_and_env() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("deck.json");
    std::fs::write(
        &config,
        r#"{"models": {"default_model": "acme/base", "tasks": {"slides": "acme/slides"}}}"#,
    )
    .unwrap();

    let out = deck()
        .args(["models", "--config"])
        .arg(&config)
        .env("DECK_MODEL_NOTES", "acme/notes")
        .output()
        .unwrap();
    assert!(out.status.success());

    let stdout = String::from_utf8(out.stdout).unwrap();
    let line = |task: &str| {
        stdout
            .lines()
            .find(|l| l.split_whitespace().next() == Some(task))
            .unwrap()
            .to_string()
    };
    assert!(line("slides").ends_with("acme/slides"));
    assert!(line("notes").ends_with("acme/notes"));
    assert!(line("outline").ends_with("acme/base"));
}

#[test]
fn cli_models_rejects_unknown_task_in_config() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("deck.json");
    std::fs::write(&config, r#"{"models": {"tasks": {"banner": "acme/x"}}}"#).unwrap();

    let status = deck()
        .args(["models", "--config"])
        .arg(&config)
        .status()
        .unwrap();
    assert!(!status.success());
}

#[test]
fn cli_themes_lists_all_five() {
    let out = deck().arg("themes").output().unwrap();
    assert!(out.status.success());

    let stdout = String::from_utf8(out.stdout).unwrap();
    assert_eq!(stdout.lines().count(), 5);
    assert!(stdout.contains("LIGHT_PROFESSIONAL\tLight Professional (default)"));
    assert!(stdout.contains("DARK_TECH"));
}

#[test]
fn cli_run_without_api_key_fails_cleanly() {
    let dir = tempdir().unwrap();
    let out = deck()
        .args([
            "run",
            "--topic",
            "Solar power",
            "--duration",
            "5",
            "--audience",
            "students",
            "--out",
        ])
        .arg(dir.path().join("deck.json"))
        .env_remove("OPENROUTER_API_KEY")
        .output()
        .unwrap();
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("OPENROUTER_API_KEY"));
    assert!(!dir.path().join("deck.json").exists());
}
