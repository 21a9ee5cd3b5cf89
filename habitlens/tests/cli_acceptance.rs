use chrono::{Duration, Utc};
use habitlens_core::store::PredictionStore;
use habitlens_core::Database;
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    xdg_data: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_data = base.join("xdg-data");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_data).expect("failed to create XDG_DATA_HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        // No pause between users in batch runs
        let config_dir = xdg_config.join("habitlens");
        fs::create_dir_all(&config_dir).expect("failed to create config dir");
        fs::write(
            config_dir.join("config.toml"),
            "[scheduler]\nbatch_delay_ms = 0\n",
        )
        .expect("failed to write config");

        Self {
            _temp_dir: temp_dir,
            home,
            xdg_data,
            xdg_config,
            xdg_state,
        }
    }

    fn db_path(&self) -> PathBuf {
        self.xdg_data.join("habitlens/data.db")
    }

    /// Write an import file with a habit practiced for two weeks, then dropped.
    fn abandoned_habit_file(&self) -> PathBuf {
        let now = Utc::now();
        let entries: Vec<_> = [27, 26, 25, 24, 23, 20, 19, 18, 17, 16]
            .iter()
            .map(|d| {
                serde_json::json!({
                    "category": "guitar",
                    "startedAt": now - Duration::days(*d),
                    "durationMinutes": 45.0,
                })
            })
            .collect();
        let path = self.home.join("guitar.json");
        fs::write(&path, serde_json::to_string(&entries).unwrap()).expect("failed to write import");
        path
    }
}

fn run_bin(env: &CliTestEnv, bin_name: &str, args: &[&str]) -> Output {
    let bin_path = match bin_name {
        "habitlens" => PathBuf::from(assert_cmd::cargo::cargo_bin!("habitlens")),
        "habitlens-scheduler" => PathBuf::from(assert_cmd::cargo::cargo_bin!("habitlens-scheduler")),
        _ => panic!("unsupported binary in test harness: {bin_name}"),
    };

    let mut command = Command::new(bin_path);

    command
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_DATA_HOME", &env.xdg_data)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .output()
        .unwrap_or_else(|e| panic!("failed to execute {bin_name}: {e}"))
}

fn assert_success(bin_name: &str, args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }

    let rendered_args = args
        .iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "{bin_name} {rendered_args} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status, stdout, stderr
    );
}

fn habitlens(env: &CliTestEnv, args: &[&str]) -> String {
    let output = run_bin(env, "habitlens", args);
    assert_success("habitlens", args, &output);
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn import_and_risk_analysis_create_alert() {
    let env = CliTestEnv::new();
    let import = env.abandoned_habit_file();
    let import = import.to_str().expect("utf-8 temp path");

    habitlens(&env, &["user", "add", "alice", "--name", "Alice"]);
    let stdout = habitlens(&env, &["--user", "alice", "import", import]);
    assert!(stdout.contains("Imported 10 of 10 activities"), "got:\n{stdout}");

    let stdout = habitlens(&env, &["--user", "alice", "--format", "json", "risk"]);
    let value: serde_json::Value = serde_json::from_str(&stdout).expect("risk output is JSON");
    assert_eq!(value["predictions"][0]["category"], "guitar");
    assert_eq!(value["predictions"][0]["riskLevel"], "critical");
    assert!(value["alert"].is_object(), "expected an alert, got:\n{stdout}");

    let db = Database::open(&env.db_path()).expect("failed to open db");
    db.migrate().expect("failed to migrate db");
    let snapshot = db
        .latest_predictions("alice")
        .expect("failed to read predictions")
        .expect("prediction snapshot should be stored");
    assert_eq!(snapshot.predictions.len(), 1);

    let stdout = habitlens(&env, &["--user", "alice", "--format", "json", "alerts", "stats"]);
    let stats: serde_json::Value = serde_json::from_str(&stdout).expect("stats output is JSON");
    assert_eq!(stats["habitAlerts"], 1);
    assert_eq!(stats["unread"], 1);
}

#[test]
fn user_scoped_commands_require_a_known_user() {
    let env = CliTestEnv::new();

    let output = run_bin(&env, "habitlens", &["patterns"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--user"));

    let output = run_bin(&env, "habitlens", &["--user", "nobody", "patterns"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("user not found"));
}

#[test]
fn log_rejects_non_positive_duration() {
    let env = CliTestEnv::new();
    habitlens(&env, &["user", "add", "alice"]);

    let stdout = habitlens(&env, &["--user", "alice", "log", "reading", "25"]);
    assert!(stdout.contains("Logged reading"));

    let output = run_bin(&env, "habitlens", &["--user", "alice", "log", "reading", "0"]);
    assert!(!output.status.success());
}

#[test]
fn batch_and_scheduler_run_over_all_users() {
    let env = CliTestEnv::new();
    let import = env.abandoned_habit_file();
    let import = import.to_str().expect("utf-8 temp path");

    habitlens(&env, &["user", "add", "alice"]);
    habitlens(&env, &["user", "add", "bob", "--no-predictions"]);
    habitlens(&env, &["--user", "alice", "import", import]);

    let stdout = habitlens(&env, &["batch"]);
    assert!(stdout.contains("Batch complete:"));
    assert!(stdout.contains("Users:     1"), "got:\n{stdout}");
    assert!(stdout.contains("Alerts:    1"), "got:\n{stdout}");

    let args = ["--once"];
    let output = run_bin(&env, "habitlens-scheduler", &args);
    assert_success("habitlens-scheduler", &args, &output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    for job in ["pattern_refresh", "cleanup", "prediction_batch", "critical_check"] {
        assert!(stdout.contains(job), "missing {job} in:\n{stdout}");
    }
    // Still throttled from the batch run
    assert!(stdout.contains("1 users, 0 alerts, 0 failures"), "got:\n{stdout}");
}
