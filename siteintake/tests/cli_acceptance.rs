use siteintake_core::{Database, SessionFilter, SessionStatus};
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::process::Output;
use tempfile::TempDir;

const ANSWERS: [(&str, &str); 6] = [
    ("greeting", "Get more catering orders"),
    ("business-name", "Rosa's Kitchen"),
    ("industry", "Restaurant and catering"),
    ("services", "Catering, private dinners, cooking classes"),
    ("branding", "Red and #fef3c7"),
    ("content", "Three generations of family recipes. Email rosa@kitchen.test"),
];

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

        Self {
            _temp_dir: temp_dir,
            home,
            xdg_data,
            xdg_config,
            xdg_state,
        }
    }

    fn db_path(&self) -> PathBuf {
        self.xdg_data.join("siteintake/data.db")
    }

    fn write_config(&self, contents: &str) {
        let dir = self.xdg_config.join("siteintake");
        fs::create_dir_all(&dir).expect("failed to create config dir");
        fs::write(dir.join("config.toml"), contents).expect("failed to write config");
    }
}

fn command(env: &CliTestEnv, bin_name: &str) -> assert_cmd::Command {
    let bin_path = match bin_name {
        "siteintake" => PathBuf::from(assert_cmd::cargo::cargo_bin!("siteintake")),
        "siteintake-chat" => PathBuf::from(assert_cmd::cargo::cargo_bin!("siteintake-chat")),
        _ => panic!("unsupported binary in test harness: {bin_name}"),
    };

    let mut command = assert_cmd::Command::new(bin_path);
    command
        .env("HOME", &env.home)
        .env("XDG_DATA_HOME", &env.xdg_data)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .env_remove("RUST_LOG");
    command
}

fn run_bin(env: &CliTestEnv, args: &[&str]) -> Output {
    command(env, "siteintake").args(args).output().unwrap_or_else(|e| {
        panic!("failed to execute siteintake: {e}");
    })
}

fn render_failure(args: &[&str], output: &Output) -> String {
    let rendered_args = args
        .iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        "siteintake {rendered_args}\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status,
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    )
}

fn run_ok(env: &CliTestEnv, args: &[&str]) -> String {
    let output = run_bin(env, args);
    if !output.status.success() {
        panic!("command failed\n{}", render_failure(args, &output));
    }
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn run_err(env: &CliTestEnv, args: &[&str]) -> String {
    let output = run_bin(env, args);
    if output.status.success() {
        panic!("command should fail\n{}", render_failure(args, &output));
    }
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn new_session(env: &CliTestEnv) -> String {
    let stdout = run_ok(env, &["new"]);
    stdout
        .lines()
        .find_map(|line| line.strip_prefix("Session: "))
        .unwrap_or_else(|| panic!("no session id in output:\n{stdout}"))
        .trim()
        .to_string()
}

fn answer_all(env: &CliTestEnv, id: &str) {
    for (step, answer) in ANSWERS {
        run_ok(env, &["answer", id, step, answer]);
    }
}

#[test]
fn full_intake_generates_and_deploys() {
    let env = CliTestEnv::new();
    let id = new_session(&env);
    answer_all(&env, &id);

    let stdout = run_ok(&env, &["advance", &id]);
    assert!(stdout.contains("Advanced to generating"), "got:\n{stdout}");

    let stdout = run_ok(&env, &["generate", &id]);
    assert!(stdout.contains("hospitality"), "got:\n{stdout}");

    let stdout = run_ok(&env, &["deploy", &id]);
    assert!(
        stdout.contains("https://rosa-s-kitchen.sites.siteintake.app"),
        "got:\n{stdout}"
    );

    let stdout = run_ok(&env, &["show", &id, "--format", "json"]);
    let snapshot: serde_json::Value = serde_json::from_str(&stdout).expect("valid json");
    assert_eq!(snapshot["status"], "deployed");
    assert_eq!(snapshot["currentPhase"], "close");
    assert_eq!(snapshot["phaseProgress"]["close"]["status"], "completed");
    assert_eq!(snapshot["messages"].as_array().unwrap().len(), 12);

    let db_path = env.db_path();
    assert!(
        db_path.exists(),
        "database file should exist at {}",
        db_path.display()
    );
    let db = Database::open(&db_path).expect("failed to open db");
    let session = db.get_session(&id).unwrap().expect("session stored");
    assert_eq!(session.status, SessionStatus::Deployed);
    let business = db
        .get_business(session.business_id.as_deref().unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(business.name, "Rosa's Kitchen");
}

#[test]
fn out_of_sequence_answer_fails_without_changes() {
    let env = CliTestEnv::new();
    let id = new_session(&env);

    let stderr = run_err(&env, &["answer", &id, "industry", "Plumbing"]);
    assert!(stderr.contains("out of sequence"), "got:\n{stderr}");

    let stdout = run_ok(&env, &["show", &id]);
    assert!(stdout.contains("Responses: 0"), "got:\n{stdout}");
    assert!(stdout.contains("[>] Discovery"), "got:\n{stdout}");
}

#[test]
fn deploy_before_generate_is_rejected() {
    let env = CliTestEnv::new();
    let id = new_session(&env);
    answer_all(&env, &id);
    run_ok(&env, &["complete", &id]);

    let stderr = run_err(&env, &["deploy", &id]);
    assert!(stderr.contains("no site has been generated"), "got:\n{stderr}");
}

#[test]
fn failure_retry_and_abandon() {
    let env = CliTestEnv::new();
    let id = new_session(&env);
    run_ok(&env, &["answer", &id, "greeting", "Hello"]);

    run_ok(&env, &["fail", &id, "browser closed"]);
    let stdout = run_ok(&env, &["show", &id]);
    assert!(stdout.contains("Error (other): browser closed"), "got:\n{stdout}");

    let stdout = run_ok(&env, &["retry", &id]);
    assert!(stdout.contains("restored to in-progress"), "got:\n{stdout}");

    run_ok(&env, &["fail", &id, "browser closed again"]);
    run_ok(&env, &["abandon", &id]);
    run_err(&env, &["retry", &id]);

    // The transcript survives the failure
    let stdout = run_ok(&env, &["transcript", &id]);
    assert!(stdout.contains("Hello"), "got:\n{stdout}");
}

#[test]
fn list_filters_by_status_and_accepts_prefixes() {
    let env = CliTestEnv::new();
    let first = new_session(&env);
    let second = new_session(&env);
    run_ok(&env, &["fail", &second, "boom"]);

    let stdout = run_ok(&env, &["list"]);
    assert!(stdout.contains(&first[..8]), "got:\n{stdout}");
    assert!(stdout.contains(&second[..8]), "got:\n{stdout}");

    let stdout = run_ok(&env, &["list", "--status", "error"]);
    assert!(!stdout.contains(&first[..8]), "got:\n{stdout}");
    assert!(stdout.contains(&second[..8]), "got:\n{stdout}");

    // Unique prefixes resolve to the full id
    run_ok(&env, &["answer", &first[..12], "greeting", "Hi"]);

    let db = Database::open(&env.db_path()).expect("failed to open db");
    let in_progress = db
        .list_sessions(&SessionFilter {
            status: Some(SessionStatus::InProgress),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(in_progress.len(), 1);
    assert_eq!(in_progress[0].response_count, 1);
}

#[test]
fn expire_fails_stalled_generation() {
    let env = CliTestEnv::new();
    let id = new_session(&env);
    answer_all(&env, &id);
    run_ok(&env, &["complete", &id]);

    let stdout = run_ok(&env, &["expire"]);
    assert!(stdout.contains("Expired 0 session(s)"), "got:\n{stdout}");

    std::thread::sleep(std::time::Duration::from_millis(1100));
    let stdout = run_ok(&env, &["expire", "--minutes", "0"]);
    assert!(stdout.contains("Expired 1 session(s)"), "got:\n{stdout}");
    assert!(stdout.contains(&id), "got:\n{stdout}");
}

#[test]
fn pricing_reads_config() {
    let env = CliTestEnv::new();
    let stdout = run_ok(&env, &["pricing"]);
    assert!(stdout.contains("$30/month"), "got:\n{stdout}");
    assert!(stdout.contains("/api/v1/sites"), "got:\n{stdout}");

    env.write_config("[pricing]\nmonthly_price_cents = 4900\n");
    let stdout = run_ok(&env, &["pricing"]);
    assert!(stdout.contains("$49/month"), "got:\n{stdout}");

    env.write_config("[brand]\nprimary = \"blue\"\n");
    let stderr = run_err(&env, &["pricing"]);
    assert!(stderr.contains("brand.primary"), "got:\n{stderr}");
}

#[test]
fn status_reports_counts_and_builder() {
    let env = CliTestEnv::new();
    let id = new_session(&env);
    new_session(&env);
    run_ok(&env, &["fail", &id, "boom"]);

    let stdout = run_ok(&env, &["status"]);
    assert!(stdout.contains("in-progress  1"), "got:\n{stdout}");
    assert!(stdout.contains("error        1"), "got:\n{stdout}");
    assert!(
        stdout.contains("local templates (sites.siteintake.app)"),
        "got:\n{stdout}"
    );
    assert!(
        stdout.contains(&env.db_path().display().to_string()),
        "got:\n{stdout}"
    );

    // Every session was created just now
    let stdout = run_ok(&env, &["list", "--days", "1"]);
    assert!(stdout.contains(&id[..8]), "got:\n{stdout}");
}

#[test]
fn remote_without_config_is_rejected() {
    let env = CliTestEnv::new();
    let id = new_session(&env);
    let stderr = run_err(&env, &["generate", &id, "--remote"]);
    assert!(stderr.contains("not configured"), "got:\n{stderr}");
}

#[test]
fn chat_runs_a_whole_intake_from_stdin() {
    let env = CliTestEnv::new();

    let mut input: String = ANSWERS
        .iter()
        .map(|(_, answer)| format!("{answer}\n"))
        .collect();
    input.push_str("done\n");

    let output = command(&env, "siteintake-chat")
        .write_stdin(input)
        .output()
        .expect("failed to execute siteintake-chat");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        output.status.success(),
        "chat failed\nstdout:\n{stdout}\nstderr:\n{}",
        String::from_utf8_lossy(&output.stderr)
    );

    assert!(stdout.contains("$30/month"), "got:\n{stdout}");
    assert!(stdout.contains("Nice to meet you, Rosa's Kitchen!"), "got:\n{stdout}");
    assert!(stdout.contains("[>] Audit"), "got:\n{stdout}");
    assert!(
        stdout.contains("Your site is live at https://rosa-s-kitchen."),
        "got:\n{stdout}"
    );
}

#[test]
fn chat_pauses_on_end_of_input() {
    let env = CliTestEnv::new();

    let output = command(&env, "siteintake-chat")
        .write_stdin("Just browsing\n")
        .output()
        .expect("failed to execute siteintake-chat");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("Resume any time with: siteintake-chat --session"),
        "got:\n{stdout}"
    );

    let db = Database::open(&env.db_path()).expect("failed to open db");
    let sessions = db.list_sessions(&SessionFilter::default()).unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].response_count, 1);
}

#[cfg(unix)]
#[test]
fn chat_interrupt_keeps_answers_and_flushes_log() {
    use std::io::{Read, Write};
    use std::process::{Command, Stdio};

    let env = CliTestEnv::new();
    let mut child = Command::new(PathBuf::from(assert_cmd::cargo::cargo_bin!(
        "siteintake-chat"
    )))
    .env("HOME", &env.home)
    .env("XDG_DATA_HOME", &env.xdg_data)
    .env("XDG_CONFIG_HOME", &env.xdg_config)
    .env("XDG_STATE_HOME", &env.xdg_state)
    .env_remove("RUST_LOG")
    .stdin(Stdio::piped())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .spawn()
    .expect("failed to start siteintake-chat");

    let mut stdin = child.stdin.take().expect("chat stdin is piped");
    let mut stdout = child.stdout.take().expect("chat stdout is piped");
    writeln!(stdin, "{}", ANSWERS[0].1).expect("failed to answer");

    // The second prompt means the first answer has been saved
    let mut seen = Vec::new();
    let mut buf = [0u8; 512];
    while String::from_utf8_lossy(&seen).matches("you> ").count() < 2 {
        let n = stdout.read(&mut buf).expect("failed to read chat output");
        assert!(n > 0, "chat exited early:\n{}", String::from_utf8_lossy(&seen));
        seen.extend_from_slice(&buf[..n]);
    }

    let kill = Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .expect("failed to run kill");
    assert!(kill.success());

    let output = child.wait_with_output().expect("failed to wait for chat");
    drop(stdin);
    assert_eq!(output.status.code(), Some(130));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Resume any time with"), "got:\n{stderr}");

    let db = Database::open(&env.db_path()).expect("failed to open db");
    let sessions = db.list_sessions(&SessionFilter::default()).unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].response_count, 1);

    let log_dir = env.xdg_state.join("siteintake");
    let logs: String = fs::read_dir(&log_dir)
        .expect("log directory exists")
        .map(|entry| fs::read_to_string(entry.unwrap().path()).unwrap_or_default())
        .collect();
    assert!(logs.contains("Chat interrupted"), "log was:\n{logs}");
}
