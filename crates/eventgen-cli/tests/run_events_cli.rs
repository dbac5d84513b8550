use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn run_events(args: &[&str]) -> Output {
    let binary_path = env!("CARGO_BIN_EXE_run-events");
    Command::new(binary_path)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("run-events should start")
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[cfg(unix)]
fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\nset -e\n{body}\n")).expect("script should be written");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
        .expect("script should be executable");
    path
}

#[test]
fn layout_command_describes_the_record() {
    let output = run_events(&["layout"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"initial_entropy\""));
    assert!(stdout.contains("record size: 536 bytes"));
    assert!(stdout.contains("numpy dtype: [('initial_entropy', '<f8')"));
}

#[test]
fn unknown_option_is_a_usage_error() {
    let output = run_events(&["run", "results.dat", "--grid-size", "3"]);
    assert_eq!(output.status.code(), Some(2), "stderr: {}", stderr(&output));
    assert!(stderr(&output).contains("INPUT.CLI_USAGE"));
}

#[test]
fn invalid_configuration_exits_with_input_error() {
    let temp = TempDir::new().expect("tempdir should be created");
    let results = temp.path().join("results.dat");
    let output = run_events(&[
        "run",
        results.to_str().expect("utf-8 path"),
        "--centrality-low",
        "50",
        "--centrality-high",
        "10",
    ]);
    assert_eq!(output.status.code(), Some(2), "stderr: {}", stderr(&output));
    assert!(stderr(&output).contains("INPUT.CONFIG_CENTRALITY"));
    assert!(!results.exists());
}

#[test]
fn missing_checkpoint_is_an_io_error() {
    let temp = TempDir::new().expect("tempdir should be created");
    let checkpoint = temp.path().join("missing.chk");
    let output = run_events(&["checkpoint", checkpoint.to_str().expect("utf-8 path")]);

    assert_eq!(output.status.code(), Some(3), "stderr: {}", stderr(&output));
    let stderr = stderr(&output);
    assert!(stderr.contains("IO.CHECKPOINT_READ"));
    assert!(stderr.contains("FATAL EXIT CODE: 3"));
}

#[cfg(unix)]
#[test]
fn empty_events_stop_cleanly_through_real_subprocesses() {
    let temp = TempDir::new().expect("tempdir should be created");
    let bin = temp.path().join("bin");
    fs::create_dir(&bin).expect("bin dir should be created");

    let generator = write_script(
        &bin,
        "generator",
        r#"cat > initial_conditions.json <<'JSON'
{"events": {"event_0": {"matter_density": [0, 0, 0, 0], "attrs": {"grid_n": 2, "grid_step": 0.1}}}}
JSON"#,
    );
    let freestream = write_script(
        &bin,
        "freestream",
        "for f in fs_e fs_u1 fs_u2 fs_pi11 fs_pi12 fs_pi22; do cp initial.dat \"$f.dat\"; done",
    );
    let hydro = write_script(&bin, "hydro", ": > surface.dat");

    let results = temp.path().join("results.dat");
    let logfile = temp.path().join("run.log");
    let args_file = temp.path().join("run.conf");
    fs::write(
        &args_file,
        format!(
            "nevents = 2\ngrid_max = 0.1\ngrid_step = 0.1\ntmpdir = {}\nlogfile = {}\ngenerator_program = {}\nfreestream_program = {}\nhydro_program = {}\n",
            temp.path().join("work").display(),
            logfile.display(),
            generator.display(),
            freestream.display(),
            hydro.display(),
        ),
    )
    .expect("argument file should be written");

    let output = run_events(&[
        "run",
        &format!("@{}", args_file.display()),
        results.to_str().expect("utf-8 path"),
    ]);

    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    assert_eq!(
        fs::metadata(&results).expect("results should exist").len(),
        0,
        "stopped events should not write records"
    );
    let log = fs::read_to_string(&logfile).expect("log should be written");
    assert!(log.contains("RUN.EMPTY_SURFACE"), "log: {log}");
    assert!(log.contains("run finished"), "log: {log}");
}

#[cfg(unix)]
#[test]
fn broken_generator_fails_the_run_with_stage_status() {
    let temp = TempDir::new().expect("tempdir should be created");
    let generator = write_script(temp.path(), "generator", "echo 'no nuclei' >&2; exit 9");
    let results = temp.path().join("results.dat");

    let output = run_events(&[
        "run",
        results.to_str().expect("utf-8 path"),
        "--nevents",
        "1",
        "--generator-program",
        generator.to_str().expect("utf-8 path"),
    ]);

    assert_eq!(output.status.code(), Some(4), "stderr: {}", stderr(&output));
    let stderr = stderr(&output);
    assert!(stderr.contains("RUN.GENERATOR_STAGE"), "stderr: {stderr}");
    assert!(stderr.contains("no nuclei"), "stderr: {stderr}");
}
