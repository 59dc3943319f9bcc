use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn spawn_shell(args: &[&str]) -> Child {
    Command::new(env!("CARGO_BIN_EXE_tsh"))
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to start tsh")
}

fn send(stdin: &mut ChildStdin, line: &str) {
    stdin.write_all(line.as_bytes()).unwrap();
    stdin.write_all(b"\n").unwrap();
    stdin.flush().unwrap();
}

fn run_script(lines: &[&str]) -> Output {
    let mut shell = spawn_shell(&["-p"]);
    let mut stdin = shell.stdin.take().unwrap();
    for line in lines {
        send(&mut stdin, line);
    }
    drop(stdin);
    shell.wait_with_output().unwrap()
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Starts `line` as a foreground job, delivers `signal` to the shell itself,
/// then runs `after` and returns the output and the time the job was alive.
fn signal_foreground(line: &str, signal: Signal, after: &[&str]) -> (Output, Duration) {
    signal_during(&[line], signal, after)
}

/// Runs `before`, delivers `signal` to the shell half a second later, then runs
/// `after`.
fn signal_during(before: &[&str], signal: Signal, after: &[&str]) -> (Output, Duration) {
    let mut shell = spawn_shell(&["-p"]);
    let shell_pid = Pid::from_raw(shell.id() as i32);
    let mut stdin = shell.stdin.take().unwrap();

    let started = Instant::now();
    for line in before {
        send(&mut stdin, line);
    }
    thread::sleep(Duration::from_millis(500));
    kill(shell_pid, signal).unwrap();
    for line in after {
        send(&mut stdin, line);
    }
    drop(stdin);
    let output = shell.wait_with_output().unwrap();
    (output, started.elapsed())
}

#[test]
fn quit_and_end_of_input_exit_cleanly() {
    let output = run_script(&["quit"]);
    assert!(output.status.success());
    assert!(output.stdout.is_empty());

    let output = run_script(&[]);
    assert!(output.status.success());
}

#[test]
fn usage_flag_prints_usage_and_fails() {
    let output = spawn_shell(&["-h"]).wait_with_output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout_of(&output).starts_with("Usage: shell [-hvp]"));
}

#[test]
fn unknown_program_is_reported() {
    let output = run_script(&["no_such_program_for_tsh", "quit"]);
    assert!(output.status.success());
    assert_eq!(stdout_of(&output), "no_such_program_for_tsh: Command not found\n");
}

#[test]
fn foreground_job_output_comes_before_the_next_command() {
    let output = run_script(&["/bin/echo hello", "/bin/echo 'big world'", "jobs", "quit"]);
    assert_eq!(stdout_of(&output), "hello\nbig world\n");
}

#[test]
fn background_job_is_announced_and_listed() {
    let output = run_script(&["/bin/sleep 2 &", "jobs", "quit"]);
    let stdout = stdout_of(&output);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2, "unexpected output: {stdout}");
    assert!(lines[0].starts_with("[1] ("));
    assert!(lines[0].ends_with(") /bin/sleep 2 &"));
    assert!(lines[1].starts_with("[1] ("));
    assert!(lines[1].ends_with(") Running /bin/sleep 2 &"));
}

#[test]
fn bg_and_fg_argument_errors_do_not_stop_the_shell() {
    let output = run_script(&["fg 9999", "bg", "fg %7", "bg x", "quit"]);
    assert!(output.status.success());
    assert_eq!(
        stdout_of(&output),
        "(9999): No such process\n\
         bg command requires PID or %jobid argument\n\
         %7: No such job\n\
         bg: argument must be a PID or %jobid\n"
    );
}

#[test]
fn interrupt_is_forwarded_to_the_foreground_job() {
    let (output, elapsed) = signal_foreground("/bin/sleep 5", Signal::SIGINT, &["jobs", "quit"]);
    let stdout = stdout_of(&output);
    assert!(output.status.success());
    assert!(elapsed < Duration::from_secs(4), "job outlived the interrupt");
    assert!(stdout.contains("terminated by signal 2"), "unexpected output: {stdout}");
    assert!(!stdout.contains("Running"));
}

#[test]
fn stop_is_forwarded_and_bg_resumes_the_job() {
    let (output, _) = signal_foreground(
        "/bin/sleep 2",
        Signal::SIGTSTP,
        &["jobs", "bg %1", "jobs", "quit"],
    );
    let stdout = stdout_of(&output);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 4, "unexpected output: {stdout}");
    assert!(lines[0].starts_with("Job [1] ("));
    assert!(lines[0].ends_with(") stopped by signal 20"));
    assert!(lines[1].ends_with(") Stopped /bin/sleep 2"));
    assert!(lines[2].ends_with(")  /bin/sleep 2"));
    assert!(lines[3].ends_with(") Running /bin/sleep 2"));
}

#[test]
fn interrupt_reaches_the_whole_process_group() {
    let (output, elapsed) = signal_foreground(
        "/bin/sh -c '/bin/sleep 5; /bin/echo survived'",
        Signal::SIGINT,
        &["quit"],
    );
    let stdout = stdout_of(&output);
    assert!(elapsed < Duration::from_secs(4));
    assert!(stdout.contains("terminated by signal 2"), "unexpected output: {stdout}");
    assert!(!stdout.contains("survived"));
}

#[test]
fn fg_on_a_stopped_job_holds_the_prompt_until_it_exits() {
    let mut shell = spawn_shell(&["-p"]);
    let shell_pid = Pid::from_raw(shell.id() as i32);
    let mut stdin = shell.stdin.take().unwrap();
    let stdout = BufReader::new(shell.stdout.take().unwrap());

    let started = Instant::now();
    send(&mut stdin, "/bin/sleep 2");
    thread::sleep(Duration::from_millis(500));
    kill(shell_pid, Signal::SIGTSTP).unwrap();
    send(&mut stdin, "fg %1");
    send(&mut stdin, "/bin/echo after");
    send(&mut stdin, "jobs");
    send(&mut stdin, "quit");
    drop(stdin);

    let mut lines = Vec::new();
    let mut after_at = None;
    for line in stdout.lines() {
        let line = line.unwrap();
        if line == "after" {
            after_at = Some(started.elapsed());
        }
        lines.push(line);
    }
    assert!(shell.wait().unwrap().success());

    assert_eq!(lines.len(), 2, "unexpected output: {lines:?}");
    assert!(lines[0].ends_with(") stopped by signal 20"));
    assert_eq!(lines[1], "after");
    let after_at = after_at.unwrap();
    assert!(
        after_at >= Duration::from_millis(1800),
        "prompt came back after {after_at:?}"
    );
}

#[test]
fn interrupt_during_fg_kills_the_resumed_background_job() {
    let (output, elapsed) = signal_during(
        &["/bin/sleep 5 &", "fg %1"],
        Signal::SIGINT,
        &["jobs", "quit"],
    );
    let stdout = stdout_of(&output);
    let lines: Vec<&str> = stdout.lines().collect();
    assert!(output.status.success());
    assert!(elapsed < Duration::from_secs(4), "job outlived the interrupt");
    assert_eq!(lines.len(), 2, "unexpected output: {stdout}");
    assert!(lines[0].ends_with(") /bin/sleep 5 &"));
    assert!(lines[1].starts_with("Job [1] ("));
    assert!(lines[1].ends_with(") terminated by signal 2"));
}

#[test]
fn full_job_table_refuses_the_launch_and_keeps_running() {
    let mut script = vec!["/bin/sleep 3 &"; 17];
    script.extend(["jobs", "/bin/echo still here", "quit"]);
    let output = run_script(&script);
    let stdout = stdout_of(&output);

    assert!(output.status.success());
    assert_eq!(stdout.matches("Tried to create too many jobs\n").count(), 1);
    assert_eq!(stdout.matches(") Running /bin/sleep 3 &").count(), 16);
    assert!(stdout.contains("[16] ("));
    assert!(!stdout.contains("[17] ("));
    assert!(stdout.ends_with("still here\n"), "unexpected output: {stdout}");
}

#[test]
fn sigquit_terminates_the_shell() {
    let mut shell = spawn_shell(&["-p"]);
    let shell_pid = Pid::from_raw(shell.id() as i32);
    let mut stdin = shell.stdin.take().unwrap();
    let mut stdout = BufReader::new(shell.stdout.take().unwrap());

    // Handlers are in place once the shell has run a command.
    send(&mut stdin, "/bin/echo ready");
    let mut line = String::new();
    stdout.read_line(&mut line).unwrap();
    assert_eq!(line, "ready\n");

    kill(shell_pid, Signal::SIGQUIT).unwrap();
    let mut rest = String::new();
    for line in stdout.lines() {
        rest.push_str(&line.unwrap());
        rest.push('\n');
    }
    let status = shell.wait().unwrap();
    drop(stdin);

    assert_eq!(status.code(), Some(1));
    assert_eq!(rest, "Terminating after receipt of SIGQUIT signal\n");
}
