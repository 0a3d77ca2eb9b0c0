//! Compiled programs running with the input intercept library preloaded.
//!
//! Skipped when no `cc` is on the PATH or the library has not been built
//! (`cargo build -p ckernel-shim`).

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use ckernel_core::ipc::protocol::PRELOAD_ENV;
use ckernel_core::ipc::{CHANNEL_DISABLED, CHANNEL_ENV, count_ready};
use ckernel_core::settings::find_shim_library;
use ckernel_core::{
    BuildConfig, Cell, CellOutcome, Event, EventStream, InputSender, IpcChannel, Kernel,
    KernelSettings, Language, PromptState, StreamKind, TerminalStatus, WorkArea, event_channel,
    input_channel,
};
use tokio_util::sync::CancellationToken;

const ENTERING: Event = Event::Prompt {
    state: PromptState::Entering,
};
const LEAVING: Event = Event::Prompt {
    state: PromptState::Leaving,
};

fn toolchain() -> Option<PathBuf> {
    if which::which("cc").is_err() {
        eprintln!("Skipping: no C compiler available");
        return None;
    }
    let shim = find_shim_library();
    if shim.is_none() {
        eprintln!("Skipping: input intercept library not built");
    }
    shim
}

fn kernel(shim: PathBuf, scan_drain: bool) -> (Kernel, EventStream) {
    let settings = KernelSettings {
        cc: "cc".into(),
        shim_path: Some(shim),
        scan_drain,
        kill_grace: Duration::from_millis(200),
        ..KernelSettings::default()
    };
    let (sink, stream) = event_channel();
    let area = WorkArea::temporary().expect("working area");
    (Kernel::new(settings, area, sink), stream)
}

/// Answer prompts in order until the terminal event, returning every event.
async fn answer_prompts(
    mut events: EventStream,
    input: InputSender,
    answers: Vec<&'static str>,
) -> Vec<Event> {
    let mut answers = answers.into_iter();
    let mut seen = Vec::new();
    while let Some(event) = events.recv().await {
        if event == ENTERING
            && let Some(answer) = answers.next()
        {
            let _ = input.send(answer.to_string());
        }
        let done = matches!(event, Event::Terminal { .. });
        seen.push(event);
        if done {
            break;
        }
    }
    seen
}

fn stdout_of(events: &[Event]) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Output {
                stream: StreamKind::Stdout,
                bytes,
            } => Some(String::from_utf8_lossy(bytes).into_owned()),
            _ => None,
        })
        .collect()
}

async fn run_interactive(
    shim: PathBuf,
    scan_drain: bool,
    name: &str,
    source: &str,
    answers: Vec<&'static str>,
) -> (CellOutcome, Vec<Event>) {
    let (mut kernel, stream) = kernel(shim, scan_drain);
    let (input_tx, mut input_rx) = input_channel();
    let frontend = tokio::spawn(answer_prompts(stream, input_tx, answers));

    let cell = Cell::new(BuildConfig::new(name, Language::C, "cc"), source);
    let outcome = tokio::time::timeout(
        Duration::from_secs(30),
        kernel.execute_cell(&cell, &mut input_rx, &CancellationToken::new()),
    )
    .await
    .expect("program finished")
    .expect("cell ran");
    let events = frontend.await.unwrap();
    (outcome, events)
}

#[tokio::test]
async fn test_fgets_prompt_is_visible_before_input() {
    let Some(shim) = toolchain() else { return };

    let source = r#"#include <stdio.h>
int main(void) {
    char buf[64];
    printf("Enter a number: ");
    if (!fgets(buf, sizeof buf, stdin)) return 1;
    printf("got %s", buf);
    return 0;
}
"#;
    let (outcome, events) = run_interactive(shim, true, "ask", source, vec!["7"]).await;
    assert!(matches!(
        outcome,
        CellOutcome::Ran {
            status: TerminalStatus::Completed,
            ..
        }
    ));

    let entering = events.iter().position(|e| *e == ENTERING).expect("prompt");
    let prompt_text = events
        .iter()
        .position(|e| e.text().is_some_and(|t| t.contains("Enter a number")))
        .expect("prompt text");
    // Unbuffered stdout: the question is on screen before the prompt opens.
    assert!(prompt_text < entering);
    assert!(events.iter().position(|e| *e == LEAVING).unwrap() > entering);
    assert!(stdout_of(&events).ends_with("got 7\n"));
}

#[tokio::test]
async fn test_scanf_loop_prompts_each_time() {
    let Some(shim) = toolchain() else { return };

    let source = r#"#include <stdio.h>
int main(void) {
    int total = 0;
    for (int i = 0; i < 3; i++) {
        int n;
        if (scanf("%d", &n) != 1) return 1;
        total += n;
    }
    printf("total=%d\n", total);
    return 0;
}
"#;
    let (_, events) = run_interactive(shim, true, "sum", source, vec!["1", "2", "3"]).await;
    let prompts = events.iter().filter(|e| **e == ENTERING).count();
    assert_eq!(prompts, 3);
    assert_eq!(stdout_of(&events), "total=6\n");
}

#[tokio::test]
async fn test_scan_drain_discards_rest_of_line() {
    let Some(shim) = toolchain() else { return };

    let source = r#"#include <stdio.h>
int main(void) {
    int n;
    char rest[64];
    if (scanf("%d", &n) != 1) return 1;
    if (!fgets(rest, sizeof rest, stdin)) return 2;
    printf("n=%d rest=[%s]\n", n, rest);
    return 0;
}
"#;
    let (_, drained) =
        run_interactive(shim.clone(), true, "drain", source, vec!["5 extra", "next"]).await;
    assert_eq!(stdout_of(&drained), "n=5 rest=[next\n]\n");

    let (_, kept) = run_interactive(shim, false, "keep", source, vec!["5 extra", "next"]).await;
    assert_eq!(stdout_of(&kept), "n=5 rest=[ extra\n]\n");
}

/// Build a program that echoes every stdin line with a `<` prefix.
fn compile_echo(area: &WorkArea) -> PathBuf {
    let source = area.src_dir.join("echo.c");
    std::fs::write(
        &source,
        r#"#include <stdio.h>
int main(void) {
    char buf[64];
    while (fgets(buf, sizeof buf, stdin)) printf("<%s", buf);
    return 0;
}
"#,
    )
    .unwrap();
    let exe = area.bin_dir.join("echo");
    let status = Command::new("cc")
        .arg(&source)
        .arg("-o")
        .arg(&exe)
        .status()
        .unwrap();
    assert!(status.success());
    exe
}

#[tokio::test]
async fn test_pass_through_without_channel() {
    let Some(shim) = toolchain() else { return };

    let area = WorkArea::temporary().unwrap();
    let exe = compile_echo(&area);

    let run = |preload: bool| {
        let mut command = Command::new(&exe);
        command
            .env(CHANNEL_ENV, CHANNEL_DISABLED)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped());
        if preload {
            command.env(PRELOAD_ENV, &shim);
        }
        let mut child = command.spawn().unwrap();
        child
            .stdin
            .take()
            .unwrap()
            .write_all(b"a\nb\n")
            .unwrap();
        child.wait_with_output().unwrap()
    };

    let plain = run(false);
    let intercepted = run(true);
    assert_eq!(intercepted.stdout, plain.stdout);
    assert_eq!(intercepted.stdout, b"<a\n<b\n");
}

#[tokio::test]
async fn test_redirected_file_input_never_signals() {
    let Some(shim) = toolchain() else { return };

    let area = WorkArea::temporary().unwrap();
    let exe = compile_echo(&area);
    let input = area.root.join("input.txt");
    std::fs::write(&input, b"a\nb\n").unwrap();

    let mut channel = IpcChannel::create(&area.ipc_dir).expect("create channel");
    let output = Command::new(&exe)
        .env(CHANNEL_ENV, channel.path())
        .env(PRELOAD_ENV, &shim)
        .stdin(std::fs::File::open(&input).unwrap())
        .stdout(Stdio::piped())
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(output.stdout, b"<a\n<b\n");

    // Nothing was written, so the read only ends by timing out.
    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(Duration::from_millis(300), channel.recv(&mut buf)).await;
    assert!(read.is_err(), "file input rang the channel: {read:?}");

    // The same program reading from a pipe does ring it.
    let mut child = Command::new(&exe)
        .env(CHANNEL_ENV, channel.path())
        .env(PRELOAD_ENV, &shim)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"a\nb\n")
        .unwrap();
    assert!(child.wait_with_output().unwrap().status.success());

    let n = tokio::time::timeout(Duration::from_secs(5), channel.recv(&mut buf))
        .await
        .expect("pipe input rang the channel")
        .expect("recv");
    assert!(count_ready(&buf[..n]) >= 1);
}
