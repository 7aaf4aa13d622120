// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! A configurable fake phpstan for testing.
//!
//! Invoked with the real phpstan argv (`analyse --level=... <target>`);
//! control flags prefixed `--mockstan-` are smuggled in through the
//! pass-through options and scanned out of the interleaved argv by hand,
//! since the surrounding arguments belong to the phpstan CLI surface.
//! Output goes to stdout in phpstan's raw format. No tokio — plain
//! blocking I/O.

#![allow(clippy::print_stdout, reason = "Emulates phpstan's stdout output")]
#![allow(clippy::print_stderr, reason = "Emulates phpstan's stderr output")]

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Control flags extracted from argv.
#[derive(Debug, Default)]
struct Controls {
    /// Append a JSON line per invocation to this file.
    log: Option<PathBuf>,
    /// Sleep this long before producing output.
    sleep_ms: u64,
    /// `SUBSTR:MS` — sleep only when the target path contains SUBSTR.
    sleep_if: Option<(String, u64)>,
    /// Exit code override for the default behavior.
    exit: Option<i32>,
    /// Print this file's content (with `{target}` substituted) as stdout.
    stdout_file: Option<PathBuf>,
    /// Emit one finding per line of the target, echoing its content.
    echo: bool,
    /// Invocation counter file, used to index into `script`.
    counter: Option<PathBuf>,
    /// Comma-separated per-invocation behaviors: `findings`, `clean`,
    /// or `fatal:<code>`. The last entry repeats.
    script: Option<String>,
}

/// Everything that was not a control flag. The final entry is the
/// analysis target, matching phpstan's CLI contract.
#[derive(Debug, Default)]
struct Passthrough {
    args: Vec<String>,
}

impl Passthrough {
    fn target(&self) -> String {
        self.args
            .iter()
            .rev()
            .find(|a| !a.starts_with('-'))
            .cloned()
            .unwrap_or_default()
    }
}

fn parse_argv(argv: &[String]) -> (Controls, Passthrough) {
    let mut controls = Controls::default();
    let mut passthrough = Passthrough::default();

    let mut iter = argv.iter().peekable();
    while let Some(arg) = iter.next() {
        let (flag, inline_value) = match arg.split_once('=') {
            Some((f, v)) => (f, Some(v.to_string())),
            None => (arg.as_str(), None),
        };

        if !flag.starts_with("--mockstan-") {
            passthrough.args.push(arg.clone());
            continue;
        }

        let mut value = || {
            inline_value
                .clone()
                .or_else(|| iter.peek().map(|v| (*v).to_string()))
        };

        match flag {
            "--mockstan-log" => controls.log = value().map(PathBuf::from),
            "--mockstan-sleep-ms" => {
                controls.sleep_ms = value().and_then(|v| v.parse().ok()).unwrap_or(0);
            }
            "--mockstan-sleep-if" => {
                controls.sleep_if = value().and_then(|v| {
                    let (substr, ms) = v.split_once(':')?;
                    Some((substr.to_string(), ms.parse().ok()?))
                });
            }
            "--mockstan-exit" => controls.exit = value().and_then(|v| v.parse().ok()),
            "--mockstan-stdout-file" => controls.stdout_file = value().map(PathBuf::from),
            "--mockstan-echo" => controls.echo = true,
            "--mockstan-counter" => controls.counter = value().map(PathBuf::from),
            "--mockstan-script" => controls.script = value(),
            _ => {}
        }

        // Consume the separate value token when it was not inline
        if flag != "--mockstan-echo" && inline_value.is_none() {
            iter.next();
        }
    }

    (controls, passthrough)
}

fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

/// Reads and increments the invocation counter file.
fn bump_counter(path: &Path) -> usize {
    let current: usize = std::fs::read_to_string(path)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0);
    let _ = std::fs::write(path, (current + 1).to_string());
    current
}

/// Runs one scripted behavior. Returns the exit code.
fn run_script_entry(entry: &str, target: &str) -> i32 {
    if let Some(code) = entry.strip_prefix("fatal:") {
        println!("Fatal error: mockstan scripted failure");
        return code.parse().unwrap_or(255);
    }
    match entry {
        "clean" => 0,
        _ => {
            println!("{target}:3: mockstan scripted finding");
            1
        }
    }
}

fn main() {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let (controls, passthrough) = parse_argv(&argv);
    let target = passthrough.target();

    let start_ms = now_ms();

    if controls.sleep_ms > 0 {
        std::thread::sleep(Duration::from_millis(controls.sleep_ms));
    }
    if let Some((substr, ms)) = &controls.sleep_if
        && target.contains(substr.as_str())
    {
        std::thread::sleep(Duration::from_millis(*ms));
    }

    let exit_code = if let (Some(counter), Some(script)) = (&controls.counter, &controls.script) {
        let index = bump_counter(counter);
        let entries: Vec<&str> = script.split(',').collect();
        let entry = entries
            .get(index)
            .or_else(|| entries.last())
            .copied()
            .unwrap_or("findings");
        run_script_entry(entry, &target)
    } else if let Some(file) = &controls.stdout_file {
        let content = std::fs::read_to_string(file).unwrap_or_default();
        print!("{}", content.replace("{target}", &target));
        controls.exit.unwrap_or(1)
    } else if controls.echo {
        // One finding per line, carrying the analyzed content so tests
        // can verify which bytes were actually handed to the analyzer.
        let content = std::fs::read_to_string(&target).unwrap_or_default();
        for (idx, line) in content.lines().enumerate() {
            println!("{target}:{}: mockstan saw: {line}", idx + 1);
        }
        controls.exit.unwrap_or(1)
    } else if let Some(code) = controls.exit {
        // Bare exit override: no output, just the code
        code
    } else {
        println!("{target}:3: mockstan default finding");
        1
    };

    let end_ms = now_ms();

    if let Some(log) = &controls.log
        && let Ok(mut file) = OpenOptions::new().create(true).append(true).open(log)
    {
        let record = serde_json::json!({
            "argv": argv,
            "target": target,
            "start_ms": start_ms,
            "end_ms": end_ms,
        });
        let _ = writeln!(file, "{record}");
    }

    std::process::exit(exit_code);
}
