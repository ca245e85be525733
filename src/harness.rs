//! In-sandbox build and run harness.
//!
//! This code runs inside the sandbox image as the `judge-harness` binary.
//! It reads its contract from the environment (`WORKDIR`, `CPU_LIMIT_TIME`,
//! `MEM_LIMIT_KB`), drives the per-language command matrix, and emits exactly
//! one JSON object on stdout that the orchestrator outside scrapes back out.
//!
//! Every unexpected failure (missing source, unspawnable command, garbled
//! resource line) degrades to an `IE` report rather than a crash: the report
//! line is the only channel back to the dispatcher.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::languages;
use crate::verdict::Verdict;

/// Trailing line the resource supervisor (`/usr/bin/time`) prints after the
/// child exits. `%U`/`%S` are CPU seconds, `%M` is peak RSS in kB.
pub const TIME_FORMAT: &str = r#"{"user":%U,"system":%S,"memory":%M}"#;

const DEFAULT_CPU_LIMIT_TIME: f64 = 2.0;
const DEFAULT_MEM_LIMIT_KB: u64 = 256 * 1024;

/// Resource thresholds applied to each test case.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Combined user+system CPU seconds allowed per case.
    pub cpu_seconds: f64,
    /// Peak resident memory allowed per case, in kB.
    pub memory_kb: u64,
}

impl Limits {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// `from_env` with the variable source injected, so the parsing rules
    /// are testable without touching the process environment.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parse<T: FromStr>(value: Option<String>) -> Option<T> {
            value.and_then(|v| v.parse().ok())
        }
        Self {
            cpu_seconds: parse(lookup("CPU_LIMIT_TIME")).unwrap_or(DEFAULT_CPU_LIMIT_TIME),
            memory_kb: parse(lookup("MEM_LIMIT_KB")).unwrap_or(DEFAULT_MEM_LIMIT_KB),
        }
    }
}

/// Sandbox root, from `WORKDIR` (falls back to the current directory).
pub fn workdir() -> PathBuf {
    std::env::var_os("WORKDIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

#[derive(Debug, Serialize)]
pub struct BuildReport {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub status: String,
    pub passed: u64,
}

impl RunReport {
    fn internal_error(passed: u64) -> Self {
        Self {
            status: Verdict::InternalError.as_str().to_string(),
            passed,
        }
    }
}

/// Compiles (or syntax-checks) the submitted source.
///
/// The source must exist at `<root>/script/script`; the build command runs
/// with the script directory as its working directory. Exit 0 maps to `OK`,
/// nonzero to `CE`, anything unexpected to `IE`.
pub fn build(root: &Path, lang: &str) -> BuildReport {
    let status = match try_build(root, lang) {
        Ok(ok) => {
            if ok {
                "OK".to_string()
            } else {
                Verdict::CompileError.as_str().to_string()
            }
        }
        Err(e) => {
            log::error!("build failed before producing an exit code: {e:#}");
            Verdict::InternalError.as_str().to_string()
        }
    };
    BuildReport { status }
}

fn try_build(root: &Path, lang: &str) -> Result<bool> {
    let script_dir = root.join("script");
    let source = script_dir.join("script");
    if !source.is_file() {
        bail!("submitted source not found at {}", source.display());
    }

    let command = languages::build_command(lang, &script_dir);
    let status = Command::new("/bin/sh")
        .arg("-c")
        .arg(&command)
        .current_dir(&script_dir)
        .status()
        .with_context(|| format!("failed to spawn build command for {lang}"))?;

    Ok(status.success())
}

/// One test case: an input file and its expected-answer file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    pub input: PathBuf,
    pub answer: PathBuf,
}

/// Enumerates `*.q` files under `dir` paired with their `.ans` answers,
/// sorted lexically by basename.
///
/// Answers are not checked for existence here; a missing one surfaces as an
/// `IE` when its case is reached, so `passed` still reflects the cases that
/// ran before it.
pub fn collect_cases(dir: &Path) -> Result<Vec<TestCase>> {
    let mut inputs: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("cannot read question directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "q"))
        .collect();
    inputs.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    Ok(inputs
        .into_iter()
        .map(|input| {
            let answer = input.with_extension("ans");
            TestCase { input, answer }
        })
        .collect())
}

/// Measurement the resource supervisor reports for one child process.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ResourceUsage {
    pub user: f64,
    pub system: f64,
    pub memory: u64,
}

/// Extracts the authoritative resource line from the child's stderr.
///
/// The supervisor writes its line last, after the child exits, so the last
/// non-empty line wins over anything the child printed itself.
pub fn parse_resource_line(stderr: &str) -> Option<ResourceUsage> {
    let line = stderr.lines().rev().find(|l| !l.trim().is_empty())?;
    serde_json::from_str(line.trim()).ok()
}

/// Outcome of executing one test case's child process.
#[derive(Debug)]
pub struct CaseExecution {
    pub usage: ResourceUsage,
    pub exit_ok: bool,
    pub stdout: Vec<u8>,
}

/// Applies the per-case checks in their fixed order; `None` means the case
/// passed. The order is load-bearing: a case that both exceeds memory and
/// prints wrong output must yield MLE, not WA.
pub fn check_case(exec: &CaseExecution, answer: &[u8], limits: Limits) -> Option<Verdict> {
    if exec.usage.memory > limits.memory_kb {
        return Some(Verdict::MemoryLimitExceeded);
    }
    if exec.usage.user + exec.usage.system > limits.cpu_seconds {
        return Some(Verdict::TimeLimitExceeded);
    }
    if !exec.exit_ok {
        return Some(Verdict::RuntimeError);
    }
    if exec.stdout != answer {
        return Some(Verdict::WrongAnswer);
    }
    None
}

/// Drives the test loop over `cases`, short-circuiting on the first failing
/// check. `execute` is the seam to the real child-spawning executor.
pub fn run_cases(
    cases: &[TestCase],
    limits: Limits,
    mut execute: impl FnMut(&TestCase) -> Result<CaseExecution>,
) -> RunReport {
    let mut passed = 0;
    for case in cases {
        let exec = match execute(case) {
            Ok(exec) => exec,
            Err(e) => {
                log::error!("case {} failed to execute: {e:#}", case.input.display());
                return RunReport::internal_error(passed);
            }
        };
        let answer = match fs::read(&case.answer) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::error!("cannot read answer {}: {e}", case.answer.display());
                return RunReport::internal_error(passed);
            }
        };
        if let Some(verdict) = check_case(&exec, &answer, limits) {
            return RunReport {
                status: verdict.as_str().to_string(),
                passed,
            };
        }
        passed += 1;
    }

    // Zero cases also lands here: AC with passed = 0.
    RunReport {
        status: Verdict::Accepted.as_str().to_string(),
        passed,
    }
}

/// Executes all test cases for the mounted question and produces the final
/// run report.
pub fn run(root: &Path, lang: &str, limits: Limits) -> RunReport {
    let cases = match collect_cases(&root.join("question")) {
        Ok(cases) => cases,
        Err(e) => {
            log::error!("cannot enumerate test cases: {e:#}");
            return RunReport::internal_error(0);
        }
    };

    let script_dir = root.join("script");
    let command = languages::run_command(lang, &script_dir);
    run_cases(&cases, limits, |case| {
        execute_case(&command, &script_dir, case)
    })
}

/// Spawns one child under the resource supervisor, feeding the case input on
/// stdin and capturing stdout in full.
fn execute_case(command: &str, cwd: &Path, case: &TestCase) -> Result<CaseExecution> {
    let argv: Vec<&str> = command.split_whitespace().collect();
    if argv.is_empty() {
        bail!("empty run command");
    }

    let stdin = fs::File::open(&case.input)
        .with_context(|| format!("cannot open input {}", case.input.display()))?;

    let child = Command::new("/usr/bin/time")
        .arg("-f")
        .arg(TIME_FORMAT)
        .args(&argv)
        .current_dir(cwd)
        .stdin(Stdio::from(stdin))
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .context("failed to spawn resource supervisor")?;

    let output = child
        .wait_with_output()
        .context("failed to collect child output")?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    let usage = parse_resource_line(&stderr)
        .with_context(|| format!("no resource line in supervisor output: {stderr:?}"))?;

    // The supervisor reflects the child's failure in its own exit status.
    Ok(CaseExecution {
        usage,
        exit_ok: output.status.success(),
        stdout: output.stdout,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn limits() -> Limits {
        Limits {
            cpu_seconds: 2.0,
            memory_kb: 256 * 1024,
        }
    }

    fn passing_exec(stdout: &[u8]) -> CaseExecution {
        CaseExecution {
            usage: ResourceUsage {
                user: 0.1,
                system: 0.05,
                memory: 1024,
            },
            exit_ok: true,
            stdout: stdout.to_vec(),
        }
    }

    #[test]
    fn memory_check_precedes_everything() {
        let exec = CaseExecution {
            usage: ResourceUsage {
                user: 5.0,
                system: 1.0,
                memory: 512 * 1024,
            },
            exit_ok: false,
            stdout: b"wrong".to_vec(),
        };
        assert_eq!(
            check_case(&exec, b"right", limits()),
            Some(Verdict::MemoryLimitExceeded)
        );
    }

    #[test]
    fn cpu_check_precedes_exit_and_output() {
        let exec = CaseExecution {
            usage: ResourceUsage {
                user: 1.5,
                system: 0.8,
                memory: 1024,
            },
            exit_ok: false,
            stdout: b"wrong".to_vec(),
        };
        assert_eq!(
            check_case(&exec, b"right", limits()),
            Some(Verdict::TimeLimitExceeded)
        );
    }

    #[test]
    fn exit_code_check_precedes_output() {
        let mut exec = passing_exec(b"wrong");
        exec.exit_ok = false;
        assert_eq!(check_case(&exec, b"right", limits()), Some(Verdict::RuntimeError));
    }

    #[test]
    fn output_comparison_is_byte_exact() {
        let exec = passing_exec(b"42\n");
        assert_eq!(check_case(&exec, b"42\n", limits()), None);
        assert_eq!(
            check_case(&exec, b"42", limits()),
            Some(Verdict::WrongAnswer)
        );
    }

    #[test]
    fn resource_line_last_one_wins() {
        let stderr = "some program noise\n\
                      {\"user\":9.0,\"system\":9.0,\"memory\":999999}\n\
                      {\"user\":0.5,\"system\":0.25,\"memory\":2048}\n";
        let usage = parse_resource_line(stderr).unwrap();
        assert_eq!(usage.memory, 2048);
        assert_eq!(usage.user, 0.5);
    }

    #[test]
    fn resource_line_ignores_trailing_blank_lines() {
        let usage = parse_resource_line("{\"user\":0.0,\"system\":0.0,\"memory\":4}\n\n").unwrap();
        assert_eq!(usage.memory, 4);
    }

    #[test]
    fn garbled_resource_line_is_rejected() {
        assert!(parse_resource_line("").is_none());
        assert!(parse_resource_line("Command terminated by signal 9").is_none());
    }

    #[test]
    fn run_cases_short_circuits_on_first_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut cases = Vec::new();
        for i in 0..5 {
            let input = dir.path().join(format!("{i:02}.q"));
            let answer = dir.path().join(format!("{i:02}.ans"));
            fs::write(&input, format!("{i}\n")).unwrap();
            fs::write(&answer, b"ok\n").unwrap();
            cases.push(TestCase { input, answer });
        }

        let mut executed = 0;
        let report = run_cases(&cases, limits(), |_case| {
            executed += 1;
            // Case 2 (index 1) produces wrong output.
            let stdout: &[u8] = if executed == 2 { b"bad\n" } else { b"ok\n" };
            Ok(passing_exec(stdout))
        });

        assert_eq!(report.status, "WA");
        assert_eq!(report.passed, 1);
        assert_eq!(executed, 2);
    }

    #[test]
    fn run_cases_all_passing_counts_every_case() {
        let dir = tempfile::tempdir().unwrap();
        let mut cases = Vec::new();
        for i in 0..3 {
            let input = dir.path().join(format!("{i}.q"));
            let answer = dir.path().join(format!("{i}.ans"));
            fs::write(&input, b"in").unwrap();
            fs::write(&answer, b"ok").unwrap();
            cases.push(TestCase { input, answer });
        }

        let report = run_cases(&cases, limits(), |_case| Ok(passing_exec(b"ok")));
        assert_eq!(report.status, "AC");
        assert_eq!(report.passed, 3);
    }

    #[test]
    fn zero_cases_is_accepted_with_zero_passed() {
        let report = run_cases(&[], limits(), |_case| Ok(passing_exec(b"")));
        assert_eq!(report.status, "AC");
        assert_eq!(report.passed, 0);
    }

    #[test]
    fn executor_error_becomes_internal_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("0.q");
        let answer = dir.path().join("0.ans");
        fs::write(&input, b"in").unwrap();
        fs::write(&answer, b"ok").unwrap();
        let cases = vec![TestCase { input, answer }];

        let report = run_cases(&cases, limits(), |_case| anyhow::bail!("spawn failed"));
        assert_eq!(report.status, "IE");
        assert_eq!(report.passed, 0);
    }

    #[test]
    fn collect_cases_sorts_by_basename_and_pairs_answers() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["10.q", "02.q", "01.q"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        for name in ["10.ans", "02.ans", "01.ans", "unrelated.txt"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }

        let cases = collect_cases(dir.path()).unwrap();
        let names: Vec<_> = cases
            .iter()
            .map(|c| c.input.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["01.q", "02.q", "10.q"]);
        assert!(cases.iter().all(|c| c.answer.extension().unwrap() == "ans"));
    }

    #[test]
    fn missing_answer_surfaces_after_earlier_cases_ran() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("01.q"), b"").unwrap();
        fs::write(dir.path().join("01.ans"), b"ok").unwrap();
        fs::write(dir.path().join("02.q"), b"").unwrap();

        let cases = collect_cases(dir.path()).unwrap();
        assert_eq!(cases.len(), 2);

        let report = run_cases(&cases, limits(), |_case| Ok(passing_exec(b"ok")));
        assert_eq!(report.status, "IE");
        assert_eq!(report.passed, 1);
    }

    #[test]
    fn build_without_source_is_internal_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("script")).unwrap();
        let report = build(dir.path(), "c");
        assert_eq!(report.status, "IE");
    }

    #[test]
    fn limits_parse_from_environment_values() {
        let limits = Limits::from_lookup(|name| match name {
            "CPU_LIMIT_TIME" => Some("4.5".to_string()),
            "MEM_LIMIT_KB" => Some("1024".to_string()),
            _ => None,
        });
        assert_eq!(limits.cpu_seconds, 4.5);
        assert_eq!(limits.memory_kb, 1024);
    }

    #[test]
    fn absent_or_garbled_limits_fall_back_to_reference_values() {
        let absent = Limits::from_lookup(|_| None);
        assert_eq!(absent.cpu_seconds, 2.0);
        assert_eq!(absent.memory_kb, 262144);

        let garbled = Limits::from_lookup(|name| match name {
            "CPU_LIMIT_TIME" => Some("fast".to_string()),
            "MEM_LIMIT_KB" => Some("-1".to_string()),
            _ => None,
        });
        assert_eq!(garbled.cpu_seconds, 2.0);
        assert_eq!(garbled.memory_kb, 262144);
    }
}
