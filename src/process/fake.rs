//! Recording process backend for tests
//!
//! Replays scripted outcomes keyed by argv prefix and records every
//! invocation in call order. Unscripted commands succeed with empty output.

#![allow(clippy::unwrap_used)] // Test helper can use unwrap

use super::{Invocation, ProcessBackend, ProcessError, RunResult};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// Program followed by the real (unredacted) argument values
    pub argv: Vec<String>,
    /// Command line as the runner would log it
    pub display: String,
    pub stdin: Option<String>,
}

impl RecordedCall {
    pub fn starts_with(&self, prefix: &[&str]) -> bool {
        prefix.len() <= self.argv.len() && prefix.iter().zip(&self.argv).all(|(p, a)| p == a)
    }
}

#[derive(Debug, Clone)]
enum Outcome {
    Exit { code: i32, stdout: String },
    SpawnFailure,
}

#[derive(Debug)]
struct Rule {
    prefix: Vec<String>,
    /// The last outcome repeats forever
    script: VecDeque<Outcome>,
}

#[derive(Debug, Default)]
pub struct FakeBackend {
    calls: Mutex<Vec<RecordedCall>>,
    rules: Mutex<Vec<Rule>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every invocation starting with `prefix` exits with `code`
    pub fn respond(&self, prefix: &[&str], code: i32, stdout: &str) {
        self.respond_sequence(prefix, &[(code, stdout)]);
    }

    /// Successive invocations starting with `prefix` get these outcomes in
    /// order; the last one repeats
    pub fn respond_sequence(&self, prefix: &[&str], outcomes: &[(i32, &str)]) {
        let script = outcomes
            .iter()
            .map(|(code, stdout)| Outcome::Exit {
                code: *code,
                stdout: stdout.to_string(),
            })
            .collect();
        self.add_rule(prefix, script);
    }

    /// Invocations starting with `prefix` fail as if the program is missing
    pub fn fail_to_spawn(&self, prefix: &[&str]) {
        self.add_rule(prefix, VecDeque::from([Outcome::SpawnFailure]));
    }

    fn add_rule(&self, prefix: &[&str], script: VecDeque<Outcome>) {
        self.rules.lock().unwrap().push(Rule {
            prefix: prefix.iter().map(|s| s.to_string()).collect(),
            script,
        });
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Indexes of recorded calls whose argv starts with `prefix`
    pub fn positions(&self, prefix: &[&str]) -> Vec<usize> {
        self.calls()
            .iter()
            .enumerate()
            .filter(|(_, call)| call.starts_with(prefix))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn count(&self, prefix: &[&str]) -> usize {
        self.positions(prefix).len()
    }

    pub fn was_called(&self, prefix: &[&str]) -> bool {
        self.count(prefix) > 0
    }

    fn next_outcome(&self, argv: &[String]) -> Outcome {
        let mut rules = self.rules.lock().unwrap();
        // Longest matching prefix wins; among equals, the latest rule
        let rule = rules
            .iter_mut()
            .filter(|rule| {
                rule.prefix.len() <= argv.len()
                    && rule.prefix.iter().zip(argv).all(|(p, a)| p == a)
            })
            .max_by_key(|rule| rule.prefix.len());

        match rule {
            Some(rule) if rule.script.len() > 1 => rule.script.pop_front().unwrap(),
            Some(rule) => rule.script.front().cloned().unwrap(),
            None => Outcome::Exit {
                code: 0,
                stdout: String::new(),
            },
        }
    }
}

#[async_trait]
impl ProcessBackend for FakeBackend {
    async fn execute(&self, invocation: &Invocation) -> Result<RunResult, ProcessError> {
        let argv: Vec<String> = std::iter::once(invocation.program().to_string())
            .chain(invocation.arg_list().iter().map(|a| a.value().to_string()))
            .collect();

        let outcome = self.next_outcome(&argv);

        self.calls.lock().unwrap().push(RecordedCall {
            argv,
            display: invocation.display(),
            stdin: invocation.stdin_input().map(str::to_string),
        });

        match outcome {
            Outcome::Exit { code, stdout } => Ok(RunResult {
                exit_code: code,
                stdout: invocation.captures_output().then_some(stdout),
                stderr: invocation.captures_output().then(String::new),
            }),
            Outcome::SpawnFailure => Err(ProcessError::Spawn {
                command: invocation.display(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "program not found"),
            }),
        }
    }
}
