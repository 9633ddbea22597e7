//! Remote code execution through a Piston sandbox.
//!
//! | Language | Piston runtime | Version |
//! |----------|----------------|---------|
//! | `python` | `python` | 3.10 |
//! | `java` | `java` | 15.0 |
//! | `cpp` | `cpp` | 10.2 |
//! | `c` | `c` | 10.2 |
//!
//! Program failures (compile errors, non-zero exits, timeouts) come back as
//! [`ExecutionOutcome::error`] for that one run. Sandbox failures (unreachable
//! host, non-2xx reply, undecodable body) are an `Err`, which the coding
//! engine reports as an upstream failure without consuming the session.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};

use signum_core::coding::{CodeExecutor, ExecutionOutcome};

use crate::config::ExecutionConfig;

pub const SUPPORTED_LANGUAGES: &[(&str, &str, &str)] = &[
    ("python", "python", "3.10"),
    ("java", "java", "15.0"),
    ("cpp", "cpp", "10.2"),
    ("c", "c", "10.2"),
];

fn runtime_for(language: &str) -> Option<(&'static str, &'static str)> {
    SUPPORTED_LANGUAGES
        .iter()
        .find(|(name, _, _)| *name == language)
        .map(|(_, runtime, version)| (*runtime, *version))
}

#[derive(Debug, Default, Deserialize)]
struct PistonStage {
    #[serde(default)]
    stdout: String,
    #[serde(default)]
    stderr: String,
    #[serde(default)]
    output: String,
    code: Option<i64>,
    signal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PistonReply {
    compile: Option<PistonStage>,
    #[serde(default)]
    run: PistonStage,
}

fn first_non_empty<'a>(a: &'a str, b: &'a str, fallback: &'a str) -> &'a str {
    if !a.is_empty() {
        a
    } else if !b.is_empty() {
        b
    } else {
        fallback
    }
}

/// Map a Piston reply to an outcome.
fn interpret(reply: PistonReply, execution_time: f64) -> ExecutionOutcome {
    let failed = |error: String| ExecutionOutcome {
        output: String::new(),
        execution_time,
        error: Some(error),
    };

    if let Some(compile) = &reply.compile {
        if compile.code.is_some_and(|c| c != 0) {
            return failed(format!(
                "Compilation Error: {}",
                first_non_empty(&compile.stderr, &compile.output, "Unknown error")
            ));
        }
    }

    let run = &reply.run;
    if run.code != Some(0) && run.signal.is_none() {
        return failed(format!(
            "Runtime Error: {}",
            first_non_empty(&run.stderr, &run.output, "Unknown error")
        ));
    }

    let output = first_non_empty(&run.stdout, &run.output, "").to_string();
    if !run.stderr.is_empty() && output.is_empty() {
        return failed(format!("Error: {}", run.stderr));
    }

    ExecutionOutcome {
        output,
        execution_time,
        error: None,
    }
}

pub struct PistonExecutor {
    url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl PistonExecutor {
    pub fn new(config: &ExecutionConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: config.url.clone(),
            timeout,
            client,
        })
    }
}

#[async_trait]
impl CodeExecutor for PistonExecutor {
    fn supports(&self, language: &str) -> bool {
        runtime_for(language).is_some()
    }

    async fn execute(&self, code: &str, language: &str, stdin: &str) -> Result<ExecutionOutcome> {
        let Some((runtime, version)) = runtime_for(language) else {
            return Ok(ExecutionOutcome {
                error: Some(format!("Unsupported language: {}", language)),
                ..ExecutionOutcome::default()
            });
        };

        let payload = serde_json::json!({
            "language": runtime,
            "version": version,
            "files": [{ "content": code }],
            "stdin": stdin,
        });

        let started = Instant::now();
        let resp = self.client.post(&self.url).json(&payload).send().await;
        let elapsed = started.elapsed().as_secs_f64();

        let response = match resp {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                return Ok(ExecutionOutcome {
                    output: String::new(),
                    execution_time: self.timeout.as_secs_f64(),
                    error: Some("Execution Timeout".to_string()),
                });
            }
            Err(e) if e.is_connect() => {
                anyhow::bail!("code execution service unreachable at {}: {}", self.url, e);
            }
            Err(e) => anyhow::bail!("code execution request failed: {}", e),
        };

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("code execution service returned {}", status.as_u16());
        }

        let reply: PistonReply = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("undecodable code execution reply: {}", e))?;

        Ok(interpret(reply, elapsed))
    }
}
