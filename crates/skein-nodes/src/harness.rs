//! Subprocess script harness
//!
//! Runs user scripts in a child process:
//!
//! 1. Write the input data to a temp JSON file
//! 2. Wrap the user's code in a harness (error catching, result
//!    serialisation) and write it to a second temp file
//! 3. Run the interpreter, capture stdout as JSON
//! 4. Kill the process if the timeout expires
//!
//! JavaScript runs under `node`, Python under `python3`. The wrapped script
//! prints a single JSON object `{"success": ..., "output"|"error": ...}` to
//! stdout.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use skein_engine::{ScriptHarness, ScriptOutcome};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ProcessScriptHarness {
    timeout: Duration,
}

impl ProcessScriptHarness {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn run_script(&self, extension: &str, program: &str, script: String, input: &Value) -> ScriptOutcome {
        let dir = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(err) => return ScriptOutcome::failed(format!("Failed to create temp dir: {err}")),
        };
        let input_path = dir.path().join("input.json");
        let script_path = dir.path().join(format!("script.{extension}"));

        let input_json = match serde_json::to_vec(input) {
            Ok(bytes) => bytes,
            Err(err) => return ScriptOutcome::failed(format!("Failed to serialise script input: {err}")),
        };
        if let Err(err) = tokio::fs::write(&input_path, input_json).await {
            return ScriptOutcome::failed(format!("Failed to write script input: {err}"));
        }
        if let Err(err) = tokio::fs::write(&script_path, script).await {
            return ScriptOutcome::failed(format!("Failed to write script: {err}"));
        }

        let mut child = match Command::new(program)
            .arg(&script_path)
            .arg(&input_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(err) => {
                return ScriptOutcome::failed(format!("Failed to start {program}: {err}"));
            }
        };

        let mut stdout_pipe = child.stdout.take();
        let wait = async {
            let mut stdout = String::new();
            if let Some(pipe) = stdout_pipe.as_mut() {
                pipe.read_to_string(&mut stdout).await?;
            }
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((stdout, status))
        };

        match tokio::time::timeout(self.timeout, wait).await {
            Ok(Ok((stdout, _status))) => parse_outcome(&stdout),
            Ok(Err(err)) => ScriptOutcome::failed(format!("Script process failed: {err}")),
            Err(_) => {
                if let Err(err) = child.kill().await {
                    log::warn!("Failed to kill timed-out script process: {err}");
                }
                ScriptOutcome::failed(format!(
                    "Script timed out after {} ms",
                    self.timeout.as_millis()
                ))
            }
        }
    }
}

impl Default for ProcessScriptHarness {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

#[async_trait]
impl ScriptHarness for ProcessScriptHarness {
    async fn run(&self, language: &str, code: &str, input: &Value) -> ScriptOutcome {
        match language.to_ascii_lowercase().as_str() {
            "javascript" => self.run_script("js", "node", js_wrapper(code), input).await,
            "python" => self.run_script("py", "python3", py_wrapper(code), input).await,
            other => ScriptOutcome::failed(format!(
                "Unsupported language: {other}. Use 'javascript' or 'python'."
            )),
        }
    }
}

fn js_wrapper(user_code: &str) -> String {
    format!(
        r#"const fs    = require('fs');
const input = JSON.parse(fs.readFileSync(process.argv[2], 'utf8'));

try {{
    const result = (function(input) {{
        {user_code}
    }})(input);

    process.stdout.write(JSON.stringify({{ success: true, output: result ?? null }}));
}} catch (e) {{
    process.stdout.write(JSON.stringify({{ success: false, error: e.message }}));
}}
"#
    )
}

fn py_wrapper(user_code: &str) -> String {
    let indented: String = user_code
        .lines()
        .map(|line| format!("    {line}\n"))
        .collect();
    format!(
        r#"import json, sys

with open(sys.argv[1]) as f:
    input = json.load(f)

try:
{indented}    print(json.dumps({{"success": True, "output": result}}))
except Exception as e:
    print(json.dumps({{"success": False, "error": str(e)}}))
"#
    )
}

/// The wrapped script prints `{"success": ..., "output"|"error": ...}`.
fn parse_outcome(stdout: &str) -> ScriptOutcome {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return ScriptOutcome::failed("Script produced no output");
    }
    let parsed: Value = match serde_json::from_str(trimmed) {
        Ok(value) => value,
        Err(err) => {
            return ScriptOutcome::failed(format!("Script produced invalid output: {err}"));
        }
    };
    if parsed.get("success").and_then(|v| v.as_bool()).unwrap_or(false) {
        ScriptOutcome::Completed(parsed.get("output").cloned().unwrap_or(Value::Null))
    } else {
        let error = parsed
            .get("error")
            .and_then(|v| v.as_str())
            .unwrap_or("Script failed")
            .to_string();
        ScriptOutcome::Failed(error)
    }
}
