#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use v2r::config::{EvidenceConfig, ReproductionConfig, V2rConfig};
use v2r::container::memory::{ExecRequest, MemoryRuntime};
use v2r::container::ExecOutput;

/// Config writing evidence under `dir`, with no dependency preparation.
pub fn test_config(dir: &Path) -> V2rConfig {
    V2rConfig {
        evidence: Some(EvidenceConfig {
            directory: Some(dir.display().to_string()),
            ..Default::default()
        }),
        reproduction: Some(ReproductionConfig {
            dependencies: Some(Vec::new()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Like [`test_config`], with dependency preparation enabled.
pub fn config_with_dependencies(dir: &Path, dependencies: &[&str]) -> V2rConfig {
    let mut config = test_config(dir);
    config.reproduction = Some(ReproductionConfig {
        dependencies: Some(dependencies.iter().map(|d| d.to_string()).collect()),
        ..Default::default()
    });
    config
}

/// Crude stand-in for running a PoC: `print('...')` calls become stdout,
/// `sys.exit(N)` sets the exit code, `raise` fails with a traceback and a
/// mention of `pwned` drops `/tmp/pwned`.
fn run_script(source: &str, req: &mut ExecRequest<'_>) -> ExecOutput {
    if source.contains("raise") {
        return ExecOutput {
            exit_code: 1,
            stdout: String::new(),
            stderr: "Traceback (most recent call last):\nRuntimeError".into(),
        };
    }

    let mut stdout = String::new();
    let mut rest = source;
    while let Some(start) = rest.find("print('") {
        let after = &rest[start + 7..];
        let Some(end) = after.find("')") else { break };
        stdout.push_str(&after[..end]);
        stdout.push('\n');
        rest = &after[end..];
    }

    let exit_code = source
        .find("sys.exit(")
        .and_then(|i| source[i + 9..].split(')').next())
        .and_then(|code| code.trim().parse().ok())
        .unwrap_or(0);

    if source.contains("pwned") {
        req.files.insert("/tmp/pwned".into(), b"owned".to_vec());
    }

    ExecOutput { exit_code, stdout, stderr: String::new() }
}

/// Exec handler for a python image with strace installed and no tcpdump.
pub fn poc_handler(req: &mut ExecRequest<'_>) -> ExecOutput {
    let script = req.script();

    if script.contains("strace") {
        req.files.insert("/evidence/syscalls.log".into(), b"execve(\"/usr/bin/python3\")\n".to_vec());
        return ExecOutput::default();
    }
    if script.contains("tcpdump") {
        req.files.insert("/evidence/network.pcap".into(), b"tcpdump not available\n".to_vec());
        return ExecOutput { exit_code: 127, ..Default::default() };
    }
    if script.starts_with("find ") {
        let listing: Vec<String> = req.files.keys()
            .filter(|p| p.starts_with("/tmp/") || p.starts_with("/var/tmp/") || p.starts_with("/root/"))
            .cloned()
            .collect();
        return ExecOutput { exit_code: 0, stdout: listing.join("\n"), stderr: String::new() };
    }
    if let Some(path) = script.strip_prefix("python3 ") {
        return match req.file_text(path.trim()) {
            Some(source) => run_script(&source, req),
            None => ExecOutput {
                exit_code: 2,
                stdout: String::new(),
                stderr: format!("python3: can't open file '{}'", path.trim()),
            },
        };
    }
    ExecOutput::default()
}

pub fn poc_runtime() -> MemoryRuntime {
    MemoryRuntime::new().with_exec_handler(poc_handler)
}

pub fn shared(runtime: MemoryRuntime) -> Arc<MemoryRuntime> {
    Arc::new(runtime)
}
