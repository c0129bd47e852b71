use bollard::container::LogOutput;
use bollard::exec::{CreateExecOptions, StartExecResults};
use futures::StreamExt;
use std::time::Duration;
use crate::errors::V2rError;
use crate::utils::preview_command;
use super::manager::DockerRuntime;
use super::runtime::ExecOutput;
use tracing::debug;

/// Exit status can lag the end of the output stream by a few milliseconds.
const EXIT_CODE_POLLS: usize = 20;
const EXIT_CODE_POLL_INTERVAL: Duration = Duration::from_millis(50);

impl DockerRuntime {
    /// Run a command in the container and wait for it to finish.
    /// stdout and stderr are demultiplexed from the attached stream.
    pub async fn exec_command(
        &self,
        id: &str,
        cmd: &[String],
        workdir: Option<&str>,
    ) -> Result<ExecOutput, V2rError> {
        debug!(command = %preview_command(&cmd.join(" ")), "Executing in container");

        let exec = self.docker().create_exec(
            id,
            CreateExecOptions {
                cmd: Some(cmd.to_vec()),
                attach_stdout: Some(true),
                attach_stderr: Some(true),
                working_dir: workdir.map(str::to_string),
                ..Default::default()
            },
        ).await
        .map_err(|e| V2rError::Container(format!("Failed to create exec: {}", e)))?;

        let (stdout, stderr) = self.collect_exec_output(&exec.id).await
            .map_err(|e| V2rError::Container(format!("Exec failed: {}", e)))?;

        let exit_code = self.wait_exit_code(&exec.id).await?;

        Ok(ExecOutput { exit_code, stdout, stderr })
    }

    async fn collect_exec_output(&self, exec_id: &str) -> Result<(String, String), bollard::errors::Error> {
        let start_result = self.docker().start_exec(exec_id, None).await?;

        let mut stdout = String::new();
        let mut stderr = String::new();

        if let StartExecResults::Attached { mut output, .. } = start_result {
            while let Some(msg) = output.next().await {
                match msg {
                    Ok(LogOutput::StdOut { message }) | Ok(LogOutput::Console { message }) => {
                        stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                    Ok(LogOutput::StdErr { message }) => {
                        stderr.push_str(&String::from_utf8_lossy(&message));
                    }
                    Ok(LogOutput::StdIn { .. }) => {}
                    Err(e) => {
                        stderr.push_str(&format!("\n[exec error: {}]", e));
                        break;
                    }
                }
            }
        }

        Ok((stdout, stderr))
    }

    async fn wait_exit_code(&self, exec_id: &str) -> Result<i64, V2rError> {
        for _ in 0..EXIT_CODE_POLLS {
            let inspect = self.docker().inspect_exec(exec_id).await
                .map_err(|e| V2rError::Container(format!("Failed to inspect exec: {}", e)))?;
            if inspect.running != Some(true) {
                if let Some(code) = inspect.exit_code {
                    return Ok(code);
                }
            }
            tokio::time::sleep(EXIT_CODE_POLL_INTERVAL).await;
        }
        Err(V2rError::Container(format!("Exec {} did not report an exit code", exec_id)))
    }
}
