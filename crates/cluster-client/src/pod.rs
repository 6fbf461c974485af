//! Command execution inside pods
//!
//! Extends the pod client with `exec` over the attach/exec websocket
//! subresource, and a file copy built on top of it.

use crate::client::{KubeResourceClient, classify};
use crate::error::ClientError;
use crate::resource_trait::ResourceClient;
use k8s_openapi::api::core::v1::Pod;
use kube::api::AttachParams;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Command that writes stdin to `target` inside the container
pub fn copy_command(target: &str) -> Vec<String> {
    vec![
        "/bin/bash".to_string(),
        "-c".to_string(),
        format!("cp -f /dev/stdin {}", shell_quote(target)),
    ]
}

/// Single-quote `s` for a POSIX shell
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

impl KubeResourceClient<Pod> {
    /// Run `command` in `container` of `pod` and return what it wrote to stderr.
    ///
    /// `stdin` is streamed to the process and closed at EOF; the process'
    /// stdout is copied into `stdout`. A missing pod is `ClientError::NotFound`;
    /// a non-zero exit is `ClientError::Exec` carrying the captured stderr.
    pub async fn exec<I, O>(
        &self,
        pod: &str,
        container: &str,
        command: Vec<String>,
        stdin: Option<I>,
        stdout: Option<O>,
    ) -> Result<String, ClientError>
    where
        I: AsyncRead + Unpin + Send,
        O: AsyncWrite + Unpin + Send,
    {
        self.get(pod).await?;
        let target = format!("{}/{}", self.describe(pod), container);
        debug!("Exec in {}: {:?}", target, command);

        let params = AttachParams::default()
            .container(container)
            .stdin(stdin.is_some())
            .stdout(stdout.is_some())
            .stderr(true);
        let mut process = self
            .api()
            .exec(pod, command, &params)
            .await
            .map_err(|e| classify(e, &target))?;

        let status = process.take_status();
        let process_stdin = process.stdin();
        let process_stdout = process.stdout();
        let process_stderr = process.stderr();

        let feed_stdin = async move {
            if let (Some(mut source), Some(mut sink)) = (stdin, process_stdin) {
                tokio::io::copy(&mut source, &mut sink).await?;
                sink.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        };
        let drain_stdout = async move {
            if let (Some(mut source), Some(mut sink)) = (process_stdout, stdout) {
                tokio::io::copy(&mut source, &mut sink).await?;
                sink.flush().await?;
            }
            Ok::<(), std::io::Error>(())
        };
        let collect_stderr = async move {
            let mut buf = Vec::new();
            if let Some(mut source) = process_stderr {
                source.read_to_end(&mut buf).await?;
            }
            Ok::<Vec<u8>, std::io::Error>(buf)
        };

        let ((), (), stderr) = tokio::try_join!(feed_stdin, drain_stdout, collect_stderr)
            .map_err(|e| ClientError::Exec(format!("{target}: stream failed: {e}")))?;
        let stderr = String::from_utf8_lossy(&stderr).into_owned();

        process
            .join()
            .await
            .map_err(|e| ClientError::Exec(format!("{target}: {e}")))?;

        if let Some(status) = status {
            if let Some(status) = status.await {
                if status.status.as_deref() == Some("Failure") {
                    return Err(ClientError::Exec(format!(
                        "{}: {}: {}",
                        target,
                        status.message.unwrap_or_default(),
                        stderr.trim()
                    )));
                }
            }
        }
        Ok(stderr)
    }

    /// Write `source` to `target` inside the container, returning its stderr
    pub async fn copy_to_pod<R>(
        &self,
        pod: &str,
        container: &str,
        source: R,
        target: &str,
    ) -> Result<String, ClientError>
    where
        R: AsyncRead + Unpin + Send,
    {
        self.exec(
            pod,
            container,
            copy_command(target),
            Some(source),
            Some(tokio::io::sink()),
        )
        .await
    }
}
