//! An [`ExtensionHost`] that shells out for every load, reload, and unload.

use std::collections::BTreeSet;
use std::process::Output;

use anyhow::Context;
use async_trait::async_trait;
use hr_core::ExtensionId;
use hr_service::{ExtensionHost, HostError};
use parking_lot::Mutex;
use tokio::process::Command;

/// Runs a shell command template per host call.
///
/// `{ext}` is replaced by the dotted extension identifier and `{action}` by
/// `load`, `reload`, or `unload`. A zero exit status is success; otherwise
/// the trimmed stderr becomes the failure reason.
#[derive(Debug)]
pub struct CommandHost {
    template: String,
    loaded: Mutex<BTreeSet<ExtensionId>>,
}

impl CommandHost {
    /// Creates a host with nothing loaded.
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            loaded: Mutex::new(BTreeSet::new()),
        }
    }

    /// Marks extensions the bot already loaded on its own.
    #[must_use]
    pub fn with_loaded(self, extensions: impl IntoIterator<Item = ExtensionId>) -> Self {
        self.loaded.lock().extend(extensions);
        self
    }

    fn render(&self, action: &str, extension: &ExtensionId) -> String {
        self.template
            .replace("{ext}", extension.as_str())
            .replace("{action}", action)
    }

    async fn run(&self, action: &str, extension: &ExtensionId) -> Result<(), HostError> {
        let command = self.render(action, extension);
        tracing::debug!(extension = %extension, command, "running host command");

        let output = spawn(&command)
            .await
            .map_err(|e| HostError::failed(format!("{e:#}")))?;
        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let reason = stderr.trim();
        Err(HostError::failed(if reason.is_empty() {
            format!("`{command}` exited with {}", output.status)
        } else {
            reason.to_owned()
        }))
    }
}

async fn spawn(command: &str) -> anyhow::Result<Output> {
    #[cfg(unix)]
    let mut cmd = {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    };
    #[cfg(not(unix))]
    let mut cmd = {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    };

    cmd.kill_on_drop(true)
        .output()
        .await
        .with_context(|| format!("cannot run `{command}`"))
}

#[async_trait]
impl ExtensionHost for CommandHost {
    fn is_loaded(&self, extension: &ExtensionId) -> bool {
        self.loaded.lock().contains(extension)
    }

    fn loaded_extensions(&self) -> Vec<ExtensionId> {
        self.loaded.lock().iter().cloned().collect()
    }

    async fn load(&self, extension: &ExtensionId) -> Result<(), HostError> {
        self.run("load", extension).await?;
        self.loaded.lock().insert(extension.clone());
        Ok(())
    }

    async fn reload(&self, extension: &ExtensionId) -> Result<(), HostError> {
        if !self.is_loaded(extension) {
            return Err(HostError::NotLoaded(extension.clone()));
        }
        self.run("reload", extension).await
    }

    async fn unload(&self, extension: &ExtensionId) -> Result<(), HostError> {
        if !self.is_loaded(extension) {
            return Err(HostError::NotLoaded(extension.clone()));
        }
        self.run("unload", extension).await?;
        self.loaded.lock().remove(extension);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ext(name: &str) -> ExtensionId {
        ExtensionId::new(name)
    }

    #[test]
    fn test_render() {
        let host = CommandHost::new("bot-ctl {action} {ext} --quiet");
        assert_eq!(
            host.render("reload", &ext("cogs.ping")),
            "bot-ctl reload cogs.ping --quiet"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_load_then_reload_and_unload() {
        let host = CommandHost::new("true");

        host.load(&ext("cogs.ping")).await.expect("load");
        assert!(host.is_loaded(&ext("cogs.ping")));
        host.reload(&ext("cogs.ping")).await.expect("reload");
        host.unload(&ext("cogs.ping")).await.expect("unload");
        assert!(host.loaded_extensions().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failure_reports_stderr() {
        let host = CommandHost::new("echo \"cannot {action} {ext}\" >&2; exit 1");

        let err = host.load(&ext("cogs.bad")).await.expect_err("should fail");
        assert_eq!(err, HostError::failed("cannot load cogs.bad"));
        assert!(!host.is_loaded(&ext("cogs.bad")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failure_without_stderr_reports_status() {
        let host = CommandHost::new("exit 3");

        let err = host.load(&ext("cogs.bad")).await.expect_err("should fail");
        assert!(err.to_string().contains("exited with"), "{err}");
    }

    #[tokio::test]
    async fn test_reload_requires_loaded() {
        let host = CommandHost::new("true").with_loaded([ext("cogs.ping")]);

        assert_eq!(
            host.reload(&ext("cogs.other")).await,
            Err(HostError::NotLoaded(ext("cogs.other")))
        );
        assert_eq!(host.loaded_extensions(), [ext("cogs.ping")]);
    }
}
