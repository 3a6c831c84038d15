use std::fmt;
use std::process::ExitStatus;

use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::bail;
use crate::error::{BackfillResult, ErrorKind};

/// The external processes of a table stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    /// Source export writing rows to stdout.
    Dump,
    /// Codec between the export and the conduit.
    Compress,
    /// Destination import reading the conduit.
    Load,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Dump => "dump",
            PipelineStage::Compress => "compress",
            PipelineStage::Load => "load",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct RunningStage {
    stage: PipelineStage,
    child: Child,
    status: Option<ExitStatus>,
}

/// The processes spawned for one table.
///
/// Children are killed when the group is dropped, so an abandoned stream never leaves
/// processes behind.
#[derive(Debug, Default)]
pub struct ProcessGroup {
    stages: Vec<RunningStage>,
}

impl ProcessGroup {
    /// Spawns `command` as `stage` and returns the child for wiring its pipes.
    pub fn spawn(&mut self, stage: PipelineStage, command: &mut Command) -> BackfillResult<&mut Child> {
        command.kill_on_drop(true);

        let child = match command.spawn() {
            Ok(child) => child,
            Err(err) => bail!(
                ErrorKind::PipelineStageFailed,
                "Failed to start a pipeline stage",
                format!("the {stage} stage could not be spawned: {err}"),
                source: err
            ),
        };
        debug!(%stage, pid = child.id(), "spawned pipeline stage");

        self.stages.push(RunningStage {
            stage,
            child,
            status: None,
        });

        let last = self.stages.len() - 1;
        Ok(&mut self.stages[last].child)
    }

    /// Waits for `stage` to exit and fails unless it exited successfully.
    ///
    /// Cancel safe.
    pub async fn wait(&mut self, stage: PipelineStage) -> BackfillResult<()> {
        let Some(running) = self.stages.iter_mut().find(|running| running.stage == stage) else {
            bail!(
                ErrorKind::InvalidState,
                "Pipeline stage was never started",
                format!("no {stage} stage in the process group")
            );
        };

        let status = match running.status {
            Some(status) => status,
            None => {
                let status = running.child.wait().await?;
                running.status = Some(status);
                status
            }
        };

        check_status(stage, status)
    }

    /// Returns the outcome of `stage` if it has already exited, without waiting.
    pub fn try_status(&mut self, stage: PipelineStage) -> Option<BackfillResult<()>> {
        let running = self
            .stages
            .iter_mut()
            .find(|running| running.stage == stage)?;

        if running.status.is_none() {
            running.status = running.child.try_wait().ok().flatten();
        }

        running.status.map(|status| check_status(stage, status))
    }

    /// Kills and reaps every stage that has not exited yet.
    pub async fn terminate(&mut self) {
        for running in self.stages.iter_mut().filter(|running| running.status.is_none()) {
            if let Err(err) = running.child.start_kill() {
                warn!(stage = %running.stage, error = %err, "failed to kill pipeline stage");
            }

            match running.child.wait().await {
                Ok(status) => running.status = Some(status),
                Err(err) => {
                    warn!(stage = %running.stage, error = %err, "failed to reap pipeline stage")
                }
            }
        }
    }
}

fn check_status(stage: PipelineStage, status: ExitStatus) -> BackfillResult<()> {
    if !status.success() {
        bail!(
            ErrorKind::PipelineStageFailed,
            "A pipeline stage exited unsuccessfully",
            format!("the {stage} stage exited with {status}")
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell(script: &str) -> Command {
        let mut command = Command::new("sh");
        command.arg("-c").arg(script);
        command
    }

    #[tokio::test]
    async fn failing_stage_is_named_in_the_error() {
        let mut group = ProcessGroup::default();
        group.spawn(PipelineStage::Compress, &mut shell("exit 3")).unwrap();

        let err = group.wait(PipelineStage::Compress).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::PipelineStageFailed);
        assert!(err.detail().unwrap().contains("compress"));
    }

    #[tokio::test]
    async fn waiting_twice_reuses_the_status() {
        let mut group = ProcessGroup::default();
        group.spawn(PipelineStage::Dump, &mut shell("true")).unwrap();

        group.wait(PipelineStage::Dump).await.unwrap();
        group.wait(PipelineStage::Dump).await.unwrap();
        assert!(group.try_status(PipelineStage::Dump).unwrap().is_ok());
    }

    #[tokio::test]
    async fn terminate_kills_running_stages() {
        let mut group = ProcessGroup::default();
        group.spawn(PipelineStage::Load, &mut shell("sleep 30")).unwrap();
        assert!(group.try_status(PipelineStage::Load).is_none());

        group.terminate().await;

        let err = group.wait(PipelineStage::Load).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PipelineStageFailed);
    }

    #[tokio::test]
    async fn missing_program_fails_to_spawn() {
        let mut group = ProcessGroup::default();

        let err = group
            .spawn(
                PipelineStage::Dump,
                &mut Command::new("backfill-no-such-program"),
            )
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::PipelineStageFailed);
    }
}
