use std::fs::File;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::bail;
use crate::compression::CompressionMode;
use crate::error::{BackfillError, BackfillResult, ErrorKind};
#[cfg(feature = "failpoints")]
use crate::failpoints::{PIPELINE_BEFORE_LOAD_WAIT, backfill_fail_point};
use crate::pipeline::{Conduit, PipelineStage, ProcessGroup};

/// Delay between attempts to open the conduit while the load has not attached yet.
const WRITER_OPEN_INTERVAL: Duration = Duration::from_millis(20);

/// Runs dump, compression and load for one table.
///
/// Processes start in the order load, dump, compress and are awaited in the order dump,
/// compress, load. The write end of the conduit stays open in this process until both the
/// dump and the compression stage exited successfully, so the load never reaches the end of
/// its input on a partial stream. On any failure every remaining stage is killed before the
/// write end is closed.
#[derive(Debug, Clone, Copy)]
pub struct StreamPipeline {
    compression: CompressionMode,
}

impl StreamPipeline {
    pub fn new(compression: CompressionMode) -> Self {
        Self { compression }
    }

    pub fn compression(&self) -> CompressionMode {
        self.compression
    }

    /// Streams the output of `dump` through the compression stage into `load`.
    ///
    /// `load` must read `conduit`. Standard streams of both commands are overridden.
    pub async fn run(&self, conduit: &Conduit, dump: Command, load: Command) -> BackfillResult<()> {
        let mut group = ProcessGroup::default();
        let mut writer = None;

        let result = self
            .drive(&mut group, &mut writer, conduit, dump, load)
            .await;

        if let Err(err) = &result {
            warn!(error = %err, "table stream failed, terminating remaining stages");
            group.terminate().await;
        }
        drop(writer);

        result
    }

    async fn drive(
        &self,
        group: &mut ProcessGroup,
        writer: &mut Option<File>,
        conduit: &Conduit,
        mut dump: Command,
        mut load: Command,
    ) -> BackfillResult<()> {
        load.stdin(Stdio::null());
        group.spawn(PipelineStage::Load, &mut load)?;

        let conduit_writer = open_conduit_writer(group, conduit).await?;
        let compress_stdout = Stdio::from(conduit_writer.try_clone()?);
        *writer = Some(conduit_writer);

        dump.stdin(Stdio::null()).stdout(Stdio::piped());
        let Some(dump_stdout) = group.spawn(PipelineStage::Dump, &mut dump)?.stdout.take() else {
            bail!(
                ErrorKind::InvalidState,
                "Dump stage has no stdout",
                "the dump stdout was not captured"
            );
        };
        let compress_stdin: Stdio = dump_stdout.try_into()?;

        // The command keeps its copy of the conduit write end open until dropped.
        let mut compress = Command::new(self.compression.program());
        compress
            .args(self.compression.args())
            .stdin(compress_stdin)
            .stdout(compress_stdout);
        group.spawn(PipelineStage::Compress, &mut compress)?;
        drop(compress);

        debug!(compression = %self.compression, "table stream started");

        for stage in [PipelineStage::Dump, PipelineStage::Compress] {
            if let Err(err) = group.wait(stage).await {
                return Err(with_load_failure(group, err));
            }
        }

        #[cfg(feature = "failpoints")]
        backfill_fail_point(PIPELINE_BEFORE_LOAD_WAIT)?;

        drop(writer.take());
        group.wait(PipelineStage::Load).await
    }
}

/// Opens the conduit for writing once the load has opened it for reading.
///
/// Polls without blocking a thread, so dropping the stream while the load is still connecting
/// leaves nothing behind. Fails if the load exits before it ever opens the conduit.
async fn open_conduit_writer(group: &mut ProcessGroup, conduit: &Conduit) -> BackfillResult<File> {
    loop {
        if let Some(writer) = conduit.try_open_writer()? {
            return Ok(writer);
        }

        tokio::select! {
            exited = group.wait(PipelineStage::Load) => {
                exited?;
                bail!(
                    ErrorKind::PipelineStageFailed,
                    "Load stage exited before reading its input",
                    "the load stage never opened the conduit"
                );
            }
            _ = tokio::time::sleep(WRITER_OPEN_INTERVAL) => {}
        }
    }
}

/// Prefers the load failure when the load died first, which is what broke the upstream stages.
fn with_load_failure(group: &mut ProcessGroup, err: BackfillError) -> BackfillError {
    match group.try_status(PipelineStage::Load) {
        Some(Err(load_err)) => BackfillError::from(vec![load_err, err]),
        _ => err,
    }
}
