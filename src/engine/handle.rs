use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::EngineStatus;
use crate::models::Mint;
use crate::stats::Stats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Control {
    Pause,
    Resume,
    Stop,
}

/// Handle to an engine running on its own task
pub struct EngineHandle {
    pub(crate) id: Uuid,
    pub(crate) mint: Mint,
    pub(crate) control: mpsc::UnboundedSender<Control>,
    pub(crate) status: watch::Receiver<EngineStatus>,
    pub(crate) task: JoinHandle<Stats>,
}

impl EngineHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn mint(&self) -> &Mint {
        &self.mint
    }

    /// Status as of the engine's last tick or command
    pub fn status(&self) -> EngineStatus {
        self.status.borrow().clone()
    }

    /// Wait for the next status publication
    pub async fn changed(&mut self) -> bool {
        self.status.changed().await.is_ok()
    }

    /// False if the engine has already finished
    pub fn pause(&self) -> bool {
        self.control.send(Control::Pause).is_ok()
    }

    pub fn resume(&self) -> bool {
        self.control.send(Control::Resume).is_ok()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the engine, liquidating any open position, and return its final stats
    pub async fn stop(self) -> Stats {
        // A halted engine has already exited; its task still holds the stats
        let _ = self.control.send(Control::Stop);

        match self.task.await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!(engine = %self.id, error = %e, "Engine task failed");
                self.status.borrow().stats.clone()
            }
        }
    }
}
