use citypulse_core::SimCommand;
use crossfire::mpmc;
use crossfire::{MAsyncTx, MRx, TryRecvError, detect_backoff_cfg};
use std::time::Instant;
use tracing::debug;

use crate::controller::SimController;

pub type CommandSender = MAsyncTx<SimCommand>;
pub type CommandReceiver = MRx<SimCommand>;

/// Queue depth used when the caller has no preference.
pub const DEFAULT_COMMAND_CAPACITY: usize = 64;

pub fn create_command_bus(capacity: usize) -> (CommandSender, CommandReceiver) {
    detect_backoff_cfg();
    mpmc::bounded_tx_async_rx_blocking(capacity.max(1))
}

/// Apply every queued command to the controller. Runs between ticks only.
///
/// Returns the number of commands applied.
pub fn drain_pending_commands(
    receiver: &CommandReceiver,
    controller: &mut SimController,
    now: Instant,
) -> usize {
    let mut applied = 0;
    loop {
        match receiver.try_recv() {
            Ok(command) => {
                debug!(?command, "applying control command");
                controller.apply(command, now);
                applied += 1;
            }
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Disconnected) => break,
        }
    }
    applied
}
