use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Pause/resume switch shared between the operator and a running job
///
/// The run checks the gate before each item, so pausing takes effect at the
/// next item boundary and never interrupts an upload in progress.
#[derive(Clone, Debug)]
pub struct PauseGate {
    paused: Arc<watch::Sender<bool>>,
}

impl PauseGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            paused: Arc::new(tx),
        }
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    pub fn pause(&self) {
        self.paused.send_replace(true);
        info!("Run paused, it will stop before the next document");
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
        info!("Run resumed");
    }

    /// Flip the state. Returns true when the gate is now paused.
    pub fn toggle(&self) -> bool {
        let now_paused = !self.is_paused();
        if now_paused {
            self.pause();
        } else {
            self.resume();
        }
        now_paused
    }

    /// Resolve immediately when running, otherwise once resumed.
    pub async fn wait_until_running(&self) {
        let mut rx = self.paused.subscribe();
        while *rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn running_gate_does_not_block() {
        let gate = PauseGate::new();
        tokio::time::timeout(Duration::from_millis(50), gate.wait_until_running())
            .await
            .expect("gate should be open");
    }

    #[tokio::test]
    async fn paused_gate_blocks_until_resumed() {
        let gate = PauseGate::new();
        assert!(gate.toggle());
        assert!(gate.is_paused());

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait_until_running().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        assert!(!gate.toggle());
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should finish")
            .unwrap();
    }
}
