use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// Process-wide stop flag shared by the driver, the accept wait and the signal handler.
#[derive(Clone, Debug, Default)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Raises the signal on SIGINT, SIGTERM or SIGHUP. Can only be installed once per
    /// process.
    pub fn install_ctrlc_handler(&self) -> anyhow::Result<()> {
        let signal = self.clone();
        ctrlc::set_handler(move || {
            log::info!("stop requested");
            signal.raise();
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let signal = StopSignal::new();
        let other = signal.clone();
        assert!(!other.is_raised());
        signal.raise();
        assert!(other.is_raised());
    }
}
