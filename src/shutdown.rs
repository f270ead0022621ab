use log::{info, warn};
use tokio::sync::watch;

// fires once, every clone of the matching `Shutdown` sees it
#[derive(Debug)]
pub struct ShutdownTrigger(watch::Sender<bool>);

#[derive(Debug, Clone)]
pub struct Shutdown(watch::Receiver<bool>);

pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger(tx), Shutdown(rx))
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.0.send_replace(true);
    }
}

impl Shutdown {
    pub fn is_triggered(&self) -> bool {
        *self.0.borrow()
    }

    // resolves once shutdown has been requested. a dropped trigger counts
    // as a request, nothing could fire it any more.
    pub async fn wait(&mut self) {
        let _ = self.0.wait_for(|stop| *stop).await;
    }
}

// waits for ctrl-c, or SIGTERM on unix, then fires the trigger
pub async fn listen_for_signals(trigger: ShutdownTrigger) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    res = tokio::signal::ctrl_c() => {
                        if let Err(e) = res {
                            warn!("couldn't listen for ctrl-c: {}", e);
                        }
                    }
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!("couldn't listen for SIGTERM: {}", e);
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("couldn't listen for ctrl-c: {}", e);
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("couldn't listen for ctrl-c: {}", e);
        }
    }

    info!("termination signal received");
    trigger.trigger();
}
