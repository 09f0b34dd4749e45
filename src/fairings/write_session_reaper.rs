use crate::services::WriteSessionService;
use chrono::Duration;
use parking_lot::Mutex;
use rocket::{
    fairing::{Fairing, Info},
    Orbit, Rocket,
};
use std::sync::Arc;

/// Periodically removes write sessions a client opened and never finished.
pub struct WriteSessionReaper {
    period: Duration,
    expiration: Duration,
    stop_signal_sender: Mutex<Option<tokio::sync::oneshot::Sender<()>>>,
    task_join_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl WriteSessionReaper {
    pub fn new(period: Duration, expiration: Duration) -> Self {
        WriteSessionReaper {
            period,
            expiration,
            stop_signal_sender: Mutex::new(None),
            task_join_handle: Mutex::new(None),
        }
    }
}

#[rocket::async_trait]
impl Fairing for WriteSessionReaper {
    fn info(&self) -> Info {
        Info {
            name: "Write Session Reaper",
            kind: rocket::fairing::Kind::Liftoff | rocket::fairing::Kind::Shutdown,
        }
    }

    async fn on_liftoff(&self, rocket: &Rocket<Orbit>) {
        let period = self.period;
        let expiration = self.expiration;

        let write_session_service = match rocket.state::<Arc<WriteSessionService>>() {
            Some(write_session_service) => write_session_service.clone(),
            None => {
                log::error!(target: "write_session_reaper", "WriteSessionService is not managed. Write session reaper is not started.");
                return;
            }
        };

        log::info!(target: "write_session_reaper", period:%, expiration:%; "Starting write session reaper.");

        let (stop_signal_sender, stop_signal_receiver) = tokio::sync::oneshot::channel();

        let task_join_handle = tokio::spawn(remove_expired_sessions_task(
            stop_signal_receiver,
            period,
            expiration,
            write_session_service,
        ));

        *self.stop_signal_sender.lock() = Some(stop_signal_sender);
        *self.task_join_handle.lock() = Some(task_join_handle);

        log::info!(target: "write_session_reaper", "Write session reaper started.");
    }

    async fn on_shutdown(&self, _rocket: &Rocket<Orbit>) {
        log::info!(target: "write_session_reaper", "Shutting down write session reaper.");

        let stop_signal_sender = self.stop_signal_sender.lock().take();

        if let Some(stop_signal_sender) = stop_signal_sender {
            stop_signal_sender.send(()).ok();
        }

        let task_join_handle = self.task_join_handle.lock().take();

        if let Some(task_join_handle) = task_join_handle {
            task_join_handle.await.ok();
        }

        log::info!(target: "write_session_reaper", "Write session reaper shut down.");
    }
}

async fn remove_expired_sessions_task(
    mut stop_signal_receiver: tokio::sync::oneshot::Receiver<()>,
    period: Duration,
    expiration: Duration,
    write_session_service: Arc<WriteSessionService>,
) {
    let period = match period.to_std() {
        Ok(period) => period,
        Err(err) => {
            log::warn!(target: "write_session_reaper", err:err; "Failed to convert period to std duration. Defaulting to 1 hour.");
            std::time::Duration::new(3600, 0)
        }
    };

    loop {
        tokio::select! {
            _ = tokio::time::sleep(period) => {
                remove_expired_sessions(expiration, &write_session_service).await;
            }
            _ = &mut stop_signal_receiver => {
                break;
            }
        }
    }
}

async fn remove_expired_sessions(expiration: Duration, write_session_service: &WriteSessionService) {
    log::info!(target: "write_session_reaper", expiration:%; "Removing expired write sessions.");

    match write_session_service.remove_expired_sessions(expiration).await {
        Ok((total_count, io_errs)) => {
            let io_failed_count = io_errs.len();
            let io_succeeded_count = total_count.saturating_sub(io_failed_count);
            log::info!(target: "write_session_reaper", expiration:%, total_count, io_succeeded_count, io_failed_count, io_errs:?; "Removed expired write sessions.");
        }
        Err(err) => {
            log::warn!(target: "write_session_reaper", err:err; "Failed to remove expired write sessions.");
        }
    }
}
