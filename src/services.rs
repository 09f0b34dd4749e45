mod write_session_service;

pub use write_session_service::*;

use crate::mount_table::MountTable;
use rocket::{Build, Rocket};
use std::sync::Arc;

pub fn register_services(
    rocket: Rocket<Build>,
    mount_table: Arc<MountTable>,
    write_session_service: Arc<WriteSessionService>,
) -> Rocket<Build> {
    rocket.manage(mount_table).manage(write_session_service)
}
