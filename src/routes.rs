pub mod acls;
pub mod files;
pub mod mounts;
pub mod quota;
pub mod recycle;
pub mod revisions;
pub mod write_sessions;

use rocket::{Build, Rocket};

pub fn register_routes(rocket: Rocket<Build>) -> Rocket<Build> {
    let rocket = files::controllers::register_routes(rocket);
    let rocket = write_sessions::controllers::register_routes(rocket);
    let rocket = revisions::controllers::register_routes(rocket);
    let rocket = recycle::controllers::register_routes(rocket);
    let rocket = acls::controllers::register_routes(rocket);
    let rocket = quota::controllers::register_routes(rocket);
    let rocket = mounts::controllers::register_routes(rocket);
    rocket
}
