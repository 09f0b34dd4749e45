use super::dto::MountInfo;
use crate::{dto::JsonRes, mount_table::MountTable, storage::RequestContext};
use rocket::{get, http::Status, routes, serde::json::Json, Build, Rocket, State};
use std::sync::Arc;

pub fn register_routes(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount("/mounts", routes![list_mounts])
}

#[get("/")]
async fn list_mounts(
    #[allow(unused_variables)] ctx: RequestContext,
    mount_table: &State<Arc<MountTable>>,
) -> JsonRes<Vec<MountInfo>> {
    let mounts = mount_table
        .list_mounts()
        .iter()
        .map(|mount| MountInfo::from(mount.as_ref()))
        .collect();

    Ok((Status::Ok, Json(mounts)))
}
