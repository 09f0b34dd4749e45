use crate::{
    dto::{map_storage_err, JsonRes},
    mount_table::MountTable,
    storage::{Quota, RequestContext, Storage},
};
use rocket::{get, http::Status, routes, serde::json::Json, Build, Rocket, State};
use std::sync::Arc;

pub fn register_routes(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount("/quota", routes![get_quota])
}

#[get("/?<path>")]
async fn get_quota(
    ctx: RequestContext,
    mount_table: &State<Arc<MountTable>>,
    path: &str,
) -> JsonRes<Quota> {
    let quota = match mount_table.get_quota(&ctx, path).await {
        Ok(quota) => quota,
        Err(err) => return Err(map_storage_err("get_quota", &ctx, path, &err)),
    };

    Ok((Status::Ok, Json(quota)))
}
