use super::dto::RestoringRecycleItem;
use crate::{
    dto::{map_storage_err, JsonRes, StatusBody},
    mount_table::MountTable,
    storage::{RecycleItem, RequestContext, Storage},
};
use rocket::{delete, get, http::Status, post, routes, serde::json::Json, Build, Rocket, State};
use std::sync::Arc;

pub fn register_routes(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount(
        "/recycle",
        routes![list_recycle, restore_recycle_item, empty_recycle],
    )
}

#[get("/?<path>")]
async fn list_recycle(
    ctx: RequestContext,
    mount_table: &State<Arc<MountTable>>,
    path: &str,
) -> JsonRes<Vec<RecycleItem>> {
    let items = match mount_table.list_recycle(&ctx, path).await {
        Ok(items) => items,
        Err(err) => return Err(map_storage_err("list_recycle", &ctx, path, &err)),
    };

    Ok((Status::Ok, Json(items)))
}

#[post("/restore", data = "<body>")]
async fn restore_recycle_item(
    ctx: RequestContext,
    mount_table: &State<Arc<MountTable>>,
    body: Json<RestoringRecycleItem<'_>>,
) -> JsonRes<StatusBody> {
    if let Err(err) = mount_table
        .restore_recycle_item(&ctx, body.restore_key)
        .await
    {
        return Err(map_storage_err(
            "restore_recycle_item",
            &ctx,
            body.restore_key,
            &err,
        ));
    }

    Ok((Status::Ok, Json(StatusBody::ok())))
}

#[delete("/?<path>")]
async fn empty_recycle(
    ctx: RequestContext,
    mount_table: &State<Arc<MountTable>>,
    path: &str,
) -> JsonRes<StatusBody> {
    if let Err(err) = mount_table.empty_recycle(&ctx, path).await {
        return Err(map_storage_err("empty_recycle", &ctx, path, &err));
    }

    Ok((Status::Ok, Json(StatusBody::ok())))
}
