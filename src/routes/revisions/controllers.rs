use super::dto::RestoringRevision;
use crate::{
    dto::{map_storage_err, Error, JsonRes, StatusBody},
    mount_table::MountTable,
    routes::files::dto::FileData,
    storage::{RequestContext, Revision, Storage},
};
use rocket::{get, http::Status, post, routes, serde::json::Json, Build, Rocket, State};
use std::sync::Arc;

pub fn register_routes(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount(
        "/revisions",
        routes![list_revisions, get_revision_data, restore_revision],
    )
}

#[get("/?<path>")]
async fn list_revisions(
    ctx: RequestContext,
    mount_table: &State<Arc<MountTable>>,
    path: &str,
) -> JsonRes<Vec<Revision>> {
    let revisions = match mount_table.list_revisions(&ctx, path).await {
        Ok(revisions) => revisions,
        Err(err) => return Err(map_storage_err("list_revisions", &ctx, path, &err)),
    };

    Ok((Status::Ok, Json(revisions)))
}

#[get("/data?<path>&<key>")]
async fn get_revision_data(
    ctx: RequestContext,
    mount_table: &State<Arc<MountTable>>,
    path: &str,
    key: &str,
) -> Result<FileData, Error> {
    let data = match mount_table.download_revision(&ctx, path, key).await {
        Ok(data) => data,
        Err(err) => return Err(map_storage_err("get_revision_data", &ctx, path, &err)),
    };

    // revisions carry no mime of their own
    Ok(FileData {
        mime: "application/octet-stream".to_owned(),
        data,
    })
}

#[post("/restore", data = "<body>")]
async fn restore_revision(
    ctx: RequestContext,
    mount_table: &State<Arc<MountTable>>,
    body: Json<RestoringRevision<'_>>,
) -> JsonRes<StatusBody> {
    if let Err(err) = mount_table
        .restore_revision(&ctx, body.path, body.key)
        .await
    {
        return Err(map_storage_err("restore_revision", &ctx, body.path, &err));
    }

    Ok((Status::Ok, Json(StatusBody::ok())))
}
