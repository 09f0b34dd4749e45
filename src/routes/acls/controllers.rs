use super::dto::{SettingAcl, UnsettingAcl};
use crate::{
    dto::{map_storage_err, Error, JsonRes, StatusBody},
    mount_table::MountTable,
    storage::{RequestContext, Storage},
};
use rocket::{
    delete, http::Status, patch, put, routes, serde::json::Json, Build, Rocket, State,
};
use std::sync::Arc;

pub fn register_routes(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount("/acls", routes![set_acl, update_acl, unset_acl])
}

#[put("/", data = "<body>")]
async fn set_acl(
    ctx: RequestContext,
    mount_table: &State<Arc<MountTable>>,
    body: Json<SettingAcl<'_>>,
) -> JsonRes<StatusBody> {
    let acl = match body.to_acl() {
        Ok(acl) => acl,
        Err(err) => return Err(Error::new_dynamic(Status::BadRequest, err.to_string())),
    };

    if let Err(err) = mount_table.set_acl(&ctx, body.path, &acl).await {
        return Err(map_storage_err("set_acl", &ctx, body.path, &err));
    }

    Ok((Status::Ok, Json(StatusBody::ok())))
}

#[patch("/", data = "<body>")]
async fn update_acl(
    ctx: RequestContext,
    mount_table: &State<Arc<MountTable>>,
    body: Json<SettingAcl<'_>>,
) -> JsonRes<StatusBody> {
    let acl = match body.to_acl() {
        Ok(acl) => acl,
        Err(err) => return Err(Error::new_dynamic(Status::BadRequest, err.to_string())),
    };

    if let Err(err) = mount_table.update_acl(&ctx, body.path, &acl).await {
        return Err(map_storage_err("update_acl", &ctx, body.path, &err));
    }

    Ok((Status::Ok, Json(StatusBody::ok())))
}

#[delete("/?<query..>")]
async fn unset_acl(
    ctx: RequestContext,
    mount_table: &State<Arc<MountTable>>,
    query: UnsettingAcl<'_>,
) -> JsonRes<StatusBody> {
    let target = match query.to_target() {
        Ok(target) => target,
        Err(err) => return Err(Error::new_dynamic(Status::BadRequest, err.to_string())),
    };

    if let Err(err) = mount_table.unset_acl(&ctx, query.path, &target).await {
        return Err(map_storage_err("unset_acl", &ctx, query.path, &err));
    }

    Ok((Status::Ok, Json(StatusBody::ok())))
}
