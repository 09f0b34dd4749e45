use super::dto::{CreatingDirectory, FileData, MovingEntry, ResolvedPath};
use crate::{
    dto::{map_storage_err, Error, JsonRes, StatusBody},
    mount_table::MountTable,
    storage::{RequestContext, Storage, MD},
};
use rocket::{delete, get, http::Status, post, routes, serde::json::Json, Build, Rocket, State};
use std::sync::Arc;

pub fn register_routes(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount(
        "/files",
        routes![
            get_metadata,
            list_children,
            create_directory,
            remove_entry,
            move_entry,
            get_path_by_id,
            get_file_data
        ],
    )
}

#[get("/metadata?<path>")]
async fn get_metadata(
    ctx: RequestContext,
    mount_table: &State<Arc<MountTable>>,
    path: &str,
) -> JsonRes<MD> {
    let md = mount_table.get_md(&ctx, path).await;

    let md = match md {
        Ok(md) => md,
        Err(err) => return Err(map_storage_err("get_metadata", &ctx, path, &err)),
    };

    Ok((Status::Ok, Json(md)))
}

#[get("/children?<path>")]
async fn list_children(
    ctx: RequestContext,
    mount_table: &State<Arc<MountTable>>,
    path: &str,
) -> JsonRes<Vec<MD>> {
    let mds = mount_table.list_folder(&ctx, path).await;

    let mds = match mds {
        Ok(mds) => mds,
        Err(err) => return Err(map_storage_err("list_children", &ctx, path, &err)),
    };

    Ok((Status::Ok, Json(mds)))
}

#[post("/directories", data = "<body>")]
async fn create_directory(
    ctx: RequestContext,
    mount_table: &State<Arc<MountTable>>,
    body: Json<CreatingDirectory<'_>>,
) -> JsonRes<MD> {
    if let Err(err) = mount_table.create_dir(&ctx, body.path).await {
        return Err(map_storage_err("create_directory", &ctx, body.path, &err));
    }

    let md = match mount_table.get_md(&ctx, body.path).await {
        Ok(md) => md,
        Err(err) => return Err(map_storage_err("create_directory", &ctx, body.path, &err)),
    };

    Ok((Status::Created, Json(md)))
}

#[delete("/?<path>")]
async fn remove_entry(
    ctx: RequestContext,
    mount_table: &State<Arc<MountTable>>,
    path: &str,
) -> JsonRes<StatusBody> {
    if let Err(err) = mount_table.delete(&ctx, path).await {
        return Err(map_storage_err("remove_entry", &ctx, path, &err));
    }

    Ok((Status::Ok, Json(StatusBody::ok())))
}

#[post("/move", data = "<body>")]
async fn move_entry(
    ctx: RequestContext,
    mount_table: &State<Arc<MountTable>>,
    body: Json<MovingEntry<'_>>,
) -> JsonRes<MD> {
    if let Err(err) = mount_table.move_entry(&ctx, body.source, body.target).await {
        return Err(map_storage_err("move_entry", &ctx, body.source, &err));
    }

    let md = match mount_table.get_md(&ctx, body.target).await {
        Ok(md) => md,
        Err(err) => return Err(map_storage_err("move_entry", &ctx, body.target, &err)),
    };

    Ok((Status::Ok, Json(md)))
}

#[get("/path?<id>")]
async fn get_path_by_id(
    ctx: RequestContext,
    mount_table: &State<Arc<MountTable>>,
    id: &str,
) -> JsonRes<ResolvedPath> {
    let path = match mount_table.get_path_by_id(&ctx, id).await {
        Ok(path) => path,
        Err(err) => return Err(map_storage_err("get_path_by_id", &ctx, id, &err)),
    };

    Ok((Status::Ok, Json(ResolvedPath { path })))
}

#[get("/data?<path>")]
async fn get_file_data(
    ctx: RequestContext,
    mount_table: &State<Arc<MountTable>>,
    path: &str,
) -> Result<FileData, Error> {
    let md = match mount_table.get_md(&ctx, path).await {
        Ok(md) => md,
        Err(err) => return Err(map_storage_err("get_file_data", &ctx, path, &err)),
    };

    if md.is_dir {
        return Err(Error::new_dynamic(
            Status::BadRequest,
            format!("`{}` is a directory", path),
        ));
    }

    let data = match mount_table.download(&ctx, path).await {
        Ok(data) => data,
        Err(err) => return Err(map_storage_err("get_file_data", &ctx, path, &err)),
    };

    Ok(FileData {
        mime: md.mime,
        data,
    })
}
