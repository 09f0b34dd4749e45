use super::dto::{FinishingWriteSession, StartedWriteSession};
use crate::{
    dto::{Code, Error, JsonRes},
    services::{
        Checksum, ChunkRange, FinishedUpload, WriteAck, WriteSessionError, WriteSessionId,
        WriteSessionService,
    },
    storage::RequestContext,
};
use rocket::{
    data::{Limits, ToByteUnit},
    http::Status,
    post, put, routes,
    serde::json::Json,
    Build, Data, Rocket, State,
};
use std::sync::Arc;
use tokio_util::io::InspectReader;
use uuid::Uuid;

pub fn register_routes(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount(
        "/write-sessions",
        routes![
            start_write_session,
            write_stream,
            write_chunk,
            finish_write_session
        ],
    )
}

fn map_write_session_err(
    controller: &'static str,
    ctx: &RequestContext,
    err: &WriteSessionError,
) -> Error {
    let error = Error::from_kind(err.kind(), err.to_string());

    if error.code() == Code::Internal {
        log::error!(target: "routes::write_sessions::controllers", controller, service = "WriteSessionService", trace_id:% = ctx.trace_id, err:err = *err; "Error returned from service.");
    }

    error
}

#[post("/")]
async fn start_write_session(
    ctx: RequestContext,
    write_session_service: &State<Arc<WriteSessionService>>,
) -> JsonRes<StartedWriteSession> {
    let session_id = match write_session_service.start(&ctx).await {
        Ok(session_id) => session_id,
        Err(err) => return Err(map_write_session_err("start_write_session", &ctx, &err)),
    };

    Ok((Status::Created, Json(StartedWriteSession { session_id })))
}

/// Accepts a body made of chunk frames, possibly for several sessions.
///
/// The body is read one byte past the `file` limit, so a body that was cut
/// short by the limit is told apart from one that really ended there.
#[post("/write", data = "<body>")]
async fn write_stream(
    ctx: RequestContext,
    write_session_service: &State<Arc<WriteSessionService>>,
    limits: &Limits,
    body: Data<'_>,
) -> JsonRes<WriteAck> {
    let limit = limits.get("file").unwrap_or(Limits::FILE);
    let mut consumed = 0u64;

    let stream = InspectReader::new(
        body.open(limit.as_u64().saturating_add(1).bytes()),
        |bytes: &[u8]| consumed += bytes.len() as u64,
    );
    let result = write_session_service.write(&ctx, stream).await;

    if limit.as_u64() < consumed {
        log::info!(target: "routes::write_sessions::controllers", controller = "write_stream", trace_id:% = ctx.trace_id, limit:%; "Rejected write stream over the limit.");

        return Err(Error::new_dynamic(
            Status::PayloadTooLarge,
            format!("write stream exceeds the limit of {}", limit),
        ));
    }

    let ack = match result {
        Ok(ack) => ack,
        Err(err) => return Err(map_write_session_err("write_stream", &ctx, &err)),
    };

    Ok((Status::Ok, Json(ack)))
}

#[put("/<session_id>/chunks?<offset>&<length>", data = "<body>")]
async fn write_chunk(
    ctx: RequestContext,
    write_session_service: &State<Arc<WriteSessionService>>,
    limits: &Limits,
    session_id: Uuid,
    offset: u64,
    length: u64,
    body: Data<'_>,
) -> JsonRes<WriteAck> {
    let range = ChunkRange::new(offset, length);

    if range.end().is_none() {
        return Err(Error::new_dynamic(
            Status::BadRequest,
            format!("chunk `{}` overflows the file size", range),
        ));
    }

    let limit = limits.get("file").unwrap_or(Limits::FILE);
    if limit < length.bytes() {
        return Err(Error::new_dynamic(
            Status::PayloadTooLarge,
            format!("chunk length {} exceeds the limit of {}", length, limit),
        ));
    }

    let written = write_session_service
        .write_chunk(&ctx, WriteSessionId::from(session_id), range, body.open(limit))
        .await;
    let written = match written {
        Ok(written) => written,
        Err(err) => return Err(map_write_session_err("write_chunk", &ctx, &err)),
    };

    Ok((
        Status::Ok,
        Json(WriteAck {
            written_bytes: written,
            num_chunks: 1,
        }),
    ))
}

#[post("/<session_id>/finish", data = "<body>")]
async fn finish_write_session(
    ctx: RequestContext,
    write_session_service: &State<Arc<WriteSessionService>>,
    session_id: Uuid,
    body: Json<FinishingWriteSession<'_>>,
) -> JsonRes<FinishedUpload> {
    let checksum = match body.checksum.map(str::parse::<Checksum>).transpose() {
        Ok(checksum) => checksum,
        Err(err) => return Err(Error::new_dynamic(Status::BadRequest, err.to_string())),
    };

    let finished = write_session_service
        .finish(
            &ctx,
            WriteSessionId::from(session_id),
            body.path,
            checksum.as_ref(),
        )
        .await;
    let finished = match finished {
        Ok(finished) => finished,
        Err(err) => return Err(map_write_session_err("finish_write_session", &ctx, &err)),
    };

    Ok((Status::Ok, Json(finished)))
}
