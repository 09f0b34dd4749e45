use crate::{
    dto::Error,
    storage::{Identity, RequestContext},
};
use rocket::{
    http::Status,
    request::{FromRequest, Outcome, Request},
};

/// Set by the authenticating proxy in front of the gateway.
pub const REMOTE_USER_HEADER: &str = "X-Remote-User";
/// Comma separated group names of the remote user.
pub const REMOTE_GROUPS_HEADER: &str = "X-Remote-Groups";

fn parse_groups(groups: &str) -> Vec<String> {
    groups
        .split(',')
        .map(str::trim)
        .filter(|group| !group.is_empty())
        .map(str::to_owned)
        .collect()
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RequestContext {
    type Error = Error;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let user = match request.headers().get_one(REMOTE_USER_HEADER) {
            Some(user) if !user.trim().is_empty() => user.trim().to_owned(),
            _ => return Outcome::Error((Status::Unauthorized, Status::Unauthorized.into())),
        };
        let groups = request
            .headers()
            .get(REMOTE_GROUPS_HEADER)
            .flat_map(parse_groups)
            .collect::<Vec<_>>();

        let ctx = RequestContext::new(Identity { user, groups });

        log::debug!(target: "guards::RequestContext", guard = "RequestContext", trace_id:% = ctx.trace_id, user = ctx.user(), method:% = request.method(), uri:% = request.uri(); "Request context created.");

        Outcome::Success(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_groups() {
        assert_eq!(parse_groups("physics, chemistry,,"), vec!["physics", "chemistry"]);
        assert!(parse_groups(" , ").is_empty());
    }
}
