use super::handlers::{auth, health};
use utoipa::openapi::{Contact, InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Router that also drives the `OpenAPI` document.
///
/// Endpoints registered with `.routes(routes!(...))` are both served and
/// documented. `OPTIONS /health` and Swagger UI are mounted outside.
pub(crate) fn api_router() -> OpenApiRouter {
    let mut router = OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(auth::login::login))
        .routes(routes!(auth::session::session))
        .routes(routes!(auth::rotate::rotate_seed))
        .routes(routes!(auth::logout::logout));

    router.get_openapi_mut().tags = Some(vec![
        tag("health", "Service liveness and build information"),
        tag("auth", "Login, session checks, seed rotation and logout"),
    ]);

    router
}

fn tag(name: &str, description: &str) -> Tag {
    let mut tag = Tag::new(name);
    tag.description = Some(description.to_string());
    tag
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(non_empty(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = non_empty(env!("CARGO_PKG_AUTHORS"))
        .and_then(|authors| authors.split(';').next())
        .and_then(contact_from_author);
    info.license = non_empty(env!("CARGO_PKG_LICENSE")).map(|id| {
        let mut license = License::new(id);
        license.identifier = Some(id.to_string());
        license
    });

    OpenApiBuilder::new().info(info).build()
}

fn non_empty(value: &str) -> Option<&str> {
    Some(value.trim()).filter(|v| !v.is_empty())
}

/// Parse a Cargo author entry, `Name <email>` or just `Name`.
fn contact_from_author(author: &str) -> Option<Contact> {
    let (name, email) = match author.split_once('<') {
        Some((name, rest)) => (non_empty(name), non_empty(rest.trim_end_matches('>'))),
        None => (non_empty(author), None),
    };
    if name.is_none() && email.is_none() {
        return None;
    }
    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_info_from_cargo() {
        let doc = openapi();
        assert_eq!(doc.info.title, env!("CARGO_PKG_NAME"));
        assert_eq!(doc.info.version, env!("CARGO_PKG_VERSION"));

        let contact = doc.info.contact;
        assert_eq!(
            contact.as_ref().and_then(|c| c.name.as_deref()),
            Some("Team Seedgate")
        );
        assert_eq!(
            contact.as_ref().and_then(|c| c.email.as_deref()),
            Some("team@seedgate.dev")
        );
        assert_eq!(
            doc.info.license.and_then(|l| l.identifier),
            Some("BSD-3-Clause".to_string())
        );
    }

    #[test]
    fn openapi_documents_auth_routes() {
        let doc = openapi();
        let tags = doc.tags.clone().unwrap_or_default();
        assert!(tags.iter().any(|tag| tag.name == "auth"));
        for path in [
            "/health",
            "/v1/auth/login",
            "/v1/auth/session",
            "/v1/auth/seed/rotate",
            "/v1/auth/logout",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }

    #[test]
    fn author_parsing() {
        let contact = contact_from_author("Jane <jane@example.com>");
        assert_eq!(
            contact.as_ref().and_then(|c| c.email.as_deref()),
            Some("jane@example.com")
        );
        let contact = contact_from_author("Jane");
        assert_eq!(contact.and_then(|c| c.email), None);
        assert!(contact_from_author("  ").is_none());
    }
}
