//! Path matching for the inbound HTTP surface.
pub mod dispatch;

use http::Method;

pub const MODELS_PATH: &str = "/v1/models";
pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Legacy or misspelled paths answered with a 307 to their canonical route.
const PATH_ALIASES: &[(&str, &str)] = &[
    ("/models", MODELS_PATH),
    ("/chat/completions", CHAT_COMPLETIONS_PATH),
    ("/v1/chat/completion", CHAT_COMPLETIONS_PATH),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteMatch {
    Health,
    Models,
    ChatCompletions,
    Redirect { canonical: &'static str },
    MethodNotAllowed,
    NotFound,
}

#[must_use]
pub fn normalize_base_path(base_path: &str) -> String {
    let trimmed = base_path.trim();
    if trimmed.is_empty() || trimmed == "/" {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.trim_end_matches('/').to_string()
    } else {
        format!("/{}", trimmed.trim_end_matches('/'))
    }
}

#[must_use]
pub fn match_route(method: &Method, path: &str, base_path: &str) -> RouteMatch {
    let Some(path) = strip_base_path(path, base_path) else {
        return RouteMatch::NotFound;
    };

    match path {
        "/" => only(method, &Method::GET, RouteMatch::Health),
        MODELS_PATH => only(method, &Method::GET, RouteMatch::Models),
        CHAT_COMPLETIONS_PATH => only(method, &Method::POST, RouteMatch::ChatCompletions),
        _ => PATH_ALIASES
            .iter()
            .find(|(alias, _)| *alias == path)
            .map_or(RouteMatch::NotFound, |&(_, canonical)| {
                RouteMatch::Redirect { canonical }
            }),
    }
}

#[inline]
fn only(method: &Method, expected: &Method, route: RouteMatch) -> RouteMatch {
    if method == expected {
        route
    } else {
        RouteMatch::MethodNotAllowed
    }
}

fn strip_base_path<'a>(path: &'a str, base_path: &str) -> Option<&'a str> {
    if base_path.is_empty() {
        return Some(path);
    }

    let remainder = path.strip_prefix(base_path)?;
    if remainder.is_empty() {
        Some("/")
    } else if remainder.starts_with('/') {
        Some(remainder)
    } else {
        None
    }
}

/// Build the redirect target for an alias, keeping the base path and query.
#[must_use]
pub fn redirect_location(base_path: &str, canonical: &str, query: Option<&str>) -> String {
    let mut location = String::with_capacity(base_path.len() + canonical.len() + 16);
    location.push_str(base_path);
    location.push_str(canonical);
    if let Some(query) = query.filter(|query| !query.is_empty()) {
        location.push('?');
        location.push_str(query);
    }
    location
}
