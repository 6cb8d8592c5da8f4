//! Request shapes of the remote web surface
//!
//! None of these are a published API. They were lifted from the browser
//! client and change without notice, so they are kept in one place.

/// Cookie carrying the anti-forgery token
pub const CSRF_COOKIE: &str = "csrftoken";

/// Cookie carrying the logged-in account's identifier
pub const USER_ID_COOKIE: &str = "ds_user_id";

pub const LOGIN_PATH: &str = "accounts/login/ajax/";

pub const QUERY_PATH: &str = "query/";

/// `ref` form field sent with follow-list queries
pub const FOLLOW_LIST_REF: &str = "relationships::follow_list";

/// Response key of the "followed-by" edge
pub const FOLLOWERS_EDGE: &str = "followed_by";

/// Response key of the "follows" edge
pub const FOLLOWS_EDGE: &str = "follows";

pub fn follow_path(remote_id: &str) -> String {
    format!("web/friendships/{}/follow/", remote_id)
}

pub fn unfollow_path(remote_id: &str) -> String {
    format!("web/friendships/{}/unfollow/", remote_id)
}

pub fn like_path(media_id: &str) -> String {
    format!("web/likes/{}/like/", media_id)
}

/// Path segments of an account's profile page
pub fn profile_segments(username: &str) -> [&str; 2] {
    [username, ""]
}

/// Path segments of a hashtag's browsing page
pub fn tag_segments(tag: &str) -> [&str; 4] {
    ["explore", "tags", tag, ""]
}

/// Builds a paged graph query over one edge of an account
///
/// The first page is requested with `first(n)`, later pages continue from
/// the previous page's cursor with `after(cursor, n)`.
pub fn edge_query(edge: &str, user_id: &str, cursor: Option<&str>, page_size: u32) -> String {
    let selector = match cursor {
        Some(cursor) => format!("after({}, {})", cursor, page_size),
        None => format!("first({})", page_size),
    };
    format!(
        "ig_user({}) {{ {}.{} {{ count, page_info {{ end_cursor, has_next_page }}, nodes {{ id, username }} }} }}",
        user_id, edge, selector
    )
}
