//! Listing sort preference and its persistence as client cookies.

use std::collections::HashMap;

use model::{SortBy, SortOrder, Sorting};

/// Lifetime of the preference cookies: one year.
pub const PREFERENCE_MAX_AGE: u64 = 31_536_000;

pub const SORT_COOKIE: &str = "sort";
pub const ORDER_COOKIE: &str = "order";

/// A cookie the client should store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreferenceCookie {
    pub name: &'static str,
    pub value: String,
    pub max_age: u64,
    pub path: String,
    pub secure: bool,
}

impl PreferenceCookie {
    fn new(name: &'static str, value: &str, path: &str, secure: bool) -> Self {
        Self {
            name,
            value: value.to_string(),
            max_age: PREFERENCE_MAX_AGE,
            path: path.to_string(),
            secure,
        }
    }

    /// Render as a `Set-Cookie` header value.
    pub fn to_header(&self) -> String {
        let mut header = format!(
            "{}={}; Max-Age={}; Path={}",
            self.name, self.value, self.max_age, self.path
        );
        if self.secure {
            header.push_str("; Secure");
        }
        header
    }
}

/// Sorting chosen for one listing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortChoice {
    pub sorting: Sorting,
    /// Cookies persisting explicitly requested values.
    pub cookies: Vec<PreferenceCookie>,
}

/// Pick the sorting for a listing.
///
/// A valid query value wins and is persisted as a cookie; otherwise a valid
/// cookie value; otherwise the user's stored preference. Unrecognized values
/// are ignored rather than rejected.
pub fn choose_sorting(
    query: &HashMap<String, String>,
    cookies: &HashMap<String, String>,
    fallback: Sorting,
    cookie_path: &str,
    secure: bool,
) -> SortChoice {
    let mut set_cookies = Vec::new();

    let by = pick::<SortBy>(query, cookies, SORT_COOKIE, |value| {
        set_cookies.push(PreferenceCookie::new(SORT_COOKIE, value, cookie_path, secure));
    })
    .unwrap_or(fallback.by);

    let order = pick::<SortOrder>(query, cookies, ORDER_COOKIE, |value| {
        set_cookies.push(PreferenceCookie::new(ORDER_COOKIE, value, cookie_path, secure));
    })
    .unwrap_or(fallback.order);

    SortChoice {
        sorting: Sorting::new(by, order),
        cookies: set_cookies,
    }
}

fn pick<T: std::str::FromStr>(
    query: &HashMap<String, String>,
    cookies: &HashMap<String, String>,
    key: &str,
    mut persist: impl FnMut(&str),
) -> Option<T> {
    if let Some(raw) = query.get(key) {
        match raw.parse::<T>() {
            Ok(value) => {
                persist(raw);
                return Some(value);
            }
            Err(_) if !raw.is_empty() => {
                tracing::debug!(key, value = %raw, "Ignoring unrecognized sort parameter");
            }
            Err(_) => {}
        }
    }

    cookies.get(key).and_then(|raw| raw.parse().ok())
}
