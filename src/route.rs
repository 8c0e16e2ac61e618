//! Typed access to the query string of the current location.
//!
//! [`RouteQuery`] reads parameters from a [`Router`] with a default, an
//! optional validator and an optional parser, and merges new parameters into
//! the current location with a history replacement.
//!
//! # Example
//!
//! ```ignore
//! let router = MemoryRouter::from_url("/users?page=2")?;
//! let route = RouteQuery::new(router);
//!
//! let page = route.get_query_value(QueryParam::parsed("page", 1u32, |v| v.first()?.parse().ok()));
//! assert_eq!(page, 2);
//!
//! route.navigate_to([("page", Some("3"))]);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use parking_lot::Mutex;
use url::{form_urlencoded, Url};

/// Value of one query parameter. A repeated parameter becomes `Multiple`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryValue {
    /// `?k=v`
    Single(String),
    /// `?k=a&k=b`
    Multiple(Vec<String>),
}

impl QueryValue {
    /// The value if this is `Single`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            QueryValue::Single(value) => Some(value.as_str()),
            QueryValue::Multiple(_) => None,
        }
    }

    /// The single value, or the first of several.
    pub fn first(&self) -> Option<&str> {
        match self {
            QueryValue::Single(value) => Some(value.as_str()),
            QueryValue::Multiple(values) => values.first().map(String::as_str),
        }
    }

    /// All values in order.
    pub fn values(&self) -> Vec<&str> {
        match self {
            QueryValue::Single(value) => vec![value.as_str()],
            QueryValue::Multiple(values) => values.iter().map(String::as_str).collect(),
        }
    }

    /// Returns `true` for an empty single value; such a parameter reads as absent.
    pub fn is_empty(&self) -> bool {
        matches!(self, QueryValue::Single(value) if value.is_empty())
    }

    fn push(&mut self, value: String) {
        match self {
            QueryValue::Single(first) => {
                *self = QueryValue::Multiple(vec![std::mem::take(first), value]);
            }
            QueryValue::Multiple(values) => values.push(value),
        }
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        QueryValue::Single(value)
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::Single(value.to_string())
    }
}

impl From<Vec<String>> for QueryValue {
    fn from(values: Vec<String>) -> Self {
        QueryValue::Multiple(values)
    }
}

macro_rules! query_value_from_display {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for QueryValue {
                fn from(value: $ty) -> Self {
                    QueryValue::Single(value.to_string())
                }
            }
        )*
    };
}

query_value_from_display!(bool, i32, i64, u32, u64, usize);

/// Errors from parsing a [`Location`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    /// The input does not resolve to a URL.
    #[error("invalid location {input:?}: {source}")]
    InvalidUrl {
        input: String,
        #[source]
        source: url::ParseError,
    },
}

/// A path plus its decoded query parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Location {
    /// Path without query string or fragment.
    pub path: String,
    /// Decoded query parameters, ordered by name.
    pub query: BTreeMap<String, QueryValue>,
}

impl Location {
    /// A location with no query parameters.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: BTreeMap::new(),
        }
    }

    /// Parse `path?k=v&k2=v2`, or an absolute URL whose origin is dropped.
    ///
    /// The query is decoded as `application/x-www-form-urlencoded`: `+` is a
    /// space, malformed escapes are kept as written and invalid UTF-8 is
    /// replaced. A fragment is dropped.
    pub fn parse(input: &str) -> Result<Self, RouteError> {
        let invalid = |source: url::ParseError| RouteError::InvalidUrl {
            input: input.to_string(),
            source,
        };
        let url = Url::parse(BASE_URL)
            .and_then(|base| base.join(input))
            .map_err(invalid)?;

        let mut query: BTreeMap<String, QueryValue> = BTreeMap::new();
        for (key, value) in url.query_pairs() {
            let value = value.into_owned();
            match query.get_mut(&*key) {
                Some(existing) => existing.push(value),
                None => {
                    query.insert(key.into_owned(), QueryValue::Single(value));
                }
            }
        }

        Ok(Self {
            path: url.path().to_string(),
            query,
        })
    }

    /// Set a parameter, replacing any previous value.
    ///
    /// An empty `Multiple` has no URL form, so it removes the parameter.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.set_query(key, Some(value.into()));
        self
    }

    /// Set a parameter, or remove it when `value` is `None` or an empty `Multiple`.
    pub fn set_query(&mut self, key: impl Into<String>, value: Option<QueryValue>) {
        let key = key.into();
        match value {
            Some(QueryValue::Multiple(values)) if values.is_empty() => {
                self.query.remove(&key);
            }
            Some(value) => {
                self.query.insert(key, value);
            }
            None => {
                self.query.remove(&key);
            }
        }
    }
}

/// Relative locations resolve against this; only path and query are kept.
const BASE_URL: &str = "http://localhost/";

impl FromStr for Location {
    type Err = RouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Location::parse(s)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)?;
        let mut pairs = form_urlencoded::Serializer::new(String::new());
        for (key, value) in &self.query {
            for item in value.values() {
                pairs.append_pair(key, item);
            }
        }
        let query = pairs.finish();
        if !query.is_empty() {
            write!(f, "?{}", query)?;
        }
        Ok(())
    }
}

/// Access to the current location and its history.
pub trait Router: Send + Sync {
    /// The current location.
    fn current(&self) -> Location;

    /// Navigate to `location`, adding a history entry.
    fn push(&self, location: Location);

    /// Navigate to `location`, replacing the current history entry.
    fn replace(&self, location: Location);
}

/// In-memory [`Router`] with a history stack.
#[derive(Debug)]
pub struct MemoryRouter {
    history: Mutex<Vec<Location>>,
}

impl MemoryRouter {
    /// Create a router positioned at `initial`.
    pub fn new(initial: Location) -> Self {
        Self {
            history: Mutex::new(vec![initial]),
        }
    }

    /// Create a router positioned at a parsed URL.
    pub fn from_url(url: &str) -> Result<Self, RouteError> {
        Ok(Self::new(Location::parse(url)?))
    }

    /// Number of history entries.
    pub fn history_len(&self) -> usize {
        self.history.lock().len()
    }

    /// Drop the current entry and return to the previous one.
    ///
    /// Returns `false` when there is nothing to go back to.
    pub fn back(&self) -> bool {
        let mut history = self.history.lock();
        if history.len() > 1 {
            history.pop();
            true
        } else {
            false
        }
    }
}

impl Default for MemoryRouter {
    fn default() -> Self {
        Self::new(Location::new("/"))
    }
}

impl Router for MemoryRouter {
    fn current(&self) -> Location {
        self.history.lock().last().cloned().unwrap_or_default()
    }

    fn push(&self, location: Location) {
        self.history.lock().push(location);
    }

    fn replace(&self, location: Location) {
        let mut history = self.history.lock();
        match history.last_mut() {
            Some(current) => *current = location,
            None => history.push(location),
        }
    }
}

impl<R: Router + ?Sized> Router for std::sync::Arc<R> {
    fn current(&self) -> Location {
        (**self).current()
    }

    fn push(&self, location: Location) {
        (**self).push(location)
    }

    fn replace(&self, location: Location) {
        (**self).replace(location)
    }
}

/// Conversion used by [`QueryParam::raw`].
pub trait FromQueryValue: Sized {
    /// Convert the raw parameter, `None` if it does not fit.
    fn from_query_value(value: &QueryValue) -> Option<Self>;
}

impl FromQueryValue for String {
    fn from_query_value(value: &QueryValue) -> Option<Self> {
        value.first().map(str::to_string)
    }
}

impl FromQueryValue for Vec<String> {
    fn from_query_value(value: &QueryValue) -> Option<Self> {
        Some(value.values().into_iter().map(str::to_string).collect())
    }
}

impl FromQueryValue for QueryValue {
    fn from_query_value(value: &QueryValue) -> Option<Self> {
        Some(value.clone())
    }
}

type Validator<'a> = Box<dyn Fn(&QueryValue) -> bool + 'a>;
type Parser<'a, T> = Box<dyn Fn(&QueryValue) -> Option<T> + 'a>;

/// Description of one parameter read by [`RouteQuery::get_query_value`].
pub struct QueryParam<'a, T> {
    key: &'a str,
    default: T,
    validate: Option<Validator<'a>>,
    parse: Parser<'a, T>,
}

impl<'a, T> QueryParam<'a, T> {
    /// Read `key` through `parse`; `None` from the parser yields the default.
    pub fn parsed<F>(key: &'a str, default: T, parse: F) -> Self
    where
        F: Fn(&QueryValue) -> Option<T> + 'a,
    {
        Self {
            key,
            default,
            validate: None,
            parse: Box::new(parse),
        }
    }

    /// Reject values for which `validate` returns `false`, yielding the default.
    pub fn validate<F>(mut self, validate: F) -> Self
    where
        F: Fn(&QueryValue) -> bool + 'a,
    {
        self.validate = Some(Box::new(validate));
        self
    }
}

impl<'a, T: FromQueryValue + 'a> QueryParam<'a, T> {
    /// Read `key` without a custom parser.
    pub fn raw(key: &'a str, default: T) -> Self {
        Self::parsed(key, default, T::from_query_value)
    }
}

/// Query-string helper over a [`Router`].
#[derive(Debug)]
pub struct RouteQuery<R> {
    router: R,
}

impl<R: Router> RouteQuery<R> {
    /// Wrap a router.
    pub fn new(router: R) -> Self {
        Self { router }
    }

    /// The wrapped router.
    pub fn router(&self) -> &R {
        &self.router
    }

    /// Read one parameter of the current location.
    ///
    /// Returns the default if the parameter is absent or empty, if the
    /// validator rejects it, or if the parser yields `None`.
    pub fn get_query_value<T>(&self, param: QueryParam<'_, T>) -> T {
        let location = self.router.current();
        let Some(value) = location.query.get(param.key).filter(|v| !v.is_empty()) else {
            return param.default;
        };
        if let Some(validate) = &param.validate {
            if !validate(value) {
                return param.default;
            }
        }
        (param.parse)(value).unwrap_or(param.default)
    }

    /// Merge `params` into the current query and replace the current entry.
    ///
    /// A `None` value removes its parameter.
    pub fn navigate_to<I, K, V>(&self, params: I)
    where
        I: IntoIterator<Item = (K, Option<V>)>,
        K: Into<String>,
        V: Into<QueryValue>,
    {
        let mut location = self.router.current();
        for (key, value) in params {
            location.set_query(key, value.map(Into::into));
        }
        self.router.replace(location);
    }
}
