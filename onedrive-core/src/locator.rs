use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Addresses a drive item either by path, by id, or by a pre-built API segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemLocator {
    Raw(String),
    Path(String),
    Id(String),
}

impl ItemLocator {
    pub fn path(path: impl Into<String>) -> Self {
        Self::Path(path.into())
    }

    pub fn id(id: impl Into<String>) -> Self {
        Self::Id(id.into())
    }

    pub fn root() -> Self {
        Self::Path(String::new())
    }

    /// Renders the locator as the URL segment that follows the drive prefix.
    pub fn segment(&self) -> String {
        match self {
            ItemLocator::Raw(raw) => raw.clone(),
            ItemLocator::Path(path) => {
                let trimmed = path.trim_start_matches('/');
                if trimmed.is_empty() {
                    "/root".to_string()
                } else {
                    format!("/root:/{trimmed}:")
                }
            }
            ItemLocator::Id(id) => format!("/items/{id}"),
        }
    }

    /// Path-addressed items need `:` to close the path before a sub-resource.
    /// Root and id locators take the sub-resource directly.
    pub(crate) fn with_child(&self, child: &str) -> String {
        let base = self.segment();
        let child = child.trim_start_matches('/');
        if child.is_empty() {
            base
        } else {
            format!("{}/{child}", base.trim_end_matches('/'))
        }
    }
}

impl From<&str> for ItemLocator {
    fn from(value: &str) -> Self {
        Self::Path(value.to_string())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DriveTargetError {
    #[error("unknown drive kind: {0}")]
    UnknownKind(String),
    #[error("id is required for drive kind {0}")]
    MissingId(&'static str),
}

/// Which drive the client talks to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DriveTarget {
    #[default]
    Me,
    AppRoot,
    Drives(String),
    Groups(String),
    Sites(String),
    Users(String),
}

impl DriveTarget {
    pub fn prefix(&self) -> String {
        match self {
            DriveTarget::Me => "/me/drive".to_string(),
            DriveTarget::AppRoot => "/drive/special/approot".to_string(),
            DriveTarget::Drives(id) => format!("/drives/{id}"),
            DriveTarget::Groups(id) => format!("/groups/{id}/drive"),
            DriveTarget::Sites(id) => format!("/sites/{id}/drive"),
            DriveTarget::Users(id) => format!("/users/{id}/drive"),
        }
    }
}

impl FromStr for DriveTarget {
    type Err = DriveTargetError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (kind, id) = match value.split_once(':') {
            Some((kind, id)) => (kind.trim(), Some(id.trim()).filter(|id| !id.is_empty())),
            None => (value.trim(), None),
        };
        let require = |name: &'static str| {
            id.map(str::to_string)
                .ok_or(DriveTargetError::MissingId(name))
        };
        match kind {
            "me" => Ok(DriveTarget::Me),
            "approot" => Ok(DriveTarget::AppRoot),
            "drives" => Ok(DriveTarget::Drives(require("drives")?)),
            "groups" => Ok(DriveTarget::Groups(require("groups")?)),
            "sites" => Ok(DriveTarget::Sites(require("sites")?)),
            "users" => Ok(DriveTarget::Users(require("users")?)),
            other => Err(DriveTargetError::UnknownKind(other.to_string())),
        }
    }
}

/// Ordered OData query options (`$select`, `$expand`, `token`, `format`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ODataQuery {
    pairs: Vec<(String, String)>,
}

impl ODataQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.pairs.push((key.into(), value.into()));
        self
    }

    pub fn select(self, fields: &[&str]) -> Self {
        self.param("$select", fields.join(","))
    }

    pub fn expand(self, value: impl Into<String>) -> Self {
        self.param("$expand", value)
    }

    pub fn top(self, count: u32) -> Self {
        self.param("$top", count.to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub(crate) fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for ODataQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.pairs.is_empty() {
            return Ok(());
        }
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.pairs())
            .finish();
        write!(f, "?{encoded}")
    }
}

/// Joins URL parts so that exactly one `/` separates each of them.
pub(crate) fn compose_url(base: &str, parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|part| !part.is_empty())
        .fold(base.trim_end_matches('/').to_string(), |mut acc, part| {
            if !part.starts_with('/') {
                acc.push('/');
            }
            acc.push_str(part);
            acc
        })
}
