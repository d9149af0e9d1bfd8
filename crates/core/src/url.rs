//! Produced-url encoding and parsing.
//!
//! A produced url has the bit-exact shape
//! `{content_host}{virtual_path}/{key}-{signature}-{file_name}` where `key` and
//! `signature` are 32 lower-case hex characters each. Sprites drop the file
//! name and end in `{key}-{signature}.png`.
//!
//! The `parse_*` functions are total: malformed input yields the nil key,
//! the zero signature, or `None`.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::Error;
use crate::fingerprint::Fingerprint;

const KEY_LEN: usize = 32;
const SIGNATURE_OFFSET: usize = KEY_LEN + 1;
const SIGNATURE_LEN: usize = 32;

/// Stable identifier for one logical bundle of resources.
///
/// The key of a bundle is the fingerprint of its `::`-joined url list, so the
/// same list always reduces under the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ResourceKey(Uuid);

impl ResourceKey {
    /// The nil key. Passed to a flush it means "everything".
    pub const NIL: ResourceKey = ResourceKey(Uuid::nil());

    pub fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Key for a `::`-joined url list.
    pub fn for_urls(url_list: &str) -> Self {
        Self(Fingerprint::of_str(Some(url_list)).as_uuid())
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Lower-case hex, 32 characters, no dashes.
    pub fn to_hex(&self) -> String {
        self.0.simple().to_string()
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for ResourceKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::try_parse(s.trim())
            .map(Self)
            .map_err(|e| Error::InvalidInput(format!("invalid resource key {s:?}: {e}")))
    }
}

impl Serialize for ResourceKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ResourceKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Classification of a produced artifact; drives file name and mime type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Css,
    JavaScript,
    Sprite,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Css => "css",
            ResourceKind::JavaScript => "javascript",
            ResourceKind::Sprite => "sprite",
        }
    }

    /// Infer the kind from a file name's extension.
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let (_, ext) = file_name.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "css" => Some(ResourceKind::Css),
            "js" => Some(ResourceKind::JavaScript),
            "png" => Some(ResourceKind::Sprite),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "css" | "style" => Ok(ResourceKind::Css),
            "js" | "javascript" | "script" => Ok(ResourceKind::JavaScript),
            "png" | "sprite" => Ok(ResourceKind::Sprite),
            other => Err(Error::UnknownResourceKind(other.to_string())),
        }
    }
}

/// Builds produced urls for a content host and virtual path.
#[derive(Debug, Clone)]
pub struct UrlCodec {
    content_host: String,
    virtual_path: String,
    file_names: HashMap<ResourceKind, String>,
}

impl UrlCodec {
    pub const CSS_FILE_NAME: &'static str = "RequestReducedStyle.css";
    pub const JAVASCRIPT_FILE_NAME: &'static str = "RequestReducedScript.js";
    pub const SPRITE_EXTENSION: &'static str = ".png";

    /// Create a codec with the default file name registry.
    ///
    /// Trailing slashes on either argument are dropped so urls never contain `//`.
    pub fn new(content_host: impl Into<String>, virtual_path: impl Into<String>) -> Self {
        let content_host = content_host.into().trim_end_matches('/').to_string();
        let virtual_path = virtual_path.into().trim_end_matches('/').to_string();

        let file_names = HashMap::from([
            (ResourceKind::Css, Self::CSS_FILE_NAME.to_string()),
            (ResourceKind::JavaScript, Self::JAVASCRIPT_FILE_NAME.to_string()),
            (ResourceKind::Sprite, Self::SPRITE_EXTENSION.to_string()),
        ]);

        Self { content_host, virtual_path, file_names }
    }

    /// Override the file name registered for `kind`.
    ///
    /// A name starting with `.` is appended as a bare extension
    /// (`{key}-{signature}.ext`) rather than as a third segment.
    pub fn with_file_name(mut self, kind: ResourceKind, file_name: impl Into<String>) -> Self {
        self.file_names.insert(kind, file_name.into());
        self
    }

    /// Unregister `kind`; building a url for it then fails.
    pub fn without_kind(mut self, kind: ResourceKind) -> Self {
        self.file_names.remove(&kind);
        self
    }

    pub fn content_host(&self) -> &str {
        &self.content_host
    }

    pub fn virtual_path(&self) -> &str {
        &self.virtual_path
    }

    /// Registered file name for `kind`.
    pub fn file_name(&self, kind: ResourceKind) -> Result<&str, Error> {
        self.file_names
            .get(&kind)
            .map(String::as_str)
            .ok_or_else(|| Error::UnknownResourceKind(kind.to_string()))
    }

    /// Build a url whose signature is the fingerprint of `content`.
    pub fn build_url(&self, key: ResourceKey, content: &[u8], kind: ResourceKind) -> Result<String, Error> {
        let signature = Fingerprint::of_bytes(content).to_hex();
        self.format_url(key, &signature, kind)
    }

    /// Build a url from a precomputed signature. Dashes are stripped and hex lower-cased.
    pub fn build_url_with_signature(
        &self, key: ResourceKey, signature: &str, kind: ResourceKind,
    ) -> Result<String, Error> {
        let signature = signature.replace('-', "").to_ascii_lowercase();
        self.format_url(key, &signature, kind)
    }

    /// Rebuild the full url for a stored file name.
    pub fn url_for_file_name(&self, file_name: &str) -> String {
        format!("{}{}/{}", self.content_host, self.virtual_path, file_name)
    }

    fn format_url(&self, key: ResourceKey, signature: &str, kind: ResourceKind) -> Result<String, Error> {
        let name = self.file_name(kind)?;
        let file_name = if name.starts_with('.') {
            format!("{}-{}{}", key.to_hex(), signature, name)
        } else {
            format!("{}-{}-{}", key.to_hex(), signature, name)
        };
        Ok(self.url_for_file_name(&file_name))
    }
}

/// Last path segment of `url`, without query or fragment.
///
/// Returns `None` for empty input or a url ending in `/`.
pub fn parse_file_name(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let segment = path.rsplit('/').next().unwrap_or_default();
    if segment.is_empty() { None } else { Some(segment) }
}

/// Resource key embedded in a produced url, or [`ResourceKey::NIL`].
pub fn parse_key(url: &str) -> ResourceKey {
    parse_file_name(url)
        .and_then(|name| name.split('-').next())
        .and_then(|token| Uuid::try_parse(token).ok())
        .map(ResourceKey)
        .unwrap_or(ResourceKey::NIL)
}

/// Signature embedded in a produced url, or the zero fingerprint's hex.
pub fn parse_signature(url: &str) -> String {
    parse_file_name(url)
        .and_then(|name| name.get(SIGNATURE_OFFSET..SIGNATURE_OFFSET + SIGNATURE_LEN))
        .filter(|sig| sig.bytes().all(|b| b.is_ascii_hexdigit()))
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| Fingerprint::ZERO.to_hex())
}
