//! Cookie storage.
//!
//! Cookie names and values are percent-encoded the way `encodeURIComponent`
//! does, so any serialized text survives `document.cookie`. Deletion writes
//! an already expired cookie carrying the same attributes the cookie was
//! created with; browsers ignore an expiry whose path or same-site policy
//! does not match.

use crate::error::StorageResult;
use crate::interface::{Adapter, Storage, StorageInterface};
use crate::noop::NoopStorage;
use crate::platform::{DocumentCookies, Platform};
use crate::serialization::{deserialize, serialize};
use crate::warnings::warn_storage_not_found;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Write as _;
use std::rc::Rc;

/// The `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SameSite {
    /// Sent with same-site requests only.
    #[default]
    Strict,
    /// Also sent on top-level navigations.
    Lax,
    /// Sent everywhere (requires `secure`).
    None,
}

impl SameSite {
    /// Attribute value as written in the cookie string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        }
    }
}

/// Attributes written with every cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieOptions {
    /// `path` attribute.
    pub path: Option<String>,
    /// `domain` attribute.
    pub domain: Option<String>,
    /// `secure` flag.
    pub secure: bool,
    /// `samesite` attribute.
    pub same_site: Option<SameSite>,
    /// `max-age` in seconds; `None` makes a session cookie.
    pub max_age: Option<u64>,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            path: Some("/".to_string()),
            domain: None,
            secure: false,
            same_site: Some(SameSite::Strict),
            max_age: None,
        }
    }
}

impl CookieOptions {
    /// Creates the default options (`path=/`, `samesite=Strict`, session
    /// cookie).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the `path` attribute.
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets the `domain` attribute.
    #[must_use]
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Sets the `secure` flag.
    #[must_use]
    pub const fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Sets the `samesite` attribute.
    #[must_use]
    pub const fn same_site(mut self, same_site: Option<SameSite>) -> Self {
        self.same_site = same_site;
        self
    }

    /// Sets the lifetime in seconds.
    #[must_use]
    pub const fn max_age(mut self, seconds: u64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    /// Sets the lifetime in days.
    #[must_use]
    pub const fn expires_in_days(self, days: u64) -> Self {
        self.max_age(days * 24 * 60 * 60)
    }

    fn write_attributes(&self, out: &mut String, expire: bool) {
        if expire {
            out.push_str("; expires=Thu, 01 Jan 1970 00:00:00 GMT; max-age=0");
        } else if let Some(max_age) = self.max_age {
            let _ = write!(out, "; max-age={max_age}");
        }
        if let Some(domain) = &self.domain {
            let _ = write!(out, "; domain={domain}");
        }
        if let Some(path) = &self.path {
            let _ = write!(out, "; path={path}");
        }
        if self.secure {
            out.push_str("; secure");
        }
        if let Some(same_site) = self.same_site {
            let _ = write!(out, "; samesite={}", same_site.as_str());
        }
    }
}

/// Storage implementation that uses cookies.
pub struct CookieStorage {
    cookies: Rc<dyn DocumentCookies>,
    options: CookieOptions,
}

impl CookieStorage {
    /// Creates a cookie storage over `cookies`.
    pub fn new(cookies: Rc<dyn DocumentCookies>, options: CookieOptions) -> Self {
        Self { cookies, options }
    }

    /// Options written with every cookie.
    pub fn options(&self) -> &CookieOptions {
        &self.options
    }

    /// Reads the decoded raw value of cookie `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cookie string cannot be read.
    pub fn get_raw(&self, name: &str) -> StorageResult<Option<String>> {
        let cookie_string = self.cookies.cookie_string()?;
        Ok(find_cookie(&cookie_string, name))
    }

    /// Writes the raw value of cookie `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform refuses the write.
    pub fn set_raw(&self, name: &str, value: &str) -> StorageResult<()> {
        self.cookies
            .write_cookie(&cookie_assignment(name, value, &self.options, false))
    }

    /// Expires cookie `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform refuses the write.
    pub fn erase(&self, name: &str) -> StorageResult<()> {
        self.cookies
            .write_cookie(&cookie_assignment(name, "", &self.options, true))
    }
}

impl std::fmt::Debug for CookieStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieStorage")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<T: Serialize + DeserializeOwned> StorageInterface<T> for CookieStorage {
    fn get_value(&self, key: &str) -> StorageResult<Option<T>> {
        match self.get_raw(key)? {
            Some(text) => deserialize(&text).map(Some),
            None => Ok(None),
        }
    }

    fn set_value(&self, key: &str, value: &T) -> StorageResult<()> {
        self.set_raw(key, &serialize(value)?)
    }

    fn delete_value(&self, key: &str) -> StorageResult<()> {
        self.erase(key)
    }
}

impl<T: Serialize + DeserializeOwned + 'static> From<Rc<Adapter<CookieStorage>>> for Storage<T> {
    fn from(storage: Rc<Adapter<CookieStorage>>) -> Self {
        Storage::Plain(storage)
    }
}

/// Storage implementation that uses the browser cookies, with the default
/// options.
pub fn create_cookie_storage(platform: &Platform) -> Adapter<CookieStorage> {
    create_cookie_storage_with(platform, CookieOptions::default())
}

/// Storage implementation that uses the browser cookies.
pub fn create_cookie_storage_with(
    platform: &Platform,
    options: CookieOptions,
) -> Adapter<CookieStorage> {
    match platform.cookies() {
        Some(cookies) => Adapter::Available(CookieStorage::new(cookies, options)),
        None => {
            warn_storage_not_found("document.cookies", platform);
            Adapter::Unavailable(NoopStorage)
        }
    }
}

/// Builds the string assigned to `document.cookie`.
pub fn cookie_assignment(name: &str, value: &str, options: &CookieOptions, expire: bool) -> String {
    let mut out = format!("{}={}", encode_component(name), encode_component(value));
    options.write_attributes(&mut out, expire);
    out
}

/// Finds cookie `name` in a `document.cookie` string and decodes its value.
///
/// An empty value is returned as is. Expired cookies are dropped from the
/// string by the browser, so they never show up here.
pub fn find_cookie(cookie_string: &str, name: &str) -> Option<String> {
    cookie_string
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(raw_name, _)| decode_component(raw_name) == name)
        .map(|(_, raw_value)| decode_component(raw_value))
}

const fn is_unreserved(byte: u8) -> bool {
    matches!(
        byte,
        b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'-'
            | b'_'
            | b'.'
            | b'!'
            | b'~'
            | b'*'
            | b'\''
            | b'('
            | b')'
    )
}

/// Percent-encodes `input` like `encodeURIComponent`.
pub fn encode_component(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        if is_unreserved(byte) {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "%{byte:02X}");
        }
    }
    out
}

/// Reverses [`encode_component`].
///
/// Malformed escapes are kept as they are instead of failing the read.
pub fn decode_component(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let escaped = input
                .get(i + 1..i + 3)
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(byte) = escaped {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    match String::from_utf8(out) {
        Ok(decoded) => decoded,
        Err(_) => input.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCookies;
    use proptest::prelude::*;

    fn storage() -> (Rc<MemoryCookies>, CookieStorage) {
        let cookies = Rc::new(MemoryCookies::new());
        let storage = CookieStorage::new(cookies.clone(), CookieOptions::default());
        (cookies, storage)
    }

    #[test]
    fn value_is_serialized_and_encoded() {
        let (cookies, storage) = storage();
        storage.set_value("sps-userName", &"John".to_string()).unwrap();
        assert!(cookies
            .cookie_string()
            .unwrap()
            .contains("sps-userName=%22John%22"));

        let value: Option<String> = storage.get_value("sps-userName").unwrap();
        assert_eq!(value.as_deref(), Some("John"));
    }

    #[test]
    fn delete_reuses_creation_attributes() {
        let (cookies, storage) = storage();
        storage.set_value("k", &1).unwrap();
        StorageInterface::<i32>::delete_value(&storage, "k").unwrap();

        let last = cookies.last_assignment().unwrap();
        assert!(last.contains("max-age=0"));
        assert!(last.ends_with("path=/; samesite=Strict"));
        let value: Option<i32> = storage.get_value("k").unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn assignment_carries_options() {
        let options = CookieOptions::new()
            .path("/")
            .domain("example.org")
            .secure(true)
            .max_age(60)
            .same_site(Some(SameSite::Lax));
        assert_eq!(
            cookie_assignment("a b", "x;y", &options, false),
            "a%20b=x%3By; max-age=60; domain=example.org; path=/; secure; samesite=Lax"
        );
    }

    #[test]
    fn default_options_scope_to_site_root() {
        assert_eq!(
            cookie_assignment("k", "1", &CookieOptions::default(), false),
            "k=1; path=/; samesite=Strict"
        );
        assert_eq!(CookieOptions::new().expires_in_days(2).max_age, Some(172_800));
    }

    #[test]
    fn find_cookie_skips_other_names() {
        let header = "other=1; sps-userName=%22John%22; third";
        assert_eq!(find_cookie(header, "sps-userName").as_deref(), Some("\"John\""));
        assert_eq!(find_cookie(header, "missing"), None);
        assert_eq!(find_cookie("", "missing"), None);
    }

    #[test]
    fn empty_value_is_present() {
        assert_eq!(find_cookie("a=1; empty=", "empty").as_deref(), Some(""));

        let (cookies, storage) = storage();
        storage.set_raw("empty", "").unwrap();
        assert_eq!(storage.get_raw("empty").unwrap().as_deref(), Some(""));

        StorageInterface::<String>::delete_value(&storage, "empty").unwrap();
        assert_eq!(storage.get_raw("empty").unwrap(), None);
        assert!(!cookies.cookie_string().unwrap().contains("empty"));
    }

    #[test]
    fn encoding_matches_encode_uri_component() {
        assert_eq!(encode_component("\"John\""), "%22John%22");
        assert_eq!(encode_component("a-b_c.d!e~f*g'h(i)j"), "a-b_c.d!e~f*g'h(i)j");
        assert_eq!(encode_component("é"), "%C3%A9");
    }

    #[test]
    fn malformed_escape_is_kept() {
        assert_eq!(decode_component("100%"), "100%");
        assert_eq!(decode_component("%zz"), "%zz");
    }

    #[test]
    fn missing_cookie_backend_falls_back_to_noop() {
        let adapter = create_cookie_storage(&Platform::detached());
        assert!(!adapter.is_available());
        let value: Option<String> = adapter.get_value("anything").unwrap();
        assert!(value.is_none());
    }

    proptest! {
        #[test]
        fn component_encoding_roundtrips(input in "\\PC*") {
            prop_assert_eq!(decode_component(&encode_component(&input)), input);
        }
    }
}
