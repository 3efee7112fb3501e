/*!
Who is logged in, persisted in storage that belongs to the browser.

A `SessionStore` keeps at most one `Identity` under `STORAGE_KEY` in some
`Storage`. On a web server that storage is the browser's cookie jar,
reached through `CookieStorage`; tests use `MemStorage`.

The stored value is the identity's JSON followed by an HMAC over it:

```text
base64url(json) "." base64url(HMAC-SHA256(key, json))
```

Anything that doesn't decode, doesn't verify, or doesn't parse is treated
as nobody being logged in.
*/
use std::collections::HashMap;
use std::sync::Arc;

use axum::http::header::{HeaderMap, COOKIE};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;

use crate::user::Identity;

type HmacSha256 = Hmac<Sha256>;

/// The single well-known key the identity is kept under.
pub const STORAGE_KEY: &str = "leavex_user";

/// How long the browser keeps the identity cookie (a year, in seconds).
const COOKIE_MAX_AGE: u64 = 365 * 24 * 60 * 60;

/// Browsers need only keep `name=value` pairs up to this many bytes.
pub const MAX_PERSISTED_BYTES: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("identity could not be encoded")]
    Encode,
    #[error("encoded identity is {0} bytes, more than a cookie can hold")]
    TooLarge(usize),
}

/// Browser-local key/value storage.
pub trait Storage {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String);
    fn remove(&mut self, key: &str);
}

#[derive(Debug, Default, Clone)]
pub struct MemStorage(HashMap<String, String>);

impl Storage for MemStorage {
    fn get(&self, key: &str) -> Option<String> { self.0.get(key).cloned() }
    fn set(&mut self, key: &str, value: String) { self.0.insert(key.to_owned(), value); }
    fn remove(&mut self, key: &str) { self.0.remove(key); }
}

/**
The cookies a request arrived with, plus the `Set-Cookie` values the
response should carry to reflect any changes.
*/
#[derive(Debug, Default, Clone)]
pub struct CookieStorage {
    cookies: HashMap<String, String>,
    set_cookies: Vec<String>,
}

impl CookieStorage {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut cookies: HashMap<String, String> = HashMap::new();
        for value in headers.get_all(COOKIE).iter() {
            let value = match value.to_str() {
                Ok(s) => s,
                Err(e) => {
                    log::warn!("Ignoring unreadable Cookie header: {}", &e);
                    continue;
                },
            };
            for pair in value.split(';') {
                if let Some((k, v)) = pair.trim().split_once('=') {
                    cookies.insert(k.trim().to_owned(), v.trim().to_owned());
                }
            }
        }

        Self { cookies, set_cookies: Vec::new() }
    }

    /// `Set-Cookie` header values for every change made so far.
    pub fn set_cookies(&self) -> &[String] { &self.set_cookies }
}

impl Storage for CookieStorage {
    fn get(&self, key: &str) -> Option<String> { self.cookies.get(key).cloned() }

    fn set(&mut self, key: &str, value: String) {
        self.set_cookies.push(format!(
            "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
            key, &value, COOKIE_MAX_AGE
        ));
        self.cookies.insert(key.to_owned(), value);
    }

    fn remove(&mut self, key: &str) {
        self.set_cookies.push(format!(
            "{}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax", key
        ));
        self.cookies.remove(key);
    }
}

/// Signs and verifies persisted identities.
#[derive(Clone)]
pub struct SessionCodec {
    key: Arc<[u8]>,
}

impl std::fmt::Debug for SessionCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("SessionCodec { key: [ redacted ] }")
    }
}

impl SessionCodec {
    pub fn new(key: &[u8]) -> Self {
        Self { key: Arc::from(key) }
    }

    /// A codec with a fresh random key. Identities it signs won't verify
    /// under any other codec, including the next process's.
    pub fn with_random_key() -> Self {
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        Self::new(&key)
    }

    fn mac(&self) -> Option<HmacSha256> {
        match HmacSha256::new_from_slice(&self.key) {
            Ok(m) => Some(m),
            Err(e) => {
                log::error!("Unable to key session HMAC: {}", &e);
                None
            },
        }
    }

    pub fn encode(&self, id: &Identity) -> Option<String> {
        let json = match serde_json::to_vec(id) {
            Ok(v) => v,
            Err(e) => {
                log::error!("Error serializing identity {:?}: {}", id.reg_no(), &e);
                return None;
            },
        };

        let mut mac = self.mac()?;
        mac.update(&json);
        let tag = mac.finalize().into_bytes();

        Some(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&json),
            URL_SAFE_NO_PAD.encode(tag)
        ))
    }

    pub fn decode(&self, value: &str) -> Option<Identity> {
        let (body, tag) = value.split_once('.')?;
        let json = URL_SAFE_NO_PAD.decode(body).ok()?;
        let tag = URL_SAFE_NO_PAD.decode(tag).ok()?;

        let mut mac = self.mac()?;
        mac.update(&json);
        if mac.verify_slice(&tag).is_err() {
            log::warn!("Persisted identity failed verification; ignoring it.");
            return None;
        }

        match serde_json::from_slice(&json) {
            Ok(id) => Some(id),
            Err(e) => {
                log::warn!("Persisted identity doesn't parse; ignoring it: {}", &e);
                None
            },
        }
    }
}

/// The one identity persisted in `S`.
pub struct SessionStore<S: Storage> {
    storage: S,
    codec: SessionCodec,
}

impl<S: Storage> SessionStore<S> {
    pub fn new(storage: S, codec: SessionCodec) -> Self {
        Self { storage, codec }
    }

    pub fn load(&self) -> Option<Identity> {
        let value = self.storage.get(STORAGE_KEY)?;
        let id = self.codec.decode(&value);
        if id.is_none() {
            log::debug!("{} present but unusable; treating as logged out.", STORAGE_KEY);
        }
        id
    }

    /**
    Replace whatever identity was stored with `id`.

    If `id` can't be persisted whole, nothing is stored and the previous
    identity (if any) stays.
    */
    pub fn save(&mut self, id: &Identity) -> Result<(), SessionError> {
        log::trace!("SessionStore::save( {:?} ) called.", id.reg_no());
        let value = match self.codec.encode(id) {
            Some(value) => value,
            None => {
                log::error!("Unable to persist identity {:?}.", id.reg_no());
                return Err(SessionError::Encode);
            },
        };

        let size = STORAGE_KEY.len() + 1 + value.len();
        if size > MAX_PERSISTED_BYTES {
            log::error!(
                "Identity {:?} encodes to {} bytes; refusing to persist it.",
                id.reg_no(), size
            );
            return Err(SessionError::TooLarge(size));
        }

        self.storage.set(STORAGE_KEY, value);
        Ok(())
    }

    pub fn clear(&mut self) {
        log::trace!("SessionStore::clear() called.");
        self.storage.remove(STORAGE_KEY);
    }

    pub fn storage(&self) -> &S { &self.storage }
}

/**
The session as the router sees it.

`Loading` holds until the store has been read once; guards must not treat
it as logged out.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    Loading,
    Ready(Option<Identity>),
}

impl SessionState {
    pub fn hydrate<S: Storage>(store: &SessionStore<S>) -> Self {
        SessionState::Ready(store.load())
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            SessionState::Ready(Some(id)) => Some(id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use time::macros::{date, datetime};

    use crate::tests::ensure_logging;
    use crate::user::{tests::sample_student, Admin};

    fn student() -> Identity {
        Identity::Student(sample_student(7, "CS2024001", date!(2005 - 03 - 15)))
    }

    fn admin() -> Identity {
        Identity::Admin(Admin {
            id: 1,
            reg_no: "ADMIN001".to_owned(),
            created_at: datetime!(2024-01-01 00:00 UTC),
        })
    }

    #[test]
    fn save_load_clear() {
        ensure_logging();
        let mut s = SessionStore::new(MemStorage::default(), SessionCodec::new(b"k"));
        assert_eq!(s.load(), None);

        s.save(&student()).unwrap();
        assert_eq!(s.load(), Some(student()));
        assert_eq!(SessionState::hydrate(&s).identity(), Some(&student()));

        s.save(&admin()).unwrap();
        assert_eq!(s.load(), Some(admin()));

        s.clear();
        assert_eq!(s.load(), None);
        assert_eq!(SessionState::hydrate(&s), SessionState::Ready(None));
    }

    #[test]
    fn oversized_identity_is_not_persisted() {
        ensure_logging();
        let mut s = SessionStore::new(MemStorage::default(), SessionCodec::new(b"k"));
        s.save(&admin()).unwrap();

        let mut big = sample_student(7, "CS2024001", date!(2005 - 03 - 15));
        big.parent_address = "x".repeat(3200);
        let err = s.save(&Identity::Student(big)).unwrap_err();
        assert!(matches!(err, SessionError::TooLarge(n) if n > MAX_PERSISTED_BYTES));
        assert_eq!(s.load(), Some(admin()));

        let mut cookies = SessionStore::new(CookieStorage::default(), SessionCodec::new(b"k"));
        let mut big = sample_student(7, "CS2024001", date!(2005 - 03 - 15));
        big.parent_address = "x".repeat(3200);
        assert!(cookies.save(&Identity::Student(big)).is_err());
        assert!(cookies.storage().set_cookies().is_empty());

        cookies.save(&student()).unwrap();
        let sc = &cookies.storage().set_cookies()[0];
        let pair = sc.split(';').next().unwrap();
        assert!(pair.len() <= MAX_PERSISTED_BYTES);
    }

    #[test]
    fn corrupt_values_mean_nobody() {
        ensure_logging();
        let codec = SessionCodec::new(b"k");
        let good = codec.encode(&student()).unwrap();

        for bad in [
            String::new(),
            "garbage".to_owned(),
            "not.base64!".to_owned(),
            format!("{}x", &good),
            good.replace('.', ""),
        ] {
            let mut st = MemStorage::default();
            st.set(STORAGE_KEY, bad);
            let s = SessionStore::new(st, codec.clone());
            assert_eq!(s.load(), None);
        }

        // Signed, but not an identity.
        let json = br#"{"userType":"warden","reg_no":"X"}"#;
        let mut mac = HmacSha256::new_from_slice(b"k").unwrap();
        mac.update(json);
        let forged = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(json),
            URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
        );
        assert_eq!(codec.decode(&forged), None);
    }

    #[test]
    fn tampered_identity_is_rejected() {
        let codec = SessionCodec::new(b"k");
        let good = codec.encode(&student()).unwrap();
        let (_, tag) = good.split_once('.').unwrap();

        let mut v = serde_json::to_value(student()).unwrap();
        v["userType"] = "admin".into();
        let body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&v).unwrap());
        assert_eq!(codec.decode(&format!("{}.{}", body, tag)), None);

        assert_eq!(SessionCodec::new(b"other key").decode(&good), None);
        assert_eq!(SessionCodec::with_random_key().decode(&good), None);
    }

    #[test]
    fn cookie_storage() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; leavex_user=abc.def"));
        let mut c = CookieStorage::from_headers(&headers);
        assert_eq!(c.get(STORAGE_KEY).as_deref(), Some("abc.def"));
        assert_eq!(c.get("theme").as_deref(), Some("dark"));
        assert!(c.set_cookies().is_empty());

        c.set(STORAGE_KEY, "xyz.uvw".to_owned());
        assert_eq!(c.get(STORAGE_KEY).as_deref(), Some("xyz.uvw"));
        c.remove(STORAGE_KEY);
        assert_eq!(c.get(STORAGE_KEY), None);

        let sc = c.set_cookies();
        assert_eq!(sc.len(), 2);
        assert!(sc[0].starts_with("leavex_user=xyz.uvw; Path=/; Max-Age="));
        assert!(sc[1].starts_with("leavex_user=; Path=/; Max-Age=0"));
    }

    #[test]
    fn loading_has_no_identity() {
        assert_eq!(SessionState::Loading.identity(), None);
    }
}
