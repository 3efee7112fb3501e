/*!
Structs to hold configuration data and global variables.
*/
use std::fmt::{Debug, Formatter};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use time::UtcOffset;

use crate::{
    auth::{verifier_by_name, Verifier},
    session::SessionCodec,
    store::{DataStore, MemStore, Store},
};

/// Looked for in the working directory when no path is given.
const DEFAULT_CONFIG_FILE: &str = "leavex.toml";

#[derive(Deserialize)]
struct ConfigFile {
    db_connect_string: Option<String>,
    store: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    templates_dir: Option<String>,
    static_dir: Option<String>,
    session_key: Option<String>,
    admin_password_scheme: Option<String>,
    admin_reg_no: Option<String>,
    admin_password: Option<String>,
    utc_offset: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    Memory,
}

impl std::str::FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "postgres" => Ok(StoreKind::Postgres),
            "memory" => Ok(StoreKind::Memory),
            x => Err(format!("{:?} is not a store kind (postgres, memory).", x)),
        }
    }
}

pub struct Cfg {
    pub db_connect_string: String,
    pub store: StoreKind,
    pub addr: SocketAddr,
    pub templates_dir: PathBuf,
    pub static_dir: PathBuf,
    pub session_key: Option<String>,
    pub admin_password_scheme: String,
    pub admin_reg_no: Option<String>,
    pub admin_password: Option<String>,
    /// Where the hostel is; decides which calendar date "today" is.
    pub utc_offset: UtcOffset,
}

// Hand-written so the connection string and secrets stay out of the logs.
impl Debug for Cfg {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let redact = |o: &Option<String>| o.as_ref().map(|_| "[ redacted ]");
        f.debug_struct("Cfg")
            .field("db_connect_string", &"[ redacted ]")
            .field("store", &self.store)
            .field("addr", &self.addr)
            .field("templates_dir", &self.templates_dir)
            .field("static_dir", &self.static_dir)
            .field("session_key", &redact(&self.session_key))
            .field("admin_password_scheme", &self.admin_password_scheme)
            .field("admin_reg_no", &self.admin_reg_no)
            .field("admin_password", &redact(&self.admin_password))
            .field("utc_offset", &self.utc_offset)
            .finish()
    }
}

impl std::default::Default for Cfg {
    fn default() -> Self {
        Self {
            db_connect_string: "host=localhost user=leavex_test password='leavex_test' dbname=leavex_test".to_owned(),
            store: StoreKind::Postgres,
            addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8001),
            templates_dir: PathBuf::from("templates/"),
            static_dir: PathBuf::from("static/"),
            session_key: None,
            admin_password_scheme: "plain".to_owned(),
            admin_reg_no: None,
            admin_password: None,
            utc_offset: UtcOffset::UTC,
        }
    }
}

impl Cfg {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        let file_contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Unable to read config file {}: {}", path.display(), &e))?;
        Self::from_toml(&file_contents)
    }

    pub fn from_toml(text: &str) -> Result<Self, String> {
        let cf: ConfigFile = toml::from_str(text)
            .map_err(|e| format!("Unable to deserialize config file: {}", &e))?;

        let mut c = Self::default();

        if let Some(s) = cf.db_connect_string {
            c.db_connect_string = s;
        }
        if let Some(s) = cf.store {
            c.store = s.parse()?;
        }
        if let Some(s) = cf.host {
            c.addr.set_ip(
                s.parse().map_err(|e| format!(
                    "Error parsing {:?} as IP address: {}",
                    &s, &e
                ))?
            );
        }
        if let Some(n) = cf.port {
            c.addr.set_port(n);
        }
        if let Some(s) = cf.templates_dir {
            c.templates_dir = PathBuf::from(s);
        }
        if let Some(s) = cf.static_dir {
            c.static_dir = PathBuf::from(s);
        }
        if let Some(s) = cf.session_key {
            if s.is_empty() {
                return Err("session_key, if present, must not be empty.".to_owned());
            }
            c.session_key = Some(s);
        }
        if let Some(s) = cf.admin_password_scheme {
            c.admin_password_scheme = s;
        }
        if let Some(s) = cf.utc_offset {
            c.utc_offset = UtcOffset::parse(&s, crate::OFFSET_FMT).map_err(|e| format!(
                "Error parsing utc_offset {:?} (expected e.g. \"+05:30\"): {}", &s, &e
            ))?;
        }
        c.admin_reg_no = cf.admin_reg_no;
        c.admin_password = cf.admin_password;

        Ok(c)
    }
}

/**
Where to read configuration from: the first command-line argument, then
`LEAVEX_CONFIG`, then `leavex.toml` if it exists. `None` means run on
the defaults.
*/
pub fn config_path<I: Iterator<Item = String>>(mut args: I) -> Option<PathBuf> {
    if let Some(arg) = args.nth(1) {
        return Some(PathBuf::from(arg));
    }
    if let Ok(s) = std::env::var("LEAVEX_CONFIG") {
        return Some(PathBuf::from(s));
    }
    let default = PathBuf::from(DEFAULT_CONFIG_FILE);
    if default.exists() {
        Some(default)
    } else {
        None
    }
}

/**
This guy will haul around the global state and be passed in an
`axum::Extension` to the handlers who need him.
*/
pub struct Glob {
    pub store: Arc<dyn DataStore>,
    pub verifier: Box<dyn Verifier>,
    pub codec: SessionCodec,
    pub addr: SocketAddr,
    pub templates_dir: PathBuf,
    pub static_dir: PathBuf,
    pub utc_offset: UtcOffset,
}

impl Debug for Glob {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        f.debug_struct("Glob")
            .field("verifier", &self.verifier.name())
            .field("codec", &self.codec)
            .field("addr", &self.addr)
            .field("templates_dir", &self.templates_dir)
            .field("static_dir", &self.static_dir)
            .field("utc_offset", &self.utc_offset)
            .finish()
    }
}

/// Insert the configured admin if nobody by that registration number
/// exists yet. An existing row is left alone, password included.
async fn ensure_admin(
    store: &dyn DataStore,
    verifier: &dyn Verifier,
    reg_no: &str,
    password: &str,
) -> Result<(), String> {
    log::trace!("Checking existence of configured Admin {:?}...", reg_no);

    match store.admin_by_reg_no(reg_no).await {
        Err(e) => Err(format!(
            "Error attempting to check existence of Admin {:?}: {}", reg_no, &e
        )),
        Ok(Some(_)) => {
            log::trace!("    ...Admin {:?} present.", reg_no);
            Ok(())
        },
        Ok(None) => {
            if verifier.name() == "argon2" && !password.starts_with("$argon2") {
                return Err(format!(
                    "admin_password must be an Argon2 PHC string when admin_password_scheme is \"argon2\" (see the hash_password binary); refusing to insert Admin {:?}.",
                    reg_no
                ));
            }
            log::info!("Admin {:?} doesn't exist; inserting.", reg_no);
            store.insert_admin(reg_no, password).await.map_err(|e| format!(
                "Error inserting Admin {:?}: {}", reg_no, &e
            ))
        },
    }
}

impl Glob {
    /// Build the global state `cfg` describes, ensuring the database
    /// schema and the configured admin exist.
    pub async fn from_cfg(cfg: Cfg) -> Result<Glob, String> {
        log::trace!("Glob::from_cfg( {:?} ) called.", &cfg);

        let store: Arc<dyn DataStore> = match cfg.store {
            StoreKind::Postgres => {
                log::trace!("Checking state of data DB...");
                let db = Store::new(cfg.db_connect_string.clone());
                db.ensure_db_schema().await.map_err(|e| format!(
                    "Unable to ensure state of data DB: {}", &e
                ))?;
                log::trace!("...data DB okay.");
                Arc::new(db)
            },
            StoreKind::Memory => {
                log::warn!("Using an in-memory store; nothing will outlive this process.");
                Arc::new(MemStore::new())
            },
        };

        let verifier = verifier_by_name(&cfg.admin_password_scheme)?;
        if verifier.name() == "plain" {
            log::warn!("Admin passwords are compared as plaintext. Consider admin_password_scheme = \"argon2\".");
        }

        let codec = match cfg.session_key.as_deref() {
            Some(k) => SessionCodec::new(k.as_bytes()),
            None => {
                log::info!("No session_key configured; sessions won't survive a restart.");
                SessionCodec::with_random_key()
            },
        };

        match (&cfg.admin_reg_no, &cfg.admin_password) {
            (Some(reg_no), Some(password)) => {
                ensure_admin(store.as_ref(), verifier.as_ref(), reg_no, password).await?;
            },
            (None, None) => {},
            _ => {
                log::warn!("Only one of admin_reg_no and admin_password set; not provisioning an Admin.");
            },
        }

        Ok(Glob {
            store,
            verifier,
            codec,
            addr: cfg.addr,
            templates_dir: cfg.templates_dir,
            static_dir: cfg.static_dir,
            utc_offset: cfg.utc_offset,
        })
    }
}

/// Loads system configuration and ensures all appropriate database tables
/// exist.
///
/// Also assures existence of the configured admin.
pub async fn load_configuration(path: Option<&Path>) -> Result<Glob, String> {
    let cfg = match path {
        Some(path) => {
            let cfg = Cfg::from_file(path)?;
            log::info!("Configuration file {} read:\n{:#?}", path.display(), &cfg);
            cfg
        },
        None => {
            let cfg = Cfg::default();
            log::info!("No configuration file; using defaults:\n{:#?}", &cfg);
            cfg
        },
    };

    Glob::from_cfg(cfg).await
}
