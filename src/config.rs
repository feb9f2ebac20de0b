//! Connection parameters and the `key value` configuration file

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::protocol::{poll, DEFAULT_PORT};

// Bare config names resolve here: `-c prod` -> /etc/zs/prod.conf
pub const SYSTEM_CONFIG_DIR: &str = "/etc/zs";

/// Everything a session needs to reach and log in to one server
#[derive(Clone)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub verbosity: u8,
    pub max_tries: u32,
    pub poll_interval: Duration,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        ConnectionParams {
            host: String::new(),
            port: DEFAULT_PORT,
            user: String::new(),
            password: String::new(),
            verbosity: 0,
            max_tries: poll::DEFAULT_MAX_TRIES,
            poll_interval: poll::default_interval(),
        }
    }
}

// Keep the password out of debug output
impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &if self.password.is_empty() { "" } else { "******" })
            .field("verbosity", &self.verbosity)
            .field("max_tries", &self.max_tries)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl ConnectionParams {
    /// Login is attempted only when a user is configured
    pub fn has_login(&self) -> bool {
        !self.user.is_empty()
    }

    /// Load a config file by path, or by bare name from [`SYSTEM_CONFIG_DIR`]
    pub fn apply_config_file(&mut self, name: &str) -> Result<(), ConfigError> {
        let path = resolve_config_path(name);
        let text = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        self.apply_config_str(&text)
    }

    /// Apply `key value` lines. Blank lines and `#`/`;` comments are skipped.
    pub fn apply_config_str(&mut self, text: &str) -> Result<(), ConfigError> {
        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim_start();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            let (key, value) = match line.split_once(char::is_whitespace) {
                Some((k, v)) => (k, v.trim()),
                None => (line.trim_end(), ""),
            };
            if value.is_empty() {
                return Err(ConfigError::MissingValue {
                    line: line_no,
                    key: key.to_string(),
                });
            }

            let invalid = || ConfigError::InvalidValue {
                line: line_no,
                key: key.to_string(),
                value: value.to_string(),
            };
            match key {
                "host" | "server" => self.host = value.to_string(),
                "user" | "username" => self.user = value.to_string(),
                "password" => self.password = value.to_string(),
                "port" => self.port = value.parse().map_err(|_| invalid())?,
                "tries" | "maxtries" => {
                    self.max_tries = value.parse().map_err(|_| invalid())?;
                }
                _ => {
                    return Err(ConfigError::UnknownKey {
                        line: line_no,
                        key: key.to_string(),
                    })
                }
            }
        }
        Ok(())
    }
}

pub fn resolve_config_path(name: &str) -> PathBuf {
    if name.contains('/') || name.contains('.') {
        PathBuf::from(name)
    } else {
        Path::new(SYSTEM_CONFIG_DIR).join(format!("{}.conf", name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let p = ConnectionParams::default();
        assert_eq!(p.port, 21);
        assert_eq!(p.max_tries, 100);
        assert_eq!(p.poll_interval, Duration::from_millis(250));
        assert!(!p.has_login());
    }

    #[test]
    fn test_parse_all_keys() {
        let mut p = ConnectionParams::default();
        p.apply_config_str(
            "# source box\n\
             ; legacy comment\n\
             \n\
             server   as400.example.com\n\
             user QPGMR\n\
             password  s3cret \n\
             port 2121\n\
             maxtries 7\n",
        )
        .unwrap();
        assert_eq!(p.host, "as400.example.com");
        assert_eq!(p.user, "QPGMR");
        assert_eq!(p.password, "s3cret");
        assert_eq!(p.port, 2121);
        assert_eq!(p.max_tries, 7);
    }

    #[test]
    fn test_aliases() {
        let mut p = ConnectionParams::default();
        p.apply_config_str("host h1\nusername u1\ntries 3\n").unwrap();
        assert_eq!(p.host, "h1");
        assert_eq!(p.user, "u1");
        assert_eq!(p.max_tries, 3);
    }

    #[test]
    fn test_missing_value() {
        let mut p = ConnectionParams::default();
        let err = p.apply_config_str("host h1\npassword\n").unwrap_err();
        match err {
            ConfigError::MissingValue { line, key } => {
                assert_eq!(line, 2);
                assert_eq!(key, "password");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_key_and_bad_port() {
        let mut p = ConnectionParams::default();
        assert!(matches!(
            p.apply_config_str("colour blue\n"),
            Err(ConfigError::UnknownKey { line: 1, .. })
        ));
        assert!(matches!(
            p.apply_config_str("port ftp\n"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_config_file_and_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("target.conf");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "server 10.0.0.2").unwrap();
        drop(f);

        let mut p = ConnectionParams::default();
        p.apply_config_file(path.to_str().unwrap()).unwrap();
        assert_eq!(p.host, "10.0.0.2");

        assert_eq!(
            resolve_config_path("prod"),
            PathBuf::from("/etc/zs/prod.conf")
        );
        assert_eq!(resolve_config_path("./prod"), PathBuf::from("./prod"));
    }

    #[test]
    fn test_debug_hides_password() {
        let mut p = ConnectionParams::default();
        p.password = "hunter2".into();
        assert!(!format!("{:?}", p).contains("hunter2"));
    }
}
