use std::{
    collections::BTreeMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use tokio::io::AsyncWriteExt;

#[cfg(unix)]
const USERS_FILE_MODE: u32 = 0o600;

/// Dashboard users, read from a file of `username:password-hash` lines.
#[derive(Clone, Debug, Default)]
pub struct UserStore {
    users: BTreeMap<String, String>,
}

#[derive(thiserror::Error, Debug)]
pub enum UsersFileError {
    #[error("failed to access users file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("line {0}: expected `username:password-hash`")]
    Malformed(usize),
    #[error("line {0}: duplicate user '{1}'")]
    Duplicate(usize, String),
    #[error("invalid username '{0}': must be non-empty without ':' or whitespace")]
    InvalidUsername(String),
}

impl UserStore {
    pub fn parse(content: &str) -> Result<Self, UsersFileError> {
        let mut users = BTreeMap::new();

        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (name, hash) = line
                .split_once(':')
                .filter(|(name, hash)| !name.is_empty() && !hash.is_empty())
                .ok_or(UsersFileError::Malformed(idx + 1))?;

            if users.insert(name.to_owned(), hash.to_owned()).is_some() {
                return Err(UsersFileError::Duplicate(idx + 1, name.to_owned()));
            }
        }

        Ok(UserStore { users })
    }

    pub async fn load(path: &Path) -> Result<Self, UsersFileError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| UsersFileError::Io {
                path: path.to_owned(),
                source,
            })?;
        Self::parse(&content)
    }

    /// Like [`UserStore::load`], but a missing file reads as an empty store.
    pub async fn load_or_default(path: &Path) -> Result<Self, UsersFileError> {
        match Self::load(path).await {
            Err(UsersFileError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
                Ok(Self::default())
            }
            res => res,
        }
    }

    /// Write the store to `path`. On unix the file is readable by its owner only.
    pub async fn save(&self, path: &Path) -> Result<(), UsersFileError> {
        let io_error = |source: std::io::Error| UsersFileError::Io {
            path: path.to_owned(),
            source,
        };

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(USERS_FILE_MODE);

        let mut file = options.open(path).await.map_err(io_error)?;
        // mode only applies to new files
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(USERS_FILE_MODE))
                .await
                .map_err(io_error)?;
        }

        file.write_all(self.to_string().as_bytes())
            .await
            .map_err(io_error)?;
        file.flush().await.map_err(io_error)
    }

    /// Check a password. Unknown users never verify.
    pub fn verify(&self, username: &str, password: &str) -> bool {
        self.users
            .get(username)
            .is_some_and(|hash| password_auth::verify_password(password, hash).is_ok())
    }

    pub fn contains(&self, username: &str) -> bool {
        self.users.contains_key(username)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.users.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Store `password` for `username`, replacing any previous password.
    pub fn set_password(&mut self, username: &str, password: &str) -> Result<(), UsersFileError> {
        if username.is_empty() || username.contains(':') || username.contains(char::is_whitespace)
        {
            return Err(UsersFileError::InvalidUsername(username.to_owned()));
        }

        self.users.insert(
            username.to_owned(),
            password_auth::generate_hash(password),
        );
        Ok(())
    }

    pub fn remove(&mut self, username: &str) -> bool {
        self.users.remove(username).is_some()
    }
}

impl std::fmt::Display for UserStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (name, hash) in &self.users {
            writeln!(f, "{name}:{hash}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_skips_comments_and_blank_lines() {
        let store = UserStore::parse("# admins\n\nalice:$hash$a\n  bob:$hash$b  \n").unwrap();
        assert_eq!(store.names().collect::<Vec<_>>(), vec!["alice", "bob"]);
    }

    #[test]
    fn parse_rejects_malformed_lines() {
        assert!(matches!(
            UserStore::parse("alice:$hash$a\nbob\n"),
            Err(UsersFileError::Malformed(2))
        ));
        assert!(matches!(
            UserStore::parse(":$hash$a\n"),
            Err(UsersFileError::Malformed(1))
        ));
        assert!(matches!(
            UserStore::parse("alice:\n"),
            Err(UsersFileError::Malformed(1))
        ));
    }

    #[test]
    fn parse_rejects_duplicates() {
        assert!(matches!(
            UserStore::parse("alice:x\nalice:y\n"),
            Err(UsersFileError::Duplicate(2, name)) if name == "alice"
        ));
    }

    #[test]
    fn verify_password() {
        let mut store = UserStore::default();
        store.set_password("alice", "correct horse").unwrap();

        assert!(store.verify("alice", "correct horse"));
        assert!(!store.verify("alice", "battery staple"));
        assert!(!store.verify("bob", "correct horse"));
    }

    #[test]
    fn rejects_bad_usernames() {
        let mut store = UserStore::default();
        for name in ["", "a:b", "a b"] {
            assert!(matches!(
                store.set_password(name, "pw"),
                Err(UsersFileError::InvalidUsername(_))
            ));
        }
    }

    #[tokio::test]
    async fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.txt");

        let store = UserStore::load_or_default(&path).await.unwrap();
        assert!(store.is_empty());

        let mut store = store;
        store.set_password("carol", "s3cret").unwrap();
        store.save(&path).await.unwrap();

        let reloaded = UserStore::load(&path).await.unwrap();
        assert!(reloaded.contains("carol"));
        assert!(reloaded.verify("carol", "s3cret"));
    }

    #[tokio::test]
    async fn missing_file_is_an_error_for_load() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            UserStore::load(&dir.path().join("nope.txt")).await,
            Err(UsersFileError::Io { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn saved_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.txt");
        std::fs::write(&path, "").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let mut store = UserStore::default();
        store.set_password("dave", "pw").unwrap();
        store.save(&path).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(UserStore::load(&path).await.unwrap().contains("dave"));
    }
}
