//! Credential store.
//!
//! Three secrets are persisted as `KEY=value` lines in a local dotenv-style
//! file: the board-service API key and the suite username and password.
//! Absence of the file signals "no secrets yet", not an error; the CLI then
//! prompts once and saves what was entered.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::Result;

/// Variable name holding the board-service API key.
pub const BOARD_KEY_VAR: &str = "BOARD_API_KEY";
/// Variable name holding the business-suite username.
pub const SUITE_USER_VAR: &str = "SUITE_USERNAME";
/// Variable name holding the business-suite password.
pub const SUITE_PASS_VAR: &str = "SUITE_PASSWORD";

/// The three secrets a run needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Secrets {
    pub board_key: String,
    pub suite_user: String,
    pub suite_pass: String,
}

impl Secrets {
    /// Loads stored secrets. Returns `Ok(None)` when the file does not
    /// exist or does not carry all three keys yet.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let mut vars = BTreeMap::new();
        for entry in dotenvy::from_path_iter(path)? {
            let (key, value) = entry?;
            vars.insert(key, value);
        }
        let (Some(board_key), Some(suite_user), Some(suite_pass)) = (
            vars.remove(BOARD_KEY_VAR),
            vars.remove(SUITE_USER_VAR),
            vars.remove(SUITE_PASS_VAR),
        ) else {
            return Ok(None);
        };
        Ok(Some(Self {
            board_key,
            suite_user,
            suite_pass,
        }))
    }

    /// Persists the secrets as exactly three `KEY=value` lines.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = format!(
            "{BOARD_KEY_VAR}={}\n{SUITE_USER_VAR}={}\n{SUITE_PASS_VAR}={}\n",
            self.board_key, self.suite_user, self.suite_pass
        );
        fs::write(path, contents)?;
        Ok(())
    }
}
