//! Interactive prompts that degrade to errors in batch mode

use anyhow::Result;
use dialoguer::{Confirm, Input, Password, Select};
use std::env;

use crate::utils::errors::JxError;

pub const BATCH_MODE_ENV: &str = "JX_BATCH_MODE";

/// True when prompts must not block on stdin
pub fn is_batch_mode() -> bool {
    env::var(BATCH_MODE_ENV).is_ok()
}

/// Enable batch mode for this process
pub fn enable_batch_mode() {
    // SAFETY: called once from main before any threads are spawned
    unsafe { env::set_var(BATCH_MODE_ENV, "1") };
}

/// Ask user for yes/no confirmation
pub fn confirm(prompt: &str, default: bool) -> Result<bool> {
    if is_batch_mode() {
        return Ok(default);
    }
    let result = Confirm::new()
        .with_prompt(prompt)
        .default(default)
        .interact()?;

    Ok(result)
}

/// Ask for a value; `option` names the flag reported in batch mode
pub fn input(prompt: &str, default: &str, option: &str) -> Result<String> {
    if is_batch_mode() {
        if default.is_empty() {
            return Err(JxError::missing_option(option).into());
        }
        return Ok(default.to_string());
    }
    let mut builder = Input::<String>::new().with_prompt(prompt);
    if !default.is_empty() {
        builder = builder.default(default.to_string());
    }
    Ok(builder.interact_text()?)
}

/// Ask for a secret without echoing it
pub fn password(prompt: &str, option: &str) -> Result<String> {
    if is_batch_mode() {
        return Err(JxError::missing_option(option).into());
    }
    Ok(Password::new().with_prompt(prompt).interact()?)
}

/// Pick one of `options`; in batch mode the default is taken when present
pub fn select(prompt: &str, options: &[String], default: &str, option: &str) -> Result<String> {
    let default_index = options.iter().position(|o| o == default);
    if is_batch_mode() {
        return match default_index {
            Some(i) => Ok(options[i].clone()),
            None => Err(JxError::missing_option(option).into()),
        };
    }
    if options.len() == 1 {
        return Ok(options[0].clone());
    }
    let idx = Select::new()
        .with_prompt(prompt)
        .items(options)
        .default(default_index.unwrap_or(0))
        .interact()?;
    Ok(options[idx].clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    // The env var is process-wide, so the batch assertions live in one test.
    #[test]
    fn test_batch_mode_prompts() {
        let _guard = crate::utils::env_lock();
        enable_batch_mode();
        assert!(is_batch_mode());

        assert!(confirm("continue?", true).unwrap());
        assert_eq!(input("Name", "jx", "name").unwrap(), "jx");

        let err = input("Name", "", "name").unwrap_err();
        assert_eq!(err.to_string(), "missing option: --name");

        assert!(password("Token", "token").is_err());

        let options = vec!["github".to_string(), "gitlab".to_string()];
        assert_eq!(select("Kind", &options, "gitlab", "git-kind").unwrap(), "gitlab");
        assert!(select("Kind", &options, "gitea", "git-kind").is_err());

        unsafe { env::remove_var(BATCH_MODE_ENV) };
    }
}
