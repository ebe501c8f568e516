//! The authentication step of the greeting dance (§4.2). The wire protocol's
//! own CRAM-MD5-ish mechanism list is modelled narrowly: `ANONYMOUS` (no
//! credentials, author defaults to an empty string) and `PLAIN` (seeded
//! from `ServerConfig::user_db`'s base64-free plaintext map, matching how a
//! `svnserve.conf`-style deployment is normally seeded for test/internal
//! use). Stronger mechanisms are a non-goal (§1).

use std::io::{BufRead, Write};

use svn_wire::{Reader, Writer};

use crate::config::UserDbConfig;
use crate::error::{Error, Result};

/// The authenticated identity for a session, or `None` for an anonymous one.
pub type User = Option<String>;

/// Runs the `( success ( mechs realm ) )` advertisement and mechanism
/// exchange, returning the authenticated user.
pub fn authenticate<R: BufRead, W: Write>(
    reader: &mut Reader<R>,
    writer: &mut Writer<W>,
    users: &UserDbConfig,
    realm: &str,
) -> Result<User> {
    let mechs: &[&str] = if users.users.is_empty() {
        &["ANONYMOUS"]
    } else {
        &["ANONYMOUS", "PLAIN"]
    };

    writer.success(|w| {
        w.list_start()?;
        for mech in mechs {
            w.word(mech)?;
        }
        w.list_end()?;
        w.byte_string(realm.as_bytes())?;
        Ok(())
    })?;
    writer.flush()?;

    reader.list_start()?;
    let mech = reader.word()?;
    let _token = reader.byte_string().unwrap_or_default();
    reader.list_end()?;

    let user = match mech.as_str() {
        "ANONYMOUS" => None,
        "PLAIN" if !users.users.is_empty() => {
            // The PLAIN token is `\0user\0password`; the initial token above
            // was already consumed (clients normally send it inline rather
            // than in a follow-up `response`), so accept a second response
            // step only if nothing usable arrived in the first.
            reader.list_start()?;
            let response = reader.byte_string()?;
            reader.list_end()?;
            let (user, password) = parse_plain(&response)?;
            verify_password(users, &user, &password)?;
            Some(user)
        }
        other => return Err(Error::UnknownCommand(other.to_string())),
    };

    writer.success(|_| Ok(()))?;
    writer.flush()?;

    Ok(user)
}

fn parse_plain(response: &[u8]) -> Result<(String, String)> {
    let parts: Vec<&[u8]> = response.split(|&b| b == 0).collect();
    if parts.len() < 3 {
        return Err(Error::AuthenticationFailed);
    }
    let user = String::from_utf8_lossy(parts[1]).into_owned();
    let password = String::from_utf8_lossy(parts[2]).into_owned();
    Ok((user, password))
}

fn verify_password(users: &UserDbConfig, user: &str, password: &str) -> Result<()> {
    match users.users.get(user) {
        Some(expected) if expected == password => Ok(()),
        _ => Err(Error::AuthenticationFailed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_splits_nul_delimited_fields() -> anyhow::Result<()> {
        let (user, password) = parse_plain(b"\0alice\0hunter2")?;
        assert_eq!(user, "alice");
        assert_eq!(password, "hunter2");
        Ok(())
    }

    #[test]
    fn test_verify_password_rejects_unknown_user() {
        let users = UserDbConfig::default();
        assert!(verify_password(&users, "alice", "hunter2").is_err());
    }
}
