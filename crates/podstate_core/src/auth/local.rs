//! SQLite-backed identity provider.
//!
//! Anonymous identities and the device session live in the same database
//! file as the document store when both are opened on one path, which is
//! what lets a restarted process come back as the same subject.

use super::{AuthError, AuthResult, IdentityProvider};
use crate::db::{open_db, open_db_in_memory};
use crate::model::subject::{Session, SignInMethod, SubjectId};
use log::info;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

pub struct LocalIdentityProvider {
    conn: Mutex<Connection>,
}

impl LocalIdentityProvider {
    /// Wraps an already migrated connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn open(path: impl AsRef<Path>) -> AuthResult<Self> {
        Ok(Self::new(open_db(path)?))
    }

    pub fn open_in_memory() -> AuthResult<Self> {
        Ok(Self::new(open_db_in_memory()?))
    }

    /// Issues a token that signs in as `subject`.
    ///
    /// Stands in for the backend that would mint tokens for injection.
    pub fn mint_custom_token(&self, subject: &SubjectId) -> AuthResult<String> {
        let token = Uuid::new_v4().simple().to_string();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO custom_tokens (token, subject_id) VALUES (?1, ?2);",
            params![token, subject.as_str()],
        )?;
        Ok(token)
    }

    fn lock(&self) -> AuthResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AuthError::Unavailable("connection lock poisoned".to_string()))
    }
}

impl IdentityProvider for LocalIdentityProvider {
    fn sign_in_anonymously(&self) -> AuthResult<Session> {
        let mut conn = self.lock()?;
        if let Some(session) = read_session(&conn)? {
            if session.method == SignInMethod::Anonymous {
                info!("event=sign_in module=auth status=ok method=anonymous reused=true");
                return Ok(session);
            }
        }

        let subject = SubjectId::new(Uuid::new_v4().simple().to_string());
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO identities (subject_id, method) VALUES (?1, ?2);",
            params![subject.as_str(), SignInMethod::Anonymous.as_str()],
        )?;
        persist_session(&tx, &subject)?;
        tx.commit()?;

        info!("event=sign_in module=auth status=ok method=anonymous reused=false");
        Ok(Session {
            subject_id: subject,
            method: SignInMethod::Anonymous,
        })
    }

    fn sign_in_with_custom_token(&self, token: &str) -> AuthResult<Session> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::InvalidToken);
        }

        let mut conn = self.lock()?;
        let subject = conn
            .query_row(
                "SELECT subject_id FROM custom_tokens WHERE token = ?1;",
                [token],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .map(SubjectId::new)
            .ok_or(AuthError::InvalidToken)?;

        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO identities (subject_id, method) VALUES (?1, ?2)
             ON CONFLICT (subject_id) DO NOTHING;",
            params![subject.as_str(), SignInMethod::CustomToken.as_str()],
        )?;
        persist_session(&tx, &subject)?;
        tx.commit()?;

        info!("event=sign_in module=auth status=ok method=custom_token");
        Ok(Session {
            subject_id: subject,
            method: SignInMethod::CustomToken,
        })
    }

    fn current_session(&self) -> AuthResult<Option<Session>> {
        let conn = self.lock()?;
        read_session(&conn)
    }

    fn sign_out(&self) -> AuthResult<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM auth_state;", [])?;
        info!("event=sign_out module=auth status=ok");
        Ok(())
    }
}

fn persist_session(conn: &Connection, subject: &SubjectId) -> AuthResult<()> {
    conn.execute(
        "INSERT INTO auth_state (slot, subject_id) VALUES (1, ?1)
         ON CONFLICT (slot) DO UPDATE SET
            subject_id = excluded.subject_id,
            signed_in_at = excluded.signed_in_at;",
        [subject.as_str()],
    )?;
    Ok(())
}

fn read_session(conn: &Connection) -> AuthResult<Option<Session>> {
    let row = conn
        .query_row(
            "SELECT s.subject_id, i.method
             FROM auth_state s
             JOIN identities i ON i.subject_id = s.subject_id
             WHERE s.slot = 1;",
            [],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()?;

    row.map(|(subject, method)| {
        let method = SignInMethod::parse(&method).ok_or_else(|| {
            AuthError::InvalidData(format!("unknown sign-in method `{method}`"))
        })?;
        Ok(Session {
            subject_id: SubjectId::new(subject),
            method,
        })
    })
    .transpose()
}
