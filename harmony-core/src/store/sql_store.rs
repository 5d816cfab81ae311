//! SQLite backend

use super::{AccountStore, CommunityStore, RepairJournal, ReservationStore, StoreError};
use crate::handle::{DisplayName, Handle, Namespace};
use crate::model::{Account, Community, CommunityPatch, Mail, Repair, Reservation};
use crate::role::{Role, RoleMap};
use crate::types::{AccountId, CommunityId, RepairId, Timestamp};
use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::collections::BTreeSet;
use std::fmt::Display;
use std::path::Path;
use std::time::Duration;

/// Lock wait used by [`SqlStore::open`]; kept below the default per-call deadline
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(2);

/// SQL-backed store; every call borrows a pooled connection on the blocking
/// thread pool
#[derive(Clone)]
pub struct SqlStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqlStore {
    /// Open (or create) the database at `path` and bring its schema up to date
    pub fn open(path: impl AsRef<Path>, pool_size: u32) -> Result<Self, StoreError> {
        Self::open_with(path, pool_size, DEFAULT_BUSY_TIMEOUT)
    }

    /// Like [`SqlStore::open`], bounding lock waits and pool checkout by `busy_timeout`
    ///
    /// A blocking write cannot be cancelled once started, so `busy_timeout`
    /// has to be shorter than the deadline callers wrap around each call.
    pub fn open_with(
        path: impl AsRef<Path>,
        pool_size: u32,
        busy_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let manager = SqliteConnectionManager::file(path.as_ref()).with_init(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")
        });
        let pool = Pool::builder()
            .max_size(pool_size)
            .connection_timeout(busy_timeout)
            .build(manager)?;
        Self::new(pool)
    }

    /// Wrap an existing pool, running migrations first
    pub fn new(pool: Pool<SqliteConnectionManager>) -> Result<Self, StoreError> {
        super::migrations::migrate(&pool)?;
        Ok(Self { pool })
    }

    /// Private in-memory database (single connection)
    #[cfg(any(test, feature = "test-utils"))]
    pub fn in_memory() -> Result<Self, StoreError> {
        let manager =
            SqliteConnectionManager::memory().with_init(|c| c.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::builder().max_size(1).build(manager)?;
        Self::new(pool)
    }

    async fn run<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            op(&mut conn)
        })
        .await?
    }
}

fn corrupt(err: impl Display) -> StoreError {
    StoreError::Corrupt(err.to_string())
}

/// Message of a UNIQUE / PRIMARY KEY violation, if that is what `err` is
fn unique_violation(err: &rusqlite::Error) -> Option<&str> {
    match err {
        rusqlite::Error::SqliteFailure(e, msg) if e.code == ErrorCode::ConstraintViolation => {
            Some(msg.as_deref().unwrap_or(""))
        }
        _ => None,
    }
}

fn reservation_table(namespace: Namespace) -> &'static str {
    match namespace {
        Namespace::Accounts => "account_handle_reservations",
        Namespace::Communities => "community_handle_reservations",
    }
}

fn load_roles(conn: &Connection, sql: &str, key: &str) -> Result<RoleMap, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params![key], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    let mut roles = RoleMap::new();
    for row in rows {
        let (handle, role) = row?;
        let handle: Handle = handle.parse().map_err(corrupt)?;
        let role: Role = role.parse().map_err(corrupt)?;
        roles.set(handle, role);
    }
    Ok(roles)
}

#[derive(Clone, Copy)]
enum AccountKey {
    Id,
    Handle,
    Mail,
}

fn load_account(conn: &Connection, key: AccountKey, value: &str) -> Result<Option<Account>, StoreError> {
    let column = match key {
        AccountKey::Id => "id",
        AccountKey::Handle => "handle",
        AccountKey::Mail => "mail",
    };
    let sql = format!(
        "SELECT id, display_name, handle, mail, created_at FROM accounts WHERE {} = ?",
        column
    );
    let row = conn
        .query_row(&sql, params![value], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })
        .optional()?;
    let Some((id, display_name, handle, mail, created_at)) = row else {
        return Ok(None);
    };

    let memberships = load_roles(
        conn,
        "SELECT community_handle, role FROM account_memberships WHERE account_id = ?",
        &id,
    )?;
    Ok(Some(Account {
        id: AccountId::parse(&id).map_err(corrupt)?,
        display_name: DisplayName::parse(&display_name).map_err(corrupt)?,
        handle: handle.parse().map_err(corrupt)?,
        mail: Mail::parse(&mail).map_err(corrupt)?,
        memberships,
        created_at: Timestamp::from_millis(created_at as u64),
    }))
}

fn load_community(conn: &Connection, by_handle: bool, value: &str) -> Result<Option<Community>, StoreError> {
    let sql = if by_handle {
        "SELECT id, display_name, handle, image, owner_handle, created_at FROM communities WHERE handle = ?"
    } else {
        "SELECT id, display_name, handle, image, owner_handle, created_at FROM communities WHERE id = ?"
    };
    let row = conn
        .query_row(sql, params![value], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })
        .optional()?;
    let Some((id, display_name, handle, image, owner, created_at)) = row else {
        return Ok(None);
    };

    let members = load_roles(
        conn,
        "SELECT account_handle, role FROM community_members WHERE community_id = ?",
        &id,
    )?;
    Ok(Some(Community {
        id: CommunityId::parse(&id).map_err(corrupt)?,
        display_name: DisplayName::parse(&display_name).map_err(corrupt)?,
        handle: handle.parse().map_err(corrupt)?,
        image,
        owner: owner.parse().map_err(corrupt)?,
        members,
        created_at: Timestamp::from_millis(created_at as u64),
    }))
}

#[async_trait]
impl ReservationStore for SqlStore {
    async fn load_reservation(
        &self,
        namespace: Namespace,
        name: &DisplayName,
    ) -> Result<Option<Reservation>, StoreError> {
        let name = name.as_str().to_owned();
        self.run(move |conn| {
            let sql = format!(
                "SELECT codes, version FROM {} WHERE display_name = ?",
                reservation_table(namespace)
            );
            let row = conn
                .query_row(&sql, params![name], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })
                .optional()?;
            let Some((codes, version)) = row else {
                return Ok(None);
            };
            let codes: BTreeSet<u16> = serde_json::from_str(&codes).map_err(corrupt)?;
            Ok(Some(Reservation {
                codes,
                version: version as u64,
            }))
        })
        .await
    }

    async fn commit_reservation(
        &self,
        namespace: Namespace,
        name: &DisplayName,
        codes: &BTreeSet<u16>,
        expected: Option<u64>,
    ) -> Result<u64, StoreError> {
        let name = name.as_str().to_owned();
        let encoded = serde_json::to_string(codes).map_err(corrupt)?;
        self.run(move |conn| {
            let table = reservation_table(namespace);
            let conflict = || StoreError::VersionConflict {
                key: format!("{}/{}", namespace, name),
            };
            match expected {
                None => {
                    let sql = format!(
                        "INSERT INTO {} (display_name, codes, version) VALUES (?, ?, 1)",
                        table
                    );
                    match conn.execute(&sql, params![name, encoded]) {
                        Ok(_) => Ok(1),
                        Err(e) if unique_violation(&e).is_some() => Err(conflict()),
                        Err(e) => Err(e.into()),
                    }
                }
                Some(version) => {
                    let sql = format!(
                        "UPDATE {} SET codes = ?, version = version + 1
                         WHERE display_name = ? AND version = ?",
                        table
                    );
                    let changed = conn.execute(&sql, params![encoded, name, version as i64])?;
                    if changed == 0 {
                        return Err(conflict());
                    }
                    Ok(version + 1)
                }
            }
        })
        .await
    }
}

#[async_trait]
impl AccountStore for SqlStore {
    async fn insert_account(&self, account: &Account) -> Result<(), StoreError> {
        let account = account.clone();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let inserted = tx.execute(
                "INSERT INTO accounts (id, display_name, handle, mail, created_at)
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    account.id.as_str(),
                    account.display_name.as_str(),
                    account.handle.to_string(),
                    account.mail.as_str(),
                    account.created_at.as_millis() as i64,
                ],
            );
            if let Err(e) = inserted {
                let field = unique_violation(&e).map(|msg| {
                    if msg.contains("accounts.mail") {
                        "mail"
                    } else if msg.contains("accounts.handle") {
                        "handle"
                    } else {
                        "id"
                    }
                });
                return Err(match field {
                    Some(field) => StoreError::Duplicate { field },
                    None => e.into(),
                });
            }
            for (community, role) in account.memberships.iter() {
                tx.execute(
                    "INSERT INTO account_memberships (account_id, community_handle, role)
                     VALUES (?, ?, ?)",
                    params![account.id.as_str(), community.to_string(), role.as_str()],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn account_by_id(&self, id: &AccountId) -> Result<Option<Account>, StoreError> {
        let id = id.as_str().to_owned();
        self.run(move |conn| load_account(conn, AccountKey::Id, &id)).await
    }

    async fn account_by_handle(&self, handle: &Handle) -> Result<Option<Account>, StoreError> {
        let handle = handle.to_string();
        self.run(move |conn| load_account(conn, AccountKey::Handle, &handle)).await
    }

    async fn account_by_mail(&self, mail: &Mail) -> Result<Option<Account>, StoreError> {
        let mail = mail.as_str().to_owned();
        self.run(move |conn| load_account(conn, AccountKey::Mail, &mail)).await
    }

    async fn rename_account(&self, id: &AccountId, name: &DisplayName) -> Result<Account, StoreError> {
        let id = id.as_str().to_owned();
        let name = name.as_str().to_owned();
        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE accounts SET display_name = ? WHERE id = ?",
                params![name, id],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound { entity: "account" });
            }
            load_account(conn, AccountKey::Id, &id)?.ok_or(StoreError::NotFound { entity: "account" })
        })
        .await
    }

    async fn delete_account(&self, id: &AccountId) -> Result<bool, StoreError> {
        let id = id.as_str().to_owned();
        self.run(move |conn| {
            let removed = conn.execute("DELETE FROM accounts WHERE id = ?", params![id])?;
            Ok(removed > 0)
        })
        .await
    }

    async fn put_membership(
        &self,
        account: &Handle,
        community: &Handle,
        role: Role,
    ) -> Result<(), StoreError> {
        let account = account.to_string();
        let community = community.to_string();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let account_id: Option<String> = tx
                .query_row(
                    "SELECT id FROM accounts WHERE handle = ?",
                    params![account],
                    |row| row.get(0),
                )
                .optional()?;
            let account_id = account_id.ok_or(StoreError::NotFound { entity: "account" })?;
            tx.execute(
                "INSERT INTO account_memberships (account_id, community_handle, role)
                 VALUES (?, ?, ?)
                 ON CONFLICT(account_id, community_handle) DO UPDATE SET role = excluded.role",
                params![account_id, community, role.as_str()],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn drop_membership(&self, account: &Handle, community: &Handle) -> Result<bool, StoreError> {
        let account = account.to_string();
        let community = community.to_string();
        self.run(move |conn| {
            let removed = conn.execute(
                "DELETE FROM account_memberships
                 WHERE community_handle = ?
                   AND account_id = (SELECT id FROM accounts WHERE handle = ?)",
                params![community, account],
            )?;
            Ok(removed > 0)
        })
        .await
    }
}

#[async_trait]
impl CommunityStore for SqlStore {
    async fn insert_community(&self, community: &Community) -> Result<(), StoreError> {
        let community = community.clone();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let inserted = tx.execute(
                "INSERT INTO communities (id, display_name, handle, image, owner_handle, created_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    community.id.as_str(),
                    community.display_name.as_str(),
                    community.handle.to_string(),
                    community.image,
                    community.owner.to_string(),
                    community.created_at.as_millis() as i64,
                ],
            );
            if let Err(e) = inserted {
                let field = unique_violation(&e)
                    .map(|msg| if msg.contains("communities.handle") { "handle" } else { "id" });
                return Err(match field {
                    Some(field) => StoreError::Duplicate { field },
                    None => e.into(),
                });
            }
            for (account, role) in community.members.iter() {
                tx.execute(
                    "INSERT INTO community_members (community_id, account_handle, role)
                     VALUES (?, ?, ?)",
                    params![community.id.as_str(), account.to_string(), role.as_str()],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn community_by_id(&self, id: &CommunityId) -> Result<Option<Community>, StoreError> {
        let id = id.as_str().to_owned();
        self.run(move |conn| load_community(conn, false, &id)).await
    }

    async fn community_by_handle(&self, handle: &Handle) -> Result<Option<Community>, StoreError> {
        let handle = handle.to_string();
        self.run(move |conn| load_community(conn, true, &handle)).await
    }

    async fn communities_owned_by(&self, owner: &Handle) -> Result<Vec<Community>, StoreError> {
        let owner = owner.to_string();
        self.run(move |conn| {
            let ids: Vec<String> = conn
                .prepare("SELECT id FROM communities WHERE owner_handle = ? ORDER BY created_at")?
                .query_map(params![owner], |row| row.get(0))?
                .collect::<Result<_, _>>()?;
            let mut owned = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(community) = load_community(conn, false, &id)? {
                    owned.push(community);
                }
            }
            Ok(owned)
        })
        .await
    }

    async fn update_community(
        &self,
        id: &CommunityId,
        patch: &CommunityPatch,
    ) -> Result<Community, StoreError> {
        let id = id.as_str().to_owned();
        let patch = patch.clone();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let exists: Option<i64> = tx
                .query_row("SELECT 1 FROM communities WHERE id = ?", params![id], |row| row.get(0))
                .optional()?;
            if exists.is_none() {
                return Err(StoreError::NotFound { entity: "community" });
            }
            if let Some(name) = &patch.display_name {
                tx.execute(
                    "UPDATE communities SET display_name = ? WHERE id = ?",
                    params![name.as_str(), id],
                )?;
            }
            if let Some(image) = &patch.image {
                tx.execute("UPDATE communities SET image = ? WHERE id = ?", params![image, id])?;
            }
            let updated = load_community(&tx, false, &id)?;
            tx.commit()?;
            updated.ok_or(StoreError::NotFound { entity: "community" })
        })
        .await
    }

    async fn delete_community(&self, id: &CommunityId) -> Result<Option<Community>, StoreError> {
        let id = id.as_str().to_owned();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let existing = load_community(&tx, false, &id)?;
            if existing.is_some() {
                tx.execute("DELETE FROM communities WHERE id = ?", params![id])?;
            }
            tx.commit()?;
            Ok(existing)
        })
        .await
    }

    async fn add_member(
        &self,
        id: &CommunityId,
        account: &Handle,
        role: Role,
    ) -> Result<Community, StoreError> {
        if role == Role::Owner {
            return Err(StoreError::Constraint(
                "the owner role is only assigned at creation".into(),
            ));
        }
        let id = id.as_str().to_owned();
        let account = account.to_string();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let exists: Option<i64> = tx
                .query_row("SELECT 1 FROM communities WHERE id = ?", params![id], |row| row.get(0))
                .optional()?;
            if exists.is_none() {
                return Err(StoreError::NotFound { entity: "community" });
            }
            let inserted = tx.execute(
                "INSERT INTO community_members (community_id, account_handle, role) VALUES (?, ?, ?)",
                params![id, account, role.as_str()],
            );
            match inserted {
                Ok(_) => {}
                Err(e) if unique_violation(&e).is_some() => {
                    return Err(StoreError::Duplicate { field: "member" })
                }
                Err(e) => return Err(e.into()),
            }
            let updated = load_community(&tx, false, &id)?;
            tx.commit()?;
            updated.ok_or(StoreError::NotFound { entity: "community" })
        })
        .await
    }

    async fn remove_member(&self, id: &CommunityId, account: &Handle) -> Result<bool, StoreError> {
        let id = id.as_str().to_owned();
        let account = account.to_string();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let owner: Option<String> = tx
                .query_row(
                    "SELECT owner_handle FROM communities WHERE id = ?",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?;
            let owner = owner.ok_or(StoreError::NotFound { entity: "community" })?;
            if owner == account {
                return Err(StoreError::Constraint(format!(
                    "{} owns the community and cannot be removed",
                    account
                )));
            }
            let removed = tx.execute(
                "DELETE FROM community_members WHERE community_id = ? AND account_handle = ?",
                params![id, account],
            )?;
            tx.commit()?;
            Ok(removed > 0)
        })
        .await
    }
}

#[async_trait]
impl RepairJournal for SqlStore {
    async fn record_repair(&self, repair: &Repair) -> Result<(), StoreError> {
        let repair = repair.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO membership_repairs (id, operation, community_handle, account_handle, recorded_at)
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    repair.id.as_str(),
                    repair.operation.as_str(),
                    repair.community.to_string(),
                    repair.account.to_string(),
                    repair.recorded_at.as_millis() as i64,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn pending_repairs(&self) -> Result<Vec<Repair>, StoreError> {
        self.run(|conn| {
            let rows: Vec<(String, String, String, String, i64)> = conn
                .prepare(
                    "SELECT id, operation, community_handle, account_handle, recorded_at
                     FROM membership_repairs ORDER BY recorded_at, id",
                )?
                .query_map([], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
                })?
                .collect::<Result<_, _>>()?;
            rows.into_iter()
                .map(|(id, operation, community, account, recorded_at)| -> Result<Repair, StoreError> {
                    Ok(Repair {
                        id: RepairId::parse(&id).map_err(corrupt)?,
                        operation: operation.parse().map_err(corrupt)?,
                        community: community.parse().map_err(corrupt)?,
                        account: account.parse().map_err(corrupt)?,
                        recorded_at: Timestamp::from_millis(recorded_at as u64),
                    })
                })
                .collect()
        })
        .await
    }

    async fn resolve_repair(&self, id: &RepairId) -> Result<bool, StoreError> {
        let id = id.as_str().to_owned();
        self.run(move |conn| {
            let removed = conn.execute("DELETE FROM membership_repairs WHERE id = ?", params![id])?;
            Ok(removed > 0)
        })
        .await
    }
}
