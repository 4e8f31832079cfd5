//! Unit of work over one pooled connection

use async_trait::async_trait;
use sqlx::{Connection, Sqlite, SqliteConnection, pool::PoolConnection};
use tokio::runtime::Handle;
use uuid::Uuid;

use crate::{claim, external_account, user_account, utils::*};
use idstore_types::{prelude::*, user_account_adapter::*};

/// A queued change, applied in order on save
#[derive(Debug)]
enum Change {
	AddUserAccount(UserAccount),
	UpdateUserAccount(UserAccount),
	RemoveUserAccount { id: Uuid, version: i64 },
	AddExternalAccount(ExternalAccount),
	UpdateExternalAccount(ExternalAccount),
	RemoveExternalAccount(Uuid),
	AddClaim(UserAccountClaim),
	UpdateClaim(UserAccountClaim),
	RemoveClaim(Uuid),
}

impl Change {
	async fn apply(&self, conn: &mut SqliteConnection) -> ClResult<u64> {
		match self {
			Change::AddUserAccount(a) => user_account::insert_user_account(conn, a).await,
			Change::UpdateUserAccount(a) => user_account::update_user_account(conn, a).await,
			Change::RemoveUserAccount { id, version } => {
				user_account::delete_user_account(conn, *id, *version).await
			}
			Change::AddExternalAccount(e) => {
				external_account::insert_external_account(conn, e).await
			}
			Change::UpdateExternalAccount(e) => {
				external_account::update_external_account(conn, e).await
			}
			Change::RemoveExternalAccount(id) => {
				external_account::delete_external_account(conn, *id).await
			}
			Change::AddClaim(c) => claim::insert_claim(conn, c).await,
			Change::UpdateClaim(c) => claim::update_claim(conn, c).await,
			Change::RemoveClaim(id) => claim::delete_claim(conn, *id).await,
		}
	}
}

#[derive(Debug)]
pub struct SqliteUserAccountContext {
	conn: Option<PoolConnection<Sqlite>>,
	pending: Vec<Change>,
	/// Leading queued changes whose commit was cancelled before it returned
	in_doubt: usize,
	/// Runtime the context was opened on, drives `save_changes_blocking()`
	runtime: Handle,
}

impl SqliteUserAccountContext {
	pub(crate) fn new(conn: PoolConnection<Sqlite>, runtime: Handle) -> Self {
		Self { conn: Some(conn), pending: Vec::new(), in_doubt: 0, runtime }
	}

	fn conn(&mut self) -> ClResult<&mut SqliteConnection> {
		self.conn.as_deref_mut().ok_or(Error::Disposed)
	}

	fn queue(&mut self, change: Change) -> ClResult<()> {
		if self.conn.is_none() {
			return Err(Error::Disposed);
		}
		self.pending.push(change);
		Ok(())
	}

	/// Drop changes left behind by a save cancelled during commit. They must
	/// not be applied again, so the caller gets `Interrupted` instead.
	fn settle(&mut self) -> ClResult<()> {
		if self.in_doubt == 0 {
			return Ok(());
		}
		let n = self.in_doubt.min(self.pending.len());
		warn!("Dropping {} user account changes from a save cancelled during commit", n);
		self.pending.drain(..n);
		self.in_doubt = 0;
		Err(PersistenceError::Interrupted.into())
	}
}

impl Drop for SqliteUserAccountContext {
	fn drop(&mut self) {
		let unsaved = self.pending.len().saturating_sub(self.in_doubt);
		if unsaved > 0 {
			warn!("User account context dropped with {} unsaved changes", unsaved);
		}
	}
}

#[async_trait]
impl UserAccountContext for SqliteUserAccountContext {
	// User accounts
	//***************
	async fn read_user_account(&mut self, id: Uuid) -> ClResult<Option<UserAccount>> {
		user_account::read_user_account(self.conn()?, id).await
	}

	async fn find_user_account_by_email(&mut self, email: &str) -> ClResult<Option<UserAccount>> {
		user_account::find_by_email(self.conn()?, email).await
	}

	async fn find_user_account_by_verification_key(
		&mut self,
		key: &str,
	) -> ClResult<Option<UserAccount>> {
		user_account::find_by_verification_key(self.conn()?, key).await
	}

	async fn find_user_account_by_external(
		&mut self,
		provider: &str,
		subject: &str,
	) -> ClResult<Option<UserAccount>> {
		user_account::find_by_external(self.conn()?, provider, subject).await
	}

	async fn list_user_accounts(&mut self) -> ClResult<Vec<UserAccount>> {
		user_account::list_user_accounts(self.conn()?).await
	}

	fn add_user_account(&mut self, account: UserAccount) -> ClResult<()> {
		account.validate()?;
		self.queue(Change::AddUserAccount(account))
	}

	fn update_user_account(&mut self, account: UserAccount) -> ClResult<()> {
		account.validate()?;
		self.queue(Change::UpdateUserAccount(account))
	}

	fn remove_user_account(&mut self, account: &UserAccount) -> ClResult<()> {
		self.queue(Change::RemoveUserAccount { id: account.id, version: account.version })
	}

	// External accounts
	//*******************
	async fn find_external_account(
		&mut self,
		provider: &str,
		subject: &str,
	) -> ClResult<Option<ExternalAccount>> {
		external_account::find_external_account(self.conn()?, provider, subject).await
	}

	async fn list_external_accounts(
		&mut self,
		user_account_id: Uuid,
	) -> ClResult<Vec<ExternalAccount>> {
		external_account::list_external_accounts(self.conn()?, user_account_id).await
	}

	fn add_external_account(&mut self, account: ExternalAccount) -> ClResult<()> {
		account.validate()?;
		self.queue(Change::AddExternalAccount(account))
	}

	fn update_external_account(&mut self, account: ExternalAccount) -> ClResult<()> {
		account.validate()?;
		self.queue(Change::UpdateExternalAccount(account))
	}

	fn remove_external_account(&mut self, account: &ExternalAccount) -> ClResult<()> {
		self.queue(Change::RemoveExternalAccount(account.id))
	}

	// Claims
	//********
	async fn list_user_account_claims(
		&mut self,
		user_account_id: Uuid,
	) -> ClResult<Vec<UserAccountClaim>> {
		claim::list_claims(self.conn()?, user_account_id).await
	}

	fn add_user_account_claim(&mut self, claim: UserAccountClaim) -> ClResult<()> {
		claim.validate()?;
		self.queue(Change::AddClaim(claim))
	}

	fn update_user_account_claim(&mut self, claim: UserAccountClaim) -> ClResult<()> {
		claim.validate()?;
		self.queue(Change::UpdateClaim(claim))
	}

	fn remove_user_account_claim(&mut self, claim: &UserAccountClaim) -> ClResult<()> {
		self.queue(Change::RemoveClaim(claim.id))
	}

	// Unit of work
	//**************
	fn has_changes(&self) -> bool {
		self.pending.len() > self.in_doubt
	}

	fn discard_changes(&mut self) {
		self.pending.clear();
		self.in_doubt = 0;
	}

	async fn save_changes(&mut self) -> ClResult<u64> {
		self.settle()?;
		let Some(conn) = self.conn.as_mut() else {
			return Err(Error::Disposed);
		};
		if self.pending.is_empty() {
			return Ok(0);
		}

		// Dropping the transaction on an early return rolls it back
		let mut tx = conn.begin().await.map_err(db_err)?;
		let mut affected = 0;
		for change in &self.pending {
			affected += change.apply(&mut tx).await?;
		}
		// Cancelling this future while the commit is in flight leaves its outcome unknown
		self.in_doubt = self.pending.len();
		let committed = tx.commit().await.map_err(db_err);
		self.in_doubt = 0;
		committed?;

		debug!("Saved {} user account changes, {} rows affected", self.pending.len(), affected);
		self.pending.clear();
		Ok(affected)
	}

	/// # Panics
	///
	/// Panics when called from inside an async task (see `Handle::block_on`).
	fn save_changes_blocking(&mut self) -> ClResult<u64> {
		let runtime = self.runtime.clone();
		runtime.block_on(self.save_changes())
	}

	fn close(&mut self) {
		if self.conn.take().is_some() {
			if !self.pending.is_empty() {
				warn!("Discarding {} unsaved user account changes", self.pending.len());
				self.pending.clear();
			}
			self.in_doubt = 0;
			debug!("User account context closed");
		}
	}

	fn is_closed(&self) -> bool {
		self.conn.is_none()
	}
}


// vim: ts=4
