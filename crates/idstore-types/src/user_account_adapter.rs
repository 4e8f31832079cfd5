//! Adapter that stores end-user accounts, their linked external accounts and their claims.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::fmt::Debug;
use uuid::Uuid;

use crate::prelude::*;
use crate::utils::require_non_empty;

/// Represents a local user account
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct UserAccount {
	pub id: Uuid,
	pub email: Option<Box<str>>,
	pub is_email_verified: bool,
	pub email_verified_at: Option<Timestamp>,
	/// Opaque hash produced by the authentication layer
	pub password_hash: Option<Box<str>>,
	pub password_changed_at: Option<Timestamp>,
	pub is_login_allowed: bool,
	pub failed_login_count: i32,
	pub last_login_at: Option<Timestamp>,
	pub last_failed_login_at: Option<Timestamp>,
	pub verification_key: Option<Box<str>>,
	pub verification_purpose: Option<i32>,
	pub verification_key_sent_at: Option<Timestamp>,
	/// Concurrency token, incremented by every successful update
	pub version: i64,
	pub created_at: Timestamp,
	pub updated_at: Timestamp,
}

impl UserAccount {
	pub fn new(email: Option<&str>) -> Self {
		let created_at = now();
		UserAccount {
			id: Uuid::new_v4(),
			email: email.map(Box::from),
			is_email_verified: false,
			email_verified_at: None,
			password_hash: None,
			password_changed_at: None,
			is_login_allowed: true,
			failed_login_count: 0,
			last_login_at: None,
			last_failed_login_at: None,
			verification_key: None,
			verification_purpose: None,
			verification_key_sent_at: None,
			version: 1,
			created_at,
			updated_at: created_at,
		}
	}

	pub fn validate(&self) -> ClResult<()> {
		if let Some(email) = &self.email {
			require_non_empty("email", email)?;
		}
		if self.failed_login_count < 0 {
			return Err(Error::ValidationError("failed_login_count must not be negative".into()));
		}
		Ok(())
	}
}

/// Link between a user account and an account at an external identity provider
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExternalAccount {
	pub id: Uuid,
	pub user_account_id: Uuid,
	pub provider: Box<str>,
	/// Subject identifier issued by the provider
	pub subject: Box<str>,
	pub email: Option<Box<str>>,
	pub last_login_at: Option<Timestamp>,
	pub created_at: Timestamp,
}

impl ExternalAccount {
	pub fn new(
		user_account_id: Uuid,
		provider: impl Into<Box<str>>,
		subject: impl Into<Box<str>>,
	) -> Self {
		ExternalAccount {
			id: Uuid::new_v4(),
			user_account_id,
			provider: provider.into(),
			subject: subject.into(),
			email: None,
			last_login_at: None,
			created_at: now(),
		}
	}

	pub fn validate(&self) -> ClResult<()> {
		require_non_empty("provider", &self.provider)?;
		require_non_empty("subject", &self.subject)
	}
}

/// An attribute claim attached to a user account
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct UserAccountClaim {
	pub id: Uuid,
	pub user_account_id: Uuid,
	pub claim_type: Box<str>,
	pub value: Box<str>,
}

impl UserAccountClaim {
	pub fn new(
		user_account_id: Uuid,
		claim_type: impl Into<Box<str>>,
		value: impl Into<Box<str>>,
	) -> Self {
		UserAccountClaim {
			id: Uuid::new_v4(),
			user_account_id,
			claim_type: claim_type.into(),
			value: value.into(),
		}
	}

	pub fn validate(&self) -> ClResult<()> {
		require_non_empty("claim_type", &self.claim_type)
	}
}

/// A user account store shared by all requests
#[async_trait]
pub trait UserAccountStore: Debug + Send + Sync {
	/// Open a new unit of work. The context holds one pooled connection until
	/// it is closed or dropped.
	async fn open(&self) -> ClResult<Box<dyn UserAccountContext>>;

	/// Schema version of the backing database
	async fn schema_version(&self) -> ClResult<i64>;
}

/// One unit of work on the user account store.
///
/// Reads see committed data only; queued changes become visible after a save.
/// Every method fails with [`Error::Disposed`] after `close()`.
#[async_trait]
pub trait UserAccountContext: Send {
	// User accounts
	//***************
	async fn read_user_account(&mut self, id: Uuid) -> ClResult<Option<UserAccount>>;
	async fn find_user_account_by_email(&mut self, email: &str) -> ClResult<Option<UserAccount>>;
	async fn find_user_account_by_verification_key(
		&mut self,
		key: &str,
	) -> ClResult<Option<UserAccount>>;
	/// The user account linked to an external provider subject
	async fn find_user_account_by_external(
		&mut self,
		provider: &str,
		subject: &str,
	) -> ClResult<Option<UserAccount>>;
	async fn list_user_accounts(&mut self) -> ClResult<Vec<UserAccount>>;
	fn add_user_account(&mut self, account: UserAccount) -> ClResult<()>;
	fn update_user_account(&mut self, account: UserAccount) -> ClResult<()>;
	/// Remove a user account with its external accounts and claims
	fn remove_user_account(&mut self, account: &UserAccount) -> ClResult<()>;

	// External accounts
	//*******************
	async fn find_external_account(
		&mut self,
		provider: &str,
		subject: &str,
	) -> ClResult<Option<ExternalAccount>>;
	async fn list_external_accounts(&mut self, user_account_id: Uuid)
	-> ClResult<Vec<ExternalAccount>>;
	fn add_external_account(&mut self, account: ExternalAccount) -> ClResult<()>;
	fn update_external_account(&mut self, account: ExternalAccount) -> ClResult<()>;
	fn remove_external_account(&mut self, account: &ExternalAccount) -> ClResult<()>;

	// Claims
	//********
	async fn list_user_account_claims(
		&mut self,
		user_account_id: Uuid,
	) -> ClResult<Vec<UserAccountClaim>>;
	fn add_user_account_claim(&mut self, claim: UserAccountClaim) -> ClResult<()>;
	fn update_user_account_claim(&mut self, claim: UserAccountClaim) -> ClResult<()>;
	fn remove_user_account_claim(&mut self, claim: &UserAccountClaim) -> ClResult<()>;

	// Unit of work
	//**************
	fn has_changes(&self) -> bool;
	fn discard_changes(&mut self);
	/// Persist all queued changes in one transaction and return the number of
	/// affected rows. On failure nothing is written and the changes stay queued.
	///
	/// If a previous save was cancelled while committing, its changes are
	/// dropped from the queue and this call fails with
	/// [`PersistenceError::Interrupted`].
	async fn save_changes(&mut self) -> ClResult<u64>;
	/// Blocking variant of `save_changes()`, driven on the runtime the context
	/// was opened on. Call it from a blocking thread (e.g. inside
	/// `tokio::task::spawn_blocking`).
	///
	/// # Panics
	///
	/// Panics when called from inside an async task, like
	/// `tokio::runtime::Handle::block_on`.
	fn save_changes_blocking(&mut self) -> ClResult<u64>;
	/// Release the connection. Queued changes are discarded.
	fn close(&mut self);
	fn is_closed(&self) -> bool;
}

/// Open a context, run `f` with it and close it whatever `f` returned
pub async fn with_user_accounts<T, F>(store: &dyn UserAccountStore, f: F) -> ClResult<T>
where
	F: AsyncFnOnce(&mut dyn UserAccountContext) -> ClResult<T>,
{
	let mut ctx = store.open().await?;
	let res = f(&mut *ctx).await;
	ctx.close();
	res
}


// vim: ts=4
